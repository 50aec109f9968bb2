use std::collections::HashMap;

use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::{
    entity::products::{Column, Entity as Products},
    error::{AppError, AppResult},
    store,
};

/// Add-time validation: rejecting an unknown product here keeps the
/// missing-product case at total/checkout time a genuine consistency fault.
pub async fn ensure_exists<C: ConnectionTrait>(conn: &C, product_id: Uuid) -> AppResult<()> {
    let found = Products::find_by_id(product_id)
        .one(conn)
        .await
        .map_err(store::classify_db_err)?;
    if found.is_none() {
        return Err(AppError::BadRequest("product not found".to_string()));
    }
    Ok(())
}

/// Current catalog price. A cart line whose product has vanished is a fatal
/// consistency error for the calling operation, not a silent zero.
pub async fn price_of<C: ConnectionTrait>(conn: &C, product_id: Uuid) -> AppResult<Decimal> {
    Products::find_by_id(product_id)
        .one(conn)
        .await
        .map_err(store::classify_db_err)?
        .map(|product| product.price)
        .ok_or_else(|| {
            AppError::Consistency(format!(
                "cart references product {product_id} which no longer exists"
            ))
        })
}

pub async fn prices_for<C: ConnectionTrait>(
    conn: &C,
    ids: &[Uuid],
) -> AppResult<HashMap<Uuid, Decimal>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = Products::find()
        .filter(Column::Id.is_in(ids.iter().copied()))
        .all(conn)
        .await
        .map_err(store::classify_db_err)?;
    Ok(rows.into_iter().map(|p| (p.id, p.price)).collect())
}
