use std::time::Duration;

use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    db::OrmConn,
    entity::cart_items::{self, Column, Entity as CartItems},
    error::{AppError, AppResult},
    identity::OwnerKey,
};

/// Attempts per operation when a conflict or transient outage is recoverable.
pub const RETRY_LIMIT: u32 = 3;

pub fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(25 * 2u64.pow(attempt))
}

/// Map a database error onto the store's error kinds: unique-index collisions
/// become `Conflict`, connection-level failures become `Unavailable`.
pub fn classify_db_err(err: DbErr) -> AppError {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return AppError::Conflict;
    }
    match err {
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => AppError::Unavailable,
        other => AppError::OrmError(other),
    }
}

/// Open the transaction that scopes one cart operation. Transient connection
/// failures are retried with backoff before surfacing `Unavailable`.
pub async fn begin(conn: &OrmConn) -> AppResult<DatabaseTransaction> {
    let mut attempt = 0;
    loop {
        match conn.begin().await {
            Ok(txn) => return Ok(txn),
            Err(err) => {
                let err = classify_db_err(err);
                if matches!(err, AppError::Unavailable) && attempt < RETRY_LIMIT {
                    attempt += 1;
                    tracing::debug!(attempt, "could not open cart transaction, retrying");
                    tokio::time::sleep(backoff(attempt)).await;
                    continue;
                }
                return Err(err);
            }
        }
    }
}

pub async fn commit(txn: DatabaseTransaction) -> AppResult<()> {
    txn.commit().await.map_err(classify_db_err)
}

pub async fn find_line<C: ConnectionTrait>(
    conn: &C,
    owner: &OwnerKey,
    product_id: Uuid,
) -> AppResult<Option<cart_items::Model>> {
    CartItems::find()
        .filter(Column::OwnerKey.eq(owner.as_str()))
        .filter(Column::ProductId.eq(product_id))
        .one(conn)
        .await
        .map_err(classify_db_err)
}

/// Lock-read the (owner, product) line so the following quantity write cannot
/// race a concurrent add or removal.
pub async fn find_line_for_update(
    txn: &DatabaseTransaction,
    owner: &OwnerKey,
    product_id: Uuid,
) -> AppResult<Option<cart_items::Model>> {
    CartItems::find()
        .filter(Column::OwnerKey.eq(owner.as_str()))
        .filter(Column::ProductId.eq(product_id))
        .lock(LockType::Update)
        .one(txn)
        .await
        .map_err(classify_db_err)
}

/// Lock-read by record id, scoped to the owner. The owner filter is part of
/// the query itself, so a record id belonging to another cart is simply not
/// found.
pub async fn find_record_for_update(
    txn: &DatabaseTransaction,
    owner: &OwnerKey,
    record_id: Uuid,
) -> AppResult<Option<cart_items::Model>> {
    CartItems::find()
        .filter(Column::OwnerKey.eq(owner.as_str()))
        .filter(Column::Id.eq(record_id))
        .lock(LockType::Update)
        .one(txn)
        .await
        .map_err(classify_db_err)
}

pub async fn list_lines_for_update(
    txn: &DatabaseTransaction,
    owner: &OwnerKey,
) -> AppResult<Vec<cart_items::Model>> {
    CartItems::find()
        .filter(Column::OwnerKey.eq(owner.as_str()))
        .order_by_desc(Column::CreatedAt)
        .lock(LockType::Update)
        .all(txn)
        .await
        .map_err(classify_db_err)
}

pub async fn list_lines<C: ConnectionTrait>(
    conn: &C,
    owner: &OwnerKey,
) -> AppResult<Vec<cart_items::Model>> {
    CartItems::find()
        .filter(Column::OwnerKey.eq(owner.as_str()))
        .order_by_desc(Column::CreatedAt)
        .all(conn)
        .await
        .map_err(classify_db_err)
}

/// Insert the first unit of a product into a cart. The unique index on
/// (owner_key, product_id) turns a racing first-add into `Conflict`.
pub async fn insert_line(
    txn: &DatabaseTransaction,
    owner: &OwnerKey,
    product_id: Uuid,
) -> AppResult<cart_items::Model> {
    cart_items::ActiveModel {
        id: Set(Uuid::new_v4()),
        owner_key: Set(owner.as_str().to_string()),
        product_id: Set(product_id),
        quantity: Set(1),
        created_at: NotSet,
    }
    .insert(txn)
    .await
    .map_err(classify_db_err)
}

pub async fn set_quantity(
    txn: &DatabaseTransaction,
    record_id: Uuid,
    quantity: i32,
) -> AppResult<cart_items::Model> {
    debug_assert!(quantity > 0, "a cart line never holds quantity 0");
    cart_items::ActiveModel {
        id: Set(record_id),
        quantity: Set(quantity),
        ..Default::default()
    }
    .update(txn)
    .await
    .map_err(classify_db_err)
}

pub async fn delete_line(txn: &DatabaseTransaction, record_id: Uuid) -> AppResult<()> {
    CartItems::delete_by_id(record_id)
        .exec(txn)
        .await
        .map_err(classify_db_err)?;
    Ok(())
}

pub async fn delete_all_lines(txn: &DatabaseTransaction, owner: &OwnerKey) -> AppResult<u64> {
    let result = CartItems::delete_many()
        .filter(Column::OwnerKey.eq(owner.as_str()))
        .exec(txn)
        .await
        .map_err(classify_db_err)?;
    Ok(result.rows_affected)
}

/// Bulk re-key of every line owned by `old`. Callers must have resolved
/// (owner, product) collisions first or the unique index rejects the update.
pub async fn reassign_owner(
    txn: &DatabaseTransaction,
    old: &OwnerKey,
    new: &OwnerKey,
) -> AppResult<u64> {
    let result = CartItems::update_many()
        .col_expr(Column::OwnerKey, Expr::value(new.as_str()))
        .filter(Column::OwnerKey.eq(old.as_str()))
        .exec(txn)
        .await
        .map_err(classify_db_err)?;
    Ok(result.rows_affected)
}
