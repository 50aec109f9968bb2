use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use sea_orm::PaginatorTrait;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    catalog,
    dto::orders::{OrderList, OrderWithItems},
    entity::{
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
    },
    error::{AppError, AppResult},
    identity::OwnerKey,
    models::{Order, OrderLine},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
    store,
};

/// Convert the owner's cart into a persisted order. One transaction covers
/// the price snapshot, the order and its lines, and the cart clear: a failed
/// checkout leaves the cart exactly as it was.
pub async fn checkout(state: &AppState, owner: &OwnerKey) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = store::begin(&state.orm).await?;

    let lines = store::list_lines_for_update(&txn, owner).await?;
    if lines.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let mut total_amount = Decimal::ZERO;
    let mut priced = Vec::with_capacity(lines.len());
    for line in lines {
        let unit_price = catalog::price_of(&txn, line.product_id).await?;
        total_amount += unit_price * Decimal::from(line.quantity);
        priced.push((line, unit_price));
    }

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        owner_key: Set(owner.as_str().to_string()),
        total_amount: Set(total_amount),
        created_at: NotSet,
    }
    .insert(&txn)
    .await
    .map_err(store::classify_db_err)?;

    let mut order_lines: Vec<OrderLine> = Vec::with_capacity(priced.len());
    for (line, unit_price) in &priced {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            unit_price: Set(*unit_price),
            quantity: Set(line.quantity),
            created_at: NotSet,
        }
        .insert(&txn)
        .await
        .map_err(store::classify_db_err)?;

        order_lines.push(order_line_from_entity(item));
    }

    // the cart is consumed by the order
    store::delete_all_lines(&txn, owner).await?;
    store::commit(txn).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(owner.as_str()),
        "checkout",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "total": order.total_amount })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Checkout success",
        OrderWithItems {
            order: order_from_entity(order),
            items: order_lines,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    owner: &OwnerKey,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(OrderCol::OwnerKey.eq(owner.as_str()));
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    owner: &OwnerKey,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(OrderCol::OwnerKey.eq(owner.as_str()))
        .filter(OrderCol::Id.eq(id))
        .one(&state.orm)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_line_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        owner_key: model.owner_key,
        total_amount: model.total_amount,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn order_line_from_entity(model: OrderItemModel) -> OrderLine {
    OrderLine {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        unit_price: model.unit_price,
        quantity: model.quantity,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
