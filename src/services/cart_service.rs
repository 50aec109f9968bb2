use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    catalog,
    dto::cart::{CartItemDto, CartList, CartSummary, MigratedCart, RemovedLine},
    entity::cart_items,
    error::{AppError, AppResult},
    identity::OwnerKey,
    models::{CartLine, Product},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
    store,
};

#[derive(FromRow)]
struct CartWithProductRow {
    cart_id: Uuid,
    quantity: i32,
    added_at: DateTime<Utc>,
    product_id: Uuid,
    name: String,
    description: Option<String>,
    genre: Option<String>,
    price: Decimal,
    product_created_at: DateTime<Utc>,
}

/// Add one unit of a product to the owner's cart: first add inserts a line,
/// repeated adds bump the existing line's quantity. Runs under a row lock;
/// two racing first-adds are serialized by the unique index plus retry.
pub async fn add_item(
    state: &AppState,
    owner: &OwnerKey,
    product_id: Uuid,
) -> AppResult<ApiResponse<CartLine>> {
    let mut attempt = 0;
    let line = loop {
        match try_add_item(state, owner, product_id).await {
            Err(err) if err.is_retryable() && attempt < store::RETRY_LIMIT => {
                attempt += 1;
                tracing::debug!(attempt, owner = %owner, "add_item collided, retrying");
                tokio::time::sleep(store::backoff(attempt)).await;
            }
            other => break other?,
        }
    };

    if let Err(err) = log_audit(
        &state.pool,
        Some(owner.as_str()),
        "cart_add",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product_id, "quantity": line.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("OK", line, None))
}

async fn try_add_item(
    state: &AppState,
    owner: &OwnerKey,
    product_id: Uuid,
) -> AppResult<CartLine> {
    let txn = store::begin(&state.orm).await?;
    catalog::ensure_exists(&txn, product_id).await?;

    let line = match store::find_line_for_update(&txn, owner, product_id).await? {
        Some(existing) => store::set_quantity(&txn, existing.id, existing.quantity + 1).await?,
        None => store::insert_line(&txn, owner, product_id).await?,
    };

    store::commit(txn).await?;
    Ok(cart_line_from_entity(line))
}

/// Remove a single unit from the identified line. Returns the remaining
/// quantity; the line itself disappears when the last unit goes. The lookup
/// is by (owner, record id), so one owner can never touch another's line.
pub async fn remove_one_unit(
    state: &AppState,
    owner: &OwnerKey,
    record_id: Uuid,
) -> AppResult<ApiResponse<RemovedLine>> {
    let txn = store::begin(&state.orm).await?;
    let line = store::find_record_for_update(&txn, owner, record_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let remaining = if line.quantity > 1 {
        store::set_quantity(&txn, line.id, line.quantity - 1).await?.quantity
    } else {
        store::delete_line(&txn, line.id).await?;
        0
    };
    store::commit(txn).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(owner.as_str()),
        "cart_remove_unit",
        Some("cart_items"),
        Some(serde_json::json!({ "record_id": record_id, "remaining": remaining })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Removed one unit",
        RemovedLine {
            record_id,
            remaining_quantity: remaining,
        },
        Some(Meta::empty()),
    ))
}

/// Delete every line for the owner. Idempotent: an already-empty cart is
/// not an error.
pub async fn empty_cart(
    state: &AppState,
    owner: &OwnerKey,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let txn = store::begin(&state.orm).await?;
    let removed = store::delete_all_lines(&txn, owner).await?;
    store::commit(txn).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(owner.as_str()),
        "cart_empty",
        Some("cart_items"),
        Some(serde_json::json!({ "removed": removed })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Cart emptied",
        serde_json::json!({ "removed": removed }),
        Some(Meta::empty()),
    ))
}

pub async fn list_cart(
    state: &AppState,
    owner: &OwnerKey,
    pagination: Pagination,
) -> AppResult<ApiResponse<CartList>> {
    let (page, limit, offset) = pagination.normalize();
    let rows = sqlx::query_as::<_, CartWithProductRow>(
        r#"
        SELECT ci.id AS cart_id, ci.quantity, ci.created_at AS added_at,
               p.id AS product_id, p.name, p.description, p.genre, p.price,
               p.created_at AS product_created_at
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.owner_key = $1
        ORDER BY ci.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(owner.as_str())
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cart_items WHERE owner_key = $1")
        .bind(owner.as_str())
        .fetch_one(&state.pool)
        .await?;

    let items = rows
        .into_iter()
        .map(|row| CartItemDto {
            id: row.cart_id,
            product: Product {
                id: row.product_id,
                name: row.name,
                description: row.description,
                genre: row.genre,
                price: row.price,
                created_at: row.product_created_at,
            },
            quantity: row.quantity,
            added_at: row.added_at,
        })
        .collect();

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("OK", CartList { items }, Some(meta)))
}

/// Total number of units across the owner's lines; 0 when the cart is empty
/// or the owner has never had one.
pub async fn get_count(state: &AppState, owner: &OwnerKey) -> AppResult<i64> {
    let count: (i64,) =
        sqlx::query_as("SELECT COALESCE(SUM(quantity), 0) FROM cart_items WHERE owner_key = $1")
            .bind(owner.as_str())
            .fetch_one(&state.pool)
            .await?;
    Ok(count.0)
}

/// Sum of quantity x catalog price across the owner's lines, priced through
/// the catalog at call time. 0 for an empty cart.
pub async fn get_total(state: &AppState, owner: &OwnerKey) -> AppResult<Decimal> {
    let lines = store::list_lines(&state.orm, owner).await?;
    if lines.is_empty() {
        return Ok(Decimal::ZERO);
    }

    let ids: Vec<Uuid> = lines.iter().map(|line| line.product_id).collect();
    let prices = catalog::prices_for(&state.orm, &ids).await?;

    let mut total = Decimal::ZERO;
    for line in &lines {
        let price = prices.get(&line.product_id).copied().ok_or_else(|| {
            AppError::Consistency(format!(
                "cart references product {} which no longer exists",
                line.product_id
            ))
        })?;
        total += price * Decimal::from(line.quantity);
    }
    Ok(total)
}

pub async fn cart_summary(
    state: &AppState,
    owner: &OwnerKey,
) -> AppResult<ApiResponse<CartSummary>> {
    let count = get_count(state, owner).await?;
    let total = get_total(state, owner).await?;
    Ok(ApiResponse::success(
        "OK",
        CartSummary { count, total },
        Some(Meta::empty()),
    ))
}

/// Re-key every line owned by `old` to `new`, typically after login. When
/// both carts hold the same product the quantities are merged into the
/// destination line, keeping the one-line-per-product invariant.
pub async fn migrate_cart(
    state: &AppState,
    old: &OwnerKey,
    new: &OwnerKey,
) -> AppResult<ApiResponse<MigratedCart>> {
    if old == new {
        return Ok(ApiResponse::success(
            "Nothing to migrate",
            MigratedCart { moved_lines: 0 },
            Some(Meta::empty()),
        ));
    }

    let mut attempt = 0;
    let moved = loop {
        match try_migrate_cart(state, old, new).await {
            Err(err) if err.is_retryable() && attempt < store::RETRY_LIMIT => {
                attempt += 1;
                tracing::debug!(attempt, old = %old, new = %new, "migrate collided, retrying");
                tokio::time::sleep(store::backoff(attempt)).await;
            }
            other => break other?,
        }
    };

    if let Err(err) = log_audit(
        &state.pool,
        Some(new.as_str()),
        "cart_migrate",
        Some("cart_items"),
        Some(serde_json::json!({ "from": old.as_str(), "moved_lines": moved })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Cart migrated",
        MigratedCart { moved_lines: moved },
        Some(Meta::empty()),
    ))
}

async fn try_migrate_cart(state: &AppState, old: &OwnerKey, new: &OwnerKey) -> AppResult<u64> {
    let txn = store::begin(&state.orm).await?;

    let source = store::list_lines_for_update(&txn, old).await?;
    if source.is_empty() {
        store::commit(txn).await?;
        return Ok(0);
    }
    let destination = store::list_lines_for_update(&txn, new).await?;
    let destination_by_product: HashMap<Uuid, &cart_items::Model> = destination
        .iter()
        .map(|line| (line.product_id, line))
        .collect();

    // Merge colliding lines into the destination first; the bulk re-key
    // below would otherwise trip the (owner_key, product_id) unique index.
    let mut moved = 0u64;
    for line in &source {
        if let Some(existing) = destination_by_product.get(&line.product_id) {
            store::set_quantity(&txn, existing.id, existing.quantity + line.quantity).await?;
            store::delete_line(&txn, line.id).await?;
            moved += 1;
        }
    }

    moved += store::reassign_owner(&txn, old, new).await?;
    store::commit(txn).await?;
    Ok(moved)
}

fn cart_line_from_entity(model: cart_items::Model) -> CartLine {
    CartLine {
        id: model.id,
        owner_key: model.owner_key,
        product_id: model.product_id,
        quantity: model.quantity,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
