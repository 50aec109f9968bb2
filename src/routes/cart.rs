use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{delete, get},
};
use uuid::Uuid;

use crate::{
    dto::cart::{AddToCartRequest, CartList, CartSummary, RemovedLine},
    error::AppResult,
    middleware::auth::CartOwner,
    models::CartLine,
    response::ApiResponse,
    routes::params::Pagination,
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(cart_list).post(add_to_cart).delete(empty_cart),
        )
        .route("/summary", get(cart_summary))
        .route("/items/{record_id}", delete(remove_one_unit))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("x-cart-token" = Option<String>, Header, description = "Anonymous cart token; omit when authenticated")
    ),
    responses(
        (status = 200, description = "List cart lines for the current visitor", body = ApiResponse<CartList>)
    ),
    tag = "Cart"
)]
pub async fn cart_list(
    State(state): State<AppState>,
    owner: CartOwner,
    Query(pagination): Query<Pagination>,
) -> AppResult<(HeaderMap, Json<ApiResponse<CartList>>)> {
    let resp = cart_service::list_cart(&state, &owner.key, pagination).await?;
    Ok((owner.response_headers(), Json(resp)))
}

#[utoipa::path(
    post,
    path = "/api/cart",
    request_body = AddToCartRequest,
    params(
        ("x-cart-token" = Option<String>, Header, description = "Anonymous cart token; omit when authenticated")
    ),
    responses(
        (status = 200, description = "Add one unit of a product; repeated adds merge into one line", body = ApiResponse<CartLine>),
        (status = 400, description = "Unknown product"),
    ),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    owner: CartOwner,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<(HeaderMap, Json<ApiResponse<CartLine>>)> {
    let resp = cart_service::add_item(&state, &owner.key, payload.product_id).await?;
    Ok((owner.response_headers(), Json(resp)))
}

#[utoipa::path(
    delete,
    path = "/api/cart/items/{record_id}",
    params(
        ("record_id" = Uuid, Path, description = "Cart line record id"),
        ("x-cart-token" = Option<String>, Header, description = "Anonymous cart token; omit when authenticated")
    ),
    responses(
        (status = 200, description = "One unit removed; remaining_quantity is 0 when the line is gone", body = ApiResponse<RemovedLine>),
        (status = 404, description = "No such line for this cart"),
    ),
    tag = "Cart"
)]
pub async fn remove_one_unit(
    State(state): State<AppState>,
    owner: CartOwner,
    Path(record_id): Path<Uuid>,
) -> AppResult<(HeaderMap, Json<ApiResponse<RemovedLine>>)> {
    let resp = cart_service::remove_one_unit(&state, &owner.key, record_id).await?;
    Ok((owner.response_headers(), Json(resp)))
}

#[utoipa::path(
    delete,
    path = "/api/cart",
    params(
        ("x-cart-token" = Option<String>, Header, description = "Anonymous cart token; omit when authenticated")
    ),
    responses(
        (status = 200, description = "Cart emptied; idempotent", body = ApiResponse<serde_json::Value>),
    ),
    tag = "Cart"
)]
pub async fn empty_cart(
    State(state): State<AppState>,
    owner: CartOwner,
) -> AppResult<(HeaderMap, Json<ApiResponse<serde_json::Value>>)> {
    let resp = cart_service::empty_cart(&state, &owner.key).await?;
    Ok((owner.response_headers(), Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/cart/summary",
    params(
        ("x-cart-token" = Option<String>, Header, description = "Anonymous cart token; omit when authenticated")
    ),
    responses(
        (status = 200, description = "Unit count and priced total; zeros for an empty cart", body = ApiResponse<CartSummary>),
    ),
    tag = "Cart"
)]
pub async fn cart_summary(
    State(state): State<AppState>,
    owner: CartOwner,
) -> AppResult<(HeaderMap, Json<ApiResponse<CartSummary>>)> {
    let resp = cart_service::cart_summary(&state, &owner.key).await?;
    Ok((owner.response_headers(), Json(resp)))
}
