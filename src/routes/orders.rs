use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::orders::{OrderList, OrderWithItems},
    error::AppResult,
    middleware::auth::CartOwner,
    response::ApiResponse,
    routes::params::OrderListQuery,
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/checkout", post(checkout))
        .route("/{id}", get(get_order))
}

#[utoipa::path(
    post,
    path = "/api/orders/checkout",
    params(
        ("x-cart-token" = Option<String>, Header, description = "Anonymous cart token; omit when authenticated")
    ),
    responses(
        (status = 200, description = "Cart converted into an order; the cart is empty afterwards", body = ApiResponse<OrderWithItems>),
        (status = 400, description = "Cart is empty"),
    ),
    tag = "Orders"
)]
pub async fn checkout(
    State(state): State<AppState>,
    owner: CartOwner,
) -> AppResult<(HeaderMap, Json<ApiResponse<OrderWithItems>>)> {
    let resp = order_service::checkout(&state, &owner.key).await?;
    Ok((owner.response_headers(), Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("sort_order" = Option<String>, Query, description = "asc or desc, default desc"),
        ("x-cart-token" = Option<String>, Header, description = "Anonymous cart token; omit when authenticated")
    ),
    responses(
        (status = 200, description = "Orders for the current visitor", body = ApiResponse<OrderList>)
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    owner: CartOwner,
    Query(query): Query<OrderListQuery>,
) -> AppResult<(HeaderMap, Json<ApiResponse<OrderList>>)> {
    let resp = order_service::list_orders(&state, &owner.key, query).await?;
    Ok((owner.response_headers(), Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order id"),
        ("x-cart-token" = Option<String>, Header, description = "Anonymous cart token; omit when authenticated")
    ),
    responses(
        (status = 200, description = "Order with its lines", body = ApiResponse<OrderWithItems>),
        (status = 404, description = "Order not found for this visitor"),
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    owner: CartOwner,
    Path(id): Path<Uuid>,
) -> AppResult<(HeaderMap, Json<ApiResponse<OrderWithItems>>)> {
    let resp = order_service::get_order(&state, &owner.key, id).await?;
    Ok((owner.response_headers(), Json(resp)))
}
