use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue},
    routing::post,
};

use crate::{
    dto::auth::{LoginRequest, LoginResponse, RegisterRequest},
    error::AppResult,
    identity::OwnerKey,
    middleware::auth::CART_TOKEN_HEADER,
    models::User,
    response::ApiResponse,
    services::auth_service::{login_user, register_user},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Register user", body = ApiResponse<User>)
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = register_user(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    params(
        ("x-cart-token" = Option<String>, Header, description = "Anonymous cart token to migrate into the user's cart")
    ),
    responses(
        (status = 200, description = "Login user; any anonymous cart is migrated", body = ApiResponse<LoginResponse>),
        (status = 400, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(HeaderMap, Json<ApiResponse<LoginResponse>>)> {
    let visitor_cart = headers
        .get(CART_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|token| !token.is_empty())
        .map(OwnerKey::from);

    let email = payload.email.clone();
    let resp = login_user(&state, payload, visitor_cart).await?;

    // The cart now lives under the login name; hand that back as the new
    // session token so the client stops using the anonymous one.
    let mut response_headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&email) {
        response_headers.insert(HeaderName::from_static(CART_TOKEN_HEADER), value);
    }

    Ok((response_headers, Json(resp)))
}
