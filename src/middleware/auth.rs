use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, HeaderName, HeaderValue, header},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use crate::{
    dto::auth::Claims,
    error::AppError,
    identity::{self, CART_SESSION_KEY, OwnerKey, SessionState, VisitorIdentity},
};

/// Header carrying the anonymous cart token between client and server.
pub const CART_TOKEN_HEADER: &str = "x-cart-token";

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
}

pub fn ensure_role(user: &AuthUser, role: &str) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, "admin")
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;
    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AppError::BadRequest("Missing Authorization header".into()))?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::BadRequest("Invalid Authorization header".into()))?;

        if !auth_str.starts_with("Bearer ") {
            return Err(AppError::BadRequest("Invalid Authorization scheme".into()));
        }
        let token = auth_str.trim_start_matches("Bearer ").trim();

        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| AppError::Internal(anyhow::anyhow!("JWT_SECRET is not set")))?;

        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::BadRequest("Invalid or expired token".into()))?;

        let user_id = Uuid::parse_str(&decoded.claims.sub)
            .map_err(|_| AppError::BadRequest("Invalid user id in token".into()))?;

        Ok(AuthUser {
            user_id,
            email: decoded.claims.email.clone(),
            role: decoded.claims.role.clone(),
        })
    }
}

/// The request's cart session, backed by the `x-cart-token` header. A value
/// written by the resolver is kept aside so the handler can echo it to the
/// client, which plays the role the server-side session played originally.
struct HeaderSession {
    token: Option<String>,
    minted: Option<String>,
}

impl SessionState for HeaderSession {
    fn get(&self, key: &str) -> Option<String> {
        if key == CART_SESSION_KEY {
            self.token.clone()
        } else {
            None
        }
    }

    fn set(&mut self, key: &str, value: String) {
        if key == CART_SESSION_KEY {
            self.minted = Some(value);
        }
    }
}

/// Resolved cart owner for the current request: the session token when the
/// client sent one, else the authenticated login name, else a freshly minted
/// anonymous token.
#[derive(Debug, Clone)]
pub struct CartOwner {
    pub key: OwnerKey,
    minted: Option<String>,
}

impl CartOwner {
    /// Headers for the response; carries the minted token back to the client
    /// so the cart survives its next request.
    pub fn response_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.minted {
            if let Ok(value) = HeaderValue::from_str(token) {
                headers.insert(HeaderName::from_static(CART_TOKEN_HEADER), value);
            }
        }
        headers
    }
}

impl<S> FromRequestParts<S> for CartOwner
where
    S: Send + Sync,
{
    type Rejection = AppError;
    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        // A presented bearer token must be valid; a broken one is rejected
        // rather than silently demoted to an anonymous cart.
        let authenticated = match parts.headers.get(header::AUTHORIZATION) {
            Some(_) => Some(AuthUser::from_request_parts(parts, state).await?),
            None => None,
        };

        let token = parts
            .headers
            .get(CART_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .filter(|token| !token.is_empty());

        let mut session = HeaderSession {
            token,
            minted: None,
        };
        let identity = match &authenticated {
            Some(user) => VisitorIdentity::authenticated(user.email.clone()),
            None => VisitorIdentity::anonymous(),
        };

        let key = identity::resolve_owner_key(&mut session, &identity);
        Ok(CartOwner {
            key,
            minted: session.minted,
        })
    }
}
