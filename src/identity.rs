use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session key under which the resolved owner key is stored.
pub const CART_SESSION_KEY: &str = "cart_id";

/// Partition key for one visitor's cart rows: an anonymous token or the
/// authenticated login name. Opaque to the store and services.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerKey(String);

impl OwnerKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for OwnerKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for OwnerKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Key-value state scoped to one visitor's browsing session.
pub trait SessionState {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
}

impl SessionState for std::collections::HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        std::collections::HashMap::get(self, key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_string(), value);
    }
}

/// Authentication facts for the current request.
#[derive(Debug, Clone, Default)]
pub struct VisitorIdentity {
    pub username: Option<String>,
}

impl VisitorIdentity {
    pub fn anonymous() -> Self {
        Self { username: None }
    }

    pub fn authenticated(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
        }
    }

    fn login_name(&self) -> Option<&str> {
        self.username.as_deref().filter(|name| !name.is_empty())
    }
}

/// Resolve the durable owner key for the current visitor.
///
/// A key already held by the session wins, so repeated calls within one
/// session are stable. Otherwise the login name becomes the key, and an
/// unauthenticated visitor gets a fresh anonymous token. Either way the
/// chosen key is written back into the session.
pub fn resolve_owner_key(
    session: &mut impl SessionState,
    identity: &VisitorIdentity,
) -> OwnerKey {
    if let Some(existing) = session.get(CART_SESSION_KEY) {
        return OwnerKey(existing);
    }

    let key = match identity.login_name() {
        Some(name) => name.to_string(),
        None => Uuid::new_v4().to_string(),
    };
    session.set(CART_SESSION_KEY, key.clone());
    OwnerKey(key)
}
