use std::collections::HashMap;

use axum_storefront_api::identity::{
    CART_SESSION_KEY, SessionState, VisitorIdentity, resolve_owner_key,
};
use uuid::Uuid;

#[test]
fn existing_session_key_wins_over_authentication() {
    let mut session: HashMap<String, String> = HashMap::new();
    session.set(CART_SESSION_KEY, "carried-over-token".to_string());

    let key = resolve_owner_key(
        &mut session,
        &VisitorIdentity::authenticated("user@example.com"),
    );

    assert_eq!(key.as_str(), "carried-over-token");
}

#[test]
fn authenticated_visitor_is_keyed_by_login_name() {
    let mut session: HashMap<String, String> = HashMap::new();

    let key = resolve_owner_key(
        &mut session,
        &VisitorIdentity::authenticated("user@example.com"),
    );

    assert_eq!(key.as_str(), "user@example.com");
    assert_eq!(
        session.get(CART_SESSION_KEY).map(String::as_str),
        Some("user@example.com"),
        "resolved key must be written back into the session"
    );
}

#[test]
fn anonymous_visitor_gets_a_minted_uuid_token() {
    let mut session: HashMap<String, String> = HashMap::new();

    let key = resolve_owner_key(&mut session, &VisitorIdentity::anonymous());

    assert!(
        Uuid::parse_str(key.as_str()).is_ok(),
        "anonymous token should be a uuid, got {}",
        key
    );
    assert_eq!(
        session.get(CART_SESSION_KEY).map(String::as_str),
        Some(key.as_str())
    );
}

#[test]
fn resolution_is_idempotent_within_a_session() {
    let mut session: HashMap<String, String> = HashMap::new();

    let first = resolve_owner_key(&mut session, &VisitorIdentity::anonymous());
    let second = resolve_owner_key(&mut session, &VisitorIdentity::anonymous());

    assert_eq!(first, second);
}

#[test]
fn blank_login_name_counts_as_anonymous() {
    let mut session: HashMap<String, String> = HashMap::new();

    let key = resolve_owner_key(&mut session, &VisitorIdentity::authenticated(""));

    assert!(Uuid::parse_str(key.as_str()).is_ok());
}

#[test]
fn minted_tokens_differ_across_sessions() {
    let mut first_session: HashMap<String, String> = HashMap::new();
    let mut second_session: HashMap<String, String> = HashMap::new();

    let first = resolve_owner_key(&mut first_session, &VisitorIdentity::anonymous());
    let second = resolve_owner_key(&mut second_session, &VisitorIdentity::anonymous());

    assert_ne!(first, second);
}
