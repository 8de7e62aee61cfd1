//! Integration tests for login, token refresh and session expiry.
//!
//! Every test runs its own stub API, so they can run in parallel.

#![allow(clippy::unwrap_used)]

use secrecy::ExposeSecret;

use soko_core::ProductId;
use soko_integration_tests::{CUSTOMER_EMAIL, CUSTOMER_PASSWORD, StubBackend};
use soko_storefront::api::ApiError;
use soko_storefront::services::auth::{AuthError, RegisterForm};

fn access_token(state: &soko_storefront::state::AppState) -> Option<String> {
    state
        .session()
        .access_token()
        .map(|t| t.expose_secret().to_string())
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_establishes_session() {
    let stub = StubBackend::start().await.unwrap();
    let state = stub.app_state().unwrap();

    let user = state
        .auth()
        .login(CUSTOMER_EMAIL, CUSTOMER_PASSWORD)
        .await
        .unwrap();

    assert_eq!(user.name, "Wanjiku Kamau");
    assert!(state.session().is_authenticated());
    assert_eq!(access_token(&state).as_deref(), Some("access-1"));
    assert_eq!(state.auth().current_user().map(|u| u.id), Some(user.id));
}

#[tokio::test]
async fn test_login_with_wrong_password() {
    let stub = StubBackend::start().await.unwrap();
    let state = stub.app_state().unwrap();

    let result = state.auth().login(CUSTOMER_EMAIL, "not-the-password").await;

    assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    assert!(!state.session().is_authenticated());
}

#[tokio::test]
async fn test_register_logs_in() {
    let stub = StubBackend::start().await.unwrap();
    let state = stub.app_state().unwrap();
    let form = RegisterForm {
        name: "Baraka Mwangi".to_string(),
        email: "baraka@example.com".to_string(),
        phone: "0798765432".to_string(),
        password: "mandazi-na-chai".to_string(),
        password_confirmation: "mandazi-na-chai".to_string(),
    };

    let user = state.auth().register(&form).await.unwrap();

    assert_eq!(user.email.as_str(), "baraka@example.com");
    assert!(state.session().is_authenticated());
    assert_eq!(stub.data().user.phone.as_deref(), Some("254798765432"));
}

#[tokio::test]
async fn test_logout_keeps_cart() {
    let stub = StubBackend::start().await.unwrap();
    let state = stub.logged_in_state().await.unwrap();
    let lantern = state.api().get_product(ProductId::new(1)).await.unwrap();
    state.cart().await.add(&lantern, 2).unwrap();

    state.auth().logout().unwrap();

    assert!(!state.session().is_authenticated());
    assert_eq!(state.cart().await.cart().item_count(), 2);
}

// =============================================================================
// Token Refresh
// =============================================================================

#[tokio::test]
async fn test_expired_token_is_refreshed_and_request_retried() {
    let stub = StubBackend::start().await.unwrap();
    let state = stub.logged_in_state().await.unwrap();
    stub.expire_access_tokens();

    let user = state.auth().refresh_profile().await.unwrap();

    assert_eq!(user.email.as_str(), CUSTOMER_EMAIL);
    assert_eq!(stub.calls().refresh, 1);
    assert_eq!(access_token(&state).as_deref(), Some("access-2"));
    let refresh = state.session().refresh_token().unwrap();
    assert_eq!(refresh.expose_secret(), "refresh-2");
}

#[tokio::test]
async fn test_concurrent_expiry_refreshes_once() {
    let stub = StubBackend::start().await.unwrap();
    let state = stub.logged_in_state().await.unwrap();
    stub.expire_access_tokens();

    let (me, addresses) = tokio::join!(state.api().me(), state.api().list_addresses());

    assert!(me.is_ok());
    assert_eq!(addresses.unwrap().len(), 2);
    assert_eq!(stub.calls().refresh, 1);
}

#[tokio::test]
async fn test_refresh_endpoint_is_a_single_public_call() {
    let stub = StubBackend::start().await.unwrap();
    let state = stub.logged_in_state().await.unwrap();

    let tokens = state.api().refresh_tokens("refresh-1").await.unwrap();
    assert_eq!(tokens.token, "access-2");

    let result = state.api().refresh_tokens("refresh-unknown").await;

    assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    assert_eq!(stub.calls().refresh, 2);
    assert!(state.session().is_authenticated());
    assert_eq!(access_token(&state).as_deref(), Some("access-1"));
}

#[tokio::test]
async fn test_failed_refresh_clears_session() {
    let stub = StubBackend::start().await.unwrap();
    let state = stub.logged_in_state().await.unwrap();
    let lantern = state.api().get_product(ProductId::new(1)).await.unwrap();
    state.cart().await.add(&lantern, 1).unwrap();
    stub.expire_access_tokens();
    stub.data().refresh_enabled = false;

    let result = state.api().my_orders().await;

    assert!(matches!(result, Err(ApiError::SessionExpired)));
    assert!(!state.session().is_authenticated());
    assert!(state.session().refresh_token().is_none());
    assert_eq!(state.cart().await.cart().item_count(), 1);
}

#[tokio::test]
async fn test_rejected_retry_clears_session() {
    let stub = StubBackend::start().await.unwrap();
    let state = stub.logged_in_state().await.unwrap();
    stub.expire_access_tokens();
    stub.data().refreshed_tokens_expire = true;

    let result = state.auth().refresh_profile().await;

    assert!(matches!(
        result,
        Err(AuthError::Api(ApiError::SessionExpired))
    ));
    assert_eq!(stub.calls().refresh, 1);
    assert!(!state.session().is_authenticated());
}

#[tokio::test]
async fn test_invalid_token_is_not_refreshed() {
    let stub = StubBackend::start().await.unwrap();
    let state = stub.logged_in_state().await.unwrap();
    stub.data().access_tokens.clear();

    let result = state.api().me().await;

    assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    assert_eq!(stub.calls().refresh, 0);
}

#[tokio::test]
async fn test_authenticated_call_without_session() {
    let stub = StubBackend::start().await.unwrap();
    let state = stub.app_state().unwrap();

    let result = state.api().my_orders().await;

    assert!(matches!(result, Err(ApiError::Unauthorized(_))));
}
