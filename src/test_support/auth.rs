use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::json;

use crate::auth::api::idp::IdTokenResponse;
use crate::auth::api::{Auth, AuthBuilder};
use crate::auth::config::AuthConfig;
use crate::auth::model::User;
use crate::auth::popup_redirect::PopupRedirectResolver;

use super::backend::MockBackend;

static NEXT_APP: AtomicUsize = AtomicUsize::new(0);

/// A config whose auth key no other test shares.
pub fn unique_config() -> AuthConfig {
    let id = NEXT_APP.fetch_add(1, Ordering::SeqCst);
    AuthConfig::new("test-api-key", format!("test-app-{id}")).with_auth_domain("test.firebaseapp.com")
}

pub fn test_auth_builder(backend: Arc<MockBackend>) -> AuthBuilder {
    Auth::builder(unique_config()).with_backend(backend)
}

pub fn test_auth() -> Arc<Auth> {
    test_auth_builder(Arc::new(MockBackend::new())).build()
}

pub fn test_auth_with_config(config: AuthConfig) -> Arc<Auth> {
    Auth::builder(config)
        .with_backend(Arc::new(MockBackend::new()))
        .build()
}

pub fn test_auth_with_backend(backend: Arc<MockBackend>) -> Arc<Auth> {
    test_auth_builder(backend).build()
}

pub fn test_auth_with_resolver(
    backend: Arc<MockBackend>,
    resolver: Arc<dyn PopupRedirectResolver>,
) -> Arc<Auth> {
    test_auth_builder(backend).with_resolver(resolver).build()
}

/// An unsigned JWT for `uid`, issued now and valid for `lifetime_secs`.
pub fn id_token_for(uid: &str, lifetime_secs: i64) -> String {
    let issued_at = chrono::Utc::now().timestamp();
    let header = URL_SAFE_NO_PAD.encode(json!({"alg": "none", "typ": "JWT"}).to_string());
    let payload = URL_SAFE_NO_PAD.encode(
        json!({
            "sub": uid,
            "iat": issued_at,
            "exp": issued_at + lifetime_secs,
            "firebase": {"sign_in_provider": "custom"},
        })
        .to_string(),
    );
    format!("{header}.{payload}.signature")
}

/// Signs `uid` in on `auth` with fresh tokens and refresh token `refresh-<uid>`.
pub fn signed_in_user(auth: &Arc<Auth>, uid: &str) -> Arc<User> {
    let user = User::from_id_token_response(
        auth,
        &IdTokenResponse {
            id_token: Some(id_token_for(uid, 3600)),
            refresh_token: Some(format!("refresh-{uid}")),
            expires_in: Some("3600".into()),
            local_id: Some(uid.into()),
            ..Default::default()
        },
    )
    .expect("valid sign-in response");
    auth.update_current_user(Some(user.clone()))
        .expect("in-memory persistence");
    user
}
