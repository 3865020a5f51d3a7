use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::auth::api::idp::{IdTokenResponse, SignInWithIdpRequest};
use crate::auth::api::token::RefreshTokenResponse;
use crate::auth::api::AuthBackend;
use crate::auth::error::{AuthError, AuthResult};

/// Scripted [`AuthBackend`]: replies are queued up front and every request is recorded.
#[derive(Default)]
pub struct MockBackend {
    idp_replies: Mutex<VecDeque<AuthResult<IdTokenResponse>>>,
    refresh_replies: Mutex<VecDeque<AuthResult<RefreshTokenResponse>>>,
    idp_requests: Mutex<Vec<SignInWithIdpRequest>>,
    refresh_requests: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_idp_response(&self, response: IdTokenResponse) {
        self.idp_replies.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_idp_error(&self, error: AuthError) {
        self.idp_replies.lock().unwrap().push_back(Err(error));
    }

    pub fn push_refresh_response(&self, id_token: &str, refresh_token: &str, expires_in: &str) {
        self.refresh_replies
            .lock()
            .unwrap()
            .push_back(Ok(RefreshTokenResponse {
                access_token: Some(id_token.to_string()),
                refresh_token: refresh_token.to_string(),
                id_token: id_token.to_string(),
                expires_in: expires_in.to_string(),
                user_id: None,
            }));
    }

    pub fn push_refresh_error(&self, error: AuthError) {
        self.refresh_replies.lock().unwrap().push_back(Err(error));
    }

    pub fn idp_calls(&self) -> usize {
        self.idp_requests.lock().unwrap().len()
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_requests.lock().unwrap().len()
    }

    pub fn last_idp_request(&self) -> Option<SignInWithIdpRequest> {
        self.idp_requests.lock().unwrap().last().cloned()
    }

    pub fn last_refresh_token(&self) -> Option<String> {
        self.refresh_requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl AuthBackend for MockBackend {
    async fn sign_in_with_idp(&self, request: SignInWithIdpRequest) -> AuthResult<IdTokenResponse> {
        self.idp_requests.lock().unwrap().push(request);
        self.idp_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::internal("no scripted signInWithIdp reply")))
    }

    async fn refresh_token(&self, refresh_token: &str) -> AuthResult<RefreshTokenResponse> {
        self.refresh_requests
            .lock()
            .unwrap()
            .push(refresh_token.to_string());
        // Let concurrent callers pile up behind the single-flight guard.
        tokio::task::yield_now().await;
        self.refresh_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::internal("no scripted token refresh reply")))
    }
}
