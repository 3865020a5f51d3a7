use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::auth::api::idp::{IdTokenResponse, SignInWithIdpRequest};
use crate::auth::api::token::{RefreshTokenRequest, RefreshTokenResponse};
use crate::auth::config::AuthConfig;
use crate::auth::error::{AuthError, AuthErrorCode, AuthResult};

/// The identity backend as seen by the flow coordinator.
///
/// Every call either yields the decoded response or an [`AuthError`] whose
/// code has already been translated from the server's error identifier.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_in_with_idp(&self, request: SignInWithIdpRequest) -> AuthResult<IdTokenResponse>;

    async fn refresh_token(&self, refresh_token: &str) -> AuthResult<RefreshTokenResponse>;
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// [`AuthBackend`] talking to the Identity Toolkit and Secure Token REST APIs.
#[derive(Debug, Clone)]
pub struct RestBackend {
    client: Client,
    config: AuthConfig,
    timeout: Duration,
}

impl RestBackend {
    pub fn new(config: AuthConfig, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            config,
            timeout,
        }
    }

    fn api_key(&self) -> AuthResult<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| AuthError::new(AuthErrorCode::InvalidApiKey))
    }

    async fn execute<T>(&self, request: RequestBuilder) -> AuthResult<T>
    where
        T: DeserializeOwned,
    {
        let response = with_timeout(request, self.timeout)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|err| {
                AuthError::internal(format!("Failed to decode backend response: {err}"))
            });
        }

        let body = response.text().await.unwrap_or_else(|_| "{}".to_string());
        Err(map_server_error(status.as_u16(), &body))
    }
}

#[async_trait]
impl AuthBackend for RestBackend {
    async fn sign_in_with_idp(
        &self,
        mut request: SignInWithIdpRequest,
    ) -> AuthResult<IdTokenResponse> {
        if request.tenant_id.is_none() {
            request.tenant_id = self.config.tenant_id.clone();
        }
        let url = format!(
            "{}/accounts:signInWithIdp?key={}",
            self.config.identity_toolkit_endpoint.trim_end_matches('/'),
            self.api_key()?
        );
        log::debug!("calling signInWithIdp for app {}", self.config.app_name);
        self.execute(self.client.post(url).json(&request)).await
    }

    async fn refresh_token(&self, refresh_token: &str) -> AuthResult<RefreshTokenResponse> {
        let url = format!(
            "{}?key={}",
            self.config.secure_token_endpoint,
            self.api_key()?
        );
        let form = RefreshTokenRequest::new(refresh_token);
        log::debug!("refreshing ID token for app {}", self.config.app_name);
        self.execute(self.client.post(url).form(&form)).await
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn with_timeout(request: RequestBuilder, timeout: Duration) -> RequestBuilder {
    request.timeout(timeout)
}

#[cfg(target_arch = "wasm32")]
fn with_timeout(request: RequestBuilder, _timeout: Duration) -> RequestBuilder {
    request
}

fn map_transport_error(error: reqwest::Error) -> AuthError {
    if error.is_timeout() {
        AuthError::new(AuthErrorCode::Timeout)
    } else {
        log::debug!("backend transport failure: {error}");
        AuthError::new(AuthErrorCode::NetworkRequestFailed)
    }
}

fn map_server_error(status: u16, body: &str) -> AuthError {
    if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) {
        if let Some(message) = parsed.error.and_then(|error| error.message) {
            return AuthError::from_server_message(&message);
        }
    }

    AuthError::internal(format!("Unexpected backend response (HTTP {status})"))
}
