use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_lock::Mutex as AsyncMutex;
use serde_json::{json, Value};

use crate::auth::api::idp::IdTokenResponse;
use crate::auth::api::AuthBackend;
use crate::auth::error::{AuthError, AuthErrorCode, AuthResult, ErrorData};
use crate::util::jwt::token_expires_in;
use crate::util::time::now_millis;

/// Tokens are treated as expired this long before their actual expiry.
pub const TOKEN_REFRESH_BUFFER_MS: i64 = 30_000;

/// Plain copy of the three fields the manager tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSnapshot {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Epoch milliseconds.
    pub expiration_time: Option<i64>,
}

/// Result of [`StsTokenManager::get_token`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    /// True when the token came from a refresh rather than the cache.
    pub was_refreshed: bool,
}

/// Owns the access/refresh token pair of one user session.
///
/// Refreshes are single-flight: callers that arrive while a refresh is in
/// progress wait for it and reuse its result instead of issuing their own.
#[derive(Debug, Default)]
pub struct StsTokenManager {
    state: Mutex<TokenSnapshot>,
    refresh_guard: AsyncMutex<()>,
    generation: AtomicU64,
}

impl StsTokenManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: TokenSnapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
            ..Default::default()
        }
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        self.state.lock().unwrap().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.lock().unwrap().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.state.lock().unwrap().refresh_token.clone()
    }

    pub fn expiration_time(&self) -> Option<i64> {
        self.state.lock().unwrap().expiration_time
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    /// True when there is no expiration time or `now` is inside the refresh buffer.
    pub fn is_expired_at(&self, now: i64) -> bool {
        match self.expiration_time() {
            Some(expiration) => now > expiration - TOKEN_REFRESH_BUFFER_MS,
            None => true,
        }
    }

    /// Overwrites all three fields from a token-bearing backend response.
    pub fn update_from_server_response(&self, response: &IdTokenResponse) -> AuthResult<()> {
        let id_token = response
            .id_token
            .clone()
            .ok_or_else(|| AuthError::internal("Server response is missing idToken"))?;
        let refresh_token = response
            .refresh_token
            .clone()
            .ok_or_else(|| AuthError::internal("Server response is missing refreshToken"))?;

        let expires_in = match response.expires_in.as_deref() {
            Some(value) => parse_expires_in(value)?,
            None => token_expires_in(&id_token).ok_or_else(|| {
                AuthError::internal("Unable to derive token lifetime from idToken")
            })?,
        };

        self.update_tokens_and_expiration(Some(id_token), Some(refresh_token), expires_in);
        Ok(())
    }

    /// Returns a usable access token, refreshing it when stale or when forced.
    ///
    /// `Ok(None)` means there is no session at all. An access token without a
    /// refresh token is terminal and fails with `user-token-expired`.
    pub async fn get_token(
        &self,
        backend: &dyn AuthBackend,
        force_refresh: bool,
    ) -> AuthResult<Option<AccessToken>> {
        let observed_generation = self.generation.load(Ordering::SeqCst);
        let current = self.snapshot();

        if current.access_token.is_some() && current.refresh_token.is_none() {
            return Err(AuthError::new(AuthErrorCode::UserTokenExpired));
        }

        if !force_refresh && !self.is_expired() {
            if let Some(token) = current.access_token {
                return Ok(Some(AccessToken {
                    token,
                    was_refreshed: false,
                }));
            }
        }

        if current.refresh_token.is_none() {
            return Ok(None);
        }

        let _singleflight = self.refresh_guard.lock().await;

        if self.generation.load(Ordering::SeqCst) != observed_generation {
            if let Some(token) = self.access_token() {
                log::debug!("reusing token refreshed by a concurrent caller");
                return Ok(Some(AccessToken {
                    token,
                    was_refreshed: true,
                }));
            }
        }

        let Some(refresh_token) = self.refresh_token() else {
            return Ok(None);
        };

        log::debug!("refreshing access token (forced: {force_refresh})");
        let response = backend.refresh_token(&refresh_token).await?;
        let expires_in = parse_expires_in(&response.expires_in)?;
        self.update_tokens_and_expiration(
            Some(response.id_token.clone()),
            Some(response.refresh_token),
            expires_in,
        );

        Ok(Some(AccessToken {
            token: response.id_token,
            was_refreshed: true,
        }))
    }

    pub fn clear_refresh_token(&self) {
        self.state.lock().unwrap().refresh_token = None;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Copies another manager's state into this one.
    pub fn assign(&self, other: &StsTokenManager) {
        let snapshot = other.snapshot();
        *self.state.lock().unwrap() = snapshot;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn to_json(&self) -> Value {
        let state = self.snapshot();
        json!({
            "refreshToken": state.refresh_token,
            "accessToken": state.access_token,
            "expirationTime": state.expiration_time,
        })
    }

    /// Rebuilds a manager from its persisted shape, rejecting mistyped fields.
    pub fn from_json(app_name: &str, value: &Value) -> AuthResult<Self> {
        let invalid = |field: &str| {
            let mut data = ErrorData::new();
            data.insert("appName".to_string(), app_name.to_string());
            data.insert("field".to_string(), field.to_string());
            AuthError::with_data(AuthErrorCode::InternalError, data)
        };

        let string_field = |field: &str| -> AuthResult<Option<String>> {
            match value.get(field) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(text)) => Ok(Some(text.clone())),
                Some(_) => Err(invalid(field)),
            }
        };

        let refresh_token = string_field("refreshToken")?;
        let access_token = string_field("accessToken")?;
        let expiration_time = match value.get("expirationTime") {
            None | Some(Value::Null) => None,
            Some(Value::Number(number)) => Some(
                number
                    .as_i64()
                    .or_else(|| number.as_f64().map(|v| v as i64))
                    .ok_or_else(|| invalid("expirationTime"))?,
            ),
            Some(_) => return Err(invalid("expirationTime")),
        };

        Ok(Self::from_snapshot(TokenSnapshot {
            access_token,
            refresh_token,
            expiration_time,
        }))
    }

    fn update_tokens_and_expiration(
        &self,
        access_token: Option<String>,
        refresh_token: Option<String>,
        expires_in_secs: i64,
    ) {
        {
            let mut state = self.state.lock().unwrap();
            state.access_token = access_token;
            state.refresh_token = refresh_token;
            state.expiration_time = Some(now_millis() + expires_in_secs * 1_000);
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

fn parse_expires_in(value: &str) -> AuthResult<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|err| AuthError::internal(format!("Invalid expiresIn value: {err}")))
}
