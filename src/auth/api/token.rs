use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_SECURE_TOKEN_ENDPOINT: &str =
    "https://securetoken.googleapis.com/v1/token";

#[derive(Debug, Serialize)]
pub(crate) struct RefreshTokenRequest<'a> {
    pub grant_type: &'static str,
    pub refresh_token: &'a str,
}

impl<'a> RefreshTokenRequest<'a> {
    pub fn new(refresh_token: &'a str) -> Self {
        Self {
            grant_type: "refresh_token",
            refresh_token,
        }
    }
}

/// Response of the Secure Token refresh endpoint.
///
/// The endpoint speaks snake_case; `id_token` is what the token manager calls
/// the access token.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RefreshTokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: String,
    pub id_token: String,
    pub expires_in: String,
    pub user_id: Option<String>,
}
