use serde::{Deserialize, Serialize};

/// Body of the `accounts:signInWithIdp` Identity Toolkit call.
#[derive(Debug, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignInWithIdpRequest {
    pub request_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_token: Option<String>,
    pub return_idp_credential: bool,
    pub return_secure_token: bool,
    /// Present when linking: the backend attaches the IdP to this user instead of creating one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// `Some(false)` on reauthentication so the backend never creates an account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_create: Option<bool>,
}

impl SignInWithIdpRequest {
    pub fn new(request_uri: impl Into<String>) -> Self {
        Self {
            request_uri: request_uri.into(),
            return_idp_credential: true,
            return_secure_token: true,
            ..Default::default()
        }
    }
}

/// Token-bearing response returned by `signInWithIdp` (and any other sign-in call).
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdTokenResponse {
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds, encoded as a decimal string by the backend.
    pub expires_in: Option<String>,
    pub local_id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub provider_id: Option<String>,
    pub is_new_user: Option<bool>,
    pub oauth_access_token: Option<String>,
    pub oauth_id_token: Option<String>,
    pub raw_user_info: Option<String>,
    pub federated_id: Option<String>,
    pub tenant_id: Option<String>,
}

impl IdTokenResponse {
    /// Account id at the identity provider, as opposed to the Firebase uid.
    ///
    /// Read from the `id` (or `sub`) of the raw user info, else from the last
    /// segment of the federated id.
    pub fn provider_user_id(&self) -> Option<String> {
        let raw_id = self
            .raw_user_info
            .as_deref()
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
            .and_then(|info| {
                ["id", "sub"].iter().find_map(|field| match info.get(*field)? {
                    serde_json::Value::String(id) => Some(id.clone()),
                    serde_json::Value::Number(id) => Some(id.to_string()),
                    _ => None,
                })
            });
        raw_id.or_else(|| {
            self.federated_id
                .as_deref()
                .and_then(|id| id.trim_end_matches('/').rsplit('/').next())
                .filter(|id| !id.is_empty())
                .map(str::to_string)
        })
    }
}
