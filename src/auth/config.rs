use std::time::Duration;

use crate::auth::api::token::DEFAULT_SECURE_TOKEN_ENDPOINT;
use crate::platform::{Delay, PlatformEnvironment};

pub const DEFAULT_IDENTITY_TOOLKIT_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_APP_NAME: &str = "[DEFAULT]";
pub const SDK_VERSION: &str = concat!("Rust/", env!("CARGO_PKG_VERSION"));

/// Project level configuration of one auth instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub api_key: Option<String>,
    pub app_name: String,
    pub auth_domain: Option<String>,
    pub tenant_id: Option<String>,
    pub sdk_version: String,
    pub identity_toolkit_endpoint: String,
    pub secure_token_endpoint: String,
}

impl AuthConfig {
    pub fn new(api_key: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    pub fn with_auth_domain(mut self, auth_domain: impl Into<String>) -> Self {
        self.auth_domain = Some(auth_domain.into());
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Points both REST endpoints at an alternate host (emulator, mock server).
    pub fn with_endpoints(
        mut self,
        identity_toolkit: impl Into<String>,
        secure_token: impl Into<String>,
    ) -> Self {
        self.identity_toolkit_endpoint = identity_toolkit.into();
        self.secure_token_endpoint = secure_token.into();
        self
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            app_name: DEFAULT_APP_NAME.to_string(),
            auth_domain: None,
            tenant_id: None,
            sdk_version: SDK_VERSION.to_string(),
            identity_toolkit_endpoint: DEFAULT_IDENTITY_TOOLKIT_ENDPOINT.to_string(),
            secure_token_endpoint: DEFAULT_SECURE_TOKEN_ENDPOINT.to_string(),
        }
    }
}

/// Timing knobs of the popup/redirect machinery and the REST client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthSettings {
    /// How often an open popup is checked for having been closed by the user.
    pub popup_poll_interval: Delay,
    /// Grace period after the popup closes, letting an in-flight completion event land.
    pub popup_closed_grace: Duration,
    /// Client side deadline of a single REST call.
    pub network_timeout: Delay,
    pub environment: PlatformEnvironment,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            popup_poll_interval: Delay::new(Duration::from_millis(2_000), Duration::from_millis(10_000)),
            popup_closed_grace: Duration::from_millis(2_000),
            network_timeout: Delay::new(Duration::from_millis(30_000), Duration::from_millis(60_000)),
            environment: PlatformEnvironment::detect(),
        }
    }
}
