use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::auth::error::{AuthEventError, AuthErrorCode};

/// Kind of external flow an [`AuthEvent`] reports on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthEventType {
    #[serde(rename = "signInViaPopup")]
    SignInViaPopup,
    #[serde(rename = "signInViaRedirect")]
    SignInViaRedirect,
    #[serde(rename = "linkViaPopup")]
    LinkViaPopup,
    #[serde(rename = "linkViaRedirect")]
    LinkViaRedirect,
    #[serde(rename = "reauthViaPopup")]
    ReauthViaPopup,
    #[serde(rename = "reauthViaRedirect")]
    ReauthViaRedirect,
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "verifyApp")]
    VerifyApp,
}

impl AuthEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEventType::SignInViaPopup => "signInViaPopup",
            AuthEventType::SignInViaRedirect => "signInViaRedirect",
            AuthEventType::LinkViaPopup => "linkViaPopup",
            AuthEventType::LinkViaRedirect => "linkViaRedirect",
            AuthEventType::ReauthViaPopup => "reauthViaPopup",
            AuthEventType::ReauthViaRedirect => "reauthViaRedirect",
            AuthEventType::Unknown => "unknown",
            AuthEventType::VerifyApp => "verifyApp",
        }
    }

    /// Redirect completions may arrive before anyone listens, so they are held for replay.
    pub fn is_redirect_family(&self) -> bool {
        matches!(
            self,
            AuthEventType::SignInViaRedirect
                | AuthEventType::LinkViaRedirect
                | AuthEventType::ReauthViaRedirect
                | AuthEventType::Unknown
        )
    }
}

/// Outcome of an external auth flow, as delivered by platform glue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthEvent {
    #[serde(rename = "type")]
    pub event_type: AuthEventType,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub url_response: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub post_body: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub error: Option<AuthEventError>,
}

impl AuthEvent {
    pub fn new(event_type: AuthEventType) -> Self {
        Self {
            event_type,
            event_id: None,
            url_response: None,
            session_id: None,
            post_body: None,
            tenant_id: None,
            error: None,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn with_url_response(mut self, url_response: impl Into<String>) -> Self {
        self.url_response = Some(url_response.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_post_body(mut self, post_body: impl Into<String>) -> Self {
        self.post_body = Some(post_body.into());
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_error(mut self, error: AuthEventError) -> Self {
        self.error = Some(error);
        self
    }

    /// The event sent when a page load finds no pending redirect outcome.
    pub fn null_redirect() -> Self {
        Self::new(AuthEventType::Unknown).with_error(AuthEventError::new(format!(
            "auth/{}",
            AuthErrorCode::NoAuthEvent.as_str()
        )))
    }

    pub fn is_null_redirect(&self) -> bool {
        self.event_type == AuthEventType::Unknown
            && self
                .error
                .as_ref()
                .and_then(|error| error.code.strip_prefix("auth/"))
                .is_some_and(|reason| reason == AuthErrorCode::NoAuthEvent.as_str())
    }

    /// Identity used for de-duplication: `type-eventId-sessionId-tenantId`, empty parts omitted.
    pub fn uid(&self) -> String {
        [
            Some(self.event_type.as_str()),
            self.event_id.as_deref(),
            self.session_id.as_deref(),
            self.tenant_id.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
    }
}

/// Appends ten random decimal digits to `prefix`.
pub fn generate_event_id(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let digits: String = (0..10)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect();
    format!("{prefix}{digits}")
}
