use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub type AuthResult<T> = Result<T, AuthError>;

/// Custom key/value data attached to an [`AuthError`] (e.g. `appName`, `missingPlugin`).
pub type ErrorData = BTreeMap<String, String>;

const SERVICE: &str = "auth";
const SERVICE_NAME: &str = "Firebase";

/// Stable reason codes surfaced as `auth/<reason>` to calling code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthErrorCode {
    ArgumentError,
    AuthDomainConfigRequired,
    CancelledPopupRequest,
    CredentialAlreadyInUse,
    EmailAlreadyInUse,
    InternalError,
    InvalidApiKey,
    InvalidAuthEvent,
    InvalidCordovaConfiguration,
    InvalidCredential,
    InvalidUserToken,
    NetworkRequestFailed,
    NoAuthEvent,
    OperationNotAllowed,
    PopupBlocked,
    PopupClosedByUser,
    ProviderAlreadyLinked,
    RedirectCancelledByUser,
    RequiresRecentLogin,
    Timeout,
    TooManyRequests,
    UserDisabled,
    UserDeleted,
    UserMismatch,
    UserTokenExpired,
    WebStorageUnsupported,
    /// A reason the SDK has no dedicated variant for, kept verbatim.
    Other(String),
}

impl AuthErrorCode {
    /// Returns the kebab-case reason without the `auth/` prefix.
    pub fn as_str(&self) -> &str {
        match self {
            AuthErrorCode::ArgumentError => "argument-error",
            AuthErrorCode::AuthDomainConfigRequired => "auth-domain-config-required",
            AuthErrorCode::CancelledPopupRequest => "cancelled-popup-request",
            AuthErrorCode::CredentialAlreadyInUse => "credential-already-in-use",
            AuthErrorCode::EmailAlreadyInUse => "email-already-in-use",
            AuthErrorCode::InternalError => "internal-error",
            AuthErrorCode::InvalidApiKey => "invalid-api-key",
            AuthErrorCode::InvalidAuthEvent => "invalid-auth-event",
            AuthErrorCode::InvalidCordovaConfiguration => "invalid-cordova-configuration",
            AuthErrorCode::InvalidCredential => "invalid-credential",
            AuthErrorCode::InvalidUserToken => "invalid-user-token",
            AuthErrorCode::NetworkRequestFailed => "network-request-failed",
            AuthErrorCode::NoAuthEvent => "no-auth-event",
            AuthErrorCode::OperationNotAllowed => "operation-not-allowed",
            AuthErrorCode::PopupBlocked => "popup-blocked",
            AuthErrorCode::PopupClosedByUser => "popup-closed-by-user",
            AuthErrorCode::ProviderAlreadyLinked => "provider-already-linked",
            AuthErrorCode::RedirectCancelledByUser => "redirect-cancelled-by-user",
            AuthErrorCode::RequiresRecentLogin => "requires-recent-login",
            AuthErrorCode::Timeout => "timeout",
            AuthErrorCode::TooManyRequests => "too-many-requests",
            AuthErrorCode::UserDisabled => "user-disabled",
            AuthErrorCode::UserDeleted => "user-not-found",
            AuthErrorCode::UserMismatch => "user-mismatch",
            AuthErrorCode::UserTokenExpired => "user-token-expired",
            AuthErrorCode::WebStorageUnsupported => "web-storage-unsupported",
            AuthErrorCode::Other(reason) => reason,
        }
    }

    /// Parses a kebab-case reason (with or without the `auth/` prefix).
    pub fn from_reason(reason: &str) -> Self {
        let reason = reason.strip_prefix("auth/").unwrap_or(reason);
        KNOWN_CODES
            .iter()
            .find(|code| code.as_str() == reason)
            .cloned()
            .unwrap_or_else(|| AuthErrorCode::Other(reason.to_string()))
    }

    fn default_message(&self) -> &'static str {
        match self {
            AuthErrorCode::ArgumentError => "An invalid argument was supplied",
            AuthErrorCode::AuthDomainConfigRequired => {
                "Be sure to include authDomain when calling initializeApp()"
            }
            AuthErrorCode::CancelledPopupRequest => {
                "This operation has been cancelled due to another conflicting popup being opened"
            }
            AuthErrorCode::CredentialAlreadyInUse => {
                "This credential is already associated with a different user account"
            }
            AuthErrorCode::EmailAlreadyInUse => {
                "The email address is already in use by another account"
            }
            AuthErrorCode::InternalError => "An internal AuthError has occurred",
            AuthErrorCode::InvalidApiKey => "Your API key is invalid, please check you have copied it correctly",
            AuthErrorCode::InvalidAuthEvent => "An internal AuthError has occurred",
            AuthErrorCode::InvalidCordovaConfiguration => {
                "The following Cordova plugins must be installed to enable OAuth sign-in: {$missingPlugin}"
            }
            AuthErrorCode::InvalidCredential => {
                "The supplied auth credential is malformed or has expired"
            }
            AuthErrorCode::InvalidUserToken => {
                "This user's credential isn't valid for this project. This can happen if the user's token has been tampered with, or if the user isn't for the project associated with this API key"
            }
            AuthErrorCode::NetworkRequestFailed => {
                "A network AuthError (such as timeout, interrupted connection or unreachable host) has occurred"
            }
            AuthErrorCode::NoAuthEvent => "An internal AuthError has occurred",
            AuthErrorCode::OperationNotAllowed => {
                "The given sign-in provider is disabled for this Firebase project"
            }
            AuthErrorCode::PopupBlocked => {
                "Unable to establish a connection with the popup. It may have been blocked by the browser"
            }
            AuthErrorCode::PopupClosedByUser => {
                "The popup has been closed by the user before finalizing the operation"
            }
            AuthErrorCode::ProviderAlreadyLinked => {
                "User can only be linked to one identity for the given provider"
            }
            AuthErrorCode::RedirectCancelledByUser => {
                "The redirect operation has been cancelled by the user before finalizing"
            }
            AuthErrorCode::RequiresRecentLogin => {
                "This operation is sensitive and requires recent authentication. Log in again before retrying this request"
            }
            AuthErrorCode::Timeout => "The operation has timed out",
            AuthErrorCode::TooManyRequests => {
                "We have blocked all requests from this device due to unusual activity. Try again later"
            }
            AuthErrorCode::UserDisabled => {
                "The user account has been disabled by an administrator"
            }
            AuthErrorCode::UserDeleted => {
                "There is no user record corresponding to this identifier. The user may have been deleted"
            }
            AuthErrorCode::UserMismatch => {
                "The supplied credentials do not correspond to the previously signed in user"
            }
            AuthErrorCode::UserTokenExpired => {
                "The user's credential is no longer valid. The user must sign in again"
            }
            AuthErrorCode::WebStorageUnsupported => {
                "This browser is not supported or 3rd party cookies and data may be disabled"
            }
            AuthErrorCode::Other(_) => "Error",
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SERVICE}/{}", self.as_str())
    }
}

const KNOWN_CODES: &[AuthErrorCode] = &[
    AuthErrorCode::ArgumentError,
    AuthErrorCode::AuthDomainConfigRequired,
    AuthErrorCode::CancelledPopupRequest,
    AuthErrorCode::CredentialAlreadyInUse,
    AuthErrorCode::EmailAlreadyInUse,
    AuthErrorCode::InternalError,
    AuthErrorCode::InvalidApiKey,
    AuthErrorCode::InvalidAuthEvent,
    AuthErrorCode::InvalidCordovaConfiguration,
    AuthErrorCode::InvalidCredential,
    AuthErrorCode::InvalidUserToken,
    AuthErrorCode::NetworkRequestFailed,
    AuthErrorCode::NoAuthEvent,
    AuthErrorCode::OperationNotAllowed,
    AuthErrorCode::PopupBlocked,
    AuthErrorCode::PopupClosedByUser,
    AuthErrorCode::ProviderAlreadyLinked,
    AuthErrorCode::RedirectCancelledByUser,
    AuthErrorCode::RequiresRecentLogin,
    AuthErrorCode::Timeout,
    AuthErrorCode::TooManyRequests,
    AuthErrorCode::UserDisabled,
    AuthErrorCode::UserDeleted,
    AuthErrorCode::UserMismatch,
    AuthErrorCode::UserTokenExpired,
    AuthErrorCode::WebStorageUnsupported,
];

/// Backend error identifiers and the SDK reason they translate to.
const SERVER_ERROR_MAP: &[(&str, AuthErrorCode)] = &[
    ("API_KEY_INVALID", AuthErrorCode::InvalidApiKey),
    ("INVALID_API_KEY", AuthErrorCode::InvalidApiKey),
    ("CREDENTIAL_TOO_OLD_LOGIN_AGAIN", AuthErrorCode::RequiresRecentLogin),
    ("EMAIL_EXISTS", AuthErrorCode::EmailAlreadyInUse),
    ("FEDERATED_USER_ID_ALREADY_LINKED", AuthErrorCode::CredentialAlreadyInUse),
    ("INVALID_IDP_RESPONSE", AuthErrorCode::InvalidCredential),
    ("INVALID_PENDING_TOKEN", AuthErrorCode::InvalidCredential),
    ("INVALID_ID_TOKEN", AuthErrorCode::InvalidUserToken),
    ("INVALID_REFRESH_TOKEN", AuthErrorCode::InvalidUserToken),
    ("OPERATION_NOT_ALLOWED", AuthErrorCode::OperationNotAllowed),
    ("TOKEN_EXPIRED", AuthErrorCode::UserTokenExpired),
    ("TOO_MANY_ATTEMPTS_TRY_LATER", AuthErrorCode::TooManyRequests),
    ("USER_DISABLED", AuthErrorCode::UserDisabled),
    ("USER_NOT_FOUND", AuthErrorCode::UserDeleted),
];

/// Structured error surfaced by every failed auth operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    code: AuthErrorCode,
    message: String,
    custom_data: ErrorData,
}

impl AuthError {
    pub fn new(code: AuthErrorCode) -> Self {
        Self::with_data(code, ErrorData::new())
    }

    /// Builds an error whose message template placeholders (`{$key}`) are filled from `data`.
    pub fn with_data(code: AuthErrorCode, data: ErrorData) -> Self {
        let message = replace_template(code.default_message(), &data);
        Self {
            code,
            message,
            custom_data: data,
        }
    }

    /// Builds an error carrying a caller supplied message instead of the default one.
    pub fn with_message(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            custom_data: ErrorData::new(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_message(AuthErrorCode::InternalError, message)
    }

    /// Reports that a Cordova deployment is missing a native plugin.
    pub fn invalid_cordova_configuration(missing_plugin: impl Into<String>) -> Self {
        let mut data = ErrorData::new();
        data.insert("missingPlugin".to_string(), missing_plugin.into());
        Self::with_data(AuthErrorCode::InvalidCordovaConfiguration, data)
    }

    /// Translates the backend `error.message` string (`CODE` or `CODE : detail`).
    pub fn from_server_message(server_message: &str) -> Self {
        let (server_code, detail) = match server_message.split_once(" : ") {
            Some((code, detail)) => (code.trim(), Some(detail.trim())),
            None => (server_message.trim(), None),
        };

        let code = SERVER_ERROR_MAP
            .iter()
            .find(|(candidate, _)| *candidate == server_code)
            .map(|(_, code)| code.clone())
            .unwrap_or_else(|| {
                AuthErrorCode::Other(server_code.to_ascii_lowercase().replace('_', "-"))
            });

        match detail {
            Some(detail) if !detail.is_empty() => Self::with_message(code, detail),
            _ => Self::new(code),
        }
    }

    pub fn kind(&self) -> &AuthErrorCode {
        &self.code
    }

    /// Returns the full `auth/<reason>` code string.
    pub fn code(&self) -> String {
        self.code.to_string()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn custom_data(&self) -> &ErrorData {
        &self.custom_data
    }

    pub fn is(&self, code: &AuthErrorCode) -> bool {
        &self.code == code
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SERVICE_NAME}: {} ({}).", self.message, self.code)
    }
}

impl std::error::Error for AuthError {}

impl From<AuthErrorCode> for AuthError {
    fn from(code: AuthErrorCode) -> Self {
        AuthError::new(code)
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        AuthError::internal(error.to_string())
    }
}

/// Error payload carried by an auth event from the external flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEventError {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AuthEventError {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: None,
        }
    }
}

impl From<&AuthEventError> for AuthError {
    fn from(error: &AuthEventError) -> Self {
        match error.code.strip_prefix("auth/") {
            Some(reason) if !reason.is_empty() => {
                AuthError::new(AuthErrorCode::from_reason(reason))
            }
            _ => AuthError::new(AuthErrorCode::InternalError),
        }
    }
}

fn replace_template(template: &str, data: &ErrorData) -> String {
    let mut result = String::with_capacity(template.len());
    let mut remainder = template;

    while let Some(start) = remainder.find("{$") {
        let (head, tail) = remainder.split_at(start);
        result.push_str(head);
        if let Some(end) = tail.find('}') {
            let key = &tail[2..end];
            let value = data
                .get(key)
                .cloned()
                .unwrap_or_else(|| format!("<{key}?>"));
            result.push_str(&value);
            remainder = &tail[end + 1..];
        } else {
            result.push_str(tail);
            remainder = "";
            break;
        }
    }

    result.push_str(remainder);
    result
}
