use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::api::idp::IdTokenResponse;
use crate::auth::api::Auth;
use crate::auth::error::{AuthError, AuthResult};
use crate::auth::token_manager::StsTokenManager;
use crate::util::jwt::parse_token;

pub const FIREBASE_PROVIDER_ID: &str = "firebase";

/// Profile of a user as seen by one identity provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub uid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default, rename = "photoURL")]
    pub photo_url: Option<String>,
    pub provider_id: String,
}

/// How a [`UserCredential`] came to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationType {
    SignIn,
    Link,
    Reauthenticate,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::SignIn => "signIn",
            OperationType::Link => "link",
            OperationType::Reauthenticate => "reauthenticate",
        }
    }
}

/// Signed-in user bound to the auth instance that produced it.
pub struct User {
    auth: Weak<Auth>,
    uid: String,
    profile: Mutex<UserInfo>,
    provider_data: Mutex<Vec<UserInfo>>,
    token_manager: StsTokenManager,
    redirect_event_id: Mutex<Option<String>>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("uid", &self.uid)
            .field("provider_data", &self.provider_data())
            .field("redirect_event_id", &self.redirect_event_id())
            .finish()
    }
}

impl User {
    pub fn new(auth: &Arc<Auth>, uid: impl Into<String>, token_manager: StsTokenManager) -> Self {
        let uid = uid.into();
        Self {
            auth: Arc::downgrade(auth),
            profile: Mutex::new(UserInfo {
                uid: uid.clone(),
                provider_id: FIREBASE_PROVIDER_ID.to_string(),
                ..Default::default()
            }),
            uid,
            provider_data: Mutex::new(Vec::new()),
            token_manager,
            redirect_event_id: Mutex::new(None),
        }
    }

    /// Builds a user from a token-bearing sign-in response.
    pub fn from_id_token_response(
        auth: &Arc<Auth>,
        response: &IdTokenResponse,
    ) -> AuthResult<Arc<User>> {
        let token_manager = StsTokenManager::new();
        token_manager.update_from_server_response(response)?;

        let uid = response
            .local_id
            .clone()
            .or_else(|| {
                response
                    .id_token
                    .as_deref()
                    .and_then(parse_token)
                    .and_then(|token| token.sub)
            })
            .ok_or_else(|| AuthError::internal("Sign-in response is missing the user id"))?;

        let user = User::new(auth, uid, token_manager);
        user.apply_profile(response);
        Ok(Arc::new(user))
    }

    pub fn auth(&self) -> Option<Arc<Auth>> {
        self.auth.upgrade()
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn info(&self) -> UserInfo {
        self.profile.lock().unwrap().clone()
    }

    pub fn email(&self) -> Option<String> {
        self.profile.lock().unwrap().email.clone()
    }

    pub fn display_name(&self) -> Option<String> {
        self.profile.lock().unwrap().display_name.clone()
    }

    pub fn provider_data(&self) -> Vec<UserInfo> {
        self.provider_data.lock().unwrap().clone()
    }

    pub fn is_linked_to(&self, provider_id: &str) -> bool {
        self.provider_data
            .lock()
            .unwrap()
            .iter()
            .any(|info| info.provider_id == provider_id)
    }

    pub fn token_manager(&self) -> &StsTokenManager {
        &self.token_manager
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.token_manager.refresh_token()
    }

    /// Returns a fresh ID token, refreshing through the backend when stale or forced.
    ///
    /// A refreshed token is written back to persistence when this user is the
    /// current user of its auth instance.
    pub async fn get_id_token(&self, force_refresh: bool) -> AuthResult<String> {
        let auth = self
            .auth()
            .ok_or_else(|| AuthError::internal("User outlived its auth instance"))?;

        let token = self
            .token_manager
            .get_token(auth.backend(), force_refresh)
            .await?
            .ok_or_else(|| AuthError::internal("User has no ID token"))?;

        if token.was_refreshed {
            auth.persist_user_if_current(self)?;
        }

        Ok(token.token)
    }

    pub fn redirect_event_id(&self) -> Option<String> {
        self.redirect_event_id.lock().unwrap().clone()
    }

    pub(crate) fn set_redirect_event_id(&self, event_id: Option<String>) {
        *self.redirect_event_id.lock().unwrap() = event_id;
    }

    /// Applies the tokens and provider profile returned by a link call.
    pub(crate) fn update_from_id_token_response(&self, response: &IdTokenResponse) -> AuthResult<()> {
        self.token_manager.update_from_server_response(response)?;
        self.apply_profile(response);
        Ok(())
    }

    fn apply_profile(&self, response: &IdTokenResponse) {
        {
            let mut profile = self.profile.lock().unwrap();
            if response.email.is_some() {
                profile.email = response.email.clone();
            }
            if response.display_name.is_some() {
                profile.display_name = response.display_name.clone();
            }
            if response.photo_url.is_some() {
                profile.photo_url = response.photo_url.clone();
            }
        }

        if let Some(provider_id) = response.provider_id.as_deref() {
            let mut provider_data = self.provider_data.lock().unwrap();
            provider_data.retain(|info| info.provider_id != provider_id);
            provider_data.push(UserInfo {
                uid: response
                    .provider_user_id()
                    .unwrap_or_else(|| self.uid.clone()),
                display_name: response.display_name.clone(),
                email: response.email.clone(),
                phone_number: None,
                photo_url: response.photo_url.clone(),
                provider_id: provider_id.to_string(),
            });
        }
    }

    /// Persisted shape of the user, including its token state.
    pub fn to_json(&self) -> Value {
        let profile = self.info();
        json!({
            "uid": self.uid,
            "email": profile.email,
            "displayName": profile.display_name,
            "photoURL": profile.photo_url,
            "providerId": FIREBASE_PROVIDER_ID,
            "providerData": self.provider_data(),
            "stsTokenManager": self.token_manager.to_json(),
            "_redirectEventId": self.redirect_event_id(),
        })
    }

    /// Rebuilds a persisted user, rejecting documents with mistyped fields.
    pub fn from_json(auth: &Arc<Auth>, value: &Value) -> AuthResult<Arc<User>> {
        let app_name = auth.config().app_name.as_str();

        let uid = value
            .get("uid")
            .and_then(Value::as_str)
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| AuthError::internal("Persisted user is missing uid"))?;

        let token_manager = match value.get("stsTokenManager") {
            Some(tokens @ Value::Object(_)) => StsTokenManager::from_json(app_name, tokens)?,
            _ => return Err(AuthError::internal("Persisted user is missing token state")),
        };

        let optional_string = |field: &str| -> AuthResult<Option<String>> {
            match value.get(field) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(text)) => Ok(Some(text.clone())),
                Some(_) => Err(AuthError::internal(format!(
                    "Persisted user field {field} has the wrong type"
                ))),
            }
        };

        let user = User::new(auth, uid, token_manager);
        {
            let mut profile = user.profile.lock().unwrap();
            profile.email = optional_string("email")?;
            profile.display_name = optional_string("displayName")?;
            profile.photo_url = optional_string("photoURL")?;
        }
        user.set_redirect_event_id(optional_string("_redirectEventId")?);

        if let Some(provider_data) = value.get("providerData").filter(|data| !data.is_null()) {
            let provider_data: Vec<UserInfo> = serde_json::from_value(provider_data.clone())?;
            *user.provider_data.lock().unwrap() = provider_data;
        }

        Ok(Arc::new(user))
    }
}

/// Outcome of a successful sign-in, link or reauthentication.
#[derive(Clone, Debug)]
pub struct UserCredential {
    pub user: Arc<User>,
    pub provider_id: Option<String>,
    pub operation_type: OperationType,
    pub is_new_user: Option<bool>,
}

impl UserCredential {
    pub(crate) fn from_response(
        user: Arc<User>,
        operation_type: OperationType,
        response: &IdTokenResponse,
    ) -> Self {
        Self {
            user,
            provider_id: response.provider_id.clone(),
            operation_type,
            is_new_user: response.is_new_user,
        }
    }
}
