use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use async_lock::OnceCell;
use async_trait::async_trait;
use url::Url;

use crate::auth::api::Auth;
use crate::auth::error::{AuthError, AuthErrorCode, AuthResult};
use crate::auth::oauth::OAuthProvider;
use crate::auth::popup_redirect::event::{AuthEvent, AuthEventType};
use crate::auth::popup_redirect::event_manager::AuthEventManager;

const AUTH_HANDLER_PATH: &str = "__/auth/handler";

/// Handle to a window the platform opened for a popup flow.
pub trait PopupWindow: Send + Sync {
    fn is_closed(&self) -> bool;
    fn close(&self);
}

/// A launched popup flow: the window (if the platform exposes one) and the
/// event id the completion event will carry.
#[derive(Clone, Default)]
pub struct AuthPopup {
    pub window: Option<Arc<dyn PopupWindow>>,
    pub associated_event: Option<String>,
}

impl AuthPopup {
    pub fn new(window: Option<Arc<dyn PopupWindow>>) -> Self {
        Self {
            window,
            associated_event: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.window.as_ref().is_some_and(|window| window.is_closed())
    }

    pub fn close(&self) {
        if let Some(window) = &self.window {
            window.close();
        }
    }
}

impl std::fmt::Debug for AuthPopup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthPopup")
            .field("has_window", &self.window.is_some())
            .field("associated_event", &self.associated_event)
            .finish()
    }
}

/// Platform side of popup and redirect flows.
///
/// The resolver opens windows, starts redirects and feeds completion events
/// into the [`AuthEventManager`] it hands out from [`initialize`](Self::initialize).
#[async_trait]
pub trait PopupRedirectResolver: Send + Sync {
    /// Returns the event manager of `auth`, running platform setup only once per instance.
    async fn initialize(&self, auth: &Arc<Auth>) -> AuthResult<Arc<AuthEventManager>>;

    async fn open_popup(
        &self,
        auth: &Arc<Auth>,
        provider: &OAuthProvider,
        event_type: AuthEventType,
        event_id: Option<&str>,
    ) -> AuthResult<AuthPopup>;

    /// Starts a redirect. Completion is reported after the app comes back.
    async fn open_redirect(
        &self,
        auth: &Arc<Auth>,
        provider: &OAuthProvider,
        event_type: AuthEventType,
        event_id: Option<&str>,
    ) -> AuthResult<()>;

    /// Reports through `callback` whether the embedded handler can use web storage.
    fn is_iframe_web_storage_supported(
        &self,
        auth: &Arc<Auth>,
        callback: Box<dyn FnOnce(bool) + Send>,
    );

    async fn validate_origin(&self, _auth: &Arc<Auth>) -> AuthResult<()> {
        Ok(())
    }
}

/// Memoizes one [`AuthEventManager`] per auth instance key.
#[derive(Default)]
pub struct EventManagerRegistry {
    managers: Mutex<HashMap<String, Arc<OnceCell<Arc<AuthEventManager>>>>>,
}

impl EventManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the manager for `auth`, running `setup` only for the first caller.
    ///
    /// A failed setup is not memoized; the next caller retries it.
    pub async fn get_or_init<F, Fut>(
        &self,
        auth: &Auth,
        setup: F,
    ) -> AuthResult<Arc<AuthEventManager>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AuthResult<Arc<AuthEventManager>>>,
    {
        let cell = self
            .managers
            .lock()
            .unwrap()
            .entry(auth.key())
            .or_default()
            .clone();
        cell.get_or_try_init(setup).await.cloned()
    }

    pub fn get(&self, auth: &Auth) -> Option<Arc<AuthEventManager>> {
        self.managers
            .lock()
            .unwrap()
            .get(&auth.key())
            .and_then(|cell| cell.get().cloned())
    }
}

/// Builds the URL of the hosted auth handler page that runs the provider flow.
pub fn auth_handler_url(
    auth: &Auth,
    provider: &OAuthProvider,
    event_type: AuthEventType,
    redirect_url: Option<&str>,
    event_id: Option<&str>,
) -> AuthResult<String> {
    let config = auth.config();
    let auth_domain = config
        .auth_domain
        .as_deref()
        .filter(|domain| !domain.is_empty())
        .ok_or_else(|| AuthError::new(AuthErrorCode::AuthDomainConfigRequired))?;
    let api_key = config
        .api_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| AuthError::new(AuthErrorCode::InvalidApiKey))?;

    let mut url = Url::parse(&format!("https://{auth_domain}/{AUTH_HANDLER_PATH}")).map_err(|err| {
        AuthError::with_message(
            AuthErrorCode::AuthDomainConfigRequired,
            format!("Invalid auth domain {auth_domain}: {err}"),
        )
    })?;

    let custom_parameters = if provider.custom_parameters().is_empty() {
        None
    } else {
        Some(serde_json::to_string(provider.custom_parameters())?)
    };
    let scopes = provider.scopes().join(",");

    {
        let mut query = url.query_pairs_mut();
        let params = [
            ("apiKey", Some(api_key)),
            ("appName", Some(config.app_name.as_str())),
            ("authType", Some(event_type.as_str())),
            ("redirectUrl", redirect_url),
            ("v", Some(config.sdk_version.as_str())),
            ("eventId", event_id),
            ("providerId", Some(provider.provider_id())),
            ("hl", provider.language_code()),
            ("customParameters", custom_parameters.as_deref()),
            ("scopes", Some(scopes.as_str())),
            ("tid", config.tenant_id.as_deref()),
        ];
        for (name, value) in params {
            if let Some(value) = value.filter(|value| !value.is_empty()) {
                query.append_pair(name, value);
            }
        }
    }

    Ok(url.into())
}

/// What a platform must provide to run popup and redirect flows.
#[async_trait]
pub trait AuthFlowLauncher: Send + Sync {
    /// Opens `url` in a new window. `Ok(None)` means the platform blocked it.
    async fn open_window(&self, url: &str) -> AuthResult<Option<Arc<dyn PopupWindow>>>;

    /// Leaves the app for `url`.
    async fn navigate(&self, url: &str) -> AuthResult<()>;

    /// Where the handler should send the user back to after a redirect.
    fn redirect_url(&self) -> Option<String> {
        None
    }

    fn web_storage_supported(&self) -> bool {
        true
    }
}

/// [`PopupRedirectResolver`] built on an [`AuthFlowLauncher`].
///
/// Platform glue (deep link handler, message listener) pushes completion
/// events through [`handle_incoming_event`](Self::handle_incoming_event).
pub struct LauncherResolver {
    launcher: Arc<dyn AuthFlowLauncher>,
    registry: EventManagerRegistry,
}

impl LauncherResolver {
    pub fn new(launcher: Arc<dyn AuthFlowLauncher>) -> Self {
        Self {
            launcher,
            registry: EventManagerRegistry::new(),
        }
    }

    /// Delivers an event from the platform to the operations of `auth`.
    pub async fn handle_incoming_event(
        &self,
        auth: &Arc<Auth>,
        event: AuthEvent,
    ) -> AuthResult<bool> {
        let manager = self.initialize(auth).await?;
        Ok(manager.on_event(event))
    }
}

#[async_trait]
impl PopupRedirectResolver for LauncherResolver {
    async fn initialize(&self, auth: &Arc<Auth>) -> AuthResult<Arc<AuthEventManager>> {
        self.registry
            .get_or_init(auth, || async move {
                log::debug!("creating event manager for {}", auth.key());
                Ok(Arc::new(AuthEventManager::new()))
            })
            .await
    }

    async fn open_popup(
        &self,
        auth: &Arc<Auth>,
        provider: &OAuthProvider,
        event_type: AuthEventType,
        event_id: Option<&str>,
    ) -> AuthResult<AuthPopup> {
        self.initialize(auth).await?;
        let url = auth_handler_url(auth, provider, event_type, None, event_id)?;
        let window = self
            .launcher
            .open_window(&url)
            .await?
            .ok_or_else(|| AuthError::new(AuthErrorCode::PopupBlocked))?;

        let mut popup = AuthPopup::new(Some(window));
        popup.associated_event = event_id.map(str::to_string);
        Ok(popup)
    }

    async fn open_redirect(
        &self,
        auth: &Arc<Auth>,
        provider: &OAuthProvider,
        event_type: AuthEventType,
        event_id: Option<&str>,
    ) -> AuthResult<()> {
        self.initialize(auth).await?;
        let redirect_url = self.launcher.redirect_url();
        let url = auth_handler_url(auth, provider, event_type, redirect_url.as_deref(), event_id)?;
        self.launcher.navigate(&url).await
    }

    fn is_iframe_web_storage_supported(
        &self,
        _auth: &Arc<Auth>,
        callback: Box<dyn FnOnce(bool) + Send>,
    ) {
        callback(self.launcher.web_storage_supported());
    }
}
