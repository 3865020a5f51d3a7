use std::sync::{Arc, Mutex};

use async_lock::OnceCell;
use serde_json::Value;

pub mod backend;
pub mod idp;
pub mod token;

pub use backend::{AuthBackend, RestBackend};

use crate::auth::config::{AuthConfig, AuthSettings};
use crate::auth::error::{AuthError, AuthErrorCode, AuthResult};
use crate::auth::model::User;
use crate::auth::persistence::{
    persistence_key, AuthPersistence, InMemoryPersistence, AUTH_USER_KEY_PREFIX,
    PENDING_REDIRECT_KEY_PREFIX, REDIRECT_USER_KEY_PREFIX,
};
use crate::auth::popup_redirect::PopupRedirectResolver;

/// One auth instance: configuration, collaborators and the signed-in user.
pub struct Auth {
    config: AuthConfig,
    settings: AuthSettings,
    backend: Arc<dyn AuthBackend>,
    persistence: Arc<dyn AuthPersistence>,
    redirect_persistence: Arc<dyn AuthPersistence>,
    resolver: Option<Arc<dyn PopupRedirectResolver>>,
    current_user: Mutex<Option<Arc<User>>>,
    redirect_user: Mutex<Option<Arc<User>>>,
    initialized: OnceCell<()>,
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("key", &self.key())
            .field("current_user", &self.current_user())
            .finish()
    }
}

impl Auth {
    pub fn builder(config: AuthConfig) -> AuthBuilder {
        AuthBuilder::new(config)
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn backend(&self) -> &dyn AuthBackend {
        self.backend.as_ref()
    }

    /// Identifies this instance in persistence and in process-wide caches.
    pub fn key(&self) -> String {
        format!(
            "{}:{}",
            self.config.api_key.as_deref().unwrap_or_default(),
            self.config.app_name
        )
    }

    pub fn resolver(&self) -> Option<Arc<dyn PopupRedirectResolver>> {
        self.resolver.clone()
    }

    /// Picks the explicit resolver, else the configured one.
    pub(crate) fn resolve_resolver(
        &self,
        explicit: Option<Arc<dyn PopupRedirectResolver>>,
    ) -> AuthResult<Arc<dyn PopupRedirectResolver>> {
        explicit.or_else(|| self.resolver()).ok_or_else(|| {
            AuthError::with_message(
                AuthErrorCode::ArgumentError,
                "No popup/redirect resolver was provided or configured",
            )
        })
    }

    /// Restores the persisted current and redirect users. Runs once per instance.
    ///
    /// A user already set in memory wins over the persisted copy.
    pub async fn initialize(self: &Arc<Self>) -> AuthResult<()> {
        self.initialized
            .get_or_try_init(|| async { self.restore_from_persistence() })
            .await
            .map(|_| ())
    }

    pub fn current_user(&self) -> Option<Arc<User>> {
        self.current_user.lock().unwrap().clone()
    }

    /// Replaces the signed-in user and writes it through to persistence.
    pub fn update_current_user(&self, user: Option<Arc<User>>) -> AuthResult<()> {
        let key = persistence_key(AUTH_USER_KEY_PREFIX, &self.key());
        match &user {
            Some(user) => self.persistence.set(&key, user.to_json())?,
            None => self.persistence.remove(&key)?,
        }
        *self.current_user.lock().unwrap() = user;
        Ok(())
    }

    /// Signs the current user out and drops any pending link/reauth redirect user.
    pub fn sign_out(&self) -> AuthResult<()> {
        self.set_redirect_user(None)?;
        self.update_current_user(None)
    }

    /// Re-persists `user` when it is the signed-in user of this instance.
    pub fn persist_user_if_current(&self, user: &User) -> AuthResult<()> {
        let is_current = self
            .current_user()
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(&current), user));
        if is_current {
            let key = persistence_key(AUTH_USER_KEY_PREFIX, &self.key());
            self.persistence.set(&key, user.to_json())?;
        }
        Ok(())
    }

    pub fn redirect_user(&self) -> Option<Arc<User>> {
        self.redirect_user.lock().unwrap().clone()
    }

    /// Stores (or clears) the user that started a pending link/reauth redirect.
    pub fn set_redirect_user(&self, user: Option<Arc<User>>) -> AuthResult<()> {
        let key = persistence_key(REDIRECT_USER_KEY_PREFIX, &self.key());
        match &user {
            Some(user) => self.redirect_persistence.set(&key, user.to_json())?,
            None => self.redirect_persistence.remove(&key)?,
        }
        *self.redirect_user.lock().unwrap() = user;
        Ok(())
    }

    /// Records that a redirect flow was launched and its result is still to come.
    pub(crate) fn set_pending_redirect(&self) -> AuthResult<()> {
        let key = persistence_key(PENDING_REDIRECT_KEY_PREFIX, &self.key());
        self.redirect_persistence.set(&key, Value::from("true"))
    }

    /// Reads and clears the pending redirect flag.
    pub(crate) fn take_pending_redirect(&self) -> AuthResult<bool> {
        let key = persistence_key(PENDING_REDIRECT_KEY_PREFIX, &self.key());
        let pending = self
            .redirect_persistence
            .get(&key)?
            .is_some_and(|value| value.as_str() == Some("true"));
        self.redirect_persistence.remove(&key)?;
        Ok(pending)
    }

    /// Finds the user whose pending redirect carries `event_id`.
    pub fn redirect_user_for_id(&self, event_id: &str) -> Option<Arc<User>> {
        [self.current_user(), self.redirect_user()]
            .into_iter()
            .flatten()
            .find(|user| user.redirect_event_id().as_deref() == Some(event_id))
    }

    fn restore_from_persistence(self: &Arc<Self>) -> AuthResult<()> {
        let key = self.key();

        let current_key = persistence_key(AUTH_USER_KEY_PREFIX, &key);
        if let Some(value) = self.persistence.get(&current_key)? {
            match User::from_json(self, &value) {
                Ok(user) => {
                    self.current_user.lock().unwrap().get_or_insert(user);
                }
                Err(err) => {
                    log::warn!("discarding unreadable persisted user for {key}: {err}");
                    self.persistence.remove(&current_key)?;
                }
            }
        }

        let redirect_key = persistence_key(REDIRECT_USER_KEY_PREFIX, &key);
        if let Some(value) = self.redirect_persistence.get(&redirect_key)? {
            match User::from_json(self, &value) {
                Ok(user) => {
                    self.redirect_user.lock().unwrap().get_or_insert(user);
                }
                Err(err) => {
                    log::warn!("discarding unreadable redirect user for {key}: {err}");
                    self.redirect_persistence.remove(&redirect_key)?;
                }
            }
        }

        log::debug!("auth {key} initialized");
        Ok(())
    }
}

pub struct AuthBuilder {
    config: AuthConfig,
    settings: AuthSettings,
    backend: Option<Arc<dyn AuthBackend>>,
    persistence: Option<Arc<dyn AuthPersistence>>,
    redirect_persistence: Option<Arc<dyn AuthPersistence>>,
    resolver: Option<Arc<dyn PopupRedirectResolver>>,
}

impl AuthBuilder {
    fn new(config: AuthConfig) -> Self {
        Self {
            config,
            settings: AuthSettings::default(),
            backend: None,
            persistence: None,
            redirect_persistence: None,
            resolver: None,
        }
    }

    pub fn with_settings(mut self, settings: AuthSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn AuthBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn AuthPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Storage for the pending redirect user. Defaults to the main persistence.
    pub fn with_redirect_persistence(mut self, persistence: Arc<dyn AuthPersistence>) -> Self {
        self.redirect_persistence = Some(persistence);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn PopupRedirectResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Arc<Auth> {
        let settings = self.settings;
        let backend = self.backend.unwrap_or_else(|| {
            Arc::new(RestBackend::new(
                self.config.clone(),
                settings.network_timeout.get(settings.environment),
            ))
        });
        let persistence = self
            .persistence
            .unwrap_or_else(|| Arc::new(InMemoryPersistence::default()));
        let redirect_persistence = self
            .redirect_persistence
            .unwrap_or_else(|| persistence.clone());

        Arc::new(Auth {
            config: self.config,
            settings,
            backend,
            persistence,
            redirect_persistence,
            resolver: self.resolver,
            current_user: Mutex::new(None),
            redirect_user: Mutex::new(None),
            initialized: OnceCell::new(),
        })
    }
}
