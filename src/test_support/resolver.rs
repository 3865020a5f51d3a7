use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::auth::api::Auth;
use crate::auth::error::{AuthError, AuthResult};
use crate::auth::oauth::OAuthProvider;
use crate::auth::popup_redirect::{
    AuthEventManager, AuthEventType, AuthPopup, EventManagerRegistry, PopupRedirectResolver,
    PopupWindow,
};

/// Popup window whose closed flag is flipped by the test.
#[derive(Default)]
pub struct TestWindow {
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl TestWindow {
    /// Simulates the user closing the window.
    pub fn set_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl PopupWindow for TestWindow {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// In-process resolver: records launches and lets tests inject events and failures.
pub struct MockResolver {
    registry: EventManagerRegistry,
    popups: Mutex<Vec<(String, Arc<TestWindow>)>>,
    redirects: Mutex<Vec<(AuthEventType, Option<String>)>>,
    web_storage_supported: AtomicBool,
    initialize_error: Mutex<Option<AuthError>>,
    open_popup_error: Mutex<Option<AuthError>>,
    validate_origin_error: Mutex<Option<AuthError>>,
}

impl Default for MockResolver {
    fn default() -> Self {
        Self {
            registry: EventManagerRegistry::new(),
            popups: Mutex::new(Vec::new()),
            redirects: Mutex::new(Vec::new()),
            web_storage_supported: AtomicBool::new(true),
            initialize_error: Mutex::new(None),
            open_popup_error: Mutex::new(None),
            validate_origin_error: Mutex::new(None),
        }
    }
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The event manager of `auth`, created on first use.
    pub async fn event_manager(&self, auth: &Arc<Auth>) -> Arc<AuthEventManager> {
        self.registry
            .get_or_init(auth, || async { Ok(Arc::new(AuthEventManager::new())) })
            .await
            .expect("event manager setup cannot fail")
    }

    /// Event id and window of the most recently opened popup.
    pub fn last_popup(&self) -> Option<(String, Arc<TestWindow>)> {
        self.popups.lock().unwrap().last().cloned()
    }

    pub fn popup_count(&self) -> usize {
        self.popups.lock().unwrap().len()
    }

    pub fn redirects(&self) -> Vec<(AuthEventType, Option<String>)> {
        self.redirects.lock().unwrap().clone()
    }

    pub fn set_web_storage_supported(&self, supported: bool) {
        self.web_storage_supported.store(supported, Ordering::SeqCst);
    }

    pub fn fail_initialize(&self, error: AuthError) {
        *self.initialize_error.lock().unwrap() = Some(error);
    }

    pub fn fail_open_popup(&self, error: AuthError) {
        *self.open_popup_error.lock().unwrap() = Some(error);
    }

    pub fn fail_validate_origin(&self, error: AuthError) {
        *self.validate_origin_error.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl PopupRedirectResolver for MockResolver {
    async fn initialize(&self, auth: &Arc<Auth>) -> AuthResult<Arc<AuthEventManager>> {
        let failure = self.initialize_error.lock().unwrap().clone();
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(self.event_manager(auth).await)
    }

    async fn open_popup(
        &self,
        _auth: &Arc<Auth>,
        _provider: &OAuthProvider,
        _event_type: AuthEventType,
        event_id: Option<&str>,
    ) -> AuthResult<AuthPopup> {
        let failure = self.open_popup_error.lock().unwrap().clone();
        if let Some(error) = failure {
            return Err(error);
        }

        let window = Arc::new(TestWindow::default());
        self.popups
            .lock()
            .unwrap()
            .push((event_id.unwrap_or_default().to_string(), window.clone()));
        let handle: Arc<dyn PopupWindow> = window;
        let mut popup = AuthPopup::new(Some(handle));
        popup.associated_event = event_id.map(str::to_string);
        Ok(popup)
    }

    async fn open_redirect(
        &self,
        _auth: &Arc<Auth>,
        _provider: &OAuthProvider,
        event_type: AuthEventType,
        event_id: Option<&str>,
    ) -> AuthResult<()> {
        self.redirects
            .lock()
            .unwrap()
            .push((event_type, event_id.map(str::to_string)));
        Ok(())
    }

    fn is_iframe_web_storage_supported(
        &self,
        _auth: &Arc<Auth>,
        callback: Box<dyn FnOnce(bool) + Send>,
    ) {
        callback(self.web_storage_supported.load(Ordering::SeqCst));
    }

    async fn validate_origin(&self, _auth: &Arc<Auth>) -> AuthResult<()> {
        match self.validate_origin_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
