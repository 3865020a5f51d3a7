use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;

use crate::auth::api::Auth;
use crate::auth::error::{AuthError, AuthErrorCode, AuthResult};
use crate::auth::model::{User, UserCredential};
use crate::auth::oauth::OAuthProvider;
use crate::auth::popup_redirect::{
    execute, generate_event_id, settle, AuthEventType, AuthPopup, Operation, OperationCore,
    PopupRedirectResolver,
};
use crate::platform::runtime::{sleep, spawn_detached};

use super::{assert_not_linked, auth_of};

/// The popup operation currently allowed to run. Starting another cancels it.
static CURRENT_POPUP: Mutex<Option<Weak<PopupOperation>>> = Mutex::new(None);

/// A sign-in, link or reauthentication completed in a popup window.
pub struct PopupOperation {
    core: OperationCore,
    provider: OAuthProvider,
    popup: Mutex<Option<AuthPopup>>,
}

impl PopupOperation {
    /// Creates the operation and makes it the current popup, cancelling the previous one.
    pub fn new(
        auth: Arc<Auth>,
        event_type: AuthEventType,
        provider: OAuthProvider,
        resolver: Arc<dyn PopupRedirectResolver>,
        user: Option<Arc<User>>,
    ) -> Arc<Self> {
        let operation = Arc::new(Self {
            core: OperationCore::new(auth, vec![event_type], resolver, user),
            provider,
            popup: Mutex::new(None),
        });

        let previous = CURRENT_POPUP
            .lock()
            .unwrap()
            .replace(Arc::downgrade(&operation));
        if let Some(previous) = previous.and_then(|weak| weak.upgrade()) {
            log::debug!("a new popup operation supersedes the pending one");
            previous.cancel();
        }

        operation
    }

    /// Rejects the operation with `cancelled-popup-request`.
    pub fn cancel(self: &Arc<Self>) {
        settle(self, Err(AuthError::new(AuthErrorCode::CancelledPopupRequest)));
    }

    pub async fn execute_not_null(self: Arc<Self>) -> AuthResult<UserCredential> {
        execute(self)
            .await?
            .ok_or_else(|| AuthError::internal("Popup operation resolved without a credential"))
    }

    fn window_closed(&self) -> bool {
        self.popup
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(AuthPopup::is_closed)
    }

    fn poll_user_cancellation(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let settings = *self.core.auth().settings();
        let interval = settings.popup_poll_interval.get(settings.environment);
        let grace = settings.popup_closed_grace;

        spawn_detached(async move {
            loop {
                let closed = match weak.upgrade() {
                    Some(operation) if !operation.core.is_settled() => operation.window_closed(),
                    _ => return,
                };

                if closed {
                    log::debug!("popup window closed, waiting for a late completion event");
                    sleep(grace).await;
                    if let Some(operation) = weak.upgrade() {
                        settle(&operation, Err(AuthError::new(AuthErrorCode::PopupClosedByUser)));
                    }
                    return;
                }

                sleep(interval).await;
            }
        });
    }
}

#[async_trait]
impl Operation for PopupOperation {
    fn core(&self) -> &OperationCore {
        &self.core
    }

    async fn on_execution(self: Arc<Self>) -> AuthResult<()> {
        let core = &self.core;
        let event_id = generate_event_id("");
        let event_type = core.filter()[0];

        let mut popup = core
            .resolver()
            .open_popup(core.auth(), &self.provider, event_type, Some(&event_id))
            .await?;
        popup.associated_event = Some(event_id);

        if core.is_settled() {
            popup.close();
            return Ok(());
        }
        *self.popup.lock().unwrap() = Some(popup);

        let weak = Arc::downgrade(&self);
        let resolver = core.resolver().clone();
        let auth = core.auth().clone();
        spawn_detached(async move {
            if let Err(err) = resolver.validate_origin(&auth).await {
                if let Some(operation) = weak.upgrade() {
                    settle(&operation, Err(err));
                }
            }
        });

        let weak = Arc::downgrade(&self);
        core.resolver().is_iframe_web_storage_supported(
            core.auth(),
            Box::new(move |supported| {
                if supported {
                    return;
                }
                if let Some(operation) = weak.upgrade() {
                    settle(&operation, Err(AuthError::new(AuthErrorCode::WebStorageUnsupported)));
                }
            }),
        );

        self.poll_user_cancellation();
        Ok(())
    }

    fn clean_up(&self) {
        if let Some(popup) = self.popup.lock().unwrap().take() {
            popup.close();
        }

        let mut current = CURRENT_POPUP.lock().unwrap();
        if current
            .as_ref()
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), self))
        {
            *current = None;
        }
    }

    fn expected_event_id(&self) -> Option<String> {
        self.popup
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|popup| popup.associated_event.clone())
    }
}

/// Signs in through a provider popup.
pub async fn sign_in_with_popup(
    auth: &Arc<Auth>,
    provider: &OAuthProvider,
    resolver: Option<Arc<dyn PopupRedirectResolver>>,
) -> AuthResult<UserCredential> {
    auth.initialize().await?;
    let resolver = auth.resolve_resolver(resolver)?;
    PopupOperation::new(
        auth.clone(),
        AuthEventType::SignInViaPopup,
        provider.clone(),
        resolver,
        None,
    )
    .execute_not_null()
    .await
}

/// Links the provider account chosen in a popup to `user`.
pub async fn link_with_popup(
    user: &Arc<User>,
    provider: &OAuthProvider,
    resolver: Option<Arc<dyn PopupRedirectResolver>>,
) -> AuthResult<UserCredential> {
    let auth = auth_of(user)?;
    auth.initialize().await?;
    let resolver = auth.resolve_resolver(resolver)?;
    assert_not_linked(user, provider.provider_id())?;

    PopupOperation::new(
        auth,
        AuthEventType::LinkViaPopup,
        provider.clone(),
        resolver,
        Some(user.clone()),
    )
    .execute_not_null()
    .await
}

/// Reauthenticates `user` through a provider popup.
pub async fn reauthenticate_with_popup(
    user: &Arc<User>,
    provider: &OAuthProvider,
    resolver: Option<Arc<dyn PopupRedirectResolver>>,
) -> AuthResult<UserCredential> {
    let auth = auth_of(user)?;
    auth.initialize().await?;
    let resolver = auth.resolve_resolver(resolver)?;

    PopupOperation::new(
        auth,
        AuthEventType::ReauthViaPopup,
        provider.clone(),
        resolver,
        Some(user.clone()),
    )
    .execute_not_null()
    .await
}
