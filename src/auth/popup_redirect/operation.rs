use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::channel::oneshot;

use crate::auth::api::Auth;
use crate::auth::error::{AuthError, AuthResult};
use crate::auth::model::{User, UserCredential};
use crate::auth::popup_redirect::event::{AuthEvent, AuthEventType};
use crate::auth::popup_redirect::event_manager::{AuthEventConsumer, AuthEventManager};
use crate::auth::popup_redirect::idp::{self, IdpTaskParams};
use crate::auth::popup_redirect::resolver::PopupRedirectResolver;
use crate::platform::runtime::spawn_detached;

/// What an operation settles with. `Ok(None)` means there was nothing to resolve.
pub type OperationOutcome = AuthResult<Option<UserCredential>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationState {
    Created,
    AwaitingResolverInit,
    Launched,
    AwaitingEvent,
    Resolved,
    Rejected,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Resolved | OperationState::Rejected)
    }
}

/// State shared by every popup/redirect operation.
///
/// The pending result is a oneshot channel; the sender is taken by the first
/// settlement, so later events and errors have no effect.
pub struct OperationCore {
    auth: Arc<Auth>,
    filter: Vec<AuthEventType>,
    resolver: Arc<dyn PopupRedirectResolver>,
    user: Option<Arc<User>>,
    state: Mutex<OperationState>,
    sender: Mutex<Option<oneshot::Sender<OperationOutcome>>>,
    receiver: Mutex<Option<oneshot::Receiver<OperationOutcome>>>,
    event_manager: Mutex<Option<Arc<AuthEventManager>>>,
}

impl OperationCore {
    pub fn new(
        auth: Arc<Auth>,
        filter: Vec<AuthEventType>,
        resolver: Arc<dyn PopupRedirectResolver>,
        user: Option<Arc<User>>,
    ) -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            auth,
            filter,
            resolver,
            user,
            state: Mutex::new(OperationState::Created),
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            event_manager: Mutex::new(None),
        }
    }

    pub fn auth(&self) -> &Arc<Auth> {
        &self.auth
    }

    pub fn filter(&self) -> &[AuthEventType] {
        &self.filter
    }

    pub fn resolver(&self) -> &Arc<dyn PopupRedirectResolver> {
        &self.resolver
    }

    pub fn user(&self) -> Option<Arc<User>> {
        self.user.clone()
    }

    pub fn state(&self) -> OperationState {
        *self.state.lock().unwrap()
    }

    pub fn is_settled(&self) -> bool {
        self.sender.lock().unwrap().is_none()
    }

    fn advance(&self, next: OperationState) {
        let mut state = self.state.lock().unwrap();
        if !state.is_terminal() {
            log::debug!("auth operation {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    /// Runs the credential task matching the event type, on behalf of `user`.
    pub async fn resolve_event(
        &self,
        event: AuthEvent,
        user: Option<Arc<User>>,
    ) -> OperationOutcome {
        if let Some(error) = &event.error {
            return Err(AuthError::from(error));
        }

        let request_uri = event
            .url_response
            .clone()
            .ok_or_else(|| AuthError::internal("Auth event is missing its url response"))?;

        let params = IdpTaskParams {
            auth: self.auth.clone(),
            request_uri,
            session_id: event.session_id,
            post_body: event.post_body,
            tenant_id: event.tenant_id,
            pending_token: None,
            user,
        };

        let credential = match event.event_type {
            AuthEventType::SignInViaPopup | AuthEventType::SignInViaRedirect => {
                idp::sign_in(params).await?
            }
            AuthEventType::LinkViaPopup | AuthEventType::LinkViaRedirect => {
                idp::link(params).await?
            }
            AuthEventType::ReauthViaPopup | AuthEventType::ReauthViaRedirect => {
                idp::reauthenticate(params).await?
            }
            other => {
                return Err(AuthError::internal(format!(
                    "Unexpected auth event type {}",
                    other.as_str()
                )))
            }
        };
        Ok(Some(credential))
    }
}

/// One "launch an external flow and wait for its outcome" attempt.
///
/// Implementors provide the platform specific launch and cleanup; [`execute`]
/// drives the shared state machine and every implementor is an
/// [`AuthEventConsumer`].
#[async_trait]
pub trait Operation: Send + Sync + 'static {
    fn core(&self) -> &OperationCore;

    /// Starts the external flow.
    async fn on_execution(self: Arc<Self>) -> AuthResult<()>;

    /// Releases launch resources. Runs once, on settlement.
    fn clean_up(&self);

    /// Correlation id this operation accepts; `None` accepts any.
    fn expected_event_id(&self) -> Option<String>;

    async fn handle_event(self: Arc<Self>, event: AuthEvent) -> OperationOutcome {
        let user = self.core().user();
        self.core().resolve_event(event, user).await
    }
}

/// Runs `operation` and waits for its single outcome.
pub async fn execute<O: Operation>(operation: Arc<O>) -> OperationOutcome {
    let receiver = operation.core().receiver.lock().unwrap().take();
    let Some(receiver) = receiver else {
        return Err(AuthError::internal("Auth operation was already executed"));
    };
    let _guard = SettleOnDrop(operation.clone());

    if !operation.core().is_settled() {
        if let Err(err) = launch(&operation).await {
            settle(&operation, Err(err));
        }
    }

    receiver
        .await
        .unwrap_or_else(|_| Err(AuthError::internal("Auth operation ended without an outcome")))
}

/// Settles the operation if the caller stops waiting before an outcome arrived,
/// so it does not stay registered with the event manager.
struct SettleOnDrop<O: Operation>(Arc<O>);

impl<O: Operation> Drop for SettleOnDrop<O> {
    fn drop(&mut self) {
        if !self.0.core().is_settled() {
            log::debug!("auth operation dropped while waiting");
            settle(&self.0, Err(AuthError::internal("Auth operation was dropped")));
        }
    }
}

async fn launch<O: Operation>(operation: &Arc<O>) -> AuthResult<()> {
    let core = operation.core();
    core.advance(OperationState::AwaitingResolverInit);
    let manager = core.resolver.initialize(&core.auth).await?;
    *core.event_manager.lock().unwrap() = Some(manager.clone());

    core.advance(OperationState::Launched);
    operation.clone().on_execution().await?;
    if core.is_settled() {
        return Ok(());
    }

    core.advance(OperationState::AwaitingEvent);
    let consumer: Arc<dyn AuthEventConsumer> = operation.clone();
    manager.register_consumer(consumer.clone());
    if core.is_settled() {
        manager.unregister_consumer(&consumer);
    }
    Ok(())
}

/// Settles `operation` once: unregisters it, cleans up, then publishes `outcome`.
pub fn settle<O: Operation>(operation: &Arc<O>, outcome: OperationOutcome) {
    let core = operation.core();
    let Some(sender) = core.sender.lock().unwrap().take() else {
        return;
    };

    core.advance(match &outcome {
        Ok(_) => OperationState::Resolved,
        Err(_) => OperationState::Rejected,
    });

    let manager = core.event_manager.lock().unwrap().clone();
    if let Some(manager) = manager {
        let consumer: Arc<dyn AuthEventConsumer> = operation.clone();
        manager.unregister_consumer(&consumer);
    }
    operation.clean_up();

    if let Err(err) = &outcome {
        log::debug!("auth operation rejected: {err}");
    }
    let _ = sender.send(outcome);
}

impl<O: Operation> AuthEventConsumer for O {
    fn filter(&self) -> &[AuthEventType] {
        self.core().filter()
    }

    fn event_id(&self) -> Option<String> {
        self.expected_event_id()
    }

    fn on_auth_event(self: Arc<Self>, event: AuthEvent) {
        if self.core().is_settled() {
            return;
        }
        spawn_detached(async move {
            let outcome = self.clone().handle_event(event).await;
            settle(&self, outcome);
        });
    }

    fn on_error(self: Arc<Self>, error: AuthError) {
        settle(&self, Err(error));
    }
}
