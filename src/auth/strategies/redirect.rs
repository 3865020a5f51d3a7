use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

use async_lock::OnceCell;
use async_trait::async_trait;

use crate::auth::api::Auth;
use crate::auth::error::AuthResult;
use crate::auth::model::{User, UserCredential};
use crate::auth::oauth::OAuthProvider;
use crate::auth::popup_redirect::{
    execute, generate_event_id, AuthEvent, AuthEventType, Operation, OperationCore,
    OperationOutcome, PopupRedirectResolver,
};
use crate::platform::runtime::spawn_detached;

use super::{assert_not_linked, auth_of};

const REDIRECT_FILTER: [AuthEventType; 4] = [
    AuthEventType::SignInViaRedirect,
    AuthEventType::LinkViaRedirect,
    AuthEventType::ReauthViaRedirect,
    AuthEventType::Unknown,
];

/// The redirect wait of one auth instance and the outcome it settled with.
#[derive(Default)]
struct RedirectOutcome {
    started: AtomicBool,
    outcome: OnceCell<OperationOutcome>,
}

/// Redirect outcome per auth key. Every later lookup replays the first outcome.
static REDIRECT_OUTCOMES: LazyLock<Mutex<HashMap<String, Arc<RedirectOutcome>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Forgets every memoized redirect outcome.
pub fn clear_redirect_outcomes() {
    REDIRECT_OUTCOMES.lock().unwrap().clear();
}

/// Waits for the outcome of a redirect started before the app was (re)loaded.
///
/// The event id is unknown up front, so the action accepts any redirect
/// event and finds the link/reauth user through the id stamped on it.
pub struct RedirectAction {
    core: OperationCore,
}

impl RedirectAction {
    pub fn new(auth: Arc<Auth>, resolver: Arc<dyn PopupRedirectResolver>) -> Arc<Self> {
        Arc::new(Self {
            core: OperationCore::new(auth, REDIRECT_FILTER.to_vec(), resolver, None),
        })
    }
}

#[async_trait]
impl Operation for RedirectAction {
    fn core(&self) -> &OperationCore {
        &self.core
    }

    async fn on_execution(self: Arc<Self>) -> AuthResult<()> {
        Ok(())
    }

    fn clean_up(&self) {}

    fn expected_event_id(&self) -> Option<String> {
        None
    }

    async fn handle_event(self: Arc<Self>, event: AuthEvent) -> OperationOutcome {
        match event.event_type {
            AuthEventType::SignInViaRedirect => self.core.resolve_event(event, None).await,
            AuthEventType::Unknown => Ok(None),
            _ => {
                let user = event
                    .event_id
                    .as_deref()
                    .and_then(|event_id| self.core.auth().redirect_user_for_id(event_id));
                match user {
                    Some(user) => self.core.resolve_event(event, Some(user)).await,
                    None => {
                        log::debug!("redirect event matches no pending user");
                        Ok(None)
                    }
                }
            }
        }
    }
}

/// Returns the credential of the redirect flow that brought the app back, if any.
///
/// Resolves to `None` right away when no redirect was started. Otherwise the
/// first call per auth instance starts the wait for the redirect outcome and
/// every call, later ones included, observes that same outcome. The wait runs
/// in the background, so dropping a caller does not abandon it.
pub async fn get_redirect_result(
    auth: &Arc<Auth>,
    resolver: Option<Arc<dyn PopupRedirectResolver>>,
) -> AuthResult<Option<UserCredential>> {
    auth.initialize().await?;
    let resolver = auth.resolve_resolver(resolver)?;

    let memo = REDIRECT_OUTCOMES
        .lock()
        .unwrap()
        .entry(auth.key())
        .or_default()
        .clone();
    if !memo.started.swap(true, Ordering::SeqCst) {
        let auth = auth.clone();
        let memo = memo.clone();
        spawn_detached(async move {
            let outcome = wait_for_redirect(auth, resolver).await;
            let _ = memo.outcome.set(outcome).await;
        });
    }
    let outcome = memo.outcome.wait().await.clone()?;

    if let Some(credential) = &outcome {
        credential.user.set_redirect_event_id(None);
        auth.persist_user_if_current(&credential.user)?;
        auth.set_redirect_user(None)?;
    }
    Ok(outcome)
}

async fn wait_for_redirect(
    auth: Arc<Auth>,
    resolver: Arc<dyn PopupRedirectResolver>,
) -> OperationOutcome {
    if !auth.take_pending_redirect()? {
        log::debug!("no redirect pending for {}", auth.key());
        return Ok(None);
    }
    execute(RedirectAction::new(auth, resolver)).await
}

/// Leaves the app to sign in with `provider`. The result is read with [`get_redirect_result`].
pub async fn sign_in_with_redirect(
    auth: &Arc<Auth>,
    provider: &OAuthProvider,
    resolver: Option<Arc<dyn PopupRedirectResolver>>,
) -> AuthResult<()> {
    auth.initialize().await?;
    let resolver = auth.resolve_resolver(resolver)?;
    auth.set_pending_redirect()?;
    resolver
        .open_redirect(auth, provider, AuthEventType::SignInViaRedirect, None)
        .await
}

/// Leaves the app to link `provider` to `user`.
pub async fn link_with_redirect(
    user: &Arc<User>,
    provider: &OAuthProvider,
    resolver: Option<Arc<dyn PopupRedirectResolver>>,
) -> AuthResult<()> {
    let auth = auth_of(user)?;
    auth.initialize().await?;
    let resolver = auth.resolve_resolver(resolver)?;
    assert_not_linked(user, provider.provider_id())?;
    auth.set_pending_redirect()?;

    let event_id = prepare_user_for_redirect(&auth, user)?;
    resolver
        .open_redirect(&auth, provider, AuthEventType::LinkViaRedirect, Some(&event_id))
        .await
}

/// Leaves the app to reauthenticate `user` with `provider`.
pub async fn reauthenticate_with_redirect(
    user: &Arc<User>,
    provider: &OAuthProvider,
    resolver: Option<Arc<dyn PopupRedirectResolver>>,
) -> AuthResult<()> {
    let auth = auth_of(user)?;
    auth.initialize().await?;
    let resolver = auth.resolve_resolver(resolver)?;
    auth.set_pending_redirect()?;

    let event_id = prepare_user_for_redirect(&auth, user)?;
    resolver
        .open_redirect(&auth, provider, AuthEventType::ReauthViaRedirect, Some(&event_id))
        .await
}

/// Stamps `user` with a fresh event id and persists it so the flow survives a reload.
fn prepare_user_for_redirect(auth: &Auth, user: &Arc<User>) -> AuthResult<String> {
    let event_id = generate_event_id(&format!("{}:::", user.uid()));
    user.set_redirect_event_id(Some(event_id.clone()));
    auth.set_redirect_user(Some(user.clone()))?;
    auth.persist_user_if_current(user)?;
    Ok(event_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::api::idp::IdTokenResponse;
    use crate::auth::config::AuthConfig;
    use crate::auth::error::AuthEventError;
    use crate::auth::model::OperationType;
    use crate::auth::persistence::{
        persistence_key, AuthPersistence, InMemoryPersistence, PENDING_REDIRECT_KEY_PREFIX,
        REDIRECT_USER_KEY_PREFIX,
    };
    use std::time::Duration;
    use crate::test_support::{
        id_token_for, serial_guard, signed_in_user, test_auth_builder, test_auth_with_resolver,
        unique_config, MockBackend, MockResolver,
    };

    fn idp_response(uid: &str) -> IdTokenResponse {
        IdTokenResponse {
            id_token: Some(id_token_for(uid, 3600)),
            refresh_token: Some(format!("refresh-{uid}")),
            expires_in: Some("3600".into()),
            local_id: Some(uid.into()),
            provider_id: Some("github.com".into()),
            ..Default::default()
        }
    }

    fn redirect_completion(event_type: AuthEventType, event_id: &str) -> AuthEvent {
        AuthEvent::new(event_type)
            .with_event_id(event_id)
            .with_url_response("https://app/?code=1")
            .with_session_id("session")
    }

    fn reloaded_auth(
        config: AuthConfig,
        backend: Arc<MockBackend>,
        persistence: Arc<InMemoryPersistence>,
        resolver: Arc<MockResolver>,
    ) -> Arc<Auth> {
        Auth::builder(config)
            .with_backend(backend)
            .with_persistence(persistence)
            .with_resolver(resolver)
            .build()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn repeated_lookups_replay_the_first_outcome() {
        let _serial = serial_guard().await;
        let backend = Arc::new(MockBackend::new());
        backend.push_idp_response(idp_response("uid"));
        let resolver = Arc::new(MockResolver::new());
        let auth = test_auth_with_resolver(backend.clone(), resolver.clone());
        auth.set_pending_redirect().unwrap();

        let manager = resolver.event_manager(&auth).await;
        assert!(manager.on_event(redirect_completion(AuthEventType::SignInViaRedirect, "e")));

        let first = get_redirect_result(&auth, None).await.unwrap().unwrap();
        let second = get_redirect_result(&auth, None).await.unwrap().unwrap();

        assert_eq!(first.operation_type, OperationType::SignIn);
        assert!(Arc::ptr_eq(&first.user, &second.user));
        assert_eq!(backend.idp_calls(), 1);
        assert_eq!(manager.consumer_count(), 0);
        assert_eq!(auth.current_user().unwrap().uid(), "uid");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn null_redirect_event_resolves_to_none() {
        let _serial = serial_guard().await;
        let backend = Arc::new(MockBackend::new());
        let resolver = Arc::new(MockResolver::new());
        let auth = test_auth_with_resolver(backend.clone(), resolver.clone());
        auth.set_pending_redirect().unwrap();

        let manager = resolver.event_manager(&auth).await;
        manager.on_event(AuthEvent::null_redirect());

        assert!(get_redirect_result(&auth, None).await.unwrap().is_none());
        assert!(get_redirect_result(&auth, None).await.unwrap().is_none());
        assert_eq!(backend.idp_calls(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn redirect_errors_are_memoized_too() {
        let _serial = serial_guard().await;
        let resolver = Arc::new(MockResolver::new());
        let auth = test_auth_with_resolver(Arc::new(MockBackend::new()), resolver.clone());
        auth.set_pending_redirect().unwrap();

        let manager = resolver.event_manager(&auth).await;
        manager.on_event(
            AuthEvent::new(AuthEventType::SignInViaRedirect)
                .with_event_id("e")
                .with_error(AuthEventError::new("auth/redirect-cancelled-by-user")),
        );

        let first = get_redirect_result(&auth, None).await.unwrap_err();
        let second = get_redirect_result(&auth, None).await.unwrap_err();
        assert_eq!(first.code(), "auth/redirect-cancelled-by-user");
        assert_eq!(first, second);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn waits_for_a_late_event() {
        let _serial = serial_guard().await;
        let backend = Arc::new(MockBackend::new());
        backend.push_idp_response(idp_response("late"));
        let resolver = Arc::new(MockResolver::new());
        let auth = test_auth_with_resolver(backend, resolver.clone());
        auth.set_pending_redirect().unwrap();

        let task_auth = auth.clone();
        let pending = tokio::spawn(async move { get_redirect_result(&task_auth, None).await });
        let manager = resolver.event_manager(&auth).await;
        for _ in 0..100 {
            if manager.consumer_count() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }

        manager.on_event(redirect_completion(AuthEventType::SignInViaRedirect, "late"));
        let credential = pending.await.unwrap().unwrap().unwrap();
        assert_eq!(credential.user.uid(), "late");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn link_redirect_survives_a_reload() {
        let _serial = serial_guard().await;
        let config = unique_config();
        let backend = Arc::new(MockBackend::new());
        let persistence = Arc::new(InMemoryPersistence::new());

        let before = reloaded_auth(
            config.clone(),
            backend.clone(),
            persistence.clone(),
            Arc::new(MockResolver::new()),
        );
        let user = signed_in_user(&before, "linker");
        let launching = Arc::new(MockResolver::new());
        link_with_redirect(&user, &OAuthProvider::new("github.com"), Some(launching.clone()))
            .await
            .unwrap();

        let (event_type, event_id) = launching.redirects()[0].clone();
        assert_eq!(event_type, AuthEventType::LinkViaRedirect);
        let event_id = event_id.unwrap();
        assert!(event_id.starts_with("linker:::"));
        let pending_key = persistence_key(PENDING_REDIRECT_KEY_PREFIX, &before.key());
        assert_eq!(persistence.get(&pending_key).unwrap().unwrap(), "true");
        let redirect_key = persistence_key(REDIRECT_USER_KEY_PREFIX, &before.key());
        assert_eq!(
            persistence.get(&redirect_key).unwrap().unwrap()["_redirectEventId"],
            event_id.as_str()
        );

        let resolver = Arc::new(MockResolver::new());
        let after = reloaded_auth(config, backend.clone(), persistence.clone(), resolver.clone());
        after.initialize().await.unwrap();
        backend.push_idp_response(idp_response("linker"));
        resolver
            .event_manager(&after)
            .await
            .on_event(redirect_completion(AuthEventType::LinkViaRedirect, &event_id));

        let credential = get_redirect_result(&after, None).await.unwrap().unwrap();
        assert_eq!(credential.operation_type, OperationType::Link);
        assert_eq!(credential.user.uid(), "linker");
        assert!(credential.user.is_linked_to("github.com"));
        assert!(credential.user.redirect_event_id().is_none());
        assert!(persistence.get(&redirect_key).unwrap().is_none());
        assert!(persistence.get(&pending_key).unwrap().is_none());
        assert!(after.redirect_user().is_none());
        assert!(backend.last_idp_request().unwrap().id_token.is_some());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn link_event_without_pending_user_resolves_to_none() {
        let _serial = serial_guard().await;
        let backend = Arc::new(MockBackend::new());
        let resolver = Arc::new(MockResolver::new());
        let auth = test_auth_with_resolver(backend.clone(), resolver.clone());
        auth.set_pending_redirect().unwrap();

        resolver
            .event_manager(&auth)
            .await
            .on_event(redirect_completion(AuthEventType::ReauthViaRedirect, "nobody:::0123456789"));

        assert!(get_redirect_result(&auth, None).await.unwrap().is_none());
        assert_eq!(backend.idp_calls(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn reauth_redirect_uses_the_stamped_user() {
        let _serial = serial_guard().await;
        let backend = Arc::new(MockBackend::new());
        let resolver = Arc::new(MockResolver::new());
        let auth = test_auth_with_resolver(backend.clone(), resolver.clone());
        let user = signed_in_user(&auth, "returning");

        reauthenticate_with_redirect(&user, &OAuthProvider::new("github.com"), None)
            .await
            .unwrap();
        let event_id = user.redirect_event_id().unwrap();

        backend.push_idp_response(idp_response("returning"));
        resolver
            .event_manager(&auth)
            .await
            .on_event(redirect_completion(AuthEventType::ReauthViaRedirect, &event_id));

        let credential = get_redirect_result(&auth, None).await.unwrap().unwrap();
        assert_eq!(credential.operation_type, OperationType::Reauthenticate);
        assert!(Arc::ptr_eq(&credential.user, &user));
        assert_eq!(backend.last_idp_request().unwrap().auto_create, Some(false));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn sign_in_redirect_hands_off_to_the_resolver() {
        let _serial = serial_guard().await;
        let resolver = Arc::new(MockResolver::new());
        let auth = test_auth_with_resolver(Arc::new(MockBackend::new()), resolver.clone());

        sign_in_with_redirect(&auth, &OAuthProvider::new("github.com"), None)
            .await
            .unwrap();
        assert_eq!(
            resolver.redirects(),
            vec![(AuthEventType::SignInViaRedirect, None)]
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn linking_an_already_linked_provider_fails() {
        let _serial = serial_guard().await;
        let resolver = Arc::new(MockResolver::new());
        let auth = test_auth_with_resolver(Arc::new(MockBackend::new()), resolver.clone());
        let user = signed_in_user(&auth, "uid");
        user.update_from_id_token_response(&idp_response("uid")).unwrap();

        let error = link_with_redirect(&user, &OAuthProvider::new("github.com"), None)
            .await
            .unwrap_err();
        assert_eq!(error.code(), "auth/provider-already-linked");
        assert!(resolver.redirects().is_empty());
        assert!(user.redirect_event_id().is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn redirect_lookup_keeps_the_signed_in_user() {
        let _serial = serial_guard().await;
        let resolver = Arc::new(MockResolver::new());
        let auth = test_auth_with_resolver(Arc::new(MockBackend::new()), resolver);
        let existing = signed_in_user(&auth, "existing");

        assert!(get_redirect_result(&auth, None).await.unwrap().is_none());
        assert!(Arc::ptr_eq(&auth.current_user().unwrap(), &existing));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn nothing_pending_resolves_to_none_without_waiting() {
        let _serial = serial_guard().await;
        let backend = Arc::new(MockBackend::new());
        let resolver = Arc::new(MockResolver::new());
        let auth = test_auth_with_resolver(backend.clone(), resolver.clone());

        let outcome = tokio::time::timeout(Duration::from_secs(1), get_redirect_result(&auth, None))
            .await
            .expect("no redirect is pending");
        assert!(outcome.unwrap().is_none());
        assert_eq!(resolver.event_manager(&auth).await.consumer_count(), 0);
        assert_eq!(backend.idp_calls(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn pending_flag_is_consumed_by_the_first_lookup() {
        let _serial = serial_guard().await;
        let backend = Arc::new(MockBackend::new());
        backend.push_idp_response(idp_response("returning"));
        let persistence = Arc::new(InMemoryPersistence::new());
        let resolver = Arc::new(MockResolver::new());
        let auth = reloaded_auth(unique_config(), backend, persistence.clone(), resolver.clone());

        sign_in_with_redirect(&auth, &OAuthProvider::new("github.com"), None)
            .await
            .unwrap();
        let pending_key = persistence_key(PENDING_REDIRECT_KEY_PREFIX, &auth.key());
        assert!(persistence.get(&pending_key).unwrap().is_some());

        resolver
            .event_manager(&auth)
            .await
            .on_event(redirect_completion(AuthEventType::SignInViaRedirect, "e"));
        let credential = get_redirect_result(&auth, None).await.unwrap().unwrap();

        assert_eq!(credential.user.uid(), "returning");
        assert!(persistence.get(&pending_key).unwrap().is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn cancelled_lookup_leaves_a_single_wait() {
        let _serial = serial_guard().await;
        let backend = Arc::new(MockBackend::new());
        backend.push_idp_response(idp_response("patient"));
        backend.push_idp_response(idp_response("impatient"));
        let resolver = Arc::new(MockResolver::new());
        let auth = test_auth_with_resolver(backend.clone(), resolver.clone());
        auth.set_pending_redirect().unwrap();

        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), get_redirect_result(&auth, None)).await;
        assert!(cancelled.is_err());
        let manager = resolver.event_manager(&auth).await;
        assert_eq!(manager.consumer_count(), 1);

        let task_auth = auth.clone();
        let pending = tokio::spawn(async move { get_redirect_result(&task_auth, None).await });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(manager.consumer_count(), 1);

        manager.on_event(redirect_completion(AuthEventType::SignInViaRedirect, "e"));
        let credential = pending.await.unwrap().unwrap().unwrap();

        assert_eq!(credential.user.uid(), "patient");
        assert_eq!(backend.idp_calls(), 1);
        assert_eq!(manager.consumer_count(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unknown_error_event_rejects_the_redirect_result() {
        let _serial = serial_guard().await;
        let backend = Arc::new(MockBackend::new());
        let resolver = Arc::new(MockResolver::new());
        let auth = test_auth_with_resolver(backend.clone(), resolver.clone());
        auth.set_pending_redirect().unwrap();

        let task_auth = auth.clone();
        let pending = tokio::spawn(async move { get_redirect_result(&task_auth, None).await });
        let manager = resolver.event_manager(&auth).await;
        for _ in 0..100 {
            if manager.consumer_count() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(manager.consumer_count(), 1);

        assert!(manager.on_event(
            AuthEvent::new(AuthEventType::Unknown)
                .with_error(AuthEventError::new("auth/internal-error"))
        ));
        let error = pending.await.unwrap().unwrap_err();

        assert_eq!(error.code(), "auth/internal-error");
        assert_eq!(backend.idp_calls(), 0);
        assert_eq!(manager.consumer_count(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn clearing_outcomes_allows_a_new_wait() {
        let _serial = serial_guard().await;
        let backend = Arc::new(MockBackend::new());
        backend.push_idp_response(idp_response("first"));
        backend.push_idp_response(idp_response("second"));
        let resolver = Arc::new(MockResolver::new());
        let auth = test_auth_builder(backend)
            .with_resolver(resolver.clone())
            .build();
        let manager = resolver.event_manager(&auth).await;

        auth.set_pending_redirect().unwrap();
        manager.on_event(redirect_completion(AuthEventType::SignInViaRedirect, "one"));
        let first = get_redirect_result(&auth, None).await.unwrap().unwrap();

        clear_redirect_outcomes();
        auth.set_pending_redirect().unwrap();
        manager.on_event(redirect_completion(AuthEventType::SignInViaRedirect, "two"));
        let second = get_redirect_result(&auth, None).await.unwrap().unwrap();

        assert_eq!(first.user.uid(), "first");
        assert_eq!(second.user.uid(), "second");
    }
}
