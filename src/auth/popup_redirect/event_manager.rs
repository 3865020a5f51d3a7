use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::auth::error::AuthError;
use crate::auth::popup_redirect::event::{AuthEvent, AuthEventType};
use crate::util::time::now_millis;

/// How long a delivered event is remembered to suppress duplicates.
pub const EVENT_DUPLICATION_CACHE_DURATION: Duration = Duration::from_secs(10 * 60);

/// Something waiting for the outcome of an external auth flow.
pub trait AuthEventConsumer: Send + Sync {
    /// Event types this consumer accepts.
    fn filter(&self) -> &[AuthEventType];

    /// Expected correlation id; `None` accepts any id.
    fn event_id(&self) -> Option<String>;

    fn on_auth_event(self: Arc<Self>, event: AuthEvent);

    fn on_error(self: Arc<Self>, error: AuthError);
}

#[derive(Default)]
struct ManagerState {
    consumers: Vec<Arc<dyn AuthEventConsumer>>,
    queued_redirect_event: Option<AuthEvent>,
    delivered_uids: HashSet<String>,
    last_delivery_ms: i64,
}

/// Per auth instance pub/sub hub for [`AuthEvent`]s.
///
/// Every matching consumer receives an event (fan-out). A redirect-family
/// event nobody was waiting for is held and handed to the next matching
/// consumer that registers, once. A later orphan replaces an unclaimed one.
pub struct AuthEventManager {
    state: Mutex<ManagerState>,
    cache_ttl: Duration,
}

impl std::fmt::Debug for AuthEventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("AuthEventManager")
            .field("consumers", &state.consumers.len())
            .field("queued_redirect_event", &state.queued_redirect_event)
            .finish()
    }
}

impl Default for AuthEventManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthEventManager {
    pub fn new() -> Self {
        Self::with_cache_ttl(EVENT_DUPLICATION_CACHE_DURATION)
    }

    pub fn with_cache_ttl(cache_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(ManagerState::default()),
            cache_ttl,
        }
    }

    /// Adds `consumer`; registering the same consumer twice keeps one entry.
    pub fn register_consumer(&self, consumer: Arc<dyn AuthEventConsumer>) {
        let replay = {
            let mut state = self.state.lock().unwrap();
            if !state
                .consumers
                .iter()
                .any(|existing| same_consumer(existing, &consumer))
            {
                state.consumers.push(consumer.clone());
            }

            let matches_queued = state
                .queued_redirect_event
                .as_ref()
                .is_some_and(|event| is_event_for_consumer(event, consumer.as_ref()));
            if matches_queued {
                let event = state.queued_redirect_event.take();
                if let Some(event) = &event {
                    self.remember_delivery(&mut state, event);
                }
                event
            } else {
                None
            }
        };

        if let Some(event) = replay {
            log::debug!("replaying queued {} event", event.event_type.as_str());
            send_to_consumer(event, consumer);
        }
    }

    pub fn unregister_consumer(&self, consumer: &Arc<dyn AuthEventConsumer>) {
        self.state
            .lock()
            .unwrap()
            .consumers
            .retain(|existing| !same_consumer(existing, consumer));
    }

    /// Delivers `event` to every matching consumer.
    ///
    /// Returns whether the event was taken: delivered to at least one consumer
    /// or held for replay. Duplicates seen within the cache window return false.
    pub fn on_event(&self, event: AuthEvent) -> bool {
        let targets = {
            let mut state = self.state.lock().unwrap();
            if self.has_event_been_handled(&mut state, &event) {
                log::debug!("ignoring duplicate {} event", event.event_type.as_str());
                return false;
            }

            let targets: Vec<_> = state
                .consumers
                .iter()
                .filter(|consumer| is_event_for_consumer(&event, consumer.as_ref()))
                .cloned()
                .collect();

            if !targets.is_empty() {
                self.remember_delivery(&mut state, &event);
            } else if event.event_type.is_redirect_family() {
                log::debug!(
                    "queueing unclaimed {} event for replay",
                    event.event_type.as_str()
                );
                state.queued_redirect_event = Some(event);
                return true;
            }
            targets
        };

        if targets.is_empty() {
            log::debug!("dropping unmatched {} event", event.event_type.as_str());
            return false;
        }

        for consumer in targets {
            send_to_consumer(event.clone(), consumer);
        }
        true
    }

    pub fn consumer_count(&self) -> usize {
        self.state.lock().unwrap().consumers.len()
    }

    pub fn has_queued_redirect_event(&self) -> bool {
        self.state.lock().unwrap().queued_redirect_event.is_some()
    }

    fn has_event_been_handled(&self, state: &mut ManagerState, event: &AuthEvent) -> bool {
        if now_millis() - state.last_delivery_ms >= self.cache_ttl.as_millis() as i64 {
            state.delivered_uids.clear();
        }
        state.delivered_uids.contains(&event.uid())
    }

    fn remember_delivery(&self, state: &mut ManagerState, event: &AuthEvent) {
        state.delivered_uids.insert(event.uid());
        state.last_delivery_ms = now_millis();
    }
}

fn same_consumer(a: &Arc<dyn AuthEventConsumer>, b: &Arc<dyn AuthEventConsumer>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn is_event_for_consumer(event: &AuthEvent, consumer: &dyn AuthEventConsumer) -> bool {
    let id_matches = match consumer.event_id() {
        None => true,
        Some(expected) => event.event_id.as_deref() == Some(expected.as_str()),
    };
    id_matches && consumer.filter().contains(&event.event_type)
}

fn send_to_consumer(event: AuthEvent, consumer: Arc<dyn AuthEventConsumer>) {
    match &event.error {
        Some(error) if !event.is_null_redirect() => consumer.on_error(AuthError::from(error)),
        _ => consumer.on_auth_event(event),
    }
}
