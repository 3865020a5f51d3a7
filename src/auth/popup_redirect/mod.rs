//! Coordination of external (popup, redirect, app-switch) auth flows.
//!
//! An [`Operation`] launches a flow through a [`PopupRedirectResolver`],
//! registers with the resolver's [`AuthEventManager`] and settles once the
//! matching [`AuthEvent`] arrives and its credential has been resolved.

pub mod event;
pub mod event_manager;
pub mod idp;
pub mod operation;
pub mod resolver;

pub use event::{generate_event_id, AuthEvent, AuthEventType};
pub use event_manager::{AuthEventConsumer, AuthEventManager, EVENT_DUPLICATION_CACHE_DURATION};
pub use idp::IdpTaskParams;
pub use operation::{execute, settle, Operation, OperationCore, OperationOutcome, OperationState};
pub use resolver::{
    auth_handler_url, AuthFlowLauncher, AuthPopup, EventManagerRegistry, LauncherResolver,
    PopupRedirectResolver, PopupWindow,
};
