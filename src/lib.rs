//! Popup, redirect and token lifecycle coordination for Firebase Auth clients.
//!
//! The [`auth`] module holds the public API: an [`auth::Auth`] instance, the
//! popup and redirect entry points, the auth event manager that routes
//! completion events to pending operations, and the token manager that keeps
//! ID tokens fresh. [`platform`] carries the runtime and timing helpers that
//! differ between native and wasm targets.

pub mod auth;
pub mod platform;
pub mod util;

#[cfg(test)]
pub mod test_support;
