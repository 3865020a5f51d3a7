//! Test utilities shared across crate-level unit tests.

pub mod auth;
pub mod backend;
pub mod http;
pub mod resolver;

pub use auth::{
    id_token_for, signed_in_user, test_auth, test_auth_builder, test_auth_with_backend,
    test_auth_with_config, test_auth_with_resolver, unique_config,
};
pub use backend::MockBackend;
pub use http::start_mock_server;
pub use resolver::{MockResolver, TestWindow};

use async_lock::{Mutex, MutexGuard};

static SERIAL: Mutex<()> = Mutex::new(());

/// Serializes tests that touch process-wide state (the current popup, redirect outcomes).
pub async fn serial_guard() -> MutexGuard<'static, ()> {
    SERIAL.lock().await
}
