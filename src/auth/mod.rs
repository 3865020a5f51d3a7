//! Popup and redirect sign-in flows for Firebase Auth.
//!
//! An [`Auth`] instance owns the signed-in user, its persistence and the
//! [`PopupRedirectResolver`] that talks to the platform. The entry points in
//! [`strategies`] start an external flow, wait for the matching
//! [`AuthEvent`](popup_redirect::AuthEvent) and exchange it for a
//! [`UserCredential`] through the identity backend.
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use firebase_auth_flows::auth::{get_redirect_result, sign_in_with_redirect, Auth, AuthConfig};
//! # use firebase_auth_flows::auth::{GoogleAuthProvider, OAuthProviderFactory};
//! # async fn run(resolver: Arc<dyn firebase_auth_flows::auth::PopupRedirectResolver>) -> firebase_auth_flows::auth::AuthResult<()> {
//! let config = AuthConfig::new("api-key", "[DEFAULT]").with_auth_domain("my-app.firebaseapp.com");
//! let auth = Auth::builder(config).with_resolver(resolver).build();
//!
//! // After the app has been reloaded by the redirect:
//! if let Some(credential) = get_redirect_result(&auth, None).await? {
//!     println!("signed in as {}", credential.user.uid());
//! } else {
//!     sign_in_with_redirect(&auth, &GoogleAuthProvider::new(), None).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod oauth;
pub mod persistence;
pub mod popup_redirect;
pub mod strategies;
pub mod token_manager;

#[doc(inline)]
pub use api::{Auth, AuthBackend, AuthBuilder, RestBackend};

#[doc(inline)]
pub use config::{AuthConfig, AuthSettings};

#[doc(inline)]
pub use error::{AuthError, AuthErrorCode, AuthEventError, AuthResult};

#[doc(inline)]
pub use model::{OperationType, User, UserCredential, UserInfo};

#[doc(inline)]
pub use oauth::{
    FacebookAuthProvider, GitHubAuthProvider, GoogleAuthProvider, OAuthProvider,
    OAuthProviderFactory, TwitterAuthProvider,
};

#[doc(inline)]
pub use persistence::{AuthPersistence, InMemoryPersistence};

#[cfg(not(target_arch = "wasm32"))]
#[doc(inline)]
pub use persistence::FilePersistence;

#[doc(inline)]
pub use popup_redirect::{
    AuthEvent, AuthEventConsumer, AuthEventManager, AuthEventType, AuthFlowLauncher, AuthPopup,
    LauncherResolver, PopupRedirectResolver, PopupWindow,
};

#[doc(inline)]
pub use strategies::{
    get_redirect_result, link_with_popup, link_with_redirect, reauthenticate_with_popup,
    reauthenticate_with_redirect, sign_in_with_popup, sign_in_with_redirect,
};

#[doc(inline)]
pub use token_manager::StsTokenManager;
