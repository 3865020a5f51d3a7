//! Public popup and redirect entry points.

use std::sync::Arc;

use crate::auth::api::Auth;
use crate::auth::error::{AuthError, AuthErrorCode, AuthResult};
use crate::auth::model::User;

pub mod popup;
pub mod redirect;

pub use popup::{link_with_popup, reauthenticate_with_popup, sign_in_with_popup, PopupOperation};
pub use redirect::{
    clear_redirect_outcomes, get_redirect_result, link_with_redirect,
    reauthenticate_with_redirect, sign_in_with_redirect, RedirectAction,
};

fn auth_of(user: &User) -> AuthResult<Arc<Auth>> {
    user.auth()
        .ok_or_else(|| AuthError::internal("User outlived its auth instance"))
}

/// Fails with `provider-already-linked` when `user` already has `provider_id`.
fn assert_not_linked(user: &User, provider_id: &str) -> AuthResult<()> {
    if user.is_linked_to(provider_id) {
        return Err(AuthError::new(AuthErrorCode::ProviderAlreadyLinked));
    }
    Ok(())
}
