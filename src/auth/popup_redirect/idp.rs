//! Turns the payload of a completed external flow into a [`UserCredential`].

use std::sync::Arc;

use crate::auth::api::idp::SignInWithIdpRequest;
use crate::auth::api::Auth;
use crate::auth::error::{AuthError, AuthErrorCode, AuthResult};
use crate::auth::model::{OperationType, User, UserCredential};
use crate::util::jwt::parse_token;

/// Normalized inputs of a credential resolution task.
#[derive(Clone)]
pub struct IdpTaskParams {
    pub auth: Arc<Auth>,
    pub request_uri: String,
    pub session_id: Option<String>,
    pub post_body: Option<String>,
    pub tenant_id: Option<String>,
    pub pending_token: Option<String>,
    /// Bound user of a link or reauthenticate flow.
    pub user: Option<Arc<User>>,
}

impl IdpTaskParams {
    fn idp_request(&self) -> SignInWithIdpRequest {
        let mut request = SignInWithIdpRequest::new(self.request_uri.clone());
        request.session_id = self.session_id.clone();
        request.post_body = self.post_body.clone();
        request.tenant_id = self.tenant_id.clone();
        request.pending_token = self.pending_token.clone();
        request
    }

    fn require_user(&self) -> AuthResult<Arc<User>> {
        self.user
            .clone()
            .ok_or_else(|| AuthError::internal("No user is bound to this operation"))
    }
}

/// Signs in with the IdP response and makes the result the current user.
pub async fn sign_in(params: IdpTaskParams) -> AuthResult<UserCredential> {
    let response = params
        .auth
        .backend()
        .sign_in_with_idp(params.idp_request())
        .await?;

    let user = User::from_id_token_response(&params.auth, &response)?;
    params.auth.update_current_user(Some(user.clone()))?;

    Ok(UserCredential::from_response(
        user,
        OperationType::SignIn,
        &response,
    ))
}

/// Attaches the IdP identity to the bound user.
pub async fn link(params: IdpTaskParams) -> AuthResult<UserCredential> {
    let user = params.require_user()?;

    let mut request = params.idp_request();
    request.id_token = Some(user.get_id_token(false).await?);

    let response = params.auth.backend().sign_in_with_idp(request).await?;
    user.update_from_id_token_response(&response)?;
    params.auth.persist_user_if_current(&user)?;

    Ok(UserCredential::from_response(user, OperationType::Link, &response))
}

/// Proves the bound user signed in again with the IdP.
///
/// A token for a different account, or an account the backend cannot find,
/// both fail with `user-mismatch`.
pub async fn reauthenticate(params: IdpTaskParams) -> AuthResult<UserCredential> {
    let user = params.require_user()?;

    let mut request = params.idp_request();
    request.auto_create = Some(false);

    let response = match params.auth.backend().sign_in_with_idp(request).await {
        Ok(response) => response,
        Err(err) if err.is(&AuthErrorCode::UserDeleted) => {
            return Err(AuthError::new(AuthErrorCode::UserMismatch));
        }
        Err(err) => return Err(err),
    };

    let id_token = response
        .id_token
        .as_deref()
        .ok_or_else(|| AuthError::internal("Reauthentication response is missing idToken"))?;
    let subject = parse_token(id_token)
        .and_then(|token| token.sub)
        .ok_or_else(|| AuthError::internal("Reauthentication token has no subject"))?;

    if subject != user.uid() {
        log::debug!("reauthentication token belongs to another account");
        return Err(AuthError::new(AuthErrorCode::UserMismatch));
    }

    user.update_from_id_token_response(&response)?;
    params.auth.persist_user_if_current(&user)?;

    Ok(UserCredential::from_response(
        user,
        OperationType::Reauthenticate,
        &response,
    ))
}
