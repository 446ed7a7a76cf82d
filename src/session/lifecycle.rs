//! Session lifecycle operations: create, verify, refresh, revoke.
//!
//! Outcome mapping for verification is deliberate and fixed:
//! - no id-refresh marker: the session does not exist (`Unauthorised`)
//! - marker present but no access token, or access token expired: the
//!   session may still exist (`TryRefreshToken`)
//! - tampered access token or failed anti-CSRF check: `Unauthorised`
//!
//! The split matters because `TryRefreshToken` tells frontends to call the
//! refresh endpoint while `Unauthorised` tells them to log in again.

use chrono::Utc;
use serde_json::Value;

use super::codec::{AccessTokenFailure, RefreshOutcome, TokenCodec};
use super::config::SessionPolicy;
use super::{cookies, SESSION_RECIPE_ID};
use crate::error::RecipeError;
use crate::recipe::ApiRequest;
use crate::response::ResponseSink;

/// A verified, live session attached to the current request.
#[derive(Clone, Debug)]
pub struct Session {
    session_handle: String,
    user_id: String,
    user_data_in_jwt: Value,
}

impl Session {
    #[must_use]
    pub fn session_handle(&self) -> &str {
        &self.session_handle
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn user_data_in_jwt(&self) -> &Value {
        &self.user_data_in_jwt
    }
}

/// Create a brand-new session for `user_id` and attach its tokens to the
/// response.
///
/// # Errors
/// `General` on backend or encoding failure.
pub async fn create_new_session(
    codec: &TokenCodec,
    policy: &SessionPolicy,
    sink: &mut ResponseSink,
    user_id: &str,
    user_data_in_jwt: &Value,
    user_data_in_database: &Value,
) -> Result<Session, RecipeError> {
    let created = codec
        .create_session(
            user_id,
            user_data_in_jwt,
            user_data_in_database,
            policy.enable_anti_csrf(),
        )
        .await?;
    cookies::attach_tokens(sink, policy, &created)?;
    Ok(Session {
        session_handle: created.session.handle,
        user_id: created.session.user_id,
        user_data_in_jwt: created.session.user_data_in_jwt,
    })
}

/// Verify the session presented on a request without touching the core.
///
/// `do_anti_csrf_check` is decided by the caller: refresh and non-mutating
/// reads skip it, everything else performs it when the policy enables
/// anti-CSRF.
///
/// # Errors
/// `Unauthorised`, `TryRefreshToken`, or `General` per the mapping above.
pub async fn get_session(
    codec: &TokenCodec,
    policy: &SessionPolicy,
    request: &ApiRequest,
    do_anti_csrf_check: bool,
) -> Result<Session, RecipeError> {
    if cookies::read_id_refresh_token(request.headers()).is_none() {
        return Err(RecipeError::unauthorised(
            SESSION_RECIPE_ID,
            "session does not exist",
        ));
    }

    let Some(access_token) = cookies::read_access_token(request.headers()) else {
        return Err(RecipeError::try_refresh_token(
            SESSION_RECIPE_ID,
            "access token missing",
        ));
    };

    let claims = match codec
        .verify_access_token(&access_token, Utc::now().timestamp_millis())
        .await?
    {
        Ok(claims) => claims,
        Err(AccessTokenFailure::Invalid) => {
            return Err(RecipeError::unauthorised(
                SESSION_RECIPE_ID,
                "access token failed verification",
            ));
        }
        Err(AccessTokenFailure::Expired(_)) => {
            return Err(RecipeError::try_refresh_token(
                SESSION_RECIPE_ID,
                "access token expired",
            ));
        }
    };

    if policy.enable_anti_csrf() && do_anti_csrf_check {
        let presented = cookies::read_anti_csrf_token(request.headers());
        if presented.as_deref() != claims.anti_csrf_token.as_deref()
            || claims.anti_csrf_token.is_none()
        {
            return Err(RecipeError::unauthorised(
                SESSION_RECIPE_ID,
                "anti-csrf check failed",
            ));
        }
    }

    Ok(Session {
        session_handle: claims.session_handle,
        user_id: claims.user_id,
        user_data_in_jwt: claims.user_data_in_jwt,
    })
}

/// Rotate the refresh token presented on a request and attach the new token
/// set to the response.
///
/// # Errors
/// `Unauthorised` when no refresh token is presented or the core rejects it,
/// `TokenTheftDetected` when a superseded token is replayed, `General` on
/// transport failure.
pub async fn refresh_session(
    codec: &TokenCodec,
    policy: &SessionPolicy,
    request: &ApiRequest,
    sink: &mut ResponseSink,
) -> Result<Session, RecipeError> {
    let Some(refresh_token) = cookies::read_refresh_token(request.headers()) else {
        return Err(RecipeError::unauthorised(
            SESSION_RECIPE_ID,
            "refresh token missing",
        ));
    };

    match codec
        .refresh_session(&refresh_token, policy.enable_anti_csrf())
        .await?
    {
        RefreshOutcome::Rotated(created) => {
            cookies::attach_tokens(sink, policy, &created)?;
            Ok(Session {
                session_handle: created.session.handle,
                user_id: created.session.user_id,
                user_data_in_jwt: created.session.user_data_in_jwt,
            })
        }
        RefreshOutcome::Unauthorised => Err(RecipeError::unauthorised(
            SESSION_RECIPE_ID,
            "refresh token rejected",
        )),
        RefreshOutcome::TokenTheft {
            session_handle,
            user_id,
        } => Err(RecipeError::token_theft_detected(
            SESSION_RECIPE_ID,
            session_handle,
            user_id,
        )),
    }
}

/// # Errors
/// `General` on backend failure.
pub async fn revoke_session(codec: &TokenCodec, session_handle: &str) -> Result<(), RecipeError> {
    codec.revoke_session(session_handle).await
}
