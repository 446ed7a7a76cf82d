//! Session recipe: token lifecycle, cookie transport, and the refresh API.
//!
//! The recipe owns exactly one HTTP route (`POST {apiBasePath}/session/refresh`)
//! and exposes the lifecycle operations other recipes and applications call
//! directly. All session error shapes funnel through [`SessionRecipe`]'s
//! `handle_error`, which applies either the application's override hooks or
//! the default responses.

pub mod codec;
pub mod config;
pub mod cookies;
pub mod lifecycle;
pub mod scope;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::AppInfo;
use crate::error::{ErrorKind, RecipeError};
use crate::normalised::NormalisedURLPath;
use crate::querier::Querier;
use crate::recipe::{ApiHandled, ApiRequest, BoxFut, HttpMethod, RecipeModule};
use crate::response::ResponseSink;
use codec::TokenCodec;
use config::{SessionConfig, SessionHooks, SessionPolicy};
use lifecycle::Session;

pub(crate) const SESSION_RECIPE_ID: &str = "session";
const REFRESH_API_ID: &str = "REFRESH";

/// Override hook for unauthorised / try-refresh responses. Receives the
/// recipe, the error message, and the sink to conclude.
pub type SessionHandler = Box<
    dyn for<'a> Fn(
            &'a SessionRecipe,
            &'a str,
            &'a mut ResponseSink,
        ) -> BoxFut<'a, Result<(), RecipeError>>
        + Send
        + Sync,
>;

/// Override hook for token theft. Receives the recipe, the stolen session
/// handle, the user id, and the sink to conclude.
pub type TheftHandler = Box<
    dyn for<'a> Fn(
            &'a SessionRecipe,
            &'a str,
            &'a str,
            &'a mut ResponseSink,
        ) -> BoxFut<'a, Result<(), RecipeError>>
        + Send
        + Sync,
>;

pub struct SessionRecipe {
    policy: SessionPolicy,
    codec: TokenCodec,
    hooks: SessionHooks,
    refresh_api_path: NormalisedURLPath,
}

impl SessionRecipe {
    /// Resolve the configuration against the app info and build the recipe.
    ///
    /// # Errors
    /// Fails on an invalid cookie policy; the application must not start.
    pub fn init(
        config: SessionConfig,
        app_info: &AppInfo,
        querier: Arc<Querier>,
    ) -> Result<Arc<Self>> {
        let refresh_api_path = NormalisedURLPath::new(self::config::REFRESH_API_PATH)?;
        let (policy, hooks) = config.resolve(app_info)?;
        debug!(
            same_site = policy.cookie_same_site.as_str(),
            secure = policy.cookie_secure,
            anti_csrf = policy.enable_anti_csrf,
            "session cookie policy resolved"
        );
        Ok(Arc::new(Self {
            policy,
            codec: TokenCodec::new(querier),
            hooks,
            refresh_api_path,
        }))
    }

    #[must_use]
    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Create a new session for `user_id` and attach its tokens to the
    /// response being built.
    ///
    /// # Errors
    /// `General` on backend or encoding failure.
    pub async fn create_new_session(
        &self,
        sink: &mut ResponseSink,
        user_id: &str,
        user_data_in_jwt: &Value,
        user_data_in_database: &Value,
    ) -> Result<Session, RecipeError> {
        lifecycle::create_new_session(
            &self.codec,
            &self.policy,
            sink,
            user_id,
            user_data_in_jwt,
            user_data_in_database,
        )
        .await
    }

    /// Verify the session on a request.
    ///
    /// # Errors
    /// See [`lifecycle::get_session`] for the outcome mapping.
    pub async fn get_session(
        &self,
        request: &ApiRequest,
        do_anti_csrf_check: bool,
    ) -> Result<Session, RecipeError> {
        lifecycle::get_session(&self.codec, &self.policy, request, do_anti_csrf_check).await
    }

    /// Rotate the refresh token on a request and attach the new token set.
    ///
    /// # Errors
    /// See [`lifecycle::refresh_session`].
    pub async fn refresh_session(
        &self,
        request: &ApiRequest,
        sink: &mut ResponseSink,
    ) -> Result<Session, RecipeError> {
        lifecycle::refresh_session(&self.codec, &self.policy, request, sink).await
    }

    /// # Errors
    /// `General` on backend failure.
    pub async fn revoke_session(&self, session_handle: &str) -> Result<(), RecipeError> {
        lifecycle::revoke_session(&self.codec, session_handle).await
    }

    /// # Errors
    /// `General` on backend failure.
    pub async fn revoke_all_sessions_for_user(&self, user_id: &str) -> Result<(), RecipeError> {
        self.codec.revoke_all_sessions_for_user(user_id).await
    }

    async fn respond_unauthorised(
        &self,
        message: &str,
        sink: &mut ResponseSink,
    ) -> Result<(), RecipeError> {
        if let Some(handler) = &self.hooks.on_unauthorised {
            return handler(self, message, sink).await;
        }
        cookies::clear_all_session_tokens(sink, &self.policy)?;
        sink.send_json(
            self.policy.session_expired_status_code(),
            json!({"message": "unauthorised"}),
        );
        Ok(())
    }

    // Tokens are not cleared here: the session may still be refreshable and
    // clearing would log the user out.
    async fn respond_try_refresh_token(
        &self,
        message: &str,
        sink: &mut ResponseSink,
    ) -> Result<(), RecipeError> {
        if let Some(handler) = &self.hooks.on_try_refresh_token {
            return handler(self, message, sink).await;
        }
        sink.send_json(
            self.policy.session_expired_status_code(),
            json!({"message": "try refresh token"}),
        );
        Ok(())
    }

    async fn respond_token_theft(
        &self,
        session_handle: &str,
        user_id: &str,
        sink: &mut ResponseSink,
    ) -> Result<(), RecipeError> {
        // Revocation is not the hook's choice; a replayed refresh token means
        // every session for this user is suspect. The browser's cookies are
        // cleared even when the revoke call fails, so the response never
        // leaves the stolen token set behind.
        if let Err(revoke_error) = self.revoke_all_sessions_for_user(user_id).await {
            error!(user = user_id, "failed to revoke sessions after token theft: {revoke_error}");
        }
        if let Some(handler) = &self.hooks.on_token_theft_detected {
            return handler(self, session_handle, user_id, sink).await;
        }
        cookies::clear_all_session_tokens(sink, &self.policy)?;
        sink.send_json(
            self.policy.session_expired_status_code(),
            json!({"message": "token theft detected"}),
        );
        Ok(())
    }
}

impl RecipeModule for SessionRecipe {
    fn recipe_id(&self) -> &'static str {
        SESSION_RECIPE_ID
    }

    fn apis_handled(&self) -> Vec<ApiHandled> {
        vec![ApiHandled {
            method: HttpMethod::Post,
            path_without_api_base_path: self.refresh_api_path.clone(),
            id: REFRESH_API_ID,
            disabled: self.policy.disable_default_refresh_api,
        }]
    }

    fn handle_api_request<'a>(
        &'a self,
        api_id: &'a str,
        request: &'a ApiRequest,
        sink: &'a mut ResponseSink,
    ) -> BoxFut<'a, Result<(), RecipeError>> {
        Box::pin(async move {
            match api_id {
                REFRESH_API_ID => {
                    self.refresh_session(request, sink).await?;
                    sink.send_json(StatusCode::OK, json!({"status": "OK"}));
                    Ok(())
                }
                other => Err(RecipeError::general(
                    SESSION_RECIPE_ID,
                    anyhow::anyhow!("unknown session API id {other:?}"),
                )),
            }
        })
    }

    fn handle_error<'a>(
        &'a self,
        error: RecipeError,
        _request: &'a ApiRequest,
        sink: &'a mut ResponseSink,
    ) -> BoxFut<'a, Result<(), RecipeError>> {
        Box::pin(async move {
            match error.kind {
                ErrorKind::Unauthorised(message) => {
                    self.respond_unauthorised(&message, sink).await
                }
                ErrorKind::TryRefreshToken(message) => {
                    self.respond_try_refresh_token(&message, sink).await
                }
                ErrorKind::TokenTheftDetected {
                    session_handle,
                    user_id,
                } => {
                    self.respond_token_theft(&session_handle, &user_id, sink)
                        .await
                }
                kind => Err(RecipeError {
                    recipe_id: error.recipe_id,
                    kind,
                }),
            }
        })
    }

    fn all_cors_headers(&self) -> Vec<&'static str> {
        vec![cookies::ANTI_CSRF_HEADER, "rid"]
    }
}
