//! Emailpassword recipe: sign-up, sign-in, and password reset.
//!
//! Sessions are not this recipe's concern: on successful sign-up/sign-in it
//! delegates to the session recipe, so session errors raised from inside
//! these handlers carry the session recipe id and are routed back to the
//! session module's error handling.

pub mod api;
pub mod core;
pub mod types;

use anyhow::{bail, Result};
use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;

use crate::config::AppInfo;
use crate::error::{ErrorKind, RecipeError};
use crate::normalised::NormalisedURLPath;
use crate::querier::Querier;
use crate::recipe::{ApiHandled, ApiRequest, BoxFut, HttpMethod, RecipeModule};
use crate::response::ResponseSink;
use crate::session::SessionRecipe;
use self::core::CoreClient;
use types::{
    accept_any_validator, default_email_validator, default_password_validator,
    EmailPasswordConfig, FormFieldSpec, ResetEmailSender, User, EMAIL_FIELD_ID, PASSWORD_FIELD_ID,
};

pub(crate) const EMAILPASSWORD_RECIPE_ID: &str = "emailpassword";

const SIGN_UP_API_ID: &str = "SIGN_UP";
const SIGN_IN_API_ID: &str = "SIGN_IN";
const GENERATE_PASSWORD_RESET_TOKEN_API_ID: &str = "GENERATE_PASSWORD_RESET_TOKEN";
const PASSWORD_RESET_API_ID: &str = "PASSWORD_RESET";

const SIGN_UP_API_PATH: &str = "/signup";
const SIGN_IN_API_PATH: &str = "/signin";
const GENERATE_PASSWORD_RESET_TOKEN_API_PATH: &str = "/user/password/reset/token";
const PASSWORD_RESET_API_PATH: &str = "/user/password/reset";

const DEFAULT_RESET_PASSWORD_PATH: &str = "/reset-password";

pub struct EmailPasswordRecipe {
    session: Arc<SessionRecipe>,
    core: CoreClient,
    sign_up_fields: Vec<FormFieldSpec>,
    sign_in_fields: Vec<FormFieldSpec>,
    reset_token_fields: Vec<FormFieldSpec>,
    reset_password_fields: Vec<FormFieldSpec>,
    reset_link_base: String,
    email_sender: Arc<dyn ResetEmailSender>,
    apis: Vec<ApiHandled>,
}

impl EmailPasswordRecipe {
    /// Build the recipe from its configuration.
    ///
    /// # Errors
    /// Fails when a custom sign-up field redeclares `email` or `password`,
    /// or the reset path cannot be normalized.
    pub fn init(
        config: EmailPasswordConfig,
        app_info: &AppInfo,
        querier: Arc<Querier>,
        session: Arc<SessionRecipe>,
    ) -> Result<Arc<Self>> {
        let extra_fields = config.extra_sign_up_fields;
        let email_sender = config
            .email_sender
            .unwrap_or_else(|| Arc::new(types::LogResetEmailSender));
        for field in &extra_fields {
            if field.id == EMAIL_FIELD_ID || field.id == PASSWORD_FIELD_ID {
                bail!(
                    "custom sign-up field {:?} clashes with a built-in field",
                    field.id
                );
            }
        }

        let mut sign_up_fields = vec![
            FormFieldSpec::new(EMAIL_FIELD_ID, default_email_validator(), false),
            FormFieldSpec::new(PASSWORD_FIELD_ID, default_password_validator(), false),
        ];
        sign_up_fields.extend(extra_fields);

        // Sign-in reuses the email validator but accepts any password so a
        // tightened policy never locks out existing accounts.
        let sign_in_fields = vec![
            FormFieldSpec::new(EMAIL_FIELD_ID, default_email_validator(), false),
            FormFieldSpec::new(PASSWORD_FIELD_ID, accept_any_validator(), false),
        ];
        let reset_token_fields =
            vec![FormFieldSpec::new(EMAIL_FIELD_ID, default_email_validator(), false)];
        let reset_password_fields = vec![FormFieldSpec::new(
            PASSWORD_FIELD_ID,
            default_password_validator(),
            false,
        )];

        let reset_path = match config.reset_password_path {
            Some(path) => NormalisedURLPath::new(&path)?,
            None => app_info
                .website_base_path()
                .append(&NormalisedURLPath::new(DEFAULT_RESET_PASSWORD_PATH)?),
        };
        let reset_link_base = format!("{}{reset_path}", app_info.website_domain());

        let route = |path: &str, id: &'static str, disabled: bool| -> Result<ApiHandled> {
            Ok(ApiHandled {
                method: HttpMethod::Post,
                path_without_api_base_path: NormalisedURLPath::new(path)?,
                id,
                disabled,
            })
        };
        let apis = vec![
            route(SIGN_UP_API_PATH, SIGN_UP_API_ID, config.disable_sign_up_api)?,
            route(SIGN_IN_API_PATH, SIGN_IN_API_ID, config.disable_sign_in_api)?,
            route(
                GENERATE_PASSWORD_RESET_TOKEN_API_PATH,
                GENERATE_PASSWORD_RESET_TOKEN_API_ID,
                config.disable_reset_password_apis,
            )?,
            route(
                PASSWORD_RESET_API_PATH,
                PASSWORD_RESET_API_ID,
                config.disable_reset_password_apis,
            )?,
        ];

        Ok(Arc::new(Self {
            session,
            core: CoreClient::new(querier),
            sign_up_fields,
            sign_in_fields,
            reset_token_fields,
            reset_password_fields,
            reset_link_base,
            email_sender,
            apis,
        }))
    }

    #[must_use]
    pub fn session(&self) -> &SessionRecipe {
        &self.session
    }

    pub(crate) fn core(&self) -> &CoreClient {
        &self.core
    }

    pub(crate) fn sign_up_fields(&self) -> &[FormFieldSpec] {
        &self.sign_up_fields
    }

    pub(crate) fn sign_in_fields(&self) -> &[FormFieldSpec] {
        &self.sign_in_fields
    }

    pub(crate) fn reset_token_fields(&self) -> &[FormFieldSpec] {
        &self.reset_token_fields
    }

    pub(crate) fn reset_password_fields(&self) -> &[FormFieldSpec] {
        &self.reset_password_fields
    }

    pub(crate) fn email_sender(&self) -> &dyn ResetEmailSender {
        self.email_sender.as_ref()
    }

    /// Look up a user by email. Programmatic API; not routed over HTTP.
    ///
    /// # Errors
    /// `General` on backend failure.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RecipeError> {
        self.core.get_user_by_email(email).await
    }

    /// Look up a user by the id stored in their sessions.
    ///
    /// # Errors
    /// `General` on backend failure.
    pub async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, RecipeError> {
        self.core.get_user_by_id(user_id).await
    }

    /// The link mailed to users, pointing at the website's reset page. The
    /// `rid` query parameter tells the frontend which recipe owns the flow.
    #[must_use]
    pub fn password_reset_link(&self, token: &str) -> String {
        format!(
            "{}?token={token}&rid={EMAILPASSWORD_RECIPE_ID}",
            self.reset_link_base
        )
    }
}

impl RecipeModule for EmailPasswordRecipe {
    fn recipe_id(&self) -> &'static str {
        EMAILPASSWORD_RECIPE_ID
    }

    fn apis_handled(&self) -> Vec<ApiHandled> {
        self.apis.clone()
    }

    fn handle_api_request<'a>(
        &'a self,
        api_id: &'a str,
        request: &'a ApiRequest,
        sink: &'a mut ResponseSink,
    ) -> BoxFut<'a, Result<(), RecipeError>> {
        Box::pin(async move {
            match api_id {
                SIGN_UP_API_ID => api::sign_up(self, request, sink).await,
                SIGN_IN_API_ID => api::sign_in(self, request, sink).await,
                GENERATE_PASSWORD_RESET_TOKEN_API_ID => {
                    api::generate_password_reset_token(self, request, sink).await
                }
                PASSWORD_RESET_API_ID => api::password_reset(self, request, sink).await,
                other => Err(RecipeError::general(
                    EMAILPASSWORD_RECIPE_ID,
                    anyhow::anyhow!("unknown emailpassword API id {other:?}"),
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
                ErrorKind::FieldError(fields) => {
                    sink.send_json(
                        StatusCode::OK,
                        json!({"status": "FIELD_ERROR", "formFields": fields}),
                    );
                    Ok(())
                }
                ErrorKind::BadInput(message) => {
                    sink.send_json(StatusCode::BAD_REQUEST, json!({"message": message}));
                    Ok(())
                }
                kind => Err(RecipeError {
                    recipe_id: error.recipe_id,
                    kind,
                }),
            }
        })
    }

    fn all_cors_headers(&self) -> Vec<&'static str> {
        vec!["rid"]
    }
}
