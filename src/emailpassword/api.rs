//! HTTP handlers for the emailpassword APIs.
//!
//! Outcome conventions: validation failures surface as `FIELD_ERROR`
//! responses through the error path, while credential and token rejections
//! are ordinary 200 bodies with a non-`OK` status so frontends can branch on
//! them without treating them as transport failures.

use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

use super::core::{ResetPasswordOutcome, ResetTokenOutcome, SignInOutcome, SignUpOutcome};
use super::types::{FormFieldSpec, FormFieldValue, EMAIL_FIELD_ID, PASSWORD_FIELD_ID};
use super::{EmailPasswordRecipe, EMAILPASSWORD_RECIPE_ID};
use crate::error::{FormFieldError, RecipeError};
use crate::recipe::ApiRequest;
use crate::response::ResponseSink;

#[derive(Deserialize)]
struct FormBody {
    #[serde(rename = "formFields", default)]
    form_fields: Vec<FormFieldValue>,
}

#[derive(Deserialize)]
struct ResetPasswordBody {
    #[serde(rename = "formFields", default)]
    form_fields: Vec<FormFieldValue>,
    token: Option<String>,
}

/// Run every field through its validator and report all failures at once, so
/// the frontend can annotate the whole form in one round trip.
fn validate_form_fields(
    specs: &[FormFieldSpec],
    provided: &[FormFieldValue],
) -> Result<HashMap<String, String>, RecipeError> {
    let mut values = HashMap::new();
    let mut failures = Vec::new();

    for spec in specs {
        let value = provided.iter().find(|field| field.id == spec.id);
        match value {
            None => {
                if !spec.optional {
                    failures.push(FormFieldError {
                        id: spec.id.clone(),
                        error: "Field is not optional".to_string(),
                    });
                }
            }
            Some(field) => {
                if let Some(message) = (spec.validate)(&field.value) {
                    failures.push(FormFieldError {
                        id: spec.id.clone(),
                        error: message,
                    });
                } else {
                    values.insert(spec.id.clone(), field.value.clone());
                }
            }
        }
    }

    if failures.is_empty() {
        Ok(values)
    } else {
        Err(RecipeError::field_error(EMAILPASSWORD_RECIPE_ID, failures))
    }
}

fn required(values: &HashMap<String, String>, id: &str) -> Result<String, RecipeError> {
    values.get(id).cloned().ok_or_else(|| {
        RecipeError::bad_input(EMAILPASSWORD_RECIPE_ID, format!("missing form field {id:?}"))
    })
}

pub(super) async fn sign_up(
    recipe: &EmailPasswordRecipe,
    request: &ApiRequest,
    sink: &mut ResponseSink,
) -> Result<(), RecipeError> {
    let body: FormBody = request.json(EMAILPASSWORD_RECIPE_ID)?;
    let values = validate_form_fields(recipe.sign_up_fields(), &body.form_fields)?;
    let email = required(&values, EMAIL_FIELD_ID)?;
    let password = required(&values, PASSWORD_FIELD_ID)?;

    match recipe.core().sign_up(&email, &password).await? {
        SignUpOutcome::Created(user) => {
            recipe
                .session()
                .create_new_session(sink, &user.id, &json!({}), &json!({}))
                .await?;
            sink.send_json(StatusCode::OK, json!({"status": "OK", "user": user}));
            Ok(())
        }
        SignUpOutcome::EmailAlreadyExists => {
            sink.send_json(StatusCode::OK, json!({"status": "EMAIL_ALREADY_EXISTS_ERROR"}));
            Ok(())
        }
    }
}

pub(super) async fn sign_in(
    recipe: &EmailPasswordRecipe,
    request: &ApiRequest,
    sink: &mut ResponseSink,
) -> Result<(), RecipeError> {
    let body: FormBody = request.json(EMAILPASSWORD_RECIPE_ID)?;
    let values = validate_form_fields(recipe.sign_in_fields(), &body.form_fields)?;
    let email = required(&values, EMAIL_FIELD_ID)?;
    let password = required(&values, PASSWORD_FIELD_ID)?;

    match recipe.core().sign_in(&email, &password).await? {
        SignInOutcome::SignedIn(user) => {
            recipe
                .session()
                .create_new_session(sink, &user.id, &json!({}), &json!({}))
                .await?;
            sink.send_json(StatusCode::OK, json!({"status": "OK", "user": user}));
            Ok(())
        }
        SignInOutcome::WrongCredentials => {
            sink.send_json(StatusCode::OK, json!({"status": "WRONG_CREDENTIALS_ERROR"}));
            Ok(())
        }
    }
}

/// The response is `OK` whether or not the email is registered, so this
/// endpoint cannot be used to enumerate accounts.
pub(super) async fn generate_password_reset_token(
    recipe: &EmailPasswordRecipe,
    request: &ApiRequest,
    sink: &mut ResponseSink,
) -> Result<(), RecipeError> {
    let body: FormBody = request.json(EMAILPASSWORD_RECIPE_ID)?;
    let values = validate_form_fields(recipe.reset_token_fields(), &body.form_fields)?;
    let email = required(&values, EMAIL_FIELD_ID)?;

    let Some(user) = recipe.core().get_user_by_email(&email).await? else {
        sink.send_json(StatusCode::OK, json!({"status": "OK"}));
        return Ok(());
    };

    let token = match recipe.core().generate_password_reset_token(&user.id).await? {
        ResetTokenOutcome::Token(token) => token,
        // The user was deleted between the lookup and the token request.
        ResetTokenOutcome::UnknownUser => {
            sink.send_json(StatusCode::OK, json!({"status": "OK"}));
            return Ok(());
        }
    };

    let link = recipe.password_reset_link(&token);
    recipe
        .email_sender()
        .send_password_reset_email(&user, &link)
        .await
        .map_err(|err| {
            RecipeError::general(
                EMAILPASSWORD_RECIPE_ID,
                err.context("failed to send the password reset email"),
            )
        })?;

    sink.send_json(StatusCode::OK, json!({"status": "OK"}));
    Ok(())
}

pub(super) async fn password_reset(
    recipe: &EmailPasswordRecipe,
    request: &ApiRequest,
    sink: &mut ResponseSink,
) -> Result<(), RecipeError> {
    let body: ResetPasswordBody = request.json(EMAILPASSWORD_RECIPE_ID)?;
    let values = validate_form_fields(recipe.reset_password_fields(), &body.form_fields)?;
    let new_password = required(&values, PASSWORD_FIELD_ID)?;
    let token = body.token.ok_or_else(|| {
        RecipeError::bad_input(
            EMAILPASSWORD_RECIPE_ID,
            "Please provide the password reset token",
        )
    })?;

    match recipe.core().reset_password(&token, &new_password).await? {
        ResetPasswordOutcome::Done => {
            sink.send_json(StatusCode::OK, json!({"status": "OK"}));
            Ok(())
        }
        ResetPasswordOutcome::InvalidToken => {
            sink.send_json(
                StatusCode::OK,
                json!({"status": "RESET_PASSWORD_INVALID_TOKEN_ERROR"}),
            );
            Ok(())
        }
    }
}
