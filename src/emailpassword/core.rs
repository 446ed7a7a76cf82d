//! Typed calls to the core's emailpassword endpoints.
//!
//! Every call returns protocol outcomes as data; only transport and
//! malformed-payload failures become errors. The core is the sole authority
//! on credentials and reset tokens.

use anyhow::{anyhow, Context};
use serde_json::{json, Value};
use std::sync::Arc;

use super::types::User;
use super::EMAILPASSWORD_RECIPE_ID;
use crate::error::RecipeError;
use crate::querier::Querier;

const SIGNUP_PATH: &str = "/recipe/signup";
const SIGNIN_PATH: &str = "/recipe/signin";
const USER_PATH: &str = "/recipe/user";
const RESET_TOKEN_PATH: &str = "/recipe/user/password/reset/token";
const RESET_PASSWORD_PATH: &str = "/recipe/user/password/reset";

pub enum SignUpOutcome {
    Created(User),
    EmailAlreadyExists,
}

pub enum SignInOutcome {
    SignedIn(User),
    WrongCredentials,
}

pub enum ResetTokenOutcome {
    Token(String),
    UnknownUser,
}

pub enum ResetPasswordOutcome {
    Done,
    InvalidToken,
}

pub struct CoreClient {
    querier: Arc<Querier>,
}

impl CoreClient {
    #[must_use]
    pub fn new(querier: Arc<Querier>) -> Self {
        Self { querier }
    }

    /// # Errors
    /// `General` on transport failure or a malformed core payload.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, RecipeError> {
        let body = json!({ "email": email, "password": password });
        let response = self.post(SIGNUP_PATH, &body).await?;
        match status_of(&response)? {
            "OK" => Ok(SignUpOutcome::Created(user_of(&response)?)),
            "EMAIL_ALREADY_EXISTS_ERROR" => Ok(SignUpOutcome::EmailAlreadyExists),
            other => Err(self.unexpected_status(SIGNUP_PATH, other)),
        }
    }

    /// # Errors
    /// `General` on transport failure or a malformed core payload.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SignInOutcome, RecipeError> {
        let body = json!({ "email": email, "password": password });
        let response = self.post(SIGNIN_PATH, &body).await?;
        match status_of(&response)? {
            "OK" => Ok(SignInOutcome::SignedIn(user_of(&response)?)),
            "WRONG_CREDENTIALS_ERROR" => Ok(SignInOutcome::WrongCredentials),
            other => Err(self.unexpected_status(SIGNIN_PATH, other)),
        }
    }

    /// # Errors
    /// `General` on transport failure or a malformed core payload.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RecipeError> {
        let response = self
            .querier
            .send_get(EMAILPASSWORD_RECIPE_ID, USER_PATH, &[("email", email)])
            .await
            .map_err(|err| RecipeError::general(EMAILPASSWORD_RECIPE_ID, err))?;
        match status_of(&response)? {
            "OK" => Ok(Some(user_of(&response)?)),
            "UNKNOWN_EMAIL_ERROR" => Ok(None),
            other => Err(self.unexpected_status(USER_PATH, other)),
        }
    }

    /// # Errors
    /// `General` on transport failure or a malformed core payload.
    pub async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, RecipeError> {
        let response = self
            .querier
            .send_get(EMAILPASSWORD_RECIPE_ID, USER_PATH, &[("userId", user_id)])
            .await
            .map_err(|err| RecipeError::general(EMAILPASSWORD_RECIPE_ID, err))?;
        match status_of(&response)? {
            "OK" => Ok(Some(user_of(&response)?)),
            "UNKNOWN_USER_ID_ERROR" => Ok(None),
            other => Err(self.unexpected_status(USER_PATH, other)),
        }
    }

    /// # Errors
    /// `General` on transport failure or a malformed core payload.
    pub async fn generate_password_reset_token(
        &self,
        user_id: &str,
    ) -> Result<ResetTokenOutcome, RecipeError> {
        let body = json!({ "userId": user_id });
        let response = self.post(RESET_TOKEN_PATH, &body).await?;
        match status_of(&response)? {
            "OK" => {
                let token = response
                    .get("token")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        RecipeError::general(
                            EMAILPASSWORD_RECIPE_ID,
                            anyhow!("core reset-token response is missing the token"),
                        )
                    })?
                    .to_string();
                Ok(ResetTokenOutcome::Token(token))
            }
            "UNKNOWN_USER_ID_ERROR" => Ok(ResetTokenOutcome::UnknownUser),
            other => Err(self.unexpected_status(RESET_TOKEN_PATH, other)),
        }
    }

    /// # Errors
    /// `General` on transport failure or a malformed core payload.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<ResetPasswordOutcome, RecipeError> {
        let body = json!({
            "method": "token",
            "token": token,
            "newPassword": new_password,
        });
        let response = self.post(RESET_PASSWORD_PATH, &body).await?;
        match status_of(&response)? {
            "OK" => Ok(ResetPasswordOutcome::Done),
            "RESET_PASSWORD_INVALID_TOKEN_ERROR" => Ok(ResetPasswordOutcome::InvalidToken),
            other => Err(self.unexpected_status(RESET_PASSWORD_PATH, other)),
        }
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, RecipeError> {
        self.querier
            .send_post(EMAILPASSWORD_RECIPE_ID, path, body)
            .await
            .map_err(|err| RecipeError::general(EMAILPASSWORD_RECIPE_ID, err))
    }

    fn unexpected_status(&self, path: &str, status: &str) -> RecipeError {
        RecipeError::general(
            EMAILPASSWORD_RECIPE_ID,
            anyhow!("unexpected core status {status:?} for {path}"),
        )
    }
}

fn status_of(response: &Value) -> Result<&str, RecipeError> {
    response
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            RecipeError::general(
                EMAILPASSWORD_RECIPE_ID,
                anyhow!("core response is missing a status"),
            )
        })
}

fn user_of(response: &Value) -> Result<User, RecipeError> {
    let user = response.get("user").cloned().ok_or_else(|| {
        RecipeError::general(
            EMAILPASSWORD_RECIPE_ID,
            anyhow!("core response is missing the user"),
        )
    })?;
    serde_json::from_value(user)
        .context("core returned an invalid user payload")
        .map_err(|err| RecipeError::general(EMAILPASSWORD_RECIPE_ID, err))
}
