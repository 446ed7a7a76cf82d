//! Typed protocol errors carrying the owning recipe's identifier.
//!
//! The dispatcher routes a [`RecipeError`] back to the module named by
//! `recipe_id`; only that module's `handle_error` decides the HTTP shape.
//! Startup/configuration failures are plain `anyhow::Error` values returned
//! from constructors and are fatal.

use serde::Serialize;
use thiserror::Error;

/// A single failed form field, reported back in a `FIELD_ERROR` body.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct FormFieldError {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("unauthorised: {0}")]
    Unauthorised(String),
    #[error("try refresh token: {0}")]
    TryRefreshToken(String),
    #[error("token theft detected for session {session_handle}")]
    TokenTheftDetected {
        session_handle: String,
        user_id: String,
    },
    #[error("field validation failed")]
    FieldError(Vec<FormFieldError>),
    #[error("bad input: {0}")]
    BadInput(String),
    #[error(transparent)]
    General(anyhow::Error),
}

/// Protocol error raised by a recipe and funneled through the dispatcher.
#[derive(Debug, Error)]
#[error("[{recipe_id}] {kind}")]
pub struct RecipeError {
    pub recipe_id: &'static str,
    pub kind: ErrorKind,
}

impl RecipeError {
    #[must_use]
    pub fn unauthorised(recipe_id: &'static str, message: impl Into<String>) -> Self {
        Self {
            recipe_id,
            kind: ErrorKind::Unauthorised(message.into()),
        }
    }

    #[must_use]
    pub fn try_refresh_token(recipe_id: &'static str, message: impl Into<String>) -> Self {
        Self {
            recipe_id,
            kind: ErrorKind::TryRefreshToken(message.into()),
        }
    }

    #[must_use]
    pub fn token_theft_detected(
        recipe_id: &'static str,
        session_handle: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            recipe_id,
            kind: ErrorKind::TokenTheftDetected {
                session_handle: session_handle.into(),
                user_id: user_id.into(),
            },
        }
    }

    #[must_use]
    pub fn field_error(recipe_id: &'static str, fields: Vec<FormFieldError>) -> Self {
        Self {
            recipe_id,
            kind: ErrorKind::FieldError(fields),
        }
    }

    #[must_use]
    pub fn bad_input(recipe_id: &'static str, message: impl Into<String>) -> Self {
        Self {
            recipe_id,
            kind: ErrorKind::BadInput(message.into()),
        }
    }

    #[must_use]
    pub fn general(recipe_id: &'static str, err: anyhow::Error) -> Self {
        Self {
            recipe_id,
            kind: ErrorKind::General(err),
        }
    }
}
