//! Form-field definitions, validators, and the email delivery seam.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::info;

use crate::recipe::BoxFut;

pub const EMAIL_FIELD_ID: &str = "email";
pub const PASSWORD_FIELD_ID: &str = "password";

const MAX_PASSWORD_LENGTH: usize = 100;
const MIN_PASSWORD_LENGTH: usize = 8;

/// An end user of the emailpassword recipe, as stored by the core.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
}

/// A form field value submitted by a frontend.
#[derive(Clone, Debug, Deserialize)]
pub struct FormFieldValue {
    pub id: String,
    pub value: String,
}

/// Returns `None` when the value passes, or the user-facing error message.
pub type Validator = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// One field the sign-up form expects, with its validation rule.
#[derive(Clone)]
pub struct FormFieldSpec {
    pub id: String,
    pub validate: Validator,
    pub optional: bool,
}

impl FormFieldSpec {
    #[must_use]
    pub fn new(id: &str, validate: Validator, optional: bool) -> Self {
        Self {
            id: id.to_string(),
            validate,
            optional,
        }
    }
}

#[must_use]
pub fn default_email_validator() -> Validator {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    Arc::new(|value: &str| {
        let regex = EMAIL_REGEX
            .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));
        if regex.is_match(value) {
            None
        } else {
            Some("Email is invalid".to_string())
        }
    })
}

#[must_use]
pub fn default_password_validator() -> Validator {
    Arc::new(|value: &str| {
        if value.len() < MIN_PASSWORD_LENGTH {
            return Some(
                "Password must contain at least 8 characters, including a number".to_string(),
            );
        }
        if value.len() >= MAX_PASSWORD_LENGTH {
            return Some("Password's length must be lesser than 100 characters".to_string());
        }
        if !value.chars().any(|c| c.is_ascii_alphabetic()) {
            return Some("Password must contain at least one alphabet".to_string());
        }
        if !value.chars().any(|c| c.is_ascii_digit()) {
            return Some("Password must contain at least one number".to_string());
        }
        None
    })
}

/// Accepts anything; sign-in must not leak password policy changes.
#[must_use]
pub fn accept_any_validator() -> Validator {
    Arc::new(|_: &str| None)
}

/// Delivery seam for password-reset emails. Swap in a real mailer in
/// production; the default logs the link.
pub trait ResetEmailSender: Send + Sync {
    fn send_password_reset_email<'a>(
        &'a self,
        user: &'a User,
        link: &'a str,
    ) -> BoxFut<'a, anyhow::Result<()>>;
}

/// Default sender: logs the reset link instead of emailing it.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogResetEmailSender;

impl ResetEmailSender for LogResetEmailSender {
    fn send_password_reset_email<'a>(
        &'a self,
        user: &'a User,
        link: &'a str,
    ) -> BoxFut<'a, anyhow::Result<()>> {
        Box::pin(async move {
            info!(user = %user.id, "password reset link: {link}");
            Ok(())
        })
    }
}

/// User-facing configuration for the emailpassword recipe.
#[derive(Default)]
pub struct EmailPasswordConfig {
    pub(crate) extra_sign_up_fields: Vec<FormFieldSpec>,
    pub(crate) reset_password_path: Option<String>,
    pub(crate) email_sender: Option<Arc<dyn ResetEmailSender>>,
    pub(crate) disable_sign_up_api: bool,
    pub(crate) disable_sign_in_api: bool,
    pub(crate) disable_reset_password_apis: bool,
}

impl EmailPasswordConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a custom sign-up form field. `email` and `password` are always
    /// present and cannot be redeclared.
    #[must_use]
    pub fn with_sign_up_field(mut self, field: FormFieldSpec) -> Self {
        self.extra_sign_up_fields.push(field);
        self
    }

    /// Override the website path the reset link points at. Default is
    /// `{websiteBasePath}/reset-password`.
    #[must_use]
    pub fn with_reset_password_path(mut self, path: &str) -> Self {
        self.reset_password_path = Some(path.to_string());
        self
    }

    #[must_use]
    pub fn with_email_sender(mut self, sender: Arc<dyn ResetEmailSender>) -> Self {
        self.email_sender = Some(sender);
        self
    }

    /// Keep the sign-up route declared but never matched, so the application
    /// can mount its own implementation.
    #[must_use]
    pub fn disable_sign_up_api(mut self) -> Self {
        self.disable_sign_up_api = true;
        self
    }

    #[must_use]
    pub fn disable_sign_in_api(mut self) -> Self {
        self.disable_sign_in_api = true;
        self
    }

    /// Disables both password-reset routes.
    #[must_use]
    pub fn disable_reset_password_apis(mut self) -> Self {
        self.disable_reset_password_apis = true;
        self
    }
}
