//! Token creation, parsing, and validation against the core.
//!
//! The three token kinds are only ever interpreted here: access tokens are
//! PASETO `v4.public` tokens verifiable locally with the core's published
//! key, refresh tokens are opaque single-use values only the core can
//! interpret, and anti-CSRF tokens are opaque strings compared verbatim.
//!
//! Flow Overview:
//! - The verification key is fetched once from the core handshake endpoint
//!   and cached for the process lifetime (write-once `RwLock`).
//! - `verify_access_token` is the fast local path: no network round trip.
//! - Create/refresh/revoke always round-trip to the core, which is the
//!   authority on rotation and theft detection.

use anyhow::{anyhow, Context};
use base64ct::{Base64, Encoding};
use pasetors::keys::AsymmetricPublicKey;
use pasetors::token::UntrustedToken;
use pasetors::version4::{PublicToken, V4};
use pasetors::Public;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::SESSION_RECIPE_ID;
use crate::error::RecipeError;
use crate::querier::Querier;

const HANDSHAKE_PATH: &str = "/recipe/handshake";
const SESSION_PATH: &str = "/recipe/session";
const SESSION_REFRESH_PATH: &str = "/recipe/session/refresh";
const SESSION_REMOVE_PATH: &str = "/recipe/session/remove";

/// An opaque signed token plus its expiry (unix millis).
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub token: String,
    pub expiry: i64,
}

/// The durable session record as reported by the core.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub handle: String,
    pub user_id: String,
    #[serde(rename = "userDataInJWT", default)]
    pub user_data_in_jwt: Value,
}

/// Everything the core hands back when a session is created or rotated.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub session: SessionInfo,
    pub access_token: TokenInfo,
    pub refresh_token: TokenInfo,
    pub id_refresh_token: TokenInfo,
    #[serde(default)]
    pub anti_csrf_token: Option<String>,
}

/// Claims carried inside a verified access token.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenClaims {
    pub session_handle: String,
    pub user_id: String,
    #[serde(rename = "userDataInJWT", default)]
    pub user_data_in_jwt: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anti_csrf_token: Option<String>,
    pub expiry_time: i64,
    pub time_created: i64,
}

/// Outcome of presenting a refresh token to the core.
pub enum RefreshOutcome {
    Rotated(Box<CreatedSession>),
    Unauthorised,
    TokenTheft {
        session_handle: String,
        user_id: String,
    },
}

/// Access-token verification failures the lifecycle maps to distinct errors.
pub enum AccessTokenFailure {
    /// Signature or structural failure: the token was tampered with or was
    /// never issued by the core.
    Invalid,
    /// Valid signature but past its expiry.
    Expired(AccessTokenClaims),
}

pub struct TokenCodec {
    querier: Arc<Querier>,
    verification_key: RwLock<Option<Vec<u8>>>,
}

impl TokenCodec {
    #[must_use]
    pub fn new(querier: Arc<Querier>) -> Self {
        Self {
            querier,
            verification_key: RwLock::new(None),
        }
    }

    /// Issue a full token set for a new session.
    ///
    /// # Errors
    /// Any backend failure is a `General` error; there is no partial success.
    pub async fn create_session(
        &self,
        user_id: &str,
        user_data_in_jwt: &Value,
        user_data_in_database: &Value,
        enable_anti_csrf: bool,
    ) -> Result<CreatedSession, RecipeError> {
        let body = json!({
            "userId": user_id,
            "userDataInJWT": user_data_in_jwt,
            "userDataInDatabase": user_data_in_database,
            "enableAntiCsrf": enable_anti_csrf,
        });
        let response = self
            .querier
            .send_post(SESSION_RECIPE_ID, SESSION_PATH, &body)
            .await
            .map_err(|err| RecipeError::general(SESSION_RECIPE_ID, err))?;

        serde_json::from_value(response)
            .context("core returned an invalid session payload")
            .map_err(|err| RecipeError::general(SESSION_RECIPE_ID, err))
    }

    /// Verify an access token locally. Expiry is reported separately from
    /// tampering so the caller can distinguish "refresh me" from "reject".
    ///
    /// # Errors
    /// `General` only when the verification key cannot be obtained at all.
    pub async fn verify_access_token(
        &self,
        token: &str,
        now_millis: i64,
    ) -> Result<Result<AccessTokenClaims, AccessTokenFailure>, RecipeError> {
        let key_bytes = self.verification_key().await?;
        let key = match AsymmetricPublicKey::<V4>::from(&key_bytes) {
            Ok(key) => key,
            Err(err) => {
                return Err(RecipeError::general(
                    SESSION_RECIPE_ID,
                    anyhow!("core published an invalid verification key: {err}"),
                ))
            }
        };

        let Ok(untrusted) = UntrustedToken::<Public, V4>::try_from(token) else {
            return Ok(Err(AccessTokenFailure::Invalid));
        };
        let Ok(trusted) = PublicToken::verify(&key, &untrusted, None, None) else {
            return Ok(Err(AccessTokenFailure::Invalid));
        };
        let Ok(claims) = serde_json::from_str::<AccessTokenClaims>(trusted.payload()) else {
            return Ok(Err(AccessTokenFailure::Invalid));
        };

        if claims.expiry_time <= now_millis {
            return Ok(Err(AccessTokenFailure::Expired(claims)));
        }
        Ok(Ok(claims))
    }

    /// Rotate a refresh token. The core serializes rotation per session and
    /// reports reuse of a superseded token as theft.
    ///
    /// # Errors
    /// Transport failures are `General`; protocol outcomes are data.
    pub async fn refresh_session(
        &self,
        refresh_token: &str,
        enable_anti_csrf: bool,
    ) -> Result<RefreshOutcome, RecipeError> {
        let body = json!({
            "refreshToken": refresh_token,
            "enableAntiCsrf": enable_anti_csrf,
        });
        let response = self
            .querier
            .send_post(SESSION_RECIPE_ID, SESSION_REFRESH_PATH, &body)
            .await
            .map_err(|err| RecipeError::general(SESSION_RECIPE_ID, err))?;

        match response.get("status").and_then(Value::as_str) {
            Some("OK") => {
                let created: CreatedSession = serde_json::from_value(response)
                    .context("core returned an invalid refresh payload")
                    .map_err(|err| RecipeError::general(SESSION_RECIPE_ID, err))?;
                Ok(RefreshOutcome::Rotated(Box::new(created)))
            }
            Some("UNAUTHORISED") => Ok(RefreshOutcome::Unauthorised),
            Some("TOKEN_THEFT_DETECTED") => {
                let session = response.get("session").cloned().unwrap_or_default();
                let session_handle = session
                    .get("handle")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let user_id = session
                    .get("userId")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(RefreshOutcome::TokenTheft {
                    session_handle,
                    user_id,
                })
            }
            other => Err(RecipeError::general(
                SESSION_RECIPE_ID,
                anyhow!("unexpected refresh status from core: {other:?}"),
            )),
        }
    }

    /// # Errors
    /// `General` on backend failure.
    pub async fn revoke_session(&self, session_handle: &str) -> Result<(), RecipeError> {
        let body = json!({ "sessionHandles": [session_handle] });
        self.querier
            .send_post(SESSION_RECIPE_ID, SESSION_REMOVE_PATH, &body)
            .await
            .map_err(|err| RecipeError::general(SESSION_RECIPE_ID, err))?;
        Ok(())
    }

    /// Revoke every session belonging to a user, the mandatory response to a
    /// theft signal.
    ///
    /// # Errors
    /// `General` on backend failure.
    pub async fn revoke_all_sessions_for_user(&self, user_id: &str) -> Result<(), RecipeError> {
        let body = json!({ "userId": user_id });
        self.querier
            .send_post(SESSION_RECIPE_ID, SESSION_REMOVE_PATH, &body)
            .await
            .map_err(|err| RecipeError::general(SESSION_RECIPE_ID, err))?;
        Ok(())
    }

    /// The cached core verification key, fetched on first use.
    async fn verification_key(&self) -> Result<Vec<u8>, RecipeError> {
        if let Some(key) = self.verification_key.read().await.clone() {
            return Ok(key);
        }

        let mut slot = self.verification_key.write().await;
        // Another request may have won the race while we waited.
        if let Some(key) = slot.clone() {
            return Ok(key);
        }

        let response = self
            .querier
            .send_post(SESSION_RECIPE_ID, HANDSHAKE_PATH, &json!({}))
            .await
            .map_err(|err| RecipeError::general(SESSION_RECIPE_ID, err))?;
        let encoded = response
            .get("accessTokenSigningPublicKey")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RecipeError::general(
                    SESSION_RECIPE_ID,
                    anyhow!("core handshake did not include a signing public key"),
                )
            })?;
        let key = Base64::decode_vec(encoded).map_err(|_| {
            RecipeError::general(
                SESSION_RECIPE_ID,
                anyhow!("core handshake key is not valid base64"),
            )
        })?;

        debug!("cached core access-token verification key");
        *slot = Some(key.clone());
        Ok(key)
    }
}
