//! Cookie and header transport for session tokens.
//!
//! Cookie names and script-visible headers are a compatibility surface shared
//! with frontend SDKs; do not rename them. Clearing writes the exact same
//! attribute set used when setting, otherwise browsers treat the clear as a
//! different cookie and keep the stale credential.

use axum::http::header::{HeaderName, ACCESS_CONTROL_EXPOSE_HEADERS, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use base64ct::{Base64, Encoding};
use chrono::Utc;
use serde_json::json;

use super::codec::CreatedSession;
use super::config::SessionPolicy;
use super::SESSION_RECIPE_ID;
use crate::error::RecipeError;
use crate::normalised::NormalisedURLPath;
use crate::response::ResponseSink;

pub const ACCESS_TOKEN_COOKIE: &str = "sAccessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "sRefreshToken";
pub const ID_REFRESH_TOKEN_COOKIE: &str = "sIdRefreshToken";
pub const ANTI_CSRF_HEADER: &str = "anti-csrf";
pub const ID_REFRESH_TOKEN_HEADER: &str = "id-refresh-token";
pub const FRONT_TOKEN_HEADER: &str = "front-token";

/// Attach every token from a create/refresh result to the response.
///
/// # Errors
/// `General` if a value cannot be encoded as a header.
pub fn attach_tokens(
    sink: &mut ResponseSink,
    policy: &SessionPolicy,
    created: &CreatedSession,
) -> Result<(), RecipeError> {
    set_front_token(
        sink,
        &created.session.user_id,
        created.access_token.expiry,
        &created.session.user_data_in_jwt,
    )?;
    attach_access_token(sink, policy, &created.access_token.token, created.access_token.expiry)?;
    attach_refresh_token(
        sink,
        policy,
        &created.refresh_token.token,
        created.refresh_token.expiry,
    )?;
    set_id_refresh_token(
        sink,
        policy,
        &created.id_refresh_token.token,
        created.id_refresh_token.expiry,
    )?;
    if let Some(anti_csrf_token) = &created.anti_csrf_token {
        set_anti_csrf_header(sink, anti_csrf_token)?;
    }
    Ok(())
}

/// # Errors
/// `General` if the cookie cannot be encoded as a header value.
pub fn attach_access_token(
    sink: &mut ResponseSink,
    policy: &SessionPolicy,
    token: &str,
    expiry: i64,
) -> Result<(), RecipeError> {
    let cookie = format_cookie(
        ACCESS_TOKEN_COOKIE,
        token,
        policy,
        &policy.access_token_path,
        max_age_from_expiry(expiry),
    );
    append_set_cookie(sink, &cookie)
}

/// The refresh token cookie is scoped to the refresh endpoint path so the
/// browser only presents it where rotation can happen.
///
/// # Errors
/// `General` if the cookie cannot be encoded as a header value.
pub fn attach_refresh_token(
    sink: &mut ResponseSink,
    policy: &SessionPolicy,
    token: &str,
    expiry: i64,
) -> Result<(), RecipeError> {
    let cookie = format_cookie(
        REFRESH_TOKEN_COOKIE,
        token,
        policy,
        &policy.refresh_token_path,
        max_age_from_expiry(expiry),
    );
    append_set_cookie(sink, &cookie)
}

/// The id-refresh marker is written twice: an HttpOnly cookie for the
/// backend, and a script-readable header (`{token};{expiry}`) so frontends
/// can tell whether a session might exist.
///
/// # Errors
/// `General` if a value cannot be encoded as a header.
pub fn set_id_refresh_token(
    sink: &mut ResponseSink,
    policy: &SessionPolicy,
    token: &str,
    expiry: i64,
) -> Result<(), RecipeError> {
    let cookie = format_cookie(
        ID_REFRESH_TOKEN_COOKIE,
        token,
        policy,
        &policy.access_token_path,
        max_age_from_expiry(expiry),
    );
    append_set_cookie(sink, &cookie)?;

    let header_value = header_value(&format!("{token};{expiry}"))?;
    sink.set_header(HeaderName::from_static(ID_REFRESH_TOKEN_HEADER), header_value);
    expose_header(sink, ID_REFRESH_TOKEN_HEADER)?;
    Ok(())
}

/// # Errors
/// `General` if the token cannot be encoded as a header value.
pub fn set_anti_csrf_header(sink: &mut ResponseSink, token: &str) -> Result<(), RecipeError> {
    sink.set_header(HeaderName::from_static(ANTI_CSRF_HEADER), header_value(token)?);
    expose_header(sink, ANTI_CSRF_HEADER)?;
    Ok(())
}

/// Non-sensitive session metadata for browser script: user id, access-token
/// expiry, and the JWT payload, base64-encoded JSON.
///
/// # Errors
/// `General` if the value cannot be encoded as a header.
pub fn set_front_token(
    sink: &mut ResponseSink,
    user_id: &str,
    access_token_expiry: i64,
    user_data_in_jwt: &serde_json::Value,
) -> Result<(), RecipeError> {
    let payload = json!({
        "uid": user_id,
        "ate": access_token_expiry,
        "up": user_data_in_jwt,
    });
    let encoded = Base64::encode_string(payload.to_string().as_bytes());
    sink.set_header(HeaderName::from_static(FRONT_TOKEN_HEADER), header_value(&encoded)?);
    expose_header(sink, FRONT_TOKEN_HEADER)?;
    Ok(())
}

/// Expire every session cookie and signal removal to frontend script.
///
/// Clearing is unconditional and idempotent: the same attribute set used to
/// set each cookie is written again with an immediate expiry.
///
/// # Errors
/// `General` if a value cannot be encoded as a header.
pub fn clear_all_session_tokens(
    sink: &mut ResponseSink,
    policy: &SessionPolicy,
) -> Result<(), RecipeError> {
    append_set_cookie(
        sink,
        &format_cookie(ACCESS_TOKEN_COOKIE, "", policy, &policy.access_token_path, 0),
    )?;
    append_set_cookie(
        sink,
        &format_cookie(REFRESH_TOKEN_COOKIE, "", policy, &policy.refresh_token_path, 0),
    )?;
    append_set_cookie(
        sink,
        &format_cookie(ID_REFRESH_TOKEN_COOKIE, "", policy, &policy.access_token_path, 0),
    )?;
    sink.set_header(
        HeaderName::from_static(ID_REFRESH_TOKEN_HEADER),
        HeaderValue::from_static("remove"),
    );
    expose_header(sink, ID_REFRESH_TOKEN_HEADER)?;
    Ok(())
}

#[must_use]
pub fn read_access_token(headers: &HeaderMap) -> Option<String> {
    read_cookie(headers, ACCESS_TOKEN_COOKIE)
}

#[must_use]
pub fn read_refresh_token(headers: &HeaderMap) -> Option<String> {
    read_cookie(headers, REFRESH_TOKEN_COOKIE)
}

#[must_use]
pub fn read_id_refresh_token(headers: &HeaderMap) -> Option<String> {
    read_cookie(headers, ID_REFRESH_TOKEN_COOKIE)
}

#[must_use]
pub fn read_anti_csrf_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ANTI_CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else { continue };
        for pair in value.split(';') {
            // Pairs without a `=` (flag-style cookies) are skipped, not fatal.
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            if key.trim() == name && !val.trim().is_empty() {
                return Some(val.trim().to_string());
            }
        }
    }
    None
}

fn format_cookie(
    name: &str,
    value: &str,
    policy: &SessionPolicy,
    path: &NormalisedURLPath,
    max_age: i64,
) -> String {
    let mut cookie = format!(
        "{name}={value}; Path={path}; HttpOnly; SameSite={}; Max-Age={max_age}",
        policy.cookie_same_site.as_str()
    );
    if let Some(domain) = &policy.cookie_domain {
        cookie.push_str(&format!("; Domain={domain}"));
    }
    if policy.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn max_age_from_expiry(expiry_millis: i64) -> i64 {
    ((expiry_millis - Utc::now().timestamp_millis()) / 1000).max(0)
}

fn append_set_cookie(sink: &mut ResponseSink, cookie: &str) -> Result<(), RecipeError> {
    sink.append_header(SET_COOKIE, header_value(cookie)?);
    Ok(())
}

fn header_value(value: &str) -> Result<HeaderValue, RecipeError> {
    HeaderValue::from_str(value).map_err(|err| {
        RecipeError::general(
            SESSION_RECIPE_ID,
            anyhow::anyhow!("invalid header value: {err}"),
        )
    })
}

fn expose_header(sink: &mut ResponseSink, name: &str) -> Result<(), RecipeError> {
    sink.append_header(ACCESS_CONTROL_EXPOSE_HEADERS, header_value(name)?);
    Ok(())
}
