//! Session cookie policy: user input, resolution, and startup validation.
//!
//! A misconfigured cross-site deployment must fail at startup, not produce
//! silently rejected cookies in production, so every invariant here is
//! checked against the final resolved values before the recipe is built.

use anyhow::{anyhow, bail, Result};
use axum::http::StatusCode;

use super::scope::{normalise_session_scope, top_level_domain};
use super::{SessionHandler, TheftHandler};
use crate::config::AppInfo;
use crate::normalised::NormalisedURLPath;

const DEFAULT_SESSION_EXPIRED_STATUS_CODE: u16 = 401;
pub(crate) const REFRESH_API_PATH: &str = "/session/refresh";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }

    /// Parse a user-supplied SameSite value.
    ///
    /// # Errors
    /// Returns an error for anything but `strict`, `lax`, or `none`.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lax" => Ok(Self::Lax),
            "none" => Ok(Self::None),
            other => Err(anyhow!(
                "cookie same site must be one of \"strict\", \"lax\", or \"none\", got {other:?}"
            )),
        }
    }
}

/// User-facing session configuration. All fields optional; defaults are
/// derived from the app info during [`SessionConfig::resolve`].
#[derive(Default)]
pub struct SessionConfig {
    cookie_domain: Option<String>,
    cookie_same_site: Option<SameSite>,
    cookie_secure: Option<bool>,
    session_expired_status_code: Option<u16>,
    enable_anti_csrf: Option<bool>,
    disable_default_refresh_api: bool,
    pub(crate) on_unauthorised: Option<SessionHandler>,
    pub(crate) on_try_refresh_token: Option<SessionHandler>,
    pub(crate) on_token_theft_detected: Option<TheftHandler>,
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cookie_domain(mut self, domain: &str) -> Self {
        self.cookie_domain = Some(domain.to_string());
        self
    }

    #[must_use]
    pub fn with_cookie_same_site(mut self, same_site: SameSite) -> Self {
        self.cookie_same_site = Some(same_site);
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = Some(secure);
        self
    }

    #[must_use]
    pub fn with_session_expired_status_code(mut self, code: u16) -> Self {
        self.session_expired_status_code = Some(code);
        self
    }

    #[must_use]
    pub fn with_enable_anti_csrf(mut self, enabled: bool) -> Self {
        self.enable_anti_csrf = Some(enabled);
        self
    }

    /// Keep the refresh route declared but never matched, so the application
    /// can mount its own implementation.
    #[must_use]
    pub fn disable_default_refresh_api(mut self) -> Self {
        self.disable_default_refresh_api = true;
        self
    }

    #[must_use]
    pub fn with_on_unauthorised(mut self, handler: SessionHandler) -> Self {
        self.on_unauthorised = Some(handler);
        self
    }

    #[must_use]
    pub fn with_on_try_refresh_token(mut self, handler: SessionHandler) -> Self {
        self.on_try_refresh_token = Some(handler);
        self
    }

    #[must_use]
    pub fn with_on_token_theft_detected(mut self, handler: TheftHandler) -> Self {
        self.on_token_theft_detected = Some(handler);
        self
    }

    /// Resolve defaults against the app info and validate the result.
    ///
    /// Defaults: SameSite `Lax` when API and website share a registrable
    /// domain, `None` otherwise; `Secure` from the API domain scheme;
    /// anti-CSRF auto-enabled whenever the resolved SameSite is `None` and
    /// the user did not decide themselves.
    ///
    /// # Errors
    /// Fails when SameSite `None` is combined with anti-CSRF disabled, or
    /// with insecure transport outside localhost/IP deployments.
    pub(crate) fn resolve(self, app_info: &AppInfo) -> Result<(SessionPolicy, SessionHooks)> {
        let cookie_domain = self
            .cookie_domain
            .as_deref()
            .map(normalise_session_scope)
            .transpose()?;

        let top_level_api_domain = top_level_domain(app_info.api_domain().as_str())?;
        let top_level_website_domain = top_level_domain(app_info.website_domain().as_str())?;

        let cookie_same_site = self.cookie_same_site.unwrap_or({
            if top_level_api_domain == top_level_website_domain {
                SameSite::Lax
            } else {
                SameSite::None
            }
        });

        let cookie_secure = self
            .cookie_secure
            .unwrap_or_else(|| app_info.api_domain().is_https());

        let enable_anti_csrf = self
            .enable_anti_csrf
            .unwrap_or(cookie_same_site == SameSite::None);

        let session_expired_status_code = StatusCode::from_u16(
            self.session_expired_status_code
                .unwrap_or(DEFAULT_SESSION_EXPIRED_STATUS_CODE),
        )
        .map_err(|_| anyhow!("invalid sessionExpiredStatusCode"))?;

        if cookie_same_site == SameSite::None && !enable_anti_csrf {
            bail!(
                "security error: anti-CSRF cannot be disabled when cookieSameSite is \"none\""
            );
        }

        let local_api = top_level_api_domain == "localhost";
        let local_website = top_level_website_domain == "localhost";
        if cookie_same_site == SameSite::None && !cookie_secure && !local_api && !local_website {
            bail!(
                "since the API and website domains are cross-site, cookies require https on the \
                 API domain; do not set cookieSecure to false"
            );
        }

        let policy = SessionPolicy {
            cookie_domain,
            cookie_same_site,
            cookie_secure,
            session_expired_status_code,
            enable_anti_csrf,
            access_token_path: NormalisedURLPath::new("/")?,
            refresh_token_path: app_info
                .api_base_path()
                .append(&NormalisedURLPath::new(REFRESH_API_PATH)?),
            disable_default_refresh_api: self.disable_default_refresh_api,
        };
        let hooks = SessionHooks {
            on_unauthorised: self.on_unauthorised,
            on_try_refresh_token: self.on_try_refresh_token,
            on_token_theft_detected: self.on_token_theft_detected,
        };
        Ok((policy, hooks))
    }
}

/// User-supplied error handler overrides, split out of the resolved policy so
/// the policy stays `Clone + Debug`.
#[derive(Default)]
pub(crate) struct SessionHooks {
    pub(crate) on_unauthorised: Option<SessionHandler>,
    pub(crate) on_try_refresh_token: Option<SessionHandler>,
    pub(crate) on_token_theft_detected: Option<TheftHandler>,
}

/// Fully resolved cookie policy, immutable for the process lifetime.
#[derive(Clone, Debug)]
pub struct SessionPolicy {
    pub(crate) cookie_domain: Option<String>,
    pub(crate) cookie_same_site: SameSite,
    pub(crate) cookie_secure: bool,
    pub(crate) session_expired_status_code: StatusCode,
    pub(crate) enable_anti_csrf: bool,
    pub(crate) access_token_path: NormalisedURLPath,
    pub(crate) refresh_token_path: NormalisedURLPath,
    pub(crate) disable_default_refresh_api: bool,
}

impl SessionPolicy {
    #[must_use]
    pub fn enable_anti_csrf(&self) -> bool {
        self.enable_anti_csrf
    }

    #[must_use]
    pub fn session_expired_status_code(&self) -> StatusCode {
        self.session_expired_status_code
    }

    #[must_use]
    pub fn refresh_token_path(&self) -> &NormalisedURLPath {
        &self.refresh_token_path
    }
}
