//! Domain scoping rules for session cookies.
//!
//! Browser cookie-scoping is syntactic: these helpers reduce configured
//! domains to the exact strings browsers compare so SameSite classification
//! and `Domain` attributes line up with what browsers actually do.

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::normalised::is_ip_address;

/// Normalize a configured cookie-domain scope.
///
/// Lower-cases and strips the scheme. A leading dot means "include
/// subdomains" and is preserved in the output, except for `localhost` and IP
/// literals where subdomain scoping is meaningless.
///
/// # Errors
/// Returns an error when the remaining string is not a valid hostname.
pub fn normalise_session_scope(raw: &str) -> Result<String> {
    let trimmed = raw.trim().to_lowercase();
    let had_leading_dot = trimmed.starts_with('.');
    let without_dot = trimmed.trim_start_matches('.');

    let with_scheme = if without_dot.contains("://") {
        without_dot.to_string()
    } else {
        format!("http://{without_dot}")
    };

    let url = Url::parse(&with_scheme).context("invalid session scope")?;
    let hostname = url
        .host_str()
        .ok_or_else(|| anyhow!("invalid session scope: no hostname"))?
        .to_string();

    if hostname == "localhost" || is_ip_address(&hostname) {
        return Ok(hostname);
    }
    if had_leading_dot {
        return Ok(format!(".{hostname}"));
    }
    Ok(hostname)
}

/// The public-suffix registrable domain used for SameSite classification.
///
/// `localhost` (including `localhost.org` style hosts used in dev) and IP
/// literals all map to `"localhost"` so local setups count as same-site.
///
/// # Errors
/// Returns an error when the URL is malformed or no registrable domain can
/// be derived from the host.
pub fn top_level_domain(url: &str) -> Result<String> {
    let parsed = Url::parse(url).with_context(|| "invalid URL for domain resolution")?;
    let hostname = parsed
        .host_str()
        .ok_or_else(|| anyhow!("no host in URL for domain resolution"))?;

    if hostname.starts_with("localhost") || is_ip_address(hostname) {
        return Ok("localhost".to_string());
    }

    psl::domain_str(hostname)
        .map(ToString::to_string)
        .ok_or_else(|| {
            anyhow!("could not derive a registrable domain from {hostname}; check the apiDomain and websiteDomain values")
        })
}
