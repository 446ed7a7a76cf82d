//! Canonical forms for configured domains and paths.
//!
//! All domain/path comparisons in the crate are plain string comparisons on
//! these normalized values, so normalization happens exactly once at startup.

use anyhow::{anyhow, Context, Result};
use url::Url;

/// A domain reduced to `scheme://host[:port]`, lower-cased, with no path and
/// no trailing slash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalisedURLDomain(String);

impl NormalisedURLDomain {
    /// Normalize a configured domain.
    ///
    /// Accepts bare hosts (`example.com`), protocol-relative inputs
    /// (`//example.com`) and full URLs. Hosts without a scheme default to
    /// `https://`, except `localhost` and IP literals which default to
    /// `http://`.
    ///
    /// # Errors
    /// Returns an error when no valid host can be derived from the input.
    pub fn new(input: &str) -> Result<Self> {
        let mut input = input.trim().to_lowercase();

        if let Some(rest) = input.strip_prefix("//") {
            input = rest.to_string();
        }

        if !input.contains("://") {
            let host_part = input
                .split(['/', ':'])
                .next()
                .unwrap_or_default()
                .to_string();
            let scheme = if host_part == "localhost" || is_ip_address(&host_part) {
                "http://"
            } else {
                "https://"
            };
            input = format!("{scheme}{input}");
        }

        let url = Url::parse(&input).with_context(|| "invalid domain".to_string())?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("invalid domain: no host in input"))?;

        let mut normalised = format!("{}://{host}", url.scheme());
        if let Some(port) = url.port() {
            normalised.push_str(&format!(":{port}"));
        }

        Ok(Self(normalised))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_https(&self) -> bool {
        self.0.starts_with("https://")
    }
}

impl std::fmt::Display for NormalisedURLDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A path with a guaranteed leading `/` and no trailing `/`.
/// The root path normalizes to the empty string so concatenation is cheap.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NormalisedURLPath(String);

impl NormalisedURLPath {
    /// Normalize a path. Full URLs are accepted and reduced to their path
    /// component.
    ///
    /// # Errors
    /// Returns an error when the input is a URL that cannot be parsed.
    pub fn new(input: &str) -> Result<Self> {
        let mut path = input.trim().to_string();

        if path.contains("://") || path.starts_with("//") {
            let with_scheme = if path.starts_with("//") {
                format!("https:{path}")
            } else {
                path.clone()
            };
            let url = Url::parse(&with_scheme).with_context(|| "invalid path".to_string())?;
            path = url.path().to_string();
        }

        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        while path.len() > 1 && path.ends_with('/') {
            path.pop();
        }
        if path == "/" {
            path.clear();
        }

        Ok(Self(path))
    }

    /// Concatenate two normalized paths.
    #[must_use]
    pub fn append(&self, other: &Self) -> Self {
        Self(format!("{}{}", self.0, other.0))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for NormalisedURLPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            f.write_str("/")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// IP literals get special treatment in cookie scoping rules.
#[must_use]
pub fn is_ip_address(host: &str) -> bool {
    host.parse::<std::net::IpAddr>().is_ok()
}
