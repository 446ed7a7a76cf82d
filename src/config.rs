//! Application-level configuration shared by every recipe.

use anyhow::Result;

use crate::normalised::{NormalisedURLDomain, NormalisedURLPath};

const DEFAULT_API_BASE_PATH: &str = "/auth";
const DEFAULT_WEBSITE_BASE_PATH: &str = "/auth";

/// Immutable, process-lifetime application info.
///
/// All domains and paths are normalized once here and never re-parsed on the
/// request path.
#[derive(Clone, Debug)]
pub struct AppInfo {
    app_name: String,
    api_domain: NormalisedURLDomain,
    website_domain: NormalisedURLDomain,
    api_base_path: NormalisedURLPath,
    website_base_path: NormalisedURLPath,
}

impl AppInfo {
    /// Build app info from raw configured values.
    ///
    /// # Errors
    /// Returns an error if either domain cannot be normalized.
    pub fn new(app_name: &str, api_domain: &str, website_domain: &str) -> Result<Self> {
        Ok(Self {
            app_name: app_name.to_string(),
            api_domain: NormalisedURLDomain::new(api_domain)?,
            website_domain: NormalisedURLDomain::new(website_domain)?,
            api_base_path: NormalisedURLPath::new(DEFAULT_API_BASE_PATH)?,
            website_base_path: NormalisedURLPath::new(DEFAULT_WEBSITE_BASE_PATH)?,
        })
    }

    /// Override the base path under which recipe APIs are mounted.
    ///
    /// # Errors
    /// Returns an error if the path cannot be normalized.
    pub fn with_api_base_path(mut self, path: &str) -> Result<Self> {
        self.api_base_path = NormalisedURLPath::new(path)?;
        Ok(self)
    }

    /// Override the website base path used when building user-facing links.
    ///
    /// # Errors
    /// Returns an error if the path cannot be normalized.
    pub fn with_website_base_path(mut self, path: &str) -> Result<Self> {
        self.website_base_path = NormalisedURLPath::new(path)?;
        Ok(self)
    }

    #[must_use]
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    #[must_use]
    pub fn api_domain(&self) -> &NormalisedURLDomain {
        &self.api_domain
    }

    #[must_use]
    pub fn website_domain(&self) -> &NormalisedURLDomain {
        &self.website_domain
    }

    #[must_use]
    pub fn api_base_path(&self) -> &NormalisedURLPath {
        &self.api_base_path
    }

    #[must_use]
    pub fn website_base_path(&self) -> &NormalisedURLPath {
        &self.website_base_path
    }
}
