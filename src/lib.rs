//! Session management and auth recipe middleware for axum/tower services.
//!
//! The crate sits between a trusted token-issuing core and an application's
//! HTTP surface. Feature units ("recipes") own routes under a common API
//! base path and are dispatched by a tower layer; everything else passes
//! through to the application untouched.
//!
//! ```no_run
//! use soglia::querier::CoreConnection;
//! use soglia::session::config::SessionConfig;
//! use soglia::{AppInfo, Soglia};
//!
//! # fn main() -> anyhow::Result<()> {
//! let app_info = AppInfo::new("Demo", "https://api.example.com", "https://example.com")?;
//! let soglia = Soglia::builder()
//!     .with_app_info(app_info)
//!     .with_core(CoreConnection::new("http://localhost:3567"))
//!     .with_session(SessionConfig::new())
//!     .build()?;
//!
//! let app = axum::Router::<()>::new().layer(soglia.layer());
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod emailpassword;
pub mod error;
pub mod middleware;
pub mod normalised;
pub mod querier;
pub mod recipe;
pub mod registry;
pub mod response;
pub mod session;

use anyhow::{anyhow, Result};
use std::sync::Arc;

pub use config::AppInfo;

use emailpassword::types::EmailPasswordConfig;
use emailpassword::EmailPasswordRecipe;
use middleware::SogliaLayer;
use querier::{CoreConnection, Querier};
use recipe::RecipeModule;
use registry::RecipeRegistry;
use session::config::SessionConfig;
use session::SessionRecipe;

/// Process-wide context: resolved configuration plus the recipe registry.
/// Built once at startup, shared behind an [`Arc`].
pub struct Soglia {
    app_info: AppInfo,
    registry: RecipeRegistry,
    session: Arc<SessionRecipe>,
    emailpassword: Option<Arc<EmailPasswordRecipe>>,
}

impl Soglia {
    #[must_use]
    pub fn builder() -> SogliaBuilder {
        SogliaBuilder::default()
    }

    #[must_use]
    pub fn app_info(&self) -> &AppInfo {
        &self.app_info
    }

    #[must_use]
    pub fn registry(&self) -> &RecipeRegistry {
        &self.registry
    }

    /// The session recipe, always present.
    #[must_use]
    pub fn session(&self) -> &Arc<SessionRecipe> {
        &self.session
    }

    #[must_use]
    pub fn emailpassword(&self) -> Option<&Arc<EmailPasswordRecipe>> {
        self.emailpassword.as_ref()
    }

    /// The tower layer that dispatches recipe-owned routes.
    #[must_use]
    pub fn layer(self: &Arc<Self>) -> SogliaLayer {
        SogliaLayer::new(self.clone())
    }

    /// Headers the application should allow through CORS, aggregated across
    /// every registered recipe.
    #[must_use]
    pub fn all_cors_headers(&self) -> Vec<&'static str> {
        let mut headers: Vec<&'static str> = vec!["rid", "fdi-version"];
        for module in self.registry.modules() {
            for header in module.all_cors_headers() {
                if !headers.contains(&header) {
                    headers.push(header);
                }
            }
        }
        headers
    }
}

/// Builder for [`Soglia`]. App info and the core connection are required;
/// the session recipe is always registered, emailpassword and custom recipes
/// are opt-in.
#[derive(Default)]
pub struct SogliaBuilder {
    app_info: Option<AppInfo>,
    connection: Option<CoreConnection>,
    session_config: Option<SessionConfig>,
    emailpassword_config: Option<EmailPasswordConfig>,
    extra_recipes: Vec<Arc<dyn RecipeModule>>,
}

impl SogliaBuilder {
    #[must_use]
    pub fn with_app_info(mut self, app_info: AppInfo) -> Self {
        self.app_info = Some(app_info);
        self
    }

    #[must_use]
    pub fn with_core(mut self, connection: CoreConnection) -> Self {
        self.connection = Some(connection);
        self
    }

    #[must_use]
    pub fn with_session(mut self, config: SessionConfig) -> Self {
        self.session_config = Some(config);
        self
    }

    #[must_use]
    pub fn with_emailpassword(mut self, config: EmailPasswordConfig) -> Self {
        self.emailpassword_config = Some(config);
        self
    }

    /// Register an application-defined recipe. Custom recipes are matched
    /// after the built-in ones.
    #[must_use]
    pub fn register(mut self, recipe: Arc<dyn RecipeModule>) -> Self {
        self.extra_recipes.push(recipe);
        self
    }

    /// Resolve every recipe's configuration and assemble the shared context.
    ///
    /// # Errors
    /// Fails on missing required settings, an invalid cookie policy, or
    /// conflicting route declarations. All of these are startup bugs; none
    /// are reachable from request handling.
    pub fn build(self) -> Result<Arc<Soglia>> {
        let app_info = self
            .app_info
            .ok_or_else(|| anyhow!("app info is required"))?;
        let connection = self
            .connection
            .ok_or_else(|| anyhow!("core connection is required"))?;
        let querier = Arc::new(Querier::new(connection)?);

        let session = SessionRecipe::init(
            self.session_config.unwrap_or_default(),
            &app_info,
            querier.clone(),
        )?;

        let mut modules: Vec<Arc<dyn RecipeModule>> = vec![session.clone()];
        let emailpassword = self
            .emailpassword_config
            .map(|config| {
                EmailPasswordRecipe::init(config, &app_info, querier.clone(), session.clone())
            })
            .transpose()?;
        if let Some(emailpassword) = &emailpassword {
            modules.push(emailpassword.clone());
        }
        modules.extend(self.extra_recipes);

        let registry = RecipeRegistry::new(modules, &app_info)?;
        Ok(Arc::new(Soglia {
            app_info,
            registry,
            session,
            emailpassword,
        }))
    }
}
