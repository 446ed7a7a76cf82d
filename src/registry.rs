//! Recipe registration and request-to-module matching.
//!
//! The registry is populated once during initialization and read-only
//! afterwards; matching is first-registered-wins.

use anyhow::{bail, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use crate::config::AppInfo;
use crate::normalised::NormalisedURLPath;
use crate::recipe::{ApiHandled, HttpMethod, RecipeModule};

struct RouteEntry {
    method: HttpMethod,
    absolute_path: NormalisedURLPath,
    api_id: &'static str,
    disabled: bool,
    module_index: usize,
}

pub struct RecipeRegistry {
    modules: Vec<Arc<dyn RecipeModule>>,
    routes: Vec<RouteEntry>,
}

impl RecipeRegistry {
    /// Build the registry from the registered modules.
    ///
    /// Route paths are resolved against the API base path once, here. A
    /// single module declaring the same enabled `(method, path)` twice is a
    /// configuration bug and fails initialization. Overlap across modules is
    /// allowed and resolved by registration order (first match wins); it is
    /// logged since it usually means two recipes are fighting over a route.
    ///
    /// # Errors
    /// Returns an error on duplicate enabled routes within one module.
    pub fn new(modules: Vec<Arc<dyn RecipeModule>>, app_info: &AppInfo) -> Result<Self> {
        let mut routes: Vec<RouteEntry> = Vec::new();
        let mut seen_enabled: HashSet<(HttpMethod, String, usize)> = HashSet::new();

        for (module_index, module) in modules.iter().enumerate() {
            for ApiHandled {
                method,
                path_without_api_base_path,
                id,
                disabled,
            } in module.apis_handled()
            {
                let absolute_path = app_info.api_base_path().append(&path_without_api_base_path);
                if !disabled {
                    if !seen_enabled.insert((
                        method,
                        absolute_path.as_str().to_string(),
                        module_index,
                    )) {
                        bail!(
                            "duplicate API route {method:?} {absolute_path} registered by recipe {}",
                            module.recipe_id()
                        );
                    }
                    if routes.iter().any(|route| {
                        !route.disabled
                            && route.method == method
                            && route.absolute_path == absolute_path
                            && route.module_index != module_index
                    }) {
                        warn!(
                            "recipe {} registers {method:?} {absolute_path} which is already owned \
                             by an earlier recipe; first registration wins",
                            module.recipe_id()
                        );
                    }
                }
                routes.push(RouteEntry {
                    method,
                    absolute_path,
                    api_id: id,
                    disabled,
                    module_index,
                });
            }
        }

        Ok(Self { modules, routes })
    }

    /// Find the owning module for a request. Disabled entries are skipped;
    /// registration order breaks ties.
    #[must_use]
    pub fn find(
        &self,
        method: HttpMethod,
        path: &NormalisedURLPath,
    ) -> Option<(&Arc<dyn RecipeModule>, &'static str)> {
        self.routes
            .iter()
            .find(|route| {
                !route.disabled && route.method == method && route.absolute_path == *path
            })
            .map(|route| (&self.modules[route.module_index], route.api_id))
    }

    /// Look up a module by recipe id, for routing errors to their owner.
    #[must_use]
    pub fn module_for_recipe(&self, recipe_id: &str) -> Option<&Arc<dyn RecipeModule>> {
        self.modules
            .iter()
            .find(|module| module.recipe_id() == recipe_id)
    }

    #[must_use]
    pub fn modules(&self) -> &[Arc<dyn RecipeModule>] {
        &self.modules
    }
}
