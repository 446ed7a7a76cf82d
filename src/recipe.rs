//! The capability interface every feature module ("recipe") implements.

use axum::body::Bytes;
use axum::http::{request::Parts, HeaderMap, Method};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;

use crate::error::RecipeError;
use crate::normalised::NormalisedURLPath;
use crate::response::ResponseSink;

/// Boxed future used to keep [`RecipeModule`] object-safe.
pub type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Map an HTTP method onto the subset recipes can register for.
    #[must_use]
    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(Self::Get),
            Method::POST => Some(Self::Post),
            Method::PUT => Some(Self::Put),
            Method::DELETE => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One API route a recipe owns, declared once at startup.
#[derive(Clone, Debug)]
pub struct ApiHandled {
    pub method: HttpMethod,
    pub path_without_api_base_path: NormalisedURLPath,
    pub id: &'static str,
    pub disabled: bool,
}

/// A matched request, with the body already buffered.
///
/// Recipes read from this; all writing goes through the [`ResponseSink`].
pub struct ApiRequest {
    parts: Parts,
    body: Bytes,
}

impl ApiRequest {
    #[must_use]
    pub fn new(parts: Parts, body: Bytes) -> Self {
        Self { parts, body }
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Deserialize the buffered body as JSON.
    ///
    /// # Errors
    /// Returns a `BadInput` error owned by `recipe_id` when the body is not
    /// valid JSON of the expected shape.
    pub fn json<T: DeserializeOwned>(&self, recipe_id: &'static str) -> Result<T, RecipeError> {
        serde_json::from_slice(&self.body)
            .map_err(|err| RecipeError::bad_input(recipe_id, format!("invalid JSON body: {err}")))
    }

    /// Recover the original request pieces for pass-through.
    #[must_use]
    pub fn into_inner(self) -> (Parts, Bytes) {
        (self.parts, self.body)
    }
}

/// A self-contained feature unit owning a set of API routes and its own
/// error-to-response mapping.
///
/// Methods return boxed futures so the registry can hold recipes as trait
/// objects.
pub trait RecipeModule: Send + Sync {
    fn recipe_id(&self) -> &'static str;

    /// Routes this recipe owns, relative to the API base path. Assembled at
    /// startup; disabled entries are declared but never invoked.
    fn apis_handled(&self) -> Vec<ApiHandled>;

    /// Handle a matched API request. The implementation either concludes the
    /// sink or returns a [`RecipeError`] for the dispatcher to route.
    fn handle_api_request<'a>(
        &'a self,
        api_id: &'a str,
        request: &'a ApiRequest,
        sink: &'a mut ResponseSink,
    ) -> BoxFut<'a, Result<(), RecipeError>>;

    /// Decide the HTTP shape of an error this recipe owns. Errors the recipe
    /// does not recognize are re-raised by returning them.
    fn handle_error<'a>(
        &'a self,
        error: RecipeError,
        request: &'a ApiRequest,
        sink: &'a mut ResponseSink,
    ) -> BoxFut<'a, Result<(), RecipeError>>;

    /// Headers the application should expose through CORS for this recipe.
    fn all_cors_headers(&self) -> Vec<&'static str>;
}
