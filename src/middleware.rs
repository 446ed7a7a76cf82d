//! Tower middleware that routes matched requests to their owning recipe.
//!
//! Flow Overview:
//! - Normalize the request path and method; consult the registry.
//! - No owning recipe: the request passes through to the inner service
//!   untouched (unmatched requests are not an error).
//! - Matched: buffer the body, run the recipe handler against a fresh
//!   [`ResponseSink`], and turn the sink into the response.
//! - A [`RecipeError`] is routed to the module named by its `recipe_id`
//!   (which may differ from the matched module when a recipe invoked another
//!   recipe's operations), and that module's `handle_error` decides the HTTP
//!   shape. Errors nobody claims become a generic 500.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, error};

use crate::error::RecipeError;
use crate::normalised::NormalisedURLPath;
use crate::recipe::{ApiRequest, HttpMethod};
use crate::response::ResponseSink;
use crate::Soglia;

/// Request bodies beyond this are treated as bad input.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// A Tower [`Layer`] dispatching recipe-owned routes.
#[derive(Clone)]
pub struct SogliaLayer {
    context: Arc<Soglia>,
}

impl SogliaLayer {
    #[must_use]
    pub fn new(context: Arc<Soglia>) -> Self {
        Self { context }
    }
}

impl<S> Layer<S> for SogliaLayer {
    type Service = SogliaService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SogliaService {
            inner,
            context: self.context.clone(),
        }
    }
}

/// The service produced by [`SogliaLayer`].
#[derive(Clone)]
pub struct SogliaService<S> {
    inner: S,
    context: Arc<Soglia>,
}

impl<S> Service<Request<Body>> for SogliaService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let context = self.context.clone();

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let matched = HttpMethod::from_method(req.method())
                .zip(NormalisedURLPath::new(req.uri().path()).ok())
                .and_then(|(method, path)| {
                    context
                        .registry()
                        .find(method, &path)
                        .map(|(module, api_id)| (module.clone(), api_id))
                });

            let Some((module, api_id)) = matched else {
                return inner.call(req).await;
            };

            debug!(
                recipe = module.recipe_id(),
                api = api_id,
                "dispatching recipe API request"
            );

            let (parts, body) = req.into_parts();
            let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    debug!("failed to buffer request body: {err}");
                    return Ok((
                        StatusCode::BAD_REQUEST,
                        axum::Json(json!({"message": "request body too large or unreadable"})),
                    )
                        .into_response());
                }
            };

            let api_request = ApiRequest::new(parts, bytes);
            let mut sink = ResponseSink::new();

            match module
                .handle_api_request(api_id, &api_request, &mut sink)
                .await
            {
                Ok(()) => {
                    if sink.is_concluded() {
                        Ok(sink.into_response())
                    } else {
                        // Handler declined the request; reassemble and pass on.
                        let (parts, bytes) = api_request.into_inner();
                        inner.call(Request::from_parts(parts, Body::from(bytes))).await
                    }
                }
                Err(recipe_error) => {
                    Ok(route_error(&context, recipe_error, &api_request).await)
                }
            }
        })
    }
}

/// Deliver an error to the module that owns it; fall back to a generic 500
/// when no module claims it or the owner re-raises.
async fn route_error(context: &Soglia, err: RecipeError, request: &ApiRequest) -> Response {
    let Some(owner) = context.registry().module_for_recipe(err.recipe_id) else {
        error!("error from unregistered recipe {}: {err}", err.recipe_id);
        return generic_error_response();
    };
    let owner = owner.clone();

    let mut sink = ResponseSink::new();
    match owner.handle_error(err, request, &mut sink).await {
        Ok(()) if sink.is_concluded() => sink.into_response(),
        Ok(()) => {
            error!(
                recipe = owner.recipe_id(),
                "recipe error handler did not conclude the response"
            );
            generic_error_response()
        }
        Err(unhandled) => {
            error!("unhandled recipe error: {unhandled}");
            generic_error_response()
        }
    }
}

fn generic_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(json!({"message": "internal error"})),
    )
        .into_response()
}
