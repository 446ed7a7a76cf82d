//! Write-only response accumulator handed to recipes.
//!
//! Recipes and the cookie transport never touch a framework response type
//! directly; they record status, headers (including repeated `Set-Cookie`
//! values) and an optional JSON body here, and the dispatcher turns the sink
//! into the outward HTTP response.

use axum::http::{header::HeaderName, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

#[derive(Debug, Default)]
pub struct ResponseSink {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Option<Value>,
    concluded: bool,
}

impl ResponseSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any previous value for the same name.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Append a header, keeping previous values (used for `Set-Cookie`).
    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }

    /// Record the final status and JSON body. The sink is concluded after
    /// this; the dispatcher will not fall through to the inner service.
    pub fn send_json(&mut self, status: StatusCode, body: Value) {
        self.status = Some(status);
        self.body = Some(body);
        self.concluded = true;
    }

    #[must_use]
    pub fn is_concluded(&self) -> bool {
        self.concluded
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Build the HTTP response from everything recorded so far.
    #[must_use]
    pub fn into_response(self) -> Response {
        let status = self.status.unwrap_or(StatusCode::OK);
        let mut response = match self.body {
            Some(body) => (status, axum::Json(body)).into_response(),
            None => status.into_response(),
        };
        for (name, value) in &self.headers {
            response.headers_mut().append(name.clone(), value.clone());
        }
        response
    }
}
