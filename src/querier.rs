//! RPC client for the trusted token-issuing core.
//!
//! The core's wire format is an external HTTP+JSON contract; this client only
//! knows how to send a request and hand back the JSON body. Transport
//! failures, timeouts, and non-success statuses are all plain errors; a
//! failed call never implies session validity.

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::normalised::NormalisedURLDomain;

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Version of the core driver interface this client speaks.
const CDI_VERSION: &str = "2.4";

const CORE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw connection settings for the core.
#[derive(Clone, Debug)]
pub struct CoreConnection {
    connection_uri: String,
    api_key: Option<SecretString>,
}

impl CoreConnection {
    #[must_use]
    pub fn new(connection_uri: &str) -> Self {
        Self {
            connection_uri: connection_uri.to_string(),
            api_key: None,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(SecretString::from(api_key.to_string()));
        self
    }
}

/// Shared client for core calls. Read-only after construction.
pub struct Querier {
    client: Client,
    base_url: NormalisedURLDomain,
    api_key: Option<SecretString>,
}

impl Querier {
    /// # Errors
    /// Returns an error if the connection URI is invalid or the HTTP client
    /// cannot be built.
    pub fn new(connection: CoreConnection) -> Result<Self> {
        let base_url = NormalisedURLDomain::new(&connection.connection_uri)
            .context("invalid core connection URI")?;
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(CORE_REQUEST_TIMEOUT)
            .build()
            .context("failed to build core HTTP client")?;
        Ok(Self {
            client,
            base_url,
            api_key: connection.api_key,
        })
    }

    /// POST a JSON payload to a core recipe endpoint.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success status.
    pub async fn send_post(&self, rid: &str, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        debug!("core POST {path}");

        let mut request = self
            .client
            .post(&url)
            .header("rid", rid)
            .header("cdi-version", CDI_VERSION)
            .json(body);
        if let Some(api_key) = &self.api_key {
            request = request.header("api-key", api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("core call failed: POST {path}"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("core returned {status} for POST {path}: {text}"));
        }

        response
            .json::<Value>()
            .await
            .with_context(|| format!("core returned invalid JSON for POST {path}"))
    }

    /// GET a core recipe endpoint with query parameters.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success status.
    pub async fn send_get(&self, rid: &str, path: &str, params: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        debug!("core GET {path}");

        let mut request = self
            .client
            .get(&url)
            .query(params)
            .header("rid", rid)
            .header("cdi-version", CDI_VERSION);
        if let Some(api_key) = &self.api_key {
            request = request.header("api-key", api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("core call failed: GET {path}"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("core returned {status} for GET {path}: {text}"));
        }

        response
            .json::<Value>()
            .await
            .with_context(|| format!("core returned invalid JSON for GET {path}"))
    }
}
