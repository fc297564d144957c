//! HTTP client for the hosted classification functions.
//!
//! Two endpoints under a common base URL:
//! - `POST {base}/categorize-todo` with `{"title"}` → `{"category"}`
//! - `POST {base}/estimate-time` with `{"title", "description"}` →
//!   `{"timeEstimate"}`
//!
//! A success response that lacks the expected field yields the neutral
//! answer (`other`, `30min`) rather than an error.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use tasklist_proto::{Category, DurationEstimate};

use super::{EnrichError, Enricher};

const CATEGORIZE_PATH: &str = "categorize-todo";
const ESTIMATE_PATH: &str = "estimate-time";

#[derive(Serialize)]
struct CategorizeRequest<'a> {
    title: &'a str,
}

#[derive(Deserialize)]
struct CategorizeResponse {
    #[serde(default)]
    category: Option<String>,
}

#[derive(Serialize)]
struct EstimateRequest<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Deserialize)]
struct EstimateResponse {
    #[serde(default, rename = "timeEstimate")]
    time_estimate: Option<String>,
}

/// Enricher backed by the hosted classification functions.
pub struct HttpEnricher {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpEnricher {
    /// Creates a client for the functions under `base_url`.
    ///
    /// `api_key` is sent as a bearer token. `request_timeout` bounds each
    /// HTTP exchange.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, EnrichError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Base URL the functions are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, EnrichError>
    where
        Req: Serialize + Sync,
        Resp: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{path}", self.base_url);
        let mut request = self.client.post(&url).json(body);
        match &self.api_key {
            Some(key) => request = request.bearer_auth(key),
            None => tracing::warn!(function = path, "calling enrichment without credentials"),
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EnrichError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| EnrichError::Decode(e.to_string()))
    }
}

impl Enricher for HttpEnricher {
    async fn classify_category(&self, text: &str) -> Result<String, EnrichError> {
        let response: CategorizeResponse = self
            .call(CATEGORIZE_PATH, &CategorizeRequest { title: text })
            .await?;
        Ok(response
            .category
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| Category::Other.as_str().to_string()))
    }

    async fn estimate_duration(
        &self,
        text: &str,
        description: Option<&str>,
    ) -> Result<String, EnrichError> {
        let response: EstimateResponse = self
            .call(
                ESTIMATE_PATH,
                &EstimateRequest {
                    title: text,
                    description,
                },
            )
            .await?;
        Ok(response
            .time_estimate
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| DurationEstimate::BASELINE.as_str().to_string()))
    }
}
