//! Shared HTTP transport for the hosted Gemini REST API.
//!
//! Both the embedding and the generation clients talk to the same service with the same
//! credentials, so they share one `reqwest::Client` and one error type.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Errors returned while calling the Gemini API.
#[derive(Debug, Error)]
pub enum GeminiError {
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Gemini responded with a non-success status code.
    #[error("Unexpected Gemini response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the API.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Response body did not match the expected schema.
    #[error("Malformed Gemini response: {0}")]
    InvalidResponse(String),
}

/// Authenticated HTTP transport for Gemini endpoints.
#[derive(Clone)]
pub struct GeminiTransport {
    http: Client,
    base_url: String,
    api_key: String,
}

impl GeminiTransport {
    /// Build a transport for the given base URL and API key.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, GeminiError> {
        let http = Client::builder().user_agent("ai-tutor/0.1").build()?;
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        tracing::debug!(url = %base_url, "Initialized Gemini HTTP client");
        Ok(Self {
            http,
            base_url,
            api_key: api_key.to_string(),
        })
    }

    /// POST a JSON body to `path` (relative to the base URL) and decode the JSON reply.
    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, GeminiError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeminiError::UnexpectedStatus { status, body });
        }

        response
            .json()
            .await
            .map_err(|error| GeminiError::InvalidResponse(error.to_string()))
    }
}

/// Normalize a model identifier into its `models/<name>` resource form.
pub(crate) fn model_resource(model: &str) -> String {
    let model = model.trim();
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Echo {
        ok: bool,
    }

    #[test]
    fn model_resource_adds_prefix_once() {
        assert_eq!(model_resource("gemini-2.5-flash"), "models/gemini-2.5-flash");
        assert_eq!(
            model_resource("models/text-embedding-004"),
            "models/text-embedding-004"
        );
    }

    #[tokio::test]
    async fn post_sends_api_key_header() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/x:ping")
                    .header("x-goog-api-key", "secret");
                then.status(200).json_body(json!({ "ok": true }));
            })
            .await;

        let transport = GeminiTransport::new(&format!("{}/", server.base_url()), "secret")
            .expect("transport");
        let reply: Echo = transport
            .post("/v1beta/models/x:ping", &json!({}))
            .await
            .expect("reply");

        mock.assert_async().await;
        assert!(reply.ok);
    }

    #[tokio::test]
    async fn post_surfaces_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1beta/models/x:ping");
                then.status(429).body("quota exhausted");
            })
            .await;

        let transport = GeminiTransport::new(&server.base_url(), "secret").expect("transport");
        let error = transport
            .post::<Echo>("v1beta/models/x:ping", &json!({}))
            .await
            .expect_err("error status");

        assert!(matches!(
            error,
            GeminiError::UnexpectedStatus { status, ref body }
                if status == StatusCode::TOO_MANY_REQUESTS && body.contains("quota")
        ));
    }
}
