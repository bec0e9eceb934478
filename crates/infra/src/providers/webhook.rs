//! HTTP webhook provider.
//!
//! Request: `POST <url>` with `{"action": "<action>", "payload": {...}}`.
//! Response: `{"success": bool, "data"?: any, "error"?: string}`.
//!
//! | outcome | classification |
//! |---|---|
//! | malformed URL or unencodable request | permanent |
//! | connect error, timeout, other transport error | transient |
//! | `429`, `5xx` | transient |
//! | other `4xx` | permanent |
//! | `2xx` with `success: false` or an unreadable body | permanent |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, instrument};

use replenish_workflow::{CapabilityAction, CapabilityProvider, ProviderError, ProviderResponse};

#[derive(Debug, Serialize)]
struct WebhookRequest<'a> {
    action: CapabilityAction,
    payload: &'a JsonValue,
}

#[derive(Debug, Deserialize)]
struct WebhookReply {
    success: bool,
    #[serde(default)]
    data: JsonValue,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WebhookProvider {
    name: String,
    action: CapabilityAction,
    url: String,
    client: reqwest::Client,
}

impl WebhookProvider {
    pub fn new(
        name: impl Into<String>,
        action: CapabilityAction,
        url: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            action,
            url: url.into(),
            client,
        }
    }

    /// Shared client for every webhook provider.
    ///
    /// The per-call deadline is enforced by the caller; `connect_timeout`
    /// only bounds connection setup.
    pub fn client(connect_timeout: Duration) -> Result<reqwest::Client, ProviderError> {
        reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ProviderError::permanent(format!("failed to build http client: {e}")))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let message = format!("http {}: {}", status.as_u16(), body.chars().take(200).collect::<String>());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ProviderError::transient(message)
    } else {
        ProviderError::permanent(message)
    }
}

/// A request that could not be built fails the same way on every attempt.
fn classify_send_error(err: reqwest::Error) -> ProviderError {
    if err.is_builder() {
        ProviderError::permanent(format!("invalid request: {err}"))
    } else {
        ProviderError::transient(format!("request failed: {err}"))
    }
}

#[async_trait]
impl CapabilityProvider for WebhookProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn action(&self) -> CapabilityAction {
        self.action
    }

    #[instrument(skip(self, payload), fields(provider = %self.name, action = %action))]
    async fn execute(
        &self,
        action: CapabilityAction,
        payload: &JsonValue,
    ) -> Result<ProviderResponse, ProviderError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookRequest { action, payload })
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let reply: WebhookReply = response
            .json()
            .await
            .map_err(|e| ProviderError::permanent(format!("invalid response body: {e}")))?;
        debug!(status = status.as_u16(), success = reply.success, "webhook replied");

        if reply.success {
            Ok(ProviderResponse::new(reply.data))
        } else {
            Err(ProviderError::permanent(
                reply
                    .error
                    .unwrap_or_else(|| "provider reported failure".to_string()),
            ))
        }
    }
}
