//! HTTP client for the view server

use reqwest::Client;
use serde::Deserialize;

use fog_view_core::{QueryEnvelope, QueryResponse};

use crate::error::{ClientError, Result};

/// Response from the health endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct HealthInfo {
    pub status: String,
    pub version: String,
    pub protocol_version: u16,
    pub uptime_secs: u64,
    pub queries_served: u64,
}

/// Structured error body returned with non-success statuses
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct ViewClient {
    http: Client,
    server_url: String,
}

impl ViewClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self::with_http(Client::new(), server_url)
    }

    /// Use a preconfigured reqwest client (timeouts, proxies)
    pub fn with_http(http: Client, server_url: impl Into<String>) -> Self {
        Self {
            http,
            server_url: server_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub async fn health(&self) -> Result<HealthInfo> {
        let url = format!("{}/health", self.server_url);
        let resp = self.http.get(&url).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// Send one query and decode the response.
    ///
    /// Fails with [`ClientError::InvalidResponse`] if the outcomes do not line
    /// up with the request's keys.
    pub async fn query(&self, envelope: &QueryEnvelope) -> Result<QueryResponse> {
        let url = format!("{}/query", self.server_url);
        let body = envelope.to_bytes()?;

        tracing::debug!(
            event_cursor = envelope.aad.start_from_user_event_id,
            block_cursor = envelope.aad.start_from_block_index,
            keys = envelope.request.get_txos.len(),
            "Sending query"
        );

        let resp = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let bytes = resp.bytes().await?;
        let response = QueryResponse::from_bytes(&bytes)?;

        let expected = envelope.request.get_txos.len();
        let actual = response.tx_out_search_results.len();
        if expected != actual {
            return Err(ClientError::InvalidResponse(format!(
                "{actual} search results for {expected} keys"
            )));
        }

        Ok(response)
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }

    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);

    Err(ClientError::Server { status, message })
}
