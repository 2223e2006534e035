use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error};

use super::types::MatchmakerResponse;
use crate::error::UpstreamError;

const SERVICE: &str = "matchmaker";

/// Resolves an application descriptor's components to concrete placements.
#[async_trait]
pub trait Matchmaker: Send + Sync {
    async fn matchmake(
        &self,
        descriptor: &[u8],
        authorization: Option<&str>,
    ) -> Result<MatchmakerResponse, UpstreamError>;
}

pub struct MatchmakerClient {
    client: Client,
    base_url: String,
}

impl MatchmakerClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Matchmaker for MatchmakerClient {
    async fn matchmake(
        &self,
        descriptor: &[u8],
        authorization: Option<&str>,
    ) -> Result<MatchmakerResponse, UpstreamError> {
        if self.base_url.is_empty() {
            return Err(UpstreamError::NotConfigured { service: SERVICE });
        }

        let mut request = self
            .client
            .post(format!("{}/matchmake", self.base_url))
            .header("content-type", "application/x-yaml")
            .body(descriptor.to_vec());
        if let Some(token) = authorization {
            request = request.header("authorization", token);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            error!(status = status.as_u16(), %message, "matchmaker refused descriptor");
            return Err(UpstreamError::Status {
                service: SERVICE,
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        debug!(response = %String::from_utf8_lossy(&body), "matchmaker response");
        serde_json::from_slice(&body).map_err(|e| UpstreamError::Parse {
            service: SERVICE,
            message: e.to_string(),
        })
    }
}
