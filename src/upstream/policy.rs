use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::types::Notification;
use crate::error::UpstreamError;

const SERVICE: &str = "policy manager";
const REGISTRY_PATH: &str = "/polman/registry/api/v1/icos/";

/// Registers new applications with the policy manager.
#[async_trait]
pub trait PolicyNotifier: Send + Sync {
    async fn notify(
        &self,
        notification: &Notification,
        authorization: Option<&str>,
    ) -> Result<(), UpstreamError>;
}

pub struct PolicyManagerClient {
    client: Client,
    base_url: String,
}

impl PolicyManagerClient {
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
impl PolicyNotifier for PolicyManagerClient {
    async fn notify(
        &self,
        notification: &Notification,
        authorization: Option<&str>,
    ) -> Result<(), UpstreamError> {
        if self.base_url.is_empty() {
            return Err(UpstreamError::NotConfigured { service: SERVICE });
        }

        let mut request = self
            .client
            .post(format!("{}{REGISTRY_PATH}", self.base_url))
            .json(notification);
        if let Some(token) = authorization {
            request = request.header("authorization", token);
        }
        let response = request.send().await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(()),
            status => {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown error".to_string());
                Err(UpstreamError::Status {
                    service: SERVICE,
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}
