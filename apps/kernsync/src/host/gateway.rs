//! # Kernel Gateway Client
//!
//! Lists kernels running on a remote kernel gateway (`GET /api/kernels`).

use crate::sync::RemoteKernelSource;
use async_trait::async_trait;
use kernsync_core::{KernsyncError, RemoteKernel};
use std::time::Duration;

/// HTTP client for a remote kernel gateway.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl GatewayClient {
    /// Create a client for the gateway at `base_url`.
    ///
    /// `timeout` bounds each request, connection included.
    pub fn new(
        base_url: &str,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, KernsyncError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KernsyncError::Transport(format!("Cannot build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.filter(|t| !t.is_empty()),
        })
    }

    /// Endpoint listing the gateway's kernels.
    #[must_use]
    pub fn kernels_url(&self) -> String {
        format!("{}/api/kernels", self.base_url)
    }
}

#[async_trait]
impl RemoteKernelSource for GatewayClient {
    async fn fetch(&self) -> Result<Vec<RemoteKernel>, KernsyncError> {
        let mut req = self.http.get(self.kernels_url());
        if let Some(ref token) = self.auth_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| {
            KernsyncError::Transport(format!("Cannot connect to gateway at {}: {}", self.base_url, e))
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(KernsyncError::Transport(format!(
                "Gateway returned {}: {}",
                status, body
            )));
        }

        resp.json::<Vec<RemoteKernel>>()
            .await
            .map_err(|e| KernsyncError::SerializationError(e.to_string()))
    }
}
