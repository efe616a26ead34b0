use crate::{BackendApi, BackendError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use slackrelay_core::config::BackendConfig;
use slackrelay_core::types::BackendState;
use std::time::Duration;
use tracing::debug;

/// JSON-over-HTTP client for the backend task API.
pub struct HttpBackend {
    submit_url: String,
    state_url: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        submit_path: &str,
        state_path: &str,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let base = base_url.trim_end_matches('/');
        if base.is_empty() {
            return Err(BackendError::ConfigError("backend base URL is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::ConfigError(e.to_string()))?;

        Ok(Self {
            submit_url: join_url(base, submit_path),
            state_url: join_url(base, state_path),
            client,
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        Self::new(
            &config.base_url,
            &config.submit_path,
            &config.state_path,
            Duration::from_secs(config.request_timeout_secs.max(1)),
        )
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base, path.trim_start_matches('/'))
}

async fn error_for_status(res: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(BackendError::ApiError {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn submit(&self, text: &str) -> Result<(), BackendError> {
        let res = self
            .client
            .post(&self.submit_url)
            .json(&json!({ "message": text }))
            .send()
            .await
            .map_err(|e| BackendError::NetworkError(e.to_string()))?;

        error_for_status(res).await?;
        debug!(url = %self.submit_url, "Backend accepted submission");
        Ok(())
    }

    async fn query_state(&self) -> Result<BackendState, BackendError> {
        let res = self
            .client
            .get(&self.state_url)
            .send()
            .await
            .map_err(|e| BackendError::NetworkError(e.to_string()))?;

        let res = error_for_status(res).await?;
        res.json::<BackendState>()
            .await
            .map_err(|e| BackendError::DecodeError(e.to_string()))
    }
}
