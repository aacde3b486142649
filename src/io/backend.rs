//! HTTP client for the check-in backend
//!
//! Endpoints:
//! - `POST /checkin` `{phone_number, session_class?}` -> `{message, screen_color, status?}`
//! - `POST /sync_airtable` `{password}` -> `{status, message}`
//!
//! Non-2xx responses are still decoded: the backend reports business errors
//! (unknown member, bad password) as JSON with an error status.

use crate::domain::error::{KioskError, Result};
use crate::domain::types::{CheckinRequest, CheckinResponse, SyncRequest, SyncResponse};
use crate::infra::config::Config;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Check-in capability consumed by the coordinator
#[async_trait]
pub trait CheckinService: Send + Sync {
    async fn checkin(&self, request: &CheckinRequest) -> Result<CheckinResponse>;
}

/// Sync capability consumed by the sync trigger
#[async_trait]
pub trait SyncService: Send + Sync {
    async fn sync(&self, request: &SyncRequest) -> Result<SyncResponse>;
}

pub struct BackendClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl BackendClient {
    pub fn new(config: &Config) -> Result<Self> {
        // Create HTTP client once for reuse (connection pooling)
        let mut builder = reqwest::Client::builder().http1_only();
        if let Some(timeout) = config.backend_timeout() {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        Ok(Self { base_url: config.backend_url().to_string(), http_client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: serde::Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path);
        let start = Instant::now();

        let response = self.http_client.post(&url).json(body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        debug!(
            url = %url,
            status = %status.as_u16(),
            bytes = %bytes.len(),
            latency_ms = %latency_ms,
            "backend_response"
        );

        serde_json::from_slice(&bytes).map_err(|e| {
            warn!(url = %url, status = %status.as_u16(), error = %e, "backend_response_malformed");
            KioskError::Decode(format!("{} (HTTP {})", e, status.as_u16()))
        })
    }
}

#[async_trait]
impl CheckinService for BackendClient {
    async fn checkin(&self, request: &CheckinRequest) -> Result<CheckinResponse> {
        self.post_json("/checkin", request).await
    }
}

#[async_trait]
impl SyncService for BackendClient {
    async fn sync(&self, request: &SyncRequest) -> Result<SyncResponse> {
        info!(url = %self.endpoint("/sync_airtable"), "sync_request_sent");
        self.post_json("/sync_airtable", request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        let config = Config::default().with_backend_url("http://kiosk.local:5000/");
        let client = BackendClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://kiosk.local:5000");
        assert_eq!(client.endpoint("/checkin"), "http://kiosk.local:5000/checkin");
        assert_eq!(client.endpoint("sync_airtable"), "http://kiosk.local:5000/sync_airtable");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        // Grab a free port, then close it so nothing is listening
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = Config::default().with_backend_url(&format!("http://127.0.0.1:{port}"));
        let client = BackendClient::new(&config).unwrap();
        let request =
            CheckinRequest { phone_number: "5551234567".to_string(), session_class: None };

        let result = client.checkin(&request).await;
        assert!(matches!(result, Err(KioskError::Transport(_))));
    }
}
