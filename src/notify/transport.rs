//! Channel transports
//!
//! A transport performs exactly one send and reports the HTTP status. It
//! never retries; retry policy belongs to the channel adapter.

use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// One-shot delivery of a JSON payload to an endpoint
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Send `payload` and return the response status code
    async fn send(
        &self,
        endpoint: &str,
        payload: &Value,
        headers: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<u16, TransportError>;
}

/// HTTP POST transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a shared connection pool
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("alertctl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ChannelTransport for HttpTransport {
    async fn send(
        &self,
        endpoint: &str,
        payload: &Value,
        headers: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<u16, TransportError> {
        let mut request = self.client.post(endpoint).json(payload).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(timeout)
            } else if e.is_builder() {
                TransportError::InvalidRequest(e.to_string())
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        Ok(response.status().as_u16())
    }
}
