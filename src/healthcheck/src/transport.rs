//! # Probe Transport
//!
//! The health checker never talks HTTP directly; it hands a [`ProbeRequest`]
//! to a [`ProbeTransport`] and classifies whatever comes back. Production
//! uses the reqwest-backed [`HttpProbeTransport`]; tests substitute scripted
//! transports.

use crate::types::*;
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

/// Cancellable request/response transport with a per-attempt timeout
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn execute(&self, request: ProbeRequest) -> Result<ProbeResponse, HealthCheckError>;
}

/// HTTP transport backed by a shared reqwest client
pub struct HttpProbeTransport {
    client: Client,
}

impl HttpProbeTransport {
    pub fn new() -> Result<Self, HealthCheckError> {
        let client = Client::builder()
            .build()
            .map_err(|e| HealthCheckError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ProbeTransport for HttpProbeTransport {
    async fn execute(&self, request: ProbeRequest) -> Result<ProbeResponse, HealthCheckError> {
        let mut builder = match request.method {
            ProbeMethod::Get => self.client.get(&request.url),
            ProbeMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder = builder.timeout(request.timeout);

        debug!("Probing {:?} {}", request.method, request.url);

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HealthCheckError::Timeout(request.timeout.as_millis() as u64)
            } else {
                HealthCheckError::Transport(e.to_string())
            }
        })?;

        let status_code = response.status().as_u16();
        let reason = response
            .status()
            .canonical_reason()
            .unwrap_or("Unknown")
            .to_string();
        let content_length = response.content_length();
        let body = response
            .bytes()
            .await
            .map_err(|e| HealthCheckError::Transport(e.to_string()))?
            .to_vec();

        Ok(ProbeResponse {
            status_code,
            reason,
            content_length,
            body,
        })
    }
}
