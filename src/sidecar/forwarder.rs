//! Request Forwarder — issues the outbound call to the resolved provider
//! and hands the raw streaming response back unchanged.

use crate::config::{Config, ProviderCredentials};
use crate::error::SlimClawError;
use bytes::Bytes;
use futures::Stream;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything the forwarder needs to build and send the outbound request.
pub struct ForwardRequest {
    pub body: serde_json::Value,
    pub headers: HashMap<String, String>,
    pub target_provider: String,
    pub target_model: String,
}

/// The upstream response, unconsumed: status, headers, and a body stream
/// the caller pipes straight to the downstream connection.
pub struct ForwardResponse {
    pub status: reqwest::StatusCode,
    pub headers: reqwest::header::HeaderMap,
    pub body: reqwest::Response,
}

/// Headers that must not be forwarded verbatim: they either get
/// reconstructed (`content-type`, `authorization`) or are connection-scoped
/// and meaningless on a new hop (`host`, `content-length`).
const STRIPPED_HEADERS: &[&str] = &["host", "content-length", "content-type", "authorization", "connection"];

pub struct Forwarder {
    client: Client,
    client_timeout: Duration,
}

impl Forwarder {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .expect("reqwest client builds with a fixed timeout");
        Self { client, client_timeout: timeout }
    }

    /// Looks up the target provider's credentials and issues the outbound
    /// call, racing it against `cancel`. The caller registers `cancel` in a
    /// per-request store (`SidecarState::cancellations`, the same
    /// register/cleanup shape as the teacher's `CancelStore`) so an
    /// external signal — a host integration that observed the inbound
    /// connection drop — can cancel the in-flight upstream request by
    /// request id via `SidecarState::cancel_request`.
    pub async fn forward(&self, cfg: &Config, req: ForwardRequest, cancel: CancellationToken) -> Result<ForwardResponse, SlimClawError> {
        let creds = resolve_credentials(cfg, &req.target_provider)?;

        let mut body = req.body;
        if let serde_json::Value::Object(ref mut map) = body {
            map.insert("model".to_string(), serde_json::Value::String(req.target_model.clone()));
        }

        let url = format!("{}/v1/chat/completions", creds.base_url.trim_end_matches('/'));
        let mut builder = self.client.post(&url).header("content-type", "application/json").json(&body);

        if let Some(key) = &creds.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        for (name, value) in &req.headers {
            let lower = name.to_ascii_lowercase();
            if STRIPPED_HEADERS.contains(&lower.as_str()) {
                continue;
            }
            builder = builder.header(name, value);
        }

        let send = builder.send();

        let timeout = self.client_timeout;

        tokio::select! {
            result = send => {
                let response = result.map_err(classify_transport_error)?;
                Ok(ForwardResponse {
                    status: response.status(),
                    headers: response.headers().clone(),
                    body: response,
                })
            }
            _ = cancel.cancelled() => {
                Err(SlimClawError::UpstreamTimeout(timeout))
            }
        }
    }
}

fn resolve_credentials<'a>(cfg: &'a Config, provider: &str) -> Result<&'a ProviderCredentials, SlimClawError> {
    cfg.providers
        .get(provider)
        .ok_or_else(|| SlimClawError::UnknownProvider(provider.to_string()))
}

fn classify_transport_error(err: reqwest::Error) -> SlimClawError {
    if err.is_timeout() {
        SlimClawError::UpstreamTimeout(Duration::from_secs(0))
    } else {
        SlimClawError::UpstreamTransport(err.to_string())
    }
}

/// Wraps a `reqwest::Response` as a `Stream<Item = Result<Bytes, _>>` for
/// the sidecar's copy loop without pulling the whole body into memory.
pub fn body_stream(response: reqwest::Response) -> impl Stream<Item = reqwest::Result<Bytes>> {
    response.bytes_stream()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn unknown_provider_is_rejected_before_any_network_call() {
        let cfg = Config::default();
        let err = resolve_credentials(&cfg, "nonexistent").unwrap_err();
        assert_eq!(err.code().as_str(), "unknown_provider");
    }

    #[test]
    fn known_provider_resolves_credentials() {
        let mut cfg = Config::default();
        cfg.providers.insert(
            "anthropic".to_string(),
            ProviderCredentials {
                base_url: "https://api.anthropic.com".to_string(),
                api_key: None,
            },
        );
        let creds = resolve_credentials(&cfg, "anthropic").unwrap();
        assert_eq!(creds.base_url, "https://api.anthropic.com");
    }

    #[test]
    fn stripped_headers_excludes_hop_by_hop_and_reconstructed_fields() {
        assert!(STRIPPED_HEADERS.contains(&"authorization"));
        assert!(STRIPPED_HEADERS.contains(&"content-type"));
        assert!(!STRIPPED_HEADERS.contains(&"x-request-id"));
    }
}
