//! Outbound transport for chat completions.
//!
//! One `complete` call is one upstream request. No retry, no internal
//! deadline: timeouts and cancellation belong to the caller (drop the
//! future, or configure the `reqwest::Client`).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::registry::Credentials;
use crate::error::{LlmError, Result};

/// A fully assembled request, ready to send.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub credentials: Credentials,
    /// Base URL; `/chat/completions` is appended.
    pub endpoint: String,
    pub body: Value,
}

impl OutboundRequest {
    pub fn url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }
}

/// Performs the single upstream call for a request and returns the raw body.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn complete(&self, request: OutboundRequest) -> Result<String>;
}

#[async_trait]
impl<T: ChatTransport + ?Sized> ChatTransport for std::sync::Arc<T> {
    async fn complete(&self, request: OutboundRequest) -> Result<String> {
        (**self).complete(request).await
    }
}

/// OpenAI-compatible HTTP transport over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorResponse {
    Single(ErrorBody),
    Multiple(Vec<ErrorBody>),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl ErrorResponse {
    fn message(&self) -> String {
        match self {
            Self::Single(b) => b.error.message.clone(),
            Self::Multiple(v) => v
                .first()
                .map(|b| b.error.message.clone())
                .unwrap_or_else(|| "Unknown error".into()),
        }
    }
}

/// Human-readable message from an error body, or the body itself.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.message())
        .unwrap_or_else(|_| body.trim().to_string())
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn complete(&self, request: OutboundRequest) -> Result<String> {
        let url = request.url();
        let provider = request.credentials.provider;

        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", request.credentials.api_key))
            .header("Content-Type", "application/json");
        for (name, value) in &request.credentials.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        debug!(%provider, url = %url, "Sending chat completion request");

        let response = builder.json(&request.body).send().await.map_err(|e| {
            let err = LlmError::from_transport(provider.as_str(), e.to_string());
            warn!(%provider, error = %e, auth = err.is_auth(), "Network error calling LLM API");
            err
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            LlmError::from_transport(provider.as_str(), format!("failed to read LLM API response body: {e}"))
        })?;

        if !status.is_success() {
            let err = LlmError::from_status(provider.as_str(), status.as_u16(), error_message(&body));
            warn!(%provider, status = %status, auth = err.is_auth(), "LLM API returned an error");
            return Err(err);
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::provider::registry::ProviderKind;

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message(r#"{"error": {"message": "Invalid model"}}"#), "Invalid model");
        assert_eq!(
            error_message(r#"[{"error": {"message": "quota exceeded", "code": 429}}]"#),
            "quota exceeded"
        );
        assert_eq!(error_message("  upstream timeout \n"), "upstream timeout");
    }

    #[test]
    fn test_url_joins_endpoint() {
        let request = OutboundRequest {
            credentials: Credentials::new(ProviderKind::Groq, &ProviderConfig::default()),
            endpoint: "https://api.groq.com/openai/v1/".into(),
            body: Value::Null,
        };
        assert_eq!(request.url(), "https://api.groq.com/openai/v1/chat/completions");
    }

    /// Serve one canned HTTP response on a local port; yields the raw request text.
    async fn serve_once(status: &str, body: &str) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/v1", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text[..split]
                        .lines()
                        .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
                        .and_then(|v| v.parse::<usize>().ok())
                        .unwrap_or(0);
                    if buf.len() >= split + 4 + length {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf).to_string()
        });

        (endpoint, handle)
    }

    // Loopback only; ignore any proxy from the environment.
    fn local_client() -> Client {
        Client::builder().no_proxy().build().unwrap()
    }

    fn request_to(endpoint: String, api_key: &str) -> OutboundRequest {
        let mut entry = ProviderConfig {
            api_key: api_key.into(),
            ..Default::default()
        };
        entry.extra_headers.insert("HTTP-Referer".into(), "https://switchyard.local".into());
        OutboundRequest {
            credentials: Credentials::new(ProviderKind::OpenRouter, &entry),
            endpoint,
            body: serde_json::json!({"model": "m", "messages": []}),
        }
    }

    #[tokio::test]
    async fn test_success_returns_body_and_sends_headers() {
        let (endpoint, server) = serve_once("200 OK", r#"{"choices": []}"#).await;
        let body = HttpTransport::new(local_client())
            .complete(request_to(endpoint, "sk-or-test"))
            .await
            .unwrap();
        assert_eq!(body, r#"{"choices": []}"#);

        let raw = server.await.unwrap().to_ascii_lowercase();
        assert!(raw.starts_with("post /v1/chat/completions"));
        assert!(raw.contains("authorization: bearer sk-or-test"));
        assert!(raw.contains("http-referer: https://switchyard.local"));
        assert!(raw.contains(r#""model":"m""#));
    }

    #[tokio::test]
    async fn test_401_maps_to_unauthorized() {
        let (endpoint, server) =
            serve_once("401 Unauthorized", r#"{"error": {"message": "No auth credentials found"}}"#).await;
        let err = HttpTransport::new(local_client())
            .complete(request_to(endpoint, "stale"))
            .await
            .unwrap_err();
        server.await.unwrap();
        match err {
            LlmError::Unauthorized { provider, message } => {
                assert_eq!(provider, "openrouter");
                assert_eq!(message, "No auth credentials found");
            }
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_maps_to_api_error() {
        let (endpoint, server) = serve_once("503 Service Unavailable", "overloaded").await;
        let err = HttpTransport::new(local_client())
            .complete(request_to(endpoint, "k"))
            .await
            .unwrap_err();
        server.await.unwrap();
        assert!(matches!(err, LlmError::Api { status: 503, ref message } if message == "overloaded"));
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/v1", listener.local_addr().unwrap());
        // Accept and immediately hang up.
        tokio::spawn(async move {
            if let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });

        let err = HttpTransport::new(local_client())
            .complete(request_to(endpoint, "k"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Transport(_)));
    }
}
