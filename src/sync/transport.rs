use super::types::SyncData;
use crate::constants::SYNC_REQUEST_TIMEOUT;
use crate::error::SyncError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

/// Delivers one queued item to the backend.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn send(&self, item: &SyncData) -> Result<(), SyncError>;
}

/// Body of every sync POST.
#[derive(Debug, Serialize)]
pub struct SyncPayload<'a> {
    pub id: &'a str,
    pub data: &'a serde_json::Value,
    pub timestamp: u64,
}

impl<'a> From<&'a SyncData> for SyncPayload<'a> {
    fn from(item: &'a SyncData) -> Self {
        Self {
            id: &item.id,
            data: &item.data,
            timestamp: item.timestamp,
        }
    }
}

pub struct HttpSyncTransport {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpSyncTransport {
    pub fn new(base_url: &str, api_token: Option<String>) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(SYNC_REQUEST_TIMEOUT)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    pub fn endpoint_url(&self, item: &SyncData) -> String {
        format!("{}{}", self.base_url, item.data_type.endpoint())
    }
}

#[async_trait]
impl SyncTransport for HttpSyncTransport {
    async fn send(&self, item: &SyncData) -> Result<(), SyncError> {
        let url = self.endpoint_url(item);
        let mut request = self.client.post(&url).json(&SyncPayload::from(item));
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        debug!("Sync POST {} -> {}", url, status);
        if status.is_success() {
            Ok(())
        } else {
            Err(SyncError::Http(status.as_u16()))
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Transport(format!("request timed out: {}", e))
    } else if e.is_connect() {
        SyncError::Transport(format!("connection failed: {}", e))
    } else {
        SyncError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::SyncDataType;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn item() -> SyncData {
        SyncData {
            id: "7f1c".to_string(),
            data_type: SyncDataType::Calculation,
            data: json!({"selling_price": 120.0, "cost": 60.0}),
            timestamp: 1_700_000_000_000,
            retry_count: 2,
        }
    }

    /// Serves a single request with `status` and hands back the raw request.
    async fn one_shot_server(status: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                status
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf).to_string()
        });

        (format!("http://{}", addr), handle)
    }

    #[tokio::test]
    async fn test_posts_payload_to_type_endpoint() {
        let (base_url, server) = one_shot_server("204 No Content").await;
        let transport = HttpSyncTransport::new(&base_url, Some("secret".to_string())).unwrap();

        transport.send(&item()).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/calculations/sync HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer secret"));

        let body = request.split("\r\n\r\n").nth(1).unwrap();
        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        let schema = json!({
            "type": "object",
            "required": ["id", "data", "timestamp"],
            "additionalProperties": false,
            "properties": {
                "id": {"type": "string"},
                "data": {"type": "object"},
                "timestamp": {"type": "integer"}
            }
        });
        let validator = jsonschema::validator_for(&schema).unwrap();
        assert!(validator.is_valid(&body));
        assert_eq!(body["id"], "7f1c");
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let (base_url, server) = one_shot_server("503 Service Unavailable").await;
        let transport = HttpSyncTransport::new(&base_url, None).unwrap();

        let err = transport.send(&item()).await.unwrap_err();
        assert!(matches!(err, SyncError::Http(503)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpSyncTransport::new(&format!("http://{}", addr), None).unwrap();
        let err = transport.send(&item()).await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
    }

    #[test]
    fn test_endpoint_url_trims_trailing_slash() {
        let transport = HttpSyncTransport::new("https://api.azuria.app/", None).unwrap();
        assert_eq!(
            transport.endpoint_url(&item()),
            "https://api.azuria.app/api/calculations/sync"
        );
    }
}
