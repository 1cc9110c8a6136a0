//! HTTP client for the cloud batch sync endpoint.

use async_trait::async_trait;
use log::{debug, error};
use std::time::Duration;

use bistro_core::sync::CLOUD_SYNC_REQUEST_TIMEOUT_SECS;

use crate::engine::BatchTransport;
use crate::error::{CloudSyncError, Result};
use crate::types::{BatchSyncEntry, BatchSyncResponse};

const BATCH_SYNC_PATH: &str = "/api/sync/batch";
const MAX_LOG_BODY_CHARS: usize = 512;

/// Client for the restaurant cloud API.
#[derive(Debug, Clone)]
pub struct CloudSyncClient {
    client: reqwest::Client,
}

impl CloudSyncClient {
    /// Create a client with the default request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(CLOUD_SYNC_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn batch_url(base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), BATCH_SYNC_PATH)
    }

    fn preview(body: &str) -> String {
        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        preview
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[CloudSync] API response status: {}", status);
            return;
        }
        debug!(
            "[CloudSync] API response error ({}): {}",
            status,
            Self::preview(body)
        );
    }

    async fn parse_response(response: reqwest::Response) -> Result<BatchSyncResponse> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(CloudSyncError::api(
                status.as_u16(),
                format!("Request failed: {}", Self::preview(&body)),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            error!(
                "[CloudSync] Failed to deserialize batch response. Body: {}, Error: {}",
                Self::preview(&body),
                e
            );
            CloudSyncError::Json(e)
        })
    }

    /// Send one batch of outbox entries.
    ///
    /// A successful return only means the HTTP exchange worked; the caller
    /// still has to inspect `success` and the per-entry results.
    pub async fn sync_batch(
        &self,
        base_url: &str,
        entries: &[BatchSyncEntry],
    ) -> Result<BatchSyncResponse> {
        if base_url.trim().is_empty() {
            return Err(CloudSyncError::invalid_request("Cloud API URL is empty"));
        }
        let url = Self::batch_url(base_url);
        debug!("[CloudSync] POST {} ({} entries)", url, entries.len());

        let response = self.client.post(&url).json(entries).send().await?;
        Self::parse_response(response).await
    }
}

#[async_trait]
impl BatchTransport for CloudSyncClient {
    async fn post_batch(
        &self,
        base_url: &str,
        entries: &[BatchSyncEntry],
    ) -> Result<BatchSyncResponse> {
        self.sync_batch(base_url, entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bistro_core::sync::SyncOperation;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex as TokioMutex;

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        request_line: String,
        content_type: Option<String>,
        body: String,
    }

    #[derive(Debug, Clone)]
    struct MockResponse {
        status: u16,
        body: String,
        delay_ms: u64,
    }

    impl MockResponse {
        fn ok(body: &str) -> Self {
            Self {
                status: 200,
                body: body.to_string(),
                delay_ms: 0,
            }
        }
    }

    fn header_end_offset(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
        let mut buffer = Vec::new();
        loop {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if header_end_offset(&buffer).is_some() {
                break;
            }
        }

        let header_end = header_end_offset(&buffer)?;
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?.to_string();

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let content_length = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);

        let mut body = buffer[header_end + 4..].to_vec();
        while body.len() < content_length {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
        }

        Some(CapturedRequest {
            request_line,
            content_type: headers.get("content-type").cloned(),
            body: String::from_utf8_lossy(&body).to_string(),
        })
    }

    fn status_text(status: u16) -> &'static str {
        match status {
            200 => "OK",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "Error",
        }
    }

    async fn write_http_response(
        stream: &mut tokio::net::TcpStream,
        status: u16,
        body: &str,
    ) -> std::io::Result<()> {
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            status_text(status),
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    async fn start_mock_server(
        responses: Vec<MockResponse>,
    ) -> (
        String,
        Arc<TokioMutex<Vec<CapturedRequest>>>,
        tokio::task::JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(TokioMutex::new(Vec::<CapturedRequest>::new()));
        let scripted = Arc::new(TokioMutex::new(VecDeque::from(responses)));
        let captured_clone = Arc::clone(&captured);
        let scripted_clone = Arc::clone(&scripted);

        let handle = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(value) => value,
                    Err(_) => break,
                };
                let captured_inner = Arc::clone(&captured_clone);
                let scripted_inner = Arc::clone(&scripted_clone);
                tokio::spawn(async move {
                    let Some(request) = read_http_request(&mut stream).await else {
                        return;
                    };
                    captured_inner.lock().await.push(request);

                    let response = scripted_inner.lock().await.pop_front().unwrap_or(MockResponse {
                        status: 500,
                        body: r#"{"error":"unexpected request"}"#.to_string(),
                        delay_ms: 0,
                    });
                    if response.delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(response.delay_ms)).await;
                    }
                    let _ = write_http_response(&mut stream, response.status, &response.body).await;
                });
            }
        });

        (format!("http://{}", addr), captured, handle)
    }

    fn entries() -> Vec<BatchSyncEntry> {
        vec![
            BatchSyncEntry {
                local_id: 1,
                table: "orders".to_string(),
                operation: SyncOperation::Create,
                record: serde_json::json!({ "id": "ord-1", "totalCents": 2450 }),
                timestamp: "2026-01-01T12:00:00+00:00".to_string(),
            },
            BatchSyncEntry {
                local_id: 2,
                table: "order_items".to_string(),
                operation: SyncOperation::Delete,
                record: serde_json::json!({ "id": "oi-9" }),
                timestamp: "2026-01-01T12:00:01+00:00".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn sync_batch_posts_entries_and_parses_results() {
        let (base_url, captured, server) = start_mock_server(vec![MockResponse::ok(
            r#"{"success":true,"results":[{"localId":1,"status":"success"},{"localId":2,"status":"conflict","error":"stale"}]}"#,
        )])
        .await;

        let client = CloudSyncClient::new().expect("client");
        let response = client
            .sync_batch(&format!("{}/", base_url), &entries())
            .await
            .expect("batch response");

        assert!(response.success);
        let results = response.results.expect("results");
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].error.as_deref(), Some("stale"));

        let requests = captured.lock().await;
        assert_eq!(requests.len(), 1);
        assert!(requests[0]
            .request_line
            .starts_with("POST /api/sync/batch HTTP/1.1"));
        assert_eq!(requests[0].content_type.as_deref(), Some("application/json"));
        let sent: Vec<BatchSyncEntry> =
            serde_json::from_str(&requests[0].body).expect("request body is an entry array");
        assert_eq!(sent, entries());

        server.abort();
    }

    #[tokio::test]
    async fn non_success_status_maps_to_api_error() {
        let (base_url, _captured, server) = start_mock_server(vec![MockResponse {
            status: 503,
            body: "maintenance".to_string(),
            delay_ms: 0,
        }])
        .await;

        let client = CloudSyncClient::new().expect("client");
        let err = client
            .sync_batch(&base_url, &entries())
            .await
            .expect_err("503 should fail");

        match &err {
            CloudSyncError::Api { status, message } => {
                assert_eq!(*status, 503);
                assert!(message.contains("maintenance"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        server.abort();
    }

    #[tokio::test]
    async fn unparsable_body_is_a_json_error() {
        let (base_url, _captured, server) =
            start_mock_server(vec![MockResponse::ok("<html>gateway</html>")]).await;

        let client = CloudSyncClient::new().expect("client");
        let err = client
            .sync_batch(&base_url, &entries())
            .await
            .expect_err("html body should fail");

        assert!(matches!(err, CloudSyncError::Json(_)));
        server.abort();
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let (base_url, _captured, server) = start_mock_server(vec![MockResponse {
            status: 200,
            body: r#"{"success":true,"results":[]}"#.to_string(),
            delay_ms: 2_000,
        }])
        .await;

        let client = CloudSyncClient::with_timeout(Duration::from_millis(200)).expect("client");
        let err = client
            .sync_batch(&base_url, &entries())
            .await
            .expect_err("request should time out");

        assert!(err.is_timeout(), "expected timeout, got {err:?}");
        server.abort();
    }

    #[tokio::test]
    async fn empty_base_url_is_rejected_before_sending() {
        let client = CloudSyncClient::new().expect("client");
        let err = client
            .sync_batch("  ", &entries())
            .await
            .expect_err("empty url");
        assert!(matches!(err, CloudSyncError::InvalidRequest(_)));
    }
}
