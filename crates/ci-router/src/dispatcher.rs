//! Writer Dispatcher - forwards a message body to its concept writer
//!
//! - PUT `<writer>/<concept>/<id>` with the raw body streamed (no Content-Length)
//! - Exactly 200 is success; the response body is drained so the connection
//!   goes back to the pool
//! - Any other status is a rejection carrying a truncated response body
//! - Transport errors (connect, timeout, DNS) keep the underlying cause
//! - No retries: every message is written at most once
//! - A missing id, or one that would not stay a single path segment, is
//!   rejected before any request is built

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::{Body, Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info};

use crate::error::RouterError;
use crate::resolver::WriterMappings;

/// Upper bound on the response body kept for a failed write
pub const MAX_ERROR_BODY_BYTES: usize = 1024;

/// Result of one write: the target URL on success
pub type WriteOutcome = std::result::Result<String, RouterError>;

/// Configuration of the shared writer HTTP client
#[derive(Debug, Clone)]
pub struct WriterClientConfig {
    pub connect_timeout: Duration,
    /// Overall request timeout, including reading the response
    pub request_timeout: Duration,
    /// TCP keep-alive and pooled connection idle timeout
    pub keep_alive: Duration,
    pub max_idle_per_host: usize,
}

impl Default for WriterClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            keep_alive: Duration::from_secs(30),
            max_idle_per_host: 100,
        }
    }
}

/// Build the pooled client shared by every write.
///
/// The router runs at high frequency across many streams, so idle connections
/// per host are bounded and reused instead of opening one per message.
pub fn build_http_client(config: &WriterClientConfig) -> Result<Client, RouterError> {
    let client = Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .tcp_keepalive(config.keep_alive)
        .pool_idle_timeout(config.keep_alive)
        .pool_max_idle_per_host(config.max_idle_per_host)
        .build()
        .map_err(RouterError::Client)?;

    info!(
        connect_timeout_ms = config.connect_timeout.as_millis() as u64,
        request_timeout_ms = config.request_timeout.as_millis() as u64,
        max_idle_per_host = config.max_idle_per_host,
        "Writer HTTP client initialized"
    );

    Ok(client)
}

/// The id ends up as the last path segment of the write URL; it must not be
/// able to escape it.
pub fn check_id(concept: &str, id: &str) -> Result<(), RouterError> {
    if id.is_empty() {
        return Err(RouterError::MissingId {
            concept: concept.to_string(),
        });
    }
    let escapes = id == "."
        || id == ".."
        || id.contains(|c: char| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace());
    if escapes {
        return Err(RouterError::InvalidId {
            concept: concept.to_string(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Build the PUT for one concept. Returns the request and its URL.
pub fn create_write_request(
    client: &Client,
    concept: &str,
    body: Bytes,
    id: &str,
    writer_url: &str,
) -> (RequestBuilder, String) {
    let url = format!("{}/{}/{}", writer_url.trim_end_matches('/'), concept, id);

    // A stream body leaves the length unset, so the payload goes out chunked
    let stream = futures::stream::once(async move { Ok::<_, std::io::Error>(body) });
    let request = client.put(&url).body(Body::wrap_stream(stream));

    (request, url)
}

/// Send a write request and classify the response
pub async fn send_write(
    request: RequestBuilder,
    url: String,
    concept: &str,
    id: &str,
) -> WriteOutcome {
    let response = match request.send().await {
        Ok(response) => response,
        Err(source) => {
            return Err(RouterError::Transport {
                url,
                concept: concept.to_string(),
                id: id.to_string(),
                source,
            });
        }
    };

    let status = response.status();
    if status == StatusCode::OK {
        if let Err(e) = response.bytes().await {
            debug!(url = %url, error = %e, "Failed to drain writer response");
        }
        return Ok(url);
    }

    let body = read_bounded_body(response, MAX_ERROR_BODY_BYTES).await;
    Err(RouterError::Rejected {
        url,
        concept: concept.to_string(),
        id: id.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Read at most `limit` bytes of the body; the rest is dropped with the response
async fn read_bounded_body(mut response: Response, limit: usize) -> String {
    let mut collected: Vec<u8> = Vec::new();
    while collected.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = (limit - collected.len()).min(chunk.len());
                collected.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Failed to read writer error response");
                break;
            }
        }
    }
    String::from_utf8_lossy(&collected).into_owned()
}

/// Dispatches messages to the writer mapped for their concept type
#[derive(Clone)]
pub struct WriterDispatcher {
    client: Client,
    mappings: Arc<WriterMappings>,
}

impl WriterDispatcher {
    pub fn new(client: Client, mappings: Arc<WriterMappings>) -> Self {
        Self { client, mappings }
    }

    pub fn mappings(&self) -> &WriterMappings {
        &self.mappings
    }

    /// Write one message. Fails without any network call when no writer is
    /// mapped for the concept type or the id is missing or unusable.
    pub async fn dispatch(&self, concept: &str, body: Bytes, id: &str) -> WriteOutcome {
        let writer_url = self.mappings.resolve(concept)?;
        check_id(concept, id)?;
        let (request, url) = create_write_request(&self.client, concept, body, id, writer_url);
        send_write(request, url, concept, id).await
    }
}
