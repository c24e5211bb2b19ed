//! Kafka REST proxy consumer
//!
//! Speaks the v1 consumer protocol of the Confluent REST proxy:
//! - `POST {addr}/consumers/{group}` creates a consumer instance
//! - `GET {instance}/topics/{topic}` fetches the next batch of records
//! - `POST {instance}/offsets` commits consumed offsets
//! - `DELETE {instance}` destroys the instance
//!
//! The instance is created lazily and dropped after any failed call, so the
//! next poll starts from a fresh instance.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header, Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use ci_common::QueuedMessage;

use crate::{envelope::parse_envelope, QueueConsumer, QueueError, QueueMetrics, Result};

const KAFKA_V1_JSON: &str = "application/vnd.kafka.v1+json";

/// Settings for a single proxy consumer stream
#[derive(Debug, Clone)]
pub struct KafkaProxyConfig {
    pub address: String,
    pub group: String,
    /// Sent as the Host header so the proxy's router picks the right cluster
    pub queue: String,
    pub topic: String,
    pub offset: String,
    pub autocommit_enable: bool,
}

#[derive(Debug, Serialize)]
struct CreateConsumerRequest<'a> {
    #[serde(rename = "auto.offset.reset")]
    auto_offset_reset: &'a str,
    #[serde(rename = "auto.commit.enable")]
    auto_commit_enable: String,
}

#[derive(Debug, Deserialize)]
struct CreateConsumerResponse {
    base_uri: String,
}

#[derive(Debug, Deserialize)]
struct ProxyRecord {
    value: Option<String>,
    #[serde(default)]
    partition: i32,
    #[serde(default)]
    offset: i64,
}

pub struct KafkaProxyConsumer {
    client: Client,
    config: KafkaProxyConfig,
    identifier: String,
    instance_uri: Mutex<Option<String>>,
    running: AtomicBool,
    healthy: AtomicBool,
    total_polled: AtomicU64,
    total_skipped: AtomicU64,
    total_commits: AtomicU64,
    total_errors: AtomicU64,
}

impl KafkaProxyConsumer {
    pub fn new(client: Client, config: KafkaProxyConfig, stream: usize) -> Self {
        let identifier = format!("{}/{}#{}", config.group, config.topic, stream);
        Self {
            client,
            config,
            identifier,
            instance_uri: Mutex::new(None),
            running: AtomicBool::new(true),
            healthy: AtomicBool::new(true),
            total_polled: AtomicU64::new(0),
            total_skipped: AtomicU64::new(0),
            total_commits: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
        }
    }

    fn with_queue_host(&self, request: RequestBuilder) -> RequestBuilder {
        if self.config.queue.is_empty() {
            request
        } else {
            request.header(header::HOST, &self.config.queue)
        }
    }

    async fn create_instance(&self) -> Result<String> {
        let url = format!(
            "{}/consumers/{}",
            self.config.address.trim_end_matches('/'),
            self.config.group
        );
        let body = serde_json::to_vec(&CreateConsumerRequest {
            auto_offset_reset: &self.config.offset,
            auto_commit_enable: self.config.autocommit_enable.to_string(),
        })?;

        let response = self
            .with_queue_host(self.client.post(&url))
            .header(header::CONTENT_TYPE, KAFKA_V1_JSON)
            .body(body)
            .send()
            .await?;
        let response = check_status(response).await?;
        let created: CreateConsumerResponse = serde_json::from_slice(&response.bytes().await?)?;

        let instance = rebase_instance_uri(&self.config.address, &created.base_uri);
        info!(consumer = %self.identifier, instance = %instance, "Created kafka proxy consumer instance");
        Ok(instance)
    }

    async fn instance(&self) -> Result<String> {
        let mut guard = self.instance_uri.lock().await;
        if let Some(uri) = guard.as_ref() {
            return Ok(uri.clone());
        }
        let uri = self.create_instance().await?;
        *guard = Some(uri.clone());
        Ok(uri)
    }

    async fn destroy_instance(&self) {
        let uri = self.instance_uri.lock().await.take();
        if let Some(uri) = uri {
            match self.with_queue_host(self.client.delete(&uri)).send().await {
                Ok(response) => debug!(
                    consumer = %self.identifier,
                    status = response.status().as_u16(),
                    "Destroyed kafka proxy consumer instance"
                ),
                Err(e) => warn!(consumer = %self.identifier, error = %e, "Failed to destroy consumer instance"),
            }
        }
    }

    fn record_failure(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
        self.healthy.store(false, Ordering::Relaxed);
    }

    fn decode_records(&self, records: Vec<ProxyRecord>) -> Vec<QueuedMessage> {
        let mut messages = Vec::with_capacity(records.len());
        for record in records {
            let decoded = record
                .value
                .as_deref()
                .ok_or_else(|| QueueError::Envelope("record has no value".to_string()))
                .and_then(|v| {
                    STANDARD
                        .decode(v)
                        .map_err(|e| QueueError::Envelope(format!("invalid base64: {}", e)))
                })
                .and_then(|bytes| {
                    String::from_utf8(bytes)
                        .map_err(|e| QueueError::Envelope(format!("invalid utf-8: {}", e)))
                })
                .and_then(|raw| parse_envelope(&raw));

            match decoded {
                Ok(message) => messages.push(QueuedMessage {
                    message,
                    partition: record.partition,
                    offset: record.offset,
                    queue_identifier: self.identifier.clone(),
                }),
                Err(e) => {
                    self.total_skipped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        consumer = %self.identifier,
                        partition = record.partition,
                        offset = record.offset,
                        error = %e,
                        "Skipping undecodable record"
                    );
                }
            }
        }
        messages
    }
}

#[async_trait]
impl QueueConsumer for KafkaProxyConsumer {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn poll(&self) -> Result<Vec<QueuedMessage>> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(QueueError::Stopped);
        }

        let instance = match self.instance().await {
            Ok(uri) => uri,
            Err(e) => {
                self.record_failure();
                return Err(e);
            }
        };

        let url = format!("{}/topics/{}", instance, self.config.topic);
        let fetched = async {
            let response = self
                .with_queue_host(self.client.get(&url))
                .header(header::ACCEPT, KAFKA_V1_JSON)
                .send()
                .await?;
            let response = check_status(response).await?;
            let records: Vec<ProxyRecord> = serde_json::from_slice(&response.bytes().await?)?;
            Ok::<_, QueueError>(records)
        }
        .await;

        match fetched {
            Ok(records) => {
                self.healthy.store(true, Ordering::Relaxed);
                let messages = self.decode_records(records);
                if !messages.is_empty() {
                    self.total_polled.fetch_add(messages.len() as u64, Ordering::Relaxed);
                    debug!(consumer = %self.identifier, count = messages.len(), "Polled messages from kafka proxy");
                }
                Ok(messages)
            }
            Err(e) => {
                self.record_failure();
                self.destroy_instance().await;
                Err(e)
            }
        }
    }

    async fn commit(&self) -> Result<()> {
        let Some(instance) = self.instance_uri.lock().await.clone() else {
            return Ok(());
        };

        let result = async {
            let response = self
                .with_queue_host(self.client.post(format!("{}/offsets", instance)))
                .header(header::CONTENT_TYPE, KAFKA_V1_JSON)
                .send()
                .await?;
            check_status(response).await?;
            Ok::<_, QueueError>(())
        }
        .await;

        match result {
            Ok(()) => {
                self.total_commits.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.record_failure();
                self.destroy_instance().await;
                Err(e)
            }
        }
    }

    fn is_healthy(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.healthy.load(Ordering::Relaxed)
    }

    async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.destroy_instance().await;
    }

    fn metrics(&self) -> QueueMetrics {
        QueueMetrics {
            queue_identifier: self.identifier.clone(),
            total_polled: self.total_polled.load(Ordering::Relaxed),
            total_skipped: self.total_skipped.load(Ordering::Relaxed),
            total_commits: self.total_commits.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
        }
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(QueueError::Proxy {
        status: status.as_u16(),
        body,
    })
}

/// The proxy reports instance URIs with its own host name, which is not
/// necessarily reachable from here; keep the path and use the configured address.
fn rebase_instance_uri(address: &str, base_uri: &str) -> String {
    let path = match base_uri.split_once("://") {
        Some((_, rest)) => rest.find('/').map(|i| &rest[i..]).unwrap_or(""),
        None => base_uri,
    };
    format!("{}{}", address.trim_end_matches('/'), path)
}
