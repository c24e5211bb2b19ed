//! Dependency health checks
//!
//! Two checks back `/__health` and `/__gtg`:
//! - the queue proxy answers `GET /topics` and lists the consumed topic
//! - every configured writer answers 200 on its `__gtg` endpoint
//!
//! `/__health` also reports the state of the stream workers when a manager
//! is attached.

use chrono::{DateTime, Utc};
use reqwest::header::HOST;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::warn;

use crate::manager::IngestionManager;

/// Outcome of one dependency check
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub name: String,
    pub ok: bool,
    pub severity: u8,
    pub business_impact: String,
    pub technical_summary: String,
    pub check_output: String,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub schema_version: u8,
    pub name: String,
    pub description: String,
    pub ok: bool,
    pub checks: Vec<CheckResult>,
}

#[derive(Clone)]
pub struct HealthChecker {
    client: Client,
    proxy_address: String,
    queue_host: String,
    topic: String,
    writer_urls: Vec<String>,
}

impl HealthChecker {
    pub fn new(
        client: Client,
        proxy_address: impl Into<String>,
        queue_host: impl Into<String>,
        topic: impl Into<String>,
        writer_urls: Vec<String>,
    ) -> Self {
        Self {
            client,
            proxy_address: proxy_address.into(),
            queue_host: queue_host.into(),
            topic: topic.into(),
            writer_urls,
        }
    }

    pub async fn check_queue_proxy(&self) -> CheckResult {
        let result = self.probe_queue_proxy().await;
        if let Err(output) = &result {
            warn!(error = %output, "Queue proxy health check failed");
        }
        CheckResult::from_probe(
            "Check connectivity to the queue proxy and presence of the configured topic",
            "Unable to connect to the queue proxy",
            "Cannot connect to the queue proxy or the configured topic is not present. \
             Check that the cluster is up, the proxy is healthy and the topic exists.",
            result,
        )
    }

    pub async fn check_writers(&self) -> CheckResult {
        let result = self.probe_writers().await;
        if let Err(output) = &result {
            warn!(error = %output, "Writer health check failed");
        }
        CheckResult::from_probe(
            "Check connectivity to the configured writers",
            "Unable to connect to one or more configured writers",
            "Cannot connect to one or more configured writers. \
             Check that the cluster is up and each writer returns a healthy gtg.",
            result,
        )
    }

    pub async fn report(&self) -> HealthReport {
        let (proxy, writers) = tokio::join!(self.check_queue_proxy(), self.check_writers());
        let checks = vec![proxy, writers];

        HealthReport {
            schema_version: 1,
            name: "concept-ingester".to_string(),
            description: "Routes concepts from the queue to their writers".to_string(),
            ok: checks.iter().all(|c| c.ok),
            checks,
        }
    }

    /// Good to go: both checks pass
    pub async fn is_good_to_go(&self) -> bool {
        self.probe_queue_proxy().await.is_ok() && self.probe_writers().await.is_ok()
    }

    async fn probe_queue_proxy(&self) -> Result<(), String> {
        let url = format!("{}/topics", self.proxy_address.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .header(HOST, &self.queue_host)
            .send()
            .await
            .map_err(|e| format!("Connecting to the queue proxy failed: {}", e))?;

        if response.status() != StatusCode::OK {
            return Err(format!(
                "Connecting to the queue proxy was unsuccessful. Status was {}",
                response.status().as_u16()
            ));
        }

        let topics: Vec<String> = response
            .json()
            .await
            .map_err(|e| format!("Connected to the queue proxy, but parsing topics failed: {}", e))?;

        if topics.iter().any(|t| t == &self.topic) {
            Ok(())
        } else {
            Err(format!(
                "Connected to the queue proxy, but expected topic {} was not found",
                self.topic
            ))
        }
    }

    async fn probe_writers(&self) -> Result<(), String> {
        for writer in &self.writer_urls {
            let url = format!("{}/__gtg", writer.trim_end_matches('/'));
            match self.client.get(&url).send().await {
                Ok(response) if response.status() == StatusCode::OK => {}
                Ok(response) => {
                    return Err(format!(
                        "Writer {} not available: status {}",
                        url,
                        response.status().as_u16()
                    ));
                }
                Err(e) => return Err(format!("Writer {} not available: {}", url, e)),
            }
        }
        Ok(())
    }
}

impl HealthReport {
    /// Append a check; the report is only ok while every check is
    pub fn push_check(&mut self, check: CheckResult) {
        self.ok = self.ok && check.ok;
        self.checks.push(check);
    }
}

/// Stream workers are running and every consumer can reach the proxy
pub fn check_consumers(manager: &IngestionManager) -> CheckResult {
    let result = if !manager.is_running() {
        Err("Stream workers are not running".to_string())
    } else if !manager.is_healthy() {
        let streams: Vec<String> = manager
            .consumer_metrics()
            .iter()
            .map(|m| format!("{} (errors: {})", m.queue_identifier, m.total_errors))
            .collect();
        Err(format!("One or more queue consumers are failing: {}", streams.join(", ")))
    } else {
        Ok(())
    };

    CheckResult::from_probe(
        "Check that the queue consumers are running",
        "Concepts are not being ingested",
        "One or more stream workers are stopped or cannot poll the queue proxy. \
         Check the proxy and the consumer group.",
        result,
    )
}

impl CheckResult {
    fn from_probe(
        name: &str,
        business_impact: &str,
        technical_summary: &str,
        result: Result<(), String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            ok: result.is_ok(),
            severity: 1,
            business_impact: business_impact.to_string(),
            technical_summary: technical_summary.to_string(),
            check_output: result.err().unwrap_or_default(),
            last_updated: Utc::now(),
        }
    }
}
