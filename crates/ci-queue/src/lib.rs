use async_trait::async_trait;
use ci_common::QueuedMessage;

pub mod envelope;
pub mod error;
pub mod kafka_proxy;

pub use envelope::parse_envelope;
pub use error::QueueError;
pub use kafka_proxy::{KafkaProxyConsumer, KafkaProxyConfig};

pub type Result<T> = std::result::Result<T, QueueError>;

/// Queue metrics for monitoring
#[derive(Debug, Clone, Default)]
pub struct QueueMetrics {
    pub queue_identifier: String,
    /// Total messages polled from this queue
    pub total_polled: u64,
    /// Total records skipped because they could not be decoded
    pub total_skipped: u64,
    /// Total successful offset commits
    pub total_commits: u64,
    /// Total failed poll or commit calls
    pub total_errors: u64,
}

/// Trait for consuming messages from a queue.
///
/// One consumer serves one stream; the ingestion manager drives it from a
/// single task, so implementations only need interior mutability for their
/// own connection state.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Get the unique identifier for this consumer
    fn identifier(&self) -> &str;

    /// Poll for the next batch of messages
    async fn poll(&self) -> Result<Vec<QueuedMessage>>;

    /// Commit offsets for everything returned by previous polls
    async fn commit(&self) -> Result<()>;

    /// Check if the consumer is healthy
    fn is_healthy(&self) -> bool;

    /// Stop the consumer and release any server side resources
    async fn stop(&self);

    fn metrics(&self) -> QueueMetrics {
        QueueMetrics {
            queue_identifier: self.identifier().to_string(),
            ..Default::default()
        }
    }
}
