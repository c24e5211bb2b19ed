//! Ingestion manager
//!
//! Runs one worker per stream. Each worker owns a single consumer and:
//! - polls for a batch, hands messages to the router one at a time
//! - commits offsets after the batch when autocommit is disabled
//! - sleeps the poll interval on an empty batch, the backoff on poll errors
//! - exits when shutdown is signalled

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ci_queue::{QueueConsumer, QueueMetrics};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::router::MessageHandler;
use crate::router_metrics;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Pause after an empty poll
    pub poll_interval: Duration,
    /// Pause after a failed poll
    pub backoff: Duration,
    /// When false, offsets are committed after every processed batch
    pub autocommit_enable: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            backoff: Duration::from_secs(8),
            autocommit_enable: true,
        }
    }
}

pub struct IngestionManager {
    consumers: Vec<Arc<dyn QueueConsumer>>,
    handler: Arc<dyn MessageHandler>,
    config: ManagerConfig,
    shutdown_tx: watch::Sender<bool>,
    running: AtomicBool,
}

impl IngestionManager {
    pub fn new(
        consumers: Vec<Arc<dyn QueueConsumer>>,
        handler: Arc<dyn MessageHandler>,
        config: ManagerConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            consumers,
            handler,
            config,
            shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// True when every consumer reports healthy
    pub fn is_healthy(&self) -> bool {
        self.consumers.iter().all(|c| c.is_healthy())
    }

    pub fn consumer_metrics(&self) -> Vec<QueueMetrics> {
        self.consumers.iter().map(|c| c.metrics()).collect()
    }

    /// Run every stream until shutdown. Returns once all workers have exited.
    pub async fn start(self: Arc<Self>) {
        info!(streams = self.consumers.len(), "Starting ingestion manager");
        self.running.store(true, Ordering::SeqCst);

        let mut handles = Vec::with_capacity(self.consumers.len());
        for consumer in &self.consumers {
            let manager = self.clone();
            let consumer = consumer.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();

            handles.push(tokio::spawn(async move {
                manager.run_stream(consumer, shutdown_rx).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Stream worker panicked");
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Ingestion manager stopped");
    }

    async fn run_stream(&self, consumer: Arc<dyn QueueConsumer>, mut shutdown_rx: watch::Receiver<bool>) {
        let stream = consumer.identifier().to_string();
        info!(stream = %stream, "Stream worker started");

        while !*shutdown_rx.borrow() {
            let pause = tokio::select! {
                _ = shutdown_rx.changed() => break,
                result = consumer.poll() => match result {
                    Ok(messages) if !messages.is_empty() => {
                        debug!(stream = %stream, count = messages.len(), "Processing batch");
                        for queued in &messages {
                            router_metrics::record_message_received(&stream);
                            self.handler.handle(&queued.message).await;
                        }
                        if !self.config.autocommit_enable {
                            if let Err(e) = consumer.commit().await {
                                router_metrics::record_commit_error(&stream);
                                error!(stream = %stream, error = %e, "Failed to commit offsets");
                            }
                        }
                        None
                    }
                    Ok(_) => Some(self.config.poll_interval),
                    Err(e) => {
                        router_metrics::record_poll_error(&stream);
                        warn!(stream = %stream, error = %e, "Error polling, backing off");
                        Some(self.config.backoff)
                    }
                }
            };

            if let Some(duration) = pause {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = tokio::time::sleep(duration) => {}
                }
            }
        }

        info!(stream = %stream, "Stream worker shutting down");
    }

    /// Signal every worker to stop, then release the consumers
    pub async fn shutdown(&self) {
        info!("Ingestion manager shutting down...");
        let _ = self.shutdown_tx.send(true);

        for consumer in &self.consumers {
            consumer.stop().await;
        }

        info!("Ingestion manager shutdown complete");
    }
}
