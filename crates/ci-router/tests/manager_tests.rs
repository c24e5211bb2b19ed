//! Ingestion Manager Tests
//!
//! Tests for:
//! - Messages flowing from consumers to the handler
//! - Offset commits when autocommit is disabled
//! - Backoff after poll errors
//! - Shutdown stopping every consumer

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use ci_common::{Message, QueuedMessage};
use ci_queue::{QueueConsumer, QueueError};
use ci_router::{IngestionManager, ManagerConfig, MessageHandler};

/// Handler that records every message id it sees
struct RecordingHandler {
    seen: parking_lot::Mutex<Vec<String>>,
}

impl RecordingHandler {
    fn new() -> Self {
        Self {
            seen: parking_lot::Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: &Message) {
        let id = message.header("Message-Id").unwrap_or_default().to_string();
        self.seen.lock().push(id);
    }
}

/// Mock queue consumer serving scripted poll results
struct TestQueueConsumer {
    identifier: String,
    batches: parking_lot::Mutex<VecDeque<ci_queue::Result<Vec<QueuedMessage>>>>,
    polls: AtomicU32,
    commits: AtomicU32,
    stopped: AtomicBool,
}

impl TestQueueConsumer {
    fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            batches: parking_lot::Mutex::new(VecDeque::new()),
            polls: AtomicU32::new(0),
            commits: AtomicU32::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    fn add_batch(&self, ids: &[&str]) {
        let batch = ids.iter().enumerate().map(|(i, id)| queued(&self.identifier, id, i as i64)).collect();
        self.batches.lock().push_back(Ok(batch));
    }

    fn add_error(&self) {
        self.batches
            .lock()
            .push_back(Err(QueueError::Envelope("broken proxy".to_string())));
    }
}

fn queued(queue: &str, id: &str, offset: i64) -> QueuedMessage {
    let mut headers = HashMap::new();
    headers.insert("Message-Type".to_string(), "organisations".to_string());
    headers.insert("Message-Id".to_string(), id.to_string());
    QueuedMessage {
        message: Message::new(headers, "{}"),
        partition: 0,
        offset,
        queue_identifier: queue.to_string(),
    }
}

#[async_trait]
impl QueueConsumer for TestQueueConsumer {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn poll(&self) -> ci_queue::Result<Vec<QueuedMessage>> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(QueueError::Stopped);
        }
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn commit(&self) -> ci_queue::Result<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

fn fast_config(autocommit_enable: bool) -> ManagerConfig {
    ManagerConfig {
        poll_interval: Duration::from_millis(10),
        backoff: Duration::from_millis(20),
        autocommit_enable,
    }
}

async fn run_for(manager: Arc<IngestionManager>, duration: Duration) {
    let handle = tokio::spawn(manager.clone().start());
    tokio::time::sleep(duration).await;
    manager.shutdown().await;
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("manager did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_messages_reach_handler_in_order() {
    let consumer = Arc::new(TestQueueConsumer::new("idiConcept/Concept#0"));
    consumer.add_batch(&["a", "b"]);
    consumer.add_batch(&["c"]);

    let handler = Arc::new(RecordingHandler::new());
    let manager = Arc::new(IngestionManager::new(
        vec![consumer.clone() as Arc<dyn QueueConsumer>],
        handler.clone(),
        fast_config(true),
    ));

    run_for(manager, Duration::from_millis(200)).await;

    assert_eq!(handler.seen(), vec!["a", "b", "c"]);
    assert_eq!(consumer.commits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_commits_after_each_batch_without_autocommit() {
    let consumer = Arc::new(TestQueueConsumer::new("idiConcept/Concept#0"));
    consumer.add_batch(&["a"]);
    consumer.add_batch(&["b", "c"]);

    let handler = Arc::new(RecordingHandler::new());
    let manager = Arc::new(IngestionManager::new(
        vec![consumer.clone() as Arc<dyn QueueConsumer>],
        handler.clone(),
        fast_config(false),
    ));

    run_for(manager, Duration::from_millis(200)).await;

    assert_eq!(handler.seen().len(), 3);
    assert_eq!(consumer.commits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_poll_error_backs_off_then_recovers() {
    let consumer = Arc::new(TestQueueConsumer::new("idiConcept/Concept#0"));
    consumer.add_error();
    consumer.add_batch(&["after-error"]);

    let handler = Arc::new(RecordingHandler::new());
    let manager = Arc::new(IngestionManager::new(
        vec![consumer.clone() as Arc<dyn QueueConsumer>],
        handler.clone(),
        fast_config(true),
    ));

    run_for(manager, Duration::from_millis(200)).await;

    assert_eq!(handler.seen(), vec!["after-error"]);
}

#[tokio::test]
async fn test_streams_run_independently() {
    let first = Arc::new(TestQueueConsumer::new("idiConcept/Concept#0"));
    let second = Arc::new(TestQueueConsumer::new("idiConcept/Concept#1"));
    first.add_batch(&["first-1", "first-2"]);
    second.add_batch(&["second-1"]);

    let handler = Arc::new(RecordingHandler::new());
    let manager = Arc::new(IngestionManager::new(
        vec![
            first.clone() as Arc<dyn QueueConsumer>,
            second.clone() as Arc<dyn QueueConsumer>,
        ],
        handler.clone(),
        fast_config(true),
    ));

    run_for(manager, Duration::from_millis(200)).await;

    let mut seen = handler.seen();
    seen.sort();
    assert_eq!(seen, vec!["first-1", "first-2", "second-1"]);
    assert!(first.polls.load(Ordering::SeqCst) > 1);
    assert!(second.polls.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn test_shutdown_stops_consumers() {
    let consumer = Arc::new(TestQueueConsumer::new("idiConcept/Concept#0"));
    let handler = Arc::new(RecordingHandler::new());
    let manager = Arc::new(IngestionManager::new(
        vec![consumer.clone() as Arc<dyn QueueConsumer>],
        handler,
        ManagerConfig {
            poll_interval: Duration::from_secs(60),
            ..fast_config(true)
        },
    ));

    assert!(manager.is_healthy());

    // A long poll interval must not delay shutdown
    run_for(manager.clone(), Duration::from_millis(50)).await;

    assert!(consumer.stopped.load(Ordering::SeqCst));
    assert!(!manager.is_healthy());
    assert!(!manager.is_running());
    assert_eq!(manager.consumer_metrics()[0].queue_identifier, "idiConcept/Concept#0");
}
