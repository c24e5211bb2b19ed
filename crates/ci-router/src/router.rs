//! Message router
//!
//! Invoked once per consumed message:
//! 1. Wait on the throttle, if configured
//! 2. Extract concept type and id from the headers
//! 3. Write to the concept's writer and, for eligible types, to the secondary
//!    index; the two writes run concurrently and neither gates the other
//! 4. Record both outcomes
//!
//! Failures never propagate to the consumer: a failed message is counted,
//! logged, and the stream moves on.

use std::future::Future;
use std::time::Instant;

use async_trait::async_trait;
use ci_common::Message;

use crate::dispatcher::{WriteOutcome, WriterDispatcher};
use crate::error::RouterError;
use crate::metadata::{extract_type_and_id, RoutingMetadata};
use crate::recorder::{OutcomeRecorder, WriteTarget};
use crate::router_metrics;
use crate::secondary::SecondaryIndexDispatcher;
use crate::throttle::Throttle;

/// Callback the stream workers hand every message to
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message);
}

#[derive(Clone)]
pub struct MessageRouter {
    writer: WriterDispatcher,
    secondary: Option<SecondaryIndexDispatcher>,
    recorder: OutcomeRecorder,
    throttle: Option<Throttle>,
}

impl MessageRouter {
    pub fn new(writer: WriterDispatcher, recorder: OutcomeRecorder) -> Self {
        Self {
            writer,
            secondary: None,
            recorder,
            throttle: None,
        }
    }

    pub fn with_secondary(mut self, secondary: Option<SecondaryIndexDispatcher>) -> Self {
        self.secondary = secondary;
        self
    }

    pub fn with_throttle(mut self, throttle: Option<Throttle>) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn recorder(&self) -> &OutcomeRecorder {
        &self.recorder
    }

    /// Route one message. Both outcomes are recorded before returning; the
    /// primary error is reported in preference to the secondary one.
    pub async fn process_message(&self, message: &Message) -> Result<(), RouterError> {
        if let Some(throttle) = &self.throttle {
            throttle.acquire().await;
        }

        let RoutingMetadata { concept, id } = extract_type_and_id(&message.headers);

        let primary = timed(
            &concept,
            WriteTarget::Writer,
            self.writer.dispatch(&concept, message.body.clone(), &id),
        );

        let secondary = async {
            match &self.secondary {
                Some(secondary) if secondary.is_eligible(&concept) => Some(
                    timed(
                        &concept,
                        WriteTarget::SecondaryIndex,
                        secondary.dispatch(&concept, message.body.clone(), &id),
                    )
                    .await,
                ),
                _ => None,
            }
        };

        let (primary, secondary) = tokio::join!(primary, secondary);

        self.recorder.record(&concept, &id, WriteTarget::Writer, &primary);
        if let Some(outcome) = &secondary {
            self.recorder.record(&concept, &id, WriteTarget::SecondaryIndex, outcome);
        }

        primary?;
        if let Some(Err(e)) = secondary {
            return Err(e);
        }
        Ok(())
    }
}

async fn timed<F>(concept: &str, target: WriteTarget, write: F) -> WriteOutcome
where
    F: Future<Output = WriteOutcome>,
{
    let start = Instant::now();
    let outcome = write.await;
    router_metrics::record_write_latency(concept, target.as_str(), start.elapsed());
    outcome
}

#[async_trait]
impl MessageHandler for MessageRouter {
    async fn handle(&self, message: &Message) {
        // Already recorded and logged
        let _ = self.process_message(message).await;
    }
}
