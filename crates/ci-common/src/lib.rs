use std::collections::HashMap;

use bytes::Bytes;

pub mod logging;

// ============================================================================
// Core Message Types
// ============================================================================

/// A message delivered by the queue consumer.
///
/// Headers are case-sensitive and unordered. The body is the raw payload as it
/// arrived on the topic and is forwarded to writers unmodified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl Message {
    pub fn new(headers: HashMap<String, String>, body: impl Into<Bytes>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    /// Look up a header by its exact name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// A message polled from a queue together with the position needed to commit it
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub message: Message,
    pub partition: i32,
    pub offset: i64,
    pub queue_identifier: String,
}
