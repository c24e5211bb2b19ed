use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Kafka proxy returned status {status}: {body}")]
    Proxy { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed message envelope: {0}")]
    Envelope(String),

    #[error("Queue is stopped")]
    Stopped,

    #[error("Configuration error: {0}")]
    Config(String),
}
