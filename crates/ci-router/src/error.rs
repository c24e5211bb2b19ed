use thiserror::Error;

/// Startup-time address problems. Any of these aborts the service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid address '{0}': expected http://host:port")]
    InvalidShape(String),

    #[error("Invalid service entry '{0}'")]
    InvalidService(String),

    #[error("A valid base address is required for service '{service}', got '{base_address}'")]
    MissingBaseAddress { service: String, base_address: String },

    #[error("Duplicate writer mapping for '{0}'")]
    DuplicateService(String),
}

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("No configured writer for concept: {concept}")]
    NoWriter { concept: String },

    #[error("No Message-Id for concept: {concept}")]
    MissingId { concept: String },

    #[error("Message-Id '{id}' for concept {concept} is not a valid path segment")]
    InvalidId { concept: String, id: String },

    #[error("Failed to send {concept} {id} to {url}: {source}")]
    Transport {
        url: String,
        concept: String,
        id: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Concept {concept} {id} not written to {url}: status {status}, body: {body}")]
    Rejected {
        url: String,
        concept: String,
        id: String,
        status: u16,
        body: String,
    },

    #[error("HTTP client error: {0}")]
    Client(#[source] reqwest::Error),
}

impl RouterError {
    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            RouterError::NoWriter { .. } => "no_writer",
            RouterError::MissingId { .. } => "missing_id",
            RouterError::InvalidId { .. } => "invalid_id",
            RouterError::Transport { .. } => "transport",
            RouterError::Rejected { .. } => "rejected",
            RouterError::Client(_) => "client",
        }
    }

    /// Target URL of the failed write, when one was attempted
    pub fn url(&self) -> Option<&str> {
        match self {
            RouterError::Transport { url, .. } | RouterError::Rejected { url, .. } => Some(url),
            _ => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            RouterError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}
