//! Concept routing core
//!
//! Resolves writer addresses at startup, then for every consumed message
//! forwards the body to the writer for its concept type, optionally duplicates
//! it to the secondary index, and records the outcome.

pub mod api;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod manager;
pub mod metadata;
pub mod recorder;
pub mod resolver;
pub mod router;
pub mod router_metrics;
pub mod secondary;
pub mod throttle;

pub use api::{create_router, AppState};
pub use dispatcher::{build_http_client, WriteOutcome, WriterClientConfig, WriterDispatcher};
pub use error::{AddressError, RouterError};
pub use health::{check_consumers, CheckResult, HealthChecker, HealthReport};
pub use manager::{IngestionManager, ManagerConfig};
pub use metadata::{extract_type_and_id, RoutingMetadata, MESSAGE_ID_HEADER, MESSAGE_TYPE_HEADER};
pub use recorder::{OutcomeCounters, OutcomeRecorder, WriteTarget};
pub use resolver::{
    extract_address_components, resolve_secondary_writer, resolve_writer_mappings,
    AddressComponents, SecondaryWriterAddresses, WriterMappings,
};
pub use router::{MessageHandler, MessageRouter};
pub use secondary::SecondaryIndexDispatcher;
pub use throttle::Throttle;

pub type Result<T> = std::result::Result<T, RouterError>;
