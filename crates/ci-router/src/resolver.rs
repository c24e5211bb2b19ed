//! Address Resolver
//!
//! Turns the configured service list into the immutable concept → writer URL
//! mapping, and the optional elasticsearch writer address into its basic and
//! bulk URLs. Service entries come in three forms:
//!
//! - `people-rw-neo4j-blue` → `<base_address>/__people-rw-neo4j-blue`, keyed by name
//! - `people-rw-neo4j-blue:8080` → `http://localhost:8080`, keyed by the raw entry
//! - `http://people-rw-neo4j-blue:8080` → itself, keyed by host
//!
//! Every address is checked against a strict `http://host:port` shape. Failures
//! here are fatal: the service must not start consuming with a broken mapping.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

use crate::error::{AddressError, RouterError};

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<protocol>https?)://(?P<host>[^:/\s]+):(?P<port>\d{1,5})$")
            .expect("address pattern is a valid regex")
    })
}

/// The parts of a validated `scheme://host:port` address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressComponents {
    pub protocol: String,
    pub host: String,
    pub port: String,
}

/// Validate an address and split it into protocol, host and port.
///
/// No path (not even a trailing slash), a single colon before a 1-5 digit port,
/// and a host without slashes or whitespace.
pub fn extract_address_components(address: &str) -> Result<AddressComponents, AddressError> {
    let captures = address_pattern()
        .captures(address)
        .ok_or_else(|| AddressError::InvalidShape(address.to_string()))?;

    Ok(AddressComponents {
        protocol: captures["protocol"].to_string(),
        host: captures["host"].to_string(),
        port: captures["port"].to_string(),
    })
}

/// Immutable mapping from service key to writer base URL.
///
/// Built once at startup and shared read-only between all message tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterMappings {
    by_service: BTreeMap<String, String>,
}

impl WriterMappings {
    pub fn get(&self, service: &str) -> Option<&str> {
        self.by_service.get(service).map(String::as_str)
    }

    /// Find the writer for a concept type.
    ///
    /// An exact key wins; otherwise the first key (in sorted order) made of the
    /// concept type followed by `-` or `:`, so `organisations` finds
    /// `organisations-rw-neo4j-blue` and `organisations:8082`. Fragments such
    /// as `rw` or `neo4j` never match. An empty concept type never resolves.
    pub fn resolve(&self, concept: &str) -> Result<&str, RouterError> {
        if concept.is_empty() {
            return Err(RouterError::NoWriter {
                concept: concept.to_string(),
            });
        }

        self.get(concept)
            .or_else(|| {
                self.by_service
                    .iter()
                    .find(|(service, _)| is_service_for(service, concept))
                    .map(|(_, url)| url.as_str())
            })
            .ok_or_else(|| RouterError::NoWriter {
                concept: concept.to_string(),
            })
    }

    /// Writer base URLs, one per configured service
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.by_service.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_service.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_service.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for WriterMappings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            by_service: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

fn is_service_for(service: &str, concept: &str) -> bool {
    service
        .strip_prefix(concept)
        .is_some_and(|rest| rest.starts_with('-') || rest.starts_with(':'))
}

fn is_valid_service_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains(char::is_whitespace)
}

/// Resolve a single service entry to its (key, url) pair
fn resolve_service(entry: &str, base_address: &str) -> Result<(String, String), AddressError> {
    if entry.contains("://") {
        let components = extract_address_components(entry)?;
        return Ok((components.host, entry.to_string()));
    }

    if let Some((name, port)) = entry.split_once(':') {
        if !is_valid_service_name(name) {
            return Err(AddressError::InvalidService(entry.to_string()));
        }
        let url = format!("http://localhost:{}", port);
        extract_address_components(&url)
            .map_err(|_| AddressError::InvalidService(entry.to_string()))?;
        return Ok((entry.to_string(), url));
    }

    if !is_valid_service_name(entry) {
        return Err(AddressError::InvalidService(entry.to_string()));
    }
    if extract_address_components(base_address).is_err() {
        return Err(AddressError::MissingBaseAddress {
            service: entry.to_string(),
            base_address: base_address.to_string(),
        });
    }
    Ok((entry.to_string(), format!("{}/__{}", base_address, entry)))
}

/// Build the writer mapping from a comma separated service list.
///
/// Blank entries are skipped; duplicate keys are rejected.
pub fn resolve_writer_mappings(
    services: &str,
    base_address: &str,
) -> Result<WriterMappings, AddressError> {
    let mut by_service = BTreeMap::new();

    for entry in services.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (key, url) = resolve_service(entry, base_address)?;
        if by_service.contains_key(&key) {
            return Err(AddressError::DuplicateService(key));
        }
        info!(service = %key, url = %url, "Added writer mapping");
        by_service.insert(key, url);
    }

    Ok(WriterMappings { by_service })
}

/// Basic and bulk URLs of the elasticsearch writer; both empty when disabled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecondaryWriterAddresses {
    pub basic: String,
    pub bulk: String,
}

impl SecondaryWriterAddresses {
    pub fn is_enabled(&self) -> bool {
        !self.bulk.is_empty()
    }
}

/// Derive the elasticsearch writer URLs. An empty address disables secondary
/// indexing; anything else must be a valid `http://host:port` address.
pub fn resolve_secondary_writer(address: &str) -> Result<SecondaryWriterAddresses, AddressError> {
    let address = address.trim();
    if address.is_empty() {
        return Ok(SecondaryWriterAddresses::default());
    }

    extract_address_components(address)?;

    Ok(SecondaryWriterAddresses {
        basic: address.to_string(),
        bulk: format!("{}/bulk", address),
    })
}
