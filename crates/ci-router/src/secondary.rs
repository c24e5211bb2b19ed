//! Secondary-index dispatcher
//!
//! Duplicates writes for eligible concept types to the elasticsearch writer's
//! bulk endpoint. Runs regardless of the primary write's outcome.

use std::collections::HashSet;

use bytes::Bytes;
use reqwest::Client;
use tracing::info;

use crate::dispatcher::{check_id, create_write_request, send_write, WriteOutcome};
use crate::resolver::SecondaryWriterAddresses;

#[derive(Clone)]
pub struct SecondaryIndexDispatcher {
    client: Client,
    addresses: SecondaryWriterAddresses,
    eligible: HashSet<String>,
}

impl SecondaryIndexDispatcher {
    /// Returns `None` when no elasticsearch writer is configured
    pub fn new<I, S>(client: Client, addresses: SecondaryWriterAddresses, eligible: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !addresses.is_enabled() {
            info!("Secondary indexing disabled: no elasticsearch writer address");
            return None;
        }

        let eligible: HashSet<String> = eligible.into_iter().map(Into::into).collect();
        info!(
            bulk_url = %addresses.bulk,
            eligible = ?eligible,
            "Secondary indexing enabled"
        );

        Some(Self {
            client,
            addresses,
            eligible,
        })
    }

    pub fn addresses(&self) -> &SecondaryWriterAddresses {
        &self.addresses
    }

    pub fn is_eligible(&self, concept: &str) -> bool {
        self.eligible.contains(concept)
    }

    /// PUT `<bulk>/<concept>/<id>`
    pub async fn dispatch(&self, concept: &str, body: Bytes, id: &str) -> WriteOutcome {
        check_id(concept, id)?;
        let (request, url) = create_write_request(&self.client, concept, body, id, &self.addresses.bulk);
        send_write(request, url, concept, id).await
    }
}
