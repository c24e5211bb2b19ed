//! Routing metadata carried in message headers

use std::collections::HashMap;

/// Header naming the concept type, used as the routing key
pub const MESSAGE_TYPE_HEADER: &str = "Message-Type";
/// Header carrying the concept's UUID
pub const MESSAGE_ID_HEADER: &str = "Message-Id";

/// Concept type and identifier of a message. Missing headers yield empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingMetadata {
    pub concept: String,
    pub id: String,
}

/// Pull the concept type and id out of the headers.
///
/// Header names match case-sensitively and every other header is ignored. This
/// never fails: an absent type simply resolves to no writer later on.
pub fn extract_type_and_id(headers: &HashMap<String, String>) -> RoutingMetadata {
    let mut metadata = RoutingMetadata::default();
    for (name, value) in headers {
        match name.as_str() {
            MESSAGE_TYPE_HEADER => metadata.concept = value.clone(),
            MESSAGE_ID_HEADER => metadata.id = value.clone(),
            _ => {}
        }
    }
    metadata
}
