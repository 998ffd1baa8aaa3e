use chrono::{DateTime, Utc};

/// Carried to a generic handler alongside the payload, since a generic
/// handler has no fixed payload type to key off of.
#[derive(Debug, Clone)]
pub struct RecordMetadata {
    pub key: String,
    pub handler_id: String,
    pub created_at: DateTime<Utc>,
}
