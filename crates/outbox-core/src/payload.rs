//! The payload-side of dispatch.
//!
//! Rust has no runtime class hierarchy to reflect over, so a payload
//! declares its own type-hierarchy closure up front: [`OutboxPayload::supertypes`]
//! returns every supertype/interface name the payload should also match
//! against, already flattened and ordered breadth-first by the impl. The
//! registry's discovery walk (see [`crate::registry`]) only has to dedupe
//! against that list and the exact type name — it never needs to ask "what
//! are the supertypes of a supertype" itself, because the payload already
//! answered that transitively.

use std::any::Any;

/// A payload schedulable through the outbox.
pub trait OutboxPayload: Any + Send + Sync {
    /// Fully-qualified name of this payload's exact type. Used both as the
    /// `payload_type` stored on the record and as the primary key into the
    /// handler registry's `by_payload_type` index.
    fn payload_type_name(&self) -> &'static str;

    /// Breadth-first, de-duplicated closure of every supertype/interface
    /// name this payload also satisfies. Empty for payloads with no
    /// declared hierarchy.
    fn supertypes(&self) -> &'static [&'static str] {
        &[]
    }

    fn as_any(&self) -> &dyn Any;
}

/// Re-materialize a payload from its JSON form plus the stored
/// `payload_type` when a record is loaded back off the repository. This is
/// the same escape hatch `outbox_schemas::Record` uses to store an "opaque
/// application object" without this crate knowing the wire format
/// (payload serialization is out of scope here).
pub trait PayloadCodec: Send + Sync {
    fn encode(&self, payload: &dyn OutboxPayload) -> serde_json::Value;

    fn decode(
        &self,
        payload_type: &str,
        value: &serde_json::Value,
    ) -> Result<Box<dyn OutboxPayload>, String>;
}
