//! Data model and persistence contracts for the transactional outbox.
//!
//! This crate holds only plain data, the repository traits external
//! adapters implement, and the error taxonomy every other crate in the
//! workspace shares. It has no opinions about SQL, scheduling, or
//! dispatch — see `outbox-core`, `outbox-cluster`, and `outbox-scheduler`
//! for those.

pub mod error;
pub mod failure_context;
pub mod instance;
pub mod metadata;
pub mod partition;
pub mod record;
pub mod repository;

pub use error::{
    ConcurrencyConflict, ConfigurationError, FallbackError, HandlerError, NoActiveInstances,
    NoActiveTransaction, ProviderError, RepositoryError, UnknownHandler,
};
pub use failure_context::FailureContext;
pub use instance::{Instance, InstanceStatus};
pub use metadata::RecordMetadata;
pub use partition::PartitionAssignment;
pub use record::{Record, RecordStatus, MAX_FAILURE_REASON_LEN, TOTAL_PARTITIONS};
pub use repository::{InstanceRepository, KeyBatchMode, PartitionAssignmentRepository, RecordRepository};
