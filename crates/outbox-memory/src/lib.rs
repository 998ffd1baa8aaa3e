//! In-memory reference implementations of the three repository contracts
//! `outbox-schemas` defines. Not a persistence backend in its own right —
//! a production deployment plugs in a real adapter (SQL, say) against the
//! same traits. This crate exists so the rest of the workspace has
//! something to run its own tests against.

pub mod instances;
pub mod partitions;
pub mod records;

pub use instances::InMemoryInstanceRepository;
pub use partitions::InMemoryPartitionAssignmentRepository;
pub use records::InMemoryRecordRepository;
