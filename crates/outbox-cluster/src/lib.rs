//! Instance Registry and Partition Coordinator: the distributed half of
//! the outbox — who's alive, and who owns which of the 256 fixed
//! partitions.

pub mod coordinator;
pub mod instance_registry;

pub use coordinator::{
    select_claim_candidates, select_release_candidates, spawn_rebalance_loop, target_for, CoordinatorError,
    PartitionCoordinator,
};
pub use instance_registry::{spawn_heartbeat_loop, InstanceRegistry};
