//! Processing Scheduler: the piece that actually drives
//! records through the processor chain, on a timer and under a per-key
//! worker pool. Everything here is storage-agnostic — it only calls
//! through `outbox_schemas::RecordRepository`.

pub mod housekeeping;
pub mod scheduler;

pub use housekeeping::spawn_housekeeping_loop;
pub use scheduler::{spawn_poll_loop, Scheduler, SchedulerHandle};
