//! Dispatch core: partition hashing, retry policies, the handler registry
//! and invoker, context collection, the write API, and the processor
//! chain. Everything here is process-local and has no opinion about how
//! records get polled off storage — see `outbox-scheduler` for that.

pub mod chain;
pub mod context;
pub mod hasher;
pub mod invoker;
pub mod payload;
pub mod registry;
pub mod retry;
pub mod write;

pub use chain::{ChainOutcome, ProcessorChain, ProcessorChainConfig};
pub use context::{ContextCollector, ContextProvider};
pub use hasher::partition_of;
pub use invoker::{FallbackOutcome, HandlerInvoker, PrimaryOutcome};
pub use payload::{OutboxPayload, PayloadCodec};
pub use registry::{DispatchTarget, Fallback, GenericHandler, Handler, HandlerRegistry, HandlerRegistryBuilder};
pub use retry::{policy_from_config, PolicyRegistry, RetryPolicy};
pub use write::{OutboxWriter, ScheduleError, TransactionContext};
