use std::fmt;

/// Opaque failure from a repository implementation. The core never
/// inspects the cause; it logs it and retries on the next timer tick.
#[derive(Debug)]
pub struct RepositoryError {
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl RepositoryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn from_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "repository error: {}", self.message)
    }
}

impl std::error::Error for RepositoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Raised at startup when the handler registry is misconfigured (duplicate
/// handler id, malformed retry policy, unknown policy name). Fatal —
/// callers should fail fast rather than continue with a partial registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    DuplicateHandlerId { handler_id: String },
    DuplicateFallback { handler_id: String },
    UnknownRetryPolicy { name: String },
    MalformedRetryPolicy { reason: String },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::DuplicateHandlerId { handler_id } => {
                write!(f, "duplicate handler id registered: {handler_id}")
            }
            ConfigurationError::DuplicateFallback { handler_id } => {
                write!(f, "handler already has a fallback registered: {handler_id}")
            }
            ConfigurationError::UnknownRetryPolicy { name } => {
                write!(f, "unknown retry policy: {name}")
            }
            ConfigurationError::MalformedRetryPolicy { reason } => {
                write!(f, "malformed retry policy: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// Raised by `schedule()` when called outside an active transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoActiveTransaction;

impl fmt::Display for NoActiveTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schedule() requires an active transaction")
    }
}

impl std::error::Error for NoActiveTransaction {}

/// A record's `handler_id` has no entry in the registry at dispatch time.
/// Treated as a permanent failure (routed straight to `PermanentFailure`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownHandler {
    pub handler_id: String,
}

impl fmt::Display for UnknownHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown handler id: {}", self.handler_id)
    }
}

impl std::error::Error for UnknownHandler {}

/// An error raised by a handler during dispatch. Opaque by design — payload
/// serialization and the application's own error types are out of scope
/// here; only the fully-qualified type name and message matter to
/// retry-policy evaluation.
#[derive(Debug, Clone)]
pub struct HandlerError {
    pub type_name: String,
    pub message: String,
}

impl HandlerError {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

impl std::error::Error for HandlerError {}

/// Raised when a fallback itself throws. Caught inside the fallback
/// invoker — it never escapes to the processor chain as a propagating
/// panic, it is surfaced as this value instead.
#[derive(Debug, Clone)]
pub struct FallbackError {
    pub handler_id: String,
    pub message: String,
}

impl fmt::Display for FallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fallback for {} failed: {}", self.handler_id, self.message)
    }
}

impl std::error::Error for FallbackError {}

/// Optimistic-concurrency version mismatch during a partition claim or
/// release. The coordinator logs this and retries on the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyConflict;

impl fmt::Display for ConcurrencyConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "optimistic concurrency conflict")
    }
}

impl std::error::Error for ConcurrencyConflict {}

/// A context provider failed while contributing metadata. Caught per
/// provider; its entries are dropped, others still contribute.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: String,
    pub message: String,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context provider {} failed: {}", self.provider, self.message)
    }
}

impl std::error::Error for ProviderError {}

/// No active instances are registered — the rebalance cycle cannot assign
/// anything. In practice unreachable in a well-formed
/// deployment, since the current instance registers before the coordinator
/// runs, but surfaced explicitly rather than assumed away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoActiveInstances;

impl fmt::Display for NoActiveInstances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no active instances registered")
    }
}

impl std::error::Error for NoActiveInstances {}
