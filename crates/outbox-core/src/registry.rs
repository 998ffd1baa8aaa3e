//! Handler Registry: indexes handlers by exact payload
//! type and by "accepts anything", keeps the 1:1 fallback map, and answers
//! the write-side fan-out discovery query.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use outbox_schemas::{ConfigurationError, FailureContext, HandlerError, RecordMetadata};

use crate::payload::OutboxPayload;
use crate::retry::RetryPolicy;

/// A handler bound to one exact payload type.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, payload: &dyn OutboxPayload) -> Result<(), HandlerError>;
}

/// A handler declared to accept any payload type.
#[async_trait]
pub trait GenericHandler: Send + Sync {
    async fn handle(
        &self,
        payload: &dyn OutboxPayload,
        metadata: &RecordMetadata,
    ) -> Result<(), HandlerError>;
}

/// The 1:1 companion of a handler, invoked when retries are exhausted or
/// the error is non-retryable.
#[async_trait]
pub trait Fallback: Send + Sync {
    async fn handle(
        &self,
        payload: &dyn OutboxPayload,
        failure: &FailureContext,
    ) -> Result<(), outbox_schemas::FallbackError>;
}

enum Entry {
    Typed {
        payload_type: &'static str,
        handler: Arc<dyn Handler>,
    },
    Generic {
        handler: Arc<dyn GenericHandler>,
    },
}

/// Process-local, populated once at startup, read-only thereafter.
pub struct HandlerRegistry {
    by_id: HashMap<String, Entry>,
    by_payload_type: HashMap<&'static str, Vec<String>>,
    generic: Vec<String>,
    fallbacks: HashMap<String, Arc<dyn Fallback>>,
    retry_overrides: HashMap<String, Arc<dyn RetryPolicy>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    pub fn handler(&self, handler_id: &str) -> Option<DispatchTarget<'_>> {
        match self.by_id.get(handler_id)? {
            Entry::Typed { handler, .. } => Some(DispatchTarget::Typed(handler.as_ref())),
            Entry::Generic { handler } => Some(DispatchTarget::Generic(handler.as_ref())),
        }
    }

    pub fn fallback(&self, handler_id: &str) -> Option<&Arc<dyn Fallback>> {
        self.fallbacks.get(handler_id)
    }

    pub fn retry_override(&self, handler_id: &str) -> Option<Arc<dyn RetryPolicy>> {
        self.retry_overrides.get(handler_id).cloned()
    }

    /// Discover every handler id applicable to `payload`: exact type first, then the payload's
    /// declared supertype closure, then generic handlers last — each
    /// de-duplicated by handler id, preserving first occurrence.
    pub fn discover(&self, payload: &dyn OutboxPayload) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut result = Vec::new();

        let type_chain = std::iter::once(payload.payload_type_name()).chain(payload.supertypes().iter().copied());
        for type_name in type_chain {
            if let Some(ids) = self.by_payload_type.get(type_name) {
                for id in ids {
                    if seen.insert(id.as_str()) {
                        result.push(id.clone());
                    }
                }
            }
        }

        for id in &self.generic {
            if seen.insert(id.as_str()) {
                result.push(id.clone());
            }
        }

        result
    }
}

pub enum DispatchTarget<'a> {
    Typed(&'a dyn Handler),
    Generic(&'a dyn GenericHandler),
}

#[derive(Default)]
pub struct HandlerRegistryBuilder {
    by_id: HashMap<String, Entry>,
    by_payload_type: HashMap<&'static str, Vec<String>>,
    generic: Vec<String>,
    fallbacks: HashMap<String, Arc<dyn Fallback>>,
    retry_overrides: HashMap<String, Arc<dyn RetryPolicy>>,
}

impl HandlerRegistryBuilder {
    pub fn register_typed(
        mut self,
        handler_id: impl Into<String>,
        payload_type: &'static str,
        handler: Arc<dyn Handler>,
    ) -> Result<Self, ConfigurationError> {
        let handler_id = handler_id.into();
        if self.by_id.contains_key(&handler_id) {
            return Err(ConfigurationError::DuplicateHandlerId { handler_id });
        }
        self.by_payload_type
            .entry(payload_type)
            .or_default()
            .push(handler_id.clone());
        self.by_id.insert(
            handler_id,
            Entry::Typed {
                payload_type,
                handler,
            },
        );
        Ok(self)
    }

    pub fn register_generic(
        mut self,
        handler_id: impl Into<String>,
        handler: Arc<dyn GenericHandler>,
    ) -> Result<Self, ConfigurationError> {
        let handler_id = handler_id.into();
        if self.by_id.contains_key(&handler_id) {
            return Err(ConfigurationError::DuplicateHandlerId { handler_id });
        }
        self.generic.push(handler_id.clone());
        self.by_id.insert(handler_id, Entry::Generic { handler });
        Ok(self)
    }

    pub fn register_fallback(
        mut self,
        handler_id: impl Into<String>,
        fallback: Arc<dyn Fallback>,
    ) -> Result<Self, ConfigurationError> {
        let handler_id = handler_id.into();
        if self.fallbacks.contains_key(&handler_id) {
            return Err(ConfigurationError::DuplicateFallback { handler_id });
        }
        self.fallbacks.insert(handler_id, fallback);
        Ok(self)
    }

    pub fn with_retry_override(mut self, handler_id: impl Into<String>, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_overrides.insert(handler_id.into(), policy);
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            by_id: self.by_id,
            by_payload_type: self.by_payload_type,
            generic: self.generic,
            fallbacks: self.fallbacks,
            retry_overrides: self.retry_overrides,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    struct BaseEvent;
    impl OutboxPayload for BaseEvent {
        fn payload_type_name(&self) -> &'static str {
            "BaseEvent"
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct OrderPlaced;
    impl OutboxPayload for OrderPlaced {
        fn payload_type_name(&self) -> &'static str {
            "OrderPlaced"
        }
        fn supertypes(&self) -> &'static [&'static str] {
            &["BaseEvent", "DomainEvent"]
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct NoopHandler;
    #[async_trait]
    impl Handler for NoopHandler {
        async fn handle(&self, _payload: &dyn OutboxPayload) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    struct NoopGeneric;
    #[async_trait]
    impl GenericHandler for NoopGeneric {
        async fn handle(
            &self,
            _payload: &dyn OutboxPayload,
            _metadata: &RecordMetadata,
        ) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn duplicate_handler_id_rejected() {
        let err = HandlerRegistry::builder()
            .register_typed("h1", "BaseEvent", Arc::new(NoopHandler))
            .unwrap()
            .register_typed("h1", "BaseEvent", Arc::new(NoopHandler));
        assert!(matches!(err, Err(ConfigurationError::DuplicateHandlerId { .. })));
    }

    #[test]
    fn fan_out_across_hierarchy_plus_generic() {
        let registry = HandlerRegistry::builder()
            .register_typed("h-base", "BaseEvent", Arc::new(NoopHandler))
            .unwrap()
            .register_typed("h-domain", "DomainEvent", Arc::new(NoopHandler))
            .unwrap()
            .register_typed("h-order", "OrderPlaced", Arc::new(NoopHandler))
            .unwrap()
            .register_generic("h-generic", Arc::new(NoopGeneric))
            .unwrap()
            .build();

        let ids = registry.discover(&OrderPlaced);
        assert_eq!(ids, vec!["h-order", "h-base", "h-domain", "h-generic"]);
    }

    #[test]
    fn no_applicable_handler_yields_empty_discovery() {
        let registry = HandlerRegistry::builder().build();
        assert!(registry.discover(&OrderPlaced).is_empty());
    }

    #[test]
    fn generic_only_matches_after_typed() {
        let registry = HandlerRegistry::builder()
            .register_generic("h-generic", Arc::new(NoopGeneric))
            .unwrap()
            .build();
        assert_eq!(registry.discover(&BaseEvent), vec!["h-generic"]);
    }
}
