//! Handler Invoker: routes a record to its handler, and a
//! failed record to its fallback.

use outbox_schemas::{FailureContext, FallbackError, HandlerError, Record, RecordMetadata, UnknownHandler};

use crate::payload::OutboxPayload;
use crate::registry::{DispatchTarget, HandlerRegistry};

/// Outcome of a primary dispatch attempt.
pub enum PrimaryOutcome {
    /// `record.handler_id` has no entry in the registry. The handler set is
    /// closed at startup, so this can only mean the record predates a
    /// handler's removal.
    UnknownHandler(UnknownHandler),
    Handler(HandlerError),
}

/// Outcome of a fallback dispatch attempt.
pub enum FallbackOutcome {
    Handled,
    /// No fallback is registered for this handler id — not an error.
    NotHandled,
    Failed(FallbackError),
}

pub struct HandlerInvoker<'a> {
    registry: &'a HandlerRegistry,
}

impl<'a> HandlerInvoker<'a> {
    pub fn new(registry: &'a HandlerRegistry) -> Self {
        Self { registry }
    }

    pub async fn invoke_primary(
        &self,
        record: &Record,
        payload: &dyn OutboxPayload,
    ) -> Result<(), PrimaryOutcome> {
        match self.registry.handler(&record.handler_id) {
            None => Err(PrimaryOutcome::UnknownHandler(UnknownHandler {
                handler_id: record.handler_id.clone(),
            })),
            Some(DispatchTarget::Typed(handler)) => {
                handler.handle(payload).await.map_err(PrimaryOutcome::Handler)
            }
            Some(DispatchTarget::Generic(handler)) => {
                let metadata = RecordMetadata {
                    key: record.key.clone(),
                    handler_id: record.handler_id.clone(),
                    created_at: record.created_at,
                };
                handler
                    .handle(payload, &metadata)
                    .await
                    .map_err(PrimaryOutcome::Handler)
            }
        }
    }

    pub async fn invoke_fallback(
        &self,
        handler_id: &str,
        payload: &dyn OutboxPayload,
        failure: &FailureContext,
    ) -> FallbackOutcome {
        match self.registry.fallback(handler_id) {
            None => FallbackOutcome::NotHandled,
            Some(fallback) => match fallback.handle(payload, failure).await {
                Ok(()) => FallbackOutcome::Handled,
                Err(err) => FallbackOutcome::Failed(err),
            },
        }
    }
}
