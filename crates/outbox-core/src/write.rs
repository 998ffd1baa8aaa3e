//! Outbox Write API: the single entry point applications
//! call from inside their own transaction.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use outbox_schemas::{NoActiveTransaction, Record, RecordRepository, RepositoryError};
use uuid::Uuid;

use crate::context::ContextCollector;
use crate::hasher::partition_of;
use crate::payload::{OutboxPayload, PayloadCodec};
use crate::registry::HandlerRegistry;

/// Asserts that an active transaction of the backing store is in progress.
/// Transaction demarcation itself belongs to the application framework
/// integration and is out of scope here; this trait is the seam it plugs
/// into.
pub trait TransactionContext {
    fn is_active(&self) -> bool;
}

#[derive(Debug)]
pub enum ScheduleError {
    NoActiveTransaction(NoActiveTransaction),
    Repository(RepositoryError),
}

impl From<RepositoryError> for ScheduleError {
    fn from(e: RepositoryError) -> Self {
        ScheduleError::Repository(e)
    }
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::NoActiveTransaction(e) => write!(f, "{e}"),
            ScheduleError::Repository(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ScheduleError {}

pub struct OutboxWriter {
    registry: Arc<HandlerRegistry>,
    context_collector: Arc<ContextCollector>,
    codec: Arc<dyn PayloadCodec>,
    repository: Arc<dyn RecordRepository>,
}

impl OutboxWriter {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        context_collector: Arc<ContextCollector>,
        codec: Arc<dyn PayloadCodec>,
        repository: Arc<dyn RecordRepository>,
    ) -> Self {
        Self {
            registry,
            context_collector,
            codec,
            repository,
        }
    }

    /// Discover handlers for `payload`, persist one record per handler, and
    /// return what was persisted. A payload with no applicable handler is a
    /// no-op: `Ok(vec![])`, not an error.
    pub async fn schedule(
        &self,
        tx: &dyn TransactionContext,
        payload: &dyn OutboxPayload,
        key: Option<String>,
        extra_context: BTreeMap<String, String>,
    ) -> Result<Vec<Record>, ScheduleError> {
        if !tx.is_active() {
            return Err(ScheduleError::NoActiveTransaction(NoActiveTransaction));
        }

        let handler_ids = self.registry.discover(payload);
        if handler_ids.is_empty() {
            return Ok(Vec::new());
        }

        // Provider context first, caller-supplied overlay wins on conflict.
        let mut context = self.context_collector.collect().await;
        context.extend(extra_context);

        let key = key
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let partition = partition_of(&key);
        let now = Utc::now();
        let encoded = self.codec.encode(payload);

        let mut records = Vec::with_capacity(handler_ids.len());
        for handler_id in handler_ids {
            let record = Record::new(
                Uuid::new_v4().to_string(),
                key.clone(),
                encoded.clone(),
                payload.payload_type_name().to_string(),
                context.clone(),
                handler_id,
                partition,
                now,
            );
            self.repository.save(&record).await?;
            records.push(record);
        }

        Ok(records)
    }
}
