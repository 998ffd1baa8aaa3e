//! Processor Chain: Primary → Retry → Fallback →
//! PermanentFailure, run as a flat sequence of stage functions rather than
//! a linked list of stage objects — the outcome at each stage determines
//! whether the next one runs, which reads no differently as a loop.

use chrono::{DateTime, Utc};
use outbox_schemas::{FailureContext, Record, RecordRepository, RepositoryError};

use crate::invoker::{FallbackOutcome, HandlerInvoker, PrimaryOutcome};
use crate::payload::OutboxPayload;
use crate::registry::HandlerRegistry;
use crate::retry::PolicyRegistry;

pub struct ProcessorChainConfig {
    pub delete_on_complete: bool,
}

impl Default for ProcessorChainConfig {
    fn default() -> Self {
        Self {
            delete_on_complete: false,
        }
    }
}

/// Terminal outcome of running a record through the chain once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    Completed,
    Rescheduled,
    Failed,
}

pub struct ProcessorChain<'a> {
    registry: &'a HandlerRegistry,
    policies: &'a PolicyRegistry,
    repository: &'a dyn RecordRepository,
    config: &'a ProcessorChainConfig,
}

impl<'a> ProcessorChain<'a> {
    pub fn new(
        registry: &'a HandlerRegistry,
        policies: &'a PolicyRegistry,
        repository: &'a dyn RecordRepository,
        config: &'a ProcessorChainConfig,
    ) -> Self {
        Self {
            registry,
            policies,
            repository,
            config,
        }
    }

    pub async fn run(
        &self,
        record: &mut Record,
        payload: &dyn OutboxPayload,
    ) -> Result<ChainOutcome, RepositoryError> {
        let invoker = HandlerInvoker::new(self.registry);
        let now = Utc::now();

        match invoker.invoke_primary(record, payload).await {
            Ok(()) => {
                self.complete(record, now).await?;
                Ok(ChainOutcome::Completed)
            }
            Err(PrimaryOutcome::UnknownHandler(_)) => self.permanent_failure(record).await,
            Err(PrimaryOutcome::Handler(err)) => {
                record.record_failure(&err.message);
                let policy = self.policies.resolve(&record.handler_id);
                let retries_exhausted = record.failure_count > policy.max_retries();
                let non_retryable = !policy.should_retry(&err.type_name);

                if !retries_exhausted && !non_retryable {
                    let delay = policy.next_delay(record.failure_count);
                    record.schedule_retry(now + chrono::Duration::milliseconds(delay.as_millis() as i64));
                    self.repository.save(record).await?;
                    return Ok(ChainOutcome::Rescheduled);
                }

                let failure = FailureContext {
                    record_id: record.id.clone(),
                    key: record.key.clone(),
                    created_at: record.created_at,
                    failure_count: record.failure_count,
                    last_error: err.message.clone(),
                    retries_exhausted,
                    non_retryable,
                };

                match invoker
                    .invoke_fallback(&record.handler_id, payload, &failure)
                    .await
                {
                    FallbackOutcome::Handled => {
                        self.complete(record, now).await?;
                        Ok(ChainOutcome::Completed)
                    }
                    FallbackOutcome::NotHandled | FallbackOutcome::Failed(_) => {
                        self.permanent_failure(record).await
                    }
                }
            }
        }
    }

    async fn complete(&self, record: &mut Record, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        if self.config.delete_on_complete {
            self.repository.delete(&record.id).await
        } else {
            record.mark_completed(now);
            self.repository.save(record).await
        }
    }

    async fn permanent_failure(&self, record: &mut Record) -> Result<ChainOutcome, RepositoryError> {
        record.mark_failed();
        self.repository.save(record).await?;
        Ok(ChainOutcome::Failed)
    }
}
