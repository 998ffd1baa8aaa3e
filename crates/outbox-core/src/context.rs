//! Context Collector: aggregates cross-cutting
//! metadata from independently-failing providers.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use outbox_schemas::ProviderError;

/// A source of cross-cutting metadata (trace id, tenant, user) to attach to
/// every record created by a `schedule()` call.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Used only for logging when the provider fails.
    fn name(&self) -> &str;

    async fn provide(&self) -> Result<BTreeMap<String, String>, ProviderError>;
}

/// Runs every registered provider and merges their output. A failing
/// provider is logged and skipped; it never prevents the others from
/// contributing.
pub struct ContextCollector {
    providers: Vec<Arc<dyn ContextProvider>>,
}

impl ContextCollector {
    pub fn new(providers: Vec<Arc<dyn ContextProvider>>) -> Self {
        Self { providers }
    }

    pub async fn collect(&self) -> BTreeMap<String, String> {
        let mut merged = BTreeMap::new();
        for provider in &self.providers {
            match provider.provide().await {
                Ok(entries) => merged.extend(entries),
                Err(err) => {
                    tracing::warn!(provider = provider.name(), error = %err, "context provider failed, skipping");
                }
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Good(&'static str, &'static str);
    #[async_trait]
    impl ContextProvider for Good {
        fn name(&self) -> &str {
            "good"
        }
        async fn provide(&self) -> Result<BTreeMap<String, String>, ProviderError> {
            Ok(BTreeMap::from([(self.0.to_string(), self.1.to_string())]))
        }
    }

    struct Bad;
    #[async_trait]
    impl ContextProvider for Bad {
        fn name(&self) -> &str {
            "bad"
        }
        async fn provide(&self) -> Result<BTreeMap<String, String>, ProviderError> {
            Err(ProviderError {
                provider: "bad".into(),
                message: "boom".into(),
            })
        }
    }

    #[tokio::test]
    async fn merges_across_providers() {
        let collector = ContextCollector::new(vec![
            Arc::new(Good("trace_id", "t1")),
            Arc::new(Good("tenant", "acme")),
        ]);
        let merged = collector.collect().await;
        assert_eq!(merged.get("trace_id").map(String::as_str), Some("t1"));
        assert_eq!(merged.get("tenant").map(String::as_str), Some("acme"));
    }

    #[tokio::test]
    async fn one_failing_provider_does_not_block_others() {
        let collector = ContextCollector::new(vec![Arc::new(Bad), Arc::new(Good("trace_id", "t1"))]);
        let merged = collector.collect().await;
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.get("trace_id").map(String::as_str), Some("t1"));
    }

    #[tokio::test]
    async fn empty_provider_list_yields_empty_context() {
        let collector = ContextCollector::new(vec![]);
        assert!(collector.collect().await.is_empty());
    }
}
