//! Partition Coordinator: bootstrap, claim stale, release surplus. The
//! target/selection math is split into plain functions so
//! the rebalance arithmetic can be tested without a repository at all;
//! `PartitionCoordinator` wraps them with the actual repository calls.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use outbox_schemas::{
    NoActiveInstances, PartitionAssignment, PartitionAssignmentRepository, RepositoryError, TOTAL_PARTITIONS,
};

use crate::instance_registry::InstanceRegistry;

/// Target partition count for `instance_id` given the full, lexicographically
/// sorted list of active instance ids: `base = floor(256/N)`,
/// `remainder = 256 mod N`; the first `remainder` instances by sort order
/// get `base + 1`.
pub fn target_for(sorted_active_ids: &[String], instance_id: &str) -> u16 {
    let n = sorted_active_ids.len();
    if n == 0 {
        return 0;
    }
    let base = TOTAL_PARTITIONS / n as u16;
    let remainder = (TOTAL_PARTITIONS % n as u16) as usize;
    match sorted_active_ids.iter().position(|id| id == instance_id) {
        Some(rank) if rank < remainder => base + 1,
        Some(_) => base,
        None => 0,
    }
}

/// Up to `shortage` stale partitions, ordered by partition number ascending.
pub fn select_claim_candidates(
    all: &[PartitionAssignment],
    active: &HashSet<String>,
    shortage: usize,
) -> Vec<PartitionAssignment> {
    let mut stale: Vec<PartitionAssignment> = all.iter().filter(|a| a.is_stale(active)).cloned().collect();
    stale.sort_by_key(|a| a.partition_number);
    stale.truncate(shortage);
    stale
}

/// The last `surplus` partition numbers from `owned`, sorted ascending.
pub fn select_release_candidates(owned: &[PartitionAssignment], surplus: usize) -> Vec<u16> {
    let mut numbers: Vec<u16> = owned.iter().map(|a| a.partition_number).collect();
    numbers.sort_unstable();
    let start = numbers.len().saturating_sub(surplus);
    numbers[start..].to_vec()
}

#[derive(Debug)]
pub enum CoordinatorError {
    NoActiveInstances(NoActiveInstances),
    Repository(RepositoryError),
}

impl From<RepositoryError> for CoordinatorError {
    fn from(e: RepositoryError) -> Self {
        CoordinatorError::Repository(e)
    }
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorError::NoActiveInstances(e) => write!(f, "{e}"),
            CoordinatorError::Repository(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CoordinatorError {}

pub struct PartitionCoordinator {
    repository: Arc<dyn PartitionAssignmentRepository>,
    instances: Arc<InstanceRegistry>,
    assigned_cache: Mutex<HashSet<u16>>,
}

impl PartitionCoordinator {
    pub fn new(repository: Arc<dyn PartitionAssignmentRepository>, instances: Arc<InstanceRegistry>) -> Self {
        Self {
            repository,
            instances,
            assigned_cache: Mutex::new(HashSet::new()),
        }
    }

    /// Cached as of the last rebalance cycle.
    pub fn assigned_partitions(&self) -> HashSet<u16> {
        self.assigned_cache.lock().unwrap().clone()
    }

    pub async fn rebalance_cycle(&self, now: DateTime<Utc>) -> Result<(), CoordinatorError> {
        let current = self.instances.current_instance_id().to_string();
        let active = self.instances.active_instances().await?;
        if active.is_empty() {
            return Err(CoordinatorError::NoActiveInstances(NoActiveInstances));
        }

        let all = self.repository.find_all().await?;
        if all.is_empty() {
            match self.repository.claim_all(&current).await {
                Ok(true) => self.refresh_cache(&current).await?,
                Ok(false) => {
                    tracing::debug!("bootstrap lost to a concurrent peer, will retry next cycle");
                }
                Err(err) => tracing::warn!(error = %err, "bootstrap claim failed"),
            }
            return Ok(());
        }

        let mut sorted_active: Vec<String> = active.iter().cloned().collect();
        sorted_active.sort();
        let target = target_for(&sorted_active, &current);

        let owned: Vec<PartitionAssignment> = all
            .iter()
            .filter(|a| a.instance_id.as_deref() == Some(current.as_str()))
            .cloned()
            .collect();

        if owned.len() < target as usize {
            let shortage = target as usize - owned.len();
            let candidates = select_claim_candidates(&all, &active, shortage);
            if !candidates.is_empty() {
                let numbers: Vec<u16> = candidates.iter().map(|a| a.partition_number).collect();
                let versions: Vec<u64> = candidates.iter().map(|a| a.version).collect();
                match self.repository.claim_stale(&numbers, &versions, &current).await {
                    Ok(true) => {}
                    Ok(false) => tracing::debug!("claim_stale lost to a concurrent modification"),
                    Err(err) => tracing::warn!(error = %err, "claim_stale failed"),
                }
            }
        } else if owned.len() > target as usize {
            let surplus = owned.len() - target as usize;
            let to_release = select_release_candidates(&owned, surplus);
            match self.repository.release_partitions(&to_release, &current).await {
                Ok(n) if n == to_release.len() => {}
                Ok(_) => tracing::debug!("release_partitions saw a concurrent modification"),
                Err(err) => tracing::warn!(error = %err, "release_partitions failed"),
            }
        }

        self.refresh_cache(&current).await?;
        Ok(())
    }

    async fn refresh_cache(&self, current: &str) -> Result<(), RepositoryError> {
        let owned = self.repository.find_by_instance(current).await?;
        let mut cache = self.assigned_cache.lock().unwrap();
        *cache = owned.into_iter().map(|a| a.partition_number).collect();
        Ok(())
    }
}

/// Spawn the periodic rebalance timer. Every error is logged and
/// swallowed — the coordinator never aborts the process.
pub fn spawn_rebalance_loop(
    coordinator: Arc<PartitionCoordinator>,
    interval: std::time::Duration,
    shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut shutdown = shutdown;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = coordinator.rebalance_cycle(Utc::now()).await {
                        tracing::warn!(error = %err, "rebalance cycle failed, retrying next tick");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbox_config::InstanceConfig;
    use outbox_memory::{InMemoryInstanceRepository, InMemoryPartitionAssignmentRepository};

    fn assignment(n: u16, owner: Option<&str>, version: u64) -> PartitionAssignment {
        PartitionAssignment {
            partition_number: n,
            instance_id: owner.map(String::from),
            version,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn target_distributes_remainder_to_first_ranked_instances() {
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        // 256 / 3 = 85, remainder 1 -> rank 0 gets 86, ranks 1..2 get 85.
        assert_eq!(target_for(&ids, "a"), 86);
        assert_eq!(target_for(&ids, "b"), 85);
        assert_eq!(target_for(&ids, "c"), 85);
    }

    #[test]
    fn target_is_zero_with_no_active_instances() {
        assert_eq!(target_for(&[], "a"), 0);
    }

    #[test]
    fn target_is_all_partitions_with_one_instance() {
        let ids = vec!["solo".to_string()];
        assert_eq!(target_for(&ids, "solo"), 256);
    }

    #[test]
    fn claim_candidates_are_ordered_and_capped_by_shortage() {
        let all = vec![assignment(5, None, 0), assignment(2, Some("gone"), 0), assignment(1, Some("live"), 0)];
        let active = HashSet::from(["live".to_string()]);
        let candidates = select_claim_candidates(&all, &active, 1);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].partition_number, 2);
    }

    #[test]
    fn release_candidates_take_highest_numbers() {
        let owned = vec![assignment(1, Some("me"), 0), assignment(5, Some("me"), 0), assignment(3, Some("me"), 0)];
        let released = select_release_candidates(&owned, 2);
        assert_eq!(released, vec![3, 5]);
    }

    #[tokio::test]
    async fn rebalance_without_active_instances_fails_explicitly() {
        let partitions = Arc::new(InMemoryPartitionAssignmentRepository::new());
        let instances = Arc::new(InstanceRegistry::new(
            "host".into(),
            1,
            Arc::new(InMemoryInstanceRepository::new()),
            InstanceConfig::default(),
        ));
        let coordinator = PartitionCoordinator::new(partitions, instances);
        let err = coordinator.rebalance_cycle(Utc::now()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::NoActiveInstances(_)));
    }

    #[tokio::test]
    async fn solo_instance_bootstraps_and_owns_everything() {
        let partitions = Arc::new(InMemoryPartitionAssignmentRepository::new());
        let instance_repo = Arc::new(InMemoryInstanceRepository::new());
        let instances = Arc::new(InstanceRegistry::new(
            "host".into(),
            1,
            instance_repo,
            InstanceConfig::default(),
        ));
        let now = Utc::now();
        instances.register(now).await.unwrap();

        let coordinator = PartitionCoordinator::new(partitions, instances);
        coordinator.rebalance_cycle(now).await.unwrap();
        assert_eq!(coordinator.assigned_partitions().len(), TOTAL_PARTITIONS as usize);
    }

    #[tokio::test]
    async fn second_instance_claims_half_after_two_cycles() {
        let partitions = Arc::new(InMemoryPartitionAssignmentRepository::new());
        let instance_repo = Arc::new(InMemoryInstanceRepository::new());
        let now = Utc::now();

        let a = Arc::new(InstanceRegistry::new(
            "a".into(),
            1,
            instance_repo.clone(),
            InstanceConfig::default(),
        ));
        a.register(now).await.unwrap();
        let coord_a = PartitionCoordinator::new(partitions.clone(), a.clone());
        coord_a.rebalance_cycle(now).await.unwrap();
        assert_eq!(coord_a.assigned_partitions().len(), TOTAL_PARTITIONS as usize);

        let b = Arc::new(InstanceRegistry::new(
            "b".into(),
            2,
            instance_repo.clone(),
            InstanceConfig::default(),
        ));
        b.register(now).await.unwrap();
        let coord_b = PartitionCoordinator::new(partitions.clone(), b.clone());

        // `a` releases its surplus, `b` claims the stale-turned-free half.
        coord_a.rebalance_cycle(now).await.unwrap();
        coord_b.rebalance_cycle(now).await.unwrap();
        coord_a.rebalance_cycle(now).await.unwrap();

        let a_count = coord_a.assigned_partitions().len();
        let b_count = coord_b.assigned_partitions().len();
        assert_eq!(a_count + b_count, TOTAL_PARTITIONS as usize);
        assert!((a_count as i32 - b_count as i32).abs() <= 1);
    }
}
