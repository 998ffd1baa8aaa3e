use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a registered process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Active,
    ShuttingDown,
}

/// A running process participating in the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub hostname: String,
    pub port: u16,
    pub status: InstanceStatus,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    pub fn new(instance_id: String, hostname: String, port: u16, now: DateTime<Utc>) -> Self {
        Self {
            instance_id,
            hostname,
            port,
            status: InstanceStatus::Active,
            started_at: now,
            last_heartbeat: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, stale_timeout: chrono::Duration) -> bool {
        self.last_heartbeat < now - stale_timeout
    }

    pub fn touch_heartbeat(&mut self, now: DateTime<Utc>) {
        self.last_heartbeat = now;
        self.updated_at = now;
    }

    pub fn begin_shutdown(&mut self, now: DateTime<Utc>) {
        self.status = InstanceStatus::ShuttingDown;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn stale_detection_uses_heartbeat_not_created_at() {
        let t0 = Utc::now();
        let mut inst = Instance::new("i1".into(), "host".into(), 8080, t0);
        inst.touch_heartbeat(t0 + Duration::seconds(20));
        assert!(!inst.is_stale(t0 + Duration::seconds(40), Duration::seconds(30)));
        assert!(inst.is_stale(t0 + Duration::seconds(60), Duration::seconds(30)));
    }
}
