use std::collections::HashSet;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::cloud::Compute;
use crate::errors::FleetError;

/// Outcome of one probing pass: whoever passed both reachability checks in
/// time, and whoever did not.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub healthy: HashSet<String>,
    pub unhealthy: HashSet<String>,
}

/// Polls instance reachability until everyone passes or the deadline lands.
///
/// Only the not-yet-healthy remainder is re-queried each cycle, so polling
/// cost shrinks as instances come up. Read-only: probing never mutates the
/// instances.
pub struct StatusProber<'a, C: Compute> {
    compute: &'a C,
    timeout: Duration,
    poll_interval: Duration,
}

impl<'a, C: Compute> StatusProber<'a, C> {
    pub fn new(compute: &'a C, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            compute,
            timeout,
            poll_interval,
        }
    }

    pub async fn probe(&self, ids: &HashSet<String>) -> Result<ProbeOutcome, FleetError> {
        let mut remaining = ids.clone();
        let mut healthy = HashSet::with_capacity(ids.len());
        let deadline = Instant::now() + self.timeout;

        while !remaining.is_empty() && Instant::now() < deadline {
            let batch: Vec<String> = remaining.iter().cloned().collect();
            for verdict in self.compute.describe_health(&batch).await? {
                if verdict.is_healthy() && remaining.remove(&verdict.id) {
                    healthy.insert(verdict.id);
                }
            }

            if !remaining.is_empty() {
                debug!(
                    waiting = remaining.len(),
                    passed = healthy.len(),
                    "instances still failing reachability checks"
                );
                sleep(self.poll_interval).await;
            }
        }

        Ok(ProbeOutcome {
            healthy,
            unhealthy: remaining,
        })
    }
}
