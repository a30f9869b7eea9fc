use std::collections::HashSet;

use tracing::{info, warn};

use crate::cloud::Compute;
use crate::errors::FleetError;
use crate::health::prober::StatusProber;
use crate::models::command::RetryBudget;
use crate::models::instance::LifecycleState;

/// Drives instances to a healthy state with a bounded power-cycle budget.
///
/// A failed reachability check is frequently transient; a stop/start moves
/// the instance onto fresh hardware and resolves most cases without an
/// operator. The cycle cap bounds total outage time: probing wall-clock per
/// instance never exceeds `max_cycles × per_attempt_timeout`.
///
/// Holds no mutable state, so concurrent calls for disjoint instance sets
/// are safe.
pub struct RecoveryController<'a, C: Compute> {
    compute: &'a C,
    budget: RetryBudget,
}

impl<'a, C: Compute> RecoveryController<'a, C> {
    pub fn new(compute: &'a C, budget: RetryBudget) -> Self {
        Self { compute, budget }
    }

    /// Probe the working set, power-cycling whoever fails, until everyone is
    /// healthy or the cycle budget runs out.
    ///
    /// Every id returned healthy was vouched for by a verdict taken after
    /// its most recent power transition: the working set shrinks to the
    /// unhealthy subset after each cycle and is re-probed in full.
    pub async fn ensure_healthy(
        &self,
        ids: &HashSet<String>,
    ) -> Result<HashSet<String>, FleetError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let prober = StatusProber::new(
            self.compute,
            self.budget.per_attempt_timeout,
            self.budget.poll_interval,
        );

        let mut healthy: HashSet<String> = HashSet::with_capacity(ids.len());
        let mut working = ids.clone();
        let mut attempt = 0u32;

        loop {
            let outcome = prober.probe(&working).await?;
            healthy.extend(outcome.healthy);

            if outcome.unhealthy.is_empty() {
                info!(healthy = healthy.len(), cycles = attempt, "all instances reachable");
                return Ok(healthy);
            }

            if attempt == self.budget.max_cycles {
                let mut instances: Vec<String> = outcome.unhealthy.into_iter().collect();
                instances.sort();
                return Err(FleetError::HealthCheckExhausted {
                    cycles: attempt,
                    instances,
                });
            }

            let mut bad: Vec<String> = outcome.unhealthy.iter().cloned().collect();
            bad.sort();
            warn!(
                attempt = attempt + 1,
                max = self.budget.max_cycles,
                instances = ?bad,
                "power-cycling unreachable instances"
            );

            self.compute.stop_instances(&bad).await?;
            self.compute
                .wait_for_state(&bad, LifecycleState::Stopped)
                .await?;
            self.compute.start_instances(&bad).await?;

            attempt += 1;
            working = outcome.unhealthy;
        }
    }
}
