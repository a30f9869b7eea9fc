use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::FleetError;

#[derive(Debug, Clone)]
struct Lease {
    owner: Uuid,
    expires_at: DateTime<Utc>,
}

/// Per-fleet mutual exclusion for orchestration runs.
///
/// Concurrent runs against the same fleet would double power-cycle and
/// double dispatch; a run takes the fleet's lease before resolving and the
/// guard releases it on drop. A lease that outlives its owner (crash,
/// abandoned future) expires and becomes reclaimable.
#[derive(Debug, Default)]
pub struct LeaseRegistry {
    leases: Mutex<HashMap<String, Lease>>,
}

impl LeaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, fleet: &str, ttl: Duration) -> Result<LeaseGuard<'_>, FleetError> {
        let mut leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();

        if let Some(existing) = leases.get(fleet) {
            if existing.expires_at > now {
                return Err(FleetError::LeaseHeld {
                    fleet: fleet.to_string(),
                    until: existing.expires_at,
                });
            }
        }

        let owner = Uuid::new_v4();
        let expires_at = now
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(900));
        leases.insert(fleet.to_string(), Lease { owner, expires_at });

        Ok(LeaseGuard {
            registry: self,
            fleet: fleet.to_string(),
            owner,
        })
    }

    fn release(&self, fleet: &str, owner: Uuid) {
        let mut leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
        if leases.get(fleet).map(|l| l.owner) == Some(owner) {
            leases.remove(fleet);
        }
    }
}

/// Releases the lease on drop, but only if this guard still owns it — a
/// reclaimed-after-expiry lease belongs to the new owner.
pub struct LeaseGuard<'a> {
    registry: &'a LeaseRegistry,
    fleet: String,
    owner: Uuid,
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(&self.fleet, self.owner);
    }
}
