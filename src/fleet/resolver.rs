use tracing::warn;

use crate::cloud::Compute;
use crate::errors::FleetError;
use crate::models::instance::{InstanceRef, LifecycleState};

/// States an instance is leaving the world through; never resolution
/// candidates unless a caller asks for them via `find`.
pub const TERMINAL_STATES: &[LifecycleState] =
    &[LifecycleState::ShuttingDown, LifecycleState::Terminated];

/// Discovers the instances behind a named or patterned group, fresh on every
/// call — membership is never cached.
pub struct FleetResolver<'a, C: Compute> {
    compute: &'a C,
}

impl<'a, C: Compute> FleetResolver<'a, C> {
    pub fn new(compute: &'a C) -> Self {
        Self { compute }
    }

    /// All instances matching `pattern` whose state is not in `excluded`.
    /// An empty result is not an error here; `resolve` adds that policy.
    pub async fn find(
        &self,
        pattern: &str,
        excluded: &[LifecycleState],
    ) -> Result<Vec<InstanceRef>, FleetError> {
        let all = self.compute.list_instances(pattern).await?;
        Ok(all
            .into_iter()
            .filter(|i| !excluded.contains(&i.lifecycle_state))
            .collect())
    }

    /// Eligible (non-terminal) instances matching `pattern`;
    /// `NoMatchingInstances` when there are none.
    pub async fn resolve(&self, pattern: &str) -> Result<Vec<InstanceRef>, FleetError> {
        let found = self.find(pattern, TERMINAL_STATES).await?;
        if found.is_empty() {
            return Err(FleetError::NoMatchingInstances {
                pattern: pattern.to_string(),
            });
        }
        Ok(found)
    }

    /// Resolve a group expected to hold exactly one instance.
    ///
    /// More than one match happens transiently while a replacement comes up;
    /// tie-break: prefer a `running` instance, otherwise the most recently
    /// launched.
    pub async fn resolve_singleton(&self, name: &str) -> Result<InstanceRef, FleetError> {
        let matches = self.resolve(name).await?;
        if matches.len() > 1 {
            warn!(
                name,
                count = matches.len(),
                "singleton group matched multiple instances; tie-breaking"
            );
        }
        let chosen = matches
            .into_iter()
            .max_by_key(|i| (i.lifecycle_state == LifecycleState::Running, i.launched_at))
            .expect("resolve returned a non-empty list");
        Ok(chosen)
    }
}
