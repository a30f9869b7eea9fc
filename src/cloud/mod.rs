pub mod sim;

use std::time::Duration;

use crate::errors::FleetError;
use crate::models::instance::{HealthVerdict, InstanceRef, LifecycleState};

/// Instance lifecycle + health capability of the cloud provider.
///
/// Everything the orchestrator needs from the provider, behind one typed
/// surface so call sites never touch an SDK directly. `list_instances` takes
/// a name pattern with `*` globbing, the way provider tag filters do.
pub trait Compute: Send + Sync {
    async fn list_instances(&self, name_pattern: &str) -> Result<Vec<InstanceRef>, FleetError>;

    async fn start_instances(&self, ids: &[String]) -> Result<(), FleetError>;

    async fn stop_instances(&self, ids: &[String]) -> Result<(), FleetError>;

    /// Block until every listed instance reaches `target`, or fail.
    async fn wait_for_state(
        &self,
        ids: &[String],
        target: LifecycleState,
    ) -> Result<(), FleetError>;

    /// One reachability snapshot for the listed instances. Read-only.
    async fn describe_health(&self, ids: &[String]) -> Result<Vec<HealthVerdict>, FleetError>;
}

/// Remote command-execution transport: submit one batch to many targets,
/// then read back each target's invocation separately.
pub trait RemoteExec: Send + Sync {
    async fn submit_command(
        &self,
        targets: &[String],
        commands: &[String],
        timeout: Duration,
    ) -> Result<String, FleetError>;

    async fn get_invocation(&self, job_id: &str, target: &str)
        -> Result<Invocation, FleetError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    TimedOut,
    Cancelled,
}

impl InvocationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InvocationStatus::Success
                | InvocationStatus::Failed
                | InvocationStatus::TimedOut
                | InvocationStatus::Cancelled
        )
    }
}

/// One target's view of a submitted command batch.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub status: InvocationStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Glob match in the provider's tag-filter style: `*` matches any run of
/// characters, everything else is literal.
pub fn name_matches(pattern: &str, name: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == name;
    }

    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    if !name.starts_with(first) {
        return false;
    }

    let mut remaining = &name[first.len()..];
    let parts: Vec<&str> = parts.collect();
    let last_idx = parts.len() - 1;

    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == last_idx {
            return remaining.len() >= part.len() && remaining.ends_with(part);
        }
        match remaining.find(part) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }

    true
}
