use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider lifecycle state of a compute instance.
///
/// Wire format is kebab-case ("shutting-down"), matching what the provider
/// reports in describe calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
}

impl LifecycleState {
    /// Terminal or transitioning-out states. Instances in these states are
    /// never resolution candidates unless explicitly requested.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::ShuttingDown | LifecycleState::Terminated)
    }
}

/// A compute instance as described by the provider.
///
/// Lifecycle state is authoritative from the provider and never cached beyond
/// one resolution pass — re-resolve for a fresh view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRef {
    pub id: String,
    pub name: String,
    pub lifecycle_state: LifecycleState,
    pub public_address: Option<String>,
    pub launched_at: DateTime<Utc>,
}

/// Status of a single reachability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckStatus {
    Ok,
    Impaired,
    Initializing,
}

/// Combined system-level + instance-level reachability verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthVerdict {
    pub id: String,
    pub system_check: CheckStatus,
    pub instance_check: CheckStatus,
}

impl HealthVerdict {
    /// Healthy means *both* checks report ok.
    pub fn is_healthy(&self) -> bool {
        self.system_check == CheckStatus::Ok && self.instance_check == CheckStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(LifecycleState::Terminated.is_terminal());
        assert!(LifecycleState::ShuttingDown.is_terminal());
        assert!(!LifecycleState::Stopped.is_terminal());
        assert!(!LifecycleState::Running.is_terminal());
        assert!(!LifecycleState::Pending.is_terminal());
    }

    #[test]
    fn test_state_wire_format() {
        let json = serde_json::to_string(&LifecycleState::ShuttingDown).unwrap();
        assert_eq!(json, "\"shutting-down\"");
        let back: LifecycleState = serde_json::from_str("\"stopped\"").unwrap();
        assert_eq!(back, LifecycleState::Stopped);
    }

    #[test]
    fn test_healthy_requires_both_checks() {
        let mut verdict = HealthVerdict {
            id: "i-abc".into(),
            system_check: CheckStatus::Ok,
            instance_check: CheckStatus::Ok,
        };
        assert!(verdict.is_healthy());

        verdict.instance_check = CheckStatus::Initializing;
        assert!(!verdict.is_healthy());

        verdict.instance_check = CheckStatus::Ok;
        verdict.system_check = CheckStatus::Impaired;
        assert!(!verdict.is_healthy());
    }
}
