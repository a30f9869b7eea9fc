use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// An ordered list of shell command lines executed as a single remote job.
///
/// Immutable once built; parameterization returns a new batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandBatch {
    lines: Vec<String>,
}

impl CommandBatch {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    /// Build a batch from a shell script body, one command per line.
    pub fn from_script(script: &str) -> Self {
        Self {
            lines: script.lines().map(str::to_string).collect(),
        }
    }

    /// Return a new batch with `export VAR=value` prepended, leaving this
    /// batch untouched.
    pub fn with_export(&self, var: &str, value: &str) -> Self {
        let mut lines = Vec::with_capacity(self.lines.len() + 1);
        lines.push(format!("export {var}={value}"));
        lines.extend(self.lines.iter().cloned());
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Bounds for one health-recovery pass: how many power cycles may be spent,
/// and how each probing attempt is paced.
#[derive(Debug, Clone, Copy)]
pub struct RetryBudget {
    pub max_cycles: u32,
    pub per_attempt_timeout: Duration,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Success,
    Failed,
    TimedOut,
}

/// Captured execution result for one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub status: CommandStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }
}

/// Per-instance execution results, keyed by instance id. Entries are added
/// once per targeted instance and never retracted.
pub type DispatchResult = BTreeMap<String, CommandOutcome>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_export_prepends() {
        let batch = CommandBatch::new(vec!["cd /srv".into(), "./run.sh".into()]);
        let wired = batch.with_export("NATS_PUBLIC_IP", "54.226.179.43");

        assert_eq!(wired.lines()[0], "export NATS_PUBLIC_IP=54.226.179.43");
        assert_eq!(wired.lines()[1], "cd /srv");
        assert_eq!(wired.lines().len(), 3);
        // Source batch untouched
        assert_eq!(batch.lines().len(), 2);
        assert_eq!(batch.lines()[0], "cd /srv");
    }

    #[test]
    fn test_from_script_splits_lines() {
        let batch = CommandBatch::from_script("cd /srv\n./run.sh\n");
        assert_eq!(batch.lines(), &["cd /srv".to_string(), "./run.sh".to_string()]);
    }

    #[test]
    fn test_empty_batch() {
        assert!(CommandBatch::new(vec![]).is_empty());
        assert!(!CommandBatch::from_script("ls").is_empty());
    }
}
