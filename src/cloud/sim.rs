//! In-memory provider used by the rehearsal binary and the integration
//! tests: the control-plane analog of trading against a paper book. Seeded
//! instances carry knobs for how stubborn they are (power cycles before
//! health checks pass, polls before an invocation turns terminal), and every
//! mutation call is logged so tests can assert exact stop/start counts.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cloud::{name_matches, Compute, Invocation, InvocationStatus, RemoteExec};
use crate::errors::FleetError;
use crate::models::instance::{CheckStatus, HealthVerdict, InstanceRef, LifecycleState};

/// Seed description of one simulated instance.
#[derive(Debug, Clone)]
pub struct SimInstance {
    pub id: String,
    pub name: String,
    pub state: LifecycleState,
    pub public_address: Option<String>,
    pub launched_at: DateTime<Utc>,
    /// Power cycles required before health checks pass (0 = healthy as soon
    /// as the instance runs).
    pub cycles_until_healthy: u32,
    /// Health polls (while running) before the instance check passes.
    pub polls_until_ok: u32,
}

impl SimInstance {
    pub fn new(id: &str, name: &str, state: LifecycleState) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            state,
            public_address: None,
            launched_at: Utc::now(),
            cycles_until_healthy: 0,
            polls_until_ok: 0,
        }
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.public_address = Some(address.to_string());
        self
    }

    pub fn launched(mut self, at: DateTime<Utc>) -> Self {
        self.launched_at = at;
        self
    }

    pub fn needs_power_cycles(mut self, cycles: u32) -> Self {
        self.cycles_until_healthy = cycles;
        self
    }

    pub fn slow_to_pass_checks(mut self, polls: u32) -> Self {
        self.polls_until_ok = polls;
        self
    }
}

#[derive(Debug)]
struct InstanceRecord {
    seed: SimInstance,
    state: LifecycleState,
    power_cycles: u32,
    running_polls: u32,
    stopped_since_boot: bool,
}

/// One recorded `submit_command` call.
#[derive(Debug, Clone)]
pub struct Submission {
    pub job_id: String,
    pub targets: Vec<String>,
    pub commands: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Default)]
struct ComputeState {
    instances: BTreeMap<String, InstanceRecord>,
    start_calls: Vec<Vec<String>>,
    stop_calls: Vec<Vec<String>>,
    health_calls: u32,
}

#[derive(Debug, Default)]
struct ExecState {
    submissions: Vec<Submission>,
    poll_counts: HashMap<(String, String), u32>,
    /// Polls each invocation reports InProgress before turning terminal.
    polls_until_terminal: u32,
    /// Targets whose invocation fetch errors outright.
    fail_fetch_for: HashSet<String>,
    /// Terminal status overrides per target (default Success).
    terminal_status: HashMap<String, InvocationStatus>,
}

#[derive(Debug, Default)]
pub struct SimCloud {
    compute: Mutex<ComputeState>,
    exec: Mutex<ExecState>,
}

impl SimCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, instance: SimInstance) {
        let mut compute = self.compute.lock().unwrap_or_else(|e| e.into_inner());
        let record = InstanceRecord {
            state: instance.state,
            power_cycles: 0,
            running_polls: 0,
            stopped_since_boot: false,
            seed: instance,
        };
        compute.instances.insert(record.seed.id.clone(), record);
    }

    // -- test/rehearsal knobs ------------------------------------------------

    pub fn set_polls_until_terminal(&self, polls: u32) {
        self.exec.lock().unwrap_or_else(|e| e.into_inner()).polls_until_terminal = polls;
    }

    pub fn fail_invocation_fetch_for(&self, target: &str) {
        self.exec
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .fail_fetch_for
            .insert(target.to_string());
    }

    pub fn set_terminal_status(&self, target: &str, status: InvocationStatus) {
        self.exec
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .terminal_status
            .insert(target.to_string(), status);
    }

    // -- accounting ----------------------------------------------------------

    pub fn start_call_count(&self) -> usize {
        self.compute.lock().unwrap_or_else(|e| e.into_inner()).start_calls.len()
    }

    pub fn stop_call_count(&self) -> usize {
        self.compute.lock().unwrap_or_else(|e| e.into_inner()).stop_calls.len()
    }

    pub fn health_call_count(&self) -> u32 {
        self.compute.lock().unwrap_or_else(|e| e.into_inner()).health_calls
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.exec.lock().unwrap_or_else(|e| e.into_inner()).submissions.clone()
    }

    pub fn last_submission(&self) -> Option<Submission> {
        self.exec
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .submissions
            .last()
            .cloned()
    }

    pub fn instance_state(&self, id: &str) -> Option<LifecycleState> {
        self.compute
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .instances
            .get(id)
            .map(|r| r.state)
    }
}

impl Compute for SimCloud {
    async fn list_instances(&self, name_pattern: &str) -> Result<Vec<InstanceRef>, FleetError> {
        let compute = self.compute.lock().unwrap_or_else(|e| e.into_inner());
        Ok(compute
            .instances
            .values()
            .filter(|r| name_matches(name_pattern, &r.seed.name))
            .map(|r| InstanceRef {
                id: r.seed.id.clone(),
                name: r.seed.name.clone(),
                lifecycle_state: r.state,
                public_address: r.seed.public_address.clone(),
                launched_at: r.seed.launched_at,
            })
            .collect())
    }

    async fn start_instances(&self, ids: &[String]) -> Result<(), FleetError> {
        let mut compute = self.compute.lock().unwrap_or_else(|e| e.into_inner());
        compute.start_calls.push(ids.to_vec());
        for id in ids {
            let record = compute
                .instances
                .get_mut(id)
                .ok_or_else(|| FleetError::Provider(format!("unknown instance {id}")))?;
            if matches!(record.state, LifecycleState::Stopped | LifecycleState::Pending) {
                record.state = LifecycleState::Running;
                if record.stopped_since_boot {
                    record.power_cycles += 1;
                    record.stopped_since_boot = false;
                }
            }
        }
        Ok(())
    }

    async fn stop_instances(&self, ids: &[String]) -> Result<(), FleetError> {
        let mut compute = self.compute.lock().unwrap_or_else(|e| e.into_inner());
        compute.stop_calls.push(ids.to_vec());
        for id in ids {
            let record = compute
                .instances
                .get_mut(id)
                .ok_or_else(|| FleetError::Provider(format!("unknown instance {id}")))?;
            if matches!(record.state, LifecycleState::Running | LifecycleState::Pending) {
                record.state = LifecycleState::Stopping;
                record.stopped_since_boot = true;
            }
        }
        Ok(())
    }

    async fn wait_for_state(
        &self,
        ids: &[String],
        target: LifecycleState,
    ) -> Result<(), FleetError> {
        let mut compute = self.compute.lock().unwrap_or_else(|e| e.into_inner());
        for id in ids {
            let record = compute
                .instances
                .get_mut(id)
                .ok_or_else(|| FleetError::Provider(format!("unknown instance {id}")))?;
            // The waiter "completes" in-flight transitions.
            match (record.state, target) {
                (LifecycleState::Stopping, LifecycleState::Stopped) => {
                    record.state = LifecycleState::Stopped;
                }
                (LifecycleState::Pending, LifecycleState::Running) => {
                    record.state = LifecycleState::Running;
                }
                (current, wanted) if current == wanted => {}
                (current, wanted) => {
                    return Err(FleetError::Provider(format!(
                        "waiter gave up: {id} is {current:?}, wanted {wanted:?}"
                    )));
                }
            }
        }
        Ok(())
    }

    async fn describe_health(&self, ids: &[String]) -> Result<Vec<HealthVerdict>, FleetError> {
        let mut compute = self.compute.lock().unwrap_or_else(|e| e.into_inner());
        compute.health_calls += 1;
        let mut verdicts = Vec::with_capacity(ids.len());
        for id in ids {
            let record = compute
                .instances
                .get_mut(id)
                .ok_or_else(|| FleetError::Provider(format!("unknown instance {id}")))?;
            let verdict = if record.state == LifecycleState::Running {
                record.running_polls += 1;
                let passed = record.power_cycles >= record.seed.cycles_until_healthy
                    && record.running_polls > record.seed.polls_until_ok;
                HealthVerdict {
                    id: id.clone(),
                    system_check: CheckStatus::Ok,
                    instance_check: if passed { CheckStatus::Ok } else { CheckStatus::Impaired },
                }
            } else {
                HealthVerdict {
                    id: id.clone(),
                    system_check: CheckStatus::Initializing,
                    instance_check: CheckStatus::Initializing,
                }
            };
            verdicts.push(verdict);
        }
        Ok(verdicts)
    }
}

impl RemoteExec for SimCloud {
    async fn submit_command(
        &self,
        targets: &[String],
        commands: &[String],
        timeout: Duration,
    ) -> Result<String, FleetError> {
        let mut exec = self.exec.lock().unwrap_or_else(|e| e.into_inner());
        let job_id = format!("cmd-{}", Uuid::new_v4());
        exec.submissions.push(Submission {
            job_id: job_id.clone(),
            targets: targets.to_vec(),
            commands: commands.to_vec(),
            timeout,
        });
        Ok(job_id)
    }

    async fn get_invocation(
        &self,
        job_id: &str,
        target: &str,
    ) -> Result<Invocation, FleetError> {
        let mut exec = self.exec.lock().unwrap_or_else(|e| e.into_inner());

        if exec.fail_fetch_for.contains(target) {
            return Err(FleetError::Provider(format!(
                "invocation fetch failed for {target}"
            )));
        }

        let submission = exec
            .submissions
            .iter()
            .find(|s| s.job_id == job_id)
            .cloned()
            .ok_or_else(|| FleetError::Provider(format!("unknown job {job_id}")))?;
        if !submission.targets.iter().any(|t| t == target) {
            return Err(FleetError::Provider(format!(
                "{target} was not a target of job {job_id}"
            )));
        }

        let threshold = exec.polls_until_terminal;
        let key = (job_id.to_string(), target.to_string());
        let polls = exec.poll_counts.entry(key).or_insert(0);
        *polls += 1;
        if *polls <= threshold {
            return Ok(Invocation {
                status: InvocationStatus::InProgress,
                stdout: String::new(),
                stderr: String::new(),
            });
        }

        let status = exec
            .terminal_status
            .get(target)
            .copied()
            .unwrap_or(InvocationStatus::Success);
        let (stdout, stderr) = match status {
            InvocationStatus::Success => {
                (format!("{} command(s) executed", submission.commands.len()), String::new())
            }
            InvocationStatus::Failed => (String::new(), "command exited non-zero".to_string()),
            InvocationStatus::TimedOut => (String::new(), "command timed out".to_string()),
            _ => (String::new(), String::new()),
        };
        Ok(Invocation { status, stdout, stderr })
    }
}
