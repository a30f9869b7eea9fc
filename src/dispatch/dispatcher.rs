use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::cloud::{InvocationStatus, RemoteExec};
use crate::errors::FleetError;
use crate::models::command::{CommandBatch, CommandOutcome, CommandStatus, DispatchResult};

/// Sends one command batch to a set of instances and collects per-instance
/// results.
///
/// The batch goes out as a single multi-target submission; results come back
/// one target at a time. Each target's invocation is polled until it reaches
/// a terminal status or the result deadline lands — a fetch that fails only
/// poisons that target's entry, never the batch.
pub struct Dispatcher<'a, R: RemoteExec> {
    exec: &'a R,
    /// Grace period between submission and the first result poll, so we do
    /// not race the remote agent's acknowledgment.
    settle_delay: Duration,
    poll_interval: Duration,
    result_deadline: Duration,
}

impl<'a, R: RemoteExec> Dispatcher<'a, R> {
    pub fn new(
        exec: &'a R,
        settle_delay: Duration,
        poll_interval: Duration,
        result_deadline: Duration,
    ) -> Self {
        Self {
            exec,
            settle_delay,
            poll_interval,
            result_deadline,
        }
    }

    pub async fn dispatch(
        &self,
        ids: &[String],
        batch: &CommandBatch,
        timeout: Duration,
    ) -> Result<DispatchResult, FleetError> {
        let mut results = DispatchResult::new();
        if ids.is_empty() {
            return Ok(results);
        }

        let job_id = self
            .exec
            .submit_command(ids, batch.lines(), timeout)
            .await?;
        info!(job = %job_id, targets = ids.len(), lines = batch.lines().len(), "command batch submitted");

        sleep(self.settle_delay).await;

        let fetches = ids.iter().map(|id| self.fetch_outcome(&job_id, id));
        for (id, outcome) in join_all(fetches).await {
            results.insert(id, outcome);
        }
        Ok(results)
    }

    async fn fetch_outcome(&self, job_id: &str, id: &str) -> (String, CommandOutcome) {
        let deadline = Instant::now() + self.result_deadline;

        loop {
            match self.exec.get_invocation(job_id, id).await {
                Ok(inv) if inv.status.is_terminal() => {
                    let status = match inv.status {
                        InvocationStatus::Success => CommandStatus::Success,
                        InvocationStatus::TimedOut => CommandStatus::TimedOut,
                        _ => CommandStatus::Failed,
                    };
                    return (
                        id.to_string(),
                        CommandOutcome {
                            status,
                            stdout: inv.stdout,
                            stderr: inv.stderr,
                        },
                    );
                }
                Ok(inv) => {
                    debug!(instance = %id, status = ?inv.status, "invocation not yet terminal");
                }
                Err(e) => {
                    warn!(instance = %id, error = %e, "invocation fetch failed");
                    return (
                        id.to_string(),
                        CommandOutcome {
                            status: CommandStatus::Failed,
                            stdout: String::new(),
                            stderr: e.to_string(),
                        },
                    );
                }
            }

            if Instant::now() >= deadline {
                return (
                    id.to_string(),
                    CommandOutcome {
                        status: CommandStatus::TimedOut,
                        stdout: String::new(),
                        stderr: format!(
                            "no terminal invocation status within {:?}",
                            self.result_deadline
                        ),
                    },
                );
            }
            sleep(self.poll_interval).await;
        }
    }
}
