use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::cloud::{Compute, RemoteExec};
use crate::config::{ExhaustionPolicy, OrchestrationConfig};
use crate::dispatch::dispatcher::Dispatcher;
use crate::errors::FleetError;
use crate::fleet::resolver::FleetResolver;
use crate::health::recovery::RecoveryController;
use crate::models::command::{CommandBatch, DispatchResult};
use crate::models::instance::LifecycleState;
use crate::orchestrator::lease::LeaseRegistry;

/// Lambda-style response envelope, free of any trigger mechanism.
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub status_code: u16,
    pub body: ResponseBody,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Results(DispatchResult),
    Stopped(Vec<String>),
    Message(String),
}

/// The one orchestration entry point: wake the ingest node, health-gate it,
/// discover its address, wake and health-gate the trading fleet, then
/// bootstrap the healthy servers with the address injected into their
/// command batch.
///
/// Clients are constructor-injected; nothing here is shared process-wide.
/// The lease registry handle is explicit so concurrent runs contend on the
/// same leases.
pub struct Orchestrator<'a, C: Compute, R: RemoteExec> {
    compute: &'a C,
    exec: &'a R,
    config: OrchestrationConfig,
    leases: Arc<LeaseRegistry>,
}

impl<'a, C: Compute, R: RemoteExec> Orchestrator<'a, C, R> {
    pub fn new(
        compute: &'a C,
        exec: &'a R,
        config: OrchestrationConfig,
        leases: Arc<LeaseRegistry>,
    ) -> Self {
        Self {
            compute,
            exec,
            config,
            leases,
        }
    }

    /// Full bring-up. Returns the merged per-instance dispatch results.
    ///
    /// Failure policy: resolution and ingest-health errors are always fatal.
    /// Trading-fleet health exhaustion obeys the configured
    /// `ExhaustionPolicy` — `Abort` fails the run, `Degrade` dispatches to
    /// the healthy remainder (and fails only if nobody is left).
    pub async fn run(&self) -> Result<DispatchResult, FleetError> {
        let cfg = &self.config;
        let fleet_pattern = cfg.fleet_pattern();
        let ingest_name = cfg.ingest_instance_name();

        let _lease = self.leases.acquire(&fleet_pattern, cfg.lease_ttl())?;

        let resolver = FleetResolver::new(self.compute);
        let recovery = RecoveryController::new(self.compute, cfg.retry_budget());
        let dispatcher = Dispatcher::new(
            self.exec,
            cfg.settle_delay(),
            cfg.result_poll_interval(),
            cfg.result_deadline(),
        );

        // -- ingest singleton ------------------------------------------------
        let ingest = resolver.resolve_singleton(&ingest_name).await?;
        info!(id = %ingest.id, state = ?ingest.lifecycle_state, "resolved ingest node");

        if ingest.lifecycle_state != LifecycleState::Running {
            self.compute
                .start_instances(std::slice::from_ref(&ingest.id))
                .await?;
        }
        recovery
            .ensure_healthy(&HashSet::from([ingest.id.clone()]))
            .await?;

        // Fresh read: the public address is only trustworthy once the node
        // is up, and may have changed across a power cycle.
        let ingest = resolver.resolve_singleton(&ingest_name).await?;
        let feed_address =
            ingest
                .public_address
                .clone()
                .ok_or_else(|| FleetError::MissingAddress {
                    id: ingest.id.clone(),
                })?;
        info!(address = %feed_address, "ingest node healthy");

        let mut results = DispatchResult::new();

        if !cfg.ingest_commands.is_empty() {
            let batch = CommandBatch::new(cfg.ingest_commands.clone());
            let ingest_results = dispatcher
                .dispatch(
                    std::slice::from_ref(&ingest.id),
                    &batch,
                    cfg.command_timeout(),
                )
                .await?;
            results.extend(ingest_results);
        }

        // -- trading fleet ---------------------------------------------------
        let fleet = resolver.resolve(&fleet_pattern).await?;
        let stopped: Vec<String> = fleet
            .iter()
            .filter(|i| i.lifecycle_state == LifecycleState::Stopped)
            .map(|i| i.id.clone())
            .collect();
        if !stopped.is_empty() {
            info!(count = stopped.len(), "powering on stopped servers");
            self.compute.start_instances(&stopped).await?;
        }

        let all_ids: HashSet<String> = fleet.iter().map(|i| i.id.clone()).collect();
        let healthy = match recovery.ensure_healthy(&all_ids).await {
            Ok(healthy) => healthy,
            Err(FleetError::HealthCheckExhausted { cycles, instances })
                if cfg.exhaustion_policy == ExhaustionPolicy::Degrade =>
            {
                warn!(cycles, abandoned = ?instances, "dispatching without unrecoverable servers");
                let abandoned: HashSet<String> = instances.into_iter().collect();
                all_ids.difference(&abandoned).cloned().collect()
            }
            Err(e) => return Err(e),
        };
        if healthy.is_empty() {
            return Err(FleetError::NoHealthyInstances);
        }

        let batch = CommandBatch::new(cfg.server_commands.clone())
            .with_export(&cfg.address_env_var, &feed_address);
        let mut targets: Vec<String> = healthy.into_iter().collect();
        targets.sort();

        let fleet_results = dispatcher
            .dispatch(&targets, &batch, cfg.command_timeout())
            .await?;
        results.extend(fleet_results);

        Ok(results)
    }

    /// `run` wrapped in the `{status_code, body}` envelope.
    pub async fn handle(&self) -> RunResponse {
        match self.run().await {
            Ok(results) => RunResponse {
                status_code: 200,
                body: ResponseBody::Results(results),
            },
            Err(e) => {
                error!("orchestration failed: {e}");
                RunResponse {
                    status_code: 500,
                    body: ResponseBody::Message(e.to_string()),
                }
            }
        }
    }

    /// Stop every fleet + ingest instance that is not already stopped,
    /// stopping, or gone. An empty candidate set is a success, not an error.
    pub async fn shutdown(&self) -> Result<Vec<String>, FleetError> {
        let cfg = &self.config;
        let fleet_pattern = cfg.fleet_pattern();
        let _lease = self.leases.acquire(&fleet_pattern, cfg.lease_ttl())?;

        let skip = &[
            LifecycleState::Stopped,
            LifecycleState::Stopping,
            LifecycleState::ShuttingDown,
            LifecycleState::Terminated,
        ];
        let resolver = FleetResolver::new(self.compute);
        let mut targets = resolver.find(&fleet_pattern, skip).await?;
        targets.extend(resolver.find(&cfg.ingest_instance_name(), skip).await?);

        let mut ids: Vec<String> = targets.into_iter().map(|i| i.id).collect();
        ids.sort();
        ids.dedup();

        if ids.is_empty() {
            info!("no instances to stop");
            return Ok(ids);
        }

        info!(count = ids.len(), "stopping fleet");
        self.compute.stop_instances(&ids).await?;
        Ok(ids)
    }

    /// `shutdown` wrapped in the response envelope.
    pub async fn handle_shutdown(&self) -> RunResponse {
        match self.shutdown().await {
            Ok(ids) => RunResponse {
                status_code: 200,
                body: ResponseBody::Stopped(ids),
            },
            Err(e) => {
                error!("fleet shutdown failed: {e}");
                RunResponse {
                    status_code: 500,
                    body: ResponseBody::Message(e.to_string()),
                }
            }
        }
    }
}
