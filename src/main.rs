//! Rehearsal binary: runs the full orchestration against the simulated
//! provider — wake the ingest node, health-gate the fleet (one seeded server
//! needs a power cycle), dispatch the bootstrap batches, then stop everything
//! again.
//!
//! Usage:  cargo run

use std::sync::Arc;

use reveille::cloud::sim::{SimCloud, SimInstance};
use reveille::config::Config;
use reveille::models::instance::LifecycleState;
use reveille::orchestrator::driver::Orchestrator;
use reveille::orchestrator::lease::LeaseRegistry;

use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("================================================");
    info!("  REVEILLE — trading-fleet orchestrator v0.1.0");
    info!("  Rehearsal against the simulated provider");
    info!("================================================");

    let config = Config::load_or_default();
    config.validate()?;

    let mut orch_cfg = config.orchestration.clone();

    // The rehearsal has nothing configured to dispatch unless the operator
    // provided batches; give it the standard bootstrap scripts.
    if orch_cfg.server_commands.is_empty() {
        orch_cfg.server_commands = vec!["cd /opt/trading-server".into(), "./run.sh".into()];
    }
    if orch_cfg.ingest_commands.is_empty() {
        orch_cfg.ingest_commands = vec!["cd /opt/alpaca-ingest".into(), "./run.sh".into()];
    }

    // Production probe budgets are minutes; the simulated provider answers
    // instantly, so tighten the clock for the rehearsal.
    orch_cfg.probe_timeout_secs = 6;
    orch_cfg.probe_interval_secs = 2;
    orch_cfg.settle_delay_secs = 1;
    orch_cfg.result_poll_secs = 1;
    orch_cfg.result_deadline_secs = 10;

    let env = orch_cfg.environment.clone();

    // === Seed the simulated fleet ===
    let sim = SimCloud::new();
    sim.seed(
        SimInstance::new(
            "i-0a1b2c3d4e5f00001",
            &orch_cfg.ingest_instance_name(),
            LifecycleState::Stopped,
        )
        .with_address("54.226.179.43"),
    );
    sim.seed(SimInstance::new(
        "i-0a1b2c3d4e5f00002",
        &format!("trading-server-{env}-1"),
        LifecycleState::Running,
    ));
    sim.seed(SimInstance::new(
        "i-0a1b2c3d4e5f00003",
        &format!("trading-server-{env}-2"),
        LifecycleState::Stopped,
    ));
    sim.seed(
        SimInstance::new(
            "i-0a1b2c3d4e5f00004",
            &format!("trading-server-{env}-3"),
            LifecycleState::Running,
        )
        .needs_power_cycles(1),
    );
    info!("seeded 1 ingest node + 3 trading servers (one unreachable until power-cycled)");

    let leases = Arc::new(LeaseRegistry::new());
    let orchestrator = Orchestrator::new(&sim, &sim, orch_cfg, leases);

    // === Bring-up ===
    let response = orchestrator.handle().await;
    info!(status = response.status_code, "orchestration finished");
    println!("{}", serde_json::to_string_pretty(&response)?);

    info!(
        stop_calls = sim.stop_call_count(),
        start_calls = sim.start_call_count(),
        health_polls = sim.health_call_count(),
        "provider mutation summary"
    );

    // === Evening shutdown pass ===
    let shutdown = orchestrator.handle_shutdown().await;
    info!(status = shutdown.status_code, "fleet shutdown finished");
    println!("{}", serde_json::to_string_pretty(&shutdown)?);

    Ok(())
}
