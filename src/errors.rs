use chrono::{DateTime, Utc};
use thiserror::Error;

/// Typed error hierarchy for the orchestrator.
///
/// Library-internal errors use specific variants; the binary wraps with
/// `anyhow::Context` for propagation.
#[derive(Error, Debug)]
pub enum FleetError {
    // -- Resolution ---------------------------------------------------------
    #[error("no eligible instances matched pattern \"{pattern}\"")]
    NoMatchingInstances { pattern: String },

    #[error("instance {id} passed health checks but has no public address")]
    MissingAddress { id: String },

    // -- Health -------------------------------------------------------------
    #[error("instances failed health checks after {cycles} power cycle(s): {instances:?}")]
    HealthCheckExhausted {
        cycles: u32,
        instances: Vec<String>,
    },

    #[error("no healthy instances left to dispatch to")]
    NoHealthyInstances,

    // -- Locking ------------------------------------------------------------
    #[error("fleet \"{fleet}\" is leased by another run until {until}")]
    LeaseHeld {
        fleet: String,
        until: DateTime<Utc>,
    },

    // -- Provider -----------------------------------------------------------
    #[error("provider call failed: {0}")]
    Provider(String),

    // -- Forwarded errors ---------------------------------------------------
    #[error(transparent)]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
