pub mod aggregator;
pub mod ingest;

use crate::errors::FleetError;

/// Pub/sub sink for raw market-data frames. The broker itself (NATS in
/// production) stays behind this seam.
pub trait Publisher: Send + Sync {
    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), FleetError>;
}
