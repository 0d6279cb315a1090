use crate::{EdgeFailure, Result, SyncCycleResult};
use async_trait::async_trait;

/// Resolves artifact locators to bytes. Implementations decide what a locator is
/// (a path, a URI, a key).
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn read(&self, locator: &str) -> Result<Vec<u8>>;
    async fn write(&self, locator: &str, bytes: &[u8]) -> Result<()>;
}

/// Pluggable sink for cycle outcomes (logging, alerting, metrics export).
pub trait SyncNotifier: Send + Sync {
    fn on_edge_failure(&self, failure: &EdgeFailure);
    fn on_cycle_complete(&self, result: &SyncCycleResult);
}
