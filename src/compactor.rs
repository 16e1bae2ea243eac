use std::time::Duration;

use tracing::{info, warn};

use crate::observability;
use crate::store::{StoreError, WalStore};

/// Period a host passes to [`run_compactor`] unless it has a reason not to.
pub const DEFAULT_CHECK_PERIOD: Duration = Duration::from_secs(30);

/// Compact when the WAL has grown past `threshold` records. Returns whether it did.
pub async fn compact_if_needed(store: &WalStore, threshold: u64) -> Result<bool, StoreError> {
    let appends = store.wal_appends_since_compact().await;
    if appends < threshold {
        return Ok(false);
    }
    store.compact().await?;
    metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
    info!(appends, "compacted WAL");
    Ok(true)
}

/// Background task that keeps the WAL from growing without bound.
///
/// For hosts that keep a [`WalStore`] open for a long time; spawn it next to
/// the store. The CLI is short-lived and calls [`compact_if_needed`] once instead.
pub async fn run_compactor(store: WalStore, threshold: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_needed(&store, threshold).await {
            warn!("compaction failed: {e}");
        }
    }
}
