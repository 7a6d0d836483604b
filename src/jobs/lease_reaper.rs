//! Scheduled lease reaping.
//!
//! Verification already reaps stale leases inline. This job keeps the lease
//! table small on servers that see few verifications.

use chrono::Utc;
use tracing::debug;

use crate::server::reaper::LeaseReaper;

use super::JobError;

/// Delete every lease whose `last_seen_at` is older than the inactivity window.
///
/// Returns the number of leases removed.
pub async fn run_lease_reaper(reaper: &LeaseReaper) -> Result<u64, JobError> {
    let now = Utc::now().naive_utc();
    debug!(
        "Reaping leases last seen before {} at {}",
        reaper.cutoff(now),
        now
    );

    Ok(reaper.sweep_at(now).await?)
}
