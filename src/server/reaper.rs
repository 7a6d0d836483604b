//! Removal of leases whose machine has not verified within the inactivity window.

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Utc};
use tracing::{debug, info};

use crate::errors::LicenseResult;
use crate::server::database::Database;

/// Upper bound for the inactivity window (100 years).
const MAX_WINDOW_SECS: i64 = 100 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct LeaseReaper {
    db: Arc<Database>,
    window: Duration,
}

impl LeaseReaper {
    pub fn new(db: Arc<Database>, inactivity_window_secs: u64) -> Self {
        let secs = i64::try_from(inactivity_window_secs)
            .unwrap_or(MAX_WINDOW_SECS)
            .min(MAX_WINDOW_SECS);
        Self {
            db,
            window: Duration::seconds(secs),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Leases last seen strictly before this instant are stale.
    pub fn cutoff(&self, now: NaiveDateTime) -> NaiveDateTime {
        now.checked_sub_signed(self.window)
            .unwrap_or(NaiveDateTime::MIN)
    }

    /// Delete all stale leases. Returns the number removed.
    pub async fn sweep(&self) -> LicenseResult<u64> {
        self.sweep_at(Utc::now().naive_utc()).await
    }

    pub async fn sweep_at(&self, now: NaiveDateTime) -> LicenseResult<u64> {
        let removed = self.db.sweep_stale_leases(self.cutoff(now)).await?;
        if removed > 0 {
            info!("Reaped {removed} stale lease(s)");
        } else {
            debug!("No stale leases to reap");
        }
        Ok(removed)
    }
}
