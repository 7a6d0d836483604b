//! User expiry sweep.
//!
//! Marks active users whose expiry date has passed as inactive, so the admin
//! listing reflects expiries before the user next tries to verify.

use chrono::Utc;
use tracing::{debug, info};

use crate::server::database::Database;

use super::JobError;

/// Deactivate every active user with `expires_at` before today (UTC).
///
/// Users expiring today stay active until the day is over.
///
/// Returns the number of users deactivated.
pub async fn run_expiry_sweep(db: &Database) -> Result<u64, JobError> {
    let today = Utc::now().date_naive();

    debug!("Checking for users expired before {}", today);

    let count = db.deactivate_expired_users(today).await?;
    if count > 0 {
        info!("Expiry sweep: {} user(s) deactivated", count);
    }

    Ok(count)
}
