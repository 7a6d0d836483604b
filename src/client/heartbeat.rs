//! Periodic re-verification while the tool runs.
//!
//! Each check is a full verify, which also refreshes the seat's
//! `last_seen_at` on the server and keeps the lease from going stale.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::errors::ClientApiError;
use crate::client::license::{LicenseClient, VerifiedLicense};
use crate::errors::LicenseError;

/// Default time between checks (30 minutes).
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Latest result of the periodic check.
#[derive(Debug, Clone)]
pub enum CheckStatus {
    /// No check has completed yet
    Pending,
    /// The last check granted the seat
    Valid(VerifiedLicense),
    /// The server refused; checking has stopped
    Denied(ClientApiError),
    /// The last check got no usable answer (network failure, server fault,
    /// unexpected response); checking continues
    Unreachable(String),
}

impl CheckStatus {
    /// Whether the tool may keep running.
    ///
    /// A transient failure does not revoke a seat that was granted.
    pub fn is_valid(&self) -> bool {
        !matches!(self, CheckStatus::Denied(_))
    }
}

/// Handle to a background re-verification task.
pub struct PeriodicCheck {
    status: watch::Receiver<CheckStatus>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicCheck {
    /// Start checking with [`DEFAULT_CHECK_INTERVAL`].
    pub fn start(client: LicenseClient, email: String, password: String) -> Self {
        Self::start_with_interval(client, email, password, DEFAULT_CHECK_INTERVAL)
    }

    /// Start checking every `check_interval`, beginning one interval from now.
    pub fn start_with_interval(
        client: LicenseClient,
        email: String,
        password: String,
        check_interval: Duration,
    ) -> Self {
        let (tx, rx) = watch::channel(CheckStatus::Pending);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + check_interval, check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        debug!("Periodic license check cancelled");
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                let status = match client.verify(&email, &password).await {
                    Ok(license) => CheckStatus::Valid(license),
                    Err(LicenseError::ClientApiError(err)) if err.is_denial() => {
                        CheckStatus::Denied(err)
                    }
                    Err(e) => {
                        warn!("Periodic license check failed: {e}");
                        CheckStatus::Unreachable(e.to_string())
                    }
                };

                let denied = matches!(status, CheckStatus::Denied(_));
                if denied {
                    info!("License no longer valid, stopping periodic checks");
                }
                if tx.send(status).is_err() || denied {
                    break;
                }
            }
        });

        Self {
            status: rx,
            cancel,
            handle,
        }
    }

    /// The most recent status.
    pub fn status(&self) -> CheckStatus {
        self.status.borrow().clone()
    }

    /// A receiver that is notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<CheckStatus> {
        self.status.clone()
    }

    /// True once the task has stopped, either cancelled or after a denial.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the task and wait for it to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("Periodic license check task ended abnormally: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::errors::ClientErrorCode;

    #[test]
    fn only_denial_is_invalid() {
        assert!(CheckStatus::Pending.is_valid());
        assert!(CheckStatus::Unreachable("timeout".into()).is_valid());
        assert!(!CheckStatus::Denied(ClientApiError::new(ClientErrorCode::Inactive, "off"))
            .is_valid());
    }

    #[test]
    fn default_interval_is_thirty_minutes() {
        assert_eq!(DEFAULT_CHECK_INTERVAL, Duration::from_secs(1800));
    }
}
