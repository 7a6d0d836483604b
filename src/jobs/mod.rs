//! Background job scheduler for Seatgate.
//!
//! Requires the `background-jobs` feature to be enabled.
//!
//! # Available Jobs
//!
//! - **Lease Reaper**: Deletes leases whose machine has not verified within the
//!   inactivity window. Inline reaping on verify makes this optional.
//!
//! - **Expiry Sweep**: Deactivates active users whose expiry date has passed.
//!
//! Both jobs are disabled by default and enabled in the `[jobs]` config section.
//!
//! # Usage
//!
//! ```rust,ignore
//! use seatgate::jobs::JobScheduler;
//! use seatgate::server::reaper::LeaseReaper;
//!
//! let reaper = LeaseReaper::new(db.clone(), config.lease.inactivity_window_secs);
//! let scheduler = JobScheduler::new(db, reaper, config.jobs.clone()).await?;
//! scheduler.start().await?;
//! ```

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler as TokioJobScheduler};
use tracing::{error, info};

use crate::config::JobsConfig;
use crate::server::database::Database;
use crate::server::reaper::LeaseReaper;

mod expiry_sweep;
mod lease_reaper;

pub use expiry_sweep::run_expiry_sweep;
pub use lease_reaper::run_lease_reaper;

/// Background job scheduler for Seatgate.
pub struct JobScheduler {
    scheduler: TokioJobScheduler,
    db: Arc<Database>,
    reaper: LeaseReaper,
    config: JobsConfig,
}

impl JobScheduler {
    /// Create a new job scheduler.
    pub async fn new(
        db: Arc<Database>,
        reaper: LeaseReaper,
        config: JobsConfig,
    ) -> Result<Self, JobError> {
        let scheduler = TokioJobScheduler::new()
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        Ok(Self {
            scheduler,
            db,
            reaper,
            config,
        })
    }

    /// Whether any job is enabled in the config.
    pub fn has_jobs(&self) -> bool {
        self.config.lease_reaper_enabled || self.config.expiry_sweep_enabled
    }

    /// Start the job scheduler with all enabled jobs.
    pub async fn start(&self) -> Result<(), JobError> {
        info!("Starting Seatgate job scheduler");

        if self.config.lease_reaper_enabled {
            self.add_lease_reaper_job().await?;
        }

        if self.config.expiry_sweep_enabled {
            self.add_expiry_sweep_job().await?;
        }

        self.scheduler
            .start()
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        info!("Seatgate job scheduler started");

        Ok(())
    }

    /// Stop the job scheduler.
    pub async fn shutdown(&mut self) -> Result<(), JobError> {
        info!("Shutting down Seatgate job scheduler");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;
        Ok(())
    }

    async fn add_lease_reaper_job(&self) -> Result<(), JobError> {
        let reaper = self.reaper.clone();

        let job = Job::new_async(self.config.lease_reaper_cron.as_str(), move |_uuid, _l| {
            let reaper = reaper.clone();
            Box::pin(async move {
                if let Err(e) = run_lease_reaper(&reaper).await {
                    error!("Lease reaper failed: {}", e);
                }
            })
        })
        .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        info!(
            "Added lease reaper job (schedule: {}, window: {}s)",
            self.config.lease_reaper_cron,
            self.reaper.window().num_seconds()
        );

        Ok(())
    }

    async fn add_expiry_sweep_job(&self) -> Result<(), JobError> {
        let db = Arc::clone(&self.db);

        let job = Job::new_async(self.config.expiry_sweep_cron.as_str(), move |_uuid, _l| {
            let db = Arc::clone(&db);
            Box::pin(async move {
                if let Err(e) = run_expiry_sweep(&db).await {
                    error!("Expiry sweep failed: {}", e);
                }
            })
        })
        .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        info!(
            "Added expiry sweep job (schedule: {})",
            self.config.expiry_sweep_cron
        );

        Ok(())
    }

    /// Run the lease reaper immediately (useful for testing or manual triggers).
    pub async fn run_lease_reaper_now(&self) -> Result<u64, JobError> {
        run_lease_reaper(&self.reaper).await
    }

    /// Run the expiry sweep immediately (useful for testing or manual triggers).
    pub async fn run_expiry_sweep_now(&self) -> Result<u64, JobError> {
        run_expiry_sweep(&self.db).await
    }
}

/// Errors that can occur in the job scheduler.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<crate::errors::LicenseError> for JobError {
    fn from(err: crate::errors::LicenseError) -> Self {
        JobError::DatabaseError(err.to_string())
    }
}
