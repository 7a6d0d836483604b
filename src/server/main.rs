//! Seatgate license server binary.
//!
//! ```text
//! seatgate_server                                   # serve
//! seatgate_server admin create --email E --password P
//! seatgate_server admin list
//! ```

use std::env;
use std::error::Error;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use seatgate::config::init_config;
use seatgate::server::bootstrap::{
    bootstrap_admin_from_env, execute_admin_command, parse_admin_command,
};
use seatgate::server::{build_router, AppState, Database, SecretHasher};

#[cfg(feature = "background-jobs")]
use seatgate::jobs::JobScheduler;
#[cfg(feature = "background-jobs")]
use seatgate::server::reaper::LeaseReaper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = init_config()?;

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db = Database::new().await?;
    db.migrate().await?;

    let hasher = SecretHasher::default();

    let args: Vec<String> = env::args().collect();
    if execute_admin_command(&db, &hasher, parse_admin_command(&args)).await? {
        return Ok(());
    }

    if let Some(email) = bootstrap_admin_from_env(&db, &hasher).await? {
        info!("Bootstrapped admin {email}");
    }

    #[cfg(feature = "background-jobs")]
    let _scheduler = {
        let reaper = LeaseReaper::new(db.clone(), config.lease.inactivity_window_secs);
        let scheduler = JobScheduler::new(db.clone(), reaper, config.jobs.clone()).await?;
        if scheduler.has_jobs() {
            scheduler.start().await?;
        }
        scheduler
    };

    if !config.auth.enabled {
        warn!("Admin authentication is disabled; admin endpoints will reject every request");
    }

    let state = AppState::with_hasher(db, config.clone(), hasher)?;
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(
        "Seatgate server listening on http://{} ({} database)",
        listener.local_addr()?,
        config.database.db_type
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Seatgate server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutdown signal received");
}
