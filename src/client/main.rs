//! Command-line client for a Seatgate server.
//!
//! ```text
//! seatgate_client verify --email E --password P
//! seatgate_client release --email E
//! seatgate_client report --email E --message M
//! ```
//!
//! The server URL comes from `SEATGATE_SERVER_URL` (default `http://localhost:3000`).

use std::env;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use seatgate::client::{LicenseClient, MachineId};
use seatgate::errors::{LicenseError, LicenseResult};

const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

fn flag(args: &[String], long: &str, short: &str) -> Option<String> {
    args.iter()
        .position(|a| a == long || a == short)
        .and_then(|i| args.get(i + 1).cloned())
}

fn required(args: &[String], long: &str, short: &str) -> LicenseResult<String> {
    flag(args, long, short)
        .ok_or_else(|| LicenseError::InvalidRequest(format!("{long} is required")))
}

async fn run(args: &[String]) -> LicenseResult<()> {
    let server_url =
        env::var("SEATGATE_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
    let machine_id = MachineId::load_or_create_default().await?;
    let client = LicenseClient::new(server_url, machine_id)?;

    match args.get(1).map(String::as_str) {
        Some("verify") => {
            let email = required(args, "--email", "-e")?;
            let password = required(args, "--password", "-p")?;
            let license = client.verify(&email, &password).await?;
            println!(
                "License valid until {} (status: {})",
                license.valid_until, license.status
            );
        }
        Some("release") => {
            let email = required(args, "--email", "-e")?;
            client.release(&email).await?;
            println!("Seat released");
        }
        Some("report") => {
            let email = required(args, "--email", "-e")?;
            let message = required(args, "--message", "-m")?;
            client.report_error(&email, &message).await?;
            println!("Error report sent");
        }
        Some("machine-id") => println!("{}", client.machine_id()),
        _ => {
            return Err(LicenseError::InvalidRequest(
                "usage: seatgate_client <verify|release|report|machine-id> [options]".to_string(),
            ))
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().collect();
    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(LicenseError::ClientApiError(err)) => {
            eprintln!("Denied: {}", err.message);
            if let Some(last_seen) = &err.last_seen_at {
                eprintln!("The other machine was last seen at {last_seen}");
            }
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
