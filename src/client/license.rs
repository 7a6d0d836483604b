//! HTTP client for the Seatgate license endpoints.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::errors::ClientApiError;
use crate::client::machine::MachineId;
use crate::errors::{LicenseError, LicenseResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyPayload<'a> {
    identity: &'a str,
    secret: &'a str,
    machine_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReleasePayload<'a> {
    identity: &'a str,
    machine_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ErrorReportPayload<'a> {
    email: &'a str,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyBody {
    valid: bool,
    valid_until: NaiveDate,
    status: String,
}

/// A granted seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedLicense {
    /// Last day the license can be used
    pub valid_until: NaiveDate,
    /// Account status reported by the server
    pub status: String,
}

/// Client bound to one server and one machine.
#[derive(Debug, Clone)]
pub struct LicenseClient {
    base_url: String,
    machine_id: MachineId,
    http: Client,
}

impl LicenseClient {
    pub fn new(base_url: impl Into<String>, machine_id: MachineId) -> LicenseResult<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_http_client(base_url, machine_id, http))
    }

    pub fn with_http_client(
        base_url: impl Into<String>,
        machine_id: MachineId,
        http: Client,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            machine_id,
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn machine_id(&self) -> &MachineId {
        &self.machine_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Verify credentials and claim the seat for this machine.
    ///
    /// Denials come back as `LicenseError::ClientApiError`; inspect its code
    /// to tell a machine conflict from bad credentials.
    pub async fn verify(&self, email: &str, password: &str) -> LicenseResult<VerifiedLicense> {
        let payload = VerifyPayload {
            identity: email,
            secret: password,
            machine_id: self.machine_id.as_str(),
        };

        let resp = self
            .http
            .post(self.url("/api/auth/verify"))
            .json(&payload)
            .send()
            .await?;
        let resp = ensure_success(resp).await?;

        let body: VerifyBody = resp.json().await.map_err(|e| {
            LicenseError::ServerError(format!("Failed to parse verify response: {e}"))
        })?;

        if !body.valid {
            return Err(LicenseError::ServerError(
                "Server answered 200 without granting the license".to_string(),
            ));
        }

        debug!("License valid until {}", body.valid_until);
        Ok(VerifiedLicense {
            valid_until: body.valid_until,
            status: body.status,
        })
    }

    /// Release this machine's seat. Succeeds even if no seat was held.
    pub async fn release(&self, email: &str) -> LicenseResult<()> {
        let payload = ReleasePayload {
            identity: email,
            machine_id: self.machine_id.as_str(),
        };

        let resp = self
            .http
            .post(self.url("/api/auth/release"))
            .json(&payload)
            .send()
            .await?;
        ensure_success(resp).await?;

        info!("Released seat for {email}");
        Ok(())
    }

    /// Send an automation failure report to the admins.
    pub async fn report_error(&self, email: &str, message: &str) -> LicenseResult<()> {
        let payload = ErrorReportPayload { email, message };

        let resp = self
            .http
            .post(self.url("/api/error-reports"))
            .json(&payload)
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }
}

async fn ensure_success(resp: Response) -> LicenseResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let err = ClientApiError::from_body(status.as_u16(), &body);
    warn!("License server refused request ({status}): {}", err.code);
    Err(err.into())
}
