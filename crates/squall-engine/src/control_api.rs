//! Client for the consumed control-plane HTTP API.
//!
//! The control plane is an external service; Squall only consumes it. The
//! replay loops poll it for liveness, the `start` verb pushes timing
//! parameters to it, and a finished replay notifies it of completion. The
//! admin passcode is an opaque credential read from config and forwarded
//! as-is, never validated here.
//!
//! A failed liveness poll is reported as an error to the caller, who
//! treats it as "still running" (fail-open); a flaky network must not
//! terminate a replay.

use std::time::Duration;

use serde::Deserialize;
use squall_core::TimingContext;
use squall_core::clock::format_std;
use squall_core::config::ControlApiConfig;

/// Errors from the control-plane API client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request failed outright.
    #[error("control API request failed: {source}")]
    Http {
        /// The underlying transport error.
        #[from]
        source: reqwest::Error,
    },

    /// The control plane answered with a non-success status.
    #[error("control API returned status {status}")]
    Status {
        /// The response status code.
        status: u16,
    },
}

/// Whether a simulation is flagged running remotely.
///
/// The probe seam lets loop tests script remote termination without an
/// HTTP server.
#[allow(async_fn_in_trait)]
pub trait LivenessProbe {
    /// Poll the remote running flag.
    async fn is_running(&self) -> Result<bool, ApiError>;
}

/// Wire shape of `GET /simulation/running`.
#[derive(Debug, Deserialize)]
struct RunningResponse {
    running: bool,
}

/// HTTP client for the control-plane API.
pub struct ControlApiClient {
    client: reqwest::Client,
    base_url: String,
    passcode: String,
}

impl ControlApiClient {
    /// Build a client from the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] if the underlying client cannot be
    /// constructed.
    pub fn new(config: &ControlApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            passcode: config.passcode.clone(),
        })
    }

    /// Push timing parameters and the running flag to the control plane.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or is rejected.
    pub async fn push_timings(&self, timings: &TimingContext) -> Result<(), ApiError> {
        let response = self
            .client
            .put(format!("{}/simulation/timings", self.base_url))
            .form(&[
                ("auth", self.passcode.as_str()),
                ("simulation_running", "true"),
                ("arc_start_time", &format_std(timings.archive_epoch)),
                ("cur_start_time", &format_std(timings.current_epoch)),
                ("speed_factor", &timings.speed.to_string()),
            ])
            .send()
            .await?;
        Self::check(response.status())?;

        tracing::info!("Timings pushed to control API");
        Ok(())
    }

    /// Signal that the replay has completed.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails or is rejected.
    pub async fn notify_complete(&self) -> Result<(), ApiError> {
        let response = self
            .client
            .put(format!("{}/simulation/config", self.base_url))
            .form(&[
                ("auth", self.passcode.as_str()),
                ("simulation_complete", "true"),
            ])
            .send()
            .await?;
        Self::check(response.status())?;

        tracing::info!("Completion reported to control API");
        Ok(())
    }

    fn check(status: reqwest::StatusCode) -> Result<(), ApiError> {
        if status.is_success() {
            Ok(())
        } else {
            Err(ApiError::Status {
                status: status.as_u16(),
            })
        }
    }
}

impl LivenessProbe for ControlApiClient {
    async fn is_running(&self) -> Result<bool, ApiError> {
        let response = self
            .client
            .get(format!("{}/simulation/running", self.base_url))
            .send()
            .await?;
        Self::check(response.status())?;
        let body: RunningResponse = response.json().await?;
        Ok(body.running)
    }
}
