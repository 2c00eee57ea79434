//! The external radar munging capability.
//!
//! "Munging" rewrites a radar scan's embedded timestamp to its simulated
//! current time. The real implementation is an external binary; the
//! dispatch loop and its tests only ever see the [`Munger`] capability,
//! so no binary needs to be present to exercise the scheduling logic.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use squall_core::SpeedFactor;
use squall_core::clock::format_std;
use squall_types::SiteId;

use crate::error::DispatchError;

/// Rewrites a scan file's embedded timestamp to the target current time.
#[allow(async_fn_in_trait)]
pub trait Munger {
    /// Produce a munged copy of `input` for `site`, stamped at
    /// `target_time`, and return the output path.
    async fn munge(
        &self,
        site: &SiteId,
        target_time: DateTime<Utc>,
        speed: SpeedFactor,
        input: &Path,
    ) -> Result<PathBuf, DispatchError>;
}

/// Invokes the configured external munger binary.
///
/// Invocation: `<binary> <site> <target_time> <speed> <input> <output>`,
/// where `<target_time>` is `STD_FMT`. The child is killed after the
/// configured timeout; the legacy design had no stall bound, which could
/// hang a replay indefinitely on one bad scan.
pub struct ExternalMunger {
    binary: PathBuf,
    staging_dir: PathBuf,
    timeout: Duration,
}

impl ExternalMunger {
    /// Create a munger invoking `binary`, writing output under
    /// `staging_dir`, with the given subprocess time bound.
    pub fn new(binary: &Path, staging_dir: &Path, timeout: Duration) -> Self {
        Self {
            binary: binary.to_path_buf(),
            staging_dir: staging_dir.to_path_buf(),
            timeout,
        }
    }

    /// Output path for one munged scan.
    fn output_path(&self, site: &SiteId, target_time: DateTime<Utc>) -> PathBuf {
        self.staging_dir.join(format!(
            "{site}{}",
            target_time.format("%Y%m%d_%H%M%S")
        ))
    }
}

impl Munger for ExternalMunger {
    async fn munge(
        &self,
        site: &SiteId,
        target_time: DateTime<Utc>,
        speed: SpeedFactor,
        input: &Path,
    ) -> Result<PathBuf, DispatchError> {
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let output = self.output_path(site, target_time);

        let mut command = tokio::process::Command::new(&self.binary);
        command
            .arg(site.as_str())
            .arg(format_std(target_time))
            .arg(speed.to_string())
            .arg(input)
            .arg(&output)
            .kill_on_drop(true);

        let result = tokio::time::timeout(self.timeout, command.output()).await;
        let out = match result {
            Ok(spawn_result) => spawn_result?,
            Err(_elapsed) => {
                return Err(DispatchError::MungeTimeout {
                    secs: self.timeout.as_secs(),
                });
            }
        };

        if !out.status.success() {
            return Err(DispatchError::Munge {
                message: format!(
                    "{} exited with {}: {}",
                    self.binary.display(),
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
            });
        }
        if !output.exists() {
            return Err(DispatchError::Munge {
                message: format!("no output produced at {}", output.display()),
            });
        }

        tracing::debug!(
            site = %site,
            output = %output.display(),
            "Scan munged"
        );
        Ok(output)
    }
}

/// In-process stand-in for the external munger.
///
/// Copies the input file into the staging directory under the munged
/// name. Used by loop and dispatcher tests; no timestamp is actually
/// rewritten.
pub struct StubMunger {
    staging_dir: PathBuf,
}

impl StubMunger {
    /// Create a stub writing output under `staging_dir`.
    pub fn new(staging_dir: &Path) -> Self {
        Self {
            staging_dir: staging_dir.to_path_buf(),
        }
    }
}

impl Munger for StubMunger {
    async fn munge(
        &self,
        site: &SiteId,
        target_time: DateTime<Utc>,
        _speed: SpeedFactor,
        input: &Path,
    ) -> Result<PathBuf, DispatchError> {
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let output = self.staging_dir.join(format!(
            "{site}{}",
            target_time.format("%Y%m%d_%H%M%S")
        ));
        tokio::fs::copy(input, &output).await?;
        Ok(output)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn target() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 25, 12, 0, 5).unwrap()
    }

    #[tokio::test]
    async fn stub_munger_copies_input_under_munged_name() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.raw");
        tokio::fs::write(&input, b"radar bytes").await.unwrap();

        let staging = dir.path().join("staging");
        let munger = StubMunger::new(&staging);
        let site = SiteId::new("KTLX").unwrap();
        let output = munger
            .munge(&site, target(), SpeedFactor::new(60.0).unwrap(), &input)
            .await
            .unwrap();

        assert_eq!(output, staging.join("KTLX20260825_120005"));
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"radar bytes");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn external_munger_reports_nonzero_exit_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.raw");
        tokio::fs::write(&input, b"radar bytes").await.unwrap();

        let munger = ExternalMunger::new(
            Path::new("/bin/false"),
            &dir.path().join("staging"),
            Duration::from_secs(5),
        );
        let site = SiteId::new("KTLX").unwrap();
        let result = munger
            .munge(&site, target(), SpeedFactor::new(60.0).unwrap(), &input)
            .await;

        assert!(matches!(result, Err(DispatchError::Munge { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn external_munger_runs_a_real_command() {
        use std::os::unix::fs::PermissionsExt as _;

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.raw");
        tokio::fs::write(&input, b"radar bytes").await.unwrap();

        // A minimal munger: copy input ($4) to output ($5).
        let script = dir.path().join("fake-munge.sh");
        tokio::fs::write(&script, "#!/bin/sh\ncp \"$4\" \"$5\"\n")
            .await
            .unwrap();
        let mut perms = tokio::fs::metadata(&script).await.unwrap().permissions();
        perms.set_mode(0o755);
        tokio::fs::set_permissions(&script, perms).await.unwrap();

        let staging = dir.path().join("staging");
        let munger = ExternalMunger::new(&script, &staging, Duration::from_secs(5));
        let site = SiteId::new("KFWS").unwrap();
        let output = munger
            .munge(&site, target(), SpeedFactor::new(60.0).unwrap(), &input)
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"radar bytes");
    }
}
