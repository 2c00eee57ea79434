//! Warning text release: timestamp rewriting and hour-bucketed append.
//!
//! Archived warning text carries embedded `STD_FMT` timestamps from the
//! original event. On release, each one is rewritten to its mapped
//! current time, and the whole block is appended to a file named by the
//! *current* (not archive) hour: `warnings_<YYYYMMDD>_<HH>.txt`.
//!
//! The append is a single write call on a file opened in append mode, so
//! a partial write can never truncate prior content. Redelivery is
//! tolerated by skipping the append when the bucket already contains the
//! rewritten block.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::Regex;
use squall_core::TimingContext;
use squall_core::clock::{format_std, parse_std};
use squall_types::WarningEvent;
use tokio::io::AsyncWriteExt as _;

use crate::Dispatcher;
use crate::error::DispatchError;

/// Matches `STD_FMT` timestamps embedded in warning text.
const TIMESTAMP_PATTERN: &str = r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}";

/// Releases warnings by appending rewritten text to hour-bucketed files.
pub struct WarningDispatcher {
    output_dir: PathBuf,
    pattern: Regex,
}

impl WarningDispatcher {
    /// Create a dispatcher writing under the given output directory.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Pattern`] if the timestamp pattern fails
    /// to compile.
    pub fn new(output_dir: &Path) -> Result<Self, DispatchError> {
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            pattern: Regex::new(TIMESTAMP_PATTERN)?,
        })
    }

    /// Rewrite every embedded archive timestamp to its mapped current
    /// time. Matches that fail to parse or map are left untouched; a
    /// malformed fragment must not block the release of the warning.
    fn rewrite_timestamps(&self, text: &str, ctx: &TimingContext) -> String {
        self.pattern
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let original = caps.get(0).map_or("", |m| m.as_str());
                parse_std(original)
                    .and_then(|t| ctx.current_from_archive(t))
                    .map_or_else(|_| original.to_owned(), format_std)
            })
            .into_owned()
    }

    /// Bucket file path for a current-time instant.
    fn bucket_path(&self, current: DateTime<Utc>) -> PathBuf {
        self.output_dir
            .join(current.format("warnings_%Y%m%d_%H.txt").to_string())
    }
}

impl Dispatcher<WarningEvent> for WarningDispatcher {
    async fn deliver(
        &self,
        event: &WarningEvent,
        ctx: &TimingContext,
    ) -> Result<(), DispatchError> {
        let current = ctx.current_from_archive(event.archive_valid_time)?;
        let rewritten = self.rewrite_timestamps(&event.raw_text, ctx);
        let path = self.bucket_path(current);

        tokio::fs::create_dir_all(&self.output_dir).await?;

        // Redelivery check: an identical block already in the bucket
        // means a prior release succeeded but the delivered-flip did not.
        match tokio::fs::read_to_string(&path).await {
            Ok(existing) if existing.contains(&rewritten) => {
                tracing::info!(
                    event_id = %event.id,
                    path = %path.display(),
                    "Warning already released, skipping append"
                );
                return Ok(());
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let block = format!("{rewritten}\n\n");
        file.write_all(block.as_bytes()).await?;
        file.flush().await?;

        tracing::info!(
            event_id = %event.id,
            path = %path.display(),
            "Warning released"
        );
        Ok(())
    }
}
