//! Radar scan deployment: fetch, munge, deploy, manifest.
//!
//! Releasing a radar scan means resolving its source locator to staged
//! bytes, munging the file so its embedded timestamp reads as the mapped
//! current time, moving the result into the per-site deployment tree, and
//! regenerating that site's `dir.list` manifest. Deployment is a copy
//! followed by a staging-file remove; re-deploying the same scan
//! overwrites the same target path, so redelivery is idempotent.

use std::path::{Path, PathBuf};

use squall_core::TimingContext;
use squall_types::RadarScanEvent;

use crate::Dispatcher;
use crate::error::DispatchError;
use crate::manifest;
use crate::munge::Munger;

/// Resolves a stored source locator to a readable local file.
#[allow(async_fn_in_trait)]
pub trait ScanFetcher {
    /// Resolve `locator` and return the path of the fetched scan file.
    async fn fetch(&self, locator: &str) -> Result<PathBuf, DispatchError>;
}

/// Fetcher for locators that are paths on the local filesystem.
///
/// Relative locators are resolved against the configured archive root.
pub struct LocalScanFetcher {
    root: PathBuf,
}

impl LocalScanFetcher {
    /// Create a fetcher resolving relative locators under `root`.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl ScanFetcher for LocalScanFetcher {
    async fn fetch(&self, locator: &str) -> Result<PathBuf, DispatchError> {
        let path = {
            let candidate = Path::new(locator);
            if candidate.is_absolute() {
                candidate.to_path_buf()
            } else {
                self.root.join(candidate)
            }
        };
        if !tokio::fs::try_exists(&path).await? {
            return Err(DispatchError::Fetch {
                locator: locator.to_owned(),
                message: format!("no file at {}", path.display()),
            });
        }
        Ok(path)
    }
}

/// Releases radar scans into the per-site deployment tree.
pub struct RadarDispatcher<F, M> {
    deploy_root: PathBuf,
    fetcher: F,
    munger: M,
}

impl<F: ScanFetcher, M: Munger> RadarDispatcher<F, M> {
    /// Create a dispatcher deploying under `deploy_root`.
    pub fn new(deploy_root: &Path, fetcher: F, munger: M) -> Self {
        Self {
            deploy_root: deploy_root.to_path_buf(),
            fetcher,
            munger,
        }
    }
}

impl<F: ScanFetcher, M: Munger> Dispatcher<RadarScanEvent> for RadarDispatcher<F, M> {
    async fn deliver(
        &self,
        event: &RadarScanEvent,
        ctx: &TimingContext,
    ) -> Result<(), DispatchError> {
        let current = ctx.current_from_archive(event.archive_time)?;
        let fetched = self.fetcher.fetch(&event.source_locator).await?;
        let munged = self
            .munger
            .munge(&event.site_id, current, ctx.speed, &fetched)
            .await?;

        let site_dir = self.deploy_root.join(event.site_id.as_str());
        tokio::fs::create_dir_all(&site_dir).await?;

        // Copy then remove rather than rename; staging and deployment may
        // live on different filesystems.
        let file_name = munged.file_name().map_or_else(
            || {
                Err(DispatchError::Munge {
                    message: format!("munged path {} has no filename", munged.display()),
                })
            },
            |n| Ok(n.to_owned()),
        )?;
        let target = site_dir.join(file_name);
        tokio::fs::copy(&munged, &target).await?;
        tokio::fs::remove_file(&munged).await?;

        manifest::regenerate(&site_dir).await?;

        tracing::info!(
            event_id = %event.id,
            site = %event.site_id,
            target = %target.display(),
            "Radar scan deployed"
        );
        Ok(())
    }
}
