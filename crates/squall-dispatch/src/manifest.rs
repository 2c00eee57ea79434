//! `dir.list` manifest regeneration for per-site deployment directories.
//!
//! Downstream displays poll a site directory's `dir.list` to discover new
//! scans; each line is `<size-in-bytes> <filename>`, sorted by filename.
//! Because scan filenames embed the munged timestamp, name order is
//! chronological order. The manifest is written to a temp file and
//! renamed into place so a poller never observes a half-written listing.

use std::path::Path;

use crate::error::DispatchError;

/// The manifest filename inside a site directory.
pub const MANIFEST_NAME: &str = "dir.list";

/// Regenerate the `dir.list` manifest for one site directory.
///
/// Lists every regular file except the manifest itself, sorted by
/// filename.
///
/// # Errors
///
/// Returns [`DispatchError::Io`] if the directory cannot be read or the
/// manifest cannot be written.
pub async fn regenerate(dir: &Path) -> Result<(), DispatchError> {
    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name == MANIFEST_NAME || name.starts_with('.') {
            continue;
        }
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        entries.push((name.to_owned(), meta.len()));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut listing = String::new();
    for (name, size) in &entries {
        listing.push_str(&format!("{size} {name}\n"));
    }

    let tmp = dir.join(format!(".{MANIFEST_NAME}.tmp"));
    tokio::fs::write(&tmp, listing.as_bytes()).await?;
    tokio::fs::rename(&tmp, dir.join(MANIFEST_NAME)).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_files_sorted_by_name_with_sizes() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("KTLX20200601_001000"), b"abcd")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("KTLX20200601_000500"), b"ab")
            .await
            .unwrap();

        regenerate(dir.path()).await.unwrap();

        let manifest = tokio::fs::read_to_string(dir.path().join(MANIFEST_NAME))
            .await
            .unwrap();
        assert_eq!(
            manifest,
            "2 KTLX20200601_000500\n4 KTLX20200601_001000\n"
        );
    }

    #[tokio::test]
    async fn excludes_itself_and_hidden_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("KFWS20200601_000500"), b"scan")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join(".partial"), b"x").await.unwrap();

        regenerate(dir.path()).await.unwrap();
        regenerate(dir.path()).await.unwrap();

        let manifest = tokio::fs::read_to_string(dir.path().join(MANIFEST_NAME))
            .await
            .unwrap();
        assert_eq!(manifest, "4 KFWS20200601_000500\n");
    }

    #[tokio::test]
    async fn empty_directory_produces_empty_manifest() {
        let dir = tempfile::tempdir().unwrap();
        regenerate(dir.path()).await.unwrap();
        let manifest = tokio::fs::read_to_string(dir.path().join(MANIFEST_NAME))
            .await
            .unwrap();
        assert!(manifest.is_empty());
    }
}
