//! Local snapshot collector (C5): recursively walks a pair's local root,
//! truncates mtimes to whole seconds, and records each surviving file
//! against the state store.
//!
//! Grounded on `services/local_folder_service.rs`'s `WalkDir`-based,
//! `spawn_blocking`-wrapped discovery.

use std::path::Path;

use walkdir::WalkDir;

use crate::error::{Result, SyncError};
use crate::registry::Pair;
use crate::state::StateStore;

/// One file observed on the local side, relative to the pair's local root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub relative_path: String,
    pub mtime_ms: i64,
}

/// Walks `pair.local_root`, applying the extension filter, and returns the
/// surviving files with mtimes truncated to whole seconds.
///
/// A file whose name matches the state store's own filename is excluded
/// so the engine never tries to sync its own database file.
pub async fn walk(pair: &Pair) -> Result<Vec<LocalFile>> {
    let root = pair.local_root.clone();
    let extensions = pair.allowed_extensions.clone();

    tokio::task::spawn_blocking(move || walk_blocking(&root, &extensions))
        .await
        .map_err(|e| SyncError::FilesystemIo {
            path: "local snapshot task".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?
}

fn walk_blocking(root: &str, extensions: &[String]) -> Result<Vec<LocalFile>> {
    let root_path = Path::new(root);
    let mut files = Vec::new();

    for entry in WalkDir::new(root_path).follow_links(true) {
        let entry = entry.map_err(|e| SyncError::FilesystemIo {
            path: root.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?;

        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if is_state_store_file(file_name) {
            continue;
        }
        if is_partial_download(file_name) {
            continue;
        }
        if !extension_allowed(file_name, extensions) {
            continue;
        }

        let relative_path = match path.strip_prefix(root_path) {
            Ok(rel) => rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"),
            Err(_) => continue,
        };

        let metadata = entry.metadata().map_err(|e| SyncError::FilesystemIo {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?;
        let modified = metadata.modified().map_err(|e| SyncError::FilesystemIo {
            path: path.display().to_string(),
            source: e,
        })?;
        let duration = modified
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        // Truncate to whole seconds before storage and comparison.
        let mtime_ms = (duration.as_secs() as i64) * 1000;

        files.push(LocalFile {
            relative_path,
            mtime_ms,
        });
    }

    Ok(files)
}

fn is_state_store_file(file_name: &str) -> bool {
    file_name == "nextcloud-dav-sync.db"
}

/// A download's scratch file (`<name>.part`), left behind if a prior pass
/// crashed mid-transfer. Never treated as a real local file.
fn is_partial_download(file_name: &str) -> bool {
    file_name.ends_with(".part")
}

fn extension_allowed(file_name: &str, extensions: &[String]) -> bool {
    if extensions.iter().any(|e| e == ".*") {
        return true;
    }
    let lower = file_name.to_ascii_lowercase();
    extensions.iter().any(|ext| lower.ends_with(ext.as_str()))
}

/// Records every surviving file against the state store.
pub async fn observe(store: &StateStore, pair: &Pair, captured_at: i64) -> Result<()> {
    for file in walk(pair).await? {
        store
            .observe_local(pair.id, &file.relative_path, file.mtime_ms, captured_at)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_store_file_is_excluded() {
        assert!(is_state_store_file("nextcloud-dav-sync.db"));
        assert!(!is_state_store_file("notes.txt"));
    }

    #[test]
    fn partial_download_file_is_excluded() {
        assert!(is_partial_download("a.txt.part"));
        assert!(is_partial_download("README.part"));
        assert!(!is_partial_download("notes.txt"));
    }

    #[test]
    fn wildcard_allows_any_extension() {
        assert!(extension_allowed("a.xyz", &[".*".to_string()]));
    }

    #[test]
    fn allowlist_filters_case_insensitively() {
        let exts = vec![".jpg".to_string()];
        assert!(extension_allowed("PHOTO.JPG", &exts));
        assert!(!extension_allowed("notes.txt", &exts));
    }

    #[tokio::test]
    async fn walk_finds_files_and_truncates_mtime_to_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.txt");
        std::fs::write(&file_path, b"hello").unwrap();

        let pair = Pair {
            id: 1,
            remote_root: "Docs".into(),
            local_root: dir.path().to_string_lossy().to_string(),
            allowed_extensions: vec![".*".to_string()],
        };

        let files = walk(&pair).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, "a.txt");
        assert_eq!(files[0].mtime_ms % 1000, 0);
    }

    #[tokio::test]
    async fn walk_excludes_unmatched_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();

        let pair = Pair {
            id: 1,
            remote_root: "Docs".into(),
            local_root: dir.path().to_string_lossy().to_string(),
            allowed_extensions: vec![".jpg".to_string()],
        };

        let files = walk(&pair).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, "a.jpg");
    }
}
