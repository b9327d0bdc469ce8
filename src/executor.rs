//! Executor (C7): runs one phase's action list against the WebDAV client,
//! the local filesystem, and the state store, with bounded concurrency.
//!
//! Grounded on `services/webdav/service.rs`'s semaphore-gated download/scan
//! pattern (`scan_semaphore`/`download_semaphore`, each action acquiring a
//! permit before doing I/O), generalized here to one semaphore shared
//! across a phase's actions rather than one per operation kind, since the
//! concurrency budget caps the pass as a whole, not each action type
//! independently. A single action's failure is logged and does not abort
//! the rest of the phase: the unresolved entry simply reappears in the
//! action list on the next pass.

use std::sync::Arc;

use chrono::Local;
use futures_util::{StreamExt, TryStreamExt};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;

use crate::classifier::{is_conflict, is_delete_local, is_delete_remote, is_download, is_upload};
use crate::path::{local_of, relative_to_url};
use crate::registry::Pair;
use crate::state::{Entry, StateStore};
use crate::webdav::DavClient;

/// Everything one phase's actions need: the pair being synced, where to
/// reach it, and the shared client/store handles.
pub struct PhaseContext<'a> {
    pub client: &'a DavClient,
    pub store: &'a StateStore,
    pub pair: &'a Pair,
    pub base_url: &'a str,
    pub username: &'a str,
    pub captured_at: i64,
    pub concurrency: usize,
}

/// Tally of per-action outcomes for one phase, folded into the pass's
/// [`crate::orchestrator::SyncSummary`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PhaseOutcome {
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Clone, Copy)]
enum ActionKind {
    Conflict,
    Download,
    Upload,
    DeleteRemote,
    DeleteLocal,
}

/// Runs the conflict phase: renames each conflicted entry's local file out
/// of the way and registers the rename as a fresh local observation. Does
/// not touch the original path's row, so the download or upload phase
/// picks it up next via its own predicate.
pub async fn run_conflict_phase(ctx: &PhaseContext<'_>, entries: &[Entry]) -> PhaseOutcome {
    let targets: Vec<&Entry> = entries.iter().filter(|e| is_conflict(e)).collect();
    run_bounded(ctx, &targets, ActionKind::Conflict).await
}

pub async fn run_download_phase(ctx: &PhaseContext<'_>, entries: &[Entry]) -> PhaseOutcome {
    let targets: Vec<&Entry> = entries.iter().filter(|e| is_download(e)).collect();
    run_bounded(ctx, &targets, ActionKind::Download).await
}

pub async fn run_upload_phase(ctx: &PhaseContext<'_>, entries: &[Entry]) -> PhaseOutcome {
    let targets: Vec<&Entry> = entries.iter().filter(|e| is_upload(e)).collect();
    run_bounded(ctx, &targets, ActionKind::Upload).await
}

pub async fn run_delete_remote_phase(ctx: &PhaseContext<'_>, entries: &[Entry]) -> PhaseOutcome {
    let targets: Vec<&Entry> = entries.iter().filter(|e| is_delete_remote(e)).collect();
    run_bounded(ctx, &targets, ActionKind::DeleteRemote).await
}

pub async fn run_delete_local_phase(ctx: &PhaseContext<'_>, entries: &[Entry]) -> PhaseOutcome {
    let targets: Vec<&Entry> = entries.iter().filter(|e| is_delete_local(e)).collect();
    run_bounded(ctx, &targets, ActionKind::DeleteLocal).await
}

async fn dispatch(ctx: &PhaseContext<'_>, entry: &Entry, kind: ActionKind) -> crate::error::Result<()> {
    match kind {
        ActionKind::Conflict => handle_conflict(ctx, entry).await,
        ActionKind::Download => handle_download(ctx, entry).await,
        ActionKind::Upload => handle_upload(ctx, entry).await,
        ActionKind::DeleteRemote => handle_delete_remote(ctx, entry).await,
        ActionKind::DeleteLocal => handle_delete_local(ctx, entry).await,
    }
}

async fn run_bounded<'a>(ctx: &'a PhaseContext<'a>, targets: &[&'a Entry], kind: ActionKind) -> PhaseOutcome {
    let semaphore = Arc::new(Semaphore::new(ctx.concurrency.max(1)));

    let results = futures_util::stream::iter(targets.iter().copied())
        .map(|entry| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                dispatch(ctx, entry, kind).await
            }
        })
        .buffer_unordered(ctx.concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    let mut outcome = PhaseOutcome::default();
    for result in results {
        match result {
            Ok(()) => outcome.succeeded += 1,
            Err(err) => {
                tracing::warn!(error = %err, "action failed, will be retried next pass");
                outcome.failed += 1;
            }
        }
    }
    outcome
}

async fn handle_download(ctx: &PhaseContext<'_>, entry: &Entry) -> crate::error::Result<()> {
    let url = relative_to_url(ctx.base_url, ctx.username, &ctx.pair.remote_root, &entry.path);
    let local_path = local_of(&ctx.pair.local_root, &entry.path);

    if let Some(parent) = local_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| crate::error::SyncError::FilesystemIo {
                path: parent.display().to_string(),
                source: e,
            })?;
    }

    let tmp_path = local_path.with_extension(tmp_extension(&local_path));

    let mut stream = ctx.client.get(&url).await?;
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .map_err(|e| crate::error::SyncError::FilesystemIo {
            path: tmp_path.display().to_string(),
            source: e,
        })?;

    let write_result: crate::error::Result<()> = async {
        while let Some(chunk) = stream.try_next().await.map_err(|e| crate::error::SyncError::NetworkIo {
            url: url.clone(),
            source: e,
        })? {
            file.write_all(&chunk)
                .await
                .map_err(|e| crate::error::SyncError::FilesystemIo {
                    path: tmp_path.display().to_string(),
                    source: e,
                })?;
        }
        file.flush().await.map_err(|e| crate::error::SyncError::FilesystemIo {
            path: tmp_path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }
    .await;

    if let Err(err) = write_result {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(err);
    }

    let mtime = entry
        .remote_mtime
        .ok_or_else(|| crate::error::SyncError::DavXmlMalformed {
            reason: format!("download selected {} with no remote_mtime", entry.path),
        })?;
    set_file_mtime(&tmp_path, mtime)?;

    tokio::fs::rename(&tmp_path, &local_path)
        .await
        .map_err(|e| crate::error::SyncError::FilesystemIo {
            path: local_path.display().to_string(),
            source: e,
        })?;

    ctx.store.mark_downloaded(ctx.pair.id, &entry.path, mtime).await?;
    Ok(())
}

/// Appends a `.part` marker to the file's existing extension (if any),
/// keeping the download's scratch file a sibling of its final path.
fn tmp_extension(local_path: &std::path::Path) -> std::ffi::OsString {
    let mut ext = local_path
        .extension()
        .map(|e| e.to_os_string())
        .unwrap_or_default();
    if !ext.is_empty() {
        ext.push(".");
    }
    ext.push("part");
    ext
}

async fn handle_upload(ctx: &PhaseContext<'_>, entry: &Entry) -> crate::error::Result<()> {
    let url = relative_to_url(ctx.base_url, ctx.username, &ctx.pair.remote_root, &entry.path);
    let local_path = local_of(&ctx.pair.local_root, &entry.path);

    let bytes = tokio::fs::read(&local_path)
        .await
        .map_err(|e| crate::error::SyncError::FilesystemIo {
            path: local_path.display().to_string(),
            source: e,
        })?;

    let mtime = entry
        .local_mtime
        .ok_or_else(|| crate::error::SyncError::DavXmlMalformed {
            reason: format!("upload selected {} with no local_mtime", entry.path),
        })?;

    ctx.client.put(&url, bytes, mtime / 1000).await?;
    ctx.store.mark_uploaded(ctx.pair.id, &entry.path, mtime).await?;
    Ok(())
}

async fn handle_delete_remote(ctx: &PhaseContext<'_>, entry: &Entry) -> crate::error::Result<()> {
    let url = relative_to_url(ctx.base_url, ctx.username, &ctx.pair.remote_root, &entry.path);
    ctx.client.delete(&url).await?;
    ctx.store.drop_entry(ctx.pair.id, &entry.path).await?;
    Ok(())
}

async fn handle_delete_local(ctx: &PhaseContext<'_>, entry: &Entry) -> crate::error::Result<()> {
    let local_path = local_of(&ctx.pair.local_root, &entry.path);
    match tokio::fs::remove_file(&local_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(crate::error::SyncError::FilesystemIo {
                path: local_path.display().to_string(),
                source: e,
            })
        }
    }
    ctx.store.drop_entry(ctx.pair.id, &entry.path).await?;
    Ok(())
}

/// Renames the local file to `<stem>_conflict_<YYYYMMDD_HHMMSS><ext>`,
/// never overwriting an existing file, and registers the new name as a
/// fresh local observation.
async fn handle_conflict(ctx: &PhaseContext<'_>, entry: &Entry) -> crate::error::Result<()> {
    let original = local_of(&ctx.pair.local_root, &entry.path);
    let conflict_path = conflict_rename_path(&entry.path, Local::now().format("%Y%m%d_%H%M%S").to_string());
    let conflict_local = local_of(&ctx.pair.local_root, &conflict_path);

    if tokio::fs::metadata(&conflict_local).await.is_ok() {
        return Err(crate::error::SyncError::FilesystemIo {
            path: conflict_local.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AlreadyExists, "conflict copy already exists"),
        });
    }

    tokio::fs::copy(&original, &conflict_local)
        .await
        .map_err(|e| crate::error::SyncError::FilesystemIo {
            path: conflict_local.display().to_string(),
            source: e,
        })?;

    let mtime = entry
        .local_mtime
        .ok_or_else(|| crate::error::SyncError::DavXmlMalformed {
            reason: format!("conflict selected {} with no local_mtime", entry.path),
        })?;

    ctx.store
        .register_conflict_copy(ctx.pair.id, &conflict_path, mtime, ctx.captured_at)
        .await?;
    Ok(())
}

/// Builds the conflict-copy relative path from an original relative path
/// and a pre-formatted timestamp, inserting the marker before the
/// extension: `Docs/a.txt` -> `Docs/a_conflict_20231114_221320.txt`.
fn conflict_rename_path(relative: &str, timestamp: String) -> String {
    let (dir, file) = match relative.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, relative),
    };

    let (stem, ext) = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file, None),
    };

    let new_name = match ext {
        Some(ext) => format!("{stem}_conflict_{timestamp}.{ext}"),
        None => format!("{stem}_conflict_{timestamp}"),
    };

    match dir {
        Some(dir) => format!("{dir}/{new_name}"),
        None => new_name,
    }
}

fn set_file_mtime(path: &std::path::Path, mtime_ms: i64) -> crate::error::Result<()> {
    let seconds = mtime_ms / 1000;
    let time = filetime::FileTime::from_unix_time(seconds, 0);
    filetime::set_file_mtime(path, time).map_err(|e| crate::error::SyncError::FilesystemIo {
        path: path.display().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_rename_inserts_marker_before_extension() {
        let renamed = conflict_rename_path("Docs/a.txt", "20231114_221320".to_string());
        assert_eq!(renamed, "Docs/a_conflict_20231114_221320.txt");
    }

    #[test]
    fn conflict_rename_handles_no_extension() {
        let renamed = conflict_rename_path("README", "20231114_221320".to_string());
        assert_eq!(renamed, "README_conflict_20231114_221320");
    }

    #[test]
    fn conflict_rename_handles_top_level_file() {
        let renamed = conflict_rename_path("a.txt", "20231114_221320".to_string());
        assert_eq!(renamed, "a_conflict_20231114_221320.txt");
    }

    #[test]
    fn tmp_extension_appends_part_after_existing_extension() {
        let ext = tmp_extension(std::path::Path::new("/tmp/p1/Docs/a.txt"));
        assert_eq!(ext, "txt.part");
    }

    #[test]
    fn tmp_extension_handles_no_existing_extension() {
        let ext = tmp_extension(std::path::Path::new("/tmp/p1/README"));
        assert_eq!(ext, "part");
    }
}
