//! Orchestrator (C8): the top-level sync pass, one identity check, then
//! for every configured pair, in order: begin,
//! snapshot both sides, resolve conflicts, download, upload, delete
//! remotely, delete locally, finish.
//!
//! Grounded on `source_scheduler.rs`'s per-source sequential pass loop,
//! adapted so each pair runs its phases strictly in order while the
//! actions within a phase run concurrently through the executor (C7).

use chrono::Utc;

use crate::error::{Result, SyncError};
use crate::executor::{
    run_conflict_phase, run_delete_local_phase, run_delete_remote_phase, run_download_phase,
    run_upload_phase, PhaseContext, PhaseOutcome,
};
use crate::registry::Registry;
use crate::snapshot::{local, remote};
use crate::state::StateStore;
use crate::webdav::DavClient;

/// Aggregate result of one call to [`sync`], folding every pair's phase
/// outcomes together for the caller (CLI or embedding shell) to report.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncSummary {
    pub pairs_synced: usize,
    pub downloaded: usize,
    pub uploaded: usize,
    pub deleted_remote: usize,
    pub deleted_local: usize,
    pub conflicts: usize,
    pub failed_actions: usize,
}

impl SyncSummary {
    fn absorb(&mut self, phase: PhaseKind, outcome: PhaseOutcome) {
        match phase {
            PhaseKind::Conflict => self.conflicts += outcome.succeeded,
            PhaseKind::Download => self.downloaded += outcome.succeeded,
            PhaseKind::Upload => self.uploaded += outcome.succeeded,
            PhaseKind::DeleteRemote => self.deleted_remote += outcome.succeeded,
            PhaseKind::DeleteLocal => self.deleted_local += outcome.succeeded,
        }
        self.failed_actions += outcome.failed;
    }
}

#[derive(Clone, Copy)]
enum PhaseKind {
    Conflict,
    Download,
    Upload,
    DeleteRemote,
    DeleteLocal,
}

/// Runs one full sync pass over every registered pair.
///
/// Performs the server-identity check once, up front, before touching any
/// pair's state: a misidentified server aborts the whole pass rather
/// than corrupting one pair's snapshot.
pub async fn sync(
    client: &DavClient,
    store: &StateStore,
    registry: &Registry,
    base_url: &str,
    username: &str,
    concurrency: usize,
) -> Result<SyncSummary> {
    client.check_is_nextcloud(base_url).await?;

    let pairs = registry.list().await?;
    if pairs.is_empty() {
        return Err(SyncError::NoPairs);
    }

    let mut summary = SyncSummary::default();

    for pair in &pairs {
        let captured_at = Utc::now().timestamp_millis();

        store.begin_pass(pair.id, captured_at).await?;
        remote::observe(store, client, base_url, username, pair, captured_at).await?;
        local::observe(store, pair, captured_at).await?;

        let ctx = PhaseContext {
            client,
            store,
            pair,
            base_url,
            username,
            captured_at,
            concurrency,
        };

        let entries = store.list_entries(pair.id).await?;
        let conflict_outcome = run_conflict_phase(&ctx, &entries).await;
        summary.absorb(PhaseKind::Conflict, conflict_outcome);

        // Re-fetch: the conflict phase registered fresh rows for the
        // renamed copies, which the download/upload phases below must see.
        let entries = store.list_entries(pair.id).await?;

        let download_outcome = run_download_phase(&ctx, &entries).await;
        summary.absorb(PhaseKind::Download, download_outcome);

        let upload_outcome = run_upload_phase(&ctx, &entries).await;
        summary.absorb(PhaseKind::Upload, upload_outcome);

        let delete_remote_outcome = run_delete_remote_phase(&ctx, &entries).await;
        summary.absorb(PhaseKind::DeleteRemote, delete_remote_outcome);

        let delete_local_outcome = run_delete_local_phase(&ctx, &entries).await;
        summary.absorb(PhaseKind::DeleteLocal, delete_local_outcome);

        store.finish_pass(pair.id).await?;
        summary.pairs_synced += 1;
    }

    Ok(summary)
}
