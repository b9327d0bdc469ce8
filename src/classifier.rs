//! Classifier (C6): a pure function from a joined prior/current
//! observation to the action an entry should take.
//!
//! Grounded structurally on `services/webdav/smart_sync.rs`'s
//! `SmartSyncDecision`/`SmartSyncStrategy` enum shape (decision derived
//! from joined state, no I/O) and on the `determine_action`/`SyncAction`
//! dispatch pattern used across the reference pack's WebDAV sync tools.
//! Table-driven and entirely free of I/O so it can be unit-tested without a
//! database or network.

use crate::state::Entry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Conflict,
    Download,
    Upload,
    DeleteRemote,
    DeleteLocal,
    NoOp,
}

/// Classifies one entry, evaluated in priority order so every entry gets
/// exactly one action. Used for reporting and for the tests below; the
/// executor (C7) drives its five phases from the standalone `is_*`
/// predicates, not this cascade, because a conflicted entry legitimately
/// needs two actions in one pass (the rename, then a download or upload of
/// the now-authoritative side), see `is_conflict`'s doc comment.
pub fn classify(entry: &Entry) -> Action {
    if is_conflict(entry) {
        return Action::Conflict;
    }
    if is_download(entry) {
        return Action::Download;
    }
    if is_upload(entry) {
        return Action::Upload;
    }
    if is_delete_remote(entry) {
        return Action::DeleteRemote;
    }
    if is_delete_local(entry) {
        return Action::DeleteLocal;
    }
    Action::NoOp
}

/// True when both sides changed since the last synced pass. The conflict
/// phase handles this by renaming the local file; it does not mutate the
/// entry's mtimes, so the *same* entry independently satisfies
/// `is_download` or `is_upload` (whichever side is newer) once the
/// download/upload phase runs; that phase selects by its own predicate,
/// not by re-checking this one.
pub fn is_conflict(e: &Entry) -> bool {
    let (Some(rp), Some(lp)) = (e.remote_mtime_prev, e.local_mtime_prev) else {
        return false;
    };
    e.exists_remote
        && e.exists_local
        && e.remote_mtime.map_or(false, |r| r != rp)
        && e.local_mtime.map_or(false, |l| l != lp)
        && rp != 0
        && lp != 0
}

pub fn is_download(e: &Entry) -> bool {
    let first_time = !e.exists_local && !e.synced;
    let updated = e.synced
        && matches!((e.remote_mtime, e.local_mtime), (Some(r), Some(l)) if r > l);
    first_time || updated
}

pub fn is_upload(e: &Entry) -> bool {
    let first_time = !e.exists_remote && !e.synced;
    let updated = e.synced
        && matches!((e.remote_mtime, e.local_mtime), (Some(r), Some(l)) if r < l);
    first_time || updated
}

pub fn is_delete_remote(e: &Entry) -> bool {
    e.exists_remote && !e.exists_local && e.synced
}

pub fn is_delete_local(e: &Entry) -> bool {
    !e.exists_remote && e.synced
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(path: &str) -> Entry {
        Entry {
            pair_id: 1,
            path: path.to_string(),
            remote_mtime: None,
            remote_mtime_prev: None,
            exists_remote: false,
            local_mtime: None,
            local_mtime_prev: None,
            exists_local: false,
            synced: false,
            captured_at: 0,
        }
    }

    #[test]
    fn fresh_remote_only_file_downloads() {
        let mut e = base("a.txt");
        e.exists_remote = true;
        e.remote_mtime = Some(1_700_000_000_000);
        assert_eq!(classify(&e), Action::Download);
    }

    #[test]
    fn fresh_local_only_file_uploads() {
        let mut e = base("b.txt");
        e.exists_local = true;
        e.local_mtime = Some(1_700_000_100_000);
        assert_eq!(classify(&e), Action::Upload);
    }

    #[test]
    fn both_sides_changed_since_last_sync_is_conflict() {
        let mut e = base("c.txt");
        e.exists_remote = true;
        e.exists_local = true;
        e.synced = true;
        e.remote_mtime_prev = Some(1_700_000_000_000);
        e.local_mtime_prev = Some(1_700_000_000_000);
        e.remote_mtime = Some(1_700_000_300_000);
        e.local_mtime = Some(1_700_000_200_000);
        assert_eq!(classify(&e), Action::Conflict);
    }

    #[test]
    fn remote_deletion_propagates_to_delete_local() {
        let mut e = base("d.txt");
        e.exists_local = true;
        e.synced = true;
        e.local_mtime = Some(1_700_000_000_000);
        e.remote_mtime_prev = Some(1_700_000_000_000);
        assert_eq!(classify(&e), Action::DeleteLocal);
    }

    #[test]
    fn local_deletion_propagates_to_delete_remote() {
        let mut e = base("e.txt");
        e.exists_remote = true;
        e.synced = true;
        e.remote_mtime = Some(1_700_000_000_000);
        assert_eq!(classify(&e), Action::DeleteRemote);
    }

    #[test]
    fn equal_mtimes_on_both_sides_is_noop() {
        let mut e = base("f.txt");
        e.exists_remote = true;
        e.exists_local = true;
        e.synced = true;
        e.remote_mtime = Some(1_700_000_000_000);
        e.local_mtime = Some(1_700_000_000_000);
        assert_eq!(classify(&e), Action::NoOp);
    }

    #[test]
    fn unsynced_local_only_uploads_synced_local_only_deletes() {
        let mut e = base("g.txt");
        e.exists_local = true;
        e.local_mtime = Some(1_700_000_000_000);
        e.synced = false;
        assert_eq!(classify(&e), Action::Upload);

        e.synced = true;
        assert_eq!(classify(&e), Action::DeleteLocal);
    }

    #[test]
    fn conflict_requires_nonzero_prev_mtimes() {
        let mut e = base("h.txt");
        e.exists_remote = true;
        e.exists_local = true;
        e.remote_mtime_prev = Some(0);
        e.local_mtime_prev = Some(0);
        e.remote_mtime = Some(100);
        e.local_mtime = Some(200);
        assert_ne!(classify(&e), Action::Conflict);
    }

    #[test]
    fn conflict_takes_priority_over_download_and_upload() {
        let mut e = base("i.txt");
        e.exists_remote = true;
        e.exists_local = true;
        e.synced = true;
        e.remote_mtime_prev = Some(1);
        e.local_mtime_prev = Some(1);
        e.remote_mtime = Some(2);
        e.local_mtime = Some(3);
        assert_eq!(classify(&e), Action::Conflict);
    }
}
