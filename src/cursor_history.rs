//! Persistent cursor-position memory, keyed by pane side and directory.

use crate::path::TfmPath;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaneSide {
    Left,
    Right,
}

/// `pane_side → {directory_path → filename}`. Non-existing local
/// directories are purged at startup (a cheap local `exists()` check);
/// remote entries are kept, since checking each would mean one network
/// round trip per history entry at startup.
pub struct CursorHistory {
    entries: RwLock<HashMap<(PaneSide, String), String>>,
}

impl CursorHistory {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    pub fn record(&self, side: PaneSide, directory: &TfmPath, filename: &str) {
        let mut entries = self.entries.write().unwrap();
        entries.insert((side, directory.to_display_string()), filename.to_string());
    }

    pub fn lookup(&self, side: PaneSide, directory: &TfmPath) -> Option<String> {
        let entries = self.entries.read().unwrap();
        entries.get(&(side, directory.to_display_string())).cloned()
    }

    /// Drop entries whose directory is local and no longer exists.
    /// Remote entries survive unconditionally, per the persisted-state
    /// contract — an existence check would add a network round trip per
    /// entry at startup for a memory that degrades gracefully anyway.
    ///
    /// The stored key is `TfmPath::to_display_string()`, which carries
    /// the scheme in its prefix (`ssh://`, `s3://`, or an archive's
    /// `container!inner` form) for every non-local path — a bare string
    /// never round-trips back through `TfmPath::local` to recover that,
    /// so the scheme is read off the key itself rather than manufactured
    /// from a freshly constructed local path (which would always report
    /// `Scheme::Local`).
    pub fn purge_missing_local(&self) {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|(_, directory), _| !is_local_key(directory) || TfmPath::local(directory).exists());
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }
}

impl Default for CursorHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a `to_display_string()` key denotes a local path. SSH and S3
/// keys carry an explicit scheme prefix; archive keys embed `!` between
/// the container path and the internal path, which never appears in a
/// bare local path.
fn is_local_key(key: &str) -> bool {
    !key.starts_with("ssh://") && !key.starts_with("s3://") && !key.contains('!')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn records_and_looks_up_by_side_and_directory() {
        let history = CursorHistory::new();
        let dir = TfmPath::local("/tmp/project");
        history.record(PaneSide::Left, &dir, "main.rs");
        assert_eq!(history.lookup(PaneSide::Left, &dir), Some("main.rs".to_string()));
        assert_eq!(history.lookup(PaneSide::Right, &dir), None);
    }

    #[test]
    fn purge_removes_missing_local_directories_only() {
        let history = CursorHistory::new();
        let existing = tempdir().unwrap();
        let existing_path = TfmPath::local(existing.path());
        let missing_path = TfmPath::local("/does/not/exist/anywhere");
        history.record(PaneSide::Left, &existing_path, "a.txt");
        history.record(PaneSide::Left, &missing_path, "b.txt");
        history.purge_missing_local();
        assert_eq!(history.len(), 1);
        assert!(history.lookup(PaneSide::Left, &existing_path).is_some());
    }

    #[test]
    fn purge_keeps_remote_entries_even_though_they_cannot_exist_locally() {
        let history = CursorHistory::new();
        let registry = std::sync::Arc::new(crate::path::registry::BackendRegistry::new());
        let ssh_path = TfmPath::ssh(registry.clone(), "build-host", "/srv/releases");
        let s3_path = TfmPath::s3(registry, "artifacts", "releases/");
        history.record(PaneSide::Left, &ssh_path, "v1.tar.gz");
        history.record(PaneSide::Right, &s3_path, "manifest.json");

        history.purge_missing_local();

        assert_eq!(history.len(), 2, "remote entries must survive purge without a network check");
        assert_eq!(history.lookup(PaneSide::Left, &ssh_path), Some("v1.tar.gz".to_string()));
        assert_eq!(history.lookup(PaneSide::Right, &s3_path), Some("manifest.json".to_string()));
    }
}
