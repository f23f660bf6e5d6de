//! Per-operation-kind counters accumulated for the process lifetime.
//!
//! Internal bookkeeping, not a metrics-export surface: nothing here
//! talks to an external collector. The Task Coordinator updates it
//! alongside [`crate::task::progress::ProgressManager`] on completion.

use crate::task::TaskKind;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
pub struct KindStats {
    pub bytes_transferred: u64,
    pub files_succeeded: u64,
    pub files_skipped: u64,
    pub files_errored: u64,
    pub total_duration: Duration,
}

pub struct OperationStats {
    by_kind: Mutex<HashMap<&'static str, KindStats>>,
}

fn kind_key(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::Copy => "copy",
        TaskKind::Move => "move",
        TaskKind::Delete => "delete",
        TaskKind::ArchiveCreate => "archive_create",
        TaskKind::ArchiveExtract => "archive_extract",
    }
}

impl OperationStats {
    pub fn new() -> Self {
        Self { by_kind: Mutex::new(HashMap::new()) }
    }

    pub fn record_completion(
        &self,
        kind: TaskKind,
        bytes_transferred: u64,
        succeeded: u64,
        skipped: u64,
        errored: u64,
        duration: Duration,
    ) {
        let mut by_kind = self.by_kind.lock().unwrap();
        let entry = by_kind.entry(kind_key(kind)).or_default();
        entry.bytes_transferred += bytes_transferred;
        entry.files_succeeded += succeeded;
        entry.files_skipped += skipped;
        entry.files_errored += errored;
        entry.total_duration += duration;
    }

    pub fn snapshot(&self, kind: TaskKind) -> KindStats {
        self.by_kind.lock().unwrap().get(kind_key(kind)).copied().unwrap_or_default()
    }
}

impl Default for OperationStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_across_multiple_completions() {
        let stats = OperationStats::new();
        stats.record_completion(TaskKind::Copy, 100, 2, 0, 0, Duration::from_millis(10));
        stats.record_completion(TaskKind::Copy, 50, 1, 1, 0, Duration::from_millis(5));
        let snapshot = stats.snapshot(TaskKind::Copy);
        assert_eq!(snapshot.bytes_transferred, 150);
        assert_eq!(snapshot.files_succeeded, 3);
        assert_eq!(snapshot.files_skipped, 1);
    }

    #[test]
    fn kinds_are_tracked_independently() {
        let stats = OperationStats::new();
        stats.record_completion(TaskKind::Copy, 100, 1, 0, 0, Duration::from_millis(1));
        assert_eq!(stats.snapshot(TaskKind::Delete).files_succeeded, 0);
    }
}
