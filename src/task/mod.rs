//! Task record and state machine for copy/move/delete/archive operations.

pub mod coordinator;
pub mod executor;
pub mod progress;

use crate::path::TfmPath;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Copy,
    Move,
    Delete,
    ArchiveCreate,
    ArchiveExtract,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Confirming,
    CheckingConflicts,
    ResolvingConflict { index: usize },
    Executing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    OverwriteThis,
    OverwriteAll,
    SkipThis,
    SkipAll,
    CancelTask,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskResults {
    pub success: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl TaskResults {
    pub fn total(&self) -> u64 {
        self.success + self.skipped + self.errors
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TaskOptions {
    pub overwrite: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self { overwrite: false }
    }
}

/// A shared, single-writer-many-reader cancellation flag. The task
/// coordinator sets it from the main thread on ESC; the executor thread
/// and recursive counters poll it between items/chunks.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Task {
    pub kind: TaskKind,
    pub state: TaskState,
    pub source_paths: Vec<TfmPath>,
    pub destination: Option<TfmPath>,
    pub options: TaskOptions,
    pub conflicts: Vec<TfmPath>,
    pub current_conflict_index: usize,
    pub total_items: u64,
    pub results: TaskResults,
    pub cancel_flag: CancelFlag,
}

impl Task {
    pub fn new(kind: TaskKind, source_paths: Vec<TfmPath>, destination: Option<TfmPath>, options: TaskOptions) -> Self {
        Self {
            kind,
            state: TaskState::Confirming,
            source_paths,
            destination,
            options,
            conflicts: Vec::new(),
            current_conflict_index: 0,
            total_items: 0,
            results: TaskResults::default(),
            cancel_flag: CancelFlag::new(),
        }
    }

    /// `skip_confirmation`: per-kind toggle from `TfmConfig`; when set,
    /// the task enters directly at `CheckingConflicts`.
    pub fn new_with_confirmation(
        kind: TaskKind,
        source_paths: Vec<TfmPath>,
        destination: Option<TfmPath>,
        options: TaskOptions,
        skip_confirmation: bool,
    ) -> Self {
        let mut task = Self::new(kind, source_paths, destination, options);
        if skip_confirmation {
            task.state = TaskState::CheckingConflicts;
        }
        task
    }

    pub fn confirm(&mut self) {
        if self.state == TaskState::Confirming {
            self.state = TaskState::CheckingConflicts;
        }
    }

    pub fn decline(&mut self) {
        if self.state == TaskState::Confirming {
            self.state = TaskState::Idle;
        }
    }

    pub fn begin_conflict_resolution(&mut self, conflicts: Vec<TfmPath>) {
        self.conflicts = conflicts;
        self.current_conflict_index = 0;
        self.state = if self.conflicts.is_empty() { TaskState::Executing } else { TaskState::ResolvingConflict { index: 0 } };
    }

    /// Applies one conflict-resolution decision, advancing to the next
    /// conflict or to `Executing` when the queue is drained.
    pub fn resolve_conflict(&mut self, resolution: ConflictResolution) {
        match resolution {
            ConflictResolution::CancelTask => {
                self.state = TaskState::Idle;
                return;
            }
            ConflictResolution::SkipThis => {
                self.results.skipped += 1;
            }
            ConflictResolution::SkipAll => {
                self.results.skipped += (self.conflicts.len() - self.current_conflict_index) as u64;
                self.current_conflict_index = self.conflicts.len();
            }
            ConflictResolution::OverwriteThis | ConflictResolution::OverwriteAll => {}
        }

        if matches!(resolution, ConflictResolution::OverwriteAll) {
            self.current_conflict_index = self.conflicts.len();
        } else if self.current_conflict_index < self.conflicts.len() {
            self.current_conflict_index += 1;
        }

        self.state = if self.current_conflict_index >= self.conflicts.len() {
            TaskState::Executing
        } else {
            TaskState::ResolvingConflict { index: self.current_conflict_index }
        };
    }

    pub fn cancel(&mut self) {
        self.cancel_flag.set();
    }

    pub fn finish(&mut self) {
        self.state = TaskState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_then_cancel_leaves_results_consistent() {
        let mut task = Task::new(TaskKind::Copy, vec![], None, TaskOptions::default());
        task.confirm();
        task.begin_conflict_resolution(vec![TfmPath::local("/a"), TfmPath::local("/b")]);
        task.resolve_conflict(ConflictResolution::SkipThis);
        assert_eq!(task.results.skipped, 1);
        task.resolve_conflict(ConflictResolution::CancelTask);
        assert_eq!(task.state, TaskState::Idle);
    }

    #[test]
    fn skip_all_short_circuits_remaining_conflicts() {
        let mut task = Task::new(TaskKind::Copy, vec![], None, TaskOptions::default());
        task.confirm();
        task.begin_conflict_resolution(vec![TfmPath::local("/a"), TfmPath::local("/b"), TfmPath::local("/c")]);
        task.resolve_conflict(ConflictResolution::SkipAll);
        assert_eq!(task.results.skipped, 3);
        assert_eq!(task.state, TaskState::Executing);
    }

    #[test]
    fn results_never_exceed_total_items() {
        let mut task = Task::new(TaskKind::Copy, vec![], None, TaskOptions::default());
        task.total_items = 3;
        task.results.success = 2;
        task.results.skipped = 1;
        assert!(task.results.total() <= task.total_items);
    }
}
