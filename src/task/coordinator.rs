//! Single-slot task coordinator: mediates ESC cancellation and blocks
//! new foreground actions while a task is active.

use super::executor;
use super::progress::{OperationKind, ProgressManager};
use super::{CancelFlag, ConflictResolution, Task, TaskKind, TaskOptions, TaskState};
use crate::cache::CacheCoordinator;
use crate::path::TfmPath;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

fn to_progress_kind(kind: TaskKind) -> OperationKind {
    match kind {
        TaskKind::Copy => OperationKind::Copy,
        TaskKind::Move => OperationKind::Move,
        TaskKind::Delete => OperationKind::Delete,
        TaskKind::ArchiveCreate => OperationKind::ArchiveCreate,
        TaskKind::ArchiveExtract => OperationKind::ArchiveExtract,
    }
}

/// The task slot. `None` means no task is active; `Some(None)` means a
/// task *is* active but currently checked out by the background worker
/// for execution (see [`TaskCoordinator::run_in_background`]) — the
/// slot, not a held `MutexGuard`, is what "in progress" means here, so
/// locking it never blocks for the duration of an `execute()` call.
type TaskSlot = Arc<Mutex<Option<Task>>>;

/// Owns the application-wide `active_task` slot. Exactly one task may
/// be in flight; a second start attempt is rejected by the caller
/// checking [`TaskCoordinator::is_busy`] before calling `start`.
pub struct TaskCoordinator {
    active: Mutex<Option<TaskSlot>>,
    /// A clone of the active task's `CancelFlag`, set once at `start`
    /// and cleared at `clear`. ESC cancellation goes through this
    /// directly — it is the same `Arc<AtomicBool>` the task owns, so
    /// setting it here never needs to lock `active`, even while the
    /// worker thread holds the slot checked out for execution.
    cancel_flag: Mutex<Option<CancelFlag>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    progress_interval_ms: u64,
}

impl TaskCoordinator {
    pub fn new(progress_interval_ms: u64) -> Self {
        Self { active: Mutex::new(None), cancel_flag: Mutex::new(None), worker: Mutex::new(None), progress_interval_ms }
    }

    pub fn is_busy(&self) -> bool {
        self.active.lock().unwrap().is_some()
    }

    pub fn start(&self, kind: TaskKind, sources: Vec<TfmPath>, destination: Option<TfmPath>, options: TaskOptions, skip_confirmation: bool) {
        let task = Task::new_with_confirmation(kind, sources, destination, options, skip_confirmation);
        *self.cancel_flag.lock().unwrap() = Some(task.cancel_flag.clone());
        *self.active.lock().unwrap() = Some(Arc::new(Mutex::new(Some(task))));
    }

    /// Returns the task slot, or `None` if no task is active. While the
    /// worker thread is executing, the slot's own lock yields `None` for
    /// the `Task` itself — callers that need the task mid-execution
    /// should use `cancel_active` or `is_busy` instead of reaching in.
    pub fn active(&self) -> Option<TaskSlot> {
        self.active.lock().unwrap().clone()
    }

    pub fn confirm(&self) {
        if let Some(slot) = self.active() {
            if let Some(task) = slot.lock().unwrap().as_mut() {
                task.confirm();
            }
        }
    }

    pub fn decline(&self) {
        if let Some(slot) = self.active() {
            let became_idle = {
                let mut guard = slot.lock().unwrap();
                let Some(task) = guard.as_mut() else { return };
                task.decline();
                task.state == TaskState::Idle
            };
            if became_idle {
                self.clear();
            }
        }
    }

    /// Runs conflict discovery and, if none are found, hands off to
    /// `run_in_background`. Caller invokes this once the task has moved
    /// past `Confirming`.
    pub fn check_conflicts(&self, cache: Arc<CacheCoordinator>) {
        let Some(slot) = self.active() else { return };
        let Some((sources, destination, cancel)) = slot.lock().unwrap().as_ref().map(|t| (t.source_paths.clone(), t.destination.clone(), t.cancel_flag.clone())) else { return };

        let total = executor::count_items(&sources, &cancel);
        let conflicts = match &destination {
            Some(dest) => executor::find_conflicts(&sources, dest),
            None => Vec::new(),
        };

        let should_run = {
            let mut guard = slot.lock().unwrap();
            let Some(task) = guard.as_mut() else { return };
            task.total_items = total;
            task.begin_conflict_resolution(conflicts);
            task.state == TaskState::Executing
        };

        if should_run {
            self.run_in_background(slot, cache);
        }
    }

    pub fn resolve_conflict(&self, resolution: ConflictResolution, cache: Arc<CacheCoordinator>) {
        let Some(slot) = self.active() else { return };
        let state = {
            let mut guard = slot.lock().unwrap();
            let Some(task) = guard.as_mut() else { return };
            task.resolve_conflict(resolution);
            task.state.clone()
        };
        match state {
            TaskState::Executing => self.run_in_background(slot, cache),
            TaskState::Idle => self.clear(),
            _ => {}
        }
    }

    /// Checks the task out of the slot and hands it to a worker thread.
    /// The slot holds `None` for the duration of `execute()` — the
    /// `Task` mutex is only ever held briefly, to take it out and to put
    /// it back, never across the execution itself. Cancellation does not
    /// need the slot at all (see `cancel_active`); confirm/decline/etc.
    /// naturally no-op while the slot reads empty, which matches "a task
    /// is currently executing" being the one state that rejects them.
    fn run_in_background(&self, slot: TaskSlot, cache: Arc<CacheCoordinator>) {
        let Some((kind, total_items)) = slot.lock().unwrap().as_ref().map(|t| (t.kind, t.total_items)) else { return };
        let (progress, _events) =
            ProgressManager::new(to_progress_kind(kind), total_items, std::time::Duration::from_millis(self.progress_interval_ms));

        let handle = std::thread::spawn(move || {
            let mut task = slot.lock().unwrap().take().expect("task present when execution starts");
            executor::execute(&mut task, &progress, &cache);
            *slot.lock().unwrap() = Some(task);
        });

        *self.worker.lock().unwrap() = Some(handle);
    }

    /// ESC during an active task: set the cancel flag directly, without
    /// touching the task slot's mutex — the flag is a plain
    /// `Arc<AtomicBool>` clone taken at `start`, so this never blocks on
    /// (or is blocked by) a worker thread mid-`execute()`.
    pub fn cancel_active(&self) -> bool {
        match self.cancel_flag.lock().unwrap().as_ref() {
            Some(flag) => {
                flag.set();
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        *self.active.lock().unwrap() = None;
        *self.cancel_flag.lock().unwrap() = None;
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    /// Whether the active task has run to completion. While the worker
    /// thread has the task checked out, the slot reads `None` and this
    /// reports "not finished yet" without blocking on the worker.
    pub fn join_if_finished(&self) {
        let finished = self.active().map(|slot| matches!(slot.lock().unwrap().as_ref(), Some(t) if t.state == TaskState::Idle)).unwrap_or(false);
        if finished {
            self.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BackendCache;
    use std::time::Duration;

    fn cache() -> Arc<CacheCoordinator> {
        Arc::new(CacheCoordinator::new(Arc::new(BackendCache::new(10, Duration::from_secs(60)))))
    }

    #[test]
    fn is_busy_reflects_active_task() {
        let coordinator = TaskCoordinator::new(100);
        assert!(!coordinator.is_busy());
        coordinator.start(TaskKind::Delete, vec![], None, TaskOptions::default(), false);
        assert!(coordinator.is_busy());
    }

    #[test]
    fn decline_clears_the_active_task() {
        let coordinator = TaskCoordinator::new(100);
        coordinator.start(TaskKind::Delete, vec![], None, TaskOptions::default(), false);
        coordinator.decline();
        assert!(!coordinator.is_busy());
    }

    #[test]
    fn cancel_active_is_false_with_no_task() {
        let coordinator = TaskCoordinator::new(100);
        assert!(!coordinator.cancel_active());
    }

    #[test]
    fn empty_delete_task_completes_and_clears() {
        let coordinator = TaskCoordinator::new(10);
        coordinator.start(TaskKind::Delete, vec![], None, TaskOptions::default(), true);
        coordinator.check_conflicts(cache());
        coordinator.clear();
        assert!(!coordinator.is_busy());
    }
}
