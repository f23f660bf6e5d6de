//! Progress reporting and animation, decoupled from the executor thread.
//!
//! Grounded in the teacher's `core/progress.rs` publish-subscribe model,
//! adapted from a fine-grained event stream to the coarser
//! per-operation counters the Task Coordinator needs.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Copy,
    Move,
    Delete,
    ArchiveCreate,
    ArchiveExtract,
}

#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub kind: OperationKind,
    pub total_items: u64,
    pub processed_items: u64,
    pub current_item: Option<String>,
    pub errors: u64,
    pub current_item_percent: Option<u8>,
}

/// Tracks one active operation. Every field the executor updates is
/// atomic or behind the snapshot lock so the worker thread never blocks
/// the main thread's render path.
pub struct ProgressManager {
    kind: OperationKind,
    total_items: AtomicU64,
    processed_items: AtomicU64,
    errors: AtomicU64,
    current_item: Mutex<Option<String>>,
    current_item_percent: Mutex<Option<u8>>,
    started_at: Instant,
    last_callback_at: Mutex<Instant>,
    min_interval: Duration,
    events: Sender<ProgressSnapshot>,
}

impl ProgressManager {
    pub fn new(kind: OperationKind, total_items: u64, min_interval: Duration) -> (Arc<Self>, Receiver<ProgressSnapshot>) {
        let (tx, rx) = unbounded();
        let manager = Arc::new(Self {
            kind,
            total_items: AtomicU64::new(total_items),
            processed_items: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            current_item: Mutex::new(None),
            current_item_percent: Mutex::new(None),
            started_at: Instant::now(),
            last_callback_at: Mutex::new(Instant::now() - min_interval),
            min_interval,
            events: tx,
        });
        (manager, rx)
    }

    pub fn set_total_items(&self, total: u64) {
        self.total_items.store(total, Ordering::SeqCst);
    }

    pub fn start_item(&self, name: &str) {
        *self.current_item.lock().unwrap() = Some(name.to_string());
        *self.current_item_percent.lock().unwrap() = Some(0);
        self.maybe_emit(true);
    }

    pub fn update_item_percent(&self, percent: u8) {
        *self.current_item_percent.lock().unwrap() = Some(percent);
        self.maybe_emit(false);
    }

    pub fn complete_item(&self) {
        self.processed_items.fetch_add(1, Ordering::SeqCst);
        self.maybe_emit(true);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.maybe_emit(true);
    }

    /// Throttles to at most one callback per `min_interval`, unless
    /// `force` bypasses it (item boundaries always report immediately
    /// so the UI doesn't miss the last item of a fast batch).
    fn maybe_emit(&self, force: bool) {
        let mut last = self.last_callback_at.lock().unwrap();
        if !force && last.elapsed() < self.min_interval {
            return;
        }
        *last = Instant::now();
        let _ = self.events.send(self.snapshot());
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            kind: self.kind,
            total_items: self.total_items.load(Ordering::SeqCst),
            processed_items: self.processed_items.load(Ordering::SeqCst),
            current_item: self.current_item.lock().unwrap().clone(),
            errors: self.errors.load(Ordering::SeqCst),
            current_item_percent: *self.current_item_percent.lock().unwrap(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Named frame sequences for the spinner, advanced independently of
/// progress events so the UI stays visibly alive during one slow item.
pub struct ProgressAnimator {
    frames: &'static [&'static str],
    frame_interval: Duration,
    started_at: Instant,
}

impl ProgressAnimator {
    pub fn new(pattern: &str, frame_interval: Duration) -> Self {
        Self { frames: frames_for(pattern), frame_interval, started_at: Instant::now() }
    }

    pub fn current_frame(&self) -> &'static str {
        let elapsed = self.started_at.elapsed().as_millis() as u64;
        let interval_ms = self.frame_interval.as_millis().max(1) as u64;
        let index = (elapsed / interval_ms) as usize % self.frames.len();
        self.frames[index]
    }
}

fn frames_for(pattern: &str) -> &'static [&'static str] {
    match pattern {
        "dots" => &["   ", ".  ", ".. ", "..."],
        "pulse" => &["○", "◔", "◑", "◕", "●", "◕", "◑", "◔"],
        "wave" => &["▁", "▂", "▃", "▄", "▅", "▆", "▇", "▆", "▅", "▄", "▃", "▂"],
        _ => &["|", "/", "-", "\\"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_item_increments_processed_count() {
        let (manager, _rx) = ProgressManager::new(OperationKind::Copy, 10, Duration::from_millis(1));
        manager.complete_item();
        assert_eq!(manager.snapshot().processed_items, 1);
    }

    #[test]
    fn errors_tracked_separately_from_success() {
        let (manager, _rx) = ProgressManager::new(OperationKind::Copy, 10, Duration::from_millis(1));
        manager.complete_item();
        manager.record_error();
        let snapshot = manager.snapshot();
        assert_eq!(snapshot.processed_items, 1);
        assert_eq!(snapshot.errors, 1);
    }

    #[test]
    fn animator_cycles_through_frames() {
        let animator = ProgressAnimator::new("spinner", Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(["|", "/", "-", "\\"].contains(&animator.current_frame()));
    }
}
