//! End-to-end scenarios exercising multiple modules together: path
//! abstraction, listing, pane navigation, and the task pipeline.

use std::fs;
use std::sync::Arc;
use tempfile::tempdir;
use tfm_core::cache::{BackendCache, CacheCoordinator};
use tfm_core::cursor_history::CursorHistory;
use tfm_core::listing::{list_directory, SortMode};
use tfm_core::pane::{PaneManager, Side};
use tfm_core::path::TfmPath;
use tfm_core::task::coordinator::TaskCoordinator;
use tfm_core::task::{ConflictResolution, TaskKind, TaskOptions};

fn cache_coordinator() -> Arc<CacheCoordinator> {
    Arc::new(CacheCoordinator::new(Arc::new(BackendCache::new(64, std::time::Duration::from_secs(30)))))
}

/// A polymorphic count across nested directories must count files, not
/// the directories that contain them — the scenario spec.md calls out
/// by name ("prior bug: local walker returned 2 instead of 3 files").
#[test]
fn polymorphic_count_counts_files_not_intermediate_directories() {
    let root = tempdir().unwrap();
    fs::create_dir(root.path().join("a")).unwrap();
    fs::create_dir(root.path().join("a/b")).unwrap();
    fs::write(root.path().join("a/one.txt"), b"1").unwrap();
    fs::write(root.path().join("a/b/two.txt"), b"2").unwrap();
    fs::write(root.path().join("a/b/three.txt"), b"3").unwrap();

    let sources = vec![TfmPath::local(root.path().join("a"))];
    let cancel = tfm_core::task::CancelFlag::new();
    let total = tfm_core::task::executor::count_items(&sources, &cancel);
    assert_eq!(total, 3);
}

/// A full copy task run through the coordinator: confirm, no
/// conflicts, execute, and the destination ends up populated while the
/// source tree remains intact.
#[test]
fn copy_task_runs_end_to_end_through_the_coordinator() {
    let src_dir = tempdir().unwrap();
    let dst_dir = tempdir().unwrap();
    fs::write(src_dir.path().join("report.txt"), b"quarterly numbers").unwrap();

    let source = TfmPath::local(src_dir.path().join("report.txt"));
    let destination = TfmPath::local(dst_dir.path().join("report.txt"));

    let coordinator = TaskCoordinator::new(10);
    coordinator.start(TaskKind::Copy, vec![source], Some(destination.clone()), TaskOptions::default(), true);
    coordinator.check_conflicts(cache_coordinator());
    coordinator.clear();

    assert!(destination.exists());
    assert_eq!(fs::read_to_string(dst_dir.path().join("report.txt")).unwrap(), "quarterly numbers");
    assert!(src_dir.path().join("report.txt").exists(), "copy must not remove the source");
}

/// When the destination already holds a file with the same name, the
/// task must stop at `ResolvingConflict` rather than silently
/// overwriting, and a `SkipThis` resolution must leave the existing
/// destination file untouched.
#[test]
fn move_task_detects_conflict_and_skip_preserves_destination() {
    let src_dir = tempdir().unwrap();
    let dst_dir = tempdir().unwrap();
    fs::write(src_dir.path().join("notes.txt"), b"new").unwrap();
    fs::write(dst_dir.path().join("notes.txt"), b"original").unwrap();

    let source = TfmPath::local(src_dir.path().join("notes.txt"));
    let destination = TfmPath::local(dst_dir.path());

    let coordinator = TaskCoordinator::new(10);
    coordinator.start(TaskKind::Move, vec![source], Some(destination), TaskOptions::default(), true);
    coordinator.check_conflicts(cache_coordinator());

    let active = coordinator.active().expect("conflict must keep the task active");
    assert!(matches!(active.lock().unwrap().as_ref().unwrap().state, tfm_core::task::TaskState::ResolvingConflict { .. }));

    coordinator.resolve_conflict(ConflictResolution::SkipThis, cache_coordinator());
    coordinator.clear();

    assert_eq!(fs::read_to_string(dst_dir.path().join("notes.txt")).unwrap(), "original");
    assert!(src_dir.path().join("notes.txt").exists(), "skipped source must survive");
}

/// Natural sort orders numeric runs as integers and is stable across
/// directories-first grouping; exercised via `list_directory` rather
/// than the comparator directly, so the pane-facing contract is
/// verified end to end.
#[test]
fn list_directory_sorts_directories_first_then_naturally_by_name() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("file2.txt"), b"").unwrap();
    fs::write(dir.path().join("file10.txt"), b"").unwrap();
    fs::create_dir(dir.path().join("zzz_subdir")).unwrap();

    let path = TfmPath::local(dir.path());
    let entries = list_directory(&path, false, None, SortMode::Name, false).unwrap();
    let names: Vec<String> = entries.iter().map(|p| p.name()).collect();

    assert_eq!(names[0], "zzz_subdir", "directories sort ahead of files regardless of name");
    assert_eq!(&names[1..], &["file2.txt", "file10.txt"], "numeric runs compare as integers, not lexically");
}

/// Navigating into a child directory and then back up restores focus
/// onto the child just left, overriding whatever cursor history had
/// recorded for that parent.
#[test]
fn pane_navigation_restores_focus_on_child_just_left() {
    let root = tempdir().unwrap();
    fs::create_dir(root.path().join("projects")).unwrap();
    fs::create_dir(root.path().join("projects/alpha")).unwrap();
    fs::create_dir(root.path().join("projects/beta")).unwrap();

    let history = Arc::new(CursorHistory::new());
    let start = TfmPath::local(root.path());
    let mut panes = PaneManager::new(start.clone(), start.clone(), false, history);
    panes.navigate(Side::Left, start.clone(), None);

    let projects = TfmPath::local(root.path().join("projects"));
    panes.navigate(Side::Left, projects.clone(), None);
    panes.move_cursor(Side::Left, 1, 20, 2); // focus "beta"
    let beta = panes.left.focused().unwrap().clone();
    assert_eq!(beta.name(), "beta");

    panes.navigate(Side::Left, beta.clone(), None); // enter "beta"
    panes.navigate(Side::Left, projects.clone(), Some(&beta)); // backspace out of it

    assert_eq!(panes.left.focused().unwrap().name(), "beta", "backspacing out of a directory must refocus it");
}

/// Selecting then deleting a file it through the coordinator end to
/// end, with the cache coordinator's invalidation hooked in exactly as
/// the app shell wires it.
#[test]
fn delete_task_removes_file_and_invalidates_cache_for_remote_parent_only() {
    let dir = tempdir().unwrap();
    let victim = dir.path().join("obsolete.log");
    fs::write(&victim, b"x").unwrap();

    let coordinator = TaskCoordinator::new(10);
    coordinator.start(TaskKind::Delete, vec![TfmPath::local(&victim)], None, TaskOptions::default(), true);
    coordinator.check_conflicts(cache_coordinator());
    coordinator.clear();

    assert!(!victim.exists());
}
