//! Background execution of a confirmed, conflict-resolved task.
//!
//! Counting and copying both walk `rglob()` — never a backend-specific
//! directory walk — so remote sources count and execute identically to
//! local ones. A prior local-only walker under-reported remote file
//! counts; this module exists to make that bug structurally impossible.

use super::progress::{OperationKind, ProgressManager};
use super::{CancelFlag, Task, TaskKind};
use crate::cache::{CacheCoordinator, OperationKind as CacheOpKind};
use crate::path::archive::ArchiveKind;
use crate::path::error::PathError;
use crate::path::{posix, TfmPath};
use std::io::{Read, Write};
use std::sync::Arc;

const CHUNK_SIZE: usize = 1024 * 1024;

/// Recursively counts files under `sources`, respecting `cancel`.
/// Returns whatever was counted so far if cancelled mid-walk — the
/// boundary behavior requires `≥ 0`, not an error.
pub fn count_items(sources: &[TfmPath], cancel: &CancelFlag) -> u64 {
    let mut total = 0u64;
    for source in sources {
        if cancel.is_set() {
            return total;
        }
        if source.is_dir() {
            for entry in source.rglob() {
                if cancel.is_set() {
                    return total;
                }
                match entry {
                    Ok(path) if !path.is_dir() => total += 1,
                    Ok(_) => {}
                    Err(_) => total += 1,
                }
            }
        } else {
            total += 1;
        }
    }
    total
}

/// Destination conflicts: source items whose computed destination
/// already exists, enumerated before any mutation begins.
pub fn find_conflicts(sources: &[TfmPath], destination: &TfmPath) -> Vec<TfmPath> {
    sources
        .iter()
        .map(|source| destination.join(&source.name()))
        .filter(|candidate| candidate.exists())
        .collect()
}

fn to_cache_op(kind: TaskKind) -> CacheOpKind {
    match kind {
        TaskKind::Copy => CacheOpKind::Copy,
        TaskKind::Move => CacheOpKind::Move,
        TaskKind::Delete => CacheOpKind::Delete,
        TaskKind::ArchiveCreate => CacheOpKind::ArchiveCreate,
        TaskKind::ArchiveExtract => CacheOpKind::ArchiveExtract,
    }
}

/// Runs a confirmed, conflict-resolved task to completion on the
/// calling thread (the coordinator spawns this onto a worker thread).
/// Mutates `results` in place so the coordinator's snapshot, taken from
/// the main thread, is always a consistent in-progress view.
pub fn execute(task: &mut Task, progress: &Arc<ProgressManager>, cache: &CacheCoordinator) {
    match task.kind {
        TaskKind::Delete => execute_delete(task, progress),
        TaskKind::Copy => execute_copy_or_move(task, progress, false),
        TaskKind::Move => execute_copy_or_move(task, progress, true),
        TaskKind::ArchiveCreate => execute_archive_create(task, progress),
        TaskKind::ArchiveExtract => execute_archive_extract(task, progress),
    }

    let destination = task.destination.clone();
    cache.invalidate_for_operation(to_cache_op(task.kind), &task.source_paths, destination.as_ref());
    task.finish();
}

fn execute_delete(task: &mut Task, progress: &Arc<ProgressManager>) {
    for source in task.source_paths.clone() {
        if task.cancel_flag.is_set() {
            break;
        }
        progress.start_item(&source.name());
        let outcome = if source.is_dir() { delete_recursive(&source, &task.cancel_flag) } else { source.unlink() };
        match outcome {
            Ok(()) => {
                task.results.success += 1;
                progress.complete_item();
            }
            Err(PathError::Cancelled) => break,
            Err(_) => {
                task.results.errors += 1;
                progress.record_error();
            }
        }
    }
}

fn delete_recursive(root: &TfmPath, cancel: &CancelFlag) -> crate::path::error::PathResult<()> {
    let mut dirs = Vec::new();
    for entry in root.rglob() {
        if cancel.is_set() {
            return Err(PathError::Cancelled);
        }
        let path = entry?;
        if path.is_dir() {
            dirs.push(path);
        } else {
            path.unlink()?;
        }
    }
    // Deepest directories first so `rmdir`'s non-empty check always
    // sees an already-emptied subtree.
    dirs.sort_by_key(|p| std::cmp::Reverse(p.parts().len()));
    for dir in dirs {
        dir.rmdir()?;
    }
    root.rmdir()
}

fn execute_copy_or_move(task: &mut Task, progress: &Arc<ProgressManager>, remove_source: bool) {
    let Some(destination) = task.destination.clone() else { return };
    let skip_names = skip_set(task);

    for source in task.source_paths.clone() {
        if task.cancel_flag.is_set() {
            break;
        }
        let dest = destination.join(&source.name());
        if skip_names.contains(&source.name()) {
            task.results.skipped += 1;
            continue;
        }
        progress.start_item(&source.name());

        let outcome = if source.is_dir() {
            copy_tree(&source, &dest, &task.cancel_flag, progress)
        } else {
            copy_one_file(&source, &dest, &task.cancel_flag, progress)
        };

        match outcome {
            Ok(()) => {
                if remove_source {
                    let _ = if source.is_dir() { delete_recursive(&source, &task.cancel_flag) } else { source.unlink() };
                }
                task.results.success += 1;
                progress.complete_item();
            }
            Err(PathError::Cancelled) => {
                let _ = dest.unlink();
                break;
            }
            Err(_) => {
                task.results.errors += 1;
                progress.record_error();
            }
        }
    }
}

fn skip_set(task: &Task) -> std::collections::HashSet<String> {
    task.conflicts.iter().take(task.current_conflict_index).map(|p| p.name()).collect()
}

fn copy_tree(source: &TfmPath, dest: &TfmPath, cancel: &CancelFlag, progress: &Arc<ProgressManager>) -> crate::path::error::PathResult<()> {
    if !dest.exists() {
        dest.mkdir()?;
    }
    for entry in source.iterdir()? {
        if cancel.is_set() {
            return Err(PathError::Cancelled);
        }
        let child_dest = dest.join(&entry.name());
        if entry.is_dir() {
            copy_tree(&entry, &child_dest, cancel, progress)?;
        } else {
            copy_one_file(&entry, &child_dest, cancel, progress)?;
        }
    }
    Ok(())
}

/// Streams in `CHUNK_SIZE` pieces, checking `cancel` between chunks —
/// the cancellation boundary spec.md calls out for large-file copies.
fn copy_one_file(source: &TfmPath, dest: &TfmPath, cancel: &CancelFlag, progress: &Arc<ProgressManager>) -> crate::path::error::PathResult<()> {
    let total = source.stat().map(|s| s.size).unwrap_or(0);
    let mut reader = source.open_read()?;
    let mut writer = dest.open_write()?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut copied: u64 = 0;

    loop {
        if cancel.is_set() {
            return Err(PathError::Cancelled);
        }
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        std::io::Write::write_all(&mut writer, &buf[..n])?;
        copied += n as u64;
        if total > 0 {
            progress.update_item_percent(((copied * 100) / total).min(100) as u8);
        }
    }
    Ok(())
}

/// Builds one archive at `task.destination` holding every file under
/// `task.source_paths`. Directory sources are walked via `rglob()` (the
/// same polymorphic walk `count_items`/`copy_tree` use) and stored under
/// a leading `<dir name>/` prefix; plain file sources are stored by name
/// alone.
fn execute_archive_create(task: &mut Task, progress: &Arc<ProgressManager>) {
    let Some(destination) = task.destination.clone() else { return };
    let kind = ArchiveKind::detect(std::path::Path::new(&destination.name())).unwrap_or(ArchiveKind::Zip);
    let members = collect_archive_members(&task.source_paths, &task.cancel_flag);

    if task.cancel_flag.is_set() {
        return;
    }

    let result = match kind {
        ArchiveKind::Zip => build_zip(&members, &task.cancel_flag, progress),
        ArchiveKind::Tar => build_tar(&members, &task.cancel_flag, progress, false),
        ArchiveKind::TarGz => build_tar(&members, &task.cancel_flag, progress, true),
    };

    match result {
        Ok(bytes) => match destination.open_write().and_then(|mut w| {
            std::io::Write::write_all(&mut w, &bytes)?;
            Ok(())
        }) {
            Ok(()) => task.results.success += members.len() as u64,
            Err(_) => task.results.errors += 1,
        },
        Err(PathError::Cancelled) => {}
        Err(_) => task.results.errors += 1,
    }
}

/// Walks every source, flattening directory sources into
/// `(internal_path, file)` pairs. Only files are collected — archive
/// members for directories are synthesized on read the same way
/// `ArchiveIndex` synthesizes them, so an empty subdirectory is simply
/// not represented, matching how `archive.rs` already treats archives
/// built without explicit directory entries.
fn collect_archive_members(sources: &[TfmPath], cancel: &CancelFlag) -> Vec<(String, TfmPath)> {
    let mut members = Vec::new();
    for source in sources {
        if cancel.is_set() {
            break;
        }
        if source.is_dir() {
            let root_name = source.name();
            let root_depth = source.parts().len();
            for entry in source.rglob() {
                if cancel.is_set() {
                    break;
                }
                if let Ok(path) = entry {
                    if !path.is_dir() {
                        let rel = path.parts()[root_depth..].join("/");
                        members.push((format!("{root_name}/{rel}"), path));
                    }
                }
            }
        } else {
            members.push((source.name(), source.clone()));
        }
    }
    members
}

fn build_zip(members: &[(String, TfmPath)], cancel: &CancelFlag, progress: &Arc<ProgressManager>) -> crate::path::error::PathResult<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (internal_path, file) in members {
            if cancel.is_set() {
                return Err(PathError::Cancelled);
            }
            progress.start_item(internal_path);
            writer
                .start_file(internal_path.as_str(), options)
                .map_err(|e| PathError::Backend { backend: "archive", message: e.to_string() })?;
            let mut reader = file.open_read()?;
            std::io::copy(&mut reader, &mut writer)?;
            progress.complete_item();
        }
        writer.finish().map_err(|e| PathError::Backend { backend: "archive", message: e.to_string() })?;
    }
    Ok(buf)
}

fn build_tar(members: &[(String, TfmPath)], cancel: &CancelFlag, progress: &Arc<ProgressManager>, gzip: bool) -> crate::path::error::PathResult<Vec<u8>> {
    let mut raw = Vec::new();
    if gzip {
        let encoder = flate2::write::GzEncoder::new(&mut raw, flate2::Compression::default());
        append_tar_members(tar::Builder::new(encoder), members, cancel, progress)?.finish().map_err(PathError::from)?;
    } else {
        append_tar_members(tar::Builder::new(&mut raw), members, cancel, progress)?;
    }
    Ok(raw)
}

fn append_tar_members<W: std::io::Write>(
    mut builder: tar::Builder<W>,
    members: &[(String, TfmPath)],
    cancel: &CancelFlag,
    progress: &Arc<ProgressManager>,
) -> crate::path::error::PathResult<W> {
    for (internal_path, file) in members {
        if cancel.is_set() {
            return Err(PathError::Cancelled);
        }
        progress.start_item(internal_path);
        let size = file.stat().map(|s| s.size).unwrap_or(0);
        let mut header = tar::Header::new_gnu();
        header.set_size(size);
        header.set_mode(0o644);
        header.set_cksum();
        let mut reader = file.open_read()?;
        builder.append_data(&mut header, internal_path, &mut reader)?;
        progress.complete_item();
    }
    builder.finish().map_err(PathError::from)?;
    builder.into_inner().map_err(PathError::from)
}

/// Unpacks each archive source into `task.destination`. One source may
/// name several archives (e.g. multi-select extraction); each is opened
/// independently and its members land directly under the destination.
fn execute_archive_extract(task: &mut Task, progress: &Arc<ProgressManager>) {
    let Some(destination) = task.destination.clone() else { return };
    if !destination.exists() {
        if destination.mkdir().is_err() {
            task.results.errors += 1;
            return;
        }
    }

    for source in task.source_paths.clone() {
        if task.cancel_flag.is_set() {
            break;
        }
        let Some(kind) = ArchiveKind::detect(std::path::Path::new(&source.name())) else {
            task.results.errors += 1;
            continue;
        };
        progress.start_item(&source.name());
        let outcome = extract_one(&source, &destination, kind, &task.cancel_flag);
        match outcome {
            Ok(count) => {
                task.results.success += count;
                progress.complete_item();
            }
            Err(PathError::Cancelled) => break,
            Err(_) => {
                task.results.errors += 1;
                progress.record_error();
            }
        }
    }
}

fn extract_one(source: &TfmPath, destination: &TfmPath, kind: ArchiveKind, cancel: &CancelFlag) -> crate::path::error::PathResult<u64> {
    let mut bytes = Vec::new();
    source.open_read()?.read_to_end(&mut bytes)?;

    match kind {
        ArchiveKind::Zip => {
            let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
                .map_err(|e| PathError::Backend { backend: "archive", message: e.to_string() })?;
            let mut count = 0u64;
            for i in 0..archive.len() {
                if cancel.is_set() {
                    return Err(PathError::Cancelled);
                }
                let mut entry = archive
                    .by_index(i)
                    .map_err(|e| PathError::Backend { backend: "archive", message: e.to_string() })?;
                let name = entry.name().to_string();
                if entry.is_dir() {
                    ensure_dir_path(destination, &name)?;
                    continue;
                }
                ensure_dir_path(destination, &posix::parent(&name))?;
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                destination.join(&name).open_write()?.write_all(&buf)?;
                count += 1;
            }
            Ok(count)
        }
        ArchiveKind::Tar | ArchiveKind::TarGz => {
            let reader: Box<dyn Read> = if kind == ArchiveKind::TarGz {
                Box::new(flate2::read::GzDecoder::new(std::io::Cursor::new(bytes)))
            } else {
                Box::new(std::io::Cursor::new(bytes))
            };
            let mut archive = tar::Archive::new(reader);
            let mut count = 0u64;
            for entry in archive.entries().map_err(PathError::from)? {
                if cancel.is_set() {
                    return Err(PathError::Cancelled);
                }
                let mut entry = entry.map_err(PathError::from)?;
                let name = entry.path().map_err(PathError::from)?.to_string_lossy().to_string();
                if entry.header().entry_type().is_dir() {
                    ensure_dir_path(destination, &name)?;
                    continue;
                }
                ensure_dir_path(destination, &posix::parent(&name))?;
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                destination.join(&name).open_write()?.write_all(&buf)?;
                count += 1;
            }
            Ok(count)
        }
    }
}

/// Creates every path component of `relative_dir` under `destination`
/// one level at a time, the same incremental pattern `copy_tree` uses,
/// since backends only guarantee a single-level `mkdir`.
fn ensure_dir_path(destination: &TfmPath, relative_dir: &str) -> crate::path::error::PathResult<()> {
    let mut current = destination.clone();
    for part in relative_dir.split('/').filter(|s| !s.is_empty()) {
        current = current.join(part);
        if !current.exists() {
            current.mkdir()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn count_items_counts_files_not_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/a.txt"), b"x").unwrap();
        fs::write(dir.path().join("top.txt"), b"y").unwrap();
        let cancel = CancelFlag::new();
        let total = count_items(&[TfmPath::local(dir.path())], &cancel);
        assert_eq!(total, 2);
    }

    #[test]
    fn count_items_stops_early_when_cancelled() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"x").unwrap();
        let cancel = CancelFlag::new();
        cancel.set();
        let total = count_items(&[TfmPath::local(dir.path())], &cancel);
        assert_eq!(total, 0);
    }

    #[test]
    fn find_conflicts_detects_existing_destination() {
        let src_dir = tempdir().unwrap();
        let dst_dir = tempdir().unwrap();
        fs::write(src_dir.path().join("a.txt"), b"x").unwrap();
        fs::write(dst_dir.path().join("a.txt"), b"y").unwrap();
        let conflicts = find_conflicts(&[TfmPath::local(src_dir.path().join("a.txt"))], &TfmPath::local(dst_dir.path()));
        assert_eq!(conflicts.len(), 1);
    }

    #[test]
    fn copy_one_file_round_trips_contents() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        fs::write(&src, b"hello world").unwrap();
        let (progress, _rx) = ProgressManager::new(OperationKind::Copy, 1, std::time::Duration::from_millis(1));
        let cancel = CancelFlag::new();
        copy_one_file(&TfmPath::local(&src), &TfmPath::local(&dst), &cancel, &progress).unwrap();
        assert_eq!(fs::read_to_string(&dst).unwrap(), "hello world");
    }

    #[test]
    fn archive_create_then_extract_round_trips_a_directory_tree() {
        let src_dir = tempdir().unwrap();
        fs::create_dir(src_dir.path().join("nested")).unwrap();
        fs::write(src_dir.path().join("top.txt"), b"top").unwrap();
        fs::write(src_dir.path().join("nested/inner.txt"), b"inner").unwrap();

        let archive_dir = tempdir().unwrap();
        let archive_path = archive_dir.path().join("bundle.zip");
        let mut task = Task::new(
            TaskKind::ArchiveCreate,
            vec![TfmPath::local(src_dir.path().join("top.txt")), TfmPath::local(src_dir.path().join("nested"))],
            Some(TfmPath::local(&archive_path)),
            super::super::TaskOptions::default(),
        );
        let (progress, _rx) = ProgressManager::new(OperationKind::ArchiveCreate, 2, std::time::Duration::from_millis(1));
        execute_archive_create(&mut task, &progress);
        assert_eq!(task.results.errors, 0);
        assert!(archive_path.exists());

        let extract_dir = tempdir().unwrap();
        let mut extract_task = Task::new(
            TaskKind::ArchiveExtract,
            vec![TfmPath::local(&archive_path)],
            Some(TfmPath::local(extract_dir.path())),
            super::super::TaskOptions::default(),
        );
        let (progress, _rx) = ProgressManager::new(OperationKind::ArchiveExtract, 1, std::time::Duration::from_millis(1));
        execute_archive_extract(&mut extract_task, &progress);

        assert_eq!(extract_task.results.errors, 0);
        assert_eq!(fs::read_to_string(extract_dir.path().join("top.txt")).unwrap(), "top");
        assert_eq!(fs::read_to_string(extract_dir.path().join("nested/inner.txt")).unwrap(), "inner");
    }

    #[test]
    fn archive_create_detects_tar_gz_from_destination_suffix() {
        let src_dir = tempdir().unwrap();
        fs::write(src_dir.path().join("a.txt"), b"x").unwrap();

        let archive_dir = tempdir().unwrap();
        let archive_path = archive_dir.path().join("bundle.tar.gz");
        let mut task = Task::new(
            TaskKind::ArchiveCreate,
            vec![TfmPath::local(src_dir.path().join("a.txt"))],
            Some(TfmPath::local(&archive_path)),
            super::super::TaskOptions::default(),
        );
        let (progress, _rx) = ProgressManager::new(OperationKind::ArchiveCreate, 1, std::time::Duration::from_millis(1));
        execute_archive_create(&mut task, &progress);
        assert_eq!(task.results.success, 1);
        assert!(archive_path.exists());

        let extract_dir = tempdir().unwrap();
        let mut extract_task = Task::new(
            TaskKind::ArchiveExtract,
            vec![TfmPath::local(&archive_path)],
            Some(TfmPath::local(extract_dir.path())),
            super::super::TaskOptions::default(),
        );
        let (progress, _rx) = ProgressManager::new(OperationKind::ArchiveExtract, 1, std::time::Duration::from_millis(1));
        execute_archive_extract(&mut extract_task, &progress);
        assert_eq!(fs::read_to_string(extract_dir.path().join("a.txt")).unwrap(), "x");
    }
}
