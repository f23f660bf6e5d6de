//! Local filesystem backend.
//!
//! Plain synchronous `std::fs` calls — there is no async runtime in the
//! core event loop, so unlike a server backend this one never needs to
//! yield.

use super::error::{PathError, PathResult};
use super::stat::Stat;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata) -> u16 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() as u16
}

#[cfg(not(unix))]
fn mode_of(meta: &fs::Metadata) -> u16 {
    if meta.is_dir() { 0o40755 } else { 0o100644 }
}

fn mtime_of(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

pub fn stat(path: &Path) -> PathResult<Stat> {
    let meta = path.symlink_metadata()?;
    let is_symlink = meta.file_type().is_symlink();
    // Follow the link for size/is_dir/is_file, same as `ls -L`, but report
    // `is_symlink` from the unfollowed metadata above.
    let followed = if is_symlink { fs::metadata(path)? } else { meta.clone() };
    Ok(Stat {
        size: followed.len(),
        mtime: mtime_of(&meta),
        mode: mode_of(&meta),
        is_dir: followed.is_dir(),
        is_file: followed.is_file(),
        is_symlink,
    })
}

/// One directory level, `.`/`..` filtered (`read_dir` never yields them,
/// but filtering defensively keeps this backend's contract identical to
/// the SSH/S3 ones where it matters).
pub fn iterdir(path: &Path) -> PathResult<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == "." || name == ".." {
            continue;
        }
        entries.push(entry.path());
    }
    Ok(entries)
}

pub fn open_read(path: &Path) -> PathResult<Box<dyn Read + Send>> {
    Ok(Box::new(fs::File::open(path)?))
}

pub fn open_write(path: &Path) -> PathResult<Box<dyn Write + Send>> {
    Ok(Box::new(fs::File::create(path)?))
}

pub fn mkdir(path: &Path) -> PathResult<()> {
    fs::create_dir(path)?;
    Ok(())
}

/// Same-filesystem atomic rename. Cross-filesystem moves are handled one
/// layer up by falling back to `copy_to` + `unlink` on `EXDEV`.
pub fn rename(from: &Path, to: &Path) -> PathResult<()> {
    fs::rename(from, to).map_err(|e| {
        if e.raw_os_error() == Some(libc::EXDEV) {
            PathError::CrossBackend { from: from.display().to_string(), to: to.display().to_string() }
        } else {
            e.into()
        }
    })
}

pub fn unlink(path: &Path) -> PathResult<()> {
    fs::remove_file(path)?;
    Ok(())
}

/// Fails with `DirectoryNotEmpty` rather than `fs::remove_dir`'s generic
/// `ENOTEMPTY` io error, so the caller-policy table's classification
/// holds regardless of backend.
pub fn rmdir(path: &Path) -> PathResult<()> {
    let mut children = fs::read_dir(path)?;
    if children.next().is_some() {
        return Err(PathError::DirectoryNotEmpty(path.display().to_string()));
    }
    fs::remove_dir(path)?;
    Ok(())
}

#[cfg(not(unix))]
mod libc {
    pub const EXDEV: i32 = 18;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn stat_reports_file_size() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"hello").unwrap();
        let s = stat(&file).unwrap();
        assert!(s.is_file);
        assert_eq!(s.size, 5);
    }

    #[test]
    fn stat_reports_directory() {
        let dir = tempdir().unwrap();
        let s = stat(dir.path()).unwrap();
        assert!(s.is_dir);
    }

    #[test]
    fn iterdir_excludes_dot_entries() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"x").unwrap();
        let entries = iterdir(dir.path()).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn rmdir_rejects_non_empty() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"x").unwrap();
        let err = rmdir(dir.path()).unwrap_err();
        assert!(matches!(err, PathError::DirectoryNotEmpty(_)));
    }

    #[test]
    fn unlink_missing_file_maps_to_not_found() {
        let dir = tempdir().unwrap();
        let err = unlink(&dir.path().join("missing.txt")).unwrap_err();
        assert!(matches!(err, PathError::NotFound(_)));
    }
}
