//! Read-only virtual filesystem over a ZIP/TAR/TAR.GZ archive.
//!
//! The archive is indexed once, on first access, into a tree keyed by
//! POSIX-style internal paths; everything after that is served from the
//! in-memory index. Any mutation reaches [`PathError::ReadOnly`].

use super::error::{PathError, PathResult};
use super::posix;
use super::stat::Stat;
use crate::cache::{BackendCache, CacheValue};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveKind {
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    internal_path: String,
    size: u64,
    mtime: i64,
    is_dir: bool,
}

/// Member list flattened into a directory tree: every prefix of every
/// member's path becomes a synthetic directory entry even if the archive
/// never stored one explicitly (common for ZIPs built with `zip -j`-like
/// tools that omit directory entries).
struct ArchiveIndex {
    entries: HashMap<String, Entry>,
    children: HashMap<String, Vec<String>>,
}

impl ArchiveIndex {
    fn build(container: &Path, kind: ArchiveKind) -> PathResult<Self> {
        let raw_entries = match kind {
            ArchiveKind::Zip => read_zip_entries(container)?,
            ArchiveKind::Tar => read_tar_entries(container, false)?,
            ArchiveKind::TarGz => read_tar_entries(container, true)?,
        };

        let mut entries = HashMap::new();
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        entries.insert("/".to_string(), Entry { internal_path: "/".to_string(), size: 0, mtime: 0, is_dir: true });

        for raw in raw_entries {
            let full = posix::normalize(&format!("/{}", raw.internal_path));
            ensure_ancestors(&full, &mut entries, &mut children);
            let parent = posix::parent(&full);
            children.entry(parent).or_default().push(full.clone());
            entries.insert(
                full.clone(),
                Entry { internal_path: full, size: raw.size, mtime: raw.mtime, is_dir: raw.is_dir },
            );
        }

        for list in children.values_mut() {
            list.sort();
            list.dedup();
        }

        Ok(Self { entries, children })
    }
}

fn ensure_ancestors(path: &str, entries: &mut HashMap<String, Entry>, children: &mut HashMap<String, Vec<String>>) {
    let mut current = posix::parent(path);
    while current != "/" && !entries.contains_key(&current) {
        entries.insert(
            current.clone(),
            Entry { internal_path: current.clone(), size: 0, mtime: 0, is_dir: true },
        );
        let parent = posix::parent(&current);
        children.entry(parent.clone()).or_default().push(current.clone());
        current = parent;
    }
}

struct RawEntry {
    internal_path: String,
    size: u64,
    mtime: i64,
    is_dir: bool,
}

fn read_zip_entries(container: &Path) -> PathResult<Vec<RawEntry>> {
    let file = std::fs::File::open(container)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| PathError::Backend { backend: "archive", message: e.to_string() })?;
    let mut out = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let zip_entry = archive
            .by_index(i)
            .map_err(|e| PathError::Backend { backend: "archive", message: e.to_string() })?;
        let mtime = zip_entry
            .last_modified()
            .and_then(|t| t.to_time().ok())
            .map(|t| t.unix_timestamp())
            .unwrap_or(0);
        out.push(RawEntry {
            internal_path: zip_entry.name().to_string(),
            size: zip_entry.size(),
            mtime,
            is_dir: zip_entry.is_dir(),
        });
    }
    Ok(out)
}

fn read_tar_entries(container: &Path, gzip: bool) -> PathResult<Vec<RawEntry>> {
    let file = std::fs::File::open(container)?;
    let mut out = Vec::new();
    if gzip {
        let decoder = flate2::read::GzDecoder::new(file);
        let mut archive = tar::Archive::new(decoder);
        collect_tar_entries(&mut archive, &mut out)?;
    } else {
        let mut archive = tar::Archive::new(file);
        collect_tar_entries(&mut archive, &mut out)?;
    }
    Ok(out)
}

fn collect_tar_entries<R: Read>(archive: &mut tar::Archive<R>, out: &mut Vec<RawEntry>) -> PathResult<()> {
    for entry in archive.entries().map_err(PathError::from)? {
        let entry = entry.map_err(PathError::from)?;
        let header = entry.header();
        let path = entry.path().map_err(PathError::from)?.to_string_lossy().to_string();
        out.push(RawEntry {
            internal_path: path,
            size: header.size().unwrap_or(0),
            mtime: header.mtime().unwrap_or(0) as i64,
            is_dir: header.entry_type().is_dir(),
        });
    }
    Ok(())
}

/// Read-only backend over one archive container file.
pub struct ArchiveBackend {
    pub container: PathBuf,
    index: Mutex<Option<ArchiveIndex>>,
    kind: ArchiveKind,
    /// Shared with every other backend through `BackendRegistry`. The
    /// in-memory `ArchiveIndex` already makes `stat`/`iterdir` cheap once
    /// built, so this mostly saves repeated `canonical_key` formatting and
    /// keeps archive entries subject to the same coordinator invalidation
    /// as SSH/S3 ones; `None` when opened without a registry (tests).
    cache: Option<Arc<BackendCache>>,
}

impl ArchiveBackend {
    pub fn open(container: PathBuf, kind: ArchiveKind, cache: Option<Arc<BackendCache>>) -> Self {
        Self { container, index: Mutex::new(None), kind, cache }
    }

    fn with_index<T>(&self, f: impl FnOnce(&ArchiveIndex) -> PathResult<T>) -> PathResult<T> {
        let mut guard = self.index.lock().unwrap();
        if guard.is_none() {
            *guard = Some(ArchiveIndex::build(&self.container, self.kind)?);
        }
        f(guard.as_ref().unwrap())
    }

    fn canonical_key(&self, internal_path: &str) -> String {
        format!("{}!{}", self.container.display(), internal_path)
    }

    pub fn exists(&self, internal_path: &str) -> bool {
        self.stat(internal_path).is_ok()
    }

    pub fn stat(&self, internal_path: &str) -> PathResult<Stat> {
        let key = posix::normalize(internal_path);
        let canonical_key = self.canonical_key(&key);
        if let Some(cache) = &self.cache {
            if let Some(CacheValue::Stat(stat)) = cache.get("Archive", "stat", &canonical_key) {
                return Ok(stat);
            }
        }
        let stat = self.with_index(|index| {
            let entry = index
                .entries
                .get(&key)
                .ok_or_else(|| PathError::NotFound(format!("{}:{key}", self.container.display())))?;
            Ok(if entry.is_dir { Stat::directory(entry.mtime) } else { Stat::file(entry.size, entry.mtime) })
        })?;
        if let Some(cache) = &self.cache {
            cache.put("Archive", "stat", &canonical_key, CacheValue::Stat(stat));
        }
        Ok(stat)
    }

    pub fn iterdir(&self, internal_path: &str) -> PathResult<Vec<String>> {
        let key = posix::normalize(internal_path);
        let canonical_key = self.canonical_key(&key);
        if let Some(cache) = &self.cache {
            if let Some(CacheValue::Listing(children)) = cache.get("Archive", "iterdir", &canonical_key) {
                return Ok(children.into_iter().map(|(child, _)| child).collect());
            }
        }
        let children = self.with_index(|index| {
            let child_keys = index.children.get(&key).cloned().unwrap_or_default();
            Ok(child_keys
                .into_iter()
                .map(|child_key| {
                    let stat = index
                        .entries
                        .get(&child_key)
                        .map(|e| if e.is_dir { Stat::directory(e.mtime) } else { Stat::file(e.size, e.mtime) })
                        .unwrap_or_else(|| Stat::directory(0));
                    (child_key, stat)
                })
                .collect::<Vec<(String, Stat)>>())
        })?;
        if let Some(cache) = &self.cache {
            cache.put("Archive", "iterdir", &canonical_key, CacheValue::Listing(children.clone()));
            for (child_key, stat) in &children {
                cache.put("Archive", "stat", &self.canonical_key(child_key), CacheValue::Stat(*stat));
            }
        }
        Ok(children.into_iter().map(|(child, _)| child).collect())
    }

    pub fn open_read(&self, internal_path: &str) -> PathResult<Box<dyn Read + Send>> {
        let key = posix::normalize(internal_path);
        match self.kind {
            ArchiveKind::Zip => {
                let file = std::fs::File::open(&self.container)?;
                let mut archive = zip::ZipArchive::new(file)
                    .map_err(|e| PathError::Backend { backend: "archive", message: e.to_string() })?;
                let mut zip_entry = archive
                    .by_name(key.trim_start_matches('/'))
                    .map_err(|_| PathError::NotFound(key.clone()))?;
                let mut buf = Vec::new();
                zip_entry.read_to_end(&mut buf)?;
                Ok(Box::new(std::io::Cursor::new(buf)))
            }
            ArchiveKind::Tar | ArchiveKind::TarGz => {
                let buf = self.read_tar_member(&key)?;
                Ok(Box::new(std::io::Cursor::new(buf)))
            }
        }
    }

    fn read_tar_member(&self, key: &str) -> PathResult<Vec<u8>> {
        let file = std::fs::File::open(&self.container)?;
        let target = key.trim_start_matches('/');
        let mut read = |mut archive: tar::Archive<Box<dyn Read>>| -> PathResult<Vec<u8>> {
            for entry in archive.entries().map_err(PathError::from)? {
                let mut entry = entry.map_err(PathError::from)?;
                let path = entry.path().map_err(PathError::from)?.to_string_lossy().to_string();
                if path.trim_end_matches('/') == target {
                    let mut buf = Vec::new();
                    entry.read_to_end(&mut buf)?;
                    return Ok(buf);
                }
            }
            Err(PathError::NotFound(key.to_string()))
        };
        let reader: Box<dyn Read> = match self.kind {
            ArchiveKind::TarGz => Box::new(flate2::read::GzDecoder::new(file)),
            _ => Box::new(file),
        };
        read(tar::Archive::new(reader))
    }

    pub fn open_write(&self, internal_path: &str) -> PathResult<()> {
        Err(PathError::ReadOnly(internal_path.to_string()))
    }

    pub fn mkdir(&self, internal_path: &str) -> PathResult<()> {
        Err(PathError::ReadOnly(internal_path.to_string()))
    }

    pub fn unlink(&self, internal_path: &str) -> PathResult<()> {
        Err(PathError::ReadOnly(internal_path.to_string()))
    }

    pub fn rmdir(&self, internal_path: &str) -> PathResult<()> {
        Err(PathError::ReadOnly(internal_path.to_string()))
    }

    pub fn rename(&self, internal_path: &str, _to: &str) -> PathResult<()> {
        Err(PathError::ReadOnly(internal_path.to_string()))
    }
}
