//! Unified path abstraction over local, SSH, S3, and archive storage.
//!
//! `TfmPath` is a cheap value type: construction never touches the
//! network, and the heavy state (an SSH session, an S3 client, an
//! archive's in-memory index) lives in [`registry::BackendRegistry`],
//! shared behind an `Arc` and looked up by key on every call.

pub mod archive;
pub mod error;
pub mod local;
pub mod posix;
pub mod registry;
pub mod s3;
pub mod ssh;
pub mod stat;

use archive::{ArchiveBackend, ArchiveKind};
use error::{PathError, PathResult};
use registry::BackendRegistry;
use stat::Stat;

use crate::cache::CacheValue;

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Local,
    Ssh,
    S3,
    Archive,
}

impl Scheme {
    pub fn is_remote(&self) -> bool {
        !matches!(self, Scheme::Local)
    }
}

enum Inner {
    Local(PathBuf),
    Ssh { registry: Arc<BackendRegistry>, alias: String, remote_path: String },
    S3 { registry: Arc<BackendRegistry>, bucket: String, key: String },
    Archive { backend: Arc<ArchiveBackend>, container: Box<TfmPath>, internal_path: String },
}

/// A location on any supported backend. Clone is `Arc` clone, not a deep
/// copy; equality and hashing follow `to_uri()`.
#[derive(Clone)]
pub struct TfmPath {
    inner: Arc<Inner>,
}

impl TfmPath {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self { inner: Arc::new(Inner::Local(path.into())) }
    }

    pub fn ssh(registry: Arc<BackendRegistry>, alias: &str, remote_path: &str) -> Self {
        Self {
            inner: Arc::new(Inner::Ssh {
                registry,
                alias: alias.to_string(),
                remote_path: posix::normalize(remote_path),
            }),
        }
    }

    pub fn s3(registry: Arc<BackendRegistry>, bucket: &str, key: &str) -> Self {
        Self {
            inner: Arc::new(Inner::S3 { registry, bucket: bucket.to_string(), key: posix::normalize(key) }),
        }
    }

    /// Enter an archive file as a virtual root. `container` must already
    /// `exists()` and have a recognized archive extension. `cache` is the
    /// same `BackendCache` the registry hands every remote backend; pass
    /// `None` to open an uncached archive (tests, or a container reached
    /// through a registry with no cache wired in).
    pub fn into_archive(container: TfmPath, cache: Option<Arc<crate::cache::BackendCache>>) -> PathResult<Self> {
        let container_path = container.as_local_pathbuf().ok_or_else(|| {
            PathError::InvalidArgument("archives must be opened from a local path".to_string())
        })?;
        let kind = ArchiveKind::detect(&container_path)
            .ok_or_else(|| PathError::InvalidArgument(format!("not an archive: {}", container_path.display())))?;
        let backend = Arc::new(ArchiveBackend::open(container_path, kind, cache));
        Ok(Self {
            inner: Arc::new(Inner::Archive {
                backend,
                container: Box::new(container),
                internal_path: "/".to_string(),
            }),
        })
    }

    fn as_local_pathbuf(&self) -> Option<PathBuf> {
        match &*self.inner {
            Inner::Local(p) => Some(p.clone()),
            _ => None,
        }
    }

    /// Parse a URI-style string: `s3://bucket/key`, `ssh://alias/path`,
    /// bare paths fall back to the local backend (including anything
    /// with an unrecognized scheme prefix, per the Path contract).
    pub fn parse(raw: &str, registry: Arc<BackendRegistry>) -> Self {
        if let Some(rest) = raw.strip_prefix("s3://") {
            if let Ok((bucket, key)) = s3::parse_s3_uri(&format!("s3://{rest}")) {
                return Self::s3(registry, &bucket, &key);
            }
        }
        if let Some(rest) = raw.strip_prefix("ssh://") {
            if let Some((alias, path)) = rest.split_once('/') {
                return Self::ssh(registry, alias, &format!("/{path}"));
            }
            return Self::ssh(registry, rest, "/");
        }
        Self::local(raw)
    }

    pub fn scheme(&self) -> Scheme {
        match &*self.inner {
            Inner::Local(_) => Scheme::Local,
            Inner::Ssh { .. } => Scheme::Ssh,
            Inner::S3 { .. } => Scheme::S3,
            Inner::Archive { .. } => Scheme::Archive,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.scheme().is_remote()
    }

    pub fn to_display_string(&self) -> String {
        match &*self.inner {
            Inner::Local(p) => p.display().to_string(),
            Inner::Ssh { alias, remote_path, .. } => format!("ssh://{alias}{remote_path}"),
            Inner::S3 { bucket, key, .. } => format!("s3://{bucket}{key}"),
            Inner::Archive { container, internal_path, .. } => {
                format!("{}!{}", container.to_display_string(), internal_path)
            }
        }
    }

    // -- pure attribute derivation, never touches the backend --

    pub fn name(&self) -> String {
        match &*self.inner {
            Inner::Local(p) => p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
            Inner::Ssh { remote_path, .. } => posix::name(remote_path),
            Inner::S3 { key, .. } => posix::name(key),
            Inner::Archive { internal_path, .. } => posix::name(internal_path),
        }
    }

    pub fn suffix(&self) -> String {
        match &*self.inner {
            Inner::Local(p) => p
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
                .unwrap_or_default(),
            Inner::Ssh { remote_path, .. } => posix::suffix(remote_path),
            Inner::S3 { key, .. } => posix::suffix(key),
            Inner::Archive { internal_path, .. } => posix::suffix(internal_path),
        }
    }

    pub fn parent(&self) -> TfmPath {
        match &*self.inner {
            Inner::Local(p) => Self::local(p.parent().map(PathBuf::from).unwrap_or_else(|| p.clone())),
            Inner::Ssh { registry, alias, remote_path } => {
                Self::ssh(registry.clone(), alias, &posix::parent(remote_path))
            }
            Inner::S3 { registry, bucket, key } => Self::s3(registry.clone(), bucket, &posix::parent(key)),
            Inner::Archive { backend, container, internal_path } => {
                if internal_path == "/" {
                    // Parent of the archive root navigates back out to
                    // whatever directory holds the container file.
                    container.parent()
                } else {
                    Self {
                        inner: Arc::new(Inner::Archive {
                            backend: backend.clone(),
                            container: container.clone(),
                            internal_path: posix::parent(internal_path),
                        }),
                    }
                }
            }
        }
    }

    pub fn join(&self, child: &str) -> TfmPath {
        match &*self.inner {
            Inner::Local(p) => Self::local(p.join(child)),
            Inner::Ssh { registry, alias, remote_path } => {
                Self::ssh(registry.clone(), alias, &posix::join(remote_path, child))
            }
            Inner::S3 { registry, bucket, key } => Self::s3(registry.clone(), bucket, &posix::join(key, child)),
            Inner::Archive { backend, container, internal_path } => Self {
                inner: Arc::new(Inner::Archive {
                    backend: backend.clone(),
                    container: container.clone(),
                    internal_path: posix::join(internal_path, child),
                }),
            },
        }
    }

    pub fn with_name(&self, new_name: &str) -> TfmPath {
        self.parent().join(new_name)
    }

    pub fn with_suffix(&self, new_suffix: &str) -> TfmPath {
        let n = self.name();
        let stem = match n.rfind('.') {
            Some(0) | None => n.as_str(),
            Some(idx) => &n[..idx],
        };
        let suffix = if new_suffix.is_empty() || new_suffix.starts_with('.') {
            new_suffix.to_string()
        } else {
            format!(".{new_suffix}")
        };
        self.with_name(&format!("{stem}{suffix}"))
    }

    pub fn parts(&self) -> Vec<String> {
        match &*self.inner {
            Inner::Local(p) => p.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect(),
            Inner::Ssh { remote_path, .. } => posix::parts(remote_path),
            Inner::S3 { key, .. } => posix::parts(key),
            Inner::Archive { internal_path, .. } => posix::parts(internal_path),
        }
    }

    // -- operations that reach the backend --

    pub fn exists(&self) -> bool {
        match &*self.inner {
            Inner::Local(p) => local::exists(p),
            Inner::Ssh { registry, alias, remote_path } => registry
                .ssh_backend(alias)
                .map(|backend| backend.exists(remote_path))
                .unwrap_or(false),
            Inner::S3 { registry, bucket, key } => {
                registry.s3_backend(bucket).map(|backend| backend.exists(key)).unwrap_or(false)
            }
            Inner::Archive { backend, internal_path, .. } => backend.exists(internal_path),
        }
    }

    pub fn stat(&self) -> PathResult<Stat> {
        match &*self.inner {
            Inner::Local(p) => local::stat(p),
            Inner::Ssh { registry, alias, remote_path } => {
                read_through_stat(self, registry, || registry.ssh_backend(alias)?.stat(remote_path))
            }
            Inner::S3 { registry, bucket, key } => {
                read_through_stat(self, registry, || registry.s3_backend(bucket)?.stat(key))
            }
            Inner::Archive { backend, internal_path, .. } => backend.stat(internal_path),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.stat().map(|s| s.is_dir).unwrap_or(false)
    }

    pub fn is_file(&self) -> bool {
        self.stat().map(|s| s.is_file).unwrap_or(false)
    }

    pub fn is_symlink(&self) -> bool {
        self.stat().map(|s| s.is_symlink).unwrap_or(false)
    }

    /// One directory level, `.`/`..` excluded on every backend.
    pub fn iterdir(&self) -> PathResult<Vec<TfmPath>> {
        match &*self.inner {
            Inner::Local(p) => Ok(local::iterdir(p)?.into_iter().map(Self::local).collect()),
            Inner::Ssh { registry, alias, remote_path } => {
                let children = read_through_iterdir(self, registry, || registry.ssh_backend(alias)?.iterdir_with_stat(remote_path))?;
                Ok(children
                    .into_iter()
                    .map(|(child, stat)| {
                        let path = Self::ssh(registry.clone(), alias, &child);
                        seed_child_stat(registry, &path, stat);
                        path
                    })
                    .collect())
            }
            Inner::S3 { registry, bucket, key } => {
                let children = read_through_iterdir(self, registry, || registry.s3_backend(bucket)?.iterdir_with_stat(key))?;
                Ok(children
                    .into_iter()
                    .map(|(child, stat)| {
                        let path = Self::s3(registry.clone(), bucket, &child);
                        seed_child_stat(registry, &path, stat);
                        path
                    })
                    .collect())
            }
            Inner::Archive { backend, container, internal_path } => Ok(backend
                .iterdir(internal_path)?
                .into_iter()
                .map(|child| Self {
                    inner: Arc::new(Inner::Archive {
                        backend: backend.clone(),
                        container: container.clone(),
                        internal_path: child,
                    }),
                })
                .collect()),
        }
    }

    /// Lazily walks the subtree depth-first. Each `next()` issues at most
    /// one `iterdir` call, so a cancelled polymorphic count abandons the
    /// walk without having materialized directories it never needed.
    pub fn rglob(&self) -> RGlob {
        RGlob { stack: vec![self.clone()], pending: Vec::new() }
    }

    pub fn open_read(&self) -> PathResult<Box<dyn Read + Send>> {
        match &*self.inner {
            Inner::Local(p) => local::open_read(p),
            Inner::Ssh { registry, alias, remote_path } => registry.ssh_backend(alias)?.open_read(remote_path),
            Inner::S3 { registry, bucket, key } => registry.s3_backend(bucket)?.open_read(key),
            Inner::Archive { backend, internal_path, .. } => backend.open_read(internal_path),
        }
    }

    pub fn open_write(&self) -> PathResult<Box<dyn Write + Send>> {
        match &*self.inner {
            Inner::Local(p) => local::open_write(p),
            Inner::Ssh { registry, alias, remote_path } => registry.ssh_backend(alias)?.open_write(remote_path),
            Inner::S3 { registry, bucket, key } => registry.s3_backend(bucket)?.open_write(key),
            Inner::Archive { internal_path, .. } => Err(PathError::ReadOnly(internal_path.clone())),
        }
    }

    pub fn read_text(&self) -> PathResult<String> {
        let mut buf = String::new();
        self.open_read()?.read_to_string(&mut buf)?;
        Ok(buf)
    }

    pub fn write_text(&self, contents: &str) -> PathResult<()> {
        self.open_write()?.write_all(contents.as_bytes())?;
        Ok(())
    }

    pub fn mkdir(&self) -> PathResult<()> {
        match &*self.inner {
            Inner::Local(p) => local::mkdir(p),
            Inner::Ssh { registry, alias, remote_path } => registry.ssh_backend(alias)?.mkdir(remote_path),
            Inner::S3 { registry, bucket, key } => registry.s3_backend(bucket)?.mkdir(key),
            Inner::Archive { internal_path, .. } => Err(PathError::ReadOnly(internal_path.clone())),
        }
    }

    pub fn unlink(&self) -> PathResult<()> {
        match &*self.inner {
            Inner::Local(p) => local::unlink(p),
            Inner::Ssh { registry, alias, remote_path } => registry.ssh_backend(alias)?.unlink(remote_path),
            Inner::S3 { registry, bucket, key } => registry.s3_backend(bucket)?.unlink(key),
            Inner::Archive { internal_path, .. } => Err(PathError::ReadOnly(internal_path.clone())),
        }
    }

    pub fn rmdir(&self) -> PathResult<()> {
        match &*self.inner {
            Inner::Local(p) => local::rmdir(p),
            Inner::Ssh { registry, alias, remote_path } => registry.ssh_backend(alias)?.rmdir(remote_path),
            Inner::S3 { registry, bucket, key } => registry.s3_backend(bucket)?.rmdir(key),
            Inner::Archive { internal_path, .. } => Err(PathError::ReadOnly(internal_path.clone())),
        }
    }

    /// Same-backend atomic rename where possible; falls back to the
    /// caller issuing `copy_to` + `unlink` on [`PathError::CrossBackend`].
    pub fn rename_to(&self, to: &TfmPath) -> PathResult<()> {
        match (&*self.inner, &*to.inner) {
            (Inner::Local(from), Inner::Local(dest)) => local::rename(from, dest),
            (Inner::Ssh { registry, alias: a1, remote_path: from }, Inner::Ssh { alias: a2, remote_path: dest, .. })
                if a1 == a2 =>
            {
                registry.ssh_backend(a1)?.rename(from, dest)
            }
            (Inner::S3 { registry, bucket: b1, key: from }, Inner::S3 { bucket: b2, key: dest, .. })
                if b1 == b2 =>
            {
                registry.s3_backend(b1)?.rename(from, dest)
            }
            _ => Err(PathError::CrossBackend { from: self.to_display_string(), to: to.to_display_string() }),
        }
    }

    /// Streaming copy of a single file. Directory recursion and
    /// cross-backend fallback for `rename_to` are handled by the task
    /// executor, which walks `rglob()` itself so it can report progress
    /// and check cancellation between entries.
    pub fn copy_to(&self, to: &TfmPath) -> PathResult<u64> {
        let mut reader = self.open_read()?;
        let mut writer = to.open_write()?;
        let copied = std::io::copy(&mut reader, &mut writer)?;
        Ok(copied)
    }
}

/// Consults the registry's shared `BackendCache` before calling `fetch`,
/// and populates it afterward on a miss. `backend_id`/the canonical key
/// match exactly what `CacheCoordinator::invalidate` uses, so a copy/move
/// that invalidates a remote path's entry actually clears what got put
/// here. A registry with no cache wired in (tests) just calls `fetch`.
fn read_through_stat(path: &TfmPath, registry: &Arc<BackendRegistry>, fetch: impl FnOnce() -> PathResult<Stat>) -> PathResult<Stat> {
    let Some(cache) = registry.cache() else { return fetch() };
    let backend_id = crate::cache::backend_id(path);
    let key = path.to_display_string();
    if let Some(CacheValue::Stat(stat)) = cache.get(&backend_id, "stat", &key) {
        return Ok(stat);
    }
    let stat = fetch()?;
    cache.put(&backend_id, "stat", &key, CacheValue::Stat(stat));
    Ok(stat)
}

/// Same as `read_through_stat`, but for directory listings. `fetch`
/// returns each child's backend-local key (not a display string) paired
/// with the `Stat` the listing call already had in hand at zero extra
/// cost (S3's `ListObjectsV2`, SFTP's `readdir`); the caller turns those
/// into full `TfmPath`s and seeds the per-child `"stat"` cache entry
/// itself, keyed by the child's own `to_display_string()` so a later
/// `stat()` call on that exact path — as sorting by size or date makes
/// right after a listing — looks it up under the same key this used to
/// cache the listing itself.
fn read_through_iterdir(
    path: &TfmPath,
    registry: &Arc<BackendRegistry>,
    fetch: impl FnOnce() -> PathResult<Vec<(String, Stat)>>,
) -> PathResult<Vec<(String, Stat)>> {
    let Some(cache) = registry.cache() else { return fetch() };
    let backend_id = crate::cache::backend_id(path);
    let key = path.to_display_string();
    if let Some(CacheValue::Listing(children)) = cache.get(&backend_id, "iterdir", &key) {
        return Ok(children);
    }
    let children = fetch()?;
    cache.put(&backend_id, "iterdir", &key, CacheValue::Listing(children.clone()));
    Ok(children)
}

/// Seeds the `"stat"` cache entry for one already-known child, keyed by
/// its full display string — called after `read_through_iterdir` maps
/// raw backend keys into real `TfmPath`s, since only the caller knows
/// how to build that display string for the backend in question.
fn seed_child_stat(registry: &Arc<BackendRegistry>, child: &TfmPath, stat: Stat) {
    if let Some(cache) = registry.cache() {
        let backend_id = crate::cache::backend_id(child);
        cache.put(&backend_id, "stat", &child.to_display_string(), CacheValue::Stat(stat));
    }
}

impl PartialEq for TfmPath {
    fn eq(&self, other: &Self) -> bool {
        self.to_display_string() == other.to_display_string()
    }
}

impl Eq for TfmPath {}

impl std::hash::Hash for TfmPath {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_display_string().hash(state)
    }
}

impl std::fmt::Debug for TfmPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TfmPath({})", self.to_display_string())
    }
}

/// Depth-first, lazily-materialized walk over a subtree. One `iterdir`
/// call per directory visited, not one per whole subtree, so cancelling
/// a polymorphic count mid-walk never pays for unexplored branches.
pub struct RGlob {
    stack: Vec<TfmPath>,
    pending: Vec<TfmPath>,
}

impl Iterator for RGlob {
    type Item = PathResult<TfmPath>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(next) = self.pending.pop() {
            return Some(Ok(next));
        }
        let current = self.stack.pop()?;
        match current.iterdir() {
            Ok(children) => {
                for child in children {
                    if child.is_dir() {
                        self.stack.push(child.clone());
                    }
                    self.pending.push(child);
                }
                self.next()
            }
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn local_parent_join_name_round_trips() {
        let p = TfmPath::local("/a/b/c.txt");
        assert_eq!(p.parent().join(&p.name()).to_display_string(), p.to_display_string());
    }

    #[test]
    fn parse_recognizes_s3_scheme() {
        let registry = Arc::new(BackendRegistry::new());
        let p = TfmPath::parse("s3://my-bucket/dir/file.txt", registry);
        assert_eq!(p.scheme(), Scheme::S3);
        assert!(p.is_remote());
    }

    #[test]
    fn parse_falls_back_to_local_for_unknown_scheme() {
        let registry = Arc::new(BackendRegistry::new());
        let p = TfmPath::parse("/plain/local/path", registry);
        assert_eq!(p.scheme(), Scheme::Local);
    }

    #[test]
    fn rglob_walks_nested_directories() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/a.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("top.txt"), b"y").unwrap();

        let root = TfmPath::local(dir.path());
        let names: Vec<String> = root.rglob().filter_map(|r| r.ok()).map(|p| p.name()).collect();
        assert_eq!(names.len(), 3); // sub/, sub/a.txt, top.txt
        assert!(names.contains(&"a.txt".to_string()));
    }

    #[test]
    fn with_suffix_preserves_directory() {
        let p = TfmPath::local("/a/b.tar.gz");
        assert_eq!(p.with_suffix(".zip").to_display_string(), "/a/b.tar.zip");
    }

    #[test]
    fn read_through_stat_hits_cache_on_second_call() {
        let cache = Arc::new(crate::cache::BackendCache::new(10, std::time::Duration::from_secs(60)));
        let registry = Arc::new(BackendRegistry::with_cache(cache.clone()));
        let path = TfmPath::ssh(registry.clone(), "build-host", "/srv/app.log");

        let calls = std::cell::Cell::new(0);
        let fetch = || {
            calls.set(calls.get() + 1);
            Ok(Stat::file(42, 1_700_000_000))
        };
        let first = read_through_stat(&path, &registry, fetch).unwrap();
        let second = read_through_stat(&path, &registry, fetch).unwrap();
        assert_eq!(first.size, second.size);
        assert_eq!(calls.get(), 1, "second stat() must be served from cache, not re-fetched");
    }

    #[test]
    fn read_through_stat_skips_cache_when_registry_has_none() {
        let registry = Arc::new(BackendRegistry::new());
        let path = TfmPath::ssh(registry.clone(), "build-host", "/srv/app.log");

        let calls = std::cell::Cell::new(0);
        let fetch = || {
            calls.set(calls.get() + 1);
            Ok(Stat::file(1, 0))
        };
        read_through_stat(&path, &registry, fetch).unwrap();
        read_through_stat(&path, &registry, fetch).unwrap();
        assert_eq!(calls.get(), 2, "with no cache wired in every call must reach the backend");
    }

    #[test]
    fn read_through_iterdir_seeds_per_child_stat_entries() {
        let cache = Arc::new(crate::cache::BackendCache::new(10, std::time::Duration::from_secs(60)));
        let registry = Arc::new(BackendRegistry::with_cache(cache.clone()));
        let dir = TfmPath::ssh(registry.clone(), "build-host", "/srv/releases");
        let child_path = TfmPath::ssh(registry.clone(), "build-host", "/srv/releases/v1.tar.gz");

        let raw_children =
            read_through_iterdir(&dir, &registry, || Ok(vec![("/srv/releases/v1.tar.gz".to_string(), Stat::file(10, 0))]))
                .unwrap();
        assert_eq!(raw_children.len(), 1);
        seed_child_stat(&registry, &child_path, raw_children[0].1);

        let hit = read_through_stat(&child_path, &registry, || panic!("must be served from cache seeded by iterdir"));
        assert_eq!(hit.unwrap().size, 10);

        let backend_id = crate::cache::backend_id(&dir);
        assert!(cache.get(&backend_id, "iterdir", &dir.to_display_string()).is_some());
    }
}
