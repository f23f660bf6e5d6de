//! S3 backend.
//!
//! `aws-sdk-s3` is async-only; the rest of the Path abstraction is
//! synchronous (the UI event loop and task executor are thread-based,
//! not `async`). Each [`S3Backend`] owns a small multi-thread Tokio
//! runtime and blocks on it, the same way a sync wrapper around an
//! async SDK is written elsewhere in the ecosystem.

use super::error::{PathError, PathResult};
use super::posix;
use super::stat::Stat;
use std::io::{Read, Write};
use std::time::Duration;

const MAX_RETRIES: u32 = 5;
const DIRECTORY_MARKER_SUFFIX: &str = "/";

pub struct S3Backend {
    client: aws_sdk_s3::Client,
    pub bucket: String,
    runtime: tokio::runtime::Runtime,
}

impl S3Backend {
    pub fn connect(bucket: &str) -> PathResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| PathError::Backend { backend: "s3", message: e.to_string() })?;

        let client = runtime.block_on(async {
            let config = aws_config::defaults(aws_config::BehaviorVersion::latest()).load().await;
            aws_sdk_s3::Client::new(&config)
        });

        Ok(Self { client, bucket: bucket.to_string(), runtime })
    }

    fn retry<T>(&self, mut op: impl FnMut() -> PathResult<T>) -> PathResult<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retriable() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    std::thread::sleep(Duration::from_millis(100 * 2u64.pow(attempt)));
                }
                Err(PathError::NetworkError { message, .. }) if attempt >= MAX_RETRIES => {
                    return Err(PathError::NetworkError { message, retries: attempt });
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.stat(key).is_ok()
    }

    pub fn stat(&self, key: &str) -> PathResult<Stat> {
        let bucket = self.bucket.clone();
        let key = key.trim_start_matches('/').to_string();
        self.retry(|| {
            self.runtime.block_on(async {
                if key.is_empty() || key.ends_with(DIRECTORY_MARKER_SUFFIX) {
                    return Ok(Stat::directory(s3_now()));
                }
                match self.client.head_object().bucket(&bucket).key(&key).send().await {
                    Ok(output) => {
                        let mtime = output
                            .last_modified()
                            .and_then(|t| t.secs().try_into().ok())
                            .unwrap_or_else(s3_now);
                        Ok(Stat::file(output.content_length().unwrap_or(0) as u64, mtime))
                    }
                    Err(e) => Err(classify_s3_error(&e)),
                }
            })
        })
    }

    /// Lists one directory level via `ListObjectsV2` with `Delimiter=/`.
    /// Paginates internally; returns the fully materialized child set
    /// (the lazy, abandonable `rglob` layer sits above this).
    pub fn iterdir(&self, prefix: &str) -> PathResult<Vec<String>> {
        Ok(self.iterdir_with_stat(prefix)?.into_iter().map(|(key, _)| key).collect())
    }

    /// Same listing as `iterdir`, but keeps the size/mtime each object
    /// already carries in the `ListObjectsV2` response instead of
    /// discarding it — lets the caller populate a per-child stat cache
    /// without a second round trip.
    pub fn iterdir_with_stat(&self, prefix: &str) -> PathResult<Vec<(String, Stat)>> {
        let bucket = self.bucket.clone();
        let mut prefix = prefix.trim_start_matches('/').to_string();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.retry(|| {
            self.runtime.block_on(async {
                let mut entries = Vec::new();
                let mut continuation: Option<String> = None;
                loop {
                    let mut req = self
                        .client
                        .list_objects_v2()
                        .bucket(&bucket)
                        .prefix(&prefix)
                        .delimiter("/");
                    if let Some(token) = &continuation {
                        req = req.continuation_token(token);
                    }
                    let output = req.send().await.map_err(|e| classify_s3_error(&e))?;

                    for common_prefix in output.common_prefixes() {
                        if let Some(p) = common_prefix.prefix() {
                            entries.push((format!("/{p}"), Stat::directory(s3_now())));
                        }
                    }
                    for object in output.contents() {
                        if let Some(key) = object.key() {
                            if key != prefix {
                                let mtime = object
                                    .last_modified()
                                    .and_then(|t| t.secs().try_into().ok())
                                    .unwrap_or_else(s3_now);
                                let size = object.size().unwrap_or(0) as u64;
                                entries.push((format!("/{key}"), Stat::file(size, mtime)));
                            }
                        }
                    }

                    if output.is_truncated().unwrap_or(false) {
                        continuation = output.next_continuation_token().map(String::from);
                    } else {
                        break;
                    }
                }
                Ok(entries)
            })
        })
    }

    pub fn open_read(&self, key: &str) -> PathResult<Box<dyn Read + Send>> {
        let bucket = self.bucket.clone();
        let key = key.trim_start_matches('/').to_string();
        let body = self.retry(|| {
            self.runtime.block_on(async {
                let output = self
                    .client
                    .get_object()
                    .bucket(&bucket)
                    .key(&key)
                    .send()
                    .await
                    .map_err(|e| classify_s3_error(&e))?;
                output.body.collect().await.map(|b| b.to_vec()).map_err(|e| PathError::NetworkError {
                    message: e.to_string(),
                    retries: 0,
                })
            })
        })?;
        Ok(Box::new(std::io::Cursor::new(body)))
    }

    /// S3 has no streaming append; writes buffer in memory and upload
    /// on `Drop`/`finish`, per the Path contract's `"wb"` note.
    pub fn open_write(&self, key: &str) -> PathResult<Box<dyn Write + Send>> {
        Ok(Box::new(S3WriteBuffer { backend: self.clone_handle(), key: key.to_string(), buffer: Vec::new() }))
    }

    fn clone_handle(&self) -> S3BackendHandle {
        S3BackendHandle { bucket: self.bucket.clone() }
    }

    pub fn put_object(&self, key: &str, data: &[u8]) -> PathResult<()> {
        let bucket = self.bucket.clone();
        let key = key.trim_start_matches('/').to_string();
        let data = data.to_vec();
        self.retry(|| {
            self.runtime.block_on(async {
                self.client
                    .put_object()
                    .bucket(&bucket)
                    .key(&key)
                    .body(aws_sdk_s3::primitives::ByteStream::from(data.clone()))
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| classify_s3_error(&e))
            })
        })
    }

    /// Creates the empty marker object denoting key `k/` as a directory.
    pub fn mkdir(&self, key: &str) -> PathResult<()> {
        let mut key = key.trim_start_matches('/').to_string();
        if !key.ends_with('/') {
            key.push('/');
        }
        self.put_object(&key, &[])
    }

    pub fn unlink(&self, key: &str) -> PathResult<()> {
        let bucket = self.bucket.clone();
        let key = key.trim_start_matches('/').to_string();
        self.retry(|| {
            self.runtime.block_on(async {
                self.client
                    .delete_object()
                    .bucket(&bucket)
                    .key(&key)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|e| classify_s3_error(&e))
            })
        })
    }

    /// Removes the `k/` marker object; caller must verify no children
    /// remain (S3 has no real directories, only this convention).
    pub fn rmdir(&self, key: &str) -> PathResult<()> {
        let children = self.iterdir(key)?;
        if !children.is_empty() {
            return Err(PathError::DirectoryNotEmpty(key.to_string()));
        }
        let mut marker = key.trim_start_matches('/').to_string();
        if !marker.ends_with('/') {
            marker.push('/');
        }
        self.unlink(&marker)
    }

    /// Emulated via copy+delete; never atomic, per the Path contract.
    pub fn rename(&self, from: &str, to: &str) -> PathResult<()> {
        let data = { let mut reader = self.open_read(from)?; let mut buf = Vec::new(); reader.read_to_end(&mut buf)?; buf };
        self.put_object(to, &data)?;
        self.unlink(from)
    }
}

struct S3BackendHandle {
    bucket: String,
}

struct S3WriteBuffer {
    backend: S3BackendHandle,
    key: String,
    buffer: Vec<u8>,
}

impl Write for S3WriteBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for S3WriteBuffer {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        // Best-effort: reconnect rather than hold a borrowed backend,
        // since Write::drop cannot propagate errors upward anyway.
        if let Ok(backend) = S3Backend::connect(&self.backend.bucket) {
            let _ = backend.put_object(&self.key, &self.buffer);
        }
    }
}

fn s3_now() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

fn classify_s3_error<E: std::fmt::Display>(err: &aws_sdk_s3::error::SdkError<E>) -> PathError
where
    E: std::error::Error + Send + Sync + 'static,
{
    use aws_sdk_s3::error::SdkError;
    match err {
        SdkError::ServiceError(service_err) => {
            let status = service_err.raw().status().as_u16();
            match status {
                404 => PathError::NotFound(err.to_string()),
                403 => PathError::PermissionDenied(err.to_string()),
                500..=599 => PathError::NetworkError { message: err.to_string(), retries: 0 },
                _ => PathError::Backend { backend: "s3", message: err.to_string() },
            }
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            PathError::NetworkError { message: err.to_string(), retries: 0 }
        }
        _ => PathError::Backend { backend: "s3", message: err.to_string() },
    }
}

/// Parses `s3://bucket/key` into its components. A trailing `/` denotes
/// a directory prefix and is preserved in `key`.
pub fn parse_s3_uri(uri: &str) -> PathResult<(String, String)> {
    let rest = uri
        .strip_prefix("s3://")
        .ok_or_else(|| PathError::InvalidArgument(format!("not an s3:// uri: {uri}")))?;
    let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return Err(PathError::InvalidArgument(format!("missing bucket in: {uri}")));
    }
    Ok((bucket.to_string(), posix::normalize(&format!("/{key}"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bucket_and_key() {
        let (bucket, key) = parse_s3_uri("s3://my-bucket/dir/file.txt").unwrap();
        assert_eq!(bucket, "my-bucket");
        assert_eq!(key, "/dir/file.txt");
    }

    #[test]
    fn parses_bucket_root() {
        let (bucket, key) = parse_s3_uri("s3://my-bucket").unwrap();
        assert_eq!(bucket, "my-bucket");
        assert_eq!(key, "/");
    }

    #[test]
    fn rejects_non_s3_scheme() {
        assert!(parse_s3_uri("ssh://host/path").is_err());
    }
}
