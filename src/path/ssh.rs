//! SSH/SFTP backend.
//!
//! Connections are pooled per `<user@host:port>` tuple by
//! [`crate::path::registry::BackendRegistry`]. Host configuration (key
//! file, port, user, proxy jump) is resolved from the invoking user's
//! `~/.ssh/config`, mirroring how an interactive `ssh <alias>` would
//! connect.

use super::error::{PathError, PathResult};
use super::posix;
use super::stat::Stat;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Resolved connection parameters for a host alias, read from
/// `~/.ssh/config`. Unknown/unlisted aliases fall back to treating the
/// alias itself as the hostname on port 22 with the current user.
#[derive(Debug, Clone)]
pub struct SshHostConfig {
    pub alias: String,
    pub hostname: String,
    pub port: u16,
    pub user: String,
    pub identity_file: Option<PathBuf>,
    pub proxy_jump: Option<String>,
}

impl SshHostConfig {
    /// Parse `~/.ssh/config` looking for a `Host` block matching `alias`.
    /// Missing fields default the way OpenSSH does.
    pub fn resolve(alias: &str) -> Self {
        let default_user = std::env::var("USER").unwrap_or_else(|_| "root".to_string());
        let mut cfg = SshHostConfig {
            alias: alias.to_string(),
            hostname: alias.to_string(),
            port: 22,
            user: default_user,
            identity_file: None,
            proxy_jump: None,
        };

        let Some(home) = dirs::home_dir() else { return cfg };
        let config_path = home.join(".ssh").join("config");
        let Ok(contents) = std::fs::read_to_string(config_path) else { return cfg };

        let mut in_block = false;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.splitn(2, char::is_whitespace);
            let Some(key) = parts.next() else { continue };
            let value = parts.next().unwrap_or("").trim();
            match key.to_ascii_lowercase().as_str() {
                "host" => in_block = value.split_whitespace().any(|pat| pat == alias),
                "hostname" if in_block => cfg.hostname = value.to_string(),
                "port" if in_block => cfg.port = value.parse().unwrap_or(22),
                "user" if in_block => cfg.user = value.to_string(),
                "identityfile" if in_block => {
                    cfg.identity_file = Some(PathBuf::from(shellexpand_tilde(value, &home)));
                }
                "proxyjump" if in_block => cfg.proxy_jump = Some(value.to_string()),
                _ => {}
            }
        }
        cfg
    }

    pub fn pool_key(&self) -> String {
        format!("{}@{}:{}", self.user, self.hostname, self.port)
    }
}

fn shellexpand_tilde(value: &str, home: &std::path::Path) -> PathBuf {
    if let Some(rest) = value.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(value)
    }
}

/// A pooled SFTP connection to one host.
pub struct SshBackend {
    pub config: SshHostConfig,
    session: Mutex<ssh2::Session>,
}

impl SshBackend {
    pub fn connect(config: SshHostConfig) -> PathResult<Self> {
        let tcp = TcpStream::connect((config.hostname.as_str(), config.port))
            .map_err(|e| PathError::NetworkError { message: e.to_string(), retries: 0 })?;
        let mut session = ssh2::Session::new()
            .map_err(|e| PathError::Backend { backend: "ssh", message: e.to_string() })?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| PathError::NetworkError { message: e.to_string(), retries: 0 })?;

        if let Some(key) = &config.identity_file {
            session
                .userauth_pubkey_file(&config.user, None, key, None)
                .map_err(|e| PathError::Backend { backend: "ssh", message: e.to_string() })?;
        } else {
            session
                .userauth_agent(&config.user)
                .map_err(|e| PathError::Backend { backend: "ssh", message: e.to_string() })?;
        }

        Ok(Self { config, session: Mutex::new(session) })
    }

    fn sftp(&self) -> PathResult<ssh2::Sftp> {
        let session = self.session.lock().unwrap();
        session.sftp().map_err(|e| PathError::Backend { backend: "ssh", message: e.to_string() })
    }

    fn to_stat(file_stat: &ssh2::FileStat) -> Stat {
        Stat {
            size: file_stat.size.unwrap_or(0),
            mtime: file_stat.mtime.unwrap_or(0) as i64,
            mode: file_stat.perm.unwrap_or(0o100644) as u16,
            is_dir: file_stat.is_dir(),
            is_file: file_stat.is_file(),
            is_symlink: file_stat.file_type().is_symlink(),
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.sftp().and_then(|s| self.stat_inner(&s, path)).is_ok()
    }

    fn stat_inner(&self, sftp: &ssh2::Sftp, path: &str) -> PathResult<Stat> {
        let file_stat = sftp.stat(std::path::Path::new(path)).map_err(|e| map_sftp_err(path, e))?;
        Ok(Self::to_stat(&file_stat))
    }

    pub fn stat(&self, path: &str) -> PathResult<Stat> {
        let sftp = self.sftp()?;
        self.stat_inner(&sftp, path)
    }

    /// Directory listing with `.` and `..` filtered out. A prior bug let
    /// these through and `rglob` recursed forever on `/`.
    pub fn iterdir(&self, path: &str) -> PathResult<Vec<String>> {
        Ok(self.iterdir_with_stat(path)?.into_iter().map(|(child, _)| child).collect())
    }

    /// Same listing as `iterdir`, but keeps the `FileStat` each entry
    /// already carries from `readdir` instead of discarding it — lets
    /// the caller populate a per-child stat cache with no extra round
    /// trip.
    pub fn iterdir_with_stat(&self, path: &str) -> PathResult<Vec<(String, Stat)>> {
        let sftp = self.sftp()?;
        let entries = sftp.readdir(std::path::Path::new(path)).map_err(|e| map_sftp_err(path, e))?;
        Ok(entries
            .into_iter()
            .filter_map(|(p, file_stat)| {
                let name = p.file_name()?.to_str()?.to_string();
                if name == "." || name == ".." {
                    None
                } else {
                    Some((posix::join(path, &name), Self::to_stat(&file_stat)))
                }
            })
            .collect())
    }

    pub fn open_read(&self, path: &str) -> PathResult<Box<dyn Read + Send>> {
        let sftp = self.sftp()?;
        let file = sftp.open(std::path::Path::new(path)).map_err(|e| map_sftp_err(path, e))?;
        Ok(Box::new(file))
    }

    pub fn open_write(&self, path: &str) -> PathResult<Box<dyn Write + Send>> {
        let sftp = self.sftp()?;
        let file = sftp.create(std::path::Path::new(path)).map_err(|e| map_sftp_err(path, e))?;
        Ok(Box::new(file))
    }

    pub fn mkdir(&self, path: &str) -> PathResult<()> {
        let sftp = self.sftp()?;
        sftp.mkdir(std::path::Path::new(path), 0o755).map_err(|e| map_sftp_err(path, e))
    }

    pub fn rename(&self, from: &str, to: &str) -> PathResult<()> {
        let sftp = self.sftp()?;
        sftp.rename(std::path::Path::new(from), std::path::Path::new(to), None)
            .map_err(|e| map_sftp_err(from, e))
    }

    pub fn unlink(&self, path: &str) -> PathResult<()> {
        let sftp = self.sftp()?;
        sftp.unlink(std::path::Path::new(path)).map_err(|e| map_sftp_err(path, e))
    }

    pub fn rmdir(&self, path: &str) -> PathResult<()> {
        let sftp = self.sftp()?;
        let mut children = sftp.readdir(std::path::Path::new(path)).map_err(|e| map_sftp_err(path, e))?;
        children.retain(|(p, _)| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
            name != "." && name != ".."
        });
        if !children.is_empty() {
            return Err(PathError::DirectoryNotEmpty(path.to_string()));
        }
        sftp.rmdir(std::path::Path::new(path)).map_err(|e| map_sftp_err(path, e))
    }
}

fn map_sftp_err(path: &str, err: ssh2::Error) -> PathError {
    use ssh2::ErrorCode;
    match err.code() {
        ErrorCode::SFTP(2) => PathError::NotFound(path.to_string()), // SSH_FX_NO_SUCH_FILE
        ErrorCode::SFTP(3) => PathError::PermissionDenied(path.to_string()), // SSH_FX_PERMISSION_DENIED
        _ => PathError::NetworkError { message: err.to_string(), retries: 0 },
    }
}

/// Path under `~/.tfm/ssh_sockets/` for the persistent control socket of
/// one host. Stays well under the ~100 byte UNIX-domain socket limit and
/// deliberately avoids `/tmp` so sandboxed/packaged installs keep working.
pub fn control_socket_path(socket_dir: &std::path::Path, host_hash: &str, pid: u32) -> PathBuf {
    socket_dir.join(format!("tfm-ssh-{host_hash}-{pid}"))
}

pub fn host_hash(host_config: &SshHostConfig) -> String {
    let digest = blake3::hash(host_config.pool_key().as_bytes());
    digest.to_hex()[..8].to_string()
}

/// Connection pool keyed by `<user@host:port>`. One [`SshBackend`] per
/// physical host, shared across every [`crate::path::TfmPath`] that
/// points at it.
#[derive(Default)]
pub struct SshConnectionPool {
    connections: Mutex<HashMap<String, std::sync::Arc<SshBackend>>>,
}

impl SshConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_connect(&self, alias: &str) -> PathResult<std::sync::Arc<SshBackend>> {
        let config = SshHostConfig::resolve(alias);
        let key = config.pool_key();
        {
            let connections = self.connections.lock().unwrap();
            if let Some(backend) = connections.get(&key) {
                return Ok(backend.clone());
            }
        }
        let backend = std::sync::Arc::new(SshBackend::connect(config)?);
        self.connections.lock().unwrap().insert(key, backend.clone());
        Ok(backend)
    }
}

pub fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_falls_back_to_alias_as_hostname() {
        // With no ~/.ssh/config match, the alias itself is used verbatim.
        let cfg = SshHostConfig {
            alias: "unknown-alias-xyz".to_string(),
            hostname: "unknown-alias-xyz".to_string(),
            port: 22,
            user: "me".to_string(),
            identity_file: None,
            proxy_jump: None,
        };
        assert_eq!(cfg.pool_key(), "me@unknown-alias-xyz:22");
    }

    #[test]
    fn host_hash_is_stable_and_short() {
        let cfg = SshHostConfig {
            alias: "box".into(),
            hostname: "box.example.com".into(),
            port: 22,
            user: "alice".into(),
            identity_file: None,
            proxy_jump: None,
        };
        let h1 = host_hash(&cfg);
        let h2 = host_hash(&cfg);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 8);
    }

    #[test]
    fn control_socket_path_stays_short() {
        let path = control_socket_path(std::path::Path::new("/root/.tfm/ssh_sockets"), "abcd1234", 4242);
        assert!(path.to_string_lossy().len() < 100);
    }
}
