//! Configuration structures and defaults.
//!
//! File loading (parsing `~/.tfm/config.toml`, watching for reload) is
//! explicitly out of scope; this module only specifies the struct and
//! its defaults, the way a caller that already parsed the file would
//! hand it to [`crate::task::coordinator::TaskCoordinator`] and
//! [`crate::pane::PaneManager`].

use crate::listing::SortMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortModeConfig {
    Name,
    Size,
    Date,
    Ext,
}

impl From<SortModeConfig> for SortMode {
    fn from(value: SortModeConfig) -> Self {
        match value {
            SortModeConfig::Name => SortMode::Name,
            SortModeConfig::Size => SortMode::Size,
            SortModeConfig::Date => SortMode::Date,
            SortModeConfig::Ext => SortMode::Ext,
        }
    }
}

impl Default for SortModeConfig {
    fn default() -> Self {
        Self::Name
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TfmConfig {
    pub confirm_copy: bool,
    pub confirm_move: bool,
    pub confirm_delete: bool,
    pub confirm_archive_create: bool,
    pub confirm_archive_extract: bool,
    pub default_sort_mode: SortModeConfig,
    pub show_hidden_default: bool,
    pub ssh_socket_dir: PathBuf,
    pub state_db_path: PathBuf,
    pub progress_interval_ms: u64,
    pub cancel_check_chunk_bytes: u64,
}

impl Default for TfmConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            confirm_copy: true,
            confirm_move: true,
            confirm_delete: true,
            confirm_archive_create: true,
            confirm_archive_extract: true,
            default_sort_mode: SortModeConfig::default(),
            show_hidden_default: false,
            ssh_socket_dir: home.join(".tfm").join("ssh_sockets"),
            state_db_path: home.join(".tfm").join("state.db"),
            progress_interval_ms: 100, // ~10 Hz
            cancel_check_chunk_bytes: 1024 * 1024,
        }
    }
}

impl TfmConfig {
    /// Whether the `CONFIRMING` state is entered for `kind`, per §4.6.
    pub fn confirms(&self, kind: crate::task::TaskKind) -> bool {
        match kind {
            crate::task::TaskKind::Copy => self.confirm_copy,
            crate::task::TaskKind::Move => self.confirm_move,
            crate::task::TaskKind::Delete => self.confirm_delete,
            crate::task::TaskKind::ArchiveCreate => self.confirm_archive_create,
            crate::task::TaskKind::ArchiveExtract => self.confirm_archive_extract,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_confirm_every_operation_kind() {
        let config = TfmConfig::default();
        assert!(config.confirms(crate::task::TaskKind::Copy));
        assert!(config.confirms(crate::task::TaskKind::Delete));
    }

    #[test]
    fn default_progress_interval_is_ten_hertz() {
        let config = TfmConfig::default();
        assert_eq!(config.progress_interval_ms, 100);
    }

    #[test]
    fn default_cancel_chunk_is_one_mebibyte() {
        let config = TfmConfig::default();
        assert_eq!(config.cancel_check_chunk_bytes, 1024 * 1024);
    }
}
