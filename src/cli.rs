//! CLI argument surface, implemented with `clap` derive.

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "tfm", version, about = "Dual-pane terminal file manager")]
pub struct Cli {
    /// Override left pane starting directory (suppresses history restore for that pane).
    #[arg(long, value_name = "PATH")]
    pub left: Option<String>,

    /// Override right pane starting directory (suppresses history restore for that pane).
    #[arg(long, value_name = "PATH")]
    pub right: Option<String>,

    /// Enable TCP broadcast of log messages to any number of connecting clients.
    #[arg(long, value_name = "PORT")]
    pub remote_log_port: Option<u16>,

    /// Append log records to file.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Enable debug-level logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Exit codes per §6: `0` normal, `1` fatal error, `2` invalid arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Normal = 0,
    FatalError = 1,
    InvalidArguments = 2,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    pub fn into_u8(self) -> u8 {
        self as u8
    }
}

/// Shell-quotes a filename for interpolation into `TFM_*_SELECTED`,
/// handling embedded spaces and single quotes the way a POSIX shell
/// expects (`it's` -> `'it'\''s'`).
pub fn shell_quote(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }
    if value.chars().all(|c| c.is_ascii_alphanumeric() || "._-/".contains(c)) {
        return value.to_string();
    }
    let escaped = value.replace('\'', r"'\''");
    format!("'{escaped}'")
}

pub fn quote_selection(names: &[String]) -> String {
    names.iter().map(|n| shell_quote(n)).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_leaves_plain_names_bare() {
        assert_eq!(shell_quote("file.txt"), "file.txt");
    }

    #[test]
    fn shell_quote_wraps_names_with_spaces() {
        assert_eq!(shell_quote("my file.txt"), "'my file.txt'");
    }

    #[test]
    fn shell_quote_escapes_embedded_single_quotes() {
        assert_eq!(shell_quote("it's.txt"), r"'it'\''s.txt'");
    }

    #[test]
    fn quote_selection_joins_with_spaces() {
        assert_eq!(quote_selection(&["a.txt".to_string(), "b c.txt".to_string()]), "a.txt 'b c.txt'");
    }
}
