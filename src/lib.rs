//! Core of a dual-pane terminal file manager: a unified path
//! abstraction spanning local, SSH, S3, and archive storage; a
//! cancellable task framework for copy/move/delete/archive operations;
//! a layered UI input/render model; and a remote-aware cache
//! coordinator.
//!
//! This crate holds no rendering code and no CLI argument parsing
//! beyond the `Cli` struct — both are consumed by the `tfm` binary in
//! `src/main.rs`.

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod cursor_history;
pub mod error;
pub mod instrumentation;
pub mod listing;
pub mod logging;
pub mod pane;
pub mod path;
pub mod task;
pub mod ui;

pub use config::TfmConfig;
pub use error::{TfmError, TfmResult};
pub use path::TfmPath;
