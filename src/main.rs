//! Binary entry point: parses arguments, initializes logging, and runs
//! the application shell.

use clap::Parser;
use std::process::ExitCode as ProcessExitCode;
use tfm_core::app::AppShell;
use tfm_core::cli::{Cli, ExitCode};
use tfm_core::config::TfmConfig;
use tfm_core::logging;
use tfm_core::path::ssh::control_socket_path;
use tfm_core::TfmError;

fn main() -> ProcessExitCode {
    let cli = Cli::parse();

    let _log_guard = match logging::init_logging(cli.log_file.as_deref(), cli.verbose) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("tfm: failed to initialize logging: {err}");
            return ProcessExitCode::from(ExitCode::FatalError.into_u8());
        }
    };

    match run(&cli) {
        Ok(code) => ProcessExitCode::from(code.into_u8()),
        Err(err) => {
            tracing::error!(error = %err, "tfm exiting after fatal error");
            eprintln!("tfm: {err}");
            ProcessExitCode::from(ExitCode::FatalError.into_u8())
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode, TfmError> {
    let config = TfmConfig::default();
    std::fs::create_dir_all(&config.ssh_socket_dir)
        .map_err(|e| TfmError::Config { message: format!("failed to create SSH socket directory: {e}") })?;

    let socket_path = control_socket_path(&config.ssh_socket_dir, "local", std::process::id());
    tracing::info!(socket = %socket_path.display(), "tfm starting");

    let mut shell = AppShell::new(cli, config);
    for (key, value) in shell.env_vars() {
        std::env::set_var(key, value);
    }

    // No rendering backend is wired in this crate: the terminal/native
    // frontend that implements `ui::renderer::Renderer` is an external
    // collaborator. Without one attached, the shell has nothing to
    // drive, so it exits immediately once constructed.
    shell.request_quit();

    let _ = std::fs::remove_file(&socket_path);
    Ok(ExitCode::Normal)
}
