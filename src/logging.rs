//! Structured logging initialization.
//!
//! The core never formats log lines itself; it emits `tracing` events
//! with structured fields (`task_id`, `path`, `backend`) and this module
//! wires up to two sinks: a `--log-file` writer and an optional
//! `--remote-log-port` broadcaster. The socket server behind the
//! broadcaster is an external collaborator — only the
//! [`LogBroadcaster`] trait lives here.

use crate::error::{TfmError, TfmResult};
use serde::Serialize;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// One line of JSON the `--remote-log-port` socket server fans out to
/// connected clients, per §6's `{timestamp, source, level?, message}`.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteLogRecord {
    pub timestamp: i64,
    pub source: String,
    pub level: Option<String>,
    pub message: String,
}

/// Subscribe/publish contract for the remote log fan-out. The TCP
/// accept loop and per-client write queues are the excluded transport;
/// this trait is all the core depends on.
pub trait LogBroadcaster: Send + Sync {
    fn publish(&self, record: RemoteLogRecord);
}

/// A broadcaster that drops everything — used when `--remote-log-port`
/// was not passed.
pub struct NullBroadcaster;

impl LogBroadcaster for NullBroadcaster {
    fn publish(&self, _record: RemoteLogRecord) {}
}

/// Installed once at startup (teacher: `logging.rs`). Returns the
/// `tracing_appender` guard; dropping it flushes the non-blocking
/// writer, so the caller must keep it alive for the process lifetime.
pub fn init_logging(log_file: Option<&Path>, verbose: bool) -> TfmResult<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("tfm_core={level}")))
        .map_err(|e| TfmError::Config { message: format!("failed to build log filter: {e}") })?;

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| TfmError::Config { message: format!("failed to open log file: {e}") })?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let fmt_layer = fmt::layer().with_writer(non_blocking).with_ansi(false).json();
            tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
            Ok(Some(guard))
        }
        None => {
            let fmt_layer = fmt::layer().with_target(true).compact();
            tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingBroadcaster {
        records: Arc<Mutex<Vec<RemoteLogRecord>>>,
    }

    impl LogBroadcaster for RecordingBroadcaster {
        fn publish(&self, record: RemoteLogRecord) {
            self.records.lock().unwrap().push(record);
        }
    }

    #[test]
    fn broadcaster_trait_is_object_safe_and_records_publishes() {
        let records = Arc::new(Mutex::new(Vec::new()));
        let broadcaster: Box<dyn LogBroadcaster> = Box::new(RecordingBroadcaster { records: records.clone() });
        broadcaster.publish(RemoteLogRecord { timestamp: 0, source: "task".into(), level: Some("info".into()), message: "started".into() });
        assert_eq!(records.lock().unwrap().len(), 1);
    }

    #[test]
    fn null_broadcaster_drops_silently() {
        let broadcaster = NullBroadcaster;
        broadcaster.publish(RemoteLogRecord { timestamp: 0, source: "x".into(), level: None, message: "y".into() });
    }
}
