//! # Logging
//! src/logger/mod.rs
//!
//! Instala el subscriber global de `tracing`. Sin archivo de log, los
//! eventos van a stderr; con archivo, pasan por un `LogSink`.
//!
//! El nivel sale de `RUST_LOG` y, si no está definida, de `--log-level`.

pub mod sink;

pub use sink::LogSink;

use crate::config::Config;
use crate::error::{Result, ServerError};
use std::thread::JoinHandle;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Mantiene vivo el logger; al soltarlo vacía la cola y hace flush
#[must_use = "dropping the guard stops the log flush thread"]
pub struct LogGuard {
    sink: Option<LogSink>,
    flusher: Option<JoinHandle<()>>,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        if let Some(handle) = self.flusher.take() {
            let _ = handle.join();
        }
    }
}

/// Inicializa el logging global según la configuración
pub fn init(config: &Config) -> Result<LogGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| ServerError::Config(format!("invalid log level: {}", e)))?;

    let (sink, flusher) = match &config.log_file {
        Some(path) => {
            let sink = LogSink::open(path, config.log_queue, config.log_split_lines)?;
            let flusher = sink.spawn_flusher()?;
            (Some(sink), flusher)
        }
        None => (None, None),
    };

    let file_layer = sink.clone().map(|sink| {
        fmt::layer()
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(sink)
    });
    let stderr_layer = sink
        .is_none()
        .then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| ServerError::Config(format!("logger already initialized: {}", e)))?;

    Ok(LogGuard { sink, flusher })
}
