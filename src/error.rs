//! # Errores del Servidor
//! src/error.rs
//!
//! Solo los errores fatales de arranque llegan hasta acá. Los errores de
//! protocolo y de recursos se convierten en respuestas HTTP, y los de I/O de
//! una conexión se resuelven cerrándola.

use std::io;
use thiserror::Error;

/// Errores fatales de construcción o arranque
#[derive(Debug, Error)]
pub enum ServerError {
    /// Falló una operación del sistema (bind, epoll, socketpair...)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// El pool de workers necesita threads > 0 y capacidad > 0
    #[error("invalid thread pool: threads={threads}, queue capacity={capacity}")]
    InvalidPool { threads: usize, capacity: usize },

    /// Configuración inválida
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No se pudo registrar un handler de señal
    #[error("signal registration failed for signal {signal}: {source}")]
    Signal {
        signal: i32,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ServerError>;
