//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración del servidor con soporte para argumentos CLI y variables
//! de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./reactor_http --port 9006 -t 8 \
//!   --doc-root ./resources \
//!   --timeslot 5 \
//!   -l ./log/server.log
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! HTTP_PORT=9006 WORKER_THREADS=16 ./reactor_http
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Configuración del servidor HTTP/1.1
#[derive(Debug, Clone, Parser)]
#[command(name = "reactor_http")]
#[command(about = "Servidor HTTP/1.1 half-sync/half-reactive de archivos estáticos")]
#[command(version = "0.1.0")]
pub struct Config {
    /// Puerto en el que escucha el servidor (0 = efímero)
    #[arg(short, long, default_value = "10000", env = "HTTP_PORT")]
    pub port: u16,

    /// Host/IP en el que escucha
    #[arg(long, default_value = "0.0.0.0", env = "HTTP_HOST")]
    pub host: String,

    // === Workers ===
    /// Número de threads del pool
    #[arg(short = 't', long = "threads", default_value = "8", env = "WORKER_THREADS")]
    pub threads: usize,

    /// Capacidad máxima de la cola de despacho
    #[arg(long = "queue-capacity", default_value = "10000", env = "QUEUE_CAPACITY")]
    pub queue_capacity: usize,

    // === Conexiones ===
    /// Tamaño de la tabla de conexiones (fds en 0..max_fd)
    #[arg(long = "max-fd", default_value = "65536", env = "MAX_FD")]
    pub max_fd: usize,

    /// Máximo de conexiones vivas; por encima se responde 503
    #[arg(long = "max-connections", default_value = "10000", env = "MAX_CONNECTIONS")]
    pub max_connections: usize,

    /// Directorio raíz de los archivos servidos
    #[arg(long = "doc-root", default_value = "./resources", env = "DOC_ROOT")]
    pub doc_root: PathBuf,

    /// Intervalo de la alarma en segundos; una conexión ociosa se expulsa
    /// después de 3 intervalos
    #[arg(long = "timeslot", default_value = "5", env = "TIMESLOT_SECS")]
    pub timeslot_secs: u64,

    // === Logging ===
    /// Archivo de log (sin él, los logs van a stderr)
    #[arg(short = 'l', long = "log-file", env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Capacidad de la cola del logger asíncrono (0 = escritura sincrónica)
    #[arg(long = "log-queue", default_value = "800", env = "LOG_QUEUE")]
    pub log_queue: usize,

    /// Líneas por archivo antes de rotar
    #[arg(long = "log-split-lines", default_value = "800000", env = "LOG_SPLIT_LINES")]
    pub log_split_lines: usize,

    /// Nivel de log por defecto (RUST_LOG tiene prioridad)
    #[arg(long = "log-level", default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,
}

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Obtiene la dirección completa para bind (host:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use reactor_http::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "0.0.0.0:10000");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Intervalo de la alarma
    pub fn timeslot(&self) -> Duration {
        Duration::from_secs(self.timeslot_secs)
    }

    /// Tiempo de inactividad tras el cual se cierra una conexión
    pub fn idle_timeout(&self) -> Duration {
        self.timeslot() * 3
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<(), String> {
        if self.threads == 0 {
            return Err("Worker threads must be >= 1".to_string());
        }
        if self.queue_capacity == 0 {
            return Err("Queue capacity must be >= 1".to_string());
        }
        if self.max_fd == 0 {
            return Err("Max fd must be >= 1".to_string());
        }
        if self.max_connections == 0 {
            return Err("Max connections must be >= 1".to_string());
        }
        if self.timeslot_secs == 0 {
            return Err("Timeslot must be > 0".to_string());
        }
        if self.log_split_lines == 0 {
            return Err("Log split lines must be >= 1".to_string());
        }
        Ok(())
    }

    /// Loguea un resumen de la configuración
    pub fn print_summary(&self) {
        info!(
            address = %self.address(),
            doc_root = %self.doc_root.display(),
            "network"
        );
        info!(
            threads = self.threads,
            queue_capacity = self.queue_capacity,
            "worker pool"
        );
        info!(
            max_fd = self.max_fd,
            max_connections = self.max_connections,
            idle_timeout_secs = self.idle_timeout().as_secs(),
            "connections"
        );
        match &self.log_file {
            Some(path) => info!(
                file = %path.display(),
                queue = self.log_queue,
                split_lines = self.log_split_lines,
                "logging"
            ),
            None => info!("logging to stderr"),
        }
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            port: 10000,
            host: "0.0.0.0".to_string(),
            threads: 8,
            queue_capacity: 10000,
            max_fd: 65536,
            max_connections: 10000,
            doc_root: PathBuf::from("./resources"),
            timeslot_secs: 5,
            log_file: None,
            log_queue: 800,
            log_split_lines: 800_000,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 10000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.threads, 8);
        assert_eq!(config.queue_capacity, 10000);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_address_custom() {
        let mut config = Config::default();
        config.host = "127.0.0.1".to_string();
        config.port = 3000;
        assert_eq!(config.address(), "127.0.0.1:3000");
    }

    #[test]
    fn test_idle_timeout_is_three_timeslots() {
        let mut config = Config::default();
        config.timeslot_secs = 2;
        assert_eq!(config.timeslot(), Duration::from_secs(2));
        assert_eq!(config.idle_timeout(), Duration::from_secs(6));
    }

    #[test]
    fn test_validate_success() {
        assert!(Config::default().validate().is_ok());
    }

    // ==================== Validation ====================

    #[test]
    fn test_validate_invalid_threads() {
        let mut config = Config::default();
        config.threads = 0;
        assert!(config.validate().unwrap_err().contains("Worker threads"));
    }

    #[test]
    fn test_validate_invalid_queue_capacity() {
        let mut config = Config::default();
        config.queue_capacity = 0;
        assert!(config.validate().unwrap_err().contains("Queue capacity"));
    }

    #[test]
    fn test_validate_invalid_connection_limits() {
        let mut config = Config::default();
        config.max_fd = 0;
        assert!(config.validate().unwrap_err().contains("Max fd"));

        let mut config = Config::default();
        config.max_connections = 0;
        assert!(config.validate().unwrap_err().contains("Max connections"));
    }

    #[test]
    fn test_validate_invalid_timeslot() {
        let mut config = Config::default();
        config.timeslot_secs = 0;
        assert!(config.validate().unwrap_err().contains("Timeslot"));
    }

    #[test]
    fn test_validate_invalid_split_lines() {
        let mut config = Config::default();
        config.log_split_lines = 0;
        assert!(config.validate().unwrap_err().contains("split lines"));
    }

    // ==================== CLI ====================

    #[test]
    fn test_parse_cli_flags() {
        let config = Config::try_parse_from([
            "reactor_http",
            "-p",
            "9006",
            "-t",
            "4",
            "--doc-root",
            "/srv/www",
            "-l",
            "/tmp/server.log",
            "--log-queue",
            "0",
        ])
        .unwrap();

        assert_eq!(config.port, 9006);
        assert_eq!(config.threads, 4);
        assert_eq!(config.doc_root, PathBuf::from("/srv/www"));
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/server.log")));
        assert_eq!(config.log_queue, 0);
    }

    #[test]
    fn test_config_print_summary() {
        let mut config = Config::default();
        config.log_file = Some(PathBuf::from("/tmp/x.log"));
        // No debe hacer panic
        config.print_summary();
    }
}
