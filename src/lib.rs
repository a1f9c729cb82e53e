//! # Reactor HTTP
//! src/lib.rs
//!
//! Servidor HTTP/1.1 de archivos estáticos con arquitectura
//! half-sync/half-reactive: un thread reactor sobre epoll hace todo el I/O
//! no bloqueante y un pool de workers parsea los requests.
//!
//! ## Arquitectura
//!
//! El servidor está dividido en módulos especializados:
//! - `sync`: semáforo y cola bloqueante acotada
//! - `pool`: pool de workers sobre la cola
//! - `timer`: lista ordenada de deadlines para expulsar conexiones ociosas
//! - `http`: máquina de estados del request, respuesta y conexión
//! - `server`: reactor, epoll, self-pipe de señales y tabla de conexiones
//! - `metrics`: contadores del servidor
//! - `logger`: subscriber de `tracing` con archivo rotativo
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use reactor_http::config::Config;
//! use reactor_http::server::Server;
//!
//! let mut server = Server::new(Config::default()).expect("no se pudo arrancar");
//! server.run().expect("error en el loop");
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod logger;
pub mod metrics;
pub mod pool;
pub mod server;
pub mod sync;
pub mod timer;

pub use error::{Result, ServerError};
