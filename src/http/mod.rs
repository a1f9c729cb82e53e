//! # Módulo HTTP
//! src/http/mod.rs
//!
//! Subconjunto de HTTP/1.1 suficiente para servir archivos estáticos:
//!
//! - Solo `GET`; la versión tiene que ser exactamente `HTTP/1.1`
//! - Headers reconocidos: `Connection`, `Content-Length`, `Host`
//! - Respuestas con `Content-Length`, `Content-Type: text/html` y
//!   `Connection: keep-alive|close`
//!
//! ### Formato de Request
//!
//! ```text
//! GET /index.html HTTP/1.1\r\n
//! Host: localhost\r\n
//! Connection: keep-alive\r\n
//! \r\n
//! ```

pub mod connection; // Estado por socket: buffers, mmap y writev
pub mod request; // Máquina de estados del parser
pub mod response; // Buffer de escritura de headers
pub mod status; // Códigos de estado HTTP

pub use connection::{Connection, ProcessOutcome, WriteOutcome};
pub use request::{HttpCode, Method, RequestParser};
pub use response::ResponseBuffer;
pub use status::StatusCode;
