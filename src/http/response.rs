//! # Construcción de Respuestas HTTP
//! src/http/response.rs
//!
//! Los headers se formatean en un buffer de escritura de tamaño fijo. El
//! body de una respuesta 200 no pasa por acá: se envía directo desde el
//! archivo mapeado como segundo bloque del `writev`.
//!
//! ## Formato
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Length: 13\r\n
//! Content-Type: text/html\r\n
//! Connection: keep-alive\r\n
//! \r\n
//! ```

use super::StatusCode;
use std::fmt;
use std::io::Write;

/// Capacidad del buffer de escritura
pub const WRITE_BUFFER_SIZE: usize = 1024;

/// Buffer de headers (y body de error) de una respuesta
#[derive(Debug, Clone)]
pub struct ResponseBuffer {
    buf: Box<[u8]>,
    len: usize,
}

impl ResponseBuffer {
    /// Crea un buffer vacío de `WRITE_BUFFER_SIZE` bytes
    pub fn new() -> Self {
        Self::with_capacity(WRITE_BUFFER_SIZE)
    }

    /// Crea un buffer vacío con capacidad arbitraria
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Agrega texto formateado al buffer
    ///
    /// Si no entra, retorna `false` y el buffer queda como estaba.
    ///
    /// # Ejemplo
    /// ```
    /// use reactor_http::http::ResponseBuffer;
    ///
    /// let mut buf = ResponseBuffer::with_capacity(8);
    /// assert!(buf.add_response(format_args!("{}", "hola")));
    /// assert!(!buf.add_response(format_args!("{}", "mundo!")));
    /// assert_eq!(buf.as_bytes(), b"hola");
    /// ```
    pub fn add_response(&mut self, args: fmt::Arguments<'_>) -> bool {
        let mut window = &mut self.buf[self.len..];
        let before = window.len();

        if window.write_fmt(args).is_err() {
            return false;
        }

        self.len += before - window.len();
        true
    }

    /// `HTTP/1.1 <código> <razón>`
    pub fn add_status_line(&mut self, status: StatusCode) -> bool {
        self.add_response(format_args!(
            "HTTP/1.1 {} {}\r\n",
            status.as_u16(),
            status.reason_phrase()
        ))
    }

    /// Headers fijos y la línea en blanco que cierra la sección
    pub fn add_headers(&mut self, content_length: usize, keep_alive: bool) -> bool {
        let connection = if keep_alive { "keep-alive" } else { "close" };
        self.add_response(format_args!(
            "Content-Length: {}\r\nContent-Type: text/html\r\nConnection: {}\r\n\r\n",
            content_length, connection
        ))
    }

    /// Body inline (solo lo usan las respuestas de error)
    pub fn add_content(&mut self, content: &str) -> bool {
        self.add_response(format_args!("{}", content))
    }

    /// Respuesta completa de error: status line, headers y body fijo
    pub fn add_error(&mut self, status: StatusCode, keep_alive: bool) -> bool {
        let body = status.error_body();
        self.add_status_line(status)
            && self.add_headers(body.len(), keep_alive)
            && self.add_content(body)
    }

    /// Bytes escritos hasta ahora
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Descarta el contenido sin liberar memoria
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl Default for ResponseBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line_and_headers() {
        let mut buf = ResponseBuffer::new();
        assert!(buf.add_status_line(StatusCode::Ok));
        assert!(buf.add_headers(42, true));

        let text = std::str::from_utf8(buf.as_bytes()).unwrap();
        assert_eq!(
            text,
            "HTTP/1.1 200 OK\r\nContent-Length: 42\r\nContent-Type: text/html\r\nConnection: keep-alive\r\n\r\n"
        );
    }

    #[test]
    fn test_error_response() {
        let mut buf = ResponseBuffer::new();
        assert!(buf.add_error(StatusCode::NotFound, false));

        let text = std::str::from_utf8(buf.as_bytes()).unwrap();
        let body = StatusCode::NotFound.error_body();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains(&format!("Content-Length: {}\r\n", body.len())));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with(body));
    }

    #[test]
    fn test_overflow_leaves_buffer_untouched() {
        let mut buf = ResponseBuffer::with_capacity(20);
        assert!(buf.add_status_line(StatusCode::Ok));
        let len = buf.len();

        assert!(!buf.add_headers(1, true));
        assert_eq!(buf.len(), len);
    }

    #[test]
    fn test_clear() {
        let mut buf = ResponseBuffer::new();
        buf.add_content("abc");
        assert!(!buf.is_empty());

        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.as_bytes(), b"");
    }
}
