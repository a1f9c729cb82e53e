//! # Parser de Requests HTTP/1.1 (máquina de estados)
//! src/http/request.rs
//!
//! El parser trabaja sobre el buffer de lectura de la conexión, que puede
//! contener un request parcial. Cada llamada a `process_read` retoma desde
//! donde quedó la anterior.
//!
//! ## Máquina principal
//!
//! ```text
//! RequestLine ──> Headers ──(Content-Length > 0)──> Body ──> listo
//!                    └────────(Content-Length = 0)────────────> listo
//! ```
//!
//! ## Máquina de líneas
//!
//! `parse_line` recorre byte a byte desde el cursor y reconoce `\r\n` o un
//! `\n` suelto como fin de línea:
//!
//! - `LineStatus::Ok`: hay una línea completa
//! - `LineStatus::Bad`: un `\r` seguido de algo que no es `\n`
//! - `LineStatus::Open`: faltan datos (incluye un `\r` al final del buffer)

use tracing::{debug, trace};

/// Métodos HTTP soportados
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Obtener un archivo
    GET,
}

impl Method {
    /// Parsea un método HTTP (sin distinguir mayúsculas)
    fn from_str(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("GET") {
            Some(Method::GET)
        } else {
            None
        }
    }

    /// Convierte el método a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
        }
    }
}

/// Estado de la máquina principal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    /// Leyendo la request line
    RequestLine,
    /// Leyendo headers
    Headers,
    /// Esperando `Content-Length` bytes de body
    Body,
}

/// Resultado de la máquina de líneas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    Ok,
    Bad,
    Open,
}

/// Resultado de procesar un request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpCode {
    /// Request incompleto: hay que seguir leyendo
    NoRequest,
    /// Request completo, falta resolverlo contra el filesystem
    GetRequest,
    /// Request malformado (o el target es un directorio)
    BadRequest,
    /// El archivo no existe
    NoResource,
    /// El archivo no es legible por "otros"
    ForbiddenRequest,
    /// Archivo listo para enviar
    FileRequest,
    /// Error interno
    InternalError,
}

/// Estado de parseo de un request
#[derive(Debug, Clone)]
pub struct RequestParser {
    /// Capacidad del buffer de lectura que parsea
    capacity: usize,

    /// Estado de la máquina principal
    check_state: CheckState,

    /// Bytes ya recorridos buscando fin de línea
    checked_idx: usize,

    /// Inicio de la línea en curso
    start_line: usize,

    /// Fin (exclusivo, sin terminador) de la última línea completa
    line_end: usize,

    method: Method,
    url: String,
    version: String,
    host: Option<String>,
    keep_alive: bool,
    content_length: usize,
}

impl RequestParser {
    /// Crea un parser para un buffer de lectura de `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            check_state: CheckState::RequestLine,
            checked_idx: 0,
            start_line: 0,
            line_end: 0,
            method: Method::GET,
            url: String::new(),
            version: String::new(),
            host: None,
            keep_alive: false,
            content_length: 0,
        }
    }

    /// Vuelve al estado de un parser recién creado
    pub fn reset(&mut self) {
        self.check_state = CheckState::RequestLine;
        self.checked_idx = 0;
        self.start_line = 0;
        self.line_end = 0;
        self.method = Method::GET;
        self.url.clear();
        self.version.clear();
        self.host = None;
        self.keep_alive = false;
        self.content_length = 0;
    }

    /// Máquina de líneas
    ///
    /// `buf` es el buffer hasta el high-water de lectura; nunca se mira
    /// más allá de `buf.len()`.
    pub fn parse_line(&mut self, buf: &[u8]) -> LineStatus {
        while self.checked_idx < buf.len() {
            let i = self.checked_idx;
            match buf[i] {
                b'\r' => {
                    if i + 1 == buf.len() {
                        // `\r` al final: puede venir el `\n` en la próxima lectura
                        return LineStatus::Open;
                    }
                    if buf[i + 1] == b'\n' {
                        self.line_end = i;
                        self.checked_idx = i + 2;
                        return LineStatus::Ok;
                    }
                    return LineStatus::Bad;
                }
                b'\n' => {
                    self.line_end = i;
                    self.checked_idx = i + 1;
                    return LineStatus::Ok;
                }
                _ => self.checked_idx += 1,
            }
        }
        LineStatus::Open
    }

    /// Máquina principal: avanza todo lo que permitan los datos de `buf`
    ///
    /// Retorna `NoRequest` si faltan datos, `GetRequest` cuando el request
    /// está completo, o `BadRequest` ante cualquier error de sintaxis.
    pub fn process_read(&mut self, buf: &[u8]) -> HttpCode {
        loop {
            if self.check_state == CheckState::Body {
                return self.parse_body(buf);
            }

            match self.parse_line(buf) {
                LineStatus::Open => return HttpCode::NoRequest,
                LineStatus::Bad => return HttpCode::BadRequest,
                LineStatus::Ok => {}
            }

            let (start, end) = (self.start_line, self.line_end);
            self.start_line = self.checked_idx;

            let line = &buf[start..end];
            trace!(line = %String::from_utf8_lossy(line), "got http line");

            // La request line tiene que ser UTF-8; los headers se decodifican
            // con pérdida porque los desconocidos se ignoran igual
            let code = match self.check_state {
                CheckState::RequestLine => match std::str::from_utf8(line) {
                    Ok(text) => self.parse_request_line(text),
                    Err(_) => HttpCode::BadRequest,
                },
                CheckState::Headers => self.parse_header(&String::from_utf8_lossy(line)),
                CheckState::Body => HttpCode::InternalError,
            };
            if code != HttpCode::NoRequest {
                return code;
            }
        }
    }

    /// Parsea la request line
    ///
    /// Formato: `GET /path HTTP/1.1`
    fn parse_request_line(&mut self, line: &str) -> HttpCode {
        let parts: Vec<&str> = line.split_ascii_whitespace().collect();

        // Debe tener exactamente 3 partes: METHOD TARGET VERSION
        if parts.len() != 3 {
            return HttpCode::BadRequest;
        }

        let Some(method) = Method::from_str(parts[0]) else {
            debug!(method = parts[0], "unsupported method");
            return HttpCode::BadRequest;
        };

        if parts[2] != "HTTP/1.1" {
            debug!(version = parts[2], "unsupported http version");
            return HttpCode::BadRequest;
        }

        let Some(path) = Self::parse_target(parts[1]) else {
            return HttpCode::BadRequest;
        };

        self.method = method;
        self.url = path.to_string();
        self.version = parts[2].to_string();
        self.check_state = CheckState::Headers;
        HttpCode::NoRequest
    }

    /// Reduce el target a un path de archivo
    ///
    /// `http://host:port/a/b?x=1` → `/a/b`. Rechaza targets sin `/` inicial
    /// y cualquier segmento `..`.
    fn parse_target(target: &str) -> Option<&str> {
        let mut path = target;

        if path
            .get(..7)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("http://"))
        {
            let rest = &path[7..];
            path = &rest[rest.find('/')?..];
        }

        if !path.starts_with('/') {
            return None;
        }

        // El query string no participa en la resolución del archivo
        if let Some(query_start) = path.find('?') {
            path = &path[..query_start];
        }

        if path.split('/').any(|segment| segment == "..") {
            return None;
        }

        Some(path)
    }

    /// Parsea un header; la línea vacía termina la sección
    fn parse_header(&mut self, line: &str) -> HttpCode {
        if line.is_empty() {
            if self.content_length == 0 {
                return HttpCode::GetRequest;
            }
            // El body tiene que entrar en lo que queda del buffer
            if self.content_length > self.capacity.saturating_sub(self.checked_idx) {
                debug!(content_length = self.content_length, "request body exceeds read buffer");
                return HttpCode::BadRequest;
            }
            self.check_state = CheckState::Body;
            return HttpCode::NoRequest;
        }

        let Some((name, value)) = line.split_once(':') else {
            debug!(header = line, "ignoring malformed header");
            return HttpCode::NoRequest;
        };
        let name = name.trim();
        let value = value.trim();

        if name.eq_ignore_ascii_case("Connection") {
            self.keep_alive = value.eq_ignore_ascii_case("keep-alive");
        } else if name.eq_ignore_ascii_case("Content-Length") {
            match value.parse::<usize>() {
                Ok(len) => self.content_length = len,
                Err(_) => return HttpCode::BadRequest,
            }
        } else if name.eq_ignore_ascii_case("Host") {
            self.host = Some(value.to_string());
        } else {
            debug!(header = name, "unknown header");
        }

        HttpCode::NoRequest
    }

    /// Consume exactamente `Content-Length` bytes de body
    fn parse_body(&mut self, buf: &[u8]) -> HttpCode {
        let available = buf.len().saturating_sub(self.checked_idx);
        if available < self.content_length {
            return HttpCode::NoRequest;
        }
        self.checked_idx += self.content_length;
        self.start_line = self.checked_idx;
        HttpCode::GetRequest
    }

    // === Métodos públicos para acceder a los campos ===

    pub fn check_state(&self) -> CheckState {
        self.check_state
    }

    /// Bytes del buffer ya recorridos
    pub fn checked_idx(&self) -> usize {
        self.checked_idx
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Path del archivo pedido (sin esquema, host ni query)
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Si el cliente pidió `Connection: keep-alive`
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn content_length(&self) -> usize {
        self.content_length
    }
}
