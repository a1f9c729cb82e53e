//! # Conexión HTTP
//! src/http/connection.rs
//!
//! Estado completo de un socket aceptado: buffers, parser, respuesta en
//! curso y el archivo mapeado. El reactor hace las lecturas y escrituras no
//! bloqueantes; un worker llama a `process()` entre ambas.
//!
//! ## Ciclo de vida
//!
//! ```text
//! init() ──> read() ──> process() ──> write() ──┬─ keep-alive: reset() ─> read()
//!                ▲          │                   └─ close()
//!                └─NeedMore─┘
//! ```
//!
//! El slot de la tabla de conexiones se reutiliza: `close()` nunca libera
//! los buffers, solo el socket y el mapeo.

use super::request::{HttpCode, RequestParser};
use super::response::ResponseBuffer;
use super::StatusCode;
use memmap2::Mmap;
use std::fs::{self, File};
use std::io::{self, IoSlice, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Capacidad del buffer de lectura
pub const READ_BUFFER_SIZE: usize = 2048;

/// Bit de lectura para "otros" en el modo del archivo
const OTHERS_READ: u32 = 0o004;

/// Qué hacer con la conexión después de `process()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Request incompleto: volver a esperar lectura
    NeedMore,
    /// Respuesta lista: esperar escritura
    Respond,
    /// No se pudo armar la respuesta
    Close,
}

/// Resultado de un intento de escritura
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// El socket no acepta más bytes; reintentar con el próximo evento
    Again,
    /// Respuesta completa y la conexión se reinició para otro request
    KeepAlive,
    /// Respuesta completa sin keep-alive
    Close,
    /// Error de escritura
    Error,
}

/// Una conexión HTTP y todo su estado de request/response
#[derive(Debug)]
pub struct Connection {
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,

    /// Buffer de lectura; se reserva en el primer `init`
    read_buf: Vec<u8>,
    /// High-water del buffer de lectura
    read_idx: usize,
    parser: RequestParser,

    response: ResponseBuffer,
    status: Option<StatusCode>,
    keep_alive: bool,

    real_file: PathBuf,
    file_size: usize,
    file: Option<Mmap>,

    bytes_to_send: usize,
    bytes_have_send: usize,
}

impl Connection {
    /// Slot vacío, sin memoria reservada para buffers
    pub fn new() -> Self {
        Self {
            stream: None,
            peer: None,
            read_buf: Vec::new(),
            read_idx: 0,
            parser: RequestParser::new(READ_BUFFER_SIZE),
            response: ResponseBuffer::with_capacity(0),
            status: None,
            keep_alive: false,
            real_file: PathBuf::new(),
            file_size: 0,
            file: None,
            bytes_to_send: 0,
            bytes_have_send: 0,
        }
    }

    /// Asocia un socket recién aceptado al slot
    ///
    /// El socket tiene que estar en modo no bloqueante.
    pub fn init(&mut self, stream: TcpStream, peer: SocketAddr) {
        if self.read_buf.len() != READ_BUFFER_SIZE {
            self.read_buf = vec![0; READ_BUFFER_SIZE];
        }
        if self.response.capacity() == 0 {
            self.response = ResponseBuffer::new();
        }
        self.stream = Some(stream);
        self.peer = Some(peer);
        self.reset();
    }

    /// Deja la conexión lista para un request nuevo sin tocar el socket
    pub fn reset(&mut self) {
        self.read_idx = 0;
        self.parser.reset();
        self.response.clear();
        self.status = None;
        self.keep_alive = false;
        self.real_file.clear();
        self.file_size = 0;
        self.file = None;
        self.bytes_to_send = 0;
        self.bytes_have_send = 0;
    }

    /// Cierra el socket y libera el mapeo; el slot queda reutilizable
    pub fn close(&mut self) {
        if let Some(peer) = self.peer.take() {
            debug!(%peer, "closing connection");
        }
        self.reset();
        self.stream = None;
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Request parseado (o en curso)
    pub fn request(&self) -> &RequestParser {
        &self.parser
    }

    /// Status de la última respuesta armada
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn bytes_to_send(&self) -> usize {
        self.bytes_to_send
    }

    pub fn bytes_have_send(&self) -> usize {
        self.bytes_have_send
    }

    /// Si hay un archivo mapeado en este momento
    pub fn is_mapped(&self) -> bool {
        self.file.is_some()
    }

    /// Lee todo lo disponible hasta `WouldBlock` o hasta llenar el buffer
    ///
    /// # Errores
    ///
    /// - `UnexpectedEof` si el peer cerró (lectura de 0 bytes)
    /// - `OutOfMemory` si el buffer ya estaba lleno al entrar
    /// - cualquier otro error de `recv`
    pub fn read(&mut self) -> io::Result<usize> {
        let Some(mut stream) = self.stream.as_ref() else {
            return Err(io::ErrorKind::NotConnected.into());
        };
        if self.read_idx >= self.read_buf.len() {
            return Err(io::Error::new(io::ErrorKind::OutOfMemory, "read buffer full"));
        }

        let mut total = 0;
        while self.read_idx < self.read_buf.len() {
            match stream.read(&mut self.read_buf[self.read_idx..]) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => {
                    self.read_idx += n;
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    /// Parsea lo leído y, si el request está completo, arma la respuesta
    ///
    /// Corre en un worker. No toca el socket.
    pub fn process(&mut self, doc_root: &Path) -> ProcessOutcome {
        let mut code = self.parser.process_read(&self.read_buf[..self.read_idx]);
        if code == HttpCode::NoRequest {
            if self.read_idx < READ_BUFFER_SIZE {
                return ProcessOutcome::NeedMore;
            }
            // Buffer lleno sin request completo: no hay lugar para más
            debug!(bytes = self.read_idx, "request does not fit in read buffer");
            code = HttpCode::BadRequest;
        }
        if code == HttpCode::GetRequest {
            code = self.do_request(doc_root);
        }

        if self.process_write(code) {
            ProcessOutcome::Respond
        } else {
            self.file = None;
            ProcessOutcome::Close
        }
    }

    /// Resuelve el path pedido contra el document root y mapea el archivo
    fn do_request(&mut self, doc_root: &Path) -> HttpCode {
        self.real_file = doc_root.join(self.parser.url().trim_start_matches('/'));

        let meta = match fs::metadata(&self.real_file) {
            Ok(meta) => meta,
            Err(_) => return HttpCode::NoResource,
        };
        if meta.permissions().mode() & OTHERS_READ == 0 {
            return HttpCode::ForbiddenRequest;
        }
        if meta.is_dir() {
            return HttpCode::BadRequest;
        }

        self.file_size = meta.len() as usize;
        if self.file_size == 0 {
            return HttpCode::FileRequest;
        }

        let mapped = File::open(&self.real_file).and_then(|file| {
            // SAFETY: el mapeo es de solo lectura y vive solo mientras se
            // envía la respuesta; truncar el archivo en ese lapso no está
            // soportado.
            unsafe { Mmap::map(&file) }
        });
        match mapped {
            Ok(map) => {
                self.file = Some(map);
                HttpCode::FileRequest
            }
            Err(e) => {
                warn!(path = %self.real_file.display(), error = %e, "failed to map file");
                HttpCode::InternalError
            }
        }
    }

    /// Formatea la respuesta para `code` en el buffer de escritura
    fn process_write(&mut self, code: HttpCode) -> bool {
        let (status, keep_alive) = match code {
            HttpCode::FileRequest => (StatusCode::Ok, self.parser.keep_alive()),
            HttpCode::NoResource => (StatusCode::NotFound, self.parser.keep_alive()),
            HttpCode::ForbiddenRequest => (StatusCode::Forbidden, self.parser.keep_alive()),
            HttpCode::BadRequest => (StatusCode::BadRequest, false),
            HttpCode::InternalError | HttpCode::NoRequest | HttpCode::GetRequest => {
                (StatusCode::InternalServerError, false)
            }
        };

        self.response.clear();
        let written = if status == StatusCode::Ok {
            self.response.add_status_line(status)
                && self.response.add_headers(self.file_size, keep_alive)
        } else {
            self.file = None;
            self.file_size = 0;
            self.response.add_error(status, keep_alive)
        };
        if !written {
            return false;
        }

        self.status = Some(status);
        self.keep_alive = keep_alive;
        self.bytes_to_send = self.response.len() + self.file_size;
        self.bytes_have_send = 0;
        true
    }

    /// Escribe lo pendiente con un `writev` de dos bloques
    ///
    /// El primer bloque es el resto de los headers, el segundo el resto
    /// del archivo. Una escritura parcial deja los contadores listos para
    /// continuar en el próximo evento de escritura.
    pub fn write(&mut self) -> WriteOutcome {
        let Some(mut stream) = self.stream.as_ref() else {
            return WriteOutcome::Error;
        };

        if self.bytes_to_send == 0 {
            self.reset();
            return WriteOutcome::KeepAlive;
        }

        loop {
            let header = self.response.as_bytes();
            let body: &[u8] = self.file.as_deref().unwrap_or(&[]);

            let (head_rest, body_rest) = if self.bytes_have_send < header.len() {
                (&header[self.bytes_have_send..], body)
            } else {
                let offset = (self.bytes_have_send - header.len()).min(body.len());
                (&header[header.len()..], &body[offset..])
            };
            let slices = [IoSlice::new(head_rest), IoSlice::new(body_rest)];

            match stream.write_vectored(&slices) {
                Ok(0) => {
                    self.file = None;
                    return WriteOutcome::Error;
                }
                Ok(n) => {
                    self.bytes_have_send += n;
                    if self.bytes_have_send >= self.bytes_to_send {
                        self.file = None;
                        if self.keep_alive {
                            self.reset();
                            return WriteOutcome::KeepAlive;
                        }
                        return WriteOutcome::Close;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return WriteOutcome::Again,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(error = %e, "write failed");
                    self.file = None;
                    return WriteOutcome::Error;
                }
            }
        }
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

/// Respuesta de error sincrónica para un socket que no llega a tener slot
///
/// Best-effort: si el socket no acepta todo de una, el resto se pierde.
pub fn send_error(stream: &TcpStream, status: StatusCode) -> io::Result<()> {
    let mut response = ResponseBuffer::new();
    if !response.add_error(status, false) {
        return Err(io::Error::new(io::ErrorKind::Other, "error response does not fit"));
    }
    let mut stream = stream;
    stream.write_all(response.as_bytes())
}
