//! Tests de integración para el servidor HTTP
//! tests/integration_test.rs
//!
//! Cada test levanta un `Server` real en un puerto efímero, con un document
//! root temporal, y lo detiene con `ShutdownHandle` al terminar.

use reactor_http::config::Config;
use reactor_http::http::connection::READ_BUFFER_SIZE;
use reactor_http::metrics::MetricsCollector;
use reactor_http::server::{Server, ShutdownHandle};
use std::fs;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const INDEX: &[u8] = b"<html><body><h1>reactor</h1></body></html>\n";

/// Servidor corriendo en un thread de fondo
struct TestServer {
    addr: SocketAddr,
    handle: ShutdownHandle,
    metrics: MetricsCollector,
    runner: Option<JoinHandle<reactor_http::Result<()>>>,
    root: PathBuf,
}

impl TestServer {
    fn start(tweak: impl FnOnce(&mut Config)) -> Self {
        let root = make_doc_root();

        let mut config = Config::default();
        config.host = "127.0.0.1".to_string();
        config.port = 0;
        config.threads = 4;
        config.queue_capacity = 64;
        config.max_fd = 4096;
        config.doc_root = root.clone();
        tweak(&mut config);

        let mut server = Server::new(config).unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();
        let metrics = server.metrics();
        let runner = thread::spawn(move || server.run());

        Self {
            addr,
            handle,
            metrics,
            runner: Some(runner),
            root,
        }
    }

    fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        stream.set_write_timeout(Some(Duration::from_secs(10))).unwrap();
        stream
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.shutdown();
        if let Some(runner) = self.runner.take() {
            if let Ok(Err(e)) = runner.join() {
                eprintln!("server loop failed: {}", e);
            }
        }
        fs::remove_dir_all(&self.root).ok();
    }
}

fn make_doc_root() -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let root = std::env::temp_dir().join(format!("reactor-it-{}-{}", std::process::id(), nanos));
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::set_permissions(&root.join("sub"), fs::Permissions::from_mode(0o755)).unwrap();

    write_file(&root, "index.html", INDEX, 0o644);
    write_file(&root, "secret.html", b"top secret\n", 0o600);
    root
}

fn write_file(root: &Path, name: &str, content: &[u8], mode: u32) {
    let path = root.join(name);
    fs::write(&path, content).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
}

/// Respuesta parseada
#[derive(Debug)]
struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn read_some(stream: &mut TcpStream, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match stream.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Lee una respuesta completa (headers + Content-Length bytes)
fn read_response(stream: &mut TcpStream) -> Response {
    let mut raw = Vec::new();
    let mut chunk = [0u8; 8192];

    let header_end = loop {
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = read_some(stream, &mut chunk).unwrap();
        assert!(n > 0, "connection closed before headers were complete");
        raw.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8(raw[..header_end].to_vec()).unwrap();
    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap();
    let mut parts = status_line.splitn(3, ' ');
    assert_eq!(parts.next(), Some("HTTP/1.1"));
    let status: u16 = parts.next().unwrap().parse().unwrap();

    let headers: Vec<(String, String)> = lines
        .filter(|l| !l.is_empty())
        .map(|l| {
            let (n, v) = l.split_once(':').unwrap();
            (n.trim().to_string(), v.trim().to_string())
        })
        .collect();

    let length: usize = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("Content-Length"))
        .map(|(_, v)| v.parse().unwrap())
        .unwrap();

    let mut body = raw[header_end..].to_vec();
    while body.len() < length {
        let n = read_some(stream, &mut chunk).unwrap();
        assert!(n > 0, "connection closed before body was complete");
        body.extend_from_slice(&chunk[..n]);
    }
    assert_eq!(body.len(), length);

    Response {
        status,
        headers,
        body,
    }
}

fn request(stream: &mut TcpStream, raw: &str) -> Response {
    stream.write_all(raw.as_bytes()).unwrap();
    read_response(stream)
}

/// Verifica que el servidor cerró la conexión
fn assert_closed(stream: &mut TcpStream) {
    let mut buf = [0u8; 16];
    match read_some(stream, &mut buf) {
        Ok(0) => {}
        Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {}
        other => panic!("expected closed connection, got {:?}", other),
    }
}

// ==================== Archivos ====================

#[test]
fn test_get_file_roundtrip() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();

    let resp = request(
        &mut stream,
        "GET /index.html HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n",
    );

    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("Content-Length"), Some(INDEX.len().to_string().as_str()));
    assert_eq!(resp.header("Content-Type"), Some("text/html"));
    assert_eq!(resp.header("Connection"), Some("keep-alive"));
    assert_eq!(resp.body, INDEX);
}

#[test]
fn test_keep_alive_reuses_connection() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();

    for _ in 0..3 {
        let resp = request(
            &mut stream,
            "GET /index.html HTTP/1.1\r\nConnection: keep-alive\r\n\r\n",
        );
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, INDEX);
    }

    let snapshot = server.metrics.snapshot();
    assert_eq!(snapshot.accepted, 1);
    assert_eq!(snapshot.status_codes.get(&200), Some(&3));
}

#[test]
fn test_without_keep_alive_server_closes() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();

    let resp = request(&mut stream, "GET /index.html HTTP/1.1\r\n\r\n");
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("Connection"), Some("close"));
    assert_closed(&mut stream);
}

#[test]
fn test_large_file_is_sent_completely() {
    let server = TestServer::start(|_| {});
    let content: Vec<u8> = (0..4 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();
    write_file(&server.root, "big.bin", &content, 0o644);

    let mut stream = server.connect();
    stream.write_all(b"GET /big.bin HTTP/1.1\r\n\r\n").unwrap();

    // Leer despacio para forzar escrituras parciales del lado del servidor
    thread::sleep(Duration::from_millis(200));
    let resp = read_response(&mut stream);

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body.len(), content.len());
    assert!(resp.body == content);
}

#[test]
fn test_query_string_ignored() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();

    let resp = request(&mut stream, "GET /index.html?v=3 HTTP/1.1\r\n\r\n");
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, INDEX);
}

// ==================== Errores ====================

#[test]
fn test_missing_file_is_404() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();

    let resp = request(&mut stream, "GET /missing HTTP/1.1\r\n\r\n");
    assert_eq!(resp.status, 404);
    assert_eq!(
        resp.body,
        b"The requested file was not found on this server.\n"
    );
}

#[test]
fn test_wrong_version_is_400() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();

    let resp = request(&mut stream, "GET /secret HTTP/1.0\r\n\r\n");
    assert_eq!(resp.status, 400);
    assert_eq!(resp.header("Connection"), Some("close"));
    assert_closed(&mut stream);
}

#[test]
fn test_unreadable_file_is_403() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();

    let resp = request(&mut stream, "GET /secret.html HTTP/1.1\r\n\r\n");
    assert_eq!(resp.status, 403);
}

#[test]
fn test_directory_is_400() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();

    let resp = request(&mut stream, "GET /sub HTTP/1.1\r\n\r\n");
    assert_eq!(resp.status, 400);
}

#[test]
fn test_path_traversal_is_400() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();

    let resp = request(&mut stream, "GET /sub/../../etc/passwd HTTP/1.1\r\n\r\n");
    assert_eq!(resp.status, 400);
}

// ==================== Parseo incremental ====================

#[test]
fn test_request_split_across_writes() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();

    for piece in ["GET /index", ".html HTTP/1.1\r", "\nHost: x\r\n", "\r\n"] {
        stream.write_all(piece.as_bytes()).unwrap();
        thread::sleep(Duration::from_millis(50));
    }

    let resp = read_response(&mut stream);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, INDEX);
}

#[test]
fn test_request_with_body() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();

    stream
        .write_all(b"GET /index.html HTTP/1.1\r\nContent-Length: 6\r\n\r\nabc")
        .unwrap();
    thread::sleep(Duration::from_millis(50));
    stream.write_all(b"def").unwrap();

    let resp = read_response(&mut stream);
    assert_eq!(resp.status, 200);
}

#[test]
fn test_non_utf8_header_is_ignored() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();

    stream
        .write_all(b"GET /index.html HTTP/1.1\r\nUser-Agent: caf\xe9\r\n\r\n")
        .unwrap();
    let resp = read_response(&mut stream);
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, INDEX);
}

#[test]
fn test_oversized_request_is_400() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();

    // Una request line sin terminar que llena justo el buffer de lectura
    let mut raw = b"GET /".to_vec();
    raw.resize(READ_BUFFER_SIZE, b'a');
    stream.write_all(&raw).unwrap();

    let resp = read_response(&mut stream);
    assert_eq!(resp.status, 400);
    assert_eq!(resp.header("Connection"), Some("close"));
}

// ==================== Capacidad ====================

#[test]
fn test_busy_server_answers_503() {
    let server = TestServer::start(|config| config.max_connections = 1);

    // La primera conexión ocupa el único lugar
    let mut first = server.connect();
    let resp = request(
        &mut first,
        "GET /index.html HTTP/1.1\r\nConnection: keep-alive\r\n\r\n",
    );
    assert_eq!(resp.status, 200);

    let mut second = server.connect();
    let resp = read_response(&mut second);
    assert_eq!(resp.status, 503);
    assert_eq!(resp.header("Connection"), Some("close"));
    assert_eq!(resp.body, b"Server busy!\n");
    assert_eq!(server.metrics.snapshot().busy_rejections, 1);
}

// ==================== Inactividad ====================

#[test]
fn test_idle_connection_is_evicted() {
    let server = TestServer::start(|config| config.timeslot_secs = 1);
    let mut stream = server.connect();

    let start = Instant::now();
    assert_closed(&mut stream);
    let elapsed = start.elapsed();

    // Idle timeout = 3 timeslots; el barrido corre cada timeslot
    assert!(elapsed >= Duration::from_millis(2500), "evicted too early: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(8), "evicted too late: {:?}", elapsed);
    assert!(server.metrics.snapshot().idle_evictions >= 1);
}

#[test]
fn test_evicted_slot_is_reusable() {
    let server = TestServer::start(|config| {
        config.timeslot_secs = 1;
        config.max_connections = 1;
    });

    let mut idle = server.connect();
    assert_closed(&mut idle);
    assert_eq!(server.metrics.snapshot().live_connections(), 0);

    // Con max_connections = 1 esto sería un 503 si el lugar no se liberó
    let mut stream = server.connect();
    let resp = request(
        &mut stream,
        "GET /index.html HTTP/1.1\r\nConnection: keep-alive\r\n\r\n",
    );
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, INDEX);

    let snapshot = server.metrics.snapshot();
    assert_eq!(snapshot.busy_rejections, 0);
    assert_eq!(snapshot.accepted, 2);
}

#[test]
fn test_activity_postpones_eviction() {
    let server = TestServer::start(|config| config.timeslot_secs = 1);
    let mut stream = server.connect();

    // 5 requests separados por 1.5 s: 6 s en total, el doble del timeout
    for _ in 0..5 {
        let resp = request(
            &mut stream,
            "GET /index.html HTTP/1.1\r\nConnection: keep-alive\r\n\r\n",
        );
        assert_eq!(resp.status, 200);
        thread::sleep(Duration::from_millis(1500));
    }

    assert_eq!(server.metrics.snapshot().idle_evictions, 0);
}
