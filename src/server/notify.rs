//! # Canal de Notificaciones (self-pipe)
//! src/server/notify.rs
//!
//! Un par de sockets Unix por el que llegan al reactor, como datos, las
//! señales del proceso y los avisos internos:
//!
//! | Byte         | Origen                         | Significado          |
//! |--------------|--------------------------------|----------------------|
//! | `SIGALRM`    | handler de señal               | barrido de timers    |
//! | `SIGTERM`    | handler de señal / `ShutdownHandle` | detener el loop |
//! | `SIGINT`     | handler de señal               | detener el loop      |
//! | `WAKE_CODE`  | workers                        | hay completions      |
//!
//! Los handlers solo hacen un `send` no bloqueante, que es async-signal-safe.

use crate::error::{Result, ServerError};
use signal_hook::consts::{SIGALRM, SIGINT, SIGTERM};
use signal_hook::SigId;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use tracing::{debug, warn};

/// Byte que escriben los workers al terminar `process()`
const WAKE_CODE: u8 = 0;

/// Aviso decodificado del canal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Toca barrer los timers
    Sweep,
    /// Detener el reactor
    Stop,
    /// Un worker dejó una completion
    Wake,
}

impl Notice {
    fn decode(byte: u8) -> Option<Self> {
        match byte as i32 {
            SIGALRM => Some(Notice::Sweep),
            SIGTERM | SIGINT => Some(Notice::Stop),
            code if code == WAKE_CODE as i32 => Some(Notice::Wake),
            _ => None,
        }
    }
}

/// Extremo de lectura del canal (lo posee el reactor)
pub struct Notifier {
    reader: UnixStream,
    writer: Arc<UnixStream>,
    signals: Vec<SigId>,
}

impl Notifier {
    /// Crea el par de sockets, ambos no bloqueantes
    pub fn new() -> io::Result<Self> {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;
        Ok(Self {
            reader,
            writer: Arc::new(writer),
            signals: Vec::new(),
        })
    }

    /// Instala handlers para SIGALRM, SIGTERM y SIGINT
    pub fn register_signals(&mut self) -> Result<()> {
        for signal in [SIGALRM, SIGTERM, SIGINT] {
            let fd = self.writer.as_raw_fd();
            let code = signal as u8;

            // SAFETY: el handler solo llama a send(2), que es
            // async-signal-safe, y no toca memoria compartida. El fd sigue
            // abierto mientras el handler esté registrado porque lo
            // desregistramos en Drop antes de soltar `writer`.
            let registered = unsafe {
                signal_hook::low_level::register(signal, move || {
                    libc::send(
                        fd,
                        &code as *const u8 as *const libc::c_void,
                        1,
                        libc::MSG_DONTWAIT,
                    );
                })
            };

            match registered {
                Ok(id) => self.signals.push(id),
                Err(source) => return Err(ServerError::Signal { signal, source }),
            }
        }
        debug!("signal handlers registered");
        Ok(())
    }

    /// fd a registrar en el multiplexor
    pub fn fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }

    /// Handle clonable para escribir en el canal
    pub fn waker(&self) -> Waker {
        Waker {
            writer: Arc::clone(&self.writer),
        }
    }

    /// Lee todos los bytes pendientes
    pub fn drain(&self) -> Vec<Notice> {
        let mut notices = Vec::new();
        let mut buf = [0u8; 64];
        let mut reader = &self.reader;

        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => notices.extend(buf[..n].iter().filter_map(|b| Notice::decode(*b))),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "failed to drain notify channel");
                    break;
                }
            }
        }
        notices
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        for id in self.signals.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}

/// Extremo de escritura compartido con workers y con `ShutdownHandle`
#[derive(Debug, Clone)]
pub struct Waker {
    writer: Arc<UnixStream>,
}

impl Waker {
    fn send(&self, code: u8) {
        let mut writer = &*self.writer;
        // Canal lleno: el reactor ya tiene bytes pendientes de leer
        if let Err(e) = writer.write(&[code]) {
            if e.kind() != io::ErrorKind::WouldBlock {
                warn!(error = %e, "failed to write notify channel");
            }
        }
    }

    /// Avisa que hay completions pendientes
    pub fn wake(&self) {
        self.send(WAKE_CODE);
    }

    /// Pide al reactor que se detenga
    pub fn stop(&self) {
        self.send(SIGTERM as u8);
    }
}

/// Permite detener un servidor que corre en otro thread
///
/// # Ejemplo
/// ```no_run
/// use reactor_http::config::Config;
/// use reactor_http::server::Server;
///
/// let mut server = Server::new(Config::default()).unwrap();
/// let handle = server.handle();
/// let runner = std::thread::spawn(move || server.run());
/// handle.shutdown();
/// runner.join().unwrap().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    waker: Waker,
}

impl ShutdownHandle {
    pub(crate) fn new(waker: Waker) -> Self {
        Self { waker }
    }

    pub fn shutdown(&self) {
        self.waker.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wake_and_stop_codes() {
        let notifier = Notifier::new().unwrap();
        let waker = notifier.waker();

        waker.wake();
        waker.stop();
        waker.wake();

        assert_eq!(
            notifier.drain(),
            vec![Notice::Wake, Notice::Stop, Notice::Wake]
        );
        assert!(notifier.drain().is_empty());
    }

    #[test]
    fn test_unknown_bytes_ignored() {
        let notifier = Notifier::new().unwrap();
        let waker = notifier.waker();

        waker.send(200);
        waker.send(SIGALRM as u8);

        assert_eq!(notifier.drain(), vec![Notice::Sweep]);
    }

    #[test]
    fn test_shutdown_handle_writes_stop() {
        let notifier = Notifier::new().unwrap();
        let handle = ShutdownHandle::new(notifier.waker());

        handle.clone().shutdown();
        assert_eq!(notifier.drain(), vec![Notice::Stop]);
    }

    #[test]
    fn test_full_channel_does_not_block() {
        let notifier = Notifier::new().unwrap();
        let waker = notifier.waker();

        // Mucho más de lo que entra en el buffer del socket
        for _ in 0..200_000 {
            waker.wake();
        }
        assert!(!notifier.drain().is_empty());
    }
}
