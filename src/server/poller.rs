//! # Multiplexor epoll
//! src/server/poller.rs
//!
//! Envoltorio mínimo sobre `epoll(7)`. Los sockets de conexión se registran
//! en modo one-shot: después de cada evento quedan mudos hasta que el
//! reactor los vuelve a armar con `modify`.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

/// Interés de un registro
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}

impl Interest {
    fn bits(self, oneshot: bool) -> u32 {
        let mut bits = match self {
            Interest::Readable => libc::EPOLLIN,
            Interest::Writable => libc::EPOLLOUT,
        } | libc::EPOLLRDHUP;
        if oneshot {
            bits |= libc::EPOLLONESHOT;
        }
        bits as u32
    }
}

/// Evento listo devuelto por `wait`
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub fd: RawFd,
    bits: u32,
}

impl Event {
    pub fn is_readable(&self) -> bool {
        self.bits & libc::EPOLLIN as u32 != 0
    }

    pub fn is_writable(&self) -> bool {
        self.bits & libc::EPOLLOUT as u32 != 0
    }

    /// Hangup del peer o error en el socket
    pub fn is_hangup(&self) -> bool {
        self.bits & (libc::EPOLLRDHUP | libc::EPOLLHUP | libc::EPOLLERR) as u32 != 0
    }
}

/// Instancia de epoll
#[derive(Debug)]
pub struct Poller {
    epoll: OwnedFd,
    events: Vec<libc::epoll_event>,
}

impl Poller {
    /// Crea la instancia con espacio para `max_events` eventos por `wait`
    pub fn new(max_events: usize) -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            // SAFETY: fd es válido y somos su único dueño
            epoll: unsafe { OwnedFd::from_raw_fd(fd) },
            events: vec![libc::epoll_event { events: 0, u64: 0 }; max_events.max(1)],
        })
    }

    /// Registra `fd`; `oneshot = false` solo para el listener y el self-pipe
    pub fn add(&self, fd: RawFd, interest: Interest, oneshot: bool) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, interest.bits(oneshot))
    }

    /// Re-arma un registro one-shot
    pub fn modify(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, interest.bits(true))
    }

    /// Quita `fd`; que ya no esté registrado no es un error
    pub fn delete(&self, fd: RawFd) -> io::Result<()> {
        match self.ctl(libc::EPOLL_CTL_DEL, fd, 0) {
            Err(e) if matches!(e.raw_os_error(), Some(libc::ENOENT) | Some(libc::EBADF)) => Ok(()),
            other => other,
        }
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, events: u32) -> io::Result<()> {
        let mut ev = libc::epoll_event {
            events,
            u64: fd as u64,
        };
        let ret = unsafe { libc::epoll_ctl(self.epoll.as_raw_fd(), op, fd, &mut ev) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Espera eventos hasta `timeout`
    ///
    /// Una interrupción por señal (`EINTR`) devuelve cero eventos.
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<Event>> {
        let timeout_ms = timeout
            .map(|t| t.as_millis().min(i32::MAX as u128) as i32)
            .unwrap_or(-1);

        let n = unsafe {
            libc::epoll_wait(
                self.epoll.as_raw_fd(),
                self.events.as_mut_ptr(),
                self.events.len() as i32,
                timeout_ms,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }

        Ok(self.events[..n as usize]
            .iter()
            .map(|ev| Event {
                fd: ev.u64 as RawFd,
                bits: ev.events,
            })
            .collect())
    }
}
