//! # Reactor
//! src/server/reactor.rs
//!
//! Loop de eventos de un solo thread. Es el único que toca epoll, la lista
//! de timers y el estado de los slots. Los workers solo parsean y arman
//! respuestas.
//!
//! ## Una vuelta del loop
//!
//! 1. `epoll_wait` con timeout = timeslot
//! 2. Por cada evento: accept, avisos del self-pipe, hangup, lectura o
//!    escritura
//! 3. Completions de los workers: re-armar escritura, re-armar lectura o
//!    cerrar
//! 4. Si toca, barrido de timers (la prioridad más baja)

use super::dispatch::{Dispatch, ServerContext};
use super::notify::{Notice, Notifier, ShutdownHandle};
use super::poller::{Event, Interest, Poller};
use super::slots::{SlotState, SlotTable};
use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::http::connection::send_error;
use crate::http::{ProcessOutcome, StatusCode, WriteOutcome};
use crate::metrics::MetricsCollector;
use crate::pool::ThreadPool;
use crate::timer::{TimerId, TimerList};
use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Eventos por `epoll_wait`
const MAX_EVENT_NUMBER: usize = 10000;

/// Servidor HTTP/1.1 con reactor + pool de workers
pub struct Server {
    config: Config,
    listener: TcpListener,
    poller: Poller,
    notifier: Notifier,
    pool: ThreadPool<Dispatch>,
    slots: SlotTable,
    timers: TimerList<(RawFd, u64)>,
    timer_ids: HashMap<RawFd, TimerId>,
    ctx: Arc<ServerContext>,
    stop: bool,
}

impl Server {
    /// Hace bind, crea epoll, el self-pipe y el pool
    ///
    /// # Errores
    ///
    /// `ServerError::Config` si la configuración no valida, y los errores
    /// de arranque de cada componente.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().map_err(ServerError::Config)?;

        let listener = TcpListener::bind(config.address())?;
        listener.set_nonblocking(true)?;

        let poller = Poller::new(MAX_EVENT_NUMBER)?;
        poller.add(listener.as_raw_fd(), Interest::Readable, false)?;

        let mut notifier = Notifier::new()?;
        poller.add(notifier.fd(), Interest::Readable, false)?;
        notifier.register_signals()?;

        let pool = ThreadPool::new(config.threads, config.queue_capacity)?;
        let ctx = Arc::new(ServerContext::new(
            config.doc_root.clone(),
            MetricsCollector::new(),
            notifier.waker(),
        ));

        Ok(Self {
            slots: SlotTable::new(config.max_fd),
            config,
            listener,
            poller,
            notifier,
            pool,
            timers: TimerList::new(),
            timer_ids: HashMap::new(),
            ctx,
            stop: false,
        })
    }

    /// Dirección efectiva (útil con puerto 0)
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle para detener el loop desde otro thread
    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(self.notifier.waker())
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.ctx.metrics.clone()
    }

    /// Corre el loop hasta recibir SIGTERM/SIGINT o `ShutdownHandle::shutdown`
    pub fn run(&mut self) -> Result<()> {
        let timeslot = self.config.timeslot();
        let listen_fd = self.listener.as_raw_fd();
        let notify_fd = self.notifier.fd();

        info!(
            address = %self.local_addr()?,
            workers = self.pool.thread_count(),
            queue_capacity = self.pool.capacity(),
            max_fd = self.slots.capacity(),
            "server listening"
        );
        arm_alarm(timeslot);
        let mut last_sweep = Instant::now();

        while !self.stop {
            let events = self.poller.wait(Some(timeslot))?;
            let mut sweep_due = false;

            for event in events {
                if event.fd == listen_fd {
                    self.accept_all();
                } else if event.fd == notify_fd {
                    sweep_due |= self.handle_notices();
                } else {
                    self.handle_connection_event(event);
                }
            }

            self.drain_completions();

            if !sweep_due && last_sweep.elapsed() >= timeslot {
                sweep_due = true;
            }
            if sweep_due {
                self.sweep();
                last_sweep = Instant::now();
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Acepta hasta `WouldBlock`
    fn accept_all(&mut self) {
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    return;
                }
            };
            let fd = stream.as_raw_fd();

            if self.ctx.live() >= self.config.max_connections || !self.slots.fits(fd) {
                self.ctx.metrics.record_busy();
                if let Err(e) = send_error(&stream, StatusCode::ServiceUnavailable) {
                    debug!(%peer, error = %e, "failed to send busy response");
                }
                warn!(%peer, live = self.ctx.live(), "server busy, connection rejected");
                continue;
            }

            if let Err(e) = stream.set_nonblocking(true) {
                warn!(%peer, error = %e, "failed to set socket non-blocking");
                continue;
            }

            let Some(generation) = self.slots.open(fd, stream, peer) else {
                warn!(fd, "connection slot still in use");
                continue;
            };
            if let Err(e) = self.poller.add(fd, Interest::Readable, true) {
                warn!(fd, error = %e, "failed to register connection");
                self.slots.release(fd);
                continue;
            }

            self.ctx.connection_opened();
            self.ctx.metrics.record_accept();
            let expire = Instant::now() + self.config.idle_timeout();
            let id = self.timers.add(expire, (fd, generation));
            self.timer_ids.insert(fd, id);
            debug!(fd, %peer, "connection accepted");
        }
    }

    /// Procesa los bytes del self-pipe; retorna si toca barrer timers
    fn handle_notices(&mut self) -> bool {
        let mut sweep_due = false;
        for notice in self.notifier.drain() {
            match notice {
                Notice::Sweep => {
                    sweep_due = true;
                    arm_alarm(self.config.timeslot());
                }
                Notice::Stop => {
                    info!("stop requested");
                    self.stop = true;
                }
                // Las completions se procesan después de cada vuelta
                Notice::Wake => {}
            }
        }
        sweep_due
    }

    fn handle_connection_event(&mut self, event: Event) {
        if event.is_hangup() {
            debug!(fd = event.fd, "peer hangup");
            self.close_or_defer(event.fd);
        } else if event.is_readable() {
            self.handle_read(event.fd);
        } else if event.is_writable() {
            self.handle_write(event.fd);
        }
    }

    /// Lectura no bloqueante y despacho al pool
    fn handle_read(&mut self, fd: RawFd) {
        let Some(slot) = self.slots.get(fd).cloned() else {
            return;
        };
        if slot.state() != SlotState::Reactor {
            return;
        }

        let read = slot.connection().read();
        if let Err(e) = read {
            debug!(fd, error = %e, "read failed");
            self.close_now(fd);
            return;
        }

        self.refresh_timer(fd, slot.generation());
        slot.check_out();

        let task = Dispatch::new(Arc::clone(&slot), fd, slot.generation(), Arc::clone(&self.ctx));
        if self.pool.submit(task).is_err() {
            warn!(fd, queued = self.pool.queued(), "dispatch queue full, closing connection");
            self.ctx.metrics.record_dispatch_rejection();
            slot.check_in();
            self.close_now(fd);
        }
    }

    /// Continúa el envío de la respuesta
    fn handle_write(&mut self, fd: RawFd) {
        let Some(slot) = self.slots.get(fd).cloned() else {
            return;
        };
        if slot.state() != SlotState::Reactor {
            return;
        }

        let (outcome, total) = {
            let mut conn = slot.connection();
            let total = conn.bytes_to_send();
            (conn.write(), total)
        };

        match outcome {
            WriteOutcome::Again => {
                self.refresh_timer(fd, slot.generation());
                self.rearm(fd, Interest::Writable);
            }
            WriteOutcome::KeepAlive => {
                self.ctx.metrics.record_bytes_sent(total);
                self.refresh_timer(fd, slot.generation());
                self.rearm(fd, Interest::Readable);
            }
            WriteOutcome::Close => {
                self.ctx.metrics.record_bytes_sent(total);
                self.close_now(fd);
            }
            WriteOutcome::Error => self.close_now(fd),
        }
    }

    /// Aplica lo que dejaron los workers
    fn drain_completions(&mut self) {
        for done in self.ctx.take_completions() {
            let Some(slot) = self.slots.get(done.fd).cloned() else {
                continue;
            };
            if slot.generation() != done.generation {
                debug!(fd = done.fd, "stale completion ignored");
                continue;
            }

            if !slot.check_in() {
                // Hangup o timeout mientras estaba en el worker
                if slot.state() == SlotState::ClosePending {
                    self.close_now(done.fd);
                }
                continue;
            }

            match done.outcome {
                ProcessOutcome::NeedMore => self.rearm(done.fd, Interest::Readable),
                ProcessOutcome::Respond => self.rearm(done.fd, Interest::Writable),
                ProcessOutcome::Close => self.close_now(done.fd),
            }
        }
    }

    fn rearm(&mut self, fd: RawFd, interest: Interest) {
        if let Err(e) = self.poller.modify(fd, interest) {
            warn!(fd, error = %e, "failed to re-arm connection");
            self.close_now(fd);
        }
    }

    /// Desliza el deadline de inactividad
    fn refresh_timer(&mut self, fd: RawFd, generation: u64) {
        let expire = Instant::now() + self.config.idle_timeout();
        if let Some(&id) = self.timer_ids.get(&fd) {
            if self.timers.get(id) == Some(&(fd, generation)) && self.timers.adjust(id, expire) {
                return;
            }
            // Timer de una conexión anterior en el mismo fd
            self.timers.delete(id);
        }
        let id = self.timers.add(expire, (fd, generation));
        self.timer_ids.insert(fd, id);
    }

    /// Cierra ahora si el reactor es el dueño, o marca cierre diferido
    fn close_or_defer(&mut self, fd: RawFd) {
        let Some(slot) = self.slots.get(fd).cloned() else {
            return;
        };
        match slot.state() {
            SlotState::Free => {}
            SlotState::Reactor => self.close_now(fd),
            SlotState::Worker | SlotState::ClosePending => {
                slot.defer_close();
                debug!(fd, "close deferred until worker completes");
            }
        }
    }

    fn close_now(&mut self, fd: RawFd) {
        let open = self
            .slots
            .get(fd)
            .map(|slot| slot.state() != SlotState::Free)
            .unwrap_or(false);
        if !open {
            return;
        }

        if let Err(e) = self.poller.delete(fd) {
            debug!(fd, error = %e, "epoll delete failed");
        }
        if let Some(id) = self.timer_ids.remove(&fd) {
            self.timers.delete(id);
        }
        // Contadores antes de soltar el socket: el peer ve el EOF después
        self.ctx.connection_closed();
        self.ctx.metrics.record_close();
        self.slots.release(fd);
    }

    /// Expulsa las conexiones cuyo deadline ya pasó
    fn sweep(&mut self) {
        let mut expired = Vec::new();
        self.timers.tick(Instant::now(), |_, data| expired.push(data));

        for (fd, generation) in expired {
            self.timer_ids.remove(&fd);
            let current = self.slots.get(fd).map(|slot| slot.generation());
            if current != Some(generation) {
                continue;
            }
            info!(fd, "closing idle connection");
            self.ctx.metrics.record_eviction();
            self.close_or_defer(fd);
        }

        let next_expiry_ms = self
            .timers
            .next_expiry()
            .map(|at| at.saturating_duration_since(Instant::now()).as_millis());
        debug!(
            live = self.ctx.live(),
            timers = self.timers.len(),
            next_expiry_ms = ?next_expiry_ms,
            metrics = %self.ctx.metrics.to_json(),
            "timer sweep"
        );
    }

    /// Detiene el pool y cierra todo lo abierto
    fn shutdown(&mut self) {
        disarm_alarm();
        self.pool.shutdown();

        // Los workers ya terminaron: cualquier slot vuelve al reactor
        self.ctx.take_completions();
        for fd in self.slots.open_fds() {
            self.close_now(fd);
        }
        self.timers.clear();
        self.timer_ids.clear();

        info!(metrics = %self.ctx.metrics.to_json(), "server stopped");
    }
}

fn arm_alarm(timeslot: Duration) {
    let secs = timeslot.as_secs().clamp(1, u32::MAX as u64) as libc::c_uint;
    // SAFETY: alarm(2) no tiene precondiciones
    unsafe {
        libc::alarm(secs);
    }
}

fn disarm_alarm() {
    // SAFETY: alarm(0) cancela la alarma pendiente
    unsafe {
        libc::alarm(0);
    }
}
