//! # Despacho a Workers
//! src/server/dispatch.rs
//!
//! `Dispatch` es la unidad de trabajo del pool: una conexión con datos
//! leídos que hay que parsear. El worker nunca toca epoll; al terminar deja
//! una `Completion` en el contexto y despierta al reactor por el self-pipe.

use super::notify::Waker;
use super::slots::Slot;
use crate::http::ProcessOutcome;
use crate::metrics::MetricsCollector;
use crate::pool::Task;
use crate::sync::lock;
use std::os::unix::io::RawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};

/// Estado compartido entre el reactor y los workers
#[derive(Debug)]
pub struct ServerContext {
    pub doc_root: PathBuf,
    pub metrics: MetricsCollector,
    live: AtomicUsize,
    completions: Mutex<Vec<Completion>>,
    waker: Waker,
}

impl ServerContext {
    pub fn new(doc_root: PathBuf, metrics: MetricsCollector, waker: Waker) -> Self {
        Self {
            doc_root,
            metrics,
            live: AtomicUsize::new(0),
            completions: Mutex::new(Vec::new()),
            waker,
        }
    }

    /// Conexiones vivas
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn connection_opened(&self) {
        self.live.fetch_add(1, Ordering::AcqRel);
    }

    pub fn connection_closed(&self) {
        // Nunca baja de cero aunque se cierre dos veces
        let _ = self
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    fn complete(&self, completion: Completion) {
        lock(&self.completions).push(completion);
        self.waker.wake();
    }

    /// Toma todas las completions pendientes
    pub fn take_completions(&self) -> Vec<Completion> {
        std::mem::take(&mut *lock(&self.completions))
    }
}

/// Resultado de un `process()` para el reactor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub fd: RawFd,
    pub generation: u64,
    pub outcome: ProcessOutcome,
}

/// Trabajo encolado en el pool
pub struct Dispatch {
    slot: Arc<Slot>,
    fd: RawFd,
    generation: u64,
    ctx: Arc<ServerContext>,
}

impl Dispatch {
    pub fn new(slot: Arc<Slot>, fd: RawFd, generation: u64, ctx: Arc<ServerContext>) -> Self {
        Self {
            slot,
            fd,
            generation,
            ctx,
        }
    }
}

/// Reporta la completion aunque `process()` haga panic
struct CompletionGuard<'a> {
    ctx: &'a ServerContext,
    fd: RawFd,
    generation: u64,
    outcome: ProcessOutcome,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.ctx.complete(Completion {
            fd: self.fd,
            generation: self.generation,
            outcome: self.outcome,
        });
    }
}

impl Task for Dispatch {
    fn process(self) {
        let mut guard = CompletionGuard {
            ctx: &self.ctx,
            fd: self.fd,
            generation: self.generation,
            outcome: ProcessOutcome::Close,
        };

        if self.slot.generation() != self.generation {
            warn!(fd = self.fd, "dropping work for a recycled slot");
            return;
        }

        let mut conn = self.slot.connection();
        let outcome = conn.process(&self.ctx.doc_root);
        if outcome == ProcessOutcome::Respond {
            if let Some(status) = conn.status() {
                self.ctx.metrics.record_response(status.as_u16());

                let request = conn.request();
                debug!(
                    fd = self.fd,
                    peer = ?conn.peer(),
                    method = request.method().as_str(),
                    url = request.url(),
                    version = request.version(),
                    host = request.host().unwrap_or("-"),
                    status = status.as_u16(),
                    "request served"
                );
            }
        }
        drop(conn);

        trace!(fd = self.fd, ?outcome, "request processed");
        guard.outcome = outcome;
    }
}
