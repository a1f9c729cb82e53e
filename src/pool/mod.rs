//! # Pool de Workers
//! src/pool/mod.rs
//!
//! N threads de larga vida que bloquean sobre una `BlockQueue` y ejecutan
//! el contrato `Task::process()` de cada item.
//!
//! ## Disciplina de la cola
//!
//! - `submit` nunca bloquea al llamador (el reactor): si la cola está llena
//!   el item se rechaza y se devuelve.
//! - Cada worker espera un permiso, saca un item bajo el mutex, suelta el
//!   lock y recién entonces llama a `process()`, así el parseo de requests
//!   nunca se serializa entre workers.
//! - El apagado es best-effort: los items en ejecución terminan, los que
//!   siguen encolados se descartan.

use crate::error::{Result, ServerError};
use crate::sync::BlockQueue;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// Trabajo que un worker sabe ejecutar
pub trait Task: Send + 'static {
    fn process(self);
}

/// Pool de workers con cola acotada
pub struct ThreadPool<T: Task> {
    /// Cola de despacho compartida por todos los workers
    queue: Arc<BlockQueue<T>>,

    /// Handles de los threads para poder hacer join al apagar
    workers: Vec<JoinHandle<()>>,

    /// Bandera de parada
    stop: Arc<AtomicBool>,
}

impl<T: Task> ThreadPool<T> {
    /// Crea el pool e inicia `thread_count` workers
    ///
    /// # Errores
    ///
    /// `ServerError::InvalidPool` si `thread_count == 0` o
    /// `queue_capacity == 0`; `ServerError::Io` si no se pudo crear un thread.
    pub fn new(thread_count: usize, queue_capacity: usize) -> Result<Self> {
        if thread_count == 0 || queue_capacity == 0 {
            return Err(ServerError::InvalidPool {
                threads: thread_count,
                capacity: queue_capacity,
            });
        }

        let mut pool = Self {
            queue: Arc::new(BlockQueue::new(queue_capacity)),
            workers: Vec::with_capacity(thread_count),
            stop: Arc::new(AtomicBool::new(false)),
        };

        for i in 0..thread_count {
            let queue = Arc::clone(&pool.queue);
            let stop = Arc::clone(&pool.stop);
            let name = format!("worker-{}", i);

            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn(move || Self::worker_loop(name, queue, stop));

            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(e) => {
                    // Los workers ya creados se apagan en Drop
                    return Err(ServerError::Io(e));
                }
            }
        }

        debug!(threads = thread_count, capacity = queue_capacity, "thread pool started");
        Ok(pool)
    }

    /// Encola un item para que lo procese algún worker
    ///
    /// Retorna `Err(item)` si la cola está llena (o el pool se está
    /// apagando). Nunca bloquea.
    pub fn submit(&self, item: T) -> std::result::Result<(), T> {
        if self.stop.load(Ordering::Acquire) {
            return Err(item);
        }
        self.queue.push(item)
    }

    /// Items esperando un worker
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Capacidad de la cola de despacho
    pub fn capacity(&self) -> usize {
        self.queue.max_capacity()
    }

    /// Número de workers
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Apaga el pool: detiene los workers y descarta lo encolado
    pub fn shutdown(&mut self) {
        if self.stop.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queue.close();

        let dropped = self.queue.drain().len();
        if dropped > 0 {
            warn!(dropped, "thread pool stopped with undispatched items");
        }

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("worker thread panicked during shutdown");
            }
        }
    }

    /// Loop principal del worker
    fn worker_loop(name: String, queue: Arc<BlockQueue<T>>, stop: Arc<AtomicBool>) {
        debug!(worker = %name, "worker started");

        while !stop.load(Ordering::Acquire) {
            // Esperar por un item; None = cola cerrada
            let Some(item) = queue.pop() else {
                break;
            };

            // Un panic en process() no debe matar al worker
            if panic::catch_unwind(AssertUnwindSafe(|| item.process())).is_err() {
                error!(worker = %name, "task panicked while processing");
            }
        }

        debug!(worker = %name, "worker stopped");
    }
}

impl<T: Task> Drop for ThreadPool<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Condvar, Mutex};
    use std::time::{Duration, Instant};

    struct Counter(Arc<AtomicUsize>);

    impl Task for Counter {
        fn process(self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Tarea que bloquea al worker hasta que el test abre la compuerta
    struct Gated {
        gate: Arc<(Mutex<bool>, Condvar)>,
        done: Arc<AtomicUsize>,
    }

    impl Task for Gated {
        fn process(self) {
            let (open, cond) = &*self.gate;
            let mut open = open.lock().unwrap();
            while !*open {
                open = cond.wait(open).unwrap();
            }
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wait_until(deadline: Duration, cond: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(matches!(
            ThreadPool::<Counter>::new(0, 10),
            Err(ServerError::InvalidPool { threads: 0, .. })
        ));
        assert!(matches!(
            ThreadPool::<Counter>::new(2, 0),
            Err(ServerError::InvalidPool { capacity: 0, .. })
        ));
    }

    #[test]
    fn test_all_submitted_items_run() {
        let pool = ThreadPool::new(4, 100).unwrap();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            assert!(pool.submit(Counter(Arc::clone(&count))).is_ok());
        }

        assert!(wait_until(Duration::from_secs(5), || count.load(Ordering::SeqCst) == 50));
        assert_eq!(pool.thread_count(), 4);
    }

    #[test]
    fn test_excess_submissions_rejected_queued_ones_complete() {
        let pool = ThreadPool::new(1, 2).unwrap();
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let done = Arc::new(AtomicUsize::new(0));
        let task = || Gated {
            gate: Arc::clone(&gate),
            done: Arc::clone(&done),
        };

        // El único worker queda ocupado con la primera tarea
        assert!(pool.submit(task()).is_ok());
        assert!(wait_until(Duration::from_secs(2), || pool.queued() == 0));

        // Dos más llenan la cola, la cuarta se rechaza
        assert!(pool.submit(task()).is_ok());
        assert!(pool.submit(task()).is_ok());
        assert!(pool.submit(task()).is_err());
        assert_eq!(pool.queued(), 2);

        {
            let (open, cond) = &*gate;
            *open.lock().unwrap() = true;
            cond.notify_all();
        }

        assert!(wait_until(Duration::from_secs(5), || done.load(Ordering::SeqCst) == 3));
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        struct Boom;
        impl Task for Boom {
            fn process(self) {
                panic!("boom");
            }
        }

        // Un pool distinto por tipo; el worker tiene que sobrevivir al panic
        let pool = ThreadPool::new(1, 4).unwrap();
        assert!(pool.submit(Boom).is_ok());
        assert!(pool.submit(Boom).is_ok());
        assert!(wait_until(Duration::from_secs(2), || pool.queued() == 0));
    }

    #[test]
    fn test_shutdown_rejects_new_work() {
        let mut pool = ThreadPool::new(2, 8).unwrap();
        pool.shutdown();

        let count = Arc::new(AtomicUsize::new(0));
        assert!(pool.submit(Counter(Arc::clone(&count))).is_err());
        assert_eq!(pool.thread_count(), 0);
    }
}
