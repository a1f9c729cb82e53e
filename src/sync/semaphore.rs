//! # Semáforo Contable
//! src/sync/semaphore.rs
//!
//! `std` no trae semáforos, así que lo armamos con `Mutex` + `Condvar`.
//! Un semáforo cerrado despierta a todos los que esperan y ya no entrega
//! permisos, aunque queden disponibles.

use super::lock;
use std::sync::{Condvar, Mutex, PoisonError};

struct SemState {
    permits: usize,
    closed: bool,
}

/// Semáforo contable thread-safe
pub struct Semaphore {
    state: Mutex<SemState>,
    cond: Condvar,
}

impl Semaphore {
    /// Crea un semáforo con `permits` permisos iniciales
    pub fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(SemState {
                permits,
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Libera un permiso y despierta a un waiter
    pub fn post(&self) {
        let mut state = lock(&self.state);
        state.permits += 1;
        self.cond.notify_one();
    }

    /// Bloquea hasta obtener un permiso.
    ///
    /// Retorna `false` si el semáforo fue cerrado.
    pub fn wait(&self) -> bool {
        let mut state = lock(&self.state);
        loop {
            if state.closed {
                return false;
            }
            if state.permits > 0 {
                state.permits -= 1;
                return true;
            }
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Cierra el semáforo y despierta a todos los waiters
    pub fn close(&self) {
        let mut state = lock(&self.state);
        state.closed = true;
        self.cond.notify_all();
    }

    /// Verifica si el semáforo fue cerrado
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}
