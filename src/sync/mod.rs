//! # Primitivas de Sincronización
//! src/sync/mod.rs
//!
//! Envoltorios delgados sobre `std::sync` que usan el pool de workers y el
//! logger asíncrono:
//!
//! - `Semaphore`: espera contable (permits + condvar)
//! - `BlockQueue`: cola FIFO acotada, protegida por mutex, cuyo `push` nunca
//!   bloquea y cuyo `pop` espera sobre el semáforo

pub mod block_queue;
pub mod semaphore;

pub use block_queue::BlockQueue;
pub use semaphore::Semaphore;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Toma un lock recuperándose de un mutex envenenado.
///
/// Si un worker hizo panic con el lock tomado, los datos protegidos siguen
/// siendo válidos para nuestras estructuras (contadores y colas), así que
/// seguimos en lugar de propagar el panic al reactor.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
