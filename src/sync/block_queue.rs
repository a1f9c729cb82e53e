//! # Cola Bloqueante Acotada
//! src/sync/block_queue.rs
//!
//! Cola FIFO thread-safe con capacidad fija. Se usa en dos lugares:
//!
//! 1. Como cola de despacho del pool de workers (items = conexiones)
//! 2. Como buffer del logger asíncrono (items = líneas ya formateadas)
//!
//! `push` nunca bloquea: si la cola está llena devuelve el item al llamador.
//! `pop` espera sobre un semáforo contable hasta que haya un item.

use super::{lock, Semaphore};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Cola acotada thread-safe
pub struct BlockQueue<T> {
    /// Items encolados
    items: Mutex<VecDeque<T>>,

    /// Un permiso por item disponible
    available: Semaphore,

    /// Capacidad máxima de la cola
    max_capacity: usize,
}

impl<T> BlockQueue<T> {
    /// Crea una nueva cola con capacidad máxima
    ///
    /// Una cola con capacidad 0 rechaza todo `push`.
    pub fn new(max_capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(max_capacity.min(4096))),
            available: Semaphore::new(0),
            max_capacity,
        }
    }

    /// Encola un item sin bloquear
    ///
    /// Retorna `Err(item)` si la cola está llena o cerrada, devolviendo el
    /// item para que el llamador decida qué hacer con él.
    pub fn push(&self, item: T) -> Result<(), T> {
        {
            let mut items = lock(&self.items);
            if self.available.is_closed() || items.len() >= self.max_capacity {
                return Err(item);
            }
            items.push_back(item);
        }
        // Notificar a un consumidor esperando
        self.available.post();
        Ok(())
    }

    /// Desencola el item más antiguo
    ///
    /// Bloquea hasta que haya un item. Retorna `None` si la cola fue cerrada.
    pub fn pop(&self) -> Option<T> {
        if !self.available.wait() {
            return None;
        }
        lock(&self.items).pop_front()
    }

    /// Cierra la cola: los `pop` pendientes retornan `None` y los `push`
    /// posteriores son rechazados. Los items que quedaron adentro se
    /// recuperan con `drain`.
    pub fn close(&self) {
        self.available.close();
    }

    /// Verifica si la cola fue cerrada
    pub fn is_closed(&self) -> bool {
        self.available.is_closed()
    }

    /// Saca todos los items que quedan en la cola
    pub fn drain(&self) -> Vec<T> {
        lock(&self.items).drain(..).collect()
    }

    /// Retorna el tamaño actual de la cola
    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    /// Verifica si la cola está vacía
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retorna la capacidad máxima
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }
}
