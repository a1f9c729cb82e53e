//! # Tabla de Conexiones
//! src/server/slots.rs
//!
//! Un slot por valor de fd, creado la primera vez que se usa ese fd y
//! reutilizado después. Cada slot sabe quién es su dueño en este momento:
//!
//! ```text
//!            open()          check_out()
//!   Free ───────────> Reactor ──────────> Worker
//!    ▲                  ▲  │                │ │
//!    │   release()      │  │  check_in()    │ │ defer_close()
//!    └──────────────────┘  └────────────────┘ ▼
//!    └───────────── release() ────────── ClosePending
//! ```
//!
//! Solo el reactor cambia el estado. Los workers leen la generación para
//! descartar trabajo de una conexión que ya no existe.

use crate::http::Connection;
use crate::sync::lock;
use std::net::{SocketAddr, TcpStream};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Dueño actual de un slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    /// Sin conexión
    Free = 0,
    /// El reactor puede leer, escribir o cerrar
    Reactor = 1,
    /// Un worker está en `process()`
    Worker = 2,
    /// Hay que cerrar apenas vuelva del worker
    ClosePending = 3,
}

impl SlotState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SlotState::Reactor,
            2 => SlotState::Worker,
            3 => SlotState::ClosePending,
            _ => SlotState::Free,
        }
    }
}

/// Una entrada de la tabla
#[derive(Debug)]
pub struct Slot {
    state: AtomicU8,
    generation: AtomicU64,
    conn: Mutex<Connection>,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(SlotState::Free as u8),
            generation: AtomicU64::new(0),
            conn: Mutex::new(Connection::new()),
        }
    }

    pub fn state(&self) -> SlotState {
        SlotState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SlotState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Cambia de generación en cada conexión nueva sobre el mismo fd
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        lock(&self.conn)
    }

    /// Reactor → Worker, antes de encolar
    pub fn check_out(&self) -> bool {
        self.transition(SlotState::Reactor, SlotState::Worker)
    }

    /// Vuelta del worker
    ///
    /// Retorna `false` si mientras tanto se pidió cerrar; en ese caso el
    /// estado queda en `ClosePending`.
    pub fn check_in(&self) -> bool {
        self.transition(SlotState::Worker, SlotState::Reactor)
    }

    /// Marca un cierre diferido si el slot está en un worker
    ///
    /// Retorna `true` si quedó diferido, `false` si el reactor es el dueño
    /// y puede cerrar ya.
    pub fn defer_close(&self) -> bool {
        match self.state() {
            SlotState::Worker => {
                self.set_state(SlotState::ClosePending);
                true
            }
            SlotState::ClosePending => true,
            SlotState::Free | SlotState::Reactor => false,
        }
    }

    fn transition(&self, from: SlotState, to: SlotState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Tabla indexada por fd
#[derive(Debug)]
pub struct SlotTable {
    slots: Vec<Option<Arc<Slot>>>,
}

impl SlotTable {
    /// Tabla para fds en `0..max_fd`
    pub fn new(max_fd: usize) -> Self {
        let mut slots = Vec::new();
        slots.resize_with(max_fd, || None);
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Si `fd` entra en la tabla
    pub fn fits(&self, fd: RawFd) -> bool {
        fd >= 0 && (fd as usize) < self.slots.len()
    }

    pub fn get(&self, fd: RawFd) -> Option<&Arc<Slot>> {
        if !self.fits(fd) {
            return None;
        }
        self.slots[fd as usize].as_ref()
    }

    /// Asocia un socket aceptado a su slot y lo entrega al reactor
    ///
    /// Retorna la generación nueva, o `None` si el fd no entra en la tabla
    /// o su slot sigue ocupado.
    pub fn open(&mut self, fd: RawFd, stream: TcpStream, peer: SocketAddr) -> Option<u64> {
        if !self.fits(fd) {
            return None;
        }
        let slot = self.slots[fd as usize].get_or_insert_with(|| Arc::new(Slot::new()));
        if slot.state() != SlotState::Free {
            return None;
        }

        slot.connection().init(stream, peer);
        let generation = slot.generation.fetch_add(1, Ordering::AcqRel) + 1;
        slot.set_state(SlotState::Reactor);
        Some(generation)
    }

    /// Cierra la conexión del slot y lo deja libre
    pub fn release(&self, fd: RawFd) {
        if let Some(slot) = self.get(fd) {
            slot.connection().close();
            slot.set_state(SlotState::Free);
        }
    }

    /// fds con conexión abierta
    pub fn open_fds(&self) -> Vec<RawFd> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(fd, slot)| match slot {
                Some(slot) if slot.state() != SlotState::Free => Some(fd as RawFd),
                _ => None,
            })
            .collect()
    }
}
