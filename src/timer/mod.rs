//! # Timers de Inactividad
//! src/timer/mod.rs
//!
//! Lista ordenada ascendente de deadlines absolutos, usada para expulsar
//! conexiones ociosas. Solo la manipula el thread del reactor, por eso no
//! tiene locks internos.

pub mod list;

pub use list::{TimerId, TimerList};
