//! # Sistema de Métricas
//! src/metrics/mod.rs
//!
//! Contadores del servidor:
//! - Conexiones aceptadas, cerradas, rechazadas por ocupado y expulsadas
//!   por inactividad
//! - Requests descartados con la cola de workers llena
//! - Respuestas por código de estado y bytes enviados

pub mod collector;

pub use collector::{MetricsCollector, MetricsSnapshot};
