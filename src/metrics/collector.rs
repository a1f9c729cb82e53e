//! # Collector de Métricas
//! src/metrics/collector.rs
//!
//! Recolecta contadores del servidor en tiempo real. Lo comparten el
//! reactor (conexiones, bytes, expulsiones) y los workers (status de cada
//! respuesta armada).

use crate::sync::lock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Collector de métricas thread-safe
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsData>>,
    start_time: Instant,
}

/// Datos internos de métricas
#[derive(Debug, Default)]
struct MetricsData {
    /// Conexiones aceptadas y asociadas a un slot
    accepted: u64,

    /// Conexiones rechazadas con 503 (tabla llena)
    busy_rejections: u64,

    /// Conexiones cerradas por inactividad
    idle_evictions: u64,

    /// Conexiones cerradas por cualquier motivo
    closed: u64,

    /// Requests descartados porque la cola de workers estaba llena
    dispatch_rejections: u64,

    /// Respuestas por código de estado
    status_codes: BTreeMap<u16, u64>,

    /// Bytes de respuesta enviados por completo
    bytes_sent: u64,
}

impl MetricsCollector {
    /// Crea un nuevo collector de métricas
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsData::default())),
            start_time: Instant::now(),
        }
    }

    pub fn record_accept(&self) {
        lock(&self.inner).accepted += 1;
    }

    pub fn record_busy(&self) {
        lock(&self.inner).busy_rejections += 1;
    }

    pub fn record_eviction(&self) {
        lock(&self.inner).idle_evictions += 1;
    }

    pub fn record_close(&self) {
        lock(&self.inner).closed += 1;
    }

    pub fn record_dispatch_rejection(&self) {
        lock(&self.inner).dispatch_rejections += 1;
    }

    /// Registra una respuesta armada por un worker
    pub fn record_response(&self, status_code: u16) {
        *lock(&self.inner).status_codes.entry(status_code).or_insert(0) += 1;
    }

    /// Registra una respuesta que terminó de enviarse
    pub fn record_bytes_sent(&self, bytes: usize) {
        lock(&self.inner).bytes_sent += bytes as u64;
    }

    /// Obtiene un snapshot de las métricas
    pub fn snapshot(&self) -> MetricsSnapshot {
        let data = lock(&self.inner);
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            accepted: data.accepted,
            busy_rejections: data.busy_rejections,
            idle_evictions: data.idle_evictions,
            closed: data.closed,
            dispatch_rejections: data.dispatch_rejections,
            responses: data.status_codes.values().sum(),
            status_codes: data.status_codes.clone(),
            bytes_sent: data.bytes_sent,
        }
    }

    /// Snapshot serializado como JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot de métricas (para uso externo)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub accepted: u64,
    pub busy_rejections: u64,
    pub idle_evictions: u64,
    pub closed: u64,
    pub dispatch_rejections: u64,
    pub responses: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub bytes_sent: u64,
}

impl MetricsSnapshot {
    /// Conexiones abiertas según los contadores
    pub fn live_connections(&self) -> u64 {
        self.accepted.saturating_sub(self.closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_collector() {
        let collector = MetricsCollector::new();

        collector.record_accept();
        collector.record_accept();
        collector.record_close();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.accepted, 2);
        assert_eq!(snapshot.closed, 1);
        assert_eq!(snapshot.live_connections(), 1);
    }

    #[test]
    fn test_multiple_status_codes() {
        let collector = MetricsCollector::new();

        collector.record_response(200);
        collector.record_response(200);
        collector.record_response(404);
        collector.record_response(500);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.responses, 4);
        assert_eq!(snapshot.status_codes.get(&200), Some(&2));
        assert_eq!(snapshot.status_codes.get(&404), Some(&1));
        assert_eq!(snapshot.status_codes.get(&403), None);
    }

    #[test]
    fn test_rejections_and_evictions() {
        let collector = MetricsCollector::new();

        collector.record_busy();
        collector.record_dispatch_rejection();
        collector.record_dispatch_rejection();
        collector.record_eviction();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.busy_rejections, 1);
        assert_eq!(snapshot.dispatch_rejections, 2);
        assert_eq!(snapshot.idle_evictions, 1);
    }

    #[test]
    fn test_bytes_sent() {
        let collector = MetricsCollector::new();
        collector.record_bytes_sent(100);
        collector.record_bytes_sent(23);
        assert_eq!(collector.snapshot().bytes_sent, 123);
    }

    #[test]
    fn test_concurrent_recording() {
        let collector = MetricsCollector::new();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let collector = collector.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        collector.record_response(200);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(collector.snapshot().status_codes.get(&200), Some(&1000));
    }

    #[test]
    fn test_json_format() {
        let collector = MetricsCollector::new();
        collector.record_response(404);

        let json: serde_json::Value = serde_json::from_str(&collector.to_json()).unwrap();
        assert_eq!(json["responses"], 1);
        assert_eq!(json["status_codes"]["404"], 1);
        assert!(json["uptime_secs"].is_u64());
    }
}
