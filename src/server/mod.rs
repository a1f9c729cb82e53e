//! # Módulo del Servidor HTTP
//! src/server/mod.rs
//!
//! Servidor half-sync/half-reactive:
//! 1. Un thread reactor multiplexa el listener, el self-pipe y todas las
//!    conexiones con epoll en modo one-shot
//! 2. Las lecturas y escrituras no bloqueantes las hace el reactor
//! 3. El parseo y el armado de respuestas los hace el pool de workers
//! 4. Las conexiones ociosas se expulsan con la lista de timers

pub mod dispatch;
pub mod notify;
pub mod poller;
pub mod reactor;
pub mod slots;

// Re-exportar para facilitar el uso
pub use notify::ShutdownHandle;
pub use reactor::Server;
