//! # Reactor HTTP - Entry Point
//! src/main.rs
//!
//! Punto de entrada del servidor HTTP/1.1.

use anyhow::Context;
use reactor_http::config::Config;
use reactor_http::logger;
use reactor_http::server::Server;

fn main() -> anyhow::Result<()> {
    // Crear configuración (CLI + variables de entorno)
    let config = Config::new();
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    let _log_guard = logger::init(&config)?;
    config.print_summary();

    // Crear el servidor
    let mut server = Server::new(config).context("failed to start server")?;

    // Iniciar el servidor (esto bloqueará el thread hasta SIGTERM/SIGINT)
    server.run()?;
    Ok(())
}
