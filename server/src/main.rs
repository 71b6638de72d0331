//! Funkbruecke – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet die Bruecke.

use anyhow::Result;
use funkbruecke_observability::logging_initialisieren;
use funkbruecke_server::{config::ServerConfig, Server};

#[tokio::main]
async fn main() -> Result<()> {
    let config_pfad = ServerConfig::pfad_aus_env();

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = ServerConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);
    config.pruefen()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Funkbruecke wird initialisiert"
    );

    Server::neu(config).starten().await
}
