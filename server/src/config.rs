//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass die Bruecke ohne Konfigurationsdatei
//! lauffaehig ist.

use funkbruecke_observability::{log_format_gueltig, log_level_gueltig};
use funkbruecke_voice::{ManagerKonfiguration, WhisperOptionen};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Umgebungsvariable mit dem Pfad der Konfigurationsdatei
pub const ENV_CONFIG: &str = "FUNKBRUECKE_CONFIG";

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP-Einstellungen (Routen-Feed, Status, WebSocket)
    pub http: HttpEinstellungen,
    /// Verbindung zum Voice-Server
    pub mumble: MumbleEinstellungen,
    /// Verhalten der Bruecke
    pub bridge: BridgeEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// HTTP-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpEinstellungen {
    pub bind_adresse: String,
    pub port: u16,
    /// CORS-Origins (leer = alle erlaubt, nur fuer Entwicklung)
    pub cors_origins: Vec<String>,
}

impl Default for HttpEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 8095,
            cors_origins: vec![],
        }
    }
}

/// Verbindung zum Voice-Server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MumbleEinstellungen {
    pub host: String,
    pub port: u16,
    /// Server-Passwort (leer = keins)
    pub passwort: Option<String>,
    /// Zertifikat des Voice-Servers pruefen (selbstsignierte Zertifikate: false)
    pub tls_pruefen: bool,
    /// Wird jedem Anzeigenamen vorangestellt
    pub name_praefix: String,
    /// Maximale Wartezeit auf die Bereitschaft nach dem Verbinden
    pub bereit_timeout_sek: u64,
    pub ping_intervall_sek: u64,
}

impl Default for MumbleEinstellungen {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 64738,
            passwort: None,
            tls_pruefen: false,
            name_praefix: "[CAD] ".into(),
            bereit_timeout_sek: 15,
            ping_intervall_sek: 15,
        }
    }
}

/// Verhalten der Bruecke
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeEinstellungen {
    /// Ohne Whisper-Ziel normal im Root-Kanal sprechen
    pub fallback_normal_talk: bool,
    /// Opus-Bitrate in kbit/s
    pub bitrate_kbps: u32,
    /// Mindestabstand der Diagnose-Zeilen pro Dispatcher
    pub diagnose_intervall_sek: u64,
    /// Whisper auch an verlinkte Kanaele
    pub whisper_links: bool,
    /// Whisper auch an Unterkanaele
    pub whisper_unterkanaele: bool,
}

impl Default for BridgeEinstellungen {
    fn default() -> Self {
        Self {
            fallback_normal_talk: true,
            bitrate_kbps: 40,
            diagnose_intervall_sek: 15,
            whisper_links: false,
            whisper_unterkanaele: false,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level oder Filter-Ausdruck (`info`, `funkbruecke_voice=debug`)
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Pfad aus `FUNKBRUECKE_CONFIG`, sonst `config.toml`
    pub fn pfad_aus_env() -> String {
        std::env::var(ENV_CONFIG).unwrap_or_else(|_| "config.toml".into())
    }

    /// Prueft Wertebereiche, die serde nicht abdeckt
    pub fn pruefen(&self) -> anyhow::Result<()> {
        if !(6..=510).contains(&self.bridge.bitrate_kbps) {
            anyhow::bail!(
                "bridge.bitrate_kbps muss zwischen 6 und 510 liegen, war {}",
                self.bridge.bitrate_kbps
            );
        }
        if self.mumble.bereit_timeout_sek == 0 {
            anyhow::bail!("mumble.bereit_timeout_sek muss groesser 0 sein");
        }
        if self.mumble.ping_intervall_sek == 0 {
            anyhow::bail!("mumble.ping_intervall_sek muss groesser 0 sein");
        }
        if self.mumble.host.trim().is_empty() {
            anyhow::bail!("mumble.host darf nicht leer sein");
        }
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!("logging.format muss 'text' oder 'json' sein");
        }
        // Filter-Ausdruecke mit '=' prueft erst der EnvFilter
        if !log_level_gueltig(&self.logging.level) && !self.logging.level.contains('=') {
            tracing::warn!(level = %self.logging.level, "Unbekanntes Log-Level, verwende info");
        }
        Ok(())
    }

    /// Gibt die Bind-Adresse fuer den HTTP-Server zurueck
    pub fn http_bind_adresse(&self) -> String {
        format!("{}:{}", self.http.bind_adresse, self.http.port)
    }

    /// Einstellungen fuer den Session-Manager
    pub fn manager_konfiguration(&self) -> ManagerKonfiguration {
        ManagerKonfiguration {
            host: self.mumble.host.clone(),
            port: self.mumble.port,
            passwort: self.mumble.passwort.clone().filter(|p| !p.is_empty()),
            tls_pruefen: self.mumble.tls_pruefen,
            name_praefix: self.mumble.name_praefix.clone(),
            bereit_timeout: Duration::from_secs(self.mumble.bereit_timeout_sek),
            ping_intervall: Duration::from_secs(self.mumble.ping_intervall_sek),
            fallback_normal_talk: self.bridge.fallback_normal_talk,
            bitrate_kbps: self.bridge.bitrate_kbps,
            diagnose_intervall: Duration::from_secs(self.bridge.diagnose_intervall_sek),
            whisper: WhisperOptionen {
                keine_links: !self.bridge.whisper_links,
                keine_kinder: !self.bridge.whisper_unterkanaele,
            },
        }
    }
}
