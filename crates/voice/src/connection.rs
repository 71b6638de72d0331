//! Protokoll-Verbindung – Abstraktion ueber die Verbindung zum Voice-Server
//!
//! Der Session-Manager kennt nur die Traits [`VoiceConnection`] und
//! [`Connector`]. Die Mumble-Implementierung steckt in [`crate::mumble`],
//! Test-Doubles in `testing`.
//!
//! ## Lebenszyklus
//! ```text
//! Getrennt -> Verbindet -> Bereit -> (ImKanal) <-> Bereit -> Getrennt
//! ```
//!
//! Eingehendes Audio, Protokollfehler und Verbindungsverlust kommen als
//! [`ConnectionEvent`] ueber einen eigenen mpsc-Kanal pro Verbindung.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::VoiceResult;

/// Kapazitaet des Ereignis-Kanals pro Verbindung (Pakete)
pub const EREIGNIS_QUEUE_GROESSE: usize = 256;

// ---------------------------------------------------------------------------
// Optionen
// ---------------------------------------------------------------------------

/// Alles, was fuer den Aufbau einer Verbindung benoetigt wird
#[derive(Debug, Clone)]
pub struct VerbindungsOptionen {
    pub host: String,
    pub port: u16,
    /// Optionales Server-Passwort
    pub passwort: Option<String>,
    /// Anzeigename auf dem Voice-Server (bereits mit Praefix)
    pub benutzername: String,
    /// TLS-Zertifikat des Servers pruefen
    pub tls_pruefen: bool,
    /// Maximale Wartezeit auf `ServerSync`
    pub bereit_timeout: Duration,
    /// Intervall der Keepalive-Pings
    pub ping_intervall: Duration,
}

/// Programmier-Optionen fuer einen Whisper-Slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhisperOptionen {
    /// Verlinkte Kanaele nicht mit einbeziehen
    pub keine_links: bool,
    /// Unterkanaele nicht mit einbeziehen
    pub keine_kinder: bool,
}

impl Default for WhisperOptionen {
    fn default() -> Self {
        Self {
            keine_links: true,
            keine_kinder: true,
        }
    }
}

/// Ein Kanal im Baum des Voice-Servers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KanalInfo {
    pub id: u32,
    /// Elternkanal, `None` fuer den Root-Kanal
    pub parent: Option<u32>,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Ereignisse
// ---------------------------------------------------------------------------

/// Ereignisse einer bestehenden Verbindung
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Opus-Frame eines anderen Teilnehmers
    Audio {
        remote_session: u32,
        opus: Vec<u8>,
        terminator: bool,
    },
    /// Nicht fataler Protokollfehler, die Verbindung bleibt bestehen
    Protokollfehler { grund: String },
    /// Die Verbindung ist verloren gegangen
    Getrennt { grund: String },
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Eine bereite Verbindung zum Voice-Server
///
/// Alle Methoden sind synchron und blockieren nicht; Protokollnachrichten
/// werden in eine Sende-Queue gelegt.
pub trait VoiceConnection: Send + Sync {
    /// Eigene Session-ID auf dem Voice-Server
    fn eigene_session(&self) -> u32;

    /// Bekannte Kanaele des Servers
    fn kanaele(&self) -> Vec<KanalInfo>;

    /// ID des Root-Kanals (Kanal ohne Elternkanal)
    fn root_kanal(&self) -> u32 {
        self.kanaele()
            .iter()
            .filter(|k| k.parent.is_none())
            .map(|k| k.id)
            .min()
            .unwrap_or(0)
    }

    /// Verschiebt den eigenen Benutzer in einen Kanal
    fn kanal_wechseln(&self, kanal_id: u32) -> VoiceResult<()>;

    /// Programmiert einen Whisper-Slot (1..=30) auf ein Ziel
    fn whisper_ziel_setzen(&self, slot: u8, ziel: u32, optionen: WhisperOptionen)
        -> VoiceResult<()>;

    /// Sendet einen Opus-Frame ueber den angegebenen Slot (0 = normal)
    fn audio_senden(&self, opus: &[u8], letzter_frame: bool, slot: u8) -> VoiceResult<()>;

    /// Gibt true zurueck solange die Verbindung bereit ist
    fn ist_bereit(&self) -> bool;

    /// Beendet die Verbindung; mehrfacher Aufruf ist erlaubt
    fn schliessen(&self);
}

/// Ergebnis eines erfolgreichen Verbindungsaufbaus
pub struct AufgebauteVerbindung {
    pub verbindung: Arc<dyn VoiceConnection>,
    pub ereignisse: mpsc::Receiver<ConnectionEvent>,
}

impl std::fmt::Debug for AufgebauteVerbindung {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AufgebauteVerbindung")
            .field("session", &self.verbindung.eigene_session())
            .field("bereit", &self.verbindung.ist_bereit())
            .finish()
    }
}

/// Baut Verbindungen zum Voice-Server auf
///
/// `verbinden` kehrt erst zurueck, wenn die Verbindung bereit ist oder
/// endgueltig fehlgeschlagen ist.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn verbinden(&self, optionen: VerbindungsOptionen) -> VoiceResult<AufgebauteVerbindung>;
}
