//! Fehlertypen des Voice-Kerns

use funkbruecke_audio::AudioError;
use std::time::Duration;
use thiserror::Error;

/// Fehler beim Verbindungsaufbau und im laufenden Voice-Betrieb
#[derive(Debug, Error)]
pub enum VoiceError {
    // --- Verbindungsaufbau ---
    #[error("Verbindungsaufbau fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Anmeldung vom Voice-Server abgelehnt: {0}")]
    Abgelehnt(String),

    #[error("Verbindung vor Bereitschaft getrennt: {0}")]
    VorBereitschaftGetrennt(String),

    #[error("Voice-Server nicht innerhalb von {0:?} bereit")]
    Zeitlimit(Duration),

    // --- Laufender Betrieb ---
    #[error("Nicht verbunden")]
    NichtVerbunden,

    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    #[error("Audiofehler: {0}")]
    Audio(#[from] AudioError),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

impl VoiceError {
    /// Erstellt einen Protokollfehler
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }

    /// Erstellt einen Verbindungsfehler
    pub fn verbindung(msg: impl Into<String>) -> Self {
        Self::Verbindung(msg.into())
    }
}

pub type VoiceResult<T> = Result<T, VoiceError>;
