//! Fehlertypen fuer das Signaling-Gateway

use funkbruecke_voice::VoiceError;
use thiserror::Error;

/// Fehlertyp fuer das Signaling-Gateway
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Nachricht vom Browser nicht lesbar (kein JSON, unbekannter Typ)
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    /// Fehler aus dem Voice-Kern (Verbindungsaufbau, Kanalwechsel)
    #[error(transparent)]
    Voice(#[from] VoiceError),

    /// Antwort konnte nicht serialisiert werden
    #[error("Serialisierung fehlgeschlagen: {0}")]
    Serialisierung(String),
}

impl SignalingError {
    /// Erstellt einen Fehler fuer eine unlesbare Nachricht
    pub fn ungueltig(msg: impl Into<String>) -> Self {
        Self::UngueltigeNachricht(msg.into())
    }
}

/// Result-Typ fuer das Signaling-Gateway
pub type SignalingResult<T> = Result<T, SignalingError>;
