//! Fehlertypen fuer die Codec-Pipeline

use thiserror::Error;

/// Alle moeglichen Fehler der Codec-Pipeline
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Codec-Fehler: {0}")]
    CodecFehler(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

impl AudioError {
    pub(crate) fn codec(e: impl std::fmt::Display) -> Self {
        Self::CodecFehler(e.to_string())
    }
}

pub type AudioResult<T> = Result<T, AudioError>;
