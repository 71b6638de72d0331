//! funkbruecke-core – Gemeinsame Typen und Konstanten
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Funkbruecke-Crates gemeinsam genutzt werden. Fehlertypen leben
//! in den jeweiligen Crates.

pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use types::{ChannelNumber, DispatcherId, ListenerId};

// ---------------------------------------------------------------------------
// Audio- und Routing-Konstanten
// ---------------------------------------------------------------------------

/// Abtastrate aller Audio-Frames (Hz)
pub const SAMPLE_RATE: u32 = 48_000;

/// Samples pro 20ms-Frame bei 48 kHz mono
pub const FRAME_SAMPLES: usize = 960;

/// PCM-Bytes pro Frame (16 Bit pro Sample)
pub const FRAME_BYTES: usize = FRAME_SAMPLES * 2;

/// Hoechste Whisper-Slot-ID, die das Voice-Protokoll erlaubt
pub const MAX_WHISPER_SLOTS: usize = 30;

/// Ab dieser Nummer ist ein Kanal ein kurzlebiger Notruf-Kanal
pub const NOTRUF_KANAL_BASIS: i64 = 10_000;
