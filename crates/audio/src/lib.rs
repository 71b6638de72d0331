//! funkbruecke-audio – Codec-Pipeline der Funkbruecke
//!
//! - Opus Encoding/Decoding im festen Format (48 kHz, mono, 20ms)
//! - PCM-Framing fuer Mikrofon-Audio aus dem Browser

pub mod codec;
pub mod error;
pub mod framing;

// Bequeme Re-Exporte der wichtigsten Typen
pub use codec::{OpusDecoder, OpusEncoder, PcmFrame, STANDARD_BITRATE_KBPS};
pub use error::{AudioError, AudioResult};
pub use framing::{pcm_zu_bytes, FrameBuffer};
