//! Opus Encoder/Decoder Wrapper
//!
//! Kapselt audiopus fuer das feste Bruecken-Format: 48 kHz, mono, i16,
//! 20ms-Frames (960 Samples).

use audiopus::{
    coder::{Decoder, Encoder},
    Application, Bitrate, Channels, SampleRate,
};
use funkbruecke_core::FRAME_SAMPLES;
use tracing::debug;

use crate::error::{AudioError, AudioResult};

/// Standard-Bitrate fuer Sprache in kbit/s
pub const STANDARD_BITRATE_KBPS: u32 = 40;

/// Erlaubter Bitraten-Bereich in kbit/s
pub const BITRATE_BEREICH_KBPS: std::ops::RangeInclusive<u32> = 6..=510;

/// Obergrenze fuer ein kodiertes Paket (reicht fuer alle Opus-Frames)
const MAX_PAKET_BYTES: usize = 4000;

/// Ein vollstaendiger PCM-Frame
pub type PcmFrame = [i16; FRAME_SAMPLES];

/// Opus-Encoder: kodiert i16-PCM-Frames zu Opus-Bytes
///
/// Ein Encoder pro Dispatcher, er wird nie zwischen Sessions geteilt.
pub struct OpusEncoder {
    encoder: Encoder,
    bitrate_kbps: u32,
}

impl OpusEncoder {
    /// Erstellt einen Encoder mit der gegebenen Bitrate
    pub fn neu(bitrate_kbps: u32) -> AudioResult<Self> {
        if !BITRATE_BEREICH_KBPS.contains(&bitrate_kbps) {
            return Err(AudioError::Konfiguration(format!(
                "Bitrate {} kbit/s ausserhalb von {:?}",
                bitrate_kbps, BITRATE_BEREICH_KBPS
            )));
        }

        let mut encoder = Encoder::new(SampleRate::Hz48000, Channels::Mono, Application::Voip)
            .map_err(AudioError::codec)?;

        encoder
            .set_bitrate(Bitrate::BitsPerSecond((bitrate_kbps as i32) * 1000))
            .map_err(AudioError::codec)?;

        debug!(bitrate_kbps, "OpusEncoder erstellt");

        Ok(Self {
            encoder,
            bitrate_kbps,
        })
    }

    /// Kodiert genau einen 20ms-Frame
    pub fn encode_frame(&mut self, pcm: &PcmFrame) -> AudioResult<Vec<u8>> {
        let mut output = vec![0u8; MAX_PAKET_BYTES];
        let geschrieben = self
            .encoder
            .encode(&pcm[..], &mut output)
            .map_err(AudioError::codec)?;

        output.truncate(geschrieben);
        Ok(output)
    }

    /// Kodiert einen Stille-Frame (fuer Terminator-Pakete)
    pub fn encode_stille(&mut self) -> AudioResult<Vec<u8>> {
        self.encode_frame(&[0i16; FRAME_SAMPLES])
    }

    /// Gibt die konfigurierte Bitrate zurueck
    pub fn bitrate_kbps(&self) -> u32 {
        self.bitrate_kbps
    }
}

/// Opus-Decoder: dekodiert Opus-Bytes eines einzelnen Absenders zu i16-PCM
///
/// Decoder sind zustandsbehaftet und gehoeren immer genau einem entfernten
/// Sprecher.
pub struct OpusDecoder {
    decoder: Decoder,
}

impl OpusDecoder {
    /// Erstellt einen Decoder fuer 48 kHz mono
    pub fn neu() -> AudioResult<Self> {
        let decoder =
            Decoder::new(SampleRate::Hz48000, Channels::Mono).map_err(AudioError::codec)?;
        Ok(Self { decoder })
    }

    /// Dekodiert ein Opus-Paket
    ///
    /// Ergebnis ist im Normalfall genau ein Frame (960 Samples).
    pub fn decode_frame(&mut self, opus: &[u8]) -> AudioResult<Vec<i16>> {
        if opus.is_empty() {
            return Err(AudioError::CodecFehler("Leeres Opus-Paket".into()));
        }

        // Platz fuer bis zu 120ms, falls der Absender groessere Frames nutzt
        let mut output = vec![0i16; FRAME_SAMPLES * 6];
        let dekodiert = self
            .decoder
            .decode(Some(opus), &mut output, false)
            .map_err(AudioError::codec)?;

        output.truncate(dekodiert);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sinus_frame() -> PcmFrame {
        let mut frame = [0i16; FRAME_SAMPLES];
        for (i, s) in frame.iter_mut().enumerate() {
            *s = ((i as f32 / 48_000.0 * 440.0 * std::f32::consts::TAU).sin() * 8000.0) as i16;
        }
        frame
    }

    #[test]
    fn encoder_standard_bitrate() {
        let enc = OpusEncoder::neu(STANDARD_BITRATE_KBPS).unwrap();
        assert_eq!(enc.bitrate_kbps(), 40);
    }

    #[test]
    fn encoder_ungueltige_bitrate() {
        assert!(OpusEncoder::neu(2).is_err());
        assert!(OpusEncoder::neu(1000).is_err());
    }

    #[test]
    fn encoder_decoder_roundtrip() {
        let mut enc = OpusEncoder::neu(STANDARD_BITRATE_KBPS).unwrap();
        let mut dec = OpusDecoder::neu().unwrap();

        let kodiert = enc.encode_frame(&sinus_frame()).expect("Encoding sollte funktionieren");
        assert!(!kodiert.is_empty());

        let dekodiert = dec.decode_frame(&kodiert).expect("Decoding sollte funktionieren");
        assert_eq!(dekodiert.len(), FRAME_SAMPLES);
    }

    #[test]
    fn stille_ist_kodierbar() {
        let mut enc = OpusEncoder::neu(STANDARD_BITRATE_KBPS).unwrap();
        let kodiert = enc.encode_stille().unwrap();
        assert!(!kodiert.is_empty());
    }

    #[test]
    fn leeres_paket_ist_fehler() {
        let mut dec = OpusDecoder::neu().unwrap();
        assert!(dec.decode_frame(&[]).is_err());
    }
}
