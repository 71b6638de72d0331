//! Nachrichtenvertrag zwischen Browser und Bruecke
//!
//! Textframes tragen JSON mit einem `type`-Feld, Binaerframes rohes PCM
//! (i16 LE, 48 kHz, mono) in beide Richtungen.
//!
//! ```text
//! Browser -> Bruecke                        Bruecke -> Browser
//! {"type":"join-channel","channelNumber":7}  {"type":"channel-joined","channelNumber":7}
//! {"type":"leave-channel"}                   {"type":"channel-left"}
//! {"type":"ping"}                            {"type":"pong"}
//!                                            {"type":"error","error":"..."}
//! ```

use funkbruecke_core::ChannelNumber;
use serde::{Deserialize, Serialize};

use crate::error::{SignalingError, SignalingResult};

/// Nachricht vom Browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EingehendeNachricht {
    /// Verbindet bei Bedarf und tritt dem Funkkanal bei (`None` = nur Root)
    #[serde(rename_all = "camelCase")]
    JoinChannel {
        #[serde(default)]
        channel_number: Option<ChannelNumber>,
    },
    LeaveChannel,
    Ping,
}

impl EingehendeNachricht {
    /// Parst einen Textframe
    pub fn parsen(text: &str) -> SignalingResult<Self> {
        serde_json::from_str(text).map_err(|e| SignalingError::ungueltig(e.to_string()))
    }
}

/// Antwort an den Browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AusgehendeNachricht {
    #[serde(rename_all = "camelCase")]
    ChannelJoined {
        channel_number: Option<ChannelNumber>,
    },
    ChannelLeft,
    Pong,
    Error { error: String },
}

impl AusgehendeNachricht {
    pub fn fehler(fehler: impl std::fmt::Display) -> Self {
        Self::Error {
            error: fehler.to_string(),
        }
    }

    /// Serialisiert fuer einen Textframe
    pub fn als_json(&self) -> SignalingResult<String> {
        serde_json::to_string(self).map_err(|e| SignalingError::Serialisierung(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_mit_kanal() {
        let n = EingehendeNachricht::parsen(r#"{"type":"join-channel","channelNumber":7}"#).unwrap();
        assert_eq!(
            n,
            EingehendeNachricht::JoinChannel {
                channel_number: Some(ChannelNumber(7))
            }
        );
    }

    #[test]
    fn join_ohne_oder_mit_null_kanal() {
        for text in [
            r#"{"type":"join-channel"}"#,
            r#"{"type":"join-channel","channelNumber":null}"#,
        ] {
            assert_eq!(
                EingehendeNachricht::parsen(text).unwrap(),
                EingehendeNachricht::JoinChannel {
                    channel_number: None
                }
            );
        }
    }

    #[test]
    fn leave_und_ping() {
        assert_eq!(
            EingehendeNachricht::parsen(r#"{"type":"leave-channel"}"#).unwrap(),
            EingehendeNachricht::LeaveChannel
        );
        assert_eq!(
            EingehendeNachricht::parsen(r#"{"type":"ping"}"#).unwrap(),
            EingehendeNachricht::Ping
        );
    }

    #[test]
    fn unbekannt_und_kaputt_sind_fehler() {
        for text in [r#"{"type":"explode"}"#, "{nicht json", r#"{"channelNumber":3}"#, ""] {
            assert!(matches!(
                EingehendeNachricht::parsen(text),
                Err(SignalingError::UngueltigeNachricht(_))
            ));
        }
    }

    #[test]
    fn antworten_als_json() {
        assert_eq!(
            AusgehendeNachricht::ChannelJoined {
                channel_number: Some(ChannelNumber(10042))
            }
            .als_json()
            .unwrap(),
            r#"{"type":"channel-joined","channelNumber":10042}"#
        );
        assert_eq!(
            AusgehendeNachricht::ChannelLeft.als_json().unwrap(),
            r#"{"type":"channel-left"}"#
        );
        assert_eq!(AusgehendeNachricht::Pong.als_json().unwrap(), r#"{"type":"pong"}"#);
        assert_eq!(
            AusgehendeNachricht::fehler("Nicht verbunden").als_json().unwrap(),
            r#"{"type":"error","error":"Nicht verbunden"}"#
        );
    }
}
