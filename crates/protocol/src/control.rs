//! Kontroll-Protokoll (TCP/TLS)
//!
//! Definiert die Mumble-Kontrollnachrichten, die die Funkbruecke sendet oder
//! auswertet. Die Strukturen entsprechen `Mumble.proto` (proto2), tragen aber
//! nur die Felder, die die Bruecke tatsaechlich benoetigt. Unbekannte Felder
//! werden von prost beim Dekodieren uebersprungen.
//!
//! ## Design
//! - Nachrichtentyp steht im Frame-Header (u16), nicht im Payload
//! - `ControlMessage` ist das typsichere Gegenstueck zu einem Frame
//! - Nicht benoetigte Typen landen als `Unbekannt` und werden ignoriert

use bytes::Bytes;
use prost::Message;
use std::io;

// ---------------------------------------------------------------------------
// Nachrichtentypen
// ---------------------------------------------------------------------------

/// Mumble-Nachrichtentyp (u16 im Frame-Header)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    Version = 0,
    UdpTunnel = 1,
    Authenticate = 2,
    Ping = 3,
    Reject = 4,
    ServerSync = 5,
    ChannelRemove = 6,
    ChannelState = 7,
    UserRemove = 8,
    UserState = 9,
    CodecVersion = 21,
    VoiceTarget = 22,
}

impl MessageType {
    /// Konvertiert einen Typ-Wert aus dem Frame-Header
    pub fn from_u16(wert: u16) -> Option<Self> {
        match wert {
            0 => Some(Self::Version),
            1 => Some(Self::UdpTunnel),
            2 => Some(Self::Authenticate),
            3 => Some(Self::Ping),
            4 => Some(Self::Reject),
            5 => Some(Self::ServerSync),
            6 => Some(Self::ChannelRemove),
            7 => Some(Self::ChannelState),
            8 => Some(Self::UserRemove),
            9 => Some(Self::UserState),
            21 => Some(Self::CodecVersion),
            22 => Some(Self::VoiceTarget),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Protobuf-Nachrichten
// ---------------------------------------------------------------------------

/// Protokollversion, die die Bruecke ankuendigt (1.4.0)
///
/// Unterhalb von 1.5 sendet der Server Sprachdaten im Legacy-Format,
/// das [`crate::voice`] versteht.
pub const CLIENT_VERSION_V1: u32 = (1 << 16) | (4 << 8);

/// Versionsaustausch zu Beginn der Verbindung
#[derive(Clone, PartialEq, Message)]
pub struct Version {
    #[prost(uint32, optional, tag = "1")]
    pub version_v1: Option<u32>,
    #[prost(string, optional, tag = "2")]
    pub release: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub os: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub os_version: Option<String>,
}

/// Anmeldung am Voice-Server
#[derive(Clone, PartialEq, Message)]
pub struct Authenticate {
    #[prost(string, optional, tag = "1")]
    pub username: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub password: Option<String>,
    #[prost(string, repeated, tag = "3")]
    pub tokens: Vec<String>,
    #[prost(bool, optional, tag = "5")]
    pub opus: Option<bool>,
}

/// Keepalive
#[derive(Clone, PartialEq, Message)]
pub struct Ping {
    #[prost(uint64, optional, tag = "1")]
    pub timestamp: Option<u64>,
    #[prost(uint32, optional, tag = "7")]
    pub tcp_packets: Option<u32>,
}

/// Ablehnung der Anmeldung
#[derive(Clone, PartialEq, Message)]
pub struct Reject {
    #[prost(int32, optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(string, optional, tag = "2")]
    pub reason: Option<String>,
}

impl Reject {
    /// Lesbare Beschreibung des Ablehnungsgrunds
    pub fn beschreibung(&self) -> String {
        let typ = match self.r#type.unwrap_or(0) {
            1 => "WrongVersion",
            2 => "InvalidUsername",
            3 => "WrongUserPW",
            4 => "WrongServerPW",
            5 => "UsernameInUse",
            6 => "ServerFull",
            7 => "NoCertificate",
            8 => "AuthenticatorFail",
            _ => "None",
        };
        match self.reason.as_deref() {
            Some(grund) if !grund.is_empty() => format!("{typ}: {grund}"),
            _ => typ.to_string(),
        }
    }
}

/// Abschluss des Verbindungsaufbaus, ab hier ist die Verbindung bereit
#[derive(Clone, PartialEq, Message)]
pub struct ServerSync {
    #[prost(uint32, optional, tag = "1")]
    pub session: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub max_bandwidth: Option<u32>,
    #[prost(string, optional, tag = "3")]
    pub welcome_text: Option<String>,
}

/// Ein Kanal wurde entfernt
#[derive(Clone, PartialEq, Message)]
pub struct ChannelRemove {
    #[prost(uint32, optional, tag = "1")]
    pub channel_id: Option<u32>,
}

/// Kanal angelegt oder geaendert
#[derive(Clone, PartialEq, Message)]
pub struct ChannelState {
    #[prost(uint32, optional, tag = "1")]
    pub channel_id: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub parent: Option<u32>,
    #[prost(string, optional, tag = "3")]
    pub name: Option<String>,
    #[prost(bool, optional, tag = "8")]
    pub temporary: Option<bool>,
}

/// Ein Benutzer hat den Server verlassen
#[derive(Clone, PartialEq, Message)]
pub struct UserRemove {
    #[prost(uint32, optional, tag = "1")]
    pub session: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub actor: Option<u32>,
    #[prost(string, optional, tag = "3")]
    pub reason: Option<String>,
}

/// Benutzerzustand; ausgehend fuer Kanalwechsel verwendet
#[derive(Clone, PartialEq, Message)]
pub struct UserState {
    #[prost(uint32, optional, tag = "1")]
    pub session: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub actor: Option<u32>,
    #[prost(string, optional, tag = "3")]
    pub name: Option<String>,
    #[prost(uint32, optional, tag = "5")]
    pub channel_id: Option<u32>,
}

/// Vom Server bevorzugter Codec
#[derive(Clone, PartialEq, Message)]
pub struct CodecVersion {
    #[prost(int32, optional, tag = "1")]
    pub alpha: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub beta: Option<i32>,
    #[prost(bool, optional, tag = "3")]
    pub prefer_alpha: Option<bool>,
    #[prost(bool, optional, tag = "4")]
    pub opus: Option<bool>,
}

/// Programmiert einen Whisper-Slot (1..=30)
#[derive(Clone, PartialEq, Message)]
pub struct VoiceTarget {
    #[prost(uint32, optional, tag = "1")]
    pub id: Option<u32>,
    #[prost(message, repeated, tag = "2")]
    pub targets: Vec<voice_target::Target>,
}

pub mod voice_target {
    use prost::Message;

    /// Ein einzelnes Ziel eines Whisper-Slots
    #[derive(Clone, PartialEq, Message)]
    pub struct Target {
        #[prost(uint32, repeated, packed = "false", tag = "1")]
        pub session: Vec<u32>,
        #[prost(uint32, optional, tag = "2")]
        pub channel_id: Option<u32>,
        #[prost(string, optional, tag = "3")]
        pub group: Option<String>,
        #[prost(bool, optional, tag = "4")]
        pub links: Option<bool>,
        #[prost(bool, optional, tag = "5")]
        pub children: Option<bool>,
    }
}

// ---------------------------------------------------------------------------
// ControlMessage
// ---------------------------------------------------------------------------

/// Typsichere Repraesentation eines Kontroll-Frames
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    Version(Version),
    /// Getunneltes Voice-Paket (Legacy-Format, siehe [`crate::voice`])
    UdpTunnel(Bytes),
    Authenticate(Authenticate),
    Ping(Ping),
    Reject(Reject),
    ServerSync(ServerSync),
    ChannelRemove(ChannelRemove),
    ChannelState(ChannelState),
    UserRemove(UserRemove),
    UserState(UserState),
    CodecVersion(CodecVersion),
    VoiceTarget(VoiceTarget),
    /// Nachrichtentyp, den die Bruecke nicht auswertet
    Unbekannt { typ: u16, payload: Bytes },
    /// Bekannter Typ mit nicht dekodierbarem Payload
    Fehlerhaft {
        typ: u16,
        payload: Bytes,
        fehler: String,
    },
}

impl ControlMessage {
    /// Erstellt die Versionsnachricht der Bruecke
    pub fn version(release: impl Into<String>) -> Self {
        Self::Version(Version {
            version_v1: Some(CLIENT_VERSION_V1),
            release: Some(release.into()),
            os: Some(std::env::consts::OS.to_string()),
            os_version: None,
        })
    }

    /// Erstellt die Anmeldenachricht (Opus wird immer angekuendigt)
    pub fn authenticate(username: impl Into<String>, password: Option<String>) -> Self {
        Self::Authenticate(Authenticate {
            username: Some(username.into()),
            password,
            tokens: Vec::new(),
            opus: Some(true),
        })
    }

    /// Erstellt einen Keepalive-Ping
    pub fn ping(timestamp: u64) -> Self {
        Self::Ping(Ping {
            timestamp: Some(timestamp),
            tcp_packets: None,
        })
    }

    /// Verschiebt die eigene Session in einen Kanal
    pub fn kanal_wechseln(session: u32, channel_id: u32) -> Self {
        Self::UserState(UserState {
            session: Some(session),
            actor: None,
            name: None,
            channel_id: Some(channel_id),
        })
    }

    /// Bindet einen Whisper-Slot an genau einen Zielkanal
    pub fn whisper_ziel(slot: u32, channel_id: u32, links: bool, children: bool) -> Self {
        Self::VoiceTarget(VoiceTarget {
            id: Some(slot),
            targets: vec![voice_target::Target {
                session: Vec::new(),
                channel_id: Some(channel_id),
                group: None,
                links: Some(links),
                children: Some(children),
            }],
        })
    }

    /// Numerischer Typ fuer den Frame-Header
    pub fn typ(&self) -> u16 {
        match self {
            Self::Version(_) => MessageType::Version as u16,
            Self::UdpTunnel(_) => MessageType::UdpTunnel as u16,
            Self::Authenticate(_) => MessageType::Authenticate as u16,
            Self::Ping(_) => MessageType::Ping as u16,
            Self::Reject(_) => MessageType::Reject as u16,
            Self::ServerSync(_) => MessageType::ServerSync as u16,
            Self::ChannelRemove(_) => MessageType::ChannelRemove as u16,
            Self::ChannelState(_) => MessageType::ChannelState as u16,
            Self::UserRemove(_) => MessageType::UserRemove as u16,
            Self::UserState(_) => MessageType::UserState as u16,
            Self::CodecVersion(_) => MessageType::CodecVersion as u16,
            Self::VoiceTarget(_) => MessageType::VoiceTarget as u16,
            Self::Unbekannt { typ, .. } | Self::Fehlerhaft { typ, .. } => *typ,
        }
    }

    /// Serialisiert den Payload (ohne Frame-Header)
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Self::Version(m) => m.encode_to_vec(),
            Self::UdpTunnel(daten) => daten.to_vec(),
            Self::Authenticate(m) => m.encode_to_vec(),
            Self::Ping(m) => m.encode_to_vec(),
            Self::Reject(m) => m.encode_to_vec(),
            Self::ServerSync(m) => m.encode_to_vec(),
            Self::ChannelRemove(m) => m.encode_to_vec(),
            Self::ChannelState(m) => m.encode_to_vec(),
            Self::UserRemove(m) => m.encode_to_vec(),
            Self::UserState(m) => m.encode_to_vec(),
            Self::CodecVersion(m) => m.encode_to_vec(),
            Self::VoiceTarget(m) => m.encode_to_vec(),
            Self::Unbekannt { payload, .. } | Self::Fehlerhaft { payload, .. } => {
                payload.to_vec()
            }
        }
    }

    /// Dekodiert einen Payload anhand des Typs aus dem Frame-Header
    ///
    /// # Fehler
    /// - `InvalidData` wenn der Protobuf-Payload nicht dekodierbar ist
    pub fn aus_frame(typ: u16, payload: Bytes) -> io::Result<Self> {
        let nachricht = match MessageType::from_u16(typ) {
            Some(MessageType::Version) => Self::Version(dekodieren(payload)?),
            Some(MessageType::UdpTunnel) => Self::UdpTunnel(payload),
            Some(MessageType::Authenticate) => Self::Authenticate(dekodieren(payload)?),
            Some(MessageType::Ping) => Self::Ping(dekodieren(payload)?),
            Some(MessageType::Reject) => Self::Reject(dekodieren(payload)?),
            Some(MessageType::ServerSync) => Self::ServerSync(dekodieren(payload)?),
            Some(MessageType::ChannelRemove) => Self::ChannelRemove(dekodieren(payload)?),
            Some(MessageType::ChannelState) => Self::ChannelState(dekodieren(payload)?),
            Some(MessageType::UserRemove) => Self::UserRemove(dekodieren(payload)?),
            Some(MessageType::UserState) => Self::UserState(dekodieren(payload)?),
            Some(MessageType::CodecVersion) => Self::CodecVersion(dekodieren(payload)?),
            Some(MessageType::VoiceTarget) => Self::VoiceTarget(dekodieren(payload)?),
            None => Self::Unbekannt { typ, payload },
        };
        Ok(nachricht)
    }
}

fn dekodieren<M: Message + Default>(payload: Bytes) -> io::Result<M> {
    M::decode(payload).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Protobuf-Dekodierung fehlgeschlagen: {}", e),
        )
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_bekannte_werte() {
        assert_eq!(MessageType::from_u16(5), Some(MessageType::ServerSync));
        assert_eq!(MessageType::from_u16(22), Some(MessageType::VoiceTarget));
        assert_eq!(MessageType::from_u16(15), None); // CryptSetup wird nicht ausgewertet
    }

    #[test]
    fn client_version_ist_1_4_0() {
        assert_eq!(CLIENT_VERSION_V1, 0x0001_0400);
    }

    #[test]
    fn whisper_ziel_payload_round_trip() {
        let nachricht = ControlMessage::whisper_ziel(2, 205, false, false);
        assert_eq!(nachricht.typ(), 22);

        let dekodiert =
            ControlMessage::aus_frame(nachricht.typ(), Bytes::from(nachricht.payload())).unwrap();
        match dekodiert {
            ControlMessage::VoiceTarget(vt) => {
                assert_eq!(vt.id, Some(2));
                assert_eq!(vt.targets.len(), 1);
                assert_eq!(vt.targets[0].channel_id, Some(205));
                assert_eq!(vt.targets[0].links, Some(false));
                assert_eq!(vt.targets[0].children, Some(false));
            }
            andere => panic!("VoiceTarget erwartet, war {:?}", andere),
        }
    }

    #[test]
    fn authenticate_kuendigt_opus_an() {
        match ControlMessage::authenticate("[CAD] Anna #3", None) {
            ControlMessage::Authenticate(a) => {
                assert_eq!(a.opus, Some(true));
                assert_eq!(a.username.as_deref(), Some("[CAD] Anna #3"));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn unbekannter_typ_bleibt_erhalten() {
        let payload = Bytes::from_static(&[1, 2, 3]);
        let m = ControlMessage::aus_frame(15, payload.clone()).unwrap();
        assert_eq!(m, ControlMessage::Unbekannt { typ: 15, payload });
    }

    #[test]
    fn kaputter_payload_ist_invalid_data() {
        // Feld 1 als Varint angekuendigt, aber abgeschnitten
        let result = ControlMessage::aus_frame(5, Bytes::from_static(&[0x08, 0xFF]));
        let fehler = result.unwrap_err();
        assert_eq!(fehler.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn reject_beschreibung() {
        let r = Reject {
            r#type: Some(5),
            reason: Some("Name vergeben".into()),
        };
        assert_eq!(r.beschreibung(), "UsernameInUse: Name vergeben");
        let leer = Reject {
            r#type: None,
            reason: None,
        };
        assert_eq!(leer.beschreibung(), "None");
    }
}
