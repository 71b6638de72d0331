//! Identifikationstypen der Funkbruecke
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! Dispatcher-IDs, Funkkanal-Nummern und Hoerer-IDs zur Compilezeit
//! auszuschliessen.

use serde::{Deserialize, Serialize};

use crate::NOTRUF_KANAL_BASIS;

/// CAD-Benutzer-ID eines Disponenten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DispatcherId(pub u32);

impl DispatcherId {
    /// Gibt die innere Zahl zurueck
    pub fn inner(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for DispatcherId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dispatcher:{}", self.0)
    }
}

/// Logische Funkkanal-Nummer
///
/// Funkkanaele existieren auf dem Voice-Server nicht als echte Kanaele,
/// sie werden ausschliesslich ueber Whisper-Ziele nachgebildet. Die Nummer
/// kommt ungeprueft aus dem Browser und darf daher auch 0 oder negativ sein.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelNumber(pub i64);

impl ChannelNumber {
    /// Gibt die innere Zahl zurueck
    pub fn inner(&self) -> i64 {
        self.0
    }

    /// Notruf-Kanaele (>= 10000) werden dynamisch ueber den Anrufer aufgeloest
    pub fn ist_notruf(&self) -> bool {
        self.0 >= NOTRUF_KANAL_BASIS
    }
}

impl std::fmt::Display for ChannelNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "kanal:{}", self.0)
    }
}

/// Spiel-Session-ID eines Feldspielers
///
/// Das Voice-Plugin im Spiel verwendet diese Nummer gleichzeitig als ID des
/// persoenlichen Kanals des Spielers auf dem Voice-Server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(pub u32);

impl ListenerId {
    /// Gibt die innere Zahl zurueck
    pub fn inner(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "hoerer:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notruf_grenze() {
        assert!(!ChannelNumber(9_999).ist_notruf());
        assert!(ChannelNumber(10_000).ist_notruf());
        assert!(ChannelNumber(10_042).ist_notruf());
        assert!(!ChannelNumber(-5).ist_notruf());
    }

    #[test]
    fn display_formate() {
        assert_eq!(DispatcherId(3).to_string(), "dispatcher:3");
        assert_eq!(ChannelNumber(7).to_string(), "kanal:7");
        assert_eq!(ListenerId(101).to_string(), "hoerer:101");
    }

    #[test]
    fn ids_sind_transparent_serialisiert() {
        let json = serde_json::to_string(&ChannelNumber(42)).unwrap();
        assert_eq!(json, "42");
        let id: ListenerId = serde_json::from_str("205").unwrap();
        assert_eq!(id, ListenerId(205));
    }
}
