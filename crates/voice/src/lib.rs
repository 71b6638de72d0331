//! funkbruecke-voice – Voice-Kern der Funkbruecke
//!
//! Verbindet Disponenten ueber je eine eigene Mumble-Verbindung mit dem
//! Voice-Server und bildet Funkkanaele ueber Whisper-Ziele nach.
//!
//! ## Module
//! - [`connection`] – Traits fuer Verbindung und Verbindungsaufbau
//! - [`mumble`] – Mumble-Client ueber TLS
//! - [`route_table`] – Routing-Tabelle und Anrufer-Register
//! - [`whisper`] – Whisper-Router mit Signatur-Vergleich
//! - [`session`] – Zustand eines einzelnen Disponenten
//! - [`manager`] – Register aller Sessions
//! - [`diagnostics`] – Zaehler und gedrosselte Diagnose-Ausgabe

pub mod connection;
pub mod diagnostics;
pub mod error;
pub mod manager;
pub mod mumble;
pub mod route_table;
pub mod session;
pub mod whisper;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use connection::{
    AufgebauteVerbindung, ConnectionEvent, Connector, KanalInfo, VerbindungsOptionen,
    VoiceConnection, WhisperOptionen,
};
pub use error::{VoiceError, VoiceResult};
pub use manager::{BridgeStatus, ManagerKonfiguration, SessionManager, VerbindungsErgebnis};
pub use mumble::MumbleConnector;
pub use route_table::{CallRegistry, CallerLookup, RouteTable};
pub use session::{AudioListener, ReceivedAudio, SessionStatus, SessionZustand};
