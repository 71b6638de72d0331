//! funkbruecke-protocol – Mumble-Wire-Protokoll
//!
//! Dieses Crate kapselt alles, was die Funkbruecke vom Mumble-Protokoll
//! benoetigt:
//!
//! - [`wire`] – Frame-Codec fuer den TCP/TLS-Kontrollkanal
//! - [`control`] – Protobuf-Kontrollnachrichten (Version, Authenticate, ...)
//! - [`voice`] – Legacy-Voice-Paketformat inkl. Mumble-Varint
//!
//! Sprachdaten werden ausschliesslich ueber `UDPTunnel` im TCP-Kanal
//! uebertragen, ein separater UDP-Kanal wird nicht aufgebaut.

pub mod control;
pub mod voice;
pub mod wire;

pub use control::{ControlMessage, MessageType};
pub use voice::{AusgehendesAudio, EingehendesAudio};
pub use wire::MumbleCodec;
