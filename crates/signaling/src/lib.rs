//! funkbruecke-signaling – Signaling-Gateway der Funkbruecke
//!
//! Vermittelt zwischen dem Browser eines Disponenten und dem
//! Voice-Kern. Der Nachrichtenvertrag ist transportunabhaengig, der
//! mitgelieferte axum-WebSocket-Adapter ist nur eine duenne Huelle.
//!
//! ## Architektur
//!
//! ```text
//! Browser (WebSocket /voice/ws)
//!     |  Text: JSON-Nachrichten   Binaer: PCM i16 LE 48 kHz mono
//!     v
//! ws::socket_verarbeiten (pro Verbindung ein Task)
//!     |
//!     v
//! SignalingGateway
//!     |
//!     v
//! SessionManager (funkbruecke-voice)
//! ```

pub mod error;
pub mod gateway;
pub mod messages;
pub mod ws;

// Bequeme Re-Exporte
pub use error::{SignalingError, SignalingResult};
pub use gateway::SignalingGateway;
pub use messages::{AusgehendeNachricht, EingehendeNachricht};
pub use ws::ws_router;
