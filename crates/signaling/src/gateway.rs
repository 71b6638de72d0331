//! Signaling-Gateway – eine Browser-Verbindung eines Disponenten
//!
//! Uebersetzt Browser-Nachrichten in Aufrufe des [`SessionManager`] und
//! liefert die Antwort fuer den Browser zurueck. Transportunabhaengig:
//! der WebSocket-Adapter in [`crate::ws`] reicht nur Frames durch.
//!
//! ## Ablauf
//! ```text
//! join-channel  -> verbinden (falls noetig) -> kanal_beitreten -> channel-joined
//! leave-channel -> kanal_verlassen                            -> channel-left
//! ping          ->                                            -> pong
//! Binaerframe   -> send_mic_audio
//! ```

use funkbruecke_audio::pcm_zu_bytes;
use funkbruecke_core::{ChannelNumber, DispatcherId};
use funkbruecke_voice::{ReceivedAudio, SessionManager, VerbindungsErgebnis, VoiceError};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{SignalingError, SignalingResult};
use crate::messages::{AusgehendeNachricht, EingehendeNachricht};

/// Groesse der Queue fuer dekodiertes Audio Richtung Browser (~1 s)
pub const AUDIO_QUEUE_GROESSE: usize = 50;

pub struct SignalingGateway {
    manager: SessionManager,
    dispatcher_id: DispatcherId,
    name: String,
    /// PCM-Bytes Richtung Browser
    audio_tx: mpsc::Sender<Vec<u8>>,
    /// Mic-Audio ohne Verbindung wurde bereits gemeldet
    mic_fehler_gemeldet: bool,
}

impl SignalingGateway {
    /// Erstellt das Gateway und die Queue fuer dekodiertes Audio
    pub fn neu(
        manager: SessionManager,
        dispatcher_id: DispatcherId,
        name: impl Into<String>,
    ) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_QUEUE_GROESSE);
        let gateway = Self {
            manager,
            dispatcher_id,
            name: name.into(),
            audio_tx,
            mic_fehler_gemeldet: false,
        };
        (gateway, audio_rx)
    }

    pub fn dispatcher_id(&self) -> DispatcherId {
        self.dispatcher_id
    }

    /// Verarbeitet einen Textframe; jede Nachricht erhaelt genau eine Antwort
    pub async fn text_verarbeiten(&mut self, text: &str) -> AusgehendeNachricht {
        let ergebnis = match EingehendeNachricht::parsen(text) {
            Ok(nachricht) => self.nachricht_verarbeiten(nachricht).await,
            Err(e) => Err(e),
        };

        ergebnis.unwrap_or_else(|e| {
            tracing::debug!(dispatcher_id = %self.dispatcher_id, fehler = %e, "Fehlerantwort an Browser");
            AusgehendeNachricht::fehler(e)
        })
    }

    async fn nachricht_verarbeiten(
        &mut self,
        nachricht: EingehendeNachricht,
    ) -> SignalingResult<AusgehendeNachricht> {
        match nachricht {
            EingehendeNachricht::JoinChannel { channel_number } => {
                self.beitreten(channel_number).await
            }
            EingehendeNachricht::LeaveChannel => {
                self.manager.kanal_verlassen(self.dispatcher_id)?;
                Ok(AusgehendeNachricht::ChannelLeft)
            }
            EingehendeNachricht::Ping => Ok(AusgehendeNachricht::Pong),
        }
    }

    async fn beitreten(
        &mut self,
        kanal: Option<ChannelNumber>,
    ) -> SignalingResult<AusgehendeNachricht> {
        let ergebnis = self.manager.verbinden(self.dispatcher_id, &self.name).await?;
        if ergebnis == VerbindungsErgebnis::Neu {
            self.audio_abonnieren()?;
        }

        self.manager.kanal_beitreten(self.dispatcher_id, kanal)?;
        self.mic_fehler_gemeldet = false;

        Ok(AusgehendeNachricht::ChannelJoined {
            channel_number: kanal,
        })
    }

    /// Leitet dekodiertes Audio der neuen Session in die Browser-Queue
    fn audio_abonnieren(&self) -> SignalingResult<()> {
        let tx = self.audio_tx.clone();
        let id = self.dispatcher_id;
        let registriert = self.manager.register_audio_listener(
            self.dispatcher_id,
            Arc::new(move |audio: &ReceivedAudio| {
                // Volle Queue: Browser zu langsam, Frame verwerfen
                if tx.try_send(pcm_zu_bytes(&audio.pcm)).is_err() {
                    tracing::trace!(dispatcher_id = %id, "Audio-Frame fuer Browser verworfen");
                }
            }),
        );
        if registriert {
            Ok(())
        } else {
            Err(SignalingError::Voice(VoiceError::NichtVerbunden))
        }
    }

    /// Verarbeitet einen Binaerframe mit Mikrofon-PCM
    ///
    /// Ohne bereite Verbindung gibt es genau eine Fehlerantwort bis zum
    /// naechsten erfolgreichen Beitritt.
    pub fn pcm_verarbeiten(&mut self, pcm: &[u8]) -> Option<AusgehendeNachricht> {
        if self.manager.send_mic_audio(self.dispatcher_id, pcm) {
            return None;
        }
        if self.manager.ist_bereit(self.dispatcher_id) || self.mic_fehler_gemeldet {
            return None;
        }
        self.mic_fehler_gemeldet = true;
        Some(AusgehendeNachricht::fehler(
            "Nicht mit dem Voice-Server verbunden, bitte erneut beitreten",
        ))
    }

    /// Browser-Verbindung beendet: Disponent wird getrennt
    pub fn beenden(&self) {
        if self.manager.trennen(self.dispatcher_id) {
            tracing::info!(dispatcher_id = %self.dispatcher_id, "Browser getrennt, Session beendet");
        }
    }
}
