//! Dispatcher-Session – Zustand eines einzelnen Disponenten
//!
//! Besitzt Verbindung, Encoder, Decoder pro entferntem Sprecher,
//! PCM-Rest, logischen Kanal, Whisper-Router, Zaehler und Audio-Listener.
//! Alle Methoden sind synchron und laufen unter dem Session-Lock des
//! [`crate::manager::SessionManager`].

use funkbruecke_audio::{FrameBuffer, OpusDecoder, OpusEncoder};
use funkbruecke_core::{ChannelNumber, DispatcherId, ListenerId, SAMPLE_RATE};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use crate::connection::VoiceConnection;
use crate::diagnostics::{DiagnoseDrossel, DiagnoseZaehler};
use crate::error::{VoiceError, VoiceResult};
use crate::route_table::{CallerLookup, RouteTable};
use crate::whisper::{hoerer_aufloesen, WhisperRouter};

/// Anzahl der Hoerer in der Status-Vorschau
const VORSCHAU_HOERER: usize = 5;

// ---------------------------------------------------------------------------
// Typen
// ---------------------------------------------------------------------------

/// Lebenszyklus einer Dispatcher-Session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionZustand {
    Getrennt,
    Verbindet,
    Bereit,
    /// Bereit und mit logischem Funkkanal
    ImKanal,
}

/// Dekodiertes Audio eines entfernten Sprechers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedAudio {
    pub remote_session: u32,
    pub pcm: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

/// Callback fuer empfangenes Audio
pub type AudioListener = Arc<dyn Fn(&ReceivedAudio) + Send + Sync>;

/// Alles, was der Sendepfad aus dem Prozess-Zustand benoetigt
pub struct RoutingKontext<'a> {
    pub tabelle: &'a RouteTable,
    pub anrufer: Option<&'a dyn CallerLookup>,
    /// Ohne Route ueber Slot 0 (normales Sprechen) senden
    pub fallback_normal: bool,
}

/// Ein programmierter Slot im Status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotStatus {
    pub slot: u8,
    pub hoerer: ListenerId,
}

/// Momentaufnahme einer Session fuer den Status-Endpunkt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub dispatcher_id: DispatcherId,
    pub verbunden: bool,
    pub zustand: SessionZustand,
    pub kanal: Option<ChannelNumber>,
    pub route_mitglieder: usize,
    pub route_vorschau: Vec<ListenerId>,
    pub slots: Vec<SlotStatus>,
    pub zaehler: DiagnoseZaehler,
}

// ---------------------------------------------------------------------------
// DispatcherSession
// ---------------------------------------------------------------------------

pub struct DispatcherSession {
    id: DispatcherId,
    zustand: SessionZustand,
    verbindung: Option<Arc<dyn VoiceConnection>>,
    /// Generation der Verbindung; 0 = keine
    generation: u64,
    encoder: Option<OpusEncoder>,
    decoder: HashMap<u32, OpusDecoder>,
    puffer: FrameBuffer,
    kanal: Option<ChannelNumber>,
    router: WhisperRouter,
    /// Slots des letzten Sendevorgangs (fuer den Terminator)
    aktive_slots: Vec<u8>,
    zaehler: DiagnoseZaehler,
    drossel: DiagnoseDrossel,
    listener: Vec<AudioListener>,
}

impl DispatcherSession {
    pub fn neu(id: DispatcherId, router: WhisperRouter, drossel: DiagnoseDrossel) -> Self {
        Self {
            id,
            zustand: SessionZustand::Getrennt,
            verbindung: None,
            generation: 0,
            encoder: None,
            decoder: HashMap::new(),
            puffer: FrameBuffer::new(),
            kanal: None,
            router,
            aktive_slots: Vec::new(),
            zaehler: DiagnoseZaehler::default(),
            drossel,
            listener: Vec::new(),
        }
    }

    pub fn id(&self) -> DispatcherId {
        self.id
    }

    pub fn zustand(&self) -> SessionZustand {
        self.zustand
    }

    pub fn kanal(&self) -> Option<ChannelNumber> {
        self.kanal
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn zaehler(&self) -> &DiagnoseZaehler {
        &self.zaehler
    }

    /// Bereit heisst: Verbindung vorhanden und vom Server bestaetigt
    pub fn ist_bereit(&self) -> bool {
        self.verbindung.as_ref().is_some_and(|v| v.ist_bereit())
    }

    fn bereite_verbindung(&self) -> Option<Arc<dyn VoiceConnection>> {
        self.verbindung.as_ref().filter(|v| v.ist_bereit()).cloned()
    }

    // -----------------------------------------------------------------------
    // Lebenszyklus
    // -----------------------------------------------------------------------

    pub(crate) fn verbindet(&mut self) {
        self.zustand = SessionZustand::Verbindet;
    }

    pub(crate) fn verbindung_fehlgeschlagen(&mut self, fehler: &VoiceError) {
        self.zustand = SessionZustand::Getrennt;
        self.zaehler.verbindungs_fehler += 1;
        self.zaehler.fehler_merken(fehler);
        self.drossel.protokollieren(self.id, "verbindung-fehlgeschlagen", &self.zaehler);
    }

    pub(crate) fn verbunden(
        &mut self,
        verbindung: Arc<dyn VoiceConnection>,
        encoder: OpusEncoder,
        generation: u64,
    ) {
        self.verbindung = Some(verbindung);
        self.encoder = Some(encoder);
        self.generation = generation;
        self.zustand = SessionZustand::Bereit;
        self.zaehler.verbunden_seit = Some(chrono::Utc::now());
        self.zaehler.getrennt_um = None;
        self.drossel.protokollieren(self.id, "verbunden", &self.zaehler);
    }

    /// Raeumt die Session vollstaendig ab; mehrfacher Aufruf ist harmlos
    ///
    /// Gibt die Zaehler fuer das Diagnose-Archiv zurueck.
    pub(crate) fn abbauen(&mut self, grund: &str) -> DiagnoseZaehler {
        if let Some(verbindung) = self.verbindung.take() {
            if verbindung.ist_bereit() {
                self.terminator_senden(verbindung.as_ref());
            }
            verbindung.schliessen();
            self.zaehler.getrennt_um = Some(chrono::Utc::now());
            tracing::info!(dispatcher_id = %self.id, grund, "Dispatcher-Session abgebaut");
        }

        self.generation = 0;
        self.zustand = SessionZustand::Getrennt;
        self.encoder = None;
        self.decoder.clear();
        self.puffer.leeren();
        self.kanal = None;
        self.router.zuruecksetzen();
        self.aktive_slots.clear();
        self.listener.clear();
        self.zaehler.clone()
    }

    // -----------------------------------------------------------------------
    // Kanaele
    // -----------------------------------------------------------------------

    /// Tritt einem logischen Funkkanal bei (`None` = nur Root)
    ///
    /// Der eigene Benutzer wird immer in den Root-Kanal verschoben; der
    /// Funkkanal existiert nur als Whisper-Ziel.
    pub fn kanal_beitreten(
        &mut self,
        kanal: Option<ChannelNumber>,
        kontext: &RoutingKontext<'_>,
    ) -> VoiceResult<()> {
        let verbindung = self.bereite_verbindung().ok_or(VoiceError::NichtVerbunden)?;

        if self.kanal != kanal {
            // Laufender Sprachstrom endet bei den Hoerern des alten Kanals
            if !self.aktive_slots.is_empty() {
                self.terminator_senden(verbindung.as_ref());
            }
            self.router.zuruecksetzen();
        }

        self.nach_root(verbindung.as_ref());
        self.kanal = kanal;
        self.zustand = if kanal.is_some() {
            SessionZustand::ImKanal
        } else {
            SessionZustand::Bereit
        };

        if let Some(kanal) = kanal {
            self.ziele_aktualisieren(kanal, kontext, verbindung.as_ref());
        }

        tracing::info!(
            dispatcher_id = %self.id,
            kanal = ?kanal.map(|k| k.inner()),
            slots = self.router.slots().len(),
            "Funkkanal beigetreten"
        );
        self.drossel.protokollieren(self.id, "kanal-beigetreten", &self.zaehler);
        Ok(())
    }

    /// Verlaesst den logischen Funkkanal
    pub fn kanal_verlassen(&mut self) -> VoiceResult<()> {
        let verbindung = self.bereite_verbindung().ok_or(VoiceError::NichtVerbunden)?;

        self.terminator_senden(verbindung.as_ref());
        self.nach_root(verbindung.as_ref());
        self.router.zuruecksetzen();
        self.kanal = None;
        self.zustand = SessionZustand::Bereit;

        tracing::info!(dispatcher_id = %self.id, "Funkkanal verlassen");
        self.drossel.protokollieren(self.id, "kanal-verlassen", &self.zaehler);
        Ok(())
    }

    /// Bewertet die Whisper-Ziele nach einem Tabellenwechsel neu
    pub(crate) fn routen_neu_bewerten(&mut self, kontext: &RoutingKontext<'_>) {
        let (Some(verbindung), Some(kanal)) = (self.bereite_verbindung(), self.kanal) else {
            return;
        };
        self.ziele_aktualisieren(kanal, kontext, verbindung.as_ref());
    }

    /// Programmiert die Whisper-Ziele; abgelehnte Slots zaehlen als Protokollfehler
    fn ziele_aktualisieren(
        &mut self,
        kanal: ChannelNumber,
        kontext: &RoutingKontext<'_>,
        verbindung: &dyn VoiceConnection,
    ) -> Vec<u8> {
        let slots = self
            .router
            .aktualisieren(kanal, kontext.tabelle, kontext.anrufer, verbindung)
            .iter()
            .map(|(slot, _)| *slot)
            .collect();
        for fehler in self.router.fehler_abholen() {
            self.protokollfehler(&fehler);
        }
        slots
    }

    fn nach_root(&mut self, verbindung: &dyn VoiceConnection) {
        if let Err(e) = verbindung.kanal_wechseln(verbindung.root_kanal()) {
            tracing::warn!(dispatcher_id = %self.id, fehler = %e, "Wechsel in Root-Kanal fehlgeschlagen");
            self.protokollfehler(&format!("Wechsel in Root-Kanal fehlgeschlagen: {e}"));
        }
    }

    /// Zaehlt einen Fehler, nach dem die Session weiterlaeuft
    pub(crate) fn protokollfehler(&mut self, grund: &str) {
        self.zaehler.protokoll_fehler += 1;
        self.zaehler.fehler_merken(grund);
        self.drossel.protokollieren(self.id, "protokollfehler", &self.zaehler);
    }

    /// Sendet einen Stille-Frame mit Terminator auf den zuletzt genutzten Slots
    fn terminator_senden(&mut self, verbindung: &dyn VoiceConnection) {
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };
        let stille = match encoder.encode_stille() {
            Ok(s) => s,
            Err(e) => {
                self.zaehler.fehler_merken(e);
                return;
            }
        };

        let slots = if self.aktive_slots.is_empty() {
            vec![0]
        } else {
            std::mem::take(&mut self.aktive_slots)
        };
        for slot in slots {
            if let Err(e) = verbindung.audio_senden(&stille, true, slot) {
                tracing::debug!(dispatcher_id = %self.id, slot, fehler = %e, "Terminator nicht gesendet");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Audio
    // -----------------------------------------------------------------------

    /// Verarbeitet Mikrofon-PCM; true wenn mindestens ein Paket gesendet wurde
    pub fn mic_audio(&mut self, pcm: &[u8], kontext: &RoutingKontext<'_>) -> bool {
        let Some(verbindung) = self.bereite_verbindung() else {
            return false;
        };

        self.zaehler.mic_pakete_ein += 1;
        self.zaehler.mic_bytes_ein += pcm.len() as u64;

        let frames = self.puffer.push(pcm);
        let mut gesendet = false;

        for frame in frames {
            let Some(encoder) = self.encoder.as_mut() else {
                self.zaehler.frames_verworfen += 1;
                continue;
            };
            let opus = match encoder.encode_frame(&frame) {
                Ok(opus) => {
                    self.zaehler.frames_kodiert += 1;
                    opus
                }
                Err(e) => {
                    tracing::debug!(dispatcher_id = %self.id, fehler = %e, "Frame nicht kodierbar");
                    self.zaehler.frames_verworfen += 1;
                    self.zaehler.fehler_merken(e);
                    continue;
                }
            };

            let mut slots = match self.kanal {
                Some(kanal) => self.ziele_aktualisieren(kanal, kontext, verbindung.as_ref()),
                None => Vec::new(),
            };

            if slots.is_empty() {
                self.zaehler.keine_route += 1;
                if !kontext.fallback_normal {
                    continue;
                }
                slots.push(0);
            }

            for slot in &slots {
                match verbindung.audio_senden(&opus, false, *slot) {
                    Ok(()) => {
                        self.zaehler.frames_gesendet += 1;
                        gesendet = true;
                    }
                    Err(e) => {
                        tracing::trace!(dispatcher_id = %self.id, slot, fehler = %e, "Frame verworfen");
                        self.zaehler.frames_verworfen += 1;
                        self.zaehler.fehler_merken(e);
                    }
                }
            }
            self.aktive_slots = slots;
        }

        self.drossel.protokollieren(self.id, "verkehr", &self.zaehler);
        gesendet
    }

    /// Dekodiert eingehendes Audio eines entfernten Sprechers
    ///
    /// Gibt das dekodierte Audio und die zu benachrichtigenden Listener
    /// zurueck; die Callbacks werden ausserhalb des Session-Locks aufgerufen.
    pub fn eingehendes_audio(
        &mut self,
        remote_session: u32,
        opus: &[u8],
    ) -> Option<(ReceivedAudio, Vec<AudioListener>)> {
        self.zaehler.eingehende_pakete += 1;
        self.zaehler.eingehende_bytes += opus.len() as u64;

        if opus.is_empty() {
            return None;
        }

        let decoder = match self.decoder.entry(remote_session) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => match OpusDecoder::neu() {
                Ok(d) => e.insert(d),
                Err(err) => {
                    self.zaehler.dekodier_fehler += 1;
                    self.zaehler.fehler_merken(err);
                    return None;
                }
            },
        };

        let pcm = match decoder.decode_frame(opus) {
            Ok(pcm) => pcm,
            Err(e) => {
                tracing::trace!(dispatcher_id = %self.id, remote_session, fehler = %e, "Dekodierfehler");
                self.zaehler.dekodier_fehler += 1;
                self.zaehler.fehler_merken(e);
                return None;
            }
        };

        self.drossel.protokollieren(self.id, "verkehr", &self.zaehler);

        if self.listener.is_empty() {
            return None;
        }

        let audio = ReceivedAudio {
            remote_session,
            pcm,
            sample_rate: SAMPLE_RATE,
            channels: 1,
            bits_per_sample: 16,
        };
        Some((audio, self.listener.clone()))
    }

    pub fn listener_registrieren(&mut self, listener: AudioListener) {
        self.listener.push(listener);
    }

    /// Anzahl der gehaltenen Decoder (einer pro entferntem Sprecher)
    pub fn decoder_anzahl(&self) -> usize {
        self.decoder.len()
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    pub fn status(&self, kontext: &RoutingKontext<'_>) -> SessionStatus {
        let mitglieder = self
            .kanal
            .map(|k| hoerer_aufloesen(k, kontext.tabelle, kontext.anrufer))
            .unwrap_or_default();

        SessionStatus {
            dispatcher_id: self.id,
            verbunden: self.ist_bereit(),
            zustand: self.zustand,
            kanal: self.kanal,
            route_mitglieder: mitglieder.len(),
            route_vorschau: mitglieder.into_iter().take(VORSCHAU_HOERER).collect(),
            slots: self
                .router
                .slots()
                .iter()
                .map(|(slot, hoerer)| SlotStatus {
                    slot: *slot,
                    hoerer: *hoerer,
                })
                .collect(),
            zaehler: self.zaehler.clone(),
        }
    }
}
