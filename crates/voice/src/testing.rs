//! Test-Doubles fuer Verbindung und Connector
//!
//! Nur mit Feature `test-utils` (oder in den eigenen Unit-Tests) verfuegbar.
//! Die Mocks zeichnen jeden Protokollaufruf in Reihenfolge auf.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::connection::{
    AufgebauteVerbindung, ConnectionEvent, Connector, KanalInfo, VerbindungsOptionen,
    VoiceConnection, WhisperOptionen, EREIGNIS_QUEUE_GROESSE,
};
use crate::error::{VoiceError, VoiceResult};

// ---------------------------------------------------------------------------
// MockConnection
// ---------------------------------------------------------------------------

/// Ein aufgezeichneter Protokollaufruf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aufruf {
    KanalWechsel(u32),
    Whisper { slot: u8, ziel: u32 },
    Audio(GesendetesAudio),
}

/// Ein ueber den Mock gesendeter Opus-Frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GesendetesAudio {
    pub slot: u8,
    pub letzter: bool,
    pub bytes: usize,
}

pub struct MockConnection {
    session: u32,
    bereit: AtomicBool,
    aufrufe: Mutex<Vec<Aufruf>>,
    fehler_slots: Mutex<HashSet<u8>>,
    kanal_wechsel_fehler: AtomicBool,
    ereignis_tx: Mutex<Option<mpsc::Sender<ConnectionEvent>>>,
}

impl MockConnection {
    /// Bereite Verbindung ohne Ereignis-Kanal
    pub fn bereit(session: u32) -> Arc<Self> {
        Arc::new(Self {
            session,
            bereit: AtomicBool::new(true),
            aufrufe: Mutex::new(Vec::new()),
            fehler_slots: Mutex::new(HashSet::new()),
            kanal_wechsel_fehler: AtomicBool::new(false),
            ereignis_tx: Mutex::new(None),
        })
    }

    /// Bereite Verbindung mit Ereignis-Kanal
    pub fn mit_ereignissen(session: u32) -> (Arc<Self>, mpsc::Receiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::channel(EREIGNIS_QUEUE_GROESSE);
        let verbindung = Self::bereit(session);
        *verbindung.ereignis_tx.lock() = Some(tx);
        (verbindung, rx)
    }

    /// Alle Aufrufe in Reihenfolge
    pub fn aufrufe(&self) -> Vec<Aufruf> {
        self.aufrufe.lock().clone()
    }

    pub fn aufrufe_leeren(&self) {
        self.aufrufe.lock().clear();
    }

    /// (Slot, Ziel) aller Whisper-Programmierungen
    pub fn whisper_aufrufe(&self) -> Vec<(u8, u32)> {
        self.aufrufe
            .lock()
            .iter()
            .filter_map(|a| match a {
                Aufruf::Whisper { slot, ziel } => Some((*slot, *ziel)),
                _ => None,
            })
            .collect()
    }

    pub fn audio_aufrufe(&self) -> Vec<GesendetesAudio> {
        self.aufrufe
            .lock()
            .iter()
            .filter_map(|a| match a {
                Aufruf::Audio(audio) => Some(audio.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn kanal_wechsel(&self) -> Vec<u32> {
        self.aufrufe
            .lock()
            .iter()
            .filter_map(|a| match a {
                Aufruf::KanalWechsel(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Laesst die Programmierung dieses Slots fehlschlagen
    pub fn whisper_fehler_bei_slot(&self, slot: u8) {
        self.fehler_slots.lock().insert(slot);
    }

    /// Laesst jeden weiteren Kanalwechsel fehlschlagen
    pub fn kanal_wechsel_ablehnen(&self) {
        self.kanal_wechsel_fehler.store(true, Ordering::Release);
    }

    /// Meldet einen nicht fatalen Protokollfehler wie ein kaputtes Paket
    pub async fn protokollfehler_einspeisen(&self, grund: &str) {
        let tx = self.ereignis_tx.lock().clone();
        if let Some(tx) = tx {
            let _ = tx
                .send(ConnectionEvent::Protokollfehler {
                    grund: grund.to_string(),
                })
                .await;
        }
    }

    /// Speist einen Opus-Frame eines entfernten Sprechers ein
    pub async fn audio_einspeisen(&self, remote_session: u32, opus: Vec<u8>) {
        let tx = self.ereignis_tx.lock().clone();
        if let Some(tx) = tx {
            let _ = tx
                .send(ConnectionEvent::Audio {
                    remote_session,
                    opus,
                    terminator: false,
                })
                .await;
        }
    }

    /// Simuliert einen Verbindungsverlust vom Server
    pub async fn trennung_simulieren(&self, grund: &str) {
        self.bereit.store(false, Ordering::Release);
        let tx = self.ereignis_tx.lock().take();
        if let Some(tx) = tx {
            let _ = tx
                .send(ConnectionEvent::Getrennt {
                    grund: grund.to_string(),
                })
                .await;
        }
    }

    fn aufzeichnen(&self, aufruf: Aufruf) -> VoiceResult<()> {
        if !self.ist_bereit() {
            return Err(VoiceError::NichtVerbunden);
        }
        self.aufrufe.lock().push(aufruf);
        Ok(())
    }
}

impl VoiceConnection for MockConnection {
    fn eigene_session(&self) -> u32 {
        self.session
    }

    fn kanaele(&self) -> Vec<KanalInfo> {
        vec![KanalInfo {
            id: 0,
            parent: None,
            name: "Root".into(),
        }]
    }

    fn kanal_wechseln(&self, kanal_id: u32) -> VoiceResult<()> {
        if self.kanal_wechsel_fehler.load(Ordering::Acquire) {
            return Err(VoiceError::protokoll(format!("Kanal {kanal_id} nicht erlaubt")));
        }
        self.aufzeichnen(Aufruf::KanalWechsel(kanal_id))
    }

    fn whisper_ziel_setzen(
        &self,
        slot: u8,
        ziel: u32,
        _optionen: WhisperOptionen,
    ) -> VoiceResult<()> {
        if self.fehler_slots.lock().contains(&slot) {
            return Err(VoiceError::protokoll(format!("Slot {slot} abgelehnt")));
        }
        self.aufzeichnen(Aufruf::Whisper { slot, ziel })
    }

    fn audio_senden(&self, opus: &[u8], letzter_frame: bool, slot: u8) -> VoiceResult<()> {
        self.aufzeichnen(Aufruf::Audio(GesendetesAudio {
            slot,
            letzter: letzter_frame,
            bytes: opus.len(),
        }))
    }

    fn ist_bereit(&self) -> bool {
        self.bereit.load(Ordering::Acquire)
    }

    fn schliessen(&self) {
        self.bereit.store(false, Ordering::Release);
        // Kanal schliessen, damit der Ereignis-Task endet
        self.ereignis_tx.lock().take();
    }
}

// ---------------------------------------------------------------------------
// MockConnector
// ---------------------------------------------------------------------------

/// Ausgang des naechsten Verbindungsversuchs
#[derive(Debug, Clone)]
pub enum MockVerhalten {
    Erfolg,
    Abgelehnt(String),
    Zeitlimit,
}

#[derive(Default)]
pub struct MockConnector {
    naechste_session: AtomicU32,
    verhalten: Mutex<VecDeque<MockVerhalten>>,
    optionen: Mutex<Vec<VerbindungsOptionen>>,
    verbindungen: Mutex<Vec<Arc<MockConnection>>>,
    verzoegerung: Mutex<Option<Duration>>,
}

impl MockConnector {
    pub fn neu() -> Arc<Self> {
        Arc::new(Self {
            naechste_session: AtomicU32::new(100),
            ..Default::default()
        })
    }

    /// Legt den Ausgang des naechsten Versuchs fest (danach wieder Erfolg)
    pub fn naechster_versuch(&self, verhalten: MockVerhalten) {
        self.verhalten.lock().push_back(verhalten);
    }

    /// Verzoegert jeden Verbindungsaufbau
    pub fn verzoegerung_setzen(&self, dauer: Duration) {
        *self.verzoegerung.lock() = Some(dauer);
    }

    /// Anzahl der Verbindungsversuche
    pub fn versuche(&self) -> usize {
        self.optionen.lock().len()
    }

    pub fn optionen(&self) -> Vec<VerbindungsOptionen> {
        self.optionen.lock().clone()
    }

    pub fn letzte_verbindung(&self) -> Option<Arc<MockConnection>> {
        self.verbindungen.lock().last().cloned()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn verbinden(&self, optionen: VerbindungsOptionen) -> VoiceResult<AufgebauteVerbindung> {
        let timeout = optionen.bereit_timeout;
        self.optionen.lock().push(optionen);

        let verzoegerung = *self.verzoegerung.lock();
        if let Some(dauer) = verzoegerung {
            tokio::time::sleep(dauer).await;
        }

        let verhalten = self
            .verhalten
            .lock()
            .pop_front()
            .unwrap_or(MockVerhalten::Erfolg);

        match verhalten {
            MockVerhalten::Erfolg => {
                let session = self.naechste_session.fetch_add(1, Ordering::Relaxed);
                let (verbindung, ereignisse) = MockConnection::mit_ereignissen(session);
                self.verbindungen.lock().push(Arc::clone(&verbindung));
                Ok(AufgebauteVerbindung {
                    verbindung,
                    ereignisse,
                })
            }
            MockVerhalten::Abgelehnt(grund) => Err(VoiceError::Abgelehnt(grund)),
            MockVerhalten::Zeitlimit => Err(VoiceError::Zeitlimit(timeout)),
        }
    }
}
