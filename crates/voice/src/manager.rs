//! Session-Manager – Register aller Dispatcher-Sessions
//!
//! Der `SessionManager` ist der einzige Einstiegspunkt fuer Signaling und
//! HTTP-Schicht. Er haelt pro Dispatcher einen `SessionSlot`, die
//! prozessweite Routing-Tabelle und ein kurzlebiges Archiv der Zaehler
//! beendeter Sessions.
//!
//! ## Nebenlaeufigkeit
//! - `DashMap<DispatcherId, Arc<SessionSlot>>` als Register
//! - pro Slot ein `tokio::sync::Mutex<()>` fuer den Verbindungsaufbau
//! - pro Slot ein `parking_lot::Mutex<DispatcherSession>` fuer die
//!   synchrone Arbeit pro Frame (nie ueber ein `.await` gehalten)
//! - Session-Locks werden nie gehalten, waehrend das Register gesperrt ist

use dashmap::DashMap;
use funkbruecke_audio::{OpusEncoder, STANDARD_BITRATE_KBPS};
use funkbruecke_core::{ChannelNumber, DispatcherId, ListenerId};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::connection::{ConnectionEvent, Connector, VerbindungsOptionen, WhisperOptionen};
use crate::diagnostics::{DiagnoseDrossel, DiagnoseZaehler, STANDARD_DIAGNOSE_INTERVALL};
use crate::error::{VoiceError, VoiceResult};
use crate::route_table::{CallerLookup, RouteTable, RouteTableHandle};
use crate::session::{AudioListener, DispatcherSession, RoutingKontext, SessionStatus};
use crate::whisper::WhisperRouter;

/// Wie lange die Zaehler einer beendeten Session im Status sichtbar bleiben
pub const ARCHIV_DAUER: Duration = Duration::from_secs(10 * 60);

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Einstellungen des Session-Managers
#[derive(Debug, Clone)]
pub struct ManagerKonfiguration {
    pub host: String,
    pub port: u16,
    pub passwort: Option<String>,
    pub tls_pruefen: bool,
    /// Wird jedem Anzeigenamen vorangestellt
    pub name_praefix: String,
    pub bereit_timeout: Duration,
    pub ping_intervall: Duration,
    /// Ohne Route ueber Slot 0 senden
    pub fallback_normal_talk: bool,
    pub bitrate_kbps: u32,
    pub diagnose_intervall: Duration,
    pub whisper: WhisperOptionen,
}

impl Default for ManagerKonfiguration {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 64738,
            passwort: None,
            tls_pruefen: false,
            name_praefix: "[CAD] ".into(),
            bereit_timeout: Duration::from_secs(15),
            ping_intervall: Duration::from_secs(15),
            fallback_normal_talk: true,
            bitrate_kbps: STANDARD_BITRATE_KBPS,
            diagnose_intervall: STANDARD_DIAGNOSE_INTERVALL,
            whisper: WhisperOptionen::default(),
        }
    }
}

impl ManagerKonfiguration {
    /// Anzeigename auf dem Voice-Server: `"{praefix}{name} #{id}"`
    pub fn anzeigename(&self, id: DispatcherId, name: &str) -> String {
        format!("{}{} #{}", self.name_praefix, name, id.inner())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Ergebnis von [`SessionManager::verbinden`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbindungsErgebnis {
    Neu,
    BereitsVerbunden,
}

/// Groesse der aktuellen Routing-Tabelle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutenStatus {
    pub kanaele: usize,
    pub hoerer: usize,
}

/// Zaehler einer kuerzlich beendeten Session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeendeteSession {
    pub dispatcher_id: DispatcherId,
    pub zaehler: DiagnoseZaehler,
}

/// Momentaufnahme der gesamten Bruecke
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub sessions: Vec<SessionStatus>,
    pub routen: RoutenStatus,
    pub beendet: Vec<BeendeteSession>,
}

// ---------------------------------------------------------------------------
// SessionSlot
// ---------------------------------------------------------------------------

struct SessionSlot {
    /// Serialisiert Verbindungsaufbauten fuer dieselbe ID
    verbinden_lock: tokio::sync::Mutex<()>,
    session: Mutex<DispatcherSession>,
    /// Aus dem Register entfernt; gesetzt vor dem Abbau unter dem Session-Lock
    entfernt: AtomicBool,
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Register aller Dispatcher-Sessions
///
/// Thread-safe und `Clone`-faehig (innerer Arc).
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionManagerInner>,
}

struct SessionManagerInner {
    konfiguration: ManagerKonfiguration,
    connector: Arc<dyn Connector>,
    anrufer: Option<Arc<dyn CallerLookup>>,
    sessions: DashMap<DispatcherId, Arc<SessionSlot>>,
    routen: RouteTableHandle,
    archiv: DashMap<DispatcherId, (Instant, DiagnoseZaehler)>,
    generation: AtomicU64,
}

impl SessionManager {
    pub fn neu(
        konfiguration: ManagerKonfiguration,
        connector: Arc<dyn Connector>,
        anrufer: Option<Arc<dyn CallerLookup>>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionManagerInner {
                konfiguration,
                connector,
                anrufer,
                sessions: DashMap::new(),
                routen: RouteTableHandle::neu(),
                archiv: DashMap::new(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn konfiguration(&self) -> &ManagerKonfiguration {
        &self.inner.konfiguration
    }

    fn slot(&self, id: DispatcherId) -> Option<Arc<SessionSlot>> {
        self.inner.sessions.get(&id).map(|s| Arc::clone(s.value()))
    }

    fn alle_slots(&self) -> Vec<Arc<SessionSlot>> {
        self.inner
            .sessions
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    fn kontext<'a>(&'a self, tabelle: &'a RouteTable) -> RoutingKontext<'a> {
        RoutingKontext {
            tabelle,
            anrufer: self.inner.anrufer.as_deref(),
            fallback_normal: self.inner.konfiguration.fallback_normal_talk,
        }
    }

    // -----------------------------------------------------------------------
    // Verbindungsaufbau und Abbau
    // -----------------------------------------------------------------------

    /// Verbindet einen Dispatcher mit dem Voice-Server
    ///
    /// Ist bereits eine bereite Verbindung vorhanden, passiert nichts.
    /// Wartet hoechstens `bereit_timeout` auf die Bereitschaft.
    pub async fn verbinden(
        &self,
        id: DispatcherId,
        name: &str,
    ) -> VoiceResult<VerbindungsErgebnis> {
        let konfig = &self.inner.konfiguration;

        let slot = Arc::clone(&self.inner.sessions.entry(id).or_insert_with(|| {
            Arc::new(SessionSlot {
                verbinden_lock: tokio::sync::Mutex::new(()),
                session: Mutex::new(DispatcherSession::neu(
                    id,
                    WhisperRouter::neu(konfig.whisper),
                    DiagnoseDrossel::neu(konfig.diagnose_intervall),
                )),
                entfernt: AtomicBool::new(false),
            })
        }));

        let _aufbau = slot.verbinden_lock.lock().await;

        {
            let mut session = slot.session.lock();
            if session.ist_bereit() {
                tracing::debug!(dispatcher_id = %id, "Bereits verbunden");
                return Ok(VerbindungsErgebnis::BereitsVerbunden);
            }
            session.verbindet();
        }

        let optionen = VerbindungsOptionen {
            host: konfig.host.clone(),
            port: konfig.port,
            passwort: konfig.passwort.clone(),
            benutzername: konfig.anzeigename(id, name),
            tls_pruefen: konfig.tls_pruefen,
            bereit_timeout: konfig.bereit_timeout,
            ping_intervall: konfig.ping_intervall,
        };

        tracing::info!(
            dispatcher_id = %id,
            benutzername = %optionen.benutzername,
            "Verbinde Dispatcher mit Voice-Server"
        );

        let ergebnis = match OpusEncoder::neu(konfig.bitrate_kbps) {
            Ok(encoder) => self
                .inner
                .connector
                .verbinden(optionen)
                .await
                .map(|aufgebaut| (encoder, aufgebaut)),
            Err(e) => Err(VoiceError::from(e)),
        };

        let (encoder, aufgebaut) = match ergebnis {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!(dispatcher_id = %id, fehler = %e, "Verbindungsaufbau fehlgeschlagen");
                slot.session.lock().verbindung_fehlgeschlagen(&e);
                return Err(e);
            }
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        {
            // Pruefung und Uebernahme unter demselben Lock wie der Abbau in `trennen`
            let mut session = slot.session.lock();
            if slot.entfernt.load(Ordering::Acquire) {
                drop(session);
                aufgebaut.verbindung.schliessen();
                tracing::debug!(dispatcher_id = %id, "Session waehrend des Aufbaus beendet");
                return Err(VoiceError::verbindung(
                    "Session waehrend des Verbindungsaufbaus beendet",
                ));
            }
            session.verbunden(aufgebaut.verbindung, encoder, generation);
        }
        self.inner.archiv.remove(&id);

        tokio::spawn(ereignis_schleife(
            self.clone(),
            id,
            Arc::clone(&slot),
            generation,
            aufgebaut.ereignisse,
        ));

        Ok(VerbindungsErgebnis::Neu)
    }

    /// Trennt einen Dispatcher und gibt alle Ressourcen frei
    ///
    /// Unbekannte oder bereits getrennte Sessions sind kein Fehler;
    /// Rueckgabe true wenn eine Session abgebaut wurde.
    pub fn trennen(&self, id: DispatcherId) -> bool {
        let Some((_, slot)) = self.inner.sessions.remove(&id) else {
            return false;
        };
        slot.entfernt.store(true, Ordering::Release);
        let zaehler = slot.session.lock().abbauen("Getrennt durch Dispatcher");
        self.archivieren(id, zaehler);
        true
    }

    /// Trennt alle Dispatcher (Shutdown)
    pub fn alle_trennen(&self) -> usize {
        let ids: Vec<DispatcherId> = self.inner.sessions.iter().map(|e| *e.key()).collect();
        ids.into_iter().filter(|id| self.trennen(*id)).count()
    }

    /// Abbau nach Verbindungsverlust; ignoriert veraltete Generationen
    fn verbindung_verloren(
        &self,
        id: DispatcherId,
        slot: &Arc<SessionSlot>,
        generation: u64,
        grund: &str,
    ) {
        let zaehler = {
            let mut session = slot.session.lock();
            if session.generation() != generation {
                tracing::debug!(dispatcher_id = %id, "Veraltetes Trennungs-Ereignis ignoriert");
                return;
            }
            slot.entfernt.store(true, Ordering::Release);
            session.abbauen(grund)
        };

        self.inner
            .sessions
            .remove_if(&id, |_, s| Arc::ptr_eq(s, slot));
        self.archivieren(id, zaehler);
        tracing::warn!(dispatcher_id = %id, grund, "Voice-Verbindung verloren, Session entfernt");
    }

    fn archivieren(&self, id: DispatcherId, zaehler: DiagnoseZaehler) {
        self.inner.archiv.insert(id, (Instant::now(), zaehler));
    }

    // -----------------------------------------------------------------------
    // Kanaele
    // -----------------------------------------------------------------------

    /// Tritt einem logischen Funkkanal bei; erfordert eine bereite Verbindung
    pub fn kanal_beitreten(&self, id: DispatcherId, kanal: Option<ChannelNumber>) -> VoiceResult<()> {
        let slot = self.slot(id).ok_or(VoiceError::NichtVerbunden)?;
        let tabelle = self.inner.routen.aktuell();
        let kontext = self.kontext(&tabelle);
        let ergebnis = slot.session.lock().kanal_beitreten(kanal, &kontext);
        ergebnis
    }

    /// Verlaesst den logischen Funkkanal
    pub fn kanal_verlassen(&self, id: DispatcherId) -> VoiceResult<()> {
        let slot = self.slot(id).ok_or(VoiceError::NichtVerbunden)?;
        let ergebnis = slot.session.lock().kanal_verlassen();
        ergebnis
    }

    // -----------------------------------------------------------------------
    // Audio
    // -----------------------------------------------------------------------

    /// Sendet Mikrofon-PCM; false wenn nichts uebertragen wurde
    pub fn send_mic_audio(&self, id: DispatcherId, pcm: &[u8]) -> bool {
        let Some(slot) = self.slot(id) else {
            return false;
        };
        let tabelle = self.inner.routen.aktuell();
        let kontext = self.kontext(&tabelle);
        let gesendet = slot.session.lock().mic_audio(pcm, &kontext);
        gesendet
    }

    /// Registriert einen Callback fuer dekodiertes Audio
    ///
    /// Listener leben so lange wie die Session.
    pub fn register_audio_listener(&self, id: DispatcherId, listener: AudioListener) -> bool {
        match self.slot(id) {
            Some(slot) => {
                slot.session.lock().listener_registrieren(listener);
                true
            }
            None => false,
        }
    }

    pub fn ist_bereit(&self, id: DispatcherId) -> bool {
        self.slot(id).is_some_and(|s| s.session.lock().ist_bereit())
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    /// Ersetzt die Routing-Tabelle und bewertet alle bereiten Sessions neu
    pub fn replace_routes<I>(&self, zuordnung: I)
    where
        I: IntoIterator<Item = (ChannelNumber, Vec<ListenerId>)>,
    {
        self.inner.routen.ersetzen(RouteTable::aus_zuordnung(zuordnung));
        self.routen_neu_bewerten();
    }

    /// Bewertet die Whisper-Ziele aller Sessions neu (z.B. nach einem Notruf-Update)
    pub fn routen_neu_bewerten(&self) {
        let tabelle = self.inner.routen.aktuell();
        let kontext = self.kontext(&tabelle);
        for slot in self.alle_slots() {
            slot.session.lock().routen_neu_bewerten(&kontext);
        }
    }

    /// Aktuelle Routing-Tabelle
    pub fn routen(&self) -> Arc<RouteTable> {
        self.inner.routen.aktuell()
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    pub fn status(&self) -> BridgeStatus {
        let tabelle = self.inner.routen.aktuell();
        let kontext = self.kontext(&tabelle);

        let mut sessions: Vec<SessionStatus> = self
            .alle_slots()
            .iter()
            .map(|slot| slot.session.lock().status(&kontext))
            .collect();
        sessions.sort_by_key(|s| s.dispatcher_id);

        self.inner
            .archiv
            .retain(|_, (zeitpunkt, _)| zeitpunkt.elapsed() < ARCHIV_DAUER);
        let mut beendet: Vec<BeendeteSession> = self
            .inner
            .archiv
            .iter()
            .map(|e| BeendeteSession {
                dispatcher_id: *e.key(),
                zaehler: e.value().1.clone(),
            })
            .collect();
        beendet.sort_by_key(|b| b.dispatcher_id);

        BridgeStatus {
            sessions,
            routen: RoutenStatus {
                kanaele: tabelle.kanal_anzahl(),
                hoerer: tabelle.hoerer_anzahl(),
            },
            beendet,
        }
    }

    /// Anzahl registrierter Sessions
    pub fn session_anzahl(&self) -> usize {
        self.inner.sessions.len()
    }
}

// ---------------------------------------------------------------------------
// Ereignis-Task
// ---------------------------------------------------------------------------

/// Verarbeitet die Ereignisse einer einzelnen Verbindung
async fn ereignis_schleife(
    manager: SessionManager,
    id: DispatcherId,
    slot: Arc<SessionSlot>,
    generation: u64,
    mut ereignisse: mpsc::Receiver<ConnectionEvent>,
) {
    while let Some(ereignis) = ereignisse.recv().await {
        match ereignis {
            ConnectionEvent::Audio {
                remote_session,
                opus,
                ..
            } => {
                let zustellung = {
                    let mut session = slot.session.lock();
                    if session.generation() != generation {
                        break;
                    }
                    session.eingehendes_audio(remote_session, &opus)
                };
                if let Some((audio, listener)) = zustellung {
                    for l in &listener {
                        l(&audio);
                    }
                }
            }
            ConnectionEvent::Protokollfehler { grund } => {
                let mut session = slot.session.lock();
                if session.generation() != generation {
                    break;
                }
                session.protokollfehler(&grund);
            }
            ConnectionEvent::Getrennt { grund } => {
                manager.verbindung_verloren(id, &slot, generation, &grund);
                break;
            }
        }
    }
    tracing::trace!(dispatcher_id = %id, generation, "Ereignis-Task beendet");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockConnector, MockVerhalten};
    use crate::connection::VoiceConnection;

    fn manager(connector: &Arc<MockConnector>) -> SessionManager {
        SessionManager::neu(
            ManagerKonfiguration::default(),
            Arc::clone(connector) as Arc<dyn Connector>,
            None,
        )
    }

    #[test]
    fn anzeigename_mit_praefix() {
        let konfig = ManagerKonfiguration::default();
        assert_eq!(konfig.anzeigename(DispatcherId(4), "Anna"), "[CAD] Anna #4");
    }

    #[tokio::test]
    async fn zweiter_verbindungsaufbau_ist_noop() {
        let connector = MockConnector::neu();
        let m = manager(&connector);

        assert_eq!(
            m.verbinden(DispatcherId(1), "A").await.unwrap(),
            VerbindungsErgebnis::Neu
        );
        assert_eq!(
            m.verbinden(DispatcherId(1), "A").await.unwrap(),
            VerbindungsErgebnis::BereitsVerbunden
        );
        assert_eq!(connector.versuche(), 1);
        assert_eq!(connector.optionen()[0].benutzername, "[CAD] A #1");
    }

    #[tokio::test]
    async fn gleichzeitige_verbindungen_bauen_nur_eine_auf() {
        let connector = MockConnector::neu();
        connector.verzoegerung_setzen(Duration::from_millis(20));
        let m = manager(&connector);

        let (a, b) = tokio::join!(
            m.verbinden(DispatcherId(2), "B"),
            m.verbinden(DispatcherId(2), "B")
        );
        let mut ergebnisse = vec![a.unwrap(), b.unwrap()];
        ergebnisse.sort_by_key(|e| *e == VerbindungsErgebnis::Neu);
        assert_eq!(
            ergebnisse,
            vec![VerbindungsErgebnis::BereitsVerbunden, VerbindungsErgebnis::Neu]
        );
        assert_eq!(connector.versuche(), 1);
    }

    #[tokio::test]
    async fn fehlgeschlagener_aufbau_wird_gezaehlt() {
        let connector = MockConnector::neu();
        connector.naechster_versuch(MockVerhalten::Abgelehnt("ServerFull".into()));
        let m = manager(&connector);

        let fehler = m.verbinden(DispatcherId(3), "C").await.unwrap_err();
        assert!(matches!(fehler, VoiceError::Abgelehnt(_)));
        assert!(!m.ist_bereit(DispatcherId(3)));

        let status = m.status();
        assert_eq!(status.sessions[0].zaehler.verbindungs_fehler, 1);

        // Zweiter Versuch gelingt
        m.verbinden(DispatcherId(3), "C").await.unwrap();
        assert!(m.ist_bereit(DispatcherId(3)));
    }

    #[tokio::test]
    async fn trennen_unbekannt_und_doppelt_ist_noop() {
        let connector = MockConnector::neu();
        let m = manager(&connector);

        assert!(!m.trennen(DispatcherId(9)));

        m.verbinden(DispatcherId(9), "D").await.unwrap();
        assert!(m.trennen(DispatcherId(9)));
        assert!(!m.trennen(DispatcherId(9)));
        assert_eq!(m.session_anzahl(), 0);
        assert_eq!(m.status().beendet.len(), 1);
    }

    #[tokio::test]
    async fn alle_trennen_beim_shutdown() {
        let connector = MockConnector::neu();
        let m = manager(&connector);
        for id in 1..=3 {
            m.verbinden(DispatcherId(id), "X").await.unwrap();
        }

        assert_eq!(m.alle_trennen(), 3);
        assert_eq!(m.session_anzahl(), 0);
        assert_eq!(m.status().beendet.len(), 3);
    }

    #[tokio::test]
    async fn nicht_verbundene_session_lehnt_audio_ab() {
        let connector = MockConnector::neu();
        let m = manager(&connector);
        assert!(!m.send_mic_audio(DispatcherId(5), &[0u8; 1920]));
        assert!(!m.register_audio_listener(
            DispatcherId(5),
            Arc::new(|_: &crate::session::ReceivedAudio| {})
        ));
        assert!(matches!(
            m.kanal_beitreten(DispatcherId(5), Some(ChannelNumber(1))),
            Err(VoiceError::NichtVerbunden)
        ));
    }

    #[tokio::test]
    async fn zeitlimit_beim_aufbau_wird_gezaehlt() {
        let connector = MockConnector::neu();
        connector.naechster_versuch(MockVerhalten::Zeitlimit);
        let m = manager(&connector);

        let fehler = m.verbinden(DispatcherId(6), "F").await.unwrap_err();
        assert!(matches!(fehler, VoiceError::Zeitlimit(d) if d == ManagerKonfiguration::default().bereit_timeout));

        let status = m.status();
        assert_eq!(status.sessions[0].zaehler.verbindungs_fehler, 1);
        assert_eq!(status.sessions[0].zustand, crate::session::SessionZustand::Getrennt);
        assert!(status.sessions[0]
            .zaehler
            .letzter_fehler
            .as_deref()
            .is_some_and(|f| f.contains("15")));
    }

    #[tokio::test(start_paused = true)]
    async fn trennen_waehrend_des_aufbaus_schliesst_neue_verbindung() {
        let connector = MockConnector::neu();
        connector.verzoegerung_setzen(Duration::from_millis(50));
        let m = manager(&connector);

        let aufbau = {
            let m = m.clone();
            tokio::spawn(async move { m.verbinden(DispatcherId(7), "G").await })
        };
        // Aufbau haengt in der Verzoegerung des Connectors
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(m.trennen(DispatcherId(7)));

        let fehler = aufbau.await.unwrap().unwrap_err();
        assert!(matches!(fehler, VoiceError::Verbindung(_)));

        let verbindung = connector.letzte_verbindung().unwrap();
        assert!(!verbindung.ist_bereit());
        assert_eq!(m.session_anzahl(), 0);
        assert!(!m.ist_bereit(DispatcherId(7)));

        // Neuer Aufbau legt einen frischen Slot an
        assert_eq!(
            m.verbinden(DispatcherId(7), "G").await.unwrap(),
            VerbindungsErgebnis::Neu
        );
    }

    #[tokio::test]
    async fn protokollfehler_der_verbindung_werden_gezaehlt() {
        let connector = MockConnector::neu();
        let m = manager(&connector);
        m.verbinden(DispatcherId(8), "H").await.unwrap();
        let verbindung = connector.letzte_verbindung().unwrap();

        verbindung.protokollfehler_einspeisen("Nachricht Typ 7 verworfen").await;
        verbindung.protokollfehler_einspeisen("Ungueltiges Voice-Paket").await;

        // Ereignis-Task verarbeitet asynchron
        for _ in 0..50 {
            if m.status().sessions[0].zaehler.protokoll_fehler == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        let status = m.status();
        assert_eq!(status.sessions[0].zaehler.protokoll_fehler, 2);
        assert_eq!(
            status.sessions[0].zaehler.letzter_fehler.as_deref(),
            Some("Ungueltiges Voice-Paket")
        );
        assert!(m.ist_bereit(DispatcherId(8)));
    }
}
