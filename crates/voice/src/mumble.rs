//! Mumble-Client – TLS-Verbindung zum Voice-Server
//!
//! Pro Dispatcher wird eine eigene Verbindung aufgebaut. Nach dem
//! Verbindungsaufbau laufen drei Tasks:
//!
//! ```text
//! Befehle (mpsc) --> Schreib-Task --> Framed<Stream, MumbleCodec>
//! Ping-Intervall --> Befehle (mpsc)                  |
//!                                                    v
//!                  ConnectionEvent (mpsc) <-- Lese-Task
//! ```
//!
//! Alle Tasks beenden sich, sobald die `MumbleConnection` geschlossen oder
//! gedroppt wird (watch-Kanal). Das gilt auch fuer fehlgeschlagene
//! Verbindungsversuche.
//!
//! Anmeldung und Tasks sind generisch ueber den Stream; TLS kommt nur im
//! [`MumbleConnector`] dazu.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use funkbruecke_core::MAX_WHISPER_SLOTS;
use funkbruecke_protocol::control::{ChannelState, ControlMessage};
use funkbruecke_protocol::voice::{AusgehendesAudio, EingehendesAudio};
use funkbruecke_protocol::MumbleCodec;
use parking_lot::Mutex;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;

use crate::connection::{
    AufgebauteVerbindung, ConnectionEvent, Connector, KanalInfo, VerbindungsOptionen,
    VoiceConnection, WhisperOptionen, EREIGNIS_QUEUE_GROESSE,
};
use crate::error::{VoiceError, VoiceResult};

/// Kapazitaet der ausgehenden Befehls-Queue
const BEFEHL_QUEUE_GROESSE: usize = 512;

/// Release-String in der Versionsnachricht
const RELEASE: &str = concat!("funkbruecke ", env!("CARGO_PKG_VERSION"));

type MumbleFramed<S> = Framed<S, MumbleCodec>;

// ---------------------------------------------------------------------------
// MumbleConnector
// ---------------------------------------------------------------------------

/// Baut TLS-Verbindungen zu einem Mumble-Server auf
#[derive(Debug, Default, Clone)]
pub struct MumbleConnector;

impl MumbleConnector {
    pub fn neu() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for MumbleConnector {
    async fn verbinden(&self, optionen: VerbindungsOptionen) -> VoiceResult<AufgebauteVerbindung> {
        let tls = tls_connector(optionen.tls_pruefen)?;

        let tcp = TcpStream::connect((optionen.host.as_str(), optionen.port)).await?;
        tcp.set_nodelay(true)?;

        let server_name = ServerName::try_from(optionen.host.clone())
            .map_err(|e| VoiceError::verbindung(format!("Ungueltiger Hostname: {e}")))?;
        let stream = tls
            .connect(server_name, tcp)
            .await
            .map_err(|e| VoiceError::verbindung(format!("TLS-Handshake: {e}")))?;

        anmelden(stream, &optionen).await
    }
}

/// Meldet sich auf einem verbundenen Stream an und wartet auf `ServerSync`
///
/// # Fehler
/// - `Abgelehnt` wenn der Server mit `Reject` antwortet
/// - `VorBereitschaftGetrennt` wenn der Stream vor `ServerSync` endet
/// - `Zeitlimit` nach `bereit_timeout` ohne `ServerSync`
async fn anmelden<S>(stream: S, optionen: &VerbindungsOptionen) -> VoiceResult<AufgebauteVerbindung>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut framed = Framed::new(stream, MumbleCodec::new());

    // Handshake: Version, dann Anmeldung
    framed.send(ControlMessage::version(RELEASE)).await?;
    framed
        .send(ControlMessage::authenticate(
            optionen.benutzername.clone(),
            optionen.passwort.clone(),
        ))
        .await?;

    tracing::debug!(
        host = %optionen.host,
        port = optionen.port,
        benutzername = %optionen.benutzername,
        "Anmeldung gesendet, warte auf ServerSync"
    );

    let (verbindung, ereignisse, bereit_rx) = MumbleConnection::starten(framed, optionen);

    // Bei Fehler wird `verbindung` hier gedroppt und beendet alle Tasks
    match tokio::time::timeout(optionen.bereit_timeout, bereit_rx).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => return Err(e),
        Ok(Err(_)) => {
            return Err(VoiceError::VorBereitschaftGetrennt(
                "Lese-Task beendet".into(),
            ))
        }
        Err(_) => return Err(VoiceError::Zeitlimit(optionen.bereit_timeout)),
    }

    tracing::info!(
        session = verbindung.eigene_session(),
        benutzername = %optionen.benutzername,
        "Voice-Verbindung bereit"
    );

    Ok(AufgebauteVerbindung {
        verbindung,
        ereignisse,
    })
}

/// Erstellt den TLS-Connector; ohne Pruefung wird jedes Zertifikat akzeptiert
fn tls_connector(pruefen: bool) -> VoiceResult<TlsConnector> {
    let builder =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| VoiceError::verbindung(format!("TLS-Konfiguration: {e}")))?;

    let config = if pruefen {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(OhnePruefung))
            .with_no_client_auth()
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Akzeptiert jedes Server-Zertifikat (Voice-Server sind meist selbstsigniert)
#[derive(Debug)]
struct OhnePruefung;

impl rustls::client::danger::ServerCertVerifier for OhnePruefung {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

// ---------------------------------------------------------------------------
// Gemeinsamer Zustand
// ---------------------------------------------------------------------------

/// Vom Lese-Task gepflegter Zustand der Verbindung
#[derive(Default)]
struct VerbindungsZustand {
    session: AtomicU32,
    bereit: AtomicBool,
    geschlossen: AtomicBool,
    kanaele: Mutex<HashMap<u32, KanalInfo>>,
}

impl VerbindungsZustand {
    fn kanal_aktualisieren(&self, state: ChannelState) {
        let Some(id) = state.channel_id else {
            return;
        };
        let mut kanaele = self.kanaele.lock();
        let eintrag = kanaele.entry(id).or_insert_with(|| KanalInfo {
            id,
            parent: None,
            name: String::new(),
        });
        if let Some(parent) = state.parent {
            // Der Root-Kanal meldet sich selbst nie als Elternkanal
            if parent != id {
                eintrag.parent = Some(parent);
            }
        }
        if let Some(name) = state.name {
            eintrag.name = name;
        }
    }
}

// ---------------------------------------------------------------------------
// MumbleConnection
// ---------------------------------------------------------------------------

/// Eine bestehende Verbindung zu einem Mumble-Server
pub struct MumbleConnection {
    zustand: Arc<VerbindungsZustand>,
    befehle: mpsc::Sender<ControlMessage>,
    /// Sequenznummer pro Whisper-Slot (0..=31)
    sequenzen: Mutex<[u64; MAX_WHISPER_SLOTS + 2]>,
    shutdown_tx: watch::Sender<bool>,
}

impl MumbleConnection {
    /// Startet Lese-, Schreib- und Ping-Task auf einem angemeldeten Stream
    fn starten<S>(
        framed: MumbleFramed<S>,
        optionen: &VerbindungsOptionen,
    ) -> (
        Arc<Self>,
        mpsc::Receiver<ConnectionEvent>,
        oneshot::Receiver<VoiceResult<()>>,
    )
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = framed.split();
        let (befehle_tx, befehle_rx) = mpsc::channel(BEFEHL_QUEUE_GROESSE);
        let (ereignis_tx, ereignis_rx) = mpsc::channel(EREIGNIS_QUEUE_GROESSE);
        let (bereit_tx, bereit_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let zustand = Arc::new(VerbindungsZustand::default());

        tokio::spawn(schreib_task(sink, befehle_rx, shutdown_rx.clone()));
        tokio::spawn(ping_task(
            befehle_tx.clone(),
            optionen.ping_intervall,
            shutdown_rx.clone(),
        ));
        tokio::spawn(lese_task(
            stream,
            Arc::clone(&zustand),
            ereignis_tx,
            bereit_tx,
            shutdown_rx,
        ));

        let verbindung = Arc::new(Self {
            zustand,
            befehle: befehle_tx,
            sequenzen: Mutex::new([0; MAX_WHISPER_SLOTS + 2]),
            shutdown_tx,
        });

        (verbindung, ereignis_rx, bereit_rx)
    }

    fn einreihen(&self, nachricht: ControlMessage) -> VoiceResult<()> {
        if !self.ist_bereit() {
            return Err(VoiceError::NichtVerbunden);
        }
        self.befehle.try_send(nachricht).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => VoiceError::protokoll("Sende-Queue voll"),
            mpsc::error::TrySendError::Closed(_) => VoiceError::NichtVerbunden,
        })
    }
}

impl VoiceConnection for MumbleConnection {
    fn eigene_session(&self) -> u32 {
        self.zustand.session.load(Ordering::Acquire)
    }

    fn kanaele(&self) -> Vec<KanalInfo> {
        let mut liste: Vec<KanalInfo> = self.zustand.kanaele.lock().values().cloned().collect();
        liste.sort_by_key(|k| k.id);
        liste
    }

    fn kanal_wechseln(&self, kanal_id: u32) -> VoiceResult<()> {
        self.einreihen(ControlMessage::kanal_wechseln(
            self.eigene_session(),
            kanal_id,
        ))
    }

    fn whisper_ziel_setzen(
        &self,
        slot: u8,
        ziel: u32,
        optionen: WhisperOptionen,
    ) -> VoiceResult<()> {
        if slot == 0 || slot as usize > MAX_WHISPER_SLOTS {
            return Err(VoiceError::protokoll(format!(
                "Ungueltiger Whisper-Slot: {slot}"
            )));
        }
        self.einreihen(ControlMessage::whisper_ziel(
            slot as u32,
            ziel,
            !optionen.keine_links,
            !optionen.keine_kinder,
        ))
    }

    fn audio_senden(&self, opus: &[u8], letzter_frame: bool, slot: u8) -> VoiceResult<()> {
        let mut sequenzen = self.sequenzen.lock();
        let sequenz = sequenzen
            .get_mut(slot as usize)
            .ok_or_else(|| VoiceError::protokoll(format!("Ungueltiger Slot: {slot}")))?;

        let paket = AusgehendesAudio {
            ziel: slot,
            sequenz: *sequenz,
            opus,
            letzter: letzter_frame,
        }
        .encode()?;

        self.einreihen(ControlMessage::UdpTunnel(Bytes::from(paket)))?;

        // 20ms-Frame = 2 Einheiten zu 10ms; nach dem Terminator neu beginnen
        *sequenz = if letzter_frame { 0 } else { *sequenz + 2 };
        Ok(())
    }

    fn ist_bereit(&self) -> bool {
        self.zustand.bereit.load(Ordering::Acquire)
            && !self.zustand.geschlossen.load(Ordering::Acquire)
    }

    fn schliessen(&self) {
        if !self.zustand.geschlossen.swap(true, Ordering::AcqRel) {
            tracing::debug!(session = self.eigene_session(), "Voice-Verbindung wird geschlossen");
        }
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for MumbleConnection {
    fn drop(&mut self) {
        self.zustand.geschlossen.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(true);
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn schreib_task<S>(
    mut sink: SplitSink<MumbleFramed<S>, ControlMessage>,
    mut befehle: mpsc::Receiver<ControlMessage>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    S: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            nachricht = befehle.recv() => {
                let Some(nachricht) = nachricht else { break };
                if let Err(e) = sink.send(nachricht).await {
                    tracing::warn!(fehler = %e, "Schreibfehler auf Voice-Verbindung");
                    break;
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
    let _ = sink.close().await;
    tracing::trace!("Schreib-Task beendet");
}

async fn ping_task(
    befehle: mpsc::Sender<ControlMessage>,
    intervall: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(intervall);
    // Erster Tick kommt sofort
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let zeitstempel = chrono::Utc::now().timestamp_millis().max(0) as u64;
                match befehle.try_send(ControlMessage::ping(zeitstempel)) {
                    Ok(()) => tracing::trace!(zeitstempel, "Ping gesendet"),
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!("Sende-Queue voll – Ping ausgelassen");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
    tracing::trace!("Ping-Task beendet");
}

async fn lese_task<S>(
    mut stream: SplitStream<MumbleFramed<S>>,
    zustand: Arc<VerbindungsZustand>,
    ereignisse: mpsc::Sender<ConnectionEvent>,
    bereit_tx: oneshot::Sender<VoiceResult<()>>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    S: AsyncRead + Unpin,
{
    let mut bereit_tx = Some(bereit_tx);

    let grund = loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(nachricht)) => {
                    if let Some(grund) =
                        nachricht_verarbeiten(nachricht, &zustand, &ereignisse, &mut bereit_tx)
                    {
                        break grund;
                    }
                }
                Some(Err(e)) => break format!("Lesefehler: {e}"),
                None => break "Server hat die Verbindung beendet".to_string(),
            },
            _ = shutdown_rx.changed() => break "Lokal geschlossen".to_string(),
        }
    };

    zustand.bereit.store(false, Ordering::Release);

    if let Some(tx) = bereit_tx.take() {
        // Verbindung nie bereit gewesen: Fehler an den wartenden Aufbau melden
        let _ = tx.send(Err(VoiceError::VorBereitschaftGetrennt(grund)));
        return;
    }

    if zustand.geschlossen.load(Ordering::Acquire) {
        tracing::trace!("Lese-Task nach lokalem Schliessen beendet");
        return;
    }

    tracing::info!(
        session = zustand.session.load(Ordering::Acquire),
        grund = %grund,
        "Voice-Verbindung verloren"
    );
    let _ = ereignisse.send(ConnectionEvent::Getrennt { grund }).await;
}

/// Wertet eine Kontrollnachricht aus; `Some(grund)` beendet die Verbindung
fn nachricht_verarbeiten(
    nachricht: ControlMessage,
    zustand: &VerbindungsZustand,
    ereignisse: &mpsc::Sender<ConnectionEvent>,
    bereit_tx: &mut Option<oneshot::Sender<VoiceResult<()>>>,
) -> Option<String> {
    match nachricht {
        ControlMessage::ServerSync(sync) => {
            zustand
                .session
                .store(sync.session.unwrap_or(0), Ordering::Release);
            zustand.bereit.store(true, Ordering::Release);
            if let Some(tx) = bereit_tx.take() {
                let _ = tx.send(Ok(()));
            }
        }
        ControlMessage::Reject(reject) => {
            let grund = reject.beschreibung();
            tracing::warn!(grund = %grund, "Anmeldung abgelehnt");
            if let Some(tx) = bereit_tx.take() {
                let _ = tx.send(Err(VoiceError::Abgelehnt(grund.clone())));
            }
            return Some(format!("Abgelehnt: {grund}"));
        }
        ControlMessage::ChannelState(state) => zustand.kanal_aktualisieren(state),
        ControlMessage::ChannelRemove(remove) => {
            if let Some(id) = remove.channel_id {
                zustand.kanaele.lock().remove(&id);
            }
        }
        ControlMessage::UserRemove(remove) => {
            let eigene = zustand.session.load(Ordering::Acquire);
            if zustand.bereit.load(Ordering::Acquire) && remove.session == Some(eigene) {
                let grund = remove.reason.unwrap_or_else(|| "Vom Server entfernt".into());
                return Some(grund);
            }
        }
        ControlMessage::UdpTunnel(daten) => match EingehendesAudio::decode(&daten) {
            Ok(Some(audio)) => {
                let ereignis = ConnectionEvent::Audio {
                    remote_session: audio.session,
                    opus: audio.opus,
                    terminator: audio.letzter,
                };
                if ereignisse.try_send(ereignis).is_err() {
                    tracing::trace!("Ereignis-Queue voll – Audio-Frame verworfen");
                }
            }
            Ok(None) => tracing::trace!("Nicht-Opus-Paket ignoriert"),
            Err(e) => protokollfehler_melden(ereignisse, format!("Ungueltiges Voice-Paket: {e}")),
        },
        ControlMessage::Fehlerhaft { typ, fehler, .. } => {
            protokollfehler_melden(ereignisse, format!("Nachricht Typ {typ} verworfen: {fehler}"));
        }
        ControlMessage::Ping(_) => tracing::trace!("Ping-Antwort empfangen"),
        andere => tracing::trace!(typ = andere.typ(), "Kontrollnachricht ignoriert"),
    }
    None
}

/// Loggt und zaehlt einen Fehler, der die Verbindung nicht beendet
fn protokollfehler_melden(ereignisse: &mpsc::Sender<ConnectionEvent>, grund: String) {
    tracing::debug!(grund = %grund, "Protokollfehler");
    if ereignisse
        .try_send(ConnectionEvent::Protokollfehler { grund })
        .is_err()
    {
        tracing::trace!("Ereignis-Queue voll – Protokollfehler nicht gemeldet");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kanalbaum_wird_gepflegt() {
        let zustand = VerbindungsZustand::default();
        zustand.kanal_aktualisieren(ChannelState {
            channel_id: Some(0),
            parent: None,
            name: Some("Root".into()),
            temporary: None,
        });
        zustand.kanal_aktualisieren(ChannelState {
            channel_id: Some(3),
            parent: Some(0),
            name: Some("Funk".into()),
            temporary: None,
        });
        // Teil-Update behaelt den Namen
        zustand.kanal_aktualisieren(ChannelState {
            channel_id: Some(3),
            parent: Some(0),
            name: None,
            temporary: None,
        });

        let kanaele = zustand.kanaele.lock();
        assert_eq!(kanaele.len(), 2);
        assert_eq!(kanaele[&3].name, "Funk");
        assert_eq!(kanaele[&3].parent, Some(0));
        assert_eq!(kanaele[&0].parent, None);
    }

    #[tokio::test]
    async fn server_sync_meldet_bereit() {
        let zustand = VerbindungsZustand::default();
        let (tx, _rx) = mpsc::channel(4);
        let (bereit_tx, bereit_rx) = oneshot::channel();
        let mut bereit_tx = Some(bereit_tx);

        let sync = ControlMessage::ServerSync(funkbruecke_protocol::control::ServerSync {
            session: Some(17),
            max_bandwidth: None,
            welcome_text: None,
        });
        assert!(nachricht_verarbeiten(sync, &zustand, &tx, &mut bereit_tx).is_none());

        assert!(bereit_rx.await.unwrap().is_ok());
        assert_eq!(zustand.session.load(Ordering::Acquire), 17);
        assert!(zustand.bereit.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn reject_beendet_mit_fehler() {
        let zustand = VerbindungsZustand::default();
        let (tx, _rx) = mpsc::channel(4);
        let (bereit_tx, bereit_rx) = oneshot::channel();
        let mut bereit_tx = Some(bereit_tx);

        let reject = ControlMessage::Reject(funkbruecke_protocol::control::Reject {
            r#type: Some(6),
            reason: None,
        });
        let grund = nachricht_verarbeiten(reject, &zustand, &tx, &mut bereit_tx);
        assert!(grund.is_some());

        match bereit_rx.await.unwrap() {
            Err(VoiceError::Abgelehnt(g)) => assert_eq!(g, "ServerFull"),
            andere => panic!("Abgelehnt erwartet, war {:?}", andere),
        }
    }

    #[tokio::test]
    async fn udp_tunnel_wird_zu_audio_ereignis() {
        let zustand = VerbindungsZustand::default();
        let (tx, mut rx) = mpsc::channel(4);
        let mut bereit_tx = None;

        let paket = Bytes::from_static(&[0x80, 42, 0, 0x02, 0xAA, 0xBB]);
        nachricht_verarbeiten(
            ControlMessage::UdpTunnel(paket),
            &zustand,
            &tx,
            &mut bereit_tx,
        );

        assert_eq!(
            rx.recv().await.unwrap(),
            ConnectionEvent::Audio {
                remote_session: 42,
                opus: vec![0xAA, 0xBB],
                terminator: false,
            }
        );
    }

    #[test]
    fn tls_connector_ohne_pruefung() {
        assert!(tls_connector(false).is_ok());
        assert!(tls_connector(true).is_ok());
    }

    #[tokio::test]
    async fn fehlerhafte_nachricht_wird_gemeldet() {
        let zustand = VerbindungsZustand::default();
        let (tx, mut rx) = mpsc::channel(4);
        let mut bereit_tx = None;

        let kaputt = ControlMessage::Fehlerhaft {
            typ: 7,
            payload: Bytes::from_static(&[0x0A, 0x05]),
            fehler: "invalid wire type".into(),
        };
        assert!(nachricht_verarbeiten(kaputt, &zustand, &tx, &mut bereit_tx).is_none());

        // Sequenz als nicht negierbare Varint
        let paket = Bytes::from_static(&[0x80, 5, 0xF8, 0xF4, 0x80, 0, 0, 0, 0, 0, 0, 0, 0x01, 0xAA]);
        assert!(
            nachricht_verarbeiten(ControlMessage::UdpTunnel(paket), &zustand, &tx, &mut bereit_tx)
                .is_none()
        );

        for _ in 0..2 {
            match rx.recv().await.unwrap() {
                ConnectionEvent::Protokollfehler { grund } => assert!(!grund.is_empty()),
                andere => panic!("Protokollfehler erwartet, war {:?}", andere),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Anmeldung ueber einen In-Memory-Stream
    // -----------------------------------------------------------------------

    type TestServer = Framed<tokio::io::DuplexStream, MumbleCodec>;

    fn test_optionen() -> VerbindungsOptionen {
        VerbindungsOptionen {
            host: "voice.test".into(),
            port: 64738,
            passwort: None,
            benutzername: "[CAD] Anna #3".into(),
            tls_pruefen: false,
            bereit_timeout: Duration::from_secs(15),
            ping_intervall: Duration::from_secs(5),
        }
    }

    /// Liest Version und Anmeldung vom Client
    async fn anmeldung_empfangen(server: &mut TestServer) {
        match server.next().await {
            Some(Ok(ControlMessage::Version(_))) => {}
            andere => panic!("Version erwartet, war {:?}", andere),
        }
        match server.next().await {
            Some(Ok(ControlMessage::Authenticate(a))) => {
                assert_eq!(a.username.as_deref(), Some("[CAD] Anna #3"));
            }
            andere => panic!("Authenticate erwartet, war {:?}", andere),
        }
    }

    fn server_sync(session: u32) -> ControlMessage {
        ControlMessage::ServerSync(funkbruecke_protocol::control::ServerSync {
            session: Some(session),
            max_bandwidth: None,
            welcome_text: None,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn ohne_server_sync_greift_das_zeitlimit() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let mut server = Framed::new(server, MumbleCodec::new());
        let optionen = test_optionen();

        let aufbau = tokio::spawn(async move { anmelden(client, &optionen).await.err() });
        anmeldung_empfangen(&mut server).await;

        match aufbau.await.unwrap() {
            Some(VoiceError::Zeitlimit(dauer)) => assert_eq!(dauer, Duration::from_secs(15)),
            andere => panic!("Zeitlimit erwartet, war {:?}", andere),
        }
        drop(server);
    }

    #[tokio::test(start_paused = true)]
    async fn trennung_vor_server_sync() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let mut server = Framed::new(server, MumbleCodec::new());
        let optionen = test_optionen();

        let aufbau = tokio::spawn(async move { anmelden(client, &optionen).await.err() });
        anmeldung_empfangen(&mut server).await;
        drop(server);

        match aufbau.await.unwrap() {
            Some(VoiceError::VorBereitschaftGetrennt(grund)) => {
                assert!(grund.contains("beendet"), "{grund}");
            }
            andere => panic!("VorBereitschaftGetrennt erwartet, war {:?}", andere),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reject_wird_zu_abgelehnt() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let mut server = Framed::new(server, MumbleCodec::new());
        let optionen = test_optionen();

        let aufbau = tokio::spawn(async move { anmelden(client, &optionen).await.err() });
        anmeldung_empfangen(&mut server).await;
        server
            .send(ControlMessage::Reject(funkbruecke_protocol::control::Reject {
                r#type: Some(5),
                reason: Some("Name vergeben".into()),
            }))
            .await
            .unwrap();

        match aufbau.await.unwrap() {
            Some(VoiceError::Abgelehnt(grund)) => assert_eq!(grund, "UsernameInUse: Name vergeben"),
            andere => panic!("Abgelehnt erwartet, war {:?}", andere),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bereite_verbindung_ueberlebt_kaputten_frame() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let mut server = Framed::new(server, MumbleCodec::new());
        let optionen = test_optionen();

        let aufbau = tokio::spawn(async move { anmelden(client, &optionen).await });
        anmeldung_empfangen(&mut server).await;
        server
            .send(ControlMessage::ChannelState(ChannelState {
                channel_id: Some(0),
                parent: None,
                name: Some("Root".into()),
                temporary: None,
            }))
            .await
            .unwrap();
        server.send(server_sync(21)).await.unwrap();

        let AufgebauteVerbindung {
            verbindung,
            mut ereignisse,
        } = aufbau.await.unwrap().unwrap();
        assert!(verbindung.ist_bereit());
        assert_eq!(verbindung.eigene_session(), 21);
        assert_eq!(verbindung.root_kanal(), 0);

        // ChannelState mit falschem Wire-Typ, danach ein gueltiges Voice-Paket
        server
            .send(ControlMessage::Fehlerhaft {
                typ: 7,
                payload: Bytes::from_static(&[0x0A, 0x05]),
                fehler: String::new(),
            })
            .await
            .unwrap();
        server
            .send(ControlMessage::UdpTunnel(Bytes::from_static(&[0x80, 42, 0, 0x01, 0xAA])))
            .await
            .unwrap();

        match ereignisse.recv().await.unwrap() {
            ConnectionEvent::Protokollfehler { grund } => assert!(grund.contains("Typ 7"), "{grund}"),
            andere => panic!("Protokollfehler erwartet, war {:?}", andere),
        }
        assert_eq!(
            ereignisse.recv().await.unwrap(),
            ConnectionEvent::Audio {
                remote_session: 42,
                opus: vec![0xAA],
                terminator: false,
            }
        );
        assert!(verbindung.ist_bereit());

        // Ausgehender Kanalwechsel erreicht den Server
        verbindung.kanal_wechseln(3).unwrap();
        loop {
            match server.next().await {
                Some(Ok(ControlMessage::UserState(state))) => {
                    assert_eq!(state.session, Some(21));
                    assert_eq!(state.channel_id, Some(3));
                    break;
                }
                Some(Ok(_)) => continue,
                andere => panic!("UserState erwartet, war {:?}", andere),
            }
        }
        verbindung.schliessen();
    }
}
