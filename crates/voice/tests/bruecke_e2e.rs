//! Ende-zu-Ende-Ablaeufe des Session-Managers gegen den Mock-Connector

use funkbruecke_audio::{OpusEncoder, STANDARD_BITRATE_KBPS};
use funkbruecke_core::{ChannelNumber, DispatcherId, ListenerId, FRAME_BYTES};
use funkbruecke_voice::testing::{Aufruf, MockConnection, MockConnector};
use funkbruecke_voice::{
    CallRegistry, CallerLookup, Connector, ManagerKonfiguration, ReceivedAudio, SessionManager,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const D: DispatcherId = DispatcherId(4);

fn manager_mit(connector: &Arc<MockConnector>, anrufer: Option<Arc<dyn CallerLookup>>) -> SessionManager {
    SessionManager::neu(
        ManagerKonfiguration::default(),
        Arc::clone(connector) as Arc<dyn Connector>,
        anrufer,
    )
}

fn route(kanal: i64, ids: &[u32]) -> (ChannelNumber, Vec<ListenerId>) {
    (ChannelNumber(kanal), ids.iter().copied().map(ListenerId).collect())
}

async fn verbundener_manager(
    anrufer: Option<Arc<dyn CallerLookup>>,
) -> (SessionManager, Arc<MockConnection>) {
    let connector = MockConnector::neu();
    let manager = manager_mit(&connector, anrufer);
    manager.verbinden(D, "Disponent").await.unwrap();
    let verbindung = connector.letzte_verbindung().unwrap();
    (manager, verbindung)
}

fn audio_slots(verbindung: &MockConnection) -> Vec<u8> {
    verbindung.audio_aufrufe().iter().map(|a| a.slot).collect()
}

/// Wartet bis `bedingung` erfuellt ist (Ereignis-Task laeuft asynchron)
async fn warten_bis(mut bedingung: impl FnMut() -> bool) {
    for _ in 0..100 {
        if bedingung() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Bedingung nicht innerhalb von einer Sekunde erfuellt");
}

#[tokio::test]
async fn stiller_frame_geht_an_beide_hoerer() {
    let (manager, verbindung) = verbundener_manager(None).await;
    manager.replace_routes([route(7, &[101, 205])]);
    manager.kanal_beitreten(D, Some(ChannelNumber(7))).unwrap();

    assert!(manager.send_mic_audio(D, &[0u8; FRAME_BYTES]));

    let aufrufe = verbindung.aufrufe();
    let whisper_und_audio: Vec<&Aufruf> = aufrufe
        .iter()
        .filter(|a| !matches!(a, Aufruf::KanalWechsel(_)))
        .collect();
    assert!(matches!(whisper_und_audio[0], Aufruf::Whisper { slot: 1, ziel: 101 }));
    assert!(matches!(whisper_und_audio[1], Aufruf::Whisper { slot: 2, ziel: 205 }));
    assert_eq!(audio_slots(&verbindung), vec![1, 2]);
}

#[tokio::test]
async fn tabellenwechsel_programmiert_neu() {
    let (manager, verbindung) = verbundener_manager(None).await;
    manager.replace_routes([route(7, &[101, 205])]);
    manager.kanal_beitreten(D, Some(ChannelNumber(7))).unwrap();
    manager.send_mic_audio(D, &[0u8; FRAME_BYTES]);
    verbindung.aufrufe_leeren();

    manager.replace_routes([route(7, &[205, 307])]);
    assert!(manager.send_mic_audio(D, &[0u8; FRAME_BYTES]));

    assert_eq!(verbindung.whisper_aufrufe(), vec![(1, 205), (2, 307)]);
    assert_eq!(audio_slots(&verbindung), vec![1, 2]);
}

#[tokio::test]
async fn unveraenderte_tabelle_programmiert_nicht_neu() {
    let (manager, verbindung) = verbundener_manager(None).await;
    manager.replace_routes([route(7, &[101, 205])]);
    manager.kanal_beitreten(D, Some(ChannelNumber(7))).unwrap();
    verbindung.aufrufe_leeren();

    manager.replace_routes([route(7, &[101, 205])]);
    for _ in 0..5 {
        manager.send_mic_audio(D, &[0u8; FRAME_BYTES]);
    }

    assert!(verbindung.whisper_aufrufe().is_empty());
    assert_eq!(verbindung.audio_aufrufe().len(), 10);
}

#[tokio::test]
async fn notruf_kanal_loest_anrufer_auf() {
    let register = CallRegistry::neu();
    register.anruf_registrieren(ChannelNumber(10042), "steam:110000112345678");
    register.heartbeat("steam:110000112345678", Some(ListenerId(88)));

    let (manager, verbindung) =
        verbundener_manager(Some(Arc::new(register.clone()) as Arc<dyn CallerLookup>)).await;
    manager.kanal_beitreten(D, Some(ChannelNumber(10042))).unwrap();

    assert_eq!(verbindung.whisper_aufrufe(), vec![(1, 88)]);
    let status = manager.status();
    assert_eq!(status.sessions[0].route_mitglieder, 1);
    assert_eq!(status.sessions[0].slots[0].hoerer, ListenerId(88));
}

#[tokio::test]
async fn kanal_ohne_eintrag_sendet_normal() {
    let (manager, verbindung) = verbundener_manager(None).await;
    manager.kanal_beitreten(D, Some(ChannelNumber(12))).unwrap();

    assert!(manager.send_mic_audio(D, &[0u8; FRAME_BYTES]));
    assert_eq!(audio_slots(&verbindung), vec![0]);
    assert_eq!(manager.status().sessions[0].zaehler.keine_route, 1);
}

#[tokio::test]
async fn wiederholter_beitritt_bleibt_im_root() {
    let (manager, verbindung) = verbundener_manager(None).await;

    for kanal in [Some(ChannelNumber(0)), Some(ChannelNumber(-1)), None, Some(ChannelNumber(3)), Some(ChannelNumber(3))] {
        manager.kanal_beitreten(D, kanal).unwrap();
    }
    assert_eq!(verbindung.kanal_wechsel(), vec![0; 5]);
}

#[tokio::test]
async fn verlassen_und_trennen_senden_terminator() {
    let (manager, verbindung) = verbundener_manager(None).await;
    manager.replace_routes([route(7, &[101])]);
    manager.kanal_beitreten(D, Some(ChannelNumber(7))).unwrap();
    manager.send_mic_audio(D, &[0u8; FRAME_BYTES]);

    manager.kanal_verlassen(D).unwrap();
    assert!(verbindung.audio_aufrufe().last().unwrap().letzter);

    verbindung.aufrufe_leeren();
    assert!(manager.trennen(D));
    let audio = verbindung.audio_aufrufe();
    assert_eq!(audio.len(), 1);
    assert!(audio[0].letzter);
    assert!(!manager.send_mic_audio(D, &[0u8; FRAME_BYTES]));
}

#[tokio::test]
async fn verbindungsverlust_baut_session_ab() {
    let (manager, verbindung) = verbundener_manager(None).await;
    let empfangen = Arc::new(AtomicUsize::new(0));
    let zaehler = Arc::clone(&empfangen);
    assert!(manager.register_audio_listener(
        D,
        Arc::new(move |_: &ReceivedAudio| {
            zaehler.fetch_add(1, Ordering::SeqCst);
        })
    ));

    verbindung.trennung_simulieren("Vom Server gekickt").await;
    warten_bis(|| manager.session_anzahl() == 0).await;

    assert!(!manager.ist_bereit(D));
    let status = manager.status();
    assert_eq!(status.beendet.len(), 1);
    assert_eq!(status.beendet[0].dispatcher_id, D);
    assert_eq!(empfangen.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn eingehendes_audio_erreicht_listener() {
    let (manager, verbindung) = verbundener_manager(None).await;
    let empfangen = Arc::new(AtomicUsize::new(0));
    let zaehler = Arc::clone(&empfangen);
    manager.register_audio_listener(
        D,
        Arc::new(move |audio: &ReceivedAudio| {
            assert_eq!(audio.remote_session, 33);
            assert_eq!(audio.channels, 1);
            assert_eq!(audio.bits_per_sample, 16);
            zaehler.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let mut encoder = OpusEncoder::neu(STANDARD_BITRATE_KBPS).unwrap();
    let opus = encoder.encode_stille().unwrap();
    verbindung.audio_einspeisen(33, opus.clone()).await;
    verbindung.audio_einspeisen(33, opus).await;

    warten_bis(|| empfangen.load(Ordering::SeqCst) == 2).await;
    assert_eq!(manager.status().sessions[0].zaehler.eingehende_pakete, 2);
}

#[tokio::test]
async fn neu_verbinden_nach_verlust() {
    let connector = MockConnector::neu();
    let manager = manager_mit(&connector, None);
    manager.verbinden(D, "Disponent").await.unwrap();
    let erste = connector.letzte_verbindung().unwrap();

    erste.trennung_simulieren("Netzwerk").await;
    warten_bis(|| manager.session_anzahl() == 0).await;

    manager.verbinden(D, "Disponent").await.unwrap();
    assert!(manager.ist_bereit(D));
    assert_eq!(connector.versuche(), 2);
    assert!(manager.status().beendet.is_empty());
}
