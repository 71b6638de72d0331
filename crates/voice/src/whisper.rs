//! Whisper-Router – bildet Funkkanaele auf Whisper-Slots ab
//!
//! Funkkanaele existieren auf dem Voice-Server nicht. Stattdessen wird vor
//! jedem Senden bestimmt, welche Hoerer der Kanal gerade hat, und jeder
//! Hoerer bekommt einen eigenen Whisper-Slot (1..=30).
//!
//! ## Ablauf
//! 1. Hoerer aus der Routing-Tabelle lesen (Notruf ohne Eintrag: Anrufer)
//! 2. Auf 30 kuerzen, Reihenfolge bleibt
//! 3. Signatur vergleichen – unveraendert heisst: nichts programmieren
//! 4. Slots 1.. in Eingabereihenfolge programmieren, Fehler ueberspringen

use funkbruecke_core::{ChannelNumber, ListenerId, MAX_WHISPER_SLOTS};

use crate::connection::{VoiceConnection, WhisperOptionen};
use crate::route_table::{CallerLookup, RouteTable};

// ---------------------------------------------------------------------------
// Signatur und Zuweisung
// ---------------------------------------------------------------------------

/// Vergleichswert fuer die Entscheidung, ob neu programmiert werden muss
///
/// Die Hoerer sind sortiert, damit eine reine Umsortierung in der Tabelle
/// keine Neuprogrammierung ausloest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhisperSignatur {
    pub kanal: ChannelNumber,
    pub hoerer: Vec<ListenerId>,
}

impl WhisperSignatur {
    fn neu(kanal: ChannelNumber, hoerer: &[ListenerId]) -> Self {
        let mut sortiert = hoerer.to_vec();
        sortiert.sort_unstable();
        Self {
            kanal,
            hoerer: sortiert,
        }
    }
}

/// Programmierte Slots eines Dispatchers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhisperZuweisung {
    pub signatur: WhisperSignatur,
    /// (Slot, Hoerer) in Programmierreihenfolge
    pub slots: Vec<(u8, ListenerId)>,
}

// ---------------------------------------------------------------------------
// Hoerer-Aufloesung
// ---------------------------------------------------------------------------

/// Bestimmt die Hoerer eines Kanals (hoechstens 30, Eingabereihenfolge)
pub fn hoerer_aufloesen(
    kanal: ChannelNumber,
    tabelle: &RouteTable,
    anrufer: Option<&dyn CallerLookup>,
) -> Vec<ListenerId> {
    if let Some(hoerer) = tabelle.hoerer(kanal) {
        return hoerer.iter().take(MAX_WHISPER_SLOTS).copied().collect();
    }

    if kanal.ist_notruf() {
        if let Some(id) = anrufer.and_then(|lookup| lookup.anrufer_aufloesen(kanal)) {
            return vec![id];
        }
    }

    Vec::new()
}

// ---------------------------------------------------------------------------
// WhisperRouter
// ---------------------------------------------------------------------------

/// Whisper-Router eines einzelnen Dispatchers
///
/// Wird ausschliesslich unter dem Session-Lock des Dispatchers benutzt.
#[derive(Debug, Default)]
pub struct WhisperRouter {
    zuweisung: Option<WhisperZuweisung>,
    optionen: WhisperOptionen,
    /// Abgelehnte Slot-Programmierungen seit der letzten Abholung
    fehler: Vec<String>,
}

impl WhisperRouter {
    pub fn neu(optionen: WhisperOptionen) -> Self {
        Self {
            zuweisung: None,
            optionen,
            fehler: Vec::new(),
        }
    }

    /// Aktuell programmierte Zuweisung
    pub fn zuweisung(&self) -> Option<&WhisperZuweisung> {
        self.zuweisung.as_ref()
    }

    /// Programmierte Slots (leer ohne Zuweisung)
    pub fn slots(&self) -> &[(u8, ListenerId)] {
        self.zuweisung
            .as_ref()
            .map(|z| z.slots.as_slice())
            .unwrap_or(&[])
    }

    /// Gibt die seit dem letzten Aufruf abgelehnten Slots zurueck und leert die Liste
    pub fn fehler_abholen(&mut self) -> Vec<String> {
        std::mem::take(&mut self.fehler)
    }

    /// Vergisst die aktuelle Zuweisung (z.B. beim Verlassen eines Kanals)
    pub fn zuruecksetzen(&mut self) {
        self.zuweisung = None;
    }

    /// Bestimmt die Ziele fuer `kanal` und programmiert bei Bedarf neu
    ///
    /// Gibt die programmierten Slots zurueck; leer bedeutet: keine Route.
    pub fn aktualisieren(
        &mut self,
        kanal: ChannelNumber,
        tabelle: &RouteTable,
        anrufer: Option<&dyn CallerLookup>,
        verbindung: &dyn VoiceConnection,
    ) -> &[(u8, ListenerId)] {
        let hoerer = hoerer_aufloesen(kanal, tabelle, anrufer);
        let signatur = WhisperSignatur::neu(kanal, &hoerer);

        let unveraendert = self
            .zuweisung
            .as_ref()
            .is_some_and(|z| z.signatur == signatur);
        if unveraendert {
            return self.slots();
        }

        let mut slots = Vec::with_capacity(hoerer.len());
        for (index, ziel) in hoerer.iter().enumerate() {
            let slot = (index + 1) as u8;
            match verbindung.whisper_ziel_setzen(slot, ziel.inner(), self.optionen) {
                Ok(()) => slots.push((slot, *ziel)),
                Err(e) => {
                    tracing::warn!(
                        kanal = %kanal,
                        slot,
                        ziel = %ziel,
                        fehler = %e,
                        "Whisper-Slot konnte nicht programmiert werden"
                    );
                    self.fehler
                        .push(format!("Whisper-Slot {slot} ({ziel}): {e}"));
                }
            }
        }

        tracing::debug!(
            kanal = %kanal,
            hoerer = hoerer.len(),
            slots = slots.len(),
            "Whisper-Ziele neu programmiert"
        );

        self.zuweisung = Some(WhisperZuweisung { signatur, slots });
        self.slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route_table::CallRegistry;
    use crate::testing::MockConnection;

    fn tabelle(kanal: i64, ids: &[u32]) -> RouteTable {
        RouteTable::aus_zuordnung([(
            ChannelNumber(kanal),
            ids.iter().copied().map(ListenerId).collect::<Vec<_>>(),
        )])
    }

    #[test]
    fn slots_in_eingabereihenfolge() {
        let verbindung = MockConnection::bereit(1);
        let mut router = WhisperRouter::default();

        let slots = router
            .aktualisieren(ChannelNumber(7), &tabelle(7, &[205, 101]), None, verbindung.as_ref())
            .to_vec();

        assert_eq!(slots, vec![(1, ListenerId(205)), (2, ListenerId(101))]);
        assert_eq!(verbindung.whisper_aufrufe(), vec![(1, 205), (2, 101)]);
    }

    #[test]
    fn unveraenderte_signatur_programmiert_nicht_neu() {
        let verbindung = MockConnection::bereit(1);
        let mut router = WhisperRouter::default();
        let t = tabelle(7, &[101, 205]);

        router.aktualisieren(ChannelNumber(7), &t, None, verbindung.as_ref());
        router.aktualisieren(ChannelNumber(7), &t, None, verbindung.as_ref());
        // Gleiche Hoerer in anderer Reihenfolge: gleiche Signatur
        router.aktualisieren(ChannelNumber(7), &tabelle(7, &[205, 101]), None, verbindung.as_ref());

        assert_eq!(verbindung.whisper_aufrufe().len(), 2);
    }

    #[test]
    fn mehr_als_dreissig_hoerer_werden_gekuerzt() {
        let verbindung = MockConnection::bereit(1);
        let mut router = WhisperRouter::default();
        let ids: Vec<u32> = (1000..1040).rev().collect();

        let slots = router
            .aktualisieren(ChannelNumber(2), &tabelle(2, &ids), None, verbindung.as_ref())
            .to_vec();

        assert_eq!(slots.len(), MAX_WHISPER_SLOTS);
        assert_eq!(slots[0], (1, ListenerId(1039)));
        assert_eq!(slots[29], (30, ListenerId(1010)));
    }

    #[test]
    fn kanal_ohne_eintrag_hat_keine_ziele() {
        let verbindung = MockConnection::bereit(1);
        let mut router = WhisperRouter::default();

        let slots = router.aktualisieren(ChannelNumber(9), &RouteTable::leer(), None, verbindung.as_ref());
        assert!(slots.is_empty());
        assert!(verbindung.whisper_aufrufe().is_empty());
    }

    #[test]
    fn notruf_ohne_eintrag_loest_anrufer_auf() {
        let register = CallRegistry::neu();
        register.anruf_registrieren(ChannelNumber(10042), "steam:1");
        register.heartbeat("steam:1", Some(ListenerId(88)));

        let hoerer = hoerer_aufloesen(ChannelNumber(10042), &RouteTable::leer(), Some(&register));
        assert_eq!(hoerer, vec![ListenerId(88)]);

        // Normale Kanaele werden nie ueber den Anrufer aufgeloest
        register.anruf_registrieren(ChannelNumber(42), "steam:1");
        assert!(hoerer_aufloesen(ChannelNumber(42), &RouteTable::leer(), Some(&register)).is_empty());
    }

    #[test]
    fn fehlerhafter_slot_wird_uebersprungen() {
        let verbindung = MockConnection::bereit(1);
        verbindung.whisper_fehler_bei_slot(2);
        let mut router = WhisperRouter::default();

        let slots = router
            .aktualisieren(ChannelNumber(7), &tabelle(7, &[1, 2, 3]), None, verbindung.as_ref())
            .to_vec();

        assert_eq!(slots, vec![(1, ListenerId(1)), (3, ListenerId(3))]);

        let fehler = router.fehler_abholen();
        assert_eq!(fehler.len(), 1);
        assert!(fehler[0].starts_with("Whisper-Slot 2 "));
        assert!(router.fehler_abholen().is_empty());
    }
}
