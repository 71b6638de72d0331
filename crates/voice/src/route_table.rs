//! Routing-Tabelle und Anrufer-Register
//!
//! Die `RouteTable` ordnet jeder Funkkanal-Nummer die Hoerer (Spiel-Session-IDs)
//! zu. Sie ist unveraenderlich und wird bei jeder Teilnehmer-Aenderung als
//! Ganzes ersetzt. Leser sehen immer entweder die alte oder die neue Tabelle.
//!
//! Notruf-Kanaele (>= 10000) haben oft keinen Eintrag; fuer sie loest das
//! [`CallRegistry`] den Anrufer ueber dessen aktuelle Spiel-Session auf.

use dashmap::DashMap;
use funkbruecke_core::{ChannelNumber, ListenerId};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// RouteTable
// ---------------------------------------------------------------------------

/// Unveraenderliche Zuordnung Kanal -> geordnete, eindeutige Hoerer
///
/// Kanaele ohne Hoerer fehlen in der Tabelle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    routen: HashMap<ChannelNumber, Vec<ListenerId>>,
}

impl RouteTable {
    /// Leere Tabelle
    pub fn leer() -> Self {
        Self::default()
    }

    /// Baut eine Tabelle aus einer Rohzuordnung
    ///
    /// Doppelte Hoerer werden entfernt (erstes Vorkommen bleibt),
    /// leere Listen verworfen.
    pub fn aus_zuordnung<I, L>(zuordnung: I) -> Self
    where
        I: IntoIterator<Item = (ChannelNumber, L)>,
        L: IntoIterator<Item = ListenerId>,
    {
        let mut routen = HashMap::new();
        for (kanal, hoerer) in zuordnung {
            let mut gesehen = HashSet::new();
            let liste: Vec<ListenerId> = hoerer.into_iter().filter(|h| gesehen.insert(*h)).collect();
            if !liste.is_empty() {
                routen.insert(kanal, liste);
            }
        }
        Self { routen }
    }

    /// Hoerer eines Kanals in Eingabereihenfolge
    pub fn hoerer(&self, kanal: ChannelNumber) -> Option<&[ListenerId]> {
        self.routen.get(&kanal).map(Vec::as_slice)
    }

    /// Anzahl der Kanaele mit mindestens einem Hoerer
    pub fn kanal_anzahl(&self) -> usize {
        self.routen.len()
    }

    /// Summe aller Hoerer-Eintraege
    pub fn hoerer_anzahl(&self) -> usize {
        self.routen.values().map(Vec::len).sum()
    }
}

/// Atomar austauschbarer Zeiger auf die aktuelle Routing-Tabelle
#[derive(Clone, Default)]
pub struct RouteTableHandle {
    inner: Arc<RwLock<Arc<RouteTable>>>,
}

impl RouteTableHandle {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Aktuelle Tabelle (Schnappschuss)
    pub fn aktuell(&self) -> Arc<RouteTable> {
        Arc::clone(&self.inner.read())
    }

    /// Ersetzt die Tabelle vollstaendig
    pub fn ersetzen(&self, tabelle: RouteTable) {
        let neu = Arc::new(tabelle);
        tracing::debug!(
            kanaele = neu.kanal_anzahl(),
            hoerer = neu.hoerer_anzahl(),
            "Routing-Tabelle ersetzt"
        );
        *self.inner.write() = neu;
    }
}

// ---------------------------------------------------------------------------
// Anrufer-Aufloesung
// ---------------------------------------------------------------------------

/// Loest den Anrufer eines Notruf-Kanals auf seine aktuelle Spiel-Session auf
pub trait CallerLookup: Send + Sync {
    fn anrufer_aufloesen(&self, kanal: ChannelNumber) -> Option<ListenerId>;
}

/// Register der Notruf-Kanaele und der Spiel-Sessions ihrer Anrufer
///
/// Zwei getrennte Zuordnungen, damit ein neu verbundener Anrufer ohne
/// Aenderung am Kanal auf die neue Session aufgeloest wird.
#[derive(Clone, Default)]
pub struct CallRegistry {
    inner: Arc<CallRegistryInner>,
}

#[derive(Default)]
struct CallRegistryInner {
    /// Notruf-Kanal -> Identitaet des Anrufers
    anrufer: DashMap<ChannelNumber, String>,
    /// Identitaet -> aktuelle Spiel-Session
    sessions: DashMap<String, ListenerId>,
}

impl CallRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Registriert einen Notruf-Kanal mit seinem Anrufer
    pub fn anruf_registrieren(&self, kanal: ChannelNumber, identitaet: impl Into<String>) {
        let identitaet = identitaet.into();
        tracing::debug!(kanal = %kanal, identitaet = %identitaet, "Notruf registriert");
        self.inner.anrufer.insert(kanal, identitaet);
    }

    /// Entfernt einen Notruf-Kanal; gibt true zurueck wenn er bekannt war
    pub fn anruf_entfernen(&self, kanal: ChannelNumber) -> bool {
        self.inner.anrufer.remove(&kanal).is_some()
    }

    /// Aktualisiert die Spiel-Session einer Identitaet (`None` = offline)
    ///
    /// Gibt true zurueck wenn sich die Zuordnung geaendert hat.
    pub fn heartbeat(&self, identitaet: &str, session: Option<ListenerId>) -> bool {
        match session {
            Some(s) => self.inner.sessions.insert(identitaet.to_string(), s) != Some(s),
            None => self.inner.sessions.remove(identitaet).is_some(),
        }
    }

    /// Anzahl registrierter Notrufe
    pub fn anruf_anzahl(&self) -> usize {
        self.inner.anrufer.len()
    }
}

impl CallerLookup for CallRegistry {
    fn anrufer_aufloesen(&self, kanal: ChannelNumber) -> Option<ListenerId> {
        let identitaet = self.inner.anrufer.get(&kanal)?.value().clone();
        self.inner.sessions.get(&identitaet).map(|s| *s.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hoerer(ids: &[u32]) -> Vec<ListenerId> {
        ids.iter().copied().map(ListenerId).collect()
    }

    #[test]
    fn leere_listen_fehlen() {
        let tabelle = RouteTable::aus_zuordnung([
            (ChannelNumber(7), hoerer(&[101, 205])),
            (ChannelNumber(8), hoerer(&[])),
        ]);
        assert_eq!(tabelle.kanal_anzahl(), 1);
        assert!(tabelle.hoerer(ChannelNumber(8)).is_none());
    }

    #[test]
    fn duplikate_werden_entfernt_reihenfolge_bleibt() {
        let tabelle =
            RouteTable::aus_zuordnung([(ChannelNumber(3), hoerer(&[9, 4, 9, 1, 4]))]);
        assert_eq!(tabelle.hoerer(ChannelNumber(3)).unwrap(), hoerer(&[9, 4, 1]).as_slice());
        assert_eq!(tabelle.hoerer_anzahl(), 3);
    }

    #[test]
    fn handle_tauscht_atomar() {
        let handle = RouteTableHandle::neu();
        let alt = handle.aktuell();
        handle.ersetzen(RouteTable::aus_zuordnung([(ChannelNumber(1), hoerer(&[5]))]));

        assert_eq!(alt.kanal_anzahl(), 0);
        assert_eq!(handle.aktuell().kanal_anzahl(), 1);
    }

    #[test]
    fn anrufer_folgt_aktueller_session() {
        let register = CallRegistry::neu();
        register.anruf_registrieren(ChannelNumber(10042), "steam:abc");
        assert_eq!(register.anrufer_aufloesen(ChannelNumber(10042)), None);

        assert!(register.heartbeat("steam:abc", Some(ListenerId(88))));
        assert_eq!(register.anrufer_aufloesen(ChannelNumber(10042)), Some(ListenerId(88)));
        // Gleicher Heartbeat aendert nichts
        assert!(!register.heartbeat("steam:abc", Some(ListenerId(88))));

        // Reconnect mit neuer Session
        assert!(register.heartbeat("steam:abc", Some(ListenerId(91))));
        assert_eq!(register.anrufer_aufloesen(ChannelNumber(10042)), Some(ListenerId(91)));

        assert!(register.heartbeat("steam:abc", None));
        assert!(!register.heartbeat("steam:abc", None));
        assert_eq!(register.anrufer_aufloesen(ChannelNumber(10042)), None);
    }

    #[test]
    fn anruf_entfernen() {
        let register = CallRegistry::neu();
        register.anruf_registrieren(ChannelNumber(10001), "id");
        assert!(register.anruf_entfernen(ChannelNumber(10001)));
        assert!(!register.anruf_entfernen(ChannelNumber(10001)));
        assert_eq!(register.anruf_anzahl(), 0);
    }
}
