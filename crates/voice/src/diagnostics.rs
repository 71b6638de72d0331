//! Diagnose-Zaehler pro Dispatcher
//!
//! Zaehler werden bei jedem Frame aktualisiert, eine zusammenfassende
//! Log-Zeile aber hoechstens einmal pro Intervall geschrieben.

use chrono::{DateTime, Utc};
use funkbruecke_core::DispatcherId;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Standard-Mindestabstand zwischen zwei Diagnose-Zeilen
pub const STANDARD_DIAGNOSE_INTERVALL: Duration = Duration::from_secs(15);

/// Akkumulierte Zaehler einer Dispatcher-Session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnoseZaehler {
    pub mic_pakete_ein: u64,
    pub mic_bytes_ein: u64,
    pub frames_kodiert: u64,
    pub frames_gesendet: u64,
    pub frames_verworfen: u64,
    pub keine_route: u64,
    pub eingehende_pakete: u64,
    pub eingehende_bytes: u64,
    pub dekodier_fehler: u64,
    pub verbindungs_fehler: u64,
    /// Nicht fatale Protokollfehler (kaputte Nachrichten, abgelehnte Slots)
    pub protokoll_fehler: u64,
    pub letzter_fehler: Option<String>,
    pub verbunden_seit: Option<DateTime<Utc>>,
    pub getrennt_um: Option<DateTime<Utc>>,
}

impl DiagnoseZaehler {
    /// Merkt sich einen Fehlertext
    pub fn fehler_merken(&mut self, fehler: impl std::fmt::Display) {
        self.letzter_fehler = Some(fehler.to_string());
    }
}

/// Drosselt die Diagnose-Ausgabe auf ein Intervall
#[derive(Debug)]
pub struct DiagnoseDrossel {
    intervall: Duration,
    letzte_ausgabe: Option<Instant>,
}

impl DiagnoseDrossel {
    pub fn neu(intervall: Duration) -> Self {
        Self {
            intervall,
            letzte_ausgabe: None,
        }
    }

    /// Gibt true zurueck (und merkt sich den Zeitpunkt) wenn eine Ausgabe faellig ist
    pub fn faellig(&mut self) -> bool {
        let jetzt = Instant::now();
        match self.letzte_ausgabe {
            Some(letzte) if jetzt.duration_since(letzte) < self.intervall => false,
            _ => {
                self.letzte_ausgabe = Some(jetzt);
                true
            }
        }
    }

    /// Schreibt eine Diagnose-Zeile, sofern das Intervall abgelaufen ist
    pub fn protokollieren(&mut self, dispatcher: DispatcherId, anlass: &str, z: &DiagnoseZaehler) {
        if !self.faellig() {
            return;
        }
        tracing::info!(
            dispatcher_id = %dispatcher,
            anlass,
            mic_pakete = z.mic_pakete_ein,
            mic_bytes = z.mic_bytes_ein,
            kodiert = z.frames_kodiert,
            gesendet = z.frames_gesendet,
            verworfen = z.frames_verworfen,
            keine_route = z.keine_route,
            eingehend = z.eingehende_pakete,
            eingehend_bytes = z.eingehende_bytes,
            dekodier_fehler = z.dekodier_fehler,
            verbindungs_fehler = z.verbindungs_fehler,
            protokoll_fehler = z.protokoll_fehler,
            letzter_fehler = z.letzter_fehler.as_deref().unwrap_or("-"),
            "Voice-Diagnose"
        );
    }
}

impl Default for DiagnoseDrossel {
    fn default() -> Self {
        Self::neu(STANDARD_DIAGNOSE_INTERVALL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erste_ausgabe_sofort_dann_gedrosselt() {
        let mut drossel = DiagnoseDrossel::neu(Duration::from_secs(15));
        assert!(drossel.faellig());
        assert!(!drossel.faellig());
        assert!(!drossel.faellig());
    }

    #[test]
    fn ohne_intervall_immer_faellig() {
        let mut drossel = DiagnoseDrossel::neu(Duration::ZERO);
        assert!(drossel.faellig());
        assert!(drossel.faellig());
    }

    #[test]
    fn zaehler_serialisierung_camel_case() {
        let mut z = DiagnoseZaehler {
            frames_gesendet: 3,
            ..Default::default()
        };
        z.fehler_merken("Opus kaputt");
        z.protokoll_fehler = 2;
        let json = serde_json::to_value(&z).unwrap();
        assert_eq!(json["framesGesendet"], 3);
        assert_eq!(json["protokollFehler"], 2);
        assert_eq!(json["letzterFehler"], "Opus kaputt");
    }
}
