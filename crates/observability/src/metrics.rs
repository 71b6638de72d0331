//! Prometheus-kompatible Metriken der Funkbruecke
//!
//! Registrierte Metriken (alle Gauges, da die Werte bei jedem Scrape aus
//! der Status-Momentaufnahme des Session-Managers kommen und beendete
//! Sessions ihre Zaehler mitnehmen):
//! - `funkbruecke_sessions_aktiv` – registrierte Dispatcher-Sessions
//! - `funkbruecke_sessions_verbunden` – davon mit bereiter Voice-Verbindung
//! - `funkbruecke_routen_kanaele` – Funkkanaele in der Routing-Tabelle
//! - `funkbruecke_routen_hoerer` – Hoerer-Eintraege in der Routing-Tabelle
//! - `funkbruecke_frames_gesendet` – gesendete Opus-Pakete
//! - `funkbruecke_frames_ohne_route` – Frames ohne Whisper-Ziel
//! - `funkbruecke_frames_verworfen` – verworfene Frames
//! - `funkbruecke_verbindungsfehler` – fehlgeschlagene Verbindungsaufbauten
//! - `funkbruecke_eingehende_pakete` – empfangene Audio-Pakete

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use prometheus::{Encoder, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Datenquelle
// ---------------------------------------------------------------------------

/// Aggregierte Werte einer Status-Momentaufnahme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetrikWerte {
    pub sessions_aktiv: u64,
    pub sessions_verbunden: u64,
    pub routen_kanaele: u64,
    pub routen_hoerer: u64,
    pub frames_gesendet: u64,
    pub frames_ohne_route: u64,
    pub frames_verworfen: u64,
    pub verbindungsfehler: u64,
    pub eingehende_pakete: u64,
}

/// Liefert bei jedem Scrape eine frische Momentaufnahme
pub trait StatusQuelle: Send + Sync {
    fn momentaufnahme(&self) -> MetrikWerte;
}

// ---------------------------------------------------------------------------
// BridgeMetrics
// ---------------------------------------------------------------------------

/// Alle Prometheus-Metriken der Bruecke
#[derive(Clone)]
pub struct BridgeMetrics {
    pub registry: Arc<Registry>,

    pub sessions_aktiv: IntGauge,
    pub sessions_verbunden: IntGauge,
    pub routen_kanaele: IntGauge,
    pub routen_hoerer: IntGauge,
    pub frames_gesendet: IntGauge,
    pub frames_ohne_route: IntGauge,
    pub frames_verworfen: IntGauge,
    pub verbindungsfehler: IntGauge,
    pub eingehende_pakete: IntGauge,
}

fn gauge(registry: &Registry, name: &str, hilfe: &str) -> Result<IntGauge> {
    let gauge = IntGauge::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

impl BridgeMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Sessions ---
        let sessions_aktiv = gauge(
            &registry,
            "funkbruecke_sessions_aktiv",
            "Anzahl registrierter Dispatcher-Sessions",
        )?;
        let sessions_verbunden = gauge(
            &registry,
            "funkbruecke_sessions_verbunden",
            "Dispatcher-Sessions mit bereiter Voice-Verbindung",
        )?;

        // --- Routing ---
        let routen_kanaele = gauge(
            &registry,
            "funkbruecke_routen_kanaele",
            "Funkkanaele in der Routing-Tabelle",
        )?;
        let routen_hoerer = gauge(
            &registry,
            "funkbruecke_routen_hoerer",
            "Hoerer-Eintraege in der Routing-Tabelle",
        )?;

        // --- Audio ---
        let frames_gesendet = gauge(
            &registry,
            "funkbruecke_frames_gesendet",
            "Gesendete Opus-Pakete aktiver Sessions",
        )?;
        let frames_ohne_route = gauge(
            &registry,
            "funkbruecke_frames_ohne_route",
            "Frames ohne Whisper-Ziel",
        )?;
        let frames_verworfen = gauge(
            &registry,
            "funkbruecke_frames_verworfen",
            "Verworfene Frames (Kodierung oder Versand fehlgeschlagen)",
        )?;
        let verbindungsfehler = gauge(
            &registry,
            "funkbruecke_verbindungsfehler",
            "Fehlgeschlagene Verbindungsaufbauten",
        )?;
        let eingehende_pakete = gauge(
            &registry,
            "funkbruecke_eingehende_pakete",
            "Empfangene Audio-Pakete vom Voice-Server",
        )?;

        Ok(Self {
            registry: Arc::new(registry),
            sessions_aktiv,
            sessions_verbunden,
            routen_kanaele,
            routen_hoerer,
            frames_gesendet,
            frames_ohne_route,
            frames_verworfen,
            verbindungsfehler,
            eingehende_pakete,
        })
    }

    /// Uebernimmt eine Momentaufnahme in die Gauges
    pub fn aktualisieren(&self, werte: &MetrikWerte) {
        let setzen = |gauge: &IntGauge, wert: u64| gauge.set(i64::try_from(wert).unwrap_or(i64::MAX));
        setzen(&self.sessions_aktiv, werte.sessions_aktiv);
        setzen(&self.sessions_verbunden, werte.sessions_verbunden);
        setzen(&self.routen_kanaele, werte.routen_kanaele);
        setzen(&self.routen_hoerer, werte.routen_hoerer);
        setzen(&self.frames_gesendet, werte.frames_gesendet);
        setzen(&self.frames_ohne_route, werte.frames_ohne_route);
        setzen(&self.frames_verworfen, werte.frames_verworfen);
        setzen(&self.verbindungsfehler, werte.verbindungsfehler);
        setzen(&self.eingehende_pakete, werte.eingehende_pakete);
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct MetrikZustand {
    metriken: BridgeMetrics,
    quelle: Arc<dyn StatusQuelle>,
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: BridgeMetrics, quelle: Arc<dyn StatusQuelle>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(MetrikZustand { metriken, quelle })
}

async fn metrics_handler(State(zustand): State<MetrikZustand>) -> impl IntoResponse {
    zustand.metriken.aktualisieren(&zustand.quelle.momentaufnahme());

    match zustand.metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
