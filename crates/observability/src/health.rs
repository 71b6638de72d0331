//! Health-Check-Endpunkt der Funkbruecke
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Session-Anzahl

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::{MetrikWerte, StatusQuelle};

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Sessions vorhanden, aber keine davon verbunden (Voice-Server weg?)
    Degraded,
}

impl HealthStatus {
    pub fn aus_werten(werte: &MetrikWerte) -> Self {
        if werte.sessions_aktiv > 0 && werte.sessions_verbunden == 0 {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub sessions: u64,
    pub sessions_verbunden: u64,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    quelle: Arc<dyn StatusQuelle>,
}

impl HealthState {
    pub fn neu(quelle: Arc<dyn StatusQuelle>) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            quelle,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn antwort(&self) -> HealthResponse {
        let werte = self.quelle.momentaufnahme();
        HealthResponse {
            status: HealthStatus::aus_werten(&werte),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            sessions: werte.sessions_aktiv,
            sessions_verbunden: werte.sessions_verbunden,
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(quelle: Arc<dyn StatusQuelle>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(HealthState::neu(quelle))
}

/// `GET /health` – 200 auch bei degraded, der Health-Check soll die Bruecke nicht neu starten lassen
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.antwort()))
}
