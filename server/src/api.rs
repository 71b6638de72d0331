//! HTTP-API der Bruecke
//!
//! - `GET    /api/voice/status`          – Momentaufnahme aller Sessions
//! - `POST   /api/voice/routes`          – ersetzt die Routing-Tabelle
//! - `POST   /api/voice/calls`           – registriert einen Notruf-Kanal
//! - `DELETE /api/voice/calls/:channel`  – entfernt einen Notruf-Kanal
//! - `POST   /api/voice/heartbeat`       – aktuelle Spiel-Session eines Spielers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use funkbruecke_core::{ChannelNumber, ListenerId};
use funkbruecke_voice::{CallRegistry, SessionManager};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

/// Axum-State der HTTP-API
#[derive(Clone)]
pub struct ApiState {
    pub manager: SessionManager,
    pub anrufe: CallRegistry,
}

/// Erstellt den Router der Voice-API
pub fn api_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/voice/status", get(status))
        .route("/api/voice/routes", post(routen_ersetzen))
        .route("/api/voice/calls", post(anruf_registrieren))
        .route("/api/voice/calls/:channel", delete(anruf_entfernen))
        .route("/api/voice/heartbeat", post(heartbeat))
        .with_state(state)
}

fn fehler(status: StatusCode, nachricht: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "error": nachricht.to_string() }))).into_response()
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

async fn status(State(state): State<ApiState>) -> Response {
    (StatusCode::OK, Json(state.manager.status())).into_response()
}

// ---------------------------------------------------------------------------
// Routing-Tabelle
// ---------------------------------------------------------------------------

/// `{ "<kanal>": [hoererIds...] }`; ersetzt immer die ganze Tabelle
async fn routen_ersetzen(
    State(state): State<ApiState>,
    Json(body): Json<HashMap<ChannelNumber, Vec<ListenerId>>>,
) -> Response {
    state.manager.replace_routes(body);
    let tabelle = state.manager.routen();

    tracing::info!(
        kanaele = tabelle.kanal_anzahl(),
        hoerer = tabelle.hoerer_anzahl(),
        "Routing-Tabelle ersetzt"
    );
    (
        StatusCode::OK,
        Json(json!({
            "kanaele": tabelle.kanal_anzahl(),
            "hoerer": tabelle.hoerer_anzahl(),
        })),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Notrufe
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnrufBody {
    pub channel_number: ChannelNumber,
    pub caller_identity: String,
}

async fn anruf_registrieren(State(state): State<ApiState>, Json(body): Json<AnrufBody>) -> Response {
    if !body.channel_number.ist_notruf() {
        return fehler(
            StatusCode::BAD_REQUEST,
            format!("{} ist kein Notruf-Kanal", body.channel_number),
        );
    }
    if body.caller_identity.trim().is_empty() {
        return fehler(StatusCode::BAD_REQUEST, "callerIdentity fehlt");
    }

    state
        .anrufe
        .anruf_registrieren(body.channel_number, body.caller_identity);
    state.manager.routen_neu_bewerten();
    StatusCode::NO_CONTENT.into_response()
}

async fn anruf_entfernen(State(state): State<ApiState>, Path(kanal): Path<i64>) -> Response {
    if !state.anrufe.anruf_entfernen(ChannelNumber(kanal)) {
        return fehler(StatusCode::NOT_FOUND, format!("Kein Notruf auf Kanal {kanal}"));
    }
    state.manager.routen_neu_bewerten();
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatBody {
    pub identity: String,
    #[serde(default)]
    pub game_session_id: Option<ListenerId>,
}

async fn heartbeat(State(state): State<ApiState>, Json(body): Json<HeartbeatBody>) -> Response {
    if state.anrufe.heartbeat(&body.identity, body.game_session_id) {
        tracing::debug!(
            identitaet = %body.identity,
            session = ?body.game_session_id.map(|s| s.inner()),
            "Spiel-Session geaendert"
        );
        state.manager.routen_neu_bewerten();
    }
    StatusCode::NO_CONTENT.into_response()
}
