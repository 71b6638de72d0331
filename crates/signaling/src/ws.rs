//! WebSocket-Adapter fuer das Signaling-Gateway
//!
//! `GET /voice/ws?dispatcherId=<id>&name=<anzeige>` oeffnet eine
//! Browser-Verbindung. Pro Socket laeuft eine Schleife, die Browser-Frames
//! an das [`SignalingGateway`] reicht und dekodiertes Audio als
//! Binaerframes zurueckschreibt. Schliesst der Socket, wird der Disponent
//! getrennt.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use funkbruecke_core::DispatcherId;
use funkbruecke_voice::SessionManager;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;

use crate::gateway::SignalingGateway;
use crate::messages::AusgehendeNachricht;

/// Query-Parameter beim Verbindungsaufbau
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerbindungsParameter {
    pub dispatcher_id: DispatcherId,
    #[serde(default)]
    pub name: Option<String>,
}

impl VerbindungsParameter {
    /// Anzeigename; ohne Angabe `Dispatcher <id>`
    pub fn anzeigename(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Dispatcher {}", self.dispatcher_id.inner()),
        }
    }
}

/// Router mit dem WebSocket-Endpunkt
pub fn ws_router(manager: SessionManager) -> Router {
    Router::new()
        .route("/voice/ws", get(ws_handler))
        .with_state(manager)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(parameter): Query<VerbindungsParameter>,
    State(manager): State<SessionManager>,
) -> Response {
    if parameter.dispatcher_id.inner() == 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "dispatcherId muss positiv sein" })),
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| socket_verarbeiten(socket, manager, parameter))
}

/// Verarbeitungsschleife einer Browser-Verbindung
async fn socket_verarbeiten(
    socket: WebSocket,
    manager: SessionManager,
    parameter: VerbindungsParameter,
) {
    let (mut gateway, mut audio_rx) =
        SignalingGateway::neu(manager, parameter.dispatcher_id, parameter.anzeigename());
    let id = gateway.dispatcher_id();
    let (mut sender, mut empfaenger) = socket.split();

    tracing::info!(dispatcher_id = %id, "Browser verbunden");

    loop {
        tokio::select! {
            // Frames vom Browser
            frame = empfaenger.next() => {
                let antwort = match frame {
                    Some(Ok(Message::Text(text))) => Some(gateway.text_verarbeiten(&text).await),
                    Some(Ok(Message::Binary(pcm))) => gateway.pcm_verarbeiten(&pcm),
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!(dispatcher_id = %id, "Browser-Verbindung geschlossen");
                        break;
                    }
                    // Ping/Pong beantwortet axum selbst
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        tracing::warn!(dispatcher_id = %id, fehler = %e, "WebSocket-Lesefehler");
                        break;
                    }
                };

                if let Some(antwort) = antwort {
                    if let Err(e) = senden(&mut sender, &antwort).await {
                        tracing::warn!(dispatcher_id = %id, fehler = %e, "Antwort nicht gesendet");
                        break;
                    }
                }
            }

            // Dekodiertes Audio Richtung Browser
            Some(pcm) = audio_rx.recv() => {
                if let Err(e) = sender.send(Message::Binary(pcm)).await {
                    tracing::warn!(dispatcher_id = %id, fehler = %e, "Audio-Senden fehlgeschlagen");
                    break;
                }
            }
        }
    }

    gateway.beenden();
    tracing::info!(dispatcher_id = %id, "Browser-Task beendet");
}

async fn senden(
    sender: &mut SplitSink<WebSocket, Message>,
    nachricht: &AusgehendeNachricht,
) -> Result<(), axum::Error> {
    let text = match nachricht.als_json() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(fehler = %e, "Antwort nicht serialisierbar");
            return Ok(());
        }
    };
    sender.send(Message::Text(text)).await
}
