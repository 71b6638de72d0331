//! funkbruecke-server – Bibliotheks-Root
//!
//! Verdrahtet Session-Manager, Anrufer-Register, HTTP-API, WebSocket-Adapter
//! und Observability zu einem Router. Der Einstiegspunkt fuer
//! Integrationstests ist [`Server::router`].

pub mod api;
pub mod config;

use anyhow::Result;
use axum::http::{HeaderValue, Method};
use axum::Router;
use config::ServerConfig;
use funkbruecke_observability::{observability_router, MetrikWerte, StatusQuelle};
use funkbruecke_signaling::ws_router;
use funkbruecke_voice::{CallRegistry, CallerLookup, Connector, MumbleConnector, SessionManager};
use std::future::IntoFuture;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use api::{api_router, ApiState};

// ---------------------------------------------------------------------------
// Metrik-Quelle
// ---------------------------------------------------------------------------

/// Liefert Metriken und Health aus der Status-Momentaufnahme
struct ManagerQuelle(SessionManager);

impl StatusQuelle for ManagerQuelle {
    fn momentaufnahme(&self) -> MetrikWerte {
        let status = self.0.status();
        let mut werte = MetrikWerte {
            sessions_aktiv: status.sessions.len() as u64,
            routen_kanaele: status.routen.kanaele as u64,
            routen_hoerer: status.routen.hoerer as u64,
            ..Default::default()
        };
        for session in &status.sessions {
            let z = &session.zaehler;
            werte.sessions_verbunden += u64::from(session.verbunden);
            werte.frames_gesendet += z.frames_gesendet;
            werte.frames_ohne_route += z.keine_route;
            werte.frames_verworfen += z.frames_verworfen;
            werte.verbindungsfehler += z.verbindungs_fehler;
            werte.eingehende_pakete += z.eingehende_pakete;
        }
        werte
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
    manager: SessionManager,
    anrufe: CallRegistry,
}

impl Server {
    /// Erstellt den Server mit dem echten Mumble-Connector
    pub fn neu(config: ServerConfig) -> Self {
        Self::mit_connector(config, Arc::new(MumbleConnector::neu()))
    }

    /// Erstellt den Server mit beliebigem Connector (Tests)
    pub fn mit_connector(config: ServerConfig, connector: Arc<dyn Connector>) -> Self {
        let anrufe = CallRegistry::neu();
        let manager = SessionManager::neu(
            config.manager_konfiguration(),
            connector,
            Some(Arc::new(anrufe.clone()) as Arc<dyn CallerLookup>),
        );
        Self {
            config,
            manager,
            anrufe,
        }
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Vollstaendiger Router: API, WebSocket, `/metrics`, `/health`
    pub fn router(&self) -> Result<Router> {
        let quelle: Arc<dyn StatusQuelle> = Arc::new(ManagerQuelle(self.manager.clone()));

        Ok(Router::new()
            .merge(api_router(ApiState {
                manager: self.manager.clone(),
                anrufe: self.anrufe.clone(),
            }))
            .merge(ws_router(self.manager.clone()))
            .merge(observability_router(quelle)?)
            .layer(TraceLayer::new_for_http())
            .layer(self.cors()))
    }

    /// CORS: entweder spezifische Origins oder Any
    fn cors(&self) -> CorsLayer {
        if self.config.http.cors_origins.is_empty() {
            return CorsLayer::permissive();
        }
        let origins: Vec<HeaderValue> = self
            .config
            .http
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers(tower_http::cors::Any)
    }

    /// Startet den HTTP-Server und laeuft bis zum Shutdown-Signal (Ctrl-C)
    ///
    /// Beim Shutdown werden alle Dispatcher sauber getrennt.
    pub async fn starten(self) -> Result<()> {
        let adresse = self.config.http_bind_adresse();
        let app = self.router()?;

        tracing::info!(
            http = %adresse,
            mumble_host = %self.config.mumble.host,
            mumble_port = self.config.mumble.port,
            fallback_normal_talk = self.config.bridge.fallback_normal_talk,
            "Funkbruecke startet"
        );

        let listener = tokio::net::TcpListener::bind(&adresse).await?;
        tokio::select! {
            ergebnis = axum::serve(listener, app).into_future() => ergebnis?,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Shutdown-Signal empfangen, Bruecke wird beendet");
            }
        }

        let getrennt = self.manager.alle_trennen();
        tracing::info!(getrennt, "Alle Dispatcher getrennt");
        Ok(())
    }
}
