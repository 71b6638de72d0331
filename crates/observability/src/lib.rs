//! # funkbruecke-observability
//!
//! Observability-Crate der Funkbruecke:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/health`)
//! - Structured Logging via tracing-subscriber

pub mod health;
pub mod logging;
pub mod metrics;

pub use health::{health_router, HealthResponse, HealthStatus};
pub use logging::{log_format_gueltig, log_level_gueltig, logging_initialisieren};
pub use metrics::{metrics_router, BridgeMetrics, MetrikWerte, StatusQuelle};

use anyhow::Result;
use axum::Router;
use std::sync::Arc;

/// Router mit `GET /metrics` und `GET /health`
pub fn observability_router(quelle: Arc<dyn StatusQuelle>) -> Result<Router> {
    let metriken = BridgeMetrics::neu()?;
    Ok(Router::new()
        .merge(metrics_router(metriken, Arc::clone(&quelle)))
        .merge(health_router(quelle)))
}
