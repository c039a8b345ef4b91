use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::JSend;
use crate::config::StorageBackend;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub areas: usize,
    pub mail: &'static str,
    pub status: &'static str,
    pub storage: &'static str,
    pub version: &'static str,
}

/// Liveness plus the shape of the running configuration. Does not touch storage.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<JSend<HealthResponse>> {
    let config = &state.config;
    JSend::success(HealthResponse {
        areas: config.areas.len(),
        mail: if config.smtp.is_some() { "smtp" } else { "log" },
        status: "ok",
        storage: match config.storage.backend {
            StorageBackend::Gcs => "gcs",
            StorageBackend::Local => "local",
        },
        version: env!("CARGO_PKG_VERSION"),
    })
}
