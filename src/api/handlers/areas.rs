use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::JSend;
use crate::auth::Session;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AreaResponse {
    pub name: String,
    pub slug: String,
}

/// Areas the signed-in user may open; everything for all-areas users.
pub async fn list_areas(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Json<JSend<Vec<AreaResponse>>> {
    let areas = session
        .visible_areas(&state.config)
        .into_iter()
        .map(|a| AreaResponse {
            name: a.name.clone(),
            slug: a.slug.clone(),
        })
        .collect();

    JSend::success(areas)
}
