use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson, JSend};
use crate::api::session::{authorize_area, require};
use crate::auth::{Permission, Session};
use crate::storage::models::SharedLink;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct LinkResponse {
    /// Position in the list; addresses the link in update and delete URLs.
    pub index: usize,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    pub title: String,
    pub url: String,
}

pub async fn list_links(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(area): Path<String>,
) -> Result<Json<JSend<Vec<LinkResponse>>>, ApiError> {
    let area = authorize_area(&state, &session, &area)?;
    let links = state.catalog.list_links(&area.slug).await?;

    Ok(JSend::success(
        links
            .into_iter()
            .enumerate()
            .map(|(index, link)| link_to_response(index, link))
            .collect(),
    ))
}

pub async fn create_link(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(area): Path<String>,
    AppJson(req): AppJson<LinkRequest>,
) -> Result<Json<JSend<LinkResponse>>, ApiError> {
    let area = authorize_area(&state, &session, &area)?;
    require(&session, Permission::Upload)?;

    let (index, link) = state.catalog.add_link(&area.slug, &req.title, &req.url).await?;

    Ok(JSend::success(link_to_response(index, link)))
}

pub async fn update_link(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path((area, index)): Path<(String, usize)>,
    AppJson(req): AppJson<LinkRequest>,
) -> Result<Json<JSend<LinkResponse>>, ApiError> {
    let area = authorize_area(&state, &session, &area)?;
    require(&session, Permission::Edit)?;

    let link = state.catalog.update_link(&area.slug, index, &req.title, &req.url).await?;

    Ok(JSend::success(link_to_response(index, link)))
}

pub async fn delete_link(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path((area, index)): Path<(String, usize)>,
) -> Result<Json<JSend<LinkResponse>>, ApiError> {
    let area = authorize_area(&state, &session, &area)?;
    require(&session, Permission::Delete)?;

    let removed = state.catalog.delete_link(&area.slug, index).await?;

    tracing::info!(area = %area.slug, index, by = %session.email, "Link deleted");
    Ok(JSend::success(link_to_response(index, removed)))
}

fn link_to_response(index: usize, link: SharedLink) -> LinkResponse {
    LinkResponse {
        index,
        title: link.title,
        url: link.url,
    }
}
