use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson, AppQuery, JSend, JSendPaginated};
use crate::api::session::{authorize_area, require};
use crate::auth::{Permission, Session};
use crate::storage::models::{FileEntry, FileKind, SortOrder};
use crate::storage::UploadRequest;
use crate::AppState;

const MAX_GRID_COLUMNS: usize = 3;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub anchor: String,
    pub comment: String,
    pub display_name: String,
    pub kind: FileKind,
    pub last_modified: String,
    /// Storage name; identifies the file in download, update and delete URLs.
    pub name: String,
    pub size: u64,
    pub uploaded_at: Option<String>,
    pub uploader: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file: FileResponse,
    pub overwritten: bool,
}

#[derive(Debug, Serialize)]
pub struct GridResponse {
    pub columns: usize,
    pub rows: Vec<Vec<FileResponse>>,
    pub total: u64,
}

#[derive(Debug, Deserialize)]
pub struct ListFilesParams {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub sort: SortOrder,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Deserialize)]
pub struct GridParams {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub sort: SortOrder,
    #[serde(default = "default_columns")]
    pub columns: usize,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFileRequest {
    pub comment: String,
}

fn default_limit() -> u32 {
    20
}

fn default_columns() -> usize {
    2
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(area): Path<String>,
    AppQuery(params): AppQuery<ListFilesParams>,
) -> Result<Json<JSendPaginated<FileResponse>>, ApiError> {
    let area = authorize_area(&state, &session, &area)?;
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let entries = state.catalog.search(&area.slug, &params.q, params.sort).await?;

    Ok(JSendPaginated::page(
        &entries,
        params.limit,
        params.offset,
        file_to_response,
    ))
}

/// Search results chunked into rows for a card layout.
pub async fn file_grid(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(area): Path<String>,
    AppQuery(params): AppQuery<GridParams>,
) -> Result<Json<JSend<GridResponse>>, ApiError> {
    let area = authorize_area(&state, &session, &area)?;
    if !(1..=MAX_GRID_COLUMNS).contains(&params.columns) {
        return Err(ApiError::bad_request(format!(
            "columns must be between 1 and {MAX_GRID_COLUMNS}"
        )));
    }

    let entries = state.catalog.search(&area.slug, &params.q, params.sort).await?;

    let rows = entries
        .chunks(params.columns)
        .map(|row| row.iter().map(file_to_response).collect())
        .collect();

    Ok(JSend::success(GridResponse {
        columns: params.columns,
        rows,
        total: entries.len() as u64,
    }))
}

pub async fn create_file(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(area): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<JSend<UploadResponse>>, ApiError> {
    let area = authorize_area(&state, &session, &area)?;
    require(&session, Permission::Upload)?;

    let mut file: Option<(String, Bytes)> = None;
    let mut comment = String::new();
    let mut overwrite = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;

                if data.len() as u64 > state.config.max_upload_size {
                    return Err(ApiError::payload_too_large(format!(
                        "File exceeds maximum upload size of {} bytes",
                        state.config.max_upload_size
                    )));
                }
                file = Some((file_name, data));
            }
            "comment" => {
                comment = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid comment: {e}")))?;
            }
            "overwrite" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid overwrite: {e}")))?;
                overwrite = matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "on");
            }
            _ => {}
        }
    }

    let (original_name, data) =
        file.ok_or_else(|| ApiError::bad_request("file field is required"))?;
    if original_name.trim().is_empty() {
        return Err(ApiError::bad_request("No file selected"));
    }

    let uploader = if session.name.trim().is_empty() {
        session.email.clone()
    } else {
        session.name.clone()
    };

    let outcome = state
        .catalog
        .upload(
            &area.slug,
            UploadRequest {
                original_name,
                data,
                comment,
                uploader,
                overwrite,
            },
        )
        .await?;

    Ok(JSend::success(UploadResponse {
        file: file_to_response(&outcome.entry),
        overwritten: outcome.overwritten,
    }))
}

pub async fn download_file(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path((area, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let area = authorize_area(&state, &session, &area)?;
    let (meta, data) = state.catalog.open_file(&area.slug, &name).await?;

    let display_name = meta.display_name(&name);
    let mime = mime_guess::from_path(display_name).first_or_octet_stream();
    let content_type = HeaderValue::from_str(mime.essence_str())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&content_disposition(display_name))
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}

pub async fn update_file(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path((area, name)): Path<(String, String)>,
    AppJson(req): AppJson<UpdateFileRequest>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let area = authorize_area(&state, &session, &area)?;
    require(&session, Permission::Edit)?;

    let entry = state.catalog.update_comment(&area.slug, &name, req.comment.trim()).await?;

    Ok(JSend::success(file_to_response(&entry)))
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path((area, name)): Path<(String, String)>,
) -> Result<Json<JSend<()>>, ApiError> {
    let area = authorize_area(&state, &session, &area)?;
    require(&session, Permission::Delete)?;

    state.catalog.delete_file(&area.slug, &name).await?;

    tracing::info!(area = %area.slug, name = %name, by = %session.email, "File deleted");
    Ok(JSend::success(()))
}

// ============================================================================
// Helpers
// ============================================================================

fn file_to_response(entry: &FileEntry) -> FileResponse {
    FileResponse {
        anchor: entry.anchor(),
        comment: entry.meta.comment.clone(),
        display_name: entry.display_name().to_string(),
        kind: entry.kind(),
        last_modified: entry.last_modified.to_rfc3339(),
        name: entry.name.clone(),
        size: entry.size,
        uploaded_at: entry.meta.uploaded_at.clone(),
        uploader: entry.meta.uploader.clone(),
    }
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987
/// `filename*` carrying the exact UTF-8 name.
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut encoded = String::with_capacity(file_name.len());
    for byte in file_name.bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }

    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::api::create_router;
    use crate::testutil::{
        body_json, login_cookie, multipart_body, seed_users, test_state, TestUser,
        MULTIPART_BOUNDARY,
    };

    fn upload_request(cookie: &str, area: &str, parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/areas/{area}/files"))
            .header(header::COOKIE, cookie)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    fn get(cookie: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn disposition_escapes_non_ascii_names() {
        assert_eq!(
            content_disposition("plan.pdf"),
            "attachment; filename=\"plan.pdf\"; filename*=UTF-8''plan.pdf"
        );
        assert_eq!(
            content_disposition("informe médico.pdf"),
            "attachment; filename=\"informe m_dico.pdf\"; filename*=UTF-8''informe%20m%C3%A9dico.pdf"
        );
    }

    #[tokio::test]
    async fn upload_list_download_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _mailer) = test_state(&dir);
        seed_users(
            &state,
            &[TestUser::new("ana@club.es", "pw", "todas", "subir,editar,eliminar")],
        )
        .await;
        let area_dir = std::path::Path::new(&state.config.storage.local_storage_path)
            .join("cuerpo_tecnico");
        let app = create_router(state);
        let cookie = login_cookie(&app, "ana@club.es", "pw").await;

        let resp = app
            .clone()
            .oneshot(upload_request(
                &cookie,
                "cuerpo_tecnico",
                &[
                    ("file", Some("Plan Semanal.pdf"), "%PDF-1.4"),
                    ("comment", None, "Semana 12"),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["overwritten"], false);
        assert_eq!(body["data"]["file"]["display_name"], "Plan Semanal.pdf");
        assert_eq!(body["data"]["file"]["kind"], "pdf");
        assert_eq!(body["data"]["file"]["anchor"], "id_plan_semanal");
        let name = body["data"]["file"]["name"].as_str().unwrap().to_string();
        assert!(name.ends_with("_Plan Semanal.pdf"));
        assert!(area_dir.join(format!("{name}.meta.json")).exists());
        let file_uri = format!("/areas/cuerpo_tecnico/files/{}", name.replace(' ', "%20"));

        let resp = app
            .clone()
            .oneshot(get(&cookie, "/areas/cuerpo_tecnico/files?q=semana"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["pagination"]["total"], 1);
        assert_eq!(body["data"]["items"][0]["comment"], "Semana 12");

        let resp = app
            .clone()
            .oneshot(get(&cookie, &file_uri))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
        assert!(resp.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment; filename=\"Plan Semanal.pdf\""));
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"%PDF-1.4");

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(&file_uri)
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(!area_dir.join(&name).exists());
        assert!(!area_dir.join(format!("{name}.meta.json")).exists());

        let resp = app
            .oneshot(get(&cookie, &file_uri))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn duplicate_upload_conflicts_unless_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _mailer) = test_state(&dir);
        seed_users(&state, &[TestUser::new("ana@club.es", "pw", "todas", "subir")]).await;
        let app = create_router(state);
        let cookie = login_cookie(&app, "ana@club.es", "pw").await;

        let file = ("file", Some("a.pdf"), "one");
        let resp = app
            .clone()
            .oneshot(upload_request(&cookie, "cuerpo_tecnico", &[file]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let first = body_json(resp).await["data"]["file"]["name"].clone();

        let resp = app
            .clone()
            .oneshot(upload_request(&cookie, "cuerpo_tecnico", &[("file", Some("a.pdf"), "two")]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = app
            .oneshot(upload_request(
                &cookie,
                "cuerpo_tecnico",
                &[("file", Some("a.pdf"), "two"), ("overwrite", None, "true")],
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["overwritten"], true);
        assert_eq!(body["data"]["file"]["name"], first);
    }

    #[tokio::test]
    async fn permissions_and_area_scope_are_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _mailer) = test_state(&dir);
        seed_users(
            &state,
            &[TestUser::new("leo@club.es", "pw", "Servicios Médicos", "")],
        )
        .await;
        let app = create_router(state);
        let cookie = login_cookie(&app, "leo@club.es", "pw").await;

        let resp = app
            .clone()
            .oneshot(get(&cookie, "/areas/servicios_medicos/files"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(get(&cookie, "/areas/cuerpo_tecnico/files"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app
            .clone()
            .oneshot(get(&cookie, "/areas/nowhere/files"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app
            .oneshot(upload_request(
                &cookie,
                "servicios_medicos",
                &[("file", Some("x.pdf"), "x")],
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn grid_chunks_rows_and_validates_columns() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _mailer) = test_state(&dir);
        seed_users(&state, &[TestUser::new("ana@club.es", "pw", "todas", "subir")]).await;
        let app = create_router(state);
        let cookie = login_cookie(&app, "ana@club.es", "pw").await;

        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            let resp = app
                .clone()
                .oneshot(upload_request(&cookie, "cuerpo_tecnico", &[("file", Some(name), "x")]))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let resp = app
            .clone()
            .oneshot(get(&cookie, "/areas/cuerpo_tecnico/grid?sort=name_asc"))
            .await
            .unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["data"]["total"], 3);
        assert_eq!(body["data"]["rows"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"]["rows"][0][0]["display_name"], "a.pdf");
        assert_eq!(body["data"]["rows"][1][0]["display_name"], "c.pdf");

        let resp = app
            .oneshot(get(&cookie, "/areas/cuerpo_tecnico/grid?columns=4"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn comment_edit_requires_permission() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _mailer) = test_state(&dir);
        seed_users(
            &state,
            &[
                TestUser::new("ana@club.es", "pw", "todas", "subir,editar"),
                TestUser::new("leo@club.es", "pw", "todas", ""),
            ],
        )
        .await;
        let app = create_router(state);
        let ana = login_cookie(&app, "ana@club.es", "pw").await;
        let leo = login_cookie(&app, "leo@club.es", "pw").await;

        let resp = app
            .clone()
            .oneshot(upload_request(&ana, "cuerpo_tecnico", &[("file", Some("a.pdf"), "x")]))
            .await
            .unwrap();
        let name = body_json(resp).await["data"]["file"]["name"]
            .as_str()
            .unwrap()
            .to_string();

        let edit = |cookie: &str| {
            Request::builder()
                .method("PUT")
                .uri(format!("/areas/cuerpo_tecnico/files/{name}"))
                .header(header::COOKIE, cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"comment":"  revisado  "}"#))
                .unwrap()
        };

        let resp = app.clone().oneshot(edit(leo.as_str())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app.oneshot(edit(ana.as_str())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["data"]["comment"], "revisado");
    }
}
