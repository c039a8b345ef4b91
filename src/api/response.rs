use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::{RecoveryError, UserError};
use crate::storage::CatalogError;

// ============================================================================
// JSend envelopes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JSendStatus {
    Error,
    Fail,
    Success,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JSend<T: Serialize> {
    pub data: T,
    pub status: JSendStatus,
}

impl<T: Serialize> JSend<T> {
    pub fn success(data: T) -> Json<JSend<T>> {
        Json(JSend {
            data,
            status: JSendStatus::Success,
        })
    }
}

/// Success envelope carrying one page of a longer result.
#[derive(Debug, Serialize)]
pub struct JSendPaginated<T: Serialize> {
    pub data: PaginatedData<T>,
    pub status: JSendStatus,
}

#[derive(Debug, Serialize)]
pub struct PaginatedData<T: Serialize> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
    pub total: u64,
}

impl<T: Serialize> JSendPaginated<T> {
    /// Cut `limit` items starting at `offset` out of `all`, converting each.
    pub fn page<I>(
        all: &[I],
        limit: u32,
        offset: u32,
        convert: impl FnMut(&I) -> T,
    ) -> Json<JSendPaginated<T>> {
        let items = all
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(convert)
            .collect();

        Json(JSendPaginated {
            data: PaginatedData {
                items,
                pagination: Pagination {
                    limit,
                    offset,
                    total: all.len() as u64,
                },
            },
            status: JSendStatus::Success,
        })
    }
}

/// Client error body (4xx): `{"data": {"message": ...}, "status": "fail"}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct JSendFail {
    pub data: FailData,
    pub status: JSendStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailData {
    pub message: String,
}

/// Server error body (5xx): `{"message": ..., "status": "error"}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct JSendError {
    pub message: String,
    pub status: JSendStatus,
}

// ============================================================================
// Handler errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Fail(StatusCode, String),
    Error(StatusCode, String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Fail(code, message) => (
                code,
                Json(JSendFail {
                    data: FailData { message },
                    status: JSendStatus::Fail,
                }),
            )
                .into_response(),
            ApiError::Error(code, message) => (
                code,
                Json(JSendError {
                    message,
                    status: JSendStatus::Error,
                }),
            )
                .into_response(),
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::BAD_REQUEST, message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::UNAUTHORIZED, message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::FORBIDDEN, message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::NOT_FOUND, message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::CONFLICT, message.into())
    }

    /// Expired recovery links.
    pub fn gone(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::GONE, message.into())
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::PAYLOAD_TOO_LARGE, message.into())
    }

    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::UNSUPPORTED_MEDIA_TYPE, message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Error(StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }

    /// An upstream service (the mail relay) failed.
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        ApiError::Error(StatusCode::BAD_GATEWAY, message.into())
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound(_) => ApiError::not_found("File not found"),
            CatalogError::LinkNotFound(_) => ApiError::not_found(e.to_string()),
            CatalogError::AlreadyExists { .. } => ApiError::conflict(format!(
                "{e}. Send overwrite=true to replace it, or rename the file."
            )),
            CatalogError::InvalidName(_) | CatalogError::InvalidLink(_) => {
                ApiError::bad_request(e.to_string())
            }
            CatalogError::UnsupportedType(_) => ApiError::unsupported_media_type(e.to_string()),
            CatalogError::Store(_) | CatalogError::Serialization(_) => {
                tracing::error!(error = %e, "Catalog operation failed");
                ApiError::internal(e.to_string())
            }
        }
    }
}

impl From<UserError> for ApiError {
    fn from(e: UserError) -> Self {
        tracing::error!(error = %e, "User table operation failed");
        ApiError::internal("User directory is unavailable")
    }
}

impl From<RecoveryError> for ApiError {
    fn from(e: RecoveryError) -> Self {
        match e {
            RecoveryError::Expired { .. } => ApiError::gone(e.to_string()),
            RecoveryError::Invalid => ApiError::bad_request(e.to_string()),
        }
    }
}

// ============================================================================
// Extractors rejecting with JSend bodies
// ============================================================================

/// `axum::Json` with JSend rejections.
pub struct AppJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, ApiError> {
        let rejection = match axum::Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => return Ok(AppJson(value)),
            Err(rejection) => rejection,
        };

        let message = match rejection {
            JsonRejection::JsonDataError(err) => {
                format!("Invalid request body: {}", err.body_text())
            }
            JsonRejection::JsonSyntaxError(_) => "Malformed JSON in request body".into(),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing Content-Type: application/json header".into()
            }
            _ => "Failed to read request body".into(),
        };
        Err(ApiError::bad_request(message))
    }
}

/// Query-string extractor backed by serde_qs, with JSend rejections.
pub struct AppQuery<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, ApiError> {
        let query = parts.uri.query().unwrap_or_default();
        serde_qs::from_str(query)
            .map(AppQuery)
            .map_err(|e| ApiError::bad_request(friendly_query_error(&e.to_string())))
    }
}

fn friendly_query_error(raw: &str) -> String {
    let cleaned = raw
        .replace("u32", "non-negative integer")
        .replace("usize", "non-negative integer")
        .replace("unknown variant", "unknown value");

    format!("Invalid query parameter: {cleaned}")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn fail_and_error_bodies_differ() {
        let resp = ApiError::forbidden("nope").into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let json = body(resp).await;
        assert_eq!(json["status"], "fail");
        assert_eq!(json["data"]["message"], "nope");

        let resp = ApiError::bad_gateway("relay down").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let json = body(resp).await;
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "relay down");
    }

    #[test]
    fn catalog_errors_map_to_statuses() {
        let status = |e: CatalogError| match ApiError::from(e) {
            ApiError::Fail(code, _) | ApiError::Error(code, _) => code,
        };
        assert_eq!(status(CatalogError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(CatalogError::LinkNotFound(2)), StatusCode::NOT_FOUND);
        assert_eq!(
            status(CatalogError::AlreadyExists {
                display_name: "a.pdf".into(),
                existing: "20250101-000000_a.pdf".into(),
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(CatalogError::UnsupportedType("a.exe".into())),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            status(CatalogError::InvalidLink("bad".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn page_slices_and_counts() {
        let Json(page) = JSendPaginated::page(&[1, 2, 3, 4, 5], 2, 3, |n| n * 10);
        assert_eq!(page.data.items, [40, 50]);
        assert_eq!(page.data.pagination.total, 5);

        let Json(past_end) = JSendPaginated::page(&[1, 2], 10, 5, |n: &i32| *n);
        assert!(past_end.data.items.is_empty());
        assert_eq!(past_end.data.pagination.total, 2);
    }
}
