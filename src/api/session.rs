use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::PrivateCookieJar;

use crate::api::response::ApiError;
use crate::auth::session::SESSION_COOKIE;
use crate::auth::{Permission, Session};
use crate::config::Area;
use crate::AppState;

/// Reads the session from the encrypted cookie; rejects with 401 when absent
/// or undecryptable.
#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, ApiError> {
        let jar = PrivateCookieJar::from_headers(&parts.headers, state.cookie_key.clone());
        let cookie = jar
            .get(SESSION_COOKIE)
            .ok_or_else(|| ApiError::unauthorized("Sign in to continue"))?;

        serde_json::from_str(cookie.value())
            .map_err(|_| ApiError::unauthorized("Session is no longer valid, sign in again"))
    }
}

/// Resolve an area slug from the URL and check the session may use it.
pub fn authorize_area<'a>(
    state: &'a AppState,
    session: &Session,
    slug: &str,
) -> Result<&'a Area, ApiError> {
    let area = state
        .config
        .area(slug)
        .ok_or_else(|| ApiError::not_found(format!("Unknown area '{slug}'")))?;

    if !session.can_access(area) {
        return Err(ApiError::forbidden(format!(
            "You do not have access to {}",
            area.name
        )));
    }
    Ok(area)
}

pub fn require(session: &Session, permission: Permission) -> Result<(), ApiError> {
    if session.has(permission) {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!(
            "The '{}' permission is required",
            permission.as_str()
        )))
    }
}
