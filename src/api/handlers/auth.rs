use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use axum_extra::extract::cookie::PrivateCookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson, AppQuery, JSend};
use crate::auth::mailer::recovery_mail;
use crate::auth::session::{removal_cookie, session_cookie};
use crate::auth::Session;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Keep the session cookie across browser restarts.
    #[serde(default)]
    pub remember: bool,
}

#[derive(Debug, Deserialize)]
pub struct RecoveryRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenParams {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
    pub confirm: String,
}

#[derive(Debug, Serialize)]
pub struct EmailResponse {
    pub email: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<(PrivateCookieJar, Json<JSend<Session>>), ApiError> {
    let user = state
        .users
        .authenticate(&req.email, &req.password)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    let session = Session::from(&user);
    let cookie = session_cookie(&session, req.remember, &state.config.auth)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let jar = PrivateCookieJar::new(state.cookie_key.clone()).add(cookie);

    tracing::info!(email = %session.email, remember = req.remember, "Signed in");
    Ok((jar, JSend::success(session)))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> (PrivateCookieJar, Json<JSend<()>>) {
    let jar = PrivateCookieJar::from_headers(&headers, state.cookie_key.clone())
        .remove(removal_cookie());
    (jar, JSend::success(()))
}

pub async fn current_session(session: Session) -> Json<JSend<Session>> {
    JSend::success(session)
}

/// Email a recovery link to a registered address.
pub async fn request_recovery(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RecoveryRequest>,
) -> Result<Json<JSend<EmailResponse>>, ApiError> {
    let user = state
        .users
        .find(&req.email)
        .await?
        .ok_or_else(|| ApiError::not_found("Email not registered"))?;

    let token = state.recovery.issue(&user.email);
    let url = recovery_url(&state.config.server.app_url, &token);

    state
        .mailer
        .send(recovery_mail(&user.email, &url))
        .await
        .map_err(|e| {
            tracing::error!(email = %user.email, error = %e, "Failed to send recovery email");
            ApiError::bad_gateway(format!("Failed to send recovery email: {e}"))
        })?;

    tracing::info!(email = %user.email, "Recovery link sent");
    Ok(JSend::success(EmailResponse { email: user.email }))
}

/// Check a recovery token before showing the new-password form.
pub async fn check_recovery_token(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<TokenParams>,
) -> Result<Json<JSend<EmailResponse>>, ApiError> {
    let email = state.recovery.verify(&params.token)?;
    Ok(JSend::success(EmailResponse { email }))
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<ResetPasswordRequest>,
) -> Result<Json<JSend<EmailResponse>>, ApiError> {
    let email = state.recovery.verify(&req.token)?;

    if req.password.is_empty() {
        return Err(ApiError::bad_request("Password must not be empty"));
    }
    if req.password != req.confirm {
        return Err(ApiError::bad_request("Passwords do not match"));
    }

    let updated = state.users.set_password(&email, &req.password).await?;
    if !updated {
        return Err(ApiError::not_found("Account no longer exists"));
    }

    Ok(JSend::success(EmailResponse { email }))
}

// ============================================================================
// Helpers
// ============================================================================

fn recovery_url(app_url: &str, token: &str) -> String {
    let separator = if app_url.contains('?') { '&' } else { '?' };
    format!("{app_url}{separator}token={token}")
}
