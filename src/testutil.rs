//! Shared test helpers for resource-portal handler tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use bytes::Bytes;
use tower::ServiceExt;

use crate::auth::session::SESSION_COOKIE;
use crate::auth::{MailError, Mailer, OutgoingMail, UserTable};
use crate::config::{
    parse_areas, parse_extensions, AuthConfig, Config, ServerConfig, StorageConfig,
    DEFAULT_AREAS, DEFAULT_EXTENSIONS,
};
use crate::object_store::{LocalStore, ObjectStore};
use crate::AppState;

pub const MULTIPART_BOUNDARY: &str = "portal-test-boundary";

/// Mailer that keeps messages in memory and can be told to fail once.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        if self.fail.swap(false, Ordering::SeqCst) {
            let err = "not an address".parse::<lettre::Address>().unwrap_err();
            return Err(MailError::Address(err));
        }
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

/// A user row for [`seed_users`]; the password is stored in plain text and
/// hashed on the way in.
pub struct TestUser {
    pub email: String,
    pub password: String,
    pub area: String,
    pub permissions: String,
}

impl TestUser {
    pub fn new(email: &str, password: &str, area: &str, permissions: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
            area: area.to_string(),
            permissions: permissions.to_string(),
        }
    }
}

/// Create a test AppState on a temporary local object store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> (Arc<AppState>, Arc<RecordingMailer>) {
    let files_dir = temp_dir.path().join("files");

    let config = Config {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            app_url: "http://portal.test/".to_string(),
        },
        auth: AuthConfig {
            secret_key: "test-secret-key-that-is-long-enough".to_string(),
            bcrypt_cost: 4,
            ..AuthConfig::default()
        },
        storage: StorageConfig {
            local_storage_path: files_dir.to_string_lossy().to_string(),
            ..StorageConfig::default()
        },
        smtp: None,
        areas: parse_areas(DEFAULT_AREAS).expect("default areas parse"),
        allowed_extensions: parse_extensions(DEFAULT_EXTENSIONS),
        max_upload_size: 10 * 1024 * 1024, // 10MB for tests
        cache_ttl_seconds: 60,
    };

    let object_store = LocalStore::new(&files_dir).expect("Failed to create test object store");
    let mailer = Arc::new(RecordingMailer::default());

    let state = AppState::new(config, Arc::new(object_store), mailer.clone());
    (Arc::new(state), mailer)
}

/// Write a user spreadsheet with bcrypt-hashed passwords into the state's store.
pub async fn seed_users(state: &AppState, users: &[TestUser]) {
    let headers = ["mail", "usuario", "area", "permisos", "rol", "contraseña"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let rows = users
        .iter()
        .map(|u| {
            let name = u.email.split('@').next().unwrap_or_default().to_string();
            vec![
                u.email.clone(),
                name,
                u.area.clone(),
                u.permissions.clone(),
                "Staff".to_string(),
                u.password.clone(),
            ]
        })
        .collect();

    let mut table = UserTable::new(headers, rows).unwrap();
    table.hash_plaintext_passwords(4).unwrap();

    let store = LocalStore::new(&state.config.storage.local_storage_path).unwrap();
    store
        .put(
            &state.config.storage.users_object_key,
            Bytes::from(table.to_xlsx().unwrap()),
        )
        .await
        .unwrap();
}

/// The `name=value` pair of the session cookie set by a response.
pub fn session_cookie_from<B>(resp: &Response<B>) -> Option<String> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{SESSION_COOKIE}=")))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

/// Sign in through the router and return the cookie to send back.
pub async fn login_cookie(app: &Router, email: &str, password: &str) -> String {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({"email": email, "password": password}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    session_cookie_from(&resp).expect("login should set a session cookie")
}

pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Encode `(field, file name, content)` parts as multipart/form-data.
pub fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, file_name, content) in parts {
        body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
        match file_name {
            Some(file_name) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{field}\"\r\n\r\n").as_bytes(),
                );
            }
        }
        body.extend_from_slice(content.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}
