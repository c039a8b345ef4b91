//! resource-portal - an internal file-sharing portal
//!
//! Authenticated users browse, upload, comment on and download files
//! organised by area, and keep a shared link list per area:
//! - Swappable object storage backends (local filesystem, GCS)
//! - Sidecar JSON metadata next to every stored file
//! - User table kept as a spreadsheet in the same store
//! - Encrypted session cookies and emailed, signed recovery tokens
//! - REST API with multipart upload support

pub mod api;
pub mod auth;
pub mod config;
pub mod object_store;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;
use std::time::Duration;

use axum_extra::extract::cookie::Key;

use auth::{Mailer, RecoverySigner, UserDirectory, RECOVERY_SALT};
use config::Config;
use object_store::ObjectStore;
use storage::Catalog;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub catalog: Catalog,
    pub users: UserDirectory,
    pub recovery: RecoverySigner,
    pub mailer: Arc<dyn Mailer>,
    pub cookie_key: Key,
}

impl AppState {
    pub fn new(config: Config, object_store: Arc<dyn ObjectStore>, mailer: Arc<dyn Mailer>) -> Self {
        let cache_ttl = Duration::from_secs(config.cache_ttl_seconds);

        let catalog = Catalog::new(
            Arc::clone(&object_store),
            cache_ttl,
            config.allowed_extensions.clone(),
        );
        let users = UserDirectory::new(
            object_store,
            config.storage.users_object_key.clone(),
            config.auth.bcrypt_cost,
            cache_ttl,
        );
        let recovery = RecoverySigner::new(
            &config.auth.secret_key,
            RECOVERY_SALT,
            config.auth.recovery_max_age_seconds,
        );
        let cookie_key = auth::session::cookie_key(&config.auth.secret_key);

        Self {
            config,
            catalog,
            users,
            recovery,
            mailer,
            cookie_key,
        }
    }
}
