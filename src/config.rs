use std::collections::HashSet;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub(crate) const DEFAULT_AREAS: &str = "Dirección Deportiva=direccion_deportiva;\
                             Cuerpo Técnico=cuerpo_tecnico;\
                             Servicios Médicos=servicios_medicos";

/// Upper bound for remembered sessions; larger values overflow the cookie's `Max-Age`.
pub const MAX_SESSION_DAYS: i64 = 3650;

pub(crate) const DEFAULT_EXTENSIONS: &str = "pdf,doc,docx,ppt,pptx,xlsx,xls,csv,mp4,mov,jpg,jpeg,png,gif";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub smtp: Option<SmtpConfig>,
    pub areas: Vec<Area>,
    /// Lower-case extensions accepted on upload. Empty accepts everything.
    pub allowed_extensions: Vec<String>,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
    /// TTL for the catalog listing and user table caches. Zero disables caching.
    pub cache_ttl_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Public base URL; recovery links are `<app_url>?token=<token>`.
    pub app_url: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub secret_key: String,
    pub recovery_max_age_seconds: i64,
    pub session_days: i64,
    pub cookie_secure: bool,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone)]
pub enum StorageBackend {
    Gcs,
    Local,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for local storage backend
    pub local_storage_path: String,
    /// GCS bucket name (required when backend is gcs)
    pub gcs_bucket: Option<String>,
    /// Path to GCS service account JSON (optional, defaults to ADC)
    pub gcs_credentials_file: Option<String>,
    /// Object key of the user spreadsheet
    pub users_object_key: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// An organisational partition of the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Area {
    /// Human-readable name, as stored in the user table.
    pub name: String,
    /// Storage-key prefix and URL segment.
    pub slug: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            recovery_max_age_seconds: 1800,
            session_days: 30,
            cookie_secure: false,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_storage_path: "./files".to_string(),
            gcs_bucket: None,
            gcs_credentials_file: None,
            users_object_key: "usuarios.xlsx".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let app_url =
            std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());

        let secret_key = std::env::var("SECRET_KEY").unwrap_or_default();

        let recovery_max_age_seconds = env_parse("RECOVERY_MAX_AGE_SECONDS").unwrap_or(1800);
        let session_days = env_parse("SESSION_DAYS").unwrap_or(30);
        let bcrypt_cost = env_parse("BCRYPT_COST").unwrap_or(bcrypt::DEFAULT_COST);

        let cookie_secure = std::env::var("COOKIE_SECURE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let max_upload_size = env_parse("MAX_UPLOAD_SIZE").unwrap_or(50 * 1024 * 1024); // 50MB
        let cache_ttl_seconds = env_parse("CACHE_TTL_SECONDS").unwrap_or(60);

        let storage_backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "gcs" => StorageBackend::Gcs,
            _ => StorageBackend::Local,
        };

        let local_storage_path =
            std::env::var("LOCAL_STORAGE_PATH").unwrap_or_else(|_| "./files".to_string());

        let gcs_bucket = std::env::var("GCS_BUCKET").ok();
        let gcs_credentials_file = std::env::var("GCS_CREDENTIALS_FILE").ok();
        let users_object_key =
            std::env::var("USERS_OBJECT_KEY").unwrap_or_else(|_| "usuarios.xlsx".to_string());

        let smtp = std::env::var("SMTP_SERVER")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(|server| {
                let username = std::env::var("SMTP_USER").unwrap_or_default();
                SmtpConfig {
                    server,
                    port: env_parse("SMTP_PORT").unwrap_or(587),
                    password: std::env::var("SMTP_PASS").unwrap_or_default(),
                    from: std::env::var("SMTP_FROM").unwrap_or_else(|_| username.clone()),
                    username,
                }
            });

        let areas = parse_areas(
            &std::env::var("AREAS").unwrap_or_else(|_| DEFAULT_AREAS.to_string()),
        )?;

        let allowed_extensions = parse_extensions(
            &std::env::var("ALLOWED_EXTENSIONS").unwrap_or_else(|_| DEFAULT_EXTENSIONS.to_string()),
        );

        let config = Config {
            server: ServerConfig {
                bind_address,
                app_url,
            },
            auth: AuthConfig {
                secret_key,
                recovery_max_age_seconds,
                session_days,
                cookie_secure,
                bcrypt_cost,
            },
            storage: StorageConfig {
                backend: storage_backend,
                local_storage_path,
                gcs_bucket,
                gcs_credentials_file,
                users_object_key,
            },
            smtp,
            areas,
            allowed_extensions,
            max_upload_size,
            cache_ttl_seconds,
        };

        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.secret_key.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "SECRET_KEY cannot be empty".to_string(),
            ));
        }

        if self.auth.recovery_max_age_seconds <= 0 {
            return Err(ConfigError::ValidationError(
                "RECOVERY_MAX_AGE_SECONDS must be positive".to_string(),
            ));
        }

        if !(1..=MAX_SESSION_DAYS).contains(&self.auth.session_days) {
            return Err(ConfigError::ValidationError(format!(
                "SESSION_DAYS must be between 1 and {MAX_SESSION_DAYS}"
            )));
        }

        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            return Err(ConfigError::ValidationError(
                "BCRYPT_COST must be between 4 and 31".to_string(),
            ));
        }

        if matches!(self.storage.backend, StorageBackend::Gcs) && self.storage.gcs_bucket.is_none()
        {
            return Err(ConfigError::ValidationError(
                "GCS_BUCKET is required when STORAGE_BACKEND=gcs".to_string(),
            ));
        }

        if self.areas.is_empty() {
            return Err(ConfigError::ValidationError(
                "AREAS must define at least one area".to_string(),
            ));
        }

        if self.smtp.is_none() {
            tracing::warn!("SMTP_SERVER is not set; recovery links will only be logged");
        }

        Ok(())
    }

    /// Find an area by its slug.
    pub fn area(&self, slug: &str) -> Option<&Area> {
        self.areas.iter().find(|a| a.slug == slug)
    }
}

impl Area {
    /// Whether a user-table area value names this area (by name or slug).
    pub fn matches(&self, value: &str) -> bool {
        let value = value.trim();
        self.slug == value || self.name.to_lowercase() == value.to_lowercase()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Parse `Name=slug;Name=slug`.
pub fn parse_areas(raw: &str) -> Result<Vec<Area>, ConfigError> {
    let mut areas = Vec::new();
    let mut seen = HashSet::new();

    for entry in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, slug) = entry.split_once('=').ok_or_else(|| {
            ConfigError::ValidationError(format!("area '{entry}' must be written as Name=slug"))
        })?;
        let (name, slug) = (name.trim(), slug.trim());

        let valid_slug = !slug.is_empty()
            && slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if name.is_empty() || !valid_slug {
            return Err(ConfigError::ValidationError(format!(
                "area '{entry}' needs a name and a slug of [a-z0-9_-]"
            )));
        }
        if !seen.insert(slug.to_string()) {
            return Err(ConfigError::ValidationError(format!(
                "area slug '{slug}' is defined twice"
            )));
        }

        areas.push(Area {
            name: name.to_string(),
            slug: slug.to_string(),
        });
    }

    Ok(areas)
}

pub(crate) fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
