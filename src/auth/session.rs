use axum_extra::extract::cookie::{Cookie, Key, SameSite};
use ring::hmac;
use serde::{Deserialize, Serialize};

use super::users::UserRecord;
use crate::config::{Area, AuthConfig, Config};

pub const SESSION_COOKIE: &str = "portal_session";

/// Area values in the user table granting access to every area.
const ALL_AREAS: [&str; 2] = ["todas", "all"];

/// Capabilities granted by permission tags in the user table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Upload,
    Edit,
    Delete,
}

impl Permission {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "upload" | "subir" => Some(Permission::Upload),
            "edit" | "editar" => Some(Permission::Edit),
            "delete" | "eliminar" | "borrar" => Some(Permission::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Upload => "upload",
            Permission::Edit => "edit",
            Permission::Delete => "delete",
        }
    }
}

/// Signed-in user state, carried in an encrypted cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub email: String,
    pub name: String,
    pub area: String,
    pub permissions: Vec<String>,
    pub role: String,
}

impl From<&UserRecord> for Session {
    fn from(user: &UserRecord) -> Self {
        Self {
            email: user.email.clone(),
            name: user.name.clone(),
            area: user.area.clone(),
            permissions: user.permissions.clone(),
            role: user.role.clone(),
        }
    }
}

impl Session {
    pub fn has(&self, permission: Permission) -> bool {
        self.permissions
            .iter()
            .any(|tag| Permission::from_tag(tag) == Some(permission))
    }

    pub fn has_all_areas(&self) -> bool {
        let area = self.area.trim().to_lowercase();
        ALL_AREAS.contains(&area.as_str())
    }

    pub fn can_access(&self, area: &Area) -> bool {
        self.has_all_areas() || area.matches(&self.area)
    }

    /// Areas this session may browse, in configuration order.
    pub fn visible_areas<'a>(&self, config: &'a Config) -> Vec<&'a Area> {
        config.areas.iter().filter(|a| self.can_access(a)).collect()
    }
}

/// Derive the 64-byte cookie encryption key from the server secret.
pub fn cookie_key(secret: &str) -> Key {
    let master = hmac::Key::new(hmac::HMAC_SHA512, secret.as_bytes());
    let derived = hmac::sign(&master, b"session-cookie");
    Key::from(derived.as_ref())
}

/// Session cookie. Without `remember` it lasts for the browser session.
pub fn session_cookie(
    session: &Session,
    remember: bool,
    auth: &AuthConfig,
) -> Result<Cookie<'static>, serde_json::Error> {
    let value = serde_json::to_string(session)?;
    let mut cookie = Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(auth.cookie_secure)
        .same_site(SameSite::Lax);

    if remember {
        cookie = cookie.max_age(time::Duration::days(auth.session_days));
    }

    Ok(cookie.build())
}

/// Cookie that clears the session when removed from a jar.
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}
