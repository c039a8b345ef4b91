use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use calamine::{open_workbook_from_rs, Reader, Xlsx};
use rust_xlsxwriter::Workbook;
use serde::Serialize;
use thiserror::Error;

use super::password::{self, BcryptError};
use crate::object_store::{ObjectStore, ObjectStoreError};
use crate::storage::cache::TtlCache;

const TABLE_CACHE_KEY: &str = "users";

#[derive(Debug, Error)]
pub enum UserError {
    #[error("Storage error: {0}")]
    Store(#[from] ObjectStoreError),
    #[error("Unreadable user table: {0}")]
    Read(String),
    #[error("Failed to write user table: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),
    #[error("User table has no '{0}' column")]
    MissingColumn(&'static str),
    #[error("Password hashing failed: {0}")]
    Hash(#[from] BcryptError),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// One row of the user table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub email: String,
    pub name: String,
    pub area: String,
    pub permissions: Vec<String>,
    pub role: String,
    #[serde(skip)]
    pub password_hash: String,
}

/// Column positions, resolved from the header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    email: usize,
    name: usize,
    area: usize,
    permissions: usize,
    role: usize,
    password: usize,
}

impl Columns {
    fn resolve(headers: &[String]) -> Result<Self, UserError> {
        let find = |label: &'static str, aliases: &[&str]| {
            headers
                .iter()
                .position(|h| aliases.contains(&h.trim().to_lowercase().as_str()))
                .ok_or(UserError::MissingColumn(label))
        };

        Ok(Self {
            email: find("email", &["mail", "email", "correo"])?,
            name: find("name", &["usuario", "name", "nombre"])?,
            area: find("area", &["area", "área"])?,
            permissions: find("permissions", &["permisos", "permissions"])?,
            role: find("role", &["rol", "role"])?,
            password: find("password", &["contraseña", "password", "password_hash"])?,
        })
    }
}

/// The user spreadsheet: a header row followed by one row per user.
///
/// Cells are kept as text so columns this service does not know about are
/// written back untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct UserTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    columns: Columns,
}

impl UserTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, UserError> {
        let columns = Columns::resolve(&headers)?;
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width.max(row.len()), String::new());
                row
            })
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .collect();

        Ok(Self {
            headers,
            rows,
            columns,
        })
    }

    /// Parse the first worksheet of an `.xlsx` workbook.
    pub fn from_xlsx(data: &[u8]) -> Result<Self, UserError> {
        let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(data.to_vec()))
            .map_err(|e: calamine::XlsxError| UserError::Read(e.to_string()))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| UserError::Read("workbook has no worksheets".to_string()))?
            .map_err(|e| UserError::Read(e.to_string()))?;

        let mut rows = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<_>>());
        let headers = rows
            .next()
            .ok_or_else(|| UserError::Read("worksheet is empty".to_string()))?;

        Self::new(headers, rows.collect())
    }

    pub fn to_xlsx(&self) -> Result<Vec<u8>, UserError> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();

        for (col, header) in self.headers.iter().enumerate() {
            worksheet.write_string(0, col as u16, header)?;
        }
        for (r, row) in self.rows.iter().enumerate() {
            for (col, cell) in row.iter().enumerate() {
                if !cell.is_empty() {
                    worksheet.write_string(r as u32 + 1, col as u16, cell)?;
                }
            }
        }

        Ok(workbook.save_to_buffer()?)
    }

    fn row_index(&self, email: &str) -> Option<usize> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return None;
        }
        self.rows
            .iter()
            .position(|row| row[self.columns.email].trim().to_lowercase() == email)
    }

    fn record(&self, row: &[String]) -> UserRecord {
        let c = &self.columns;
        UserRecord {
            email: row[c.email].trim().to_string(),
            name: row[c.name].trim().to_string(),
            area: row[c.area].trim().to_string(),
            permissions: row[c.permissions]
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            role: row[c.role].trim().to_string(),
            password_hash: row[c.password].trim().to_string(),
        }
    }

    /// Look up a user by email (trimmed, case-insensitive).
    pub fn find(&self, email: &str) -> Option<UserRecord> {
        self.row_index(email).map(|i| self.record(&self.rows[i]))
    }

    pub fn records(&self) -> Vec<UserRecord> {
        self.rows.iter().map(|row| self.record(row)).collect()
    }

    /// Replace a user's password cell. Returns false when the email is unknown.
    pub fn set_password_hash(&mut self, email: &str, hash: &str) -> bool {
        match self.row_index(email) {
            Some(i) => {
                self.rows[i][self.columns.password] = hash.to_string();
                true
            }
            None => false,
        }
    }

    /// Hash every password cell that is not already a bcrypt hash.
    /// Returns how many rows changed.
    pub fn hash_plaintext_passwords(&mut self, cost: u32) -> Result<usize, UserError> {
        let column = self.columns.password;
        let mut changed = 0;
        for row in &mut self.rows {
            let cell = row[column].trim().to_string();
            if cell.is_empty() || password::is_hashed(&cell) {
                continue;
            }
            row[column] = password::hash_password(&cell, cost)?;
            changed += 1;
        }
        Ok(changed)
    }
}

/// Cached access to the user table stored in the object store.
pub struct UserDirectory {
    store: Arc<dyn ObjectStore>,
    key: String,
    bcrypt_cost: u32,
    cache: TtlCache<Arc<UserTable>>,
}

impl UserDirectory {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        key: impl Into<String>,
        bcrypt_cost: u32,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            bcrypt_cost,
            cache: TtlCache::new(cache_ttl),
        }
    }

    async fn table(&self) -> Result<Arc<UserTable>, UserError> {
        if let Some(table) = self.cache.get(TABLE_CACHE_KEY).await {
            return Ok(table);
        }
        let table = Arc::new(self.load().await?);
        self.cache.insert(TABLE_CACHE_KEY, Arc::clone(&table)).await;
        Ok(table)
    }

    async fn load(&self) -> Result<UserTable, UserError> {
        let data = self.store.get(&self.key).await?;
        UserTable::from_xlsx(&data)
    }

    pub async fn find(&self, email: &str) -> Result<Option<UserRecord>, UserError> {
        Ok(self.table().await?.find(email))
    }

    /// The user when `password` matches the stored hash. Unknown emails,
    /// wrong passwords and unusable hashes all yield `None`.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, UserError> {
        let Some(user) = self.find(email).await? else {
            return Ok(None);
        };

        let hash = user.password_hash.clone();
        let candidate = password.to_string();
        let verified =
            tokio::task::spawn_blocking(move || password::verify_password(&candidate, &hash))
                .await?;

        match verified {
            Ok(true) => Ok(Some(user)),
            Ok(false) => Ok(None),
            Err(e) => {
                tracing::warn!(email = %user.email, error = %e, "Stored password is not a usable bcrypt hash");
                Ok(None)
            }
        }
    }

    /// Hash `new_password` and write it to the user's row.
    ///
    /// Reads the table uncached, rewrites it whole and drops the cache.
    /// Returns false when the email is no longer in the table.
    pub async fn set_password(&self, email: &str, new_password: &str) -> Result<bool, UserError> {
        let cost = self.bcrypt_cost;
        let plain = new_password.to_string();
        let hash =
            tokio::task::spawn_blocking(move || password::hash_password(&plain, cost)).await??;

        let mut table = self.load().await?;
        if !table.set_password_hash(email, &hash) {
            return Ok(false);
        }

        self.store
            .put(&self.key, Bytes::from(table.to_xlsx()?))
            .await?;
        self.cache.invalidate(TABLE_CACHE_KEY).await;

        tracing::info!(email = %email, "Password updated");
        Ok(true)
    }
}
