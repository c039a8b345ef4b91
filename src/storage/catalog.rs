use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::cache::TtlCache;
use super::models::FileEntry;
use crate::object_store::{ObjectStore, ObjectStoreError};

/// Suffix of sidecar metadata objects.
pub const META_SUFFIX: &str = ".meta.json";

/// Name of the per-area shared link list.
pub const LINKS_OBJECT: &str = "enlaces.txt";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Storage error: {0}")]
    Store(#[from] ObjectStoreError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("A file named '{display_name}' already exists")]
    AlreadyExists {
        display_name: String,
        existing: String,
    },
    #[error("Invalid file name: {0}")]
    InvalidName(String),
    #[error("File type not allowed: {0}")]
    UnsupportedType(String),
    #[error("Invalid link: {0}")]
    InvalidLink(String),
    #[error("No link at position {0}")]
    LinkNotFound(usize),
}

/// Area-scoped file and link catalog over an object store.
///
/// Every object of an area lives under `<slug>/`: file blobs, their
/// `.meta.json` sidecars and the `enlaces.txt` link list.
pub struct Catalog {
    store: Arc<dyn ObjectStore>,
    listings: TtlCache<Arc<Vec<FileEntry>>>,
    allowed_extensions: Vec<String>,
}

impl Catalog {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        cache_ttl: Duration,
        allowed_extensions: Vec<String>,
    ) -> Self {
        Self {
            store,
            listings: TtlCache::new(cache_ttl),
            allowed_extensions,
        }
    }

    pub(crate) fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub(crate) fn listings(&self) -> &TtlCache<Arc<Vec<FileEntry>>> {
        &self.listings
    }

    pub(crate) fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }
}

pub(crate) fn object_key(area: &str, name: &str) -> String {
    format!("{area}/{name}")
}

pub(crate) fn meta_key(key: &str) -> String {
    format!("{key}{META_SUFFIX}")
}

/// Whether a storage name is a catalog file rather than a sidecar or link list.
pub(crate) fn is_file_name(name: &str) -> bool {
    !name.ends_with(META_SUFFIX) && !name.ends_with(LINKS_OBJECT)
}
