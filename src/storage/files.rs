use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Local, Utc};

use super::catalog::{is_file_name, meta_key, object_key, Catalog, CatalogError, META_SUFFIX};
use super::models::{FileEntry, FileMeta, SortOrder};
use crate::object_store::ObjectStoreError;

/// A file being added to an area.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Name as sent by the client; only its last path segment is kept.
    pub original_name: String,
    pub data: Bytes,
    pub comment: String,
    pub uploader: String,
    /// Replace an existing entry with the same display name in place.
    pub overwrite: bool,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub entry: FileEntry,
    pub overwritten: bool,
}

impl Catalog {
    // ========================================================================
    // Listing
    // ========================================================================

    /// All file entries of an area, served from the listing cache when fresh.
    pub async fn list_files(&self, area: &str) -> Result<Arc<Vec<FileEntry>>, CatalogError> {
        if let Some(cached) = self.listings().get(area).await {
            return Ok(cached);
        }

        let entries = Arc::new(self.load_listing(area).await?);
        self.listings().insert(area, Arc::clone(&entries)).await;
        Ok(entries)
    }

    /// Filter by `query` (case-insensitive, name or comment) and sort.
    pub async fn search(
        &self,
        area: &str,
        query: &str,
        sort: SortOrder,
    ) -> Result<Vec<FileEntry>, CatalogError> {
        let query = query.trim().to_lowercase();
        let mut entries: Vec<FileEntry> = self
            .list_files(area)
            .await?
            .iter()
            .filter(|e| e.matches(&query))
            .cloned()
            .collect();

        sort.apply(&mut entries);
        Ok(entries)
    }

    /// Read the area's objects and pair each file with its sidecar, bypassing the cache.
    async fn load_listing(&self, area: &str) -> Result<Vec<FileEntry>, CatalogError> {
        let prefix = format!("{area}/");
        let objects = self.store().list(&prefix).await?;

        let mut entries = Vec::new();
        for object in objects {
            let name = object
                .key
                .strip_prefix(&prefix)
                .unwrap_or(&object.key)
                .to_string();
            if !is_file_name(&name) {
                continue;
            }

            let meta = self.load_meta(&object.key).await;
            entries.push(FileEntry {
                key: object.key,
                name,
                meta,
                size: object.size,
                last_modified: object.last_modified,
            });
        }

        Ok(entries)
    }

    /// Sidecar for `key`, or defaults when it is missing or unreadable.
    async fn load_meta(&self, key: &str) -> FileMeta {
        let data = match self.store().get(&meta_key(key)).await {
            Ok(data) => data,
            Err(ObjectStoreError::NotFound(_)) => {
                tracing::debug!(key = %key, "No metadata sidecar, using defaults");
                return FileMeta::default();
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to read metadata sidecar");
                return FileMeta::default();
            }
        };

        serde_json::from_slice(&data).unwrap_or_else(|e| {
            tracing::debug!(key = %key, error = %e, "Unreadable metadata sidecar, using defaults");
            FileMeta::default()
        })
    }

    async fn write_meta(&self, key: &str, meta: &FileMeta) -> Result<(), CatalogError> {
        let data = serde_json::to_vec(meta)?;
        self.store().put(&meta_key(key), Bytes::from(data)).await?;
        Ok(())
    }

    /// Look up a single entry by storage name.
    pub async fn get_file(&self, area: &str, name: &str) -> Result<FileEntry, CatalogError> {
        validate_stored_name(name)?;
        self.load_listing(area)
            .await?
            .into_iter()
            .find(|e| e.name == name)
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))
    }

    /// Entry whose display name equals `display_name` exactly, read uncached.
    pub async fn find_by_display_name(
        &self,
        area: &str,
        display_name: &str,
    ) -> Result<Option<FileEntry>, CatalogError> {
        Ok(self
            .load_listing(area)
            .await?
            .into_iter()
            .find(|e| e.display_name() == display_name))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Store a new file, or replace a same-named one when `overwrite` is set.
    ///
    /// The blob is written before its sidecar; a failure in between leaves
    /// a blob with default metadata.
    pub async fn upload(
        &self,
        area: &str,
        request: UploadRequest,
    ) -> Result<UploadOutcome, CatalogError> {
        let original_name = sanitize_file_name(&request.original_name)?;
        self.check_extension(&original_name)?;

        let existing = self.find_by_display_name(area, &original_name).await?;
        let (name, overwritten) = match existing {
            Some(entry) if request.overwrite => (entry.name, true),
            Some(entry) => {
                return Err(CatalogError::AlreadyExists {
                    display_name: original_name,
                    existing: entry.name,
                })
            }
            None => (storage_name(&original_name, Local::now()), false),
        };

        let key = object_key(area, &name);
        let size = request.data.len() as u64;
        let meta = FileMeta {
            uploader: Some(request.uploader),
            uploaded_at: Some(Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
            comment: request.comment.trim().to_string(),
            original_name: Some(original_name),
        };

        self.store().put(&key, request.data).await?;
        self.write_meta(&key, &meta).await?;
        self.listings().invalidate(area).await;

        tracing::info!(area = %area, key = %key, overwritten, "Stored file");

        Ok(UploadOutcome {
            entry: FileEntry {
                key,
                name,
                meta,
                size,
                last_modified: Utc::now(),
            },
            overwritten,
        })
    }

    /// Replace the comment of an entry. A missing sidecar is recreated.
    pub async fn update_comment(
        &self,
        area: &str,
        name: &str,
        comment: &str,
    ) -> Result<FileEntry, CatalogError> {
        let mut entry = self.get_file(area, name).await?;
        entry.meta.comment = comment.to_string();

        self.write_meta(&entry.key, &entry.meta).await?;
        self.listings().invalidate(area).await;

        tracing::debug!(area = %area, key = %entry.key, "Updated comment");
        Ok(entry)
    }

    /// Fetch the content of an entry.
    pub async fn read_file(&self, area: &str, name: &str) -> Result<Bytes, CatalogError> {
        validate_stored_name(name)?;
        self.store()
            .get(&object_key(area, name))
            .await
            .map_err(|e| match e {
                ObjectStoreError::NotFound(_) => CatalogError::NotFound(name.to_string()),
                other => CatalogError::Store(other),
            })
    }

    /// Content and sidecar of one entry, without listing the area.
    pub async fn open_file(&self, area: &str, name: &str) -> Result<(FileMeta, Bytes), CatalogError> {
        let data = self.read_file(area, name).await?;
        let meta = self.load_meta(&object_key(area, name)).await;
        Ok((meta, data))
    }

    /// Remove an entry's blob and its sidecar together.
    pub async fn delete_file(&self, area: &str, name: &str) -> Result<(), CatalogError> {
        validate_stored_name(name)?;
        let key = object_key(area, name);

        if !self.store().exists(&key).await? {
            return Err(CatalogError::NotFound(name.to_string()));
        }

        self.store().delete(&key).await?;
        self.store().delete(&meta_key(&key)).await?;
        self.listings().invalidate(area).await;

        tracing::info!(area = %area, key = %key, "Deleted file");
        Ok(())
    }

    fn check_extension(&self, name: &str) -> Result<(), CatalogError> {
        let allowed = self.allowed_extensions();
        if allowed.is_empty() {
            return Ok(());
        }

        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        if allowed.iter().any(|a| *a == ext) {
            Ok(())
        } else {
            Err(CatalogError::UnsupportedType(name.to_string()))
        }
    }
}

// ============================================================================
// Naming
// ============================================================================

/// Keep the last path segment of a client-supplied name and reject names
/// that cannot be stored as a catalog file.
pub fn sanitize_file_name(raw: &str) -> Result<String, CatalogError> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or("").trim();

    if name.is_empty() || name == "." || name == ".." {
        return Err(CatalogError::InvalidName(raw.to_string()));
    }
    if name.chars().any(char::is_control) || !is_file_name(name) {
        return Err(CatalogError::InvalidName(raw.to_string()));
    }

    Ok(name.to_string())
}

/// `<%Y%m%d-%H%M%S>_<original name>`
pub fn storage_name(original_name: &str, at: DateTime<Local>) -> String {
    format!("{}_{original_name}", at.format("%Y%m%d-%H%M%S"))
}

/// Storage names arrive from URLs; anything that is not a plain catalog file
/// name is reported as missing.
fn validate_stored_name(name: &str) -> Result<(), CatalogError> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.ends_with(META_SUFFIX)
        && is_file_name(name);

    if plain {
        Ok(())
    } else {
        Err(CatalogError::NotFound(name.to_string()))
    }
}
