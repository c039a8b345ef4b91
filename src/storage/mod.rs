pub mod cache;
mod catalog;
mod files;
mod links;
pub mod models;

pub use catalog::{Catalog, CatalogError, LINKS_OBJECT, META_SUFFIX};
pub use files::{sanitize_file_name, storage_name, UploadOutcome, UploadRequest};
pub use links::{parse_links, render_links};
