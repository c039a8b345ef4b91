use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sidecar metadata stored next to each blob as `<key>.meta.json`.
///
/// Field names on the wire are the ones already present in existing
/// containers, so old sidecars keep loading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    #[serde(rename = "usuario", default, skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    /// Local upload time, `%Y-%m-%d %H:%M:%S`.
    #[serde(rename = "fecha", default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<String>,
    #[serde(rename = "comentario", default)]
    pub comment: String,
    #[serde(
        rename = "nombre_original",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub original_name: Option<String>,
}

impl FileMeta {
    /// The original upload name, else `stored_name`.
    pub fn display_name<'a>(&'a self, stored_name: &'a str) -> &'a str {
        self.original_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(stored_name)
    }
}

/// A catalog entry: one stored blob paired with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    /// Full object key, `<area>/<storage name>`.
    pub key: String,
    /// Storage name (timestamp-prefixed), unique within the area.
    pub name: String,
    pub meta: FileMeta,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

impl FileEntry {
    /// Name shown to users: the original upload name, else the storage name.
    pub fn display_name(&self) -> &str {
        self.meta.display_name(&self.name)
    }

    /// Case-insensitive substring match on display name and comment.
    /// `query` must already be lower-cased; an empty query matches.
    pub fn matches(&self, query: &str) -> bool {
        query.is_empty()
            || self.display_name().to_lowercase().contains(query)
            || self.meta.comment.to_lowercase().contains(query)
    }

    pub fn kind(&self) -> FileKind {
        FileKind::from_name(&self.name)
    }

    /// Stable HTML anchor derived from the display name.
    pub fn anchor(&self) -> String {
        anchor_id(self.display_name())
    }
}

/// Classification of a file derived from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Document,
    Image,
    Other,
    Pdf,
    Presentation,
    Spreadsheet,
    Video,
}

impl FileKind {
    pub fn from_name(name: &str) -> Self {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => FileKind::Pdf,
            "doc" | "docx" => FileKind::Document,
            "ppt" | "pptx" => FileKind::Presentation,
            "xlsx" | "xls" | "csv" => FileKind::Spreadsheet,
            "mp4" | "mov" => FileKind::Video,
            "jpg" | "jpeg" | "png" | "gif" => FileKind::Image,
            _ => FileKind::Other,
        }
    }
}

/// `id_` followed by the lower-cased stem with spaces as underscores and
/// anything else that is not a word character removed.
pub fn anchor_id(display_name: &str) -> String {
    let stem = match display_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => display_name,
    };
    let slug: String = stem
        .to_lowercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    format!("id_{slug}")
}

/// Listing order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    NameAsc,
    NameDesc,
}

impl SortOrder {
    /// Sort in place. The sort is stable, so ties keep their incoming order.
    pub fn apply(self, entries: &mut [FileEntry]) {
        match self {
            SortOrder::Newest => entries.sort_by(|a, b| b.last_modified.cmp(&a.last_modified)),
            SortOrder::Oldest => entries.sort_by(|a, b| a.last_modified.cmp(&b.last_modified)),
            SortOrder::NameAsc => entries.sort_by_cached_key(|e| e.display_name().to_lowercase()),
            SortOrder::NameDesc => entries.sort_by(|a, b| {
                b.display_name()
                    .to_lowercase()
                    .cmp(&a.display_name().to_lowercase())
            }),
        }
    }
}

/// A titled URL in an area's shared link list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedLink {
    pub title: String,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(name: &str, display: Option<&str>, comment: &str, minute: u32) -> FileEntry {
        FileEntry {
            key: format!("area/{name}"),
            name: name.to_string(),
            meta: FileMeta {
                uploader: Some("ana".to_string()),
                uploaded_at: None,
                comment: comment.to_string(),
                original_name: display.map(str::to_string),
            },
            size: 1,
            last_modified: Utc.with_ymd_and_hms(2025, 1, 1, 12, minute, 0).unwrap(),
        }
    }

    fn names(entries: &[FileEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.display_name()).collect()
    }

    #[test]
    fn display_name_falls_back_to_storage_name() {
        let e = entry("20250101-120000_a.pdf", None, "", 0);
        assert_eq!(e.display_name(), "20250101-120000_a.pdf");
        let e = entry("20250101-120000_a.pdf", Some(""), "", 0);
        assert_eq!(e.display_name(), "20250101-120000_a.pdf");
    }

    #[test]
    fn search_is_case_insensitive_on_name_and_comment() {
        let e = entry("x_Informe.pdf", Some("Informe Médico.pdf"), "Revisión de Enero", 0);
        assert!(e.matches("informe"));
        assert!(e.matches("médico"));
        assert!(e.matches("enero"));
        assert!(e.matches(""));
        assert!(!e.matches("febrero"));
    }

    #[test]
    fn sort_by_time() {
        let mut entries = vec![
            entry("b", Some("b"), "", 5),
            entry("a", Some("a"), "", 1),
            entry("c", Some("c"), "", 9),
        ];
        SortOrder::Newest.apply(&mut entries);
        assert_eq!(names(&entries), vec!["c", "b", "a"]);
        SortOrder::Oldest.apply(&mut entries);
        assert_eq!(names(&entries), vec!["a", "b", "c"]);
    }

    #[test]
    fn sort_by_name_ignores_case() {
        let mut entries = vec![
            entry("1", Some("beta.pdf"), "", 0),
            entry("2", Some("Alpha.pdf"), "", 0),
            entry("3", Some("gamma.pdf"), "", 0),
        ];
        SortOrder::NameAsc.apply(&mut entries);
        assert_eq!(names(&entries), vec!["Alpha.pdf", "beta.pdf", "gamma.pdf"]);
        SortOrder::NameDesc.apply(&mut entries);
        assert_eq!(names(&entries), vec!["gamma.pdf", "beta.pdf", "Alpha.pdf"]);
    }

    #[test]
    fn sorts_are_stable_on_ties() {
        let mut entries = vec![
            entry("1", Some("same"), "", 3),
            entry("2", Some("SAME"), "", 3),
            entry("3", Some("Same"), "", 3),
        ];
        for order in [
            SortOrder::Newest,
            SortOrder::Oldest,
            SortOrder::NameAsc,
            SortOrder::NameDesc,
        ] {
            order.apply(&mut entries);
            let keys: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
            assert_eq!(keys, vec!["1", "2", "3"], "{order:?} reordered ties");
        }
    }

    #[test]
    fn kind_from_extension() {
        assert_eq!(FileKind::from_name("a.PDF"), FileKind::Pdf);
        assert_eq!(FileKind::from_name("a.docx"), FileKind::Document);
        assert_eq!(FileKind::from_name("a.pptx"), FileKind::Presentation);
        assert_eq!(FileKind::from_name("a.csv"), FileKind::Spreadsheet);
        assert_eq!(FileKind::from_name("a.mov"), FileKind::Video);
        assert_eq!(FileKind::from_name("a.jpeg"), FileKind::Image);
        assert_eq!(FileKind::from_name("noext"), FileKind::Other);
    }

    #[test]
    fn anchor_ids() {
        assert_eq!(anchor_id("Plan Semanal (v2).pdf"), "id_plan_semanal_v2");
        assert_eq!(anchor_id("README"), "id_readme");
    }

    #[test]
    fn sidecar_uses_stored_field_names() {
        let json = r#"{"usuario":"Ana","fecha":"2025-01-01 10:00:00","comentario":"hola","nombre_original":"a.pdf"}"#;
        let meta: FileMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.uploader.as_deref(), Some("Ana"));
        assert_eq!(meta.comment, "hola");
        assert_eq!(meta.original_name.as_deref(), Some("a.pdf"));

        let partial: FileMeta = serde_json::from_str(r#"{"comentario":"solo"}"#).unwrap();
        assert_eq!(partial.uploader, None);
        assert_eq!(partial.comment, "solo");
    }
}
