use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Three-state patch value for partial updates that survives serialization round-trips.
/// Unlike `Option<Option<T>>`, each variant has a distinct wire representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Patch<T> {
    /// Field was not included in the request (no change).
    #[default]
    Absent,
    /// Field was explicitly set to null (clear it).
    Null,
    /// Field was set to a new value.
    Value(T),
}

impl<T> From<Option<Option<T>>> for Patch<T> {
    fn from(v: Option<Option<T>>) -> Self {
        match v {
            None => Patch::Absent,
            Some(None) => Patch::Null,
            Some(Some(v)) => Patch::Value(v),
        }
    }
}

impl<T> Patch<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }
}

/// Coarse classification of a file derived from its name's extension.
///
/// Decides whether metadata extraction and thumbnailing are attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Archive,
    Document,
    Image,
    Other,
    Video,
}

impl FileCategory {
    /// Classify a file by the lowercase extension of its (display) name.
    pub fn from_name(name: &str) -> Self {
        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "svg" => FileCategory::Image,
            "mp4" | "webm" | "ogg" | "mov" => FileCategory::Video,
            "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "txt" => {
                FileCategory::Document
            }
            "zip" | "rar" | "7z" | "tar" | "gz" => FileCategory::Archive,
            _ => FileCategory::Other,
        }
    }

    /// Whether extraction and thumbnailing apply to this category.
    pub fn supports_preview(self) -> bool {
        matches!(self, FileCategory::Image | FileCategory::Video)
    }
}

/// Best-effort attribute bag produced by a metadata extractor.
///
/// Every field is optional; unknown attributes a richer extractor reports are
/// kept in `extra` and serialized alongside the known ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Bits per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl FileMetadata {
    pub fn is_empty(&self) -> bool {
        self.width.is_none()
            && self.height.is_none()
            && self.duration.is_none()
            && self.format.is_none()
            && self.bitrate.is_none()
            && self.codec.is_none()
            && self.extra.is_empty()
    }
}

/// A stored file's record, keyed by `id` in the store's index.
///
/// Field names on the wire match the legacy `metadata.json` snapshot so
/// existing clients and snapshots keep working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub original_name: String,
    #[serde(rename = "fileName")]
    pub stored_name: String,
    pub mime_type: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: FileMetadata,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub downloads: u64,
}

/// Caller-supplied fields for a new record. The store assigns everything else.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    pub metadata: FileMetadata,
}

/// Partial update of a record's mutable fields.
///
/// Identity, size, upload time and counters are deliberately absent.
#[derive(Debug, Clone, Default)]
pub struct FilePatch {
    pub original_name: Option<String>,
    pub mime_type: Option<String>,
    pub metadata: Patch<FileMetadata>,
}

impl FilePatch {
    pub fn is_empty(&self) -> bool {
        self.original_name.is_none() && self.mime_type.is_none() && self.metadata.is_absent()
    }

    pub(crate) fn apply(self, record: &mut FileRecord) {
        if let Some(name) = self.original_name {
            record.original_name = name;
        }
        if let Some(mime_type) = self.mime_type {
            record.mime_type = mime_type;
        }
        match self.metadata {
            Patch::Absent => {}
            Patch::Null => record.metadata = FileMetadata::default(),
            Patch::Value(metadata) => record.metadata = metadata,
        }
    }
}

/// Aggregates over every live record, taken from one consistent view of the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_files: u64,
    pub total_downloads: u64,
    pub total_storage_used: u64,
}
