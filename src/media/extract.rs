use std::path::Path;

use async_trait::async_trait;

use super::MetadataExtractor;
use crate::storage::models::{FileCategory, FileMetadata};

/// Reports fixed placeholder attributes for images and videos.
///
/// Only the format is real (taken from the file extension). A decoder-backed
/// extractor can replace this without touching the store.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderExtractor;

#[async_trait]
impl MetadataExtractor for PlaceholderExtractor {
    async fn extract(&self, path: &Path, category: FileCategory) -> FileMetadata {
        if !category.supports_preview() {
            return FileMetadata::default();
        }

        if let Err(e) = tokio::fs::metadata(path).await {
            tracing::warn!(path = %path.display(), error = %e, "Cannot read file for metadata extraction");
            return FileMetadata::default();
        }

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match category {
            FileCategory::Image => FileMetadata {
                width: Some(1920),
                height: Some(1080),
                format,
                ..Default::default()
            },
            FileCategory::Video => FileMetadata {
                width: Some(1280),
                height: Some(720),
                duration: Some(125.5),
                format,
                bitrate: Some(2_500_000),
                codec: Some("h264".to_string()),
                ..Default::default()
            },
            _ => FileMetadata::default(),
        }
    }
}
