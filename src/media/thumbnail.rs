use std::path::Path;

use async_trait::async_trait;

use super::ThumbnailGenerator;
use crate::storage::models::FileCategory;

/// Uses a byte-for-byte copy of the source as its thumbnail.
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyThumbnailer;

#[async_trait]
impl ThumbnailGenerator for CopyThumbnailer {
    async fn generate(&self, source: &Path, dest: &Path, category: FileCategory) -> bool {
        if !category.supports_preview() {
            return false;
        }

        // `copy` truncates an existing destination.
        match tokio::fs::copy(source, dest).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    source = %source.display(),
                    dest = %dest.display(),
                    error = %e,
                    "Failed to generate thumbnail"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_overwrites_existing_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        let dest = dir.path().join("dest_thumb");
        std::fs::write(&source, b"new").unwrap();
        std::fs::write(&dest, b"a much longer stale thumbnail").unwrap();

        assert!(CopyThumbnailer.generate(&source, &dest, FileCategory::Image).await);
        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_non_media_has_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("report.pdf");
        let dest = dir.path().join("report_thumb");
        std::fs::write(&source, b"%PDF").unwrap();

        assert!(!CopyThumbnailer.generate(&source, &dest, FileCategory::Document).await);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_missing_source_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let ok = CopyThumbnailer
            .generate(&dir.path().join("gone"), &dir.path().join("t"), FileCategory::Video)
            .await;
        assert!(!ok);
    }
}
