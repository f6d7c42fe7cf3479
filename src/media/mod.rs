//! Pluggable media collaborators: metadata extraction and thumbnailing.
//!
//! Both are best-effort. Implementations swallow their own failures and
//! degrade to an empty bag or a missing thumbnail, so an upload never fails
//! because of them.

mod extract;
mod thumbnail;

pub use extract::PlaceholderExtractor;
pub use thumbnail::CopyThumbnailer;

use std::path::Path;

use async_trait::async_trait;

use crate::storage::models::{FileCategory, FileMetadata};

#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Inspect the file at `path`. Categories other than image and video
    /// always yield an empty bag.
    async fn extract(&self, path: &Path, category: FileCategory) -> FileMetadata;
}

#[async_trait]
pub trait ThumbnailGenerator: Send + Sync {
    /// Write a preview of `source` to `dest`, replacing anything already there.
    /// Returns `false` without side effects for categories that have no preview.
    async fn generate(&self, source: &Path, dest: &Path, category: FileCategory) -> bool;
}
