//! file-drop - A minimal key-protected file hosting service
//!
//! This crate provides file upload, listing, viewing and download with:
//! - An authoritative file record store owning the on-disk layout
//! - Pluggable index persistence (in-memory, JSON snapshot, redb)
//! - Best-effort metadata extraction and thumbnailing behind traits
//! - REST API with streaming multipart upload guarded by a static key

pub mod api;
pub mod config;
pub mod id;
pub mod media;
pub mod storage;

use std::sync::Arc;

use config::Config;
use media::{CopyThumbnailer, MetadataExtractor, PlaceholderExtractor, ThumbnailGenerator};
use storage::FileStore;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub store: FileStore,
    pub extractor: Arc<dyn MetadataExtractor>,
    pub thumbnailer: Arc<dyn ThumbnailGenerator>,
}

impl AppState {
    /// State with the placeholder extractor and the copying thumbnailer.
    pub fn new(config: Config, store: FileStore) -> Self {
        Self {
            config,
            store,
            extractor: Arc::new(PlaceholderExtractor),
            thumbnailer: Arc::new(CopyThumbnailer),
        }
    }
}
