mod db;
mod error;
pub mod models;
pub mod persistence;
mod store;
mod tables;

pub use db::RedbPersistence;
pub use error::StoreError;
pub use persistence::{open_backend, IndexPersistence, JsonSnapshot, MemoryPersistence};
pub use store::{FileStore, INCOMING_DIR, THUMBNAIL_DIR};
