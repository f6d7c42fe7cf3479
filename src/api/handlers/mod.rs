mod files;
mod health;
mod upload;

pub use files::{
    delete_file, download_file, get_metadata, get_stats, get_thumbnail, list_files, update_file,
    view_file,
};
pub use health::health;
pub use upload::upload_file;
