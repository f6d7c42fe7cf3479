use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

/// Room for multipart boundaries, part headers and the `uploadKey` field on
/// top of the file bytes themselves.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = (state.config.max_upload_size as usize).saturating_add(MULTIPART_OVERHEAD);

    let api = Router::new()
        // Files
        .route("/files", get(handlers::list_files))
        .route(
            "/files/:id",
            get(handlers::view_file)
                .patch(handlers::update_file)
                .delete(handlers::delete_file),
        )
        .route("/files/:id/thumbnail", get(handlers::get_thumbnail))
        .route("/files/:id/metadata", get(handlers::get_metadata))
        .route("/download/:id", get(handlers::download_file))
        .route(
            "/upload",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // Aggregates
        .route("/stats", get(handlers::get_stats))
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
