use std::path::Path as FsPath;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tokio_util::io::ReaderStream;

use crate::api::response::{ApiError, AppJson, SuccessBody};
use crate::storage::models::{FileCategory, FileMetadata, FilePatch, FileRecord, Patch, StoreStats};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFileRequest {
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub metadata: Option<Option<FileMetadata>>,
}

/// Distinguishes between a missing field (`None`) and an explicit `null` (`Some(None)`).
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: DeserializeOwned,
    D: Deserializer<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn list_files(State(state): State<Arc<AppState>>) -> Json<Vec<FileRecord>> {
    Json(state.store.list())
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StoreStats> {
    Json(state.store.stats())
}

pub async fn get_metadata(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<FileRecord>, ApiError> {
    let file = find_file(&state, &id)?;
    Ok(Json(file))
}

/// Stream the blob inline and count a view.
pub async fn view_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let file = find_file(&state, &id)?;
    let (blob, len) = open_for_read(&state.store.blob_path(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("File not found on disk"))?;

    state.store.increment_views(&id);

    let mut headers = content_headers(&file.mime_type, len);
    headers.insert(
        header::CONTENT_DISPOSITION,
        disposition("inline", &file.original_name),
    );

    Ok(stream_response(headers, blob))
}

/// Stream the blob as an attachment and count a download.
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let file = find_file(&state, &id)?;
    let (blob, len) = open_for_read(&state.store.blob_path(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("File not found on disk"))?;

    state.store.increment_downloads(&id);

    let mut headers = content_headers(&file.mime_type, len);
    headers.insert(
        header::CONTENT_DISPOSITION,
        disposition("attachment", &file.original_name),
    );
    // Blobs never change once uploaded
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000"),
    );
    if let Ok(value) = HeaderValue::from_str(
        &file
            .uploaded_at
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string(),
    ) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    headers.insert(
        HeaderName::from_static("x-file-name"),
        header_safe(&file.original_name),
    );
    headers.insert(HeaderName::from_static("x-file-size"), HeaderValue::from(file.size));
    headers.insert(
        HeaderName::from_static("x-file-type"),
        header_safe(&file.mime_type),
    );

    Ok(stream_response(headers, blob))
}

/// Stream the thumbnail, generating it first if it is missing.
pub async fn get_thumbnail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let file = find_file(&state, &id)?;
    let thumb_path = state.store.thumbnail_path(&id);

    let opened = match open_for_read(&thumb_path).await? {
        Some(opened) => opened,
        None => {
            let category = FileCategory::from_name(&file.original_name);
            if !category.supports_preview() {
                return Err(ApiError::not_found("Thumbnail not available"));
            }

            let generated = state
                .store
                .generate_thumbnail(&id, category, state.thumbnailer.as_ref())
                .await;
            if !generated {
                return Err(ApiError::not_found("Thumbnail not available"));
            }

            open_for_read(&thumb_path)
                .await?
                .ok_or_else(|| ApiError::not_found("Thumbnail not available"))?
        }
    };

    let (thumb, len) = opened;
    Ok(stream_response(content_headers(&file.mime_type, len), thumb))
}

pub async fn update_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateFileRequest>,
) -> Result<Json<FileRecord>, ApiError> {
    if let Some(ref name) = req.original_name {
        if name.trim().is_empty() {
            return Err(ApiError::bad_request("originalName must not be empty"));
        }
    }
    if let Some(ref mime_type) = req.mime_type {
        if mime_type.trim().is_empty() {
            return Err(ApiError::bad_request("mimeType must not be empty"));
        }
    }

    let patch = FilePatch {
        original_name: req.original_name,
        mime_type: req.mime_type,
        metadata: Patch::from(req.metadata),
    };
    if patch.is_empty() {
        return Err(ApiError::bad_request(
            "at least one field (originalName, mimeType, metadata) must be provided",
        ));
    }

    let file = state
        .store
        .update(&id, patch)
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    tracing::debug!(file_id = %id, "Updated file");
    Ok(Json(file))
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SuccessBody>, ApiError> {
    if !state.store.delete(&id).await {
        return Err(ApiError::not_found("File not found"));
    }

    Ok(SuccessBody::ok())
}

// ============================================================================
// Helpers
// ============================================================================

fn find_file(state: &AppState, id: &str) -> Result<FileRecord, ApiError> {
    state
        .store
        .get(id)
        .ok_or_else(|| ApiError::not_found("File not found"))
}

/// Open a file for streaming. `None` when nothing is there.
async fn open_for_read(path: &FsPath) -> Result<Option<(tokio::fs::File, u64)>, ApiError> {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to open file");
            return Err(ApiError::internal("Failed to retrieve file"));
        }
    };

    let meta = file.metadata().await.map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Failed to stat file");
        ApiError::internal("Failed to retrieve file")
    })?;
    if !meta.is_file() {
        return Ok(None);
    }

    Ok(Some((file, meta.len())))
}

fn content_headers(mime_type: &str, len: u64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        mime_type
            .parse()
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers
}

fn stream_response(headers: HeaderMap, file: tokio::fs::File) -> Response {
    let body = Body::from_stream(ReaderStream::new(file));
    (StatusCode::OK, headers, body).into_response()
}

fn disposition(kind: &str, file_name: &str) -> HeaderValue {
    let value = format!("{kind}; filename=\"{}\"", sanitize_header_text(file_name));
    HeaderValue::from_str(&value).unwrap_or(HeaderValue::from_static("attachment"))
}

fn header_safe(text: &str) -> HeaderValue {
    HeaderValue::from_str(&sanitize_header_text(text))
        .unwrap_or(HeaderValue::from_static("unknown"))
}

/// Replace anything that cannot appear inside a quoted header value.
fn sanitize_header_text(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_header_text() {
        assert_eq!(sanitize_header_text("a.txt"), "a.txt");
        assert_eq!(sanitize_header_text("my \"file\".txt"), "my _file_.txt");
        assert_eq!(sanitize_header_text("naïve\\.png"), "na_ve_.png");
        assert_eq!(sanitize_header_text("line\nbreak"), "line_break");
    }

    #[test]
    fn test_disposition_header() {
        assert_eq!(
            disposition("inline", "photo.jpg"),
            HeaderValue::from_static("inline; filename=\"photo.jpg\"")
        );
    }
}
