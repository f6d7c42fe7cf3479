use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::api::response::ApiError;
use crate::storage::models::{FileCategory, NewFile};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub file_id: String,
    pub file_name: String,
    pub original_name: String,
    pub file_size: u64,
    pub url: String,
    pub download_url: String,
}

/// A file part being received into the store's incoming directory.
///
/// The temp file is removed on drop unless the upload was handed to the store,
/// so a rejected, failed or cancelled request never leaves bytes behind.
struct IncomingUpload {
    path: PathBuf,
    original_name: String,
    content_type: Option<String>,
    size: u64,
    armed: bool,
}

impl IncomingUpload {
    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for IncomingUpload {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Discarded incoming upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to discard incoming upload")
            }
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut upload: Option<IncomingUpload> = None;
    let mut upload_key: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(ApiError::multipart)? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                if upload_key.is_some() && !key_matches(&state, upload_key.as_deref()) {
                    return Err(ApiError::unauthorized("Invalid upload key"));
                }
                if upload.is_some() {
                    return Err(ApiError::bad_request("Only one file may be uploaded per request"));
                }
                match receive_file(&state, field).await {
                    Ok(received) => upload = Some(received),
                    Err(e) => {
                        // The key decides the status before any file error
                        if upload_key.is_none() {
                            upload_key = read_upload_key(&mut multipart).await;
                        }
                        if !key_matches(&state, upload_key.as_deref()) {
                            return Err(ApiError::unauthorized("Invalid upload key"));
                        }
                        return Err(e);
                    }
                }
            }
            "uploadKey" => {
                upload_key = Some(
                    field
                        .text()
                        .await
                        .map_err(ApiError::multipart)?,
                );
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    if !key_matches(&state, upload_key.as_deref()) {
        // Dropping the guard deletes whatever was received
        drop(upload);
        return Err(ApiError::unauthorized("Invalid upload key"));
    }

    let mut upload = upload.ok_or_else(|| ApiError::bad_request("No file uploaded"))?;
    if upload.size == 0 {
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }

    let category = FileCategory::from_name(&upload.original_name);
    let mime_type = resolve_mime_type(upload.content_type.as_deref(), &upload.original_name);
    let metadata = state.extractor.extract(upload.path(), category).await;

    let new_file = NewFile {
        original_name: upload.original_name.clone(),
        mime_type,
        size: upload.size,
        metadata,
    };
    let file = state
        .store
        .create_from_upload(upload.path(), new_file)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, name = %upload.original_name, "Failed to store upload");
            ApiError::internal("Failed to upload file")
        })?;
    upload.disarm();

    if category.supports_preview()
        && !state
            .store
            .generate_thumbnail(&file.id, category, state.thumbnailer.as_ref())
            .await
    {
        tracing::debug!(file_id = %file.id, "No thumbnail generated at upload");
    }

    tracing::info!(file_id = %file.id, size = file.size, "Stored upload");

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            success: true,
            url: format!("/api/files/{}", file.id),
            download_url: format!("/api/download/{}", file.id),
            file_id: file.id,
            file_name: file.stored_name,
            original_name: file.original_name,
            file_size: file.size,
        }),
    ))
}

// ============================================================================
// Helpers
// ============================================================================

/// Stream one file part into the incoming directory, enforcing the size cap.
async fn receive_file(state: &AppState, mut field: Field<'_>) -> Result<IncomingUpload, ApiError> {
    let original_name = field
        .file_name()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "upload".to_string());
    let content_type = field.content_type().map(|s| s.to_string());

    state.store.ensure_storage_layout().map_err(|e| {
        tracing::error!(error = %e, "Failed to prepare storage directories");
        ApiError::internal("Failed to upload file")
    })?;

    let mut upload = IncomingUpload {
        path: state.store.incoming_path(&original_name),
        original_name,
        content_type,
        size: 0,
        armed: true,
    };

    let mut out = tokio::fs::File::create(upload.path()).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to create temp upload file");
        ApiError::internal("Failed to upload file")
    })?;

    let max_upload_size = state.config.max_upload_size;
    while let Some(chunk) = field.chunk().await.map_err(ApiError::multipart)? {
        upload.size += chunk.len() as u64;
        if upload.size > max_upload_size {
            return Err(ApiError::payload_too_large(format!(
                "File exceeds maximum upload size of {max_upload_size} bytes"
            )));
        }
        out.write_all(&chunk).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to write temp upload file");
            ApiError::internal("Failed to upload file")
        })?;
    }

    out.flush().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to flush temp upload file");
        ApiError::internal("Failed to upload file")
    })?;

    Ok(upload)
}

fn key_matches(state: &AppState, key: Option<&str>) -> bool {
    key == Some(state.config.upload_key.as_str())
}

/// Skip the rest of the form looking for `uploadKey`. Any read error counts
/// as no key.
async fn read_upload_key(multipart: &mut Multipart) -> Option<String> {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("uploadKey") {
            return field.text().await.ok();
        }
    }
    None
}

/// Keep the declared content type; guess from the name when it is missing or generic.
fn resolve_mime_type(declared: Option<&str>, original_name: &str) -> String {
    declared
        .map(str::trim)
        .filter(|ct| !ct.is_empty() && *ct != "application/octet-stream")
        .map(str::to_string)
        .or_else(|| mime_guess::from_path(original_name).first().map(|m| m.to_string()))
        .unwrap_or_else(|| "application/octet-stream".to_string())
}
