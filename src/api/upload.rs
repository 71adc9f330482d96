//! Upload API endpoints
//!
//! Handles image uploads for products, categories and blog covers:
//! - POST /api/upload/image - Upload a single image (admin)
//!
//! Files land in the configured upload directory under a random name and are
//! served from `/uploads`.

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::path::Path;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

use crate::api::middleware::{ApiError, AppState};
use crate::config::UploadConfig;

/// Response for successful upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub url: String,
    pub filename: String,
    pub size: u64,
    pub content_type: String,
}

/// Build the upload router (admin only)
pub fn admin_router() -> Router<AppState> {
    Router::new().route("/image", post(upload_image))
}

/// POST /api/upload/image - Upload a single image
///
/// Accepts multipart/form-data with a single file field named "file".
async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let stored = store_image(&state.config.upload, &mut multipart).await?;
    Ok(Json(stored))
}

/// Save the first `file` (or `image`) field of a multipart body
pub async fn store_image(
    config: &UploadConfig,
    multipart: &mut Multipart,
) -> Result<UploadResponse, ApiError> {
    ensure_upload_dir(&config.path).await?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name != "file" && name != "image" {
            continue;
        }

        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        if !config.is_type_allowed(&content_type) {
            return Err(ApiError::validation_error(format!(
                "Invalid file type: {}. Allowed types: {}",
                content_type,
                config.allowed_types.join(", ")
            )));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;

        if data.is_empty() {
            return Err(ApiError::validation_error("File is empty"));
        }
        if data.len() as u64 > config.max_file_size {
            return Err(ApiError::validation_error(format!(
                "File too large. Maximum size: {} bytes ({} MB)",
                config.max_file_size,
                config.max_file_size / 1024 / 1024
            )));
        }

        let filename = format!("{}.{}", Uuid::new_v4(), config.get_extension(&content_type));
        fs::write(config.path.join(&filename), &data)
            .await
            .map_err(ApiError::internal)?;

        info!(%filename, size = data.len(), "image uploaded");
        return Ok(UploadResponse {
            url: format!("/uploads/{}", filename),
            filename,
            size: data.len() as u64,
            content_type,
        });
    }

    Err(ApiError::validation_error("No file provided"))
}

async fn ensure_upload_dir(path: &Path) -> Result<(), ApiError> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        fs::create_dir_all(path).await.map_err(ApiError::internal)?;
    }
    Ok(())
}
