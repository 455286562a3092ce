/**
 * Upload Routes
 * Admin file uploads handed to the configured asset storage
 */
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::auth::AdminUser;
use crate::config::UploadConfig;
use crate::error::{AppError, Result};
use crate::response::ApiResponse;
use crate::sanitize::sanitize_filename;
use crate::services::{AssetStorage, StoredAsset, UploadFile};
use crate::state::AppState;

/// Files accepted by one multi-file request
pub const MAX_FILES: usize = 10;
const DEFAULT_FOLDER: &str = "general";

static FOLDER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]{1,50}$").expect("static regex"));

static ASSET_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+(/[a-zA-Z0-9_-]+)*$").expect("static regex"));

/// MIME types whose content can be checked against its signature
const SNIFFABLE: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp", "application/pdf"];

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }
    match bytes {
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        // GIF: 47 49 46 38
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        // WebP: 52 49 46 46 ... 57 45 42 50
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        // PDF: 25 50 44 46
        [0x25, 0x50, 0x44, 0x46, ..] => Some("application/pdf"),
        _ => None,
    }
}

fn size_label(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{} bytes", bytes)
    }
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::BadRequest("Upload exceeds the request size limit".into())
    } else {
        AppError::BadRequest(format!("Invalid multipart data: {}", e.body_text()))
    }
}

/// One file part as received
struct FilePart {
    file_name: Option<String>,
    content_type: String,
    bytes: Bytes,
}

/// Drain the form: every part named `file_field`, plus the optional `folder`.
async fn read_form(mut multipart: Multipart, file_field: &str) -> Result<(Vec<FilePart>, String)> {
    let mut files = Vec::new();
    let mut folder = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "folder" {
            folder = Some(field.text().await.map_err(multipart_error)?);
        } else if name == file_field {
            if files.len() == MAX_FILES {
                return Err(AppError::validation(format!(
                    "Maximum {} files allowed",
                    MAX_FILES
                )));
            }
            let file_name = field.file_name().map(str::to_string);
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await.map_err(multipart_error)?;
            files.push(FilePart {
                file_name,
                content_type,
                bytes,
            });
        }
    }

    let folder = folder
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| DEFAULT_FOLDER.to_string());
    if !FOLDER_NAME.is_match(&folder) {
        return Err(AppError::validation("Invalid folder name"));
    }
    Ok((files, folder))
}

fn check_file(part: FilePart, folder: &str, config: &UploadConfig) -> Result<UploadFile> {
    if part.bytes.is_empty() {
        return Err(AppError::validation("Empty file"));
    }
    if !config.allowed_types.iter().any(|t| *t == part.content_type) {
        return Err(AppError::validation(format!(
            "File type {} is not allowed",
            part.content_type
        )));
    }
    if part.bytes.len() > config.max_file_size {
        return Err(AppError::validation(format!(
            "File too large. Maximum size is {}",
            size_label(config.max_file_size)
        )));
    }
    if SNIFFABLE.contains(&part.content_type.as_str())
        && sniff_mime(&part.bytes) != Some(part.content_type.as_str())
    {
        return Err(AppError::validation(
            "File content does not match its declared type",
        ));
    }
    let file_name = match part.file_name {
        Some(name) => Some(
            sanitize_filename(&name).ok_or_else(|| AppError::validation("File name is not allowed"))?,
        ),
        None => None,
    };

    Ok(UploadFile {
        file_name,
        content_type: part.content_type,
        bytes: part.bytes,
        folder: folder.to_string(),
    })
}

/// Store every file, or none: a failure removes whatever was already stored.
async fn store_all(storage: &dyn AssetStorage, files: Vec<UploadFile>) -> Result<Vec<StoredAsset>> {
    let mut stored = Vec::with_capacity(files.len());
    for file in files {
        match storage.put(file).await {
            Ok(asset) => stored.push(asset),
            Err(e) => {
                for asset in &stored {
                    if let Err(cleanup) = storage.delete(&asset.asset_id).await {
                        tracing::warn!(asset_id = %asset.asset_id, error = %cleanup, "asset rollback failed");
                    }
                }
                return Err(e);
            }
        }
    }
    Ok(stored)
}

/// POST /upload/single - Multipart field `file`
pub async fn upload_single(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    multipart: Multipart,
) -> Result<ApiResponse<StoredAsset>> {
    let (mut parts, folder) = read_form(multipart, "file").await?;
    if parts.len() > 1 {
        return Err(AppError::validation("Only one file is allowed"));
    }
    let part = parts
        .pop()
        .ok_or_else(|| AppError::validation("No file uploaded"))?;
    let file = check_file(part, &folder, &state.config.upload)?;

    let asset = state.assets.put(file).await?;
    tracing::info!(asset_id = %asset.asset_id, admin_id = %admin.id, backend = state.assets.backend(), "file uploaded");
    Ok(ApiResponse::created("File uploaded successfully", asset))
}

/// POST /upload/multiple - Multipart field `files`, at most ten
pub async fn upload_multiple(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    multipart: Multipart,
) -> Result<ApiResponse<Vec<StoredAsset>>> {
    let (parts, folder) = read_form(multipart, "files").await?;
    if parts.is_empty() {
        return Err(AppError::validation("No files uploaded"));
    }
    let files = parts
        .into_iter()
        .map(|part| check_file(part, &folder, &state.config.upload))
        .collect::<Result<Vec<_>>>()?;

    let assets = store_all(&*state.assets, files).await?;
    tracing::info!(count = assets.len(), admin_id = %admin.id, "files uploaded");
    Ok(ApiResponse::created("Files uploaded successfully", assets))
}

/// DELETE /upload/{assetId}
pub async fn delete_upload(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(asset_id): Path<String>,
) -> Result<ApiResponse<()>> {
    if asset_id.len() > 200 || !ASSET_ID.is_match(&asset_id) {
        return Err(AppError::validation("Invalid asset ID"));
    }
    if !state.assets.delete(&asset_id).await? {
        return Err(AppError::not_found("File"));
    }
    tracing::info!(asset_id = %asset_id, "file deleted");
    Ok(ApiResponse::message_only("File deleted successfully"))
}
