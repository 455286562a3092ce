/**
 * Asset Storage
 * Uploaded files live on Cloudinary when configured, otherwise on local disk
 */
use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{CloudinaryConfig, UploadConfig};
use crate::error::{AppError, Result};

pub const LOCAL_PREFIX: &str = "/uploads";

const CLOUDINARY_API: &str = "https://api.cloudinary.com/v1_1";
const CLOUDINARY_ROOT_FOLDER: &str = "portfolio";
const IMAGE_TRANSFORMATION: &str = "c_limit,h_800,w_1200";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Raw,
}

impl AssetKind {
    pub fn for_mime(content_type: &str) -> Self {
        if content_type.starts_with("image/") {
            AssetKind::Image
        } else {
            AssetKind::Raw
        }
    }

    fn resource_type(&self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Raw => "raw",
        }
    }
}

/// A checked upload ready to be stored
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Bytes,
    pub folder: String,
}

impl UploadFile {
    pub fn kind(&self) -> AssetKind {
        AssetKind::for_mime(&self.content_type)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAsset {
    pub url: String,
    pub asset_id: String,
    pub kind: AssetKind,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
}

#[async_trait]
pub trait AssetStorage: Send + Sync {
    async fn put(&self, file: UploadFile) -> Result<StoredAsset>;

    /// `Ok(false)` when nothing was stored under `asset_id`.
    async fn delete(&self, asset_id: &str) -> Result<bool>;

    /// Id of an asset this backend serves at `url`; `None` for foreign URLs.
    fn asset_id(&self, url: &str) -> Option<String>;

    fn backend(&self) -> &'static str;
}

pub type DynAssets = Arc<dyn AssetStorage>;

pub fn from_config(config: &UploadConfig, http: reqwest::Client) -> DynAssets {
    match &config.cloudinary {
        Some(cloudinary) => Arc::new(CloudinaryStorage::new(cloudinary.clone(), http)),
        None => Arc::new(LocalDiskStorage::new(config.dir.clone())),
    }
}

/// File extension for a MIME type, else the original name's extension.
fn extension_for(content_type: &str, file_name: Option<&str>) -> String {
    let known = match content_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "application/pdf" => Some("pdf"),
        _ => None,
    };
    known
        .map(str::to_string)
        .or_else(|| {
            file_name
                .and_then(|n| n.rsplit_once('.'))
                .map(|(_, ext)| ext.to_ascii_lowercase())
                .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        })
        .unwrap_or_else(|| "bin".to_string())
}

fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
}

/// Last path segment of `url` without its extension.
pub fn extract_asset_id(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.trim_end_matches('/').rsplit('/').next()?;
    let stem = segment.split('.').next().unwrap_or(segment);
    (!stem.is_empty()).then(|| stem.to_string())
}

/// Remove every asset referenced by a deleted record. Failures are logged and
/// never abort the caller.
pub async fn delete_assets<'a, I>(storage: &dyn AssetStorage, urls: I)
where
    I: IntoIterator<Item = &'a String>,
{
    for url in urls {
        let Some(asset_id) = storage.asset_id(url) else {
            continue;
        };
        match storage.delete(&asset_id).await {
            Ok(true) => tracing::info!(asset_id = %asset_id, "asset deleted"),
            Ok(false) => tracing::warn!(asset_id = %asset_id, "asset already gone"),
            Err(e) => tracing::warn!(asset_id = %asset_id, error = %e, "asset delete failed"),
        }
    }
}

// ============================================================================
// Local disk
// ============================================================================

/// Files under `root/<folder>/<id>.<ext>`, served at `/uploads/<folder>/...`
pub struct LocalDiskStorage {
    root: PathBuf,
}

impl LocalDiskStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

fn io_error(e: std::io::Error) -> AppError {
    AppError::Internal(format!("asset storage: {}", e))
}

#[async_trait]
impl AssetStorage for LocalDiskStorage {
    async fn put(&self, file: UploadFile) -> Result<StoredAsset> {
        let dir = self.root.join(&file.folder);
        tokio::fs::create_dir_all(&dir).await.map_err(io_error)?;

        let asset_id = Uuid::new_v4().simple().to_string();
        let ext = extension_for(&file.content_type, file.file_name.as_deref());
        let file_name = format!("{}.{}", asset_id, ext);
        tokio::fs::write(dir.join(&file_name), &file.bytes)
            .await
            .map_err(io_error)?;

        tracing::info!(asset_id = %asset_id, folder = %file.folder, size = file.bytes.len(), "asset stored on disk");
        Ok(StoredAsset {
            url: format!("{}/{}/{}", LOCAL_PREFIX, file.folder, file_name),
            asset_id,
            kind: file.kind(),
            size: file.bytes.len(),
            original_name: file.file_name,
        })
    }

    async fn delete(&self, asset_id: &str) -> Result<bool> {
        if !is_safe_id(asset_id) {
            return Ok(false);
        }
        let mut folders = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(io_error(e)),
        };

        while let Some(folder) = folders.next_entry().await.map_err(io_error)? {
            if !folder.file_type().await.map_err(io_error)?.is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(folder.path()).await.map_err(io_error)?;
            while let Some(file) = files.next_entry().await.map_err(io_error)? {
                let path = file.path();
                if path.file_stem().and_then(|s| s.to_str()) == Some(asset_id) {
                    tokio::fs::remove_file(&path).await.map_err(io_error)?;
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn asset_id(&self, url: &str) -> Option<String> {
        if !url.starts_with(&format!("{}/", LOCAL_PREFIX)) {
            return None;
        }
        extract_asset_id(url)
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}

// ============================================================================
// Cloudinary
// ============================================================================

pub struct CloudinaryStorage {
    config: CloudinaryConfig,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct UploadResult {
    secure_url: String,
    public_id: String,
    bytes: Option<usize>,
}

#[derive(Deserialize)]
struct DestroyResult {
    result: String,
}

/// `sha256(sorted "k=v&..." + secret)` as lowercase hex.
fn sign(params: &[(&str, String)], secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl CloudinaryStorage {
    pub fn new(config: CloudinaryConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    fn endpoint(&self, kind: AssetKind, action: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            CLOUDINARY_API,
            self.config.cloud_name,
            kind.resource_type(),
            action
        )
    }

    fn signed_form(&self, mut params: Vec<(&'static str, String)>) -> Form {
        params.push(("timestamp", chrono::Utc::now().timestamp().to_string()));
        let signature = sign(&params, &self.config.api_secret);
        params
            .into_iter()
            .fold(Form::new(), |form, (k, v)| form.text(k, v))
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256")
    }

    async fn destroy(&self, kind: AssetKind, public_id: &str) -> Result<bool> {
        let form = self.signed_form(vec![("public_id", public_id.to_string())]);
        let result: DestroyResult = self
            .http
            .post(self.endpoint(kind, "destroy"))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(result.result == "ok")
    }
}

#[async_trait]
impl AssetStorage for CloudinaryStorage {
    async fn put(&self, file: UploadFile) -> Result<StoredAsset> {
        let kind = file.kind();
        let mut params = vec![(
            "folder",
            format!("{}/{}", CLOUDINARY_ROOT_FOLDER, file.folder),
        )];
        if kind == AssetKind::Image {
            params.push(("transformation", IMAGE_TRANSFORMATION.to_string()));
        }

        let upload_name = file
            .file_name
            .clone()
            .unwrap_or_else(|| format!("upload.{}", extension_for(&file.content_type, None)));
        let part = Part::bytes(file.bytes.to_vec())
            .file_name(upload_name)
            .mime_str(&file.content_type)?;
        let form = self.signed_form(params).part("file", part);

        let result: UploadResult = self
            .http
            .post(self.endpoint(kind, "upload"))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::info!(public_id = %result.public_id, "asset uploaded to cloudinary");
        Ok(StoredAsset {
            url: result.secure_url,
            asset_id: result.public_id,
            kind,
            size: result.bytes.unwrap_or(file.bytes.len()),
            original_name: file.file_name,
        })
    }

    async fn delete(&self, asset_id: &str) -> Result<bool> {
        if self.destroy(AssetKind::Image, asset_id).await? {
            return Ok(true);
        }
        self.destroy(AssetKind::Raw, asset_id).await
    }

    /// Public id: the path after `/upload/` minus the version and extension.
    fn asset_id(&self, url: &str) -> Option<String> {
        if !url.contains("res.cloudinary.com") {
            return None;
        }
        let (_, path) = url.split_once("/upload/")?;
        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments
            .first()
            .is_some_and(|s| s.len() > 1 && s.starts_with('v') && s[1..].bytes().all(|b| b.is_ascii_digit()))
        {
            segments.remove(0);
        }
        let last = segments.pop()?;
        let stem = last.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(last);
        segments.push(stem);
        Some(segments.join("/"))
    }

    fn backend(&self) -> &'static str {
        "cloudinary"
    }
}
