use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use reqwest::Method;
use reqwest::multipart::{Form, Part};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use csvdash_types::models::{CsvView, FileRecord};

use crate::client::{ApiClient, endpoints};
use crate::error::ApiError;

/// 50 MB upload limit
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;
pub const ALLOWED_EXTENSIONS: &[&str] = &["csv"];

pub const DEFAULT_MAX_ROWS: usize = 100;
pub const MAX_ROWS: usize = 1000;

pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Check an upload before it leaves the client. Mirrors the server's limits
/// so the user gets the error without a round trip.
pub fn validate_upload(filename: &str, size: usize) -> Result<(), ApiError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let allowed = extension
        .as_deref()
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext));
    if !allowed {
        return Err(ApiError::Validation(format!(
            "Only {} files are allowed",
            ALLOWED_EXTENSIONS
                .iter()
                .map(|e| format!(".{}", e))
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }
    if size == 0 {
        return Err(ApiError::Validation("File is empty".into()));
    }
    if size > MAX_UPLOAD_SIZE {
        return Err(ApiError::Validation(format!(
            "File exceeds the {} MB limit",
            MAX_UPLOAD_SIZE / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Clamp a requested row limit into what the server accepts.
pub fn clamp_max_rows(max_rows: usize) -> usize {
    max_rows.clamp(1, MAX_ROWS)
}

#[derive(Clone)]
pub struct FileService {
    api: Arc<ApiClient>,
}

impl FileService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub async fn list(&self, skip: usize, limit: usize) -> Result<Vec<FileRecord>, ApiError> {
        let req = self
            .api
            .request(Method::GET, endpoints::CSV_LIST)
            .query(&[("skip", skip), ("limit", limit)]);
        self.api.send_json(req).await
    }

    pub async fn upload(&self, bytes: Vec<u8>, filename: &str) -> Result<FileRecord, ApiError> {
        validate_upload(filename, bytes.len())?;

        let size = bytes.len();
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("text/csv")?;
        let form = Form::new().part("file", part);
        let req = self.api.request(Method::POST, endpoints::CSV_UPLOAD).multipart(form);

        let file: FileRecord = self.api.send_json(req).await?;
        info!("Uploaded {} ({} bytes) as file {}", filename, size, file.id);
        Ok(file)
    }

    /// Read a local file and upload it under its own file name.
    pub async fn upload_path(&self, path: &Path) -> Result<FileRecord, ApiError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ApiError::Validation(format!("Invalid file path: {}", path.display())))?
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ApiError::Validation(format!("Cannot read {}: {}", path.display(), e)))?;
        self.upload(bytes, &filename).await
    }

    pub async fn view(&self, id: i64, max_rows: usize) -> Result<CsvView, ApiError> {
        let req = self
            .api
            .request(Method::GET, &endpoints::csv_view(id))
            .query(&[("max_rows", clamp_max_rows(max_rows))]);
        self.api.send_json(req).await
    }

    pub async fn download(&self, id: i64) -> Result<Bytes, ApiError> {
        let req = self.api.request(Method::GET, &endpoints::csv_download(id));
        let response = self.api.send(req).await?;
        Ok(response.bytes().await?)
    }

    /// Download a file and save it as `dir/filename`. Returns the written path.
    pub async fn download_to(&self, id: i64, filename: &str, dir: &Path) -> Result<PathBuf, ApiError> {
        let bytes = self.download(id).await?;

        // Keep only the final path component of the server-supplied name
        let safe_name = Path::new(filename)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| format!("file-{}.csv", id).into());
        let path = dir.join(safe_name);

        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            error!("Failed to create download directory {}: {}", dir.display(), e);
            ApiError::Storage(e.to_string())
        })?;
        let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
            error!("Failed to create file {}: {}", path.display(), e);
            ApiError::Storage(e.to_string())
        })?;
        file.write_all(&bytes).await.map_err(|e| {
            error!("Failed to write file {}: {}", path.display(), e);
            ApiError::Storage(e.to_string())
        })?;
        file.flush().await.map_err(|e| ApiError::Storage(e.to_string()))?;

        info!("Saved file {} to {}", id, path.display());
        Ok(path)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        let req = self.api.request(Method::DELETE, &endpoints::csv_delete(id));
        self.api.send(req).await?;
        Ok(())
    }
}
