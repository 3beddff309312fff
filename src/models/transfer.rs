//! Transfers: the files a user selected, the options attached to the share
//! link, and the record the backend returns once the transfer exists.

use crate::errors::{UploadError, UploadResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const SUPPORTED_CURRENCIES: [&str; 3] = ["EUR", "USD", "GBP"];

/// Options sent as `FileTransferInput` when the transfer record is created.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferOptions {
    /// Days until the share link expires.
    pub expiry_days: u32,
    pub is_payment_required: bool,
    pub payment_amount: f64,
    pub payment_currency: String,
    pub recipient_email: Option<String>,
    pub message: String,
    pub notify_on_download: bool,
    pub password_protected: bool,
    pub password: Option<String>,
    pub allow_preview: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            expiry_days: 7,
            is_payment_required: false,
            payment_amount: 0.0,
            payment_currency: "EUR".into(),
            recipient_email: None,
            message: String::new(),
            notify_on_download: false,
            password_protected: false,
            password: None,
            allow_preview: true,
        }
    }
}

impl TransferOptions {
    pub fn validate(&self) -> UploadResult<()> {
        if self.expiry_days == 0 {
            return Err(UploadError::InvalidOptions(
                "expiry must be at least one day".into(),
            ));
        }
        if self.password_protected
            && self.password.as_deref().map_or(true, |p| p.trim().is_empty())
        {
            return Err(UploadError::InvalidOptions(
                "a password is required when password protection is enabled".into(),
            ));
        }
        if self.is_payment_required && !(self.payment_amount > 0.0) {
            return Err(UploadError::InvalidOptions(
                "payment amount must be positive when payment is required".into(),
            ));
        }
        if !SUPPORTED_CURRENCIES
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&self.payment_currency))
        {
            return Err(UploadError::InvalidOptions(format!(
                "currency `{}` is not supported",
                self.payment_currency
            )));
        }
        Ok(())
    }

    /// Validate and return the options as sent to the backend, with the
    /// currency code upper-cased.
    pub fn normalized(&self) -> UploadResult<Self> {
        self.validate()?;
        Ok(Self {
            payment_currency: self.payment_currency.to_ascii_uppercase(),
            ..self.clone()
        })
    }
}

/// A local file picked for upload.
#[derive(Clone, Debug)]
pub struct SelectedFile {
    /// Client-generated id, reused as the backend file id.
    pub id: String,
    pub path: PathBuf,
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    pub mime_type: String,
}

impl SelectedFile {
    /// Stat `path` and build a selection entry with a fresh id.
    pub async fn from_path(path: impl AsRef<Path>) -> UploadResult<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            )));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            path: path.to_path_buf(),
            mime_type: mime_type_for(&name).to_string(),
            name,
            size: metadata.len(),
        })
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}

/// Guess a MIME type from the file extension.
pub fn mime_type_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "zip" => "application/zip",
        "rar" => "application/vnd.rar",
        "7z" => "application/x-7z-compressed",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "json" => "application/json",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

/// A file as listed in the backend's transfer record.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TransferFile {
    pub original_name: Option<String>,
    pub display_name: Option<String>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub r2_key: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<f64>,
    pub storage_type: Option<String>,
    pub file_id: Option<String>,
}

/// `fileTransfer` object returned by `createFileTransferWithIdsR2`.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FileTransfer {
    pub id: String,
    #[serde(default)]
    pub files: Vec<TransferFile>,
    #[serde(default)]
    pub total_size: Option<f64>,
    pub share_link: Option<String>,
    pub access_key: Option<String>,
    pub expiry_date: Option<String>,
    pub status: Option<String>,
}

/// Backend answer to `createFileTransferWithIdsR2`.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTransfer {
    pub file_transfer: Option<FileTransfer>,
    pub share_link: Option<String>,
    pub access_key: Option<String>,
}

/// Outcome of a finished transfer.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    pub success: bool,
    /// Backend transfer record id.
    pub id: String,
    pub share_link: String,
    pub access_key: String,
    pub files: Vec<TransferFile>,
    /// Total size in bytes.
    pub total_size: u64,
    pub status: String,
    pub expiry_date: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Format a byte count as B/KB/MB/GB with one decimal.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let value = bytes as f64;
    if value >= GB {
        format!("{:.1}GB", value / GB)
    } else if value >= MB {
        format!("{:.1}MB", value / MB)
    } else if value >= KB {
        format!("{:.1}KB", value / KB)
    } else {
        format!("{}B", bytes)
    }
}
