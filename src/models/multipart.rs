//! Multipart upload sessions, presigned parts and completed parts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One file's multipart upload, from initiation to completion.
#[derive(Debug, Clone)]
pub struct UploadSession {
    /// Transfer this file belongs to.
    pub transfer_id: String,

    /// Client-generated file identifier.
    pub file_id: String,

    pub file_name: String,

    /// Size in bytes.
    pub file_size: u64,

    pub mime_type: String,

    /// Number of parts the file was split into.
    pub total_parts: u32,

    /// Upload ID issued by the storage provider (set once initiated).
    pub upload_id: Option<String>,

    /// Storage key of the object being assembled (set once initiated).
    pub key: Option<String>,

    pub started_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(
        transfer_id: impl Into<String>,
        file_id: impl Into<String>,
        file_name: impl Into<String>,
        file_size: u64,
        mime_type: impl Into<String>,
        total_parts: u32,
    ) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            file_id: file_id.into(),
            file_name: file_name.into(),
            file_size,
            mime_type: mime_type.into(),
            total_parts,
            upload_id: None,
            key: None,
            started_at: Utc::now(),
        }
    }
}

/// A time-limited URL the client may `PUT` one part to.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresignedPart {
    /// Part number (1-based).
    pub part_number: u32,
    pub upload_url: String,
}

/// A part accepted by storage, identified by the ETag it returned.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Backend answer to `startMultipartUpload`.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MultipartStart {
    pub upload_id: String,
    pub key: String,
    pub presigned_urls: Vec<PresignedPart>,
}

/// Backend answer to `completeMultipartUpload`.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MultipartCompletion {
    pub success: bool,
    pub key: Option<String>,
    pub url: Option<String>,
    pub size: Option<f64>,
    pub etag: Option<String>,
    pub file_id: Option<String>,
}

/// Arguments of `startMultipartUpload`.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StartMultipartRequest {
    pub transfer_id: String,
    pub file_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub total_parts: u32,
}

impl From<&UploadSession> for StartMultipartRequest {
    fn from(session: &UploadSession) -> Self {
        Self {
            transfer_id: session.transfer_id.clone(),
            file_id: session.file_id.clone(),
            file_name: session.file_name.clone(),
            file_size: session.file_size,
            mime_type: session.mime_type.clone(),
            total_parts: session.total_parts,
        }
    }
}

/// Arguments of `completeMultipartUpload`.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CompleteMultipartRequest {
    pub upload_id: String,
    pub key: String,
    /// Sorted by part number.
    pub parts: Vec<CompletedPart>,
    pub transfer_id: String,
    pub file_id: String,
}
