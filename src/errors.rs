//! Error taxonomy for the upload pipeline.
//!
//! Every failure carries the underlying message so callers can surface it
//! as-is. Nothing in the pipeline swallows an error.

use crate::models::upload_state::UploadState;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    // --- validation ---
    #[error("no valid file to upload")]
    NoValidFiles,
    #[error("too many files: {count} selected, at most {max} allowed")]
    TooManyFiles { count: usize, max: usize },
    #[error("file `{name}` is too large ({size} bytes, max {max})")]
    FileTooLarge { name: String, size: u64, max: u64 },
    #[error("file `{name}` is empty")]
    EmptyFile { name: String },
    #[error("file `{name}` needs {parts} parts, storage accepts at most {max}")]
    TooManyParts { name: String, parts: u64, max: u64 },
    #[error("invalid transfer options: {0}")]
    InvalidOptions(String),
    #[error("invalid uploader configuration: {0}")]
    InvalidConfig(String),

    // --- part uploads ---
    #[error("upload of part {part_number} failed: {status} {body}")]
    PartRejected {
        part_number: u32,
        status: u16,
        body: String,
    },
    #[error("presigned URL for part {part_number} was rejected (status {status}), it may have expired")]
    PresignedUrlRejected { part_number: u32, status: u16 },
    #[error("upload of part {part_number} failed: {source}")]
    PartTransport {
        part_number: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("missing ETag for part {part_number}")]
    MissingEtag { part_number: u32 },
    #[error("ETag mismatch for part {part_number}: expected {expected}, storage returned {actual}")]
    EtagMismatch {
        part_number: u32,
        expected: String,
        actual: String,
    },
    #[error("no presigned URL for part {part_number}")]
    MissingPresignedUrl { part_number: u32 },

    // --- finalize ---
    #[error("cannot finalize: {reason}")]
    IncompleteParts { reason: String },
    #[error("multipart completion failed for `{key}`")]
    FinalizeFailed { key: String },

    // --- backend ---
    #[error("GraphQL errors in {operation}: {}", .messages.join(", "))]
    GraphQl {
        operation: &'static str,
        messages: Vec<String>,
    },
    #[error("invalid response from {operation}: {reason}")]
    InvalidResponse {
        operation: &'static str,
        reason: String,
    },
    #[error("backend request {operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    // --- lifecycle ---
    #[error("upload cancelled")]
    Cancelled,
    #[error("invalid upload state transition {from:?} -> {to:?}")]
    InvalidTransition { from: UploadState, to: UploadState },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl UploadError {
    /// Whether a part upload that failed with this error may be attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::PartTransport { .. } | UploadError::EtagMismatch { .. } => true,
            UploadError::PartRejected { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Validation failures are detected before any network call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            UploadError::NoValidFiles
                | UploadError::TooManyFiles { .. }
                | UploadError::FileTooLarge { .. }
                | UploadError::EmptyFile { .. }
                | UploadError::TooManyParts { .. }
                | UploadError::InvalidOptions(_)
                | UploadError::InvalidConfig(_)
        )
    }
}

pub type UploadResult<T> = Result<T, UploadError>;
