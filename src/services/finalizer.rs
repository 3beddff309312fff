//! Completion of a multipart upload.
//!
//! The backend performs the provider-side completion; this side makes sure it
//! is only asked to once every part 1..=total_parts has an ETag.

use crate::{
    errors::{UploadError, UploadResult},
    models::multipart::{
        CompleteMultipartRequest, CompletedPart, MultipartCompletion, UploadSession,
    },
    services::backend::TransferBackend,
};
use tracing::info;

/// Sort `parts` by part number and check they are exactly `1..=total_parts`.
pub fn assemble_parts(
    total_parts: u32,
    mut parts: Vec<CompletedPart>,
) -> UploadResult<Vec<CompletedPart>> {
    if parts.len() != total_parts as usize {
        return Err(UploadError::IncompleteParts {
            reason: format!("{} of {} parts uploaded", parts.len(), total_parts),
        });
    }

    parts.sort_by_key(|p| p.part_number);
    for (expected, part) in (1..=total_parts).zip(&parts) {
        if part.part_number != expected {
            return Err(UploadError::IncompleteParts {
                reason: format!(
                    "expected part {} but found part {}",
                    expected, part.part_number
                ),
            });
        }
    }

    Ok(parts)
}

/// Ask the backend to assemble the object from the uploaded parts.
pub async fn complete<B: TransferBackend>(
    backend: &B,
    session: &UploadSession,
    upload_id: &str,
    key: &str,
    parts: Vec<CompletedPart>,
) -> UploadResult<MultipartCompletion> {
    let parts = assemble_parts(session.total_parts, parts)?;
    let request = CompleteMultipartRequest {
        upload_id: upload_id.to_string(),
        key: key.to_string(),
        parts,
        transfer_id: session.transfer_id.clone(),
        file_id: session.file_id.clone(),
    };

    let completion = backend.complete_multipart_upload(&request).await?;
    if !completion.success {
        return Err(UploadError::FinalizeFailed {
            key: key.to_string(),
        });
    }

    info!(
        "multipart upload complete: {} ({} parts)",
        completion.key.as_deref().unwrap_or(key),
        request.parts.len()
    );
    Ok(completion)
}
