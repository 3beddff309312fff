//! Transfer creation: validate the selection, upload every file, then
//! register the transfer with the backend.

use crate::{
    errors::{UploadError, UploadResult},
    models::transfer::{SelectedFile, TransferOptions, TransferResult, format_size},
    services::{
        backend::TransferBackend, progress::ProgressReporter, upload_service::UploadCoordinator,
    },
};
use chrono::Utc;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

pub struct TransferService<B> {
    coordinator: UploadCoordinator<B>,
}

impl<B: TransferBackend> TransferService<B> {
    pub fn new(coordinator: UploadCoordinator<B>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &UploadCoordinator<B> {
        &self.coordinator
    }

    /// Stat every path, skipping the ones that cannot be uploaded.
    pub async fn select_files(&self, paths: &[PathBuf]) -> Vec<SelectedFile> {
        let mut selected = Vec::with_capacity(paths.len());
        for path in paths {
            match SelectedFile::from_path(path).await {
                Ok(file) => selected.push(file),
                Err(err) => warn!("skipping {}: {}", path.display(), err),
            }
        }
        selected
    }

    /// Keep the non-empty files and enforce the selection limits.
    pub fn validate_selection<'a>(
        &self,
        files: &'a [SelectedFile],
    ) -> UploadResult<Vec<&'a SelectedFile>> {
        let valid: Vec<&SelectedFile> = files
            .iter()
            .filter(|file| {
                if file.size == 0 {
                    warn!("skipping empty file {}", file.name);
                }
                file.size > 0
            })
            .collect();

        if valid.is_empty() {
            return Err(UploadError::NoValidFiles);
        }

        let max_files = self.coordinator.config().limits.max_files;
        if valid.len() > max_files {
            return Err(UploadError::TooManyFiles {
                count: valid.len(),
                max: max_files,
            });
        }

        for file in &valid {
            self.coordinator.check_file(file)?;
        }
        Ok(valid)
    }

    /// Upload `files` one after another and create the share-link transfer.
    ///
    /// Validation happens before any network call. A failing file aborts the
    /// whole transfer; no transfer record is created in that case.
    pub async fn create_transfer(
        &self,
        files: &[SelectedFile],
        options: &TransferOptions,
        progress: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> UploadResult<TransferResult> {
        let valid = self.validate_selection(files)?;
        let options = options.normalized()?;

        let transfer_id = Uuid::new_v4().to_string();
        let total_bytes: u64 = valid.iter().map(|f| f.size).sum();
        info!(
            "transfer {}: uploading {} file(s), {}",
            transfer_id,
            valid.len(),
            format_size(total_bytes)
        );
        progress.begin_transfer(valid.len(), total_bytes);

        let mut file_ids = Vec::with_capacity(valid.len());
        for (index, file) in valid.iter().enumerate() {
            let file_id = self
                .coordinator
                .upload_file(file, &transfer_id, index, progress, cancel)
                .await?;
            file_ids.push(file_id);
        }

        let created = self
            .coordinator
            .backend()
            .create_file_transfer(&file_ids, &options)
            .await?;
        let transfer = created
            .file_transfer
            .ok_or_else(|| UploadError::InvalidResponse {
                operation: "createFileTransferWithIdsR2",
                reason: "missing fileTransfer".into(),
            })?;

        let result = TransferResult {
            success: true,
            id: transfer.id,
            share_link: created.share_link.or(transfer.share_link).unwrap_or_default(),
            access_key: created.access_key.or(transfer.access_key).unwrap_or_default(),
            files: transfer.files,
            total_size: transfer
                .total_size
                .map(|size| size as u64)
                .unwrap_or(total_bytes),
            status: transfer.status.unwrap_or_default(),
            expiry_date: transfer.expiry_date,
            completed_at: Utc::now(),
        };

        progress.transfer_completed();
        info!(
            "transfer {} created: {} ({} file(s), {})",
            result.id,
            result.share_link,
            file_ids.len(),
            format_size(result.total_size)
        );
        Ok(result)
    }
}
