//! Upload coordinator: drives one file through initiate, part uploads and
//! completion.
//!
//! Parts are dispatched in batches of at most `max_concurrency`; a batch must
//! finish before the next one starts. The first failing part aborts the file
//! and drops whatever is still in flight.

use crate::{
    config::UploaderConfig,
    errors::{UploadError, UploadResult},
    models::{
        multipart::{CompletedPart, PresignedPart, StartMultipartRequest, UploadSession},
        transfer::{SelectedFile, format_size},
        upload_state::UploadState,
    },
    services::{
        backend::TransferBackend,
        chunker::{MAX_PARTS, PartRange, part_count, plan_parts},
        finalizer,
        part_uploader::{PartUploader, read_part},
        progress::ProgressReporter,
    },
};
use futures::{StreamExt, stream::FuturesUnordered};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct UploadCoordinator<B> {
    backend: B,
    uploader: PartUploader,
    config: UploaderConfig,
}

impl<B: TransferBackend> UploadCoordinator<B> {
    pub fn new(backend: B, uploader: PartUploader, config: UploaderConfig) -> Self {
        Self {
            backend,
            uploader,
            config,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Check a file against the size and part-count limits; returns its part count.
    /// Empty files have no parts and are rejected.
    pub fn check_file(&self, file: &SelectedFile) -> UploadResult<u32> {
        if file.size > self.config.limits.max_file_size {
            return Err(UploadError::FileTooLarge {
                name: file.name.clone(),
                size: file.size,
                max: self.config.limits.max_file_size,
            });
        }
        let parts = part_count(file.size, self.config.part_size);
        if parts > MAX_PARTS {
            return Err(UploadError::TooManyParts {
                name: file.name.clone(),
                parts,
                max: MAX_PARTS,
            });
        }
        if parts == 0 {
            return Err(UploadError::EmptyFile {
                name: file.name.clone(),
            });
        }
        Ok(parts as u32)
    }

    /// Upload one file of a transfer and return its file id.
    ///
    /// `file_index` positions the file within the transfer for progress
    /// reporting. The caller's `cancel` token stops the upload between or
    /// during batches; nothing is finalized after cancellation.
    pub async fn upload_file(
        &self,
        file: &SelectedFile,
        transfer_id: &str,
        file_index: usize,
        progress: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> UploadResult<String> {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        let total_parts = self.check_file(file)?;

        let mut session = UploadSession::new(
            transfer_id,
            &file.id,
            &file.name,
            file.size,
            &file.mime_type,
            total_parts,
        );
        info!(
            "starting multipart upload of {} ({}) in {} parts of {}",
            file.name,
            format_size(file.size),
            total_parts,
            format_size(self.config.part_size)
        );
        progress.file_started(file_index, &file.id, &file.name, file.size, total_parts);

        let mut state = UploadState::Idle;
        let result = self
            .drive(file, &mut session, &mut state, file_index, progress, cancel)
            .await;

        match result {
            Ok(()) => {
                progress.file_completed(file_index, &file.id);
                Ok(session.file_id)
            }
            Err(err) => {
                let terminal = if matches!(err, UploadError::Cancelled) {
                    UploadState::Cancelled
                } else {
                    UploadState::Failed
                };
                if state.advance(terminal).is_ok() {
                    progress.state_changed(file_index, &file.id, state);
                }
                warn!(
                    "multipart upload of {} ended in {:?}: {}",
                    file.name, state, err
                );
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        file: &SelectedFile,
        session: &mut UploadSession,
        state: &mut UploadState,
        file_index: usize,
        progress: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> UploadResult<()> {
        transition(state, UploadState::Initiating, file_index, &file.id, progress)?;
        let start = self
            .backend
            .start_multipart_upload(&StartMultipartRequest::from(&*session))
            .await?;
        session.upload_id = Some(start.upload_id.clone());
        session.key = Some(start.key.clone());
        debug!(
            "multipart upload {} opened for {} with {} presigned URLs",
            start.upload_id,
            start.key,
            start.presigned_urls.len()
        );

        let urls = presigned_urls_by_part(session.total_parts, start.presigned_urls)?;
        let ranges = plan_parts(file.size, self.config.part_size);

        transition(state, UploadState::UploadingParts, file_index, &file.id, progress)?;
        let parts = self
            .upload_parts(file, &ranges, &urls, file_index, progress, cancel)
            .await?;

        transition(state, UploadState::Finalizing, file_index, &file.id, progress)?;
        finalizer::complete(&self.backend, session, &start.upload_id, &start.key, parts).await?;

        transition(state, UploadState::Completed, file_index, &file.id, progress)?;
        Ok(())
    }

    async fn upload_parts(
        &self,
        file: &SelectedFile,
        ranges: &[PartRange],
        urls: &[String],
        file_index: usize,
        progress: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> UploadResult<Vec<CompletedPart>> {
        let total_parts = ranges.len() as u32;
        let batch_size = self.config.max_concurrency.max(1);
        let batch_count = ranges.len().div_ceil(batch_size);
        let mut completed = Vec::with_capacity(ranges.len());

        for (batch_index, batch) in ranges.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            let mut in_flight: FuturesUnordered<_> = batch
                .iter()
                .map(|&range| {
                    let url = &urls[(range.part_number - 1) as usize];
                    async move {
                        let body = read_part(&file.path, range).await?;
                        let part = self.uploader.upload_part(url, range.part_number, body).await?;
                        Ok::<_, UploadError>((part, range.len))
                    }
                })
                .collect();

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                    next = in_flight.next() => next,
                };
                let Some(result) = next else { break };
                let (part, bytes) = result?;
                let part_number = part.part_number;
                completed.push(part);
                progress.part_completed(
                    file_index,
                    part_number,
                    completed.len() as u32,
                    total_parts,
                    bytes,
                );
            }

            info!(
                "batch {}/{} uploaded ({}/{} parts)",
                batch_index + 1,
                batch_count,
                completed.len(),
                total_parts
            );
        }

        Ok(completed)
    }
}

fn transition(
    state: &mut UploadState,
    next: UploadState,
    file_index: usize,
    file_id: &str,
    progress: &mut ProgressReporter,
) -> UploadResult<()> {
    state.advance(next)?;
    progress.state_changed(file_index, file_id, next);
    Ok(())
}

/// Order presigned URLs by part number, requiring one for every part.
fn presigned_urls_by_part(
    total_parts: u32,
    presigned: Vec<PresignedPart>,
) -> UploadResult<Vec<String>> {
    let mut by_part: HashMap<u32, String> = presigned
        .into_iter()
        .map(|p| (p.part_number, p.upload_url))
        .collect();

    (1..=total_parts)
        .map(|part_number| {
            by_part
                .remove(&part_number)
                .ok_or(UploadError::MissingPresignedUrl { part_number })
        })
        .collect()
}
