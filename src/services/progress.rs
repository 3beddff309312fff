//! Progress reporting for a transfer.
//!
//! The reporter is owned by whoever drives the transfer and is passed down by
//! reference. Observers subscribe to a broadcast channel of [`ProgressEvent`]s;
//! a lagging or absent subscriber never blocks the upload.

use crate::models::upload_state::UploadState;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    FileStarted {
        file_index: usize,
        file_id: String,
        file_name: String,
        file_size: u64,
        total_parts: u32,
    },
    StateChanged {
        file_index: usize,
        file_id: String,
        state: UploadState,
    },
    PartCompleted {
        file_index: usize,
        part_number: u32,
        parts_completed: u32,
        total_parts: u32,
        /// Bytes uploaded across the whole transfer so far.
        bytes_uploaded: u64,
        total_bytes: u64,
        /// Overall transfer progress, 0 to 100.
        percent: f64,
    },
    FileCompleted {
        file_index: usize,
        file_id: String,
    },
    TransferCompleted {
        files: usize,
        total_bytes: u64,
    },
}

/// Overall progress (0 to 100) of a transfer whose files are uploaded one
/// after another, each file weighing the same share.
pub fn overall_progress(
    file_index: usize,
    parts_completed: u32,
    total_parts: u32,
    total_files: usize,
) -> f64 {
    if total_files == 0 {
        return 0.0;
    }
    let file_fraction = if total_parts == 0 {
        0.0
    } else {
        (parts_completed.min(total_parts) as f64) / (total_parts as f64)
    };
    let value = (file_index as f64 + file_fraction) / (total_files as f64) * 100.0;
    value.clamp(0.0, 100.0)
}

pub struct ProgressReporter {
    sender: broadcast::Sender<ProgressEvent>,
    total_files: usize,
    total_bytes: u64,
    bytes_uploaded: u64,
    percent: f64,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl ProgressReporter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            total_files: 1,
            total_bytes: 0,
            bytes_uploaded: 0,
            percent: 0.0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Current overall progress, 0 to 100.
    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded
    }

    /// Reset counters for a new transfer.
    pub fn begin_transfer(&mut self, total_files: usize, total_bytes: u64) {
        self.total_files = total_files.max(1);
        self.total_bytes = total_bytes;
        self.bytes_uploaded = 0;
        self.percent = 0.0;
    }

    pub fn file_started(
        &mut self,
        file_index: usize,
        file_id: &str,
        file_name: &str,
        file_size: u64,
        total_parts: u32,
    ) {
        self.emit(ProgressEvent::FileStarted {
            file_index,
            file_id: file_id.to_string(),
            file_name: file_name.to_string(),
            file_size,
            total_parts,
        });
    }

    pub fn state_changed(&mut self, file_index: usize, file_id: &str, state: UploadState) {
        self.emit(ProgressEvent::StateChanged {
            file_index,
            file_id: file_id.to_string(),
            state,
        });
    }

    pub fn part_completed(
        &mut self,
        file_index: usize,
        part_number: u32,
        parts_completed: u32,
        total_parts: u32,
        part_bytes: u64,
    ) {
        self.bytes_uploaded += part_bytes;
        let percent = overall_progress(file_index, parts_completed, total_parts, self.total_files);
        self.percent = self.percent.max(percent);

        self.emit(ProgressEvent::PartCompleted {
            file_index,
            part_number,
            parts_completed,
            total_parts,
            bytes_uploaded: self.bytes_uploaded,
            total_bytes: self.total_bytes,
            percent: self.percent,
        });
    }

    pub fn file_completed(&mut self, file_index: usize, file_id: &str) {
        self.emit(ProgressEvent::FileCompleted {
            file_index,
            file_id: file_id.to_string(),
        });
    }

    pub fn transfer_completed(&mut self) {
        self.emit(ProgressEvent::TransferCompleted {
            files: self.total_files,
            total_bytes: self.total_bytes,
        });
    }

    fn emit(&self, event: ProgressEvent) {
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }
}

/// Estimates throughput and remaining time from part completion events.
#[derive(Debug, Clone)]
pub struct EtaEstimator {
    started_at: Instant,
    latest_at: Option<Instant>,
    bytes_uploaded: u64,
    total_bytes: u64,
}

impl EtaEstimator {
    pub fn new(started_at: Instant) -> Self {
        Self {
            started_at,
            latest_at: None,
            bytes_uploaded: 0,
            total_bytes: 0,
        }
    }

    pub fn observe(&mut self, event: &ProgressEvent, at: Instant) {
        if let ProgressEvent::PartCompleted {
            bytes_uploaded,
            total_bytes,
            ..
        } = event
        {
            self.bytes_uploaded = *bytes_uploaded;
            self.total_bytes = *total_bytes;
            self.latest_at = Some(at);
        }
    }

    /// Average bytes per second since the estimator started.
    pub fn throughput(&self) -> Option<f64> {
        let elapsed = self.latest_at?.checked_duration_since(self.started_at)?;
        if elapsed.is_zero() || self.bytes_uploaded == 0 {
            return None;
        }
        Some(self.bytes_uploaded as f64 / elapsed.as_secs_f64())
    }

    pub fn remaining(&self) -> Option<Duration> {
        let rate = self.throughput()?;
        let left = self.total_bytes.saturating_sub(self.bytes_uploaded);
        Some(Duration::from_secs_f64(left as f64 / rate))
    }
}
