//! Lifecycle of a single file upload.

use crate::errors::{UploadError, UploadResult};
use serde::Serialize;

/// `Idle -> Initiating -> UploadingParts -> Finalizing -> Completed`, with
/// `Failed` reachable from every active state and `Cancelled` from
/// `UploadingParts`.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Idle,
    Initiating,
    UploadingParts,
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

impl UploadState {
    pub fn can_transition_to(self, next: UploadState) -> bool {
        use UploadState::*;
        matches!(
            (self, next),
            (Idle, Initiating)
                | (Initiating, UploadingParts)
                | (UploadingParts, Finalizing)
                | (Finalizing, Completed)
                | (Initiating, Failed)
                | (UploadingParts, Failed)
                | (Finalizing, Failed)
                | (UploadingParts, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UploadState::Completed | UploadState::Failed | UploadState::Cancelled
        )
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn advance(&mut self, next: UploadState) -> UploadResult<()> {
        if !self.can_transition_to(next) {
            return Err(UploadError::InvalidTransition { from: *self, to: next });
        }
        *self = next;
        Ok(())
    }
}
