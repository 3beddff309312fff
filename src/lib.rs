//! Multipart file transfers to object storage through presigned URLs.
//!
//! A transfer uploads each selected file as a multipart object (parts PUT
//! directly to storage, in bounded batches), then asks the backend to create
//! a share-link record for the uploaded files.

pub mod config;
pub mod errors;
pub mod models;
pub mod services;

pub use config::{AppConfig, RetryPolicy, SelectionLimits, UploaderConfig};
pub use errors::{UploadError, UploadResult};
pub use services::{
    backend::{GraphqlBackend, TransferBackend},
    part_uploader::PartUploader,
    progress::{EtaEstimator, ProgressEvent, ProgressReporter},
    transfer_service::TransferService,
    upload_service::UploadCoordinator,
};
