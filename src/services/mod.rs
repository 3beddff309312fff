//! Upload pipeline: chunking, backend calls, part uploads, completion and
//! progress, composed by the transfer service.

pub mod backend;
pub mod chunker;
pub mod finalizer;
pub mod part_uploader;
pub mod progress;
pub mod transfer_service;
pub mod upload_service;
