//! Data carried through the upload pipeline.
//!
//! Wire types mirror the backend's GraphQL contract and serialize with
//! camelCase names via `serde`. Session and selection types are client-side
//! only and never persisted.

pub mod multipart;
pub mod transfer;
pub mod upload_state;
