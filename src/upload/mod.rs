// # Upload orchestrator
//
// Turns local image paths into committed catalog entries:
//
// 1. Validate and hash the plaintext; skip hashes the dedup index knows.
// 2. Extract metadata and render the thumbnail.
// 3. In a scoped scratch directory: generate the file key, seal it under
//    the collection key, stream-encrypt the file, single-chunk encrypt
//    thumbnail and metadata.
// 4. Upload the encrypted file (single PUT or multipart) and thumbnail.
// 5. Commit the catalog entry, then record the hash in the dedup index.
//
// A worker pool runs the per-file pipeline with bounded concurrency.
// Failures are contained per file: the pool keeps going and the summary
// reports every error at the end.

mod progress;
mod service;

pub use progress::ProgressTracker;
pub use service::{UploadConfig, Uploader};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error(transparent)]
    Validation(#[from] crate::processor::ProcessorError),
    #[error(transparent)]
    Thumbnail(#[from] crate::thumbnail::ThumbnailError),
    #[error(transparent)]
    Encryption(#[from] crate::crypto::stream::StreamError),
    #[error(transparent)]
    KeyWrap(#[from] crate::crypto::wrap::WrapError),
    #[error("metadata serialization failed: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error(transparent)]
    Api(#[from] crate::api::ApiError),
    #[error(transparent)]
    ObjectStore(#[from] crate::remote::RemoteError),
    #[error(transparent)]
    State(#[from] crate::store::StoreError),
    #[error("server returned {got} part URLs for {want} parts")]
    PartUrlMismatch { want: usize, got: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("upload cancelled")]
    Cancelled,
}

/// Result of one file's trip through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Freshly encrypted, uploaded and committed.
    Uploaded { file_id: i64, encrypted_bytes: u64 },
    /// Content hash already known; nothing was transferred.
    Skipped { file_id: i64 },
}

/// Aggregate outcome of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub uploaded_bytes: u64,
    pub errors: Vec<String>,
}

impl UploadSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}
