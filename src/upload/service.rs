use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

use crate::albums::Album;
use crate::api::{
    ControlPlane, CreateFileRequest, FileAttributes, MetadataAttributes,
};
use crate::crypto::{stream, wrap, SecretKey};
use crate::processor;
use crate::remote::{self, ObjectStore};
use crate::shutdown::ShutdownToken;
use crate::store::{HashEntry, StateStore};
use crate::thumbnail::Thumbnailer;

use super::{FileOutcome, ProgressTracker, UploadError, UploadSummary};

/// Knobs for a batch run.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Concurrent per-file pipelines.
    pub workers: usize,
    /// Upload even when the content hash is already known.
    pub force: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            force: false,
        }
    }
}

/// Runs the per-file upload pipeline, alone or across a worker pool.
#[derive(Clone)]
pub struct Uploader {
    api: Arc<dyn ControlPlane>,
    objects: Arc<dyn ObjectStore>,
    thumbnailer: Arc<dyn Thumbnailer>,
    store: StateStore,
    shutdown: ShutdownToken,
}

impl Uploader {
    pub fn new(
        api: Arc<dyn ControlPlane>,
        objects: Arc<dyn ObjectStore>,
        thumbnailer: Arc<dyn Thumbnailer>,
        store: StateStore,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            api,
            objects,
            thumbnailer,
            store,
            shutdown,
        }
    }

    /// Upload a batch of files with `config.workers` concurrent pipelines.
    /// Paths are consumed in enqueue order; per-file failures are recorded
    /// and the batch keeps going.
    pub async fn upload_batch(
        &self,
        paths: Vec<PathBuf>,
        album: &Album,
        config: &UploadConfig,
    ) -> UploadSummary {
        let tracker = ProgressTracker::new(paths.len());

        futures::stream::iter(paths)
            .for_each_concurrent(config.workers.max(1), |path| {
                let tracker = tracker.clone();
                async move {
                    if self.shutdown.is_cancelled() {
                        tracker.record_failed(&path, &UploadError::Cancelled);
                        return;
                    }
                    match self.upload_one(&path, album, config.force).await {
                        Ok(FileOutcome::Uploaded {
                            file_id,
                            encrypted_bytes,
                        }) => tracker.record_uploaded(&path, file_id, encrypted_bytes),
                        Ok(FileOutcome::Skipped { file_id }) => {
                            tracker.record_skipped(&path, file_id)
                        }
                        Err(error) => tracker.record_failed(&path, &error),
                    }
                }
            })
            .await;

        tracker.summary()
    }

    /// The full pipeline for one file. Every scratch resource lives in a
    /// scoped temp directory that is removed on all exit paths.
    pub async fn upload_one(
        &self,
        path: &Path,
        album: &Album,
        force: bool,
    ) -> Result<FileOutcome, UploadError> {
        self.ensure_active()?;

        processor::validate(path)?;
        let hash = {
            let path = path.to_path_buf();
            run_blocking(move || processor::compute_hash(&path)).await??
        };
        debug!(path = %path.display(), hash = %hash, "hashed");

        if !force {
            if let Some(entry) = self.store.lookup_hash(&hash)? {
                return Ok(FileOutcome::Skipped {
                    file_id: entry.file_id,
                });
            }
        }

        let metadata = {
            let path = path.to_path_buf();
            run_blocking(move || processor::extract_metadata(&path)).await??
        };
        let thumb_plain = self.thumbnailer.thumbnail(path).await?;
        self.ensure_active()?;

        // Scratch directory holding the encrypted payload; dropped (and
        // deleted) when this function returns, success or not.
        let scratch = tempfile::Builder::new().prefix("obscura-upload-").tempdir()?;

        let file_key = SecretKey::generate();
        let (sealed_key, key_nonce) = wrap::seal(file_key.as_bytes(), &album.key)?;

        let encrypted_path = scratch.path().join("payload.enc");
        let (file_header, encrypted_size) = {
            let source = path.to_path_buf();
            let dest = encrypted_path.clone();
            let key = file_key.clone();
            run_blocking(move || stream::encrypt_file(&source, &dest, &key)).await??
        };

        let (thumb_cipher, thumb_header) = stream::encrypt_bytes(&thumb_plain, &file_key)?;
        let metadata_json = serde_json::to_vec(&metadata)?;
        let (metadata_cipher, metadata_header) =
            stream::encrypt_bytes(&metadata_json, &file_key)?;

        self.ensure_active()?;
        let file_object_key = self
            .upload_encrypted_file(&encrypted_path, encrypted_size)
            .await?;

        let thumb_size = thumb_cipher.len() as u64;
        let thumb_object_key = self.upload_small_blob(thumb_cipher).await?;

        self.ensure_active()?;
        let committed = self
            .api
            .create_file(CreateFileRequest {
                collection_id: album.id,
                encrypted_key: BASE64.encode(sealed_key),
                key_decryption_nonce: BASE64.encode(key_nonce),
                file: FileAttributes {
                    object_key: file_object_key,
                    decryption_header: BASE64.encode(file_header),
                    size: encrypted_size,
                },
                thumbnail: FileAttributes {
                    object_key: thumb_object_key,
                    decryption_header: BASE64.encode(thumb_header),
                    size: thumb_size,
                },
                metadata: MetadataAttributes {
                    encrypted_data: BASE64.encode(metadata_cipher),
                    decryption_header: BASE64.encode(metadata_header),
                },
            })
            .await?;

        // Dedup bookkeeping only; the commit already succeeded, so a
        // write failure here costs future dedup, not correctness.
        if let Err(error) = self.store.record_hash(
            &hash,
            &HashEntry {
                file_id: committed.id,
                collection_id: album.id,
            },
        ) {
            warn!(%error, hash = %hash, "failed to record hash after commit");
        }

        drop(scratch);
        Ok(FileOutcome::Uploaded {
            file_id: committed.id,
            encrypted_bytes: encrypted_size + thumb_size,
        })
    }

    /// Route an encrypted payload to single-PUT or multipart based on its
    /// size, returning the server-assigned object key.
    async fn upload_encrypted_file(
        &self,
        path: &Path,
        size: u64,
    ) -> Result<String, UploadError> {
        if size < remote::MULTIPART_THRESHOLD {
            let bytes = tokio::fs::read(path).await?;
            return self.upload_small_blob(bytes).await;
        }

        let ranges = remote::part_ranges(size, remote::PART_SIZE);

        // First pass: MD5 every part, which the URL request needs up front.
        let mut part_md5s = Vec::with_capacity(ranges.len());
        for &(offset, length) in &ranges {
            let part = read_file_range(path, offset, length).await?;
            part_md5s.push(remote::content_md5(&part));
        }

        let targets = self
            .api
            .get_multipart_upload_urls(size, remote::PART_SIZE, part_md5s.clone())
            .await?;
        if targets.part_urls.len() != ranges.len() {
            return Err(UploadError::PartUrlMismatch {
                want: ranges.len(),
                got: targets.part_urls.len(),
            });
        }

        // Second pass: upload each part and collect its ETag, in order.
        let mut etags = Vec::with_capacity(ranges.len());
        for ((&(offset, length), url), md5) in
            ranges.iter().zip(&targets.part_urls).zip(&part_md5s)
        {
            self.ensure_active()?;
            let part = read_file_range(path, offset, length).await?;
            let etag = self.objects.put_part(url, part, md5).await?;
            etags.push(etag);
        }

        self.objects
            .complete_multipart(&targets.complete_url, &etags)
            .await?;
        Ok(targets.object_key)
    }

    /// Single-PUT upload for blobs already in memory.
    async fn upload_small_blob(&self, bytes: Vec<u8>) -> Result<String, UploadError> {
        let md5 = remote::content_md5(&bytes);
        let target = self.api.get_upload_url(bytes.len() as u64, &md5).await?;
        self.objects.put(&target.url, bytes, &md5).await?;
        Ok(target.object_key)
    }

    fn ensure_active(&self) -> Result<(), UploadError> {
        if self.shutdown.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        Ok(())
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T, UploadError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| UploadError::Io(std::io::Error::other(e)))
}

async fn read_file_range(path: &Path, offset: u64, length: u64) -> Result<Vec<u8>, UploadError> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;

    let mut buf = vec![0u8; length as usize];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}
