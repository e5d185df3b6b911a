// # Duplicate handler
//
// Attaches an already-uploaded file to another album without touching
// its bytes: the sealed file key from the original collection is opened
// with that collection's key and re-sealed under the target collection's
// key, then the existing catalog file is added to the target. Blob,
// stream headers, thumbnail and metadata stay exactly as committed.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;
use tracing::{debug, warn};

use crate::albums::{Album, AlbumResolver};
use crate::api::{CollectionFileItem, ControlPlane};
use crate::crypto::wrap;
use crate::store::{HashEntry, StateStore};

#[derive(Error, Debug)]
pub enum DuplicateError {
    #[error("catalog entry for file {0} is missing its sealed key")]
    MalformedEntry(i64),
    #[error(transparent)]
    Api(#[from] crate::api::ApiError),
    #[error(transparent)]
    Album(#[from] crate::albums::AlbumError),
    #[error(transparent)]
    Wrap(#[from] wrap::WrapError),
    #[error(transparent)]
    State(#[from] crate::store::StoreError),
}

/// How a known content hash was reconciled with the target album.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateOutcome {
    /// The file already belongs to the target album; nothing to do.
    AlreadyPresent { file_id: i64 },
    /// The file was added to the target album via key re-wrap.
    AddedToAlbum { file_id: i64 },
}

/// Re-wraps existing catalog files into new albums.
#[derive(Clone)]
pub struct DuplicateHandler {
    api: Arc<dyn ControlPlane>,
    resolver: AlbumResolver,
    store: StateStore,
}

impl DuplicateHandler {
    pub fn new(api: Arc<dyn ControlPlane>, resolver: AlbumResolver, store: StateStore) -> Self {
        Self {
            api,
            resolver,
            store,
        }
    }

    /// Attach the catalog file recorded in `entry` to `target`.
    ///
    /// Legacy hash entries carry no collection id; those files cannot be
    /// re-wrapped (their origin collection is unknown) and are treated as
    /// already present.
    pub async fn attach_existing(
        &self,
        hash: &str,
        entry: &HashEntry,
        target: &Album,
    ) -> Result<DuplicateOutcome, DuplicateError> {
        if entry.collection_id == target.id {
            debug!(file_id = entry.file_id, album = %target.name, "duplicate already in album");
            return Ok(DuplicateOutcome::AlreadyPresent {
                file_id: entry.file_id,
            });
        }

        if entry.collection_id == 0 {
            warn!(
                file_id = entry.file_id,
                "legacy hash entry has no origin collection; skipping re-wrap"
            );
            return Ok(DuplicateOutcome::AlreadyPresent {
                file_id: entry.file_id,
            });
        }

        let remote = self.api.get_file(entry.collection_id, entry.file_id).await?;

        let sealed = BASE64
            .decode(&remote.encrypted_key)
            .map_err(|_| DuplicateError::MalformedEntry(entry.file_id))?;
        let nonce = BASE64
            .decode(&remote.key_decryption_nonce)
            .map_err(|_| DuplicateError::MalformedEntry(entry.file_id))?;

        let origin_key = self.resolver.collection_key(entry.collection_id).await?;
        let file_key = wrap::open(&sealed, &nonce, &origin_key)?;

        let (new_sealed, new_nonce) = wrap::seal(&file_key, &target.key)?;
        self.api
            .add_files_to_collection(
                target.id,
                vec![CollectionFileItem {
                    id: entry.file_id,
                    encrypted_key: BASE64.encode(new_sealed),
                    key_decryption_nonce: BASE64.encode(new_nonce),
                }],
            )
            .await?;

        // Future lookups should route this hash to the album it was most
        // recently attached to.
        self.store.record_hash(
            hash,
            &HashEntry {
                file_id: entry.file_id,
                collection_id: target.id,
            },
        )?;

        debug!(file_id = entry.file_id, album = %target.name, "re-wrapped duplicate into album");
        Ok(DuplicateOutcome::AddedToAlbum {
            file_id: entry.file_id,
        })
    }
}
