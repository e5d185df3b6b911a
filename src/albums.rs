// # Album resolver
//
// Find-or-create for albums. The server only ever sees sealed keys and
// names, so "find" means walking the collection list and opening each
// candidate's key with the master key, then its name with the collection
// key. Entries that fail to open are skipped rather than fatal: other
// clients may hold collections this account's master key cannot open.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;
use tracing::{debug, info};

use crate::api::{
    Collection, CollectionAttributes, ControlPlane, CreateCollectionRequest,
};
use crate::crypto::{wrap, SecretKey};

/// Album used when no explicit album applies.
pub const DEFAULT_ALBUM_NAME: &str = "CLI Uploads";

const COLLECTION_KIND_ALBUM: &str = "album";
const COLLECTION_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum AlbumError {
    #[error("album not found: {0}")]
    NotFound(String),
    #[error("collection {0} is not accessible with this account's keys")]
    Inaccessible(i64),
    #[error(transparent)]
    Api(#[from] crate::api::ApiError),
    #[error(transparent)]
    Wrap(#[from] wrap::WrapError),
}

/// A resolved album: catalog id, plaintext name, opened collection key.
#[derive(Clone)]
pub struct Album {
    pub id: i64,
    pub name: String,
    pub key: SecretKey,
}

/// Resolves album names to collections, opening keys with the master key.
#[derive(Clone)]
pub struct AlbumResolver {
    api: Arc<dyn ControlPlane>,
    master_key: SecretKey,
}

impl AlbumResolver {
    pub fn new(api: Arc<dyn ControlPlane>, master_key: SecretKey) -> Self {
        Self { api, master_key }
    }

    /// Find the album named `name`, creating it when allowed.
    pub async fn get_or_create(
        &self,
        name: &str,
        create_if_missing: bool,
    ) -> Result<Album, AlbumError> {
        if let Some(album) = self.find(name).await? {
            return Ok(album);
        }
        if !create_if_missing {
            return Err(AlbumError::NotFound(name.to_string()));
        }
        self.create(name).await
    }

    /// Open the collection key for a known collection id (lookup only).
    pub async fn collection_key(&self, collection_id: i64) -> Result<SecretKey, AlbumError> {
        let collections = self.api.get_collections().await?;
        let collection = collections
            .iter()
            .find(|c| c.id == collection_id && !c.is_deleted)
            .ok_or(AlbumError::Inaccessible(collection_id))?;

        self.open_collection_key(collection)
            .ok_or(AlbumError::Inaccessible(collection_id))
    }

    async fn find(&self, name: &str) -> Result<Option<Album>, AlbumError> {
        let collections = self.api.get_collections().await?;

        for collection in collections.iter().filter(|c| !c.is_deleted) {
            let Some(key) = self.open_collection_key(collection) else {
                debug!(id = collection.id, "skipping collection: key does not open");
                continue;
            };
            let Some(plain_name) = open_collection_name(collection, &key) else {
                debug!(id = collection.id, "skipping collection: name does not open");
                continue;
            };

            if plain_name == name {
                return Ok(Some(Album {
                    id: collection.id,
                    name: plain_name,
                    key,
                }));
            }
        }

        Ok(None)
    }

    async fn create(&self, name: &str) -> Result<Album, AlbumError> {
        let key = SecretKey::generate();

        let (sealed_key, key_nonce) = wrap::seal(key.as_bytes(), &self.master_key)?;
        let (sealed_name, name_nonce) = wrap::seal(name.as_bytes(), &key)?;

        let created = self
            .api
            .create_collection(CreateCollectionRequest {
                encrypted_key: BASE64.encode(sealed_key),
                key_decryption_nonce: BASE64.encode(key_nonce),
                encrypted_name: BASE64.encode(sealed_name),
                name_decryption_nonce: BASE64.encode(name_nonce),
                kind: COLLECTION_KIND_ALBUM.to_string(),
                attributes: CollectionAttributes {
                    version: COLLECTION_VERSION,
                },
            })
            .await?;

        info!(album = name, id = created.id, "created album");
        Ok(Album {
            id: created.id,
            name: name.to_string(),
            key,
        })
    }

    fn open_collection_key(&self, collection: &Collection) -> Option<SecretKey> {
        let sealed = BASE64.decode(&collection.encrypted_key).ok()?;
        let nonce = BASE64.decode(&collection.key_decryption_nonce).ok()?;
        let plain = wrap::open(&sealed, &nonce, &self.master_key).ok()?;
        SecretKey::from_bytes(&plain).ok()
    }
}

fn open_collection_name(collection: &Collection, key: &SecretKey) -> Option<String> {
    let sealed = BASE64.decode(&collection.encrypted_name).ok()?;
    let nonce = BASE64.decode(&collection.name_decryption_nonce).ok()?;
    let plain = wrap::open(&sealed, &nonce, key).ok()?;
    String::from_utf8(plain).ok()
}
