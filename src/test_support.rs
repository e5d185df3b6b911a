// Test support utilities for both unit and integration tests

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::api::{
    ApiError, Collection, CollectionAttributes, CollectionFileItem, ControlPlane,
    CreateCollectionRequest, CreateFileRequest, MultipartUploadUrls, RemoteFile, UploadUrl,
};
use crate::crypto::{wrap, SecretKey};
use crate::remote::{ObjectStore, RemoteError};
use crate::thumbnail::{ThumbnailError, Thumbnailer};

/// In-memory control plane for testing.
///
/// Implements enough catalog semantics for the pipelines: collections
/// with sealed keys/names, server-assigned ids, per-collection sealed
/// file keys, and pre-signed URL issuance. Call counters let tests
/// assert how often endpoints were hit.
pub struct MockControlPlane {
    master_key: SecretKey,
    state: Mutex<MockCatalog>,
}

#[derive(Default)]
struct MockCatalog {
    collections: Vec<Collection>,
    // (collection_id, file_id) -> sealed catalog entry
    files: HashMap<(i64, i64), RemoteFile>,
    next_collection_id: i64,
    next_file_id: i64,
    urls_issued: u64,
    create_file_calls: usize,
    add_files_calls: Vec<(i64, Vec<CollectionFileItem>)>,
    multipart_requests: Vec<(u64, u64, Vec<String>)>,
}

impl Default for MockControlPlane {
    fn default() -> Self {
        Self {
            master_key: SecretKey::generate(),
            state: Mutex::new(MockCatalog {
                next_collection_id: 1,
                next_file_id: 1,
                ..MockCatalog::default()
            }),
        }
    }
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// The master key that opens every collection created through this
    /// mock. Hand it to the `AlbumResolver` under test.
    pub fn master_key(&self) -> SecretKey {
        self.master_key.clone()
    }

    /// Insert a collection sealed under an unrelated master key, like one
    /// shared by another account.
    pub fn insert_foreign_collection(&self, name: &str) {
        let foreign_master = SecretKey::generate();
        let key = SecretKey::generate();
        let (sealed_key, key_nonce) =
            wrap::seal(key.as_bytes(), &foreign_master).expect("seal should succeed");
        let (sealed_name, name_nonce) =
            wrap::seal(name.as_bytes(), &key).expect("seal should succeed");

        let mut state = self.state.lock().unwrap();
        let id = state.next_collection_id;
        state.next_collection_id += 1;
        state.collections.push(Collection {
            id,
            kind: "album".to_string(),
            encrypted_key: BASE64.encode(sealed_key),
            key_decryption_nonce: BASE64.encode(key_nonce),
            encrypted_name: BASE64.encode(sealed_name),
            name_decryption_nonce: BASE64.encode(name_nonce),
            is_deleted: false,
        });
    }

    pub fn collection_count(&self) -> usize {
        self.state.lock().unwrap().collections.len()
    }

    pub fn create_file_calls(&self) -> usize {
        self.state.lock().unwrap().create_file_calls
    }

    pub fn add_files_calls(&self) -> Vec<(i64, Vec<CollectionFileItem>)> {
        self.state.lock().unwrap().add_files_calls.clone()
    }

    pub fn multipart_requests(&self) -> Vec<(u64, u64, Vec<String>)> {
        self.state.lock().unwrap().multipart_requests.clone()
    }

    pub fn file(&self, collection_id: i64, file_id: i64) -> Option<RemoteFile> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&(collection_id, file_id))
            .cloned()
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn get_collections(&self) -> Result<Vec<Collection>, ApiError> {
        Ok(self.state.lock().unwrap().collections.clone())
    }

    async fn create_collection(
        &self,
        request: CreateCollectionRequest,
    ) -> Result<Collection, ApiError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_collection_id;
        state.next_collection_id += 1;

        let collection = Collection {
            id,
            kind: request.kind,
            encrypted_key: request.encrypted_key,
            key_decryption_nonce: request.key_decryption_nonce,
            encrypted_name: request.encrypted_name,
            name_decryption_nonce: request.name_decryption_nonce,
            is_deleted: false,
        };
        state.collections.push(collection.clone());
        Ok(collection)
    }

    async fn get_upload_url(
        &self,
        _content_length: u64,
        _content_md5: &str,
    ) -> Result<UploadUrl, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.urls_issued += 1;
        let n = state.urls_issued;
        Ok(UploadUrl {
            url: format!("mock://object/{}", n),
            object_key: format!("obj-{}", n),
        })
    }

    async fn get_multipart_upload_urls(
        &self,
        content_length: u64,
        part_length: u64,
        part_md5s: Vec<String>,
    ) -> Result<MultipartUploadUrls, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.urls_issued += 1;
        let n = state.urls_issued;
        state
            .multipart_requests
            .push((content_length, part_length, part_md5s.clone()));

        Ok(MultipartUploadUrls {
            object_key: format!("obj-{}", n),
            part_urls: (1..=part_md5s.len())
                .map(|part| format!("mock://part/{}/{}", n, part))
                .collect(),
            complete_url: format!("mock://complete/{}", n),
        })
    }

    async fn create_file(&self, request: CreateFileRequest) -> Result<RemoteFile, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.create_file_calls += 1;

        let id = state.next_file_id;
        state.next_file_id += 1;

        let file = RemoteFile {
            id,
            collection_id: request.collection_id,
            encrypted_key: request.encrypted_key,
            key_decryption_nonce: request.key_decryption_nonce,
            file: Some(request.file),
            thumbnail: Some(request.thumbnail),
            metadata: Some(request.metadata),
        };
        state.files.insert((request.collection_id, id), file.clone());
        Ok(file)
    }

    async fn get_file(&self, collection_id: i64, file_id: i64) -> Result<RemoteFile, ApiError> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&(collection_id, file_id))
            .cloned()
            .ok_or(ApiError::Server {
                status: 404,
                body: format!("no file {} in collection {}", file_id, collection_id),
            })
    }

    async fn add_files_to_collection(
        &self,
        collection_id: i64,
        files: Vec<CollectionFileItem>,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();

        for item in &files {
            // The original entry keeps its blobs; only the sealed key and
            // collection binding differ in the new membership row.
            let existing = state
                .files
                .iter()
                .find(|((_, fid), _)| *fid == item.id)
                .map(|(_, file)| file.clone());

            let Some(original) = existing else {
                return Err(ApiError::Server {
                    status: 404,
                    body: format!("unknown file {}", item.id),
                });
            };

            state.files.insert(
                (collection_id, item.id),
                RemoteFile {
                    collection_id,
                    encrypted_key: item.encrypted_key.clone(),
                    key_decryption_nonce: item.key_decryption_nonce.clone(),
                    ..original
                },
            );
        }

        state.add_files_calls.push((collection_id, files));
        Ok(())
    }
}

/// Mock object storage: stores uploads in memory, keyed by URL.
#[derive(Default)]
pub struct MockObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    completions: Mutex<Vec<(String, Vec<String>)>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, url: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(url).cloned()
    }

    pub fn objects(&self) -> HashMap<String, Vec<u8>> {
        self.objects.lock().unwrap().clone()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn total_bytes(&self) -> usize {
        self.objects.lock().unwrap().values().map(Vec::len).sum()
    }

    /// Completion calls observed, each the completion URL plus the ETags
    /// in posted order.
    pub fn completions(&self) -> Vec<(String, Vec<String>)> {
        self.completions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn put(&self, url: &str, body: Vec<u8>, _md5: &str) -> Result<(), RemoteError> {
        self.objects.lock().unwrap().insert(url.to_string(), body);
        Ok(())
    }

    async fn put_part(&self, url: &str, body: Vec<u8>, md5: &str) -> Result<String, RemoteError> {
        self.objects.lock().unwrap().insert(url.to_string(), body);
        Ok(format!("\"{}\"", md5))
    }

    async fn complete_multipart(&self, url: &str, etags: &[String]) -> Result<(), RemoteError> {
        self.completions
            .lock()
            .unwrap()
            .push((url.to_string(), etags.to_vec()));
        Ok(())
    }
}

/// Thumbnailer that never shells out: returns a small fixed JPEG-ish
/// buffer for any path.
#[derive(Default)]
pub struct MockThumbnailer;

#[async_trait]
impl Thumbnailer for MockThumbnailer {
    async fn thumbnail(&self, _path: &Path) -> Result<Vec<u8>, ThumbnailError> {
        let mut bytes = vec![0xff, 0xd8, 0xff, 0xe0];
        bytes.extend_from_slice(&[0x11; 512]);
        Ok(bytes)
    }
}
