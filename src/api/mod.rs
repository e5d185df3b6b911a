// # Control-plane client
//
// Typed wrappers around the photo service's authenticated JSON API. The
// transport itself is opaque to the rest of the crate: callers go through
// the `ControlPlane` trait so tests can substitute an in-memory fake.

pub mod models;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;

pub use models::{
    Collection, CollectionAttributes, CollectionFileItem, CreateCollectionRequest,
    CreateFileRequest, FileAttributes, MetadataAttributes, MultipartUploadUrls, RemoteFile,
    UploadUrl,
};

const AUTH_HEADER: &str = "X-Auth-Token";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Control-plane operations the upload and watch pipelines depend on.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn get_collections(&self) -> Result<Vec<Collection>, ApiError>;

    async fn create_collection(
        &self,
        request: CreateCollectionRequest,
    ) -> Result<Collection, ApiError>;

    /// Pre-signed URL for a single-PUT upload of `content_length` bytes.
    async fn get_upload_url(
        &self,
        content_length: u64,
        content_md5: &str,
    ) -> Result<UploadUrl, ApiError>;

    /// Pre-signed URLs for a multipart upload, one per part, in part order.
    async fn get_multipart_upload_urls(
        &self,
        content_length: u64,
        part_length: u64,
        part_md5s: Vec<String>,
    ) -> Result<MultipartUploadUrls, ApiError>;

    /// Commit a catalog entry. Only called after every referenced blob has
    /// been uploaded.
    async fn create_file(&self, request: CreateFileRequest) -> Result<RemoteFile, ApiError>;

    async fn get_file(&self, collection_id: i64, file_id: i64) -> Result<RemoteFile, ApiError>;

    async fn add_files_to_collection(
        &self,
        collection_id: i64,
        files: Vec<CollectionFileItem>,
    ) -> Result<(), ApiError>;
}

/// HTTP implementation of [`ControlPlane`].
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: String,
}

// Response wrappers

#[derive(serde::Deserialize)]
struct CollectionsResponse {
    collections: Vec<Collection>,
}

#[derive(serde::Deserialize)]
struct CollectionResponse {
    collection: Collection,
}

#[derive(serde::Deserialize)]
struct FileResponse {
    file: RemoteFile,
}

impl ApiClient {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header(AUTH_HEADER, &self.token)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(AUTH_HEADER, &self.token)
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// POST where only success matters; tolerates an empty response body.
    async fn post_no_content(&self, path: &str, body: &serde_json::Value) -> Result<(), ApiError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(AUTH_HEADER, &self.token)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Server {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Read the body once, mapping non-2xx responses to a server error
    /// that keeps the status and payload for the operator.
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ControlPlane for ApiClient {
    async fn get_collections(&self) -> Result<Vec<Collection>, ApiError> {
        let response: CollectionsResponse = self.get_json("/collections").await?;
        Ok(response.collections)
    }

    async fn create_collection(
        &self,
        request: CreateCollectionRequest,
    ) -> Result<Collection, ApiError> {
        tracing::debug!(kind = %request.kind, "creating collection");
        let body = serde_json::to_value(&request)?;
        let response: CollectionResponse = self.post_json("/collections", &body).await?;
        Ok(response.collection)
    }

    async fn get_upload_url(
        &self,
        content_length: u64,
        content_md5: &str,
    ) -> Result<UploadUrl, ApiError> {
        let body = json!({
            "content_length": content_length,
            "content_md5": content_md5,
        });
        self.post_json("/files/upload-url", &body).await
    }

    async fn get_multipart_upload_urls(
        &self,
        content_length: u64,
        part_length: u64,
        part_md5s: Vec<String>,
    ) -> Result<MultipartUploadUrls, ApiError> {
        let body = json!({
            "content_length": content_length,
            "part_length": part_length,
            "part_md5s": part_md5s,
        });
        self.post_json("/files/multipart-upload-urls", &body).await
    }

    async fn create_file(&self, request: CreateFileRequest) -> Result<RemoteFile, ApiError> {
        let body = serde_json::to_value(&request)?;
        let response: FileResponse = self.post_json("/files", &body).await?;
        Ok(response.file)
    }

    async fn get_file(&self, collection_id: i64, file_id: i64) -> Result<RemoteFile, ApiError> {
        let response: FileResponse = self
            .get_json(&format!("/collections/{}/files/{}", collection_id, file_id))
            .await?;
        Ok(response.file)
    }

    async fn add_files_to_collection(
        &self,
        collection_id: i64,
        files: Vec<CollectionFileItem>,
    ) -> Result<(), ApiError> {
        let body = json!({ "files": files });
        self.post_no_content(&format!("/collections/{}/files", collection_id), &body)
            .await
    }
}
