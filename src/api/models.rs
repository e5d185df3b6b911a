use serde::{Deserialize, Serialize};

/// A collection (album) as returned by the control plane. Key and name
/// are sealed; `key_decryption_nonce` opens `encrypted_key` under the
/// master key, `name_decryption_nonce` opens `encrypted_name` under the
/// collection key. All sealed fields are standard base64 with padding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub encrypted_key: String,
    pub key_decryption_nonce: String,
    pub encrypted_name: String,
    pub name_decryption_nonce: String,
    #[serde(default)]
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionAttributes {
    pub version: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateCollectionRequest {
    pub encrypted_key: String,
    pub key_decryption_nonce: String,
    pub encrypted_name: String,
    pub name_decryption_nonce: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: CollectionAttributes,
}

/// Pre-signed single-PUT upload target.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadUrl {
    pub url: String,
    pub object_key: String,
}

/// Pre-signed multipart upload targets: one URL per part plus the
/// completion URL the part ETags are posted to.
#[derive(Debug, Clone, Deserialize)]
pub struct MultipartUploadUrls {
    pub object_key: String,
    pub part_urls: Vec<String>,
    pub complete_url: String,
}

/// One encrypted blob referenced by a catalog entry: where it lives in
/// object storage, the stream header needed to decrypt it, and its
/// encrypted size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAttributes {
    pub object_key: String,
    pub decryption_header: String,
    pub size: u64,
}

/// Encrypted metadata travels inline in the catalog entry rather than
/// through object storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataAttributes {
    pub encrypted_data: String,
    pub decryption_header: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateFileRequest {
    pub collection_id: i64,
    pub encrypted_key: String,
    pub key_decryption_nonce: String,
    pub file: FileAttributes,
    pub thumbnail: FileAttributes,
    pub metadata: MetadataAttributes,
}

/// A committed catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: i64,
    #[serde(default)]
    pub collection_id: i64,
    pub encrypted_key: String,
    pub key_decryption_nonce: String,
    #[serde(default)]
    pub file: Option<FileAttributes>,
    #[serde(default)]
    pub thumbnail: Option<FileAttributes>,
    #[serde(default)]
    pub metadata: Option<MetadataAttributes>,
}

/// Entry in an add-files request: an existing catalog file plus its file
/// key re-sealed under the target collection's key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionFileItem {
    pub id: i64,
    pub encrypted_key: String,
    pub key_decryption_nonce: String,
}
