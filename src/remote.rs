// # Object store uploader
//
// Raw HTTP against pre-signed S3 URLs. Below the 20 MiB threshold a blob
// goes up as one PUT; at or above it, fixed 20 MiB parts (short last
// part) each get their own PUT and the collected ETags are posted as a
// CompleteMultipartUpload document. Every request carries a base64
// Content-MD5 over exactly the bytes it sends. No retries here: a
// non-200 fails the upload and the orchestrator reports it.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use md5::{Digest, Md5};
use reqwest::Client;
use thiserror::Error;

/// Encrypted sizes at or above this use the multipart path.
pub const MULTIPART_THRESHOLD: u64 = 20 * 1024 * 1024;

/// Fixed part size for multipart uploads.
pub const PART_SIZE: u64 = 20 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("object store returned {status} for {action}")]
    UnexpectedStatus { action: &'static str, status: u16 },
    #[error("object store response missing ETag header")]
    MissingEtag,
}

/// Base64 MD5 over a buffer, as sent in Content-MD5.
pub fn content_md5(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    BASE64.encode(hasher.finalize())
}

/// Byte ranges for a fixed-part-size split of `total` bytes. The last
/// part may be short; a zero-length input yields no parts.
pub fn part_ranges(total: u64, part_size: u64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    let mut offset = 0;
    while offset < total {
        let len = part_size.min(total - offset);
        ranges.push((offset, len));
        offset += len;
    }
    ranges
}

/// The CompleteMultipartUpload document: 1-based part numbers with their
/// ETags, in part order.
pub fn completion_document(etags: &[String]) -> String {
    let mut xml = String::from("<CompleteMultipartUpload>");
    for (index, etag) in etags.iter().enumerate() {
        xml.push_str(&format!(
            "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
            index + 1,
            etag
        ));
    }
    xml.push_str("</CompleteMultipartUpload>");
    xml
}

/// Pre-signed object storage operations. The pipeline only ever uploads;
/// reads happen on other devices.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Single-shot PUT of a whole blob. Success iff HTTP 200.
    async fn put(&self, url: &str, body: Vec<u8>, md5: &str) -> Result<(), RemoteError>;

    /// PUT one part of a multipart upload, returning its ETag.
    async fn put_part(&self, url: &str, body: Vec<u8>, md5: &str) -> Result<String, RemoteError>;

    /// POST the completion document listing every part's ETag in order.
    async fn complete_multipart(&self, url: &str, etags: &[String]) -> Result<(), RemoteError>;
}

/// [`ObjectStore`] over plain HTTP with pre-signed URLs.
#[derive(Clone)]
pub struct PresignedStore {
    client: Client,
}

impl PresignedStore {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for PresignedStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for PresignedStore {
    async fn put(&self, url: &str, body: Vec<u8>, md5: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .put(url)
            .header("Content-MD5", md5)
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .send()
            .await?;

        if response.status().as_u16() != 200 {
            return Err(RemoteError::UnexpectedStatus {
                action: "PUT object",
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn put_part(&self, url: &str, body: Vec<u8>, md5: &str) -> Result<String, RemoteError> {
        let response = self
            .client
            .put(url)
            .header("Content-MD5", md5)
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .send()
            .await?;

        if response.status().as_u16() != 200 {
            return Err(RemoteError::UnexpectedStatus {
                action: "PUT part",
                status: response.status().as_u16(),
            });
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|value| value.to_str().ok())
            .ok_or(RemoteError::MissingEtag)?;
        Ok(etag.to_string())
    }

    async fn complete_multipart(&self, url: &str, etags: &[String]) -> Result<(), RemoteError> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/xml")
            .body(completion_document(etags))
            .send()
            .await?;

        if response.status().as_u16() != 200 {
            return Err(RemoteError::UnexpectedStatus {
                action: "POST multipart completion",
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_md5_known_value() {
        // md5("abc") = 900150983cd24fb0d6963f7d28e17f72
        assert_eq!(content_md5(b"abc"), "kAFQmDzST7DWlj99KOF/cg==");
    }

    #[test]
    fn test_part_ranges_exact_and_short_tail() {
        assert_eq!(part_ranges(40, 20), vec![(0, 20), (20, 20)]);
        assert_eq!(part_ranges(50, 20), vec![(0, 20), (20, 20), (40, 10)]);
        assert_eq!(part_ranges(5, 20), vec![(0, 5)]);
        assert!(part_ranges(0, 20).is_empty());
    }

    #[test]
    fn test_completion_document_orders_parts() {
        let etags = vec!["\"etag-a\"".to_string(), "\"etag-b\"".to_string()];
        let xml = completion_document(&etags);
        assert_eq!(
            xml,
            "<CompleteMultipartUpload>\
             <Part><PartNumber>1</PartNumber><ETag>\"etag-a\"</ETag></Part>\
             <Part><PartNumber>2</PartNumber><ETag>\"etag-b\"</ETag></Part>\
             </CompleteMultipartUpload>"
        );
    }
}
