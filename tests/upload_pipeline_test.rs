// End-to-end upload pipeline tests against in-memory collaborators.
//
// These drive the real orchestrator (hashing, key generation, stream
// encryption, dedup, commit) with the mock control plane, object store
// and thumbnailer, then decrypt what landed in "object storage" to prove
// the committed catalog entries actually reconstruct the plaintext.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tempfile::TempDir;

use obscura::albums::AlbumResolver;
use obscura::crypto::{stream, wrap, SecretKey};
use obscura::shutdown::ShutdownToken;
use obscura::store::StateStore;
use obscura::test_support::{MockControlPlane, MockObjectStore, MockThumbnailer};
use obscura::upload::{FileOutcome, UploadConfig, Uploader};

struct Harness {
    _state_dir: TempDir,
    source_dir: TempDir,
    api: Arc<MockControlPlane>,
    objects: Arc<MockObjectStore>,
    store: StateStore,
    uploader: Uploader,
    resolver: AlbumResolver,
}

fn harness() -> Harness {
    let state_dir = TempDir::new().expect("Failed to create state dir");
    let source_dir = TempDir::new().expect("Failed to create source dir");

    let api = Arc::new(MockControlPlane::new());
    let objects = Arc::new(MockObjectStore::new());
    let store = StateStore::open(state_dir.path()).expect("Failed to open store");

    let uploader = Uploader::new(
        api.clone(),
        objects.clone(),
        Arc::new(MockThumbnailer),
        store.clone(),
        ShutdownToken::new(),
    );
    let resolver = AlbumResolver::new(api.clone(), api.master_key());

    Harness {
        _state_dir: state_dir,
        source_dir,
        api,
        objects,
        store,
        uploader,
        resolver,
    }
}

fn write_image(harness: &Harness, name: &str, contents: &[u8]) -> PathBuf {
    let path = harness.source_dir.path().join(name);
    std::fs::write(&path, contents).expect("Failed to write test file");
    path
}

/// Open the sealed file key of a committed catalog entry.
fn open_file_key(entry: &obscura::api::RemoteFile, album_key: &SecretKey) -> SecretKey {
    let sealed = BASE64.decode(&entry.encrypted_key).unwrap();
    let nonce = BASE64.decode(&entry.key_decryption_nonce).unwrap();
    let plain = wrap::open(&sealed, &nonce, album_key).expect("file key should open");
    SecretKey::from_bytes(&plain).unwrap()
}

#[tokio::test]
async fn test_single_file_uploads_and_commits() {
    let h = harness();
    let plaintext = vec![0x41u8; 100_000];
    let path = write_image(&h, "photo.jpg", &plaintext);

    let album = h.resolver.get_or_create("Test", true).await.unwrap();
    let outcome = h.uploader.upload_one(&path, &album, false).await.unwrap();

    let FileOutcome::Uploaded { file_id, .. } = outcome else {
        panic!("expected an upload, got {:?}", outcome);
    };

    // Exactly one commit, after the file and thumbnail blobs.
    assert_eq!(h.api.create_file_calls(), 1);
    assert_eq!(h.objects.object_count(), 2);

    // The committed entry reconstructs the plaintext.
    let entry = h.api.file(album.id, file_id).expect("entry should exist");
    let file_key = open_file_key(&entry, &album.key);

    let file_attrs = entry.file.as_ref().unwrap();
    let blob = h
        .objects
        .objects()
        .into_values()
        .find(|blob| blob.len() as u64 == file_attrs.size)
        .expect("file blob should be in object storage");

    let header = BASE64.decode(&file_attrs.decryption_header).unwrap();
    let mut decrypted = Vec::new();
    stream::decrypt_stream(&mut Cursor::new(&blob), &mut decrypted, &header, &file_key).unwrap();
    assert_eq!(decrypted, plaintext);

    // The stream header is not a prefix of the blob.
    assert_ne!(&blob[..header.len()], header.as_slice());

    // Metadata decrypts to the canonical object shape.
    let metadata_attrs = entry.metadata.as_ref().unwrap();
    let metadata_cipher = BASE64.decode(&metadata_attrs.encrypted_data).unwrap();
    let metadata_header = BASE64.decode(&metadata_attrs.decryption_header).unwrap();
    let metadata_json =
        stream::decrypt_bytes(&metadata_cipher, &metadata_header, &file_key).unwrap();
    let metadata: serde_json::Value = serde_json::from_slice(&metadata_json).unwrap();
    assert_eq!(metadata["title"], "photo.jpg");
    assert_eq!(metadata["file_type"], "image");
}

#[tokio::test]
async fn test_second_upload_is_skipped_and_commits_once() {
    let h = harness();
    let path = write_image(&h, "dup.jpg", b"identical bytes");
    let album = h.resolver.get_or_create("Test", true).await.unwrap();

    let first = h.uploader.upload_one(&path, &album, false).await.unwrap();
    let FileOutcome::Uploaded { file_id, .. } = first else {
        panic!("first run should upload");
    };

    let second = h.uploader.upload_one(&path, &album, false).await.unwrap();
    assert_eq!(second, FileOutcome::Skipped { file_id });

    // The catalog saw exactly one commit across both runs.
    assert_eq!(h.api.create_file_calls(), 1);
}

#[tokio::test]
async fn test_force_bypasses_dedup() {
    let h = harness();
    let path = write_image(&h, "force.jpg", b"same bytes");
    let album = h.resolver.get_or_create("Test", true).await.unwrap();

    h.uploader.upload_one(&path, &album, false).await.unwrap();
    let forced = h.uploader.upload_one(&path, &album, true).await.unwrap();

    assert!(matches!(forced, FileOutcome::Uploaded { .. }));
    assert_eq!(h.api.create_file_calls(), 2);
}

#[tokio::test]
async fn test_multipart_upload_for_large_file() {
    let h = harness();

    // 25 MiB plaintext: encrypted size crosses the 20 MiB threshold, so
    // the blob goes up as two fixed-size parts.
    let plaintext = vec![0x37u8; 25 * 1024 * 1024];
    let path = write_image(&h, "large.jpg", &plaintext);
    let album = h.resolver.get_or_create("Big", true).await.unwrap();

    let outcome = h.uploader.upload_one(&path, &album, false).await.unwrap();
    let FileOutcome::Uploaded { file_id, .. } = outcome else {
        panic!("expected an upload");
    };

    // One multipart URL request: 20 MiB parts, two part MD5s.
    let requests = h.api.multipart_requests();
    assert_eq!(requests.len(), 1);
    let (content_length, part_length, md5s) = &requests[0];
    assert_eq!(*part_length, 20 * 1024 * 1024);
    assert_eq!(md5s.len(), 2);

    // The completion listed both ETags in part order; the mock derives
    // ETags from the per-part MD5s, so order is verifiable.
    let completions = h.objects.completions();
    assert_eq!(completions.len(), 1);
    let (_, etags) = &completions[0];
    assert_eq!(etags.len(), 2);
    assert_eq!(etags[0], format!("\"{}\"", md5s[0]));
    assert_eq!(etags[1], format!("\"{}\"", md5s[1]));

    // Reassembling the parts in order yields a decryptable blob of the
    // committed size.
    let entry = h.api.file(album.id, file_id).unwrap();
    let file_attrs = entry.file.as_ref().unwrap();
    assert_eq!(*content_length, file_attrs.size);

    let objects = h.objects.objects();
    let mut blob = Vec::new();
    let mut part = 1;
    loop {
        let key = objects
            .keys()
            .find(|url| url.ends_with(&format!("/{}", part)) && url.contains("part"));
        match key {
            Some(url) => blob.extend_from_slice(&objects[url]),
            None => break,
        }
        part += 1;
    }
    assert_eq!(blob.len() as u64, file_attrs.size);

    let file_key = open_file_key(&entry, &album.key);
    let header = BASE64.decode(&file_attrs.decryption_header).unwrap();
    let mut decrypted = Vec::new();
    stream::decrypt_stream(&mut Cursor::new(&blob), &mut decrypted, &header, &file_key).unwrap();
    assert_eq!(decrypted, plaintext);
}

#[tokio::test]
async fn test_batch_contains_failures() {
    let h = harness();
    let good = write_image(&h, "ok.jpg", b"fine");
    let missing = h.source_dir.path().join("missing.jpg");
    let unsupported = write_image(&h, "notes.txt", b"not an image");

    let album = h.resolver.get_or_create("Mixed", true).await.unwrap();
    let summary = h
        .uploader
        .upload_batch(
            vec![good, missing, unsupported],
            &album,
            &UploadConfig {
                workers: 2,
                force: false,
            },
        )
        .await;

    assert_eq!(summary.total, 3);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.errors.len(), 2);
    assert!(!summary.all_succeeded());

    // The two failures did not prevent the good file's commit.
    assert_eq!(h.api.create_file_calls(), 1);
}

#[tokio::test]
async fn test_hash_recorded_after_commit() {
    let h = harness();
    let path = write_image(&h, "hashcheck.jpg", b"hash me");
    let album = h.resolver.get_or_create("Hashes", true).await.unwrap();

    let outcome = h.uploader.upload_one(&path, &album, false).await.unwrap();
    let FileOutcome::Uploaded { file_id, .. } = outcome else {
        panic!("expected an upload");
    };

    let hash = obscura::processor::compute_hash(&path).unwrap();
    let entry = h.store.lookup_hash(&hash).unwrap().expect("hash recorded");
    assert_eq!(entry.file_id, file_id);
    assert_eq!(entry.collection_id, album.id);
}
