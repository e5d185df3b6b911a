// # State store
//
// Embedded key-value state shared by the upload and watch pipelines,
// organized into named buckets (sled trees) per account:
//
// - `fileHashes`: content hash -> catalog location, the dedup index.
// - `watchStates` / `watchFiles`: watch-mode persistence, keyed by the
//   lowercase hex of the absolute path.
// - `kvConfig`: schema markers and small config values.
// - `remoteAlbums`, `remoteFiles`, `remoteAlbumEntries`, `uploadStates`:
//   reserved bucket names kept in the schema for compatibility.
//
// `fileHashes` values predating the structured record are bare decimal
// file ids; readers fall back to that form, writers always emit the
// structured record.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BUCKET_KV_CONFIG: &str = "kvConfig";
pub const BUCKET_REMOTE_ALBUMS: &str = "remoteAlbums";
pub const BUCKET_REMOTE_FILES: &str = "remoteFiles";
pub const BUCKET_REMOTE_ALBUM_ENTRIES: &str = "remoteAlbumEntries";
pub const BUCKET_UPLOAD_STATES: &str = "uploadStates";
pub const BUCKET_FILE_HASHES: &str = "fileHashes";
pub const BUCKET_WATCH_STATES: &str = "watchStates";
pub const BUCKET_WATCH_FILES: &str = "watchFiles";

const ALL_BUCKETS: &[&str] = &[
    BUCKET_KV_CONFIG,
    BUCKET_REMOTE_ALBUMS,
    BUCKET_REMOTE_FILES,
    BUCKET_REMOTE_ALBUM_ENTRIES,
    BUCKET_UPLOAD_STATES,
    BUCKET_FILE_HASHES,
    BUCKET_WATCH_STATES,
    BUCKET_WATCH_FILES,
];

const SCHEMA_VERSION_KEY: &str = "schemaVersion";
const SCHEMA_VERSION: &str = "2";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("state database error: {0}")]
    Db(#[from] sled::Error),
    #[error("state record decode failed: {0}")]
    Decode(String),
}

/// Where a previously uploaded file lives in the catalog.
/// `collection_id` is zero for legacy entries written before the
/// structured format carried it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashEntry {
    pub file_id: i64,
    #[serde(default)]
    pub collection_id: i64,
}

/// Album routing mode for a watched directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatchMode {
    /// Everything goes to the default album.
    Default,
    /// Everything goes to one user-named album.
    Specified,
    /// Each first-level directory becomes its own album.
    FolderAlbums,
}

/// Persisted state for one watched root, restored across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchState {
    pub root: PathBuf,
    pub mode: WatchMode,
    pub album_name: Option<String>,
    pub workers: usize,
    pub debounce_ms: u64,
    pub started_at: i64,
    pub last_processed_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessedStatus {
    Processing,
    Uploaded,
    Duplicate,
    Failed,
}

/// Outcome record for a file handled by the watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedFile {
    pub path: PathBuf,
    pub hash: String,
    pub file_id: Option<i64>,
    pub collection_id: Option<i64>,
    pub processed_at: i64,
    pub status: ProcessedStatus,
    #[serde(default)]
    pub error: Option<String>,
}

/// Handle to the on-disk state database. Cheap to clone; sled serializes
/// writers per tree internally.
#[derive(Clone)]
pub struct StateStore {
    db: sled::Db,
}

impl StateStore {
    /// Open (or create) the state database under `dir`, making sure every
    /// named bucket exists and the schema marker is set.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let db = sled::open(dir.join("state.db"))?;
        for bucket in ALL_BUCKETS {
            db.open_tree(bucket)?;
        }

        let config = db.open_tree(BUCKET_KV_CONFIG)?;
        if config.get(SCHEMA_VERSION_KEY)?.is_none() {
            config.insert(SCHEMA_VERSION_KEY, SCHEMA_VERSION)?;
        }

        Ok(StateStore { db })
    }

    fn tree(&self, name: &str) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(name)?)
    }

    /// Key used for per-path buckets: lowercase hex of the absolute path.
    pub fn path_key(path: &Path) -> String {
        hex::encode(path.to_string_lossy().as_bytes())
    }

    // fileHashes

    /// Look up a content hash. Decodes the structured record, falling back
    /// to the legacy bare-decimal file id form.
    pub fn lookup_hash(&self, hash: &str) -> Result<Option<HashEntry>, StoreError> {
        let Some(raw) = self.tree(BUCKET_FILE_HASHES)?.get(hash)? else {
            return Ok(None);
        };

        if let Ok(entry) = serde_json::from_slice::<HashEntry>(&raw) {
            return Ok(Some(entry));
        }

        let text = String::from_utf8_lossy(&raw);
        let file_id = text.trim().parse::<i64>().map_err(|_| {
            StoreError::Decode(format!("unrecognized hash entry for {}: {:?}", hash, text))
        })?;
        Ok(Some(HashEntry {
            file_id,
            collection_id: 0,
        }))
    }

    /// Record a content hash after a successful commit. Always writes the
    /// structured form; overwriting an equal value is harmless.
    pub fn record_hash(&self, hash: &str, entry: &HashEntry) -> Result<(), StoreError> {
        let value = serde_json::to_vec(entry)
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        self.tree(BUCKET_FILE_HASHES)?.insert(hash, value)?;
        Ok(())
    }

    // watchStates

    pub fn load_watch_state(&self, root: &Path) -> Result<Option<WatchState>, StoreError> {
        let Some(raw) = self
            .tree(BUCKET_WATCH_STATES)?
            .get(Self::path_key(root))?
        else {
            return Ok(None);
        };
        let state =
            serde_json::from_slice(&raw).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(Some(state))
    }

    pub fn save_watch_state(&self, state: &WatchState) -> Result<(), StoreError> {
        let value =
            serde_json::to_vec(state).map_err(|e| StoreError::Decode(e.to_string()))?;
        self.tree(BUCKET_WATCH_STATES)?
            .insert(Self::path_key(&state.root), value)?;
        Ok(())
    }

    // watchFiles

    pub fn record_processed_file(&self, record: &ProcessedFile) -> Result<(), StoreError> {
        let value =
            serde_json::to_vec(record).map_err(|e| StoreError::Decode(e.to_string()))?;
        self.tree(BUCKET_WATCH_FILES)?
            .insert(Self::path_key(&record.path), value)?;
        Ok(())
    }

    pub fn load_processed_file(&self, path: &Path) -> Result<Option<ProcessedFile>, StoreError> {
        let Some(raw) = self.tree(BUCKET_WATCH_FILES)?.get(Self::path_key(path))? else {
            return Ok(None);
        };
        let record =
            serde_json::from_slice(&raw).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(Some(record))
    }

    /// Flush dirty pages to disk; used on shutdown.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, StateStore) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = StateStore::open(dir.path()).expect("Failed to open store");
        (dir, store)
    }

    #[test]
    fn test_hash_roundtrip() {
        let (_dir, store) = open_store();
        let entry = HashEntry {
            file_id: 42,
            collection_id: 7,
        };

        assert!(store.lookup_hash("abc123").unwrap().is_none());
        store.record_hash("abc123", &entry).unwrap();
        assert_eq!(store.lookup_hash("abc123").unwrap(), Some(entry));
    }

    #[test]
    fn test_legacy_decimal_hash_value() {
        let (_dir, store) = open_store();

        // Simulate a value written by the pre-structured schema.
        store
            .tree(BUCKET_FILE_HASHES)
            .unwrap()
            .insert("deadbeef", b"1234".to_vec())
            .unwrap();

        let entry = store.lookup_hash("deadbeef").unwrap().unwrap();
        assert_eq!(entry.file_id, 1234);
        assert_eq!(entry.collection_id, 0);
    }

    #[test]
    fn test_garbage_hash_value_is_an_error() {
        let (_dir, store) = open_store();
        store
            .tree(BUCKET_FILE_HASHES)
            .unwrap()
            .insert("feed", b"not a number".to_vec())
            .unwrap();
        assert!(store.lookup_hash("feed").is_err());
    }

    #[test]
    fn test_rewrite_upgrades_legacy_value() {
        let (_dir, store) = open_store();
        store
            .tree(BUCKET_FILE_HASHES)
            .unwrap()
            .insert("cafe", b"99".to_vec())
            .unwrap();

        let mut entry = store.lookup_hash("cafe").unwrap().unwrap();
        entry.collection_id = 5;
        store.record_hash("cafe", &entry).unwrap();

        let raw = store
            .tree(BUCKET_FILE_HASHES)
            .unwrap()
            .get("cafe")
            .unwrap()
            .unwrap();
        let decoded: HashEntry = serde_json::from_slice(&raw).unwrap();
        assert_eq!(decoded.file_id, 99);
        assert_eq!(decoded.collection_id, 5);
    }

    #[test]
    fn test_watch_state_roundtrip() {
        let (_dir, store) = open_store();
        let state = WatchState {
            root: PathBuf::from("/photos/incoming"),
            mode: WatchMode::FolderAlbums,
            album_name: None,
            workers: 4,
            debounce_ms: 5000,
            started_at: 1_700_000_000_000_000,
            last_processed_at: None,
        };

        assert!(store
            .load_watch_state(Path::new("/photos/incoming"))
            .unwrap()
            .is_none());

        store.save_watch_state(&state).unwrap();
        let loaded = store
            .load_watch_state(Path::new("/photos/incoming"))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.root, state.root);
        assert_eq!(loaded.mode, WatchMode::FolderAlbums);
        assert_eq!(loaded.debounce_ms, 5000);
    }

    #[test]
    fn test_path_key_is_lowercase_hex() {
        let key = StateStore::path_key(Path::new("/Watch/Root"));
        assert_eq!(key, hex::encode("/Watch/Root"));
        assert_eq!(key, key.to_lowercase());
    }

    #[test]
    fn test_processed_file_roundtrip() {
        let (_dir, store) = open_store();
        let record = ProcessedFile {
            path: PathBuf::from("/photos/a.jpg"),
            hash: "ff00".into(),
            file_id: Some(7),
            collection_id: Some(3),
            processed_at: 1_700_000_000_000_000,
            status: ProcessedStatus::Uploaded,
            error: None,
        };

        store.record_processed_file(&record).unwrap();
        let loaded = store
            .load_processed_file(Path::new("/photos/a.jpg"))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.status, ProcessedStatus::Uploaded);
        assert_eq!(loaded.file_id, Some(7));
    }
}
