// # Watch orchestrator
//
// Long-running mode: observe a directory tree, wait for files to finish
// being written (debounce), route each image to an album per the
// configured mode, and hand it to the duplicate handler or the upload
// pipeline. State survives restarts through the `watchStates` and
// `watchFiles` buckets.
//
// Album routing:
// - Default: everything lands in "CLI Uploads".
// - Specified: everything lands in one user-named album.
// - FolderAlbums: the file's parent directory path relative to the watch
//   root becomes the album name (sanitized); files directly under the
//   root land in "CLI Uploads".

mod debounce;
mod watcher;

pub use debounce::Debouncer;
pub use watcher::DirectoryWatcher;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use notify::EventKind;
use regex::Regex;
use thiserror::Error;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::albums::{Album, AlbumResolver, DEFAULT_ALBUM_NAME};
use crate::duplicates::{DuplicateHandler, DuplicateOutcome};
use crate::processor;
use crate::shutdown::ShutdownToken;
use crate::store::{
    ProcessedFile, ProcessedStatus, StateStore, WatchMode, WatchState,
};
use crate::upload::{FileOutcome, UploadError, Uploader};

/// How long shutdown waits for in-flight uploads before giving up.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default debounce window in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 5000;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("watch root is not a directory: {0}")]
    InvalidRoot(String),
    #[error("an album name is required for specified mode")]
    MissingAlbumName,
    #[error("filesystem watcher error: {0}")]
    Notify(#[from] notify::Error),
    #[error(transparent)]
    State(#[from] crate::store::StoreError),
    #[error(transparent)]
    Album(#[from] crate::albums::AlbumError),
    #[error(transparent)]
    Duplicate(#[from] crate::duplicates::DuplicateError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Validation(#[from] processor::ProcessorError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invocation options for one watch run.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub root: PathBuf,
    pub mode: WatchMode,
    pub album_name: Option<String>,
    pub workers: usize,
    pub debounce_ms: u64,
    pub initial_scan: bool,
}

/// The watch service. Cheap to clone; clones share stores and clients.
#[derive(Clone)]
pub struct WatchService {
    uploader: Uploader,
    duplicates: DuplicateHandler,
    resolver: AlbumResolver,
    store: StateStore,
    shutdown: ShutdownToken,
}

impl WatchService {
    pub fn new(
        uploader: Uploader,
        duplicates: DuplicateHandler,
        resolver: AlbumResolver,
        store: StateStore,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            uploader,
            duplicates,
            resolver,
            store,
            shutdown,
        }
    }

    /// Watch until cancelled, then drain in-flight work and persist state.
    pub async fn run(&self, options: WatchOptions) -> Result<(), WatchError> {
        let root = options.root.canonicalize().map_err(|_| {
            WatchError::InvalidRoot(options.root.display().to_string())
        })?;
        if !root.is_dir() {
            return Err(WatchError::InvalidRoot(root.display().to_string()));
        }
        if options.mode == WatchMode::Specified && options.album_name.is_none() {
            return Err(WatchError::MissingAlbumName);
        }

        let state = Arc::new(Mutex::new(self.load_or_create_state(&root, &options)?));
        self.store
            .save_watch_state(&state.lock().unwrap().clone())?;

        let mut watcher = DirectoryWatcher::new()?;
        let subscribed = watcher.subscribe_tree(&root)?;
        info!(root = %root.display(), dirs = subscribed, "watching");

        let (debouncer, mut due) =
            Debouncer::new(Duration::from_millis(options.debounce_ms.max(1)));

        if options.initial_scan {
            let found = scan_existing_images(&root, &debouncer);
            info!(files = found, "initial scan enqueued");
        }

        let runtime = WatchRuntime {
            service: self.clone(),
            route: Arc::new(RouteConfig {
                mode: options.mode,
                album_name: options.album_name.clone(),
                root: root.clone(),
            }),
            albums: Arc::new(RwLock::new(HashMap::new())),
            processing: Arc::new(Mutex::new(HashSet::new())),
            state: Arc::clone(&state),
            slots: Arc::new(Semaphore::new(options.workers.max(1))),
        };

        let mut tasks: JoinSet<()> = JoinSet::new();
        loop {
            // Resolve the select to a plain value first; the event arm
            // needs the watcher again to subscribe new directories.
            let tick = tokio::select! {
                _ = self.shutdown.cancelled() => Tick::Shutdown,
                maybe_event = watcher.next() => Tick::Event(maybe_event),
                Some(path) = due.recv() => Tick::Dispatch(path),
                Some(_) = tasks.join_next(), if !tasks.is_empty() => Tick::Reaped,
            };

            match tick {
                Tick::Shutdown | Tick::Event(None) => break,
                Tick::Event(Some(event)) => {
                    handle_fs_event(&mut watcher, &debouncer, &event)
                }
                Tick::Dispatch(path) => {
                    let runtime = runtime.clone();
                    tasks.spawn(async move { runtime.process_path(path).await });
                }
                Tick::Reaped => {}
            }
        }

        info!("shutting down watch");
        drop(watcher);
        debouncer.stop();

        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("drain timeout reached, aborting in-flight uploads");
            tasks.abort_all();
        }

        self.store
            .save_watch_state(&state.lock().unwrap().clone())?;
        self.store.flush()?;
        Ok(())
    }

    fn load_or_create_state(
        &self,
        root: &Path,
        options: &WatchOptions,
    ) -> Result<WatchState, WatchError> {
        let state = match self.store.load_watch_state(root)? {
            Some(mut existing) => {
                // The invocation's settings win; only history is kept.
                existing.mode = options.mode;
                existing.album_name = options.album_name.clone();
                existing.workers = options.workers;
                existing.debounce_ms = options.debounce_ms;
                existing
            }
            None => WatchState {
                root: root.to_path_buf(),
                mode: options.mode,
                album_name: options.album_name.clone(),
                workers: options.workers,
                debounce_ms: options.debounce_ms,
                started_at: now_micros(),
                last_processed_at: None,
            },
        };
        Ok(state)
    }
}

/// One turn of the watch event loop.
enum Tick {
    Shutdown,
    Event(Option<notify::Event>),
    Dispatch(PathBuf),
    Reaped,
}

struct RouteConfig {
    mode: WatchMode,
    album_name: Option<String>,
    root: PathBuf,
}

impl RouteConfig {
    fn album_name_for(&self, path: &Path) -> String {
        match self.mode {
            WatchMode::Default => DEFAULT_ALBUM_NAME.to_string(),
            WatchMode::Specified => self
                .album_name
                .clone()
                .unwrap_or_else(|| DEFAULT_ALBUM_NAME.to_string()),
            WatchMode::FolderAlbums => folder_album_name(&self.root, path),
        }
    }
}

/// Shared context handed to every per-path task.
#[derive(Clone)]
struct WatchRuntime {
    service: WatchService,
    route: Arc<RouteConfig>,
    albums: Arc<RwLock<HashMap<String, Album>>>,
    processing: Arc<Mutex<HashSet<PathBuf>>>,
    state: Arc<Mutex<WatchState>>,
    slots: Arc<Semaphore>,
}

impl WatchRuntime {
    async fn process_path(self, path: PathBuf) {
        // Per-path lock: duplicate events that slipped past the debouncer
        // must not process the same file concurrently.
        if !self.processing.lock().unwrap().insert(path.clone()) {
            debug!(path = %path.display(), "already processing, dropping event");
            return;
        }

        let _slot = match self.slots.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        let result = self.process_inner(&path).await;
        self.processing.lock().unwrap().remove(&path);

        if let Err(error) = result {
            println!("  failed        {} ({})", path.display(), error);
            let record = ProcessedFile {
                path: path.clone(),
                hash: String::new(),
                file_id: None,
                collection_id: None,
                processed_at: now_micros(),
                status: ProcessedStatus::Failed,
                error: Some(error.to_string()),
            };
            if let Err(store_error) = self.service.store.record_processed_file(&record) {
                warn!(%store_error, "failed to record processing failure");
            }
        }

        self.touch_state();
    }

    async fn process_inner(&self, path: &Path) -> Result<(), WatchError> {
        if self.service.shutdown.is_cancelled() {
            return Err(UploadError::Cancelled.into());
        }

        processor::validate(path)?;

        let album_name = self.route.album_name_for(path);
        let album = self.album(&album_name).await?;

        let hash = {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || processor::compute_hash(&path))
                .await
                .map_err(|e| WatchError::Io(std::io::Error::other(e)))??
        };

        self.record(path, &hash, None, None, ProcessedStatus::Processing, None);

        if let Some(entry) = self.service.store.lookup_hash(&hash)? {
            let outcome = self
                .service
                .duplicates
                .attach_existing(&hash, &entry, &album)
                .await?;
            match outcome {
                DuplicateOutcome::AlreadyPresent { file_id } => {
                    println!("  skipped       {} (already file {})", path.display(), file_id);
                    self.record(
                        path,
                        &hash,
                        Some(file_id),
                        Some(entry.collection_id),
                        ProcessedStatus::Duplicate,
                        None,
                    );
                }
                DuplicateOutcome::AddedToAlbum { file_id } => {
                    println!(
                        "  added-to-album {} -> {} (file {})",
                        path.display(),
                        album.name,
                        file_id
                    );
                    self.record(
                        path,
                        &hash,
                        Some(file_id),
                        Some(album.id),
                        ProcessedStatus::Duplicate,
                        None,
                    );
                }
            }
            return Ok(());
        }

        match self.service.uploader.upload_one(path, &album, false).await? {
            FileOutcome::Uploaded { file_id, .. } => {
                println!("  uploaded      {} -> {} (file {})", path.display(), album.name, file_id);
                self.record(
                    path,
                    &hash,
                    Some(file_id),
                    Some(album.id),
                    ProcessedStatus::Uploaded,
                    None,
                );
            }
            FileOutcome::Skipped { file_id } => {
                // Another worker committed the same content in between.
                println!("  skipped       {} (already file {})", path.display(), file_id);
                self.record(
                    path,
                    &hash,
                    Some(file_id),
                    None,
                    ProcessedStatus::Duplicate,
                    None,
                );
            }
        }
        Ok(())
    }

    /// Album lookup through the per-run cache.
    async fn album(&self, name: &str) -> Result<Album, WatchError> {
        if let Some(album) = self.albums.read().await.get(name) {
            return Ok(album.clone());
        }

        let album = self.service.resolver.get_or_create(name, true).await?;
        self.albums
            .write()
            .await
            .insert(name.to_string(), album.clone());
        Ok(album)
    }

    fn record(
        &self,
        path: &Path,
        hash: &str,
        file_id: Option<i64>,
        collection_id: Option<i64>,
        status: ProcessedStatus,
        error: Option<String>,
    ) {
        let record = ProcessedFile {
            path: path.to_path_buf(),
            hash: hash.to_string(),
            file_id,
            collection_id,
            processed_at: now_micros(),
            status,
            error,
        };
        if let Err(store_error) = self.service.store.record_processed_file(&record) {
            warn!(%store_error, path = %path.display(), "failed to record processed file");
        }
    }

    fn touch_state(&self) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.last_processed_at = Some(now_micros());
            state.clone()
        };
        if let Err(error) = self.service.store.save_watch_state(&snapshot) {
            warn!(%error, "failed to persist watch state");
        }
    }
}

/// React to one raw filesystem event: subscribe newly created
/// directories, forward image writes to the debouncer.
fn handle_fs_event(watcher: &mut DirectoryWatcher, debouncer: &Debouncer, event: &notify::Event) {
    let created = matches!(event.kind, EventKind::Create(_));
    let relevant = created || matches!(event.kind, EventKind::Modify(_));
    if !relevant {
        return;
    }

    for path in &event.paths {
        if created && path.is_dir() {
            info!(dir = %path.display(), "discovered new directory");
            if let Err(error) = watcher.subscribe_tree(path) {
                warn!(%error, dir = %path.display(), "failed to subscribe new directory");
            }
            continue;
        }

        if path.is_file() && processor::is_image_path(path) {
            debouncer.touch(path.clone());
        }
    }
}

fn scan_existing_images(root: &Path, debouncer: &Debouncer) -> usize {
    let mut found = 0;
    for entry in walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        if processor::is_image_path(entry.path()) {
            debouncer.touch(entry.path().to_path_buf());
            found += 1;
        }
    }
    found
}

/// Folder-as-album name: the parent directory path relative to the watch
/// root, sanitized. Files directly under the root use the default album.
fn folder_album_name(root: &Path, path: &Path) -> String {
    let relative_parent = path
        .parent()
        .and_then(|parent| parent.strip_prefix(root).ok())
        .map(|rel| rel.to_string_lossy().into_owned())
        .unwrap_or_default();

    sanitize_album_name(&relative_parent)
}

/// Trim, collapse path separators and whitespace runs to single spaces;
/// empty results fall back to the default album.
fn sanitize_album_name(raw: &str) -> String {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    let separators = SEPARATORS.get_or_init(|| {
        Regex::new(r"[\s/\\]+").expect("separator pattern is valid")
    });

    let collapsed = separators.replace_all(raw, " ");
    let trimmed = collapsed.trim();
    if trimmed.is_empty() {
        DEFAULT_ALBUM_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

fn now_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}
