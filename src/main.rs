use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use obscura::albums::{AlbumResolver, DEFAULT_ALBUM_NAME};
use obscura::api::ApiClient;
use obscura::config::Config;
use obscura::duplicates::DuplicateHandler;
use obscura::processor;
use obscura::remote::PresignedStore;
use obscura::shutdown::ShutdownToken;
use obscura::thumbnail::MagickThumbnailer;
use obscura::store::{StateStore, WatchMode};
use obscura::upload::{UploadConfig, Uploader};
use obscura::watch::{WatchOptions, WatchService, DEFAULT_DEBOUNCE_MS};

#[derive(Parser)]
#[command(name = "obscura", about = "End-to-end encrypted photo uploads", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt and upload image files
    Upload {
        /// Files or directories to upload
        paths: Vec<PathBuf>,
        /// Target album name
        #[arg(long)]
        album: Option<String>,
        /// Create the album if it does not exist
        #[arg(long)]
        create_album: bool,
        /// Recurse into directories
        #[arg(long)]
        recursive: bool,
        /// Concurrent upload workers
        #[arg(long, default_value_t = 4)]
        workers: usize,
        /// Upload even if the content hash is already known
        #[arg(long)]
        force: bool,
    },
    /// Watch a folder and upload images as they appear
    Watch {
        /// Folder to watch recursively
        folder: PathBuf,
        /// Route every file to this album
        #[arg(long, conflicts_with = "folder_albums")]
        album: Option<String>,
        /// Route files to albums named after their folders
        #[arg(long)]
        folder_albums: bool,
        /// Concurrent upload workers
        #[arg(long, default_value_t = 4)]
        workers: usize,
        /// Debounce window in milliseconds
        #[arg(long, default_value_t = DEFAULT_DEBOUNCE_MS)]
        debounce: u64,
        /// Enqueue images already present under the folder at startup
        #[arg(long)]
        initial_scan: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .parse_lossy("obscura=info,sled=warn,hyper=warn,reqwest=warn"),
        )
        .init();
}

/// Everything the commands share: clients, stores, resolvers.
struct AppContext {
    uploader: Uploader,
    resolver: AlbumResolver,
    duplicates: DuplicateHandler,
    store: StateStore,
    shutdown: ShutdownToken,
}

impl AppContext {
    fn build(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        std::fs::create_dir_all(&config.state_dir)?;
        let store = StateStore::open(&config.state_dir)?;

        let api = Arc::new(ApiClient::new(config.endpoint.clone(), config.token.clone()));
        let objects = Arc::new(PresignedStore::new());
        let shutdown = ShutdownToken::new();

        let resolver = AlbumResolver::new(api.clone(), config.master_key.clone());
        let uploader = Uploader::new(
            api.clone(),
            objects,
            Arc::new(MagickThumbnailer),
            store.clone(),
            shutdown.clone(),
        );
        let duplicates = DuplicateHandler::new(api, resolver.clone(), store.clone());

        Ok(Self {
            uploader,
            resolver,
            duplicates,
            store,
            shutdown,
        })
    }
}

/// Expand CLI path arguments: files pass through, directories contribute
/// their images (recursively only when asked).
fn collect_upload_paths(paths: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut collected = Vec::new();
    for path in paths {
        if path.is_dir() {
            if !recursive {
                warn!(path = %path.display(), "skipping directory (use --recursive)");
                continue;
            }
            for entry in walkdir::WalkDir::new(path)
                .follow_links(false)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
            {
                if processor::is_image_path(entry.path()) {
                    collected.push(entry.path().to_path_buf());
                }
            }
        } else {
            collected.push(path.clone());
        }
    }
    collected.sort();
    collected.dedup();
    collected
}

async fn run_upload(
    context: &AppContext,
    paths: Vec<PathBuf>,
    album: Option<String>,
    create_album: bool,
    recursive: bool,
    workers: usize,
    force: bool,
) -> ExitCode {
    let files = collect_upload_paths(&paths, recursive);
    if files.is_empty() {
        error!("nothing to upload");
        return ExitCode::FAILURE;
    }

    // Without an explicit --album everything lands in the default album,
    // which is created on demand.
    let create_if_missing = album.is_none() || create_album;
    let album_name = album.unwrap_or_else(|| DEFAULT_ALBUM_NAME.to_string());

    // Album resolution failures abort the batch: every file needs it.
    let album = match context.resolver.get_or_create(&album_name, create_if_missing).await {
        Ok(album) => album,
        Err(err) => {
            error!(album = %album_name, "album resolution failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    info!(album = %album.name, files = files.len(), workers, "starting upload");
    let summary = context
        .uploader
        .upload_batch(files, &album, &UploadConfig { workers, force })
        .await;

    println!(
        "\n{} total, {} uploaded, {} skipped, {} failed ({} bytes sent)",
        summary.total, summary.completed, summary.skipped, summary.failed, summary.uploaded_bytes
    );
    for error in &summary.errors {
        println!("  error: {}", error);
    }

    if summary.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn run_watch(
    context: &AppContext,
    folder: PathBuf,
    album: Option<String>,
    folder_albums: bool,
    workers: usize,
    debounce: u64,
    initial_scan: bool,
) -> ExitCode {
    let mode = if folder_albums {
        WatchMode::FolderAlbums
    } else if album.is_some() {
        WatchMode::Specified
    } else {
        WatchMode::Default
    };

    let service = WatchService::new(
        context.uploader.clone(),
        context.duplicates.clone(),
        context.resolver.clone(),
        context.store.clone(),
        context.shutdown.clone(),
    );

    let options = WatchOptions {
        root: folder,
        mode,
        album_name: album,
        workers,
        debounce_ms: debounce,
        initial_scan,
    };

    match service.run(options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("watch failed: {err}");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            error!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let context = match AppContext::build(&config) {
        Ok(context) => context,
        Err(err) => {
            error!("startup failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    // Ctrl-C triggers the cooperative shutdown path: workers stop at
    // their next step; watch mode cancels timers and drains uploads.
    let shutdown = context.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            shutdown.trigger();
        }
    });

    match cli.command {
        Commands::Upload {
            paths,
            album,
            create_album,
            recursive,
            workers,
            force,
        } => {
            run_upload(
                &context,
                paths,
                album,
                create_album,
                recursive,
                workers,
                force,
            )
            .await
        }
        Commands::Watch {
            folder,
            album,
            folder_albums,
            workers,
            debounce,
            initial_scan,
        } => {
            run_watch(
                &context,
                folder,
                album,
                folder_albums,
                workers,
                debounce,
                initial_scan,
            )
            .await
        }
    }
}
