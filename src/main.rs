use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod background_jobs;
use background_jobs::jobs::{
    ArtistHousekeepingJob, ArtistSearchEngineHousekeepingJob, LibraryInsertJob, LibraryProcessJob,
    MusicBrainzUpdateDatabaseJob,
};
use background_jobs::{create_scheduler, BackgroundJob, JobContext};

mod catalog_store;
use catalog_store::{CatalogStore, LibraryType, SqliteCatalogStore};

mod magic;
use magic::LoftyTagReader;

mod pipeline;
use pipeline::ScanOrchestrator;

mod resolver;
mod scanner;

mod search_engine;
use search_engine::itunes::ItunesEngine;
use search_engine::lastfm::LastFmEngine;
use search_engine::musicbrainz::{MusicBrainzEngine, MusicBrainzRepository};
use search_engine::spotify::SpotifyEngine;
use search_engine::{EnrichmentService, SearchEngine};

mod settings;
use settings::PipelineConfig;

mod sqlite_persistence;

use tokio_util::sync::CancellationToken;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite catalog database file.
    #[clap(value_parser = parse_path)]
    pub catalog_db: PathBuf,

    /// Override the Inbound library path (defaults to the seeded library row).
    #[clap(long, value_parser = parse_path)]
    pub inbound_path: Option<PathBuf>,

    /// Override the Staging library path.
    #[clap(long, value_parser = parse_path)]
    pub staging_path: Option<PathBuf>,

    /// Number of read connections for catalog lookups.
    #[clap(long, default_value_t = 4)]
    pub read_pool_size: usize,

    /// Number of worker threads processing directory units in parallel.
    #[clap(long, default_value_t = 4)]
    pub scan_workers: usize,

    /// Run a single scan of the given library (inbound | staging) and exit
    /// instead of starting the scheduler loop.
    #[clap(long)]
    pub scan_now: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    info!(
        "cadenza-catalog {}-{}",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    info!(
        "Opening SQLite catalog database at {:?}...",
        cli_args.catalog_db
    );
    let catalog_store = Arc::new(SqliteCatalogStore::new(
        &cli_args.catalog_db,
        cli_args.read_pool_size,
    )?);

    if let Some(path) = &cli_args.inbound_path {
        catalog_store.set_library_path(LibraryType::Inbound, &path.display().to_string())?;
    }
    if let Some(path) = &cli_args.staging_path {
        catalog_store.set_library_path(LibraryType::Staging, &path.display().to_string())?;
    }

    // Parsed once; a malformed required setting is a startup error.
    let config = PipelineConfig::load(catalog_store.as_ref())?;

    let orchestrator = Arc::new(ScanOrchestrator::with_worker_count(
        catalog_store.clone(),
        Arc::new(LoftyTagReader),
        config.clone(),
        cli_args.scan_workers,
    )?);

    let (engines, musicbrainz) = build_search_engines(&config, catalog_store.clone())?;
    let enrichment = Arc::new(EnrichmentService::new(
        catalog_store.clone(),
        engines,
        config.search_engine.default_page_size,
        config.search_engine.maximum_allowed_page_size,
        config.search_engine.artist_refresh_in_days,
    ));

    let shutdown_token = CancellationToken::new();
    {
        let token = shutdown_token.clone();
        ctrlc::set_handler(move || {
            info!("Shutdown requested");
            token.cancel();
        })
        .context("Failed to install signal handler")?;
    }

    let job_context = JobContext::new(
        shutdown_token.child_token(),
        catalog_store.clone(),
        orchestrator,
        enrichment,
        musicbrainz,
        config.clone(),
    );
    let (mut scheduler, handle) = create_scheduler(shutdown_token.clone(), job_context);

    let jobs: Vec<Arc<dyn BackgroundJob>> = vec![
        Arc::new(LibraryProcessJob::new(config.jobs.library_process_cron.clone())),
        Arc::new(LibraryInsertJob::new(config.jobs.library_insert_cron.clone())),
        Arc::new(ArtistHousekeepingJob::new(
            config.jobs.artist_housekeeping_cron.clone(),
        )),
        Arc::new(MusicBrainzUpdateDatabaseJob::new(
            config.jobs.musicbrainz_update_database_cron.clone(),
        )),
        Arc::new(ArtistSearchEngineHousekeepingJob::new(
            config.jobs.artist_search_engine_housekeeping_cron.clone(),
        )),
    ];
    for job in jobs {
        scheduler.register_job(job).await;
    }

    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    if let Some(target) = &cli_args.scan_now {
        let job_id = match target.as_str() {
            "inbound" => "library_process",
            "staging" => "library_insert",
            other => bail!("Unknown --scan-now target '{}' (inbound | staging)", other),
        };
        info!("Triggering one-shot scan via job {}", job_id);
        if let Err(e) = handle.trigger_job(job_id).await {
            warn!("Failed to trigger {}: {}", job_id, e);
        }
        // Give the run a moment to register, then wait for it to finish.
        tokio::time::sleep(Duration::from_millis(200)).await;
        while handle.is_job_running(job_id).await {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        shutdown_token.cancel();
    }

    scheduler_task.await.context("Scheduler task panicked")?;
    Ok(())
}

/// Build the enabled search engines in lookup priority order, plus the
/// shared MusicBrainz repository when that provider is on.
fn build_search_engines(
    config: &PipelineConfig,
    store: Arc<dyn CatalogStore>,
) -> Result<(Vec<Box<dyn SearchEngine>>, Option<Arc<MusicBrainzRepository>>)> {
    let search = &config.search_engine;
    let mut engines: Vec<Box<dyn SearchEngine>> = Vec::new();
    let mut repository = None;

    if search.musicbrainz.enabled {
        let repo = Arc::new(MusicBrainzRepository::open(std::path::Path::new(
            &search.musicbrainz.storage_path,
        ))?);
        engines.push(Box::new(MusicBrainzEngine::new(repo.clone())));
        repository = Some(repo);
    }
    if search.spotify.enabled {
        if search.spotify.api_key.is_empty() || search.spotify.shared_secret.is_empty() {
            warn!("Spotify engine enabled but apiKey/sharedSecret are not configured, skipping");
        } else {
            engines.push(Box::new(SpotifyEngine::new(
                &search.spotify.api_key,
                &search.spotify.shared_secret,
                &search.user_agent,
                store.clone(),
            )?));
        }
    }
    if search.itunes_enabled {
        engines.push(Box::new(ItunesEngine::new(&search.user_agent)?));
    }
    if search.lastfm_enabled {
        if search.lastfm_api_key.is_empty() {
            warn!("Last.fm engine enabled but no api key is configured, skipping");
        } else {
            engines.push(Box::new(LastFmEngine::new(
                &search.lastfm_api_key,
                &search.user_agent,
            )?));
        }
    }

    info!(
        "Search engines enabled: {}",
        engines
            .iter()
            .map(|e| e.id())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok((engines, repository))
}
