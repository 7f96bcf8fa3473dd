//! Scan orchestration: drives candidate directories through extraction,
//! magic processing, resolution and the transactional catalog commit.
//!
//! Units within a batch run in parallel on a bounded worker pool, but
//! commits touching the same artist are serialized through a keyed lock so
//! cached counts and resolution keys never race. A library can only be
//! scanned by one orchestrator invocation at a time; overlapping requests
//! are refused, not queued. Cancellation is honored between units —
//! a commit transaction that has started always runs to completion.

use crate::catalog_store::{CatalogStore, Library, LibraryScanHistory, LibraryType, UnitCounts};
use crate::magic::{MagicEngine, RawSongFile, TagReader};
use crate::resolver::contributors::ContributorAssigner;
use crate::resolver::{IdentityResolver, ResolutionConflict, UnitResolution};
use crate::scanner::{into_batches, AlbumDirectory, DirectoryScanner, ScanOptions};
use crate::settings::PipelineConfig;
use anyhow::Result;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DEFAULT_WORKER_COUNT: usize = 4;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Library of type {0:?} is not configured")]
    LibraryNotFound(LibraryType),

    #[error("Library {0} is already being scanned")]
    AlreadyScanning(i64),
}

/// What one scan accomplished. `error_message` carries the fatal abort
/// reason when `doContinueOnDirectoryProcessingErrors` stopped the scan.
#[derive(Clone, Debug, Default)]
pub struct ScanSummary {
    pub units_found: usize,
    pub units_committed: usize,
    pub units_unchanged: usize,
    pub units_conflicted: usize,
    pub units_failed: usize,
    pub counts: UnitCounts,
    pub duration_in_ms: i64,
    pub error_message: Option<String>,
}

enum UnitOutcome {
    Committed(UnitCounts),
    Unchanged,
    /// Conflict surfaced and the directory was prefixed.
    Conflicted,
    Failed(String),
    /// Unit not started because cancellation fired first.
    Cancelled,
}

/// Serializes commits per `(library, artist_name_normalized)`. The key
/// uses the normalized name rather than the artist id so units for a
/// not-yet-created artist contend on the same lock.
struct CommitLocks {
    locks: Mutex<HashMap<(i64, String), Arc<Mutex<()>>>>,
}

impl CommitLocks {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, library_id: i64, artist_name_normalized: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry((library_id, artist_name_normalized.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Releases the per-library scanning flag on drop.
struct ScanGuard<'a> {
    scanning: &'a Mutex<HashSet<i64>>,
    library_id: i64,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.scanning.lock().unwrap().remove(&self.library_id);
    }
}

pub struct ScanOrchestrator {
    store: Arc<dyn CatalogStore>,
    tag_reader: Arc<dyn TagReader>,
    config: PipelineConfig,
    magic: MagicEngine,
    pool: rayon::ThreadPool,
    commit_locks: CommitLocks,
    scanning: Mutex<HashSet<i64>>,
}

impl ScanOrchestrator {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        tag_reader: Arc<dyn TagReader>,
        config: PipelineConfig,
    ) -> Result<Self> {
        Self::with_worker_count(store, tag_reader, config, DEFAULT_WORKER_COUNT)
    }

    pub fn with_worker_count(
        store: Arc<dyn CatalogStore>,
        tag_reader: Arc<dyn TagReader>,
        config: PipelineConfig,
        worker_count: usize,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count.max(1))
            .build()?;
        let magic = MagicEngine::new(config.clone());
        Ok(Self {
            store,
            tag_reader,
            config,
            magic,
            pool,
            commit_locks: CommitLocks::new(),
            scanning: Mutex::new(HashSet::new()),
        })
    }

    /// Run a full scan over the library of the given type. Always appends
    /// one scan-history row, even when every unit failed or the scan was
    /// aborted; the history row is how a completed (or fatally aborted)
    /// scan is distinguished from one that never started.
    pub fn scan_library(
        &self,
        library_type: LibraryType,
        cancellation: &CancellationToken,
    ) -> Result<ScanSummary> {
        let library = self
            .store
            .get_library_by_type(library_type)?
            .ok_or(PipelineError::LibraryNotFound(library_type))?;
        let _guard = self.acquire_scan_guard(library.id)?;

        let started = Instant::now();
        info!(
            "Scanning library '{}' ({:?}) at {}",
            library.name, library_type, library.path
        );

        let mut summary = self.run_scan(&library, library_type, cancellation);
        summary.duration_in_ms = started.elapsed().as_millis() as i64;

        self.append_history(&library, &summary, None, None);
        info!(
            "Scan of '{}' finished: {} units, {} committed, {} unchanged, {} conflicts, {} failed in {}ms",
            library.name,
            summary.units_found,
            summary.units_committed,
            summary.units_unchanged,
            summary.units_conflicted,
            summary.units_failed,
            summary.duration_in_ms
        );
        Ok(summary)
    }

    /// Rescan a single album directory. The history row is scoped to the
    /// artist/album the unit resolved to.
    pub fn rescan_directory(
        &self,
        library_type: LibraryType,
        directory: &Path,
        cancellation: &CancellationToken,
    ) -> Result<ScanSummary> {
        let library = self
            .store
            .get_library_by_type(library_type)?
            .ok_or(PipelineError::LibraryNotFound(library_type))?;
        let _guard = self.acquire_scan_guard(library.id)?;

        let started = Instant::now();
        let mut summary = ScanSummary::default();

        let options = self.scan_options(library_type);
        let results = DirectoryScanner::scan(directory, &options);
        let mut scoped: (Option<i64>, Option<i64>) = (None, None);
        for result in results {
            if cancellation.is_cancelled() {
                break;
            }
            match result {
                Ok(candidate) => {
                    summary.units_found += 1;
                    match self.process_unit(&library, &candidate, cancellation) {
                        UnitOutcome::Committed(counts) => {
                            summary.units_committed += 1;
                            summary.counts.accumulate(counts);
                            scoped = self.unit_scope_ids(&library, &candidate);
                        }
                        UnitOutcome::Unchanged => {
                            summary.units_unchanged += 1;
                            scoped = self.unit_scope_ids(&library, &candidate);
                        }
                        UnitOutcome::Conflicted => summary.units_conflicted += 1,
                        UnitOutcome::Failed(message) => {
                            summary.units_failed += 1;
                            if !self
                                .config
                                .processing
                                .do_continue_on_directory_processing_errors
                            {
                                summary.error_message = Some(message);
                                break;
                            }
                        }
                        UnitOutcome::Cancelled => break,
                    }
                }
                Err(e) => {
                    summary.units_failed += 1;
                    warn!("Rescan error under {:?}: {}", directory, e);
                }
            }
        }
        summary.duration_in_ms = started.elapsed().as_millis() as i64;

        self.append_history(&library, &summary, scoped.0, scoped.1);
        Ok(summary)
    }

    fn acquire_scan_guard(&self, library_id: i64) -> Result<ScanGuard<'_>> {
        let mut scanning = self.scanning.lock().unwrap();
        if !scanning.insert(library_id) {
            warn!("Refusing overlapping scan of library {}", library_id);
            return Err(PipelineError::AlreadyScanning(library_id).into());
        }
        Ok(ScanGuard {
            scanning: &self.scanning,
            library_id,
        })
    }

    fn scan_options(&self, library_type: LibraryType) -> ScanOptions {
        let processing = &self.config.processing;
        ScanOptions {
            skip_prefixes: vec![
                processing.skipped_directory_prefix.clone(),
                processing.duplicate_album_prefix.clone(),
            ],
            maximum_processing_count: processing.maximum_processing_count,
            // The staging scan limit only binds the staging library.
            scan_limit: match library_type {
                LibraryType::Staging => processing.staging_directory_scan_limit,
                _ => 0,
            },
        }
    }

    fn run_scan(
        &self,
        library: &Library,
        library_type: LibraryType,
        cancellation: &CancellationToken,
    ) -> ScanSummary {
        let mut summary = ScanSummary::default();
        let options = self.scan_options(library_type);
        let root = PathBuf::from(&library.path);

        let mut candidates = Vec::new();
        for result in DirectoryScanner::scan(&root, &options) {
            match result {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => {
                    summary.units_failed += 1;
                    warn!("Scan error in '{}': {}", library.name, e);
                    if !self
                        .config
                        .processing
                        .do_continue_on_directory_processing_errors
                    {
                        summary.error_message = Some(e.to_string());
                        return summary;
                    }
                }
            }
        }
        summary.units_found = candidates.len();

        for batch in into_batches(candidates, self.config.processing.batch_size) {
            if cancellation.is_cancelled() {
                info!("Scan of '{}' cancelled between batches", library.name);
                break;
            }
            let outcomes: Vec<UnitOutcome> = self.pool.install(|| {
                batch
                    .par_iter()
                    .map(|candidate| self.process_unit(library, candidate, cancellation))
                    .collect()
            });

            for outcome in outcomes {
                match outcome {
                    UnitOutcome::Committed(counts) => {
                        summary.units_committed += 1;
                        summary.counts.accumulate(counts);
                    }
                    UnitOutcome::Unchanged => summary.units_unchanged += 1,
                    UnitOutcome::Conflicted => summary.units_conflicted += 1,
                    UnitOutcome::Failed(message) => {
                        summary.units_failed += 1;
                        if !self
                            .config
                            .processing
                            .do_continue_on_directory_processing_errors
                        {
                            summary.error_message = Some(message);
                        }
                    }
                    UnitOutcome::Cancelled => {}
                }
            }
            if summary.error_message.is_some() {
                error!(
                    "Aborting scan of '{}' on first unit error (continue-on-errors disabled)",
                    library.name
                );
                break;
            }
        }
        summary
    }

    /// Drive one candidate directory through extraction, magic,
    /// resolution and commit. Never panics and never returns a hard
    /// error: every failure mode maps onto a `UnitOutcome`.
    fn process_unit(
        &self,
        library: &Library,
        candidate: &AlbumDirectory,
        cancellation: &CancellationToken,
    ) -> UnitOutcome {
        if cancellation.is_cancelled() {
            return UnitOutcome::Cancelled;
        }
        let directory_name = candidate.directory_name();
        if directory_name.len() > self.config.processing.maximum_album_directory_name_length {
            return UnitOutcome::Failed(format!(
                "Album directory name exceeds {} characters: {}",
                self.config.processing.maximum_album_directory_name_length, directory_name
            ));
        }
        let artist_directory_name = candidate
            .path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if artist_directory_name.len() > self.config.processing.maximum_artist_directory_name_length
        {
            return UnitOutcome::Failed(format!(
                "Artist directory name exceeds {} characters: {}",
                self.config.processing.maximum_artist_directory_name_length, artist_directory_name
            ));
        }

        // Tag extraction: an unreadable file is a transient per-unit error;
        // the directory stays unprefixed and is retried on the next scan.
        let mut files: Vec<RawSongFile> = Vec::new();
        for file in candidate.audio_files() {
            match self.tag_reader.read(&file.path) {
                Ok(raw) => files.push(raw),
                Err(e) => {
                    warn!("Failed to read {:?}: {}", file.path, e);
                    return UnitOutcome::Failed(e.to_string());
                }
            }
        }

        let album_candidate = match self.magic.process(&candidate.path, files) {
            Ok(album_candidate) => album_candidate,
            Err(e) => return UnitOutcome::Failed(e.to_string()),
        };

        // Writes for the same artist serialize here; reads above race
        // freely.
        let lock = self
            .commit_locks
            .lock_for(library.id, &album_candidate.artist_name_normalized);
        let _commit_permit = lock.lock().unwrap();

        let assigner = ContributorAssigner::new(&self.config.processing);
        let contributors = match assigner.assign(
            self.store.as_ref(),
            library.id,
            &album_candidate.contributors,
        ) {
            Ok(contributors) => contributors,
            Err(e) => return UnitOutcome::Failed(e.to_string()),
        };

        let resolver = IdentityResolver::new(self.store.as_ref());
        let resolution = match resolver.resolve(library.id, &album_candidate, contributors) {
            Ok(resolution) => resolution,
            Err(e) => return UnitOutcome::Failed(e.to_string()),
        };

        match resolution {
            UnitResolution::Unchanged => {
                debug!("Unit {:?} unchanged, skipping", candidate.path);
                UnitOutcome::Unchanged
            }
            UnitResolution::Write(unit) => match self.store.commit_unit(&unit) {
                Ok(counts) => UnitOutcome::Committed(counts),
                Err(e) => {
                    // The transaction rolled back as a whole; the unit is
                    // retried on the next scheduled scan.
                    error!("Commit failed for {:?}: {}", candidate.path, e);
                    UnitOutcome::Failed(e.to_string())
                }
            },
            UnitResolution::Conflict(conflict) => {
                let prefix = match &conflict {
                    ResolutionConflict::DuplicateAlbum { .. } => {
                        &self.config.processing.duplicate_album_prefix
                    }
                    ResolutionConflict::AmbiguousIdentity { .. } => {
                        &self.config.processing.skipped_directory_prefix
                    }
                };
                warn!("Unit {:?}: {}", candidate.path, conflict);
                if let Err(e) = prefix_directory(&candidate.path, prefix) {
                    warn!("Failed to prefix {:?}: {}", candidate.path, e);
                }
                UnitOutcome::Conflicted
            }
        }
    }

    /// Best-effort resolution of the artist/album ids a candidate maps to,
    /// for scoping targeted-rescan history rows.
    fn unit_scope_ids(
        &self,
        library: &Library,
        candidate: &AlbumDirectory,
    ) -> (Option<i64>, Option<i64>) {
        let mut files = Vec::new();
        for file in candidate.audio_files() {
            match self.tag_reader.read(&file.path) {
                Ok(raw) => files.push(raw),
                Err(_) => return (None, None),
            }
        }
        let album_candidate = match self.magic.process(&candidate.path, files) {
            Ok(c) => c,
            Err(_) => return (None, None),
        };
        let artist = self
            .store
            .find_artist_by_normalized_name(library.id, &album_candidate.artist_name_normalized)
            .ok()
            .flatten();
        let album = artist.as_ref().and_then(|artist| {
            self.store
                .find_album_by_normalized_name(artist.id, &album_candidate.album_name_normalized)
                .ok()
                .flatten()
        });
        (artist.map(|a| a.id), album.map(|a| a.id))
    }

    fn append_history(
        &self,
        library: &Library,
        summary: &ScanSummary,
        for_artist_id: Option<i64>,
        for_album_id: Option<i64>,
    ) {
        let history = LibraryScanHistory {
            library_id: library.id,
            for_artist_id,
            for_album_id,
            found_artists_count: summary.counts.artists_created,
            found_albums_count: summary.counts.albums_created,
            found_songs_count: summary.counts.songs_created,
            duration_in_ms: summary.duration_in_ms,
            error_message: summary.error_message.clone(),
            ..Default::default()
        };
        if let Err(e) = self.store.append_scan_history(&history) {
            error!(
                "Failed to append scan history for library {}: {}",
                library.id, e
            );
        }
    }
}

/// Rename a directory to carry the given marker prefix. A no-op when the
/// name already carries it (a concurrent unit may have prefixed first).
fn prefix_directory(path: &Path, prefix: &str) -> std::io::Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if name.starts_with(prefix.trim_end()) {
        return Ok(());
    }
    let target = path.with_file_name(format!("{}{}", prefix, name));
    std::fs::rename(path, target)
}
