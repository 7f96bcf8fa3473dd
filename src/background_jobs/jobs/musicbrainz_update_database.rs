//! MusicBrainz dump import job.
//!
//! Feeds the local MusicBrainz lookup repository from newline-delimited
//! JSON dump files under the configured storage path.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior},
};
use crate::settings::registry::SEARCH_ENGINE_MUSICBRAINZ_IMPORT_LAST_IMPORT_TIMESTAMP;
use std::path::Path;
use tracing::{info, warn};

pub struct MusicBrainzUpdateDatabaseJob {
    cron: String,
}

impl MusicBrainzUpdateDatabaseJob {
    pub fn new(cron: String) -> Self {
        Self { cron }
    }
}

impl BackgroundJob for MusicBrainzUpdateDatabaseJob {
    fn id(&self) -> &'static str {
        "musicbrainz_update_database"
    }

    fn name(&self) -> &'static str {
        "MusicBrainz Update Database"
    }

    fn description(&self) -> &'static str {
        "Import MusicBrainz artist dump files into the local lookup repository"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Cron(self.cron.clone())
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        // Import batches are transactional; let the in-flight batch land.
        ShutdownBehavior::WaitForCompletion
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let Some(repository) = &ctx.musicbrainz else {
            info!("MusicBrainz engine disabled, skipping dump import");
            return Ok(());
        };
        let settings = &ctx.config.search_engine.musicbrainz;

        let summary = repository
            .import_dump_files(
                Path::new(&settings.storage_path),
                settings.import_batch_size,
                settings.import_maximum_to_process,
            )
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        if let Err(e) = ctx.catalog_store.set_setting(
            SEARCH_ENGINE_MUSICBRAINZ_IMPORT_LAST_IMPORT_TIMESTAMP,
            &chrono::Utc::now().to_rfc3339(),
        ) {
            warn!("Failed to record import timestamp: {}", e);
        }

        info!(
            "MusicBrainz import: {} artists in {} batches, {} malformed lines skipped",
            summary.imported, summary.batches, summary.skipped
        );
        Ok(())
    }
}
