//! Artist enrichment housekeeping job.
//!
//! Runs the enrichment pass over a batch of artists that have never been
//! processed or whose enrichment window has lapsed.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule},
};
use tracing::info;

pub struct ArtistSearchEngineHousekeepingJob {
    cron: String,
}

impl ArtistSearchEngineHousekeepingJob {
    pub fn new(cron: String) -> Self {
        Self { cron }
    }
}

impl BackgroundJob for ArtistSearchEngineHousekeepingJob {
    fn id(&self) -> &'static str {
        "artist_search_engine_housekeeping"
    }

    fn name(&self) -> &'static str {
        "Artist Search Engine Housekeeping"
    }

    fn description(&self) -> &'static str {
        "Enrich artists missing external identifiers via the enabled search engines"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Cron(self.cron.clone())
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let batch_size = ctx.config.processing.batch_size;
        let artists = ctx
            .enrichment
            .enrich_artists(batch_size, &ctx.cancellation_token)
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let albums = ctx
            .enrichment
            .enrich_albums(batch_size, &ctx.cancellation_token)
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        info!(
            "Enrichment housekeeping: {} artists processed ({} enriched, {} failed), {} albums processed ({} enriched, {} failed)",
            artists.artists_processed,
            artists.artists_enriched,
            artists.artists_failed,
            albums.albums_processed,
            albums.albums_enriched,
            albums.albums_failed
        );
        Ok(())
    }
}
