//! Artist housekeeping job.
//!
//! Recomputes cached artist counts, deletes artists left without albums
//! (through the application-level cascade) and backfills missing sort
//! names.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule},
};
use tracing::info;

pub struct ArtistHousekeepingJob {
    cron: String,
}

impl ArtistHousekeepingJob {
    pub fn new(cron: String) -> Self {
        Self { cron }
    }
}

impl BackgroundJob for ArtistHousekeepingJob {
    fn id(&self) -> &'static str {
        "artist_housekeeping"
    }

    fn name(&self) -> &'static str {
        "Artist Housekeeping"
    }

    fn description(&self) -> &'static str {
        "Recompute artist counts, remove empty artists and backfill sort names"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Cron(self.cron.clone())
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let store = ctx.catalog_store.as_ref();

        let recounted = store
            .recalculate_artist_counts()
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        let empty_artists = store
            .list_artist_ids_without_albums()
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
        let mut deleted = 0usize;
        for artist_id in empty_artists {
            if ctx.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            store
                .delete_artist(artist_id)
                .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
            deleted += 1;
        }

        let backfilled = store
            .backfill_artist_sort_names()
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        info!(
            "Artist housekeeping: {} counts refreshed, {} empty artists deleted, {} sort names backfilled",
            recounted, deleted, backfilled
        );
        Ok(())
    }
}
