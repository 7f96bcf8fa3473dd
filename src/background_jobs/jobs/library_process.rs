//! Inbound library ingestion job.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule},
};
use crate::catalog_store::LibraryType;
use tracing::info;

/// Runs the full ingestion pipeline over the Inbound library.
pub struct LibraryProcessJob {
    cron: String,
}

impl LibraryProcessJob {
    pub fn new(cron: String) -> Self {
        Self { cron }
    }
}

impl BackgroundJob for LibraryProcessJob {
    fn id(&self) -> &'static str {
        "library_process"
    }

    fn name(&self) -> &'static str {
        "Library Process"
    }

    fn description(&self) -> &'static str {
        "Ingest candidate album directories from the Inbound library"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Cron(self.cron.clone())
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let summary = ctx
            .orchestrator
            .scan_library(LibraryType::Inbound, &ctx.cancellation_token)
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        if let Some(message) = summary.error_message {
            return Err(JobError::ExecutionFailed(message));
        }
        info!(
            "Inbound scan: {} units found, {} committed, {} unchanged, {} failed",
            summary.units_found,
            summary.units_committed,
            summary.units_unchanged,
            summary.units_failed
        );
        Ok(())
    }
}
