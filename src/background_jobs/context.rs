use crate::catalog_store::CatalogStore;
use crate::pipeline::ScanOrchestrator;
use crate::search_engine::musicbrainz::MusicBrainzRepository;
use crate::search_engine::EnrichmentService;
use crate::settings::PipelineConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
///
/// Carries the shared pipeline collaborators and a cancellation token for
/// graceful shutdown handling.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Access to the music catalog database.
    pub catalog_store: Arc<dyn CatalogStore>,

    /// The ingestion pipeline driving library scans.
    pub orchestrator: Arc<ScanOrchestrator>,

    /// External-metadata enrichment over the enabled search engines.
    pub enrichment: Arc<EnrichmentService>,

    /// Local MusicBrainz lookup repository, when the provider is enabled.
    pub musicbrainz: Option<Arc<MusicBrainzRepository>>,

    /// The typed configuration snapshot taken at startup.
    pub config: PipelineConfig,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        catalog_store: Arc<dyn CatalogStore>,
        orchestrator: Arc<ScanOrchestrator>,
        enrichment: Arc<EnrichmentService>,
        musicbrainz: Option<Arc<MusicBrainzRepository>>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            cancellation_token,
            catalog_store,
            orchestrator,
            enrichment,
            musicbrainz,
            config,
        }
    }

    /// Check if cancellation has been requested.
    ///
    /// Jobs should periodically check this between units of work and
    /// return early with `JobError::Cancelled` if true.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
