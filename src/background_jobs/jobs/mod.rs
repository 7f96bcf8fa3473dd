//! The pipeline's background jobs, one per `jobs.*.cronExpression` key.

mod artist_housekeeping;
mod artist_search_engine_housekeeping;
mod library_insert;
mod library_process;
mod musicbrainz_update_database;

pub use artist_housekeeping::ArtistHousekeepingJob;
pub use artist_search_engine_housekeeping::ArtistSearchEngineHousekeepingJob;
pub use library_insert::LibraryInsertJob;
pub use library_process::LibraryProcessJob;
pub use musicbrainz_update_database::MusicBrainzUpdateDatabaseJob;
