//! CatalogStore trait definition.
//!
//! The trait abstracts the catalog database behind the resolution and
//! commit operations the ingestion pipeline needs, so tests and jobs can
//! run against an in-memory store.

use super::models::*;
use anyhow::Result;

/// A fully resolved artist slot in a unit: either an existing catalog row
/// or the fields for a new one.
#[derive(Clone, Debug)]
pub struct ArtistWrite {
    pub existing_id: Option<i64>,
    pub name: String,
    pub name_normalized: String,
    pub sort_name: String,
    pub directory: String,
    pub musicbrainz_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AlbumWrite {
    pub existing_id: Option<i64>,
    pub name: String,
    pub name_normalized: String,
    pub sort_name: String,
    pub directory: String,
    pub album_type: AlbumType,
    pub release_date: Option<i64>,
    pub original_release_date: Option<i64>,
    pub genres: Vec<String>,
    pub musicbrainz_id: Option<String>,
}

/// How one song file lands in the catalog. `Unchanged` files were matched
/// by hash during resolution and carry no write.
#[derive(Clone, Debug)]
pub enum SongWrite {
    Create(SongFields),
    /// Content changed at an existing position; `id` is the row to update.
    Update { id: i64, fields: SongFields },
    Unchanged,
}

#[derive(Clone, Debug)]
pub struct SongFields {
    pub song_number: i64,
    pub disc_number: i64,
    pub title: String,
    pub title_normalized: String,
    pub file_name: String,
    pub file_hash: String,
    pub file_size: i64,
    pub duration_ms: i64,
    pub bit_rate: i64,
    pub sample_rate: i64,
    pub bit_depth: i64,
    pub channel_count: i64,
    pub is_vbr: bool,
    pub lyrics: Option<String>,
    pub part_titles: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ContributorWrite {
    pub artist_id: Option<i64>,
    pub contributor_name: Option<String>,
    pub role: ContributorRole,
    pub sub_role: Option<String>,
    pub meta_tag_identifier: MetaTagIdentifier,
}

/// One album-directory unit, ready for a single-transaction commit.
#[derive(Clone, Debug)]
pub struct UnitWrite {
    pub library_id: i64,
    pub artist: ArtistWrite,
    pub album: AlbumWrite,
    pub songs: Vec<SongWrite>,
    pub contributors: Vec<ContributorWrite>,
}

/// What a unit commit actually changed. These feed both the library's
/// cached counts and the scan-history row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnitCounts {
    pub artists_created: i64,
    pub albums_created: i64,
    pub songs_created: i64,
    pub songs_updated: i64,
    pub contributors_created: i64,
}

impl UnitCounts {
    pub fn accumulate(&mut self, other: UnitCounts) {
        self.artists_created += other.artists_created;
        self.albums_created += other.albums_created;
        self.songs_created += other.songs_created;
        self.songs_updated += other.songs_updated;
        self.contributors_created += other.contributors_created;
    }
}

/// External identifiers gathered by enrichment for one artist. Only `Some`
/// fields are written; existing values are never overwritten.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArtistExternalIds {
    pub musicbrainz_id: Option<String>,
    pub spotify_id: Option<String>,
    pub discogs_id: Option<String>,
    pub itunes_id: Option<String>,
    pub amg_id: Option<String>,
    pub wikidata_id: Option<String>,
    pub lastfm_id: Option<String>,
}

impl ArtistExternalIds {
    pub fn is_empty(&self) -> bool {
        self.musicbrainz_id.is_none()
            && self.spotify_id.is_none()
            && self.discogs_id.is_none()
            && self.itunes_id.is_none()
            && self.amg_id.is_none()
            && self.wikidata_id.is_none()
            && self.lastfm_id.is_none()
    }
}

/// External identifiers gathered by enrichment for one album. Only the
/// namespaces persisted on album rows are carried.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AlbumExternalIds {
    pub musicbrainz_id: Option<String>,
    pub spotify_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ArtistRelationWrite {
    pub artist_id: i64,
    pub related_artist_id: i64,
    pub relation_type: String,
    pub relation_start: Option<i64>,
    pub relation_end: Option<i64>,
}

pub trait CatalogStore: Send + Sync {
    // =========================================================================
    // Settings
    // =========================================================================

    fn get_setting(&self, key: &str) -> Result<Option<String>>;
    fn set_setting(&self, key: &str, value: &str) -> Result<()>;
    fn all_settings(&self) -> Result<Vec<Setting>>;

    // =========================================================================
    // Libraries
    // =========================================================================

    fn list_libraries(&self) -> Result<Vec<Library>>;
    fn get_library_by_type(&self, library_type: LibraryType) -> Result<Option<Library>>;
    /// Repoint a library role at a different filesystem path.
    fn set_library_path(&self, library_type: LibraryType, path: &str) -> Result<()>;

    // =========================================================================
    // Artists
    // =========================================================================

    fn get_artist(&self, artist_id: i64) -> Result<Option<Artist>>;
    fn find_artist_by_musicbrainz_id(&self, musicbrainz_id: &str) -> Result<Option<Artist>>;
    fn find_artist_by_normalized_name(
        &self,
        library_id: i64,
        name_normalized: &str,
    ) -> Result<Option<Artist>>;
    /// Artists whose enrichment has never run, failed, or is older than
    /// `refreshed_before` (unix seconds; `None` ⇒ only never-processed).
    fn list_artists_needing_enrichment(
        &self,
        refreshed_before: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Artist>>;
    fn update_artist_external_ids(&self, artist_id: i64, ids: &ArtistExternalIds) -> Result<()>;
    fn set_artist_meta_data_status(&self, artist_id: i64, status: MetaDataStatus) -> Result<()>;

    // Housekeeping
    fn recalculate_artist_counts(&self) -> Result<usize>;
    fn list_artist_ids_without_albums(&self) -> Result<Vec<i64>>;
    fn backfill_artist_sort_names(&self) -> Result<usize>;

    // =========================================================================
    // Albums & songs (read side used by resolution)
    // =========================================================================

    fn get_album(&self, album_id: i64) -> Result<Option<Album>>;
    fn find_album_by_normalized_name(
        &self,
        artist_id: i64,
        name_normalized: &str,
    ) -> Result<Option<Album>>;
    /// `(song_number, file_hash)` pairs for the album, ordered by position.
    fn get_album_song_positions(&self, album_id: i64) -> Result<Vec<(i64, String)>>;
    fn find_song_by_position(&self, album_id: i64, song_number: i64) -> Result<Option<Song>>;
    fn list_album_contributors(&self, album_id: i64) -> Result<Vec<Contributor>>;
    /// Albums whose enrichment has never run or is older than
    /// `refreshed_before` (unix seconds; `None` ⇒ only never-processed).
    fn list_albums_needing_enrichment(
        &self,
        refreshed_before: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Album>>;
    fn update_album_external_ids(&self, album_id: i64, ids: &AlbumExternalIds) -> Result<()>;
    fn set_album_meta_data_status(&self, album_id: i64, status: MetaDataStatus) -> Result<()>;

    // =========================================================================
    // Artist relations
    // =========================================================================

    /// Returns true when a new edge was created, false when the
    /// `(artist_id, related_artist_id)` edge already existed.
    fn upsert_artist_relation(&self, relation: &ArtistRelationWrite) -> Result<bool>;

    // =========================================================================
    // Unit commit
    // =========================================================================

    /// Commit one resolved album-directory unit in a single transaction:
    /// every row lands or none do. Unique-constraint conflicts on the
    /// resolution keys are treated as already-exists and resolved by
    /// re-select, never surfaced as errors. The owning library's cached
    /// counts and `last_scan_at` are updated in the same transaction.
    fn commit_unit(&self, unit: &UnitWrite) -> Result<UnitCounts>;

    // =========================================================================
    // Application-level cascades
    // =========================================================================

    fn delete_artist(&self, artist_id: i64) -> Result<()>;
    fn delete_album(&self, album_id: i64) -> Result<()>;
    fn delete_library(&self, library_id: i64) -> Result<()>;

    // =========================================================================
    // Append-only history
    // =========================================================================

    fn append_scan_history(&self, history: &LibraryScanHistory) -> Result<i64>;
    fn list_scan_history(&self, library_id: i64, limit: usize)
        -> Result<Vec<LibraryScanHistory>>;
    fn append_search_history(&self, history: &SearchHistory) -> Result<i64>;
    fn list_search_history(&self, limit: usize) -> Result<Vec<SearchHistory>>;

    // =========================================================================
    // Counts
    // =========================================================================

    fn get_artists_count(&self) -> i64;
    fn get_albums_count(&self) -> i64;
    fn get_songs_count(&self) -> i64;
}
