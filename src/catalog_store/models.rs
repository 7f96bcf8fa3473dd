//! Catalog entity models for the SQLite-backed music catalog.
//!
//! Every primary entity carries an `api_key` (UUID v4), the externally
//! stable identifier handed to client-facing protocols; the numeric `id`
//! is internal to this database and never leaves the process.

use serde::{Deserialize, Serialize};

// =============================================================================
// Enumerations
// =============================================================================

/// Role a library directory plays in the ingestion flow.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LibraryType {
    Inbound,
    Staging,
    Storage,
    UserImages,
}

impl LibraryType {
    /// Convert from the numeric database representation (1-4).
    pub fn from_db_value(v: i64) -> Option<Self> {
        match v {
            1 => Some(LibraryType::Inbound),
            2 => Some(LibraryType::Staging),
            3 => Some(LibraryType::Storage),
            4 => Some(LibraryType::UserImages),
            _ => None,
        }
    }

    /// Convert to the numeric database representation.
    pub fn to_db_value(self) -> i64 {
        match self {
            LibraryType::Inbound => 1,
            LibraryType::Staging => 2,
            LibraryType::Storage => 3,
            LibraryType::UserImages => 4,
        }
    }
}

/// Enrichment lifecycle stage of an artist or album.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum MetaDataStatus {
    NotProcessed,
    Enriched,
    Failed,
}

impl MetaDataStatus {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "ENRICHED" => MetaDataStatus::Enriched,
            "FAILED" => MetaDataStatus::Failed,
            _ => MetaDataStatus::NotProcessed,
        }
    }

    pub fn to_db_str(self) -> &'static str {
        match self {
            MetaDataStatus::NotProcessed => "NOT_PROCESSED",
            MetaDataStatus::Enriched => "ENRICHED",
            MetaDataStatus::Failed => "FAILED",
        }
    }
}

/// Album catalog state.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum AlbumStatus {
    New,
    Ok,
    Invalid,
}

impl AlbumStatus {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "OK" => AlbumStatus::Ok,
            "INVALID" => AlbumStatus::Invalid,
            _ => AlbumStatus::New,
        }
    }

    pub fn to_db_str(self) -> &'static str {
        match self {
            AlbumStatus::New => "NEW",
            AlbumStatus::Ok => "OK",
            AlbumStatus::Invalid => "INVALID",
        }
    }
}

/// Album type classification.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum AlbumType {
    Album,
    Ep,
    Single,
    Compilation,
}

impl AlbumType {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "EP" => AlbumType::Ep,
            "SINGLE" => AlbumType::Single,
            "COMPILATION" => AlbumType::Compilation,
            _ => AlbumType::Album,
        }
    }

    pub fn to_db_str(self) -> &'static str {
        match self {
            AlbumType::Album => "ALBUM",
            AlbumType::Ep => "EP",
            AlbumType::Single => "SINGLE",
            AlbumType::Compilation => "COMPILATION",
        }
    }
}

/// Broad contributor classification, used to pick the ignore list that
/// applies when assigning contributors.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ContributorRole {
    Performer,
    Production,
    Publisher,
}

impl ContributorRole {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "PRODUCTION" => ContributorRole::Production,
            "PUBLISHER" => ContributorRole::Publisher,
            _ => ContributorRole::Performer,
        }
    }

    pub fn to_db_str(self) -> &'static str {
        match self {
            ContributorRole::Performer => "PERFORMER",
            ContributorRole::Production => "PRODUCTION",
            ContributorRole::Publisher => "PUBLISHER",
        }
    }
}

/// The source tag field a contributor credit was read from. Contributor
/// uniqueness is per `(artist, meta_tag_identifier, album)`, so two credits
/// for the same person on the same album survive only with distinct tags.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MetaTagIdentifier {
    Artist,
    AlbumArtist,
    Composer,
    Conductor,
    Engineer,
    Lyricist,
    MixDj,
    MixEngineer,
    MusicianCredit,
    OriginalArtist,
    OriginalLyricist,
    Producer,
    Publisher,
    Remixer,
}

impl MetaTagIdentifier {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "ARTIST" => Some(MetaTagIdentifier::Artist),
            "ALBUM_ARTIST" => Some(MetaTagIdentifier::AlbumArtist),
            "COMPOSER" => Some(MetaTagIdentifier::Composer),
            "CONDUCTOR" => Some(MetaTagIdentifier::Conductor),
            "ENGINEER" => Some(MetaTagIdentifier::Engineer),
            "LYRICIST" => Some(MetaTagIdentifier::Lyricist),
            "MIX_DJ" => Some(MetaTagIdentifier::MixDj),
            "MIX_ENGINEER" => Some(MetaTagIdentifier::MixEngineer),
            "MUSICIAN_CREDIT" => Some(MetaTagIdentifier::MusicianCredit),
            "ORIGINAL_ARTIST" => Some(MetaTagIdentifier::OriginalArtist),
            "ORIGINAL_LYRICIST" => Some(MetaTagIdentifier::OriginalLyricist),
            "PRODUCER" => Some(MetaTagIdentifier::Producer),
            "PUBLISHER" => Some(MetaTagIdentifier::Publisher),
            "REMIXER" => Some(MetaTagIdentifier::Remixer),
            _ => None,
        }
    }

    pub fn to_db_str(self) -> &'static str {
        match self {
            MetaTagIdentifier::Artist => "ARTIST",
            MetaTagIdentifier::AlbumArtist => "ALBUM_ARTIST",
            MetaTagIdentifier::Composer => "COMPOSER",
            MetaTagIdentifier::Conductor => "CONDUCTOR",
            MetaTagIdentifier::Engineer => "ENGINEER",
            MetaTagIdentifier::Lyricist => "LYRICIST",
            MetaTagIdentifier::MixDj => "MIX_DJ",
            MetaTagIdentifier::MixEngineer => "MIX_ENGINEER",
            MetaTagIdentifier::MusicianCredit => "MUSICIAN_CREDIT",
            MetaTagIdentifier::OriginalArtist => "ORIGINAL_ARTIST",
            MetaTagIdentifier::OriginalLyricist => "ORIGINAL_LYRICIST",
            MetaTagIdentifier::Producer => "PRODUCER",
            MetaTagIdentifier::Publisher => "PUBLISHER",
            MetaTagIdentifier::Remixer => "REMIXER",
        }
    }

    /// The broad role bucket this tag field belongs to.
    pub fn role(self) -> ContributorRole {
        match self {
            MetaTagIdentifier::Publisher => ContributorRole::Publisher,
            MetaTagIdentifier::Engineer
            | MetaTagIdentifier::MixDj
            | MetaTagIdentifier::MixEngineer
            | MetaTagIdentifier::Producer => ContributorRole::Production,
            _ => ContributorRole::Performer,
        }
    }
}

// =============================================================================
// Core entities
// =============================================================================

#[derive(Clone, Debug)]
pub struct Library {
    pub id: i64,
    pub api_key: String,
    pub name: String,
    pub path: String,
    pub library_type: LibraryType,
    pub last_scan_at: Option<i64>,
    pub artist_count: i64,
    pub album_count: i64,
    pub song_count: i64,
    pub is_locked: bool,
    pub sort_order: i64,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct Artist {
    pub id: i64,
    pub api_key: String,
    pub library_id: i64,
    pub name: String,
    pub name_normalized: String,
    pub sort_name: String,
    pub directory: String,
    pub album_count: i64,
    pub song_count: i64,
    pub musicbrainz_id: Option<String>,
    pub spotify_id: Option<String>,
    pub discogs_id: Option<String>,
    pub itunes_id: Option<String>,
    pub amg_id: Option<String>,
    pub wikidata_id: Option<String>,
    pub lastfm_id: Option<String>,
    pub meta_data_status: MetaDataStatus,
    pub calculated_rating: f64,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct Album {
    pub id: i64,
    pub api_key: String,
    pub artist_id: i64,
    pub name: String,
    pub name_normalized: String,
    pub sort_name: String,
    pub directory: String,
    pub album_status: AlbumStatus,
    pub album_type: AlbumType,
    pub release_date: Option<i64>,
    pub original_release_date: Option<i64>,
    pub song_count: i64,
    pub duration_ms: i64,
    pub genres: Vec<String>,
    pub moods: Vec<String>,
    pub musicbrainz_id: Option<String>,
    pub spotify_id: Option<String>,
    pub meta_data_status: MetaDataStatus,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct Song {
    pub id: i64,
    pub api_key: String,
    pub album_id: i64,
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
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

/// A person or entity credited on an album/song in a specific role,
/// distinct from the primary artist. Either `artist_id` (resolved against
/// the catalog) or `contributor_name` (free text) is set.
#[derive(Clone, Debug)]
pub struct Contributor {
    pub id: i64,
    pub api_key: String,
    pub album_id: i64,
    pub song_id: Option<i64>,
    pub artist_id: Option<i64>,
    pub contributor_name: Option<String>,
    pub role: ContributorRole,
    pub sub_role: Option<String>,
    pub meta_tag_identifier: MetaTagIdentifier,
    pub created_at: i64,
}

/// Directed relation between two artists, optionally bounded to a
/// `[relation_start, relation_end)` interval.
#[derive(Clone, Debug)]
pub struct ArtistRelation {
    pub id: i64,
    pub artist_id: i64,
    pub related_artist_id: i64,
    pub relation_type: String,
    pub relation_start: Option<i64>,
    pub relation_end: Option<i64>,
    pub created_at: i64,
}

// =============================================================================
// Append-only history rows
// =============================================================================

/// Record of a completed scan. `for_artist_id`/`for_album_id` scope
/// targeted rescans; whole-library scans leave both unset.
#[derive(Clone, Debug, Default)]
pub struct LibraryScanHistory {
    pub id: i64,
    pub library_id: i64,
    pub for_artist_id: Option<i64>,
    pub for_album_id: Option<i64>,
    pub found_artists_count: i64,
    pub found_albums_count: i64,
    pub found_songs_count: i64,
    pub duration_in_ms: i64,
    pub error_message: Option<String>,
    pub created_at: i64,
}

/// Record of one enrichment/search query against an external provider.
#[derive(Clone, Debug, Default)]
pub struct SearchHistory {
    pub id: i64,
    pub by_engine: String,
    pub query: String,
    pub found_artists_count: i64,
    pub found_albums_count: i64,
    pub found_songs_count: i64,
    pub found_other_count: i64,
    pub duration_in_ms: i64,
    pub created_at: i64,
}

/// Typed key/value configuration row. Values are strings; the settings
/// module parses them according to the key's registered type.
#[derive(Clone, Debug)]
pub struct Setting {
    pub id: i64,
    pub key: String,
    pub value: String,
    pub category: String,
    pub comment: Option<String>,
    pub is_locked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_type_round_trips() {
        for t in [
            LibraryType::Inbound,
            LibraryType::Staging,
            LibraryType::Storage,
            LibraryType::UserImages,
        ] {
            assert_eq!(LibraryType::from_db_value(t.to_db_value()), Some(t));
        }
        assert_eq!(LibraryType::from_db_value(0), None);
        assert_eq!(LibraryType::from_db_value(5), None);
    }

    #[test]
    fn meta_data_status_round_trips() {
        for s in [
            MetaDataStatus::NotProcessed,
            MetaDataStatus::Enriched,
            MetaDataStatus::Failed,
        ] {
            assert_eq!(MetaDataStatus::from_db_str(s.to_db_str()), s);
        }
    }

    #[test]
    fn meta_tag_identifier_round_trips() {
        for tag in [
            MetaTagIdentifier::Artist,
            MetaTagIdentifier::AlbumArtist,
            MetaTagIdentifier::Composer,
            MetaTagIdentifier::Conductor,
            MetaTagIdentifier::Engineer,
            MetaTagIdentifier::Lyricist,
            MetaTagIdentifier::MixDj,
            MetaTagIdentifier::MixEngineer,
            MetaTagIdentifier::MusicianCredit,
            MetaTagIdentifier::OriginalArtist,
            MetaTagIdentifier::OriginalLyricist,
            MetaTagIdentifier::Producer,
            MetaTagIdentifier::Publisher,
            MetaTagIdentifier::Remixer,
        ] {
            assert_eq!(MetaTagIdentifier::from_db_str(tag.to_db_str()), Some(tag));
        }
        assert_eq!(MetaTagIdentifier::from_db_str("BOGUS"), None);
    }

    #[test]
    fn meta_tag_identifier_role_buckets() {
        assert_eq!(
            MetaTagIdentifier::Producer.role(),
            ContributorRole::Production
        );
        assert_eq!(
            MetaTagIdentifier::Publisher.role(),
            ContributorRole::Publisher
        );
        assert_eq!(MetaTagIdentifier::Artist.role(), ContributorRole::Performer);
        assert_eq!(
            MetaTagIdentifier::Composer.role(),
            ContributorRole::Performer
        );
    }
}
