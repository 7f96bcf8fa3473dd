//! In-memory candidate graph produced by metadata extraction and magic
//! processing, independent of persistence.

use crate::catalog_store::MetaTagIdentifier;
use std::path::PathBuf;

/// Raw tag values read from one audio file, before any normalization.
#[derive(Clone, Debug, Default)]
pub struct RawTags {
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub year: Option<i32>,
    pub original_year: Option<i32>,
    pub genre: Option<String>,
    pub comment: Option<String>,
    pub lyrics: Option<String>,
    pub musicbrainz_artist_id: Option<String>,
    pub musicbrainz_release_id: Option<String>,
    /// Contributor credits with the tag field they were read from.
    pub contributors: Vec<(MetaTagIdentifier, String)>,
}

/// Decoded audio characteristics of one file.
#[derive(Clone, Copy, Debug, Default)]
pub struct AudioProperties {
    pub duration_ms: i64,
    pub bit_rate: i64,
    pub sample_rate: i64,
    pub bit_depth: i64,
    pub channel_count: i64,
    pub is_vbr: bool,
}

/// One audio file with tags, audio properties and content hash.
#[derive(Clone, Debug)]
pub struct RawSongFile {
    pub path: PathBuf,
    pub file_name: String,
    pub file_size: i64,
    pub file_hash: String,
    pub tags: RawTags,
    pub audio: AudioProperties,
}

/// A contributor credit surviving the ignore-list filter, not yet resolved
/// against catalog artists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContributorCandidate {
    pub name: String,
    pub meta_tag_identifier: MetaTagIdentifier,
}

#[derive(Clone, Debug)]
pub struct SongCandidate {
    pub file_name: String,
    pub file_hash: String,
    pub file_size: i64,
    pub song_number: i64,
    /// Padded display form of the song number ("0003" for 3 under a
    /// maximum of 9999), used for stable file ordering.
    pub song_number_padded: String,
    pub disc_number: i64,
    pub title: String,
    pub title_normalized: String,
    /// Song-level artist after magic processing, when it differs from the
    /// album artist.
    pub artist_name: Option<String>,
    pub duration_ms: i64,
    pub bit_rate: i64,
    pub sample_rate: i64,
    pub bit_depth: i64,
    pub channel_count: i64,
    pub is_vbr: bool,
    pub lyrics: Option<String>,
    pub comment: Option<String>,
}

/// The normalized album/song/contributor graph for one candidate
/// directory. Deterministic for identical inputs and settings.
#[derive(Clone, Debug)]
pub struct AlbumCandidate {
    pub directory: PathBuf,
    pub artist_name: String,
    pub artist_name_normalized: String,
    pub artist_sort_name: String,
    pub artist_musicbrainz_id: Option<String>,
    pub album_name: String,
    pub album_name_normalized: String,
    pub album_sort_name: String,
    pub album_musicbrainz_id: Option<String>,
    pub release_year: Option<i64>,
    pub original_release_year: Option<i64>,
    pub genres: Vec<String>,
    pub songs: Vec<SongCandidate>,
    pub contributors: Vec<ContributorCandidate>,
}

impl AlbumCandidate {
    /// The `(song_number, file_hash)` content fingerprint used to compare
    /// this candidate against a persisted album.
    pub fn content_fingerprint(&self) -> Vec<(i64, String)> {
        let mut fingerprint: Vec<(i64, String)> = self
            .songs
            .iter()
            .map(|s| (s.song_number, s.file_hash.clone()))
            .collect();
        fingerprint.sort();
        fingerprint
    }
}
