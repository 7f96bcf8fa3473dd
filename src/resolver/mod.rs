//! Identity resolution: maps a normalized album candidate onto the
//! existing catalog or decides that new rows are needed.
//!
//! Resolution keys, in priority order:
//! - Artist: MusicBrainz id exact match, then `(library, name_normalized)`.
//! - Album: `(artist, name_normalized)`.
//! - Song: `(album, song_number)`, with a file-hash short-circuit.
//!
//! Reads race freely against concurrent commits; the store's commit path
//! re-resolves conflicts under its transaction, so a stale read here can
//! only cost an extra re-select, never a duplicate row.

pub mod contributors;

use crate::catalog_store::{
    AlbumWrite, ArtistWrite, CatalogStore, SongFields, SongWrite, UnitWrite,
};
use crate::magic::{AlbumCandidate, SongCandidate};
use anyhow::Result;
use tracing::debug;

/// A conflict that must be surfaced via the duplicate/skip path instead of
/// being silently merged or overwritten.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolutionConflict {
    /// The album name collides with an existing album whose content is
    /// materially different (different file/hash set).
    DuplicateAlbum { existing_album_id: i64 },
    /// Same normalized name but disagreeing MusicBrainz ids.
    AmbiguousIdentity { detail: String },
}

impl std::fmt::Display for ResolutionConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionConflict::DuplicateAlbum { existing_album_id } => {
                write!(f, "duplicate of album id {}", existing_album_id)
            }
            ResolutionConflict::AmbiguousIdentity { detail } => {
                write!(f, "ambiguous identity: {}", detail)
            }
        }
    }
}

/// Outcome of resolving one candidate directory.
#[derive(Clone, Debug)]
pub enum UnitResolution {
    /// Every file matched an existing song by hash; nothing to write.
    Unchanged,
    /// The unit maps to creates/updates described by the contained write.
    Write(Box<UnitWrite>),
    /// The unit must not be committed; the directory gets prefixed.
    Conflict(ResolutionConflict),
}

pub struct IdentityResolver<'a> {
    store: &'a dyn CatalogStore,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(store: &'a dyn CatalogStore) -> Self {
        Self { store }
    }

    /// Resolve a candidate against the catalog. `contributors` are the
    /// already-assigned rows for this unit (see [`contributors`]).
    pub fn resolve(
        &self,
        library_id: i64,
        candidate: &AlbumCandidate,
        contributors: Vec<crate::catalog_store::ContributorWrite>,
    ) -> Result<UnitResolution> {
        // ---- Artist ---------------------------------------------------------
        let mut existing_artist = None;
        if let Some(mbid) = &candidate.artist_musicbrainz_id {
            existing_artist = self.store.find_artist_by_musicbrainz_id(mbid)?;
        }
        if existing_artist.is_none() {
            let by_name = self
                .store
                .find_artist_by_normalized_name(library_id, &candidate.artist_name_normalized)?;
            if let Some(found) = &by_name {
                if let (Some(existing_mbid), Some(candidate_mbid)) =
                    (&found.musicbrainz_id, &candidate.artist_musicbrainz_id)
                {
                    if existing_mbid != candidate_mbid {
                        return Ok(UnitResolution::Conflict(
                            ResolutionConflict::AmbiguousIdentity {
                                detail: format!(
                                    "artist '{}' exists with MusicBrainz id {} but candidate carries {}",
                                    candidate.artist_name, existing_mbid, candidate_mbid
                                ),
                            },
                        ));
                    }
                }
            }
            existing_artist = by_name;
        }

        let artist_write = ArtistWrite {
            existing_id: existing_artist.as_ref().map(|a| a.id),
            name: candidate.artist_name.clone(),
            name_normalized: candidate.artist_name_normalized.clone(),
            sort_name: candidate.artist_sort_name.clone(),
            directory: candidate.artist_name.clone(),
            musicbrainz_id: candidate.artist_musicbrainz_id.clone(),
        };

        // ---- Album ----------------------------------------------------------
        let existing_album = match &existing_artist {
            Some(artist) => self
                .store
                .find_album_by_normalized_name(artist.id, &candidate.album_name_normalized)?,
            None => None,
        };

        let songs = match &existing_album {
            None => candidate
                .songs
                .iter()
                .map(|song| SongWrite::Create(song_fields(song)))
                .collect::<Vec<_>>(),
            Some(album) => {
                if let (Some(existing_mbid), Some(candidate_mbid)) =
                    (&album.musicbrainz_id, &candidate.album_musicbrainz_id)
                {
                    if existing_mbid != candidate_mbid {
                        return Ok(UnitResolution::Conflict(
                            ResolutionConflict::AmbiguousIdentity {
                                detail: format!(
                                    "album '{}' exists with MusicBrainz id {} but candidate carries {}",
                                    candidate.album_name, existing_mbid, candidate_mbid
                                ),
                            },
                        ));
                    }
                }

                let existing_positions = self.store.get_album_song_positions(album.id)?;
                let existing_numbers: Vec<i64> =
                    existing_positions.iter().map(|(n, _)| *n).collect();
                let mut candidate_numbers: Vec<i64> =
                    candidate.songs.iter().map(|s| s.song_number).collect();
                candidate_numbers.sort();

                // A different file set is a duplicate, not an overwrite.
                if existing_numbers != candidate_numbers {
                    return Ok(UnitResolution::Conflict(ResolutionConflict::DuplicateAlbum {
                        existing_album_id: album.id,
                    }));
                }

                let mut songs = Vec::with_capacity(candidate.songs.len());
                let mut any_change = false;
                for song in &candidate.songs {
                    let existing_hash = existing_positions
                        .iter()
                        .find(|(n, _)| *n == song.song_number)
                        .map(|(_, h)| h.as_str());
                    if existing_hash == Some(song.file_hash.as_str()) {
                        debug!(
                            "Song {} position {} unchanged by hash",
                            song.file_name, song.song_number
                        );
                        songs.push(SongWrite::Unchanged);
                        continue;
                    }
                    let existing = self
                        .store
                        .find_song_by_position(album.id, song.song_number)?;
                    match existing {
                        Some(row) => {
                            songs.push(SongWrite::Update {
                                id: row.id,
                                fields: song_fields(song),
                            });
                            any_change = true;
                        }
                        None => {
                            songs.push(SongWrite::Create(song_fields(song)));
                            any_change = true;
                        }
                    }
                }
                if !any_change {
                    return Ok(UnitResolution::Unchanged);
                }
                songs
            }
        };

        let album_write = AlbumWrite {
            existing_id: existing_album.as_ref().map(|a| a.id),
            name: candidate.album_name.clone(),
            name_normalized: candidate.album_name_normalized.clone(),
            sort_name: candidate.album_sort_name.clone(),
            directory: candidate.directory.display().to_string(),
            album_type: crate::catalog_store::AlbumType::Album,
            release_date: candidate.release_year,
            original_release_date: candidate.original_release_year,
            genres: candidate.genres.clone(),
            musicbrainz_id: candidate.album_musicbrainz_id.clone(),
        };

        Ok(UnitResolution::Write(Box::new(UnitWrite {
            library_id,
            artist: artist_write,
            album: album_write,
            songs,
            contributors,
        })))
    }
}

fn song_fields(song: &SongCandidate) -> SongFields {
    SongFields {
        song_number: song.song_number,
        disc_number: song.disc_number,
        title: song.title.clone(),
        title_normalized: song.title_normalized.clone(),
        file_name: song.file_name.clone(),
        file_hash: song.file_hash.clone(),
        file_size: song.file_size,
        duration_ms: song.duration_ms,
        bit_rate: song.bit_rate,
        sample_rate: song.sample_rate,
        bit_depth: song.bit_depth,
        channel_count: song.channel_count,
        is_vbr: song.is_vbr,
        lyrics: song.lyrics.clone(),
        part_titles: None,
    }
}
