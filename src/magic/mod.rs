//! The "magic" engine: tag extraction plus the ordered, independently
//! toggleable normalization rules applied to a candidate directory before
//! identity resolution.
//!
//! Rule order is fixed (title removals, sort names, artist replacements,
//! featuring extraction, separator normalization, year validation,
//! renumbering, comment deletion); each rule is gated by its own setting.
//! The output is deterministic for identical inputs and settings, which is
//! what makes rescans idempotent.

mod extractor;
mod models;
pub mod normalize;

pub use extractor::{hash_file, ExtractError, LoftyTagReader, TagReader};
pub use models::{
    AlbumCandidate, AudioProperties, ContributorCandidate, RawSongFile, RawTags, SongCandidate,
};

use crate::catalog_store::MetaTagIdentifier;
use crate::settings::PipelineConfig;
use chrono::Datelike;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MagicError {
    #[error("Directory {0} contains no readable audio files")]
    NoAudioFiles(String),
}

pub struct MagicEngine {
    config: PipelineConfig,
}

impl MagicEngine {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Build the normalized candidate graph for one album directory.
    pub fn process(
        &self,
        directory: &Path,
        mut files: Vec<RawSongFile>,
    ) -> Result<AlbumCandidate, MagicError> {
        if files.is_empty() {
            return Err(MagicError::NoAudioFiles(directory.display().to_string()));
        }
        // Stable input order regardless of filesystem enumeration.
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        let magic = &self.config.magic;
        let processing = &self.config.processing;
        let validation = &self.config.validation;
        let magic_on = magic.enabled;
        let current_year = chrono::Utc::now().year() as i64;

        let mut contributors: Vec<ContributorCandidate> = Vec::new();

        // Album artist: the albumartist tag wins, then the first track
        // artist, then the parent directory name.
        let raw_artist = files
            .iter()
            .find_map(|f| f.tags.album_artist.clone())
            .or_else(|| files.iter().find_map(|f| f.tags.artist.clone()))
            .unwrap_or_else(|| directory_display_name(directory.parent()));
        let mut artist_name = normalize::clean_display(&raw_artist);
        if magic_on && magic.do_remove_featuring_artist_from_song_artist {
            let (main, featured) = normalize::split_featuring(&artist_name);
            artist_name = main;
            if let Some(featured) = featured {
                push_featured_artists(&mut contributors, &featured);
            }
        }
        artist_name =
            normalize::apply_artist_replacement(&artist_name, &processing.artist_name_replacements);

        // Album title, with unwanted-fragment removal.
        let raw_album = files
            .iter()
            .find_map(|f| f.tags.album.clone())
            .unwrap_or_else(|| directory_display_name(Some(directory)));
        let album_name = if magic_on && magic.do_remove_unwanted_text_from_album_title {
            normalize::strip_fragments(&raw_album, &processing.album_title_removals)
        } else {
            normalize::clean_display(&raw_album)
        };

        // Release years, clamped per validation bounds.
        let tagged_year = files.iter().find_map(|f| f.tags.year).map(i64::from);
        let tagged_original_year = files
            .iter()
            .find_map(|f| f.tags.original_year)
            .map(i64::from);
        let release_year = normalize::validate_year(
            tagged_year,
            validation.minimum_album_year,
            validation.maximum_album_year,
            magic_on && magic.do_set_year_to_current_if_invalid,
            current_year,
        );
        let original_release_year = normalize::validate_year(
            tagged_original_year.or(tagged_year),
            validation.minimum_album_year,
            validation.maximum_album_year,
            processing.do_use_current_year_as_default_orig_album_year,
            current_year,
        );

        let mut genres: Vec<String> = Vec::new();
        for file in &files {
            if let Some(genre) = &file.tags.genre {
                let genre = normalize::clean_display(genre);
                if !genre.is_empty() && !genres.contains(&genre) {
                    genres.push(genre);
                }
            }
        }

        let mut songs = self.build_songs(&files, &artist_name, &mut contributors);

        if magic_on && magic.do_renumber_songs {
            renumber_songs(&mut songs, validation.maximum_song_number);
        }
        for song in &mut songs {
            song.song_number_padded =
                normalize::pad_number(song.song_number, validation.maximum_song_number);
        }
        songs.sort_by(|a, b| (a.disc_number, a.song_number).cmp(&(b.disc_number, b.song_number)));

        // Per-file contributor credits (producer, composer, ...).
        for file in &files {
            for (identifier, value) in &file.tags.contributors {
                for name in normalize::split_artist_list(value) {
                    contributors.push(ContributorCandidate {
                        name,
                        meta_tag_identifier: *identifier,
                    });
                }
            }
        }
        dedup_contributors(&mut contributors);

        let artist_musicbrainz_id = files
            .iter()
            .find_map(|f| f.tags.musicbrainz_artist_id.clone());
        let album_musicbrainz_id = files
            .iter()
            .find_map(|f| f.tags.musicbrainz_release_id.clone());

        Ok(AlbumCandidate {
            directory: directory.to_path_buf(),
            artist_name_normalized: normalize::normalize_name(&artist_name),
            artist_sort_name: normalize::sort_name(&artist_name, &processing.ignored_articles),
            artist_name,
            artist_musicbrainz_id,
            album_name_normalized: normalize::normalize_name(&album_name),
            album_sort_name: normalize::sort_name(&album_name, &processing.ignored_articles),
            album_name,
            album_musicbrainz_id,
            release_year,
            original_release_year,
            genres,
            songs,
            contributors,
        })
    }

    fn build_songs(
        &self,
        files: &[RawSongFile],
        album_artist: &str,
        contributors: &mut Vec<ContributorCandidate>,
    ) -> Vec<SongCandidate> {
        let magic = &self.config.magic;
        let processing = &self.config.processing;
        let validation = &self.config.validation;
        let magic_on = magic.enabled;

        files
            .iter()
            .map(|file| {
                let raw_title = file
                    .tags
                    .title
                    .clone()
                    .unwrap_or_else(|| file_stem_display(&file.file_name));
                let mut title = if magic_on && magic.do_remove_unwanted_text_from_song_titles {
                    normalize::strip_fragments(&raw_title, &processing.song_title_removals)
                } else {
                    normalize::clean_display(&raw_title)
                };
                if magic_on && magic.do_remove_featuring_artist_from_song_title {
                    let (main, featured) = normalize::split_featuring(&title);
                    title = main;
                    if let Some(featured) = featured {
                        push_featured_artists(contributors, &featured);
                    }
                }

                let mut song_artist = file.tags.artist.clone().map(|a| {
                    normalize::apply_artist_replacement(&a, &processing.artist_name_replacements)
                });
                if magic_on && magic.do_remove_featuring_artist_from_song_artist {
                    if let Some(artist) = song_artist.take() {
                        let (main, featured) = normalize::split_featuring(&artist);
                        song_artist = Some(main);
                        if let Some(featured) = featured {
                            push_featured_artists(contributors, &featured);
                        }
                    }
                }
                if magic_on && magic.do_replace_songs_artist_separators {
                    song_artist = song_artist
                        .map(|a| normalize::canonicalize_artist_separators(&a))
                        .filter(|a| !a.is_empty());
                }
                // Only keep a per-song artist when it differs from the album
                // artist; equal values carry no information.
                if song_artist.as_deref() == Some(album_artist) {
                    song_artist = None;
                }

                let tagged_number = file.tags.track_number.map(i64::from).unwrap_or(0);
                let song_number = if tagged_number >= 1
                    && tagged_number <= validation.maximum_song_number
                {
                    tagged_number
                } else {
                    0 // resolved by renumbering or positional fallback below
                };
                let disc_number = file
                    .tags
                    .disc_number
                    .map(i64::from)
                    .filter(|d| *d >= 1 && *d <= validation.maximum_media_number)
                    .unwrap_or(1);

                let comment = if magic_on && processing.do_delete_comments {
                    None
                } else {
                    file.tags.comment.clone()
                };

                SongCandidate {
                    file_name: file.file_name.clone(),
                    file_hash: file.file_hash.clone(),
                    file_size: file.file_size,
                    song_number,
                    song_number_padded: String::new(),
                    disc_number,
                    title_normalized: normalize::normalize_name(&title),
                    title,
                    artist_name: song_artist,
                    duration_ms: file.audio.duration_ms,
                    bit_rate: file.audio.bit_rate,
                    sample_rate: file.audio.sample_rate,
                    bit_depth: file.audio.bit_depth,
                    channel_count: file.audio.channel_count,
                    is_vbr: file.audio.is_vbr,
                    lyrics: file.tags.lyrics.clone(),
                    comment,
                }
            })
            .collect()
    }
}

fn push_featured_artists(contributors: &mut Vec<ContributorCandidate>, featured: &str) {
    for name in normalize::split_artist_list(featured) {
        contributors.push(ContributorCandidate {
            name,
            meta_tag_identifier: MetaTagIdentifier::Artist,
        });
    }
}

fn dedup_contributors(contributors: &mut Vec<ContributorCandidate>) {
    let mut seen = std::collections::HashSet::new();
    contributors.retain(|c| seen.insert((c.name.to_lowercase(), c.meta_tag_identifier)));
}

/// Sequential, collision-free song numbers within each disc: a tagged
/// number is kept when it advances the sequence, otherwise the song gets
/// the next free position (two songs tagged 3 become 3 and 4).
fn renumber_songs(songs: &mut [SongCandidate], maximum_song_number: i64) {
    let mut discs: Vec<i64> = songs.iter().map(|s| s.disc_number).collect();
    discs.sort();
    discs.dedup();

    for disc in discs {
        let mut indices: Vec<usize> = (0..songs.len())
            .filter(|&i| songs[i].disc_number == disc)
            .collect();
        indices.sort_by(|&a, &b| {
            (songs[a].song_number, &songs[a].file_name)
                .cmp(&(songs[b].song_number, &songs[b].file_name))
        });
        let mut previous = 0i64;
        for index in indices {
            let tagged = songs[index].song_number;
            let assigned = if tagged > previous { tagged } else { previous + 1 };
            let assigned = assigned.min(maximum_song_number.max(1));
            let assigned = assigned.max(previous + 1);
            songs[index].song_number = assigned;
            previous = assigned;
        }
    }
}

fn directory_display_name(path: Option<&Path>) -> String {
    path.and_then(Path::file_name)
        .map(|n| n.to_string_lossy().replace('_', " "))
        .map(|n| normalize::clean_display(&n))
        .unwrap_or_default()
}

fn file_stem_display(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());
    normalize::clean_display(&stem.replace('_', " "))
}
