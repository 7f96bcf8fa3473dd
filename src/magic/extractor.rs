//! Tag and audio-property extraction.
//!
//! `TagReader` is the seam between the pipeline and the audio parsing
//! stack: production uses lofty over real files, tests substitute a stub
//! that fabricates tags without touching audio codecs.

use super::models::{AudioProperties, RawSongFile, RawTags};
use crate::catalog_store::MetaTagIdentifier;
use lofty::file::TaggedFileExt;
use lofty::prelude::{Accessor, AudioFile};
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse audio file {path}: {message}")]
    Parse { path: String, message: String },
}

pub trait TagReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<RawSongFile, ExtractError>;
}

/// Production tag reader backed by lofty.
pub struct LoftyTagReader;

/// Tag fields that become contributor credits, with the identifier each
/// maps to.
const CONTRIBUTOR_ITEM_KEYS: &[(MetaTagIdentifier, ItemKey)] = &[
    (MetaTagIdentifier::Composer, ItemKey::Composer),
    (MetaTagIdentifier::Conductor, ItemKey::Conductor),
    (MetaTagIdentifier::Engineer, ItemKey::Engineer),
    (MetaTagIdentifier::Lyricist, ItemKey::Lyricist),
    (MetaTagIdentifier::MixDj, ItemKey::MixDj),
    (MetaTagIdentifier::MixEngineer, ItemKey::MixEngineer),
    (MetaTagIdentifier::MusicianCredit, ItemKey::MusicianCredits),
    (MetaTagIdentifier::OriginalArtist, ItemKey::OriginalArtist),
    (MetaTagIdentifier::OriginalLyricist, ItemKey::OriginalLyricist),
    (MetaTagIdentifier::Producer, ItemKey::Producer),
    (MetaTagIdentifier::Publisher, ItemKey::Publisher),
    (MetaTagIdentifier::Remixer, ItemKey::Remixer),
];

/// Hash file contents with SHA-256, streamed in 64 KiB chunks.
pub fn hash_file(path: &Path) -> Result<(String, i64), ExtractError> {
    let io_error = |source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(io_error)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    let mut total: i64 = 0;
    loop {
        let read = file.read(&mut buffer).map_err(|source| ExtractError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if read == 0 {
            break;
        }
        total += read as i64;
        hasher.update(&buffer[..read]);
    }
    Ok((format!("{:x}", hasher.finalize()), total))
}

fn tag_string(tag: &Tag, key: &ItemKey) -> Option<String> {
    tag.get_string(key)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_year(value: Option<String>) -> Option<i32> {
    // Dates may be full timestamps ("1979-11-30"); the leading digits are
    // the year.
    let value = value?;
    let digits: String = value.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

impl TagReader for LoftyTagReader {
    fn read(&self, path: &Path) -> Result<RawSongFile, ExtractError> {
        let (file_hash, file_size) = hash_file(path)?;

        let tagged_file = Probe::open(path)
            .map_err(|e| ExtractError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?
            .read()
            .map_err(|e| ExtractError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        let properties = tagged_file.properties();
        let audio = AudioProperties {
            duration_ms: properties.duration().as_millis() as i64,
            bit_rate: properties.audio_bitrate().unwrap_or(0) as i64,
            sample_rate: properties.sample_rate().unwrap_or(0) as i64,
            bit_depth: properties.bit_depth().unwrap_or(0) as i64,
            channel_count: properties.channels().unwrap_or(0) as i64,
            is_vbr: properties
                .overall_bitrate()
                .zip(properties.audio_bitrate())
                .map(|(overall, audio)| overall != audio)
                .unwrap_or(false),
        };

        let mut tags = RawTags::default();
        if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
            tags.artist = tag.artist().map(|s| s.to_string());
            tags.album_artist = tag_string(tag, &ItemKey::AlbumArtist);
            tags.album = tag.album().map(|s| s.to_string());
            tags.title = tag.title().map(|s| s.to_string());
            tags.track_number = tag.track();
            tags.disc_number = tag.disk();
            tags.year = tag
                .year()
                .map(|y| y as i32)
                .or_else(|| parse_year(tag_string(tag, &ItemKey::RecordingDate)));
            tags.original_year = parse_year(tag_string(tag, &ItemKey::OriginalReleaseDate));
            tags.genre = tag.genre().map(|s| s.to_string());
            tags.comment = tag.comment().map(|s| s.to_string());
            tags.lyrics = tag_string(tag, &ItemKey::Lyrics);
            tags.musicbrainz_artist_id = tag_string(tag, &ItemKey::MusicBrainzArtistId);
            tags.musicbrainz_release_id = tag_string(tag, &ItemKey::MusicBrainzReleaseId);
            for (identifier, item_key) in CONTRIBUTOR_ITEM_KEYS {
                if let Some(value) = tag_string(tag, item_key) {
                    tags.contributors.push((*identifier, value));
                }
            }
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(RawSongFile {
            path: path.to_path_buf(),
            file_name,
            file_size,
            file_hash,
            tags,
            audio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_file_is_stable_and_sized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        std::fs::write(&path, b"some audio bytes").unwrap();

        let (hash_a, size) = hash_file(&path).unwrap();
        let (hash_b, _) = hash_file(&path).unwrap();
        assert_eq!(hash_a, hash_b);
        assert_eq!(size, 16);
        assert_eq!(hash_a.len(), 64);
    }

    #[test]
    fn hash_file_differs_on_content() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, b"content a").unwrap();
        std::fs::write(&b, b"content b").unwrap();
        assert_ne!(hash_file(&a).unwrap().0, hash_file(&b).unwrap().0);
    }

    #[test]
    fn hash_file_missing_path_is_io_error() {
        let err = hash_file(Path::new("/nonexistent/file.mp3")).unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }));
    }

    #[test]
    fn parse_year_handles_dates_and_plain_years() {
        assert_eq!(parse_year(Some("1979".to_string())), Some(1979));
        assert_eq!(parse_year(Some("1979-11-30".to_string())), Some(1979));
        assert_eq!(parse_year(Some("unknown".to_string())), None);
        assert_eq!(parse_year(None), None);
    }
}
