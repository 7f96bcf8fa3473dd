//! Common test infrastructure for the pipeline integration tests.
//!
//! Provides a catalog fixture over a temporary directory tree and a stub
//! tag reader that fabricates tags from plain-text files, so tests drive
//! the full pipeline without real audio codecs.

use cadenza_catalog_server::catalog_store::{CatalogStore, LibraryType, SqliteCatalogStore};
use cadenza_catalog_server::magic::{
    AudioProperties, ExtractError, RawSongFile, RawTags, TagReader,
};
use cadenza_catalog_server::pipeline::ScanOrchestrator;
use cadenza_catalog_server::settings::PipelineConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Reads fabricated tags from plain-text "audio" files: one `key=value`
/// per line. The file hash is the real content hash, so content edits
/// register as updates exactly like re-ripped audio would.
pub struct StubTagReader;

impl TagReader for StubTagReader {
    fn read(&self, path: &Path) -> Result<RawSongFile, ExtractError> {
        let (file_hash, file_size) = cadenza_catalog_server::magic::hash_file(path)?;
        let content = std::fs::read_to_string(path).map_err(|source| ExtractError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let values: HashMap<&str, &str> = content
            .lines()
            .filter_map(|line| line.split_once('='))
            .collect();

        let mut tags = RawTags {
            artist: values.get("artist").map(|v| v.to_string()),
            album_artist: values.get("albumartist").map(|v| v.to_string()),
            album: values.get("album").map(|v| v.to_string()),
            title: values.get("title").map(|v| v.to_string()),
            track_number: values.get("track").and_then(|v| v.parse().ok()),
            disc_number: values.get("disc").and_then(|v| v.parse().ok()),
            year: values.get("year").and_then(|v| v.parse().ok()),
            genre: values.get("genre").map(|v| v.to_string()),
            comment: values.get("comment").map(|v| v.to_string()),
            musicbrainz_artist_id: values.get("mb_artist_id").map(|v| v.to_string()),
            ..Default::default()
        };
        for (key, identifier) in [
            ("producer", cadenza_catalog_server::catalog_store::MetaTagIdentifier::Producer),
            ("composer", cadenza_catalog_server::catalog_store::MetaTagIdentifier::Composer),
            ("publisher", cadenza_catalog_server::catalog_store::MetaTagIdentifier::Publisher),
        ] {
            if let Some(value) = values.get(key) {
                tags.contributors.push((identifier, value.to_string()));
            }
        }

        Ok(RawSongFile {
            path: path.to_path_buf(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            file_size,
            file_hash,
            tags,
            audio: AudioProperties {
                duration_ms: 180_000,
                bit_rate: 320,
                sample_rate: 44_100,
                bit_depth: 16,
                channel_count: 2,
                is_vbr: false,
            },
        })
    }
}

/// A catalog database plus an inbound directory tree the orchestrator
/// scans, living in one temp dir.
pub struct PipelineFixture {
    pub store: Arc<SqliteCatalogStore>,
    pub orchestrator: ScanOrchestrator,
    pub inbound: PathBuf,
    _temp: TempDir,
}

impl PipelineFixture {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::defaults())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        let temp = TempDir::new().unwrap();
        let inbound = temp.path().join("inbound");
        std::fs::create_dir_all(&inbound).unwrap();
        let store = Arc::new(SqliteCatalogStore::new(temp.path().join("catalog.db"), 2).unwrap());
        store
            .set_library_path(LibraryType::Inbound, &inbound.display().to_string())
            .unwrap();
        let orchestrator = ScanOrchestrator::with_worker_count(
            store.clone(),
            Arc::new(StubTagReader),
            config,
            2,
        )
        .unwrap();
        Self {
            store,
            orchestrator,
            inbound,
            _temp: temp,
        }
    }

    pub fn inbound_library_id(&self) -> i64 {
        self.store
            .get_library_by_type(LibraryType::Inbound)
            .unwrap()
            .unwrap()
            .id
    }

    /// Write one fabricated song file under `artist_dir/album_dir`.
    pub fn write_song(&self, artist_dir: &str, album_dir: &str, file: &str, lines: &[(&str, &str)]) {
        let dir = self.inbound.join(artist_dir).join(album_dir);
        std::fs::create_dir_all(&dir).unwrap();
        let content: String = lines.iter().map(|(k, v)| format!("{k}={v}\n")).collect();
        std::fs::write(dir.join(file), content).unwrap();
    }
}
