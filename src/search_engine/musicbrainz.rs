//! MusicBrainz search engine backed by a local lookup database.
//!
//! Rather than hitting the MusicBrainz web service per lookup, artists are
//! imported in bulk from the published JSON dump into a small SQLite
//! database under `searchEngine.musicbrainz.storagePath`. The update job
//! feeds the repository; the engine only reads it.

use super::{ArtistSearchResult, SearchEngine};
use crate::magic::normalize;
use crate::sqlite_column;
use crate::sqlite_persistence::{
    migrate_to_latest, Column, SqlType, Table, VersionedSchema,
};
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde::Deserialize;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

const MUSICBRAINZ_DB_FILE: &str = "musicbrainz.db";

const MB_ARTISTS_TABLE: Table = Table {
    name: "mb_artists",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("musicbrainz_id", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("name_normalized", &SqlType::Text, non_null = true),
        sqlite_column!("sort_name", &SqlType::Text),
    ],
    indices: &[("idx_mb_artists_name_normalized", "name_normalized")],
    unique_constraints: &[],
};

const MB_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[MB_ARTISTS_TABLE],
    migration: None,
}];

/// One artist line from the MusicBrainz JSON dump.
#[derive(Debug, Deserialize)]
struct DumpArtist {
    id: String,
    name: String,
    #[serde(rename = "sort-name")]
    sort_name: Option<String>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub batches: usize,
}

/// Local MusicBrainz artist repository.
pub struct MusicBrainzRepository {
    conn: Mutex<Connection>,
}

impl MusicBrainzRepository {
    /// Open (creating if needed) the repository database under
    /// `storage_path`.
    pub fn open(storage_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(storage_path).with_context(|| {
            format!("Failed to create MusicBrainz storage path {:?}", storage_path)
        })?;
        let mut conn = Connection::open(storage_path.join(MUSICBRAINZ_DB_FILE))?;
        migrate_to_latest(&mut conn, MB_VERSIONED_SCHEMAS)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn artist_count(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row("SELECT COUNT(*) FROM mb_artists", [], |r| r.get(0))?)
    }

    /// Import a newline-delimited JSON artist dump. Records land in
    /// `batch_size`-row transactions; `maximum_batches` of 0 means
    /// unlimited. Malformed lines are counted and skipped.
    pub fn import_dump<R: BufRead>(
        &self,
        reader: R,
        batch_size: usize,
        maximum_batches: usize,
    ) -> Result<ImportSummary> {
        let batch_size = batch_size.max(1);
        let mut summary = ImportSummary::default();
        let mut batch: Vec<DumpArtist> = Vec::with_capacity(batch_size);

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DumpArtist>(&line) {
                Ok(artist) => batch.push(artist),
                Err(e) => {
                    summary.skipped += 1;
                    warn!("Skipping malformed dump line: {}", e);
                }
            }
            if batch.len() == batch_size {
                self.commit_batch(&mut batch, &mut summary)?;
                if maximum_batches > 0 && summary.batches >= maximum_batches {
                    info!(
                        "Stopping import after {} batches (configured maximum)",
                        summary.batches
                    );
                    return Ok(summary);
                }
            }
        }
        if !batch.is_empty() {
            self.commit_batch(&mut batch, &mut summary)?;
        }
        Ok(summary)
    }

    /// Import every `*.json`/`*.jsonl` dump file under the storage path.
    pub fn import_dump_files(
        &self,
        storage_path: &Path,
        batch_size: usize,
        maximum_batches: usize,
    ) -> Result<ImportSummary> {
        let mut total = ImportSummary::default();
        let mut dump_files: Vec<PathBuf> = std::fs::read_dir(storage_path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("json") | Some("jsonl")
                )
            })
            .collect();
        dump_files.sort();

        for dump_file in dump_files {
            if maximum_batches > 0 && total.batches >= maximum_batches {
                break;
            }
            info!("Importing MusicBrainz dump file {:?}", dump_file);
            let file = std::fs::File::open(&dump_file)?;
            let remaining_batches = if maximum_batches > 0 {
                maximum_batches - total.batches
            } else {
                0
            };
            let summary = self.import_dump(
                std::io::BufReader::new(file),
                batch_size,
                remaining_batches,
            )?;
            total.imported += summary.imported;
            total.skipped += summary.skipped;
            total.batches += summary.batches;
        }
        Ok(total)
    }

    fn commit_batch(
        &self,
        batch: &mut Vec<DumpArtist>,
        summary: &mut ImportSummary,
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for artist in batch.drain(..) {
            let inserted = tx.execute(
                "INSERT INTO mb_artists (musicbrainz_id, name, name_normalized, sort_name)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(musicbrainz_id) DO UPDATE SET
                     name = excluded.name,
                     name_normalized = excluded.name_normalized,
                     sort_name = excluded.sort_name",
                params![
                    artist.id,
                    artist.name,
                    normalize::normalize_name(&artist.name),
                    artist.sort_name,
                ],
            )?;
            summary.imported += inserted;
        }
        tx.commit()?;
        summary.batches += 1;
        Ok(())
    }

    /// Exact lookup on the normalized name.
    pub fn find_by_normalized_name(
        &self,
        name_normalized: &str,
        limit: usize,
    ) -> Result<Vec<ArtistSearchResult>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT musicbrainz_id, name FROM mb_artists
             WHERE name_normalized = ?1 ORDER BY id LIMIT ?2",
        )?;
        let results = stmt
            .query_map(params![name_normalized, limit as i64], |row| {
                Ok(ArtistSearchResult {
                    musicbrainz_id: Some(row.get(0)?),
                    name: row.get(1)?,
                    ..Default::default()
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(results)
    }
}

/// The `SearchEngine` facade over the local repository.
pub struct MusicBrainzEngine {
    repository: std::sync::Arc<MusicBrainzRepository>,
}

impl MusicBrainzEngine {
    pub fn new(repository: std::sync::Arc<MusicBrainzRepository>) -> Self {
        Self { repository }
    }
}

impl SearchEngine for MusicBrainzEngine {
    fn id(&self) -> &'static str {
        "musicbrainz"
    }

    fn search_artist(&self, name: &str, page_size: usize) -> Result<Vec<ArtistSearchResult>> {
        self.repository
            .find_by_normalized_name(&normalize::normalize_name(name), page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn dump_line(id: &str, name: &str) -> String {
        format!(r#"{{"id":"{id}","name":"{name}","sort-name":"{name}"}}"#)
    }

    fn open_repository() -> (MusicBrainzRepository, TempDir) {
        let temp = TempDir::new().unwrap();
        let repository = MusicBrainzRepository::open(temp.path()).unwrap();
        (repository, temp)
    }

    #[test]
    fn import_and_lookup_round_trip() {
        let (repository, _dir) = open_repository();
        let dump = [
            dump_line("mbid-1", "Pink Floyd"),
            dump_line("mbid-2", "Genesis"),
        ]
        .join("\n");

        let summary = repository
            .import_dump(Cursor::new(dump), 100, 0)
            .unwrap();
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.batches, 1);
        assert_eq!(repository.artist_count().unwrap(), 2);

        let found = repository.find_by_normalized_name("PINK FLOYD", 10).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].musicbrainz_id.as_deref(), Some("mbid-1"));
    }

    #[test]
    fn import_is_idempotent_per_musicbrainz_id() {
        let (repository, _dir) = open_repository();
        let dump = dump_line("mbid-1", "Pink Floyd");
        repository
            .import_dump(Cursor::new(dump.clone()), 100, 0)
            .unwrap();
        repository.import_dump(Cursor::new(dump), 100, 0).unwrap();
        assert_eq!(repository.artist_count().unwrap(), 1);
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let (repository, _dir) = open_repository();
        let dump = format!("{}\nnot json at all\n{}", dump_line("a", "A"), dump_line("b", "B"));
        let summary = repository.import_dump(Cursor::new(dump), 100, 0).unwrap();
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn batch_cap_stops_early() {
        let (repository, _dir) = open_repository();
        let dump: String = (0..10)
            .map(|i| dump_line(&format!("mbid-{i}"), &format!("Artist {i}")))
            .collect::<Vec<_>>()
            .join("\n");
        let summary = repository.import_dump(Cursor::new(dump), 2, 3).unwrap();
        assert_eq!(summary.batches, 3);
        assert_eq!(summary.imported, 6);
    }

    #[test]
    fn engine_searches_by_normalized_name() {
        let (repository, _dir) = open_repository();
        repository
            .import_dump(Cursor::new(dump_line("mbid-1", "Pink Floyd")), 10, 0)
            .unwrap();
        let engine = MusicBrainzEngine::new(std::sync::Arc::new(repository));
        let results = engine.search_artist("pink_floyd", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Pink Floyd");
    }

    #[test]
    fn reopen_keeps_imported_artists() {
        let temp = TempDir::new().unwrap();
        {
            let repository = MusicBrainzRepository::open(temp.path()).unwrap();
            repository
                .import_dump(Cursor::new(dump_line("mbid-1", "Pink Floyd")), 10, 0)
                .unwrap();
        }
        let repository = MusicBrainzRepository::open(temp.path()).unwrap();
        assert_eq!(repository.artist_count().unwrap(), 1);
    }
}
