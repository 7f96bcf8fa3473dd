//! SQLite-backed catalog store implementation.
//!
//! One mutex-guarded write connection serializes all mutations; a small
//! pool of read-only connections serves resolution lookups so reads can
//! race freely with each other. Databases are created/migrated/validated
//! on open and seeded with the four canonical libraries and the settings
//! registry defaults.

use super::models::*;
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::trait_def::*;
use crate::settings::registry::SETTINGS_REGISTRY;
use crate::sqlite_persistence::migrate_to_latest;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

/// The four canonical library roles, seeded on first open.
const DEFAULT_LIBRARIES: &[(&str, &str, LibraryType, i64)] = &[
    ("Inbound", "/storage/inbound/", LibraryType::Inbound, 1),
    ("Staging", "/storage/staging/", LibraryType::Staging, 2),
    ("Library", "/storage/library/", LibraryType::Storage, 3),
    ("User Images", "/storage/images/users/", LibraryType::UserImages, 4),
];

const ARTIST_COLUMNS: &str = "id, api_key, library_id, name, name_normalized, sort_name, directory, \
     album_count, song_count, musicbrainz_id, spotify_id, discogs_id, itunes_id, amg_id, \
     wikidata_id, lastfm_id, meta_data_status, calculated_rating, created_at, updated_at";

const ALBUM_COLUMNS: &str = "id, api_key, artist_id, name, name_normalized, sort_name, directory, \
     album_status, album_type, release_date, original_release_date, song_count, duration_ms, \
     genres, moods, musicbrainz_id, spotify_id, meta_data_status, created_at, updated_at";

const SONG_COLUMNS: &str = "id, api_key, album_id, song_number, disc_number, title, \
     title_normalized, file_name, file_hash, file_size, duration_ms, bit_rate, sample_rate, \
     bit_depth, channel_count, is_vbr, lyrics, part_titles, created_at, updated_at";

pub struct SqliteCatalogStore {
    read_pool: Vec<Arc<Mutex<Connection>>>,
    write_conn: Arc<Mutex<Connection>>,
    read_index: AtomicUsize,
}

fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

fn new_api_key() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn artist_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Artist> {
    Ok(Artist {
        id: row.get(0)?,
        api_key: row.get(1)?,
        library_id: row.get(2)?,
        name: row.get(3)?,
        name_normalized: row.get(4)?,
        sort_name: row.get(5)?,
        directory: row.get(6)?,
        album_count: row.get(7)?,
        song_count: row.get(8)?,
        musicbrainz_id: row.get(9)?,
        spotify_id: row.get(10)?,
        discogs_id: row.get(11)?,
        itunes_id: row.get(12)?,
        amg_id: row.get(13)?,
        wikidata_id: row.get(14)?,
        lastfm_id: row.get(15)?,
        meta_data_status: MetaDataStatus::from_db_str(&row.get::<_, String>(16)?),
        calculated_rating: row.get(17)?,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
    })
}

fn album_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Album> {
    let genres: String = row.get(13)?;
    let moods: String = row.get(14)?;
    Ok(Album {
        id: row.get(0)?,
        api_key: row.get(1)?,
        artist_id: row.get(2)?,
        name: row.get(3)?,
        name_normalized: row.get(4)?,
        sort_name: row.get(5)?,
        directory: row.get(6)?,
        album_status: AlbumStatus::from_db_str(&row.get::<_, String>(7)?),
        album_type: AlbumType::from_db_str(&row.get::<_, String>(8)?),
        release_date: row.get(9)?,
        original_release_date: row.get(10)?,
        song_count: row.get(11)?,
        duration_ms: row.get(12)?,
        genres: serde_json::from_str(&genres).unwrap_or_default(),
        moods: serde_json::from_str(&moods).unwrap_or_default(),
        musicbrainz_id: row.get(15)?,
        spotify_id: row.get(16)?,
        meta_data_status: MetaDataStatus::from_db_str(&row.get::<_, String>(17)?),
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
    })
}

fn song_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Song> {
    Ok(Song {
        id: row.get(0)?,
        api_key: row.get(1)?,
        album_id: row.get(2)?,
        song_number: row.get(3)?,
        disc_number: row.get(4)?,
        title: row.get(5)?,
        title_normalized: row.get(6)?,
        file_name: row.get(7)?,
        file_hash: row.get(8)?,
        file_size: row.get(9)?,
        duration_ms: row.get(10)?,
        bit_rate: row.get(11)?,
        sample_rate: row.get(12)?,
        bit_depth: row.get(13)?,
        channel_count: row.get(14)?,
        is_vbr: row.get::<_, i64>(15)? != 0,
        lyrics: row.get(16)?,
        part_titles: row.get(17)?,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
    })
}

fn library_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Library> {
    let type_value: i64 = row.get(4)?;
    Ok(Library {
        id: row.get(0)?,
        api_key: row.get(1)?,
        name: row.get(2)?,
        path: row.get(3)?,
        library_type: LibraryType::from_db_value(type_value).ok_or_else(|| {
            rusqlite::Error::IntegralValueOutOfRange(4, type_value)
        })?,
        last_scan_at: row.get(5)?,
        artist_count: row.get(6)?,
        album_count: row.get(7)?,
        song_count: row.get(8)?,
        is_locked: row.get::<_, i64>(9)? != 0,
        sort_order: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn scan_history_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LibraryScanHistory> {
    Ok(LibraryScanHistory {
        id: row.get(0)?,
        library_id: row.get(1)?,
        for_artist_id: row.get(2)?,
        for_album_id: row.get(3)?,
        found_artists_count: row.get(4)?,
        found_albums_count: row.get(5)?,
        found_songs_count: row.get(6)?,
        duration_in_ms: row.get(7)?,
        error_message: row.get(8)?,
        created_at: row.get(9)?,
    })
}

impl SqliteCatalogStore {
    /// Open (creating/migrating as needed) the catalog database.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `read_pool_size` - Number of read-only connections for concurrent lookups
    pub fn new<P: AsRef<Path>>(db_path: P, read_pool_size: usize) -> Result<Self> {
        let db_path_ref = db_path.as_ref();

        let mut write_conn = Connection::open_with_flags(
            db_path_ref,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open catalog database")?;

        migrate_to_latest(&mut write_conn, CATALOG_VERSIONED_SCHEMAS)?;
        write_conn.pragma_update(None, "journal_mode", "WAL")?;
        write_conn.execute("PRAGMA foreign_keys = ON", [])?;

        #[cfg(not(feature = "no_checks"))]
        CATALOG_VERSIONED_SCHEMAS
            .last()
            .expect("at least one schema version")
            .validate(&write_conn)?;

        Self::seed_libraries(&write_conn)?;
        Self::seed_settings(&write_conn)?;

        let artist_count: i64 = write_conn
            .query_row("SELECT COUNT(*) FROM artists", [], |r| r.get(0))
            .unwrap_or(0);
        let album_count: i64 = write_conn
            .query_row("SELECT COUNT(*) FROM albums", [], |r| r.get(0))
            .unwrap_or(0);
        let song_count: i64 = write_conn
            .query_row("SELECT COUNT(*) FROM songs", [], |r| r.get(0))
            .unwrap_or(0);
        info!(
            "Opened catalog: {} artists, {} albums, {} songs",
            artist_count, album_count, song_count
        );

        let mut read_pool = Vec::with_capacity(read_pool_size.max(1));
        for _ in 0..read_pool_size.max(1) {
            let read_conn = Connection::open_with_flags(
                db_path_ref,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            read_conn.pragma_update(None, "journal_mode", "WAL")?;
            read_pool.push(Arc::new(Mutex::new(read_conn)));
        }

        Ok(SqliteCatalogStore {
            read_pool,
            write_conn: Arc::new(Mutex::new(write_conn)),
            read_index: AtomicUsize::new(0),
        })
    }

    fn seed_libraries(conn: &Connection) -> Result<()> {
        for (name, path, library_type, sort_order) in DEFAULT_LIBRARIES {
            conn.execute(
                "INSERT OR IGNORE INTO libraries (api_key, name, path, type, sort_order)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    new_api_key(),
                    name,
                    path,
                    library_type.to_db_value(),
                    sort_order
                ],
            )?;
        }
        Ok(())
    }

    fn seed_settings(conn: &Connection) -> Result<()> {
        for seed in SETTINGS_REGISTRY {
            conn.execute(
                "INSERT OR IGNORE INTO settings (key, value, category, comment)
                 VALUES (?1, ?2, ?3, ?4)",
                params![seed.key, seed.default_value, seed.category, seed.comment],
            )?;
        }
        Ok(())
    }

    fn get_read_conn(&self) -> Arc<Mutex<Connection>> {
        let index = self.read_index.fetch_add(1, Ordering::SeqCst) % self.read_pool.len();
        self.read_pool[index].clone()
    }

    // =========================================================================
    // Unit commit helpers (all run inside the unit transaction)
    // =========================================================================

    fn upsert_artist(tx: &Transaction<'_>, library_id: i64, artist: &ArtistWrite) -> Result<(i64, bool)> {
        if let Some(id) = artist.existing_id {
            return Ok((id, false));
        }
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO artists
                 (api_key, library_id, name, name_normalized, sort_name, directory, musicbrainz_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                new_api_key(),
                library_id,
                artist.name,
                artist.name_normalized,
                artist.sort_name,
                artist.directory,
                artist.musicbrainz_id,
            ],
        )?;
        if inserted == 1 {
            return Ok((tx.last_insert_rowid(), true));
        }
        // Conflict: another unit created this artist first (or the
        // MusicBrainz id is already claimed). Re-select by resolution key.
        let by_name: Option<i64> = tx
            .query_row(
                "SELECT id FROM artists WHERE library_id = ?1 AND name_normalized = ?2",
                params![library_id, artist.name_normalized],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(id) = by_name {
            return Ok((id, false));
        }
        let by_mbid: Option<i64> = match &artist.musicbrainz_id {
            Some(mbid) => tx
                .query_row(
                    "SELECT id FROM artists WHERE musicbrainz_id = ?1",
                    params![mbid],
                    |r| r.get(0),
                )
                .optional()?,
            None => None,
        };
        by_mbid
            .map(|id| (id, false))
            .context("Artist insert conflicted but no existing row matches")
    }

    fn upsert_album(tx: &Transaction<'_>, artist_id: i64, album: &AlbumWrite) -> Result<(i64, bool)> {
        if let Some(id) = album.existing_id {
            return Ok((id, false));
        }
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO albums
                 (api_key, artist_id, name, name_normalized, sort_name, directory, album_type,
                  release_date, original_release_date, genres, musicbrainz_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                new_api_key(),
                artist_id,
                album.name,
                album.name_normalized,
                album.sort_name,
                album.directory,
                album.album_type.to_db_str(),
                album.release_date,
                album.original_release_date,
                serde_json::to_string(&album.genres)?,
                album.musicbrainz_id,
            ],
        )?;
        if inserted == 1 {
            return Ok((tx.last_insert_rowid(), true));
        }
        let id: i64 = tx
            .query_row(
                "SELECT id FROM albums WHERE artist_id = ?1 AND name_normalized = ?2",
                params![artist_id, album.name_normalized],
                |r| r.get(0),
            )
            .context("Album insert conflicted but no existing row matches")?;
        Ok((id, false))
    }

    fn write_song(
        tx: &Transaction<'_>,
        album_id: i64,
        song: &SongWrite,
        now: i64,
        counts: &mut UnitCounts,
    ) -> Result<()> {
        match song {
            SongWrite::Unchanged => Ok(()),
            SongWrite::Create(fields) => {
                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO songs
                         (api_key, album_id, song_number, disc_number, title, title_normalized,
                          file_name, file_hash, file_size, duration_ms, bit_rate, sample_rate,
                          bit_depth, channel_count, is_vbr, lyrics, part_titles)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                    params![
                        new_api_key(),
                        album_id,
                        fields.song_number,
                        fields.disc_number,
                        fields.title,
                        fields.title_normalized,
                        fields.file_name,
                        fields.file_hash,
                        fields.file_size,
                        fields.duration_ms,
                        fields.bit_rate,
                        fields.sample_rate,
                        fields.bit_depth,
                        fields.channel_count,
                        fields.is_vbr as i64,
                        fields.lyrics,
                        fields.part_titles,
                    ],
                )?;
                if inserted == 1 {
                    counts.songs_created += 1;
                    return Ok(());
                }
                // Position taken since resolution: treat as content update.
                let existing_id: i64 = tx
                    .query_row(
                        "SELECT id FROM songs WHERE album_id = ?1 AND song_number = ?2",
                        params![album_id, fields.song_number],
                        |r| r.get(0),
                    )
                    .context("Song insert conflicted but no existing row matches")?;
                Self::update_song_row(tx, existing_id, fields, now)?;
                counts.songs_updated += 1;
                Ok(())
            }
            SongWrite::Update { id, fields } => {
                Self::update_song_row(tx, *id, fields, now)?;
                counts.songs_updated += 1;
                Ok(())
            }
        }
    }

    fn update_song_row(tx: &Transaction<'_>, id: i64, fields: &SongFields, now: i64) -> Result<()> {
        tx.execute(
            "UPDATE songs SET
                 title = ?1, title_normalized = ?2, file_name = ?3, file_hash = ?4,
                 file_size = ?5, duration_ms = ?6, bit_rate = ?7, sample_rate = ?8,
                 bit_depth = ?9, channel_count = ?10, is_vbr = ?11, lyrics = ?12,
                 part_titles = ?13, disc_number = ?14, updated_at = ?15
             WHERE id = ?16",
            params![
                fields.title,
                fields.title_normalized,
                fields.file_name,
                fields.file_hash,
                fields.file_size,
                fields.duration_ms,
                fields.bit_rate,
                fields.sample_rate,
                fields.bit_depth,
                fields.channel_count,
                fields.is_vbr as i64,
                fields.lyrics,
                fields.part_titles,
                fields.disc_number,
                now,
                id,
            ],
        )?;
        Ok(())
    }

    fn refresh_aggregates(
        tx: &Transaction<'_>,
        library_id: i64,
        artist_id: i64,
        album_id: i64,
        counts: &UnitCounts,
        now: i64,
    ) -> Result<()> {
        tx.execute(
            "UPDATE albums SET
                 song_count = (SELECT COUNT(*) FROM songs WHERE album_id = ?1),
                 duration_ms = (SELECT COALESCE(SUM(duration_ms), 0) FROM songs WHERE album_id = ?1),
                 updated_at = ?2
             WHERE id = ?1",
            params![album_id, now],
        )?;
        tx.execute(
            "UPDATE artists SET
                 album_count = (SELECT COUNT(*) FROM albums WHERE artist_id = ?1),
                 song_count = (SELECT COUNT(*) FROM songs s JOIN albums a ON s.album_id = a.id
                               WHERE a.artist_id = ?1),
                 updated_at = ?2
             WHERE id = ?1",
            params![artist_id, now],
        )?;
        tx.execute(
            "UPDATE libraries SET
                 artist_count = artist_count + ?1,
                 album_count = album_count + ?2,
                 song_count = song_count + ?3,
                 last_scan_at = ?4,
                 updated_at = ?4
             WHERE id = ?5",
            params![
                counts.artists_created,
                counts.albums_created,
                counts.songs_created,
                now,
                library_id
            ],
        )?;
        Ok(())
    }
}

impl CatalogStore for SqliteCatalogStore {
    // =========================================================================
    // Settings
    // =========================================================================

    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |r| r.get(0),
            )
            .optional()?)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        conn.execute(
            "UPDATE settings SET value = ?2 WHERE key = ?1",
            params![key, value],
        )?;
        Ok(())
    }

    fn all_settings(&self) -> Result<Vec<Setting>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, key, value, category, comment, is_locked FROM settings ORDER BY key")?;
        let settings = stmt
            .query_map([], |row| {
                Ok(Setting {
                    id: row.get(0)?,
                    key: row.get(1)?,
                    value: row.get(2)?,
                    category: row.get(3)?,
                    comment: row.get(4)?,
                    is_locked: row.get::<_, i64>(5)? != 0,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(settings)
    }

    // =========================================================================
    // Libraries
    // =========================================================================

    fn list_libraries(&self) -> Result<Vec<Library>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, api_key, name, path, type, last_scan_at, artist_count, album_count,
                    song_count, is_locked, sort_order, created_at, updated_at
             FROM libraries ORDER BY sort_order",
        )?;
        let libraries = stmt
            .query_map([], library_from_row)?
            .collect::<std::result::Result<_, _>>()?;
        Ok(libraries)
    }

    fn get_library_by_type(&self, library_type: LibraryType) -> Result<Option<Library>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT id, api_key, name, path, type, last_scan_at, artist_count, album_count,
                        song_count, is_locked, sort_order, created_at, updated_at
                 FROM libraries WHERE type = ?1",
                params![library_type.to_db_value()],
                library_from_row,
            )
            .optional()?)
    }

    fn set_library_path(&self, library_type: LibraryType, path: &str) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        conn.execute(
            "UPDATE libraries SET path = ?2, updated_at = ?3 WHERE type = ?1",
            params![library_type.to_db_value(), path, now_timestamp()],
        )?;
        Ok(())
    }

    // =========================================================================
    // Artists
    // =========================================================================

    fn get_artist(&self, artist_id: i64) -> Result<Option<Artist>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        Ok(conn
            .query_row(
                &format!("SELECT {ARTIST_COLUMNS} FROM artists WHERE id = ?1"),
                params![artist_id],
                artist_from_row,
            )
            .optional()?)
    }

    fn find_artist_by_musicbrainz_id(&self, musicbrainz_id: &str) -> Result<Option<Artist>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        Ok(conn
            .query_row(
                &format!("SELECT {ARTIST_COLUMNS} FROM artists WHERE musicbrainz_id = ?1"),
                params![musicbrainz_id],
                artist_from_row,
            )
            .optional()?)
    }

    fn find_artist_by_normalized_name(
        &self,
        library_id: i64,
        name_normalized: &str,
    ) -> Result<Option<Artist>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {ARTIST_COLUMNS} FROM artists
                     WHERE library_id = ?1 AND name_normalized = ?2"
                ),
                params![library_id, name_normalized],
                artist_from_row,
            )
            .optional()?)
    }

    fn list_artists_needing_enrichment(
        &self,
        refreshed_before: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Artist>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let sql = match refreshed_before {
            Some(_) => format!(
                "SELECT {ARTIST_COLUMNS} FROM artists
                 WHERE meta_data_status = 'NOT_PROCESSED'
                    OR COALESCE(updated_at, created_at) < ?1
                 ORDER BY id LIMIT ?2"
            ),
            None => format!(
                "SELECT {ARTIST_COLUMNS} FROM artists
                 WHERE meta_data_status = 'NOT_PROCESSED'
                 ORDER BY id LIMIT ?1"
            ),
        };
        let mut stmt = conn.prepare(&sql)?;
        let artists = match refreshed_before {
            Some(cutoff) => stmt
                .query_map(params![cutoff, limit as i64], artist_from_row)?
                .collect::<std::result::Result<_, _>>()?,
            None => stmt
                .query_map(params![limit as i64], artist_from_row)?
                .collect::<std::result::Result<_, _>>()?,
        };
        Ok(artists)
    }

    fn update_artist_external_ids(&self, artist_id: i64, ids: &ArtistExternalIds) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        // COALESCE keeps existing values; OR IGNORE absorbs a musicbrainz_id
        // already claimed by another artist (ambiguous match, never merged).
        conn.execute(
            "UPDATE OR IGNORE artists SET
                 musicbrainz_id = COALESCE(musicbrainz_id, ?2),
                 spotify_id = COALESCE(spotify_id, ?3),
                 discogs_id = COALESCE(discogs_id, ?4),
                 itunes_id = COALESCE(itunes_id, ?5),
                 amg_id = COALESCE(amg_id, ?6),
                 wikidata_id = COALESCE(wikidata_id, ?7),
                 lastfm_id = COALESCE(lastfm_id, ?8),
                 updated_at = ?9
             WHERE id = ?1",
            params![
                artist_id,
                ids.musicbrainz_id,
                ids.spotify_id,
                ids.discogs_id,
                ids.itunes_id,
                ids.amg_id,
                ids.wikidata_id,
                ids.lastfm_id,
                now_timestamp(),
            ],
        )?;
        Ok(())
    }

    fn set_artist_meta_data_status(&self, artist_id: i64, status: MetaDataStatus) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        conn.execute(
            "UPDATE artists SET meta_data_status = ?2, updated_at = ?3 WHERE id = ?1",
            params![artist_id, status.to_db_str(), now_timestamp()],
        )?;
        Ok(())
    }

    fn recalculate_artist_counts(&self) -> Result<usize> {
        let conn = self.write_conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE artists SET
                 album_count = (SELECT COUNT(*) FROM albums WHERE artist_id = artists.id),
                 song_count = (SELECT COUNT(*) FROM songs s JOIN albums a ON s.album_id = a.id
                               WHERE a.artist_id = artists.id)
             WHERE album_count != (SELECT COUNT(*) FROM albums WHERE artist_id = artists.id)
                OR song_count != (SELECT COUNT(*) FROM songs s JOIN albums a ON s.album_id = a.id
                                  WHERE a.artist_id = artists.id)",
            [],
        )?;
        Ok(changed)
    }

    fn list_artist_ids_without_albums(&self) -> Result<Vec<i64>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id FROM artists
             WHERE NOT EXISTS (SELECT 1 FROM albums WHERE albums.artist_id = artists.id)",
        )?;
        let ids = stmt
            .query_map([], |r| r.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        Ok(ids)
    }

    fn backfill_artist_sort_names(&self) -> Result<usize> {
        let conn = self.write_conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE artists SET sort_name = name, updated_at = ?1 WHERE TRIM(sort_name) = ''",
            params![now_timestamp()],
        )?;
        Ok(changed)
    }

    // =========================================================================
    // Albums & songs
    // =========================================================================

    fn get_album(&self, album_id: i64) -> Result<Option<Album>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        Ok(conn
            .query_row(
                &format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE id = ?1"),
                params![album_id],
                album_from_row,
            )
            .optional()?)
    }

    fn find_album_by_normalized_name(
        &self,
        artist_id: i64,
        name_normalized: &str,
    ) -> Result<Option<Album>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {ALBUM_COLUMNS} FROM albums
                     WHERE artist_id = ?1 AND name_normalized = ?2"
                ),
                params![artist_id, name_normalized],
                album_from_row,
            )
            .optional()?)
    }

    fn get_album_song_positions(&self, album_id: i64) -> Result<Vec<(i64, String)>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT song_number, file_hash FROM songs WHERE album_id = ?1 ORDER BY song_number",
        )?;
        let positions = stmt
            .query_map(params![album_id], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;
        Ok(positions)
    }

    fn find_song_by_position(&self, album_id: i64, song_number: i64) -> Result<Option<Song>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {SONG_COLUMNS} FROM songs WHERE album_id = ?1 AND song_number = ?2"
                ),
                params![album_id, song_number],
                song_from_row,
            )
            .optional()?)
    }

    fn list_albums_needing_enrichment(
        &self,
        refreshed_before: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Album>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let sql = match refreshed_before {
            Some(_) => format!(
                "SELECT {ALBUM_COLUMNS} FROM albums
                 WHERE meta_data_status = 'NOT_PROCESSED'
                    OR COALESCE(updated_at, created_at) < ?1
                 ORDER BY id LIMIT ?2"
            ),
            None => format!(
                "SELECT {ALBUM_COLUMNS} FROM albums
                 WHERE meta_data_status = 'NOT_PROCESSED'
                 ORDER BY id LIMIT ?1"
            ),
        };
        let mut stmt = conn.prepare(&sql)?;
        let albums = match refreshed_before {
            Some(cutoff) => stmt
                .query_map(params![cutoff, limit as i64], album_from_row)?
                .collect::<std::result::Result<_, _>>()?,
            None => stmt
                .query_map(params![limit as i64], album_from_row)?
                .collect::<std::result::Result<_, _>>()?,
        };
        Ok(albums)
    }

    fn update_album_external_ids(&self, album_id: i64, ids: &AlbumExternalIds) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        // Same shape as the artist update: existing values win, a
        // musicbrainz_id already claimed elsewhere is absorbed.
        conn.execute(
            "UPDATE OR IGNORE albums SET
                 musicbrainz_id = COALESCE(musicbrainz_id, ?2),
                 spotify_id = COALESCE(spotify_id, ?3),
                 updated_at = ?4
             WHERE id = ?1",
            params![album_id, ids.musicbrainz_id, ids.spotify_id, now_timestamp()],
        )?;
        Ok(())
    }

    fn set_album_meta_data_status(&self, album_id: i64, status: MetaDataStatus) -> Result<()> {
        let conn = self.write_conn.lock().unwrap();
        conn.execute(
            "UPDATE albums SET meta_data_status = ?2, updated_at = ?3 WHERE id = ?1",
            params![album_id, status.to_db_str(), now_timestamp()],
        )?;
        Ok(())
    }

    fn list_album_contributors(&self, album_id: i64) -> Result<Vec<Contributor>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, api_key, album_id, song_id, artist_id, contributor_name, role, sub_role,
                    meta_tag_identifier, created_at
             FROM contributors WHERE album_id = ?1 ORDER BY id",
        )?;
        let contributors = stmt
            .query_map(params![album_id], |row| {
                let tag: String = row.get(8)?;
                Ok(Contributor {
                    id: row.get(0)?,
                    api_key: row.get(1)?,
                    album_id: row.get(2)?,
                    song_id: row.get(3)?,
                    artist_id: row.get(4)?,
                    contributor_name: row.get(5)?,
                    role: ContributorRole::from_db_str(&row.get::<_, String>(6)?),
                    sub_role: row.get(7)?,
                    meta_tag_identifier: MetaTagIdentifier::from_db_str(&tag)
                        .unwrap_or(MetaTagIdentifier::Artist),
                    created_at: row.get(9)?,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(contributors)
    }

    // =========================================================================
    // Artist relations
    // =========================================================================

    fn upsert_artist_relation(&self, relation: &ArtistRelationWrite) -> Result<bool> {
        let conn = self.write_conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO artist_relations
                 (artist_id, related_artist_id, relation_type, relation_start, relation_end)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                relation.artist_id,
                relation.related_artist_id,
                relation.relation_type,
                relation.relation_start,
                relation.relation_end,
            ],
        )?;
        Ok(inserted == 1)
    }

    // =========================================================================
    // Unit commit
    // =========================================================================

    fn commit_unit(&self, unit: &UnitWrite) -> Result<UnitCounts> {
        let mut conn = self.write_conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = now_timestamp();
        let mut counts = UnitCounts::default();

        let (artist_id, artist_created) = Self::upsert_artist(&tx, unit.library_id, &unit.artist)?;
        if artist_created {
            counts.artists_created += 1;
        }
        let (album_id, album_created) = Self::upsert_album(&tx, artist_id, &unit.album)?;
        if album_created {
            counts.albums_created += 1;
        }
        for song in &unit.songs {
            Self::write_song(&tx, album_id, song, now, &mut counts)?;
        }
        for contributor in &unit.contributors {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO contributors
                     (api_key, album_id, song_id, artist_id, contributor_name, role, sub_role,
                      meta_tag_identifier)
                 VALUES (?1, ?2, NULL, ?3, ?4, ?5, ?6, ?7)",
                params![
                    new_api_key(),
                    album_id,
                    contributor.artist_id,
                    contributor.contributor_name,
                    contributor.role.to_db_str(),
                    contributor.sub_role,
                    contributor.meta_tag_identifier.to_db_str(),
                ],
            )?;
            if inserted == 1 {
                counts.contributors_created += 1;
            }
        }

        Self::refresh_aggregates(&tx, unit.library_id, artist_id, album_id, &counts, now)?;
        tx.commit()?;
        Ok(counts)
    }

    // =========================================================================
    // Application-level cascades
    // =========================================================================

    fn delete_artist(&self, artist_id: i64) -> Result<()> {
        let mut conn = self.write_conn.lock().unwrap();
        let tx = conn.transaction()?;
        delete_artist_tree(&tx, artist_id)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_album(&self, album_id: i64) -> Result<()> {
        let mut conn = self.write_conn.lock().unwrap();
        let tx = conn.transaction()?;
        delete_album_tree(&tx, album_id)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_library(&self, library_id: i64) -> Result<()> {
        let mut conn = self.write_conn.lock().unwrap();
        let tx = conn.transaction()?;
        let artist_ids: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM artists WHERE library_id = ?1")?;
            let ids = stmt
                .query_map(params![library_id], |r| r.get(0))?
                .collect::<std::result::Result<_, _>>()?;
            ids
        };
        for artist_id in artist_ids {
            delete_artist_tree(&tx, artist_id)?;
        }
        tx.execute("DELETE FROM libraries WHERE id = ?1", params![library_id])?;
        tx.commit()?;
        Ok(())
    }

    // =========================================================================
    // Append-only history
    // =========================================================================

    fn append_scan_history(&self, history: &LibraryScanHistory) -> Result<i64> {
        let conn = self.write_conn.lock().unwrap();
        conn.execute(
            "INSERT INTO library_scan_histories
                 (library_id, for_artist_id, for_album_id, found_artists_count,
                  found_albums_count, found_songs_count, duration_in_ms, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                history.library_id,
                history.for_artist_id,
                history.for_album_id,
                history.found_artists_count,
                history.found_albums_count,
                history.found_songs_count,
                history.duration_in_ms,
                history.error_message,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn list_scan_history(
        &self,
        library_id: i64,
        limit: usize,
    ) -> Result<Vec<LibraryScanHistory>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, library_id, for_artist_id, for_album_id, found_artists_count,
                    found_albums_count, found_songs_count, duration_in_ms, error_message, created_at
             FROM library_scan_histories
             WHERE library_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let history = stmt
            .query_map(params![library_id, limit as i64], scan_history_from_row)?
            .collect::<std::result::Result<_, _>>()?;
        Ok(history)
    }

    fn append_search_history(&self, history: &SearchHistory) -> Result<i64> {
        let conn = self.write_conn.lock().unwrap();
        conn.execute(
            "INSERT INTO search_histories
                 (by_engine, query, found_artists_count, found_albums_count, found_songs_count,
                  found_other_count, duration_in_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                history.by_engine,
                history.query,
                history.found_artists_count,
                history.found_albums_count,
                history.found_songs_count,
                history.found_other_count,
                history.duration_in_ms,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn list_search_history(&self, limit: usize) -> Result<Vec<SearchHistory>> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, by_engine, query, found_artists_count, found_albums_count,
                    found_songs_count, found_other_count, duration_in_ms, created_at
             FROM search_histories ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let history = stmt
            .query_map(params![limit as i64], |row| {
                Ok(SearchHistory {
                    id: row.get(0)?,
                    by_engine: row.get(1)?,
                    query: row.get(2)?,
                    found_artists_count: row.get(3)?,
                    found_albums_count: row.get(4)?,
                    found_songs_count: row.get(5)?,
                    found_other_count: row.get(6)?,
                    duration_in_ms: row.get(7)?,
                    created_at: row.get(8)?,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(history)
    }

    // =========================================================================
    // Counts
    // =========================================================================

    fn get_artists_count(&self) -> i64 {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM artists", [], |r| r.get(0))
            .unwrap_or(0)
    }

    fn get_albums_count(&self) -> i64 {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM albums", [], |r| r.get(0))
            .unwrap_or(0)
    }

    fn get_songs_count(&self) -> i64 {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM songs", [], |r| r.get(0))
            .unwrap_or(0)
    }
}

fn delete_album_tree(tx: &Transaction<'_>, album_id: i64) -> Result<()> {
    tx.execute("DELETE FROM contributors WHERE album_id = ?1", params![album_id])?;
    tx.execute("DELETE FROM songs WHERE album_id = ?1", params![album_id])?;
    tx.execute("DELETE FROM albums WHERE id = ?1", params![album_id])?;
    Ok(())
}

fn delete_artist_tree(tx: &Transaction<'_>, artist_id: i64) -> Result<()> {
    let album_ids: Vec<i64> = {
        let mut stmt = tx.prepare("SELECT id FROM albums WHERE artist_id = ?1")?;
        let ids = stmt
            .query_map(params![artist_id], |r| r.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        ids
    };
    for album_id in album_ids {
        delete_album_tree(tx, album_id)?;
    }
    tx.execute(
        "DELETE FROM artist_relations WHERE artist_id = ?1 OR related_artist_id = ?1",
        params![artist_id],
    )?;
    tx.execute(
        "UPDATE contributors SET artist_id = NULL WHERE artist_id = ?1",
        params![artist_id],
    )?;
    tx.execute("DELETE FROM artists WHERE id = ?1", params![artist_id])?;
    Ok(())
}
