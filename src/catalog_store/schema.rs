//! SQLite schema definitions for the catalog database.
//!
//! The unique indexes declared here are load-bearing: the ingestion
//! pipeline treats conflicts on them as "row already exists" and re-selects
//! instead of failing (see the store's upsert helpers).

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

const LIBRARY_FK: ForeignKey = ForeignKey {
    foreign_table: "libraries",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const ARTIST_FK: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const ALBUM_FK: ForeignKey = ForeignKey {
    foreign_table: "albums",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const SONG_FK: ForeignKey = ForeignKey {
    foreign_table: "songs",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

/// Scan-history rows must survive the deletion of the artist/album they
/// were scoped to.
const ARTIST_FK_SET_NULL: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::SetNull,
};

const ALBUM_FK_SET_NULL: ForeignKey = ForeignKey {
    foreign_table: "albums",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::SetNull,
};

const LIBRARIES_TABLE: Table = Table {
    name: "libraries",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("api_key", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("path", &SqlType::Text, non_null = true),
        sqlite_column!("type", &SqlType::Integer, non_null = true, is_unique = true),
        sqlite_column!("last_scan_at", &SqlType::Integer),
        sqlite_column!("artist_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("album_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("song_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("is_locked", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("sort_order", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true, default_value = Some(DEFAULT_TIMESTAMP)),
        sqlite_column!("updated_at", &SqlType::Integer),
    ],
    indices: &[],
    unique_constraints: &[],
};

const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("api_key", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("library_id", &SqlType::Integer, non_null = true, foreign_key = Some(&LIBRARY_FK)),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("name_normalized", &SqlType::Text, non_null = true),
        sqlite_column!("sort_name", &SqlType::Text, non_null = true),
        sqlite_column!("directory", &SqlType::Text, non_null = true),
        sqlite_column!("album_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("song_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("musicbrainz_id", &SqlType::Text, is_unique = true),
        sqlite_column!("spotify_id", &SqlType::Text),
        sqlite_column!("discogs_id", &SqlType::Text),
        sqlite_column!("itunes_id", &SqlType::Text),
        sqlite_column!("amg_id", &SqlType::Text),
        sqlite_column!("wikidata_id", &SqlType::Text),
        sqlite_column!("lastfm_id", &SqlType::Text),
        sqlite_column!("meta_data_status", &SqlType::Text, non_null = true, default_value = Some("'NOT_PROCESSED'")),
        sqlite_column!("calculated_rating", &SqlType::Real, non_null = true, default_value = Some("0")),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true, default_value = Some(DEFAULT_TIMESTAMP)),
        sqlite_column!("updated_at", &SqlType::Integer),
    ],
    indices: &[("idx_artists_sort_name", "sort_name")],
    unique_constraints: &[&["library_id", "name_normalized"]],
};

const ALBUMS_TABLE: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("api_key", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("artist_id", &SqlType::Integer, non_null = true, foreign_key = Some(&ARTIST_FK)),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("name_normalized", &SqlType::Text, non_null = true),
        sqlite_column!("sort_name", &SqlType::Text, non_null = true),
        sqlite_column!("directory", &SqlType::Text, non_null = true),
        sqlite_column!("album_status", &SqlType::Text, non_null = true, default_value = Some("'NEW'")),
        sqlite_column!("album_type", &SqlType::Text, non_null = true, default_value = Some("'ALBUM'")),
        sqlite_column!("release_date", &SqlType::Integer),
        sqlite_column!("original_release_date", &SqlType::Integer),
        sqlite_column!("song_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("duration_ms", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("genres", &SqlType::Text, non_null = true, default_value = Some("'[]'")),
        sqlite_column!("moods", &SqlType::Text, non_null = true, default_value = Some("'[]'")),
        sqlite_column!("musicbrainz_id", &SqlType::Text, is_unique = true),
        sqlite_column!("spotify_id", &SqlType::Text),
        sqlite_column!("meta_data_status", &SqlType::Text, non_null = true, default_value = Some("'NOT_PROCESSED'")),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true, default_value = Some(DEFAULT_TIMESTAMP)),
        sqlite_column!("updated_at", &SqlType::Integer),
    ],
    indices: &[("idx_albums_artist_id", "artist_id")],
    unique_constraints: &[
        &["artist_id", "name"],
        &["artist_id", "name_normalized"],
        &["artist_id", "sort_name"],
    ],
};

const SONGS_TABLE: Table = Table {
    name: "songs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("api_key", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("album_id", &SqlType::Integer, non_null = true, foreign_key = Some(&ALBUM_FK)),
        sqlite_column!("song_number", &SqlType::Integer, non_null = true),
        sqlite_column!("disc_number", &SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("title_normalized", &SqlType::Text, non_null = true),
        sqlite_column!("file_name", &SqlType::Text, non_null = true),
        sqlite_column!("file_hash", &SqlType::Text, non_null = true),
        sqlite_column!("file_size", &SqlType::Integer, non_null = true),
        sqlite_column!("duration_ms", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("bit_rate", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("sample_rate", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("bit_depth", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("channel_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("is_vbr", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("lyrics", &SqlType::Text),
        sqlite_column!("part_titles", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true, default_value = Some(DEFAULT_TIMESTAMP)),
        sqlite_column!("updated_at", &SqlType::Integer),
    ],
    indices: &[("idx_songs_file_hash", "file_hash")],
    unique_constraints: &[&["album_id", "song_number"]],
};

const CONTRIBUTORS_TABLE: Table = Table {
    name: "contributors",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("api_key", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("album_id", &SqlType::Integer, non_null = true, foreign_key = Some(&ALBUM_FK)),
        sqlite_column!("song_id", &SqlType::Integer, foreign_key = Some(&SONG_FK)),
        sqlite_column!("artist_id", &SqlType::Integer, foreign_key = Some(&ARTIST_FK)),
        sqlite_column!("contributor_name", &SqlType::Text),
        sqlite_column!("role", &SqlType::Text, non_null = true),
        sqlite_column!("sub_role", &SqlType::Text),
        sqlite_column!("meta_tag_identifier", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true, default_value = Some(DEFAULT_TIMESTAMP)),
    ],
    indices: &[("idx_contributors_album_id", "album_id")],
    unique_constraints: &[
        &["artist_id", "meta_tag_identifier", "album_id"],
        &["contributor_name", "meta_tag_identifier", "album_id"],
    ],
};

const ARTIST_RELATIONS_TABLE: Table = Table {
    name: "artist_relations",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("artist_id", &SqlType::Integer, non_null = true, foreign_key = Some(&ARTIST_FK)),
        sqlite_column!("related_artist_id", &SqlType::Integer, non_null = true, foreign_key = Some(&ARTIST_FK)),
        sqlite_column!("relation_type", &SqlType::Text, non_null = true),
        sqlite_column!("relation_start", &SqlType::Integer),
        sqlite_column!("relation_end", &SqlType::Integer),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true, default_value = Some(DEFAULT_TIMESTAMP)),
    ],
    indices: &[],
    unique_constraints: &[&["artist_id", "related_artist_id"]],
};

const LIBRARY_SCAN_HISTORIES_TABLE: Table = Table {
    name: "library_scan_histories",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("library_id", &SqlType::Integer, non_null = true, foreign_key = Some(&LIBRARY_FK)),
        sqlite_column!("for_artist_id", &SqlType::Integer, foreign_key = Some(&ARTIST_FK_SET_NULL)),
        sqlite_column!("for_album_id", &SqlType::Integer, foreign_key = Some(&ALBUM_FK_SET_NULL)),
        sqlite_column!("found_artists_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("found_albums_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("found_songs_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("duration_in_ms", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("error_message", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true, default_value = Some(DEFAULT_TIMESTAMP)),
    ],
    indices: &[("idx_library_scan_histories_library", "library_id, created_at DESC")],
    unique_constraints: &[],
};

const SEARCH_HISTORIES_TABLE: Table = Table {
    name: "search_histories",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("by_engine", &SqlType::Text, non_null = true),
        sqlite_column!("query", &SqlType::Text, non_null = true),
        sqlite_column!("found_artists_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("found_albums_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("found_songs_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("found_other_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("duration_in_ms", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true, default_value = Some(DEFAULT_TIMESTAMP)),
    ],
    indices: &[("idx_search_histories_created_at", "created_at DESC")],
    unique_constraints: &[],
};

const SETTINGS_TABLE: Table = Table {
    name: "settings",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("key", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("value", &SqlType::Text, non_null = true),
        sqlite_column!("category", &SqlType::Text, non_null = true),
        sqlite_column!("comment", &SqlType::Text),
        sqlite_column!("is_locked", &SqlType::Integer, non_null = true, default_value = Some("0")),
    ],
    indices: &[("idx_settings_category", "category")],
    unique_constraints: &[],
};

/// All versioned schemas for the catalog database.
///
/// Version 1: full catalog (libraries through settings).
pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        LIBRARIES_TABLE,
        ARTISTS_TABLE,
        ALBUMS_TABLE,
        SONGS_TABLE,
        CONTRIBUTORS_TABLE,
        ARTIST_RELATIONS_TABLE,
        LIBRARY_SCAN_HISTORIES_TABLE,
        SEARCH_HISTORIES_TABLE,
        SETTINGS_TABLE,
    ],
    migration: None,
}];

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn schema_creates_and_validates() {
        let conn = Connection::open_in_memory().unwrap();
        let schema = &CATALOG_VERSIONED_SCHEMAS[0];
        schema.create(&conn).unwrap();
        schema.validate(&conn).unwrap();
    }

    #[test]
    fn duplicate_song_position_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        CATALOG_VERSIONED_SCHEMAS[0].create(&conn).unwrap();
        conn.execute(
            "INSERT INTO libraries (api_key, name, path, type) VALUES ('k1', 'Inbound', '/in', 1)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO artists (api_key, library_id, name, name_normalized, sort_name, directory)
             VALUES ('k2', 1, 'A', 'A', 'A', 'A')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO albums (api_key, artist_id, name, name_normalized, sort_name, directory)
             VALUES ('k3', 1, 'B', 'B', 'B', 'B')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO songs (api_key, album_id, song_number, title, title_normalized, file_name, file_hash, file_size)
             VALUES ('k4', 1, 3, 'T', 'T', 'f.mp3', 'h1', 1)",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO songs (api_key, album_id, song_number, title, title_normalized, file_name, file_hash, file_size)
             VALUES ('k5', 1, 3, 'U', 'U', 'g.mp3', 'h2', 1)",
            [],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn multiple_null_musicbrainz_ids_are_allowed() {
        let conn = Connection::open_in_memory().unwrap();
        CATALOG_VERSIONED_SCHEMAS[0].create(&conn).unwrap();
        conn.execute(
            "INSERT INTO libraries (api_key, name, path, type) VALUES ('k1', 'Inbound', '/in', 1)",
            [],
        )
        .unwrap();
        for i in 0..3 {
            conn.execute(
                "INSERT INTO artists (api_key, library_id, name, name_normalized, sort_name, directory)
                 VALUES (?1, 1, ?2, ?2, ?2, ?2)",
                rusqlite::params![format!("key-{i}"), format!("artist-{i}")],
            )
            .unwrap();
        }
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM artists", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn deleting_library_cascades_to_songs() {
        let conn = Connection::open_in_memory().unwrap();
        CATALOG_VERSIONED_SCHEMAS[0].create(&conn).unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        conn.execute(
            "INSERT INTO libraries (api_key, name, path, type) VALUES ('k1', 'Inbound', '/in', 1)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO artists (api_key, library_id, name, name_normalized, sort_name, directory)
             VALUES ('k2', 1, 'A', 'A', 'A', 'A')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO albums (api_key, artist_id, name, name_normalized, sort_name, directory)
             VALUES ('k3', 1, 'B', 'B', 'B', 'B')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO songs (api_key, album_id, song_number, title, title_normalized, file_name, file_hash, file_size)
             VALUES ('k4', 1, 1, 'T', 'T', 'f.mp3', 'h1', 1)",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM libraries WHERE id = 1", []).unwrap();
        let songs: i64 = conn
            .query_row("SELECT COUNT(*) FROM songs", [], |r| r.get(0))
            .unwrap();
        assert_eq!(songs, 0);
    }
}
