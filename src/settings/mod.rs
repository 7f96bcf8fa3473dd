//! Typed pipeline configuration.
//!
//! The settings table stores every value as a string. This module parses
//! the whole table once at startup into `PipelineConfig`, validating
//! JSON-typed values against their expected shape and failing fast on a
//! malformed required key instead of re-parsing per use.

pub mod registry;

use crate::catalog_store::CatalogStore;
use anyhow::{bail, Context, Result};
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct ProcessingConfig {
    pub album_title_removals: Vec<String>,
    pub song_title_removals: Vec<String>,
    /// variant spelling → canonical name
    pub artist_name_replacements: HashMap<String, String>,
    pub ignored_articles: Vec<String>,
    pub ignored_performers: Vec<String>,
    pub ignored_production: Vec<String>,
    pub ignored_publishers: Vec<String>,
    pub do_continue_on_directory_processing_errors: bool,
    pub do_delete_comments: bool,
    pub do_use_current_year_as_default_orig_album_year: bool,
    pub duplicate_album_prefix: String,
    pub skipped_directory_prefix: String,
    pub maximum_processing_count: usize,
    pub staging_directory_scan_limit: usize,
    pub maximum_album_directory_name_length: usize,
    pub maximum_artist_directory_name_length: usize,
    pub batch_size: usize,
}

#[derive(Clone, Debug)]
pub struct MagicConfig {
    pub enabled: bool,
    pub do_renumber_songs: bool,
    pub do_remove_featuring_artist_from_song_artist: bool,
    pub do_remove_featuring_artist_from_song_title: bool,
    pub do_replace_songs_artist_separators: bool,
    pub do_set_year_to_current_if_invalid: bool,
    pub do_remove_unwanted_text_from_album_title: bool,
    pub do_remove_unwanted_text_from_song_titles: bool,
}

#[derive(Clone, Debug)]
pub struct ValidationConfig {
    pub minimum_album_year: i64,
    pub maximum_album_year: i64,
    pub maximum_song_number: i64,
    pub maximum_media_number: i64,
}

#[derive(Clone, Debug)]
pub struct SpotifyConfig {
    pub enabled: bool,
    pub api_key: String,
    pub shared_secret: String,
}

#[derive(Clone, Debug)]
pub struct MusicBrainzConfig {
    pub enabled: bool,
    pub storage_path: String,
    pub import_batch_size: usize,
    pub import_maximum_to_process: usize,
}

#[derive(Clone, Debug)]
pub struct SearchEngineConfig {
    pub user_agent: String,
    pub default_page_size: usize,
    pub maximum_allowed_page_size: usize,
    pub artist_refresh_in_days: i64,
    pub musicbrainz: MusicBrainzConfig,
    pub spotify: SpotifyConfig,
    pub itunes_enabled: bool,
    pub lastfm_enabled: bool,
    pub lastfm_api_key: String,
}

#[derive(Clone, Debug)]
pub struct JobsConfig {
    pub artist_housekeeping_cron: String,
    pub library_process_cron: String,
    pub library_insert_cron: String,
    pub musicbrainz_update_database_cron: String,
    pub artist_search_engine_housekeeping_cron: String,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub processing: ProcessingConfig,
    pub magic: MagicConfig,
    pub validation: ValidationConfig,
    pub search_engine: SearchEngineConfig,
    pub jobs: JobsConfig,
}

/// Batch size bounds for `defaults.batchSize`.
const BATCH_SIZE_RANGE: (usize, usize) = (250, 1000);

struct SettingsReader {
    values: HashMap<String, String>,
}

impl SettingsReader {
    fn string(&self, key: &str) -> Result<String> {
        self.values
            .get(key)
            .cloned()
            .with_context(|| format!("Missing setting '{}'", key))
    }

    fn bool(&self, key: &str) -> Result<bool> {
        let raw = self.string(key)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => bail!("Setting '{}' is not a boolean: '{}'", key, other),
        }
    }

    fn int(&self, key: &str) -> Result<i64> {
        let raw = self.string(key)?;
        raw.trim()
            .parse::<i64>()
            .with_context(|| format!("Setting '{}' is not an integer: '{}'", key, raw))
    }

    fn usize(&self, key: &str) -> Result<usize> {
        let value = self.int(key)?;
        if value < 0 {
            bail!("Setting '{}' must be non-negative, got {}", key, value);
        }
        Ok(value as usize)
    }

    fn json_list(&self, key: &str) -> Result<Vec<String>> {
        let raw = self.string(key)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("Setting '{}' is not a JSON string array: '{}'", key, raw))
    }

    fn json_map(&self, key: &str) -> Result<HashMap<String, Vec<String>>> {
        let raw = self.string(key)?;
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("Setting '{}' is not a JSON dictionary: '{}'", key, raw))
    }

    fn pipe_list(&self, key: &str) -> Result<Vec<String>> {
        let raw = self.string(key)?;
        Ok(raw
            .split('|')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }
}

impl PipelineConfig {
    /// Load and parse the full configuration from the settings table.
    pub fn load(store: &dyn CatalogStore) -> Result<Self> {
        let values = store
            .all_settings()?
            .into_iter()
            .map(|s| (s.key, s.value))
            .collect();
        Self::from_values(values)
    }

    fn from_values(values: HashMap<String, String>) -> Result<Self> {
        use registry::*;
        let reader = SettingsReader { values };

        // Invert canonical → variants into a variant → canonical lookup.
        let mut artist_name_replacements = HashMap::new();
        for (canonical, variants) in reader.json_map(PROCESSING_ARTIST_NAME_REPLACEMENTS)? {
            for variant in variants {
                artist_name_replacements.insert(variant, canonical.clone());
            }
        }

        let batch_size = reader
            .usize(DEFAULTS_BATCH_SIZE)?
            .clamp(BATCH_SIZE_RANGE.0, BATCH_SIZE_RANGE.1);

        let processing = ProcessingConfig {
            album_title_removals: reader.json_list(PROCESSING_ALBUM_TITLE_REMOVALS)?,
            song_title_removals: reader.json_list(PROCESSING_SONG_TITLE_REMOVALS)?,
            artist_name_replacements,
            ignored_articles: reader.pipe_list(PROCESSING_IGNORED_ARTICLES)?,
            ignored_performers: reader.json_list(PROCESSING_IGNORED_PERFORMERS)?,
            ignored_production: reader.json_list(PROCESSING_IGNORED_PRODUCTION)?,
            ignored_publishers: reader.json_list(PROCESSING_IGNORED_PUBLISHERS)?,
            do_continue_on_directory_processing_errors: reader
                .bool(PROCESSING_DO_CONTINUE_ON_DIRECTORY_PROCESSING_ERRORS)?,
            do_delete_comments: reader.bool(PROCESSING_DO_DELETE_COMMENTS)?,
            do_use_current_year_as_default_orig_album_year: reader
                .bool(PROCESSING_DO_USE_CURRENT_YEAR_AS_DEFAULT_ORIG_ALBUM_YEAR)?,
            duplicate_album_prefix: reader.string(PROCESSING_DUPLICATE_ALBUM_PREFIX)?,
            skipped_directory_prefix: reader.string(PROCESSING_SKIPPED_DIRECTORY_PREFIX)?,
            maximum_processing_count: reader.usize(PROCESSING_MAXIMUM_PROCESSING_COUNT)?,
            staging_directory_scan_limit: reader.usize(PROCESSING_STAGING_DIRECTORY_SCAN_LIMIT)?,
            maximum_album_directory_name_length: reader
                .usize(PROCESSING_MAXIMUM_ALBUM_DIRECTORY_NAME_LENGTH)?,
            maximum_artist_directory_name_length: reader
                .usize(PROCESSING_MAXIMUM_ARTIST_DIRECTORY_NAME_LENGTH)?,
            batch_size,
        };

        let magic = MagicConfig {
            enabled: reader.bool(MAGIC_ENABLED)?,
            do_renumber_songs: reader.bool(MAGIC_DO_RENUMBER_SONGS)?,
            do_remove_featuring_artist_from_song_artist: reader
                .bool(MAGIC_DO_REMOVE_FEATURING_ARTIST_FROM_SONG_ARTIST)?,
            do_remove_featuring_artist_from_song_title: reader
                .bool(MAGIC_DO_REMOVE_FEATURING_ARTIST_FROM_SONG_TITLE)?,
            do_replace_songs_artist_separators: reader
                .bool(MAGIC_DO_REPLACE_SONGS_ARTIST_SEPARATORS)?,
            do_set_year_to_current_if_invalid: reader
                .bool(MAGIC_DO_SET_YEAR_TO_CURRENT_IF_INVALID)?,
            do_remove_unwanted_text_from_album_title: reader
                .bool(MAGIC_DO_REMOVE_UNWANTED_TEXT_FROM_ALBUM_TITLE)?,
            do_remove_unwanted_text_from_song_titles: reader
                .bool(MAGIC_DO_REMOVE_UNWANTED_TEXT_FROM_SONG_TITLES)?,
        };

        let validation = ValidationConfig {
            minimum_album_year: reader.int(VALIDATION_MINIMUM_ALBUM_YEAR)?,
            maximum_album_year: reader.int(VALIDATION_MAXIMUM_ALBUM_YEAR)?,
            maximum_song_number: reader.int(VALIDATION_MAXIMUM_SONG_NUMBER)?,
            maximum_media_number: reader.int(VALIDATION_MAXIMUM_MEDIA_NUMBER)?,
        };

        let search_engine = SearchEngineConfig {
            user_agent: reader.string(SEARCH_ENGINE_USER_AGENT)?,
            default_page_size: reader.usize(SEARCH_ENGINE_DEFAULT_PAGE_SIZE)?,
            maximum_allowed_page_size: reader.usize(SEARCH_ENGINE_MAXIMUM_ALLOWED_PAGE_SIZE)?,
            artist_refresh_in_days: reader.int(SEARCH_ENGINE_ARTIST_REFRESH_IN_DAYS)?,
            musicbrainz: MusicBrainzConfig {
                enabled: reader.bool(SEARCH_ENGINE_MUSICBRAINZ_ENABLED)?,
                storage_path: reader.string(SEARCH_ENGINE_MUSICBRAINZ_STORAGE_PATH)?,
                import_batch_size: reader.usize(SEARCH_ENGINE_MUSICBRAINZ_IMPORT_BATCH_SIZE)?,
                import_maximum_to_process: reader
                    .usize(SEARCH_ENGINE_MUSICBRAINZ_IMPORT_MAXIMUM_TO_PROCESS)?,
            },
            spotify: SpotifyConfig {
                enabled: reader.bool(SEARCH_ENGINE_SPOTIFY_ENABLED)?,
                api_key: reader.string(SEARCH_ENGINE_SPOTIFY_API_KEY)?,
                shared_secret: reader.string(SEARCH_ENGINE_SPOTIFY_SHARED_SECRET)?,
            },
            itunes_enabled: reader.bool(SEARCH_ENGINE_ITUNES_ENABLED)?,
            lastfm_enabled: reader.bool(SEARCH_ENGINE_LASTFM_ENABLED)?,
            lastfm_api_key: reader.string(SCROBBLING_LASTFM_API_KEY)?,
        };

        let jobs = JobsConfig {
            artist_housekeeping_cron: reader.string(JOBS_ARTIST_HOUSEKEEPING_CRON)?,
            library_process_cron: reader.string(JOBS_LIBRARY_PROCESS_CRON)?,
            library_insert_cron: reader.string(JOBS_LIBRARY_INSERT_CRON)?,
            musicbrainz_update_database_cron: reader
                .string(JOBS_MUSICBRAINZ_UPDATE_DATABASE_CRON)?,
            artist_search_engine_housekeeping_cron: reader
                .string(JOBS_ARTIST_SEARCH_ENGINE_HOUSEKEEPING_CRON)?,
        };

        Ok(PipelineConfig {
            processing,
            magic,
            validation,
            search_engine,
            jobs,
        })
    }

    /// A configuration built purely from registry defaults, for tests.
    pub fn defaults() -> Self {
        let values = registry::SETTINGS_REGISTRY
            .iter()
            .map(|seed| (seed.key.to_string(), seed.default_value.to_string()))
            .collect();
        Self::from_values(values).expect("registry defaults must parse")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_cleanly() {
        let config = PipelineConfig::defaults();
        assert_eq!(config.processing.batch_size, 250);
        assert_eq!(config.validation.minimum_album_year, 1860);
        assert_eq!(config.validation.maximum_album_year, 2150);
        assert!(config.magic.enabled);
        assert_eq!(config.processing.ignored_articles[0], "THE");
        assert_eq!(
            config.processing.artist_name_replacements.get("AC;DC"),
            Some(&"AC/DC".to_string())
        );
        assert_eq!(config.search_engine.default_page_size, 20);
        assert!(!config.jobs.library_process_cron.is_empty());
    }

    #[test]
    fn batch_size_is_clamped_into_range() {
        let mut values: HashMap<String, String> = registry::SETTINGS_REGISTRY
            .iter()
            .map(|seed| (seed.key.to_string(), seed.default_value.to_string()))
            .collect();
        values.insert("defaults.batchSize".to_string(), "10".to_string());
        let config = PipelineConfig::from_values(values.clone()).unwrap();
        assert_eq!(config.processing.batch_size, 250);

        values.insert("defaults.batchSize".to_string(), "5000".to_string());
        let config = PipelineConfig::from_values(values).unwrap();
        assert_eq!(config.processing.batch_size, 1000);
    }

    #[test]
    fn malformed_required_json_fails_fast() {
        let mut values: HashMap<String, String> = registry::SETTINGS_REGISTRY
            .iter()
            .map(|seed| (seed.key.to_string(), seed.default_value.to_string()))
            .collect();
        values.insert(
            "processing.artistNameReplacements".to_string(),
            "{'not': 'valid json'}".to_string(),
        );
        let err = PipelineConfig::from_values(values).unwrap_err();
        assert!(err
            .to_string()
            .contains("processing.artistNameReplacements"));
    }

    #[test]
    fn missing_key_is_an_error() {
        let mut values: HashMap<String, String> = registry::SETTINGS_REGISTRY
            .iter()
            .map(|seed| (seed.key.to_string(), seed.default_value.to_string()))
            .collect();
        values.remove("magic.enabled");
        let err = PipelineConfig::from_values(values).unwrap_err();
        assert!(err.to_string().contains("magic.enabled"));
    }

    #[test]
    fn empty_ignore_list_parses_to_empty() {
        let config = PipelineConfig::defaults();
        assert!(config.processing.ignored_performers.is_empty());
        assert_eq!(config.processing.ignored_publishers.len(), 3);
    }
}
