//! Registry of every known setting key with its category, default value
//! and description. The store seeds missing rows from this table on open,
//! so a fresh catalog always exposes the full configuration surface.

pub struct SettingSeed {
    pub key: &'static str,
    pub category: &'static str,
    pub default_value: &'static str,
    pub comment: &'static str,
}

macro_rules! seed {
    ($key:expr, $category:expr, $default:expr, $comment:expr) => {
        SettingSeed {
            key: $key,
            category: $category,
            default_value: $default,
            comment: $comment,
        }
    };
}

// Key name constants for the settings the pipeline actually reads.
pub const DEFAULTS_PAGE_SIZE: &str = "defaults.pagesize";
pub const DEFAULTS_BATCH_SIZE: &str = "defaults.batchSize";

pub const PROCESSING_ALBUM_TITLE_REMOVALS: &str = "processing.albumTitleRemovals";
pub const PROCESSING_SONG_TITLE_REMOVALS: &str = "processing.songTitleRemovals";
pub const PROCESSING_ARTIST_NAME_REPLACEMENTS: &str = "processing.artistNameReplacements";
pub const PROCESSING_IGNORED_ARTICLES: &str = "processing.ignoredArticles";
pub const PROCESSING_IGNORED_PERFORMERS: &str = "processing.ignoredPerformers";
pub const PROCESSING_IGNORED_PRODUCTION: &str = "processing.ignoredProduction";
pub const PROCESSING_IGNORED_PUBLISHERS: &str = "processing.ignoredPublishers";
pub const PROCESSING_DO_CONTINUE_ON_DIRECTORY_PROCESSING_ERRORS: &str =
    "processing.doContinueOnDirectoryProcessingErrors";
pub const PROCESSING_DO_DELETE_COMMENTS: &str = "processing.doDeleteComments";
pub const PROCESSING_DO_USE_CURRENT_YEAR_AS_DEFAULT_ORIG_ALBUM_YEAR: &str =
    "processing.doUseCurrentYearAsDefaultOrigAlbumYearValue";
pub const PROCESSING_DUPLICATE_ALBUM_PREFIX: &str = "processing.duplicateAlbumPrefix";
pub const PROCESSING_SKIPPED_DIRECTORY_PREFIX: &str = "processing.skippedDirectoryPrefix";
pub const PROCESSING_MAXIMUM_PROCESSING_COUNT: &str = "processing.maximumProcessingCount";
pub const PROCESSING_STAGING_DIRECTORY_SCAN_LIMIT: &str = "processing.stagingDirectoryScanLimit";
pub const PROCESSING_MAXIMUM_ALBUM_DIRECTORY_NAME_LENGTH: &str =
    "processing.maximumAlbumDirectoryNameLength";
pub const PROCESSING_MAXIMUM_ARTIST_DIRECTORY_NAME_LENGTH: &str =
    "processing.maximumArtistDirectoryNameLength";

pub const MAGIC_ENABLED: &str = "magic.enabled";
pub const MAGIC_DO_RENUMBER_SONGS: &str = "magic.doRenumberSongs";
pub const MAGIC_DO_REMOVE_FEATURING_ARTIST_FROM_SONG_ARTIST: &str =
    "magic.doRemoveFeaturingArtistFromSongArtist";
pub const MAGIC_DO_REMOVE_FEATURING_ARTIST_FROM_SONG_TITLE: &str =
    "magic.doRemoveFeaturingArtistFromSongTitle";
pub const MAGIC_DO_REPLACE_SONGS_ARTIST_SEPARATORS: &str = "magic.doReplaceSongsArtistSeparators";
pub const MAGIC_DO_SET_YEAR_TO_CURRENT_IF_INVALID: &str = "magic.doSetYearToCurrentIfInvalid";
pub const MAGIC_DO_REMOVE_UNWANTED_TEXT_FROM_ALBUM_TITLE: &str =
    "magic.doRemoveUnwantedTextFromAlbumTitle";
pub const MAGIC_DO_REMOVE_UNWANTED_TEXT_FROM_SONG_TITLES: &str =
    "magic.doRemoveUnwantedTextFromSongTitles";

pub const VALIDATION_MINIMUM_ALBUM_YEAR: &str = "validation.minimumAlbumYear";
pub const VALIDATION_MAXIMUM_ALBUM_YEAR: &str = "validation.maximumAlbumYear";
pub const VALIDATION_MAXIMUM_SONG_NUMBER: &str = "validation.maximumSongNumber";
pub const VALIDATION_MAXIMUM_MEDIA_NUMBER: &str = "validation.maximumMediaNumber";

pub const SEARCH_ENGINE_USER_AGENT: &str = "searchEngine.userAgent";
pub const SEARCH_ENGINE_DEFAULT_PAGE_SIZE: &str = "searchEngine.defaultPageSize";
pub const SEARCH_ENGINE_MAXIMUM_ALLOWED_PAGE_SIZE: &str = "searchEngine.maximumAllowedPageSize";
pub const SEARCH_ENGINE_ARTIST_REFRESH_IN_DAYS: &str =
    "searchEngine.artistSearchDatabaseRefreshInDays";
pub const SEARCH_ENGINE_MUSICBRAINZ_ENABLED: &str = "searchEngine.musicbrainz.enabled";
pub const SEARCH_ENGINE_MUSICBRAINZ_STORAGE_PATH: &str = "searchEngine.musicbrainz.storagePath";
pub const SEARCH_ENGINE_MUSICBRAINZ_IMPORT_BATCH_SIZE: &str =
    "searchEngine.musicbrainz.importBatchSize";
pub const SEARCH_ENGINE_MUSICBRAINZ_IMPORT_MAXIMUM_TO_PROCESS: &str =
    "searchEngine.musicbrainz.importMaximumToProcess";
pub const SEARCH_ENGINE_MUSICBRAINZ_IMPORT_LAST_IMPORT_TIMESTAMP: &str =
    "searchEngine.musicbrainz.importLastImportTimestamp";
pub const SEARCH_ENGINE_SPOTIFY_ENABLED: &str = "searchEngine.spotify.enabled";
pub const SEARCH_ENGINE_SPOTIFY_API_KEY: &str = "searchEngine.spotify.apiKey";
pub const SEARCH_ENGINE_SPOTIFY_SHARED_SECRET: &str = "searchEngine.spotify.sharedSecret";
pub const SEARCH_ENGINE_SPOTIFY_ACCESS_TOKEN: &str = "searchEngine.spotify.accessToken";
pub const SEARCH_ENGINE_ITUNES_ENABLED: &str = "searchEngine.itunes.enabled";
pub const SEARCH_ENGINE_LASTFM_ENABLED: &str = "searchEngine.lastFm.Enabled";
pub const SCROBBLING_LASTFM_API_KEY: &str = "scrobbling.lastFm.apiKey";

pub const JOBS_ARTIST_HOUSEKEEPING_CRON: &str = "jobs.artistHousekeeping.cronExpression";
pub const JOBS_LIBRARY_PROCESS_CRON: &str = "jobs.libraryProcess.cronExpression";
pub const JOBS_LIBRARY_INSERT_CRON: &str = "jobs.libraryInsert.cronExpression";
pub const JOBS_MUSICBRAINZ_UPDATE_DATABASE_CRON: &str =
    "jobs.musicbrainzUpdateDatabase.cronExpression";
pub const JOBS_ARTIST_SEARCH_ENGINE_HOUSEKEEPING_CRON: &str =
    "jobs.artistSearchEngineHousekeeping.cronExpression";

/// Every setting seeded into a fresh catalog. Keys outside the pipeline's
/// concerns (imaging, transcoding, system, ...) are part of the shared
/// configuration surface and seeded for their consumers even though nothing
/// in this process reads them.
pub const SETTINGS_REGISTRY: &[SettingSeed] = &[
    seed!(DEFAULTS_PAGE_SIZE, "defaults", "100", "Default page size for paginated views."),
    seed!(
        DEFAULTS_BATCH_SIZE,
        "defaults",
        "250",
        "Processing batch size. Allowed range is between [250] and [1000]."
    ),
    seed!(
        PROCESSING_ALBUM_TITLE_REMOVALS,
        "processing",
        r##"["^","~","#"]"##,
        "Fragments to remove from album titles (JSON array)."
    ),
    seed!(
        PROCESSING_SONG_TITLE_REMOVALS,
        "processing",
        r#"[";","(Remaster)","Remaster"]"#,
        "Fragments to remove from song titles (JSON array)."
    ),
    seed!(
        PROCESSING_ARTIST_NAME_REPLACEMENTS,
        "processing",
        r#"{"AC/DC":["AC; DC","AC;DC","AC/ DC","AC DC"],"Love/Hate":["Love; Hate","Love;Hate","Love/ Hate","Love Hate"]}"#,
        "Fragments of artist names to replace (JSON dictionary of canonical name to variants)."
    ),
    seed!(
        PROCESSING_IGNORED_ARTICLES,
        "processing",
        "THE|EL|LA|LOS|LAS|LE|LES|OS|AS|O|A",
        "List of ignored articles when computing sort names (pipe delimited)."
    ),
    seed!(
        PROCESSING_IGNORED_PERFORMERS,
        "processing",
        "[]",
        "Don't create performer contributors for these names (JSON array)."
    ),
    seed!(
        PROCESSING_IGNORED_PRODUCTION,
        "processing",
        r#"["www.t.me;pmedia_music"]"#,
        "Don't create production contributors for these names (JSON array)."
    ),
    seed!(
        PROCESSING_IGNORED_PUBLISHERS,
        "processing",
        r#"["P.M.E.D.I.A","PMEDIA","PMEDIA GROUP"]"#,
        "Don't create publisher contributors for these names (JSON array)."
    ),
    seed!(
        PROCESSING_DO_CONTINUE_ON_DIRECTORY_PROCESSING_ERRORS,
        "processing",
        "true",
        "Continue processing sibling directories when one directory fails."
    ),
    seed!(
        PROCESSING_DO_DELETE_COMMENTS,
        "processing",
        "true",
        "Remove comment tag fields from processed metadata."
    ),
    seed!(
        PROCESSING_DO_USE_CURRENT_YEAR_AS_DEFAULT_ORIG_ALBUM_YEAR,
        "processing",
        "false",
        "If the original album year is invalid or missing, use the current year."
    ),
    seed!(
        PROCESSING_DUPLICATE_ALBUM_PREFIX,
        "processing",
        "_duplicate_ ",
        "Prefix applied to a directory that collides with an existing album without being identical."
    ),
    seed!(
        PROCESSING_SKIPPED_DIRECTORY_PREFIX,
        "processing",
        "_skip_ ",
        "Prefix applied to directories to exclude them from scanning."
    ),
    seed!(
        PROCESSING_MAXIMUM_PROCESSING_COUNT,
        "processing",
        "0",
        "Maximum number of directories to process per scan, zero for unlimited."
    ),
    seed!(
        PROCESSING_STAGING_DIRECTORY_SCAN_LIMIT,
        "processing",
        "250",
        "Maximum number of albums to scan when processing the staging directory."
    ),
    seed!(
        PROCESSING_MAXIMUM_ALBUM_DIRECTORY_NAME_LENGTH,
        "processing",
        "255",
        "Maximum allowed length of an album directory name."
    ),
    seed!(
        PROCESSING_MAXIMUM_ARTIST_DIRECTORY_NAME_LENGTH,
        "processing",
        "255",
        "Maximum allowed length of an artist directory name."
    ),
    seed!(MAGIC_ENABLED, "magic", "true", "Is magic processing enabled."),
    seed!(
        MAGIC_DO_RENUMBER_SONGS,
        "magic",
        "true",
        "Renumber songs sequentially when doing magic processing."
    ),
    seed!(
        MAGIC_DO_REMOVE_FEATURING_ARTIST_FROM_SONG_ARTIST,
        "magic",
        "true",
        "Extract featured artists from the song artist into contributors."
    ),
    seed!(
        MAGIC_DO_REMOVE_FEATURING_ARTIST_FROM_SONG_TITLE,
        "magic",
        "true",
        "Extract featured artists from the song title into contributors."
    ),
    seed!(
        MAGIC_DO_REPLACE_SONGS_ARTIST_SEPARATORS,
        "magic",
        "true",
        "Replace song artist separators with the standard separator ('/')."
    ),
    seed!(
        MAGIC_DO_SET_YEAR_TO_CURRENT_IF_INVALID,
        "magic",
        "false",
        "Set the song year to the current year if invalid or missing."
    ),
    seed!(
        MAGIC_DO_REMOVE_UNWANTED_TEXT_FROM_ALBUM_TITLE,
        "magic",
        "true",
        "Remove unwanted text fragments from album titles."
    ),
    seed!(
        MAGIC_DO_REMOVE_UNWANTED_TEXT_FROM_SONG_TITLES,
        "magic",
        "true",
        "Remove unwanted text fragments from song titles."
    ),
    seed!(VALIDATION_MINIMUM_ALBUM_YEAR, "validation", "1860", "Minimum allowed year for an album."),
    seed!(VALIDATION_MAXIMUM_ALBUM_YEAR, "validation", "2150", "Maximum allowed year for an album."),
    seed!(
        VALIDATION_MAXIMUM_SONG_NUMBER,
        "validation",
        "9999",
        "The maximum value a song number can have for an album."
    ),
    seed!(
        VALIDATION_MAXIMUM_MEDIA_NUMBER,
        "validation",
        "999",
        "The maximum value a media (disc) number can have for an album."
    ),
    seed!(
        SEARCH_ENGINE_USER_AGENT,
        "searchEngine",
        "Mozilla/5.0 (X11; Linux x86_64; rv:131.0) Gecko/20100101 Firefox/131.0",
        "User agent sent with search engine requests."
    ),
    seed!(
        SEARCH_ENGINE_DEFAULT_PAGE_SIZE,
        "searchEngine",
        "20",
        "Default page size when performing a search engine search."
    ),
    seed!(
        SEARCH_ENGINE_MAXIMUM_ALLOWED_PAGE_SIZE,
        "searchEngine",
        "1000",
        "The maximum allowed page size for a search engine search."
    ),
    seed!(
        SEARCH_ENGINE_ARTIST_REFRESH_IN_DAYS,
        "searchEngine",
        "14",
        "Re-query enriched artists every x days, zero to never refresh."
    ),
    seed!(SEARCH_ENGINE_MUSICBRAINZ_ENABLED, "searchEngine", "true", "Is the MusicBrainz search engine enabled."),
    seed!(
        SEARCH_ENGINE_MUSICBRAINZ_STORAGE_PATH,
        "searchEngine",
        "/var/lib/cadenza/musicbrainz/",
        "Storage path for MusicBrainz dump files and the local lookup database."
    ),
    seed!(
        SEARCH_ENGINE_MUSICBRAINZ_IMPORT_BATCH_SIZE,
        "searchEngine",
        "50000",
        "Number of dump records to import per transaction."
    ),
    seed!(
        SEARCH_ENGINE_MUSICBRAINZ_IMPORT_MAXIMUM_TO_PROCESS,
        "searchEngine",
        "0",
        "Maximum number of import batches to process, zero for unlimited."
    ),
    seed!(
        SEARCH_ENGINE_MUSICBRAINZ_IMPORT_LAST_IMPORT_TIMESTAMP,
        "searchEngine",
        "",
        "Timestamp of the last successful MusicBrainz import."
    ),
    seed!(SEARCH_ENGINE_SPOTIFY_ENABLED, "searchEngine", "false", "Is the Spotify search engine enabled."),
    seed!(SEARCH_ENGINE_SPOTIFY_API_KEY, "searchEngine", "", "Client id used with Spotify."),
    seed!(SEARCH_ENGINE_SPOTIFY_SHARED_SECRET, "searchEngine", "", "Shared secret used with Spotify."),
    seed!(
        SEARCH_ENGINE_SPOTIFY_ACCESS_TOKEN,
        "searchEngine",
        "",
        "Token obtained from Spotify; JSON containing expiry information."
    ),
    seed!(SEARCH_ENGINE_ITUNES_ENABLED, "searchEngine", "true", "Is the iTunes search engine enabled."),
    seed!(SEARCH_ENGINE_LASTFM_ENABLED, "searchEngine", "true", "Is the Last.fm search engine enabled."),
    seed!(SCROBBLING_LASTFM_API_KEY, "scrobbling", "", "Api key used with Last.fm."),
    seed!(
        JOBS_ARTIST_HOUSEKEEPING_CRON,
        "jobs",
        "0 0 0/1 1/1 * ? *",
        "Cron expression for the artist housekeeping job, empty to disable."
    ),
    seed!(
        JOBS_LIBRARY_PROCESS_CRON,
        "jobs",
        "0 */10 * ? * *",
        "Cron expression for the library process job, empty to disable."
    ),
    seed!(
        JOBS_LIBRARY_INSERT_CRON,
        "jobs",
        "0 0 0 * * ?",
        "Cron expression for the library insert job, empty to disable."
    ),
    seed!(
        JOBS_MUSICBRAINZ_UPDATE_DATABASE_CRON,
        "jobs",
        "0 0 12 1 * ?",
        "Cron expression for the MusicBrainz database update job, empty to disable."
    ),
    seed!(
        JOBS_ARTIST_SEARCH_ENGINE_HOUSEKEEPING_CRON,
        "jobs",
        "0 0 0 * * ?",
        "Cron expression for the artist search engine housekeeping job, empty to disable."
    ),
    // Shared surface consumed by sibling services, not by this process.
    seed!("imaging.smallSize", "imaging", "300", "Small image size (square)."),
    seed!("imaging.mediumSize", "imaging", "600", "Medium image size (square)."),
    seed!("imaging.largeSize", "imaging", "1600", "Large image size (square)."),
    seed!(
        "imaging.maximumNumberOfAlbumImages",
        "imaging",
        "25",
        "Maximum allowed number of images for an album, zero for unlimited."
    ),
    seed!(
        "imaging.maximumNumberOfArtistImages",
        "imaging",
        "25",
        "Maximum allowed number of images for an artist, zero for unlimited."
    ),
    seed!("imaging.minimumImageSize", "imaging", "300", "Images under this size are invalid, zero to disable."),
    seed!("transcoding.default", "transcoding", "raw", "Default format for transcoding."),
    seed!("conversion.enabled", "conversion", "true", "Is media conversion enabled."),
    seed!("conversion.bitrate", "conversion", "384", "Bitrate to convert media to (kbps)."),
    seed!(
        "filtering.lessThanSongDurationMinutes",
        "filtering",
        "0",
        "Exclude songs shorter than this many minutes, zero to disable."
    ),
    seed!("scrobbling.enabled", "scrobbling", "false", "Is scrobbling enabled."),
    seed!(
        "openSubsonicServer.enabled",
        "openSubsonicServer",
        "true",
        "Is the OpenSubsonic API surface enabled."
    ),
    seed!(
        "openSubsonicServer.openSubsonicServerSupportedVersion",
        "openSubsonicServer",
        "1.16.1",
        "The OpenSubsonic API version reported to clients."
    ),
    seed!("system.isDownloadingEnabled", "system", "true", "Is downloading enabled."),
];
