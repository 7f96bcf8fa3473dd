//! End-to-end tests driving the full ingestion pipeline over a fabricated
//! inbound directory tree: scan, normalize, resolve, commit, history.

mod common;

use cadenza_catalog_server::background_jobs::jobs::LibraryProcessJob;
use cadenza_catalog_server::background_jobs::{create_scheduler, JobContext};
use cadenza_catalog_server::catalog_store::{CatalogStore, LibraryType, MetaTagIdentifier};
use cadenza_catalog_server::pipeline::ScanOrchestrator;
use cadenza_catalog_server::search_engine::EnrichmentService;
use cadenza_catalog_server::settings::PipelineConfig;
use common::{PipelineFixture, StubTagReader};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[test]
fn inbound_scan_catalogs_pink_floyd() {
    let f = PipelineFixture::new();
    // No artist/album tags: the directory tree names the unit.
    f.write_song(
        "Pink_Floyd",
        "The Wall",
        "01 In the Flesh.mp3",
        &[("title", "In the Flesh?"), ("track", "1"), ("year", "1979")],
    );

    let summary = f
        .orchestrator
        .scan_library(LibraryType::Inbound, &CancellationToken::new())
        .unwrap();
    assert_eq!(summary.units_committed, 1);

    let library_id = f.inbound_library_id();
    let artist = f
        .store
        .find_artist_by_normalized_name(library_id, "PINK FLOYD")
        .unwrap()
        .expect("artist should exist under its normalized name");
    assert_eq!(artist.name, "Pink Floyd");
    assert_eq!(artist.name_normalized, "PINK FLOYD");
    assert!(!artist.api_key.is_empty());

    let album = f
        .store
        .find_album_by_normalized_name(artist.id, "THE WALL")
        .unwrap()
        .expect("album should exist");
    assert_eq!(album.name, "The Wall");
    // Article-stripped sort form.
    assert_eq!(album.sort_name, "Wall, The");
    assert_eq!(album.release_date, Some(1979));

    let history = f.store.list_scan_history(library_id, 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].found_artists_count, 1);
    assert_eq!(history[0].found_albums_count, 1);
    assert_eq!(history[0].found_songs_count, 1);
    assert!(history[0].error_message.is_none());
}

#[test]
fn rescanning_unchanged_tree_creates_no_new_rows() {
    let f = PipelineFixture::new();
    for (album, song, track) in [
        ("The Wall", "In the Flesh?", "1"),
        ("The Wall", "The Thin Ice", "2"),
        ("Animals", "Dogs", "1"),
    ] {
        f.write_song(
            "Pink_Floyd",
            album,
            &format!("{track} {song}.mp3"),
            &[
                ("artist", "Pink Floyd"),
                ("album", album),
                ("title", song),
                ("track", track),
            ],
        );
    }

    let token = CancellationToken::new();
    f.orchestrator
        .scan_library(LibraryType::Inbound, &token)
        .unwrap();
    let artists = f.store.get_artists_count();
    let albums = f.store.get_albums_count();
    let songs = f.store.get_songs_count();
    assert_eq!((artists, albums, songs), (1, 2, 3));

    let second = f
        .orchestrator
        .scan_library(LibraryType::Inbound, &token)
        .unwrap();
    assert_eq!(second.units_unchanged, 2);
    assert_eq!(f.store.get_artists_count(), artists);
    assert_eq!(f.store.get_albums_count(), albums);
    assert_eq!(f.store.get_songs_count(), songs);

    // The second scan still left its own history row, with zero deltas.
    let history = f.store.list_scan_history(f.inbound_library_id(), 10).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].found_artists_count, 0);
    assert_eq!(history[0].found_songs_count, 0);
}

#[test]
fn differently_spelled_directories_dedup_to_one_artist() {
    let f = PipelineFixture::new();
    // Same artist under two spellings that normalize identically; both
    // tagged so the album names differ.
    f.write_song(
        "Pink_Floyd",
        "The Wall",
        "01 Song.mp3",
        &[
            ("artist", "Pink_Floyd"),
            ("album", "The Wall"),
            ("title", "Song"),
            ("track", "1"),
        ],
    );
    f.write_song(
        "pink floyd",
        "Animals",
        "01 Dogs.mp3",
        &[
            ("artist", "pink floyd"),
            ("album", "Animals"),
            ("title", "Dogs"),
            ("track", "1"),
        ],
    );

    f.orchestrator
        .scan_library(LibraryType::Inbound, &CancellationToken::new())
        .unwrap();

    assert_eq!(f.store.get_artists_count(), 1);
    assert_eq!(f.store.get_albums_count(), 2);
}

#[test]
fn duplicate_song_numbers_renumber_without_constraint_violation() {
    let f = PipelineFixture::new();
    // Two consecutive songs both tagged SongNumber=3.
    f.write_song(
        "A",
        "Tricky",
        "a First.mp3",
        &[("artist", "A"), ("album", "Tricky"), ("title", "First"), ("track", "3")],
    );
    f.write_song(
        "A",
        "Tricky",
        "b Second.mp3",
        &[("artist", "A"), ("album", "Tricky"), ("title", "Second"), ("track", "3")],
    );

    let summary = f
        .orchestrator
        .scan_library(LibraryType::Inbound, &CancellationToken::new())
        .unwrap();
    assert_eq!(summary.units_committed, 1);
    assert_eq!(summary.counts.songs_created, 2);

    let library_id = f.inbound_library_id();
    let artist = f
        .store
        .find_artist_by_normalized_name(library_id, "A")
        .unwrap()
        .unwrap();
    let album = f
        .store
        .find_album_by_normalized_name(artist.id, "TRICKY")
        .unwrap()
        .unwrap();
    let positions: Vec<i64> = f
        .store
        .get_album_song_positions(album.id)
        .unwrap()
        .into_iter()
        .map(|(n, _)| n)
        .collect();
    assert_eq!(positions, vec![3, 4]);

    let first = f.store.find_song_by_position(album.id, 3).unwrap().unwrap();
    assert_eq!(first.title, "First");
    let second = f.store.find_song_by_position(album.id, 4).unwrap().unwrap();
    assert_eq!(second.title, "Second");
}

#[test]
fn contributor_rows_are_unique_per_tag_and_album() {
    let f = PipelineFixture::new();
    // The same producer credited on both files of the album.
    for track in ["1", "2"] {
        f.write_song(
            "A",
            "Produced",
            &format!("{track} Song.mp3"),
            &[
                ("artist", "A"),
                ("album", "Produced"),
                ("title", &format!("Song {track}")),
                ("track", track),
                ("producer", "Bob Ezrin"),
                ("composer", "Bob Ezrin"),
            ],
        );
    }

    let token = CancellationToken::new();
    f.orchestrator
        .scan_library(LibraryType::Inbound, &token)
        .unwrap();

    let library_id = f.inbound_library_id();
    let artist = f
        .store
        .find_artist_by_normalized_name(library_id, "A")
        .unwrap()
        .unwrap();
    let album = f
        .store
        .find_album_by_normalized_name(artist.id, "PRODUCED")
        .unwrap()
        .unwrap();

    let contributors = f.store.list_album_contributors(album.id).unwrap();
    // One row per distinct tag field, not per file.
    assert_eq!(contributors.len(), 2);
    assert!(contributors
        .iter()
        .any(|c| c.meta_tag_identifier == MetaTagIdentifier::Producer));
    assert!(contributors
        .iter()
        .any(|c| c.meta_tag_identifier == MetaTagIdentifier::Composer));

    // A rescan reuses the rows instead of duplicating them.
    f.orchestrator
        .scan_library(LibraryType::Inbound, &token)
        .unwrap();
    assert_eq!(f.store.list_album_contributors(album.id).unwrap().len(), 2);
}

#[test]
fn featuring_artist_moves_from_tag_to_contributor() {
    let f = PipelineFixture::new();
    f.write_song(
        "Daft_Punk",
        "Random Access Memories",
        "08 Get Lucky.mp3",
        &[
            ("artist", "Daft Punk feat. Pharrell Williams"),
            ("album", "Random Access Memories"),
            ("title", "Get Lucky"),
            ("track", "8"),
        ],
    );

    f.orchestrator
        .scan_library(LibraryType::Inbound, &CancellationToken::new())
        .unwrap();

    let library_id = f.inbound_library_id();
    let artist = f
        .store
        .find_artist_by_normalized_name(library_id, "DAFT PUNK")
        .unwrap()
        .expect("main artist should be Daft Punk alone");
    let album = f
        .store
        .find_album_by_normalized_name(artist.id, "RANDOM ACCESS MEMORIES")
        .unwrap()
        .unwrap();
    let contributors = f.store.list_album_contributors(album.id).unwrap();
    assert!(contributors
        .iter()
        .any(|c| c.contributor_name.as_deref() == Some("Pharrell Williams")));
}

#[test]
fn invalid_year_defaults_to_current_year_when_configured() {
    let mut config = PipelineConfig::defaults();
    config.processing.do_use_current_year_as_default_orig_album_year = true;
    let f = PipelineFixture::with_config(config);
    f.write_song(
        "A",
        "Ancient",
        "01 Relic.mp3",
        &[
            ("artist", "A"),
            ("album", "Ancient"),
            ("title", "Relic"),
            ("track", "1"),
            ("year", "1500"),
        ],
    );

    f.orchestrator
        .scan_library(LibraryType::Inbound, &CancellationToken::new())
        .unwrap();

    let library_id = f.inbound_library_id();
    let artist = f
        .store
        .find_artist_by_normalized_name(library_id, "A")
        .unwrap()
        .unwrap();
    let album = f
        .store
        .find_album_by_normalized_name(artist.id, "ANCIENT")
        .unwrap()
        .unwrap();
    let current_year = chrono::Datelike::year(&chrono::Utc::now()) as i64;
    assert_eq!(album.original_release_date, Some(current_year));
    // 1500 is outside [1860, 2150] and must not survive.
    assert_ne!(album.original_release_date, Some(1500));
}

#[test]
fn rewritten_file_updates_song_in_place() {
    let f = PipelineFixture::new();
    f.write_song(
        "A",
        "Album",
        "01 Song.mp3",
        &[("artist", "A"), ("album", "Album"), ("title", "Song"), ("track", "1")],
    );
    let token = CancellationToken::new();
    f.orchestrator
        .scan_library(LibraryType::Inbound, &token)
        .unwrap();

    // Re-rip: same position, different content and title.
    f.write_song(
        "A",
        "Album",
        "01 Song.mp3",
        &[
            ("artist", "A"),
            ("album", "Album"),
            ("title", "Song (Live)"),
            ("track", "1"),
        ],
    );
    let summary = f
        .orchestrator
        .scan_library(LibraryType::Inbound, &token)
        .unwrap();
    assert_eq!(summary.counts.songs_updated, 1);
    assert_eq!(summary.counts.songs_created, 0);
    assert_eq!(f.store.get_songs_count(), 1);
}

#[tokio::test]
async fn scheduler_triggered_scan_populates_the_catalog() {
    let f = PipelineFixture::new();
    f.write_song(
        "Pink_Floyd",
        "Meddle",
        "01 One of These Days.mp3",
        &[
            ("artist", "Pink Floyd"),
            ("album", "Meddle"),
            ("title", "One of These Days"),
            ("track", "1"),
        ],
    );

    let config = PipelineConfig::defaults();
    let shutdown = CancellationToken::new();
    let orchestrator = Arc::new(
        ScanOrchestrator::with_worker_count(
            f.store.clone(),
            Arc::new(StubTagReader),
            config.clone(),
            2,
        )
        .unwrap(),
    );
    let enrichment = Arc::new(EnrichmentService::new(
        f.store.clone(),
        vec![],
        config.search_engine.default_page_size,
        config.search_engine.maximum_allowed_page_size,
        config.search_engine.artist_refresh_in_days,
    ));
    let ctx = JobContext::new(
        shutdown.child_token(),
        f.store.clone(),
        orchestrator,
        enrichment,
        None,
        config.clone(),
    );
    let (mut scheduler, handle) = create_scheduler(shutdown.clone(), ctx);
    // Empty cron: the job only runs when triggered, as the CLI does.
    scheduler
        .register_job(Arc::new(LibraryProcessJob::new(String::new())))
        .await;
    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    handle.trigger_job("library_process").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    let mut attempts = 0;
    while handle.is_job_running("library_process").await && attempts < 50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        attempts += 1;
    }

    assert_eq!(f.store.get_artists_count(), 1);
    assert_eq!(f.store.get_albums_count(), 1);
    assert_eq!(
        f.store
            .list_scan_history(f.inbound_library_id(), 10)
            .unwrap()
            .len(),
        1
    );

    shutdown.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(2), scheduler_task).await;
}
