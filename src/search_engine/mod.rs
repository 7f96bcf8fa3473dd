//! External metadata search engines and the enrichment pass.
//!
//! Engines are simple request/response lookups keyed by artist name. Every
//! query, successful or not, appends one row to `search_histories` — the
//! audit trail of what was asked and what came back. Enrichment is
//! best-effort: a provider failure is logged and skipped, never propagated
//! to the ingestion path.

pub mod itunes;
pub mod lastfm;
pub mod musicbrainz;
pub mod spotify;

use crate::catalog_store::{
    AlbumExternalIds, ArtistExternalIds, CatalogStore, MetaDataStatus, SearchHistory,
};
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One artist match from an external provider. Engines fill in whichever
/// identifier namespaces they own.
#[derive(Clone, Debug, Default)]
pub struct ArtistSearchResult {
    pub name: String,
    pub musicbrainz_id: Option<String>,
    pub spotify_id: Option<String>,
    pub discogs_id: Option<String>,
    pub itunes_id: Option<String>,
    pub amg_id: Option<String>,
    pub wikidata_id: Option<String>,
    pub lastfm_id: Option<String>,
}

/// One album match. Only the namespaces persisted on album rows.
#[derive(Clone, Debug, Default)]
pub struct AlbumSearchResult {
    pub name: String,
    pub musicbrainz_id: Option<String>,
    pub spotify_id: Option<String>,
}

pub trait SearchEngine: Send + Sync {
    /// Stable engine identifier, recorded in search history rows.
    fn id(&self) -> &'static str;

    /// Look up artists by display name. `page_size` is already clamped by
    /// the caller.
    fn search_artist(&self, name: &str, page_size: usize) -> Result<Vec<ArtistSearchResult>>;

    /// Look up an album by artist and album name. Engines without an album
    /// namespace report no matches.
    fn search_album(
        &self,
        _artist_name: &str,
        _album_name: &str,
        _page_size: usize,
    ) -> Result<Vec<AlbumSearchResult>> {
        Ok(Vec::new())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EnrichmentSummary {
    pub artists_processed: usize,
    pub artists_enriched: usize,
    pub artists_failed: usize,
    pub albums_processed: usize,
    pub albums_enriched: usize,
    pub albums_failed: usize,
    pub queries_issued: usize,
}

pub struct EnrichmentService {
    store: Arc<dyn CatalogStore>,
    engines: Vec<Box<dyn SearchEngine>>,
    default_page_size: usize,
    maximum_allowed_page_size: usize,
    artist_refresh_in_days: i64,
}

impl EnrichmentService {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        engines: Vec<Box<dyn SearchEngine>>,
        default_page_size: usize,
        maximum_allowed_page_size: usize,
        artist_refresh_in_days: i64,
    ) -> Self {
        Self {
            store,
            engines,
            default_page_size,
            maximum_allowed_page_size,
            artist_refresh_in_days,
        }
    }

    /// Clamp a requested page size into `[1, maximum_allowed_page_size]`,
    /// defaulting when unspecified.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.maximum_allowed_page_size.max(1))
    }

    /// Enrich a batch of artists that have never been processed or whose
    /// enrichment is older than the refresh window (0 disables refresh).
    pub fn enrich_artists(
        &self,
        batch_size: usize,
        cancellation: &CancellationToken,
    ) -> Result<EnrichmentSummary> {
        let mut summary = EnrichmentSummary::default();
        if self.engines.is_empty() {
            debug!("No search engines enabled, skipping enrichment");
            return Ok(summary);
        }

        let refreshed_before = match self.artist_refresh_in_days {
            days if days > 0 => Some(chrono::Utc::now().timestamp() - days * 24 * 60 * 60),
            _ => None,
        };
        let artists = self
            .store
            .list_artists_needing_enrichment(refreshed_before, batch_size)?;
        info!("Enriching {} artists", artists.len());

        let page_size = self.page_size(None);
        for artist in artists {
            if cancellation.is_cancelled() {
                break;
            }
            summary.artists_processed += 1;
            let initial = ArtistExternalIds {
                musicbrainz_id: artist.musicbrainz_id.clone(),
                spotify_id: artist.spotify_id.clone(),
                discogs_id: artist.discogs_id.clone(),
                itunes_id: artist.itunes_id.clone(),
                amg_id: artist.amg_id.clone(),
                wikidata_id: artist.wikidata_id.clone(),
                lastfm_id: artist.lastfm_id.clone(),
            };
            let mut merged = initial.clone();

            for engine in &self.engines {
                if cancellation.is_cancelled() {
                    break;
                }
                summary.queries_issued += 1;
                let started = Instant::now();
                match engine.search_artist(&artist.name, page_size) {
                    Ok(results) => {
                        self.record_query(engine.id(), &artist.name, results.len(), started);
                        if let Some(best) = results.into_iter().next() {
                            merge_ids(&mut merged, best);
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Search engine {} failed for '{}': {}",
                            engine.id(),
                            artist.name,
                            e
                        );
                        self.record_query(engine.id(), &artist.name, 0, started);
                    }
                }
            }

            // Ids the artist already carried do not count as a find.
            let found_anything = merged != initial;

            if found_anything {
                self.store.update_artist_external_ids(artist.id, &merged)?;
                self.store
                    .set_artist_meta_data_status(artist.id, MetaDataStatus::Enriched)?;
                summary.artists_enriched += 1;
            } else {
                self.store
                    .set_artist_meta_data_status(artist.id, MetaDataStatus::Failed)?;
                summary.artists_failed += 1;
            }
        }

        info!(
            "Enrichment pass: {} processed, {} enriched, {} failed, {} queries",
            summary.artists_processed,
            summary.artists_enriched,
            summary.artists_failed,
            summary.queries_issued
        );
        Ok(summary)
    }

    /// Enrich a batch of albums, resolving MusicBrainz/Spotify release ids
    /// by `(artist name, album name)` lookups against the enabled engines.
    pub fn enrich_albums(
        &self,
        batch_size: usize,
        cancellation: &CancellationToken,
    ) -> Result<EnrichmentSummary> {
        let mut summary = EnrichmentSummary::default();
        if self.engines.is_empty() {
            debug!("No search engines enabled, skipping album enrichment");
            return Ok(summary);
        }

        let refreshed_before = match self.artist_refresh_in_days {
            days if days > 0 => Some(chrono::Utc::now().timestamp() - days * 24 * 60 * 60),
            _ => None,
        };
        let albums = self
            .store
            .list_albums_needing_enrichment(refreshed_before, batch_size)?;
        info!("Enriching {} albums", albums.len());

        let page_size = self.page_size(None);
        for album in albums {
            if cancellation.is_cancelled() {
                break;
            }
            let Some(artist) = self.store.get_artist(album.artist_id)? else {
                continue;
            };
            summary.albums_processed += 1;
            let initial = AlbumExternalIds {
                musicbrainz_id: album.musicbrainz_id.clone(),
                spotify_id: album.spotify_id.clone(),
            };
            let mut merged = initial.clone();
            let query = format!("{} - {}", artist.name, album.name);

            for engine in &self.engines {
                if cancellation.is_cancelled() {
                    break;
                }
                summary.queries_issued += 1;
                let started = Instant::now();
                match engine.search_album(&artist.name, &album.name, page_size) {
                    Ok(results) => {
                        self.record_album_query(engine.id(), &query, results.len(), started);
                        if let Some(best) = results.into_iter().next() {
                            let take = |slot: &mut Option<String>, value: Option<String>| {
                                if slot.is_none() {
                                    *slot = value.filter(|v| !v.is_empty());
                                }
                            };
                            take(&mut merged.musicbrainz_id, best.musicbrainz_id);
                            take(&mut merged.spotify_id, best.spotify_id);
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Search engine {} failed for album '{}': {}",
                            engine.id(),
                            query,
                            e
                        );
                        self.record_album_query(engine.id(), &query, 0, started);
                    }
                }
            }

            if merged != initial {
                self.store.update_album_external_ids(album.id, &merged)?;
                self.store
                    .set_album_meta_data_status(album.id, MetaDataStatus::Enriched)?;
                summary.albums_enriched += 1;
            } else {
                self.store
                    .set_album_meta_data_status(album.id, MetaDataStatus::Failed)?;
                summary.albums_failed += 1;
            }
        }

        info!(
            "Album enrichment pass: {} processed, {} enriched, {} failed",
            summary.albums_processed, summary.albums_enriched, summary.albums_failed
        );
        Ok(summary)
    }

    fn record_query(&self, engine_id: &str, query: &str, found: usize, started: Instant) {
        let history = SearchHistory {
            by_engine: engine_id.to_string(),
            query: query.to_string(),
            found_artists_count: found as i64,
            duration_in_ms: started.elapsed().as_millis() as i64,
            ..Default::default()
        };
        if let Err(e) = self.store.append_search_history(&history) {
            warn!("Failed to append search history: {}", e);
        }
    }

    fn record_album_query(&self, engine_id: &str, query: &str, found: usize, started: Instant) {
        let history = SearchHistory {
            by_engine: engine_id.to_string(),
            query: query.to_string(),
            found_albums_count: found as i64,
            duration_in_ms: started.elapsed().as_millis() as i64,
            ..Default::default()
        };
        if let Err(e) = self.store.append_search_history(&history) {
            warn!("Failed to append search history: {}", e);
        }
    }
}

fn merge_ids(merged: &mut ArtistExternalIds, result: ArtistSearchResult) {
    let take = |slot: &mut Option<String>, value: Option<String>| {
        if slot.is_none() {
            *slot = value.filter(|v| !v.is_empty());
        }
    };
    take(&mut merged.musicbrainz_id, result.musicbrainz_id);
    take(&mut merged.spotify_id, result.spotify_id);
    take(&mut merged.discogs_id, result.discogs_id);
    take(&mut merged.itunes_id, result.itunes_id);
    take(&mut merged.amg_id, result.amg_id);
    take(&mut merged.wikidata_id, result.wikidata_id);
    take(&mut merged.lastfm_id, result.lastfm_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::{
        AlbumWrite, ArtistWrite, LibraryType, SqliteCatalogStore, UnitWrite,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct StubEngine {
        id: &'static str,
        result: Option<ArtistSearchResult>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl SearchEngine for StubEngine {
        fn id(&self) -> &'static str {
            self.id
        }

        fn search_artist(&self, _name: &str, _page_size: usize) -> Result<Vec<ArtistSearchResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("provider unreachable");
            }
            Ok(self.result.clone().into_iter().collect())
        }
    }

    fn store_with_artist() -> (Arc<SqliteCatalogStore>, TempDir, i64) {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(SqliteCatalogStore::new(temp.path().join("c.db"), 1).unwrap());
        let library_id = store
            .get_library_by_type(LibraryType::Inbound)
            .unwrap()
            .unwrap()
            .id;
        store
            .commit_unit(&UnitWrite {
                library_id,
                artist: ArtistWrite {
                    existing_id: None,
                    name: "Pink Floyd".to_string(),
                    name_normalized: "PINK FLOYD".to_string(),
                    sort_name: "Pink Floyd".to_string(),
                    directory: "Pink Floyd".to_string(),
                    musicbrainz_id: None,
                },
                album: AlbumWrite {
                    existing_id: None,
                    name: "Meddle".to_string(),
                    name_normalized: "MEDDLE".to_string(),
                    sort_name: "Meddle".to_string(),
                    directory: "Pink Floyd/Meddle".to_string(),
                    album_type: crate::catalog_store::AlbumType::Album,
                    release_date: Some(1971),
                    original_release_date: None,
                    genres: vec![],
                    musicbrainz_id: None,
                },
                songs: vec![],
                contributors: vec![],
            })
            .unwrap();
        let artist_id = store
            .find_artist_by_normalized_name(library_id, "PINK FLOYD")
            .unwrap()
            .unwrap()
            .id;
        (store, temp, artist_id)
    }

    #[test]
    fn page_size_is_clamped() {
        let (store, _dir, _) = store_with_artist();
        let service = EnrichmentService::new(store, vec![], 20, 100, 14);
        assert_eq!(service.page_size(None), 20);
        assert_eq!(service.page_size(Some(0)), 1);
        assert_eq!(service.page_size(Some(5000)), 100);
    }

    #[test]
    fn successful_lookup_enriches_and_records_history() {
        let (store, _dir, artist_id) = store_with_artist();
        let engine = StubEngine {
            id: "stub",
            result: Some(ArtistSearchResult {
                name: "Pink Floyd".to_string(),
                musicbrainz_id: Some("mbid-floyd".to_string()),
                spotify_id: Some("spotify-floyd".to_string()),
                ..Default::default()
            }),
            fail: false,
            calls: AtomicUsize::new(0),
        };
        let service =
            EnrichmentService::new(store.clone(), vec![Box::new(engine)], 20, 100, 14);

        let summary = service
            .enrich_artists(10, &CancellationToken::new())
            .unwrap();
        assert_eq!(summary.artists_processed, 1);
        assert_eq!(summary.artists_enriched, 1);
        assert_eq!(summary.queries_issued, 1);

        let artist = store.get_artist(artist_id).unwrap().unwrap();
        assert_eq!(artist.musicbrainz_id.as_deref(), Some("mbid-floyd"));
        assert_eq!(artist.spotify_id.as_deref(), Some("spotify-floyd"));
        assert_eq!(artist.meta_data_status, MetaDataStatus::Enriched);
    }

    #[test]
    fn provider_failure_marks_failed_but_does_not_error() {
        let (store, _dir, artist_id) = store_with_artist();
        let engine = StubEngine {
            id: "stub",
            result: None,
            fail: true,
            calls: AtomicUsize::new(0),
        };
        let service =
            EnrichmentService::new(store.clone(), vec![Box::new(engine)], 20, 100, 14);

        let summary = service
            .enrich_artists(10, &CancellationToken::new())
            .unwrap();
        assert_eq!(summary.artists_failed, 1);

        let artist = store.get_artist(artist_id).unwrap().unwrap();
        assert_eq!(artist.meta_data_status, MetaDataStatus::Failed);
        // Existing metadata untouched.
        assert!(artist.musicbrainz_id.is_none());
    }

    #[test]
    fn every_query_appends_search_history() {
        let (store, _dir, _) = store_with_artist();
        let ok_engine = StubEngine {
            id: "ok",
            result: Some(ArtistSearchResult {
                name: "Pink Floyd".to_string(),
                lastfm_id: Some("lastfm-floyd".to_string()),
                ..Default::default()
            }),
            fail: false,
            calls: AtomicUsize::new(0),
        };
        let failing_engine = StubEngine {
            id: "down",
            result: None,
            fail: true,
            calls: AtomicUsize::new(0),
        };
        let service = EnrichmentService::new(
            store.clone(),
            vec![Box::new(ok_engine), Box::new(failing_engine)],
            20,
            100,
            14,
        );

        let summary = service
            .enrich_artists(10, &CancellationToken::new())
            .unwrap();
        assert_eq!(summary.queries_issued, 2);

        // Two history rows: one success, one failure.
        let history = store.list_search_history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history
            .iter()
            .any(|h| h.by_engine == "ok" && h.found_artists_count == 1));
        assert!(history
            .iter()
            .any(|h| h.by_engine == "down" && h.found_artists_count == 0));
        assert_eq!(history[0].query, "Pink Floyd");
    }

    #[test]
    fn enriched_artists_are_not_reprocessed_within_window() {
        let (store, _dir, _) = store_with_artist();
        let make_engine = || StubEngine {
            id: "stub",
            result: Some(ArtistSearchResult {
                name: "Pink Floyd".to_string(),
                musicbrainz_id: Some("mbid-floyd".to_string()),
                ..Default::default()
            }),
            fail: false,
            calls: AtomicUsize::new(0),
        };
        let service =
            EnrichmentService::new(store.clone(), vec![Box::new(make_engine())], 20, 100, 14);
        service
            .enrich_artists(10, &CancellationToken::new())
            .unwrap();

        // Second pass inside the 14-day window finds nothing to do.
        let service =
            EnrichmentService::new(store.clone(), vec![Box::new(make_engine())], 20, 100, 14);
        let summary = service
            .enrich_artists(10, &CancellationToken::new())
            .unwrap();
        assert_eq!(summary.artists_processed, 0);
    }

    #[test]
    fn album_enrichment_populates_release_ids() {
        struct AlbumStub;
        impl SearchEngine for AlbumStub {
            fn id(&self) -> &'static str {
                "albumstub"
            }
            fn search_artist(
                &self,
                _name: &str,
                _page_size: usize,
            ) -> Result<Vec<ArtistSearchResult>> {
                Ok(Vec::new())
            }
            fn search_album(
                &self,
                artist_name: &str,
                album_name: &str,
                _page_size: usize,
            ) -> Result<Vec<AlbumSearchResult>> {
                assert_eq!(artist_name, "Pink Floyd");
                Ok(vec![AlbumSearchResult {
                    name: album_name.to_string(),
                    musicbrainz_id: Some("mb-release-meddle".to_string()),
                    spotify_id: Some("spotify-meddle".to_string()),
                }])
            }
        }

        let (store, _dir, artist_id) = store_with_artist();
        let service =
            EnrichmentService::new(store.clone(), vec![Box::new(AlbumStub)], 20, 100, 14);
        let summary = service
            .enrich_albums(10, &CancellationToken::new())
            .unwrap();
        assert_eq!(summary.albums_processed, 1);
        assert_eq!(summary.albums_enriched, 1);

        let album = store
            .find_album_by_normalized_name(artist_id, "MEDDLE")
            .unwrap()
            .unwrap();
        assert_eq!(album.musicbrainz_id.as_deref(), Some("mb-release-meddle"));
        assert_eq!(album.spotify_id.as_deref(), Some("spotify-meddle"));
        assert_eq!(album.meta_data_status, MetaDataStatus::Enriched);
    }

    #[test]
    fn engines_without_album_namespace_mark_album_failed() {
        // StubEngine uses the default search_album (no matches).
        let (store, _dir, artist_id) = store_with_artist();
        let engine = StubEngine {
            id: "stub",
            result: None,
            fail: false,
            calls: AtomicUsize::new(0),
        };
        let service =
            EnrichmentService::new(store.clone(), vec![Box::new(engine)], 20, 100, 14);
        let summary = service
            .enrich_albums(10, &CancellationToken::new())
            .unwrap();
        assert_eq!(summary.albums_failed, 1);

        let album = store
            .find_album_by_normalized_name(artist_id, "MEDDLE")
            .unwrap()
            .unwrap();
        assert_eq!(album.meta_data_status, MetaDataStatus::Failed);
        assert!(album.musicbrainz_id.is_none());
    }

    #[test]
    fn cancellation_stops_between_artists() {
        let (store, _dir, _) = store_with_artist();
        let token = CancellationToken::new();
        token.cancel();
        let service = EnrichmentService::new(
            store,
            vec![Box::new(StubEngine {
                id: "stub",
                result: None,
                fail: false,
                calls: AtomicUsize::new(0),
            })],
            20,
            100,
            14,
        );
        let summary = service.enrich_artists(10, &token).unwrap();
        assert_eq!(summary.artists_processed, 0);
        assert_eq!(summary.queries_issued, 0);
    }
}
