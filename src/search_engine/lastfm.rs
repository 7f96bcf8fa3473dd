//! Last.fm search engine.
//!
//! Rate limited to 5 requests per second per Last.fm API guidelines.

use super::{AlbumSearchResult, ArtistSearchResult, SearchEngine};
use anyhow::Result;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const LASTFM_API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";
const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(200); // 5 req/sec

pub struct LastFmEngine {
    client: Client,
    api_key: String,
    last_request: Mutex<Instant>,
}

#[derive(Deserialize)]
struct ArtistSearchResponse {
    results: Option<SearchResults>,
}

#[derive(Deserialize)]
struct SearchResults {
    artistmatches: Option<ArtistMatches>,
}

#[derive(Deserialize)]
struct ArtistMatches {
    artist: Option<Vec<LastFmArtist>>,
}

#[derive(Deserialize)]
struct LastFmArtist {
    name: Option<String>,
    mbid: Option<String>,
    url: Option<String>,
}

#[derive(Deserialize)]
struct AlbumSearchResponse {
    results: Option<AlbumSearchResults>,
}

#[derive(Deserialize)]
struct AlbumSearchResults {
    albummatches: Option<AlbumMatches>,
}

#[derive(Deserialize)]
struct AlbumMatches {
    album: Option<Vec<LastFmAlbum>>,
}

#[derive(Deserialize)]
struct LastFmAlbum {
    name: Option<String>,
    artist: Option<String>,
    mbid: Option<String>,
}

impl LastFmEngine {
    pub fn new(api_key: &str, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            last_request: Mutex::new(Instant::now() - RATE_LIMIT_INTERVAL),
        })
    }

    fn rate_limit(&self) {
        let mut last = self.last_request.lock().unwrap();
        let elapsed = last.elapsed();
        if elapsed < RATE_LIMIT_INTERVAL {
            std::thread::sleep(RATE_LIMIT_INTERVAL - elapsed);
        }
        *last = Instant::now();
    }

    /// Last.fm's album.search matches album names only; matches are
    /// filtered down to the requested artist.
    fn parse_album_response(body: AlbumSearchResponse, artist_name: &str) -> Vec<AlbumSearchResult> {
        body.results
            .and_then(|r| r.albummatches)
            .and_then(|m| m.album)
            .unwrap_or_default()
            .into_iter()
            .filter(|album| {
                album
                    .artist
                    .as_deref()
                    .map(|a| a.eq_ignore_ascii_case(artist_name))
                    .unwrap_or(false)
            })
            .filter_map(|album| {
                Some(AlbumSearchResult {
                    name: album.name?,
                    musicbrainz_id: album.mbid.filter(|m| !m.is_empty()),
                    ..Default::default()
                })
            })
            .collect()
    }

    fn parse_response(body: ArtistSearchResponse) -> Vec<ArtistSearchResult> {
        body.results
            .and_then(|r| r.artistmatches)
            .and_then(|m| m.artist)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|artist| {
                let name = artist.name?;
                Some(ArtistSearchResult {
                    lastfm_id: artist.url.or_else(|| Some(name.clone())),
                    musicbrainz_id: artist.mbid.filter(|m| !m.is_empty()),
                    name,
                    ..Default::default()
                })
            })
            .collect()
    }
}

impl SearchEngine for LastFmEngine {
    fn id(&self) -> &'static str {
        "lastfm"
    }

    fn search_artist(&self, name: &str, page_size: usize) -> Result<Vec<ArtistSearchResult>> {
        self.rate_limit();

        let url = format!(
            "{}?method=artist.search&artist={}&api_key={}&format=json&limit={}",
            LASTFM_API_BASE,
            urlencoding::encode(name),
            self.api_key,
            page_size
        );
        let response = self.client.get(&url).send()?;
        if !response.status().is_success() {
            anyhow::bail!("Last.fm search failed with status {}", response.status());
        }
        let body: ArtistSearchResponse = response.json()?;
        Ok(Self::parse_response(body))
    }

    fn search_album(
        &self,
        artist_name: &str,
        album_name: &str,
        page_size: usize,
    ) -> Result<Vec<AlbumSearchResult>> {
        self.rate_limit();

        let url = format!(
            "{}?method=album.search&album={}&api_key={}&format=json&limit={}",
            LASTFM_API_BASE,
            urlencoding::encode(album_name),
            self.api_key,
            page_size
        );
        let response = self.client.get(&url).send()?;
        if !response.status().is_success() {
            anyhow::bail!(
                "Last.fm album search failed with status {}",
                response.status()
            );
        }
        let body: AlbumSearchResponse = response.json()?;
        Ok(Self::parse_album_response(body, artist_name))
    }
}
