//! Spotify search engine.
//!
//! Uses the client-credentials OAuth flow: the api key and shared secret
//! come from settings, and the short-lived access token is cached back
//! into the settings table so restarts reuse it until expiry.

use super::{AlbumSearchResult, ArtistSearchResult, SearchEngine};
use crate::catalog_store::CatalogStore;
use crate::settings::registry::SEARCH_ENGINE_SPOTIFY_ACCESS_TOKEN;
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";
const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(350);
/// Refresh slack so a token is never used in its final seconds.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

pub struct SpotifyEngine {
    client: Client,
    api_key: String,
    shared_secret: String,
    store: Arc<dyn CatalogStore>,
    last_request: Mutex<Instant>,
}

/// The token as persisted in the settings row, with an absolute expiry.
#[derive(Serialize, Deserialize)]
struct StoredAccessToken {
    access_token: String,
    expires_at: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct ArtistSearchResponse {
    artists: Option<ArtistPage>,
}

#[derive(Deserialize)]
struct ArtistPage {
    items: Option<Vec<SpotifyArtist>>,
}

#[derive(Deserialize)]
struct SpotifyArtist {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct AlbumSearchResponse {
    albums: Option<AlbumPage>,
}

#[derive(Deserialize)]
struct AlbumPage {
    items: Option<Vec<SpotifyAlbum>>,
}

#[derive(Deserialize)]
struct SpotifyAlbum {
    id: String,
    name: String,
}

impl SpotifyEngine {
    pub fn new(
        api_key: &str,
        shared_secret: &str,
        user_agent: &str,
        store: Arc<dyn CatalogStore>,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            shared_secret: shared_secret.to_string(),
            store,
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

    /// A usable access token: the cached settings row if still valid,
    /// otherwise a fresh client-credentials grant, persisted back.
    fn access_token(&self) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        if let Some(raw) = self.store.get_setting(SEARCH_ENGINE_SPOTIFY_ACCESS_TOKEN)? {
            if let Ok(stored) = serde_json::from_str::<StoredAccessToken>(&raw) {
                if stored.expires_at - TOKEN_EXPIRY_MARGIN_SECS > now {
                    return Ok(stored.access_token);
                }
            }
        }

        let basic = STANDARD.encode(format!("{}:{}", self.api_key, self.shared_secret));
        let response = self
            .client
            .post(SPOTIFY_TOKEN_URL)
            .header("Authorization", format!("Basic {}", basic))
            .form(&[("grant_type", "client_credentials")])
            .send()?;
        if !response.status().is_success() {
            anyhow::bail!(
                "Spotify token request failed with status {}",
                response.status()
            );
        }
        let token: TokenResponse = response.json()?;

        let stored = StoredAccessToken {
            access_token: token.access_token.clone(),
            expires_at: now + token.expires_in,
        };
        self.store.set_setting(
            SEARCH_ENGINE_SPOTIFY_ACCESS_TOKEN,
            &serde_json::to_string(&stored).context("Failed to serialize Spotify token")?,
        )?;
        Ok(token.access_token)
    }

    fn parse_response(body: ArtistSearchResponse) -> Vec<ArtistSearchResult> {
        body.artists
            .and_then(|page| page.items)
            .unwrap_or_default()
            .into_iter()
            .map(|artist| ArtistSearchResult {
                spotify_id: Some(artist.id),
                name: artist.name,
                ..Default::default()
            })
            .collect()
    }

    fn parse_album_response(body: AlbumSearchResponse) -> Vec<AlbumSearchResult> {
        body.albums
            .and_then(|page| page.items)
            .unwrap_or_default()
            .into_iter()
            .map(|album| AlbumSearchResult {
                spotify_id: Some(album.id),
                name: album.name,
                ..Default::default()
            })
            .collect()
    }
}

impl SearchEngine for SpotifyEngine {
    fn id(&self) -> &'static str {
        "spotify"
    }

    fn search_artist(&self, name: &str, page_size: usize) -> Result<Vec<ArtistSearchResult>> {
        let token = self.access_token()?;
        self.rate_limit();

        // Spotify caps search pages at 50 items.
        let url = format!(
            "{}/search?q={}&type=artist&limit={}",
            SPOTIFY_API_BASE,
            urlencoding::encode(name),
            page_size.min(50)
        );
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", token))
            .send()?;
        if !response.status().is_success() {
            anyhow::bail!("Spotify search failed with status {}", response.status());
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
        let token = self.access_token()?;
        self.rate_limit();

        let query = format!("album:\"{}\" artist:\"{}\"", album_name, artist_name);
        let url = format!(
            "{}/search?q={}&type=album&limit={}",
            SPOTIFY_API_BASE,
            urlencoding::encode(&query),
            page_size.min(50)
        );
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", token))
            .send()?;
        if !response.status().is_success() {
            anyhow::bail!(
                "Spotify album search failed with status {}",
                response.status()
            );
        }
        let body: AlbumSearchResponse = response.json()?;
        Ok(Self::parse_album_response(body))
    }
}
