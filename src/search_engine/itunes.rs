//! iTunes search engine.
//!
//! The iTunes search API is public and keyless; lookups go straight to
//! the artist entity endpoint.

use super::{ArtistSearchResult, SearchEngine};
use anyhow::Result;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const ITUNES_API_BASE: &str = "https://itunes.apple.com/search";
// Apple documents roughly 20 calls per minute for the search API.
const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(3);

pub struct ItunesEngine {
    client: Client,
    last_request: Mutex<Instant>,
}

#[derive(Deserialize)]
struct ItunesSearchResponse {
    #[serde(default)]
    results: Vec<ItunesArtist>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItunesArtist {
    artist_id: Option<i64>,
    artist_name: Option<String>,
    amg_artist_id: Option<i64>,
}

impl ItunesEngine {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
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

    fn parse_response(body: ItunesSearchResponse) -> Vec<ArtistSearchResult> {
        body.results
            .into_iter()
            .filter_map(|artist| {
                let itunes_id = artist.artist_id?;
                Some(ArtistSearchResult {
                    itunes_id: Some(itunes_id.to_string()),
                    amg_id: artist.amg_artist_id.map(|id| id.to_string()),
                    name: artist.artist_name.unwrap_or_default(),
                    ..Default::default()
                })
            })
            .collect()
    }
}

impl SearchEngine for ItunesEngine {
    fn id(&self) -> &'static str {
        "itunes"
    }

    fn search_artist(&self, name: &str, page_size: usize) -> Result<Vec<ArtistSearchResult>> {
        self.rate_limit();

        let url = format!(
            "{}?term={}&entity=musicArtist&limit={}",
            ITUNES_API_BASE,
            urlencoding::encode(name),
            page_size
        );
        let response = self.client.get(&url).send()?;
        if !response.status().is_success() {
            anyhow::bail!("iTunes search failed with status {}", response.status());
        }
        let body: ItunesSearchResponse = response.json()?;
        Ok(Self::parse_response(body))
    }
}
