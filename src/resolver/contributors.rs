//! Contributor assignment: turns tag-derived credits into contributor
//! rows keyed by `(artist | name, meta_tag_identifier, album)`.

use crate::catalog_store::{CatalogStore, ContributorWrite};
use crate::magic::{normalize, ContributorCandidate};
use crate::settings::ProcessingConfig;
use anyhow::Result;
use std::collections::HashSet;

pub struct ContributorAssigner {
    ignored_performers: HashSet<String>,
    ignored_production: HashSet<String>,
    ignored_publishers: HashSet<String>,
}

/// Ignore-list entries may themselves be pipe-delimited bundles; flatten
/// and lowercase them for exact case-insensitive matching.
fn build_ignore_set(entries: &[String]) -> HashSet<String> {
    entries
        .iter()
        .flat_map(|entry| entry.split('|'))
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

impl ContributorAssigner {
    pub fn new(processing: &ProcessingConfig) -> Self {
        Self {
            ignored_performers: build_ignore_set(&processing.ignored_performers),
            ignored_production: build_ignore_set(&processing.ignored_production),
            ignored_publishers: build_ignore_set(&processing.ignored_publishers),
        }
    }

    fn is_ignored(&self, candidate: &ContributorCandidate) -> bool {
        use crate::catalog_store::ContributorRole::*;
        let lowered = candidate.name.to_lowercase();
        match candidate.meta_tag_identifier.role() {
            Performer => self.ignored_performers.contains(&lowered),
            Production => self.ignored_production.contains(&lowered),
            Publisher => self.ignored_publishers.contains(&lowered),
        }
    }

    /// Build the contributor rows for one unit. Credits matching an ignore
    /// list are dropped; names matching a catalog artist resolve to its id;
    /// duplicate `(identity, tag)` keys within the unit collapse to one.
    pub fn assign(
        &self,
        store: &dyn CatalogStore,
        library_id: i64,
        candidates: &[ContributorCandidate],
    ) -> Result<Vec<ContributorWrite>> {
        let mut writes = Vec::new();
        let mut seen: HashSet<(String, &'static str)> = HashSet::new();

        for candidate in candidates {
            if self.is_ignored(candidate) {
                continue;
            }
            let tag = candidate.meta_tag_identifier.to_db_str();
            let normalized = normalize::normalize_name(&candidate.name);
            if normalized.is_empty() {
                continue;
            }
            let resolved = store.find_artist_by_normalized_name(library_id, &normalized)?;
            let identity_key = match &resolved {
                Some(artist) => format!("artist:{}", artist.id),
                None => format!("name:{}", candidate.name.to_lowercase()),
            };
            if !seen.insert((identity_key, tag)) {
                continue;
            }
            writes.push(ContributorWrite {
                artist_id: resolved.as_ref().map(|a| a.id),
                contributor_name: match resolved {
                    Some(_) => None,
                    None => Some(candidate.name.clone()),
                },
                role: candidate.meta_tag_identifier.role(),
                sub_role: None,
                meta_tag_identifier: candidate.meta_tag_identifier,
            });
        }
        Ok(writes)
    }
}
