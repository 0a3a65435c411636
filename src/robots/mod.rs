//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching
//! robots.txt files. The [`RobotsGate`] is the front door: workers ask it
//! whether a URL may be crawled, and it fetches and caches the relevant
//! robots.txt per host on demand.

mod cache;
mod parser;

pub use cache::CachedRobots;
pub use parser::ParsedRobots;

use crate::url::WebUrl;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use url::Url;

/// Hosts cached before the oldest entry is evicted.
const MAX_CACHED_HOSTS: usize = 512;

/// Per-host robots.txt gatekeeper.
///
/// When disabled, every URL passes. When enabled, the gate keeps one cache
/// entry per origin (`scheme://host:port`), refetches entries older than 24
/// hours, and treats an unreachable robots.txt as allow-all.
pub struct RobotsGate {
    enabled: bool,
    user_agent: String,
    client: reqwest::Client,
    cache: Mutex<HashMap<String, CachedRobots>>,
}

impl RobotsGate {
    pub fn new(enabled: bool, user_agent: &str, client: reqwest::Client) -> Self {
        Self {
            enabled,
            user_agent: user_agent.to_string(),
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Checks whether `record` may be crawled.
    ///
    /// URLs without a parseable host always pass; the admission pipeline
    /// rejects those on its own terms.
    pub async fn allows(&self, record: &WebUrl) -> bool {
        if !self.enabled {
            return true;
        }
        let parsed = match Url::parse(record.url()) {
            Ok(parsed) => parsed,
            Err(_) => return true,
        };
        let host = match parsed.host_str() {
            Some(host) => host.to_lowercase(),
            None => return true,
        };
        let origin = match parsed.port() {
            Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
            None => format!("{}://{host}", parsed.scheme()),
        };

        {
            let cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.get(&origin) {
                if !entry.is_stale() {
                    return entry.is_allowed(record.url(), &self.user_agent);
                }
            }
        }

        let entry = CachedRobots::new(self.fetch_directives(&origin).await);
        let allowed = entry.is_allowed(record.url(), &self.user_agent);

        let mut cache = self.cache.lock().unwrap();
        if cache.len() >= MAX_CACHED_HOSTS && !cache.contains_key(&origin) {
            evict_oldest(&mut cache);
        }
        cache.insert(origin, entry);
        allowed
    }

    async fn fetch_directives(&self, origin: &str) -> ParsedRobots {
        let robots_url = format!("{origin}/robots.txt");
        match self.client.get(&robots_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => ParsedRobots::from_content(&body),
                Err(e) => {
                    debug!("failed to read {robots_url}: {e}");
                    ParsedRobots::allow_all()
                }
            },
            Ok(response) => {
                debug!("{robots_url} returned {}", response.status());
                ParsedRobots::allow_all()
            }
            Err(e) => {
                debug!("failed to fetch {robots_url}: {e}");
                ParsedRobots::allow_all()
            }
        }
    }

    pub fn cached_hosts(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

fn evict_oldest(cache: &mut HashMap<String, CachedRobots>) {
    let oldest = cache
        .iter()
        .min_by_key(|(_, entry)| entry.fetched_at)
        .map(|(origin, _)| origin.clone());
    if let Some(origin) = oldest {
        cache.remove(&origin);
    }
}
