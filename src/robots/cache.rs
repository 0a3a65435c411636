//! Robots.txt cache entries
//!
//! Each entry stores parsed robots.txt content along with the wall-clock
//! time it was fetched, so entries can expire after 24 hours.

use crate::robots::ParsedRobots;
use std::time::{Duration, SystemTime};

const MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Cached robots.txt data for one host.
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed robots.txt content
    pub content: ParsedRobots,

    /// When the robots.txt was fetched
    pub fetched_at: SystemTime,
}

impl CachedRobots {
    /// Creates a cache entry stamped with the current time.
    pub fn new(content: ParsedRobots) -> Self {
        Self {
            content,
            fetched_at: SystemTime::now(),
        }
    }

    /// Checks if the entry is older than 24 hours.
    ///
    /// A clock that moved backwards makes the entry look stale, which just
    /// forces a refetch.
    pub fn is_stale(&self) -> bool {
        self.fetched_at.elapsed().map_or(true, |age| age > MAX_AGE)
    }

    /// Checks if a URL is allowed according to the cached robots.txt.
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        self.content.is_allowed(url, user_agent)
    }
}
