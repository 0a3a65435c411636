//! URL handling module for Orbweaver
//!
//! This module provides the `WebUrl` work record, canonicalization, and the
//! top-level-domain suffix list used to derive registrable domains.

mod canonical;
mod tld;

pub use canonical::canonicalize;
pub use tld::TldList;

use crate::storage::DocId;
use std::fmt;
use std::hash::{Hash, Hasher};
use url::Url;

/// Depth value marking a URL that was already known when it was rediscovered.
///
/// Links that resolve to a previously registered document id keep their
/// existing id and are never re-admitted to the frontier; this sentinel on
/// the extracted record signals "not a first sighting" to handler code.
pub const DEPTH_ALREADY_SEEN: i16 = -1;

/// Default dequeue priority (mid-range; smaller values dequeue first).
pub const DEFAULT_PRIORITY: u8 = 128;

/// A single unit of crawl work: one URL plus its discovery metadata.
///
/// The URL string and its derived projections (registrable domain, subdomain,
/// path) are kept consistent by routing every assignment through
/// [`WebUrl::set_url`]. The projections are recomputed there against the
/// suffix list; for a string that does not parse as a URL they are empty.
#[derive(Debug, Clone)]
pub struct WebUrl {
    url: String,
    domain: String,
    sub_domain: String,
    path: String,

    /// Registry-assigned id; `None` until the record is bound for admission.
    pub doc_id: Option<DocId>,
    /// Id of the page this URL was extracted from, `None` for seeds.
    pub parent_doc_id: Option<DocId>,
    /// URL of the page this URL was extracted from, `None` for seeds.
    pub parent_url: Option<String>,
    /// 0 for seeds, parent depth + 1 for extracted links,
    /// [`DEPTH_ALREADY_SEEN`] for rediscoveries.
    pub depth: i16,
    /// Dequeue priority, smaller is more urgent.
    pub priority: u8,
    /// Anchor text of the link that discovered this URL.
    pub anchor: Option<String>,
    /// Markup tag the link was extracted from (for example "a" or "img").
    pub tag: Option<String>,
}

impl WebUrl {
    /// Creates a seed-shaped record: depth 0, default priority, no parent.
    pub fn new(url: impl Into<String>, tld: &TldList) -> Self {
        let mut record = Self {
            url: String::new(),
            domain: String::new(),
            sub_domain: String::new(),
            path: String::new(),
            doc_id: None,
            parent_doc_id: None,
            parent_url: None,
            depth: 0,
            priority: DEFAULT_PRIORITY,
            anchor: None,
            tag: None,
        };
        record.set_url(url, tld);
        record
    }

    /// Sets the URL string and recomputes domain, subdomain, and path.
    pub fn set_url(&mut self, url: impl Into<String>, tld: &TldList) {
        self.url = url.into();
        match Url::parse(&self.url) {
            Ok(parsed) => {
                let host = parsed.host_str().unwrap_or("").to_lowercase();
                let (domain, sub_domain) = split_host(&host, tld);
                self.domain = domain;
                self.sub_domain = sub_domain;
                self.path = parsed.path().to_string();
            }
            Err(_) => {
                self.domain = String::new();
                self.sub_domain = String::new();
                self.path = String::new();
            }
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Registrable domain, e.g. "example.co.uk" for "a.b.example.co.uk".
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Host labels left of the registrable domain, empty if none.
    pub fn sub_domain(&self) -> &str {
        &self.sub_domain
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// True once the rediscovery sentinel has been stamped on this record.
    pub fn is_already_seen(&self) -> bool {
        self.depth < 0
    }
}

impl fmt::Display for WebUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl PartialEq for WebUrl {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for WebUrl {}

impl Hash for WebUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

/// Splits a lowercased host into (registrable domain, subdomain).
///
/// Hosts of one or two labels are their own registrable domain. For longer
/// hosts the last two labels form the domain, extended to three when the
/// two-label tail is a known multi-part suffix such as "co.uk".
fn split_host(host: &str, tld: &TldList) -> (String, String) {
    let parts: Vec<&str> = host.split('.').collect();
    if host.is_empty() || parts.len() <= 2 {
        return (host.to_string(), String::new());
    }

    let last_two = format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1]);
    let keep = if tld.contains(&last_two) { 3 } else { 2 };
    let domain = parts[parts.len() - keep..].join(".");
    let sub_domain = parts[..parts.len() - keep].join(".");
    (domain, sub_domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_defaults() {
        let tld = TldList::builtin();
        let record = WebUrl::new("https://example.com/start", &tld);

        assert_eq!(record.url(), "https://example.com/start");
        assert_eq!(record.depth, 0);
        assert_eq!(record.priority, DEFAULT_PRIORITY);
        assert!(record.doc_id.is_none());
        assert!(record.parent_doc_id.is_none());
        assert!(record.parent_url.is_none());
    }

    #[test]
    fn test_simple_domain_projection() {
        let tld = TldList::builtin();
        let record = WebUrl::new("https://example.com/a/b?q=1", &tld);

        assert_eq!(record.domain(), "example.com");
        assert_eq!(record.sub_domain(), "");
        assert_eq!(record.path(), "/a/b");
    }

    #[test]
    fn test_subdomain_projection() {
        let tld = TldList::builtin();
        let record = WebUrl::new("https://blog.news.example.com/post", &tld);

        assert_eq!(record.domain(), "example.com");
        assert_eq!(record.sub_domain(), "blog.news");
    }

    #[test]
    fn test_multi_part_suffix() {
        let tld = TldList::builtin();
        let record = WebUrl::new("https://shop.example.co.uk/", &tld);

        assert_eq!(record.domain(), "example.co.uk");
        assert_eq!(record.sub_domain(), "shop");
    }

    #[test]
    fn test_host_is_lowercased() {
        let tld = TldList::builtin();
        let record = WebUrl::new("https://WWW.Example.COM/x", &tld);

        assert_eq!(record.domain(), "example.com");
        assert_eq!(record.sub_domain(), "www");
    }

    #[test]
    fn test_set_url_recomputes_projections() {
        let tld = TldList::builtin();
        let mut record = WebUrl::new("https://example.com/a", &tld);
        record.set_url("https://docs.other.org/b", &tld);

        assert_eq!(record.url(), "https://docs.other.org/b");
        assert_eq!(record.domain(), "other.org");
        assert_eq!(record.sub_domain(), "docs");
        assert_eq!(record.path(), "/b");
    }

    #[test]
    fn test_unparsable_url_clears_projections() {
        let tld = TldList::builtin();
        let record = WebUrl::new("not a url", &tld);

        assert_eq!(record.domain(), "");
        assert_eq!(record.sub_domain(), "");
        assert_eq!(record.path(), "");
    }

    #[test]
    fn test_equality_is_by_url_only() {
        let tld = TldList::builtin();
        let a = WebUrl::new("https://example.com/x", &tld);
        let mut b = WebUrl::new("https://example.com/x", &tld);
        b.depth = 7;
        b.doc_id = Some(42);

        assert_eq!(a, b);
    }

    #[test]
    fn test_already_seen_sentinel() {
        let tld = TldList::builtin();
        let mut record = WebUrl::new("https://example.com/x", &tld);
        assert!(!record.is_already_seen());

        record.depth = DEPTH_ALREADY_SEEN;
        assert!(record.is_already_seen());
    }
}
