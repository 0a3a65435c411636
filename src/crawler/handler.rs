//! Crawl behavior hooks
//!
//! A [`CrawlHandler`] bundles every per-page decision and notification the
//! engine exposes: whether to visit a candidate URL, what to do with a
//! visited page, and how to report the various per-URL failures. Workers own
//! their handler exclusively, so implementations can keep mutable state
//! without locking; a [`HandlerFactory`] builds one handler per worker slot,
//! including respawns.

use crate::crawler::{FetchError, Page, PageParseError};
use crate::url::WebUrl;
use crate::CrawlError;
use std::sync::Arc;
use tracing::{info, warn};

/// Builds the handler for a worker slot. Called once per spawn, so a
/// respawned worker gets a fresh handler.
pub type HandlerFactory = Arc<dyn Fn(usize) -> Box<dyn CrawlHandler> + Send + Sync>;

/// Per-worker crawl strategy.
///
/// All methods have defaults, so implementations override only what they
/// care about. Failure hooks are notifications: the worker has already
/// dropped the URL by the time they run, and acknowledges it afterwards
/// either way.
pub trait CrawlHandler: Send {
    /// Called once when the worker starts, before the first dequeue.
    fn on_start(&mut self) {}

    /// Called once when the worker exits its run loop.
    fn on_before_exit(&mut self) {}

    /// Called with the HTTP status of every completed fetch.
    fn handle_status_code(&mut self, record: &WebUrl, status: u16) {
        let _ = (record, status);
    }

    /// Last chance to rewrite a record before it is processed.
    fn handle_url_before_process(&mut self, record: WebUrl) -> WebUrl {
        record
    }

    /// Admission predicate for discovered URLs. `page` is the referrer the
    /// candidate was extracted from. Default: accept everything.
    fn should_visit(&mut self, page: &Page, candidate: &WebUrl) -> bool {
        let _ = (page, candidate);
        true
    }

    /// Called with every successfully fetched and parsed page.
    fn visit(&mut self, page: &Page) {
        let _ = page;
    }

    fn on_page_too_large(&mut self, record: &WebUrl, size: u64) {
        warn!("skipping {record}: content size {size} exceeds the configured maximum");
    }

    fn on_unexpected_status(&mut self, record: &WebUrl, status: u16, content_type: Option<&str>) {
        warn!(
            "skipping {record}: status {status}, content type {}",
            content_type.unwrap_or("unknown")
        );
    }

    fn on_fetch_error(&mut self, record: &WebUrl, error: &FetchError) {
        warn!("could not fetch {record}: {error}");
    }

    fn on_parse_error(&mut self, record: &WebUrl, error: &PageParseError) {
        warn!("could not parse {record}: {error}");
    }

    /// Catch-all for errors that escaped the typed per-URL conditions.
    fn on_unhandled_error(&mut self, record: &WebUrl, error: &CrawlError) {
        warn!("unhandled error while processing {record}: {error}");
    }

    /// Result deposited with the engine when the worker exits.
    fn local_data(&mut self) -> Option<serde_json::Value> {
        None
    }
}

/// Default handler: logs visited pages and counts them.
pub struct LogHandler {
    worker_id: usize,
    visited: u64,
}

impl LogHandler {
    pub fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            visited: 0,
        }
    }

    /// Factory producing a [`LogHandler`] per worker.
    pub fn factory() -> HandlerFactory {
        Arc::new(|worker_id| Box::new(LogHandler::new(worker_id)))
    }
}

impl CrawlHandler for LogHandler {
    fn visit(&mut self, page: &Page) {
        self.visited += 1;
        let links = page
            .parse_data
            .as_ref()
            .map(|data| data.links.len())
            .unwrap_or(0);
        info!(
            "visited {} (depth {}, {} outgoing links)",
            page.record,
            page.record.depth,
            links
        );
    }

    fn local_data(&mut self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "worker": self.worker_id,
            "visited": self.visited,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::TldList;

    struct Defaults;
    impl CrawlHandler for Defaults {}

    #[test]
    fn test_default_should_visit_accepts() {
        let mut handler = Defaults;
        let tld = TldList::builtin();
        let record = WebUrl::new("https://example.com/", &tld);
        let page = Page::new(record.clone());
        assert!(handler.should_visit(&page, &record));
    }

    #[test]
    fn test_default_before_process_is_identity() {
        let mut handler = Defaults;
        let tld = TldList::builtin();
        let record = WebUrl::new("https://example.com/a", &tld);
        let out = handler.handle_url_before_process(record.clone());
        assert_eq!(out, record);
    }

    #[test]
    fn test_log_handler_counts_visits() {
        let mut handler = LogHandler::new(3);
        let tld = TldList::builtin();
        let page = Page::new(WebUrl::new("https://example.com/", &tld));
        handler.visit(&page);
        handler.visit(&page);

        let data = handler.local_data().unwrap();
        assert_eq!(data["worker"], 3);
        assert_eq!(data["visited"], 2);
    }
}
