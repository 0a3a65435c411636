//! Crawl worker run loop
//!
//! Each worker leases a batch from the frontier, processes every record
//! through the page state machine, and acknowledges each one exactly once.
//! All per-URL failures are routed to handler hooks; nothing a single URL
//! does can take the worker down.

use super::engine::EngineInner;
use super::fetcher::REDIRECT_CODES;
use crate::crawler::{parse_content, CrawlHandler, FetchError, Page};
use crate::url::{WebUrl, DEPTH_ALREADY_SEEN};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Records leased per dequeue.
const BATCH_SIZE: usize = 50;

/// Backoff after an empty batch while the session is still live.
const EMPTY_QUEUE_BACKOFF: Duration = Duration::from_secs(3);

pub(crate) struct CrawlWorker {
    id: usize,
    handler: Box<dyn CrawlHandler>,
    engine: Arc<EngineInner>,
    idle: Arc<AtomicBool>,
}

impl CrawlWorker {
    pub(crate) fn new(
        id: usize,
        handler: Box<dyn CrawlHandler>,
        engine: Arc<EngineInner>,
        idle: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            handler,
            engine,
            idle,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("worker {} started", self.id);
        self.handler.on_start();

        'outer: loop {
            self.idle.store(true, Ordering::SeqCst);
            let batch = self.engine.frontier.next_batch(BATCH_SIZE).await;
            self.idle.store(false, Ordering::SeqCst);

            if batch.is_empty() {
                if self.engine.frontier.is_finished() {
                    break;
                }
                tokio::time::sleep(EMPTY_QUEUE_BACKOFF).await;
                continue;
            }

            for record in batch {
                if self.engine.shutting_down.load(Ordering::SeqCst) {
                    info!("worker {} exiting: shutdown requested", self.id);
                    break 'outer;
                }
                let record = self.handler.handle_url_before_process(record);
                self.process(&record).await;
                self.engine.frontier.set_processed(&record);
            }
        }

        self.handler.on_before_exit();
        if let Some(data) = self.handler.local_data() {
            self.engine.local_results.lock().unwrap().push(data);
        }
        debug!("worker {} exited", self.id);
    }

    async fn process(&mut self, record: &WebUrl) {
        if let Err(error) = self.try_process(record).await {
            self.handler.on_unhandled_error(record, &error);
        }
    }

    async fn try_process(&mut self, record: &WebUrl) -> crate::Result<()> {
        let fetched = match self.engine.fetcher.fetch(record.url()).await {
            Ok(fetched) => fetched,
            Err(FetchError::TooLarge(size)) => {
                self.handler.on_page_too_large(record, size);
                return Ok(());
            }
            Err(error) => {
                self.handler.on_fetch_error(record, &error);
                return Ok(());
            }
        };

        self.handler.handle_status_code(record, fetched.status);

        let mut page = Page::new(record.clone());
        page.status = fetched.status;
        page.content_type = fetched.content_type.clone();
        page.redirect_target = fetched.redirect_target.clone();

        if !(200..300).contains(&fetched.status) {
            if REDIRECT_CODES.contains(&fetched.status)
                && self.engine.config.crawl.follow_redirects
            {
                self.follow_redirect(&page, record).await?;
            } else {
                self.handler.on_unexpected_status(
                    record,
                    fetched.status,
                    fetched.content_type.as_deref(),
                );
            }
            return Ok(());
        }

        // The client may have normalized the URL it actually requested.
        // Rebind the record to the final URL so discovery of that URL
        // elsewhere dedupes against it.
        let mut current = record.clone();
        if current.url() != fetched.final_url {
            if self.engine.registry.lookup(&fetched.final_url).is_some() {
                debug!(
                    "{} resolved to {}, which is already seen",
                    record, fetched.final_url
                );
                return Ok(());
            }
            current.set_url(&fetched.final_url, &self.engine.tld);
            current.doc_id = Some(self.engine.registry.assign_new_id(&fetched.final_url)?);
        }

        page.record = current.clone();
        page.content = fetched.body;

        let base = Url::parse(current.url())?;
        match parse_content(
            &page.content,
            page.content_type.as_deref(),
            &base,
            self.engine.config.crawl.max_outgoing_links,
            self.engine.config.crawl.include_binary_content,
        ) {
            Ok(parse_data) => {
                page.parse_data = Some(parse_data);
                self.schedule_outgoing(&page).await?;
                self.handler.visit(&page);
            }
            Err(error) => self.handler.on_parse_error(&current, &error),
        }
        Ok(())
    }

    /// Admits a redirect target at the same depth and with the same parent
    /// as the record that redirected.
    async fn follow_redirect(&mut self, page: &Page, record: &WebUrl) -> crate::Result<()> {
        let target = match &page.redirect_target {
            Some(target) => target.clone(),
            None => {
                warn!("{record} redirected to nothing");
                return Ok(());
            }
        };

        if self.engine.registry.lookup(&target).is_some() {
            debug!("redirect target {target} is already seen");
            return Ok(());
        }

        let mut redirected = WebUrl::new(&target, &self.engine.tld);
        redirected.parent_doc_id = record.parent_doc_id;
        redirected.parent_url = record.parent_url.clone();
        redirected.depth = record.depth;
        redirected.anchor = record.anchor.clone();

        if !self.handler.should_visit(page, &redirected) {
            debug!("not visiting {target} as per the should-visit policy");
            return Ok(());
        }
        if !self.engine.robots.allows(&redirected).await {
            debug!("not visiting {target} as per the server's robots.txt policy");
            return Ok(());
        }
        redirected.doc_id = Some(self.engine.registry.assign_new_id(&target)?);
        self.engine.frontier.schedule(redirected);
        Ok(())
    }

    /// Runs every extracted link through dedup, depth gating, the
    /// should-visit predicate, and robots, then admits the survivors in one
    /// batch.
    async fn schedule_outgoing(&mut self, page: &Page) -> crate::Result<()> {
        let current = &page.record;
        let links = match &page.parse_data {
            Some(parse_data) => &parse_data.links,
            None => return Ok(()),
        };

        let mut to_schedule = Vec::new();
        for link in links {
            let mut candidate = WebUrl::new(&link.url, &self.engine.tld);
            candidate.parent_doc_id = current.doc_id;
            candidate.parent_url = Some(current.url().to_string());
            candidate.anchor = link.anchor.clone();
            candidate.tag = Some(link.tag.clone());

            if let Some(known) = self.engine.registry.lookup(&link.url) {
                candidate.doc_id = Some(known);
                candidate.depth = DEPTH_ALREADY_SEEN;
            }
            if candidate.is_already_seen() {
                continue;
            }

            candidate.depth = current.depth + 1;
            let within_depth = self
                .engine
                .config
                .crawl
                .max_depth
                .map_or(true, |max| current.depth < max);
            if !within_depth {
                continue;
            }

            if !self.handler.should_visit(page, &candidate) {
                debug!("not visiting {} as per the should-visit policy", link.url);
                continue;
            }
            if !self.engine.robots.allows(&candidate).await {
                debug!(
                    "not visiting {} as per the server's robots.txt policy",
                    link.url
                );
                continue;
            }

            candidate.doc_id = Some(self.engine.registry.assign_new_id(&link.url)?);
            to_schedule.push(candidate);
        }

        self.engine.frontier.schedule_all(to_schedule);
        Ok(())
    }
}
