//! Crawl engine: session lifecycle, worker pool, and monitor
//!
//! The engine owns every shared component of a crawl session. `start` spawns
//! the worker tasks and a monitor task; the monitor respawns dead workers,
//! watches for the idle-and-empty condition, and runs the termination
//! sequence that moves the engine to `Finished`.

use super::worker::CrawlWorker;
use crate::config::Config;
use crate::crawler::{HandlerFactory, PageFetcher};
use crate::frontier::Frontier;
use crate::robots::RobotsGate;
use crate::storage::{DocId, DocIdRegistry, StorageEnv};
use crate::url::{canonicalize, TldList, WebUrl};
use crate::CrawlError;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle of a crawl session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Initializing = 0,
    Running = 1,
    Draining = 2,
    Finished = 3,
}

impl EngineState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => EngineState::Initializing,
            1 => EngineState::Running,
            2 => EngineState::Draining,
            _ => EngineState::Finished,
        }
    }
}

/// Counter snapshot of a session.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlStats {
    pub scheduled: u64,
    pub processed: u64,
    pub queue_length: u64,
    pub in_flight: u64,
}

struct WorkerSlot {
    handle: JoinHandle<()>,
    idle: Arc<AtomicBool>,
}

pub(crate) struct EngineInner {
    pub(crate) config: Config,
    pub(crate) tld: Arc<TldList>,
    pub(crate) frontier: Frontier,
    pub(crate) registry: DocIdRegistry,
    pub(crate) fetcher: PageFetcher,
    pub(crate) robots: RobotsGate,
    pub(crate) shutting_down: AtomicBool,
    pub(crate) local_results: Mutex<Vec<serde_json::Value>>,
    state: AtomicU8,
    workers: Mutex<Vec<WorkerSlot>>,
    finished_tx: watch::Sender<bool>,
}

impl EngineInner {
    fn set_state(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn state(&self) -> EngineState {
        EngineState::from_raw(self.state.load(Ordering::SeqCst))
    }

    fn anyone_working(&self) -> bool {
        let workers = self.workers.lock().unwrap();
        workers
            .iter()
            .any(|slot| !slot.handle.is_finished() && !slot.idle.load(Ordering::SeqCst))
    }
}

/// A crawl session.
///
/// All operations take `&self`; the engine can be shared freely between the
/// seeding code and whatever supervises the crawl.
pub struct CrawlEngine {
    inner: Arc<EngineInner>,
}

impl CrawlEngine {
    /// Opens the storage environment and builds every shared component.
    ///
    /// With resumability off, the environment directory is wiped first. With
    /// it on, counters and the registry watermark are recovered and any
    /// leased-but-unacknowledged work is rescheduled.
    pub fn new(config: Config) -> crate::Result<Self> {
        let tld = match &config.tld_file {
            Some(path) => Arc::new(TldList::from_file(path)?),
            None => Arc::new(TldList::builtin()),
        };

        let env = StorageEnv::open(&config.storage.root, config.storage.resumable)?;
        let registry = DocIdRegistry::open(&env)?;
        let frontier = Frontier::new(&env, tld.clone(), config.crawl.max_pages)?;

        let fetcher = PageFetcher::new(
            &config.http,
            Duration::from_millis(config.crawl.politeness_delay_ms),
        )?;
        let robots = RobotsGate::new(
            config.crawl.respect_robots,
            &config.http.user_agent,
            fetcher.client(),
        );

        info!(
            "engine initialized at {} (resumable: {}, {} urls pending)",
            config.storage.root.display(),
            config.storage.resumable,
            frontier.queue_length()
        );

        let (finished_tx, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                tld,
                frontier,
                registry,
                fetcher,
                robots,
                shutting_down: AtomicBool::new(false),
                local_results: Mutex::new(Vec::new()),
                state: AtomicU8::new(EngineState::Initializing as u8),
                workers: Mutex::new(Vec::new()),
                finished_tx,
            }),
        })
    }

    /// Schedules a seed URL at depth 0.
    ///
    /// Already-known seeds are skipped. A seed its server's robots.txt
    /// forbids keeps its document id but is not scheduled.
    pub async fn add_seed(&self, url: &str) -> crate::Result<()> {
        let canonical =
            canonicalize(url, None).ok_or_else(|| CrawlError::SeedRejected(url.to_string()))?;

        if self.inner.registry.lookup(&canonical).is_some() {
            debug!("seed {canonical} is already seen, skipping");
            return Ok(());
        }

        let mut record = WebUrl::new(&canonical, &self.inner.tld);
        record.doc_id = Some(self.inner.registry.assign_new_id(&canonical)?);
        if self.inner.robots.allows(&record).await {
            self.inner.frontier.schedule(record);
        } else {
            warn!("robots.txt does not allow seed {canonical}");
        }
        Ok(())
    }

    /// Schedules a seed under a caller-chosen document id.
    ///
    /// Ids must arrive in strictly increasing order across calls; reusing a
    /// URL with a different id is an error.
    pub async fn add_seed_with_id(&self, url: &str, doc_id: DocId) -> crate::Result<()> {
        let canonical =
            canonicalize(url, None).ok_or_else(|| CrawlError::SeedRejected(url.to_string()))?;
        self.inner.registry.register_existing(&canonical, doc_id)?;

        let mut record = WebUrl::new(&canonical, &self.inner.tld);
        record.doc_id = Some(doc_id);
        if self.inner.robots.allows(&record).await {
            self.inner.frontier.schedule(record);
        } else {
            warn!("robots.txt does not allow seed {canonical}");
        }
        Ok(())
    }

    /// Registers a URL as already crawled without scheduling it, so link
    /// discovery treats it as seen. Same id rules as [`add_seed_with_id`].
    ///
    /// [`add_seed_with_id`]: CrawlEngine::add_seed_with_id
    pub fn add_seen_url(&self, url: &str, doc_id: DocId) -> crate::Result<()> {
        let canonical =
            canonicalize(url, None).ok_or_else(|| CrawlError::SeedRejected(url.to_string()))?;
        self.inner.registry.register_existing(&canonical, doc_id)?;
        Ok(())
    }

    /// Spawns `worker_count` workers and the monitor, then returns.
    pub fn start(&self, factory: HandlerFactory, worker_count: usize) {
        info!("starting {worker_count} crawl workers");
        self.inner.set_state(EngineState::Running);
        {
            let mut workers = self.inner.workers.lock().unwrap();
            for id in 0..worker_count {
                workers.push(spawn_worker(self.inner.clone(), &factory, id));
            }
        }
        let inner = self.inner.clone();
        tokio::spawn(monitor_loop(inner, factory));
    }

    /// Starts the session and blocks until it finishes.
    pub async fn run(&self, factory: HandlerFactory, worker_count: usize) {
        self.start(factory, worker_count);
        self.wait_until_finished().await;
    }

    /// Blocks until the monitor declares the session finished. Safe to call
    /// before `start` and after the session already finished.
    pub async fn wait_until_finished(&self) {
        let mut finished = self.inner.finished_tx.subscribe();
        let _ = finished.wait_for(|done| *done).await;
    }

    /// Requests cooperative shutdown: workers stop between records, the
    /// fetcher rejects new requests, and blocked dequeues are released.
    pub fn shutdown(&self) {
        info!("shutdown requested");
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        self.inner.fetcher.shutdown();
        self.inner.frontier.finish();
    }

    pub fn state(&self) -> EngineState {
        self.inner.state()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> CrawlStats {
        CrawlStats {
            scheduled: self.inner.frontier.scheduled_count(),
            processed: self.inner.frontier.processed_count(),
            queue_length: self.inner.frontier.queue_length(),
            in_flight: self.inner.frontier.in_flight_count(),
        }
    }

    /// Results deposited by worker handlers as they exited.
    pub fn local_results(&self) -> Vec<serde_json::Value> {
        self.inner.local_results.lock().unwrap().clone()
    }
}

fn spawn_worker(inner: Arc<EngineInner>, factory: &HandlerFactory, id: usize) -> WorkerSlot {
    let idle = Arc::new(AtomicBool::new(false));
    let handler = factory(id);
    let worker = CrawlWorker::new(id, handler, inner, idle.clone());
    WorkerSlot {
        handle: tokio::spawn(worker.run()),
        idle,
    }
}

/// Watches worker liveness and decides when the session is over.
///
/// A worker counts as working when its task is alive and its idle flag is
/// down. Termination takes repeated confirmation: an idle pool is re-sampled
/// after a grace wait, and an empty queue is re-checked after another, since
/// a worker may be a moment away from admitting new work.
async fn monitor_loop(inner: Arc<EngineInner>, factory: HandlerFactory) {
    let interval = Duration::from_millis(inner.config.engine.monitor_interval_ms);

    loop {
        tokio::time::sleep(interval).await;

        let mut anyone_working = false;
        {
            let mut workers = inner.workers.lock().unwrap();
            for (id, slot) in workers.iter_mut().enumerate() {
                if slot.handle.is_finished() {
                    if !inner.shutting_down.load(Ordering::SeqCst) {
                        warn!("worker {id} died, respawning it");
                        *slot = spawn_worker(inner.clone(), &factory, id);
                    }
                } else if !slot.idle.load(Ordering::SeqCst) {
                    anyone_working = true;
                }
            }
        }

        if anyone_working || !inner.config.crawl.shutdown_on_empty_queue {
            continue;
        }

        inner.set_state(EngineState::Draining);
        info!("no worker appears to be busy, waiting to make sure");
        tokio::time::sleep(interval).await;
        if inner.anyone_working() {
            inner.set_state(EngineState::Running);
            continue;
        }

        if !inner.shutting_down.load(Ordering::SeqCst) {
            if inner.frontier.queue_length() > 0 {
                inner.set_state(EngineState::Running);
                continue;
            }
            info!("no worker is busy and the queue is empty, waiting to make sure");
            tokio::time::sleep(interval).await;
            if inner.frontier.queue_length() > 0 {
                inner.set_state(EngineState::Running);
                continue;
            }
        }

        info!("all workers are done, finishing the session");
        inner.frontier.finish();

        // Final grace: released workers run their exit hooks and deposit
        // local results before the session closes.
        tokio::time::sleep(interval).await;
        let slots: Vec<WorkerSlot> = {
            let mut workers = inner.workers.lock().unwrap();
            workers.drain(..).collect()
        };
        for slot in slots {
            let _ = slot.handle.await;
        }

        inner.fetcher.shutdown();
        inner.set_state(EngineState::Finished);
        let _ = inner.finished_tx.send(true);
        info!(
            "crawl finished: {} scheduled, {} processed",
            inner.frontier.scheduled_count(),
            inner.frontier.processed_count()
        );
        return;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine(root: &TempDir) -> CrawlEngine {
        let mut config = Config::default();
        config.storage.root = root.path().to_path_buf();
        config.crawl.respect_robots = false;
        CrawlEngine::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_seeds_get_sequential_ids() {
        let root = TempDir::new().unwrap();
        let engine = engine(&root);

        engine.add_seed("https://a.test/").await.unwrap();
        engine.add_seed("https://b.test/").await.unwrap();

        let stats = engine.stats();
        assert_eq!(stats.scheduled, 2);
        assert_eq!(stats.queue_length, 2);
        assert_eq!(engine.inner.registry.last_id(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_seed_is_skipped() {
        let root = TempDir::new().unwrap();
        let engine = engine(&root);

        engine.add_seed("https://a.test/").await.unwrap();
        engine.add_seed("https://a.test/").await.unwrap();
        engine.add_seed("https://a.test/#fragment").await.unwrap();

        assert_eq!(engine.stats().scheduled, 1);
    }

    #[tokio::test]
    async fn test_unparseable_seed_rejected() {
        let root = TempDir::new().unwrap();
        let engine = engine(&root);

        let result = engine.add_seed("not a url").await;
        assert!(matches!(result, Err(CrawlError::SeedRejected(_))));
    }

    #[tokio::test]
    async fn test_seed_with_explicit_id_must_increase() {
        let root = TempDir::new().unwrap();
        let engine = engine(&root);

        engine.add_seed_with_id("https://a.test/", 5).await.unwrap();
        let result = engine.add_seed_with_id("https://b.test/", 3).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_add_seen_url_registers_without_scheduling() {
        let root = TempDir::new().unwrap();
        let engine = engine(&root);

        engine.add_seen_url("https://a.test/skip", 1).unwrap();
        assert_eq!(engine.stats().queue_length, 0);
        assert_eq!(
            engine.inner.registry.lookup("https://a.test/skip"),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_initial_state() {
        let root = TempDir::new().unwrap();
        let engine = engine(&root);
        assert_eq!(engine.state(), EngineState::Initializing);
        assert!(!engine.is_shutting_down());
    }
}
