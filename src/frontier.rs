//! Crawl frontier: admission, dequeue, and completion bookkeeping
//!
//! The frontier composes the pending queue, the in-flight ledger, and the
//! counters. Admission (`schedule`/`schedule_all`) and leasing
//! (`next_batch`) share one mutex, so the composite-key order is strict
//! within a single lease and the global admission cap is checked atomically.
//! Acknowledgement (`set_processed`) deliberately bypasses that mutex; it
//! touches only the ledger and the processed counter, which carry their own
//! locks.
//!
//! Dequeue blocks while the queue is empty and the session is not finished.
//! The wait arms a [`Notify`] listener before re-checking its condition
//! under the lock, so a notification between the check and the await is
//! never lost, and a spurious wakeup just runs the loop again.

use crate::storage::{
    Counters, DocId, InFlightLedger, StorageEnv, StoreResult, UrlQueueStore,
};
use crate::url::{TldList, WebUrl};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// How many ledger entries to re-admit per step during crash recovery.
const RECOVERY_BATCH: usize = 100;

/// Table holding records admitted but not yet leased.
pub const PENDING_TABLE: &str = "pending";

/// Scheduler for pending crawl work.
pub struct Frontier {
    queue: UrlQueueStore,
    ledger: InFlightLedger,
    counters: Counters,
    sched: Mutex<SchedState>,
    wakeup: Notify,
    finished: AtomicBool,
    max_pages: Option<u64>,
}

struct SchedState {
    /// Mirror of the scheduled counter, kept under the admission mutex so
    /// cap checks never race.
    scheduled: u64,
}

impl Frontier {
    /// Opens the frontier against a storage environment.
    ///
    /// In resumable mode this also runs crash recovery: whatever the
    /// in-flight ledger still holds was leased but never acknowledged by the
    /// previous session, so it is deducted from the scheduled count and
    /// pushed back through the normal admission path before the ledger is
    /// cleared.
    pub fn new(env: &StorageEnv, tld: Arc<TldList>, max_pages: Option<u64>) -> StoreResult<Self> {
        let counters = Counters::open(env)?;
        let queue = UrlQueueStore::open(env, PENDING_TABLE, env.resumable(), tld.clone())?;
        let ledger = InFlightLedger::open(env, tld)?;
        let scheduled = counters.get(Counters::SCHEDULED_PAGES).max(0) as u64;

        let frontier = Self {
            queue,
            ledger,
            counters,
            sched: Mutex::new(SchedState { scheduled }),
            wakeup: Notify::new(),
            finished: AtomicBool::new(false),
            max_pages,
        };

        if env.resumable() {
            frontier.recover()?;
        }
        Ok(frontier)
    }

    fn recover(&self) -> StoreResult<()> {
        let leased = self.ledger.len()?;
        if leased == 0 {
            return Ok(());
        }

        warn!("{leased} urls were in flight when the previous session ended, rescheduling them");
        {
            let mut sched = self.sched.lock().unwrap();
            sched.scheduled = sched.scheduled.saturating_sub(leased);
            self.counters
                .set(Counters::SCHEDULED_PAGES, sched.scheduled as i64)?;
        }

        loop {
            let batch = self.ledger.get(RECOVERY_BATCH)?;
            if batch.is_empty() {
                break;
            }
            let count = batch.len();
            self.schedule_all(batch);
            self.ledger.delete(count)?;
        }
        Ok(())
    }

    /// Admits a single record unless the global cap has been reached.
    ///
    /// Store failures are logged and the record is dropped; admission is
    /// best-effort by design.
    pub fn schedule(&self, record: WebUrl) {
        {
            let mut sched = self.sched.lock().unwrap();
            if !self.below_cap(sched.scheduled) {
                debug!("dropping {record}: admission cap reached");
                return;
            }
            if let Err(e) = self.queue.put(&record) {
                error!("failed to put {record} in the pending queue: {e}");
                return;
            }
            sched.scheduled += 1;
            if let Err(e) = self.counters.increment(Counters::SCHEDULED_PAGES) {
                error!("failed to persist the scheduled counter: {e}");
            }
        }
        self.wakeup.notify_waiters();
    }

    /// Admits records in order until the cap would be exceeded, then drops
    /// the rest of the batch. The scheduled counter moves once for the whole
    /// admitted prefix and waiters are notified once.
    pub fn schedule_all(&self, records: Vec<WebUrl>) {
        let total = records.len();
        {
            let mut sched = self.sched.lock().unwrap();
            let mut admitted: u64 = 0;
            for record in records {
                if !self.below_cap(sched.scheduled + admitted) {
                    debug!(
                        "admission cap reached, dropping the remaining {} of {total} records",
                        total as u64 - admitted
                    );
                    break;
                }
                match self.queue.put(&record) {
                    Ok(()) => admitted += 1,
                    Err(e) => error!("failed to put {record} in the pending queue: {e}"),
                }
            }
            if admitted > 0 {
                sched.scheduled += admitted;
                if let Err(e) = self
                    .counters
                    .add(Counters::SCHEDULED_PAGES, admitted as i64)
                {
                    error!("failed to persist the scheduled counter: {e}");
                }
            }
        }
        self.wakeup.notify_waiters();
    }

    /// Leases up to `max` records in composite-key order, or an empty batch
    /// once the session is finished.
    ///
    /// Suspends while the queue is empty. Leased records move to the
    /// in-flight ledger and stay there until [`Frontier::set_processed`]
    /// acknowledges them.
    pub async fn next_batch(&self, max: usize) -> Vec<WebUrl> {
        loop {
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            // Arm the listener before re-checking so a notification landing
            // between the check and the await still wakes us.
            notified.as_mut().enable();

            {
                let _sched = self.sched.lock().unwrap();
                if self.finished.load(Ordering::SeqCst) {
                    return Vec::new();
                }
                match self.lease(max) {
                    Ok(batch) if !batch.is_empty() => return batch,
                    Ok(_) => {}
                    Err(e) => error!("failed to lease from the pending queue: {e}"),
                }
            }

            notified.await;
        }
    }

    fn lease(&self, max: usize) -> StoreResult<Vec<WebUrl>> {
        let batch = self.queue.get(max)?;
        if batch.is_empty() {
            return Ok(batch);
        }
        self.queue.delete(batch.len())?;
        for record in &batch {
            self.ledger.put(record)?;
        }
        debug!("leased {} urls", batch.len());
        Ok(batch)
    }

    /// Acknowledges one leased record as fully attempted.
    ///
    /// A missing ledger entry is logged but tolerated; it means the entry
    /// was already recovered or acknowledged twice.
    pub fn set_processed(&self, record: &WebUrl) {
        if let Err(e) = self.counters.increment(Counters::PROCESSED_PAGES) {
            error!("failed to persist the processed counter: {e}");
        }
        match self.ledger.remove(record) {
            Ok(true) => {}
            Ok(false) => warn!("could not remove {record} from the in-flight ledger"),
            Err(e) => warn!("failed to remove {record} from the in-flight ledger: {e}"),
        }
    }

    /// Marks the session finished and wakes every blocked dequeue.
    pub fn finish(&self) {
        info!("frontier finished, releasing waiting workers");
        self.finished.store(true, Ordering::SeqCst);
        self.wakeup.notify_waiters();
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn queue_length(&self) -> u64 {
        let _sched = self.sched.lock().unwrap();
        self.queue.len().unwrap_or_else(|e| {
            warn!("failed to read the pending queue length: {e}");
            0
        })
    }

    pub fn in_flight_count(&self) -> u64 {
        self.ledger.len().unwrap_or_else(|e| {
            warn!("failed to read the in-flight ledger length: {e}");
            0
        })
    }

    pub fn scheduled_count(&self) -> u64 {
        self.counters.get(Counters::SCHEDULED_PAGES).max(0) as u64
    }

    pub fn processed_count(&self) -> u64 {
        self.counters.get(Counters::PROCESSED_PAGES).max(0) as u64
    }

    fn below_cap(&self, scheduled: u64) -> bool {
        match self.max_pages {
            Some(cap) => scheduled < cap,
            None => true,
        }
    }
}

/// Builds a bound record outside the engine, mostly for tests and tools.
pub fn bound_record(url: &str, doc_id: DocId, depth: i16, tld: &TldList) -> WebUrl {
    let mut record = WebUrl::new(url, tld);
    record.doc_id = Some(doc_id);
    record.depth = depth;
    record
}
