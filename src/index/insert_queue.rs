//! Namespace index insert queue
//!
//! Batches documents from any number of concurrent writers and hands each
//! batch to an `InsertBatchFn` from a single background task.
//!
//! # Flush loop
//!
//! ```text
//! insert() ──▶ [ active batch ] ◀── one mutex guards {state, active batch, batch index}
//!                    │
//!     tick(batch_backoff) | notify(size threshold) | cancel
//!                    ↓
//!          swap in empty batch, insert_batch(docs).await
//!                    ↓
//!   lifecycle hooks fired, completion published to every handle
//! ```
//!
//! The loop awaits each `insert_batch` call before it looks at the next
//! batch, so at most one batch insert is ever in flight per queue.

use crate::index::error::{IndexError, IndexResult};
use crate::index::lifecycle::LifecycleGuard;
use crate::index::options::{InsertQueueOptions, NowFn};
use crate::index::Document;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const MIN_BATCH_BACKOFF: Duration = Duration::from_micros(100);

/// Bulk insert of one batch into the underlying index
#[async_trait]
pub trait InsertBatchFn: Send + Sync {
    async fn insert_batch(&self, docs: &[Document]) -> IndexResult<()>;
}

/// Queue of pending index writes
///
/// Injected into the namespace index through a `NewInsertQueueFn`, so tests
/// can substitute their own implementation.
#[async_trait]
pub trait InsertQueue: Send + Sync {
    /// Start the background flush loop
    fn start(&self) -> IndexResult<()>;

    /// Flush everything enqueued so far and stop the flush loop
    async fn stop(&self) -> IndexResult<()>;

    /// Enqueue a document. The queue owns `lifecycle` from here on, and
    /// finalizes it itself when the insert is refused.
    fn insert(&self, doc: Document, lifecycle: LifecycleGuard) -> IndexResult<CompletionHandle>;

    fn stats(&self) -> InsertQueueStats {
        InsertQueueStats::default()
    }
}

/// Constructor for the insert queue used by a namespace index
pub type NewInsertQueueFn =
    Box<dyn FnOnce(Arc<dyn InsertBatchFn>, NowFn, InsertQueueOptions) -> Arc<dyn InsertQueue> + Send>;

/// Production queue constructor
pub fn new_insert_queue_fn() -> NewInsertQueueFn {
    Box::new(|batch_fn, now_fn, opts| {
        Arc::new(NamespaceIndexInsertQueue::new(batch_fn, now_fn, opts)) as Arc<dyn InsertQueue>
    })
}

type BatchOutcome = Option<IndexResult<()>>;

/// Resolves once the batch holding a request has been inserted
#[derive(Debug)]
pub struct CompletionHandle {
    rx: watch::Receiver<BatchOutcome>,
}

impl CompletionHandle {
    /// A handle that is already resolved
    pub fn completed(outcome: IndexResult<()>) -> Self {
        let (_tx, rx) = watch::channel(Some(outcome));
        Self { rx }
    }

    /// Wait for the batch outcome
    pub async fn wait(mut self) -> IndexResult<()> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Ok(())),
            Err(_) => Err(IndexError::Shutdown(
                "insert queue dropped the batch before completing it".to_string(),
            )),
        }
    }
}

/// Counters exposed for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertQueueStats {
    pub batches_flushed: u64,
    pub batches_failed: u64,
    pub requests_inserted: u64,
    pub requests_rejected: u64,
}

#[derive(Debug, Default)]
struct QueueCounters {
    batches_flushed: AtomicU64,
    batches_failed: AtomicU64,
    requests_inserted: AtomicU64,
    requests_rejected: AtomicU64,
}

impl QueueCounters {
    fn snapshot(&self) -> InsertQueueStats {
        InsertQueueStats {
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            requests_inserted: self.requests_inserted.load(Ordering::Relaxed),
            requests_rejected: self.requests_rejected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueState {
    NotStarted,
    Running,
    Stopped,
}

/// Requests accumulated between two flushes
struct WriteBatch {
    docs: Vec<Document>,
    lifecycles: Vec<LifecycleGuard>,
    done_tx: watch::Sender<BatchOutcome>,
}

impl WriteBatch {
    fn new() -> Self {
        let (done_tx, _) = watch::channel(None);
        Self {
            docs: Vec::new(),
            lifecycles: Vec::new(),
            done_tx,
        }
    }

    fn len(&self) -> usize {
        self.docs.len()
    }
}

struct QueueInner {
    state: QueueState,
    active: WriteBatch,
    batch_index: u64,
}

struct QueueShared {
    inner: Mutex<QueueInner>,
    notify: Notify,
    batch_fn: Arc<dyn InsertBatchFn>,
    now_fn: NowFn,
    opts: InsertQueueOptions,
    counters: QueueCounters,
}

struct FlushWorker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Batching insert queue driven by one background task
pub struct NamespaceIndexInsertQueue {
    shared: Arc<QueueShared>,
    worker: Mutex<Option<FlushWorker>>,
}

impl NamespaceIndexInsertQueue {
    pub fn new(batch_fn: Arc<dyn InsertBatchFn>, now_fn: NowFn, opts: InsertQueueOptions) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                inner: Mutex::new(QueueInner {
                    state: QueueState::NotStarted,
                    active: WriteBatch::new(),
                    batch_index: 0,
                }),
                notify: Notify::new(),
                batch_fn,
                now_fn,
                opts,
                counters: QueueCounters::default(),
            }),
            worker: Mutex::new(None),
        }
    }

    fn reject(&self, reason: &str) -> IndexError {
        self.shared
            .counters
            .requests_rejected
            .fetch_add(1, Ordering::Relaxed);
        IndexError::Queue(reason.to_string())
    }

    /// The flush task holds the only other reference to the shared state
    #[cfg(test)]
    pub(crate) fn flush_task_alive(&self) -> bool {
        Arc::strong_count(&self.shared) > 1
    }
}

#[async_trait]
impl InsertQueue for NamespaceIndexInsertQueue {
    fn start(&self) -> IndexResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| IndexError::Startup(format!("no tokio runtime: {}", e)))?;

        let mut inner = self.shared.inner.lock();
        match inner.state {
            QueueState::NotStarted => {}
            QueueState::Running => {
                return Err(IndexError::Startup("insert queue already running".to_string()))
            }
            QueueState::Stopped => {
                return Err(IndexError::Startup("insert queue already stopped".to_string()))
            }
        }

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(run_flush_loop(Arc::clone(&self.shared), cancel.clone()));
        inner.state = QueueState::Running;
        *self.worker.lock() = Some(FlushWorker { cancel, handle });

        tracing::debug!(
            batch_backoff = ?self.shared.opts.batch_backoff,
            batch_size_threshold = self.shared.opts.batch_size_threshold,
            "Insert queue started"
        );
        Ok(())
    }

    async fn stop(&self) -> IndexResult<()> {
        {
            let mut inner = self.shared.inner.lock();
            if inner.state != QueueState::Running {
                return Err(IndexError::Shutdown("insert queue is not running".to_string()));
            }
            inner.state = QueueState::Stopped;
        }

        let worker = self
            .worker
            .lock()
            .take()
            .ok_or_else(|| IndexError::Shutdown("insert queue has no flush task".to_string()))?;

        worker.cancel.cancel();
        worker
            .handle
            .await
            .map_err(|e| IndexError::Shutdown(format!("flush task failed: {}", e)))?;

        tracing::debug!("Insert queue stopped");
        Ok(())
    }

    fn insert(&self, doc: Document, lifecycle: LifecycleGuard) -> IndexResult<CompletionHandle> {
        let (handle, batch_len) = {
            let mut inner = self.shared.inner.lock();
            if inner.state != QueueState::Running {
                drop(inner);
                lifecycle.finalize();
                return Err(self.reject("insert queue is not running"));
            }
            if inner.active.len() >= self.shared.opts.max_pending {
                drop(inner);
                lifecycle.finalize();
                return Err(self.reject("insert queue is at capacity"));
            }

            inner.active.docs.push(doc);
            inner.active.lifecycles.push(lifecycle);
            let rx = inner.active.done_tx.subscribe();
            (CompletionHandle { rx }, inner.active.len())
        };

        if batch_len >= self.shared.opts.batch_size_threshold {
            self.shared.notify.notify_one();
        }

        Ok(handle)
    }

    fn stats(&self) -> InsertQueueStats {
        self.shared.counters.snapshot()
    }
}

impl Drop for NamespaceIndexInsertQueue {
    fn drop(&mut self) {
        // The flush task drains what is left and exits on its own
        if let Some(worker) = self.worker.get_mut().take() {
            worker.cancel.cancel();
        }
    }
}

/// Run caller hooks; a panicking hook must not take the flush task down
fn deliver_hooks(batch_index: u64, deliver: impl FnOnce()) {
    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(deliver)).is_err() {
        tracing::error!(batch = batch_index, "Lifecycle hook panicked");
    }
}

/// Stops the queue if the flush task unwinds
///
/// Later inserts are refused and writers waiting on the active batch get a
/// `Shutdown` error instead of waiting on a task that no longer exists.
struct FlushTaskGuard<'a> {
    shared: &'a QueueShared,
}

impl Drop for FlushTaskGuard<'_> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        let mut inner = self.shared.inner.lock();
        inner.state = QueueState::Stopped;
        inner.active.done_tx.send_replace(Some(Err(IndexError::Shutdown(
            "insert queue flush task panicked".to_string(),
        ))));
        tracing::error!(pending = inner.active.len(), "Insert queue flush task panicked");
    }
}

async fn run_flush_loop(shared: Arc<QueueShared>, cancel: CancellationToken) {
    let _guard = FlushTaskGuard { shared: &shared };
    let backoff = shared.opts.batch_backoff.max(MIN_BATCH_BACKOFF);
    let mut ticker = interval_at(Instant::now() + backoff, backoff);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = shared.notify.notified() => {
                ticker.reset();
            }
            _ = ticker.tick() => {}
        }

        shared.flush_active().await;
    }

    // Everything enqueued before stop() flipped the state is in this batch
    shared.flush_active().await;
    tracing::trace!("Insert queue flush loop exited");
}

impl QueueShared {
    async fn flush_active(&self) {
        let (batch, batch_index) = {
            let mut inner = self.inner.lock();
            if inner.active.len() == 0 {
                return;
            }
            let batch = std::mem::replace(&mut inner.active, WriteBatch::new());
            inner.batch_index += 1;
            (batch, inner.batch_index)
        };

        let WriteBatch {
            docs,
            lifecycles,
            done_tx,
        } = batch;
        let size = docs.len();

        let outcome = match self.batch_fn.insert_batch(&docs).await {
            Ok(()) => {
                let now = (self.now_fn)();
                for lifecycle in lifecycles {
                    deliver_hooks(batch_index, || lifecycle.succeed(now));
                }
                self.counters.batches_flushed.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .requests_inserted
                    .fetch_add(size as u64, Ordering::Relaxed);
                tracing::trace!(batch = batch_index, size, "Index batch inserted");
                Ok(())
            }
            Err(e) => {
                for lifecycle in lifecycles {
                    deliver_hooks(batch_index, || lifecycle.finalize());
                }
                self.counters.batches_failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(batch = batch_index, size, error = %e, "Index batch insert failed");
                Err(match e {
                    IndexError::BatchInsert(_) => e,
                    other => IndexError::BatchInsert(other.to_string()),
                })
            }
        };

        done_tx.send_replace(Some(outcome));
    }
}
