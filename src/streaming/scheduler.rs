//! Leaf scheduling
//!
//! Deferred leaves are resolved off the displaying thread. [`WorkerPoolScheduler`]
//! runs them on a tokio runtime with a semaphore bounding how many resolve at once;
//! [`InlineScheduler`] queues them until [`LeafScheduler::run_pending`] is called.

use crate::error::ApiError;
use crate::host::{DeliveryOutcome, Host, LeafUpdate};
use crate::repr::html::to_html;
use crate::repr::part::ErrorMarker;
use crate::repr::{FragmentId, Part};
use crate::streaming::deferred::DeferredLeaf;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

/// Which scheduler resolves deferred leaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    #[default]
    WorkerPool,
    Inline,
}

/// Streaming pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub scheduler: SchedulerKind,

    /// Worker threads of the leaf runtime
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum number of leaves resolving at the same time
    #[serde(default = "default_max_concurrent_leaves")]
    pub max_concurrent_leaves: usize,
}

fn default_workers() -> usize {
    2
}

fn default_max_concurrent_leaves() -> usize {
    4
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerKind::default(),
            workers: default_workers(),
            max_concurrent_leaves: default_max_concurrent_leaves(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("workers must be at least 1".to_string());
        }
        if self.max_concurrent_leaves == 0 {
            return Err("max_concurrent_leaves must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn build_scheduler(&self) -> Result<Arc<dyn LeafScheduler>, ApiError> {
        self.validate().map_err(ApiError::ConfigError)?;
        match self.scheduler {
            SchedulerKind::WorkerPool => Ok(Arc::new(WorkerPoolScheduler::new(
                self.workers,
                self.max_concurrent_leaves,
            )?)),
            SchedulerKind::Inline => Ok(Arc::new(InlineScheduler::new())),
        }
    }
}

/// Leaf completion counts for one fragment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeafProgress {
    pub pending: usize,
    pub delivered: usize,
    pub discarded: usize,
    /// Leaves whose producer failed; counted in `delivered` or `discarded` as well.
    pub failed: usize,
}

/// Tracks outstanding leaves of a fragment.
#[derive(Debug, Default)]
pub struct LeafTracker {
    progress: Mutex<LeafProgress>,
    changed: Condvar,
}

impl LeafTracker {
    pub fn new(pending: usize) -> Self {
        Self {
            progress: Mutex::new(LeafProgress {
                pending,
                ..LeafProgress::default()
            }),
            changed: Condvar::new(),
        }
    }

    pub fn progress(&self) -> LeafProgress {
        *self.progress.lock()
    }

    fn record(&self, outcome: DeliveryOutcome, failed: bool) {
        let mut progress = self.progress.lock();
        progress.pending = progress.pending.saturating_sub(1);
        match outcome {
            DeliveryOutcome::Delivered => progress.delivered += 1,
            DeliveryOutcome::Discarded => progress.discarded += 1,
        }
        if failed {
            progress.failed += 1;
        }
        self.changed.notify_all();
    }

    /// Block until no leaves are pending. Returns false on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut progress = self.progress.lock();
        while progress.pending > 0 {
            if self.changed.wait_until(&mut progress, deadline).timed_out() {
                return progress.pending == 0;
            }
        }
        true
    }
}

/// Records one leaf in its tracker exactly once.
///
/// A job that unwinds or is dropped before it finishes is counted as discarded,
/// and as failed when it unwound.
struct Completion {
    tracker: Arc<LeafTracker>,
    recorded: bool,
}

impl Completion {
    fn finish(mut self, outcome: DeliveryOutcome, failed: bool) {
        self.recorded = true;
        self.tracker.record(outcome, failed);
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.recorded {
            let failed = std::thread::panicking();
            self.tracker.record(DeliveryOutcome::Discarded, failed);
        }
    }
}

/// One deferred leaf bound to the fragment it belongs to.
pub struct LeafJob {
    fragment: FragmentId,
    leaf: DeferredLeaf,
    host: Arc<dyn Host>,
    completion: Completion,
}

impl LeafJob {
    pub fn new(
        fragment: FragmentId,
        leaf: DeferredLeaf,
        host: Arc<dyn Host>,
        tracker: Arc<LeafTracker>,
    ) -> Self {
        Self {
            fragment,
            leaf,
            host,
            completion: Completion {
                tracker,
                recorded: false,
            },
        }
    }

    /// Resolve the leaf and push the result to its fragment.
    pub fn run(self) {
        let LeafJob {
            fragment,
            leaf,
            host,
            completion,
        } = self;
        let id = leaf.id();

        let (html, failed) = match leaf.resolve() {
            Ok(part) => (to_html(&part), false),
            Err(err) => {
                warn!(fragment = %fragment, leaf = %id, error = %err, "Deferred leaf failed");
                let marker = Part::Error(ErrorMarker {
                    path: id.to_string(),
                    message: err.marker_message().to_string(),
                });
                (to_html(&marker), true)
            }
        };

        let outcome = host.push_update(
            &fragment,
            LeafUpdate {
                leaf: id,
                html,
                failed,
            },
        );
        if outcome == DeliveryOutcome::Discarded {
            debug!(fragment = %fragment, leaf = %id, "Leaf update discarded");
        }
        completion.finish(outcome, failed);
    }

    fn abandon(self) {
        self.completion.finish(DeliveryOutcome::Discarded, false);
    }
}

pub trait LeafScheduler: Send + Sync {
    fn schedule(&self, job: LeafJob);

    fn name(&self) -> &'static str;

    /// Run queued jobs on the calling thread. Returns how many ran.
    fn run_pending(&self) -> usize {
        0
    }
}

/// How long a dropped worker pool keeps running to finish its queued leaves.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Leaf tasks spawned on a worker pool that have not finished yet.
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        *self.count.lock() += 1;
        InFlightGuard(Arc::clone(self))
    }

    fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count > 0 {
            if self.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}

struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut count = self.0.count.lock();
        *count = count.saturating_sub(1);
        self.0.idle.notify_all();
    }
}

/// Resolves leaves on a dedicated tokio runtime.
///
/// Dropping the scheduler does not cancel queued leaves: the runtime is handed to
/// a drain thread that shuts it down once every spawned leaf has finished.
pub struct WorkerPoolScheduler {
    runtime: Option<Runtime>,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<InFlight>,
}

impl WorkerPoolScheduler {
    pub fn new(workers: usize, max_concurrent: usize) -> Result<Self, ApiError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers.max(1))
            .thread_name("foldscope-leaf")
            .enable_time()
            .build()?;
        Ok(Self {
            runtime: Some(runtime),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(InFlight::default()),
        })
    }

    /// Spawned leaves that have not finished.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.count.lock()
    }
}

impl LeafScheduler for WorkerPoolScheduler {
    fn schedule(&self, job: LeafJob) {
        let Some(runtime) = self.runtime.as_ref() else {
            job.abandon();
            return;
        };
        let semaphore = Arc::clone(&self.semaphore);
        let in_flight = self.in_flight.enter();
        runtime.spawn(async move {
            let _in_flight = in_flight;
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("Leaf semaphore closed; abandoning leaf");
                    job.abandon();
                    return;
                }
            };
            if let Err(err) = tokio::task::spawn_blocking(move || job.run()).await {
                error!(error = %err, "Leaf worker task failed");
            }
        });
    }

    fn name(&self) -> &'static str {
        "worker_pool"
    }
}

impl Drop for WorkerPoolScheduler {
    fn drop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        let in_flight = Arc::clone(&self.in_flight);
        let drain = std::thread::Builder::new()
            .name("foldscope-leaf-drain".to_string())
            .spawn(move || {
                if !in_flight.wait_idle(DRAIN_TIMEOUT) {
                    warn!(
                        timeout_secs = DRAIN_TIMEOUT.as_secs(),
                        "Leaf runtime still busy at shutdown; abandoning remaining leaves"
                    );
                }
                runtime.shutdown_background();
            });
        if let Err(err) = drain {
            error!(error = %err, "Failed to start leaf drain thread");
        }
    }
}

/// Queues leaves until they are drained explicitly.
#[derive(Default)]
pub struct InlineScheduler {
    queue: Mutex<VecDeque<LeafJob>>,
}

impl InlineScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.queue.lock().pop_front();
            match next {
                Some(job) => {
                    job.run();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl LeafScheduler for InlineScheduler {
    fn schedule(&self, job: LeafJob) {
        self.queue.lock().push_back(job);
    }

    fn name(&self) -> &'static str {
        "inline"
    }

    fn run_pending(&self) -> usize {
        self.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{FormatterRegistry, HostValue, OutputContent, RecordingHost};
    use crate::magic::CellMagic;
    use crate::streaming::deferred::{collecting_deferred_renderings, maybe_defer};
    use crate::value::Displayable;

    /// Delegates to a recording host but panics when a leaf update arrives.
    struct PanickingHost(RecordingHost);

    impl Host for PanickingHost {
        fn name(&self) -> &str {
            "panicking"
        }

        fn formatters(&self) -> &FormatterRegistry {
            self.0.formatters()
        }

        fn display(&self, value: &dyn Displayable) -> Result<(), ApiError> {
            self.0.display(value)
        }

        fn emit(&self, content: OutputContent) -> Result<(), ApiError> {
            self.0.emit(content)
        }

        fn push_update(&self, _fragment: &FragmentId, _update: LeafUpdate) -> DeliveryOutcome {
            panic!("update channel closed");
        }

        fn relocate(&self, fragment: &FragmentId) -> Result<(), ApiError> {
            self.0.relocate(fragment)
        }

        fn evaluate(&self, expression: &str) -> Result<HostValue, ApiError> {
            self.0.evaluate(expression)
        }

        fn run_cell(&self, body: &str) -> Result<(), ApiError> {
            self.0.run_cell(body)
        }

        fn register_magic(&self, magic: Arc<dyn CellMagic>) -> Result<(), ApiError> {
            self.0.register_magic(magic)
        }
    }

    fn deferred_leaves(count: usize, delay: Duration) -> Vec<DeferredLeaf> {
        let (_, leaves) = collecting_deferred_renderings(|| {
            for i in 0..count {
                let _ = maybe_defer(move || {
                    std::thread::sleep(delay);
                    Ok(Part::text(format!("leaf {}", i)))
                });
            }
        });
        leaves
    }

    fn emitted_fragment(host: &dyn Host) -> FragmentId {
        let id = FragmentId::next();
        host.emit(OutputContent::Fragment {
            id: id.clone(),
            html: "<div></div>".to_string(),
        })
        .unwrap();
        id
    }

    #[test]
    fn test_dropped_pool_still_delivers_queued_leaves() {
        let host: Arc<dyn Host> = Arc::new(RecordingHost::new());
        let fragment = emitted_fragment(host.as_ref());
        let tracker = Arc::new(LeafTracker::new(3));

        let scheduler = WorkerPoolScheduler::new(1, 1).unwrap();
        for leaf in deferred_leaves(3, Duration::from_millis(50)) {
            scheduler.schedule(LeafJob::new(
                fragment.clone(),
                leaf,
                Arc::clone(&host),
                Arc::clone(&tracker),
            ));
        }
        drop(scheduler);

        assert!(tracker.wait(Duration::from_secs(10)));
        let progress = tracker.progress();
        assert_eq!(progress.delivered, 3);
        assert_eq!(progress.discarded, 0);
    }

    #[test]
    fn test_panicking_host_still_settles_the_tracker() {
        let host: Arc<dyn Host> = Arc::new(PanickingHost(RecordingHost::new()));
        let fragment = emitted_fragment(host.as_ref());
        let tracker = Arc::new(LeafTracker::new(2));

        let scheduler = WorkerPoolScheduler::new(1, 2).unwrap();
        for leaf in deferred_leaves(2, Duration::ZERO) {
            scheduler.schedule(LeafJob::new(
                fragment.clone(),
                leaf,
                Arc::clone(&host),
                Arc::clone(&tracker),
            ));
        }

        assert!(tracker.wait(Duration::from_secs(10)));
        assert_eq!(
            tracker.progress(),
            LeafProgress {
                pending: 0,
                delivered: 0,
                discarded: 2,
                failed: 2,
            }
        );
    }

    #[test]
    fn test_unrun_inline_jobs_count_as_discarded() {
        let host: Arc<dyn Host> = Arc::new(RecordingHost::new());
        let fragment = emitted_fragment(host.as_ref());
        let tracker = Arc::new(LeafTracker::new(1));

        let scheduler = InlineScheduler::new();
        for leaf in deferred_leaves(1, Duration::ZERO) {
            scheduler.schedule(LeafJob::new(
                fragment.clone(),
                leaf,
                Arc::clone(&host),
                Arc::clone(&tracker),
            ));
        }
        drop(scheduler);

        assert!(tracker.wait(Duration::from_millis(10)));
        assert_eq!(tracker.progress().discarded, 1);
        assert_eq!(tracker.progress().failed, 0);
    }

    #[test]
    fn test_tracker_counts_outcomes() {
        let tracker = LeafTracker::new(3);
        tracker.record(DeliveryOutcome::Delivered, false);
        tracker.record(DeliveryOutcome::Delivered, true);
        assert!(!tracker.wait(Duration::from_millis(10)));
        tracker.record(DeliveryOutcome::Discarded, false);
        assert!(tracker.wait(Duration::from_millis(10)));
        assert_eq!(
            tracker.progress(),
            LeafProgress {
                pending: 0,
                delivered: 2,
                discarded: 1,
                failed: 1,
            }
        );
    }

    #[test]
    fn test_tracker_wakes_waiter_from_another_thread() {
        let tracker = Arc::new(LeafTracker::new(1));
        let worker = Arc::clone(&tracker);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            worker.record(DeliveryOutcome::Delivered, false);
        });
        assert!(tracker.wait(Duration::from_secs(5)));
        handle.join().unwrap();
    }

    #[test]
    fn test_pipeline_config_validation() {
        assert!(PipelineConfig::default().validate().is_ok());
        let config = PipelineConfig {
            workers: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scheduler_kind_names() {
        let config: PipelineConfig = toml::from_str("scheduler = \"inline\"").unwrap();
        assert_eq!(config.scheduler, SchedulerKind::Inline);
        assert_eq!(config.workers, 2);
        assert_eq!(config.build_scheduler().unwrap().name(), "inline");
    }
}
