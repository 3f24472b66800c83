//! Deferred leaves
//!
//! A renderer that wants to postpone an expensive leaf calls [`maybe_defer`]. While
//! a collector is active the producer is stored and a placeholder returned;
//! otherwise the producer runs immediately.

use crate::context::{ContextSnapshot, ContextualValue};
use crate::error::{panic_message, RenderError};
use crate::repr::{LeafId, Part};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::debug;

type Producer = Box<dyn FnOnce() -> Result<Part, RenderError> + Send>;

/// A placeholder leaf and the producer that will fill it.
pub struct DeferredLeaf {
    id: LeafId,
    producer: Producer,
    snapshot: ContextSnapshot,
}

impl DeferredLeaf {
    fn new(producer: Producer) -> Self {
        Self {
            id: LeafId::next(),
            producer,
            snapshot: ContextSnapshot::capture(),
        }
    }

    pub fn id(&self) -> LeafId {
        self.id
    }

    /// Run the producer inside the context captured when the leaf was created.
    ///
    /// Consumes the leaf, so each producer runs at most once. A panicking producer
    /// is reported as [`RenderError::Panicked`].
    pub fn resolve(self) -> Result<Part, RenderError> {
        let DeferredLeaf {
            id,
            producer,
            snapshot,
        } = self;

        snapshot.run(|| {
            // Leaves resolve eagerly; nothing nested inside a producer is deferred again.
            collector_slot().with_scoped(None, || {
                match panic::catch_unwind(AssertUnwindSafe(producer)) {
                    Ok(result) => result,
                    Err(payload) => Err(RenderError::Panicked {
                        path: id.to_string(),
                        message: panic_message(payload.as_ref()),
                    }),
                }
            })
        })
    }
}

impl fmt::Debug for DeferredLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredLeaf")
            .field("id", &self.id)
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

#[derive(Clone, Default)]
struct DeferredCollector {
    leaves: Arc<Mutex<Vec<DeferredLeaf>>>,
}

static COLLECTOR: Lazy<ContextualValue<Option<DeferredCollector>>> =
    Lazy::new(|| ContextualValue::new(module_path!(), "deferred_collector", None));

fn collector_slot() -> &'static ContextualValue<Option<DeferredCollector>> {
    &COLLECTOR
}

/// Run `f`, collecting every leaf deferred while it runs.
///
/// Leaves are returned in the order they were deferred.
pub fn collecting_deferred_renderings<R>(f: impl FnOnce() -> R) -> (R, Vec<DeferredLeaf>) {
    let collector = DeferredCollector::default();
    let result = collector_slot().with_scoped(Some(collector.clone()), f);
    let leaves = std::mem::take(&mut *collector.leaves.lock());
    debug!(leaves = leaves.len(), "Collected deferred leaves");
    (result, leaves)
}

/// Defer `producer` if a collector is active, otherwise run it now.
pub fn maybe_defer(
    producer: impl FnOnce() -> Result<Part, RenderError> + Send + 'static,
) -> Result<Part, RenderError> {
    match collector_slot().get() {
        Some(collector) => {
            let leaf = DeferredLeaf::new(Box::new(producer));
            let id = leaf.id();
            collector.leaves.lock().push(leaf);
            Ok(Part::Deferred(id))
        }
        None => producer(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static SETTING: Lazy<ContextualValue<&'static str>> =
        Lazy::new(|| ContextualValue::new("tests", "deferred_setting", "permanent"));

    #[test]
    fn test_without_collector_runs_immediately() {
        let part = maybe_defer(|| Ok(Part::text("now"))).unwrap();
        assert_eq!(part, Part::text("now"));
    }

    #[test]
    fn test_collected_leaves_run_once_on_resolve() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let (part, leaves) = collecting_deferred_renderings(|| {
            maybe_defer(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Part::text("later"))
            })
        });

        let part = part.unwrap();
        assert_eq!(leaves.len(), 1);
        assert_eq!(part, Part::Deferred(leaves[0].id()));
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        let resolved: Vec<Part> = leaves.into_iter().map(|l| l.resolve().unwrap()).collect();
        assert_eq!(resolved, vec![Part::text("later")]);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_producer_sees_context_at_creation() {
        let (_, leaves) = SETTING.with_scoped("captured", || {
            collecting_deferred_renderings(|| maybe_defer(|| Ok(Part::text(SETTING.get()))))
        });
        let leaf = leaves.into_iter().next().unwrap();

        let resolved = std::thread::spawn(move || leaf.resolve()).join().unwrap();
        assert_eq!(resolved.unwrap(), Part::text("captured"));
    }

    #[test]
    fn test_panicking_producer_is_an_error() {
        let (_, leaves) = collecting_deferred_renderings(|| {
            maybe_defer(|| -> Result<Part, RenderError> { panic!("leaf exploded") })
        });
        let err = leaves.into_iter().next().unwrap().resolve().unwrap_err();
        match err {
            RenderError::Panicked { message, .. } => assert_eq!(message, "leaf exploded"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_nested_defer_inside_producer_runs_inline() {
        let (_, leaves) = collecting_deferred_renderings(|| {
            maybe_defer(|| maybe_defer(|| Ok(Part::text("inner"))))
        });
        assert_eq!(leaves.len(), 1);
        let part = leaves.into_iter().next().unwrap().resolve().unwrap();
        assert_eq!(part, Part::text("inner"));
    }
}
