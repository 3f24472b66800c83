//! Streaming Render Pipeline
//!
//! Emits a skeleton rendering immediately, with placeholders for leaves that are
//! expensive to compute, then back-fills each leaf as its producer completes.

pub mod deferred;
pub mod handle;
pub mod pipeline;
pub mod scheduler;

pub use deferred::{collecting_deferred_renderings, maybe_defer, DeferredLeaf};
pub use handle::OutputHandle;
pub use pipeline::StreamingPipeline;
pub use scheduler::{
    InlineScheduler, LeafProgress, LeafScheduler, LeafTracker, PipelineConfig, SchedulerKind,
    WorkerPoolScheduler,
};
