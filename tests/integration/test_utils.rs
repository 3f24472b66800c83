//! Shared test utilities for integration tests
//!
//! Every test gets its own in-memory host, installed as a scoped override on the
//! test's thread so tests can run in parallel.

use foldscope::context::ScopedGuard;
use foldscope::host::{active_host, Host, RecordingHost};
use foldscope::integration::{register_as_default_with, RegisterOptions};
use foldscope::streaming::{InlineScheduler, StreamingPipeline};
use std::sync::Arc;

pub type HostScope = ScopedGuard<'static, Option<Arc<dyn Host>>>;

/// A recording host installed for the calling thread until the scope is dropped.
pub fn scoped_host() -> (Arc<RecordingHost>, HostScope) {
    let host = Arc::new(RecordingHost::new());
    let scope = active_host().set_scoped(Some(host.clone() as Arc<dyn Host>));
    (host, scope)
}

/// A pipeline whose leaves only resolve when `run_pending` is called.
pub fn inline_pipeline() -> Arc<StreamingPipeline> {
    Arc::new(StreamingPipeline::new(Arc::new(InlineScheduler::new())))
}

/// Register the dispatch policy on the scoped host with an inline pipeline.
pub fn register_inline(options: RegisterOptions) -> Arc<StreamingPipeline> {
    let pipeline = inline_pipeline();
    register_as_default_with(&options, Arc::clone(&pipeline)).unwrap();
    pipeline
}

/// Uncompressed streaming registration, so the document can be inspected.
pub fn readable_options() -> RegisterOptions {
    RegisterOptions {
        compress_html: false,
        ..RegisterOptions::default()
    }
}
