//! Skeleton emission and leaf scheduling.

use crate::error::ApiError;
use crate::host::{Host, OutputContent};
use crate::repr::html::{render_root, RenderOptions};
use crate::repr::{FoldableRepr, FragmentId};
use crate::streaming::deferred::DeferredLeaf;
use crate::streaming::handle::OutputHandle;
use crate::streaming::scheduler::{LeafJob, LeafScheduler, LeafTracker, PipelineConfig};
use std::sync::Arc;
use tracing::{debug, info};

pub struct StreamingPipeline {
    scheduler: Arc<dyn LeafScheduler>,
}

impl StreamingPipeline {
    pub fn new(scheduler: Arc<dyn LeafScheduler>) -> Self {
        Self { scheduler }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, ApiError> {
        Ok(Self::new(config.build_scheduler()?))
    }

    pub fn scheduler(&self) -> &Arc<dyn LeafScheduler> {
        &self.scheduler
    }

    /// Emit `repr` as a new root fragment, then schedule its deferred leaves.
    ///
    /// The skeleton is emitted before any producer is scheduled, so every leaf
    /// update arrives after the fragment it targets.
    pub fn display_streaming_as_root(
        &self,
        host: Arc<dyn Host>,
        repr: &FoldableRepr,
        deferreds: Vec<DeferredLeaf>,
        options: RenderOptions,
        stealable: bool,
    ) -> Result<OutputHandle, ApiError> {
        let fragment = FragmentId::next();
        let html = render_root(repr.root(), &fragment, options)?;
        host.emit(OutputContent::Fragment {
            id: fragment.clone(),
            html,
        })?;
        info!(
            fragment = %fragment,
            leaves = deferreds.len(),
            scheduler = self.scheduler.name(),
            "Emitted streaming skeleton"
        );

        let tracker = Arc::new(LeafTracker::new(deferreds.len()));
        for leaf in deferreds {
            debug!(fragment = %fragment, leaf = %leaf.id(), "Scheduling deferred leaf");
            self.scheduler.schedule(LeafJob::new(
                fragment.clone(),
                leaf,
                Arc::clone(&host),
                Arc::clone(&tracker),
            ));
        }

        Ok(OutputHandle::new(fragment, stealable, host, tracker))
    }

    /// Drain leaves queued on an inline scheduler.
    pub fn run_pending(&self) -> usize {
        self.scheduler.run_pending()
    }
}

/// Finish `repr` into a complete root fragment in one step.
pub fn render_to_html_as_root(
    repr: &FoldableRepr,
    options: RenderOptions,
) -> Result<String, ApiError> {
    let fragment = FragmentId::next();
    Ok(render_root(repr.root(), &fragment, options)?)
}
