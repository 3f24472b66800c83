//! Output relocation
//!
//! A streaming render emits its fragment as a side effect, possibly before the
//! host has opened the slot the output belongs in. The returned [`OutputHandle`]
//! is displayed by the host in that slot; on its first display it moves the
//! fragment there. Any later display is inert.

use crate::capability::{Capabilities, Capability};
use crate::error::ApiError;
use crate::host::Host;
use crate::repr::FragmentId;
use crate::streaming::scheduler::{LeafProgress, LeafTracker};
use crate::value::Displayable;
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

struct HandleState {
    fragment: FragmentId,
    stealable: AtomicBool,
    host: Arc<dyn Host>,
    tracker: Arc<LeafTracker>,
}

/// Handle to an emitted streaming fragment. Clones share the stealable flag.
#[derive(Clone)]
pub struct OutputHandle {
    state: Arc<HandleState>,
}

impl OutputHandle {
    pub(crate) fn new(
        fragment: FragmentId,
        stealable: bool,
        host: Arc<dyn Host>,
        tracker: Arc<LeafTracker>,
    ) -> Self {
        Self {
            state: Arc::new(HandleState {
                fragment,
                stealable: AtomicBool::new(stealable),
                host,
                tracker,
            }),
        }
    }

    pub fn fragment_id(&self) -> &FragmentId {
        &self.state.fragment
    }

    pub fn is_stealable(&self) -> bool {
        self.state.stealable.load(Ordering::SeqCst)
    }

    /// Relocate the fragment into the slot currently being displayed.
    ///
    /// Fails with an invariant violation if the handle was not stealable.
    pub fn steal(&self) -> Result<(), ApiError> {
        if !self.take_stealable() {
            return Err(ApiError::InvariantViolation(format!(
                "Output {} is not stealable",
                self.state.fragment
            )));
        }
        self.state.host.relocate(&self.state.fragment)
    }

    /// Block until every deferred leaf of the fragment has been delivered or
    /// discarded. Returns false on timeout.
    pub fn wait_for_leaves(&self, timeout: Duration) -> bool {
        self.state.tracker.wait(timeout)
    }

    pub fn progress(&self) -> LeafProgress {
        self.state.tracker.progress()
    }

    fn take_stealable(&self) -> bool {
        self.state
            .stealable
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl fmt::Debug for OutputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputHandle")
            .field("fragment", &self.state.fragment)
            .field("stealable", &self.is_stealable())
            .finish()
    }
}

impl Displayable for OutputHandle {
    fn type_name(&self) -> Cow<'_, str> {
        Cow::Borrowed("OutputHandle")
    }

    fn own_capabilities(&self) -> Capabilities {
        Capabilities::of(&[Capability::NativeHtml, Capability::NativePretty])
    }

    fn is_display_object(&self) -> bool {
        true
    }

    fn summary(&self) -> String {
        String::new()
    }

    /// Relocates on the first display; always renders as nothing itself.
    fn repr_html(&self) -> Option<String> {
        if self.take_stealable() {
            if let Err(err) = self.state.host.relocate(&self.state.fragment) {
                error!(fragment = %self.state.fragment, error = %err, "Failed to relocate output");
            }
        } else {
            debug!(fragment = %self.state.fragment, "Output already placed; nothing to relocate");
        }
        Some(String::new())
    }

    fn repr_pretty(&self) -> Option<String> {
        Some(String::new())
    }
}
