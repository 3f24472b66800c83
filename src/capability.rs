//! Capability Probe
//!
//! Answers whether a value genuinely opts into a named display behavior. Every
//! [`Displayable`] inherits default implementations of all display hooks; those
//! defaults never count. Only capabilities a type declares through
//! [`Displayable::own_capabilities`] do.

use crate::value::Displayable;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    /// Produces its own HTML (`repr_html`).
    NativeHtml,
    /// Produces its own pretty text (`repr_pretty`).
    NativePretty,
    /// Builds its whole representation when displayed at the root (`root_repr`).
    CustomRootRepr,
    /// Builds its representation at any depth of the tree (`subtree_repr`).
    CustomSubtreeRepr,
    /// Exposes numeric array contents (`as_array`).
    ArrayData,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::NativeHtml,
        Capability::NativePretty,
        Capability::CustomRootRepr,
        Capability::CustomSubtreeRepr,
        Capability::ArrayData,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Capability::NativeHtml => "native_html",
            Capability::NativePretty => "native_pretty",
            Capability::CustomRootRepr => "custom_root_repr",
            Capability::CustomSubtreeRepr => "custom_subtree_repr",
            Capability::ArrayData => "array_data",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Capability::NativeHtml => 1 << 0,
            Capability::NativePretty => 1 << 1,
            Capability::CustomRootRepr => 1 << 2,
            Capability::CustomSubtreeRepr => 1 << 3,
            Capability::ArrayData => 1 << 4,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCapability(pub String);

impl fmt::Display for UnknownCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown capability '{}'", self.0)
    }
}

impl std::error::Error for UnknownCapability {}

impl FromStr for Capability {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|capability| capability.name() == s)
            .ok_or_else(|| UnknownCapability(s.to_string()))
    }
}

/// A set of declared capabilities.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const fn empty() -> Self {
        Capabilities(0)
    }

    pub fn of(capabilities: &[Capability]) -> Self {
        capabilities.iter().copied().collect()
    }

    #[must_use]
    pub fn with(self, capability: Capability) -> Self {
        Capabilities(self.0 | capability.bit())
    }

    pub fn contains(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL
            .into_iter()
            .filter(move |capability| self.contains(*capability))
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Capabilities::empty(), |set, capability| set.with(capability))
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(Capability::name)).finish()
    }
}

/// Whether `value` declares `capability` itself. Never panics; a failed probe is `false`.
pub fn has_own_capability(value: &dyn Displayable, capability: Capability) -> bool {
    panic::catch_unwind(AssertUnwindSafe(|| {
        value.own_capabilities().contains(capability)
    }))
    .unwrap_or(false)
}

/// Name-based variant of [`has_own_capability`]. Unknown names are `false`.
pub fn has_own_capability_named(value: &dyn Displayable, name: &str) -> bool {
    name.parse::<Capability>()
        .map(|capability| has_own_capability(value, capability))
        .unwrap_or(false)
}

/// Whether `value` is an opaque display object. A failed probe is `false`.
pub fn is_display_object(value: &dyn Displayable) -> bool {
    panic::catch_unwind(AssertUnwindSafe(|| value.is_display_object())).unwrap_or(false)
}
