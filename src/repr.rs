//! Foldable representation
//!
//! Intermediate structural form of a rendered value and its serializers.

pub mod compress;
pub mod html;
pub mod part;
pub mod text;

pub use html::RenderOptions;
pub use part::{ErrorMarker, FoldableRepr, FragmentId, LeafId, Part};
