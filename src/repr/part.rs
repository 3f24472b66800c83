//! Representation parts.

use crate::error::RenderError;
use crate::value::KeyPath;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LEAF_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_FRAGMENT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Identifier of a deferred leaf within its fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeafId(u64);

impl LeafId {
    pub fn next() -> Self {
        LeafId(NEXT_LEAF_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LeafId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "leaf-{}", self.0)
    }
}

/// Identifier of an emitted document fragment, unique per process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentId(String);

impl FragmentId {
    pub fn next() -> Self {
        let seq = NEXT_FRAGMENT_SEQ.fetch_add(1, Ordering::Relaxed);
        FragmentId(format!("foldscope-{}-{}", std::process::id(), seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inline marker for a subtree or leaf that failed to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMarker {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    Siblings(Vec<Part>),
    /// A collapsible node with a label and children.
    Foldable {
        label: String,
        children: Vec<Part>,
        expanded: bool,
    },
    Field {
        key: String,
        value: Box<Part>,
    },
    Indented(Vec<Part>),
    Styled {
        style: String,
        child: Box<Part>,
    },
    WordWrap {
        allow: bool,
        child: Box<Part>,
    },
    VerticalSpace(String),
    /// Pre-rendered HTML with a text fallback.
    EmbeddedHtml {
        html: String,
        fallback: String,
    },
    Error(ErrorMarker),
    /// Placeholder for a leaf computed after the skeleton is emitted.
    Deferred(LeafId),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    pub fn field(key: impl Into<String>, value: Part) -> Self {
        Part::Field {
            key: key.into(),
            value: Box::new(value),
        }
    }

    pub fn styled(child: Part, style: impl Into<String>) -> Self {
        Part::Styled {
            style: style.into(),
            child: Box::new(child),
        }
    }

    pub fn error(path: &KeyPath, err: &RenderError) -> Self {
        Part::Error(ErrorMarker {
            path: path.to_string(),
            message: err.marker_message().to_string(),
        })
    }

    /// Placeholders in document order.
    pub fn deferred_leaves(&self) -> Vec<LeafId> {
        let mut leaves = Vec::new();
        self.walk(&mut |part| {
            if let Part::Deferred(id) = part {
                leaves.push(*id);
            }
        });
        leaves
    }

    pub fn error_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |part| {
            if matches!(part, Part::Error(_)) {
                count += 1;
            }
        });
        count
    }

    fn walk(&self, visit: &mut impl FnMut(&Part)) {
        visit(self);
        match self {
            Part::Siblings(children)
            | Part::Indented(children)
            | Part::Foldable { children, .. } => {
                for child in children {
                    child.walk(visit);
                }
            }
            Part::Field { value: child, .. }
            | Part::Styled { child, .. }
            | Part::WordWrap { child, .. } => child.walk(visit),
            Part::Text(_)
            | Part::VerticalSpace(_)
            | Part::EmbeddedHtml { .. }
            | Part::Error(_)
            | Part::Deferred(_) => {}
        }
    }
}

/// A complete structural rendering, ready to be serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldableRepr {
    root: Part,
}

impl FoldableRepr {
    pub fn new(root: Part) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Part {
        &self.root
    }

    pub fn into_root(self) -> Part {
        self.root
    }

    pub fn pending_leaves(&self) -> Vec<LeafId> {
        self.root.deferred_leaves()
    }
}
