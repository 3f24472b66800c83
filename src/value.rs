//! Displayable values
//!
//! The unit the display machinery operates on. A type opts into behaviors by
//! overriding the matching hook *and* declaring the capability in
//! [`Displayable::own_capabilities`]; undeclared overrides are ignored by dispatch.

use crate::capability::{Capabilities, Capability};
use crate::error::RenderError;
use crate::repr::Part;
use std::borrow::Cow;
use std::fmt;

/// One step of a path from the root value to a subtree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathKey {
    Field(String),
    Index(usize),
    Key(String),
}

impl PathKey {
    /// Label shown next to the child in a rendering.
    pub fn label(&self) -> String {
        match self {
            PathKey::Field(name) => name.clone(),
            PathKey::Index(index) => format!("[{}]", index),
            PathKey::Key(key) => format!("{:?}", key),
        }
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKey::Field(name) => write!(f, ".{}", name),
            PathKey::Index(index) => write!(f, "[{}]", index),
            PathKey::Key(key) => write!(f, "[{:?}]", key),
        }
    }
}

/// Path from the displayed root to a subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct KeyPath(Vec<PathKey>);

impl KeyPath {
    pub fn root() -> Self {
        KeyPath(Vec::new())
    }

    pub fn child(&self, key: PathKey) -> Self {
        let mut keys = self.0.clone();
        keys.push(key);
        KeyPath(keys)
    }

    pub fn keys(&self) -> &[PathKey] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<root>")?;
        for key in &self.0 {
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

/// A borrowed child of a structured value.
pub struct Child<'a> {
    pub key: PathKey,
    pub value: &'a dyn Displayable,
}

impl<'a> Child<'a> {
    pub fn new(key: PathKey, value: &'a dyn Displayable) -> Self {
        Self { key, value }
    }

    pub fn field(name: &str, value: &'a dyn Displayable) -> Self {
        Self::new(PathKey::Field(name.to_string()), value)
    }
}

/// Owned numeric contents of an array-like value.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayView {
    pub dtype: String,
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrayStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub nan_count: usize,
}

impl ArrayView {
    pub fn new(dtype: impl Into<String>, shape: Vec<usize>, values: Vec<f64>) -> Self {
        Self {
            dtype: dtype.into(),
            shape,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `dtype[d0,d1,...]`
    pub fn signature(&self) -> String {
        let dims: Vec<String> = self.shape.iter().map(|d| d.to_string()).collect();
        format!("{}[{}]", self.dtype, dims.join(","))
    }

    /// Statistics over the finite values; `None` if there are none.
    pub fn stats(&self) -> Option<ArrayStats> {
        let nan_count = self.values.iter().filter(|v| v.is_nan()).count();
        let finite: Vec<f64> = self.values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = finite.iter().sum::<f64>() / finite.len() as f64;
        Some(ArrayStats {
            min,
            max,
            mean,
            nan_count,
        })
    }
}

/// A value that can be displayed.
///
/// All hooks except `type_name` have defaults that every value inherits. Dispatch
/// only uses a hook when the matching [`crate::capability::Capability`] is
/// declared in `own_capabilities`.
pub trait Displayable: Send + Sync {
    fn type_name(&self) -> Cow<'_, str>;

    fn own_capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    /// Whether this value only exists to carry pre-rendered content.
    fn is_display_object(&self) -> bool {
        false
    }

    /// Generic one-line description available for every value.
    fn summary(&self) -> String {
        format!("<{}>", self.type_name())
    }

    fn repr_html(&self) -> Option<String> {
        None
    }

    fn repr_pretty(&self) -> Option<String> {
        None
    }

    fn root_repr(&self) -> Option<Result<Part, RenderError>> {
        None
    }

    fn subtree_repr(&self, _path: &KeyPath) -> Option<Result<Part, RenderError>> {
        None
    }

    fn children(&self) -> Vec<Child<'_>> {
        Vec::new()
    }

    fn as_array(&self) -> Option<ArrayView> {
        None
    }
}

impl Displayable for serde_json::Value {
    fn type_name(&self) -> Cow<'_, str> {
        let name = match self {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "bool",
            serde_json::Value::Number(_) => "number",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Array(_) => "array",
            serde_json::Value::Object(_) => "object",
        };
        Cow::Borrowed(name)
    }

    fn summary(&self) -> String {
        match self {
            serde_json::Value::Array(items) => format!("array[{}]", items.len()),
            serde_json::Value::Object(map) => format!("object{{{}}}", map.len()),
            scalar => scalar.to_string(),
        }
    }

    fn children(&self) -> Vec<Child<'_>> {
        match self {
            serde_json::Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| Child::new(PathKey::Index(index), item as &dyn Displayable))
                .collect(),
            serde_json::Value::Object(map) => map
                .iter()
                .map(|(key, item)| Child::new(PathKey::Key(key.clone()), item as &dyn Displayable))
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl Displayable for String {
    fn type_name(&self) -> Cow<'_, str> {
        Cow::Borrowed("str")
    }

    fn summary(&self) -> String {
        format!("{:?}", self)
    }
}

macro_rules! scalar_displayable {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl Displayable for $ty {
                fn type_name(&self) -> Cow<'_, str> {
                    Cow::Borrowed($name)
                }

                fn summary(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

scalar_displayable! {
    bool => "bool",
    i64 => "int",
    u64 => "int",
    f64 => "float",
}

impl<T: Displayable> Displayable for Vec<T> {
    fn type_name(&self) -> Cow<'_, str> {
        Cow::Borrowed("list")
    }

    fn summary(&self) -> String {
        format!("list[{}]", self.len())
    }

    fn children(&self) -> Vec<Child<'_>> {
        self.iter()
            .enumerate()
            .map(|(index, item)| Child::new(PathKey::Index(index), item as &dyn Displayable))
            .collect()
    }
}

impl Displayable for ArrayView {
    fn type_name(&self) -> Cow<'_, str> {
        Cow::Borrowed("ndarray")
    }

    fn own_capabilities(&self) -> Capabilities {
        Capabilities::of(&[Capability::ArrayData])
    }

    fn summary(&self) -> String {
        self.signature()
    }

    fn children(&self) -> Vec<Child<'_>> {
        self.values
            .iter()
            .enumerate()
            .map(|(index, item)| Child::new(PathKey::Index(index), item as &dyn Displayable))
            .collect()
    }

    fn as_array(&self) -> Option<ArrayView> {
        Some(self.clone())
    }
}

/// A JSON document in which objects shaped like
/// `{"dtype": "f32", "shape": [2, 2], "data": [1, 2, 3, 4]}` are arrays.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonDocument {
    Scalar(serde_json::Value),
    Array(ArrayView),
    List(Vec<JsonDocument>),
    Object(Vec<(String, JsonDocument)>),
}

impl JsonDocument {
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Array(items) => {
                JsonDocument::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => match array_from_object(&map) {
                Some(array) => JsonDocument::Array(array),
                None => JsonDocument::Object(
                    map.into_iter()
                        .map(|(key, item)| (key, Self::from_json(item)))
                        .collect(),
                ),
            },
            scalar => JsonDocument::Scalar(scalar),
        }
    }
}

fn array_from_object(map: &serde_json::Map<String, serde_json::Value>) -> Option<ArrayView> {
    if map.len() != 3 {
        return None;
    }
    let dtype = map.get("dtype")?.as_str()?;
    let shape = map
        .get("shape")?
        .as_array()?
        .iter()
        .map(|d| d.as_u64().map(|d| d as usize))
        .collect::<Option<Vec<_>>>()?;
    let values = map
        .get("data")?
        .as_array()?
        .iter()
        .map(|v| v.as_f64())
        .collect::<Option<Vec<_>>>()?;
    (shape.iter().product::<usize>() == values.len())
        .then(|| ArrayView::new(dtype, shape, values))
}

impl Displayable for JsonDocument {
    fn type_name(&self) -> Cow<'_, str> {
        match self {
            JsonDocument::Scalar(value) => value.type_name(),
            JsonDocument::Array(array) => array.type_name(),
            JsonDocument::List(_) => Cow::Borrowed("array"),
            JsonDocument::Object(_) => Cow::Borrowed("object"),
        }
    }

    fn own_capabilities(&self) -> Capabilities {
        match self {
            JsonDocument::Array(array) => array.own_capabilities(),
            _ => Capabilities::empty(),
        }
    }

    fn summary(&self) -> String {
        match self {
            JsonDocument::Scalar(value) => value.summary(),
            JsonDocument::Array(array) => array.summary(),
            JsonDocument::List(items) => format!("array[{}]", items.len()),
            JsonDocument::Object(fields) => format!("object{{{}}}", fields.len()),
        }
    }

    fn children(&self) -> Vec<Child<'_>> {
        match self {
            JsonDocument::Scalar(_) => Vec::new(),
            JsonDocument::Array(array) => array.children(),
            JsonDocument::List(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| Child::new(PathKey::Index(index), item as &dyn Displayable))
                .collect(),
            JsonDocument::Object(fields) => fields
                .iter()
                .map(|(key, item)| Child::new(PathKey::Key(key.clone()), item as &dyn Displayable))
                .collect(),
        }
    }

    fn as_array(&self) -> Option<ArrayView> {
        match self {
            JsonDocument::Array(array) => Some(array.clone()),
            _ => None,
        }
    }
}
