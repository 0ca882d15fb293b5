//! Shape Model
//!
//! One declared data shape is a [`Shape`]: a common [`BaseShape`] envelope
//! wrapping a closed [`ShapeKind`] union that carries only the facets of its
//! own kind.
//!
//! Shapes never point at each other directly. Every reference (`inherits`,
//! `items`, `properties`, `anyOf`, custom facet definitions) is a [`ShapeId`]
//! handle into a [`ShapeArena`]. Resolving an `Unknown` shape overwrites its
//! slot once, and every holder of the handle observes the new value on the
//! next lookup.

pub mod facets;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::node::{Node, Position};

pub use facets::{
    ArrayFacets, BooleanFacets, DateTimeFacets, FileFacets, JsonFacets, NumberFacets,
    ObjectFacets, StringFacets, UnionFacets,
};

// =============================================================================
// Shape Handle
// =============================================================================

/// Stable handle to a shape slot in a [`ShapeArena`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShapeId(usize);

impl ShapeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Shape Type
// =============================================================================

/// Tag of a [`ShapeKind`] without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShapeType {
    Any,
    Nil,
    Object,
    Array,
    String,
    Integer,
    Number,
    Boolean,
    #[serde(rename = "datetime")]
    DateTime,
    #[serde(rename = "datetime-only")]
    DateTimeOnly,
    DateOnly,
    TimeOnly,
    File,
    Union,
    Json,
    Unknown,
}

impl ShapeType {
    /// The fixed built-in type names a declaration may use directly
    pub fn from_builtin(name: &str) -> Option<Self> {
        match name {
            "any" => Some(Self::Any),
            "nil" => Some(Self::Nil),
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "datetime" => Some(Self::DateTime),
            "datetime-only" => Some(Self::DateTimeOnly),
            "date-only" => Some(Self::DateOnly),
            "time-only" => Some(Self::TimeOnly),
            "file" => Some(Self::File),
            "union" => Some(Self::Union),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Nil => "nil",
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
            Self::DateTimeOnly => "datetime-only",
            Self::DateOnly => "date-only",
            Self::TimeOnly => "time-only",
            Self::File => "file",
            Self::Union => "union",
            Self::Json => "json",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Shape Kind
// =============================================================================

/// How an `Unknown` shape was declared
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    /// A type name that is not a built-in: evaluated by the type expression grammar
    Expression(String),
    /// `type: [A, B, ...]`; parents are in `BaseShape::inherits`
    Composite,
    /// `type: !include file`; the fragment is in `BaseShape::link`
    Link,
}

/// Raw declaration data kept until the shape is resolved
#[derive(Debug, Clone, PartialEq)]
pub struct Pending {
    pub declaration: Declaration,
    /// Facet entries in document order, not yet interpreted
    pub facets: Vec<(String, Node)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShapeKind {
    Any,
    Nil,
    Object(ObjectFacets),
    Array(ArrayFacets),
    String(StringFacets),
    Integer(NumberFacets),
    Number(NumberFacets),
    Boolean(BooleanFacets),
    DateTime(DateTimeFacets),
    DateTimeOnly,
    DateOnly,
    TimeOnly,
    File(FileFacets),
    Union(UnionFacets),
    Json(JsonFacets),
    Unknown(Pending),
}

impl ShapeKind {
    /// A kind with every facet absent. `Json` and `Unknown` have no empty form.
    pub fn empty(shape_type: ShapeType) -> Option<Self> {
        let kind = match shape_type {
            ShapeType::Any => Self::Any,
            ShapeType::Nil => Self::Nil,
            ShapeType::Object => Self::Object(ObjectFacets::default()),
            ShapeType::Array => Self::Array(ArrayFacets::default()),
            ShapeType::String => Self::String(StringFacets::default()),
            ShapeType::Integer => Self::Integer(NumberFacets::default()),
            ShapeType::Number => Self::Number(NumberFacets::default()),
            ShapeType::Boolean => Self::Boolean(BooleanFacets::default()),
            ShapeType::DateTime => Self::DateTime(DateTimeFacets::default()),
            ShapeType::DateTimeOnly => Self::DateTimeOnly,
            ShapeType::DateOnly => Self::DateOnly,
            ShapeType::TimeOnly => Self::TimeOnly,
            ShapeType::File => Self::File(FileFacets::default()),
            ShapeType::Union => Self::Union(UnionFacets::default()),
            ShapeType::Json | ShapeType::Unknown => return None,
        };
        Some(kind)
    }

    /// Same kind, facets cleared. `Json` keeps its schema text.
    pub fn blank(&self) -> Self {
        match self {
            Self::Json(json) => Self::Json(json.clone()),
            Self::Unknown(pending) => Self::Unknown(pending.clone()),
            other => Self::empty(other.shape_type()).unwrap_or(Self::Any),
        }
    }

    pub fn shape_type(&self) -> ShapeType {
        match self {
            Self::Any => ShapeType::Any,
            Self::Nil => ShapeType::Nil,
            Self::Object(_) => ShapeType::Object,
            Self::Array(_) => ShapeType::Array,
            Self::String(_) => ShapeType::String,
            Self::Integer(_) => ShapeType::Integer,
            Self::Number(_) => ShapeType::Number,
            Self::Boolean(_) => ShapeType::Boolean,
            Self::DateTime(_) => ShapeType::DateTime,
            Self::DateTimeOnly => ShapeType::DateTimeOnly,
            Self::DateOnly => ShapeType::DateOnly,
            Self::TimeOnly => ShapeType::TimeOnly,
            Self::File(_) => ShapeType::File,
            Self::Union(_) => ShapeType::Union,
            Self::Json(_) => ShapeType::Json,
            Self::Unknown(_) => ShapeType::Unknown,
        }
    }

    /// Serialized facet payload of this kind (nested shapes excluded)
    pub fn facets_json(&self) -> serde_json::Value {
        let value = match self {
            Self::Object(f) => serde_json::to_value(f),
            Self::Array(f) => serde_json::to_value(f),
            Self::String(f) => serde_json::to_value(f),
            Self::Integer(f) | Self::Number(f) => serde_json::to_value(f),
            Self::Boolean(f) => serde_json::to_value(f),
            Self::DateTime(f) => serde_json::to_value(f),
            Self::File(f) => serde_json::to_value(f),
            Self::Json(f) => serde_json::to_value(f),
            _ => Ok(serde_json::Value::Object(Default::default())),
        };
        value.unwrap_or_default()
    }
}

// =============================================================================
// Examples and Annotations
// =============================================================================

/// An `example` / `examples` entry
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    pub id: String,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub strict: Option<bool>,
    pub value: Option<Node>,
    /// Payload as JSON when it is a mapping or a sequence
    pub structured_value: Option<serde_json::Value>,
    pub mime: Option<String>,
    pub location: PathBuf,
    pub custom_domain_properties: IndexMap<String, DomainExtension>,
    /// Example read from an `!include`d file, shared with every includer
    pub link: Option<Rc<Example>>,
}

impl Example {
    pub fn new(id: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            name: None,
            display_name: None,
            description: None,
            strict: None,
            value: None,
            structured_value: None,
            mime: None,
            location: location.into(),
            custom_domain_properties: IndexMap::new(),
            link: None,
        }
    }

    /// The example payload, following an include link
    pub fn effective_value(&self) -> Option<&Node> {
        match (&self.value, &self.link) {
            (Some(value), _) => Some(value),
            (None, Some(link)) => link.effective_value(),
            (None, None) => None,
        }
    }
}

/// A `(name)` annotation applied to a shape, example or fragment
#[derive(Debug, Clone, PartialEq)]
pub struct DomainExtension {
    pub name: String,
    pub extension: Node,
    /// Matching entry of `annotationTypes`, bound after resolution
    pub defined_by: Option<ShapeId>,
    pub location: PathBuf,
    pub position: Position,
}

// =============================================================================
// Shape
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct BaseShape {
    /// Assigned by the arena on insertion
    pub id: ShapeId,
    pub name: String,
    pub location: PathBuf,
    pub position: Position,
    pub display_name: Option<String>,
    pub description: Option<String>,
    /// The raw `type` declaration, kept after resolution
    pub type_declaration: Option<String>,
    pub inherits: Vec<ShapeId>,
    pub default: Option<Node>,
    pub required: Option<bool>,
    pub examples: Vec<Example>,
    pub custom_shape_facets: IndexMap<String, Node>,
    pub custom_shape_facet_definitions: IndexMap<String, ShapeId>,
    pub custom_domain_properties: IndexMap<String, DomainExtension>,
    /// Normalized path of the included DataType fragment
    pub link: Option<PathBuf>,
}

impl BaseShape {
    pub fn new(name: impl Into<String>, location: impl Into<PathBuf>, position: Position) -> Self {
        Self {
            id: ShapeId::default(),
            name: name.into(),
            location: location.into(),
            position,
            display_name: None,
            description: None,
            type_declaration: None,
            inherits: Vec::new(),
            default: None,
            required: None,
            examples: Vec::new(),
            custom_shape_facets: IndexMap::new(),
            custom_shape_facet_definitions: IndexMap::new(),
            custom_domain_properties: IndexMap::new(),
            link: None,
        }
    }
}

/// One declared data shape
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub base: BaseShape,
    pub kind: ShapeKind,
}

impl Shape {
    pub fn new(base: BaseShape, kind: ShapeKind) -> Self {
        Self { base, kind }
    }

    pub fn id(&self) -> ShapeId {
        self.base.id
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn location(&self) -> &Path {
        &self.base.location
    }

    pub fn shape_type(&self) -> ShapeType {
        self.kind.shape_type()
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.kind, ShapeKind::Unknown(_))
    }

    /// Items of an array shape
    pub fn items(&self) -> Option<ShapeId> {
        match &self.kind {
            ShapeKind::Array(array) => array.items,
            _ => None,
        }
    }

    /// Properties of an object shape
    pub fn properties(&self) -> Option<&IndexMap<String, ShapeId>> {
        match &self.kind {
            ShapeKind::Object(object) => Some(&object.properties),
            _ => None,
        }
    }

    /// Members of a union shape
    pub fn any_of(&self) -> &[ShapeId] {
        match &self.kind {
            ShapeKind::Union(union) => &union.any_of,
            _ => &[],
        }
    }
}

// =============================================================================
// Shape Arena
// =============================================================================

/// Slot storage for every shape of a load
#[derive(Debug, Default)]
pub struct ShapeArena {
    slots: Vec<Shape>,
}

impl ShapeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a shape and assign its id
    pub fn alloc(&mut self, mut shape: Shape) -> ShapeId {
        let id = ShapeId(self.slots.len());
        shape.base.id = id;
        self.slots.push(shape);
        id
    }

    pub fn get(&self, id: ShapeId) -> &Shape {
        &self.slots[id.0]
    }

    pub fn get_mut(&mut self, id: ShapeId) -> &mut Shape {
        &mut self.slots[id.0]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ShapeId> {
        (0..self.slots.len()).map(ShapeId)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shape> {
        self.slots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(name: &str, kind: ShapeKind) -> Shape {
        Shape::new(BaseShape::new(name, "/tmp/a.raml", Position::default()), kind)
    }

    #[test]
    fn test_builtin_names_round_trip() {
        for name in [
            "any", "nil", "object", "array", "string", "integer", "number", "boolean",
            "datetime", "datetime-only", "date-only", "time-only", "file", "union",
        ] {
            let shape_type = ShapeType::from_builtin(name).unwrap();
            assert_eq!(shape_type.as_str(), name);
            assert_eq!(ShapeKind::empty(shape_type).unwrap().shape_type(), shape_type);
        }
        assert!(ShapeType::from_builtin("Person").is_none());
    }

    #[test]
    fn test_arena_assigns_ids() {
        let mut arena = ShapeArena::new();
        let a = arena.alloc(shape("A", ShapeKind::Any));
        let b = arena.alloc(shape("B", ShapeKind::Nil));
        assert_ne!(a, b);
        assert_eq!(arena.get(b).id(), b);
        assert_eq!(arena.get(a).name(), "A");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_slot_overwrite_is_seen_by_holders() {
        let mut arena = ShapeArena::new();
        let pending = ShapeKind::Unknown(Pending {
            declaration: Declaration::Expression("Foo".to_string()),
            facets: Vec::new(),
        });
        let b = arena.alloc(shape("B", pending));
        let a = arena.alloc(shape(
            "A",
            ShapeKind::Array(ArrayFacets {
                items: Some(b),
                ..Default::default()
            }),
        ));

        arena.get_mut(b).kind = ShapeKind::String(StringFacets::default());

        let items = arena.get(a).items().unwrap();
        assert_eq!(arena.get(items).shape_type(), ShapeType::String);
    }

    #[test]
    fn test_blank_clears_facets() {
        let kind = ShapeKind::String(StringFacets {
            min_length: Some(3),
            ..Default::default()
        });
        assert_eq!(kind.blank(), ShapeKind::String(StringFacets::default()));

        let json = ShapeKind::Json(JsonFacets {
            schema: "{}".to_string(),
        });
        assert_eq!(json.blank(), json);
    }
}
