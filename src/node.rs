//! Document Tree
//!
//! The loosely-typed node model the shape builder consumes. Every node is a
//! scalar (literal text plus a type tag), a sequence, or a mapping of ordered
//! key/value pairs, and may carry the `!include` tag.
//!
//! [`Node::parse_yaml`] builds the tree from `yaml-rust2` parser events, so
//! every node keeps the line and column where it starts. Plain scalars are
//! typed with the YAML 1.2 core schema; quoted scalars are always strings.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser, Tag};
use yaml_rust2::scanner::{Marker, TScalarStyle};
use yaml_rust2::ScanError;

/// Tag name marking a node as an include directive
pub const INCLUDE_TAG: &str = "include";

/// 1-based line/column inside a source file (`0:0` when unknown)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Literal type of a scalar node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarTag {
    String,
    Int,
    Float,
    Bool,
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Scalar { value: String, tag: ScalarTag },
    Sequence(Vec<Node>),
    Mapping(Vec<(Node, Node)>),
}

/// A single document tree node
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub position: Position,
    /// Set when the node was written as `!include <path>`
    pub include: bool,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            position: Position::default(),
            include: false,
        }
    }

    pub fn scalar(value: impl Into<String>, tag: ScalarTag) -> Self {
        Self::new(NodeKind::Scalar {
            value: value.into(),
            tag,
        })
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::scalar(value, ScalarTag::String)
    }

    pub fn null() -> Self {
        Self::scalar("", ScalarTag::Null)
    }

    pub fn sequence(items: Vec<Node>) -> Self {
        Self::new(NodeKind::Sequence(items))
    }

    pub fn mapping(pairs: Vec<(Node, Node)>) -> Self {
        Self::new(NodeKind::Mapping(pairs))
    }

    /// An `!include <path>` scalar
    pub fn include(path: impl Into<String>) -> Self {
        let mut node = Self::string(path);
        node.include = true;
        node
    }

    /// Attach a source position
    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.position = Position::new(line, column);
        self
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, NodeKind::Scalar { .. })
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self.kind, NodeKind::Sequence(_))
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self.kind, NodeKind::Mapping(_))
    }

    /// Scalar text regardless of its tag
    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Scalar { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn scalar_tag(&self) -> Option<ScalarTag> {
        match &self.kind {
            NodeKind::Scalar { tag, .. } => Some(*tag),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &self.kind {
            NodeKind::Scalar { value, tag: ScalarTag::Bool } => value.parse().ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match &self.kind {
            NodeKind::Scalar { value, tag: ScalarTag::Int } => value.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match &self.kind {
            NodeKind::Scalar { value, tag: ScalarTag::Int | ScalarTag::Float } => value.parse().ok(),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match &self.kind {
            NodeKind::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&[(Node, Node)]> {
        match &self.kind {
            NodeKind::Mapping(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Look up a mapping entry by its scalar key
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_mapping()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    /// Short description of the node kind, for error messages
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Scalar { tag: ScalarTag::String, .. } => "string",
            NodeKind::Scalar { tag: ScalarTag::Int, .. } => "integer",
            NodeKind::Scalar { tag: ScalarTag::Float, .. } => "number",
            NodeKind::Scalar { tag: ScalarTag::Bool, .. } => "boolean",
            NodeKind::Scalar { tag: ScalarTag::Null, .. } => "null",
            NodeKind::Sequence(_) => "sequence",
            NodeKind::Mapping(_) => "mapping",
        }
    }

    /// Convert to a JSON value (mapping keys use their scalar text)
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match &self.kind {
            NodeKind::Scalar { value, tag } => match tag {
                ScalarTag::Null => Json::Null,
                ScalarTag::Bool => value.parse().map(Json::Bool).unwrap_or(Json::Null),
                ScalarTag::Int => value
                    .parse::<i64>()
                    .map(Json::from)
                    .or_else(|_| value.parse::<u64>().map(Json::from))
                    .unwrap_or_else(|_| Json::String(value.clone())),
                ScalarTag::Float => value
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Json::Number)
                    .unwrap_or_else(|| Json::String(value.clone())),
                ScalarTag::String => Json::String(value.clone()),
            },
            NodeKind::Sequence(items) => Json::Array(items.iter().map(Node::to_json).collect()),
            NodeKind::Mapping(pairs) => Json::Object(
                pairs
                    .iter()
                    .map(|(k, v)| (k.as_str().unwrap_or_default().to_string(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Parse YAML text into a node tree. Only the first document is kept;
    /// an empty document is `null`.
    pub fn parse_yaml(text: &str) -> Result<Self, ScanError> {
        let mut tree = TreeBuilder::default();
        Parser::new_from_str(text).load(&mut tree, false)?;
        Ok(tree.root.unwrap_or_else(Self::null))
    }
}

// =============================================================================
// YAML events to nodes
// =============================================================================

/// Plain scalar typed with the YAML 1.2 core schema
fn plain_scalar(text: &str) -> (String, ScalarTag) {
    match text {
        "" | "~" | "null" | "Null" | "NULL" => return (String::new(), ScalarTag::Null),
        "true" | "True" | "TRUE" => return ("true".to_string(), ScalarTag::Bool),
        "false" | "False" | "FALSE" => return ("false".to_string(), ScalarTag::Bool),
        ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" => {
            return ("inf".to_string(), ScalarTag::Float)
        }
        "-.inf" | "-.Inf" | "-.INF" => return ("-inf".to_string(), ScalarTag::Float),
        ".nan" | ".NaN" | ".NAN" => return ("NaN".to_string(), ScalarTag::Float),
        _ => {}
    }

    let prefixed = [("0x", 16), ("0o", 8)]
        .into_iter()
        .find_map(|(prefix, radix)| text.strip_prefix(prefix).map(|digits| (digits, radix)));
    if let Some((digits, radix)) = prefixed {
        if let Ok(n) = u64::from_str_radix(digits, radix) {
            return (n.to_string(), ScalarTag::Int);
        }
        return (text.to_string(), ScalarTag::String);
    }

    let unsigned = text.strip_prefix(['-', '+']).unwrap_or(text);
    if !unsigned.is_empty() && unsigned.bytes().all(|b| b.is_ascii_digit()) {
        let normalized = text.strip_prefix('+').unwrap_or(text);
        return (normalized.to_string(), ScalarTag::Int);
    }

    let numeric = unsigned.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && unsigned.bytes().any(|b| b.is_ascii_digit())
        && unsigned
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if numeric && text.parse::<f64>().is_ok() {
        return (text.to_string(), ScalarTag::Float);
    }
    (text.to_string(), ScalarTag::String)
}

fn is_include(tag: &Option<Tag>) -> bool {
    tag.as_ref()
        .map(|tag| tag.suffix == INCLUDE_TAG && !tag.handle.starts_with("tag:"))
        .unwrap_or(false)
}

enum Collection {
    Sequence(Vec<Node>),
    Mapping(Vec<(Node, Node)>, Option<Node>),
}

struct Frame {
    collection: Collection,
    position: Position,
    include: bool,
    anchor: usize,
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Frame>,
    anchors: HashMap<usize, Node>,
    root: Option<Node>,
}

impl TreeBuilder {
    fn open(&mut self, collection: Collection, mark: Marker, anchor: usize, tag: &Option<Tag>) {
        self.stack.push(Frame {
            collection,
            position: position_of(mark),
            include: is_include(tag),
            anchor,
        });
    }

    fn close(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let kind = match frame.collection {
            Collection::Sequence(items) => NodeKind::Sequence(items),
            Collection::Mapping(pairs, _) => NodeKind::Mapping(pairs),
        };
        let node = Node {
            kind,
            position: frame.position,
            include: frame.include,
        };
        self.finish(node, frame.anchor);
    }

    fn finish(&mut self, node: Node, anchor: usize) {
        if anchor > 0 {
            self.anchors.insert(anchor, node.clone());
        }
        match self.stack.last_mut() {
            Some(Frame {
                collection: Collection::Sequence(items),
                ..
            }) => items.push(node),
            Some(Frame {
                collection: Collection::Mapping(pairs, key),
                ..
            }) => match key.take() {
                Some(key) => pairs.push((key, node)),
                None => *key = Some(node),
            },
            None => {
                if self.root.is_none() {
                    self.root = Some(node);
                }
            }
        }
    }
}

/// yaml-rust2 lines are 1-based and columns 0-based
fn position_of(mark: Marker) -> Position {
    Position::new(mark.line(), mark.col() + 1)
}

impl MarkedEventReceiver for TreeBuilder {
    fn on_event(&mut self, event: Event, mark: Marker) {
        match event {
            Event::Scalar(text, style, anchor, tag) => {
                let (value, scalar_tag) = match (style, &tag) {
                    (_, Some(tag)) if tag.suffix == "str" => (text, ScalarTag::String),
                    (TScalarStyle::Plain, _) => plain_scalar(&text),
                    _ => (text, ScalarTag::String),
                };
                let mut node = Node::scalar(value, scalar_tag);
                node.position = position_of(mark);
                node.include = is_include(&tag);
                self.finish(node, anchor);
            }
            Event::SequenceStart(anchor, tag) => {
                self.open(Collection::Sequence(Vec::new()), mark, anchor, &tag)
            }
            Event::MappingStart(anchor, tag) => {
                self.open(Collection::Mapping(Vec::new(), None), mark, anchor, &tag)
            }
            Event::SequenceEnd | Event::MappingEnd => self.close(),
            Event::Alias(anchor) => {
                let node = self.anchors.get(&anchor).cloned().unwrap_or_else(Node::null);
                self.finish(node, 0);
            }
            _ => {}
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_keeps_order_and_tags() {
        let node = Node::parse_yaml(
            r#"
zeta: 1
alpha: !include other.raml
mid: [a, b]
"#,
        )
        .unwrap();

        let keys: Vec<_> = node
            .as_mapping()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_str().unwrap())
            .collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);

        let alpha = node.get("alpha").unwrap();
        assert!(alpha.include);
        assert_eq!(alpha.as_str(), Some("other.raml"));
        assert_eq!(node.get("zeta").unwrap().as_u64(), Some(1));
        assert!(node.get("mid").unwrap().is_sequence());
    }

    #[test]
    fn test_scalar_tags() {
        let node = Node::parse_yaml("a: true\nb: 1.5\nc: ~\nd: text").unwrap();
        assert_eq!(node.get("a").unwrap().as_bool(), Some(true));
        assert_eq!(node.get("b").unwrap().as_f64(), Some(1.5));
        assert_eq!(node.get("c").unwrap().scalar_tag(), Some(ScalarTag::Null));
        assert_eq!(node.get("d").unwrap().kind_name(), "string");
    }

    #[test]
    fn test_positions_are_one_based() {
        let node = Node::parse_yaml("#%RAML 1.0 Library\ntypes:\n  Name: string\n  Person:\n    type: object\n").unwrap();
        let types = node.get("types").unwrap();
        assert_eq!(types.get("Name").unwrap().position, Position::new(3, 9));
        assert_eq!(types.get("Person").unwrap().position.line, 5);
        assert_eq!(types.as_mapping().unwrap()[0].0.position, Position::new(3, 3));
    }

    #[test]
    fn test_core_schema_scalars() {
        let node = Node::parse_yaml("a: yes\nb: '12'\nc: 0x1F\nd: -7\ne: .inf\nf: 1e3\ng: True\nh:\n").unwrap();
        assert_eq!(node.get("a").unwrap().scalar_tag(), Some(ScalarTag::String));
        assert_eq!(node.get("b").unwrap().scalar_tag(), Some(ScalarTag::String));
        assert_eq!(node.get("c").unwrap().as_u64(), Some(31));
        assert_eq!(node.get("d").unwrap().as_f64(), Some(-7.0));
        assert_eq!(node.get("e").unwrap().as_f64(), Some(f64::INFINITY));
        assert_eq!(node.get("f").unwrap().as_f64(), Some(1000.0));
        assert_eq!(node.get("g").unwrap().as_bool(), Some(true));
        assert_eq!(node.get("h").unwrap().scalar_tag(), Some(ScalarTag::Null));
    }

    #[test]
    fn test_anchors_and_empty_documents() {
        let node = Node::parse_yaml("base: &b {x: 1}\ncopy: *b\n").unwrap();
        assert_eq!(node.get("copy").unwrap().to_json(), serde_json::json!({"x": 1}));
        assert_eq!(Node::parse_yaml("").unwrap().scalar_tag(), Some(ScalarTag::Null));
        assert!(Node::parse_yaml("a: [1, 2").is_err());
    }

    #[test]
    fn test_to_json() {
        let node = Node::parse_yaml("name: x\ncount: 3\ntags: [a]").unwrap();
        assert_eq!(
            node.to_json(),
            serde_json::json!({"name": "x", "count": 3, "tags": ["a"]})
        );
    }
}
