//! Serializable shape tree
//!
//! [`ShapeView`] expands a shape and everything it contains (`items`,
//! `properties`, `anyOf`) into a plain tree for JSON output. A shape already
//! being expanded higher up the tree is written as `{"$ref": id}`, so
//! recursive types render finitely.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;

use crate::node::Node;
use crate::registry::Registry;
use crate::shape::{Example, ShapeId, ShapeType};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeView {
    pub id: ShapeId,
    pub name: String,
    pub kind: ShapeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_declaration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Node>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inherits: Vec<ShapeId>,
    #[serde(skip_serializing_if = "is_empty_object")]
    pub facets: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ShapeNode>>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, ShapeNode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<ShapeNode>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub custom_facets: IndexMap<String, Node>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub annotations: IndexMap<String, Node>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<serde_json::Value>,
}

/// A nested shape: expanded, or a back-reference to an ancestor
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ShapeNode {
    Expanded(ShapeView),
    Reference {
        #[serde(rename = "$ref")]
        reference: ShapeId,
    },
}

fn is_empty_object(value: &serde_json::Value) -> bool {
    value.as_object().map(|o| o.is_empty()).unwrap_or(true)
}

impl ShapeView {
    pub fn render(registry: &Registry, id: ShapeId) -> Self {
        let mut ancestors = HashSet::new();
        Self::expand(registry, id, &mut ancestors)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    fn expand(registry: &Registry, id: ShapeId, ancestors: &mut HashSet<ShapeId>) -> Self {
        ancestors.insert(id);
        let shape = registry.get(id);
        let base = &shape.base;

        let items = shape
            .items()
            .map(|item| Box::new(Self::node(registry, item, ancestors)));
        let properties: IndexMap<String, ShapeNode> = shape
            .properties()
            .map(|properties| {
                properties
                    .iter()
                    .map(|(name, property)| (name.clone(), Self::node(registry, *property, ancestors)))
                    .collect()
            })
            .unwrap_or_default();
        let any_of: Vec<ShapeNode> = shape
            .any_of()
            .iter()
            .map(|member| Self::node(registry, *member, ancestors))
            .collect();

        let view = Self {
            id,
            name: base.name.clone(),
            kind: shape.shape_type(),
            type_declaration: base.type_declaration.clone(),
            display_name: base.display_name.clone(),
            description: base.description.clone(),
            required: base.required,
            default: base.default.clone(),
            inherits: base.inherits.clone(),
            facets: shape.kind.facets_json(),
            items,
            properties,
            any_of,
            custom_facets: base.custom_shape_facets.clone(),
            annotations: base
                .custom_domain_properties
                .iter()
                .map(|(name, extension)| (name.clone(), extension.extension.clone()))
                .collect(),
            examples: base.examples.iter().map(example_json).collect(),
        };
        ancestors.remove(&id);
        view
    }

    fn node(registry: &Registry, id: ShapeId, ancestors: &mut HashSet<ShapeId>) -> ShapeNode {
        if ancestors.contains(&id) {
            ShapeNode::Reference { reference: id }
        } else {
            ShapeNode::Expanded(Self::expand(registry, id, ancestors))
        }
    }
}

fn example_json(example: &Example) -> serde_json::Value {
    let mut out = serde_json::Map::new();
    if let Some(name) = &example.name {
        out.insert("name".to_string(), name.clone().into());
    }
    if let Some(mime) = &example.mime {
        out.insert("mime".to_string(), mime.clone().into());
    }
    let value = example
        .effective_value()
        .map(Node::to_json)
        .unwrap_or(serde_json::Value::Null);
    out.insert("value".to_string(), value);
    serde_json::Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryReader;

    #[test]
    fn test_recursive_shape_renders_reference() {
        let reader = MemoryReader::new().with_file(
            "/lib.raml",
            "#%RAML 1.0 Library\ntypes:\n  Node:\n    properties:\n      value: string\n      next: Node?\n",
        );
        let mut registry = Registry::with_reader(reader);
        registry.load("/lib.raml").unwrap();
        let node = registry.shape("/lib.raml", "Node").unwrap();

        let json = ShapeView::render(&registry, node).to_json();
        assert_eq!(json["kind"], "object");
        assert_eq!(json["properties"]["value"]["kind"], "string");
        let next = &json["properties"]["next"];
        assert_eq!(next["kind"], "union");
        assert_eq!(next["anyOf"][0]["$ref"], serde_json::json!(node));
        assert_eq!(next["anyOf"][1]["kind"], "nil");
    }

    #[test]
    fn test_facets_and_annotations_render() {
        let reader = MemoryReader::new().with_file(
            "/lib.raml",
            "#%RAML 1.0 Library\ntypes:\n  Code:\n    type: string\n    pattern: '^[A-Z]+$'\n    (internal): yes\n    example: ABC\n",
        );
        let mut registry = Registry::with_reader(reader);
        registry.load("/lib.raml").unwrap();
        let code = registry.shape("/lib.raml", "Code").unwrap();

        let json = ShapeView::render(&registry, code).to_json();
        assert_eq!(json["facets"]["pattern"], "^[A-Z]+$");
        assert_eq!(json["annotations"]["internal"], "yes");
        assert_eq!(json["examples"][0]["value"], "ABC");
        assert!(json.get("items").is_none());
    }
}
