//! Per-kind facet payloads
//!
//! Each shape kind owns only its own facets. Nested shapes (`items`,
//! `properties`, `anyOf`) are held as [`ShapeId`] handles into the registry
//! arena, so they are skipped when a facet payload is serialized on its own.

use indexmap::IndexMap;
use serde::Serialize;

use super::ShapeId;
use crate::node::Node;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StringFacets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Node>>,
}

/// Facets shared by `integer` and `number`; `multipleOf` is only accepted on `number`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberFacets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Node>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFacets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_types: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BooleanFacets {
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Node>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DateTimeFacets {
    /// `rfc3339` or `rfc2616`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayFacets {
    #[serde(skip)]
    pub items: Option<ShapeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_items: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectFacets {
    /// Declared properties in document order
    #[serde(skip)]
    pub properties: IndexMap<String, ShapeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_properties: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_properties: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discriminator_value: Option<Node>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnionFacets {
    #[serde(skip)]
    pub any_of: Vec<ShapeId>,
}

/// Embedded JSON Schema, kept opaque
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JsonFacets {
    pub schema: String,
}

// =============================================================================
// Facet Sniffing
// =============================================================================

pub const STRING_FACETS: &[&str] = &["minLength", "maxLength", "pattern", "enum"];
pub const INTEGER_FACETS: &[&str] = &["minimum", "maximum", "format"];
pub const NUMBER_FACETS: &[&str] = &["minimum", "maximum", "format", "multipleOf"];
pub const FILE_FACETS: &[&str] = &["fileTypes"];
pub const OBJECT_FACETS: &[&str] = &[
    "properties",
    "additionalProperties",
    "minProperties",
    "maxProperties",
    "discriminator",
    "discriminatorValue",
];
pub const ARRAY_FACETS: &[&str] = &["items", "minItems", "maxItems", "uniqueItems"];

/// Classify a declaration without `type` from its facet keys.
///
/// Keys are scanned in document order. String and integer matches keep
/// scanning (a later match overrides them); file, object and array matches
/// stop the scan. The numeric branch checks the integer set a second time,
/// so number-only facets such as `multipleOf` never select `number`.
#[allow(clippy::ifs_same_cond)]
pub fn sniff<'a>(keys: impl IntoIterator<Item = &'a str>) -> super::ShapeType {
    use super::ShapeType;

    let mut sniffed = ShapeType::String;
    for key in keys {
        if STRING_FACETS.contains(&key) {
            sniffed = ShapeType::String;
        } else if INTEGER_FACETS.contains(&key) {
            sniffed = ShapeType::Integer;
        } else if INTEGER_FACETS.contains(&key) {
            // never taken, number-only facets fall through to string
            sniffed = ShapeType::Number;
        } else if FILE_FACETS.contains(&key) {
            sniffed = ShapeType::File;
            break;
        } else if OBJECT_FACETS.contains(&key) {
            sniffed = ShapeType::Object;
            break;
        } else if ARRAY_FACETS.contains(&key) {
            sniffed = ShapeType::Array;
            break;
        }
    }
    sniffed
}

#[cfg(test)]
mod tests {
    use super::super::ShapeType;
    use super::*;

    #[test]
    fn test_sniff_defaults_to_string() {
        assert_eq!(sniff(Vec::<&str>::new()), ShapeType::String);
        assert_eq!(sniff(["unrelated"]), ShapeType::String);
    }

    #[test]
    fn test_sniff_string_and_integer_keep_scanning() {
        assert_eq!(sniff(["minLength", "minimum"]), ShapeType::Integer);
        assert_eq!(sniff(["minimum", "pattern"]), ShapeType::String);
    }

    #[test]
    fn test_sniff_stops_on_file_object_array() {
        assert_eq!(sniff(["fileTypes", "properties"]), ShapeType::File);
        assert_eq!(sniff(["properties", "items"]), ShapeType::Object);
        assert_eq!(sniff(["minItems", "minLength"]), ShapeType::Array);
        assert_eq!(sniff(["minLength", "items"]), ShapeType::Array);
    }

    #[test]
    fn test_sniff_never_selects_number() {
        assert_eq!(sniff(["multipleOf"]), ShapeType::String);
        assert_eq!(sniff(["multipleOf", "minimum"]), ShapeType::Integer);
        assert!(NUMBER_FACETS.contains(&"multipleOf"));
    }
}
