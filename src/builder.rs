//! Shape Builder
//!
//! Turns a document node into a [`Shape`] stored in the registry arena.
//!
//! A declaration is walked once. Known keys (`type`, `displayName`,
//! `description`, `required`, `default`, `facets`, `example(s)`, `(annotation)`)
//! land on the [`BaseShape`]; every other key is kept as a raw facet pair whose
//! meaning depends on the kind the declaration ends up with:
//!
//! - built-in kinds decode their own facets right away, leftovers become
//!   custom shape facets
//! - declarations whose type is a name, a `[A, B]` list or an `!include`
//!   become `Unknown` shapes that keep the raw pairs for the resolver

use indexmap::IndexMap;
use regex::Regex;
use std::path::Path;

use tracing::trace;

use crate::error::{Result, ShapeError, SourceLocation};
use crate::node::{Node, NodeKind, ScalarTag};
use crate::registry::Registry;
use crate::shape::facets::{self, NumberFacets, StringFacets};
use crate::shape::{
    BaseShape, Declaration, DomainExtension, Example, JsonFacets, Pending, Shape, ShapeId,
    ShapeKind, ShapeType,
};

/// `(name)` → `Some("name")`
pub(crate) fn annotation_name(key: &str) -> Option<&str> {
    key.strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .map(str::trim)
}

/// Outcome of reading a `type` declaration
enum Classified {
    /// No usable type text: classify from facet keys
    Sniff,
    Concrete(ShapeKind),
    Json(String),
    Pending(Declaration),
}

/// Builds shapes declared in one source file
pub struct ShapeBuilder<'a> {
    registry: &'a mut Registry,
    location: &'a Path,
}

impl<'a> ShapeBuilder<'a> {
    pub fn new(registry: &'a mut Registry, location: &'a Path) -> Self {
        Self { registry, location }
    }

    /// Decode `node` as a shape named `name`
    pub fn build(&mut self, name: &str, node: &Node) -> Result<ShapeId> {
        self.decode(name, node)
            .map_err(|source| ShapeError::ShapeDeclaration {
                name: name.to_string(),
                location: self.locate(node),
                source: Box::new(source),
            })
    }

    fn decode(&mut self, name: &str, node: &Node) -> Result<ShapeId> {
        let mut base = BaseShape::new(name, self.location, node.position);
        let mut raw: Vec<(String, Node)> = Vec::new();
        let mut type_node: Option<&Node> = None;

        match &node.kind {
            // `foo: string`, `foo: [A, B]`, `foo: !include bar.raml`
            NodeKind::Scalar { .. } | NodeKind::Sequence(_) => type_node = Some(node),
            NodeKind::Mapping(pairs) => {
                for (key_node, value) in pairs {
                    let key = self.key(key_node)?;
                    if let Some(annotation) = annotation_name(key) {
                        let extension = self.domain_extension(annotation, value)?;
                        base.custom_domain_properties
                            .insert(extension.name.clone(), extension);
                        continue;
                    }
                    match key {
                        "type" | "schema" => type_node = Some(value),
                        "displayName" => base.display_name = Some(self.string(key, value)?),
                        "description" => base.description = Some(self.string(key, value)?),
                        "required" => base.required = Some(self.boolean(key, value)?),
                        "default" => base.default = Some(value.clone()),
                        "facets" => {
                            for (facet, definition) in self.entries(key, value)? {
                                let id = self.build(facet, definition)?;
                                base.custom_shape_facet_definitions
                                    .insert(facet.to_string(), id);
                            }
                        }
                        "example" => {
                            let example = self.example(name, None, value)?;
                            base.examples.push(example);
                        }
                        "examples" => {
                            for (example_name, example) in self.entries(key, value)? {
                                let example = self.example(name, Some(example_name), example)?;
                                base.examples.push(example);
                            }
                        }
                        "allowedTargets" => trace!(shape = name, "allowedTargets is not interpreted"),
                        _ => raw.push((key.to_string(), value.clone())),
                    }
                }
            }
        }

        let classified = match type_node {
            Some(declared) => self.classify(declared, &mut base)?,
            None => Classified::Sniff,
        };

        let kind = match classified {
            Classified::Sniff => {
                let sniffed = facets::sniff(raw.iter().map(|(key, _)| key.as_str()));
                let mut kind = ShapeKind::empty(sniffed)
                    .unwrap_or_else(|| ShapeKind::String(StringFacets::default()));
                let leftovers = self.apply_facets(name, &mut kind, raw)?;
                base.custom_shape_facets.extend(leftovers);
                kind
            }
            Classified::Concrete(mut kind) => {
                let leftovers = self.apply_facets(name, &mut kind, raw)?;
                base.custom_shape_facets.extend(leftovers);
                kind
            }
            Classified::Json(schema) => {
                base.custom_shape_facets.extend(raw);
                ShapeKind::Json(JsonFacets { schema })
            }
            Classified::Pending(declaration) => ShapeKind::Unknown(Pending {
                declaration,
                facets: raw,
            }),
        };

        trace!(shape = name, kind = %kind.shape_type(), "decoded shape");
        Ok(self.registry.alloc(Shape::new(base, kind)))
    }

    fn classify(&mut self, declared: &Node, base: &mut BaseShape) -> Result<Classified> {
        match &declared.kind {
            NodeKind::Scalar { value, .. } if declared.include => {
                let target = self.registry.resolve_relative(self.location, value);
                if !self.registry.is_loading(&target) {
                    self.registry.load_data_type(&target)?;
                }
                base.type_declaration = Some(value.clone());
                base.link = Some(target);
                Ok(Classified::Pending(Declaration::Link))
            }
            NodeKind::Scalar {
                value,
                tag: ScalarTag::String | ScalarTag::Null,
            } => {
                let text = value.trim();
                if text.is_empty() {
                    return Ok(Classified::Sniff);
                }
                base.type_declaration = Some(text.to_string());
                if text.starts_with('{') {
                    return Ok(Classified::Json(value.clone()));
                }
                match ShapeType::from_builtin(text).and_then(ShapeKind::empty) {
                    Some(kind) => Ok(Classified::Concrete(kind)),
                    None => Ok(Classified::Pending(Declaration::Expression(text.to_string()))),
                }
            }
            NodeKind::Sequence(items) => {
                if items.is_empty() {
                    return Err(self.error(declared, "multiple inheritance needs at least one parent"));
                }
                let mut names = Vec::with_capacity(items.len());
                for item in items {
                    let parent_name = match &item.kind {
                        NodeKind::Scalar { value, tag: ScalarTag::String } => value.clone(),
                        _ => {
                            return Err(self.error(
                                item,
                                format!("parent types must be type names, found {}", item.kind_name()),
                            ))
                        }
                    };
                    let parent = self.build(&parent_name, item)?;
                    base.inherits.push(parent);
                    names.push(parent_name);
                }
                base.type_declaration = Some(format!("[{}]", names.join(", ")));
                Ok(Classified::Pending(Declaration::Composite))
            }
            _ => Err(self.error(
                declared,
                format!(
                    "type must be a type name or a list of type names, found {}",
                    declared.kind_name()
                ),
            )),
        }
    }

    // -------------------------------------------------------------------------
    // Facets
    // -------------------------------------------------------------------------

    /// Apply raw facet pairs to `kind`; returns the pairs the kind does not own
    pub(crate) fn apply_facets(
        &mut self,
        owner: &str,
        kind: &mut ShapeKind,
        raw: Vec<(String, Node)>,
    ) -> Result<IndexMap<String, Node>> {
        let mut leftovers = IndexMap::new();
        for (key, value) in raw {
            if !self.apply_facet(owner, kind, &key, &value)? {
                trace!(shape = owner, facet = %key, "custom facet");
                leftovers.insert(key, value);
            }
        }
        Ok(leftovers)
    }

    fn apply_facet(&mut self, owner: &str, kind: &mut ShapeKind, key: &str, value: &Node) -> Result<bool> {
        match kind {
            ShapeKind::String(f) => match key {
                "minLength" => f.min_length = Some(self.unsigned(key, value)?),
                "maxLength" => f.max_length = Some(self.unsigned(key, value)?),
                "pattern" => f.pattern = Some(self.pattern(owner, value)?),
                "enum" => f.enum_values = Some(self.sequence(key, value)?.to_vec()),
                _ => return Ok(false),
            },
            ShapeKind::Integer(f) => return self.number_facet(f, key, value, false),
            ShapeKind::Number(f) => return self.number_facet(f, key, value, true),
            ShapeKind::File(f) => match key {
                "minLength" => f.min_length = Some(self.unsigned(key, value)?),
                "maxLength" => f.max_length = Some(self.unsigned(key, value)?),
                "fileTypes" => f.file_types = self.strings(key, value)?,
                _ => return Ok(false),
            },
            ShapeKind::Boolean(f) => match key {
                "enum" => f.enum_values = Some(self.sequence(key, value)?.to_vec()),
                _ => return Ok(false),
            },
            ShapeKind::DateTime(f) => match key {
                "format" => f.format = Some(self.string(key, value)?),
                _ => return Ok(false),
            },
            ShapeKind::Array(f) => match key {
                "items" => f.items = Some(self.build(owner, value)?),
                "minItems" => f.min_items = Some(self.unsigned(key, value)?),
                "maxItems" => f.max_items = Some(self.unsigned(key, value)?),
                "uniqueItems" => f.unique_items = Some(self.boolean(key, value)?),
                _ => return Ok(false),
            },
            ShapeKind::Object(f) => match key {
                "properties" => {
                    for (declared, property) in self.entries(key, value)? {
                        let (property_name, optional) = match declared.strip_suffix('?') {
                            Some(stripped) => (stripped, true),
                            None => (declared, false),
                        };
                        let id = self.build(property_name, property)?;
                        if optional {
                            let base = &mut self.registry.shapes.get_mut(id).base;
                            base.required.get_or_insert(false);
                        }
                        f.properties.insert(property_name.to_string(), id);
                    }
                }
                "additionalProperties" => f.additional_properties = Some(self.boolean(key, value)?),
                "minProperties" => f.min_properties = Some(self.unsigned(key, value)?),
                "maxProperties" => f.max_properties = Some(self.unsigned(key, value)?),
                "discriminator" => f.discriminator = Some(self.string(key, value)?),
                "discriminatorValue" => f.discriminator_value = Some(value.clone()),
                _ => return Ok(false),
            },
            ShapeKind::Union(f) => match key {
                "anyOf" => {
                    for member in self.sequence(key, value)? {
                        f.any_of.push(self.build(owner, member)?);
                    }
                }
                _ => return Ok(false),
            },
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn number_facet(&self, f: &mut NumberFacets, key: &str, value: &Node, number: bool) -> Result<bool> {
        match key {
            "minimum" => f.minimum = Some(self.float(key, value)?),
            "maximum" => f.maximum = Some(self.float(key, value)?),
            "multipleOf" if number => f.multiple_of = Some(self.float(key, value)?),
            "format" => f.format = Some(self.string(key, value)?),
            "enum" => f.enum_values = Some(self.sequence(key, value)?.to_vec()),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn pattern(&mut self, owner: &str, value: &Node) -> Result<String> {
        let pattern = self.string("pattern", value)?;
        if let Err(e) = Regex::new(&pattern) {
            let subject = format!("{}#{}", self.location.display(), owner);
            self.registry
                .diagnostics
                .unsupported_pattern(subject, &pattern, &e.to_string());
        }
        Ok(pattern)
    }

    // -------------------------------------------------------------------------
    // Examples and annotations
    // -------------------------------------------------------------------------

    fn example(&mut self, owner: &str, name: Option<&str>, node: &Node) -> Result<Example> {
        let id = format!(
            "{}#{}/examples/{}",
            self.location.display(),
            owner,
            name.unwrap_or("example")
        );
        let mut example = Example::new(id, self.location);
        example.name = name.map(str::to_string);

        if node.include {
            let target = node
                .as_str()
                .ok_or_else(|| self.error(node, "!include must name a file"))?;
            let path = self.registry.resolve_relative(self.location, target);
            let linked = self.registry.load_example(&path)?;
            example.mime = linked.mime.clone();
            example.link = Some(linked);
            return Ok(example);
        }

        let mut payload = node;
        if let (Some(pairs), Some(value)) = (node.as_mapping(), node.get("value")) {
            payload = value;
            for (key_node, entry) in pairs {
                let key = self.key(key_node)?;
                if let Some(annotation) = annotation_name(key) {
                    let extension = self.domain_extension(annotation, entry)?;
                    example
                        .custom_domain_properties
                        .insert(extension.name.clone(), extension);
                    continue;
                }
                match key {
                    "displayName" => example.display_name = Some(self.string(key, entry)?),
                    "description" => example.description = Some(self.string(key, entry)?),
                    "strict" => example.strict = Some(self.boolean(key, entry)?),
                    _ => {}
                }
            }
        }

        if payload.is_mapping() || payload.is_sequence() {
            example.structured_value = Some(payload.to_json());
        }
        example.value = Some(payload.clone());
        Ok(example)
    }

    pub(crate) fn domain_extension(&self, name: &str, node: &Node) -> Result<DomainExtension> {
        if name.is_empty() {
            return Err(self.error(node, "annotation name must not be empty"));
        }
        Ok(DomainExtension {
            name: name.to_string(),
            extension: node.clone(),
            defined_by: None,
            location: self.location.to_path_buf(),
            position: node.position,
        })
    }

    // -------------------------------------------------------------------------
    // Scalar helpers
    // -------------------------------------------------------------------------

    fn locate(&self, node: &Node) -> SourceLocation {
        SourceLocation::new(self.location, node.position)
    }

    fn error(&self, node: &Node, message: impl Into<String>) -> ShapeError {
        ShapeError::decode(self.locate(node), message)
    }

    fn key<'n>(&self, node: &'n Node) -> Result<&'n str> {
        node.as_str()
            .ok_or_else(|| self.error(node, format!("mapping keys must be scalars, found {}", node.kind_name())))
    }

    fn string(&self, key: &str, node: &Node) -> Result<String> {
        match node.scalar_tag() {
            Some(ScalarTag::Null) | None => Err(self.error(
                node,
                format!("'{}' must be a scalar, found {}", key, node.kind_name()),
            )),
            Some(_) => Ok(node.as_str().unwrap_or_default().to_string()),
        }
    }

    fn boolean(&self, key: &str, node: &Node) -> Result<bool> {
        node.as_bool().ok_or_else(|| {
            self.error(node, format!("'{}' must be a boolean, found {}", key, node.kind_name()))
        })
    }

    fn unsigned(&self, key: &str, node: &Node) -> Result<u64> {
        node.as_u64().ok_or_else(|| {
            self.error(
                node,
                format!("'{}' must be a non-negative integer, found {}", key, node.kind_name()),
            )
        })
    }

    fn float(&self, key: &str, node: &Node) -> Result<f64> {
        node.as_f64().ok_or_else(|| {
            self.error(node, format!("'{}' must be a number, found {}", key, node.kind_name()))
        })
    }

    fn sequence<'n>(&self, key: &str, node: &'n Node) -> Result<&'n [Node]> {
        node.as_sequence().ok_or_else(|| {
            self.error(node, format!("'{}' must be a sequence, found {}", key, node.kind_name()))
        })
    }

    /// A single string or a sequence of strings
    fn strings(&self, key: &str, node: &Node) -> Result<Vec<String>> {
        match node.as_sequence() {
            Some(items) => items.iter().map(|item| self.string(key, item)).collect(),
            None => Ok(vec![self.string(key, node)?]),
        }
    }

    /// Named entries of a mapping; `~` counts as an empty mapping
    fn entries<'n>(&self, key: &str, node: &'n Node) -> Result<Vec<(&'n str, &'n Node)>> {
        if node.scalar_tag() == Some(ScalarTag::Null) {
            return Ok(Vec::new());
        }
        let pairs = node.as_mapping().ok_or_else(|| {
            self.error(
                node,
                format!("'{}' must be a mapping of named entries, found {}", key, node.kind_name()),
            )
        })?;
        pairs
            .iter()
            .map(|(name, value)| Ok((self.key(name)?, value)))
            .collect()
    }
}
