//! Resolution Engine
//!
//! Turns `Unknown` shapes into concrete ones. One idempotent operation,
//! [`Registry::resolve`], serves both lazy resolution (a shape is needed
//! while another one resolves) and the final sweep ([`Registry::resolve_all`]).
//!
//! Dispatch on how the shape was declared:
//!
//! 1. `!include` link: the linked DataType shape's kind and facets, local
//!    facets on top
//! 2. `[A, B, ...]`: every parent resolved, the first parent's kind, own
//!    facets only
//! 3. anything else: the compact type expression, evaluated against the
//!    declaring fragment's types and its `uses` aliases
//!
//! The result overwrites the shape's arena slot, so every holder of the
//! handle sees the resolved value. Types named inside a compound expression
//! (`Person[]`, `A | B`, `Foo?`) are aliased by handle and resolved right
//! after the slot is written, unless they are already on the resolution
//! stack; that is what makes `Tree: Tree[]` legal while `Foo: Foo` is a
//! cycle. A shape whose resolution fails is marked failed and stays that way.

use indexmap::IndexMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::builder::ShapeBuilder;
use crate::error::{Result, ShapeError, SourceLocation};
use crate::node::{Node, Position};
use crate::registry::Registry;
use crate::shape::{
    ArrayFacets, BaseShape, Declaration, DomainExtension, Pending, Shape, ShapeId, ShapeKind,
    UnionFacets,
};
use crate::type_expr::{self, TypeExpr};

/// Resolved payload for a slot
struct Resolution {
    kind: ShapeKind,
    inherits: Vec<ShapeId>,
    custom_facets: IndexMap<String, Node>,
    /// Types aliased inside the expression, resolved after the slot
    nested: Vec<ShapeId>,
}

/// Declaring context of the shape being resolved
struct Owner {
    name: String,
    location: PathBuf,
    position: Position,
}

impl Owner {
    fn locate(&self) -> SourceLocation {
        SourceLocation::new(&self.location, self.position)
    }
}

impl Registry {
    /// Resolve one shape in place. Shapes that are not `Unknown` are left
    /// untouched; a shape that failed before fails again.
    pub fn resolve(&mut self, id: ShapeId) -> Result<()> {
        let shape = self.shapes.get(id);
        let pending = match &shape.kind {
            ShapeKind::Unknown(pending) => pending.clone(),
            _ => return Ok(()),
        };
        let owner = Owner {
            name: shape.name().to_string(),
            location: shape.base.location.clone(),
            position: shape.base.position,
        };
        if self.failed.contains(&id) {
            return Err(ShapeError::Unresolvable {
                name: owner.name.clone(),
                location: owner.locate(),
            });
        }

        if !self.in_progress.insert(id) {
            return Err(ShapeError::CyclicType {
                name: owner.name.clone(),
                location: owner.locate(),
            });
        }
        debug!(shape = %owner.name, id = %id, "resolving shape");
        let result = self.resolve_pending(id, &owner, pending);
        self.in_progress.remove(&id);
        let resolution = match result {
            Ok(resolution) => resolution,
            Err(e) => {
                debug!(shape = %owner.name, id = %id, "shape failed to resolve");
                self.failed.insert(id);
                return Err(e);
            }
        };

        let slot = self.shapes.get_mut(id);
        slot.kind = resolution.kind;
        slot.base.inherits.extend(resolution.inherits);
        slot.base.custom_shape_facets.extend(resolution.custom_facets);
        self.resolved.push(id);
        debug!(shape = %owner.name, id = %id, kind = %self.shapes.get(id).shape_type(), "resolved shape");

        for target in resolution.nested {
            if !self.in_progress.contains(&target) {
                self.resolve(target)?;
            }
        }
        Ok(())
    }

    /// Drain the unresolved queue, then bind annotations to their types
    pub fn resolve_all(&mut self) -> Result<()> {
        while let Some(id) = self.unresolved.pop_front() {
            if !self.failed.contains(&id) {
                self.resolve(id)?;
            }
        }
        self.bind_annotations()
    }

    /// Look up `name` declared in `fragment` and resolve it
    pub fn resolve_named(&mut self, fragment: impl AsRef<Path>, name: &str) -> Result<ShapeId> {
        let path = self.normalize(fragment);
        let id = self
            .shape(&path, name)
            .ok_or_else(|| ShapeError::ReferenceNotFound {
                name: name.to_string(),
                location: SourceLocation::file(&path),
            })?;
        self.resolve(id)?;
        Ok(id)
    }

    fn resolve_pending(&mut self, id: ShapeId, owner: &Owner, pending: Pending) -> Result<Resolution> {
        match pending.declaration {
            Declaration::Link => self.resolve_link(id, owner, pending.facets),
            Declaration::Composite => self.resolve_composite(id, owner, pending.facets),
            Declaration::Expression(text) => {
                let expr = type_expr::parse(&text).map_err(|e| ShapeError::TypeExpressionSyntax {
                    expression: text.clone(),
                    offset: e.offset,
                    message: e.message,
                    location: owner.locate(),
                })?;
                self.evaluate_root(owner, &expr, pending.facets)
            }
        }
    }

    fn resolve_link(&mut self, id: ShapeId, owner: &Owner, facets: Vec<(String, Node)>) -> Result<Resolution> {
        let path = self.shapes.get(id).base.link.clone().ok_or_else(|| {
            ShapeError::decode(owner.locate(), "included type has no linked fragment")
        })?;
        let target = self.load_data_type(&path)?.shape;
        self.resolve(target)?;

        let mut kind = self.shapes.get(target).kind.clone();
        let custom_facets = self.overlay(owner, &mut kind, facets)?;
        Ok(Resolution {
            kind,
            inherits: vec![target],
            custom_facets,
            nested: Vec::new(),
        })
    }

    fn resolve_composite(&mut self, id: ShapeId, owner: &Owner, facets: Vec<(String, Node)>) -> Result<Resolution> {
        let parents = self.shapes.get(id).base.inherits.clone();
        for parent in &parents {
            self.resolve(*parent)?;
        }

        let kinds: Vec<(String, String)> = parents
            .iter()
            .map(|p| {
                let parent = self.shapes.get(*p);
                (parent.name().to_string(), parent.shape_type().to_string())
            })
            .collect();
        if kinds.windows(2).any(|pair| pair[0].1 != pair[1].1) {
            warn!(shape = %owner.name, "multiple inheritance parents have different kinds");
            let subject = format!("{}#{}", owner.location.display(), owner.name);
            self.diagnostics.divergent_parents(subject, &kinds);
        }

        let mut kind = match parents.first() {
            Some(first) => self.shapes.get(*first).kind.blank(),
            None => ShapeKind::Any,
        };
        let custom_facets = self.overlay(owner, &mut kind, facets)?;
        Ok(Resolution {
            kind,
            inherits: Vec::new(),
            custom_facets,
            nested: Vec::new(),
        })
    }

    // -------------------------------------------------------------------------
    // Type expression evaluation
    // -------------------------------------------------------------------------

    /// Evaluate the expression that declares the shape itself; its own
    /// facets refine the result
    fn evaluate_root(&mut self, owner: &Owner, expr: &TypeExpr, facets: Vec<(String, Node)>) -> Result<Resolution> {
        let mut inherits = Vec::new();
        let mut nested = Vec::new();
        let mut kind = self.evaluate_kind(owner, expr, &mut inherits, &mut nested)?;
        let custom_facets = self.overlay(owner, &mut kind, facets)?;
        Ok(Resolution {
            kind,
            inherits,
            custom_facets,
            nested,
        })
    }

    /// Kind of an expression. A bare reference refines the named type, which
    /// is resolved first and recorded in `inherits`.
    fn evaluate_kind(
        &mut self,
        owner: &Owner,
        expr: &TypeExpr,
        inherits: &mut Vec<ShapeId>,
        nested: &mut Vec<ShapeId>,
    ) -> Result<ShapeKind> {
        let kind = match expr {
            TypeExpr::Primitive(shape_type) => ShapeKind::empty(*shape_type).unwrap_or(ShapeKind::Any),
            TypeExpr::Array(inner) => ShapeKind::Array(ArrayFacets {
                items: Some(self.evaluate_nested(owner, inner, nested)?),
                ..Default::default()
            }),
            TypeExpr::Optional(inner) => {
                let value = self.evaluate_nested(owner, inner, nested)?;
                let nil = self.fresh(owner, ShapeKind::Nil);
                ShapeKind::Union(UnionFacets {
                    any_of: vec![value, nil],
                })
            }
            TypeExpr::Union(members) => {
                let mut any_of = Vec::with_capacity(members.len());
                for member in members {
                    any_of.push(self.evaluate_nested(owner, member, nested)?);
                }
                ShapeKind::Union(UnionFacets { any_of })
            }
            TypeExpr::Reference { library, name } => {
                let target = self.lookup(owner, library.as_deref(), name)?;
                self.resolve(target)?;
                inherits.push(target);
                self.shapes.get(target).kind.clone()
            }
        };
        Ok(kind)
    }

    /// Evaluate a sub-expression to a handle. References alias the declared
    /// shape and are queued in `nested`; everything else gets a fresh slot.
    fn evaluate_nested(&mut self, owner: &Owner, expr: &TypeExpr, nested: &mut Vec<ShapeId>) -> Result<ShapeId> {
        match expr {
            TypeExpr::Reference { library, name } => {
                let target = self.lookup(owner, library.as_deref(), name)?;
                nested.push(target);
                Ok(target)
            }
            other => {
                let kind = self.evaluate_kind(owner, other, &mut Vec::new(), nested)?;
                Ok(self.fresh(owner, kind))
            }
        }
    }

    fn fresh(&mut self, owner: &Owner, kind: ShapeKind) -> ShapeId {
        let base = BaseShape::new(owner.name.clone(), owner.location.clone(), owner.position);
        self.alloc(Shape::new(base, kind))
    }

    fn overlay(
        &mut self,
        owner: &Owner,
        kind: &mut ShapeKind,
        facets: Vec<(String, Node)>,
    ) -> Result<IndexMap<String, Node>> {
        if facets.is_empty() {
            return Ok(IndexMap::new());
        }
        let location = owner.location.clone();
        ShapeBuilder::new(self, &location).apply_facets(&owner.name, kind, facets)
    }

    /// Find a declared type: `name` in the owner's fragment, `alias.name` in
    /// a library the owner's fragment uses
    fn lookup(&self, owner: &Owner, library: Option<&str>, name: &str) -> Result<ShapeId> {
        let fragment = match library {
            None => Some(owner.location.clone()),
            Some(alias) => self
                .uses_of(&owner.location)
                .and_then(|uses| uses.get(alias))
                .cloned(),
        };
        fragment
            .and_then(|path| self.shape(&path, name))
            .ok_or_else(|| ShapeError::ReferenceNotFound {
                name: match library {
                    Some(alias) => format!("{}.{}", alias, name),
                    None => name.to_string(),
                },
                location: owner.locate(),
            })
    }

    // -------------------------------------------------------------------------
    // Annotations
    // -------------------------------------------------------------------------

    /// Bind `definedBy` of one annotation against the annotation types
    /// visible from `location`
    pub(crate) fn bind_extension(&mut self, location: &Path, extension: &mut DomainExtension) -> Result<()> {
        if extension.defined_by.is_some() {
            return Ok(());
        }
        let (library, name) = match extension.name.split_once('.') {
            Some((alias, name)) => {
                let library = self
                    .uses_of(location)
                    .and_then(|uses| uses.get(alias))
                    .cloned()
                    .ok_or_else(|| ShapeError::LibraryNotFound {
                        alias: alias.to_string(),
                        location: SourceLocation::new(&extension.location, extension.position),
                    })?;
                (library, name)
            }
            None => (location.to_path_buf(), extension.name.as_str()),
        };

        match self.annotation_types_in(&library).and_then(|types| types.get(name)) {
            Some(id) => extension.defined_by = Some(*id),
            None => {
                debug!(annotation = %extension.name, "annotation has no annotation type");
                let subject = location.display().to_string();
                self.diagnostics.unbound_annotation(subject, &extension.name);
            }
        }
        Ok(())
    }

    /// Bind annotations on every shape (and its examples) not bound yet
    fn bind_annotations(&mut self) -> Result<()> {
        let end = self.shapes.len();
        let pending: Vec<ShapeId> = self
            .shapes
            .ids()
            .skip(self.annotations_bound)
            .filter(|id| !self.failed.contains(id))
            .collect();
        for id in pending {
            let shape = self.shapes.get_mut(id);
            let location = shape.base.location.clone();
            let mut properties = std::mem::take(&mut shape.base.custom_domain_properties);
            let mut examples = std::mem::take(&mut shape.base.examples);

            let mut bound = Ok(());
            for extension in properties
                .values_mut()
                .chain(examples.iter_mut().flat_map(|e| e.custom_domain_properties.values_mut()))
            {
                bound = self.bind_extension(&location, extension);
                if bound.is_err() {
                    break;
                }
            }

            let shape = self.shapes.get_mut(id);
            shape.base.custom_domain_properties = properties;
            shape.base.examples = examples;
            bound?;
        }
        self.annotations_bound = end;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryReader;
    use crate::shape::ShapeType;

    fn registry_with(files: &[(&str, &str)]) -> Registry {
        let reader = MemoryReader::new();
        for (path, content) in files {
            reader.insert(*path, *content);
        }
        Registry::with_reader(reader)
    }

    fn library(types: &str) -> String {
        format!("#%RAML 1.0 Library\ntypes:\n{}", types)
    }

    #[test]
    fn test_reference_refines_target() {
        let mut registry = registry_with(&[(
            "/lib.raml",
            &library("  Name:\n    type: string\n    maxLength: 10\n  Short:\n    type: Name\n    minLength: 2\n"),
        )]);
        registry.load("/lib.raml").unwrap();

        let name = registry.shape("/lib.raml", "Name").unwrap();
        let short = registry.shape("/lib.raml", "Short").unwrap();
        match &registry.get(short).kind {
            ShapeKind::String(f) => {
                assert_eq!(f.max_length, Some(10));
                assert_eq!(f.min_length, Some(2));
            }
            other => panic!("Expected String, got {:?}", other),
        }
        assert_eq!(registry.get(short).base.inherits, vec![name]);
        assert_eq!(registry.get(short).base.type_declaration.as_deref(), Some("Name"));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut registry = registry_with(&[("/lib.raml", &library("  Tags: string[]\n"))]);
        registry.parse("/lib.raml").unwrap();
        let tags = registry.shape("/lib.raml", "Tags").unwrap();

        registry.resolve(tags).unwrap();
        let once = registry.get(tags).clone();
        let shapes = registry.arena().len();
        registry.resolve(tags).unwrap();
        assert_eq!(registry.get(tags), &once);
        assert_eq!(registry.arena().len(), shapes);
        assert_eq!(registry.resolved(), &[tags]);
    }

    #[test]
    fn test_optional_is_union_with_nil() {
        let mut registry = registry_with(&[("/lib.raml", &library("  Maybe: string?\n"))]);
        registry.load("/lib.raml").unwrap();
        let maybe = registry.shape("/lib.raml", "Maybe").unwrap();
        let members: Vec<_> = registry
            .get(maybe)
            .any_of()
            .iter()
            .map(|m| registry.get(*m).shape_type())
            .collect();
        assert_eq!(members, vec![ShapeType::String, ShapeType::Nil]);
    }

    #[test]
    fn test_nested_reference_aliases_declared_shape() {
        let mut registry = registry_with(&[(
            "/lib.raml",
            &library("  Person:\n    properties:\n      name: string\n  People: Person[]\n"),
        )]);
        registry.load("/lib.raml").unwrap();
        let person = registry.shape("/lib.raml", "Person").unwrap();
        let people = registry.shape("/lib.raml", "People").unwrap();
        assert_eq!(registry.get(people).items(), Some(person));
    }

    #[test]
    fn test_recursive_through_array_is_allowed() {
        let mut registry = registry_with(&[("/lib.raml", &library("  Tree: Tree[]\n"))]);
        registry.load("/lib.raml").unwrap();
        let tree = registry.shape("/lib.raml", "Tree").unwrap();
        assert_eq!(registry.get(tree).items(), Some(tree));
    }

    #[test]
    fn test_direct_cycle_is_reported() {
        let mut registry = registry_with(&[("/lib.raml", &library("  Foo: Foo\n"))]);
        let err = registry.load("/lib.raml").unwrap_err();
        assert!(matches!(err, ShapeError::CyclicType { .. }));
    }

    #[test]
    fn test_unknown_reference() {
        let mut registry = registry_with(&[("/lib.raml", &library("  Foo: Missing\n"))]);
        let err = registry.load("/lib.raml").unwrap_err();
        match err {
            ShapeError::ReferenceNotFound { name, .. } => assert_eq!(name, "Missing"),
            other => panic!("Expected ReferenceNotFound, got {:?}", other),
        }

        let mut registry = registry_with(&[("/lib.raml", &library("  Foo: nope.Bar\n"))]);
        let err = registry.load("/lib.raml").unwrap_err();
        assert!(matches!(err, ShapeError::ReferenceNotFound { .. }));

        // a misspelt primitive is an undefined type, not a syntax error
        let mut registry = registry_with(&[("/lib.raml", &library("  Foo: strng\n"))]);
        let err = registry.load("/lib.raml").unwrap_err();
        assert!(matches!(err, ShapeError::ReferenceNotFound { .. }));
    }

    #[test]
    fn test_syntax_error_keeps_expression() {
        let mut registry = registry_with(&[("/lib.raml", &library("  Foo: \"string |\"\n"))]);
        let err = registry.load("/lib.raml").unwrap_err();
        match err {
            ShapeError::TypeExpressionSyntax { expression, .. } => assert_eq!(expression, "string |"),
            other => panic!("Expected TypeExpressionSyntax, got {:?}", other),
        }
    }

    #[test]
    fn test_composite_uses_first_parent_kind() {
        let mut registry = registry_with(&[(
            "/lib.raml",
            &library(
                "  A:\n    properties:\n      a: string\n  B:\n    type: string\n    minLength: 3\n  Both:\n    type: [A, B]\n    maxProperties: 4\n",
            ),
        )]);
        registry.load("/lib.raml").unwrap();
        let both = registry.shape("/lib.raml", "Both").unwrap();
        match &registry.get(both).kind {
            ShapeKind::Object(f) => {
                assert!(f.properties.is_empty());
                assert_eq!(f.max_properties, Some(4));
            }
            other => panic!("Expected Object, got {:?}", other),
        }
        assert_eq!(registry.get(both).base.inherits.len(), 2);
        assert_eq!(registry.diagnostics().warning_count(), 1);
    }

    #[test]
    fn test_annotation_binding() {
        let mut registry = registry_with(&[(
            "/lib.raml",
            "#%RAML 1.0 Library\nannotationTypes:\n  deprecated: boolean\ntypes:\n  Old:\n    type: string\n    (deprecated): true\n    (unknown): 1\n",
        )]);
        registry.load("/lib.raml").unwrap();
        let old = registry.shape("/lib.raml", "Old").unwrap();
        let deprecated = registry.shape("/lib.raml", "deprecated").unwrap();
        let annotations = &registry.get(old).base.custom_domain_properties;
        assert_eq!(annotations["deprecated"].defined_by, Some(deprecated));
        assert_eq!(annotations["unknown"].defined_by, None);
        assert_eq!(registry.diagnostics().len(), 1);
    }

    #[test]
    fn test_annotation_with_unknown_alias() {
        let mut registry = registry_with(&[(
            "/lib.raml",
            "#%RAML 1.0 Library\ntypes:\n  Old:\n    type: string\n    (missing.flag): true\n",
        )]);
        let err = registry.load("/lib.raml").unwrap_err();
        assert!(matches!(err, ShapeError::LibraryNotFound { .. }));
    }
}
