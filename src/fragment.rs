//! RAML Fragments
//!
//! The two fragment kinds the loader understands, identified by the exact
//! first line of the file:
//!
//! | Header                 | Fragment     |
//! |------------------------|--------------|
//! | `#%RAML 1.0 Library`   | [`Library`]  |
//! | `#%RAML 1.0 DataType`  | [`DataType`] |
//!
//! A `.json` file loaded as a data type is read as a literal JSON schema and
//! has no header.
//!
//! Decoding happens here; caching and path handling live in the
//! [`Registry`](crate::registry::Registry).

use indexmap::IndexMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::builder::{annotation_name, ShapeBuilder};
use crate::checksum::Checksum;
use crate::error::{Result, ShapeError, SourceLocation};
use crate::node::{Node, ScalarTag};
use crate::registry::Registry;
use crate::shape::{BaseShape, DomainExtension, Example, JsonFacets, Shape, ShapeId, ShapeKind};

// =============================================================================
// Fragment Kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    Library,
    DataType,
}

impl FragmentKind {
    pub fn header(&self) -> &'static str {
        match self {
            Self::Library => "#%RAML 1.0 Library",
            Self::DataType => "#%RAML 1.0 DataType",
        }
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Library => write!(f, "Library"),
            Self::DataType => write!(f, "DataType"),
        }
    }
}

/// First line of `text`, without the line terminator or trailing blanks
pub fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default().trim_end()
}

pub fn detect_kind(text: &str) -> Option<FragmentKind> {
    let header = first_line(text);
    [FragmentKind::Library, FragmentKind::DataType]
        .into_iter()
        .find(|kind| kind.header() == header)
}

pub fn check_header(path: &Path, text: &str, kind: FragmentKind) -> Result<()> {
    let found = first_line(text);
    if found == kind.header() {
        Ok(())
    } else {
        Err(ShapeError::FragmentHeaderMismatch {
            path: path.to_path_buf(),
            expected: kind.header().to_string(),
            found: found.to_string(),
        })
    }
}

// =============================================================================
// Fragments
// =============================================================================

/// `#%RAML 1.0 Library`
#[derive(Debug)]
pub struct Library {
    pub location: PathBuf,
    pub usage: Option<String>,
    pub types: IndexMap<String, ShapeId>,
    pub annotation_types: IndexMap<String, ShapeId>,
    /// Alias → normalized library path
    pub uses: IndexMap<String, PathBuf>,
    pub custom_domain_properties: IndexMap<String, DomainExtension>,
    pub checksum: Checksum,
}

/// `#%RAML 1.0 DataType`, or a `.json` schema file
#[derive(Debug)]
pub struct DataType {
    pub location: PathBuf,
    pub usage: Option<String>,
    pub uses: IndexMap<String, PathBuf>,
    pub shape: ShapeId,
    pub checksum: Checksum,
}

/// A cached fragment. Clones share the same fragment value.
#[derive(Debug, Clone)]
pub enum Fragment {
    Library(Rc<Library>),
    DataType(Rc<DataType>),
}

impl Fragment {
    pub fn location(&self) -> &Path {
        match self {
            Self::Library(library) => &library.location,
            Self::DataType(data_type) => &data_type.location,
        }
    }

    pub fn kind(&self) -> FragmentKind {
        match self {
            Self::Library(_) => FragmentKind::Library,
            Self::DataType(_) => FragmentKind::DataType,
        }
    }

    pub fn uses(&self) -> &IndexMap<String, PathBuf> {
        match self {
            Self::Library(library) => &library.uses,
            Self::DataType(data_type) => &data_type.uses,
        }
    }

    pub fn checksum(&self) -> &Checksum {
        match self {
            Self::Library(library) => &library.checksum,
            Self::DataType(data_type) => &data_type.checksum,
        }
    }

    pub fn as_library(&self) -> Option<&Rc<Library>> {
        match self {
            Self::Library(library) => Some(library),
            Self::DataType(_) => None,
        }
    }

    pub fn as_data_type(&self) -> Option<&Rc<DataType>> {
        match self {
            Self::DataType(data_type) => Some(data_type),
            Self::Library(_) => None,
        }
    }

    /// Whether both handles point at the same cached fragment
    pub fn ptr_eq(&self, other: &Fragment) -> bool {
        match (self, other) {
            (Self::Library(a), Self::Library(b)) => Rc::ptr_eq(a, b),
            (Self::DataType(a), Self::DataType(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// =============================================================================
// Decoding
// =============================================================================

pub(crate) fn decode_library(registry: &mut Registry, path: &Path, text: &str) -> Result<Library> {
    let body = parse_body(path, text)?;
    let mut library = Library {
        location: path.to_path_buf(),
        usage: None,
        types: IndexMap::new(),
        annotation_types: IndexMap::new(),
        uses: IndexMap::new(),
        custom_domain_properties: IndexMap::new(),
        checksum: Checksum::of_text(text),
    };

    // `uses` first: declarations may reference aliased libraries
    if let Some(uses) = body.get("uses") {
        library.uses = decode_uses(registry, path, uses)?;
    }

    for (key, value) in named_entries(path, &body, "library body")? {
        if let Some(annotation) = annotation_name(key) {
            let extension = ShapeBuilder::new(registry, path).domain_extension(annotation, value)?;
            library
                .custom_domain_properties
                .insert(extension.name.clone(), extension);
            continue;
        }
        match key {
            "uses" => {}
            "usage" => library.usage = Some(text_value(path, key, value)?),
            "types" | "schemas" => {
                for (name, declaration) in named_entries(path, value, key)? {
                    let id = ShapeBuilder::new(registry, path).build(name, declaration)?;
                    registry.declare_type(path, name, id);
                    library.types.insert(name.to_string(), id);
                }
            }
            "annotationTypes" => {
                for (name, declaration) in named_entries(path, value, key)? {
                    let id = ShapeBuilder::new(registry, path).build(name, declaration)?;
                    registry.declare_annotation_type(path, name, id);
                    library.annotation_types.insert(name.to_string(), id);
                }
            }
            other => {
                warn!(path = %path.display(), section = other, "skipping library section");
                registry
                    .diagnostics
                    .ignored_section(path.display().to_string(), other);
            }
        }
    }

    for extension in library.custom_domain_properties.values_mut() {
        registry.bind_extension(path, extension)?;
    }

    debug!(
        path = %path.display(),
        types = library.types.len(),
        annotation_types = library.annotation_types.len(),
        uses = library.uses.len(),
        "decoded library"
    );
    Ok(library)
}

pub(crate) fn decode_data_type(registry: &mut Registry, path: &Path, text: &str) -> Result<DataType> {
    let body = parse_body(path, text)?;
    let mut uses = IndexMap::new();
    let mut usage = None;

    if let Some(node) = body.get("uses") {
        uses = decode_uses(registry, path, node)?;
    }

    let mut declaration = Vec::new();
    for (key_node, value) in body.as_mapping().unwrap_or_default() {
        match key_node.as_str() {
            Some("uses") => {}
            Some("usage") => usage = Some(text_value(path, "usage", value)?),
            _ => declaration.push((key_node.clone(), value.clone())),
        }
    }

    let name = shape_name(path);
    let mut node = Node::mapping(declaration);
    node.position = body.position;
    let shape = ShapeBuilder::new(registry, path).build(&name, &node)?;

    Ok(DataType {
        location: path.to_path_buf(),
        usage,
        uses,
        shape,
        checksum: Checksum::of_text(text),
    })
}

/// `.json` shorthand: the whole file is a JSON schema
pub(crate) fn decode_json_data_type(registry: &mut Registry, path: &Path, text: &str) -> Result<DataType> {
    serde_json::from_str::<serde_json::Value>(text).map_err(|e| {
        ShapeError::decode(SourceLocation::file(path), format!("invalid JSON schema: {}", e))
    })?;

    let name = shape_name(path);
    let kind = ShapeKind::Json(JsonFacets {
        schema: text.to_string(),
    });
    let shape = registry.alloc(Shape::new(BaseShape::new(name, path, Default::default()), kind));

    Ok(DataType {
        location: path.to_path_buf(),
        usage: None,
        uses: IndexMap::new(),
        shape,
        checksum: Checksum::of_text(text),
    })
}

/// An `!include`d example payload
pub(crate) fn decode_example_file(path: &Path, text: &str) -> Result<Example> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let (mime, structured) = match extension.as_str() {
        "json" => ("application/json", true),
        "yaml" | "yml" | "raml" => ("application/yaml", true),
        "xml" => ("application/xml", false),
        _ => ("text/plain", false),
    };

    let mut example = Example::new(path.display().to_string(), path);
    example.mime = Some(mime.to_string());

    let value = if structured {
        Node::parse_yaml(text).map_err(|source| ShapeError::Yaml {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        Node::string(text)
    };
    if value.is_mapping() || value.is_sequence() {
        example.structured_value = Some(value.to_json());
    }
    example.value = Some(value);
    Ok(example)
}

fn decode_uses(registry: &mut Registry, path: &Path, node: &Node) -> Result<IndexMap<String, PathBuf>> {
    let mut uses = IndexMap::new();
    for (alias, target) in named_entries(path, node, "uses")? {
        let target = text_value(path, alias, target)?;
        let library = registry.resolve_relative(path, &target);
        if registry.is_loading(&library) {
            debug!(alias, library = %library.display(), "library already loading");
        } else {
            registry.load_library(&library)?;
        }
        registry.declare_uses(path, alias, library.clone());
        uses.insert(alias.to_string(), library);
    }
    Ok(uses)
}

// =============================================================================
// Helpers
// =============================================================================

/// Fragment body after the header line. An empty body is an empty mapping.
fn parse_body(path: &Path, text: &str) -> Result<Node> {
    let node = Node::parse_yaml(text).map_err(|source| ShapeError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    match node.scalar_tag() {
        Some(ScalarTag::Null) => Ok(Node::mapping(Vec::new())),
        _ => Ok(node),
    }
}

/// Entries of a mapping with scalar keys; `~` reads as no entries
fn named_entries<'n>(path: &Path, node: &'n Node, what: &str) -> Result<Vec<(&'n str, &'n Node)>> {
    if node.scalar_tag() == Some(ScalarTag::Null) {
        return Ok(Vec::new());
    }
    let pairs = node.as_mapping().ok_or_else(|| {
        ShapeError::decode(
            SourceLocation::new(path, node.position),
            format!("{} must be a mapping, found {}", what, node.kind_name()),
        )
    })?;
    pairs
        .iter()
        .map(|(key, value)| {
            key.as_str().map(|k| (k, value)).ok_or_else(|| {
                ShapeError::decode(
                    SourceLocation::new(path, key.position),
                    format!("{} keys must be scalars", what),
                )
            })
        })
        .collect()
}

fn text_value(path: &Path, key: &str, node: &Node) -> Result<String> {
    match node.scalar_tag() {
        Some(ScalarTag::Null) | None => Err(ShapeError::decode(
            SourceLocation::new(path, node.position),
            format!("'{}' must be a scalar, found {}", key, node.kind_name()),
        )),
        Some(_) => Ok(node.as_str().unwrap_or_default().to_string()),
    }
}

/// Data type fragments name their shape after the file stem
fn shape_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
