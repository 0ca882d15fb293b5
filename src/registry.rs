//! Fragment Registry
//!
//! Load-scoped context threaded through parsing and resolution:
//!
//! - the fragment cache (normalized path → Library | DataType), write-once
//! - the named shapes each fragment declares (`types` and `annotationTypes`)
//! - the shape arena plus the unresolved queue and the resolved list
//!
//! One registry serves one load. Independent loads use independent
//! registries; nothing here is global.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::config::LoadSettings;
use crate::diagnostics::Diagnostics;
use crate::error::{Result, ShapeError};
use crate::fragment::{self, DataType, Fragment, FragmentKind, Library};
use crate::shape::{Example, Shape, ShapeArena, ShapeId};

// =============================================================================
// File Reader
// =============================================================================

/// Capability to read fragment sources
pub trait FileReader {
    fn read(&self, path: &Path) -> std::io::Result<String>;
}

/// Reads from the local file system
#[derive(Debug, Clone, Copy, Default)]
pub struct FsReader;

impl FileReader for FsReader {
    fn read(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// In-memory sources keyed by absolute path. Clones share the same files and
/// read counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    files: Rc<RefCell<HashMap<PathBuf, String>>>,
    reads: Rc<RefCell<HashMap<PathBuf, usize>>>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.borrow_mut().insert(path.into(), content.into());
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with_file(self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    /// How many times `path` has been read
    pub fn read_count(&self, path: impl AsRef<Path>) -> usize {
        self.reads.borrow().get(path.as_ref()).copied().unwrap_or(0)
    }
}

impl FileReader for MemoryReader {
    fn read(&self, path: &Path) -> std::io::Result<String> {
        *self.reads.borrow_mut().entry(path.to_path_buf()).or_insert(0) += 1;
        self.files.borrow().get(path).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )
        })
    }
}

/// Lexically normalize a path: drop `.` and fold `..` into its parent
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

// =============================================================================
// Registry
// =============================================================================

/// Load context: fragment cache, shape arena and resolution worklists
pub struct Registry {
    reader: Box<dyn FileReader>,
    settings: LoadSettings,
    pub(crate) shapes: ShapeArena,
    fragments: HashMap<PathBuf, Fragment>,
    shapes_by_fragment: HashMap<PathBuf, IndexMap<String, ShapeId>>,
    annotations_by_fragment: HashMap<PathBuf, IndexMap<String, ShapeId>>,
    uses_by_fragment: HashMap<PathBuf, IndexMap<String, PathBuf>>,
    /// Fragments whose parse is on the call stack
    loading: HashSet<PathBuf>,
    examples: HashMap<PathBuf, Rc<Example>>,
    pub(crate) unresolved: VecDeque<ShapeId>,
    pub(crate) resolved: Vec<ShapeId>,
    /// Shapes whose resolution is on the call stack
    pub(crate) in_progress: HashSet<ShapeId>,
    /// Shapes that failed to resolve or belong to a failed load
    pub(crate) failed: HashSet<ShapeId>,
    /// Arena prefix whose annotations are bound
    pub(crate) annotations_bound: usize,
    pub(crate) diagnostics: Diagnostics,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Registry reading from the file system with default settings
    pub fn new() -> Self {
        Self::with_reader(FsReader)
    }

    pub fn with_reader(reader: impl FileReader + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            settings: LoadSettings::default(),
            shapes: ShapeArena::new(),
            fragments: HashMap::new(),
            shapes_by_fragment: HashMap::new(),
            annotations_by_fragment: HashMap::new(),
            uses_by_fragment: HashMap::new(),
            loading: HashSet::new(),
            examples: HashMap::new(),
            unresolved: VecDeque::new(),
            resolved: Vec::new(),
            in_progress: HashSet::new(),
            failed: HashSet::new(),
            annotations_bound: 0,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn with_settings(mut self, settings: LoadSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &LoadSettings {
        &self.settings
    }

    // -------------------------------------------------------------------------
    // Paths and I/O
    // -------------------------------------------------------------------------

    /// Absolute, lexically normalized form of `path`. Relative paths are
    /// taken against the configured root.
    pub fn normalize(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            normalize_path(path)
        } else {
            normalize_path(&self.settings.root_dir().join(path))
        }
    }

    /// Resolve `target` against the directory of the fragment at `from`
    pub fn resolve_relative(&self, from: &Path, target: &str) -> PathBuf {
        let base = from.parent().unwrap_or_else(|| Path::new("/"));
        self.normalize(base.join(target.trim()))
    }

    pub(crate) fn read(&self, path: &Path) -> Result<String> {
        debug!(path = %path.display(), "reading fragment source");
        self.reader.read(path).map_err(|source| ShapeError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    // -------------------------------------------------------------------------
    // Fragment cache
    // -------------------------------------------------------------------------

    pub fn fragment(&self, path: impl AsRef<Path>) -> Option<&Fragment> {
        self.fragments.get(&self.normalize(path))
    }

    pub fn fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.values()
    }

    /// Store a fragment unless its path is already cached; returns the cached one
    pub(crate) fn put_fragment(&mut self, fragment: Fragment) -> Fragment {
        self.fragments
            .entry(fragment.location().to_path_buf())
            .or_insert(fragment)
            .clone()
    }

    pub(crate) fn is_loading(&self, path: &Path) -> bool {
        self.loading.contains(path)
    }

    pub(crate) fn declare_type(&mut self, fragment: &Path, name: &str, id: ShapeId) {
        self.shapes_by_fragment
            .entry(fragment.to_path_buf())
            .or_default()
            .insert(name.to_string(), id);
    }

    pub(crate) fn declare_annotation_type(&mut self, fragment: &Path, name: &str, id: ShapeId) {
        self.declare_type(fragment, name, id);
        self.annotations_by_fragment
            .entry(fragment.to_path_buf())
            .or_default()
            .insert(name.to_string(), id);
    }

    pub(crate) fn declare_uses(&mut self, fragment: &Path, alias: &str, library: PathBuf) {
        self.uses_by_fragment
            .entry(fragment.to_path_buf())
            .or_default()
            .insert(alias.to_string(), library);
    }

    /// `uses` aliases declared by a fragment
    pub fn uses_of(&self, fragment: &Path) -> Option<&IndexMap<String, PathBuf>> {
        self.uses_by_fragment.get(fragment)
    }

    /// Named shapes declared by a fragment (`types` and `annotationTypes`)
    pub fn shapes_in(&self, fragment: impl AsRef<Path>) -> Option<&IndexMap<String, ShapeId>> {
        self.shapes_by_fragment.get(&self.normalize(fragment))
    }

    pub(crate) fn annotation_types_in(&self, fragment: &Path) -> Option<&IndexMap<String, ShapeId>> {
        self.annotations_by_fragment.get(fragment)
    }

    /// Look up a shape by fragment path and declared name. A DataType
    /// fragment answers with its single shape when the name matches.
    pub fn shape(&self, fragment: impl AsRef<Path>, name: &str) -> Option<ShapeId> {
        let path = self.normalize(fragment);
        if let Some(id) = self.shapes_by_fragment.get(&path).and_then(|m| m.get(name)) {
            return Some(*id);
        }
        match self.fragments.get(&path) {
            Some(Fragment::DataType(data_type)) if self.get(data_type.shape).name() == name => {
                Some(data_type.shape)
            }
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Shapes
    // -------------------------------------------------------------------------

    pub fn get(&self, id: ShapeId) -> &Shape {
        self.shapes.get(id)
    }

    pub fn arena(&self) -> &ShapeArena {
        &self.shapes
    }

    /// Store a shape; unknown shapes join the unresolved queue
    pub(crate) fn alloc(&mut self, shape: Shape) -> ShapeId {
        let unknown = shape.is_unknown();
        let id = self.shapes.alloc(shape);
        if unknown {
            self.unresolved.push_back(id);
        }
        id
    }

    /// Shapes still waiting in the unresolved queue
    pub fn unresolved(&self) -> impl Iterator<Item = ShapeId> + '_ {
        self.unresolved.iter().copied()
    }

    /// Shapes resolved so far, in resolution order
    pub fn resolved(&self) -> &[ShapeId] {
        &self.resolved
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    // -------------------------------------------------------------------------
    // Loading
    // -------------------------------------------------------------------------

    /// Parse a fragment of either kind and, when eager resolution is
    /// enabled, resolve everything still queued. A failed load leaves the
    /// registry usable for other, independent fragments.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<Fragment> {
        let eager = self.settings.eager_resolution;
        let fragment = self.rollback_on_error(|registry| {
            let fragment = registry.parse_fragment(path.as_ref())?;
            if eager {
                registry.resolve_all()?;
            }
            Ok(fragment)
        })?;
        info!(
            path = %fragment.location().display(),
            shapes = self.shapes.len(),
            resolved = self.resolved.len(),
            "loaded fragment"
        );
        Ok(fragment)
    }

    /// Parse a fragment of either kind without resolving, picking the kind
    /// from its header line (or the `.json` shorthand)
    pub fn parse(&mut self, path: impl AsRef<Path>) -> Result<Fragment> {
        self.rollback_on_error(|registry| registry.parse_fragment(path.as_ref()))
    }

    /// Run `op`; if it fails, every shape allocated meanwhile is marked
    /// failed and dropped from the queues, and every fragment first seen
    /// meanwhile is forgotten so a later load reads it again
    fn rollback_on_error<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let mark = self.shapes.len();
        let known: HashSet<PathBuf> = self.fragments.keys().cloned().collect();
        let result = op(self);
        if result.is_err() {
            let discarded = self.shapes.len() - mark;
            self.failed.extend(self.shapes.ids().skip(mark));
            self.unresolved.retain(|id| id.index() < mark);
            self.resolved.retain(|id| id.index() < mark);
            self.fragments.retain(|path, _| known.contains(path));
            self.shapes_by_fragment.retain(|path, _| known.contains(path));
            self.annotations_by_fragment.retain(|path, _| known.contains(path));
            self.uses_by_fragment.retain(|path, _| known.contains(path));
            warn!(discarded, "load failed, discarded its shapes");
        }
        result
    }

    fn parse_fragment(&mut self, path: &Path) -> Result<Fragment> {
        let path = self.normalize(path);
        if let Some(fragment) = self.fragments.get(&path) {
            debug!(path = %path.display(), "fragment cache hit");
            return Ok(fragment.clone());
        }
        if self.is_json_shorthand(&path) {
            return self.load_data_type(&path).map(Fragment::DataType);
        }
        let text = self.read(&path)?;
        match fragment::detect_kind(&text) {
            Some(FragmentKind::Library) => self.parse_library(path, text).map(Fragment::Library),
            Some(FragmentKind::DataType) => self.parse_data_type(path, text).map(Fragment::DataType),
            None => Err(ShapeError::FragmentHeaderMismatch {
                path,
                expected: format!(
                    "{} | {}",
                    FragmentKind::Library.header(),
                    FragmentKind::DataType.header()
                ),
                found: fragment::first_line(&text).to_string(),
            }),
        }
    }

    /// Parse (or fetch from cache) a Library fragment
    pub fn load_library(&mut self, path: impl AsRef<Path>) -> Result<Rc<Library>> {
        let path = self.normalize(path);
        if let Some(fragment) = self.fragments.get(&path) {
            debug!(path = %path.display(), "library cache hit");
            return match fragment {
                Fragment::Library(library) => Ok(library.clone()),
                other => Err(kind_mismatch(&path, FragmentKind::Library, other.kind())),
            };
        }
        let text = self.read(&path)?;
        self.parse_library(path, text)
    }

    /// Parse (or fetch from cache) a DataType fragment
    pub fn load_data_type(&mut self, path: impl AsRef<Path>) -> Result<Rc<DataType>> {
        let path = self.normalize(path);
        if let Some(fragment) = self.fragments.get(&path) {
            debug!(path = %path.display(), "data type cache hit");
            return match fragment {
                Fragment::DataType(data_type) => Ok(data_type.clone()),
                other => Err(kind_mismatch(&path, FragmentKind::DataType, other.kind())),
            };
        }
        let text = self.read(&path)?;
        self.parse_data_type(path, text)
    }

    fn parse_library(&mut self, path: PathBuf, text: String) -> Result<Rc<Library>> {
        fragment::check_header(&path, &text, FragmentKind::Library)?;
        debug!(path = %path.display(), "parsing library");

        self.loading.insert(path.clone());
        let decoded = fragment::decode_library(self, &path, &text);
        self.loading.remove(&path);

        let fragment = self.put_fragment(Fragment::Library(Rc::new(decoded?)));
        match fragment {
            Fragment::Library(library) => Ok(library),
            other => Err(kind_mismatch(&path, FragmentKind::Library, other.kind())),
        }
    }

    fn parse_data_type(&mut self, path: PathBuf, text: String) -> Result<Rc<DataType>> {
        let json = self.is_json_shorthand(&path);
        if !json {
            fragment::check_header(&path, &text, FragmentKind::DataType)?;
        }
        debug!(path = %path.display(), json, "parsing data type");

        self.loading.insert(path.clone());
        let decoded = if json {
            fragment::decode_json_data_type(self, &path, &text)
        } else {
            fragment::decode_data_type(self, &path, &text)
        };
        self.loading.remove(&path);

        let fragment = self.put_fragment(Fragment::DataType(Rc::new(decoded?)));
        match fragment {
            Fragment::DataType(data_type) => Ok(data_type),
            other => Err(kind_mismatch(&path, FragmentKind::DataType, other.kind())),
        }
    }

    fn is_json_shorthand(&self, path: &Path) -> bool {
        self.settings.json_shorthand
            && path.extension().map(|ext| ext == "json").unwrap_or(false)
    }

    /// Read an included example file once per path
    pub(crate) fn load_example(&mut self, path: &Path) -> Result<Rc<Example>> {
        if let Some(example) = self.examples.get(path) {
            return Ok(example.clone());
        }
        let text = self.read(path)?;
        let example = Rc::new(fragment::decode_example_file(path, &text)?);
        self.examples.insert(path.to_path_buf(), example.clone());
        Ok(example)
    }
}

fn kind_mismatch(path: &Path, expected: FragmentKind, found: FragmentKind) -> ShapeError {
    ShapeError::FragmentHeaderMismatch {
        path: path.to_path_buf(),
        expected: expected.header().to_string(),
        found: found.header().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/a/b/../c/./d.raml")),
            PathBuf::from("/a/c/d.raml")
        );
    }

    #[test]
    fn test_relative_paths_share_cache_key() {
        let registry = Registry::with_reader(MemoryReader::new());
        let from = Path::new("/specs/types/person.raml");
        assert_eq!(
            registry.resolve_relative(from, "../libs/common.raml"),
            registry.resolve_relative(Path::new("/specs/api.raml"), "./libs/common.raml")
        );
    }

    #[test]
    fn test_memory_reader_counts_reads() {
        let reader = MemoryReader::new().with_file("/x.raml", "#%RAML 1.0 Library\n");
        assert!(reader.read(Path::new("/x.raml")).is_ok());
        assert!(reader.read(Path::new("/missing.raml")).is_err());
        assert_eq!(reader.read_count("/x.raml"), 1);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let mut registry = Registry::with_reader(MemoryReader::new());
        let err = registry.load("/nowhere.raml").unwrap_err();
        assert!(matches!(err, ShapeError::Io { .. }));
    }
}
