//! RAML Shapes
//!
//! Loads RAML 1.0 `Library` and `DataType` fragments into a typed shape
//! graph with cross-file type resolution.
//!
//! ## Features
//!
//! - **Shape Model**: one closed [`ShapeKind`] per built-in type, each carrying only its own facets
//! - **Compact Type Expressions**: `Person[]`, `string | nil`, `lib.Address?`, `(A | B)[]`
//! - **Two-Phase Loading**: fragments are decoded first, `Unknown` shapes are resolved afterwards
//! - **Fragment Registry**: each fragment is read and parsed once per load, `uses` cycles are safe
//! - **Cycle Detection**: `Foo: Foo` fails with [`ShapeError::CyclicType`] instead of recursing
//!
//! ## Architecture
//!
//! ```text
//! fragment text ──► node tree ──► ShapeBuilder ──► ShapeArena slots
//!                                      │                 ▲
//!                                      ▼                 │ overwrite in place
//!                              unresolved queue ──► resolver (type_expr)
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use raml_shapes::Registry;
//!
//! let mut registry = Registry::new();
//! registry.load("api/libraries/common.raml")?;
//! let person = registry.resolve_named("api/libraries/common.raml", "Person")?;
//! println!("{}", registry.get(person).shape_type());
//! # Ok::<(), raml_shapes::ShapeError>(())
//! ```

pub mod builder;
pub mod checksum;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fragment;
pub mod node;
pub mod registry;
pub mod resolver;
pub mod shape;
pub mod type_expr;
pub mod view;

pub use builder::ShapeBuilder;
pub use checksum::Checksum;
pub use config::{LoadSettings, LoaderConfig, LoggingConfig};
pub use diagnostics::{DiagnosticCode, DiagnosticItem, Diagnostics, Severity};
pub use error::{Result, ShapeError, SourceLocation};
pub use fragment::{DataType, Fragment, FragmentKind, Library};
pub use node::{Node, NodeKind, Position, ScalarTag};
pub use registry::{FileReader, FsReader, MemoryReader, Registry};
pub use shape::{BaseShape, Shape, ShapeArena, ShapeId, ShapeKind, ShapeType};
pub use type_expr::TypeExpr;
pub use view::ShapeView;
