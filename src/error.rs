//! Error types for shape loading and resolution

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::node::Position;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, ShapeError>;

/// A file plus a line/column inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub path: PathBuf,
    pub position: Position,
}

impl SourceLocation {
    pub fn new(path: impl Into<PathBuf>, position: Position) -> Self {
        Self {
            path: path.into(),
            position,
        }
    }

    /// Location of a whole file, without a position inside it
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::new(path.as_ref(), Position::default())
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.position.is_known() {
            write!(f, "{}:{}", self.path.display(), self.position)
        } else {
            write!(f, "{}", self.path.display())
        }
    }
}

/// Shape loader errors
#[derive(Error, Debug)]
pub enum ShapeError {
    #[error("{location}: {message}")]
    Decode {
        location: SourceLocation,
        message: String,
    },

    #[error("{location}: invalid declaration of '{name}'")]
    ShapeDeclaration {
        name: String,
        location: SourceLocation,
        #[source]
        source: Box<ShapeError>,
    },

    #[error("{location}: invalid type expression '{expression}' at offset {offset}: {message}")]
    TypeExpressionSyntax {
        expression: String,
        offset: usize,
        message: String,
        location: SourceLocation,
    },

    #[error("{location}: type '{name}' is not defined")]
    ReferenceNotFound {
        name: String,
        location: SourceLocation,
    },

    #[error("{location}: library alias '{alias}' is not declared in uses")]
    LibraryNotFound {
        alias: String,
        location: SourceLocation,
    },

    #[error("{location}: type '{name}' depends on itself")]
    CyclicType {
        name: String,
        location: SourceLocation,
    },

    #[error("{location}: type '{name}' failed to resolve earlier in this load")]
    Unresolvable {
        name: String,
        location: SourceLocation,
    },

    #[error("{}: expected fragment header '{expected}', found '{found}'", .path.display())]
    FragmentHeaderMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error in {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: yaml_rust2::ScanError,
    },
}

impl ShapeError {
    pub fn decode(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::Decode {
            location,
            message: message.into(),
        }
    }

    /// The location this error points at, if it has one
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            Self::Decode { location, .. }
            | Self::ShapeDeclaration { location, .. }
            | Self::TypeExpressionSyntax { location, .. }
            | Self::ReferenceNotFound { location, .. }
            | Self::LibraryNotFound { location, .. }
            | Self::CyclicType { location, .. }
            | Self::Unresolvable { location, .. } => Some(location),
            Self::FragmentHeaderMismatch { .. } | Self::Io { .. } | Self::Yaml { .. } => None,
        }
    }

    /// Innermost error of a `ShapeDeclaration` chain
    pub fn root_cause(&self) -> &ShapeError {
        match self {
            Self::ShapeDeclaration { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Render the whole declaration chain, outermost first
    pub fn trace(&self) -> String {
        let mut lines = vec![self.to_string()];
        let mut current = self;
        while let Self::ShapeDeclaration { source, .. } = current {
            lines.push(format!("  caused by: {}", source));
            current = source.as_ref();
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        let located = SourceLocation::new("/tmp/lib.raml", Position::new(3, 5));
        assert_eq!(located.to_string(), "/tmp/lib.raml:3:5");
        assert_eq!(SourceLocation::file("/tmp/lib.raml").to_string(), "/tmp/lib.raml");
    }

    #[test]
    fn test_root_cause_unwraps_chain() {
        let inner = ShapeError::ReferenceNotFound {
            name: "Missing".to_string(),
            location: SourceLocation::file("/tmp/a.raml"),
        };
        let outer = ShapeError::ShapeDeclaration {
            name: "Outer".to_string(),
            location: SourceLocation::file("/tmp/a.raml"),
            source: Box::new(ShapeError::ShapeDeclaration {
                name: "inner".to_string(),
                location: SourceLocation::file("/tmp/a.raml"),
                source: Box::new(inner),
            }),
        };

        assert!(matches!(outer.root_cause(), ShapeError::ReferenceNotFound { .. }));
        assert_eq!(outer.trace().lines().count(), 3);
    }
}
