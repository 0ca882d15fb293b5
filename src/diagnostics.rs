//! Diagnostics
//!
//! Collects non-fatal findings during parsing and resolution. Fatal problems
//! are [`ShapeError`](crate::error::ShapeError)s; everything recorded here
//! lets the load continue.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// Multiple inheritance parents resolve to different kinds
    DivergentParentKinds,
    /// `pattern` facet cannot be compiled by the regex engine
    UnsupportedPattern,
    /// Library section outside the data type model (traits, resourceTypes, ...)
    IgnoredSection,
    /// Annotation with no matching `annotationTypes` entry
    UnboundAnnotation,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DivergentParentKinds => "W001",
            Self::UnsupportedPattern => "W002",
            Self::IgnoredSection => "I001",
            Self::UnboundAnnotation => "I002",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::DivergentParentKinds | Self::UnsupportedPattern => Severity::Warning,
            Self::IgnoredSection | Self::UnboundAnnotation => Severity::Info,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

// =============================================================================
// Diagnostic Item
// =============================================================================

/// A single diagnostic item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticItem {
    /// What the finding is about (`path` or `path#Name`)
    pub subject: String,
    pub code: DiagnosticCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl DiagnosticItem {
    pub fn new(subject: impl Into<String>, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for DiagnosticItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.code,
            self.code.severity(),
            self.message,
            self.subject
        )?;

        for ctx in &self.context {
            write!(f, "\n  - {}", ctx)?;
        }

        Ok(())
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<DiagnosticItem>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: DiagnosticItem) {
        self.items.push(item);
    }

    /// Composite shape whose parents disagree on their kind
    pub fn divergent_parents(&mut self, subject: impl Into<String>, kinds: &[(String, String)]) {
        let mut item = DiagnosticItem::new(
            subject,
            DiagnosticCode::DivergentParentKinds,
            "parents resolve to different kinds; the first parent's kind is used",
        );
        for (parent, kind) in kinds {
            item = item.with_context(format!("{}: {}", parent, kind));
        }
        self.push(item);
    }

    pub fn unsupported_pattern(&mut self, subject: impl Into<String>, pattern: &str, reason: &str) {
        self.push(
            DiagnosticItem::new(
                subject,
                DiagnosticCode::UnsupportedPattern,
                format!("pattern '{}' cannot be compiled", pattern),
            )
            .with_context(reason.to_string()),
        );
    }

    pub fn ignored_section(&mut self, subject: impl Into<String>, section: &str) {
        self.push(DiagnosticItem::new(
            subject,
            DiagnosticCode::IgnoredSection,
            format!("section '{}' is not part of the data type model", section),
        ));
    }

    pub fn unbound_annotation(&mut self, subject: impl Into<String>, annotation: &str) {
        self.push(DiagnosticItem::new(
            subject,
            DiagnosticCode::UnboundAnnotation,
            format!("annotation '({})' has no annotation type", annotation),
        ));
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Warning)
    }

    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(move |i| i.code == code)
    }

    pub fn all(&self) -> &[DiagnosticItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn format_all(&self) -> String {
        let mut output = String::new();

        for item in &self.items {
            output.push_str(&format!("{}\n", item));
        }

        if !self.is_empty() {
            output.push_str(&format!(
                "\n{} warning(s), {} note(s)\n",
                self.warning_count(),
                self.len() - self.warning_count()
            ));
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_all())
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a DiagnosticItem;
    type IntoIter = std::slice::Iter<'a, DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_severity() {
        assert_eq!(DiagnosticCode::DivergentParentKinds.severity(), Severity::Warning);
        assert_eq!(DiagnosticCode::IgnoredSection.severity(), Severity::Info);
    }

    #[test]
    fn test_diagnostics_collection() {
        let mut diags = Diagnostics::new();
        diags.divergent_parents(
            "lib.raml#Both",
            &[("A".to_string(), "object".to_string()), ("B".to_string(), "string".to_string())],
        );
        diags.ignored_section("lib.raml", "traits");

        assert_eq!(diags.len(), 2);
        assert_eq!(diags.warning_count(), 1);
        assert_eq!(diags.with_code(DiagnosticCode::IgnoredSection).count(), 1);
        assert!(diags.to_string().contains("W001"));
    }
}
