//! Diagnostics collected while checking an index tree.
//!
//! Index trees built by this crate always satisfy their invariants. Trees
//! assembled from external input (a saved file, hand-written ranges) are
//! checked first and every problem is reported at once:
//!
//! - `inverted`: a range whose stop lies before its start
//! - `order`: ranges out of ascending order or overlapping
//! - `structure`: dangling or cyclic sub-level references, mixed depths
//! - `base-location`: a base location that is not the running prefix sum
//! - `compaction`: touching leaf ranges that could have been one range (warning)
//!
//! # Example
//!
//! ```
//! use zone_core::diagnostics::{Diagnostics, Severity};
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning_at_level("compaction", "range touches 1-2 and could be merged", 0, "3-4");
//! diag.add_error_at_level("order", "range follows 5-9 out of order or overlapping", 0, "7-8");
//!
//! assert_eq!(diag.warning_count(), 1);
//! assert_eq!(diag.error_count(), 1);
//! ```

use serde::Serialize;

/// Severity level for diagnostic issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Legal but suboptimal
    Warning,
    /// Violates an index invariant
    Error,
}

/// A single issue found in an index tree
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Category for grouping (e.g., "order", "structure", "base-location")
    pub category: String,
    pub message: String,
    /// Arena level the issue was found in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<usize>,
    /// Offending range, rendered in range grammar
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            level: None,
            entity: None,
        }
    }

    pub fn with_level(mut self, level: usize) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };

        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;

        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }
        if let Some(level) = self.level {
            write!(f, " in level {}", level)?;
        }

        Ok(())
    }
}

/// Collection of diagnostic issues
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Recording Methods
    // =========================================================================

    /// Records a legal but suboptimal range in `level`.
    pub fn add_warning_at_level(
        &mut self,
        category: &str,
        message: impl Into<String>,
        level: usize,
        entity: &str,
    ) {
        self.issues.push(
            DiagnosticIssue::new(Severity::Warning, category, message)
                .with_level(level)
                .with_entity(entity),
        );
    }

    /// Records a broken invariant for the range `entity` in `level`.
    pub fn add_error_at_level(
        &mut self,
        category: &str,
        message: impl Into<String>,
        level: usize,
        entity: &str,
    ) {
        self.issues.push(
            DiagnosticIssue::new(Severity::Error, category, message)
                .with_level(level)
                .with_entity(entity),
        );
    }

    // =========================================================================
    // Query Methods
    // =========================================================================

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Warning)
    }

    pub fn issues_by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }

    pub fn summary(&self) -> String {
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        match (self.warning_count(), self.error_count()) {
            (0, 0) => "No issues".to_string(),
            (w, 0) => format!("{} warning{}", w, plural(w)),
            (0, e) => format!("{} error{}", e, plural(e)),
            (w, e) => format!("{} warning{}, {} error{}", w, plural(w), e, plural(e)),
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}
