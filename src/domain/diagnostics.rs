//! Core domain models for convention diagnostics and analysis results
//!
//! Architecture: Rich Domain Models - Diagnostics carry their descriptor, location and fix intents
//! - Descriptors are immutable facts registered once per rule set
//! - Diagnostics are produced per violation and never retained by the engine
//! - AnalysisReport acts as the aggregate root for a single analysis pass

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

/// Severity levels for convention diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Conventions that should be addressed but don't block builds
    Warning,
    /// Violations that fail the build
    Error,
}

impl Severity {
    /// Whether this severity level should cause the check to fail
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Rule category, mirrored in the code ranges (SS0xx, SS1xx, SS3xx, SS9xx)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Naming,
    Messaging,
    Rules,
    Analyzer,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Naming => "Naming",
            Self::Messaging => "Messaging",
            Self::Rules => "Rules",
            Self::Analyzer => "Analyzer",
        }
    }
}

/// Immutable description of a diagnostic a rule can emit.
///
/// Codes are append-only: once shipped, a code is never reused for a different check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticDescriptor {
    /// Stable short code, e.g. `SS001`
    pub id: &'static str,
    /// Short title
    pub title: &'static str,
    /// Message template with a single `{0}` placeholder
    pub message_format: &'static str,
    pub category: Category,
    /// Effective severity for this rule set
    pub severity: Severity,
    /// Longer description shown by `explain`
    pub description: &'static str,
}

impl DiagnosticDescriptor {
    /// Resolve the message template for the offending symbol
    pub fn format_message(&self, symbol_name: &str) -> String {
        self.message_format.replace("{0}", symbol_name)
    }

    /// Copy of this descriptor with a different effective severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

/// Source position of a declared symbol (1-indexed)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub file_path: PathBuf,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(file_path: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self { file_path: file_path.into(), line, column }
    }

    /// A location is only usable when it points at a real file position
    pub fn is_valid(&self) -> bool {
        self.line > 0 && self.column > 0 && !self.file_path.as_os_str().is_empty()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file_path.display(), self.line, self.column)
    }
}

/// Machine-readable rewrite suggestion attached to a diagnostic.
///
/// The rewrite itself belongs to the editor/host; the analyzer only tags intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FixIntent {
    /// Append the missing suffix to the type name and rename all references
    AppendSuffix { suffix: String },
    /// Drop the public setter from the property
    RemoveSetter,
    /// Keep the setter but make it private
    DemoteSetter,
    /// Create a new type deriving from the business-rule base for `command`,
    /// in the same namespace as the triggering type
    SynthesizeBusinessRule { command: String, namespace: Option<String> },
}

impl FixIntent {
    /// Title as shown in an editor's quick-fix menu
    pub fn title(&self) -> String {
        match self {
            Self::AppendSuffix { suffix } => format!("Append '{suffix}'"),
            Self::RemoveSetter => "Remove setter".to_string(),
            Self::DemoteSetter => "Make setter private".to_string(),
            Self::SynthesizeBusinessRule { .. } => "Create business rule".to_string(),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::AppendSuffix { .. } => "append_suffix",
            Self::RemoveSetter => "remove_setter",
            Self::DemoteSetter => "demote_setter",
            Self::SynthesizeBusinessRule { .. } => "synthesize_business_rule",
        }
    }
}

/// A convention violation reported for one symbol
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub descriptor: DiagnosticDescriptor,
    /// Resolved message
    pub message: String,
    pub location: Location,
    /// Name of the symbol the diagnostic is about
    pub symbol: String,
    pub fixes: Vec<FixIntent>,
}

impl Diagnostic {
    pub fn new(
        descriptor: DiagnosticDescriptor,
        symbol: impl Into<String>,
        message_argument: &str,
        location: Location,
    ) -> Self {
        Self {
            message: descriptor.format_message(message_argument),
            descriptor,
            location,
            symbol: symbol.into(),
            fixes: Vec::new(),
        }
    }

    pub fn with_fixes(mut self, fixes: Vec<FixIntent>) -> Self {
        self.fixes = fixes;
        self
    }

    pub fn code(&self) -> &'static str {
        self.descriptor.id
    }

    pub fn severity(&self) -> Severity {
        self.descriptor.severity
    }

    pub fn is_blocking(&self) -> bool {
        self.severity().is_blocking()
    }

    /// Format diagnostic for display
    pub fn format_display(&self) -> String {
        format!(
            "{} {} [{}] {}",
            self.location,
            self.code(),
            self.severity().as_str(),
            self.message
        )
    }

    /// Total order used to make reports independent of visitation order
    fn report_order(&self, other: &Self) -> Ordering {
        self.location
            .cmp(&other.location)
            .then_with(|| self.descriptor.id.cmp(other.descriptor.id))
            .then_with(|| self.message.cmp(&other.message))
    }
}

/// A rule evaluation that failed for one symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationFault {
    pub code: &'static str,
    pub symbol: String,
    pub message: String,
}

/// Count of diagnostics by severity level
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticCounts {
    pub error: usize,
    pub warning: usize,
}

impl DiagnosticCounts {
    pub fn total(&self) -> usize {
        self.error + self.warning
    }

    pub fn has_blocking(&self) -> bool {
        self.error > 0
    }

    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Error => self.error += 1,
            Severity::Warning => self.warning += 1,
        }
    }
}

/// Summary statistics for an analysis pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_files: usize,
    /// Declared (non-external) types visited
    pub total_types: usize,
    pub diagnostics_by_severity: DiagnosticCounts,
    pub execution_time_ms: u64,
    pub analyzed_at: DateTime<Utc>,
}

/// Complete result of one analysis pass
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub diagnostics: Vec<Diagnostic>,
    /// Rule evaluations that faulted; their diagnostics were suppressed
    pub faults: Vec<EvaluationFault>,
    pub summary: AnalysisSummary,
    pub config_fingerprint: Option<String>,
}

impl AnalysisReport {
    pub fn new() -> Self {
        Self {
            diagnostics: Vec::new(),
            faults: Vec::new(),
            summary: AnalysisSummary { analyzed_at: Utc::now(), ..Default::default() },
            config_fingerprint: None,
        }
    }

    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.summary.diagnostics_by_severity.add(diagnostic.severity());
        self.diagnostics.push(diagnostic);
    }

    pub fn add_fault(&mut self, fault: EvaluationFault) {
        self.faults.push(fault);
    }

    pub fn has_diagnostics(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    /// Whether the report contains blocking diagnostics (errors)
    pub fn has_errors(&self) -> bool {
        self.summary.diagnostics_by_severity.has_blocking()
    }

    pub fn diagnostics_with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.code() == code)
    }

    pub fn diagnostics_by_severity(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.severity() == severity)
    }

    pub fn set_files_analyzed(&mut self, count: usize) {
        self.summary.total_files = count;
    }

    pub fn set_types_analyzed(&mut self, count: usize) {
        self.summary.total_types = count;
    }

    pub fn set_execution_time(&mut self, duration_ms: u64) {
        self.summary.execution_time_ms = duration_ms;
    }

    pub fn set_config_fingerprint(&mut self, fingerprint: impl Into<String>) {
        self.config_fingerprint = Some(fingerprint.into());
    }

    /// Sort diagnostics and faults so output never depends on visitation order
    pub fn sort(&mut self) {
        self.diagnostics.sort_by(|a, b| a.report_order(b));
        self.faults.sort_by(|a, b| {
            a.symbol.cmp(&b.symbol).then_with(|| a.code.cmp(b.code)).then_with(|| a.message.cmp(&b.message))
        });
    }
}

impl Default for AnalysisReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Error types surfaced to callers of the library
#[derive(Debug, thiserror::Error)]
pub enum StacksError {
    /// Configuration file could not be loaded or parsed
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// File could not be read or accessed
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Path pattern compilation failed
    #[error("Pattern error: {message}")]
    Pattern { message: String },

    /// A source file could not be loaded into the compilation
    #[error("Source error in {file}: {message}")]
    Source { file: String, message: String },

    /// The host cancelled the pass between symbols
    #[error("Analysis cancelled")]
    Cancelled,

    /// Report could not be rendered
    #[error("Report error: {message}")]
    Report { message: String },
}

impl StacksError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    pub fn pattern(message: impl Into<String>) -> Self {
        Self::Pattern { message: message.into() }
    }

    pub fn source(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source { file: file.into(), message: message.into() }
    }

    pub fn report(message: impl Into<String>) -> Self {
        Self::Report { message: message.into() }
    }
}

/// Result type for library operations
pub type StacksResult<T> = Result<T, StacksError>;

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: DiagnosticDescriptor = DiagnosticDescriptor {
        id: "SS999",
        title: "Sample",
        message_format: "The type '{0}' is a sample",
        category: Category::Naming,
        severity: Severity::Warning,
        description: "Sample descriptor",
    };

    #[test]
    fn test_message_formatting() {
        let diagnostic = Diagnostic::new(SAMPLE, "Added", "Added", Location::new("Test.cs", 7, 18));

        assert_eq!(diagnostic.message, "The type 'Added' is a sample");
        assert_eq!(diagnostic.code(), "SS999");
        assert!(!diagnostic.is_blocking());
        assert_eq!(diagnostic.format_display(), "Test.cs:7:18 SS999 [warning] The type 'Added' is a sample");
    }

    #[test]
    fn test_severity_override_keeps_identity() {
        let escalated = SAMPLE.with_severity(Severity::Error);

        assert_eq!(escalated.id, SAMPLE.id);
        assert_eq!(escalated.severity, Severity::Error);
        assert!(Severity::Error > Severity::Warning);
    }

    #[test]
    fn test_location_validity() {
        assert!(Location::new("Test.cs", 1, 1).is_valid());
        assert!(!Location::new("Test.cs", 0, 1).is_valid());
        assert!(!Location::new("", 3, 4).is_valid());
    }

    #[test]
    fn test_report_sorting_is_order_independent() {
        let first = Diagnostic::new(SAMPLE, "B", "B", Location::new("b.cs", 2, 1));
        let second = Diagnostic::new(SAMPLE, "A", "A", Location::new("a.cs", 9, 5));
        let third = Diagnostic::new(SAMPLE.with_severity(Severity::Error), "A2", "A2", Location::new("a.cs", 3, 5));

        let mut forward = AnalysisReport::new();
        let mut backward = AnalysisReport::new();
        for d in [first.clone(), second.clone(), third.clone()] {
            forward.add_diagnostic(d);
        }
        for d in [third, second, first] {
            backward.add_diagnostic(d);
        }
        forward.sort();
        backward.sort();

        let order = |r: &AnalysisReport| r.diagnostics.iter().map(|d| d.symbol.clone()).collect::<Vec<_>>();
        assert_eq!(order(&forward), vec!["A2", "A", "B"]);
        assert_eq!(order(&forward), order(&backward));
        assert!(forward.has_errors());
        assert_eq!(forward.summary.diagnostics_by_severity.total(), 3);
    }

    #[test]
    fn test_fix_intent_titles() {
        let append = FixIntent::AppendSuffix { suffix: "Event".to_string() };
        assert_eq!(append.title(), "Append 'Event'");
        assert_eq!(FixIntent::DemoteSetter.title(), "Make setter private");
        assert_eq!(
            FixIntent::SynthesizeBusinessRule { command: "AddCommand".to_string(), namespace: None }.tag(),
            "synthesize_business_rule"
        );
    }
}
