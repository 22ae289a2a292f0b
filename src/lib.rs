//! Stacks Lint - convention analysis for Slalom Stacks C# code
//!
//! Architecture: Clean Architecture - Library interface serves as the application layer
//! - Symbols, taxonomy and rules are pure domain logic over an immutable compilation
//! - Scanning, discovery and reporting are infrastructure around that core
//! - `StacksValidator` is the entry point for CLIs, editors and CI gates

pub mod analyzer;
pub mod config;
pub mod domain;
pub mod report;
pub mod rules;
pub mod symbols;
pub mod workspace;

pub use domain::diagnostics::{
    AnalysisReport, AnalysisSummary, Category, Diagnostic, DiagnosticDescriptor, EvaluationFault, FixIntent,
    Location, Severity, StacksError, StacksResult,
};

pub use config::{ConfigBuilder, StacksConfig};

pub use analyzer::{on_symbol_visited, AnalysisOptions, Analyzer, CancellationToken, SourceFrontend};

pub use report::{OutputFormat, ReportFormatter, ReportOptions};

pub use rules::{ConventionRule, RuleSet};

pub use symbols::{Compilation, MarkerSet, Taxonomy, TypeResolver};

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// High-level validation operations over one configured analyzer
pub struct StacksValidator {
    analyzer: Arc<Analyzer>,
    report_formatter: ReportFormatter,
}

/// Options for a validation run
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    pub output_format: OutputFormat,
    pub report_options: ReportOptions,
    pub analysis_options: AnalysisOptions,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Human,
            report_options: ReportOptions::default(),
            analysis_options: AnalysisOptions::default(),
        }
    }
}

impl StacksValidator {
    pub fn new_with_config(config: StacksConfig) -> StacksResult<Self> {
        let analyzer = Analyzer::new(config)?;
        Ok(Self { analyzer: Arc::new(analyzer), report_formatter: ReportFormatter::default() })
    }

    pub fn new() -> StacksResult<Self> {
        Self::new_with_config(StacksConfig::default())
    }

    pub fn from_config_file<P: AsRef<Path>>(path: P) -> StacksResult<Self> {
        Self::new_with_config(StacksConfig::load_from_file(path)?)
    }

    pub fn with_report_formatter(mut self, formatter: ReportFormatter) -> Self {
        self.report_formatter = formatter;
        self
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Analyze files and directories with default options
    pub async fn check<P: AsRef<Path>>(&self, paths: Vec<P>) -> StacksResult<AnalysisReport> {
        self.check_with_options(paths, &ValidationOptions::default()).await
    }

    pub async fn check_with_options<P: AsRef<Path>>(
        &self,
        paths: Vec<P>,
        options: &ValidationOptions,
    ) -> StacksResult<AnalysisReport> {
        self.check_cancellable(paths, options, CancellationToken::new()).await
    }

    /// Run the analysis on the blocking pool; cancelling `cancel` stops it before the next symbol
    pub async fn check_cancellable<P: AsRef<Path>>(
        &self,
        paths: Vec<P>,
        options: &ValidationOptions,
        cancel: CancellationToken,
    ) -> StacksResult<AnalysisReport> {
        let paths: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
        let analyzer = Arc::clone(&self.analyzer);
        let analysis_options = options.analysis_options.clone();

        tokio::task::spawn_blocking(move || analyzer.analyze_paths(&paths, &analysis_options, &cancel))
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    StacksError::Cancelled
                } else {
                    StacksError::report(format!("Analysis task failed: {e}"))
                }
            })?
    }

    /// Analyze a directory tree on the current thread
    pub fn check_directory<P: AsRef<Path>>(&self, root: P, options: &AnalysisOptions) -> StacksResult<AnalysisReport> {
        self.analyzer.analyze_directory(root, options)
    }

    /// Analyze in-memory sources as one compilation, e.g. unsaved editor buffers
    pub fn check_sources(&self, sources: &[(PathBuf, String)]) -> StacksResult<AnalysisReport> {
        self.analyzer.analyze_sources(sources)
    }

    pub fn format_report(&self, report: &AnalysisReport, format: OutputFormat) -> StacksResult<String> {
        self.report_formatter.format_report(report, format)
    }
}

pub fn create_validator() -> StacksResult<StacksValidator> {
    StacksValidator::new()
}

/// Analyze files and directories with the default configuration
pub async fn check_paths<P: AsRef<Path>>(paths: Vec<P>) -> StacksResult<AnalysisReport> {
    StacksValidator::new()?.check(paths).await
}

/// Analyze a directory tree with the default configuration
pub fn check_directory<P: AsRef<Path>>(directory: P) -> StacksResult<AnalysisReport> {
    StacksValidator::new()?.check_directory(directory, &AnalysisOptions::default())
}

/// Analyze a single in-memory source file with the default configuration
pub fn check_source(file_name: impl Into<PathBuf>, source: impl Into<String>) -> StacksResult<AnalysisReport> {
    StacksValidator::new()?.check_sources(&[(file_name.into(), source.into())])
}

/// CI integration
pub mod ci {
    use super::*;

    /// Fails when any blocking diagnostic is found in `paths`
    pub async fn gate<P: AsRef<Path>>(paths: Vec<P>) -> StacksResult<AnalysisReport> {
        let report = check_paths(paths).await?;

        let error_count = report.summary.diagnostics_by_severity.error;
        if error_count > 0 {
            return Err(StacksError::report(format!(
                "Convention check failed: {} blocking diagnostic{} found",
                error_count,
                if error_count == 1 { "" } else { "s" }
            )));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MUTABLE_EVENT: &str = "using Slalom.Stacks.Messaging;\n\
                                 \n\
                                 namespace Shop\n\
                                 {\n    \
                                     public class ItemAddedEvent : Event\n    \
                                     {\n        \
                                         public string Name { get; set; }\n    \
                                     }\n\
                                 }\n";

    #[tokio::test]
    async fn test_check_files() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("ItemAddedEvent.cs");
        fs::write(&file, MUTABLE_EVENT).unwrap();

        let validator = StacksValidator::new().unwrap();
        let report = validator.check(vec![&file]).await.unwrap();

        assert_eq!(report.summary.total_files, 1);
        assert_eq!(report.diagnostics.len(), 1);
        let diagnostic = &report.diagnostics[0];
        assert_eq!(diagnostic.code(), "SS101");
        assert_eq!((diagnostic.location.line, diagnostic.location.column), (7, 23));
    }

    #[tokio::test]
    async fn test_cancelled_check() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("ItemAddedEvent.cs"), MUTABLE_EVENT).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let validator = StacksValidator::new().unwrap();
        let result =
            validator.check_cancellable(vec![temp_dir.path()], &ValidationOptions::default(), cancel).await;

        assert!(matches!(result, Err(StacksError::Cancelled)));
    }

    #[tokio::test]
    async fn test_ci_gate() {
        let temp_dir = TempDir::new().unwrap();
        let clean = temp_dir.path().join("Clean.cs");
        let dirty = temp_dir.path().join("Dirty.cs");
        fs::write(&clean, "public class ItemAddedEvent : Event { public string Name { get; } }").unwrap();
        fs::write(&dirty, MUTABLE_EVENT).unwrap();

        assert!(ci::gate(vec![&clean]).await.is_ok());
        assert!(matches!(ci::gate(vec![&dirty]).await, Err(StacksError::Report { .. })));
    }

    #[test]
    fn test_check_directory_and_format() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("Messaging")).unwrap();
        fs::write(root.join("Messaging/Added.cs"), "public class Added : Event {}").unwrap();

        let report = check_directory(root).unwrap();
        assert_eq!(report.summary.total_files, 1);
        assert_eq!(report.diagnostics_with_code("SS002").count(), 1);

        let validator = create_validator().unwrap();
        let json = validator.format_report(&report, OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["diagnostics"][0]["fixes"][0]["suffix"], "Event");
    }

    #[test]
    fn test_check_source() {
        let report = check_source("Remove.cs", "class Remove : Command {}").unwrap();
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].message, "The type name 'Remove' should end in 'Command'");
    }
}
