//! Convention analysis engine and orchestrator
//!
//! Architecture: Domain Services - the engine evaluates rules per visited symbol
//! - `on_symbol_visited` is the single entry point and a pure function of its inputs
//! - Each (rule, symbol) evaluation is isolated; a fault never affects sibling rules
//! - `Analyzer` coordinates discovery, loading and a whole-compilation pass

pub mod csharp;

use crate::analyzer::csharp::CSharpScanner;
use crate::config::StacksConfig;
use crate::domain::diagnostics::{
    AnalysisReport, Diagnostic, EvaluationFault, Location, StacksError, StacksResult,
};
use crate::rules::{AnalysisContext, RuleFault, RuleSet, INTERNAL_ERROR};
use crate::symbols::declarations::SourceFile;
use crate::symbols::{Compilation, MarkerSet, SymbolRef};
use crate::workspace::{PathFilter, Workspace};
use rayon::prelude::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Turns one source file into declarations
pub trait SourceFrontend: Send + Sync {
    /// Check if this frontend handles the given file type
    fn handles_file(&self, file_path: &Path) -> bool;

    /// Extract the declarations of a file
    fn scan(&self, file_path: &Path, content: &str) -> StacksResult<SourceFile>;
}

/// Cooperative cancellation, checked before each symbol is evaluated
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything produced by visiting one symbol
#[derive(Debug, Default)]
pub struct SymbolEvaluation {
    pub diagnostics: Vec<Diagnostic>,
    pub faults: Vec<EvaluationFault>,
}

/// Evaluate every rule triggered by `symbol`.
///
/// Findings without a valid source location are dropped. Faulted evaluations are
/// logged and recorded; with `report_internal_errors` they also surface as SS900.
pub fn on_symbol_visited(
    rules: &RuleSet,
    context: &AnalysisContext<'_>,
    symbol: SymbolRef,
    cancel: &CancellationToken,
) -> StacksResult<SymbolEvaluation> {
    if cancel.is_cancelled() {
        return Err(StacksError::Cancelled);
    }

    let mut evaluation = SymbolEvaluation::default();
    let Some(kind) = context.compilation().visit_kind(symbol) else {
        return Ok(evaluation);
    };
    let symbol_name = context.compilation().symbol_name(symbol).unwrap_or("<unknown>");

    for rule in rules.triggered_by(kind) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| rule.evaluate(context, symbol)))
            .unwrap_or_else(|payload| Err(RuleFault::Panicked(panic_message(payload.as_ref()))));

        match outcome {
            Ok(findings) => {
                for finding in findings {
                    match finding.location.filter(Location::is_valid) {
                        Some(location) => evaluation.diagnostics.push(
                            Diagnostic::new(rule.descriptor(), finding.symbol, &finding.message_argument, location)
                                .with_fixes(finding.fixes),
                        ),
                        None => debug!("Dropping {} for '{}': no source location", rule.code(), finding.symbol),
                    }
                }
            }
            Err(fault) => {
                warn!("Rule {} faulted on '{}': {}", rule.code(), symbol_name, fault);
                if rules.reports_internal_errors() {
                    if let Some(location) = symbol_location(context, symbol).filter(Location::is_valid) {
                        evaluation.diagnostics.push(Diagnostic::new(INTERNAL_ERROR, symbol_name, symbol_name, location));
                    }
                }
                evaluation.faults.push(EvaluationFault {
                    code: rule.code(),
                    symbol: symbol_name.to_string(),
                    message: fault.to_string(),
                });
            }
        }
    }

    Ok(evaluation)
}

/// Visit every type, property and field of the compilation once
pub fn analyze_compilation(
    compilation: &Compilation,
    rules: &RuleSet,
    markers: &MarkerSet,
    parallel: bool,
    cancel: &CancellationToken,
) -> StacksResult<AnalysisReport> {
    let start_time = Instant::now();
    let context = AnalysisContext::new(compilation, markers);
    let symbols = compilation.visitable_symbols();

    let evaluations: Vec<SymbolEvaluation> = if parallel && symbols.len() > 1 {
        symbols.par_iter().map(|symbol| on_symbol_visited(rules, &context, *symbol, cancel)).collect::<StacksResult<_>>()?
    } else {
        symbols.iter().map(|symbol| on_symbol_visited(rules, &context, *symbol, cancel)).collect::<StacksResult<_>>()?
    };

    let mut report = AnalysisReport::new();
    for evaluation in evaluations {
        for diagnostic in evaluation.diagnostics {
            report.add_diagnostic(diagnostic);
        }
        for fault in evaluation.faults {
            report.add_fault(fault);
        }
    }

    report.set_files_analyzed(compilation.files().len());
    report.set_types_analyzed(compilation.declared_types().count());
    report.set_execution_time(start_time.elapsed().as_millis() as u64);
    report.sort();

    debug!(
        "Visited {} symbols: {} diagnostics, {} faults",
        symbols.len(),
        report.diagnostics.len(),
        report.faults.len()
    );
    Ok(report)
}

fn symbol_location(context: &AnalysisContext<'_>, symbol: SymbolRef) -> Option<Location> {
    match symbol {
        SymbolRef::Type(id) => context.compilation().get(id)?.location.clone(),
        SymbolRef::Member { owner, index } => context.compilation().member(owner, index)?.location.clone(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Main analyzer that orchestrates the entire analysis process
pub struct Analyzer {
    /// Configuration for this analysis
    config: StacksConfig,
    rules: RuleSet,
    markers: MarkerSet,
    frontend: Arc<dyn SourceFrontend>,
}

/// Options for customizing analysis behavior
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Whether to use parallel processing
    pub parallel: bool,
    /// Maximum number of files to load
    pub max_files: Option<usize>,
    /// Whether to stop at the first unreadable file
    pub fail_fast: bool,
    /// Additional paths to exclude (temporary)
    pub exclude_patterns: Vec<String>,
    /// Whether to ignore .stacksignore files
    pub ignore_ignore_files: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            max_files: None,
            fail_fast: false,
            exclude_patterns: Vec::new(),
            ignore_ignore_files: false,
        }
    }
}

impl Analyzer {
    /// Create a new analyzer with the given configuration
    pub fn new(config: StacksConfig) -> StacksResult<Self> {
        config.validate()?;
        let rules = config.rule_set()?;
        let markers = config.marker_set();
        Ok(Self { config, rules, markers, frontend: Arc::new(CSharpScanner::new()) })
    }

    /// Create an analyzer with default configuration
    pub fn with_defaults() -> StacksResult<Self> {
        Self::new(StacksConfig::default())
    }

    /// Replace the source frontend
    pub fn with_frontend(mut self, frontend: Arc<dyn SourceFrontend>) -> Self {
        self.frontend = frontend;
        self
    }

    pub fn config(&self) -> &StacksConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn markers(&self) -> &MarkerSet {
        &self.markers
    }

    /// Get configuration fingerprint
    pub fn config_fingerprint(&self) -> String {
        self.config.fingerprint()
    }

    /// Discover, load and analyze files and directories
    pub fn analyze_paths<P: AsRef<Path>>(
        &self,
        paths: &[P],
        options: &AnalysisOptions,
        cancel: &CancellationToken,
    ) -> StacksResult<AnalysisReport> {
        let start_time = Instant::now();
        let workspace = self.workspace(options)?;

        let mut files = workspace.discover(paths)?;
        if let Some(max_files) = options.max_files {
            files.truncate(max_files);
        }

        let compilation = workspace.load(&files, &self.config.markers.root, options.fail_fast)?;
        self.finish(&compilation, options, cancel, start_time)
    }

    /// Analyze a directory tree
    pub fn analyze_directory<P: AsRef<Path>>(
        &self,
        root: P,
        options: &AnalysisOptions,
    ) -> StacksResult<AnalysisReport> {
        self.analyze_paths(&[root.as_ref()], options, &CancellationToken::new())
    }

    /// Analyze in-memory sources as one compilation
    pub fn analyze_sources(&self, sources: &[(PathBuf, String)]) -> StacksResult<AnalysisReport> {
        let start_time = Instant::now();
        let workspace = self.workspace(&AnalysisOptions::default())?;
        let compilation = workspace.compile(sources, &self.config.markers.root)?;
        self.finish(&compilation, &AnalysisOptions::default(), &CancellationToken::new(), start_time)
    }

    /// Analyze an already built compilation
    pub fn analyze_compilation(
        &self,
        compilation: &Compilation,
        options: &AnalysisOptions,
        cancel: &CancellationToken,
    ) -> StacksResult<AnalysisReport> {
        self.finish(compilation, options, cancel, Instant::now())
    }

    fn finish(
        &self,
        compilation: &Compilation,
        options: &AnalysisOptions,
        cancel: &CancellationToken,
        start_time: Instant,
    ) -> StacksResult<AnalysisReport> {
        let parallel = options.parallel && self.config.analysis.parallel;
        let mut report = analyze_compilation(compilation, &self.rules, &self.markers, parallel, cancel)?;
        report.set_execution_time(start_time.elapsed().as_millis() as u64);
        report.set_config_fingerprint(self.config.fingerprint());
        Ok(report)
    }

    fn workspace(&self, options: &AnalysisOptions) -> StacksResult<Workspace> {
        let ignore_file = if options.ignore_ignore_files || self.config.paths.ignore_file.as_deref() == Some("") {
            None
        } else {
            self.config.paths.ignore_file.clone()
        };

        let mut patterns = self.config.paths.patterns.clone();
        patterns.extend(options.exclude_patterns.iter().cloned());
        let path_filter = PathFilter::new(patterns, ignore_file)
            .map_err(|e| StacksError::config(format!("Failed to create path filter: {e}")))?;

        Ok(Workspace::new(path_filter, Arc::clone(&self.frontend)).with_parallel(options.parallel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::domain::diagnostics::{DiagnosticDescriptor, Severity};
    use crate::rules::test_support::compile;
    use crate::rules::{ConventionRule, Finding, RuleOutcome};
    use crate::symbols::VisitKind;
    use std::fs;
    use tempfile::TempDir;

    fn run(sources: &[&str], rules: &RuleSet, parallel: bool) -> AnalysisReport {
        let compilation = compile(sources);
        let markers = MarkerSet::stacks();
        analyze_compilation(&compilation, rules, &markers, parallel, &CancellationToken::new()).unwrap()
    }

    fn codes(report: &AnalysisReport) -> Vec<&'static str> {
        report.diagnostics.iter().map(|d| d.code()).collect()
    }

    #[test]
    fn test_use_case_without_rules() {
        let report = run(
            &["class AddCommand {}\nclass Add : UseCase<AddCommand> { void Execute(AddCommand c) {} }"],
            &RuleSet::standard(),
            false,
        );

        assert_eq!(codes(&report), vec!["SS301"]);
        let diagnostic = &report.diagnostics[0];
        assert_eq!(diagnostic.severity(), Severity::Warning);
        assert_eq!(diagnostic.message, "The use case 'Add' should have rules.");
        assert_eq!(diagnostic.fixes[0].title(), "Create business rule");
    }

    #[test]
    fn test_use_case_with_rules() {
        let report = run(
            &[
                "class AddCommand {}\nclass Add : UseCase<AddCommand> { void Execute(AddCommand c) {} }",
                "class add_rule : BusinessRule<AddCommand> {}",
            ],
            &RuleSet::standard(),
            false,
        );
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_mutable_event_property() {
        let report = run(&["class AddedEvent : Event { public string Name { get; set; } }"], &RuleSet::standard(), false);

        assert_eq!(codes(&report), vec!["SS101"]);
        assert_eq!(report.diagnostics[0].severity(), Severity::Error);
        assert!(report.diagnostics[0].message.contains("Name"));
        assert!(report.has_errors());
    }

    #[test]
    fn test_event_naming() {
        let report = run(&["class Added : Event {}"], &RuleSet::standard(), false);

        assert_eq!(codes(&report), vec!["SS002"]);
        assert_eq!(report.diagnostics[0].severity(), Severity::Warning);
        assert!(report.diagnostics[0].message.contains("Added"));
    }

    #[test]
    fn test_independent_rules_on_one_type() {
        // both SS301 and SS302 fire on the same type, in either declaration order
        let forward = run(&["class C {}\nclass Add : UseCase<C> {}"], &RuleSet::standard(), false);
        let backward = run(&["class Add : UseCase<C> {}\nclass C {}"], &RuleSet::standard(), false);

        let mut forward_codes = codes(&forward);
        forward_codes.sort();
        assert_eq!(forward_codes, vec!["SS301", "SS302"]);
        let mut backward_codes = codes(&backward);
        backward_codes.sort();
        assert_eq!(forward_codes, backward_codes);
    }

    #[test]
    fn test_aliased_bases_and_tuple_properties_are_checked() {
        let report = run(
            &[
                "using Ev = Slalom.Stacks.Messaging.Event;\nclass Added : Ev {}",
                "public class RemovedEvent : Event { public (int A, string B) Pair { get; set; } }",
            ],
            &RuleSet::standard(),
            false,
        );

        let mut found: Vec<_> = report.diagnostics.iter().map(|d| (d.code(), d.symbol.as_str())).collect();
        found.sort();
        assert_eq!(found, vec![("SS002", "Added"), ("SS101", "Pair")]);
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let sources = [
            "class Added : Event { public string Name { get; set; } private int _count; }",
            "class Remove : Command { public int Id { get; set; } }",
            "class RemoveUseCase : UseCase<Remove> { }",
            "class Added2 : Added {}",
        ];
        let sequential = run(&sources, &RuleSet::standard(), false);
        let parallel = run(&sources, &RuleSet::standard(), true);

        let render = |r: &AnalysisReport| r.diagnostics.iter().map(Diagnostic::format_display).collect::<Vec<_>>();
        assert_eq!(render(&sequential), render(&parallel));
        assert_eq!(sequential.summary.total_types, 4);
        assert_eq!(sequential.summary.total_files, 4);
    }

    struct PanickingRule;

    impl ConventionRule for PanickingRule {
        fn descriptor(&self) -> DiagnosticDescriptor {
            DiagnosticDescriptor { id: "SS990", ..INTERNAL_ERROR }
        }

        fn trigger(&self) -> VisitKind {
            VisitKind::Type
        }

        fn evaluate(&self, _context: &AnalysisContext<'_>, _symbol: SymbolRef) -> RuleOutcome {
            panic!("evaluation exploded")
        }
    }

    struct UnlocatedRule;

    impl ConventionRule for UnlocatedRule {
        fn descriptor(&self) -> DiagnosticDescriptor {
            DiagnosticDescriptor { id: "SS991", ..INTERNAL_ERROR }
        }

        fn trigger(&self) -> VisitKind {
            VisitKind::Type
        }

        fn evaluate(&self, _context: &AnalysisContext<'_>, _symbol: SymbolRef) -> RuleOutcome {
            Ok(vec![
                Finding::named("Nowhere", None),
                Finding::named("Synthetic", Some(&Location::new("Test0.cs", 0, 0))),
            ])
        }
    }

    #[test]
    fn test_fault_is_isolated_to_rule_and_symbol() {
        let rules = RuleSet::new()
            .with_rule(Box::new(PanickingRule))
            .with_rule(Box::new(crate::rules::EventNamingRule));
        let report = run(&["class Added : Event {}"], &rules, false);

        assert_eq!(codes(&report), vec!["SS002"]);
        assert_eq!(report.faults.len(), 1);
        assert_eq!(report.faults[0].code, "SS990");
        assert_eq!(report.faults[0].symbol, "Added");
        assert!(report.faults[0].message.contains("evaluation exploded"));
    }

    #[test]
    fn test_faults_surface_when_configured() {
        let rules = RuleSet::new().with_rule(Box::new(PanickingRule)).reporting_internal_errors(true);
        let report = run(&["class Added : Event {}"], &rules, false);

        assert_eq!(codes(&report), vec!["SS900"]);
        assert_eq!(report.diagnostics[0].message, "Convention analysis of 'Added' did not complete.");
    }

    #[test]
    fn test_findings_without_location_are_dropped() {
        let rules = RuleSet::new().with_rule(Box::new(UnlocatedRule));
        let report = run(&["class Anything {}"], &rules, false);

        assert!(report.diagnostics.is_empty());
        assert!(report.faults.is_empty());
    }

    #[test]
    fn test_cancellation_is_checked_per_symbol() {
        let compilation = compile(&["class Added : Event {}"]);
        let markers = MarkerSet::stacks();
        let context = AnalysisContext::new(&compilation, &markers);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let symbol = compilation.visitable_symbols()[0];
        let result = on_symbol_visited(&RuleSet::standard(), &context, symbol, &cancel);
        assert!(matches!(result, Err(StacksError::Cancelled)));

        let pass = analyze_compilation(&compilation, &RuleSet::standard(), &markers, true, &cancel);
        assert!(matches!(pass, Err(StacksError::Cancelled)));
    }

    #[test]
    fn test_strict_identity_ignores_foreign_events() {
        let sources = ["using Acme.Audit;\nclass Added : Event {}", "using Slalom.Stacks.Messaging;\nclass Removed : Event {}"];
        let compilation = compile(&sources);
        let markers = MarkerSet::stacks().with_strict_identity(true);
        let report =
            analyze_compilation(&compilation, &RuleSet::standard(), &markers, false, &CancellationToken::new()).unwrap();

        let symbols: Vec<_> = report.diagnostics.iter().map(|d| d.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["Removed"]);
    }

    #[test]
    fn test_analyze_directory() -> StacksResult<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        fs::create_dir_all(root.join("src"))?;
        fs::create_dir_all(root.join("obj/Debug"))?;
        fs::write(root.join("src/Events.cs"), "namespace App\n{\n    public class Added : Event {}\n}\n")?;
        fs::write(root.join("obj/Debug/Generated.cs"), "public class Removed : Event {}")?;
        fs::write(root.join("README.md"), "# not code")?;

        let analyzer = Analyzer::with_defaults()?;
        let report = analyzer.analyze_directory(root, &AnalysisOptions::default())?;

        assert_eq!(report.summary.total_files, 1);
        assert_eq!(codes(&report), vec!["SS002"]);
        assert_eq!(report.diagnostics[0].location.line, 3);
        assert!(report.config_fingerprint.is_some());
        Ok(())
    }

    #[test]
    fn test_analyzer_respects_config() -> StacksResult<()> {
        let config = ConfigBuilder::new().disable_rule("SS002").parallel(false).build()?;
        let analyzer = Analyzer::new(config)?;
        let report = analyzer.analyze_sources(&[(PathBuf::from("Test.cs"), "class Added : Event {}".to_string())])?;

        assert!(report.diagnostics.is_empty());
        assert_eq!(analyzer.rules().len(), 5);
        Ok(())
    }
}
