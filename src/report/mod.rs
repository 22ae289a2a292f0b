//! Report generation with multiple output formats
//!
//! Architecture: Anti-Corruption Layer - Formatters translate the analysis report to external formats
//! - AnalysisReport (domain) is converted to human, JSON, SARIF, GitHub and JUnit representations
//! - Each formatter owns the rules of its format; filtering happens once, before dispatch
//! - Fix intents travel with each diagnostic so editors and CI can act on them

use crate::domain::diagnostics::{AnalysisReport, Diagnostic, Severity, StacksError, StacksResult};
use crate::rules;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

/// Supported output formats for analysis reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable, grouped by file
    Human,
    Json,
    /// JUnit XML for CI test dashboards
    Junit,
    /// SARIF 2.1.0 for code scanning tools
    Sarif,
    /// GitHub Actions workflow annotations
    GitHub,
}

impl OutputFormat {
    pub fn all_formats() -> &'static [&'static str] {
        &["human", "json", "junit", "sarif", "github"]
    }
}

impl FromStr for OutputFormat {
    type Err = StacksError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "junit" => Ok(Self::Junit),
            "sarif" => Ok(Self::Sarif),
            "github" => Ok(Self::GitHub),
            other => Err(StacksError::report(format!(
                "Unknown output format '{other}', expected one of: {}",
                Self::all_formats().join(", ")
            ))),
        }
    }
}

/// Options for customizing report output
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Colored output for the human format
    pub use_colors: bool,
    /// List fix intents under each diagnostic
    pub show_fixes: bool,
    pub max_diagnostics: Option<usize>,
    pub min_severity: Option<Severity>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self { use_colors: true, show_fixes: true, max_diagnostics: None, min_severity: None }
    }
}

#[derive(Debug, Clone, Copy)]
enum Style {
    Error,
    Warning,
    Success,
    Dim,
    Bold,
}

impl Style {
    #[cfg(feature = "colors")]
    fn apply(self, text: &str) -> String {
        use colored::Colorize;
        match self {
            Self::Error => text.red(),
            Self::Warning => text.yellow(),
            Self::Success => text.green(),
            Self::Dim => text.dimmed(),
            Self::Bold => text.bold(),
        }
        .to_string()
    }

    #[cfg(not(feature = "colors"))]
    fn apply(self, text: &str) -> String {
        text.to_string()
    }

    fn for_severity(severity: Severity) -> Self {
        match severity {
            Severity::Error => Self::Error,
            Severity::Warning => Self::Warning,
        }
    }
}

/// Formats an `AnalysisReport` in any supported format
#[derive(Debug, Clone, Default)]
pub struct ReportFormatter {
    options: ReportOptions,
}

impl ReportFormatter {
    pub fn new(options: ReportOptions) -> Self {
        Self { options }
    }

    pub fn format_report(&self, report: &AnalysisReport, format: OutputFormat) -> StacksResult<String> {
        let diagnostics = self.filter_diagnostics(&report.diagnostics);

        match format {
            OutputFormat::Human => Ok(self.format_human(report, &diagnostics)),
            OutputFormat::Json => self.format_json(report, &diagnostics),
            OutputFormat::Junit => Ok(self.format_junit(report, &diagnostics)),
            OutputFormat::Sarif => self.format_sarif(&diagnostics),
            OutputFormat::GitHub => Ok(self.format_github(&diagnostics)),
        }
    }

    pub fn write_report<W: Write>(
        &self,
        report: &AnalysisReport,
        format: OutputFormat,
        mut writer: W,
    ) -> StacksResult<()> {
        let formatted = self.format_report(report, format)?;
        writer.write_all(formatted.as_bytes())?;
        Ok(())
    }

    /// Apply minimum severity, then the count limit; input order is preserved
    fn filter_diagnostics<'a>(&self, diagnostics: &'a [Diagnostic]) -> Vec<&'a Diagnostic> {
        let mut filtered: Vec<&Diagnostic> = diagnostics
            .iter()
            .filter(|d| self.options.min_severity.map(|min| d.severity() >= min).unwrap_or(true))
            .collect();

        if let Some(max) = self.options.max_diagnostics {
            filtered.truncate(max);
        }
        filtered
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if self.options.use_colors {
            style.apply(text)
        } else {
            text.to_string()
        }
    }

    fn format_human(&self, report: &AnalysisReport, diagnostics: &[&Diagnostic]) -> String {
        let mut output = String::new();

        if diagnostics.is_empty() {
            output.push_str(&format!("✅ {}\n", self.paint("No convention violations found", Style::Success)));
        } else {
            let (icon, style) = if report.has_errors() { ("❌", Style::Error) } else { ("⚠️", Style::Warning) };
            output.push_str(&format!("{} {}\n\n", icon, self.paint("Convention Violations Found", style)));

            let mut by_file: BTreeMap<&Path, Vec<&Diagnostic>> = BTreeMap::new();
            for diagnostic in diagnostics {
                by_file.entry(diagnostic.location.file_path.as_path()).or_default().push(diagnostic);
            }

            for (file_path, file_diagnostics) in by_file {
                output.push_str(&format!("📁 {}\n", file_path.display()));

                for diagnostic in file_diagnostics {
                    let position = format!("{}:{}", diagnostic.location.line, diagnostic.location.column);
                    let severity = diagnostic.severity();
                    output.push_str(&format!(
                        "  {} {} [{}] {}\n",
                        self.paint(&position, Style::Dim),
                        diagnostic.code(),
                        self.paint(severity.as_str(), Style::for_severity(severity)),
                        diagnostic.message
                    ));

                    if self.options.show_fixes {
                        for fix in &diagnostic.fixes {
                            output.push_str(&format!("    💡 {}\n", self.paint(&fix.title(), Style::Success)));
                        }
                    }
                }
                output.push('\n');
            }
        }

        if !report.faults.is_empty() {
            output.push_str(&format!(
                "{}\n",
                self.paint(&format!("{} rule evaluation(s) did not complete", report.faults.len()), Style::Warning)
            ));
            for fault in &report.faults {
                output.push_str(&format!("  {} on '{}': {}\n", fault.code, fault.symbol, fault.message));
            }
            output.push('\n');
        }

        output.push_str(&self.format_summary(report));
        output
    }

    fn format_summary(&self, report: &AnalysisReport) -> String {
        let counts = &report.summary.diagnostics_by_severity;
        let execution_time = report.summary.execution_time_ms as f64 / 1000.0;
        let label = self.paint("Summary:", Style::Bold);

        let findings = if counts.total() == 0 {
            self.paint("0 violations", Style::Success)
        } else {
            let mut parts = Vec::new();
            if counts.error > 0 {
                let text = format!("{} error{}", counts.error, plural(counts.error));
                parts.push(self.paint(&text, Style::Error));
            }
            if counts.warning > 0 {
                let text = format!("{} warning{}", counts.warning, plural(counts.warning));
                parts.push(self.paint(&text, Style::Warning));
            }
            parts.join(", ")
        };

        format!(
            "📊 {} {} in {} files, {} types ({:.1}s)\n",
            label, findings, report.summary.total_files, report.summary.total_types, execution_time
        )
    }

    fn format_json(&self, report: &AnalysisReport, diagnostics: &[&Diagnostic]) -> StacksResult<String> {
        let json_diagnostics: Vec<JsonValue> = diagnostics
            .iter()
            .map(|d| {
                serde_json::json!({
                    "code": d.code(),
                    "severity": d.severity().as_str(),
                    "category": d.descriptor.category.as_str(),
                    "file_path": d.location.file_path.display().to_string(),
                    "line": d.location.line,
                    "column": d.location.column,
                    "symbol": d.symbol,
                    "message": d.message,
                    "fixes": d.fixes,
                })
            })
            .collect();

        let json_report = serde_json::json!({
            "diagnostics": json_diagnostics,
            "faults": report.faults,
            "summary": {
                "total_files": report.summary.total_files,
                "total_types": report.summary.total_types,
                "diagnostics_by_severity": {
                    "error": report.summary.diagnostics_by_severity.error,
                    "warning": report.summary.diagnostics_by_severity.warning
                },
                "execution_time_ms": report.summary.execution_time_ms,
                "analyzed_at": report.summary.analyzed_at.to_rfc3339()
            },
            "config_fingerprint": report.config_fingerprint
        });

        serde_json::to_string_pretty(&json_report)
            .map_err(|e| StacksError::report(format!("JSON serialization failed: {e}")))
    }

    fn format_junit(&self, report: &AnalysisReport, diagnostics: &[&Diagnostic]) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");

        let failures = diagnostics.iter().filter(|d| d.is_blocking()).count();
        let execution_time = report.summary.execution_time_ms as f64 / 1000.0;
        xml.push_str(&format!(
            "<testsuite name=\"stacks-lint\" tests=\"{}\" failures=\"{}\" errors=\"{}\" time=\"{:.3}\">\n",
            diagnostics.len(),
            failures,
            report.faults.len(),
            execution_time
        ));

        for diagnostic in diagnostics {
            xml.push_str(&format!(
                "  <testcase classname=\"{}\" name=\"{}\">\n",
                diagnostic.code(),
                escape_xml(&format!("{} ({})", diagnostic.symbol, diagnostic.location))
            ));
            if diagnostic.is_blocking() {
                xml.push_str(&format!("    <failure message=\"{}\">\n", escape_xml(&diagnostic.message)));
                xml.push_str(&format!("      File: {}\n", escape_xml(&diagnostic.location.to_string())));
                xml.push_str("    </failure>\n");
            }
            xml.push_str("  </testcase>\n");
        }

        xml.push_str("</testsuite>\n");
        xml
    }

    fn format_sarif(&self, diagnostics: &[&Diagnostic]) -> StacksResult<String> {
        let sarif_rules: Vec<JsonValue> = rules::catalog()
            .iter()
            .map(|d| {
                serde_json::json!({
                    "id": d.id,
                    "name": d.title,
                    "shortDescription": { "text": d.title },
                    "fullDescription": { "text": d.description },
                    "defaultConfiguration": { "level": d.severity.as_str() },
                    "properties": { "category": d.category.as_str() }
                })
            })
            .collect();

        let sarif_results: Vec<JsonValue> = diagnostics
            .iter()
            .map(|d| {
                let fixes: Vec<JsonValue> = d
                    .fixes
                    .iter()
                    .map(|fix| serde_json::json!({ "description": { "text": fix.title() } }))
                    .collect();
                serde_json::json!({
                    "ruleId": d.code(),
                    "level": d.severity().as_str(),
                    "message": { "text": d.message },
                    "locations": [{
                        "physicalLocation": {
                            "artifactLocation": { "uri": d.location.file_path.display().to_string() },
                            "region": { "startLine": d.location.line, "startColumn": d.location.column }
                        },
                        "logicalLocations": [{ "name": d.symbol }]
                    }],
                    "fixes": fixes
                })
            })
            .collect();

        let sarif_report = serde_json::json!({
            "version": "2.1.0",
            "$schema": "https://json.schemastore.org/sarif-2.1.0.json",
            "runs": [{
                "tool": {
                    "driver": {
                        "name": "stacks-lint",
                        "version": env!("CARGO_PKG_VERSION"),
                        "rules": sarif_rules
                    }
                },
                "results": sarif_results
            }]
        });

        serde_json::to_string_pretty(&sarif_report)
            .map_err(|e| StacksError::report(format!("SARIF serialization failed: {e}")))
    }

    fn format_github(&self, diagnostics: &[&Diagnostic]) -> String {
        diagnostics
            .iter()
            .map(|d| {
                format!(
                    "::{} file={},line={},col={},title={}::{}\n",
                    d.severity().as_str(),
                    d.location.file_path.display(),
                    d.location.line,
                    d.location.column,
                    d.code(),
                    d.message
                )
            })
            .collect()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Human => "human",
            Self::Json => "json",
            Self::Junit => "junit",
            Self::Sarif => "sarif",
            Self::GitHub => "github",
        };
        f.write_str(name)
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
