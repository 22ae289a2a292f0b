//! Configuration loading and management for Stacks Lint
//!
//! Architecture: Anti-Corruption Layer - Configuration translates external YAML formats
//! - Raw YAML structures are converted to marker identities and rule overrides
//! - Defaults describe the Slalom Stacks messaging framework
//! - Unknown rule codes and malformed identities are rejected at load time

use crate::domain::diagnostics::{Severity, StacksError, StacksResult};
use crate::rules::{self, RuleSet};
use crate::symbols::MarkerSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration file names searched for, in order
pub const CONFIG_FILE_NAMES: [&str; 3] = ["stacks_lint.yaml", "stacks_lint.yml", ".stacks_lint.yaml"];

const SUPPORTED_VERSIONS: [&str; 1] = ["1.0"];

/// Dotted identifier, e.g. `Slalom.Stacks.Messaging.Event`
static IDENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("identity pattern is valid")
});

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StacksConfig {
    /// Configuration format version
    #[serde(default = "default_version")]
    pub version: String,
    /// Fully-qualified identities of the framework base types
    #[serde(default)]
    pub markers: MarkerConfig,
    /// Per-rule overrides keyed by code (e.g. `SS301`)
    #[serde(default)]
    pub rules: BTreeMap<String, RuleOverride>,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Path filtering configuration
    #[serde(default)]
    pub paths: PathConfig,
}

/// Framework marker identities
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MarkerConfig {
    pub root: String,
    pub command: String,
    pub event: String,
    pub use_case: String,
    pub business_rule: String,
    /// Only match unqualified references through `using` directives
    pub strict_identity: bool,
}

/// Override for a single rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleOverride {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Severity override (uses the rule default if not specified)
    #[serde(default)]
    pub severity: Option<Severity>,
}

/// Engine behavior
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Report faulted rule evaluations as SS900 diagnostics
    pub report_internal_errors: bool,
    /// Evaluate symbols on the rayon thread pool
    pub parallel: bool,
}

/// Path filtering configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathConfig {
    /// Include/exclude patterns (gitignore-style)
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Optional .stacksignore file name
    #[serde(default)]
    pub ignore_file: Option<String>,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            root: "System.Object".to_string(),
            command: "Slalom.Stacks.Messaging.Command".to_string(),
            event: "Slalom.Stacks.Messaging.Event".to_string(),
            use_case: "Slalom.Stacks.Messaging.UseCase".to_string(),
            business_rule: "Slalom.Stacks.Messaging.Validation.BusinessRule".to_string(),
            strict_identity: false,
        }
    }
}

impl MarkerConfig {
    pub fn to_marker_set(&self) -> MarkerSet {
        MarkerSet::new(
            &self.root,
            &self.command,
            &self.event,
            &self.use_case,
            &self.business_rule,
            self.strict_identity,
        )
    }

    fn identities(&self) -> [(&'static str, &str); 5] {
        [
            ("root", &self.root),
            ("command", &self.command),
            ("event", &self.event),
            ("use_case", &self.use_case),
            ("business_rule", &self.business_rule),
        ]
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { report_internal_errors: false, parallel: true }
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            patterns: vec![
                // Build output and tooling directories
                "**/bin/**".to_string(),
                "**/obj/**".to_string(),
                "**/.git/**".to_string(),
                "**/node_modules/**".to_string(),
                // Generated sources
                "**/*.g.cs".to_string(),
                "**/*.Designer.cs".to_string(),
            ],
            ignore_file: Some(".stacksignore".to_string()),
        }
    }
}

impl StacksConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> StacksResult<Self> {
        let contents = fs::read_to_string(&path).map_err(|e| {
            StacksError::config(format!("Failed to read config file '{}': {}", path.as_ref().display(), e))
        })?;

        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            StacksError::config(format!("Failed to parse config file '{}': {}", path.as_ref().display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from string content
    pub fn load_from_str(content: &str) -> StacksResult<Self> {
        let config: Self =
            serde_yaml::from_str(content).map_err(|e| StacksError::config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Find a configuration file in `dir` by the conventional names
    pub fn discover<P: AsRef<Path>>(dir: P) -> Option<PathBuf> {
        CONFIG_FILE_NAMES.iter().map(|name| dir.as_ref().join(name)).find(|candidate| candidate.is_file())
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> StacksResult<()> {
        if !SUPPORTED_VERSIONS.contains(&self.version.as_str()) {
            return Err(StacksError::config(format!(
                "Unsupported configuration version '{}'. Supported versions: {}",
                self.version,
                SUPPORTED_VERSIONS.join(", ")
            )));
        }

        for (name, identity) in self.markers.identities() {
            if !IDENTITY.is_match(identity) {
                return Err(StacksError::config(format!(
                    "Marker '{name}' must be a fully-qualified type name, got '{identity}'"
                )));
            }
        }

        for code in self.rules.keys() {
            match rules::find_descriptor(code) {
                Some(descriptor) if descriptor.id != rules::INTERNAL_ERROR.id => {}
                _ => return Err(StacksError::config(format!("Unknown rule code '{code}' in rules section"))),
            }
        }

        for pattern in &self.paths.patterns {
            let glob_source = pattern.strip_prefix('!').unwrap_or(pattern);
            glob::Pattern::new(glob_source.trim_matches('/'))
                .map_err(|e| StacksError::config(format!("Invalid path pattern '{pattern}': {e}")))?;
        }

        Ok(())
    }

    pub fn marker_set(&self) -> MarkerSet {
        self.markers.to_marker_set()
    }

    /// Build the immutable rule set this configuration describes
    pub fn rule_set(&self) -> StacksResult<RuleSet> {
        RuleSet::from_config(self)
    }

    /// Convert to JSON for serialization
    pub fn to_json(&self) -> StacksResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| StacksError::config(format!("Failed to serialize config: {e}")))
    }

    /// Create a fingerprint of the configuration for reports
    pub fn fingerprint(&self) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();

        self.version.hash(&mut hasher);
        self.markers.identities().hash(&mut hasher);
        self.markers.strict_identity.hash(&mut hasher);

        // BTreeMap iteration is already ordered by code
        for (code, rule) in &self.rules {
            code.hash(&mut hasher);
            rule.enabled.hash(&mut hasher);
            rule.severity.hash(&mut hasher);
        }

        self.analysis.report_internal_errors.hash(&mut hasher);
        self.paths.patterns.hash(&mut hasher);
        self.paths.ignore_file.hash(&mut hasher);

        format!("{:x}", hasher.finish())
    }
}

impl Default for StacksConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            markers: MarkerConfig::default(),
            rules: BTreeMap::new(),
            analysis: AnalysisConfig::default(),
            paths: PathConfig::default(),
        }
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_true() -> bool {
    true
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: StacksConfig,
}

impl ConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self { config: StacksConfig::default() }
    }

    /// Override a marker identity
    pub fn marker(mut self, kind: crate::symbols::MarkerKind, identity: impl Into<String>) -> Self {
        use crate::symbols::MarkerKind;
        let identity = identity.into();
        match kind {
            MarkerKind::Root => self.config.markers.root = identity,
            MarkerKind::Command => self.config.markers.command = identity,
            MarkerKind::Event => self.config.markers.event = identity,
            MarkerKind::UseCase => self.config.markers.use_case = identity,
            MarkerKind::BusinessRule => self.config.markers.business_rule = identity,
        }
        self
    }

    pub fn strict_identity(mut self, strict: bool) -> Self {
        self.config.markers.strict_identity = strict;
        self
    }

    /// Disable a rule by code
    pub fn disable_rule(mut self, code: impl Into<String>) -> Self {
        self.config.rules.insert(code.into(), RuleOverride { enabled: false, severity: None });
        self
    }

    /// Override the severity of a rule
    pub fn rule_severity(mut self, code: impl Into<String>, severity: Severity) -> Self {
        self.config.rules.insert(code.into(), RuleOverride { enabled: true, severity: Some(severity) });
        self
    }

    pub fn report_internal_errors(mut self, enabled: bool) -> Self {
        self.config.analysis.report_internal_errors = enabled;
        self
    }

    pub fn parallel(mut self, enabled: bool) -> Self {
        self.config.analysis.parallel = enabled;
        self
    }

    /// Add a path pattern
    pub fn add_path_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.paths.patterns.push(pattern.into());
        self
    }

    /// Set the ignore file name
    pub fn ignore_file(mut self, filename: impl Into<String>) -> Self {
        self.config.paths.ignore_file = Some(filename.into());
        self
    }

    /// Build the final configuration
    pub fn build(self) -> StacksResult<StacksConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::MarkerKind;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = StacksConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.marker_set(), MarkerSet::stacks());
        assert!(config.analysis.parallel);
        assert_eq!(config.rule_set().unwrap().len(), 6);
    }

    #[test]
    fn test_load_from_str_with_partial_sections() {
        let yaml = r#"
version: "1.0"
markers:
  event: Acme.Messaging.Event
  strict_identity: true
rules:
  SS001:
    enabled: false
  SS301:
    severity: error
analysis:
  report_internal_errors: true
"#;
        let config = StacksConfig::load_from_str(yaml).unwrap();

        assert_eq!(config.markers.event, "Acme.Messaging.Event");
        assert_eq!(config.markers.command, "Slalom.Stacks.Messaging.Command");
        assert!(config.markers.strict_identity);
        assert!(!config.rules["SS001"].enabled);
        assert_eq!(config.rules["SS301"].severity, Some(Severity::Error));
        assert!(config.rules["SS301"].enabled);
        assert!(config.analysis.parallel);
        assert_eq!(config.paths, PathConfig::default());
    }

    #[test]
    fn test_validation_failures() {
        assert!(StacksConfig::load_from_str("version: \"2.0\"").is_err());
        assert!(StacksConfig::load_from_str("markers:\n  event: \"Not An Identity\"").is_err());
        assert!(StacksConfig::load_from_str("rules:\n  SS404:\n    enabled: false").is_err());
        assert!(StacksConfig::load_from_str("rules:\n  SS900:\n    enabled: false").is_err());
        assert!(StacksConfig::load_from_str("paths:\n  patterns: [\"[invalid\"]").is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .marker(MarkerKind::Event, "Acme.Event")
            .rule_severity("SS002", Severity::Error)
            .disable_rule("SS302")
            .parallel(false)
            .build()
            .unwrap();

        assert_eq!(config.markers.event, "Acme.Event");
        assert!(!config.analysis.parallel);
        let rules = config.rule_set().unwrap();
        assert_eq!(rules.len(), 5);

        assert!(ConfigBuilder::new().marker(MarkerKind::Root, "").build().is_err());
    }

    #[test]
    fn test_fingerprint_tracks_changes() {
        let base = StacksConfig::default();
        let changed = ConfigBuilder::new().strict_identity(true).build().unwrap();

        assert_eq!(base.fingerprint(), StacksConfig::default().fingerprint());
        assert_ne!(base.fingerprint(), changed.fingerprint());
    }

    #[test]
    fn test_discover_and_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(StacksConfig::discover(temp_dir.path()).is_none());

        let path = temp_dir.path().join("stacks_lint.yml");
        fs::write(&path, "version: \"1.0\"\nanalysis:\n  parallel: false\n").unwrap();

        assert_eq!(StacksConfig::discover(temp_dir.path()), Some(path.clone()));
        let config = StacksConfig::load_from_file(&path).unwrap();
        assert!(!config.analysis.parallel);
        assert!(config.to_json().unwrap().contains("\"parallel\": false"));
    }
}
