//! Convention rules evaluated against visited symbols
//!
//! Architecture: Strategy pattern behind an immutable rule set
//! - Each rule implements `ConventionRule` and is triggered by one symbol kind
//! - A rule returns findings or a `RuleFault`; it never reports directly
//! - The `RuleSet` carries effective descriptors and is threaded through the engine

pub mod messaging;
pub mod naming;
pub mod use_cases;

use crate::config::StacksConfig;
use crate::domain::diagnostics::{
    Category, DiagnosticDescriptor, FixIntent, Location, Severity, StacksError, StacksResult,
};
use crate::symbols::{
    Compilation, MarkerSet, MemberSymbol, SymbolIndex, SymbolRef, Taxonomy, TypeId, TypeResolver, TypeSymbol,
    VisitKind,
};
use once_cell::sync::OnceCell;
use tracing::debug;

pub use messaging::{MessageFieldRule, MutablePropertyRule};
pub use naming::{CommandNamingRule, EventNamingRule};
pub use use_cases::{MissingBusinessRuleRule, MissingImplementationRule};

/// Reported in place of a faulted evaluation when enabled in configuration
pub const INTERNAL_ERROR: DiagnosticDescriptor = DiagnosticDescriptor {
    id: "SS900",
    title: "Convention analysis did not complete",
    message_format: "Convention analysis of '{0}' did not complete.",
    category: Category::Analyzer,
    severity: Severity::Warning,
    description: "A rule failed unexpectedly while evaluating this symbol. Its diagnostics, if any, \
                  were suppressed. Other rules and symbols were still analyzed.",
};

/// Every diagnostic this analyzer can emit, in code order
pub fn catalog() -> Vec<DiagnosticDescriptor> {
    vec![
        naming::COMMAND_NAMING,
        naming::EVENT_NAMING,
        messaging::MUTABLE_PROPERTY,
        messaging::MESSAGE_FIELD,
        use_cases::MISSING_BUSINESS_RULE,
        use_cases::MISSING_IMPLEMENTATION,
        INTERNAL_ERROR,
    ]
}

/// Look up a descriptor by code, case-insensitively
pub fn find_descriptor(code: &str) -> Option<DiagnosticDescriptor> {
    catalog().into_iter().find(|d| d.id.eq_ignore_ascii_case(code))
}

/// Everything a rule may read while evaluating one symbol.
///
/// The whole-compilation index is built on first use and shared by all
/// evaluations of the pass, including concurrent ones.
pub struct AnalysisContext<'a> {
    resolver: TypeResolver<'a>,
    index: OnceCell<SymbolIndex>,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(compilation: &'a Compilation, markers: &'a MarkerSet) -> Self {
        Self { resolver: TypeResolver::new(compilation, markers), index: OnceCell::new() }
    }

    pub fn resolver(&self) -> &TypeResolver<'a> {
        &self.resolver
    }

    pub fn compilation(&self) -> &'a Compilation {
        self.resolver.compilation()
    }

    pub fn index(&self) -> &SymbolIndex {
        self.index.get_or_init(|| SymbolIndex::build(&self.resolver))
    }

    pub fn is_indexed(&self) -> bool {
        self.index.get().is_some()
    }

    pub fn taxonomy(&self, id: TypeId) -> Taxonomy {
        self.index().taxonomy(id).unwrap_or_else(|| self.resolver.classify(id))
    }

    /// The declared type behind a type symbol reference
    pub fn type_symbol(&self, symbol: SymbolRef) -> Result<&'a TypeSymbol, RuleFault> {
        match symbol {
            SymbolRef::Type(id) => self.compilation().get(id).ok_or(RuleFault::MissingSymbol(symbol)),
            SymbolRef::Member { .. } => {
                Err(RuleFault::UnexpectedSymbol { expected: VisitKind::Type, symbol })
            }
        }
    }

    /// The containing type and member behind a member symbol reference
    pub fn member_symbol(&self, symbol: SymbolRef) -> Result<(&'a TypeSymbol, &'a MemberSymbol), RuleFault> {
        match symbol {
            SymbolRef::Member { owner, index } => {
                let owner = self.compilation().get(owner).ok_or(RuleFault::MissingSymbol(symbol))?;
                let member = owner.members.get(index).ok_or(RuleFault::MissingSymbol(symbol))?;
                Ok((owner, member))
            }
            SymbolRef::Type(_) => Err(RuleFault::UnexpectedSymbol { expected: VisitKind::Property, symbol }),
        }
    }
}

/// Unexpected failure of one rule on one symbol
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleFault {
    #[error("symbol {0:?} is not part of the compilation")]
    MissingSymbol(SymbolRef),

    #[error("expected a {expected:?} symbol, got {symbol:?}")]
    UnexpectedSymbol { expected: VisitKind, symbol: SymbolRef },

    #[error("rule evaluation panicked: {0}")]
    Panicked(String),
}

/// A violation found by a rule, before it becomes a diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Name of the offending symbol
    pub symbol: String,
    /// Value substituted into the message template
    pub message_argument: String,
    /// `None` when the symbol has no source location
    pub location: Option<Location>,
    pub fixes: Vec<FixIntent>,
}

impl Finding {
    /// Finding about a symbol whose own name goes into the message
    pub fn named(symbol: &str, location: Option<&Location>) -> Self {
        Self {
            symbol: symbol.to_string(),
            message_argument: symbol.to_string(),
            location: location.cloned(),
            fixes: Vec::new(),
        }
    }

    pub fn with_message_argument(mut self, argument: &str) -> Self {
        self.message_argument = argument.to_string();
        self
    }

    pub fn with_fix(mut self, fix: FixIntent) -> Self {
        self.fixes.push(fix);
        self
    }
}

/// Result of evaluating one rule against one symbol
pub type RuleOutcome = Result<Vec<Finding>, RuleFault>;

/// A single convention check
pub trait ConventionRule: Send + Sync {
    /// Descriptor with the rule's default severity
    fn descriptor(&self) -> DiagnosticDescriptor;

    /// Symbol kind whose visitation triggers this rule
    fn trigger(&self) -> VisitKind;

    /// Evaluate the rule; must not depend on the order symbols are visited in
    fn evaluate(&self, context: &AnalysisContext<'_>, symbol: SymbolRef) -> RuleOutcome;
}

/// A rule together with its effective descriptor
pub struct RegisteredRule {
    rule: Box<dyn ConventionRule>,
    descriptor: DiagnosticDescriptor,
}

impl RegisteredRule {
    pub fn descriptor(&self) -> DiagnosticDescriptor {
        self.descriptor
    }

    pub fn code(&self) -> &'static str {
        self.descriptor.id
    }

    pub fn trigger(&self) -> VisitKind {
        self.rule.trigger()
    }

    pub fn evaluate(&self, context: &AnalysisContext<'_>, symbol: SymbolRef) -> RuleOutcome {
        self.rule.evaluate(context, symbol)
    }
}

impl std::fmt::Debug for RegisteredRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredRule").field("descriptor", &self.descriptor).finish()
    }
}

/// Immutable, ordered collection of enabled rules
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<RegisteredRule>,
    report_internal_errors: bool,
}

impl RuleSet {
    /// An empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    /// All conventions at their default severities
    pub fn standard() -> Self {
        standard_rules().into_iter().fold(Self::new(), |set, rule| set.with_rule(rule))
    }

    /// Rules enabled by the configuration, with severity overrides applied
    pub fn from_config(config: &StacksConfig) -> StacksResult<Self> {
        for code in config.rules.keys() {
            if find_descriptor(code).map(|d| d.id != INTERNAL_ERROR.id) != Some(true) {
                return Err(StacksError::config(format!("Unknown rule code '{code}'")));
            }
        }

        let mut set = Self::new().reporting_internal_errors(config.analysis.report_internal_errors);
        for rule in standard_rules() {
            let default = rule.descriptor();
            let overrides = config.rules.iter().find(|(code, _)| code.eq_ignore_ascii_case(default.id));
            match overrides {
                Some((_, o)) if !o.enabled => {
                    debug!("Rule {} disabled by configuration", default.id);
                }
                Some((_, o)) => {
                    let severity = o.severity.unwrap_or(default.severity);
                    set = set.with_rule_at(rule, severity);
                }
                None => set = set.with_rule(rule),
            }
        }

        debug!("Registered {} convention rules", set.len());
        Ok(set)
    }

    /// Add a rule at its default severity
    pub fn with_rule(self, rule: Box<dyn ConventionRule>) -> Self {
        let severity = rule.descriptor().severity;
        self.with_rule_at(rule, severity)
    }

    /// Add a rule with an overridden severity
    pub fn with_rule_at(mut self, rule: Box<dyn ConventionRule>, severity: Severity) -> Self {
        let descriptor = rule.descriptor().with_severity(severity);
        self.rules.push(RegisteredRule { rule, descriptor });
        self
    }

    pub fn reporting_internal_errors(mut self, enabled: bool) -> Self {
        self.report_internal_errors = enabled;
        self
    }

    pub fn reports_internal_errors(&self) -> bool {
        self.report_internal_errors
    }

    /// Descriptors of every registered rule, advertised to hosts
    pub fn descriptors(&self) -> Vec<DiagnosticDescriptor> {
        let mut descriptors: Vec<_> = self.rules.iter().map(|r| r.descriptor).collect();
        if self.report_internal_errors {
            descriptors.push(INTERNAL_ERROR);
        }
        descriptors
    }

    /// Rules triggered by the given symbol kind, in registration order
    pub fn triggered_by(&self, kind: VisitKind) -> impl Iterator<Item = &RegisteredRule> {
        self.rules.iter().filter(move |r| r.trigger() == kind)
    }

    pub fn rules(&self) -> &[RegisteredRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn standard_rules() -> Vec<Box<dyn ConventionRule>> {
    vec![
        Box::new(CommandNamingRule),
        Box::new(EventNamingRule),
        Box::new(MutablePropertyRule),
        Box::new(MessageFieldRule),
        Box::new(MissingBusinessRuleRule),
        Box::new(MissingImplementationRule),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::analyzer::csharp::CSharpScanner;
    use crate::analyzer::SourceFrontend;
    use crate::symbols::{Compilation, CompilationBuilder};

    /// Compile C# snippets, each as its own file
    pub fn compile(sources: &[&str]) -> Compilation {
        let scanner = CSharpScanner::new();
        let mut builder = CompilationBuilder::new("System.Object");
        for (i, source) in sources.iter().enumerate() {
            let path = format!("Test{i}.cs");
            let file = scanner.scan(path.as_ref(), source).expect("fixture should scan");
            builder.add_source(file);
        }
        builder.build()
    }
}
