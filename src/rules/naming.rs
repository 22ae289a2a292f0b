//! Naming conventions for message types

use super::{AnalysisContext, ConventionRule, Finding, RuleOutcome};
use crate::domain::diagnostics::{Category, DiagnosticDescriptor, FixIntent, Severity};
use crate::symbols::{SymbolRef, Taxonomy, TypeSymbol, VisitKind};

pub const COMMAND_NAMING: DiagnosticDescriptor = DiagnosticDescriptor {
    id: "SS001",
    title: "Commands should end in 'Command'",
    message_format: "The type name '{0}' should end in 'Command'",
    category: Category::Naming,
    severity: Severity::Warning,
    description: "Types deriving directly from the command base should carry the 'Command' suffix \
                  so that messages are recognizable at their use sites.",
};

pub const EVENT_NAMING: DiagnosticDescriptor = DiagnosticDescriptor {
    id: "SS002",
    title: "Events should end in 'Event'",
    message_format: "The type name '{0}' should end in 'Event'",
    category: Category::Naming,
    severity: Severity::Warning,
    description: "Types deriving, directly or transitively, from the event base should carry the \
                  'Event' suffix.",
};

/// SS001: direct subclasses of the command marker
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandNamingRule;

impl ConventionRule for CommandNamingRule {
    fn descriptor(&self) -> DiagnosticDescriptor {
        COMMAND_NAMING
    }

    fn trigger(&self) -> VisitKind {
        VisitKind::Type
    }

    fn evaluate(&self, context: &AnalysisContext<'_>, symbol: SymbolRef) -> RuleOutcome {
        let declared = context.type_symbol(symbol)?;
        match context.taxonomy(declared.id) {
            Taxonomy::Command { direct: true } => Ok(missing_suffix(declared, "Command")),
            _ => Ok(Vec::new()),
        }
    }
}

/// SS002: anything deriving from the event marker
#[derive(Debug, Default, Clone, Copy)]
pub struct EventNamingRule;

impl ConventionRule for EventNamingRule {
    fn descriptor(&self) -> DiagnosticDescriptor {
        EVENT_NAMING
    }

    fn trigger(&self) -> VisitKind {
        VisitKind::Type
    }

    fn evaluate(&self, context: &AnalysisContext<'_>, symbol: SymbolRef) -> RuleOutcome {
        let declared = context.type_symbol(symbol)?;
        match context.taxonomy(declared.id) {
            Taxonomy::Event => Ok(missing_suffix(declared, "Event")),
            _ => Ok(Vec::new()),
        }
    }
}

fn missing_suffix(declared: &TypeSymbol, suffix: &str) -> Vec<Finding> {
    if declared.name.ends_with(suffix) {
        return Vec::new();
    }
    vec![Finding::named(&declared.name, declared.location.as_ref())
        .with_fix(FixIntent::AppendSuffix { suffix: suffix.to_string() })]
}
