//! Use case conventions: every use case has business rules and an implementation

use super::{AnalysisContext, ConventionRule, Finding, RuleFault, RuleOutcome};
use crate::domain::diagnostics::{Category, DiagnosticDescriptor, FixIntent, Severity};
use crate::symbols::{SymbolRef, Taxonomy, TypeSymbol, VisitKind};

/// Member names that count as a use case implementation
const IMPLEMENTATION_MEMBERS: [&str; 2] = ["Execute", "ExecuteAsync"];

pub const MISSING_BUSINESS_RULE: DiagnosticDescriptor = DiagnosticDescriptor {
    id: "SS301",
    title: "Use cases should have rules",
    message_format: "The use case '{0}' should have rules.",
    category: Category::Rules,
    severity: Severity::Warning,
    description: "A use case handling command T should be accompanied by at least one business rule \
                  deriving from BusinessRule<T> somewhere in the compilation.",
};

pub const MISSING_IMPLEMENTATION: DiagnosticDescriptor = DiagnosticDescriptor {
    id: "SS302",
    title: "Use cases should have an implementation",
    message_format: "The use case '{0}' should have an implementation.",
    category: Category::Rules,
    severity: Severity::Error,
    description: "A use case must declare an 'Execute' or 'ExecuteAsync' member.",
};

/// SS301: no business rule targets the use case's command
#[derive(Debug, Default, Clone, Copy)]
pub struct MissingBusinessRuleRule;

impl ConventionRule for MissingBusinessRuleRule {
    fn descriptor(&self) -> DiagnosticDescriptor {
        MISSING_BUSINESS_RULE
    }

    fn trigger(&self) -> VisitKind {
        VisitKind::Type
    }

    fn evaluate(&self, context: &AnalysisContext<'_>, symbol: SymbolRef) -> RuleOutcome {
        let declared = context.type_symbol(symbol)?;
        let Taxonomy::UseCase { command: Some(command), direct: true } = context.taxonomy(declared.id) else {
            return Ok(Vec::new());
        };
        if context.index().has_rule_for(command) {
            return Ok(Vec::new());
        }

        let command_name = context
            .compilation()
            .get(command)
            .map(|c| c.name.clone())
            .ok_or(RuleFault::MissingSymbol(SymbolRef::Type(command)))?;
        Ok(vec![Finding::named(&declared.name, declared.location.as_ref()).with_fix(
            FixIntent::SynthesizeBusinessRule { command: command_name, namespace: declared.namespace.clone() },
        )])
    }
}

/// SS302: the use case declares neither `Execute` nor `ExecuteAsync`
#[derive(Debug, Default, Clone, Copy)]
pub struct MissingImplementationRule;

impl ConventionRule for MissingImplementationRule {
    fn descriptor(&self) -> DiagnosticDescriptor {
        MISSING_IMPLEMENTATION
    }

    fn trigger(&self) -> VisitKind {
        VisitKind::Type
    }

    fn evaluate(&self, context: &AnalysisContext<'_>, symbol: SymbolRef) -> RuleOutcome {
        let declared = context.type_symbol(symbol)?;
        // open `UseCase<T>` bases carry no concrete command and are not checked
        let is_use_case =
            matches!(context.taxonomy(declared.id), Taxonomy::UseCase { command: Some(_), direct: true });
        if !is_use_case || implements(declared) {
            return Ok(Vec::new());
        }
        Ok(vec![Finding::named(&declared.name, declared.location.as_ref())])
    }
}

fn implements(declared: &TypeSymbol) -> bool {
    IMPLEMENTATION_MEMBERS.iter().any(|name| declared.declares_member(name))
}
