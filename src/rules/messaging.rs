//! Immutability conventions for message types

use super::{AnalysisContext, ConventionRule, Finding, RuleOutcome};
use crate::domain::diagnostics::{Category, DiagnosticDescriptor, FixIntent, Severity};
use crate::symbols::{SymbolRef, Taxonomy, VisitKind};

pub const MUTABLE_PROPERTY: DiagnosticDescriptor = DiagnosticDescriptor {
    id: "SS101",
    title: "Message properties must be immutable",
    message_format: "The property '{0}' cannot be mutable.",
    category: Category::Messaging,
    severity: Severity::Error,
    description: "Events, and commands handled by a use case, are immutable once created. \
                  Properties on them must not expose a public setter; 'init' accessors are allowed.",
};

pub const MESSAGE_FIELD: DiagnosticDescriptor = DiagnosticDescriptor {
    id: "SS102",
    title: "Message types cannot have fields",
    message_format: "The message type '{0}' cannot have fields.",
    category: Category::Messaging,
    severity: Severity::Error,
    description: "Event types expose their data through properties only. Compiler-generated \
                  backing fields of auto-properties are not reported.",
};

/// SS101: public setters on events and use case commands
#[derive(Debug, Default, Clone, Copy)]
pub struct MutablePropertyRule;

impl ConventionRule for MutablePropertyRule {
    fn descriptor(&self) -> DiagnosticDescriptor {
        MUTABLE_PROPERTY
    }

    fn trigger(&self) -> VisitKind {
        VisitKind::Property
    }

    fn evaluate(&self, context: &AnalysisContext<'_>, symbol: SymbolRef) -> RuleOutcome {
        let (owner, property) = context.member_symbol(symbol)?;
        if !property.has_public_setter() {
            return Ok(Vec::new());
        }

        let is_message = matches!(context.taxonomy(owner.id), Taxonomy::Event)
            || context.index().is_use_case_command(owner.id);
        if !is_message {
            return Ok(Vec::new());
        }

        Ok(vec![Finding::named(&property.name, property.location.as_ref())
            .with_fix(FixIntent::RemoveSetter)
            .with_fix(FixIntent::DemoteSetter)])
    }
}

/// SS102: fields declared on events
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageFieldRule;

impl ConventionRule for MessageFieldRule {
    fn descriptor(&self) -> DiagnosticDescriptor {
        MESSAGE_FIELD
    }

    fn trigger(&self) -> VisitKind {
        VisitKind::Field
    }

    fn evaluate(&self, context: &AnalysisContext<'_>, symbol: SymbolRef) -> RuleOutcome {
        let (owner, field) = context.member_symbol(symbol)?;
        if field.is_backing_field() || !matches!(context.taxonomy(owner.id), Taxonomy::Event) {
            return Ok(Vec::new());
        }

        // reported at the field, named after the message type
        Ok(vec![Finding::named(&field.name, field.location.as_ref()).with_message_argument(&owner.name)])
    }
}
