//! Type-taxonomy resolution over the compilation graph
//!
//! Architecture: Pure functions of the symbol graph
//! - Ancestry walks `base` links up to, but excluding, the universal root
//! - Framework markers are matched by fully-qualified identity where the graph knows it
//! - Each visited type gets exactly one `Taxonomy` variant

use super::{Compilation, TypeId, TypeKind, TypeSymbol};
use std::collections::HashSet;
use tracing::trace;

/// Framework base types the conventions are keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Root,
    Command,
    Event,
    UseCase,
    BusinessRule,
}

impl MarkerKind {
    pub const ALL: [MarkerKind; 5] =
        [MarkerKind::Root, MarkerKind::Command, MarkerKind::Event, MarkerKind::UseCase, MarkerKind::BusinessRule];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Command => "command",
            Self::Event => "event",
            Self::UseCase => "use_case",
            Self::BusinessRule => "business_rule",
        }
    }
}

/// A fully-qualified marker identity split into namespace and simple name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    identity: String,
    namespace: Option<String>,
    name: String,
}

impl Marker {
    pub fn new(identity: &str) -> Self {
        let (namespace, name) = match identity.rsplit_once('.') {
            Some((namespace, name)) => (Some(namespace.to_string()), name.to_string()),
            None => (None, identity.to_string()),
        };
        Self { identity: identity.to_string(), namespace, name }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

/// Marker identities for one analysis pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSet {
    root: Marker,
    command: Marker,
    event: Marker,
    use_case: Marker,
    business_rule: Marker,
    /// Refuse simple-name matches for references whose namespace is unknown
    strict_identity: bool,
}

impl MarkerSet {
    pub fn new(
        root: &str,
        command: &str,
        event: &str,
        use_case: &str,
        business_rule: &str,
        strict_identity: bool,
    ) -> Self {
        Self {
            root: Marker::new(root),
            command: Marker::new(command),
            event: Marker::new(event),
            use_case: Marker::new(use_case),
            business_rule: Marker::new(business_rule),
            strict_identity,
        }
    }

    /// The Slalom Stacks messaging types
    pub fn stacks() -> Self {
        Self::new(
            "System.Object",
            "Slalom.Stacks.Messaging.Command",
            "Slalom.Stacks.Messaging.Event",
            "Slalom.Stacks.Messaging.UseCase",
            "Slalom.Stacks.Messaging.Validation.BusinessRule",
            false,
        )
    }

    pub fn with_strict_identity(mut self, strict: bool) -> Self {
        self.strict_identity = strict;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict_identity
    }

    pub fn marker(&self, kind: MarkerKind) -> &Marker {
        match kind {
            MarkerKind::Root => &self.root,
            MarkerKind::Command => &self.command,
            MarkerKind::Event => &self.event,
            MarkerKind::UseCase => &self.use_case,
            MarkerKind::BusinessRule => &self.business_rule,
        }
    }

    /// Whether `symbol` is the marker type of the given kind.
    ///
    /// Known identities must match exactly. An unqualified external reference matches
    /// through its file's imports, or by simple name unless identity is strict.
    pub fn matches(&self, symbol: &TypeSymbol, kind: MarkerKind) -> bool {
        if symbol.kind == TypeKind::TypeParameter {
            return false;
        }
        let marker = self.marker(kind);
        if symbol.name != marker.name {
            return false;
        }
        if let Some(qualified) = symbol.qualified_name() {
            return qualified == marker.identity;
        }
        if symbol.imports.iter().any(|ns| Some(ns.as_str()) == marker.namespace()) {
            return true;
        }
        !self.strict_identity
    }

    /// The marker kind `symbol` is, if any
    pub fn kind_of(&self, symbol: &TypeSymbol) -> Option<MarkerKind> {
        MarkerKind::ALL.into_iter().find(|kind| self.matches(symbol, *kind))
    }
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self::stacks()
    }
}

/// Closed classification of a declared type, decided by its nearest marker ancestor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Taxonomy {
    /// Derives from the universal root and no marker
    RootDerived,
    Command {
        /// The marker is the immediate base
        direct: bool,
    },
    Event,
    UseCase {
        /// Recovered from a direct `UseCase<T>` base; `None` when not recoverable
        command: Option<TypeId>,
        direct: bool,
    },
    BusinessRule {
        /// First generic argument of the type's own base
        target: Option<TypeId>,
    },
    Unclassified,
}

/// Answers ancestry questions for one compilation
#[derive(Debug, Clone, Copy)]
pub struct TypeResolver<'a> {
    compilation: &'a Compilation,
    markers: &'a MarkerSet,
}

impl<'a> TypeResolver<'a> {
    pub fn new(compilation: &'a Compilation, markers: &'a MarkerSet) -> Self {
        Self { compilation, markers }
    }

    pub fn compilation(&self) -> &'a Compilation {
        self.compilation
    }

    pub fn markers(&self) -> &'a MarkerSet {
        self.markers
    }

    /// Base types from nearest to farthest, excluding the root.
    ///
    /// Stops at an unresolved base and at the first repeated type, so the result
    /// is finite for any graph.
    pub fn ancestry_of(&self, id: TypeId) -> Vec<&'a TypeSymbol> {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = self.compilation.get(id).and_then(|symbol| symbol.base.as_ref());

        while let Some(reference) = current {
            let Some(base) = reference.target.and_then(|target| self.compilation.get(target)) else {
                trace!("Base '{}' is unresolved, ancestry ends", reference.name);
                break;
            };
            if base.name == self.markers.marker(MarkerKind::Root).name() {
                break;
            }
            if !seen.insert(base.id) {
                trace!("Cyclic base chain at '{}'", base.name);
                break;
            }
            chain.push(base);
            current = base.base.as_ref();
        }
        chain
    }

    /// Simple-name ancestry test, case-sensitive
    pub fn derives_from(&self, id: TypeId, base_name: &str) -> bool {
        self.ancestry_of(id).iter().any(|symbol| symbol.name == base_name)
    }

    /// Identity-aware ancestry test against a configured marker
    pub fn derives_from_marker(&self, id: TypeId, kind: MarkerKind) -> bool {
        self.ancestry_of(id).iter().any(|symbol| self.markers.matches(symbol, kind))
    }

    /// The immediate base, when it resolves
    pub fn direct_base(&self, id: TypeId) -> Option<&'a TypeSymbol> {
        let reference = self.compilation.get(id)?.base.as_ref()?;
        self.compilation.get(reference.target?)
    }

    /// `T` of a base shaped like `SomeGeneric<T>`
    pub fn first_generic_argument_of(&self, id: TypeId) -> Option<&'a TypeSymbol> {
        let argument = self.compilation.get(id)?.base.as_ref()?.first_argument()?;
        self.compilation.get(argument.target?)
    }

    pub fn classify(&self, id: TypeId) -> Taxonomy {
        let Some(symbol) = self.compilation.get(id) else {
            return Taxonomy::Unclassified;
        };
        if !symbol.kind.is_declared() {
            return Taxonomy::Unclassified;
        }

        for (depth, ancestor) in self.ancestry_of(id).into_iter().enumerate() {
            let direct = depth == 0;
            match self.markers.kind_of(ancestor) {
                Some(MarkerKind::Command) => return Taxonomy::Command { direct },
                Some(MarkerKind::Event) => return Taxonomy::Event,
                Some(MarkerKind::UseCase) => {
                    let command = if direct { self.command_argument(id) } else { None };
                    return Taxonomy::UseCase { command, direct };
                }
                Some(MarkerKind::BusinessRule) => {
                    let target = self.first_generic_argument_of(id).map(|t| t.id);
                    return Taxonomy::BusinessRule { target };
                }
                Some(MarkerKind::Root) | None => {}
            }
        }

        match self.direct_base(id) {
            Some(base) if self.markers.matches(base, MarkerKind::Root) => Taxonomy::RootDerived,
            _ => Taxonomy::Unclassified,
        }
    }

    /// The concrete command type of a `UseCase<T>` base; open type parameters do not count
    fn command_argument(&self, id: TypeId) -> Option<TypeId> {
        match self.first_generic_argument_of(id) {
            Some(argument) if argument.kind != TypeKind::TypeParameter => Some(argument.id),
            Some(_) => None,
            None => {
                trace!("No generic argument recoverable from the use case base of {:?}", id);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{TypeRef, TypeSymbol};
    use rstest::rstest;

    fn id(raw: u32) -> TypeId {
        TypeId::from_raw(raw)
    }

    /// 0 Object, 1 Event, 2 Command, 3 UseCase, 4 BusinessRule, then declared types
    fn graph(declared: Vec<TypeSymbol>) -> Compilation {
        let mut types = vec![
            TypeSymbol::new("Object", TypeKind::External).in_namespace("System"),
            TypeSymbol::new("Event", TypeKind::External),
            TypeSymbol::new("Command", TypeKind::External),
            TypeSymbol::new("UseCase", TypeKind::External),
            TypeSymbol::new("BusinessRule", TypeKind::External),
        ];
        types.extend(declared);
        Compilation::from_types(types)
    }

    fn class(name: &str, base: TypeRef) -> TypeSymbol {
        TypeSymbol::new(name, TypeKind::Class).with_base(base)
    }

    #[test]
    fn test_ancestry_excludes_root_and_is_ordered() {
        let compilation = graph(vec![
            class("DomainEvent", TypeRef::to("Event", id(1))),
            class("ItemAddedEvent", TypeRef::to("DomainEvent", id(5))),
        ]);
        let markers = MarkerSet::stacks();
        let resolver = TypeResolver::new(&compilation, &markers);

        let names: Vec<&str> = resolver.ancestry_of(id(6)).iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["DomainEvent", "Event"]);
        assert!(resolver.derives_from(id(6), "Event"));
        assert!(!resolver.derives_from(id(6), "event"));
        assert_eq!(resolver.classify(id(6)), Taxonomy::Event);
    }

    #[test]
    fn test_cyclic_graph_terminates() {
        let compilation = graph(vec![class("A", TypeRef::to("B", id(6))), class("B", TypeRef::to("A", id(5)))]);
        let markers = MarkerSet::stacks();
        let resolver = TypeResolver::new(&compilation, &markers);

        let names: Vec<&str> = resolver.ancestry_of(id(5)).iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["B"]);
        assert_eq!(resolver.classify(id(5)), Taxonomy::Unclassified);
    }

    #[test]
    fn test_unresolved_base_ends_ancestry() {
        let compilation = graph(vec![class("Orphan", TypeRef::unresolved("Missing"))]);
        let markers = MarkerSet::stacks();
        let resolver = TypeResolver::new(&compilation, &markers);

        assert!(resolver.ancestry_of(id(5)).is_empty());
        assert!(!resolver.derives_from(id(5), "Missing"));
        assert_eq!(resolver.classify(id(5)), Taxonomy::Unclassified);
    }

    #[test]
    fn test_use_case_command_recovery() {
        let compilation = graph(vec![
            class("AddCommand", TypeRef::to("Command", id(2))),
            class("Add", TypeRef::to("UseCase", id(3)).with_arguments(vec![TypeRef::to("AddCommand", id(5))])),
            class("Bare", TypeRef::to("UseCase", id(3))),
            class("AddRule", TypeRef::to("BusinessRule", id(4)).with_arguments(vec![TypeRef::to("AddCommand", id(5))])),
        ]);
        let markers = MarkerSet::stacks();
        let resolver = TypeResolver::new(&compilation, &markers);

        assert_eq!(resolver.classify(id(5)), Taxonomy::Command { direct: true });
        assert_eq!(resolver.first_generic_argument_of(id(6)).map(|s| s.name.as_str()), Some("AddCommand"));
        assert_eq!(resolver.classify(id(6)), Taxonomy::UseCase { command: Some(id(5)), direct: true });
        assert_eq!(resolver.classify(id(7)), Taxonomy::UseCase { command: None, direct: true });
        assert_eq!(resolver.classify(id(8)), Taxonomy::BusinessRule { target: Some(id(5)) });
    }

    #[test]
    fn test_root_derived_and_externals() {
        let compilation = graph(vec![class("Plain", TypeRef::to("Object", id(0)))]);
        let markers = MarkerSet::stacks();
        let resolver = TypeResolver::new(&compilation, &markers);

        assert_eq!(resolver.classify(id(5)), Taxonomy::RootDerived);
        assert_eq!(resolver.classify(id(1)), Taxonomy::Unclassified);
        assert_eq!(resolver.classify(id(99)), Taxonomy::Unclassified);
    }

    #[rstest]
    #[case::qualified_match(Some("Slalom.Stacks.Messaging"), vec![], false, true)]
    #[case::qualified_elsewhere(Some("Other.Messaging"), vec![], false, false)]
    #[case::imported(None, vec!["Slalom.Stacks.Messaging"], true, true)]
    #[case::imported_elsewhere_strict(None, vec!["Other.Messaging"], true, false)]
    #[case::unqualified_lenient(None, vec![], false, true)]
    #[case::unqualified_strict(None, vec![], true, false)]
    fn test_marker_identity(
        #[case] namespace: Option<&str>,
        #[case] imports: Vec<&str>,
        #[case] strict: bool,
        #[case] expected: bool,
    ) {
        let mut symbol = TypeSymbol::new("Event", TypeKind::External)
            .with_imports(imports.into_iter().map(str::to_string).collect());
        symbol.namespace = namespace.map(str::to_string);
        let markers = MarkerSet::stacks().with_strict_identity(strict);

        assert_eq!(markers.matches(&symbol, MarkerKind::Event), expected);
    }

    #[test]
    fn test_declared_type_matches_only_by_identity() {
        let markers = MarkerSet::stacks();
        let local = TypeSymbol::new("Event", TypeKind::Class).in_namespace("Billing");
        let framework = TypeSymbol::new("Event", TypeKind::Class).in_namespace("Slalom.Stacks.Messaging");
        let parameter = TypeSymbol::new("Event", TypeKind::TypeParameter);

        assert!(!markers.matches(&local, MarkerKind::Event));
        assert!(markers.matches(&framework, MarkerKind::Event));
        assert!(!markers.matches(&parameter, MarkerKind::Event));
    }
}
