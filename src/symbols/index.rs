//! Whole-compilation lookups built once per analysis pass
//!
//! Rules observe one symbol at a time; questions like "does any business rule
//! target this command" need the whole compilation. The index answers them in
//! constant time after a single scan.

use super::resolver::{Taxonomy, TypeResolver};
use super::{Compilation, TypeId, TypeKind};
use std::collections::HashMap;
use tracing::debug;

/// Written name and arity of an unresolved external
type ExternalIdentity = (Option<String>, String, usize);

#[derive(Debug, Default, Clone)]
pub struct SymbolIndex {
    rules_by_target: HashMap<TypeId, Vec<TypeId>>,
    use_cases_by_command: HashMap<TypeId, Vec<TypeId>>,
    classifications: HashMap<TypeId, Taxonomy>,
    /// Externals interned per import set, mapped to one representative per written identity
    canonical: HashMap<TypeId, TypeId>,
}

impl SymbolIndex {
    /// Classify every declared type once and group business rules and use cases by command
    pub fn build(resolver: &TypeResolver<'_>) -> Self {
        let mut index = Self { canonical: canonical_externals(resolver.compilation()), ..Self::default() };

        for symbol in resolver.compilation().find_types(|_| true) {
            let taxonomy = resolver.classify(symbol.id);
            match taxonomy {
                Taxonomy::BusinessRule { target: Some(target) } => {
                    let target = index.canonical_id(target);
                    index.rules_by_target.entry(target).or_default().push(symbol.id);
                }
                Taxonomy::UseCase { command: Some(command), .. } => {
                    let command = index.canonical_id(command);
                    index.use_cases_by_command.entry(command).or_default().push(symbol.id);
                }
                _ => {}
            }
            index.classifications.insert(symbol.id, taxonomy);
        }

        debug!(
            "Indexed {} types: {} commands with rules, {} commands handled by use cases",
            index.classifications.len(),
            index.rules_by_target.len(),
            index.use_cases_by_command.len()
        );
        index
    }

    fn canonical_id(&self, id: TypeId) -> TypeId {
        self.canonical.get(&id).copied().unwrap_or(id)
    }

    /// Business rules whose base is parameterized by `command`
    pub fn rules_for(&self, command: TypeId) -> &[TypeId] {
        self.rules_by_target.get(&self.canonical_id(command)).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_rule_for(&self, command: TypeId) -> bool {
        !self.rules_for(command).is_empty()
    }

    /// Use cases whose base is parameterized by `command`
    pub fn use_cases_for(&self, command: TypeId) -> &[TypeId] {
        self.use_cases_by_command.get(&self.canonical_id(command)).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the type is the command of some declared use case
    pub fn is_use_case_command(&self, id: TypeId) -> bool {
        !self.use_cases_for(id).is_empty()
    }

    /// Memoized classification of a declared type
    pub fn taxonomy(&self, id: TypeId) -> Option<Taxonomy> {
        self.classifications.get(&id).copied()
    }
}

/// The same command referenced from files with different `using` lists is one type
/// for rule matching, even though marker identity keeps the references apart
fn canonical_externals(compilation: &Compilation) -> HashMap<TypeId, TypeId> {
    let mut first_seen: HashMap<ExternalIdentity, TypeId> = HashMap::new();
    let mut canonical = HashMap::new();
    for symbol in compilation.types().filter(|t| t.kind == TypeKind::External) {
        let identity = (symbol.namespace.clone(), symbol.name.clone(), symbol.type_parameters.len());
        let representative = *first_seen.entry(identity).or_insert(symbol.id);
        if representative != symbol.id {
            canonical.insert(symbol.id, representative);
        }
    }
    canonical
}
