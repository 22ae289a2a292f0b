//! Binding of source declarations into a `Compilation`
//!
//! Name lookup for a type reference, first match wins:
//! 0. `using` aliases are expanded to their target, for the name or the first qualifier segment
//! 1. type parameters of the declaration and its containing types
//! 2. declared types in the current namespace, then each enclosing namespace, then the global one
//! 3. declared types in the file's `using` namespaces
//! 4. otherwise an external symbol is interned for the reference

use super::declarations::{
    DeclarationKind, MemberDeclaration, MemberDeclarationKind, SourceFile, TypeDeclaration, TypeSyntax, UsingAlias,
};
use super::{Accessibility, Compilation, MemberSymbol, Setter, TypeId, TypeKind, TypeRef, TypeSymbol};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, trace};

/// Keyword aliases of framework types
const PREDEFINED_TYPES: &[(&str, &str)] = &[
    ("string", "String"),
    ("bool", "Boolean"),
    ("byte", "Byte"),
    ("sbyte", "SByte"),
    ("char", "Char"),
    ("short", "Int16"),
    ("ushort", "UInt16"),
    ("int", "Int32"),
    ("uint", "UInt32"),
    ("long", "Int64"),
    ("ulong", "UInt64"),
    ("float", "Single"),
    ("double", "Double"),
    ("decimal", "Decimal"),
    ("void", "Void"),
];

type DeclaredKey = (Option<String>, String, usize);
/// Unqualified externals are keyed by the imports in scope, so equally named
/// references from unrelated namespaces stay distinct symbols
type ExternalKey = (Option<String>, String, usize, String);

/// Collects source files and binds them into an immutable compilation
#[derive(Debug)]
pub struct CompilationBuilder {
    root_namespace: Option<String>,
    root_name: String,
    sources: Vec<SourceFile>,
}

impl CompilationBuilder {
    /// `root_identity` is the fully-qualified universal root, e.g. `System.Object`
    pub fn new(root_identity: &str) -> Self {
        let (root_namespace, root_name) = match root_identity.rsplit_once('.') {
            Some((namespace, name)) => (Some(namespace.to_string()), name.to_string()),
            None => (None, root_identity.to_string()),
        };
        Self { root_namespace, root_name, sources: Vec::new() }
    }

    pub fn add_source(&mut self, file: SourceFile) -> &mut Self {
        self.sources.push(file);
        self
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn build(self) -> Compilation {
        let mut binder = Binder {
            types: Vec::new(),
            declared: HashMap::new(),
            externals: HashMap::new(),
            parameters: HashMap::new(),
            root_namespace: self.root_namespace,
            root_name: self.root_name,
        };

        let mut parts: Vec<Vec<Part<'_>>> = Vec::new();
        for (file_index, file) in self.sources.iter().enumerate() {
            for declaration in &file.types {
                binder.declare(declaration, declaration.namespace.clone(), None, file_index, &mut parts);
            }
        }

        let declared_count = parts.len();
        for (index, type_parts) in parts.iter().enumerate() {
            let id = TypeId::from_raw(index as u32);
            binder.bind_declaration(id, type_parts, &self.sources);
        }

        debug!(
            "Built compilation: {} declared types, {} referenced types, {} files",
            declared_count,
            binder.types.len() - declared_count,
            self.sources.len()
        );

        let files: Vec<PathBuf> = self.sources.iter().map(|f| f.path.clone()).collect();
        Compilation::from_parts(binder.types, files)
    }
}

/// One syntactic declaration of a (possibly partial) type
struct Part<'a> {
    declaration: &'a TypeDeclaration,
    file: usize,
}

struct Scope<'a> {
    namespace: Option<&'a str>,
    imports: &'a [String],
    aliases: &'a [UsingAlias],
    /// Innermost declaration first
    type_parameters: Vec<(TypeId, String)>,
}

impl Scope<'_> {
    /// The reference with a leading alias replaced by its target
    fn expand_alias(&self, syntax: &TypeSyntax) -> Option<TypeSyntax> {
        match syntax.qualifier.as_deref() {
            None if syntax.arguments.is_empty() => {
                let alias = self.aliases.iter().find(|a| a.alias == syntax.name)?;
                Some(alias.target.clone())
            }
            None => None,
            Some(qualifier) => {
                let (head, rest) = match qualifier.split_once('.') {
                    Some((head, rest)) => (head, Some(rest)),
                    None => (qualifier, None),
                };
                let alias = self.aliases.iter().find(|a| a.alias == head)?;
                let target = alias.target.dotted_name();
                let qualifier = match rest {
                    Some(rest) => format!("{target}.{rest}"),
                    None => target,
                };
                Some(TypeSyntax {
                    qualifier: Some(qualifier),
                    name: syntax.name.clone(),
                    arguments: syntax.arguments.clone(),
                })
            }
        }
    }
}

struct Binder {
    types: Vec<TypeSymbol>,
    declared: HashMap<DeclaredKey, TypeId>,
    externals: HashMap<ExternalKey, TypeId>,
    parameters: HashMap<(TypeId, String), TypeId>,
    root_namespace: Option<String>,
    root_name: String,
}

impl Binder {
    /// Register a declaration and its nested types; nested types live in `Namespace.Outer`
    fn declare<'a>(
        &mut self,
        declaration: &'a TypeDeclaration,
        namespace: Option<String>,
        containing: Option<TypeId>,
        file: usize,
        parts: &mut Vec<Vec<Part<'a>>>,
    ) {
        let key = (namespace.clone(), declaration.name.clone(), declaration.type_parameters.len());
        let id = match self.declared.get(&key) {
            Some(&existing) => {
                trace!("Merging partial declaration of '{}'", declaration.name);
                parts[existing.to_raw() as usize].push(Part { declaration, file });
                existing
            }
            None => {
                let id = TypeId::from_raw(self.types.len() as u32);
                let mut symbol = TypeSymbol::new(declaration.name.clone(), declared_kind(declaration.kind));
                symbol.id = id;
                symbol.namespace = namespace.clone();
                symbol.type_parameters = declaration.type_parameters.clone();
                symbol.location = Some(declaration.location.clone());
                symbol.containing_type = containing;
                self.types.push(symbol);
                self.declared.insert(key, id);
                parts.push(vec![Part { declaration, file }]);
                id
            }
        };

        let nested_namespace = match &namespace {
            Some(ns) => format!("{ns}.{}", declaration.name),
            None => declaration.name.clone(),
        };
        for nested in &declaration.nested {
            self.declare(nested, Some(nested_namespace.clone()), Some(id), file, parts);
        }
    }

    fn bind_declaration(&mut self, id: TypeId, parts: &[Part<'_>], sources: &[SourceFile]) {
        let index = id.to_raw() as usize;
        let kind = self.types[index].kind;
        let namespace = self.types[index].namespace.clone();

        // base list comes from the first part that declares one
        let base_part = parts.iter().find(|p| !p.declaration.base_list.is_empty()).unwrap_or(&parts[0]);
        let scope = Scope {
            namespace: namespace.as_deref(),
            imports: &sources[base_part.file].imports,
            aliases: &sources[base_part.file].aliases,
            type_parameters: self.type_parameters_in_scope(id),
        };
        let written: Vec<TypeRef> = base_part.declaration.base_list.iter().map(|s| self.resolve(s, &scope)).collect();
        let (base, interfaces) = self.split_base_list(kind, written);

        let mut members = Vec::new();
        for part in parts {
            for member in &part.declaration.members {
                members.extend(member_symbols(member));
            }
        }

        let symbol = &mut self.types[index];
        symbol.base = base;
        symbol.interfaces = interfaces;
        symbol.members = members;
    }

    fn type_parameters_in_scope(&self, id: TypeId) -> Vec<(TypeId, String)> {
        let mut parameters = Vec::new();
        let mut current = Some(id);
        while let Some(owner) = current {
            let symbol = &self.types[owner.to_raw() as usize];
            parameters.extend(symbol.type_parameters.iter().map(|p| (owner, p.clone())));
            current = symbol.containing_type;
        }
        parameters
    }

    fn split_base_list(&mut self, kind: TypeKind, written: Vec<TypeRef>) -> (Option<TypeRef>, Vec<TypeRef>) {
        match kind {
            TypeKind::Class | TypeKind::Record => {
                let starts_with_class = written.first().map(|first| !self.is_interface(first)).unwrap_or(false);
                if starts_with_class {
                    let mut written = written.into_iter();
                    let base = written.next();
                    (base, written.collect())
                } else {
                    let root = self.root();
                    (Some(TypeRef::to(self.root_name.clone(), root)), written)
                }
            }
            _ => (None, written),
        }
    }

    fn is_interface(&self, reference: &TypeRef) -> bool {
        let Some(symbol) = reference.target.and_then(|id| self.types.get(id.to_raw() as usize)) else {
            return false;
        };
        match symbol.kind {
            TypeKind::Interface => true,
            TypeKind::External => has_interface_shape(&symbol.name),
            _ => false,
        }
    }

    fn resolve(&mut self, syntax: &TypeSyntax, scope: &Scope<'_>) -> TypeRef {
        let is_parameter =
            syntax.qualifier.is_none() && scope.type_parameters.iter().any(|(_, p)| *p == syntax.name);
        if !is_parameter {
            if let Some(expanded) = scope.expand_alias(syntax) {
                trace!("Alias '{}' expands to '{}'", syntax.dotted_name(), expanded.dotted_name());
                return self.resolve_written(&expanded, scope);
            }
        }
        self.resolve_written(syntax, scope)
    }

    fn resolve_written(&mut self, syntax: &TypeSyntax, scope: &Scope<'_>) -> TypeRef {
        let arguments: Vec<TypeRef> = syntax.arguments.iter().map(|a| self.resolve(a, scope)).collect();
        let target = self.bind(syntax, scope);
        TypeRef::new(syntax.name.clone(), Some(target)).with_arguments(arguments)
    }

    fn bind(&mut self, syntax: &TypeSyntax, scope: &Scope<'_>) -> TypeId {
        let arity = syntax.arguments.len();
        let name = syntax.name.as_str();

        if syntax.qualifier.is_none() && arity == 0 {
            if name == "object" {
                return self.root();
            }
            if let Some((_, framework_name)) = PREDEFINED_TYPES.iter().find(|(keyword, _)| *keyword == name) {
                return self.intern_external(Some("System"), framework_name, 0, &[]);
            }
            if let Some((owner, _)) = scope.type_parameters.iter().find(|(_, p)| p.as_str() == name) {
                return self.intern_parameter(*owner, name);
            }
        }

        match syntax.qualifier.as_deref() {
            Some(qualifier) => {
                if let Some(id) = self.lookup(Some(qualifier), name, arity) {
                    return id;
                }
                for namespace in namespace_chain(scope.namespace).into_iter().flatten() {
                    let candidate = format!("{namespace}.{qualifier}");
                    if let Some(id) = self.lookup(Some(&candidate), name, arity) {
                        return id;
                    }
                }
                self.intern_external(Some(qualifier), name, arity, &[])
            }
            None => {
                for namespace in namespace_chain(scope.namespace) {
                    if let Some(id) = self.lookup(namespace, name, arity) {
                        return id;
                    }
                }
                for import in scope.imports {
                    if let Some(id) = self.lookup(Some(import), name, arity) {
                        return id;
                    }
                }
                self.intern_external(None, name, arity, scope.imports)
            }
        }
    }

    fn lookup(&self, namespace: Option<&str>, name: &str, arity: usize) -> Option<TypeId> {
        self.declared.get(&(namespace.map(str::to_string), name.to_string(), arity)).copied()
    }

    fn root(&mut self) -> TypeId {
        let namespace = self.root_namespace.clone();
        let name = self.root_name.clone();
        match self.lookup(namespace.as_deref(), &name, 0) {
            Some(id) => id,
            None => self.intern_external(namespace.as_deref(), &name, 0, &[]),
        }
    }

    fn intern_external(&mut self, qualifier: Option<&str>, name: &str, arity: usize, imports: &[String]) -> TypeId {
        let mut imports: Vec<String> = if qualifier.is_some() { Vec::new() } else { imports.to_vec() };
        imports.sort();
        imports.dedup();

        let key = (qualifier.map(str::to_string), name.to_string(), arity, imports.join(";"));
        if let Some(&id) = self.externals.get(&key) {
            return id;
        }

        let id = TypeId::from_raw(self.types.len() as u32);
        let mut symbol = TypeSymbol::new(name, TypeKind::External).with_imports(imports);
        symbol.id = id;
        symbol.namespace = qualifier.map(str::to_string);
        symbol.type_parameters = (0..arity).map(|i| format!("T{i}")).collect();
        self.types.push(symbol);
        self.externals.insert(key, id);
        id
    }

    fn intern_parameter(&mut self, owner: TypeId, name: &str) -> TypeId {
        if let Some(&id) = self.parameters.get(&(owner, name.to_string())) {
            return id;
        }

        let id = TypeId::from_raw(self.types.len() as u32);
        let mut symbol = TypeSymbol::new(name, TypeKind::TypeParameter);
        symbol.id = id;
        symbol.containing_type = Some(owner);
        self.types.push(symbol);
        self.parameters.insert((owner, name.to_string()), id);
        id
    }
}

fn declared_kind(kind: DeclarationKind) -> TypeKind {
    match kind {
        DeclarationKind::Class => TypeKind::Class,
        DeclarationKind::Struct | DeclarationKind::RecordStruct => TypeKind::Struct,
        DeclarationKind::Interface => TypeKind::Interface,
        DeclarationKind::Record => TypeKind::Record,
    }
}

/// `A.B.C` yields `A.B.C`, `A.B`, `A`, then the global namespace
fn namespace_chain(namespace: Option<&str>) -> Vec<Option<&str>> {
    let mut chain = Vec::new();
    let mut current = namespace;
    while let Some(ns) = current {
        chain.push(Some(ns));
        current = ns.rsplit_once('.').map(|(parent, _)| parent);
    }
    chain.push(None);
    chain
}

/// `IFoo` style names are assumed to be interfaces when the definition is not available
fn has_interface_shape(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next() == Some('I') && chars.next().map(|c| c.is_ascii_uppercase()).unwrap_or(false)
}

fn member_symbols(member: &MemberDeclaration) -> Vec<MemberSymbol> {
    match &member.kind {
        MemberDeclarationKind::Property { setter, auto_implemented } => {
            let setter = setter.map(|s| Setter { accessibility: s.accessibility, init_only: s.init_only });
            let property =
                MemberSymbol::property(member.name.clone(), member.accessibility, setter).at(member.location.clone());
            if *auto_implemented {
                let backing = MemberSymbol::field(format!("<{}>k__BackingField", member.name), Accessibility::Private)
                    .implicit();
                vec![property, backing]
            } else {
                vec![property]
            }
        }
        MemberDeclarationKind::Field => {
            vec![MemberSymbol::field(member.name.clone(), member.accessibility).at(member.location.clone())]
        }
        MemberDeclarationKind::Method => {
            vec![MemberSymbol::method(member.name.clone(), member.accessibility).at(member.location.clone())]
        }
    }
}
