//! Read-only compilation view consumed by the rule engine
//!
//! Architecture: Anti-Corruption Layer - host declarations are normalized into a type graph
//! - `TypeSymbol` nodes are linked by `TypeRef` edges (base type, generic arguments)
//! - A `Compilation` is immutable once built and safe to share across threads
//! - Source scanners only ever talk to `CompilationBuilder`, never to rules

pub mod builder;
pub mod declarations;
pub mod index;
pub mod resolver;

pub use builder::CompilationBuilder;
pub use index::SymbolIndex;
pub use resolver::{MarkerKind, MarkerSet, Taxonomy, TypeResolver};

use crate::domain::diagnostics::Location;
use std::fmt;
use std::path::PathBuf;

/// Identifier of a type symbol inside one compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn to_raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Kind of type symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Class,
    Struct,
    Interface,
    Record,
    /// Referenced but not declared in this compilation (framework or library type)
    External,
    /// A generic parameter of an enclosing declaration
    TypeParameter,
}

impl TypeKind {
    /// Whether the symbol was declared in the analyzed sources
    pub fn is_declared(self) -> bool {
        matches!(self, Self::Class | Self::Struct | Self::Interface | Self::Record)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Interface => "interface",
            Self::Record => "record",
            Self::External => "external",
            Self::TypeParameter => "type parameter",
        }
    }
}

/// Reference to a (possibly constructed) type, e.g. the base `UseCase<AddCommand>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    /// Simple name as written
    pub name: String,
    /// Resolved definition; `None` when the host could not bind the reference
    pub target: Option<TypeId>,
    pub arguments: Vec<TypeRef>,
}

impl TypeRef {
    pub fn new(name: impl Into<String>, target: Option<TypeId>) -> Self {
        Self { name: name.into(), target, arguments: Vec::new() }
    }

    pub fn to(name: impl Into<String>, target: TypeId) -> Self {
        Self::new(name, Some(target))
    }

    pub fn unresolved(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    pub fn with_arguments(mut self, arguments: Vec<TypeRef>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn first_argument(&self) -> Option<&TypeRef> {
        self.arguments.first()
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.arguments.is_empty() {
            f.write_str("<")?;
            for (i, argument) in self.arguments.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{argument}")?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

/// Declared accessibility of a member or accessor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accessibility {
    Public,
    Internal,
    Protected,
    ProtectedInternal,
    PrivateProtected,
    Private,
}

impl Accessibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
            Self::Protected => "protected",
            Self::ProtectedInternal => "protected internal",
            Self::PrivateProtected => "private protected",
            Self::Private => "private",
        }
    }
}

/// Setter accessor of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setter {
    pub accessibility: Accessibility,
    /// `init` accessors can only be called during construction
    pub init_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberKind {
    Property { setter: Option<Setter> },
    Field,
    Method,
}

/// A property, field or method declared on a type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSymbol {
    pub name: String,
    pub kind: MemberKind,
    pub accessibility: Accessibility,
    pub location: Option<Location>,
    /// Synthesized by the compiler rather than written in source
    pub implicitly_declared: bool,
}

impl MemberSymbol {
    pub fn property(name: impl Into<String>, accessibility: Accessibility, setter: Option<Setter>) -> Self {
        Self::new(name, MemberKind::Property { setter }, accessibility)
    }

    pub fn field(name: impl Into<String>, accessibility: Accessibility) -> Self {
        Self::new(name, MemberKind::Field, accessibility)
    }

    pub fn method(name: impl Into<String>, accessibility: Accessibility) -> Self {
        Self::new(name, MemberKind::Method, accessibility)
    }

    fn new(name: impl Into<String>, kind: MemberKind, accessibility: Accessibility) -> Self {
        Self { name: name.into(), kind, accessibility, location: None, implicitly_declared: false }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn implicit(mut self) -> Self {
        self.implicitly_declared = true;
        self
    }

    /// Property with a mutating accessor callable from anywhere
    pub fn has_public_setter(&self) -> bool {
        match &self.kind {
            MemberKind::Property { setter: Some(setter) } => {
                !setter.init_only && setter.accessibility == Accessibility::Public
            }
            _ => false,
        }
    }

    /// Compiler-generated storage behind an auto-property
    pub fn is_backing_field(&self) -> bool {
        matches!(self.kind, MemberKind::Field)
            && (self.implicitly_declared || self.name.ends_with("__BackingField"))
    }

    pub fn visit_kind(&self) -> Option<VisitKind> {
        match self.kind {
            MemberKind::Property { .. } => Some(VisitKind::Property),
            MemberKind::Field => Some(VisitKind::Field),
            MemberKind::Method => None,
        }
    }
}

/// A node of the type graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSymbol {
    pub id: TypeId,
    pub name: String,
    /// Containing namespace; for external types, the qualifier written in source (if any)
    pub namespace: Option<String>,
    pub kind: TypeKind,
    pub type_parameters: Vec<String>,
    /// `None` for interfaces, structs, type parameters and unbound externals
    pub base: Option<TypeRef>,
    pub interfaces: Vec<TypeRef>,
    pub members: Vec<MemberSymbol>,
    pub location: Option<Location>,
    /// Namespaces imported where an unqualified external type was referenced
    pub imports: Vec<String>,
    pub containing_type: Option<TypeId>,
}

impl TypeSymbol {
    /// Create a symbol; the id is assigned when it is added to a compilation
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            id: TypeId(0),
            name: name.into(),
            namespace: None,
            kind,
            type_parameters: Vec::new(),
            base: None,
            interfaces: Vec::new(),
            members: Vec::new(),
            location: None,
            imports: Vec::new(),
            containing_type: None,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_base(mut self, base: TypeRef) -> Self {
        self.base = Some(base);
        self
    }

    pub fn with_member(mut self, member: MemberSymbol) -> Self {
        self.members.push(member);
        self
    }

    pub fn with_imports(mut self, imports: Vec<String>) -> Self {
        self.imports = imports;
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Fully-qualified identity when known
    pub fn qualified_name(&self) -> Option<String> {
        match self.kind {
            TypeKind::TypeParameter => None,
            TypeKind::External => self.namespace.as_ref().map(|ns| format!("{ns}.{}", self.name)),
            _ => Some(match &self.namespace {
                Some(ns) => format!("{ns}.{}", self.name),
                None => self.name.clone(),
            }),
        }
    }

    pub fn declares_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m.name == name)
    }
}

/// Symbol kinds the engine is notified about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitKind {
    Type,
    Property,
    Field,
}

/// Handle to a visited symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolRef {
    Type(TypeId),
    Member { owner: TypeId, index: usize },
}

/// Immutable snapshot of all type symbols of an analysis pass
#[derive(Debug, Clone, Default)]
pub struct Compilation {
    types: Vec<TypeSymbol>,
    files: Vec<PathBuf>,
}

impl Compilation {
    /// Build a compilation directly from symbols; ids are assigned by position
    pub fn from_types(types: Vec<TypeSymbol>) -> Self {
        Self::from_parts(types, Vec::new())
    }

    pub(crate) fn from_parts(mut types: Vec<TypeSymbol>, files: Vec<PathBuf>) -> Self {
        for (index, symbol) in types.iter_mut().enumerate() {
            symbol.id = TypeId(index as u32);
        }
        Self { types, files }
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeSymbol> {
        self.types.get(id.index())
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeSymbol> {
        self.types.iter()
    }

    /// Types written in the analyzed sources
    pub fn declared_types(&self) -> impl Iterator<Item = &TypeSymbol> {
        self.types.iter().filter(|t| t.kind.is_declared())
    }

    /// Whole-compilation query over declared types
    pub fn find_types<'a, F>(&'a self, predicate: F) -> impl Iterator<Item = &'a TypeSymbol> + 'a
    where
        F: Fn(&TypeSymbol) -> bool + 'a,
    {
        self.declared_types().filter(move |t| predicate(t))
    }

    /// Every declared symbol of the given kind, in declaration order
    pub fn declared_symbols(&self, kind: VisitKind) -> Vec<SymbolRef> {
        let mut symbols = Vec::new();
        for symbol in self.declared_types() {
            match kind {
                VisitKind::Type => symbols.push(SymbolRef::Type(symbol.id)),
                VisitKind::Property | VisitKind::Field => {
                    for (index, member) in symbol.members.iter().enumerate() {
                        if member.visit_kind() == Some(kind) {
                            symbols.push(SymbolRef::Member { owner: symbol.id, index });
                        }
                    }
                }
            }
        }
        symbols
    }

    /// Types, properties and fields the engine should visit
    pub fn visitable_symbols(&self) -> Vec<SymbolRef> {
        let mut symbols = self.declared_symbols(VisitKind::Type);
        symbols.extend(self.declared_symbols(VisitKind::Property));
        symbols.extend(self.declared_symbols(VisitKind::Field));
        symbols
    }

    pub fn member(&self, owner: TypeId, index: usize) -> Option<&MemberSymbol> {
        self.get(owner).and_then(|t| t.members.get(index))
    }

    pub fn visit_kind(&self, symbol: SymbolRef) -> Option<VisitKind> {
        match symbol {
            SymbolRef::Type(id) => self.get(id).map(|_| VisitKind::Type),
            SymbolRef::Member { owner, index } => self.member(owner, index).and_then(|m| m.visit_kind()),
        }
    }

    pub fn symbol_name(&self, symbol: SymbolRef) -> Option<&str> {
        match symbol {
            SymbolRef::Type(id) => self.get(id).map(|t| t.name.as_str()),
            SymbolRef::Member { owner, index } => self.member(owner, index).map(|m| m.name.as_str()),
        }
    }

    /// Source files the compilation was built from
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
