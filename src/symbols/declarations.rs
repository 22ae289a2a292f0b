//! Syntax-level declarations produced by source frontends
//!
//! Names are unresolved here; `CompilationBuilder` binds them into the type graph.

use super::Accessibility;
use crate::domain::diagnostics::Location;
use std::path::PathBuf;

/// A type as written in source, e.g. `Slalom.Stacks.Messaging.UseCase<AddCommand>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSyntax {
    /// Dotted prefix, without the `global::` alias
    pub qualifier: Option<String>,
    pub name: String,
    pub arguments: Vec<TypeSyntax>,
}

impl TypeSyntax {
    pub fn simple(name: impl Into<String>) -> Self {
        Self { qualifier: None, name: name.into(), arguments: Vec::new() }
    }

    /// Split a dotted name into qualifier and simple name
    pub fn parse_dotted(dotted: &str) -> Self {
        let dotted = dotted.strip_prefix("global::").unwrap_or(dotted);
        match dotted.rsplit_once('.') {
            Some((qualifier, name)) => Self {
                qualifier: Some(qualifier.to_string()),
                name: name.to_string(),
                arguments: Vec::new(),
            },
            None => Self::simple(dotted),
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<TypeSyntax>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Qualifier and name joined, without type arguments
    pub fn dotted_name(&self) -> String {
        match &self.qualifier {
            Some(qualifier) => format!("{qualifier}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// `using Alias = Target;`, naming either a type or a namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsingAlias {
    pub alias: String,
    pub target: TypeSyntax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Class,
    Struct,
    Interface,
    Record,
    RecordStruct,
}

/// Setter accessor as written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessorDeclaration {
    pub accessibility: Accessibility,
    pub init_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberDeclarationKind {
    Property {
        setter: Option<AccessorDeclaration>,
        /// Accessors without bodies, so the compiler synthesizes storage
        auto_implemented: bool,
    },
    Field,
    Method,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDeclaration {
    pub name: String,
    pub kind: MemberDeclarationKind,
    pub accessibility: Accessibility,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDeclaration {
    pub name: String,
    pub kind: DeclarationKind,
    pub namespace: Option<String>,
    pub type_parameters: Vec<String>,
    pub base_list: Vec<TypeSyntax>,
    pub members: Vec<MemberDeclaration>,
    pub nested: Vec<TypeDeclaration>,
    pub location: Location,
    pub partial: bool,
}

/// Everything one source file declares
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// `using` directives in scope for the whole file
    pub imports: Vec<String>,
    pub aliases: Vec<UsingAlias>,
    pub types: Vec<TypeDeclaration>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    pub fn type_count(&self) -> usize {
        fn count(types: &[TypeDeclaration]) -> usize {
            types.iter().map(|t| 1 + count(&t.nested)).sum()
        }
        count(&self.types)
    }
}
