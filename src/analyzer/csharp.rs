//! C# declaration scanner
//!
//! Architecture: Anti-Corruption Layer - C# source is reduced to declarations only
//! - Implements `SourceFrontend` so the engine never sees C# syntax
//! - Extracts namespaces, usings, type declarations, properties, fields and methods
//! - Method bodies, initializers and expressions are skipped, never interpreted

use crate::analyzer::SourceFrontend;
use crate::domain::diagnostics::{Location, StacksError, StacksResult};
use crate::symbols::declarations::{
    AccessorDeclaration, DeclarationKind, MemberDeclaration, MemberDeclarationKind, SourceFile, TypeDeclaration,
    TypeSyntax, UsingAlias,
};
use crate::symbols::Accessibility;
use std::path::Path;
use tracing::debug;

const MODIFIERS: &[&str] = &[
    "public", "private", "protected", "internal", "static", "readonly", "const", "volatile", "abstract", "virtual",
    "override", "sealed", "new", "extern", "unsafe", "async", "partial", "ref", "required", "file", "fixed",
    "implicit", "explicit",
];

/// Namespaces, type bodies and type arguments deeper than this are rejected
const MAX_NESTING: usize = 128;

/// Scanner for `.cs` files
#[derive(Debug, Default, Clone, Copy)]
pub struct CSharpScanner;

impl CSharpScanner {
    pub fn new() -> Self {
        Self
    }
}

impl SourceFrontend for CSharpScanner {
    fn handles_file(&self, file_path: &Path) -> bool {
        file_path.extension().map(|ext| ext.eq_ignore_ascii_case("cs")).unwrap_or(false)
    }

    fn scan(&self, file_path: &Path, content: &str) -> StacksResult<SourceFile> {
        let tokens =
            tokenize(content).map_err(|e| StacksError::source(file_path.display().to_string(), e.to_string()))?;

        let mut parser =
            Parser { tokens, pos: 0, path: file_path, imports: Vec::new(), aliases: Vec::new(), depth: 0, error: None };
        let types = parser.parse_file();
        if let Some(error) = parser.error {
            return Err(StacksError::source(file_path.display().to_string(), error.to_string()));
        }

        let mut file = SourceFile::new(file_path);
        file.imports = parser.imports;
        file.aliases = parser.aliases;
        file.imports.dedup();
        file.types = types;

        debug!("Scanned {}: {} types, {} imports", file_path.display(), file.type_count(), file.imports.len());
        Ok(file)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Identifier,
    Literal,
    Punct,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
    line: u32,
    column: u32,
}

impl Token<'_> {
    fn is_punct(&self, punct: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == punct
    }

    fn is_ident(&self, ident: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text == ident
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{message} at line {line}, column {column}")]
struct LexError {
    message: &'static str,
    line: u32,
    column: u32,
}

struct Lexer<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
    line: u32,
    column: u32,
    /// Only whitespace seen since the last newline
    line_start: bool,
}

fn tokenize(source: &str) -> Result<Vec<Token<'_>>, LexError> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let mut lexer = Lexer {
        source,
        chars: source.char_indices().collect(),
        pos: 0,
        line: 1,
        column: 1,
        line_start: true,
    };
    let mut tokens = Vec::new();

    while let Some(c) = lexer.peek(0) {
        if c == '\n' {
            lexer.bump();
            lexer.line_start = true;
            continue;
        }
        if c.is_whitespace() {
            lexer.bump();
            continue;
        }
        if c == '#' && lexer.line_start {
            lexer.skip_line();
            continue;
        }
        lexer.line_start = false;

        let (line, column, start) = (lexer.line, lexer.column, lexer.offset());
        let kind = match c {
            '/' if lexer.peek(1) == Some('/') => {
                lexer.skip_line();
                continue;
            }
            '/' if lexer.peek(1) == Some('*') => {
                lexer.block_comment()?;
                continue;
            }
            '"' => {
                lexer.string_literal(false, false)?;
                TokenKind::Literal
            }
            '@' | '$' if lexer.string_prefix().is_some() => {
                lexer.prefixed_string()?;
                TokenKind::Literal
            }
            '\'' => {
                lexer.char_literal();
                TokenKind::Literal
            }
            '@' if lexer.peek(1).map(is_ident_start).unwrap_or(false) => {
                lexer.bump();
                let start = lexer.offset();
                lexer.identifier();
                tokens.push(Token { kind: TokenKind::Identifier, text: lexer.slice(start), line, column });
                continue;
            }
            c if is_ident_start(c) => {
                lexer.identifier();
                TokenKind::Identifier
            }
            c if c.is_ascii_digit() => {
                lexer.number();
                TokenKind::Literal
            }
            '=' if lexer.peek(1) == Some('>') => {
                lexer.bump();
                lexer.bump();
                TokenKind::Punct
            }
            ':' if lexer.peek(1) == Some(':') => {
                lexer.bump();
                lexer.bump();
                TokenKind::Punct
            }
            _ => {
                lexer.bump();
                TokenKind::Punct
            }
        };
        tokens.push(Token { kind, text: lexer.slice(start), line, column });
    }

    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

impl<'a> Lexer<'a> {
    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars.get(self.pos).map(|(i, _)| *i).unwrap_or(self.source.len())
    }

    fn slice(&self, start: usize) -> &'a str {
        let source = self.source;
        &source[start..self.offset()]
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek(0)?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: &'static str) -> LexError {
        LexError { message, line: self.line, column: self.column }
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn block_comment(&mut self) -> Result<(), LexError> {
        self.bump();
        self.bump();
        loop {
            match self.peek(0) {
                None => return Err(self.error("unterminated block comment")),
                Some('*') if self.peek(1) == Some('/') => {
                    self.bump();
                    self.bump();
                    return Ok(());
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    fn identifier(&mut self) {
        while self.peek(0).map(is_ident_continue).unwrap_or(false) {
            self.bump();
        }
    }

    fn number(&mut self) {
        while let Some(c) = self.peek(0) {
            let fraction = c == '.' && self.peek(1).map(|n| n.is_ascii_digit()).unwrap_or(false);
            if !(is_ident_continue(c) || fraction) {
                break;
            }
            self.bump();
        }
    }

    fn char_literal(&mut self) {
        self.bump();
        while let Some(c) = self.peek(0) {
            match c {
                '\\' => {
                    self.bump();
                    self.bump();
                }
                '\'' => {
                    self.bump();
                    return;
                }
                '\n' => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    /// Length of a `@`/`$` prefix directly followed by a quote
    fn string_prefix(&self) -> Option<usize> {
        let mut len = 0;
        while matches!(self.peek(len), Some('@') | Some('$')) {
            len += 1;
        }
        (len > 0 && self.peek(len) == Some('"')).then_some(len)
    }

    fn prefixed_string(&mut self) -> Result<(), LexError> {
        let (mut verbatim, mut interpolated) = (false, false);
        while let Some(c) = self.peek(0) {
            match c {
                '@' => verbatim = true,
                '$' => interpolated = true,
                _ => break,
            }
            self.bump();
        }
        self.string_literal(verbatim, interpolated)
    }

    /// Lex a string starting at its opening quote
    fn string_literal(&mut self, verbatim: bool, interpolated: bool) -> Result<(), LexError> {
        let quotes = (0..).take_while(|i| self.peek(*i) == Some('"')).count();
        if quotes >= 3 {
            return self.raw_string(quotes);
        }

        self.bump();
        let mut depth = 0usize;
        loop {
            let Some(c) = self.peek(0) else {
                return Err(self.error("unterminated string literal"));
            };
            if depth > 0 {
                match c {
                    '{' => depth += 1,
                    '}' => depth -= 1,
                    '"' => {
                        self.string_literal(false, false)?;
                        continue;
                    }
                    '@' | '$' if self.string_prefix().is_some() => {
                        self.prefixed_string()?;
                        continue;
                    }
                    '\'' => {
                        self.char_literal();
                        continue;
                    }
                    _ => {}
                }
                self.bump();
                continue;
            }

            match c {
                '"' if verbatim && self.peek(1) == Some('"') => {
                    self.bump();
                }
                '"' => {
                    self.bump();
                    return Ok(());
                }
                '\\' if !verbatim => {
                    self.bump();
                }
                '{' if interpolated && self.peek(1) == Some('{') => {
                    self.bump();
                }
                '{' if interpolated => depth += 1,
                '\n' if !verbatim => return Err(self.error("newline in string literal")),
                _ => {}
            }
            self.bump();
        }
    }

    fn raw_string(&mut self, quotes: usize) -> Result<(), LexError> {
        for _ in 0..quotes {
            self.bump();
        }
        loop {
            match self.peek(0) {
                None => return Err(self.error("unterminated raw string literal")),
                Some('"') => {
                    let run = (0..).take_while(|i| self.peek(*i) == Some('"')).count();
                    for _ in 0..run {
                        self.bump();
                    }
                    if run >= quotes {
                        return Ok(());
                    }
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    path: &'a Path,
    imports: Vec<String>,
    aliases: Vec<UsingAlias>,
    depth: usize,
    error: Option<LexError>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<Token<'a>> {
        self.tokens.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<Token<'a>> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    fn at_punct(&self, punct: &str) -> bool {
        self.peek().map(|t| t.is_punct(punct)).unwrap_or(false)
    }

    fn at_ident(&self, ident: &str) -> bool {
        self.peek().map(|t| t.is_ident(ident)).unwrap_or(false)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        let matched = self.at_punct(punct);
        if matched {
            self.pos += 1;
        }
        matched
    }

    fn eat_ident(&mut self, ident: &str) -> bool {
        let matched = self.at_ident(ident);
        if matched {
            self.pos += 1;
        }
        matched
    }

    fn identifier(&mut self) -> Option<Token<'a>> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Identifier => self.bump(),
            _ => None,
        }
    }

    fn location(&self, token: Token<'_>) -> Location {
        Location::new(self.path, token.line, token.column)
    }

    /// Enter a nested construct. Past `MAX_NESTING` the rest of the file is abandoned.
    fn enter(&mut self) -> bool {
        if self.depth >= MAX_NESTING {
            if self.error.is_none() {
                let (line, column) = self.peek().map(|t| (t.line, t.column)).unwrap_or((0, 0));
                self.error = Some(LexError { message: "declarations nested too deeply", line, column });
            }
            self.pos = self.tokens.len();
            return false;
        }
        self.depth += 1;
        true
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn parse_file(&mut self) -> Vec<TypeDeclaration> {
        let mut types = Vec::new();
        self.parse_namespace_body(None, &mut types, false);
        types
    }

    fn parse_namespace_body(&mut self, namespace: Option<String>, types: &mut Vec<TypeDeclaration>, braced: bool) {
        let mut namespace = namespace;
        while let Some(token) = self.peek() {
            if token.is_punct("}") {
                self.bump();
                if braced {
                    return;
                }
                continue;
            }
            if token.is_punct("[") {
                self.skip_balanced();
                continue;
            }
            if token.is_ident("global") && self.peek_at(1).map(|t| t.is_ident("using")).unwrap_or(false) {
                self.bump();
                continue;
            }
            if token.is_ident("using") {
                self.parse_using();
                continue;
            }
            if token.is_ident("namespace") {
                self.bump();
                let name = self.dotted_name();
                let full = match &namespace {
                    Some(outer) => format!("{outer}.{name}"),
                    None => name,
                };
                if self.eat_punct(";") {
                    namespace = Some(full);
                } else if self.eat_punct("{") {
                    if self.enter() {
                        self.parse_namespace_body(Some(full), types, true);
                        self.leave();
                    }
                } else {
                    self.skip_member();
                }
                continue;
            }

            let modifiers = self.modifiers();
            if self.at_type_keyword() {
                if let Some(declaration) = self.parse_type_declaration(namespace.clone(), &modifiers) {
                    types.push(declaration);
                }
            } else {
                self.skip_member();
            }
        }
    }

    fn parse_using(&mut self) {
        self.bump();
        if let (Some(alias), Some(equals)) = (self.peek(), self.peek_at(1)) {
            if alias.kind == TokenKind::Identifier && equals.is_punct("=") {
                self.pos += 2;
                if let Some(target) = self.parse_type() {
                    self.aliases.push(UsingAlias { alias: alias.text.to_string(), target });
                }
                self.skip_member();
                return;
            }
        }

        let is_directive = match self.peek() {
            Some(first) if first.is_ident("static") || first.is_punct("(") => false,
            Some(first) => first.kind == TokenKind::Identifier,
            None => false,
        };
        if !is_directive {
            self.skip_member();
            return;
        }

        let name = self.dotted_name();
        self.eat_punct(";");
        if !name.is_empty() {
            self.imports.push(name);
        }
    }

    /// `global::A.B.C` as `A.B.C`
    fn dotted_name(&mut self) -> String {
        if self.at_ident("global") && self.peek_at(1).map(|t| t.is_punct("::")).unwrap_or(false) {
            self.pos += 2;
        }
        let mut segments = Vec::new();
        while let Some(segment) = self.identifier() {
            segments.push(segment.text);
            if !(self.at_punct(".") && self.peek_at(1).map(|t| t.kind == TokenKind::Identifier).unwrap_or(false)) {
                break;
            }
            self.bump();
        }
        segments.join(".")
    }

    fn modifiers(&mut self) -> Vec<&'a str> {
        let mut modifiers = Vec::new();
        while let Some(token) = self.peek() {
            if token.kind != TokenKind::Identifier || !MODIFIERS.contains(&token.text) {
                break;
            }
            // `new(` is an expression; a modifier word before `=` or `;` is a member name
            let ends = match self.peek_at(1) {
                Some(next) => next.is_punct("=") || next.is_punct(";") || (token.text == "new" && next.is_punct("(")),
                None => true,
            };
            if ends {
                break;
            }
            modifiers.push(token.text);
            self.bump();
        }
        modifiers
    }

    fn at_type_keyword(&self) -> bool {
        let Some(token) = self.peek() else {
            return false;
        };
        match token.text {
            "class" | "struct" | "interface" | "enum" | "delegate" => token.kind == TokenKind::Identifier,
            "record" => self
                .peek_at(1)
                .map(|next| next.kind == TokenKind::Identifier)
                .unwrap_or(false),
            _ => false,
        }
    }

    fn parse_type_declaration(&mut self, namespace: Option<String>, modifiers: &[&str]) -> Option<TypeDeclaration> {
        let keyword = self.bump()?;
        let kind = match keyword.text {
            "class" => DeclarationKind::Class,
            "struct" => DeclarationKind::Struct,
            "interface" => DeclarationKind::Interface,
            "record" if self.eat_ident("struct") => DeclarationKind::RecordStruct,
            "record" => {
                self.eat_ident("class");
                DeclarationKind::Record
            }
            _ => {
                self.skip_member();
                return None;
            }
        };

        let Some(name) = self.identifier() else {
            self.skip_member();
            return None;
        };
        let type_parameters = if self.at_punct("<") { self.type_parameters() } else { Vec::new() };
        if self.at_punct("(") {
            // primary constructor
            self.skip_balanced();
        }

        let mut base_list = Vec::new();
        if self.eat_punct(":") {
            while let Some(base) = self.parse_type() {
                base_list.push(base);
                if self.at_punct("(") {
                    self.skip_balanced();
                }
                if !self.eat_punct(",") {
                    break;
                }
            }
        }

        // generic constraints
        while let Some(token) = self.peek() {
            if token.is_punct("{") || token.is_punct(";") || token.is_punct("}") {
                break;
            }
            self.bump();
        }

        let mut declaration = TypeDeclaration {
            name: name.text.to_string(),
            kind,
            namespace,
            type_parameters,
            base_list,
            members: Vec::new(),
            nested: Vec::new(),
            location: self.location(name),
            partial: modifiers.contains(&"partial"),
        };

        if self.eat_punct("{") && self.enter() {
            self.parse_type_body(&mut declaration);
            self.leave();
        }
        self.eat_punct(";");
        Some(declaration)
    }

    fn type_parameters(&mut self) -> Vec<String> {
        let mut parameters = Vec::new();
        self.bump();
        while let Some(token) = self.peek() {
            if token.is_punct(">") {
                self.bump();
                break;
            }
            if token.is_punct("[") {
                self.skip_balanced();
                continue;
            }
            if token.is_ident("in") || token.is_ident("out") {
                self.bump();
                continue;
            }
            if token.kind == TokenKind::Identifier {
                parameters.push(token.text.to_string());
            }
            self.bump();
        }
        parameters
    }

    /// A type in a declaration position; `None` if no type starts here
    fn parse_type(&mut self) -> Option<TypeSyntax> {
        if self.at_punct("(") {
            self.skip_balanced();
            self.skip_type_suffixes();
            return Some(TypeSyntax::simple("ValueTuple"));
        }
        if self.at_ident("global") && self.peek_at(1).map(|t| t.is_punct("::")).unwrap_or(false) {
            self.pos += 2;
        }

        let first = self.identifier()?;
        let mut segments = vec![first.text];
        let mut arguments = Vec::new();
        loop {
            if self.at_punct("<") {
                if !self.enter() {
                    return None;
                }
                arguments = self.type_arguments();
                self.leave();
            }
            let next_is_ident = self.peek_at(1).map(|t| t.kind == TokenKind::Identifier).unwrap_or(false);
            if self.at_punct("::") && next_is_ident {
                // extern alias qualifier
                self.bump();
                segments.clear();
            } else if self.at_punct(".") && next_is_ident {
                self.bump();
                arguments.clear();
            } else {
                break;
            }
            if let Some(segment) = self.identifier() {
                segments.push(segment.text);
            }
        }
        self.skip_type_suffixes();

        let name = segments.pop().unwrap_or(first.text);
        let qualifier = (!segments.is_empty()).then(|| segments.join("."));
        Some(TypeSyntax { qualifier, name: name.to_string(), arguments })
    }

    fn type_arguments(&mut self) -> Vec<TypeSyntax> {
        let mut arguments = Vec::new();
        self.bump();
        while let Some(token) = self.peek() {
            if token.is_punct(">") {
                self.bump();
                break;
            }
            if token.is_punct(",") {
                self.bump();
                continue;
            }
            if token.is_punct(";") || token.is_punct("{") || token.is_punct("}") {
                break;
            }
            match self.parse_type() {
                Some(argument) => arguments.push(argument),
                None => {
                    self.bump();
                }
            }
        }
        arguments
    }

    fn skip_type_suffixes(&mut self) {
        loop {
            if self.at_punct("?") || self.at_punct("*") {
                self.bump();
            } else if self.at_punct("[")
                && self.peek_at(1).map(|t| t.is_punct("]") || t.is_punct(",")).unwrap_or(false)
            {
                self.skip_balanced();
            } else {
                break;
            }
        }
    }

    fn parse_type_body(&mut self, declaration: &mut TypeDeclaration) {
        while let Some(token) = self.peek() {
            if token.is_punct("}") {
                self.bump();
                return;
            }
            if token.is_punct(";") {
                self.bump();
                continue;
            }
            if token.is_punct("[") {
                self.skip_balanced();
                continue;
            }

            let modifiers = self.modifiers();
            if self.at_type_keyword() {
                if let Some(nested) = self.parse_type_declaration(declaration.namespace.clone(), &modifiers) {
                    declaration.nested.push(nested);
                }
                continue;
            }
            self.parse_member(declaration, &modifiers);
        }
    }

    fn parse_member(&mut self, declaration: &mut TypeDeclaration, modifiers: &[&str]) {
        let default_accessibility = match declaration.kind {
            DeclarationKind::Interface => Accessibility::Public,
            _ => Accessibility::Private,
        };
        let accessibility = accessibility_of(modifiers).unwrap_or(default_accessibility);

        let Some(token) = self.peek() else {
            return;
        };
        let is_constructor =
            token.is_ident(&declaration.name) && self.peek_at(1).map(|t| t.is_punct("(")).unwrap_or(false);
        if token.is_punct("}") {
            return;
        }
        if token.is_punct("~") || token.is_ident("event") || token.is_ident("operator") || is_constructor {
            self.skip_member();
            return;
        }

        if self.parse_type().is_none() {
            self.skip_member();
            return;
        }
        if self.at_ident("operator") || self.at_ident("this") {
            self.skip_member();
            return;
        }
        let Some(mut name) = self.identifier() else {
            self.skip_member();
            return;
        };

        // explicit interface implementations and generic methods
        let mut generic_method = false;
        loop {
            if self.at_punct("<") {
                self.skip_angle_brackets();
                if !self.at_punct(".") {
                    generic_method = true;
                    break;
                }
            }
            if self.at_punct(".") && self.peek_at(1).map(|t| t.kind == TokenKind::Identifier).unwrap_or(false) {
                self.bump();
                if let Some(segment) = self.identifier() {
                    name = segment;
                }
                continue;
            }
            break;
        }

        let location = self.location(name);
        let member = |kind| MemberDeclaration { name: name.text.to_string(), kind, accessibility, location };

        if generic_method || self.at_punct("(") {
            declaration.members.push(member(MemberDeclarationKind::Method));
            self.skip_member();
        } else if self.at_punct("{") {
            let abstract_only = declaration.kind == DeclarationKind::Interface
                || modifiers.contains(&"abstract")
                || modifiers.contains(&"extern");
            let (setter, all_auto) = self.accessors(accessibility);
            let auto_implemented = all_auto && !abstract_only;
            declaration.members.push(member(MemberDeclarationKind::Property { setter, auto_implemented }));
        } else if self.at_punct("=>") {
            declaration.members.push(member(MemberDeclarationKind::Property { setter: None, auto_implemented: false }));
            self.skip_member();
        } else if self.at_punct("=") || self.at_punct(",") || self.at_punct(";") {
            declaration.members.push(member(MemberDeclarationKind::Field));
            self.field_declarators(declaration, accessibility);
        } else {
            self.skip_member();
        }
    }

    /// Accessor list of a property; returns the setter and whether every accessor is bodiless
    fn accessors(&mut self, property_accessibility: Accessibility) -> (Option<AccessorDeclaration>, bool) {
        self.bump();
        let mut setter = None;
        let mut all_auto = true;
        let mut saw_accessor = false;

        while let Some(token) = self.peek() {
            if token.is_punct("}") {
                self.bump();
                break;
            }
            if token.is_punct("[") {
                self.skip_balanced();
                continue;
            }

            let modifiers = self.modifiers();
            let Some(keyword) = self.identifier() else {
                self.bump();
                continue;
            };
            saw_accessor = true;

            if self.eat_punct(";") {
                // auto accessor
            } else if self.at_punct("{") {
                self.skip_balanced();
                all_auto = false;
            } else if self.at_punct("=>") {
                self.skip_until_semicolon();
                all_auto = false;
            }

            let accessibility = accessibility_of(&modifiers).unwrap_or(property_accessibility);
            match keyword.text {
                "set" => setter = Some(AccessorDeclaration { accessibility, init_only: false }),
                "init" => setter = Some(AccessorDeclaration { accessibility, init_only: true }),
                _ => {}
            }
        }

        if self.at_punct("=") {
            // property initializer
            self.skip_until_semicolon();
        }
        (setter, saw_accessor && all_auto)
    }

    /// Remaining declarators of a field declaration, through the terminating `;`
    fn field_declarators(&mut self, declaration: &mut TypeDeclaration, accessibility: Accessibility) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            if depth == 0 {
                if token.is_punct(";") {
                    self.bump();
                    return;
                }
                if token.is_punct("}") {
                    return;
                }
                if token.is_punct(",") {
                    self.bump();
                    let declarator = match (self.peek(), self.peek_at(1)) {
                        (Some(name), Some(next))
                            if name.kind == TokenKind::Identifier
                                && (next.is_punct("=") || next.is_punct(",") || next.is_punct(";")) =>
                        {
                            Some(name)
                        }
                        _ => None,
                    };
                    if let Some(name) = declarator {
                        self.bump();
                        declaration.members.push(MemberDeclaration {
                            name: name.text.to_string(),
                            kind: MemberDeclarationKind::Field,
                            accessibility,
                            location: self.location(name),
                        });
                    }
                    continue;
                }
            }
            match token.text {
                "(" | "[" | "{" if token.kind == TokenKind::Punct => depth += 1,
                ")" | "]" | "}" if token.kind == TokenKind::Punct => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.bump();
        }
    }

    fn skip_angle_brackets(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.bump() {
            if token.is_punct("<") {
                depth += 1;
            } else if token.is_punct(">") {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return;
                }
            } else if token.is_punct("{") || token.is_punct(";") {
                self.pos -= 1;
                return;
            }
        }
    }

    /// Skip a bracketed group starting at the current opener
    fn skip_balanced(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.bump() {
            if token.kind != TokenKind::Punct {
                continue;
            }
            match token.text {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
            if depth == 0 {
                return;
            }
        }
    }

    fn skip_until_semicolon(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            if token.kind == TokenKind::Punct {
                match token.text {
                    ";" if depth == 0 => {
                        self.bump();
                        return;
                    }
                    "}" if depth == 0 => return,
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => depth = depth.saturating_sub(1),
                    _ => {}
                }
            }
            self.bump();
        }
    }

    /// Skip the rest of a member or statement: through a top-level `;` or block.
    /// Stops before a `}` that closes the enclosing body.
    fn skip_member(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            if token.kind == TokenKind::Punct {
                match token.text {
                    ";" if depth == 0 => {
                        self.bump();
                        return;
                    }
                    "{" if depth == 0 => {
                        self.skip_balanced();
                        // expression-bodied and initialized members continue after the block
                        if !(self.at_punct(";") || self.at_punct("=")) {
                            return;
                        }
                        continue;
                    }
                    "}" if depth == 0 => return,
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => depth = depth.saturating_sub(1),
                    _ => {}
                }
            }
            self.bump();
        }
    }
}

fn accessibility_of(modifiers: &[&str]) -> Option<Accessibility> {
    let has = |modifier: &str| modifiers.contains(&modifier);
    match (has("public"), has("protected"), has("internal"), has("private")) {
        (true, _, _, _) => Some(Accessibility::Public),
        (_, true, true, _) => Some(Accessibility::ProtectedInternal),
        (_, true, _, true) => Some(Accessibility::PrivateProtected),
        (_, true, _, _) => Some(Accessibility::Protected),
        (_, _, true, _) => Some(Accessibility::Internal),
        (_, _, _, true) => Some(Accessibility::Private),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn scan(source: &str) -> SourceFile {
        CSharpScanner::new().scan(Path::new("Test.cs"), source).unwrap()
    }

    fn member<'a>(declaration: &'a TypeDeclaration, name: &str) -> &'a MemberDeclaration {
        declaration.members.iter().find(|m| m.name == name).unwrap()
    }

    const USE_CASE_FIXTURE: &str = r#"using System;
using Slalom.Stacks.Messaging;
using Slalom.Stacks.Messaging.Validation;

namespace ConsoleApplication1
{
    public class AddCommand : Command
    {
        public string Name { get; }
    }

    // no rules declared for this use case
    public class Add : UseCase<AddCommand>
    {
        public void Execute(AddCommand command)
        {
            var text = "class Fake : Event { }";
        }
    }
}
"#;

    #[test]
    fn test_usings_namespaces_and_locations() {
        let file = scan(USE_CASE_FIXTURE);

        assert_eq!(file.imports, vec!["System", "Slalom.Stacks.Messaging", "Slalom.Stacks.Messaging.Validation"]);
        assert_eq!(file.types.len(), 2);

        let add = &file.types[1];
        assert_eq!(add.name, "Add");
        assert_eq!(add.namespace.as_deref(), Some("ConsoleApplication1"));
        assert_eq!((add.location.line, add.location.column), (13, 18));
        assert_eq!(add.base_list[0].name, "UseCase");
        assert_eq!(add.base_list[0].arguments[0].name, "AddCommand");
        assert_eq!(member(add, "Execute").kind, MemberDeclarationKind::Method);
        // the string literal in the method body declares nothing
        assert_eq!(add.members.len(), 1);
    }

    #[test]
    fn test_file_scoped_and_nested_namespaces() {
        let file = scan("namespace Outer.Inner;\n\npublic record Added(string Name) : Event;\n");
        assert_eq!(file.types[0].namespace.as_deref(), Some("Outer.Inner"));
        assert_eq!(file.types[0].kind, DeclarationKind::Record);
        assert_eq!(file.types[0].base_list[0].name, "Event");

        let file = scan("namespace A { namespace B { class C {} } class D {} }");
        assert_eq!(file.types[0].namespace.as_deref(), Some("A.B"));
        assert_eq!(file.types[1].namespace.as_deref(), Some("A"));
    }

    #[test]
    fn test_generic_declarations_and_constraints() {
        let file = scan(
            "public abstract class Handler<TCommand, TResult> : global::Slalom.Stacks.Messaging.UseCase<TCommand>, IDisposable\n\
             where TCommand : class, new()\n\
             {\n\
                 public abstract Task<TResult> ExecuteAsync<TState>(TCommand command) where TState : new();\n\
             }",
        );
        let handler = &file.types[0];

        assert_eq!(handler.type_parameters, vec!["TCommand", "TResult"]);
        assert_eq!(handler.base_list.len(), 2);
        assert_eq!(handler.base_list[0].qualifier.as_deref(), Some("Slalom.Stacks.Messaging"));
        assert_eq!(handler.base_list[1].name, "IDisposable");
        assert_eq!(member(handler, "ExecuteAsync").kind, MemberDeclarationKind::Method);
    }

    #[rstest]
    #[case::auto_public("public string Name { get; set; }", Some((Accessibility::Public, false)), true)]
    #[case::private_set("public string Name { get; private set; }", Some((Accessibility::Private, false)), true)]
    #[case::init("public string Name { get; init; }", Some((Accessibility::Public, true)), true)]
    #[case::get_only("public string Name { get; }", None, true)]
    #[case::initialized("public string Name { get; set; } = \"x\";", Some((Accessibility::Public, false)), true)]
    #[case::bodies("public string Name { get { return _n; } set { _n = value; } }", Some((Accessibility::Public, false)), false)]
    #[case::arrows("public string Name { get => _n; protected set => _n = value; }", Some((Accessibility::Protected, false)), false)]
    #[case::internal_property("string Name { get; set; }", Some((Accessibility::Private, false)), true)]
    #[case::tuple("public (int A, string B) Name { get; set; }", Some((Accessibility::Public, false)), true)]
    #[case::nullable_tuple("public (int, int)? Name { get; init; }", Some((Accessibility::Public, true)), true)]
    fn test_property_accessors(
        #[case] property: &str,
        #[case] expected_setter: Option<(Accessibility, bool)>,
        #[case] expected_auto: bool,
    ) {
        let file = scan(&format!("class AddedEvent : Event\n{{\n    {property}\n}}"));
        let name = member(&file.types[0], "Name");

        let MemberDeclarationKind::Property { setter, auto_implemented } = &name.kind else {
            panic!("expected a property, got {:?}", name.kind);
        };
        assert_eq!(setter.map(|s| (s.accessibility, s.init_only)), expected_setter);
        assert_eq!(*auto_implemented, expected_auto);
        assert_eq!((name.location.line, name.location.column), (3, property.find("Name").unwrap() as u32 + 5));
    }

    #[test]
    fn test_expression_bodied_property_is_read_only() {
        let file = scan("class AddedEvent : Event { public string Name => $\"{First} {Last}\"; public int Count; }");
        let added = &file.types[0];

        assert_eq!(
            member(added, "Name").kind,
            MemberDeclarationKind::Property { setter: None, auto_implemented: false }
        );
        assert_eq!(member(added, "Count").kind, MemberDeclarationKind::Field);
    }

    #[test]
    fn test_field_declarators() {
        let file = scan(
            "class AddedEvent : Event\n{\n    private readonly Dictionary<string, int> _map = new Dictionary<string, int>(), _other;\n    \
             public const int Max = 10, Min = 1;\n}",
        );
        let names: Vec<&str> = file.types[0].members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["_map", "_other", "Max", "Min"]);
        assert_eq!(file.types[0].members[0].accessibility, Accessibility::Private);
        assert_eq!(file.types[0].members[2].accessibility, Accessibility::Public);
    }

    #[test]
    fn test_tuple_typed_fields() {
        let file = scan(
            "class AddedEvent : Event { public (int A, string B) Pair; private readonly (int, int) _range = (1, 2); }",
        );
        let added = &file.types[0];

        assert_eq!(member(added, "Pair").accessibility, Accessibility::Public);
        assert_eq!(member(added, "_range").kind, MemberDeclarationKind::Field);
    }

    #[test]
    fn test_using_aliases() {
        let file = scan(
            "using Ev = Slalom.Stacks.Messaging.Event;\n\
             using Msg = global::Slalom.Stacks.Messaging;\n\
             using Handler = Slalom.Stacks.Messaging.UseCase<AddCommand>;\n\
             using System;\n\
             class Added : Ev {}",
        );

        assert_eq!(file.imports, vec!["System"]);
        let aliases: Vec<(&str, String)> =
            file.aliases.iter().map(|a| (a.alias.as_str(), a.target.dotted_name())).collect();
        assert_eq!(
            aliases,
            vec![
                ("Ev", "Slalom.Stacks.Messaging.Event".to_string()),
                ("Msg", "Slalom.Stacks.Messaging".to_string()),
                ("Handler", "Slalom.Stacks.Messaging.UseCase".to_string()),
            ]
        );
        assert_eq!(file.aliases[2].target.arguments[0].name, "AddCommand");
        assert_eq!(file.types[0].base_list[0].name, "Ev");
    }

    #[test]
    fn test_byte_order_mark_is_not_a_column() {
        let file = scan("\u{feff}class Added : Event {}");
        assert_eq!((file.types[0].location.line, file.types[0].location.column), (1, 7));
    }

    #[test]
    fn test_excessive_nesting_is_a_source_error() {
        let scanner = CSharpScanner::new();
        let deep_types = format!("{}{}", "class A { ".repeat(5000), "}".repeat(5000));
        let deep_arguments = format!("class A : {}int{} {{}}", "List<".repeat(5000), ">".repeat(5000));
        let deep_namespaces = format!("{}{}", "namespace N { ".repeat(5000), "}".repeat(5000));

        for source in [deep_types, deep_arguments, deep_namespaces] {
            let result = scanner.scan(Path::new("Deep.cs"), &source);
            assert!(matches!(result, Err(StacksError::Source { .. })));
        }

        let nested = format!("{}{}", "class A { ".repeat(20), "}".repeat(20));
        assert!(scanner.scan(Path::new("Nested.cs"), &nested).is_ok());
    }

    #[test]
    fn test_skipped_members() {
        let file = scan(
            "public class Add : UseCase<AddCommand>\n{\n\
                 public Add(IService service) : base(service) { _s = service; }\n\
                 ~Add() { }\n\
                 public event EventHandler Changed;\n\
                 public int this[int i] { get { return i; } }\n\
                 public static implicit operator string(Add a) => a.ToString();\n\
                 void IHandler.Execute(AddCommand c) { if (c != null) { return; } }\n\
                 enum Mode { A, B }\n\
                 private class Nested : Event { }\n\
             }",
        );
        let add = &file.types[0];

        let names: Vec<&str> = add.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Execute"]);
        assert_eq!(add.nested.len(), 1);
        assert_eq!(add.nested[0].name, "Nested");
    }

    #[test]
    fn test_literals_and_comments_are_opaque() {
        let source = "/* class Hidden : Event { } */\n\
                      // class AlsoHidden : Event { }\n\
                      #if DEBUG\n\
                      #endif\n\
                      class Visible : Event\n\
                      {\n\
                          string a = @\"verbatim \"\" { class X {} }\";\n\
                          string b = $\"{(flag ? \"}\" : \"{\")} {{literal}}\";\n\
                          string c = \"\"\"\n  raw \" class Y {} \n  \"\"\";\n\
                          char d = '}';\n\
                      }";
        let file = scan(source);

        assert_eq!(file.types.len(), 1);
        assert_eq!(file.types[0].name, "Visible");
        assert_eq!((file.types[0].location.line, file.types[0].location.column), (5, 7));
        let names: Vec<&str> = file.types[0].members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_unterminated_comment_is_a_source_error() {
        let result = CSharpScanner::new().scan(Path::new("Broken.cs"), "class A { /* never closed");
        assert!(matches!(result, Err(StacksError::Source { .. })));
    }

    #[test]
    fn test_handles_cs_files_only() {
        let scanner = CSharpScanner::new();
        assert!(scanner.handles_file(Path::new("src/Add.cs")));
        assert!(scanner.handles_file(Path::new("src/Add.CS")));
        assert!(!scanner.handles_file(Path::new("src/Add.csproj")));
        assert!(!scanner.handles_file(Path::new("README.md")));
    }
}
