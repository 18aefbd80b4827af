//! Recursive-descent parser with inline typedef resolution (component E).
//!
//! The whole token stream is pulled out of the [`Lexer`] up front into a
//! flat buffer: preprocessing and macro expansion are already finished by
//! the time a [`Token`] reaches here, so there is nothing left for the
//! parser to stream lazily, and a materialized buffer makes backtracking
//! (needed for parenthesized declarators and the cast/expression split)
//! a plain index save-and-restore instead of a second lex pass.
//!
//! Declaration-specifier and declarator parsing consult [`SymbolTable`]
//! as they go: a bare identifier that currently names a typedef is a
//! type-specifier, not an expression, and `struct`/`enum` tags are
//! declared into the table the moment their body (or forward form) is
//! seen. Diagnostics follow the same poisoned-node convention as
//! `irgen`: a construct that fails to parse records a diagnostic and the
//! surrounding call returns `None`, and the caller resynchronizes at the
//! nearest safe boundary rather than aborting the whole file.

use crate::ast::*;
use crate::config::TargetArch;
use crate::diagnostics::{Category, Diagnostic, DiagnosticBag, DiagnosticKind};
use crate::lexer::{Keyword, Lexer, Punct, Token, TokenKind};
use crate::numeric;
use crate::span::Span;
use crate::symtab::{DeclareError, OrdinaryBinding, SymbolTable, TagBinding};
use crate::types::{Aggregate, EnumDef, Enumerator, Field, FloatRank, IntRank, Qualifiers, StorageClass, Type, TypeKind};
use smallvec::SmallVec;
use std::rc::Rc;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    arch: TargetArch,
    symtab: SymbolTable,
    diagnostics: DiagnosticBag,
    /// Parameters of the most recently parsed parameter list, carried out
    /// of band from the generic declarator machinery so a function
    /// *definition* (the one place parameter names matter) can recover
    /// them without threading names through every suffix type.
    last_params: Vec<ParamDecl>,
    struct_counter: u32,
}

/// Accumulated declaration-specifiers: storage class, qualifiers, and the
/// base type built from whatever type-specifier keywords were seen.
struct DeclSpec {
    ty: Type,
    storage: StorageClass,
}

impl Parser {
    pub fn new(lexer: &mut Lexer<'_>, arch: TargetArch) -> Self {
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.scan();
            let is_eof = tok.is_eof();
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Parser {
            tokens,
            pos: 0,
            arch,
            symtab: SymbolTable::new(),
            diagnostics: DiagnosticBag::new(),
            last_params: Vec::new(),
            struct_counter: 0,
        }
    }

    pub fn into_diagnostics(self) -> DiagnosticBag {
        self.diagnostics
    }

    // ---- token-stream primitives ---------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or_else(|| self.tokens.last().unwrap())
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if !tok.is_eof() {
            self.pos += 1;
        }
        tok
    }

    fn prev_span(&self) -> Span {
        let idx = self.pos.saturating_sub(1);
        self.tokens[idx].span
    }

    fn check_punct(&self, p: Punct) -> bool {
        matches!(&self.peek().kind, TokenKind::Punct(q) if *q == p)
    }

    fn check_keyword(&self, k: Keyword) -> bool {
        matches!(&self.peek().kind, TokenKind::Keyword(q) if *q == k)
    }

    fn consume_punct(&mut self, p: Punct) -> bool {
        if self.check_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume_keyword(&mut self, k: Keyword) -> bool {
        if self.check_keyword(k) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn token_text(tok: &Token) -> String {
        match &tok.kind {
            TokenKind::Identifier(s) => s.clone(),
            TokenKind::Keyword(_) => "keyword".to_string(),
            TokenKind::Punct(_) => "punctuator".to_string(),
            TokenKind::IntConstant(s) | TokenKind::FloatConstant(s) => s.clone(),
            TokenKind::CharConstant(_) => "character constant".to_string(),
            TokenKind::StringConstant(_) => "string literal".to_string(),
            TokenKind::Invalid(s) => s.clone(),
            TokenKind::Eof => "end of file".to_string(),
        }
    }

    fn expect_punct(&mut self, p: Punct, expected: &str) -> Option<()> {
        if self.consume_punct(p) {
            Some(())
        } else {
            let found = Self::token_text(self.peek());
            let span = self.peek().span;
            self.diagnostics.push(Diagnostic::error(
                Category::Syntax,
                span,
                DiagnosticKind::UnexpectedToken { expected: expected.to_string(), found },
            ));
            None
        }
    }

    fn expect_identifier(&mut self) -> Option<Ident> {
        let span = self.peek().span;
        if let TokenKind::Identifier(name) = self.peek().kind.clone() {
            self.advance();
            Some(Ident { name, span })
        } else {
            let found = Self::token_text(self.peek());
            self.diagnostics.push(Diagnostic::error(
                Category::Syntax,
                span,
                DiagnosticKind::UnexpectedToken { expected: "identifier".to_string(), found },
            ));
            None
        }
    }

    /// Skip tokens until a semicolon (consumed) or `}`/EOF (left alone),
    /// the statement-level recovery point.
    fn synchronize_statement(&mut self) {
        loop {
            match &self.peek().kind {
                TokenKind::Eof => return,
                TokenKind::Punct(Punct::Semi) => {
                    self.advance();
                    return;
                }
                TokenKind::Punct(Punct::RBrace) => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Skip tokens until the start of the next external declaration: a
    /// semicolon (consumed), `}` (consumed, closes a runaway body), or a
    /// keyword that plausibly begins a new declaration.
    fn synchronize_external(&mut self) {
        loop {
            match &self.peek().kind {
                TokenKind::Eof => return,
                TokenKind::Punct(Punct::Semi) => {
                    self.advance();
                    return;
                }
                TokenKind::Punct(Punct::RBrace) => {
                    self.advance();
                    return;
                }
                _ if self.starts_declaration_specifier() => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn starts_declaration_specifier(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Keyword(k) => matches!(
                k,
                Keyword::Void | Keyword::Char | Keyword::Short | Keyword::Int | Keyword::Long
                    | Keyword::Float | Keyword::Double | Keyword::Signed | Keyword::Unsigned
                    | Keyword::Bool | Keyword::Struct | Keyword::Union | Keyword::Enum
                    | Keyword::Typedef | Keyword::Extern | Keyword::Static | Keyword::Auto
                    | Keyword::Register | Keyword::Const | Keyword::Volatile | Keyword::Restrict
                    | Keyword::Inline | Keyword::Atomic | Keyword::Alignas | Keyword::Noreturn
                    | Keyword::ThreadLocal
            ),
            TokenKind::Identifier(name) => self.symtab.is_typedef_name(name),
            _ => false,
        }
    }

    // ---- translation unit -----------------------------------------------

    pub fn parse_translation_unit(&mut self) -> TranslationUnit {
        let mut decls = Vec::new();
        while !self.peek().is_eof() {
            match self.parse_external_declaration() {
                Some(items) => decls.extend(items),
                None => self.synchronize_external(),
            }
        }
        TranslationUnit { decls }
    }

    /// `Some(items)` for zero or more emittable top-level items — empty for
    /// a `typedef`/bare struct-or-union-or-enum declaration that only has a
    /// symbol-table side effect, one item per comma-separated declarator
    /// otherwise — `None` on a parse failure (caller resynchronizes).
    fn parse_external_declaration(&mut self) -> Option<Vec<ExternalDecl>> {
        let start = self.peek().span;
        let spec = self.parse_declaration_specifiers()?;
        if self.consume_punct(Punct::Semi) {
            return Some(Vec::new()); // `struct S { ... };` with no declarator
        }

        let mut out = Vec::new();
        loop {
            let (name, ty, decl_span) = self.declarator(spec.ty.clone())?;
            let Some(name) = name else {
                self.diagnostics.push(Diagnostic::error(Category::Syntax, decl_span, DiagnosticKind::MalformedDeclarator));
                return None;
            };
            let span = start.merge(decl_span);

            if spec.storage == StorageClass::Typedef {
                let mut named = ty;
                named.storage = crate::types::StorageClassCell(StorageClass::Typedef);
                if self.symtab.declare_ordinary(&name, OrdinaryBinding::TypedefName(named)).is_err() {
                    self.diagnostics.push(Diagnostic::error(Category::Semantic, span, DiagnosticKind::Redefinition(name)));
                }
            } else if ty.is_function_type() && self.check_punct(Punct::LBrace) {
                let params = std::mem::take(&mut self.last_params);
                let TypeKind::Function { ret, params: param_list } = &ty.kind else { unreachable!() };
                let ret_type = (**ret).clone();
                let variadic = param_list.variadic;
                let _ = self.symtab.declare_ordinary(&name, OrdinaryBinding::Function(ty.clone()));
                self.symtab.enter_scope();
                for p in &params {
                    if let Some(pname) = &p.name {
                        let _ = self.symtab.declare_ordinary(pname, OrdinaryBinding::Variable(p.ty.clone()));
                    }
                }
                let body = self.parse_compound_statement()?;
                self.symtab.leave_scope();
                out.push(ExternalDecl::FunctionDefinition(FunctionDefinition { ret_type, name, params, variadic, body, span }));
                return Some(out); // a function body ends the external declaration
            } else {
                let _ = self.symtab.declare_ordinary(
                    &name,
                    if ty.is_function_type() { OrdinaryBinding::Function(ty.clone()) } else { OrdinaryBinding::Variable(ty.clone()) },
                );
                let initializer = if self.consume_punct(Punct::Eq) { self.parse_initializer() } else { None };
                out.push(ExternalDecl::Declaration(Declaration { ty, name, initializer, span }));
            }

            if !self.consume_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::Semi, ";")?;
        Some(out)
    }

    // ---- declaration specifiers -----------------------------------------

    fn parse_declaration_specifiers(&mut self) -> Option<DeclSpec> {
        const VOID: u32 = 1 << 0;
        const BOOL: u32 = 1 << 1;
        const CHAR: u32 = 1 << 2;
        const SHORT: u32 = 1 << 3;
        const INT: u32 = 1 << 4;
        const FLOAT: u32 = 1 << 5;
        const DOUBLE: u32 = 1 << 6;
        const SIGNED: u32 = 1 << 7;
        const UNSIGNED: u32 = 1 << 8;
        const OTHER: u32 = 1 << 9;

        let mut storage = StorageClass::None;
        let mut quals = Qualifiers::empty();
        let mut counter = 0u32;
        let mut long_count = 0u32;
        let mut other_ty: Option<Type> = None;
        let mut saw_any = false;

        loop {
            match &self.peek().kind {
                TokenKind::Keyword(Keyword::Typedef) => { storage = StorageClass::Typedef; self.advance(); }
                TokenKind::Keyword(Keyword::Extern) => { storage = StorageClass::Extern; self.advance(); }
                TokenKind::Keyword(Keyword::Static) => { storage = StorageClass::Static; self.advance(); }
                TokenKind::Keyword(Keyword::Auto) => { storage = StorageClass::Auto; self.advance(); }
                TokenKind::Keyword(Keyword::Register) => { storage = StorageClass::Register; self.advance(); }
                TokenKind::Keyword(Keyword::Const) => { quals |= Qualifiers::CONST; self.advance(); }
                TokenKind::Keyword(Keyword::Volatile) => { quals |= Qualifiers::VOLATILE; self.advance(); }
                TokenKind::Keyword(Keyword::Restrict) => { quals |= Qualifiers::RESTRICT; self.advance(); }
                TokenKind::Keyword(Keyword::Inline) | TokenKind::Keyword(Keyword::Noreturn)
                | TokenKind::Keyword(Keyword::ThreadLocal) | TokenKind::Keyword(Keyword::Atomic) => {
                    // Accepted and discarded: inline/_Noreturn/_Thread_local/_Atomic
                    // affect linkage or codegen concerns this front end does
                    // not model, not the type itself.
                    self.advance();
                }
                TokenKind::Keyword(Keyword::Alignas) => {
                    self.advance();
                    if self.consume_punct(Punct::LParen) {
                        // Skip the alignment argument; alignment control is
                        // not part of the type model here.
                        let mut depth = 1;
                        while depth > 0 && !self.peek().is_eof() {
                            if self.check_punct(Punct::LParen) { depth += 1; }
                            if self.check_punct(Punct::RParen) { depth -= 1; }
                            self.advance();
                        }
                    }
                }
                TokenKind::Keyword(Keyword::Void) => { counter |= VOID; saw_any = true; self.advance(); }
                TokenKind::Keyword(Keyword::Bool) => { counter |= BOOL; saw_any = true; self.advance(); }
                TokenKind::Keyword(Keyword::Char) => { counter |= CHAR; saw_any = true; self.advance(); }
                TokenKind::Keyword(Keyword::Short) => { counter |= SHORT; saw_any = true; self.advance(); }
                TokenKind::Keyword(Keyword::Int) => { counter |= INT; saw_any = true; self.advance(); }
                TokenKind::Keyword(Keyword::Long) => { long_count += 1; saw_any = true; self.advance(); }
                TokenKind::Keyword(Keyword::Float) => { counter |= FLOAT; saw_any = true; self.advance(); }
                TokenKind::Keyword(Keyword::Double) => { counter |= DOUBLE; saw_any = true; self.advance(); }
                TokenKind::Keyword(Keyword::Signed) => { counter |= SIGNED; saw_any = true; self.advance(); }
                TokenKind::Keyword(Keyword::Unsigned) => { counter |= UNSIGNED; saw_any = true; self.advance(); }
                TokenKind::Keyword(Keyword::Struct) | TokenKind::Keyword(Keyword::Union) => {
                    other_ty = Some(self.parse_struct_or_union_specifier()?);
                    counter |= OTHER;
                    saw_any = true;
                }
                TokenKind::Keyword(Keyword::Enum) => {
                    other_ty = Some(self.parse_enum_specifier()?);
                    counter |= OTHER;
                    saw_any = true;
                }
                TokenKind::Keyword(Keyword::BuiltinVaList) => {
                    other_ty = Some(Type::new(TypeKind::Builtin("__builtin_va_list")));
                    counter |= OTHER;
                    saw_any = true;
                    self.advance();
                }
                TokenKind::Identifier(name) if counter == 0 && !saw_any && self.symtab.is_typedef_name(name) => {
                    if let Some(OrdinaryBinding::TypedefName(t)) = self.symtab.lookup_ordinary(name) {
                        other_ty = Some(t.clone());
                    }
                    counter |= OTHER;
                    saw_any = true;
                    self.advance();
                }
                _ => break,
            }
        }

        if !saw_any {
            let found = Self::token_text(self.peek());
            let span = self.peek().span;
            self.diagnostics.push(Diagnostic::error(
                Category::Syntax,
                span,
                DiagnosticKind::UnexpectedToken { expected: "declaration".to_string(), found },
            ));
            return None;
        }

        let base = if counter & OTHER != 0 {
            other_ty.unwrap()
        } else if counter & VOID != 0 {
            Type::void()
        } else if counter & BOOL != 0 {
            Type::bool_ty()
        } else if counter & FLOAT != 0 {
            Type::float(FloatRank::Float)
        } else if counter & DOUBLE != 0 {
            Type::float(if long_count > 0 { FloatRank::LongDouble } else { FloatRank::Double })
        } else if counter & CHAR != 0 {
            Type::int(counter & UNSIGNED == 0, IntRank::Char)
        } else {
            let signed = counter & UNSIGNED == 0;
            let rank = if counter & SHORT != 0 {
                IntRank::Short
            } else if long_count >= 2 {
                IntRank::LongLong
            } else if long_count == 1 {
                IntRank::Long
            } else {
                IntRank::Int
            };
            Type::int(signed, rank)
        };
        let mut ty = Type::with_qualifiers(base.kind, quals);
        ty.storage = crate::types::StorageClassCell(storage);
        Some(DeclSpec { ty, storage })
    }

    fn parse_struct_or_union_specifier(&mut self) -> Option<Type> {
        let is_union = self.check_keyword(Keyword::Union);
        self.advance(); // `struct` or `union`

        let tag = if let TokenKind::Identifier(name) = self.peek().kind.clone() {
            self.advance();
            Some(name)
        } else {
            None
        };

        if !self.check_punct(Punct::LBrace) {
            // Reference to a (possibly not-yet-complete) tag, or an
            // implicit forward declaration if this tag is new.
            let tag_name = tag.unwrap_or_default();
            if let Some(TagBinding::Struct(agg)) = self.symtab.lookup_tag(&tag_name) {
                return Some(Type::new(TypeKind::StructOrUnion(agg.clone())));
            }
            let incomplete = Rc::new(Aggregate { is_union, tag: Some(tag_name.clone()), fields: Vec::new(), complete: false });
            let _ = self.symtab.declare_tag(&tag_name, TagBinding::Struct(incomplete.clone()));
            return Some(Type::new(TypeKind::StructOrUnion(incomplete)));
        }

        self.advance(); // `{`
        let mut fields = Vec::new();
        while !self.check_punct(Punct::RBrace) && !self.peek().is_eof() {
            let field_spec = self.parse_declaration_specifiers()?;
            loop {
                let (name, ty, _) = self.declarator(field_spec.ty.clone())?;
                let bitfield_width = if self.consume_punct(Punct::Colon) {
                    let expr = self.parse_assignment_expression()?;
                    self.eval_const_int(&expr).map(|v| v as u32)
                } else {
                    None
                };
                fields.push(Field { name: name.unwrap_or_default(), ty, bitfield_width });
                if !self.consume_punct(Punct::Comma) {
                    break;
                }
            }
            self.expect_punct(Punct::Semi, ";")?;
        }
        self.expect_punct(Punct::RBrace, "}")?;

        let agg = Rc::new(Aggregate { is_union, tag: tag.clone(), fields, complete: true });
        if let Some(tag_name) = &tag {
            if self.symtab.declare_tag(tag_name, TagBinding::Struct(agg.clone())).is_err() {
                let span = self.prev_span();
                self.diagnostics.push(Diagnostic::error(Category::Semantic, span, DiagnosticKind::TagRedefinedWithDifferentBody(tag_name.clone())));
            }
        }
        Some(Type::new(TypeKind::StructOrUnion(agg)))
    }

    fn parse_enum_specifier(&mut self) -> Option<Type> {
        self.advance(); // `enum`
        let tag = if let TokenKind::Identifier(name) = self.peek().kind.clone() {
            self.advance();
            Some(name)
        } else {
            None
        };

        if !self.check_punct(Punct::LBrace) {
            let tag_name = tag.unwrap_or_default();
            if let Some(TagBinding::Enum(def)) = self.symtab.lookup_tag(&tag_name) {
                return Some(Type::new(TypeKind::Enum(def.clone())));
            }
            let empty = Rc::new(EnumDef { tag: Some(tag_name), enumerators: Vec::new() });
            return Some(Type::new(TypeKind::Enum(empty)));
        }

        self.advance(); // `{`
        let mut enumerators = Vec::new();
        let mut next_value: i64 = 0;
        while !self.check_punct(Punct::RBrace) && !self.peek().is_eof() {
            let Some(ident) = self.expect_identifier() else { break };
            if self.consume_punct(Punct::Eq) {
                let expr = self.parse_conditional_expression()?;
                next_value = self.eval_const_int(&expr).unwrap_or(next_value);
            }
            enumerators.push(Enumerator { name: ident.name.clone(), value: next_value });
            let _ = self.symtab.declare_ordinary(&ident.name, OrdinaryBinding::Enumerator(next_value));
            next_value += 1;
            if !self.consume_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RBrace, "}")?;

        let def = Rc::new(EnumDef { tag: tag.clone(), enumerators });
        if let Some(tag_name) = &tag {
            let _ = self.symtab.declare_tag(tag_name, TagBinding::Enum(def.clone()));
        }
        Some(Type::new(TypeKind::Enum(def)))
    }

    // ---- declarators -----------------------------------------------------

    /// A type-qualifier list immediately following a `*` (`int * const p`).
    fn parse_pointer_qualifiers(&mut self) -> Qualifiers {
        let mut quals = Qualifiers::empty();
        loop {
            match &self.peek().kind {
                TokenKind::Keyword(Keyword::Const) => { quals |= Qualifiers::CONST; self.advance(); }
                TokenKind::Keyword(Keyword::Volatile) => { quals |= Qualifiers::VOLATILE; self.advance(); }
                TokenKind::Keyword(Keyword::Restrict) => { quals |= Qualifiers::RESTRICT; self.advance(); }
                _ => break,
            }
        }
        quals
    }

    /// `true` when the `(` at the current position opens a parenthesized
    /// nested declarator (`(*p)[3]`) rather than a parameter-type-list
    /// suffix (`f(int)`): the former is always followed by `*`, another
    /// `(`, or a plain (non-typedef) identifier.
    fn nested_declarator_follows(&self) -> bool {
        match &self.peek_at(1).kind {
            TokenKind::Punct(Punct::Star) | TokenKind::Punct(Punct::LParen) => true,
            TokenKind::Identifier(name) => !self.symtab.is_typedef_name(name),
            _ => false,
        }
    }

    /// Parse a declarator, returning the declared name (`None` for an
    /// abstract declarator used in a cast or `sizeof`), its full type built
    /// around `base`, and the span covering it.
    fn declarator(&mut self, base: Type) -> Option<(Option<String>, Type, Span)> {
        let start = self.peek().span;
        let mut ty = base;
        let mut stars: SmallVec<[Qualifiers; 4]> = SmallVec::new();
        while self.consume_punct(Punct::Star) {
            stars.push(self.parse_pointer_qualifiers());
        }
        for q in stars {
            ty = Type::with_qualifiers(TypeKind::Pointer(Box::new(ty)), q);
        }

        if self.check_punct(Punct::LParen) && self.nested_declarator_follows() {
            self.advance(); // `(`
            let inner_start = self.pos;
            self.skip_balanced_parens();
            self.expect_punct(Punct::RParen, ")")?;
            let outer_ty = self.type_suffix(ty)?;
            let after = self.pos;
            self.pos = inner_start;
            let (name, final_ty, _) = self.declarator(outer_ty)?;
            self.pos = after;
            return Some((name, final_ty, start.merge(self.prev_span())));
        }

        let name = match self.peek().kind.clone() {
            TokenKind::Identifier(n) => {
                self.advance();
                Some(n)
            }
            _ => None,
        };
        let final_ty = self.type_suffix(ty)?;
        Some((name, final_ty, start.merge(self.prev_span())))
    }

    /// Advance past a balanced `(...)` run, leaving `pos` at the matching
    /// `)` (not consumed) — used to skip a nested declarator on the first
    /// pass so its enclosing suffix can be parsed before re-parsing it for
    /// real with the correct base type.
    fn skip_balanced_parens(&mut self) {
        let mut depth = 1i32;
        while depth > 0 {
            match &self.peek().kind {
                TokenKind::Eof => return,
                TokenKind::Punct(Punct::LParen) => depth += 1,
                TokenKind::Punct(Punct::RParen) => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
            self.advance();
        }
    }

    /// Array and function suffixes, recursing before wrapping so that
    /// `a[3][4]` nests as "array of 3 arrays of 4", the outermost source
    /// dimension becoming the outermost type.
    fn type_suffix(&mut self, ty: Type) -> Option<Type> {
        if self.consume_punct(Punct::LParen) {
            return self.parse_param_list_suffix(ty);
        }
        if self.consume_punct(Punct::LBracket) {
            let size = if self.check_punct(Punct::RBracket) {
                None
            } else {
                let expr = self.parse_assignment_expression()?;
                self.eval_const_int(&expr).map(|v| v.max(0) as u64)
            };
            self.expect_punct(Punct::RBracket, "]")?;
            let inner = self.type_suffix(ty)?;
            return Some(Type::array_of(inner, size));
        }
        Some(ty)
    }

    fn parse_param_list_suffix(&mut self, ret: Type) -> Option<Type> {
        let (params, variadic) = self.parse_param_list()?;
        self.last_params = params.clone();
        Some(Type::function(ret, params.into_iter().map(|p| p.ty).collect(), variadic))
    }

    /// Parses up to (and including) the closing `)`. `(void)` and `()`
    /// both mean zero fixed parameters here — the K&R "unspecified
    /// parameters" distinction that `()` carries in full C is not
    /// preserved.
    fn parse_param_list(&mut self) -> Option<(Vec<ParamDecl>, bool)> {
        let mut params = Vec::new();
        let mut variadic = false;
        if self.consume_punct(Punct::RParen) {
            return Some((params, variadic));
        }
        if self.check_keyword(Keyword::Void) && matches!(self.peek_at(1).kind, TokenKind::Punct(Punct::RParen)) {
            self.advance();
            self.advance();
            return Some((params, variadic));
        }
        loop {
            if self.consume_punct(Punct::Ellipsis) {
                variadic = true;
                break;
            }
            let span = self.peek().span;
            let spec = self.parse_declaration_specifiers()?;
            let (name, ty, decl_span) = self.declarator(spec.ty)?;
            params.push(ParamDecl { name, ty, span: span.merge(decl_span) });
            if !self.consume_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RParen, ")")?;
        Some((params, variadic))
    }

    /// A `type-name`: declaration-specifiers plus an optional abstract
    /// declarator, used by casts, `sizeof`, compound literals, and `va_arg`.
    fn parse_type_name(&mut self) -> Option<TypeName> {
        let start = self.peek().span;
        let spec = self.parse_declaration_specifiers()?;
        let (_, ty, decl_span) = self.declarator(spec.ty)?;
        Some(TypeName { ty, span: start.merge(decl_span) })
    }

    // ---- declarations (block scope) --------------------------------------

    fn parse_declaration(&mut self) -> Option<Vec<Declaration>> {
        let start = self.peek().span;
        let spec = self.parse_declaration_specifiers()?;
        if self.consume_punct(Punct::Semi) {
            return Some(Vec::new());
        }

        let mut out = Vec::new();
        loop {
            let (name, ty, decl_span) = self.declarator(spec.ty.clone())?;
            let span = start.merge(decl_span);
            let Some(name) = name else {
                self.diagnostics.push(Diagnostic::error(Category::Syntax, decl_span, DiagnosticKind::MalformedDeclarator));
                return None;
            };

            if spec.storage == StorageClass::Typedef {
                let mut named = ty;
                named.storage = crate::types::StorageClassCell(StorageClass::Typedef);
                if self.symtab.declare_ordinary(&name, OrdinaryBinding::TypedefName(named)).is_err() {
                    self.diagnostics.push(Diagnostic::error(Category::Semantic, span, DiagnosticKind::Redefinition(name)));
                }
            } else {
                let _ = self.symtab.declare_ordinary(
                    &name,
                    if ty.is_function_type() { OrdinaryBinding::Function(ty.clone()) } else { OrdinaryBinding::Variable(ty.clone()) },
                );
                let initializer = if self.consume_punct(Punct::Eq) { self.parse_initializer() } else { None };
                out.push(Declaration { ty, name, initializer, span });
            }

            if !self.consume_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::Semi, ";")?;
        Some(out)
    }

    fn parse_initializer(&mut self) -> Option<Initializer> {
        if self.consume_punct(Punct::LBrace) {
            let mut items = Vec::new();
            while !self.check_punct(Punct::RBrace) && !self.peek().is_eof() {
                let designators = self.parse_designator_list();
                let value = self.parse_initializer()?;
                items.push(InitItem { designators, value });
                if !self.consume_punct(Punct::Comma) {
                    break;
                }
            }
            self.expect_punct(Punct::RBrace, "}")?;
            Some(Initializer::List(items))
        } else {
            Some(Initializer::Expr(self.parse_assignment_expression()?))
        }
    }

    fn parse_designator_list(&mut self) -> Vec<Designator> {
        let mut out = Vec::new();
        loop {
            if self.consume_punct(Punct::LBracket) {
                if let Some(expr) = self.parse_assignment_expression() {
                    if let Some(v) = self.eval_const_int(&expr) {
                        out.push(Designator::Index(v.max(0) as u64));
                    }
                }
                self.expect_punct(Punct::RBracket, "]");
            } else if self.consume_punct(Punct::Dot) {
                if let Some(ident) = self.expect_identifier() {
                    out.push(Designator::Field(ident.name));
                }
            } else {
                break;
            }
        }
        if !out.is_empty() {
            self.expect_punct(Punct::Eq, "=");
        }
        out
    }

    // ---- constant folding for array sizes / case labels / bitfields ------

    fn eval_const_int(&mut self, expr: &Expr) -> Option<i64> {
        match expr {
            Expr::IntLiteral { value, .. } => Some(*value as i64),
            Expr::CharLiteral { value, .. } => Some(*value as i64),
            Expr::Unary { op, operand, .. } => {
                let v = self.eval_const_int(operand)?;
                Some(match op {
                    UnaryOp::Neg => -v,
                    UnaryOp::Plus => v,
                    UnaryOp::BitNot => !v,
                    UnaryOp::LogicalNot => (v == 0) as i64,
                    _ => return None,
                })
            }
            Expr::Binary { op: BinaryOp::Arith(a), lhs, rhs, .. } => {
                let l = self.eval_const_int(lhs)?;
                let r = self.eval_const_int(rhs)?;
                Some(match a {
                    ArithOp::Add => l + r,
                    ArithOp::Sub => l - r,
                    ArithOp::Mul => l * r,
                    ArithOp::Div if r != 0 => l / r,
                    ArithOp::Mod if r != 0 => l % r,
                    _ => return None,
                })
            }
            Expr::Binary { op: BinaryOp::Bitwise(b), lhs, rhs, .. } => {
                let l = self.eval_const_int(lhs)?;
                let r = self.eval_const_int(rhs)?;
                Some(match b {
                    BitwiseOp::And => l & r,
                    BitwiseOp::Or => l | r,
                    BitwiseOp::Xor => l ^ r,
                    BitwiseOp::Shl => l << r,
                    BitwiseOp::Shr => l >> r,
                })
            }
            _ => {
                let name = self.symtab_enumerator_lookup(expr);
                name
            }
        }
    }

    fn symtab_enumerator_lookup(&self, expr: &Expr) -> Option<i64> {
        if let Expr::Ident(id) = expr {
            if let Some(OrdinaryBinding::Enumerator(v)) = self.symtab.lookup_ordinary(&id.name) {
                return Some(*v);
            }
        }
        None
    }

    // ---- statements --------------------------------------------------------

    fn parse_statement(&mut self) -> Option<Stmt> {
        match &self.peek().kind {
            TokenKind::Punct(Punct::Semi) => {
                let span = self.peek().span;
                self.advance();
                Some(Stmt::Empty(span))
            }
            TokenKind::Punct(Punct::LBrace) => self.parse_compound_statement(),
            TokenKind::Keyword(Keyword::If) => self.parse_if_statement(),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch_statement(),
            TokenKind::Keyword(Keyword::Case) => self.parse_case_statement(),
            TokenKind::Keyword(Keyword::Default) => self.parse_default_statement(),
            TokenKind::Keyword(Keyword::While) => self.parse_while_statement(),
            TokenKind::Keyword(Keyword::Do) => self.parse_do_while_statement(),
            TokenKind::Keyword(Keyword::For) => self.parse_for_statement(),
            TokenKind::Keyword(Keyword::Return) => self.parse_return_statement(),
            TokenKind::Keyword(Keyword::Break) => {
                let span = self.peek().span;
                self.advance();
                self.expect_punct(Punct::Semi, ";")?;
                Some(Stmt::Break(span))
            }
            TokenKind::Keyword(Keyword::Continue) => {
                let span = self.peek().span;
                self.advance();
                self.expect_punct(Punct::Semi, ";")?;
                Some(Stmt::Continue(span))
            }
            TokenKind::Keyword(Keyword::Goto) => {
                let span = self.peek().span;
                self.advance();
                let label = self.expect_identifier()?;
                self.expect_punct(Punct::Semi, ";")?;
                Some(Stmt::Goto { label: label.name, span })
            }
            TokenKind::Identifier(_) if matches!(self.peek_at(1).kind, TokenKind::Punct(Punct::Colon)) => {
                let span = self.peek().span;
                let ident = self.expect_identifier()?;
                self.advance(); // `:`
                let stmt = self.parse_statement()?;
                Some(Stmt::Label { name: ident.name, stmt: Box::new(stmt), span })
            }
            _ => {
                let span = self.peek().span;
                let expr = self.parse_expression()?;
                self.expect_punct(Punct::Semi, ";")?;
                let _ = span;
                Some(Stmt::Expr(expr))
            }
        }
    }

    fn parse_compound_statement(&mut self) -> Option<Stmt> {
        let start = self.peek().span;
        self.expect_punct(Punct::LBrace, "{")?;
        self.symtab.enter_scope();
        let mut items = Vec::new();
        while !self.check_punct(Punct::RBrace) && !self.peek().is_eof() {
            if self.starts_declaration_specifier() {
                match self.parse_declaration() {
                    Some(decls) => items.push(BlockItem::Decl(decls)),
                    None => self.synchronize_statement(),
                }
            } else {
                match self.parse_statement() {
                    Some(stmt) => items.push(BlockItem::Stmt(stmt)),
                    None => self.synchronize_statement(),
                }
            }
        }
        self.symtab.leave_scope();
        let end = self.peek().span;
        self.expect_punct(Punct::RBrace, "}")?;
        Some(Stmt::Compound { items, span: start.merge(end) })
    }

    fn parse_if_statement(&mut self) -> Option<Stmt> {
        let start = self.peek().span;
        self.advance();
        self.expect_punct(Punct::LParen, "(")?;
        let cond = self.parse_expression()?;
        self.expect_punct(Punct::RParen, ")")?;
        let then_branch = Box::new(self.parse_statement()?);
        // Binding the trailing `else` to the nearest open `if` falls out of
        // this call happening right here, before returning to any enclosing
        // `if`'s own else-check.
        let else_branch = if self.consume_keyword(Keyword::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        let span = start.merge(self.prev_span());
        Some(Stmt::If { cond, then_branch, else_branch, span })
    }

    fn parse_switch_statement(&mut self) -> Option<Stmt> {
        let start = self.peek().span;
        self.advance();
        self.expect_punct(Punct::LParen, "(")?;
        let cond = self.parse_expression()?;
        self.expect_punct(Punct::RParen, ")")?;
        let body = Box::new(self.parse_statement()?);
        let span = start.merge(self.prev_span());
        Some(Stmt::Switch { cond, body, span })
    }

    fn parse_case_statement(&mut self) -> Option<Stmt> {
        let start = self.peek().span;
        self.advance();
        let expr = self.parse_conditional_expression()?;
        let value = self.eval_const_int(&expr).unwrap_or(0);
        self.expect_punct(Punct::Colon, ":")?;
        let body = Box::new(self.parse_statement()?);
        let span = start.merge(self.prev_span());
        Some(Stmt::Case { value, body, span })
    }

    fn parse_default_statement(&mut self) -> Option<Stmt> {
        let start = self.peek().span;
        self.advance();
        self.expect_punct(Punct::Colon, ":")?;
        let body = Box::new(self.parse_statement()?);
        let span = start.merge(self.prev_span());
        Some(Stmt::Default { body, span })
    }

    fn parse_while_statement(&mut self) -> Option<Stmt> {
        let start = self.peek().span;
        self.advance();
        self.expect_punct(Punct::LParen, "(")?;
        let cond = self.parse_expression()?;
        self.expect_punct(Punct::RParen, ")")?;
        let body = Box::new(self.parse_statement()?);
        let span = start.merge(self.prev_span());
        Some(Stmt::While { cond, body, span })
    }

    fn parse_do_while_statement(&mut self) -> Option<Stmt> {
        let start = self.peek().span;
        self.advance();
        let body = Box::new(self.parse_statement()?);
        if !self.consume_keyword(Keyword::While) {
            let found = Self::token_text(self.peek());
            let span = self.peek().span;
            self.diagnostics.push(Diagnostic::error(Category::Syntax, span, DiagnosticKind::UnexpectedToken { expected: "'while'".to_string(), found }));
            return None;
        }
        self.expect_punct(Punct::LParen, "(")?;
        let cond = self.parse_expression()?;
        self.expect_punct(Punct::RParen, ")")?;
        self.expect_punct(Punct::Semi, ";")?;
        let span = start.merge(self.prev_span());
        Some(Stmt::DoWhile { body, cond, span })
    }

    fn parse_for_statement(&mut self) -> Option<Stmt> {
        let start = self.peek().span;
        self.advance();
        self.expect_punct(Punct::LParen, "(")?;
        self.symtab.enter_scope();

        let init = if self.consume_punct(Punct::Semi) {
            ForInit::Empty
        } else if self.starts_declaration_specifier() {
            ForInit::Decl(self.parse_declaration().unwrap_or_default())
        } else {
            let e = self.parse_expression();
            self.expect_punct(Punct::Semi, ";");
            match e {
                Some(expr) => ForInit::Expr(expr),
                None => ForInit::Empty,
            }
        };

        let cond = if self.check_punct(Punct::Semi) { None } else { self.parse_expression() };
        self.expect_punct(Punct::Semi, ";")?;
        let post = if self.check_punct(Punct::RParen) { None } else { self.parse_expression() };
        self.expect_punct(Punct::RParen, ")")?;

        let body = Box::new(self.parse_statement()?);
        self.symtab.leave_scope();
        let span = start.merge(self.prev_span());
        Some(Stmt::For { init, cond, post, body, span })
    }

    fn parse_return_statement(&mut self) -> Option<Stmt> {
        let start = self.peek().span;
        self.advance();
        let value = if self.check_punct(Punct::Semi) { None } else { self.parse_expression() };
        self.expect_punct(Punct::Semi, ";")?;
        let span = start.merge(self.prev_span());
        Some(Stmt::Return { value, span })
    }

    // ---- expressions ---------------------------------------------------

    fn parse_expression(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_assignment_expression()?;
        while self.consume_punct(Punct::Comma) {
            let rhs = self.parse_assignment_expression()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Comma { lhs: Box::new(lhs), rhs: Box::new(rhs), span };
        }
        Some(lhs)
    }

    fn assign_op_for(p: Punct) -> Option<AssignOp> {
        use ArithOp::*;
        use BitwiseOp::*;
        Some(match p {
            Punct::Eq => AssignOp::Plain,
            Punct::PlusEq => AssignOp::Arith(Add),
            Punct::MinusEq => AssignOp::Arith(Sub),
            Punct::StarEq => AssignOp::Arith(Mul),
            Punct::SlashEq => AssignOp::Arith(Div),
            Punct::PercentEq => AssignOp::Arith(Mod),
            Punct::AmpEq => AssignOp::Bitwise(And),
            Punct::PipeEq => AssignOp::Bitwise(Or),
            Punct::CaretEq => AssignOp::Bitwise(Xor),
            Punct::ShlEq => AssignOp::Bitwise(Shl),
            Punct::ShrEq => AssignOp::Bitwise(Shr),
            _ => return None,
        })
    }

    fn parse_assignment_expression(&mut self) -> Option<Expr> {
        let lhs = self.parse_conditional_expression()?;
        if let TokenKind::Punct(p) = self.peek().kind {
            if let Some(op) = Self::assign_op_for(p) {
                self.advance();
                let rhs = self.parse_assignment_expression()?;
                let span = lhs.span().merge(rhs.span());
                return Some(Expr::Assign { op, target: Box::new(lhs), value: Box::new(rhs), span });
            }
        }
        Some(lhs)
    }

    fn parse_conditional_expression(&mut self) -> Option<Expr> {
        let cond = self.parse_logical_or_expression()?;
        if self.consume_punct(Punct::Question) {
            let then_expr = self.parse_expression()?;
            self.expect_punct(Punct::Colon, ":")?;
            let else_expr = self.parse_conditional_expression()?;
            let span = cond.span().merge(else_expr.span());
            return Some(Expr::Ternary { cond: Box::new(cond), then_expr: Box::new(then_expr), else_expr: Box::new(else_expr), span });
        }
        Some(cond)
    }

    /// One binary-precedence level: parse an operand with `next`, then
    /// fold in zero or more `op operand` pairs at this level.
    fn parse_binary_level(
        &mut self,
        next: impl Fn(&mut Self) -> Option<Expr>,
        ops: &[(Punct, BinaryOp)],
    ) -> Option<Expr> {
        let mut lhs = next(self)?;
        loop {
            let found = match self.peek().kind {
                TokenKind::Punct(p) => ops.iter().find(|(punct, _)| *punct == p).map(|(_, op)| *op),
                _ => None,
            };
            let Some(op) = found else { break };
            self.advance();
            let rhs = next(self)?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), span };
        }
        Some(lhs)
    }

    fn parse_logical_or_expression(&mut self) -> Option<Expr> {
        self.parse_binary_level(Self::parse_logical_and_expression, &[(Punct::PipePipe, BinaryOp::Logical(LogicalOp::Or))])
    }

    fn parse_logical_and_expression(&mut self) -> Option<Expr> {
        self.parse_binary_level(Self::parse_bitwise_or_expression, &[(Punct::AmpAmp, BinaryOp::Logical(LogicalOp::And))])
    }

    fn parse_bitwise_or_expression(&mut self) -> Option<Expr> {
        self.parse_binary_level(Self::parse_bitwise_xor_expression, &[(Punct::Pipe, BinaryOp::Bitwise(BitwiseOp::Or))])
    }

    fn parse_bitwise_xor_expression(&mut self) -> Option<Expr> {
        self.parse_binary_level(Self::parse_bitwise_and_expression, &[(Punct::Caret, BinaryOp::Bitwise(BitwiseOp::Xor))])
    }

    fn parse_bitwise_and_expression(&mut self) -> Option<Expr> {
        self.parse_binary_level(Self::parse_equality_expression, &[(Punct::Amp, BinaryOp::Bitwise(BitwiseOp::And))])
    }

    fn parse_equality_expression(&mut self) -> Option<Expr> {
        self.parse_binary_level(
            Self::parse_relational_expression,
            &[(Punct::EqEq, BinaryOp::Compare(CompareOp::Eq)), (Punct::Ne, BinaryOp::Compare(CompareOp::Ne))],
        )
    }

    fn parse_relational_expression(&mut self) -> Option<Expr> {
        self.parse_binary_level(
            Self::parse_shift_expression,
            &[
                (Punct::Lt, BinaryOp::Compare(CompareOp::Lt)),
                (Punct::Le, BinaryOp::Compare(CompareOp::Le)),
                (Punct::Gt, BinaryOp::Compare(CompareOp::Gt)),
                (Punct::Ge, BinaryOp::Compare(CompareOp::Ge)),
            ],
        )
    }

    fn parse_shift_expression(&mut self) -> Option<Expr> {
        self.parse_binary_level(
            Self::parse_additive_expression,
            &[(Punct::Shl, BinaryOp::Bitwise(BitwiseOp::Shl)), (Punct::Shr, BinaryOp::Bitwise(BitwiseOp::Shr))],
        )
    }

    fn parse_additive_expression(&mut self) -> Option<Expr> {
        self.parse_binary_level(
            Self::parse_multiplicative_expression,
            &[(Punct::Plus, BinaryOp::Arith(ArithOp::Add)), (Punct::Minus, BinaryOp::Arith(ArithOp::Sub))],
        )
    }

    fn parse_multiplicative_expression(&mut self) -> Option<Expr> {
        self.parse_binary_level(
            Self::parse_cast_expression,
            &[
                (Punct::Star, BinaryOp::Arith(ArithOp::Mul)),
                (Punct::Slash, BinaryOp::Arith(ArithOp::Div)),
                (Punct::Percent, BinaryOp::Arith(ArithOp::Mod)),
            ],
        )
    }

    /// `( type-name )` as a prefix of a cast or compound literal, vs. a
    /// parenthesized expression: decided by whether the token after `(`
    /// could start a declaration-specifier list.
    fn parse_cast_expression(&mut self) -> Option<Expr> {
        if self.check_punct(Punct::LParen) {
            let next = self.peek_at(1);
            let starts_type = match &next.kind {
                TokenKind::Keyword(k) => matches!(
                    k,
                    Keyword::Void | Keyword::Char | Keyword::Short | Keyword::Int | Keyword::Long
                        | Keyword::Float | Keyword::Double | Keyword::Signed | Keyword::Unsigned
                        | Keyword::Bool | Keyword::Struct | Keyword::Union | Keyword::Enum
                        | Keyword::Const | Keyword::Volatile | Keyword::Restrict | Keyword::BuiltinVaList
                ),
                TokenKind::Identifier(name) => self.symtab.is_typedef_name(name),
                _ => false,
            };
            if starts_type {
                let checkpoint = self.pos;
                self.advance(); // `(`
                if let Some(type_name) = self.parse_type_name() {
                    if self.consume_punct(Punct::RParen) {
                        if self.check_punct(Punct::LBrace) {
                            self.advance();
                            let mut items = Vec::new();
                            while !self.check_punct(Punct::RBrace) && !self.peek().is_eof() {
                                let designators = self.parse_designator_list();
                                if let Some(value) = self.parse_initializer() {
                                    items.push(InitItem { designators, value });
                                }
                                if !self.consume_punct(Punct::Comma) {
                                    break;
                                }
                            }
                            let end = self.peek().span;
                            self.expect_punct(Punct::RBrace, "}")?;
                            let span = type_name.span.merge(end);
                            return Some(Expr::CompoundLiteral { type_name, initializer: items, span });
                        }
                        let operand = self.parse_cast_expression()?;
                        let span = type_name.span.merge(operand.span());
                        return Some(Expr::Cast { type_name, operand: Box::new(operand), span });
                    }
                }
                self.pos = checkpoint;
            }
        }
        self.parse_unary_expression()
    }

    fn parse_unary_expression(&mut self) -> Option<Expr> {
        let start = self.peek().span;
        match &self.peek().kind {
            TokenKind::Punct(Punct::PlusPlus) => {
                self.advance();
                let operand = self.parse_unary_expression()?;
                let span = start.merge(operand.span());
                Some(Expr::IncDec { op: IncDecOp::Inc, operand: Box::new(operand), is_post: false, span })
            }
            TokenKind::Punct(Punct::MinusMinus) => {
                self.advance();
                let operand = self.parse_unary_expression()?;
                let span = start.merge(operand.span());
                Some(Expr::IncDec { op: IncDecOp::Dec, operand: Box::new(operand), is_post: false, span })
            }
            TokenKind::Punct(p) if unary_op_for(*p).is_some() => {
                let op = unary_op_for(*p).unwrap();
                self.advance();
                let operand = self.parse_cast_expression()?;
                let span = start.merge(operand.span());
                Some(Expr::Unary { op, operand: Box::new(operand), span })
            }
            TokenKind::Keyword(Keyword::Sizeof) => {
                self.advance();
                if self.check_punct(Punct::LParen) {
                    let is_type = match &self.peek_at(1).kind {
                        TokenKind::Keyword(_) => true,
                        TokenKind::Identifier(name) => self.symtab.is_typedef_name(name),
                        _ => false,
                    };
                    if is_type {
                        let checkpoint = self.pos;
                        self.advance();
                        if let Some(type_name) = self.parse_type_name() {
                            if self.consume_punct(Punct::RParen) {
                                let span = start.merge(self.prev_span());
                                return Some(Expr::SizeofType { type_name, span });
                            }
                        }
                        self.pos = checkpoint;
                    }
                }
                let operand = self.parse_unary_expression()?;
                let span = start.merge(operand.span());
                Some(Expr::SizeofExpr { operand: Box::new(operand), span })
            }
            TokenKind::Keyword(Keyword::BuiltinVaArg) => {
                self.advance();
                self.expect_punct(Punct::LParen, "(")?;
                let ap = self.parse_assignment_expression()?;
                self.expect_punct(Punct::Comma, ",")?;
                let type_name = self.parse_type_name()?;
                self.expect_punct(Punct::RParen, ")")?;
                let span = start.merge(self.prev_span());
                Some(Expr::VaArg { ap: Box::new(ap), type_name, span })
            }
            _ => self.parse_postfix_expression(),
        }
    }

    fn parse_postfix_expression(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary_expression()?;
        loop {
            match &self.peek().kind {
                TokenKind::Punct(Punct::LBracket) => {
                    self.advance();
                    let index = self.parse_expression()?;
                    let end = self.peek().span;
                    self.expect_punct(Punct::RBracket, "]")?;
                    let span = expr.span().merge(end);
                    expr = Expr::ArraySubscript { base: Box::new(expr), index: Box::new(index), span };
                }
                TokenKind::Punct(Punct::LParen) => {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check_punct(Punct::RParen) {
                        loop {
                            args.push(self.parse_assignment_expression()?);
                            if !self.consume_punct(Punct::Comma) {
                                break;
                            }
                        }
                    }
                    let end = self.peek().span;
                    self.expect_punct(Punct::RParen, ")")?;
                    let span = expr.span().merge(end);
                    expr = Expr::Call { callee: Box::new(expr), args, span };
                }
                TokenKind::Punct(Punct::Dot) => {
                    self.advance();
                    let field = self.expect_identifier()?;
                    let span = expr.span().merge(field.span);
                    expr = Expr::Member { base: Box::new(expr), field: field.name, via_arrow: false, span };
                }
                TokenKind::Punct(Punct::Arrow) => {
                    self.advance();
                    let field = self.expect_identifier()?;
                    let span = expr.span().merge(field.span);
                    expr = Expr::Member { base: Box::new(expr), field: field.name, via_arrow: true, span };
                }
                TokenKind::Punct(Punct::PlusPlus) => {
                    let span = expr.span().merge(self.peek().span);
                    self.advance();
                    expr = Expr::IncDec { op: IncDecOp::Inc, operand: Box::new(expr), is_post: true, span };
                }
                TokenKind::Punct(Punct::MinusMinus) => {
                    let span = expr.span().merge(self.peek().span);
                    self.advance();
                    expr = Expr::IncDec { op: IncDecOp::Dec, operand: Box::new(expr), is_post: true, span };
                }
                _ => break,
            }
        }
        Some(expr)
    }

    fn parse_primary_expression(&mut self) -> Option<Expr> {
        let span = self.peek().span;
        match self.peek().kind.clone() {
            TokenKind::IntConstant(text) => {
                self.advance();
                match numeric::decode_integer(&text, self.arch) {
                    Ok(c) => Some(Expr::IntLiteral { value: c.value, signed: c.signed, rank: c.rank, span }),
                    Err(e) => {
                        self.diagnostics.push(Diagnostic::error(Category::Lex, span, DiagnosticKind::MalformedNumericLiteral(e.0)));
                        None
                    }
                }
            }
            TokenKind::FloatConstant(text) => {
                self.advance();
                match numeric::decode_float(&text) {
                    Ok(c) => Some(Expr::FloatLiteral { value_bits: c.value.to_bits(), rank: c.rank, span }),
                    Err(e) => {
                        self.diagnostics.push(Diagnostic::error(Category::Lex, span, DiagnosticKind::MalformedNumericLiteral(e.0)));
                        None
                    }
                }
            }
            TokenKind::CharConstant(value) => {
                self.advance();
                Some(Expr::CharLiteral { value, span })
            }
            TokenKind::StringConstant(mut bytes) => {
                self.advance();
                let mut end = span;
                while let TokenKind::StringConstant(more) = self.peek().kind.clone() {
                    end = self.peek().span;
                    bytes.extend(more);
                    self.advance();
                }
                Some(Expr::StringLiteral { bytes, span: span.merge(end) })
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Some(Expr::Ident(Ident { name, span }))
            }
            TokenKind::Punct(Punct::LParen) => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect_punct(Punct::RParen, ")")?;
                Some(inner)
            }
            _ => {
                let found = Self::token_text(self.peek());
                self.diagnostics.push(Diagnostic::error(
                    Category::Syntax,
                    span,
                    DiagnosticKind::UnexpectedToken { expected: "expression".to_string(), found },
                ));
                None
            }
        }
    }
}

fn unary_op_for(p: Punct) -> Option<UnaryOp> {
    Some(match p {
        Punct::Plus => UnaryOp::Plus,
        Punct::Minus => UnaryOp::Neg,
        Punct::Not => UnaryOp::LogicalNot,
        Punct::Tilde => UnaryOp::BitNot,
        Punct::Amp => UnaryOp::AddrOf,
        Punct::Star => UnaryOp::Deref,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileOptions;
    use std::io::Write;

    fn parse_source(src: &str) -> (TranslationUnit, DiagnosticBag) {
        let mut file = tempfile::NamedTempFile::with_suffix(".c").unwrap();
        file.write_all(src.as_bytes()).unwrap();
        let options = CompileOptions::default();
        let mut lexer = Lexer::new(file.path(), &options).unwrap();
        let lex_diags = std::mem::take(&mut lexer.diagnostics);
        let mut parser = Parser::new(&mut lexer, options.target);
        let tu = parser.parse_translation_unit();
        let mut diags = parser.into_diagnostics();
        for d in lex_diags.into_vec() {
            diags.push(d);
        }
        (tu, diags)
    }

    #[test]
    fn parses_minimal_function() {
        let (tu, diags) = parse_source("int main(void) { return 0; }");
        assert!(!diags.has_errors());
        assert_eq!(tu.decls.len(), 1);
        assert!(matches!(&tu.decls[0], ExternalDecl::FunctionDefinition(f) if f.name == "main"));
    }

    #[test]
    fn typedef_name_is_used_as_a_type_specifier() {
        let (tu, diags) = parse_source("typedef int myint; myint f(void) { return 0; }");
        assert!(!diags.has_errors());
        assert_eq!(tu.decls.len(), 1);
        match &tu.decls[0] {
            ExternalDecl::FunctionDefinition(f) => assert!(f.ret_type.is_integer()),
            _ => panic!("expected a function definition"),
        }
    }

    #[test]
    fn array_of_pointers_vs_pointer_to_array() {
        let (tu, diags) = parse_source("int *a[3]; int (*b)[3];");
        assert!(!diags.has_errors());
        let ExternalDecl::Declaration(a) = &tu.decls[0] else { panic!("expected declaration") };
        assert!(matches!(&a.ty.kind, TypeKind::Array { element, .. } if element.is_pointer()));
        let ExternalDecl::Declaration(b) = &tu.decls[1] else { panic!("expected declaration") };
        assert!(matches!(&b.ty.kind, TypeKind::Pointer(inner) if inner.is_array()));
    }

    #[test]
    fn dangling_else_binds_to_nearest_if() {
        let (tu, diags) = parse_source("int f(void) { if (1) if (2) return 1; else return 2; return 0; }");
        assert!(!diags.has_errors());
        let ExternalDecl::FunctionDefinition(f) = &tu.decls[0] else { panic!("expected a function") };
        let Stmt::Compound { items, .. } = &f.body else { panic!("expected a compound body") };
        let Stmt::If { then_branch, else_branch, .. } = (match &items[0] {
            BlockItem::Stmt(s) => s,
            _ => panic!("expected a statement"),
        }) else {
            panic!("expected an if statement")
        };
        assert!(else_branch.is_some());
        assert!(matches!(**then_branch, Stmt::If { .. }));
    }

    #[test]
    fn struct_forward_declaration_then_definition_is_not_a_redefinition() {
        let (_, diags) = parse_source("struct S; struct S { int x; };");
        assert!(!diags.has_errors());
    }

    #[test]
    fn malformed_declaration_recovers_at_next_statement() {
        let (tu, diags) = parse_source("int f(void) { @@@; return 1; }");
        assert!(diags.has_errors());
        let ExternalDecl::FunctionDefinition(f) = &tu.decls[0] else { panic!("expected a function") };
        let Stmt::Compound { items, .. } = &f.body else { panic!("expected a compound body") };
        assert!(items.iter().any(|it| matches!(it, BlockItem::Stmt(Stmt::Return { .. }))));
    }

    #[test]
    fn compound_literal_is_parsed() {
        let (tu, diags) = parse_source("struct P { int x; int y; }; int f(void) { struct P p = (struct P){1, 2}; return 0; }");
        assert!(!diags.has_errors());
        let _ = tu;
    }
}
