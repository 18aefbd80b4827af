//! Lexer with an embedded preprocessor (spec component B).
//!
//! The scanner is lazy: [`Lexer::scan`] yields one [`Token`] at a time.
//! Preprocessor state — the file-context stack for `#include`, and the
//! process-wide object-like macro table — lives inside the same struct
//! rather than as a separate pass, because `#include` can only be resolved
//! by switching the character stream the scanner reads from mid-stream.
//!
//! Per spec.md §9, function-like macros and `#if`/`#ifdef` are out of
//! scope; only `#include` and object-like `#define` are recognized.

use crate::config::CompileOptions;
use crate::diagnostics::{Category, Diagnostic, DiagnosticBag, DiagnosticKind};
use crate::span::{FileId, Position, SourceMap, Span};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Auto, Break, Case, Char, Const, Continue, Default, Do, Double, Else, Enum, Extern,
    Float, For, Goto, If, Inline, Int, Long, Register, Restrict, Return, Short, Signed,
    Sizeof, Static, Struct, Switch, Typedef, Union, Unsigned, Void, Volatile, While,
    Bool, Alignas, Alignof, Atomic, Complex, Generic, Imaginary, Noreturn, StaticAssert, ThreadLocal,
    BuiltinVaList, BuiltinVaArg, BuiltinVaStart, BuiltinVaEnd, BuiltinVaCopy,
}

impl Keyword {
    fn lookup(spelling: &str) -> Option<Keyword> {
        use Keyword::*;
        Some(match spelling {
            "auto" => Auto, "break" => Break, "case" => Case, "char" => Char,
            "const" => Const, "continue" => Continue, "default" => Default, "do" => Do,
            "double" => Double, "else" => Else, "enum" => Enum, "extern" => Extern,
            "float" => Float, "for" => For, "goto" => Goto, "if" => If, "inline" => Inline,
            "int" => Int, "long" => Long, "register" => Register, "restrict" => Restrict,
            "return" => Return, "short" => Short, "signed" => Signed, "sizeof" => Sizeof,
            "static" => Static, "struct" => Struct, "switch" => Switch, "typedef" => Typedef,
            "union" => Union, "unsigned" => Unsigned, "void" => Void, "volatile" => Volatile,
            "while" => While, "_Bool" => Bool, "_Alignas" => Alignas, "_Alignof" => Alignof,
            "_Atomic" => Atomic, "_Complex" => Complex, "_Generic" => Generic,
            "_Imaginary" => Imaginary, "_Noreturn" => Noreturn, "_Static_assert" => StaticAssert,
            "_Thread_local" => ThreadLocal,
            "__builtin_va_list" => BuiltinVaList, "__builtin_va_arg" => BuiltinVaArg,
            "__builtin_va_start" => BuiltinVaStart, "__builtin_va_end" => BuiltinVaEnd,
            "__builtin_va_copy" => BuiltinVaCopy,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen, RParen, LBrace, RBrace, LBracket, RBracket,
    Semi, Comma, Colon, Question, Dot, Arrow, Ellipsis,
    Plus, Minus, Star, Slash, Percent,
    PlusPlus, MinusMinus,
    Amp, Pipe, Caret, Tilde, Shl, Shr,
    Not, AmpAmp, PipePipe,
    Eq, EqEq, Ne, Lt, Le, Gt, Ge,
    PlusEq, MinusEq, StarEq, SlashEq, PercentEq,
    AmpEq, PipeEq, CaretEq, ShlEq, ShrEq,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Keyword(Keyword),
    Punct(Punct),
    Identifier(String),
    IntConstant(String),
    FloatConstant(String),
    CharConstant(i32),
    StringConstant(Vec<u8>),
    Invalid(String),
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

struct FileContext {
    file: FileId,
    dir: PathBuf,
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    at_line_start: bool,
}

impl FileContext {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
            self.at_line_start = true;
        } else {
            self.column += 1;
            if !c.is_whitespace() {
                self.at_line_start = false;
            }
        }
        Some(c)
    }

    fn eof(&self) -> bool {
        self.pos >= self.chars.len()
    }
}

pub struct Lexer<'a> {
    options: &'a CompileOptions,
    source_map: SourceMap,
    stack: Vec<FileContext>,
    /// Paths currently being scanned, to diagnose `#include` cycles rather
    /// than recursing until the stack overflows.
    active_paths: HashSet<PathBuf>,
    macros: HashMap<String, Vec<Token>>,
    /// Names currently mid-expansion — the hide-set discipline that
    /// prevents `#define A A` (or a cycle through several names) from
    /// expanding forever.
    expanding: HashSet<String>,
    pending: Vec<Token>,
    pub diagnostics: DiagnosticBag,
}

impl<'a> Lexer<'a> {
    pub fn new(root_path: &Path, options: &'a CompileOptions) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(root_path)?;
        let canonical = root_path.canonicalize().unwrap_or_else(|_| root_path.to_path_buf());
        let mut source_map = SourceMap::new();
        let file = source_map.add_file(canonical.clone(), contents.clone());
        let dir = canonical.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        let mut active_paths = HashSet::new();
        active_paths.insert(canonical);

        let mut macros = HashMap::new();
        for (name, replacement) in &options.predefined_macros {
            macros.insert(name.clone(), tokenize_replacement(replacement, file));
        }

        Ok(Lexer {
            options,
            source_map,
            stack: vec![FileContext {
                file,
                dir,
                chars: contents.chars().collect(),
                pos: 0,
                line: 1,
                column: 1,
                at_line_start: true,
            }],
            active_paths,
            macros,
            expanding: HashSet::new(),
            pending: Vec::new(),
            diagnostics: DiagnosticBag::new(),
        })
    }

    pub fn source_map(&self) -> &SourceMap {
        &self.source_map
    }

    fn current_pos(&self) -> Position {
        let top = self.stack.last().expect("at least one file context");
        Position::new(top.file, top.line, top.column)
    }

    /// Produce the next token, expanding object-like macros and resolving
    /// `#include` transparently. Never fails: unrecognized input becomes
    /// `TokenKind::Invalid` with a recorded diagnostic, and scanning
    /// resumes at the next whitespace (spec.md §4.1 "Failure").
    pub fn scan(&mut self) -> Token {
        if let Some(tok) = self.pending.pop() {
            return tok;
        }
        loop {
            self.skip_whitespace_and_comments();
            if self.pop_exhausted_files() {
                continue;
            }
            let top = self.stack.last().unwrap();
            if top.at_line_start && top.peek(0) == Some('#') {
                self.handle_directive();
                continue;
            }
            let token = self.raw_token();
            if let TokenKind::Identifier(name) = &token.kind {
                if let Some(expanded) = self.try_expand_macro(name, token.span) {
                    for t in expanded.into_iter().rev() {
                        self.pending.push(t);
                    }
                    continue;
                }
            }
            return token;
        }
    }

    fn pop_exhausted_files(&mut self) -> bool {
        if self.stack.len() > 1 && self.stack.last().unwrap().eof() {
            let ctx = self.stack.pop().unwrap();
            let path = self.source_map.path(ctx.file).to_path_buf();
            self.active_paths.remove(&path);
            tracing::trace!(path = %path.display(), "popped include context");
            true
        } else {
            false
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            let Some(top) = self.stack.last_mut() else { return };
            match top.peek(0) {
                Some(c) if c.is_whitespace() => {
                    top.bump();
                }
                Some('/') if top.peek(1) == Some('/') => {
                    while !top.eof() && top.peek(0) != Some('\n') {
                        top.bump();
                    }
                }
                Some('/') if top.peek(1) == Some('*') => {
                    top.bump();
                    top.bump();
                    loop {
                        if top.eof() {
                            break;
                        }
                        if top.peek(0) == Some('*') && top.peek(1) == Some('/') {
                            top.bump();
                            top.bump();
                            break;
                        }
                        top.bump();
                    }
                }
                _ => return,
            }
        }
    }

    fn handle_directive(&mut self) {
        let start = self.current_pos();
        let top = self.stack.last_mut().unwrap();
        top.bump(); // '#'
        while top.peek(0) == Some(' ') || top.peek(0) == Some('\t') {
            top.bump();
        }
        let directive = read_identifier(top);
        match directive.as_str() {
            "include" => self.handle_include(start),
            "define" => self.handle_define(),
            _ => {
                // Unsupported directives (`#if`, `#pragma`, ...) are a
                // Non-goal; skip to end of line rather than erroring, so a
                // header guarded only by `#ifndef` still lexes (without
                // conditional-inclusion semantics, every branch is seen —
                // an accepted limitation of this front end, not a crash).
                let top = self.stack.last_mut().unwrap();
                while !top.eof() && top.peek(0) != Some('\n') {
                    top.bump();
                }
            }
        }
    }

    fn handle_include(&mut self, directive_start: Position) {
        let top = self.stack.last_mut().unwrap();
        while top.peek(0) == Some(' ') || top.peek(0) == Some('\t') {
            top.bump();
        }
        let (name, angled) = match top.peek(0) {
            Some('"') => {
                top.bump();
                let mut s = String::new();
                while let Some(c) = top.peek(0) {
                    if c == '"' {
                        break;
                    }
                    s.push(c);
                    top.bump();
                }
                top.bump();
                (s, false)
            }
            Some('<') => {
                top.bump();
                let mut s = String::new();
                while let Some(c) = top.peek(0) {
                    if c == '>' {
                        break;
                    }
                    s.push(c);
                    top.bump();
                }
                top.bump();
                (s, true)
            }
            _ => {
                self.diagnostics.push(Diagnostic::error(
                    Category::Lex,
                    Span::point(directive_start),
                    DiagnosticKind::IncludeNotFound(String::new()),
                ));
                return;
            }
        };
        let current_dir = self.stack.last().unwrap().dir.clone();
        let candidate = self.resolve_include(&name, angled, &current_dir);
        let Some(resolved) = candidate else {
            self.diagnostics.push(Diagnostic::error(
                Category::Lex,
                Span::point(directive_start),
                DiagnosticKind::IncludeNotFound(name),
            ));
            return;
        };
        let canonical = resolved.canonicalize().unwrap_or(resolved);
        if self.active_paths.contains(&canonical) {
            self.diagnostics.push(Diagnostic::error(
                Category::Lex,
                Span::point(directive_start),
                DiagnosticKind::RecursiveInclude(canonical.display().to_string()),
            ));
            return;
        }
        let contents = match std::fs::read_to_string(&canonical) {
            Ok(c) => c,
            Err(_) => {
                self.diagnostics.push(Diagnostic::error(
                    Category::Lex,
                    Span::point(directive_start),
                    DiagnosticKind::IncludeNotFound(canonical.display().to_string()),
                ));
                return;
            }
        };
        tracing::debug!(path = %canonical.display(), "entering include");
        let file = self.source_map.add_file(canonical.clone(), contents.clone());
        let dir = canonical.parent().unwrap_or(Path::new(".")).to_path_buf();
        self.active_paths.insert(canonical);
        self.stack.push(FileContext {
            file,
            dir,
            chars: contents.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            at_line_start: true,
        });
    }

    /// `"..."` form searches the including file's directory first, then
    /// the user list, then the system list; `<...>` form searches the
    /// user list then the system list only (spec.md §4.1).
    fn resolve_include(&self, name: &str, angled: bool, current_dir: &Path) -> Option<PathBuf> {
        let mut search: Vec<PathBuf> = Vec::new();
        if !angled {
            search.push(current_dir.to_path_buf());
            search.extend(self.options.user_include_paths.iter().cloned());
        } else {
            search.extend(self.options.user_include_paths.iter().cloned());
        }
        search.extend(self.options.system_include_paths.iter().cloned());
        search.into_iter().map(|dir| dir.join(name)).find(|p| p.is_file())
    }

    fn handle_define(&mut self) {
        let top = self.stack.last_mut().unwrap();
        while top.peek(0) == Some(' ') || top.peek(0) == Some('\t') {
            top.bump();
        }
        let name = read_identifier(top);
        if name.is_empty() {
            while !top.eof() && top.peek(0) != Some('\n') {
                top.bump();
            }
            return;
        }
        // Object-like macros only: a `(` immediately after the name would
        // introduce a function-like macro, out of scope (spec.md §9); we
        // still consume the line so parsing of the rest of the file isn't
        // thrown off, but the name is not registered.
        if top.peek(0) == Some('(') {
            while !top.eof() && top.peek(0) != Some('\n') {
                top.bump();
            }
            return;
        }
        while top.peek(0) == Some(' ') || top.peek(0) == Some('\t') {
            top.bump();
        }
        let mut replacement_text = String::new();
        while let Some(c) = top.peek(0) {
            if c == '\n' {
                break;
            }
            replacement_text.push(c);
            top.bump();
        }
        let file = top.file;
        self.macros.insert(name, tokenize_replacement(replacement_text.trim(), file));
    }

    fn try_expand_macro(&mut self, name: &str, use_span: Span) -> Option<Vec<Token>> {
        if self.expanding.contains(name) {
            return None;
        }
        let replacement = self.macros.get(name)?.clone();
        if replacement.is_empty() {
            return Some(Vec::new());
        }
        self.expanding.insert(name.to_string());
        let mut out = Vec::new();
        for tok in replacement {
            let tok = Token { kind: tok.kind, span: use_span };
            if let TokenKind::Identifier(inner_name) = &tok.kind {
                if let Some(nested) = self.try_expand_macro(inner_name, use_span) {
                    out.extend(nested);
                    continue;
                }
            }
            out.push(tok);
        }
        self.expanding.remove(name);
        Some(out)
    }

    fn raw_token(&mut self) -> Token {
        let start = self.current_pos();
        let top = self.stack.last_mut().unwrap();
        let Some(c) = top.peek(0) else {
            return Token { kind: TokenKind::Eof, span: Span::point(start) };
        };

        if c.is_ascii_digit() || (c == '.' && top.peek(1).is_some_and(|d| d.is_ascii_digit())) {
            return self.lex_number(start);
        }
        if c == '_' || c.is_alphabetic() {
            let ident = read_identifier(top);
            let end = self.current_pos();
            let span = Span::new(start, end);
            if let Some(kw) = Keyword::lookup(&ident) {
                return Token { kind: TokenKind::Keyword(kw), span };
            }
            return Token { kind: TokenKind::Identifier(ident), span };
        }
        if c == '"' {
            return self.lex_string(start);
        }
        if c == '\'' {
            return self.lex_char(start);
        }
        self.lex_punct(start)
    }

    fn lex_number(&mut self, start: Position) -> Token {
        let top = self.stack.last_mut().unwrap();
        let mut text = String::new();
        let mut is_float = false;
        let mut seen_hex_prefix = false;

        if top.peek(0) == Some('0') && matches!(top.peek(1), Some('x') | Some('X')) {
            seen_hex_prefix = true;
            text.push(top.bump().unwrap());
            text.push(top.bump().unwrap());
        }

        while let Some(c) = top.peek(0) {
            let exponent_marker = if seen_hex_prefix { c == 'p' || c == 'P' } else { c == 'e' || c == 'E' };
            if c.is_ascii_alphanumeric() || c == '.' {
                if c == '.' {
                    is_float = true;
                }
                text.push(c);
                top.bump();
                if exponent_marker {
                    is_float = true;
                    if matches!(top.peek(0), Some('+') | Some('-')) {
                        text.push(top.bump().unwrap());
                    }
                }
            } else {
                break;
            }
        }
        let end = self.current_pos();
        let span = Span::new(start, end);
        if is_float {
            Token { kind: TokenKind::FloatConstant(text), span }
        } else {
            Token { kind: TokenKind::IntConstant(text), span }
        }
    }

    fn lex_string(&mut self, start: Position) -> Token {
        let top = self.stack.last_mut().unwrap();
        top.bump(); // opening quote
        let mut bytes = Vec::new();
        let mut terminated = false;
        while let Some(c) = top.peek(0) {
            if c == '"' {
                top.bump();
                terminated = true;
                break;
            }
            if c == '\n' {
                break;
            }
            if c == '\\' {
                top.bump();
                if let Some(escaped) = read_escape(top) {
                    bytes.push(escaped as u8);
                }
                continue;
            }
            bytes.push(c as u8);
            top.bump();
        }
        let end = self.current_pos();
        let span = Span::new(start, end);
        if !terminated {
            self.diagnostics.push(Diagnostic::error(Category::Lex, span, DiagnosticKind::UnterminatedLiteral));
            return Token { kind: TokenKind::Invalid(String::from_utf8_lossy(&bytes).into_owned()), span };
        }
        Token { kind: TokenKind::StringConstant(bytes), span }
    }

    fn lex_char(&mut self, start: Position) -> Token {
        let top = self.stack.last_mut().unwrap();
        top.bump(); // opening quote
        let value = match top.peek(0) {
            Some('\\') => {
                top.bump();
                read_escape(top).unwrap_or(0) as i32
            }
            Some(c) => {
                top.bump();
                c as i32
            }
            None => 0,
        };
        let terminated = top.peek(0) == Some('\'');
        if terminated {
            top.bump();
        }
        let end = self.current_pos();
        let span = Span::new(start, end);
        if !terminated {
            self.diagnostics.push(Diagnostic::error(Category::Lex, span, DiagnosticKind::UnterminatedLiteral));
            return Token { kind: TokenKind::Invalid("'".into()), span };
        }
        Token { kind: TokenKind::CharConstant(value), span }
    }

    fn lex_punct(&mut self, start: Position) -> Token {
        use Punct::*;
        let top = self.stack.last_mut().unwrap();
        let c0 = top.bump().unwrap();
        let c1 = top.peek(0);
        let c2 = top.peek(1);

        macro_rules! two {
            ($p:expr) => {{
                top.bump();
                $p
            }};
        }
        macro_rules! three {
            ($p:expr) => {{
                top.bump();
                top.bump();
                $p
            }};
        }

        let kind = match (c0, c1, c2) {
            ('.', Some('.'), Some('.')) => three!(Ellipsis),
            ('<', Some('<'), Some('=')) => three!(ShlEq),
            ('>', Some('>'), Some('=')) => three!(ShrEq),
            ('(', _, _) => LParen,
            (')', _, _) => RParen,
            ('{', _, _) => LBrace,
            ('}', _, _) => RBrace,
            ('[', _, _) => LBracket,
            (']', _, _) => RBracket,
            (';', _, _) => Semi,
            (',', _, _) => Comma,
            (':', _, _) => Colon,
            ('?', _, _) => Question,
            ('.', _, _) => Dot,
            ('-', Some('>'), _) => two!(Arrow),
            ('-', Some('-'), _) => two!(MinusMinus),
            ('-', Some('='), _) => two!(MinusEq),
            ('-', _, _) => Minus,
            ('+', Some('+'), _) => two!(PlusPlus),
            ('+', Some('='), _) => two!(PlusEq),
            ('+', _, _) => Plus,
            ('*', Some('='), _) => two!(StarEq),
            ('*', _, _) => Star,
            ('/', Some('='), _) => two!(SlashEq),
            ('/', _, _) => Slash,
            ('%', Some('='), _) => two!(PercentEq),
            ('%', _, _) => Percent,
            ('&', Some('&'), _) => two!(AmpAmp),
            ('&', Some('='), _) => two!(AmpEq),
            ('&', _, _) => Amp,
            ('|', Some('|'), _) => two!(PipePipe),
            ('|', Some('='), _) => two!(PipeEq),
            ('|', _, _) => Pipe,
            ('^', Some('='), _) => two!(CaretEq),
            ('^', _, _) => Caret,
            ('~', _, _) => Tilde,
            ('!', Some('='), _) => two!(Ne),
            ('!', _, _) => Not,
            ('=', Some('='), _) => two!(EqEq),
            ('=', _, _) => Eq,
            ('<', Some('<'), _) => two!(Shl),
            ('<', Some('='), _) => two!(Le),
            ('<', _, _) => Lt,
            ('>', Some('>'), _) => two!(Shr),
            ('>', Some('='), _) => two!(Ge),
            ('>', _, _) => Gt,
            _ => {
                let span = Span::new(start, self.current_pos());
                self.diagnostics.push(Diagnostic::error(
                    Category::Lex,
                    span,
                    DiagnosticKind::InvalidCharacter(c0),
                ));
                return Token { kind: TokenKind::Invalid(c0.to_string()), span };
            }
        };
        let span = Span::new(start, self.current_pos());
        Token { kind: TokenKind::Punct(kind), span }
    }
}

fn read_identifier(top: &mut FileContext) -> String {
    let mut s = String::new();
    while let Some(c) = top.peek(0) {
        if c == '_' || c.is_alphanumeric() {
            s.push(c);
            top.bump();
        } else {
            break;
        }
    }
    s
}

fn read_escape(top: &mut FileContext) -> Option<char> {
    let c = top.peek(0)?;
    top.bump();
    Some(match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        '\\' => '\\',
        '\'' => '\'',
        '"' => '"',
        'a' => '\x07',
        'b' => '\x08',
        'f' => '\x0C',
        'v' => '\x0B',
        other => other,
    })
}

/// Tokenize a macro's replacement text (or a `-D NAME=value` predefined
/// macro body) in isolation, with no active file context: replacement
/// text never itself contains another `#include`.
fn tokenize_replacement(text: &str, file: FileId) -> Vec<Token> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut ctx = FileContext {
        file,
        dir: PathBuf::new(),
        chars: text.chars().collect(),
        pos: 0,
        line: 1,
        column: 1,
        at_line_start: false,
    };
    let mut tokens = Vec::new();
    loop {
        while matches!(ctx.peek(0), Some(c) if c.is_whitespace()) {
            ctx.bump();
        }
        if ctx.eof() {
            break;
        }
        let start = Position::new(ctx.file, ctx.line, ctx.column);
        let c = ctx.peek(0).unwrap();
        if c == '_' || c.is_alphabetic() {
            let ident = read_identifier(&mut ctx);
            let span = Span::new(start, Position::new(ctx.file, ctx.line, ctx.column));
            let kind = Keyword::lookup(&ident).map(TokenKind::Keyword).unwrap_or(TokenKind::Identifier(ident));
            tokens.push(Token { kind, span });
        } else if c.is_ascii_digit() {
            let mut s = String::new();
            while matches!(ctx.peek(0), Some(d) if d.is_ascii_alphanumeric() || d == '.') {
                s.push(ctx.bump().unwrap());
            }
            let span = Span::new(start, Position::new(ctx.file, ctx.line, ctx.column));
            let kind = if s.contains('.') { TokenKind::FloatConstant(s) } else { TokenKind::IntConstant(s) };
            tokens.push(Token { kind, span });
        } else {
            // Anything else in a predefined replacement (punctuation) is
            // rare enough for object-like macros that a single-char token
            // is an acceptable simplification here.
            ctx.bump();
            let span = Span::new(start, Position::new(ctx.file, ctx.line, ctx.column));
            tokens.push(Token { kind: TokenKind::Invalid(c.to_string()), span });
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileOptions;
    use std::io::Write;

    fn lex_all(src: &str) -> (Vec<Token>, CompileOptions) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.c");
        std::fs::File::create(&path).unwrap().write_all(src.as_bytes()).unwrap();
        let options = CompileOptions::default();
        // options must outlive the lexer in the caller; leak for test
        // simplicity since these are short-lived test processes.
        let options: &'static CompileOptions = Box::leak(Box::new(options));
        let mut lexer = Lexer::new(&path, options).unwrap();
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.scan();
            let is_eof = tok.is_eof();
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        (tokens, (*options).clone())
    }

    #[test]
    fn lexes_simple_function() {
        let (tokens, _) = lex_all("int main() { return 0; }");
        assert!(matches!(tokens[0].kind, TokenKind::Keyword(Keyword::Int)));
        assert!(matches!(&tokens[1].kind, TokenKind::Identifier(s) if s == "main"));
    }

    #[test]
    fn skips_line_and_block_comments() {
        let (tokens, _) = lex_all("// comment\nint /* block */ x;");
        assert!(matches!(tokens[0].kind, TokenKind::Keyword(Keyword::Int)));
    }

    #[test]
    fn lexes_hex_float_literal() {
        let (tokens, _) = lex_all("0x1.5p-3");
        assert!(matches!(&tokens[0].kind, TokenKind::FloatConstant(s) if s == "0x1.5p-3"));
    }

    #[test]
    fn expands_object_like_macro() {
        let (tokens, _) = lex_all("#define SIZE 10\nint a[SIZE];");
        let has_ten = tokens.iter().any(|t| matches!(&t.kind, TokenKind::IntConstant(s) if s == "10"));
        assert!(has_ten);
    }

    #[test]
    fn invalid_character_yields_invalid_token_and_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.c");
        std::fs::write(&path, "int x = 1 @ 2;").unwrap();
        let options = CompileOptions::default();
        let mut lexer = Lexer::new(&path, &options).unwrap();
        let mut saw_invalid = false;
        loop {
            let tok = lexer.scan();
            if tok.is_eof() {
                break;
            }
            if matches!(tok.kind, TokenKind::Invalid(_)) {
                saw_invalid = true;
            }
        }
        assert!(saw_invalid);
        assert!(lexer.diagnostics.has_errors());
    }
}
