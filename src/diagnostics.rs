//! Error taxonomy and collection.
//!
//! The front end never aborts a translation unit on its first error: the
//! lexer tolerates garbage characters, the parser resynchronizes at
//! statement boundaries, and IR generation skips malformed expressions
//! without abandoning the enclosing function (see [`crate::irgen`]). Every
//! diagnostic produced along the way lands in one [`DiagnosticBag`] per
//! translation unit.

use crate::span::Span;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Lex,
    Syntax,
    Semantic,
    ControlFlow,
}

/// The abstract error taxonomy of spec.md §7, one variant per kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    // --- Lexical ---
    InvalidCharacter(char),
    UnterminatedLiteral,
    MalformedNumericLiteral(String),
    RecursiveInclude(String),
    IncludeNotFound(String),

    // --- Syntactic ---
    UnexpectedToken { expected: String, found: String },
    MissingCloser(char),
    MalformedDeclarator,

    // --- Semantic: identifier ---
    UndeclaredIdentifier(String),
    Redefinition(String),
    UndeclaredLabel(String),
    RedefinitionOfLabel(String),
    TagRedefinedWithDifferentBody(String),

    // --- Semantic: type ---
    OperandTypeMismatch { op: String },
    InvalidAssignmentTarget,
    InvalidInitializerType,
    NonConstantGlobalInitializer,
    CallTargetNotFunction,
    ArgumentCountMismatch { expected: usize, found: usize },
    IndirectionOnNonPointer,
    SubscriptOnNonArrayOrPointer,
    MemberAccessOnNonAggregate,
    UnknownStructField(String),
    InvalidConditionType,
    InvalidUnaryArithmeticOperand,
    InvalidConversionToBool,
    IncrementOfNonScalar,

    // --- Control flow ---
    BreakOutsideLoopOrSwitch,
    ContinueOutsideLoop,
    NonVoidFunctionMissingReturn,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::InvalidCharacter(c) => write!(f, "invalid character '{c}'"),
            DiagnosticKind::UnterminatedLiteral => write!(f, "unterminated string or character literal"),
            DiagnosticKind::MalformedNumericLiteral(s) => write!(f, "malformed numeric literal '{s}'"),
            DiagnosticKind::RecursiveInclude(p) => write!(f, "'{p}' includes itself"),
            DiagnosticKind::IncludeNotFound(p) => write!(f, "cannot find include file '{p}'"),
            DiagnosticKind::UnexpectedToken { expected, found } => {
                write!(f, "expected {expected}, found '{found}'")
            }
            DiagnosticKind::MissingCloser(c) => write!(f, "missing closing '{c}'"),
            DiagnosticKind::MalformedDeclarator => write!(f, "malformed declarator"),
            DiagnosticKind::UndeclaredIdentifier(name) => write!(f, "use of undeclared identifier '{name}'"),
            DiagnosticKind::Redefinition(name) => write!(f, "redefinition of '{name}'"),
            DiagnosticKind::UndeclaredLabel(name) => write!(f, "use of undeclared label '{name}'"),
            DiagnosticKind::RedefinitionOfLabel(name) => write!(f, "redefinition of label '{name}'"),
            DiagnosticKind::TagRedefinedWithDifferentBody(name) => {
                write!(f, "'{name}' redefined with a different body")
            }
            DiagnosticKind::OperandTypeMismatch { op } => write!(f, "invalid operand types for '{op}'"),
            DiagnosticKind::InvalidAssignmentTarget => write!(f, "expression is not assignable"),
            DiagnosticKind::InvalidInitializerType => write!(f, "initializer type does not match declared type"),
            DiagnosticKind::NonConstantGlobalInitializer => {
                write!(f, "initializer of a global must be a constant expression")
            }
            DiagnosticKind::CallTargetNotFunction => write!(f, "called object is not a function"),
            DiagnosticKind::ArgumentCountMismatch { expected, found } => {
                write!(f, "expected {expected} argument(s), found {found}")
            }
            DiagnosticKind::IndirectionOnNonPointer => write!(f, "indirection requires a pointer operand"),
            DiagnosticKind::SubscriptOnNonArrayOrPointer => {
                write!(f, "subscript requires an array or pointer operand")
            }
            DiagnosticKind::MemberAccessOnNonAggregate => {
                write!(f, "member access requires a struct or union operand")
            }
            DiagnosticKind::UnknownStructField(name) => write!(f, "no member named '{name}'"),
            DiagnosticKind::InvalidConditionType => write!(f, "condition must have scalar type"),
            DiagnosticKind::InvalidUnaryArithmeticOperand => write!(f, "invalid operand to unary arithmetic operator"),
            DiagnosticKind::InvalidConversionToBool => write!(f, "value cannot be converted to a boolean"),
            DiagnosticKind::IncrementOfNonScalar => write!(f, "increment/decrement requires a scalar operand"),
            DiagnosticKind::BreakOutsideLoopOrSwitch => write!(f, "'break' outside a loop or switch"),
            DiagnosticKind::ContinueOutsideLoop => write!(f, "'continue' outside a loop"),
            DiagnosticKind::NonVoidFunctionMissingReturn => {
                write!(f, "non-void function falls off the end without a return value")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: Category,
    pub primary: Span,
    pub secondary: Option<Span>,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn error(category: Category, primary: Span, kind: DiagnosticKind) -> Self {
        Diagnostic { severity: Severity::Error, category, primary, secondary: None, kind }
    }

    pub fn warning(category: Category, primary: Span, kind: DiagnosticKind) -> Self {
        Diagnostic { severity: Severity::Warning, category, primary, secondary: None, kind }
    }

    pub fn with_secondary(mut self, secondary: Span) -> Self {
        self.secondary = Some(secondary);
        self
    }
}

/// Accumulates diagnostics for one translation unit.
///
/// Mirrors the builder shape of the teacher's `CompilerConfig`: construct
/// empty, push as you go, query at the end.
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        DiagnosticBag::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity == Severity::Error {
            tracing::debug!(kind = %diagnostic.kind, "diagnostic recorded");
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{FileId, Position, SourceMap};
    use std::path::PathBuf;

    fn dummy_span() -> Span {
        let f = test_file_id();
        Span::point(Position::new(f, 1, 1))
    }

    // FileId has no public constructor outside span.rs by design; tests
    // that need one go through a real SourceMap.
    fn test_file_id() -> FileId {
        let mut map = SourceMap::new();
        map.add_file(PathBuf::from("t.c"), String::new())
    }

    #[test]
    fn bag_reports_errors_present() {
        let mut bag = DiagnosticBag::new();
        assert!(!bag.has_errors());
        bag.push(Diagnostic::warning(Category::Lex, dummy_span(), DiagnosticKind::UnterminatedLiteral));
        assert!(!bag.has_errors());
        bag.push(Diagnostic::error(
            Category::Semantic,
            dummy_span(),
            DiagnosticKind::UndeclaredIdentifier("x".into()),
        ));
        assert!(bag.has_errors());
        assert_eq!(bag.len(), 2);
    }
}
