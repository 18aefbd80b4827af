//! Typed abstract syntax tree.
//!
//! The AST is a tree: every parent exclusively owns its children, no node
//! is shared, nothing cycles back. It exists only to be consumed by
//! [`crate::irgen`] and is dropped once lowering finishes. Every node that
//! a diagnostic could point at carries a [`Span`]; `TypeName` nodes carry
//! an already-resolved [`Type`] because the declarator-building algorithm
//! (§4.5) runs at parse time, not as a separate semantic pass.

use crate::span::Span;
use crate::types::{FloatRank, IntRank, Type};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitwiseOp {
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Binary operators partitioned by the sub-enum the precedence table and
/// the IR lowering both dispatch on (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Arith(ArithOp),
    Bitwise(BitwiseOp),
    Logical(LogicalOp),
    Compare(CompareOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Plain,
    Arith(ArithOp),
    Bitwise(BitwiseOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Neg,
    LogicalNot,
    BitNot,
    AddrOf,
    Deref,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    Inc,
    Dec,
}

/// A parsed `type-name`: declaration-specifiers plus an (possibly
/// abstract) declarator, already folded into a concrete [`Type`] by the
/// declarator-building algorithm (spec.md §4.5) at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName {
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Designator {
    Index(u64),
    Field(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Initializer {
    Expr(Expr),
    List(Vec<InitItem>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitItem {
    pub designators: Vec<Designator>,
    pub value: Initializer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    IntLiteral { value: u128, signed: bool, rank: IntRank, span: Span },
    FloatLiteral { value_bits: u64, rank: FloatRank, span: Span },
    StringLiteral { bytes: Vec<u8>, span: Span },
    CharLiteral { value: i32, span: Span },
    Ident(Ident),
    Unary { op: UnaryOp, operand: Box<Expr>, span: Span },
    IncDec { op: IncDecOp, operand: Box<Expr>, is_post: bool, span: Span },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr>, span: Span },
    Assign { op: AssignOp, target: Box<Expr>, value: Box<Expr>, span: Span },
    Ternary { cond: Box<Expr>, then_expr: Box<Expr>, else_expr: Box<Expr>, span: Span },
    Comma { lhs: Box<Expr>, rhs: Box<Expr>, span: Span },
    Call { callee: Box<Expr>, args: Vec<Expr>, span: Span },
    ArraySubscript { base: Box<Expr>, index: Box<Expr>, span: Span },
    Member { base: Box<Expr>, field: String, via_arrow: bool, span: Span },
    Cast { type_name: TypeName, operand: Box<Expr>, span: Span },
    SizeofExpr { operand: Box<Expr>, span: Span },
    SizeofType { type_name: TypeName, span: Span },
    CompoundLiteral { type_name: TypeName, initializer: Vec<InitItem>, span: Span },
    VaArg { ap: Box<Expr>, type_name: TypeName, span: Span },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::IntLiteral { span, .. }
            | Expr::FloatLiteral { span, .. }
            | Expr::StringLiteral { span, .. }
            | Expr::CharLiteral { span, .. }
            | Expr::Unary { span, .. }
            | Expr::IncDec { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Ternary { span, .. }
            | Expr::Comma { span, .. }
            | Expr::Call { span, .. }
            | Expr::ArraySubscript { span, .. }
            | Expr::Member { span, .. }
            | Expr::Cast { span, .. }
            | Expr::SizeofExpr { span, .. }
            | Expr::SizeofType { span, .. }
            | Expr::CompoundLiteral { span, .. }
            | Expr::VaArg { span, .. } => *span,
            Expr::Ident(id) => id.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    pub name: Option<String>,
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub ty: Type,
    pub name: String,
    pub initializer: Option<Initializer>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForInit {
    Empty,
    Expr(Expr),
    Decl(Vec<Declaration>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockItem {
    Stmt(Stmt),
    Decl(Vec<Declaration>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Empty(Span),
    Expr(Expr),
    Compound { items: Vec<BlockItem>, span: Span },
    If { cond: Expr, then_branch: Box<Stmt>, else_branch: Option<Box<Stmt>>, span: Span },
    Switch { cond: Expr, body: Box<Stmt>, span: Span },
    Case { value: i64, body: Box<Stmt>, span: Span },
    Default { body: Box<Stmt>, span: Span },
    While { cond: Expr, body: Box<Stmt>, span: Span },
    DoWhile { body: Box<Stmt>, cond: Expr, span: Span },
    For { init: ForInit, cond: Option<Expr>, post: Option<Expr>, body: Box<Stmt>, span: Span },
    Return { value: Option<Expr>, span: Span },
    Break(Span),
    Continue(Span),
    Goto { label: String, span: Span },
    Label { name: String, stmt: Box<Stmt>, span: Span },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDefinition {
    pub ret_type: Type,
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub variadic: bool,
    pub body: Stmt,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalDecl {
    Declaration(Declaration),
    FunctionDefinition(FunctionDefinition),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TranslationUnit {
    pub decls: Vec<ExternalDecl>,
}
