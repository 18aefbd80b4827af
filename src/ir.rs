//! IR data model and its textual form (spec components F/G).
//!
//! A function's body is a flat sequence of [`Instr`], not a tree of basic
//! blocks: [`crate::cfg`] recovers block structure from it by splitting at
//! `nop` labels and after every terminator, prunes unreachable blocks, and
//! re-linearizes. This mirrors how the textual form reads: one instruction
//! per line, destination first.

use crate::config::IrWidth;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

/// The machine type an IR value carries. Distinct from [`crate::types::Type`]:
/// by the time a value exists, pointer/array/struct shape is all that
/// remains relevant to layout and addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrType {
    Void,
    Bool,
    Int(IrWidth),
    Float32,
    Float64,
    Ptr(Box<IrType>),
    Array(Box<IrType>, u64),
    /// A struct/union's synthesized display name, e.g. `Foo_0` for
    /// `struct.Foo_0`; the numeric suffix disambiguates structurally
    /// distinct types that share a source tag (redeclared in nested scopes).
    Struct(String),
}

impl IrType {
    pub fn ptr_to(inner: IrType) -> Self {
        IrType::Ptr(Box::new(inner))
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Bool => write!(f, "bool"),
            IrType::Int(w) => write!(f, "{w}"),
            IrType::Float32 => write!(f, "f32"),
            IrType::Float64 => write!(f, "f64"),
            IrType::Ptr(inner) => write!(f, "*{inner}"),
            IrType::Array(inner, n) => write!(f, "[{inner};{n}]"),
            IrType::Struct(name) => write!(f, "struct.{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstLit {
    Int(i128),
    Float(f64),
}

impl fmt::Display for ConstLit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstLit::Int(v) => write!(f, "{v}"),
            ConstLit::Float(v) => write!(f, "{v:.6}"),
        }
    }
}

/// A value reference: a literal, an unnamed temporary (`%n`), or a named
/// source-level binding (a function's incoming parameter value, before it
/// is spilled to its prologue `alloca` slot).
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Const(IrType, ConstLit),
    Var(IrType, String),
}

impl Operand {
    pub fn ty(&self) -> &IrType {
        match self {
            Operand::Const(ty, _) => ty,
            Operand::Var(ty, _) => ty,
        }
    }

    pub fn temp(ty: IrType, n: u32) -> Self {
        Operand::Var(ty, format!("%{n}"))
    }

    pub fn named(ty: IrType, name: impl Into<String>) -> Self {
        Operand::Var(ty, name.into())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Const(ty, lit) => write!(f, "{ty} {lit}"),
            Operand::Var(ty, name) => write!(f, "{ty} {name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "div",
            ArithOp::Mod => "mod",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitwiseOp {
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl fmt::Display for BitwiseOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BitwiseOp::And => "and",
            BitwiseOp::Or => "or",
            BitwiseOp::Xor => "xor",
            BitwiseOp::Shl => "shl",
            BitwiseOp::Shr => "shr",
        };
        write!(f, "{s}")
    }
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

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertOp {
    /// Signed/unsigned integer to floating.
    IntToFloat,
    /// Floating to signed/unsigned integer (truncates toward zero).
    FloatToInt,
    /// Narrow an integer or a float to a smaller width of the same kind.
    Trunc,
    /// Widen an integer or a float to a larger width of the same kind.
    Ext,
    /// Reinterpret without changing bit width: pointer<->integer,
    /// pointer<->pointer, or any same-width reinterpretation.
    Bitcast,
}

impl fmt::Display for ConvertOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConvertOp::IntToFloat => "itof",
            ConvertOp::FloatToInt => "ftoi",
            ConvertOp::Trunc => "trunc",
            ConvertOp::Ext => "ext",
            ConvertOp::Bitcast => "bitcast",
        };
        write!(f, "{s}")
    }
}

/// One line of the textual IR (spec.md §6's canonical form: destination,
/// `=`, opcode, operands).
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Alloca { dest: String, ty: IrType },
    Load { dest: String, ty: IrType, address: Operand },
    Store { value: Operand, address: Operand },
    Arith { dest: String, ty: IrType, op: ArithOp, lhs: Operand, rhs: Operand },
    Bitwise { dest: String, ty: IrType, op: BitwiseOp, lhs: Operand, rhs: Operand },
    Compare { dest: String, op: CompareOp, lhs: Operand, rhs: Operand },
    Convert { dest: String, ty: IrType, op: ConvertOp, operand: Operand },
    GetArrayElementPtr { dest: String, ty: IrType, base: Operand, index: Operand },
    GetStructMemberPtr { dest: String, ty: IrType, base: Operand, field_index: u32 },
    Call { dest: Option<(String, IrType)>, callee: String, args: Vec<Operand> },
    Br { label: LabelId },
    BrCond { cond: Operand, label: LabelId },
    Ret { value: Option<Operand> },
    Nop { label: LabelId },
}

impl Instr {
    /// `true` for the instructions that end a basic block (spec.md §4.8:
    /// split after every terminator).
    pub fn is_terminator(&self) -> bool {
        matches!(self, Instr::Br { .. } | Instr::BrCond { .. } | Instr::Ret { .. })
    }

    /// The label this instruction unconditionally or conditionally jumps
    /// to, not counting fall-through.
    pub fn jump_target(&self) -> Option<LabelId> {
        match self {
            Instr::Br { label } | Instr::BrCond { label, .. } => Some(*label),
            _ => None,
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Alloca { dest, ty } => write!(f, "*{ty} {dest} = alloca {ty}"),
            Instr::Load { dest, ty, address } => write!(f, "{ty} {dest} = load {address}"),
            Instr::Store { value, address } => write!(f, "store {value}, {address}"),
            Instr::Arith { dest, ty, op, lhs, rhs } => write!(f, "{ty} {dest} = {op} {lhs}, {rhs}"),
            Instr::Bitwise { dest, ty, op, lhs, rhs } => write!(f, "{ty} {dest} = {op} {lhs}, {rhs}"),
            Instr::Compare { dest, op, lhs, rhs } => write!(f, "bool {dest} = {op} {lhs}, {rhs}"),
            Instr::Convert { dest, ty, op, operand } => write!(f, "{ty} {dest} = {op} {operand}"),
            Instr::GetArrayElementPtr { dest, ty, base, index } => {
                write!(f, "*{ty} {dest} = get_array_element_ptr {base}, {index}")
            }
            Instr::GetStructMemberPtr { dest, ty, base, field_index } => {
                write!(f, "*{ty} {dest} = get_struct_member_ptr {base}, i32 {field_index}")
            }
            Instr::Call { dest, callee, args } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                match dest {
                    Some((name, ty)) => write!(f, "{ty} {name} = call {callee}({})", args.join(", ")),
                    None => write!(f, "call {callee}({})", args.join(", ")),
                }
            }
            Instr::Br { label } => write!(f, "br {label}"),
            Instr::BrCond { cond, label } => write!(f, "br_cond {cond}, {label}"),
            Instr::Ret { value: Some(v) } => write!(f, "ret {v}"),
            Instr::Ret { value: None } => write!(f, "ret"),
            Instr::Nop { label } => write!(f, "{label}:\nnop"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: IrType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret_type: IrType,
    pub variadic: bool,
    pub body: Vec<Instr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub ty: IrType,
    pub init: Option<ConstLit>,
    /// String-literal globals carry their raw bytes (including the
    /// trailing NUL) separately from `init`, since a byte array isn't a
    /// single scalar `ConstLit`.
    pub bytes: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for g in &self.globals {
            match (&g.init, &g.bytes) {
                (_, Some(bytes)) => writeln!(f, "global {} @{} = {:?}", g.ty, g.name, String::from_utf8_lossy(bytes))?,
                (Some(c), None) => writeln!(f, "global {} @{} = {c}", g.ty, g.name)?,
                (None, None) => writeln!(f, "global {} @{}", g.ty, g.name)?,
            }
        }
        if !self.globals.is_empty() && !self.functions.is_empty() {
            writeln!(f)?;
        }
        for (i, func) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{func}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(|p| format!("{} {}", p.ty, p.name)).collect();
        let variadic = if self.variadic { ", ..." } else { "" };
        writeln!(f, "func {} @{}({}{}) {{", self.ret_type, self.name, params.join(", "), variadic)?;
        for instr in &self.body {
            writeln!(f, "  {instr}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_one_return_zero() {
        let func = Function {
            name: "main".into(),
            params: vec![],
            ret_type: IrType::Int(IrWidth::I32),
            variadic: false,
            body: vec![Instr::Ret { value: Some(Operand::Const(IrType::Int(IrWidth::I32), ConstLit::Int(0))) }],
        };
        assert_eq!(func.body[0].to_string(), "ret i32 0");
    }

    #[test]
    fn float_constant_renders_with_six_decimals() {
        let v = Operand::Const(IrType::Float32, ConstLit::Float(3.0));
        assert_eq!(v.to_string(), "f32 3.000000");
    }

    #[test]
    fn nop_renders_as_label_then_nop_line() {
        let instr = Instr::Nop { label: LabelId(0) };
        assert_eq!(instr.to_string(), "l0:\nnop");
    }

    #[test]
    fn pointer_and_array_types_render_with_c_style_brackets() {
        let arr = IrType::Array(Box::new(IrType::Int(IrWidth::I32)), 10);
        assert_eq!(IrType::ptr_to(arr).to_string(), "*[i32;10]");
    }
}
