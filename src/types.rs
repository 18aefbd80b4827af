//! The C type model (spec component D).
//!
//! `Type` is a structural algebraic sum wrapped in a shared envelope of
//! storage class and qualifiers. Two `Type`s compare equal by `==`
//! whenever `types_equal` would say so in the source design: qualifiers
//! and kind participate, storage class does not (it is a property of a
//! *declaration*, not of the type itself — a `static int` and an `extern
//! int` share one type, `int`).

use bitflags::bitflags;
use std::fmt;
use std::rc::Rc;

bitflags! {
    /// `const`/`volatile`/`restrict` qualifiers. `restrict` only makes
    /// sense on a pointer but is tracked uniformly here; non-pointer types
    /// simply never set it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Qualifiers: u8 {
        const CONST    = 0b001;
        const VOLATILE = 0b010;
        const RESTRICT = 0b100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    None,
    Auto,
    Register,
    Static,
    Extern,
    Typedef,
}

/// Integer rank, in C11's total order `Bool < Char < Short < Int < Long <
/// LongLong`. `Bool` is always unsigned (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntRank {
    Bool,
    Char,
    Short,
    Int,
    Long,
    LongLong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FloatRank {
    Float,
    Double,
    LongDouble,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    /// `Some(width)` for a bitfield member; codegen for bitfields is a
    /// Non-goal (spec.md §1), but the width is still tracked so layout
    /// queries and diagnostics can see it.
    pub bitfield_width: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Enumerator {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamList {
    pub params: Vec<Type>,
    pub variadic: bool,
}

/// The kind-payload of a `Type`. Aggregates are reference-counted so that
/// two declarations referencing the same tag can cheaply share structure
/// without re-deriving `Eq` recursively through a possibly self-referential
/// (via pointer) struct body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Void,
    Integer { signed: bool, rank: IntRank },
    Floating { rank: FloatRank },
    Pointer(Box<Type>),
    Array { element: Box<Type>, size: Option<u64> },
    Function { ret: Box<Type>, params: Rc<ParamList> },
    StructOrUnion(Rc<Aggregate>),
    Enum(Rc<EnumDef>),
    Builtin(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub is_union: bool,
    pub tag: Option<String>,
    pub fields: Vec<Field>,
    /// `true` until the body (`{ ... }`) has been parsed; a forward
    /// declaration like `struct S;` produces an incomplete aggregate,
    /// valid only behind a pointer.
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub tag: Option<String>,
    pub enumerators: Vec<Enumerator>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    pub kind: TypeKind,
    pub qualifiers: Qualifiers,
    pub storage: StorageClassCell,
}

/// Storage class does not participate in type identity (`==`/`types_equal`
/// below deliberately skip it) but declarations still need to carry one
/// around; wrapping it keeps `Type`'s derived `PartialEq` honest about
/// that without hand-writing the impl.
#[derive(Debug, Clone, Copy)]
pub struct StorageClassCell(pub StorageClass);

impl PartialEq for StorageClassCell {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}
impl Eq for StorageClassCell {}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Type { kind, qualifiers: Qualifiers::empty(), storage: StorageClassCell(StorageClass::None) }
    }

    pub fn with_qualifiers(kind: TypeKind, qualifiers: Qualifiers) -> Self {
        Type { kind, qualifiers, storage: StorageClassCell(StorageClass::None) }
    }

    pub fn void() -> Self {
        Type::new(TypeKind::Void)
    }

    pub fn int(signed: bool, rank: IntRank) -> Self {
        Type::new(TypeKind::Integer { signed, rank })
    }

    pub fn bool_ty() -> Self {
        Type::int(false, IntRank::Bool)
    }

    pub fn float(rank: FloatRank) -> Self {
        Type::new(TypeKind::Floating { rank })
    }

    pub fn pointer_to(pointee: Type) -> Self {
        Type::new(TypeKind::Pointer(Box::new(pointee)))
    }

    pub fn array_of(element: Type, size: Option<u64>) -> Self {
        Type::new(TypeKind::Array { element: Box::new(element), size })
    }

    pub fn function(ret: Type, params: Vec<Type>, variadic: bool) -> Self {
        Type::new(TypeKind::Function { ret: Box::new(ret), params: Rc::new(ParamList { params, variadic }) })
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Void)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.kind, TypeKind::Integer { .. })
    }

    pub fn is_floating(&self) -> bool {
        matches!(self.kind, TypeKind::Floating { .. })
    }

    pub fn is_arithmetic(&self) -> bool {
        self.is_integer() || self.is_floating()
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, TypeKind::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array { .. })
    }

    pub fn is_scalar(&self) -> bool {
        self.is_arithmetic() || self.is_pointer()
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, TypeKind::StructOrUnion(_))
    }

    pub fn is_function_type(&self) -> bool {
        matches!(self.kind, TypeKind::Function { .. })
    }

    /// Pointer arithmetic requires a sized, complete pointee (spec.md §3
    /// type invariants: not `void`, not incomplete).
    pub fn is_sized_pointee(&self) -> bool {
        match &self.kind {
            TypeKind::Void => false,
            TypeKind::StructOrUnion(agg) => agg.complete,
            _ => true,
        }
    }

    pub fn pointee(&self) -> Option<&Type> {
        match &self.kind {
            TypeKind::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// Array-to-pointer decay (spec.md §3): an array rvalue converts to a
    /// pointer to its element type. Called whenever an array is used in a
    /// context that wants an rvalue (everywhere except as the operand of
    /// `&`, `sizeof`, or a string-literal initializer).
    pub fn decay(&self) -> Type {
        match &self.kind {
            TypeKind::Array { element, .. } => Type::pointer_to((**element).clone()),
            _ => self.clone(),
        }
    }
}

/// Structural equality used throughout the front end (`types_equal` of
/// spec.md §4.3). Qualifiers are part of identity; storage class is not
/// (see [`StorageClassCell`]). This is exactly `derive(PartialEq)` given
/// that split, so no custom recursive walk is needed — it falls directly
/// out of the `TypeKind` shape.
pub fn types_equal(a: &Type, b: &Type) -> bool {
    a == b
}

/// C11 6.3.1.1: any integer type whose rank is below `int` promotes to
/// `int` (or `unsigned int` if `int` cannot represent all its values,
/// which never triggers in this front end since every sub-`int` rank in
/// the type model fits in `int` on every supported architecture).
pub fn integer_promotion(ty: &Type) -> Type {
    match &ty.kind {
        TypeKind::Integer { rank, .. } if *rank < IntRank::Int => Type::int(true, IntRank::Int),
        _ => ty.clone(),
    }
}

/// C11 6.3.1.8 usual arithmetic conversion, implemented exactly as spec.md
/// §4.3 prescribes, including the two preserved source quirks:
/// - the "signed can represent all of unsigned's values" branch is
///   unreachable when both operands share a rank (ranks are compared
///   before this branch can matter, so equal rank always resolves via the
///   unsigned-wins-at-equal-rank case above it) — kept exactly as the
///   source algorithm is shaped, not patched to add a dead branch.
/// - `_Bool` is promoted to `int` like every other sub-`int` rank before
///   this function ever inspects it.
pub fn common_arithmetic_type(a: &Type, b: &Type) -> Type {
    if let (TypeKind::Floating { rank: ra }, TypeKind::Floating { rank: rb }) = (&a.kind, &b.kind) {
        return Type::float((*ra).max(*rb));
    }
    if let TypeKind::Floating { .. } = a.kind {
        return a.clone();
    }
    if let TypeKind::Floating { .. } = b.kind {
        return b.clone();
    }

    let pa = integer_promotion(a);
    let pb = integer_promotion(b);
    let (TypeKind::Integer { signed: sa, rank: ra }, TypeKind::Integer { signed: sb, rank: rb }) =
        (&pa.kind, &pb.kind)
    else {
        // Non-arithmetic operands reaching here is a caller bug (the IR
        // generator only calls this after checking both sides are
        // arithmetic); fall back to the left operand rather than panic.
        return pa;
    };

    if sa == sb {
        return if ra >= rb { pa.clone() } else { pb.clone() };
    }
    let (signed_ty, signed_rank, unsigned_ty, unsigned_rank) = if *sa {
        (&pa, *ra, &pb, *rb)
    } else {
        (&pb, *rb, &pa, *ra)
    };
    if unsigned_rank >= signed_rank {
        (*unsigned_ty).clone()
    } else {
        // Source assumption preserved (spec.md §9 open question): pick the
        // signed type here without checking whether it can represent
        // every value of the unsigned operand.
        (*signed_ty).clone()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Void => write!(f, "void"),
            TypeKind::Integer { signed, rank } => {
                let base = match rank {
                    IntRank::Bool => "_Bool",
                    IntRank::Char => "char",
                    IntRank::Short => "short",
                    IntRank::Int => "int",
                    IntRank::Long => "long",
                    IntRank::LongLong => "long long",
                };
                if !signed && *rank != IntRank::Bool {
                    write!(f, "unsigned {base}")
                } else {
                    write!(f, "{base}")
                }
            }
            TypeKind::Floating { rank } => {
                let name = match rank {
                    FloatRank::Float => "float",
                    FloatRank::Double => "double",
                    FloatRank::LongDouble => "long double",
                };
                write!(f, "{name}")
            }
            TypeKind::Pointer(inner) => write!(f, "{inner} *"),
            TypeKind::Array { element, size: Some(n) } => write!(f, "{element} [{n}]"),
            TypeKind::Array { element, size: None } => write!(f, "{element} []"),
            TypeKind::Function { ret, params } => {
                let ps: Vec<String> = params.params.iter().map(|p| p.to_string()).collect();
                let variadic = if params.variadic { ", ..." } else { "" };
                write!(f, "{ret} ({}{})", ps.join(", "), variadic)
            }
            TypeKind::StructOrUnion(agg) => {
                let kw = if agg.is_union { "union" } else { "struct" };
                match &agg.tag {
                    Some(tag) => write!(f, "{kw} {tag}"),
                    None => write!(f, "{kw} <anonymous>"),
                }
            }
            TypeKind::Enum(e) => match &e.tag {
                Some(tag) => write!(f, "enum {tag}"),
                None => write!(f, "enum <anonymous>"),
            },
            TypeKind::Builtin(name) => write!(f, "{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn types_equal_ignores_storage_class() {
        let mut a = Type::int(true, IntRank::Int);
        a.storage = StorageClassCell(StorageClass::Static);
        let mut b = Type::int(true, IntRank::Int);
        b.storage = StorageClassCell(StorageClass::Extern);
        assert!(types_equal(&a, &b));
    }

    #[test]
    fn types_equal_distinguishes_qualifiers() {
        let a = Type::int(true, IntRank::Int);
        let b = Type::with_qualifiers(TypeKind::Integer { signed: true, rank: IntRank::Int }, Qualifiers::CONST);
        assert!(!types_equal(&a, &b));
    }

    #[test]
    fn integer_promotion_is_idempotent() {
        let short_ty = Type::int(true, IntRank::Short);
        let once = integer_promotion(&short_ty);
        let twice = integer_promotion(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn common_arithmetic_type_is_commutative() {
        let a = Type::int(false, IntRank::Int);
        let b = Type::int(true, IntRank::Long);
        assert_eq!(common_arithmetic_type(&a, &b), common_arithmetic_type(&b, &a));
    }

    #[test]
    fn floating_dominates_integer() {
        let f = Type::float(FloatRank::Float);
        let i = Type::int(true, IntRank::Long);
        assert_eq!(common_arithmetic_type(&f, &i), f);
    }

    #[test]
    fn equal_rank_mixed_signedness_prefers_unsigned() {
        let s = Type::int(true, IntRank::Int);
        let u = Type::int(false, IntRank::Int);
        assert_eq!(common_arithmetic_type(&s, &u), u);
    }

    #[test]
    fn unsigned_rank_above_signed_rank_wins() {
        let s = Type::int(true, IntRank::Int);
        let u = Type::int(false, IntRank::Long);
        assert_eq!(common_arithmetic_type(&s, &u), u);
    }

    #[test]
    fn bool_promotes_to_int_before_conversion() {
        let b = Type::bool_ty();
        let i = Type::int(true, IntRank::Int);
        assert_eq!(common_arithmetic_type(&b, &i), i);
    }

    #[test]
    fn array_decays_to_pointer() {
        let arr = Type::array_of(Type::int(true, IntRank::Int), Some(10));
        let decayed = arr.decay();
        assert_eq!(decayed, Type::pointer_to(Type::int(true, IntRank::Int)));
    }

    #[test]
    fn incomplete_struct_is_not_a_sized_pointee() {
        let agg = Aggregate { is_union: false, tag: Some("S".into()), fields: vec![], complete: false };
        let ty = Type::new(TypeKind::StructOrUnion(Rc::new(agg)));
        assert!(!ty.is_sized_pointee());
    }
}
