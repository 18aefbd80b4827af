//! Scoped symbol tables (spec.md §3 "Symbol tables").
//!
//! Two parallel stacks of scopes track C's two identifier namespaces:
//! ordinary identifiers (variables, functions, typedef names, enumerators)
//! and tags (struct/union/enum names). A scope is pushed for every
//! compound statement and popped when the parser leaves it; the two
//! stacks always have the same depth because both are driven by the same
//! `enter_scope`/`leave_scope` calls.

use crate::types::{Aggregate, EnumDef, Type};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrdinaryBinding {
    Variable(Type),
    Function(Type),
    TypedefName(Type),
    Enumerator(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagBinding {
    Struct(Rc<Aggregate>),
    Enum(Rc<EnumDef>),
}

#[derive(Debug, Default)]
struct Scope {
    ordinary: HashMap<String, OrdinaryBinding>,
    tags: HashMap<String, TagBinding>,
}

/// Why a `declare_ordinary` call was rejected: the caller turns this into
/// the appropriate [`crate::diagnostics::DiagnosticKind`] (it knows the
/// span; this module only knows names and scopes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclareError {
    /// Same name already bound in the *current* scope with an
    /// incompatible kind (a nested scope shadowing an outer binding is
    /// always fine and never reaches this).
    Redefinition,
}

#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable { scopes: vec![Scope::default()] }
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn leave_scope(&mut self) {
        assert!(self.scopes.len() > 1, "cannot pop the file scope");
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Declare `name` in the *current* scope. A function redeclared with
    /// an identical type in the same scope (the common "prototype, then
    /// definition" pattern) is accepted silently; anything else already
    /// present in this scope is a [`DeclareError::Redefinition`].
    pub fn declare_ordinary(&mut self, name: &str, binding: OrdinaryBinding) -> Result<(), DeclareError> {
        let scope = self.scopes.last_mut().expect("at least file scope");
        if let Some(existing) = scope.ordinary.get(name) {
            let compatible_redecl = matches!(
                (existing, &binding),
                (OrdinaryBinding::Function(a), OrdinaryBinding::Function(b)) if a == b
            );
            if !compatible_redecl {
                return Err(DeclareError::Redefinition);
            }
        }
        scope.ordinary.insert(name.to_string(), binding);
        Ok(())
    }

    /// Forward declarations (`struct S;`) and the eventual body
    /// (`struct S { ... };`) both call this; the later call simply
    /// overwrites the tag's binding with the completed aggregate. Code
    /// that already resolved a pointer to the incomplete type keeps
    /// pointing at it — only *later* lookups see the completed body,
    /// matching how an incomplete type stays incomplete at every point
    /// before its definition.
    pub fn declare_tag(&mut self, name: &str, binding: TagBinding) -> Result<(), DeclareError> {
        let scope = self.scopes.last_mut().expect("at least file scope");
        if let Some(existing) = scope.tags.get(name) {
            if !tag_bodies_compatible(existing, &binding) {
                return Err(DeclareError::Redefinition);
            }
        }
        scope.tags.insert(name.to_string(), binding);
        Ok(())
    }

    pub fn lookup_ordinary(&self, name: &str) -> Option<&OrdinaryBinding> {
        self.scopes.iter().rev().find_map(|s| s.ordinary.get(name))
    }

    pub fn lookup_tag(&self, name: &str) -> Option<&TagBinding> {
        self.scopes.iter().rev().find_map(|s| s.tags.get(name))
    }

    /// The parser consults this whenever it sees a bare identifier token
    /// while scanning for declaration-specifiers (spec.md §4.5): if the
    /// name currently resolves to a typedef, the parser treats the token
    /// as a type-specifier instead of an expression identifier.
    pub fn is_typedef_name(&self, name: &str) -> bool {
        matches!(self.lookup_ordinary(name), Some(OrdinaryBinding::TypedefName(_)))
    }
}

fn tag_bodies_compatible(existing: &TagBinding, incoming: &TagBinding) -> bool {
    match (existing, incoming) {
        (TagBinding::Struct(a), TagBinding::Struct(b)) => {
            // A forward declaration (`complete: false`) is always
            // compatible with anything that completes it later, and an
            // identical completed body redeclared is harmless; only a
            // genuinely different completed body is a redefinition.
            !a.complete || Rc::ptr_eq(a, b) || a == b
        }
        (TagBinding::Enum(a), TagBinding::Enum(b)) => Rc::ptr_eq(a, b) || a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IntRank, Type};

    #[test]
    fn nested_scope_shadows_outer_binding() {
        let mut st = SymbolTable::new();
        st.declare_ordinary("x", OrdinaryBinding::Variable(Type::int(true, IntRank::Int))).unwrap();
        st.enter_scope();
        st.declare_ordinary("x", OrdinaryBinding::Variable(Type::float(crate::types::FloatRank::Double))).unwrap();
        assert!(matches!(st.lookup_ordinary("x"), Some(OrdinaryBinding::Variable(t)) if t.is_floating()));
        st.leave_scope();
        assert!(matches!(st.lookup_ordinary("x"), Some(OrdinaryBinding::Variable(t)) if t.is_integer()));
    }

    #[test]
    fn redefinition_in_same_scope_is_rejected() {
        let mut st = SymbolTable::new();
        st.declare_ordinary("x", OrdinaryBinding::Variable(Type::int(true, IntRank::Int))).unwrap();
        let err = st.declare_ordinary("x", OrdinaryBinding::Variable(Type::float(crate::types::FloatRank::Double)));
        assert_eq!(err, Err(DeclareError::Redefinition));
    }

    #[test]
    fn identical_function_prototype_redeclaration_is_accepted() {
        let mut st = SymbolTable::new();
        let fn_ty = Type::function(Type::void(), vec![Type::int(true, IntRank::Int)], false);
        st.declare_ordinary("f", OrdinaryBinding::Function(fn_ty.clone())).unwrap();
        assert!(st.declare_ordinary("f", OrdinaryBinding::Function(fn_ty)).is_ok());
    }

    #[test]
    fn typedef_name_is_visible_to_is_typedef_name() {
        let mut st = SymbolTable::new();
        st.declare_ordinary("myint", OrdinaryBinding::TypedefName(Type::int(true, IntRank::Int))).unwrap();
        assert!(st.is_typedef_name("myint"));
        assert!(!st.is_typedef_name("x"));
    }

    #[test]
    fn forward_tag_declaration_then_completion_is_not_a_redefinition() {
        let mut st = SymbolTable::new();
        let incomplete = Rc::new(Aggregate { is_union: false, tag: Some("S".into()), fields: vec![], complete: false });
        st.declare_tag("S", TagBinding::Struct(incomplete)).unwrap();
        let complete = Rc::new(Aggregate { is_union: false, tag: Some("S".into()), fields: vec![], complete: true });
        assert!(st.declare_tag("S", TagBinding::Struct(complete)).is_ok());
    }
}
