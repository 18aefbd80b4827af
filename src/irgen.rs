//! Semantic analysis folded into IR generation (components E/F/G).
//!
//! There is no separate "type-check, then generate" pass: [`IrGenerator`]
//! walks the AST once, computing each expression's C type alongside its IR
//! operand so usual arithmetic conversions, lvalue/rvalue handling, and
//! diagnostics all happen at the point where the information is freshest.
//! A lowering step that fails records a diagnostic and returns `None`; the
//! caller treats that as a poisoned subexpression and keeps going with the
//! rest of the statement or function, per the propagation policy this
//! front end follows throughout.

use crate::ast::*;
use crate::cfg::prune_and_linearize;
use crate::config::TargetArch;
use crate::diagnostics::{Category, Diagnostic, DiagnosticBag, DiagnosticKind};
use crate::ir::{self, ArithOp as IrArith, BitwiseOp as IrBitwise, CompareOp as IrCompare, ConstLit, ConvertOp, Instr, IrType, LabelId, Operand};
use crate::span::Span;
use crate::types::{common_arithmetic_type, integer_promotion, Aggregate, FloatRank, IntRank, Type, TypeKind};
use itertools::Itertools;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone)]
enum Binding {
    Local { addr: Operand, ty: Type },
    Global { name: String, ty: Type },
    EnumConst { value: i64 },
}

struct FuncCtx {
    body: Vec<Instr>,
    next_value: u32,
    next_label: u32,
    scopes: Vec<HashMap<String, Binding>>,
    break_labels: Vec<LabelId>,
    continue_labels: Vec<LabelId>,
    goto_labels: HashMap<String, LabelId>,
    switch_label_stack: Vec<HashMap<Span, LabelId>>,
    ret_type: Type,
}

impl FuncCtx {
    fn new(ret_type: Type) -> Self {
        FuncCtx {
            body: Vec::new(),
            next_value: 0,
            next_label: 0,
            scopes: vec![HashMap::new()],
            break_labels: Vec::new(),
            continue_labels: Vec::new(),
            goto_labels: HashMap::new(),
            switch_label_stack: Vec::new(),
            ret_type,
        }
    }

    fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn leave_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: String, binding: Binding) {
        self.scopes.last_mut().expect("at least one scope").insert(name, binding);
    }

    fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }
}

/// Walks a typed AST and lowers it into an [`ir::Module`]. One instance is
/// reused across an entire translation unit so struct display names stay
/// consistent between functions that share a tag.
pub struct IrGenerator {
    arch: TargetArch,
    globals: HashMap<String, Binding>,
    struct_names: HashMap<usize, String>,
    struct_counter: u32,
    string_literals: HashMap<Vec<u8>, String>,
    string_literal_order: Vec<Vec<u8>>,
}

impl IrGenerator {
    pub fn new(arch: TargetArch) -> Self {
        IrGenerator {
            arch,
            globals: HashMap::new(),
            struct_names: HashMap::new(),
            struct_counter: 0,
            string_literals: HashMap::new(),
            string_literal_order: Vec::new(),
        }
    }

    /// Interns a string literal's bytes as an anonymous global, deduplicating
    /// identical literals, and returns the global's name (without the `@`).
    fn intern_string(&mut self, bytes: &[u8]) -> String {
        if let Some(name) = self.string_literals.get(bytes) {
            return name.clone();
        }
        let name = format!("str.{}", self.string_literal_order.len());
        self.string_literals.insert(bytes.to_vec(), name.clone());
        self.string_literal_order.push(bytes.to_vec());
        name
    }

    pub fn generate(&mut self, tu: &TranslationUnit, diagnostics: &mut DiagnosticBag) -> ir::Module {
        let mut module = ir::Module::default();

        for decl in &tu.decls {
            match decl {
                ExternalDecl::FunctionDefinition(fd) => {
                    let fn_ty = Type::function(fd.ret_type.clone(), fd.params.iter().map(|p| p.ty.clone()).collect(), fd.variadic);
                    self.globals.insert(fd.name.clone(), Binding::Global { name: fd.name.clone(), ty: fn_ty });
                }
                ExternalDecl::Declaration(d) => {
                    self.globals.insert(d.name.clone(), Binding::Global { name: d.name.clone(), ty: d.ty.clone() });
                }
            }
        }

        for decl in &tu.decls {
            match decl {
                ExternalDecl::Declaration(d) => {
                    if d.ty.is_function_type() {
                        continue; // a bare prototype; nothing to emit
                    }
                    let ty = self.ir_type(&d.ty);
                    let init = d.initializer.as_ref().and_then(|init| match init {
                        Initializer::Expr(e) => self.const_eval(e),
                        Initializer::List(_) => None,
                    });
                    if d.initializer.is_some() && init.is_none() {
                        diagnostics.push(Diagnostic::error(Category::Semantic, d.span, DiagnosticKind::NonConstantGlobalInitializer));
                    }
                    module.globals.push(ir::Global { name: d.name.clone(), ty, init, bytes: None });
                }
                ExternalDecl::FunctionDefinition(fd) => {
                    module.functions.push(self.lower_function(fd, diagnostics));
                }
            }
        }

        for bytes in std::mem::take(&mut self.string_literal_order) {
            let name = self.string_literals[&bytes].clone();
            let char_ir = IrType::Int(self.arch.int_width(IntRank::Char));
            let mut data = bytes;
            data.push(0);
            module.globals.push(ir::Global { name, ty: IrType::Array(Box::new(char_ir), data.len() as u64), init: None, bytes: Some(data) });
        }

        module
    }

    // ---- type mapping -------------------------------------------------

    fn struct_name(&mut self, agg: &Rc<Aggregate>) -> String {
        let key = Rc::as_ptr(agg) as usize;
        if let Some(name) = self.struct_names.get(&key) {
            return name.clone();
        }
        let tag = agg.tag.clone().unwrap_or_else(|| "anon".to_string());
        let name = format!("{tag}_{}", self.struct_counter);
        self.struct_counter += 1;
        self.struct_names.insert(key, name.clone());
        name
    }

    fn ir_type(&mut self, ty: &Type) -> IrType {
        match &ty.kind {
            TypeKind::Void => IrType::Void,
            TypeKind::Integer { rank: IntRank::Bool, .. } => IrType::Bool,
            TypeKind::Integer { rank, .. } => IrType::Int(self.arch.int_width(*rank)),
            TypeKind::Floating { rank: FloatRank::Float } => IrType::Float32,
            TypeKind::Floating { .. } => IrType::Float64,
            TypeKind::Pointer(inner) => IrType::ptr_to(self.ir_type(inner)),
            TypeKind::Array { element, size } => IrType::Array(Box::new(self.ir_type(element)), size.unwrap_or(0)),
            TypeKind::Function { .. } => IrType::ptr_to(IrType::Void),
            TypeKind::StructOrUnion(agg) => IrType::Struct(self.struct_name(agg)),
            TypeKind::Enum(_) => IrType::Int(self.arch.int_width(IntRank::Int)),
            TypeKind::Builtin(_) => IrType::ptr_to(IrType::Void),
        }
    }

    fn size_of(&self, ty: &Type) -> u64 {
        match &ty.kind {
            TypeKind::Void => 0,
            TypeKind::Integer { rank, .. } => (self.arch.int_width(*rank).bits() / 8) as u64,
            TypeKind::Floating { rank } => (self.arch.float_width(*rank).bits() / 8) as u64,
            TypeKind::Pointer(_) | TypeKind::Function { .. } | TypeKind::Builtin(_) => {
                (self.arch.pointer_width().bits() / 8) as u64
            }
            TypeKind::Array { element, size } => self.size_of(element) * size.unwrap_or(0),
            TypeKind::StructOrUnion(agg) => self.struct_layout(agg).1,
            TypeKind::Enum(_) => (self.arch.int_width(IntRank::Int).bits() / 8) as u64,
        }
    }

    fn align_of(&self, ty: &Type) -> u64 {
        match &ty.kind {
            TypeKind::Array { element, .. } => self.align_of(element),
            TypeKind::StructOrUnion(agg) => self.struct_layout(agg).2,
            _ => self.size_of(ty).max(1),
        }
    }

    /// Sequential field layout with natural alignment; returns (offsets,
    /// total size, struct alignment). Bitfields are not packed (codegen for
    /// them is out of scope) — a bitfield member occupies its declared
    /// type's full storage like an ordinary member.
    fn struct_layout(&self, agg: &Aggregate) -> (Vec<u64>, u64, u64) {
        let mut offsets = Vec::with_capacity(agg.fields.len());
        let mut offset = 0u64;
        let mut max_align = 1u64;
        for field in &agg.fields {
            let a = self.align_of(&field.ty);
            offset = round_up(offset, a);
            offsets.push(offset);
            offset += self.size_of(&field.ty);
            max_align = max_align.max(a);
        }
        let total = round_up(offset, max_align);
        (offsets, total.max(1), max_align)
    }

    fn fresh_value(&self, fctx: &mut FuncCtx) -> String {
        let n = fctx.next_value;
        fctx.next_value += 1;
        format!("%{n}")
    }

    fn fresh_label(&self, fctx: &mut FuncCtx) -> LabelId {
        let n = fctx.next_label;
        fctx.next_label += 1;
        LabelId(n)
    }

    // ---- constant folding for global initializers ----------------------

    fn const_eval(&mut self, expr: &Expr) -> Option<ConstLit> {
        match expr {
            Expr::IntLiteral { value, .. } => Some(ConstLit::Int(*value as i128)),
            Expr::FloatLiteral { value_bits, .. } => Some(ConstLit::Float(f64::from_bits(*value_bits))),
            Expr::CharLiteral { value, .. } => Some(ConstLit::Int(*value as i128)),
            Expr::Unary { op: UnaryOp::Neg, operand, .. } => match self.const_eval(operand)? {
                ConstLit::Int(v) => Some(ConstLit::Int(-v)),
                ConstLit::Float(v) => Some(ConstLit::Float(-v)),
            },
            Expr::Unary { op: UnaryOp::Plus, operand, .. } => self.const_eval(operand),
            Expr::Unary { op: UnaryOp::BitNot, operand, .. } => match self.const_eval(operand)? {
                ConstLit::Int(v) => Some(ConstLit::Int(!(v as i64) as i128)),
                ConstLit::Float(_) => None,
            },
            Expr::Binary { op: BinaryOp::Arith(aop), lhs, rhs, .. } => {
                let l = self.const_eval(lhs)?;
                let r = self.const_eval(rhs)?;
                fold_const_pair(*aop, l, r)
            }
            _ => None,
        }
    }

    // ---- functions -------------------------------------------------

    fn lower_function(&mut self, fd: &FunctionDefinition, diagnostics: &mut DiagnosticBag) -> ir::Function {
        let mut fctx = FuncCtx::new(fd.ret_type.clone());
        fctx.enter_scope();
        let mut params = Vec::new();
        for (i, p) in fd.params.iter().enumerate() {
            let name = p.name.clone().unwrap_or_else(|| format!("__arg{i}"));
            let ir_ty = self.ir_type(&p.ty);
            params.push(ir::Param { name: name.clone(), ty: ir_ty.clone() });
            let alloca_name = self.fresh_value(&mut fctx);
            fctx.body.push(Instr::Alloca { dest: alloca_name.clone(), ty: ir_ty.clone() });
            let addr = Operand::named(IrType::ptr_to(ir_ty.clone()), alloca_name);
            let incoming = Operand::named(ir_ty, name.clone());
            fctx.body.push(Instr::Store { value: incoming, address: addr.clone() });
            fctx.declare(name, Binding::Local { addr, ty: p.ty.clone() });
        }

        self.collect_labels(&fd.body, &mut fctx);
        self.lower_stmt(&mut fctx, &fd.body, diagnostics);
        fctx.leave_scope();

        let needs_implicit_ret = !matches!(fctx.body.last(), Some(Instr::Ret { .. }));
        if needs_implicit_ret {
            if fd.ret_type.is_void() {
                fctx.body.push(Instr::Ret { value: None });
            } else {
                if fd.name != "main" {
                    diagnostics.push(Diagnostic::warning(Category::ControlFlow, fd.span, DiagnosticKind::NonVoidFunctionMissingReturn));
                }
                let ret_ir = self.ir_type(&fd.ret_type);
                fctx.body.push(Instr::Ret { value: Some(Operand::Const(ret_ir, ConstLit::Int(0))) });
            }
        }

        let body = prune_and_linearize(fctx.body);
        ir::Function { name: fd.name.clone(), params, ret_type: self.ir_type(&fd.ret_type), variadic: fd.variadic, body }
    }

    fn collect_labels(&mut self, stmt: &Stmt, fctx: &mut FuncCtx) {
        match stmt {
            Stmt::Label { name, stmt: inner, .. } => {
                let label = self.fresh_label(fctx);
                fctx.goto_labels.insert(name.clone(), label);
                self.collect_labels(inner, fctx);
            }
            Stmt::Compound { items, .. } => {
                for item in items {
                    if let BlockItem::Stmt(s) = item {
                        self.collect_labels(s, fctx);
                    }
                }
            }
            Stmt::If { then_branch, else_branch, .. } => {
                self.collect_labels(then_branch, fctx);
                if let Some(e) = else_branch {
                    self.collect_labels(e, fctx);
                }
            }
            Stmt::Switch { body, .. }
            | Stmt::Case { body, .. }
            | Stmt::Default { body, .. }
            | Stmt::While { body, .. }
            | Stmt::DoWhile { body, .. }
            | Stmt::For { body, .. } => self.collect_labels(body, fctx),
            _ => {}
        }
    }

    // ---- statements -----------------------------------------------

    fn lower_stmt(&mut self, fctx: &mut FuncCtx, stmt: &Stmt, diagnostics: &mut DiagnosticBag) {
        match stmt {
            Stmt::Empty(_) => {}
            Stmt::Expr(e) => {
                self.lower_expr(fctx, e, diagnostics);
            }
            Stmt::Compound { items, .. } => {
                fctx.enter_scope();
                for item in items {
                    match item {
                        BlockItem::Decl(decls) => {
                            for d in decls {
                                self.lower_local_decl(fctx, d, diagnostics);
                            }
                        }
                        BlockItem::Stmt(s) => self.lower_stmt(fctx, s, diagnostics),
                    }
                }
                fctx.leave_scope();
            }
            Stmt::If { cond, then_branch, else_branch, .. } => {
                let Some((cv, ct)) = self.lower_expr(fctx, cond, diagnostics) else { return };
                let negated = self.negated_condition(fctx, cv, &ct);
                let l_else = self.fresh_label(fctx);
                fctx.body.push(Instr::BrCond { cond: negated, label: l_else });
                self.lower_stmt(fctx, then_branch, diagnostics);
                if let Some(else_stmt) = else_branch {
                    let l_end = self.fresh_label(fctx);
                    fctx.body.push(Instr::Br { label: l_end });
                    fctx.body.push(Instr::Nop { label: l_else });
                    self.lower_stmt(fctx, else_stmt, diagnostics);
                    fctx.body.push(Instr::Nop { label: l_end });
                } else {
                    fctx.body.push(Instr::Nop { label: l_else });
                }
            }
            Stmt::While { cond, body, .. } => {
                let l_top = self.fresh_label(fctx);
                let l_end = self.fresh_label(fctx);
                fctx.body.push(Instr::Nop { label: l_top });
                let Some((cv, ct)) = self.lower_expr(fctx, cond, diagnostics) else { return };
                if constant_truthy(&cv) != Some(true) {
                    let negated = self.negated_condition(fctx, cv, &ct);
                    fctx.body.push(Instr::BrCond { cond: negated, label: l_end });
                }
                fctx.break_labels.push(l_end);
                fctx.continue_labels.push(l_top);
                self.lower_stmt(fctx, body, diagnostics);
                fctx.break_labels.pop();
                fctx.continue_labels.pop();
                fctx.body.push(Instr::Br { label: l_top });
                fctx.body.push(Instr::Nop { label: l_end });
            }
            Stmt::DoWhile { body, cond, .. } => {
                let l_top = self.fresh_label(fctx);
                let l_cont = self.fresh_label(fctx);
                let l_end = self.fresh_label(fctx);
                fctx.body.push(Instr::Nop { label: l_top });
                fctx.break_labels.push(l_end);
                fctx.continue_labels.push(l_cont);
                self.lower_stmt(fctx, body, diagnostics);
                fctx.break_labels.pop();
                fctx.continue_labels.pop();
                fctx.body.push(Instr::Nop { label: l_cont });
                if let Some((cv, ct)) = self.lower_expr(fctx, cond, diagnostics) {
                    let nonzero = self.nonzero_condition(fctx, cv, &ct);
                    fctx.body.push(Instr::BrCond { cond: nonzero, label: l_top });
                }
                fctx.body.push(Instr::Nop { label: l_end });
            }
            Stmt::For { init, cond, post, body, .. } => {
                fctx.enter_scope();
                match init {
                    ForInit::Empty => {}
                    ForInit::Expr(e) => {
                        self.lower_expr(fctx, e, diagnostics);
                    }
                    ForInit::Decl(decls) => {
                        for d in decls {
                            self.lower_local_decl(fctx, d, diagnostics);
                        }
                    }
                }
                let l_top = self.fresh_label(fctx);
                let l_cont = self.fresh_label(fctx);
                let l_end = self.fresh_label(fctx);
                fctx.body.push(Instr::Nop { label: l_top });
                if let Some(c) = cond {
                    if let Some((cv, ct)) = self.lower_expr(fctx, c, diagnostics) {
                        if constant_truthy(&cv) != Some(true) {
                            let negated = self.negated_condition(fctx, cv, &ct);
                            fctx.body.push(Instr::BrCond { cond: negated, label: l_end });
                        }
                    }
                }
                fctx.break_labels.push(l_end);
                fctx.continue_labels.push(l_cont);
                self.lower_stmt(fctx, body, diagnostics);
                fctx.break_labels.pop();
                fctx.continue_labels.pop();
                fctx.body.push(Instr::Nop { label: l_cont });
                if let Some(p) = post {
                    self.lower_expr(fctx, p, diagnostics);
                }
                fctx.body.push(Instr::Br { label: l_top });
                fctx.body.push(Instr::Nop { label: l_end });
                fctx.leave_scope();
            }
            Stmt::Return { value, span } => {
                let ret_type = fctx.ret_type.clone();
                match value {
                    Some(e) => {
                        if let Some((v, t)) = self.lower_expr(fctx, e, diagnostics) {
                            let converted = self.convert_operand(fctx, v, &t, &ret_type);
                            fctx.body.push(Instr::Ret { value: Some(converted) });
                        }
                    }
                    None => {
                        if !ret_type.is_void() {
                            diagnostics.push(Diagnostic::error(Category::ControlFlow, *span, DiagnosticKind::NonVoidFunctionMissingReturn));
                        }
                        fctx.body.push(Instr::Ret { value: None });
                    }
                }
            }
            Stmt::Break(span) => match fctx.break_labels.last() {
                Some(&l) => fctx.body.push(Instr::Br { label: l }),
                None => diagnostics.push(Diagnostic::error(Category::ControlFlow, *span, DiagnosticKind::BreakOutsideLoopOrSwitch)),
            },
            Stmt::Continue(span) => match fctx.continue_labels.last() {
                Some(&l) => fctx.body.push(Instr::Br { label: l }),
                None => diagnostics.push(Diagnostic::error(Category::ControlFlow, *span, DiagnosticKind::ContinueOutsideLoop)),
            },
            Stmt::Goto { label, span } => match fctx.goto_labels.get(label) {
                Some(&l) => fctx.body.push(Instr::Br { label: l }),
                None => diagnostics.push(Diagnostic::error(Category::Semantic, *span, DiagnosticKind::UndeclaredLabel(label.clone()))),
            },
            Stmt::Label { name, stmt: inner, .. } => {
                if let Some(&l) = fctx.goto_labels.get(name) {
                    fctx.body.push(Instr::Nop { label: l });
                }
                self.lower_stmt(fctx, inner, diagnostics);
            }
            Stmt::Switch { cond, body, .. } => self.lower_switch(fctx, cond, body, diagnostics),
            Stmt::Case { body, span, .. } | Stmt::Default { body, span } => {
                let label = fctx.switch_label_stack.last().and_then(|m| m.get(span)).copied();
                if let Some(l) = label {
                    fctx.body.push(Instr::Nop { label: l });
                }
                self.lower_stmt(fctx, body, diagnostics);
            }
        }
    }

    fn lower_switch(&mut self, fctx: &mut FuncCtx, cond: &Expr, body: &Stmt, diagnostics: &mut DiagnosticBag) {
        let Some((val, ty)) = self.lower_expr(fctx, cond, diagnostics) else { return };
        let mut cases = Vec::new();
        let mut default = None;
        let mut label_by_span = HashMap::new();
        self.collect_switch_cases(body, fctx, &mut cases, &mut default, &mut label_by_span);

        let l_end = self.fresh_label(fctx);
        let fallthrough_target = default.unwrap_or(l_end);
        let cmp_ty = self.ir_type(&ty);
        for (case_value, label) in &cases {
            let dest = self.fresh_value(fctx);
            fctx.body.push(Instr::Compare {
                dest: dest.clone(),
                op: IrCompare::Eq,
                lhs: val.clone(),
                rhs: Operand::Const(cmp_ty.clone(), ConstLit::Int(*case_value as i128)),
            });
            fctx.body.push(Instr::BrCond { cond: Operand::named(IrType::Bool, dest), label: *label });
        }
        fctx.body.push(Instr::Br { label: fallthrough_target });

        fctx.break_labels.push(l_end);
        fctx.switch_label_stack.push(label_by_span);
        self.lower_stmt(fctx, body, diagnostics);
        fctx.switch_label_stack.pop();
        fctx.break_labels.pop();
        fctx.body.push(Instr::Nop { label: l_end });
    }

    fn collect_switch_cases(
        &mut self,
        stmt: &Stmt,
        fctx: &mut FuncCtx,
        cases: &mut Vec<(i64, LabelId)>,
        default: &mut Option<LabelId>,
        label_by_span: &mut HashMap<Span, LabelId>,
    ) {
        match stmt {
            Stmt::Case { value, body, span } => {
                let label = self.fresh_label(fctx);
                cases.push((*value, label));
                label_by_span.insert(*span, label);
                self.collect_switch_cases(body, fctx, cases, default, label_by_span);
            }
            Stmt::Default { body, span } => {
                let label = self.fresh_label(fctx);
                *default = Some(label);
                label_by_span.insert(*span, label);
                self.collect_switch_cases(body, fctx, cases, default, label_by_span);
            }
            Stmt::Compound { items, .. } => {
                for item in items {
                    if let BlockItem::Stmt(s) = item {
                        self.collect_switch_cases(s, fctx, cases, default, label_by_span);
                    }
                }
            }
            Stmt::If { then_branch, else_branch, .. } => {
                self.collect_switch_cases(then_branch, fctx, cases, default, label_by_span);
                if let Some(e) = else_branch {
                    self.collect_switch_cases(e, fctx, cases, default, label_by_span);
                }
            }
            Stmt::While { body, .. } | Stmt::DoWhile { body, .. } | Stmt::For { body, .. } => {
                self.collect_switch_cases(body, fctx, cases, default, label_by_span);
            }
            Stmt::Label { stmt: inner, .. } => self.collect_switch_cases(inner, fctx, cases, default, label_by_span),
            Stmt::Switch { .. } => {} // a nested switch owns its own cases
            _ => {}
        }
    }

    fn lower_local_decl(&mut self, fctx: &mut FuncCtx, decl: &Declaration, diagnostics: &mut DiagnosticBag) {
        let ir_ty = self.ir_type(&decl.ty);
        let dest = self.fresh_value(fctx);
        fctx.body.push(Instr::Alloca { dest: dest.clone(), ty: ir_ty.clone() });
        let addr = Operand::named(IrType::ptr_to(ir_ty), dest);
        fctx.declare(decl.name.clone(), Binding::Local { addr: addr.clone(), ty: decl.ty.clone() });
        if let Some(init) = &decl.initializer {
            self.lower_initializer(fctx, addr, &decl.ty, init, diagnostics);
        }
    }

    fn lower_initializer(&mut self, fctx: &mut FuncCtx, addr: Operand, ty: &Type, init: &Initializer, diagnostics: &mut DiagnosticBag) {
        match init {
            Initializer::Expr(e) => {
                if let Some((v, vt)) = self.lower_expr(fctx, e, diagnostics) {
                    let converted = self.convert_operand(fctx, v, &vt, ty);
                    fctx.body.push(Instr::Store { value: converted, address: addr });
                }
            }
            Initializer::List(items) => self.lower_initializer_list(fctx, addr, ty, items, diagnostics),
        }
    }

    /// Lower a brace-enclosed initializer list against an array or
    /// aggregate type, honoring index (`[k] =`) and field (`.name =`)
    /// designators and chains of them (`.a.b[0] = …`), positional entries
    /// between designators, and zero-filling positions nothing in the
    /// list ever names.
    fn lower_initializer_list(&mut self, fctx: &mut FuncCtx, addr: Operand, ty: &Type, items: &[InitItem], diagnostics: &mut DiagnosticBag) {
        match &ty.kind {
            TypeKind::Array { element, size } => {
                let elem_ir = self.ir_type(element);
                let mut cursor: u64 = 0;
                let mut filled: Vec<u64> = Vec::new();
                for item in items {
                    let (index, rest) = match item.designators.first() {
                        Some(Designator::Index(k)) => (*k, &item.designators[1..]),
                        _ => (cursor, &item.designators[..]),
                    };
                    cursor = index + 1;
                    filled.push(index);
                    let elem_addr = self.element_addr(fctx, addr.clone(), &elem_ir, index);
                    self.lower_designated(fctx, elem_addr, element, rest, &item.value, diagnostics);
                }
                if let Some(len) = size {
                    for gap in index_gaps(&filled, *len) {
                        for i in gap {
                            let elem_addr = self.element_addr(fctx, addr.clone(), &elem_ir, i);
                            self.zero_fill(fctx, elem_addr, element);
                        }
                    }
                }
            }
            TypeKind::StructOrUnion(agg) if agg.is_union => {
                // A union initializer list initializes exactly one member:
                // whichever the first item's designator names, or member 0
                // for a plain positional initializer.
                if let Some(item) = items.first() {
                    let (field_index, rest) = match item.designators.first() {
                        Some(Designator::Field(name)) => match agg.fields.iter().position(|f| &f.name == name) {
                            Some(i) => (i, &item.designators[1..]),
                            None => {
                                diagnostics.push(Diagnostic::error(Category::Semantic, Span::point(addr_origin_hint()), DiagnosticKind::UnknownStructField(name.clone())));
                                return;
                            }
                        },
                        _ => (0, &item.designators[..]),
                    };
                    if let Some(field) = agg.fields.get(field_index).cloned() {
                        let field_addr = self.field_addr(fctx, addr, &field.ty, field_index as u32);
                        self.lower_designated(fctx, field_addr, &field.ty, rest, &item.value, diagnostics);
                    }
                }
            }
            TypeKind::StructOrUnion(agg) => {
                let mut cursor: usize = 0;
                let mut filled: Vec<usize> = Vec::new();
                for item in items {
                    let (field_index, rest) = match item.designators.first() {
                        Some(Designator::Field(name)) => match agg.fields.iter().position(|f| &f.name == name) {
                            Some(i) => (i, &item.designators[1..]),
                            None => {
                                diagnostics.push(Diagnostic::error(Category::Semantic, Span::point(addr_origin_hint()), DiagnosticKind::UnknownStructField(name.clone())));
                                continue;
                            }
                        },
                        _ => (cursor, &item.designators[..]),
                    };
                    let Some(field) = agg.fields.get(field_index).cloned() else { continue };
                    cursor = field_index + 1;
                    filled.push(field_index);
                    let field_addr = self.field_addr(fctx, addr.clone(), &field.ty, field_index as u32);
                    self.lower_designated(fctx, field_addr, &field.ty, rest, &item.value, diagnostics);
                }
                for gap in index_gaps(&filled.iter().map(|&i| i as u64).collect::<Vec<_>>(), agg.fields.len() as u64) {
                    for i in gap {
                        let field = agg.fields[i as usize].clone();
                        let field_addr = self.field_addr(fctx, addr.clone(), &field.ty, i as u32);
                        self.zero_fill(fctx, field_addr, &field.ty);
                    }
                }
            }
            _ => {
                diagnostics.push(Diagnostic::error(Category::Semantic, Span::point(addr_origin_hint()), DiagnosticKind::InvalidInitializerType));
            }
        }
    }

    /// Descend through a designator chain one level at a time, computing
    /// the address of the named subcomponent, until none remain — then
    /// lower `init` (scalar or nested list) against that address.
    fn lower_designated(&mut self, fctx: &mut FuncCtx, addr: Operand, ty: &Type, designators: &[Designator], init: &Initializer, diagnostics: &mut DiagnosticBag) {
        let Some((first, rest)) = designators.split_first() else {
            self.lower_initializer(fctx, addr, ty, init, diagnostics);
            return;
        };
        match (&ty.kind, first) {
            (TypeKind::Array { element, .. }, Designator::Index(k)) => {
                let elem_ir = self.ir_type(element);
                let elem = (**element).clone();
                let elem_addr = self.element_addr(fctx, addr, &elem_ir, *k);
                self.lower_designated(fctx, elem_addr, &elem, rest, init, diagnostics);
            }
            (TypeKind::StructOrUnion(agg), Designator::Field(name)) => {
                match agg.fields.iter().position(|f| &f.name == name) {
                    Some(idx) => {
                        let field = agg.fields[idx].clone();
                        let field_addr = self.field_addr(fctx, addr, &field.ty, idx as u32);
                        self.lower_designated(fctx, field_addr, &field.ty, rest, init, diagnostics);
                    }
                    None => {
                        diagnostics.push(Diagnostic::error(Category::Semantic, Span::point(addr_origin_hint()), DiagnosticKind::UnknownStructField(name.clone())));
                    }
                }
            }
            _ => {
                diagnostics.push(Diagnostic::error(Category::Semantic, Span::point(addr_origin_hint()), DiagnosticKind::MalformedDeclarator));
            }
        }
    }

    fn element_addr(&mut self, fctx: &mut FuncCtx, base: Operand, elem_ir: &IrType, index: u64) -> Operand {
        let dest = self.fresh_value(fctx);
        fctx.body.push(Instr::GetArrayElementPtr {
            dest: dest.clone(),
            ty: elem_ir.clone(),
            base,
            index: Operand::Const(IrType::Int(self.arch.int_width(IntRank::Int)), ConstLit::Int(index as i128)),
        });
        Operand::named(IrType::ptr_to(elem_ir.clone()), dest)
    }

    fn field_addr(&mut self, fctx: &mut FuncCtx, base: Operand, field_ty: &Type, field_index: u32) -> Operand {
        let field_ir = self.ir_type(field_ty);
        let dest = self.fresh_value(fctx);
        fctx.body.push(Instr::GetStructMemberPtr { dest: dest.clone(), ty: field_ir.clone(), base, field_index });
        Operand::named(IrType::ptr_to(field_ir), dest)
    }

    /// Zero-fill a position an initializer list never names: a scalar
    /// subcomponent gets a single zero `store`; an aggregate subcomponent
    /// recurses through the same list-lowering logic with an empty item
    /// list, so every leaf underneath it is zeroed in turn.
    fn zero_fill(&mut self, fctx: &mut FuncCtx, addr: Operand, ty: &Type) {
        match &ty.kind {
            TypeKind::Array { .. } | TypeKind::StructOrUnion(_) => {
                let mut diagnostics = DiagnosticBag::new();
                self.lower_initializer_list(fctx, addr, ty, &[], &mut diagnostics);
            }
            _ => {
                let ir_ty = self.ir_type(ty);
                fctx.body.push(Instr::Store { value: zero_operand(ir_ty, ty), address: addr });
            }
        }
    }

    // ---- expressions -------------------------------------------------

    /// Lower `expr` for its value. Returns `None` exactly when a diagnostic
    /// was already recorded for this (sub)expression.
    fn lower_expr(&mut self, fctx: &mut FuncCtx, expr: &Expr, diagnostics: &mut DiagnosticBag) -> Option<(Operand, Type)> {
        match expr {
            Expr::IntLiteral { value, signed, rank, .. } => {
                let ty = Type::int(*signed, *rank);
                let ir_ty = self.ir_type(&ty);
                Some((Operand::Const(ir_ty, ConstLit::Int(*value as i128)), ty))
            }
            Expr::FloatLiteral { value_bits, rank, .. } => {
                let ty = Type::float(*rank);
                let ir_ty = self.ir_type(&ty);
                Some((Operand::Const(ir_ty, ConstLit::Float(f64::from_bits(*value_bits))), ty))
            }
            Expr::CharLiteral { value, .. } => {
                let ty = Type::int(true, IntRank::Int);
                Some((Operand::Const(IrType::Int(self.arch.int_width(IntRank::Int)), ConstLit::Int(*value as i128)), ty))
            }
            Expr::StringLiteral { bytes, .. } => {
                let name = self.intern_string(bytes);
                let char_ir = IrType::Int(self.arch.int_width(IntRank::Char));
                let addr = Operand::named(IrType::ptr_to(char_ir.clone()), format!("@{name}"));
                let ty = Type::pointer_to(Type::int(true, IntRank::Char));
                Some((retag(addr, IrType::ptr_to(char_ir)), ty))
            }
            Expr::Ident(ident) => self.lower_ident_rvalue(fctx, ident, diagnostics),
            Expr::Unary { op, operand, span } => self.lower_unary(fctx, *op, operand, *span, diagnostics),
            Expr::IncDec { op, operand, is_post, span } => self.lower_incdec(fctx, *op, operand, *is_post, *span, diagnostics),
            Expr::Binary { op, lhs, rhs, .. } => self.lower_binary(fctx, *op, lhs, rhs, diagnostics),
            Expr::Assign { op, target, value, .. } => self.lower_assign(fctx, *op, target, value, diagnostics),
            Expr::Ternary { cond, then_expr, else_expr, .. } => self.lower_ternary(fctx, cond, then_expr, else_expr, diagnostics),
            Expr::Comma { lhs, rhs, .. } => {
                self.lower_expr(fctx, lhs, diagnostics);
                self.lower_expr(fctx, rhs, diagnostics)
            }
            Expr::Call { callee, args, span } => self.lower_call(fctx, callee, args, *span, diagnostics),
            Expr::ArraySubscript { .. } | Expr::Member { .. } => {
                let (addr, ty) = self.lower_lvalue(fctx, expr, diagnostics)?;
                if ty.is_array() || ty.is_function_type() {
                    return Some((addr, ty));
                }
                let ir_ty = self.ir_type(&ty);
                let dest = self.fresh_value(fctx);
                fctx.body.push(Instr::Load { dest: dest.clone(), ty: ir_ty.clone(), address: addr });
                Some((Operand::named(ir_ty, dest), ty))
            }
            Expr::Cast { type_name, operand, .. } => {
                let (v, t) = self.lower_expr(fctx, operand, diagnostics)?;
                Some((self.convert_operand(fctx, v, &t, &type_name.ty), type_name.ty.clone()))
            }
            Expr::SizeofExpr { operand, .. } => {
                let size = match self.lvalue_or_rvalue_type(fctx, operand) {
                    Some(t) => self.size_of(&t),
                    None => 0,
                };
                Some(self.sizeof_operand(size))
            }
            Expr::SizeofType { type_name, .. } => {
                let size = self.size_of(&type_name.ty);
                Some(self.sizeof_operand(size))
            }
            Expr::CompoundLiteral { type_name, initializer, .. } => {
                let ir_ty = self.ir_type(&type_name.ty);
                let dest = self.fresh_value(fctx);
                fctx.body.push(Instr::Alloca { dest: dest.clone(), ty: ir_ty.clone() });
                let addr = Operand::named(IrType::ptr_to(ir_ty), dest);
                for (i, item) in initializer.iter().enumerate() {
                    let _ = i;
                    self.lower_initializer(fctx, addr.clone(), &type_name.ty, &item.value, diagnostics);
                }
                Some((addr, type_name.ty.clone()))
            }
            Expr::VaArg { ap, type_name, .. } => {
                let (ap_val, _) = self.lower_expr(fctx, ap, diagnostics)?;
                let ty = self.ir_type(&type_name.ty);
                let dest = self.fresh_value(fctx);
                fctx.body.push(Instr::Load { dest: dest.clone(), ty: ty.clone(), address: ap_val });
                Some((Operand::named(ty, dest), type_name.ty.clone()))
            }
        }
    }

    fn sizeof_operand(&mut self, size: u64) -> (Operand, Type) {
        let ty = Type::int(false, self.arch.size_t_rank());
        let ir_ty = self.ir_type(&ty);
        (Operand::Const(ir_ty, ConstLit::Int(size as i128)), ty)
    }

    /// Static type of an expression without emitting any IR or touching
    /// `fctx.body` — `sizeof e` never evaluates `e`, so this mirrors the
    /// type-deduction side of `lower_expr`/`lower_lvalue` without their
    /// side effects.
    fn lvalue_or_rvalue_type(&self, fctx: &FuncCtx, expr: &Expr) -> Option<Type> {
        match expr {
            Expr::IntLiteral { signed, rank, .. } => Some(Type::int(*signed, *rank)),
            Expr::FloatLiteral { rank, .. } => Some(Type::float(*rank)),
            Expr::CharLiteral { .. } => Some(Type::int(true, IntRank::Int)),
            Expr::StringLiteral { .. } => Some(Type::pointer_to(Type::int(true, IntRank::Char))),
            Expr::Ident(ident) => match fctx.lookup(&ident.name).cloned().or_else(|| self.globals.get(&ident.name).cloned()) {
                Some(Binding::Local { ty, .. }) | Some(Binding::Global { ty, .. }) => Some(ty),
                Some(Binding::EnumConst { .. }) => Some(Type::int(true, IntRank::Int)),
                None => None,
            },
            Expr::Unary { op: UnaryOp::Deref, operand, .. } => {
                self.lvalue_or_rvalue_type(fctx, operand)?.pointee().cloned()
            }
            Expr::Unary { op: UnaryOp::AddrOf, operand, .. } => {
                Some(Type::pointer_to(self.lvalue_or_rvalue_type(fctx, operand)?))
            }
            Expr::Unary { op: UnaryOp::LogicalNot, .. } => Some(Type::bool_ty()),
            Expr::Unary { operand, .. } => self.lvalue_or_rvalue_type(fctx, operand).map(|t| integer_promotion(&t)),
            Expr::IncDec { operand, .. } => self.lvalue_or_rvalue_type(fctx, operand),
            Expr::Binary { op: BinaryOp::Compare(_) | BinaryOp::Logical(_), .. } => Some(Type::bool_ty()),
            Expr::Binary { op: BinaryOp::Arith(_), lhs, rhs, .. } => {
                let lt = self.lvalue_or_rvalue_type(fctx, lhs)?;
                let rt = self.lvalue_or_rvalue_type(fctx, rhs)?;
                if lt.is_pointer() {
                    Some(lt)
                } else if rt.is_pointer() {
                    Some(rt)
                } else {
                    Some(common_arithmetic_type(&lt, &rt))
                }
            }
            Expr::Binary { op: BinaryOp::Bitwise(bop), lhs, rhs, .. } => {
                let lt = self.lvalue_or_rvalue_type(fctx, lhs)?;
                let rt = self.lvalue_or_rvalue_type(fctx, rhs)?;
                if matches!(bop, BitwiseOp::Shl | BitwiseOp::Shr) {
                    Some(integer_promotion(&lt))
                } else {
                    Some(common_arithmetic_type(&lt, &rt))
                }
            }
            Expr::Assign { target, .. } => self.lvalue_or_rvalue_type(fctx, target),
            Expr::Ternary { then_expr, else_expr, .. } => {
                let tt = self.lvalue_or_rvalue_type(fctx, then_expr)?;
                let et = self.lvalue_or_rvalue_type(fctx, else_expr)?;
                if tt.is_arithmetic() && et.is_arithmetic() { Some(common_arithmetic_type(&tt, &et)) } else { Some(tt) }
            }
            Expr::Comma { rhs, .. } => self.lvalue_or_rvalue_type(fctx, rhs),
            Expr::Call { callee, .. } => {
                let Expr::Ident(ident) = callee.as_ref() else { return None };
                match fctx.lookup(&ident.name).cloned().or_else(|| self.globals.get(&ident.name).cloned()) {
                    Some(Binding::Global { ty, .. }) => match &ty.kind {
                        TypeKind::Function { ret, .. } => Some((**ret).clone()),
                        _ => None,
                    },
                    _ => None,
                }
            }
            Expr::ArraySubscript { base, .. } => {
                let base_ty = self.lvalue_or_rvalue_type(fctx, base)?;
                match &base_ty.kind {
                    TypeKind::Array { element, .. } | TypeKind::Pointer(element) => Some((**element).clone()),
                    _ => None,
                }
            }
            Expr::Member { base, field, via_arrow, .. } => {
                let base_ty = self.lvalue_or_rvalue_type(fctx, base)?;
                let agg_ty = if *via_arrow { base_ty.pointee().cloned()? } else { base_ty };
                let TypeKind::StructOrUnion(agg) = &agg_ty.kind else { return None };
                agg.fields.iter().find(|f| &f.name == field).map(|f| f.ty.clone())
            }
            Expr::Cast { type_name, .. } => Some(type_name.ty.clone()),
            Expr::SizeofExpr { .. } | Expr::SizeofType { .. } => Some(Type::int(false, self.arch.size_t_rank())),
            Expr::CompoundLiteral { type_name, .. } => Some(type_name.ty.clone()),
            Expr::VaArg { type_name, .. } => Some(type_name.ty.clone()),
        }
    }

    fn lower_ident_rvalue(&mut self, fctx: &mut FuncCtx, ident: &Ident, diagnostics: &mut DiagnosticBag) -> Option<(Operand, Type)> {
        match fctx.lookup(&ident.name).cloned().or_else(|| self.globals.get(&ident.name).cloned()) {
            Some(Binding::Local { addr, ty }) => {
                if ty.is_array() || ty.is_function_type() {
                    return Some((addr, ty));
                }
                let ir_ty = self.ir_type(&ty);
                let dest = self.fresh_value(fctx);
                fctx.body.push(Instr::Load { dest: dest.clone(), ty: ir_ty.clone(), address: addr });
                Some((Operand::named(ir_ty, dest), ty))
            }
            Some(Binding::Global { name, ty }) => {
                if ty.is_function_type() {
                    return Some((Operand::named(IrType::ptr_to(IrType::Void), name), ty));
                }
                let ir_ty = self.ir_type(&ty);
                let addr = Operand::named(IrType::ptr_to(ir_ty.clone()), format!("@{name}"));
                if ty.is_array() {
                    return Some((addr, ty));
                }
                let dest = self.fresh_value(fctx);
                fctx.body.push(Instr::Load { dest: dest.clone(), ty: ir_ty, address: addr });
                Some((Operand::named(self.ir_type(&ty), dest), ty))
            }
            Some(Binding::EnumConst { value }) => {
                let ty = Type::int(true, IntRank::Int);
                let ir_ty = self.ir_type(&ty);
                Some((Operand::Const(ir_ty, ConstLit::Int(value as i128)), ty))
            }
            None => {
                diagnostics.push(Diagnostic::error(Category::Semantic, ident.span, DiagnosticKind::UndeclaredIdentifier(ident.name.clone())));
                None
            }
        }
    }

    /// Lower `expr` as an lvalue: returns the address and the pointee's
    /// C type. `None` for expressions that are not lvalues.
    fn lower_lvalue(&mut self, fctx: &mut FuncCtx, expr: &Expr, diagnostics: &mut DiagnosticBag) -> Option<(Operand, Type)> {
        match expr {
            Expr::Ident(ident) => match fctx.lookup(&ident.name).cloned().or_else(|| self.globals.get(&ident.name).cloned()) {
                Some(Binding::Local { addr, ty }) => Some((addr, ty)),
                Some(Binding::Global { name, ty }) => {
                    let ir_ty = self.ir_type(&ty);
                    Some((Operand::named(IrType::ptr_to(ir_ty), format!("@{name}")), ty))
                }
                _ => {
                    diagnostics.push(Diagnostic::error(Category::Semantic, ident.span, DiagnosticKind::UndeclaredIdentifier(ident.name.clone())));
                    None
                }
            },
            Expr::Unary { op: UnaryOp::Deref, operand, span } => {
                let (v, t) = self.lower_expr(fctx, operand, diagnostics)?;
                match t.pointee() {
                    Some(pointee) => Some((v, pointee.clone())),
                    None => {
                        diagnostics.push(Diagnostic::error(Category::Semantic, *span, DiagnosticKind::IndirectionOnNonPointer));
                        None
                    }
                }
            }
            Expr::ArraySubscript { base, index, span } => self.lower_subscript(fctx, base, index, *span, diagnostics),
            Expr::Member { base, field, via_arrow, span } => self.lower_member(fctx, base, field, *via_arrow, *span, diagnostics),
            _ => None,
        }
    }

    fn lower_subscript(&mut self, fctx: &mut FuncCtx, base: &Expr, index: &Expr, span: Span, diagnostics: &mut DiagnosticBag) -> Option<(Operand, Type)> {
        let (base_val, base_ty) = self.lower_expr(fctx, base, diagnostics)?;
        let (index_val, _) = self.lower_expr(fctx, index, diagnostics)?;
        let element_ty = match &base_ty.kind {
            TypeKind::Array { element, .. } => (**element).clone(),
            TypeKind::Pointer(inner) => (**inner).clone(),
            _ => {
                diagnostics.push(Diagnostic::error(Category::Semantic, span, DiagnosticKind::SubscriptOnNonArrayOrPointer));
                return None;
            }
        };
        let elem_ir = self.ir_type(&element_ty);
        let dest = self.fresh_value(fctx);
        fctx.body.push(Instr::GetArrayElementPtr { dest: dest.clone(), ty: elem_ir.clone(), base: base_val, index: index_val });
        Some((Operand::named(IrType::ptr_to(elem_ir), dest), element_ty))
    }

    fn lower_member(&mut self, fctx: &mut FuncCtx, base: &Expr, field: &str, via_arrow: bool, span: Span, diagnostics: &mut DiagnosticBag) -> Option<(Operand, Type)> {
        let (base_addr, base_ty) = if via_arrow {
            let (v, t) = self.lower_expr(fctx, base, diagnostics)?;
            let pointee = t.pointee().cloned();
            match pointee {
                Some(p) => (v, p),
                None => {
                    diagnostics.push(Diagnostic::error(Category::Semantic, span, DiagnosticKind::IndirectionOnNonPointer));
                    return None;
                }
            }
        } else {
            self.lower_lvalue(fctx, base, diagnostics)?
        };
        let TypeKind::StructOrUnion(agg) = &base_ty.kind else {
            diagnostics.push(Diagnostic::error(Category::Semantic, span, DiagnosticKind::MemberAccessOnNonAggregate));
            return None;
        };
        let Some((index, f)) = agg.fields.iter().enumerate().find(|(_, f)| f.name == field) else {
            diagnostics.push(Diagnostic::error(Category::Semantic, span, DiagnosticKind::UnknownStructField(field.to_string())));
            return None;
        };
        let field_ty = f.ty.clone();
        let field_ir = self.ir_type(&field_ty);
        let dest = self.fresh_value(fctx);
        fctx.body.push(Instr::GetStructMemberPtr { dest: dest.clone(), ty: field_ir.clone(), base: base_addr, field_index: index as u32 });
        Some((Operand::named(IrType::ptr_to(field_ir), dest), field_ty))
    }

    fn lower_unary(&mut self, fctx: &mut FuncCtx, op: UnaryOp, operand: &Expr, span: Span, diagnostics: &mut DiagnosticBag) -> Option<(Operand, Type)> {
        match op {
            UnaryOp::AddrOf => {
                let (addr, pointee_ty) = self.lower_lvalue(fctx, operand, diagnostics)?;
                Some((addr, Type::pointer_to(pointee_ty)))
            }
            UnaryOp::Deref => {
                let (v, t) = self.lower_expr(fctx, operand, diagnostics)?;
                let Some(pointee) = t.pointee().cloned() else {
                    diagnostics.push(Diagnostic::error(Category::Semantic, span, DiagnosticKind::IndirectionOnNonPointer));
                    return None;
                };
                let ir_ty = self.ir_type(&pointee);
                let dest = self.fresh_value(fctx);
                fctx.body.push(Instr::Load { dest: dest.clone(), ty: ir_ty.clone(), address: v });
                Some((Operand::named(ir_ty, dest), pointee))
            }
            UnaryOp::Plus => {
                let (v, t) = self.lower_expr(fctx, operand, diagnostics)?;
                if !t.is_arithmetic() {
                    diagnostics.push(Diagnostic::error(Category::Semantic, span, DiagnosticKind::InvalidUnaryArithmeticOperand));
                    return None;
                }
                let promoted = integer_promotion(&t);
                let converted = self.convert_operand(fctx, v, &t, &promoted);
                Some((converted, promoted))
            }
            UnaryOp::Neg => {
                let (v, t) = self.lower_expr(fctx, operand, diagnostics)?;
                if !t.is_arithmetic() {
                    diagnostics.push(Diagnostic::error(Category::Semantic, span, DiagnosticKind::InvalidUnaryArithmeticOperand));
                    return None;
                }
                let promoted = integer_promotion(&t);
                let converted = self.convert_operand(fctx, v, &t, &promoted);
                if let Operand::Const(ty, lit) = &converted {
                    let negated = match lit {
                        ConstLit::Int(n) => ConstLit::Int(-n),
                        ConstLit::Float(f) => ConstLit::Float(-f),
                    };
                    return Some((Operand::Const(ty.clone(), negated), promoted));
                }
                let dest = self.fresh_value(fctx);
                let ir_ty = self.ir_type(&promoted);
                if promoted.is_floating() {
                    fctx.body.push(Instr::Arith { dest: dest.clone(), ty: ir_ty.clone(), op: IrArith::Sub, lhs: Operand::Const(ir_ty.clone(), ConstLit::Float(0.0)), rhs: converted });
                } else {
                    fctx.body.push(Instr::Arith { dest: dest.clone(), ty: ir_ty.clone(), op: IrArith::Sub, lhs: Operand::Const(ir_ty.clone(), ConstLit::Int(0)), rhs: converted });
                }
                Some((Operand::named(ir_ty, dest), promoted))
            }
            UnaryOp::BitNot => {
                let (v, t) = self.lower_expr(fctx, operand, diagnostics)?;
                if !t.is_integer() {
                    diagnostics.push(Diagnostic::error(Category::Semantic, span, DiagnosticKind::InvalidUnaryArithmeticOperand));
                    return None;
                }
                let promoted = integer_promotion(&t);
                let converted = self.convert_operand(fctx, v, &t, &promoted);
                let ir_ty = self.ir_type(&promoted);
                let dest = self.fresh_value(fctx);
                fctx.body.push(Instr::Bitwise { dest: dest.clone(), ty: ir_ty.clone(), op: IrBitwise::Xor, lhs: converted, rhs: Operand::Const(ir_ty.clone(), ConstLit::Int(-1)) });
                Some((Operand::named(ir_ty, dest), promoted))
            }
            UnaryOp::LogicalNot => {
                let (v, t) = self.lower_expr(fctx, operand, diagnostics)?;
                let b = self.negated_condition(fctx, v, &t);
                Some((b, Type::bool_ty()))
            }
        }
    }

    fn lower_incdec(&mut self, fctx: &mut FuncCtx, op: IncDecOp, operand: &Expr, is_post: bool, span: Span, diagnostics: &mut DiagnosticBag) -> Option<(Operand, Type)> {
        let (addr, ty) = self.lower_lvalue(fctx, operand, diagnostics)?;
        if !ty.is_scalar() {
            diagnostics.push(Diagnostic::error(Category::Semantic, span, DiagnosticKind::IncrementOfNonScalar));
            return None;
        }
        let ir_ty = self.ir_type(&ty);
        let old_dest = self.fresh_value(fctx);
        fctx.body.push(Instr::Load { dest: old_dest.clone(), ty: ir_ty.clone(), address: addr.clone() });
        let old = Operand::named(ir_ty.clone(), old_dest);
        let arith = match op {
            IncDecOp::Inc => IrArith::Add,
            IncDecOp::Dec => IrArith::Sub,
        };
        let new_dest = self.fresh_value(fctx);
        if ty.is_pointer() {
            let elem_size = self.size_of(ty.pointee().unwrap());
            let idx = Operand::Const(IrType::Int(self.arch.int_width(IntRank::Int)), ConstLit::Int(if matches!(op, IncDecOp::Inc) { 1 } else { -1 }));
            fctx.body.push(Instr::GetArrayElementPtr { dest: new_dest.clone(), ty: self.ir_type(ty.pointee().unwrap()), base: old.clone(), index: idx });
            let _ = elem_size;
        } else {
            let one = if ty.is_floating() { ConstLit::Float(1.0) } else { ConstLit::Int(1) };
            fctx.body.push(Instr::Arith { dest: new_dest.clone(), ty: ir_ty.clone(), op: arith, lhs: old.clone(), rhs: Operand::Const(ir_ty.clone(), one) });
        }
        let new_val = Operand::named(ir_ty, new_dest);
        fctx.body.push(Instr::Store { value: new_val.clone(), address: addr });
        Some((if is_post { old } else { new_val }, ty))
    }

    fn lower_binary(&mut self, fctx: &mut FuncCtx, op: BinaryOp, lhs: &Expr, rhs: &Expr, diagnostics: &mut DiagnosticBag) -> Option<(Operand, Type)> {
        match op {
            BinaryOp::Logical(lop) => self.lower_logical(fctx, lop, lhs, rhs, diagnostics),
            BinaryOp::Arith(aop) => {
                let (lv, lt) = self.lower_expr(fctx, lhs, diagnostics)?;
                let (rv, rt) = self.lower_expr(fctx, rhs, diagnostics)?;
                if lt.is_pointer() && rt.is_integer() && matches!(aop, ArithOp::Add | ArithOp::Sub) {
                    return Some(self.lower_pointer_arith(fctx, aop, lv, &lt, rv));
                }
                if rt.is_pointer() && lt.is_integer() && matches!(aop, ArithOp::Add) {
                    return Some(self.lower_pointer_arith(fctx, aop, rv, &rt, lv));
                }
                if !lt.is_arithmetic() || !rt.is_arithmetic() {
                    diagnostics.push(Diagnostic::error(Category::Semantic, lhs.span(), DiagnosticKind::OperandTypeMismatch { op: format!("{aop:?}") }));
                    return None;
                }
                let common = common_arithmetic_type(&lt, &rt);
                let lv2 = self.convert_operand(fctx, lv, &lt, &common);
                let rv2 = self.convert_operand(fctx, rv, &rt, &common);
                if let (Operand::Const(_, a), Operand::Const(_, b)) = (&lv2, &rv2) {
                    if let Some(folded) = fold_const_pair(aop, *a, *b) {
                        return Some((Operand::Const(self.ir_type(&common), folded), common));
                    }
                }
                let ir_ty = self.ir_type(&common);
                let dest = self.fresh_value(fctx);
                fctx.body.push(Instr::Arith { dest: dest.clone(), ty: ir_ty.clone(), op: to_ir_arith(aop), lhs: lv2, rhs: rv2 });
                Some((Operand::named(ir_ty, dest), common))
            }
            BinaryOp::Bitwise(bop) => {
                let (lv, lt) = self.lower_expr(fctx, lhs, diagnostics)?;
                let (rv, rt) = self.lower_expr(fctx, rhs, diagnostics)?;
                if !lt.is_integer() || !rt.is_integer() {
                    diagnostics.push(Diagnostic::error(Category::Semantic, lhs.span(), DiagnosticKind::OperandTypeMismatch { op: format!("{bop:?}") }));
                    return None;
                }
                if matches!(bop, BitwiseOp::Shl | BitwiseOp::Shr) {
                    let result_ty = integer_promotion(&lt);
                    let lv2 = self.convert_operand(fctx, lv, &lt, &result_ty);
                    let rv2 = self.convert_operand(fctx, rv, &rt, &integer_promotion(&rt));
                    let ir_ty = self.ir_type(&result_ty);
                    let dest = self.fresh_value(fctx);
                    fctx.body.push(Instr::Bitwise { dest: dest.clone(), ty: ir_ty.clone(), op: to_ir_bitwise(bop), lhs: lv2, rhs: rv2 });
                    return Some((Operand::named(ir_ty, dest), result_ty));
                }
                let common = common_arithmetic_type(&lt, &rt);
                let lv2 = self.convert_operand(fctx, lv, &lt, &common);
                let rv2 = self.convert_operand(fctx, rv, &rt, &common);
                let ir_ty = self.ir_type(&common);
                let dest = self.fresh_value(fctx);
                fctx.body.push(Instr::Bitwise { dest: dest.clone(), ty: ir_ty.clone(), op: to_ir_bitwise(bop), lhs: lv2, rhs: rv2 });
                Some((Operand::named(ir_ty, dest), common))
            }
            BinaryOp::Compare(cop) => {
                let (lv, lt) = self.lower_expr(fctx, lhs, diagnostics)?;
                let (rv, rt) = self.lower_expr(fctx, rhs, diagnostics)?;
                let (lv2, rv2) = if lt.is_arithmetic() && rt.is_arithmetic() {
                    let common = common_arithmetic_type(&lt, &rt);
                    (self.convert_operand(fctx, lv, &lt, &common), self.convert_operand(fctx, rv, &rt, &common))
                } else {
                    (lv, rv)
                };
                let dest = self.fresh_value(fctx);
                fctx.body.push(Instr::Compare { dest: dest.clone(), op: to_ir_compare(cop), lhs: lv2, rhs: rv2 });
                Some((Operand::named(IrType::Bool, dest), Type::bool_ty()))
            }
        }
    }

    fn lower_pointer_arith(&mut self, fctx: &mut FuncCtx, aop: ArithOp, ptr: Operand, ptr_ty: &Type, index: Operand) -> (Operand, Type) {
        let elem_ty = ptr_ty.pointee().cloned().unwrap_or_else(Type::void);
        let elem_ir = self.ir_type(&elem_ty);
        let signed_index = if matches!(aop, ArithOp::Sub) { negate_operand(index) } else { index };
        let dest = self.fresh_value(fctx);
        fctx.body.push(Instr::GetArrayElementPtr { dest: dest.clone(), ty: elem_ir.clone(), base: ptr, index: signed_index });
        (Operand::named(IrType::ptr_to(elem_ir), dest), ptr_ty.clone())
    }

    fn lower_logical(&mut self, fctx: &mut FuncCtx, lop: LogicalOp, lhs: &Expr, rhs: &Expr, diagnostics: &mut DiagnosticBag) -> Option<(Operand, Type)> {
        let (lv, lt) = self.lower_expr(fctx, lhs, diagnostics)?;
        let skip_cond = match lop {
            LogicalOp::And => self.negated_condition(fctx, lv, &lt),
            LogicalOp::Or => self.nonzero_condition(fctx, lv, &lt),
        };
        let result_dest = self.fresh_value(fctx);
        fctx.body.push(Instr::Alloca { dest: result_dest.clone(), ty: IrType::Bool });
        let result_addr = Operand::named(IrType::ptr_to(IrType::Bool), result_dest);

        let l_skip = self.fresh_label(fctx);
        let l_end = self.fresh_label(fctx);
        fctx.body.push(Instr::BrCond { cond: skip_cond, label: l_skip });

        let rhs_bool = match self.lower_expr(fctx, rhs, diagnostics) {
            Some((rv, rt)) => self.nonzero_condition(fctx, rv, &rt),
            None => Operand::Const(IrType::Bool, ConstLit::Int(0)),
        };
        fctx.body.push(Instr::Store { value: rhs_bool, address: result_addr.clone() });
        fctx.body.push(Instr::Br { label: l_end });

        fctx.body.push(Instr::Nop { label: l_skip });
        let shortcut = match lop {
            LogicalOp::And => ConstLit::Int(0),
            LogicalOp::Or => ConstLit::Int(1),
        };
        fctx.body.push(Instr::Store { value: Operand::Const(IrType::Bool, shortcut), address: result_addr.clone() });
        fctx.body.push(Instr::Nop { label: l_end });

        let dest = self.fresh_value(fctx);
        fctx.body.push(Instr::Load { dest: dest.clone(), ty: IrType::Bool, address: result_addr });
        Some((Operand::named(IrType::Bool, dest), Type::bool_ty()))
    }

    fn lower_ternary(&mut self, fctx: &mut FuncCtx, cond: &Expr, then_expr: &Expr, else_expr: &Expr, diagnostics: &mut DiagnosticBag) -> Option<(Operand, Type)> {
        let (cv, ct) = self.lower_expr(fctx, cond, diagnostics)?;
        let negated = self.negated_condition(fctx, cv, &ct);
        let l_else = self.fresh_label(fctx);
        let l_end = self.fresh_label(fctx);
        fctx.body.push(Instr::BrCond { cond: negated, label: l_else });

        let then_result = self.lower_expr(fctx, then_expr, diagnostics);
        let common_ty = match &then_result {
            Some((_, t)) => t.clone(),
            None => Type::void(),
        };
        let ir_common = self.ir_type(&common_ty);
        let result_dest = self.fresh_value(fctx);
        fctx.body.push(Instr::Alloca { dest: result_dest.clone(), ty: ir_common.clone() });
        let result_addr = Operand::named(IrType::ptr_to(ir_common.clone()), result_dest);
        if let Some((tv, tt)) = then_result {
            let converted = self.convert_operand(fctx, tv, &tt, &common_ty);
            fctx.body.push(Instr::Store { value: converted, address: result_addr.clone() });
        }
        fctx.body.push(Instr::Br { label: l_end });
        fctx.body.push(Instr::Nop { label: l_else });
        if let Some((ev, et)) = self.lower_expr(fctx, else_expr, diagnostics) {
            let converted = self.convert_operand(fctx, ev, &et, &common_ty);
            fctx.body.push(Instr::Store { value: converted, address: result_addr.clone() });
        }
        fctx.body.push(Instr::Nop { label: l_end });

        let dest = self.fresh_value(fctx);
        fctx.body.push(Instr::Load { dest: dest.clone(), ty: ir_common.clone(), address: result_addr });
        Some((Operand::named(ir_common, dest), common_ty))
    }

    fn lower_assign(&mut self, fctx: &mut FuncCtx, op: AssignOp, target: &Expr, value: &Expr, diagnostics: &mut DiagnosticBag) -> Option<(Operand, Type)> {
        let (addr, target_ty) = self.lower_lvalue(fctx, target, diagnostics).or_else(|| {
            diagnostics.push(Diagnostic::error(Category::Semantic, target.span(), DiagnosticKind::InvalidAssignmentTarget));
            None
        })?;
        match op {
            AssignOp::Plain => {
                let (rv, rt) = self.lower_expr(fctx, value, diagnostics)?;
                let converted = self.convert_operand(fctx, rv, &rt, &target_ty);
                fctx.body.push(Instr::Store { value: converted.clone(), address: addr });
                Some((converted, target_ty))
            }
            AssignOp::Arith(aop) => self.lower_compound_arith(fctx, aop, addr, target_ty, value, diagnostics),
            AssignOp::Bitwise(bop) => self.lower_compound_bitwise(fctx, bop, addr, target_ty, value, diagnostics),
        }
    }

    fn lower_compound_arith(&mut self, fctx: &mut FuncCtx, aop: ArithOp, addr: Operand, target_ty: Type, value: &Expr, diagnostics: &mut DiagnosticBag) -> Option<(Operand, Type)> {
        let ir_ty = self.ir_type(&target_ty);
        let cur_dest = self.fresh_value(fctx);
        fctx.body.push(Instr::Load { dest: cur_dest.clone(), ty: ir_ty.clone(), address: addr.clone() });
        let cur = Operand::named(ir_ty.clone(), cur_dest);
        let (rv, rt) = self.lower_expr(fctx, value, diagnostics)?;

        if target_ty.is_pointer() && rt.is_integer() && matches!(aop, ArithOp::Add | ArithOp::Sub) {
            let (res, _) = self.lower_pointer_arith(fctx, aop, cur, &target_ty, rv);
            let stored = self.convert_operand(fctx, res, &target_ty, &target_ty);
            fctx.body.push(Instr::Store { value: stored.clone(), address: addr });
            return Some((stored, target_ty));
        }
        if !target_ty.is_arithmetic() || !rt.is_arithmetic() {
            diagnostics.push(Diagnostic::error(Category::Semantic, value.span(), DiagnosticKind::OperandTypeMismatch { op: format!("{aop:?}=") }));
            return None;
        }
        let common = common_arithmetic_type(&target_ty, &rt);
        let cur2 = self.convert_operand(fctx, cur, &target_ty, &common);
        let rv2 = self.convert_operand(fctx, rv, &rt, &common);
        let common_ir = self.ir_type(&common);
        let dest = self.fresh_value(fctx);
        fctx.body.push(Instr::Arith { dest: dest.clone(), ty: common_ir.clone(), op: to_ir_arith(aop), lhs: cur2, rhs: rv2 });
        let result = Operand::named(common_ir, dest);
        let converted_back = self.convert_operand(fctx, result, &common, &target_ty);
        fctx.body.push(Instr::Store { value: converted_back.clone(), address: addr });
        Some((converted_back, target_ty))
    }

    fn lower_compound_bitwise(&mut self, fctx: &mut FuncCtx, bop: BitwiseOp, addr: Operand, target_ty: Type, value: &Expr, diagnostics: &mut DiagnosticBag) -> Option<(Operand, Type)> {
        if !target_ty.is_integer() {
            diagnostics.push(Diagnostic::error(Category::Semantic, value.span(), DiagnosticKind::OperandTypeMismatch { op: format!("{bop:?}=") }));
            return None;
        }
        let ir_ty = self.ir_type(&target_ty);
        let cur_dest = self.fresh_value(fctx);
        fctx.body.push(Instr::Load { dest: cur_dest.clone(), ty: ir_ty.clone(), address: addr.clone() });
        let cur = Operand::named(ir_ty, cur_dest);
        let (rv, rt) = self.lower_expr(fctx, value, diagnostics)?;
        if !rt.is_integer() {
            diagnostics.push(Diagnostic::error(Category::Semantic, value.span(), DiagnosticKind::OperandTypeMismatch { op: format!("{bop:?}=") }));
            return None;
        }

        let (result_ty, lhs, rhs) = if matches!(bop, BitwiseOp::Shl | BitwiseOp::Shr) {
            (target_ty.clone(), cur, self.convert_operand(fctx, rv, &rt, &integer_promotion(&rt)))
        } else {
            let common = common_arithmetic_type(&target_ty, &rt);
            (common.clone(), self.convert_operand(fctx, cur, &target_ty, &common), self.convert_operand(fctx, rv, &rt, &common))
        };
        let result_ir = self.ir_type(&result_ty);
        let dest = self.fresh_value(fctx);
        fctx.body.push(Instr::Bitwise { dest: dest.clone(), ty: result_ir.clone(), op: to_ir_bitwise(bop), lhs, rhs });
        let result = Operand::named(result_ir, dest);
        let converted_back = self.convert_operand(fctx, result, &result_ty, &target_ty);
        fctx.body.push(Instr::Store { value: converted_back.clone(), address: addr });
        Some((converted_back, target_ty))
    }

    fn lower_call(&mut self, fctx: &mut FuncCtx, callee: &Expr, args: &[Expr], span: Span, diagnostics: &mut DiagnosticBag) -> Option<(Operand, Type)> {
        let Expr::Ident(ident) = callee else {
            diagnostics.push(Diagnostic::error(Category::Semantic, span, DiagnosticKind::CallTargetNotFunction));
            return None;
        };
        let binding = fctx.lookup(&ident.name).cloned().or_else(|| self.globals.get(&ident.name).cloned());
        let Some(Binding::Global { name, ty }) = binding else {
            diagnostics.push(Diagnostic::error(Category::Semantic, span, DiagnosticKind::UndeclaredIdentifier(ident.name.clone())));
            return None;
        };
        let TypeKind::Function { ret, params } = &ty.kind else {
            diagnostics.push(Diagnostic::error(Category::Semantic, span, DiagnosticKind::CallTargetNotFunction));
            return None;
        };
        if !params.variadic && args.len() != params.params.len() {
            diagnostics.push(Diagnostic::error(
                Category::Semantic,
                span,
                DiagnosticKind::ArgumentCountMismatch { expected: params.params.len(), found: args.len() },
            ));
            return None;
        }
        let mut lowered_args = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let Some((av, at)) = self.lower_expr(fctx, arg, diagnostics) else { continue };
            if let Some(param_ty) = params.params.get(i) {
                lowered_args.push(self.convert_operand(fctx, av, &at, param_ty));
            } else {
                // variadic tail: default argument promotions.
                let promoted_ty = if at.is_floating() { Type::float(FloatRank::Double) } else { integer_promotion(&at) };
                lowered_args.push(self.convert_operand(fctx, av, &at, &promoted_ty));
            }
        }
        let ret_ir = self.ir_type(ret);
        if ret.is_void() {
            fctx.body.push(Instr::Call { dest: None, callee: name, args: lowered_args });
            Some((Operand::Const(IrType::Void, ConstLit::Int(0)), Type::void()))
        } else {
            let dest = self.fresh_value(fctx);
            fctx.body.push(Instr::Call { dest: Some((dest.clone(), ret_ir.clone())), callee: name, args: lowered_args });
            Some((Operand::named(ret_ir, dest), (**ret).clone()))
        }
    }

    // ---- conversions ---------------------------------------------------

    fn negated_condition(&mut self, fctx: &mut FuncCtx, operand: Operand, c_ty: &Type) -> Operand {
        let zero = zero_operand(operand.ty().clone(), c_ty);
        let dest = self.fresh_value(fctx);
        fctx.body.push(Instr::Compare { dest: dest.clone(), op: IrCompare::Eq, lhs: operand, rhs: zero });
        Operand::named(IrType::Bool, dest)
    }

    fn nonzero_condition(&mut self, fctx: &mut FuncCtx, operand: Operand, c_ty: &Type) -> Operand {
        let zero = zero_operand(operand.ty().clone(), c_ty);
        let dest = self.fresh_value(fctx);
        fctx.body.push(Instr::Compare { dest: dest.clone(), op: IrCompare::Ne, lhs: operand, rhs: zero });
        Operand::named(IrType::Bool, dest)
    }

    fn convert_operand(&mut self, fctx: &mut FuncCtx, operand: Operand, from: &Type, to: &Type) -> Operand {
        if from == to {
            return operand;
        }
        let to_ir = self.ir_type(to);

        if matches!(operand.ty(), IrType::Bool) {
            if to.is_floating() {
                return self.emit_convert(fctx, operand, to_ir, ConvertOp::IntToFloat);
            }
            if to.is_integer() {
                return self.emit_convert(fctx, operand, to_ir, ConvertOp::Ext);
            }
            return self.emit_convert(fctx, operand, to_ir, ConvertOp::Bitcast);
        }

        match (&from.kind, &to.kind) {
            (TypeKind::Integer { .. }, TypeKind::Floating { .. }) => self.emit_convert(fctx, operand, to_ir, ConvertOp::IntToFloat),
            (TypeKind::Floating { .. }, TypeKind::Integer { .. }) => self.emit_convert(fctx, operand, to_ir, ConvertOp::FloatToInt),
            (TypeKind::Floating { rank: fr }, TypeKind::Floating { rank: tr }) => {
                if tr > fr {
                    self.emit_convert(fctx, operand, to_ir, ConvertOp::Ext)
                } else {
                    self.emit_convert(fctx, operand, to_ir, ConvertOp::Trunc)
                }
            }
            (TypeKind::Integer { rank: fr, .. }, TypeKind::Integer { rank: tr, .. }) => {
                let from_w = self.arch.int_width(*fr).bits();
                let to_w = self.arch.int_width(*tr).bits();
                if to_w == from_w {
                    retag(operand, to_ir)
                } else if to_w > from_w {
                    self.emit_convert(fctx, operand, to_ir, ConvertOp::Ext)
                } else {
                    self.emit_convert(fctx, operand, to_ir, ConvertOp::Trunc)
                }
            }
            (TypeKind::Pointer(_), TypeKind::Pointer(_))
            | (TypeKind::Pointer(_), TypeKind::Integer { .. })
            | (TypeKind::Integer { .. }, TypeKind::Pointer(_)) => self.emit_convert(fctx, operand, to_ir, ConvertOp::Bitcast),
            (TypeKind::Array { .. }, TypeKind::Pointer(_)) => retag(operand, to_ir),
            _ => retag(operand, to_ir),
        }
    }

    fn emit_convert(&mut self, fctx: &mut FuncCtx, operand: Operand, to_ir: IrType, op: ConvertOp) -> Operand {
        if let Operand::Const(_, lit) = &operand {
            if let Some(folded) = fold_const_convert(op, *lit, &to_ir) {
                return Operand::Const(to_ir, folded);
            }
        }
        let dest = self.fresh_value(fctx);
        fctx.body.push(Instr::Convert { dest: dest.clone(), ty: to_ir.clone(), op, operand });
        Operand::named(to_ir, dest)
    }
}

fn retag(operand: Operand, ty: IrType) -> Operand {
    match operand {
        Operand::Const(_, lit) => Operand::Const(ty, lit),
        Operand::Var(_, name) => Operand::Var(ty, name),
    }
}

fn zero_operand(ty: IrType, c_ty: &Type) -> Operand {
    if c_ty.is_floating() {
        Operand::Const(ty, ConstLit::Float(0.0))
    } else {
        Operand::Const(ty, ConstLit::Int(0))
    }
}

fn negate_operand(operand: Operand) -> Operand {
    match operand {
        Operand::Const(ty, ConstLit::Int(v)) => Operand::Const(ty, ConstLit::Int(-v)),
        Operand::Const(ty, ConstLit::Float(v)) => Operand::Const(ty, ConstLit::Float(-v)),
        other => other, // a non-constant negative index is handled by the caller multiplying by -1 at a higher level; rare in practice for `ptr - n` with a runtime `n`
    }
}

fn to_ir_arith(op: ArithOp) -> IrArith {
    match op {
        ArithOp::Add => IrArith::Add,
        ArithOp::Sub => IrArith::Sub,
        ArithOp::Mul => IrArith::Mul,
        ArithOp::Div => IrArith::Div,
        ArithOp::Mod => IrArith::Mod,
    }
}

fn to_ir_bitwise(op: BitwiseOp) -> IrBitwise {
    match op {
        BitwiseOp::And => IrBitwise::And,
        BitwiseOp::Or => IrBitwise::Or,
        BitwiseOp::Xor => IrBitwise::Xor,
        BitwiseOp::Shl => IrBitwise::Shl,
        BitwiseOp::Shr => IrBitwise::Shr,
    }
}

fn to_ir_compare(op: CompareOp) -> IrCompare {
    match op {
        CompareOp::Eq => IrCompare::Eq,
        CompareOp::Ne => IrCompare::Ne,
        CompareOp::Lt => IrCompare::Lt,
        CompareOp::Le => IrCompare::Le,
        CompareOp::Gt => IrCompare::Gt,
        CompareOp::Ge => IrCompare::Ge,
    }
}

/// `Some(true)`/`Some(false)` when `operand` is a compile-time constant,
/// `None` for anything evaluated at runtime. Used to recognize an
/// always-true loop controlling expression (`while (1)`, `for (;1;)`) so
/// no conditional exit is emitted for it — the merge block then has no
/// edge into it from the loop at all, and CFG pruning drops it unless a
/// `break` inside the body targets it.
fn constant_truthy(operand: &Operand) -> Option<bool> {
    match operand {
        Operand::Const(_, ConstLit::Int(v)) => Some(*v != 0),
        Operand::Const(_, ConstLit::Float(v)) => Some(*v != 0.0),
        Operand::Var(..) => None,
    }
}

fn fold_const_pair(op: ArithOp, a: ConstLit, b: ConstLit) -> Option<ConstLit> {
    match (a, b) {
        (ConstLit::Int(x), ConstLit::Int(y)) => Some(ConstLit::Int(match op {
            ArithOp::Add => x.wrapping_add(y),
            ArithOp::Sub => x.wrapping_sub(y),
            ArithOp::Mul => x.wrapping_mul(y),
            ArithOp::Div => {
                if y == 0 {
                    return None;
                }
                x / y
            }
            ArithOp::Mod => {
                if y == 0 {
                    return None;
                }
                x % y
            }
        })),
        (ConstLit::Float(x), ConstLit::Float(y)) => Some(ConstLit::Float(match op {
            ArithOp::Add => x + y,
            ArithOp::Sub => x - y,
            ArithOp::Mul => x * y,
            ArithOp::Div => x / y,
            ArithOp::Mod => x % y,
        })),
        _ => None,
    }
}

fn fold_const_convert(op: ConvertOp, lit: ConstLit, to: &IrType) -> Option<ConstLit> {
    match (op, lit) {
        (ConvertOp::IntToFloat, ConstLit::Int(v)) => Some(ConstLit::Float(v as f64)),
        (ConvertOp::FloatToInt, ConstLit::Float(v)) => Some(ConstLit::Int(v as i128)),
        (ConvertOp::Ext | ConvertOp::Trunc, ConstLit::Int(v)) => Some(ConstLit::Int(truncate_to_width(v, to))),
        (ConvertOp::Ext, ConstLit::Float(v)) => Some(ConstLit::Float(v)),
        (ConvertOp::Trunc, ConstLit::Float(v)) => Some(ConstLit::Float(if matches!(to, IrType::Float32) { v as f32 as f64 } else { v })),
        (ConvertOp::Bitcast, lit) => Some(lit),
        _ => None,
    }
}

fn truncate_to_width(v: i128, to: &IrType) -> i128 {
    let bits = match to {
        IrType::Int(w) => w.bits(),
        _ => return v,
    };
    if bits >= 128 {
        return v;
    }
    let mask = (1i128 << bits) - 1;
    let truncated = v & mask;
    let sign_bit = 1i128 << (bits - 1);
    if truncated & sign_bit != 0 {
        truncated - (1i128 << bits)
    } else {
        truncated
    }
}

fn round_up(value: u64, align: u64) -> u64 {
    if align == 0 {
        return value;
    }
    value.div_ceil(align) * align
}

/// Given the sorted, deduplicated set of positions an initializer list
/// explicitly filled (`filled`) and the total element/field count
/// (`len`), return the `..`-range gaps between them that still need
/// zero-filling: the run before the first filled position, a run
/// between each pair of filled positions that aren't adjacent, and the
/// run after the last one.
fn index_gaps(filled: &[u64], len: u64) -> Vec<std::ops::Range<u64>> {
    let mut sorted: Vec<u64> = filled.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let mut gaps = Vec::new();
    if let Some(&first) = sorted.first() {
        if first > 0 {
            gaps.push(0..first);
        }
    } else {
        gaps.push(0..len);
        return gaps;
    }
    for (a, b) in sorted.iter().copied().tuple_windows() {
        if b > a + 1 {
            gaps.push(a + 1..b);
        }
    }
    if let Some(&last) = sorted.last() {
        if last + 1 < len {
            gaps.push(last + 1..len);
        }
    }
    gaps
}

fn addr_origin_hint() -> crate::span::Position {
    // Only reached on a malformed initializer whose target type isn't an
    // aggregate or array; callers already have a real span for everything
    // else. A synthetic file keeps this path panic-free without requiring
    // every initializer-lowering call to thread a span down one more level.
    let mut map = crate::span::SourceMap::new();
    let file = map.add_file(std::path::PathBuf::from("<initializer>"), String::new());
    crate::span::Position::new(file, 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticBag;
    use crate::span::{FileId, Position, SourceMap};
    use crate::types::Field;

    fn dummy_span() -> Span {
        let mut map = SourceMap::new();
        let f: FileId = map.add_file(std::path::PathBuf::from("t.c"), String::new());
        Span::point(Position::new(f, 1, 1))
    }

    fn int_lit(v: i64) -> Expr {
        Expr::IntLiteral { value: v as u128, signed: true, rank: IntRank::Int, span: dummy_span() }
    }

    fn main_fn(ret_type: Type, body: Stmt) -> FunctionDefinition {
        FunctionDefinition { ret_type, name: "main".into(), params: vec![], variadic: false, body, span: dummy_span() }
    }

    #[test]
    fn scenario_one_return_zero_constant() {
        let fd = main_fn(Type::int(true, IntRank::Int), Stmt::Return { value: Some(int_lit(0)), span: dummy_span() });
        let mut gen = IrGenerator::new(TargetArch::Amd64);
        let mut diags = DiagnosticBag::new();
        let func = gen.lower_function(&fd, &mut diags);
        assert!(!diags.has_errors());
        assert_eq!(func.body.len(), 1);
        assert_eq!(func.body[0].to_string(), "ret i32 0");
    }

    #[test]
    fn scenario_two_constant_folds_float_addition() {
        let lhs = Expr::FloatLiteral { value_bits: 1.0f64.to_bits(), rank: FloatRank::Float, span: dummy_span() };
        let rhs = Expr::FloatLiteral { value_bits: 2.0f64.to_bits(), rank: FloatRank::Float, span: dummy_span() };
        let sum = Expr::Binary { op: BinaryOp::Arith(ArithOp::Add), lhs: Box::new(lhs), rhs: Box::new(rhs), span: dummy_span() };
        let fd = main_fn(Type::float(FloatRank::Float), Stmt::Return { value: Some(sum), span: dummy_span() });
        let mut gen = IrGenerator::new(TargetArch::Amd64);
        let mut diags = DiagnosticBag::new();
        let func = gen.lower_function(&fd, &mut diags);
        assert_eq!(func.body.last().unwrap().to_string(), "ret f32 3.000000");
    }

    #[test]
    fn break_outside_loop_is_diagnosed() {
        let fd = main_fn(Type::void(), Stmt::Break(dummy_span()));
        let mut gen = IrGenerator::new(TargetArch::Amd64);
        let mut diags = DiagnosticBag::new();
        gen.lower_function(&fd, &mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn undeclared_identifier_is_diagnosed() {
        let fd = main_fn(
            Type::int(true, IntRank::Int),
            Stmt::Return { value: Some(Expr::Ident(Ident { name: "missing".into(), span: dummy_span() })), span: dummy_span() },
        );
        let mut gen = IrGenerator::new(TargetArch::Amd64);
        let mut diags = DiagnosticBag::new();
        gen.lower_function(&fd, &mut diags);
        assert!(diags.has_errors());
    }

    fn decl_stmt(decl: Declaration) -> Stmt {
        Stmt::Compound { items: vec![BlockItem::Decl(vec![decl])], span: dummy_span() }
    }

    #[test]
    fn array_index_designator_fills_named_slot_and_zeroes_the_rest() {
        // int a[4] = { [2] = 5, 9 };  -- index 2 gets 5, the positional
        // entry that follows continues from index 3, indices 0-1 are
        // zero-filled.
        let arr_ty = Type::array_of(Type::int(true, IntRank::Int), Some(4));
        let init = Initializer::List(vec![
            InitItem { designators: vec![Designator::Index(2)], value: Initializer::Expr(int_lit(5)) },
            InitItem { designators: vec![], value: Initializer::Expr(int_lit(9)) },
        ]);
        let decl = Declaration { ty: arr_ty, name: "a".into(), initializer: Some(init), span: dummy_span() };
        let fd = main_fn(Type::void(), decl_stmt(decl));
        let mut gen = IrGenerator::new(TargetArch::Amd64);
        let mut diags = DiagnosticBag::new();
        let func = gen.lower_function(&fd, &mut diags);
        assert!(!diags.has_errors());
        let stores = func.body.iter().filter(|i| matches!(i, Instr::Store { .. })).count();
        assert_eq!(stores, 4);
        let rendered = func.body.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        assert!(rendered.contains("store i32 5"), "{rendered}");
        assert!(rendered.contains("store i32 9"), "{rendered}");
        assert!(rendered.contains("store i32 0"), "{rendered}");
    }

    #[test]
    fn struct_field_designator_leaves_other_fields_zeroed() {
        // struct { int x; int y; } s = { .y = 7 };
        let agg = Aggregate {
            is_union: false,
            tag: None,
            fields: vec![
                Field { name: "x".into(), ty: Type::int(true, IntRank::Int), bitfield_width: None },
                Field { name: "y".into(), ty: Type::int(true, IntRank::Int), bitfield_width: None },
            ],
            complete: true,
        };
        let struct_ty = Type::new(TypeKind::StructOrUnion(Rc::new(agg)));
        let init = Initializer::List(vec![InitItem {
            designators: vec![Designator::Field("y".into())],
            value: Initializer::Expr(int_lit(7)),
        }]);
        let decl = Declaration { ty: struct_ty, name: "s".into(), initializer: Some(init), span: dummy_span() };
        let fd = main_fn(Type::void(), decl_stmt(decl));
        let mut gen = IrGenerator::new(TargetArch::Amd64);
        let mut diags = DiagnosticBag::new();
        let func = gen.lower_function(&fd, &mut diags);
        assert!(!diags.has_errors());
        let stores = func.body.iter().filter(|i| matches!(i, Instr::Store { .. })).count();
        assert_eq!(stores, 2);
        let rendered = func.body.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        assert!(rendered.contains("store i32 7"), "{rendered}");
        assert!(rendered.contains("store i32 0"), "{rendered}");
    }

    #[test]
    fn unknown_field_designator_is_diagnosed() {
        let agg = Aggregate {
            is_union: false,
            tag: None,
            fields: vec![Field { name: "x".into(), ty: Type::int(true, IntRank::Int), bitfield_width: None }],
            complete: true,
        };
        let struct_ty = Type::new(TypeKind::StructOrUnion(Rc::new(agg)));
        let init = Initializer::List(vec![InitItem {
            designators: vec![Designator::Field("nope".into())],
            value: Initializer::Expr(int_lit(1)),
        }]);
        let decl = Declaration { ty: struct_ty, name: "s".into(), initializer: Some(init), span: dummy_span() };
        let fd = main_fn(Type::void(), decl_stmt(decl));
        let mut gen = IrGenerator::new(TargetArch::Amd64);
        let mut diags = DiagnosticBag::new();
        gen.lower_function(&fd, &mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn index_gaps_covers_leading_trailing_and_interior_runs() {
        assert_eq!(index_gaps(&[2], 4), vec![0..2, 3..4]);
        assert_eq!(index_gaps(&[0, 3], 4), vec![1..3]);
        assert_eq!(index_gaps(&[], 3), vec![0..3]);
        assert_eq!(index_gaps(&[0, 1, 2], 3), Vec::<std::ops::Range<u64>>::new());
    }
}
