//! Code generation: a single walk over the optimized AST emitting target
//! instruction text, consulting the union-type lattice to decide where
//! runtime guards are needed.
//!
//! The generator owns its emission buffer and label counter; nothing here
//! is process-global. Each function (and the top level) is emitted into a
//! scratch buffer first so the `DEFVAR` block — user variables discovered
//! by the up-front scan plus temporaries allocated during emission — can be
//! stitched in front of the body.

pub mod emit;
pub mod runtime;

mod builtins;
mod cast;
mod expr;

use std::collections::BTreeSet;

use crate::diagnostics::CompileError;
use crate::parser::ast::{
    BaseType, Expr, ExprKind, Function, FunctionTable, Param, Program, Stmt, Type,
};
use crate::typeck::infer::{infer_expr, InferCx, TypeCache};
use crate::typeck::UnionType;
use emit::{Frame, Symb};
use runtime::{routine_text, RuntimeRoutine, SCRATCH_VARS};

/// Header line of the target text.
pub const HEADER: &str = ".ErisCode";

/// An expression result: where the value lives, what it may be, and the
/// temporary to give back once the value is consumed.
pub struct Operand {
    pub symb: Symb,
    pub ty: UnionType,
    temp: Option<String>,
}

impl Operand {
    fn plain(symb: Symb, ty: UnionType) -> Self {
        Operand { symb, ty, temp: None }
    }
}

#[derive(Debug)]
struct VarInfo {
    name: String,
    temp: bool,
    in_use: bool,
}

/// Variable table for one emission scope (the program top level or one
/// function body). Temporaries are pooled per scope.
pub struct Scope<'p> {
    global: bool,
    params: &'p [Param],
    root: &'p Stmt,
    ret: Option<Type>,
    vars: Vec<VarInfo>,
}

impl<'p> Scope<'p> {
    fn top_level(root: &'p Stmt) -> Self {
        Scope { global: true, params: &[], root, ret: None, vars: Vec::new() }
    }

    fn function(func: &'p Function, root: &'p Stmt) -> Self {
        Scope {
            global: false,
            params: &func.params,
            root,
            ret: Some(func.ret),
            vars: Vec::new(),
        }
    }

    fn frame(&self) -> Frame {
        if self.global { Frame::Global } else { Frame::Local }
    }

    fn declare(&mut self, name: &str) {
        if !self.vars.iter().any(|v| v.name == name) {
            self.vars.push(VarInfo { name: name.to_string(), temp: false, in_use: false });
        }
    }

    fn is_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }

    fn is_known(&self, name: &str) -> bool {
        self.is_param(name) || self.vars.iter().any(|v| v.name == name)
    }

    fn var(&self, name: &str) -> Symb {
        Symb::Var(self.frame(), name.to_string())
    }

    /// Reuse a free pooled temporary of this scope or declare a fresh one.
    fn acquire(&mut self) -> Symb {
        if let Some(info) = self.vars.iter_mut().find(|v| v.temp && !v.in_use) {
            info.in_use = true;
            let name = info.name.clone();
            return Symb::Var(self.frame(), name);
        }
        let name = format!("%t{}", self.vars.iter().filter(|v| v.temp).count() + 1);
        self.vars.push(VarInfo { name: name.clone(), temp: true, in_use: true });
        Symb::Var(self.frame(), name)
    }

    fn release_name(&mut self, name: &str) -> Result<(), CompileError> {
        let Some(info) = self.vars.iter_mut().find(|v| v.name == name) else {
            return Err(CompileError::internal(format!(
                "release of unknown temporary '{name}'"
            )));
        };
        if !info.temp {
            return Err(CompileError::internal(format!(
                "release of non-temporary variable '{name}'"
            )));
        }
        if !info.in_use {
            return Err(CompileError::internal(format!(
                "double free of temporary '{name}'"
            )));
        }
        info.in_use = false;
        Ok(())
    }

    fn decl_lines(&self) -> Vec<String> {
        let frame = self.frame();
        self.vars
            .iter()
            .map(|v| format!("DEFVAR {frame}@{}", v.name))
            .collect()
    }
}

pub struct Codegen<'p> {
    table: &'p FunctionTable,
    cache: TypeCache,
    labels: u32,
    buf: String,
    runtime: BTreeSet<RuntimeRoutine>,
}

pub fn generate(program: &mut Program) -> Result<String, CompileError> {
    // Synthetic program terminator: the top-level stream always ends in an
    // explicit exit.
    if let Stmt::List(items) = &mut program.body {
        items.push(Stmt::Exit { code: 0 });
    }

    let mut g = Codegen {
        table: &program.table,
        cache: TypeCache::new(),
        labels: 0,
        buf: String::new(),
        runtime: BTreeSet::new(),
    };

    let mut scope = Scope::top_level(&program.body);
    let mut assigned = BTreeSet::new();
    collect_assigned(&program.body, &mut assigned);
    for name in &assigned {
        scope.declare(name);
    }
    g.gen_stmt(&program.body, &mut scope)?;
    let top_body = std::mem::take(&mut g.buf);

    let mut sections = Vec::new();
    for func in program.table.user_functions() {
        sections.push(g.gen_function(func)?);
    }

    let mut out = String::with_capacity(top_body.len() + 1024);
    out.push_str(HEADER);
    out.push('\n');
    for line in scope.decl_lines() {
        out.push_str(&line);
        out.push('\n');
    }
    if !g.runtime.is_empty() {
        for scratch in SCRATCH_VARS {
            out.push_str(&format!("DEFVAR GF@{scratch}\n"));
        }
    }
    out.push_str(&top_body);
    for section in sections {
        out.push_str(&section);
    }
    for routine in &g.runtime {
        out.push_str(&routine_text(*routine));
    }
    Ok(out)
}

/// All assignment-target names in a body, in sorted order. These get a
/// backing slot each; parameters are excluded by the caller.
fn collect_assigned(stmt: &Stmt, out: &mut BTreeSet<String>) {
    fn walk_expr(e: &Expr, out: &mut BTreeSet<String>) {
        if let Some(target) = e.assign_target() {
            out.insert(target.to_string());
        }
        for c in e.children() {
            walk_expr(c, out);
        }
    }
    for e in stmt.exprs() {
        walk_expr(e, out);
    }
    match stmt {
        Stmt::List(items) => {
            for s in items {
                collect_assigned(s, out);
            }
        }
        Stmt::If { then_body, else_body, .. } => {
            collect_assigned(then_body, out);
            collect_assigned(else_body, out);
        }
        Stmt::While { body, .. } => collect_assigned(body, out),
        _ => {}
    }
}

impl<'p> Codegen<'p> {
    fn emit(&mut self, line: impl AsRef<str>) {
        self.buf.push_str(line.as_ref());
        self.buf.push('\n');
    }

    /// Monotonic label id, unique across the whole compilation.
    fn label_uid(&mut self) -> u32 {
        self.labels += 1;
        self.labels
    }

    fn ty_of(&mut self, expr: &Expr, scope: &Scope<'_>) -> UnionType {
        let cx = InferCx { table: self.table, root: scope.root, params: scope.params };
        infer_expr(expr, cx, &mut self.cache)
    }

    /// Register a runtime routine (plus anything it calls) and return its
    /// call label.
    fn request_runtime(&mut self, routine: RuntimeRoutine) -> &'static str {
        self.runtime.insert(routine);
        for dep in routine.dependencies() {
            self.runtime.insert(*dep);
        }
        routine.label()
    }

    fn release(&mut self, scope: &mut Scope<'_>, op: Operand) -> Result<(), CompileError> {
        if let Some(name) = op.temp {
            scope.release_name(&name)?;
        }
        Ok(())
    }

    // ===== statements =====

    fn gen_stmt(&mut self, stmt: &Stmt, scope: &mut Scope<'_>) -> Result<(), CompileError> {
        match stmt {
            Stmt::List(items) => {
                for item in items {
                    self.gen_stmt(item, scope)?;
                }
                Ok(())
            }
            Stmt::Expr(e) => self.gen_expr_stmt(e, scope),
            Stmt::If { cond, then_body, else_body } => {
                let uid = self.label_uid();
                let flag = self.gen_condition(cond, scope)?;
                self.emit(format!("JUMPIFEQ if{uid}_else {flag} bool@false"));
                if let Symb::Var(_, name) = &flag {
                    scope.release_name(name)?;
                }
                self.gen_stmt(then_body, scope)?;
                self.emit(format!("JUMP if{uid}_end"));
                self.emit(format!("LABEL if{uid}_else"));
                self.gen_stmt(else_body, scope)?;
                self.emit(format!("LABEL if{uid}_end"));
                Ok(())
            }
            Stmt::While { cond, body } => {
                let uid = self.label_uid();
                self.emit(format!("LABEL while{uid}_begin"));
                let flag = self.gen_condition(cond, scope)?;
                self.emit(format!("JUMPIFEQ while{uid}_end {flag} bool@false"));
                if let Symb::Var(_, name) = &flag {
                    scope.release_name(name)?;
                }
                self.gen_stmt(body, scope)?;
                self.emit(format!("JUMP while{uid}_begin"));
                self.emit(format!("LABEL while{uid}_end"));
                Ok(())
            }
            Stmt::Return { expr, .. } => self.gen_return(expr.as_ref(), scope),
            Stmt::Exit { code } => {
                self.emit(format!("EXIT int@{code}"));
                Ok(())
            }
        }
    }

    /// Condition-context evaluation: the value is cast to bool with the
    /// condition truth rules into a pooled temporary.
    fn gen_condition(&mut self, cond: &Expr, scope: &mut Scope<'_>) -> Result<Symb, CompileError> {
        let op = self.gen_expr(cond, scope)?;
        let flag = scope.acquire();
        self.emit_bool_cast(&op.symb, &op.ty, &flag, scope, true)?;
        self.release(scope, op)?;
        Ok(flag)
    }

    fn gen_expr_stmt(&mut self, e: &Expr, scope: &mut Scope<'_>) -> Result<(), CompileError> {
        if let ExprKind::Binary { op: crate::parser::ast::BinOp::Assign, lhs, rhs } = &e.kind {
            let ExprKind::Variable(name) = &lhs.kind else {
                return Err(CompileError::internal(
                    "assignment to non-variable survived validation",
                ));
            };
            self.gen_assign(name, rhs, scope)?;
            return Ok(());
        }
        if let ExprKind::Call { name, args } = &e.kind {
            self.gen_call(name, args, None, scope)?;
            return Ok(());
        }
        let op = self.gen_expr(e, scope)?;
        self.release(scope, op)
    }

    /// Assignment: the RHS is evaluated directly into the target's slot.
    fn gen_assign(
        &mut self,
        name: &str,
        rhs: &Expr,
        scope: &mut Scope<'_>,
    ) -> Result<UnionType, CompileError> {
        if !scope.is_known(name) {
            return Err(CompileError::internal(format!(
                "assignment to undeclared variable '{name}'"
            )));
        }
        let dest = scope.var(name);
        self.gen_expr_into(rhs, &dest, scope)
    }

    fn gen_return(
        &mut self,
        expr: Option<&Expr>,
        scope: &mut Scope<'_>,
    ) -> Result<(), CompileError> {
        let Some(ret) = scope.ret else {
            return Err(CompileError::internal("return statement outside a function"));
        };
        if let Some(e) = expr {
            let op = self.gen_expr(e, scope)?;
            self.emit_type_guard(&op.symb, &op.ty, ret, "bad return value type", scope)?;
            self.emit(format!("MOVE LF@%retval {}", op.symb));
            self.release(scope, op)?;
        }
        self.emit("POPFRAME");
        self.emit("RETURN");
        Ok(())
    }

    // ===== functions =====

    fn gen_function(&mut self, func: &Function) -> Result<String, CompileError> {
        let body = func
            .body
            .as_ref()
            .ok_or_else(|| CompileError::internal("codegen for built-in body"))?;
        let mut scope = Scope::function(func, body);
        let mut assigned = BTreeSet::new();
        collect_assigned(body, &mut assigned);
        for name in &assigned {
            if !scope.is_param(name) {
                scope.declare(name);
            }
        }

        self.buf.clear();
        self.gen_stmt(body, &mut scope)?;

        // Safety net when control reaches the end of the body: Void
        // functions return implicitly, everything else aborts at runtime.
        let ends_with_terminator = match body {
            Stmt::List(items) => items.last().map(Stmt::is_terminator).unwrap_or(false),
            other => other.is_terminator(),
        };
        if !ends_with_terminator {
            if func.ret.base == BaseType::Void {
                self.emit("POPFRAME");
                self.emit("RETURN");
            } else {
                self.emit(format!(
                    "DPRINT string@{}",
                    emit::escape(&format!("function {}: missing return value", func.name))
                ));
                self.emit("EXIT int@4");
            }
        }
        let body_text = std::mem::take(&mut self.buf);

        let mut section = format!("LABEL ${}\nPUSHFRAME\n", func.name);
        if func.ret.base != BaseType::Void {
            section.push_str("DEFVAR LF@%retval\n");
        }
        for line in scope.decl_lines() {
            section.push_str(&line);
            section.push('\n');
        }
        section.push_str(&body_text);
        Ok(section)
    }

    // ===== runtime type guard =====

    /// Check a value against a declared type, exiting 4 with a diagnostic
    /// on mismatch. Skipped entirely when the static union already proves
    /// conformance, or when the declared type is dynamic.
    fn emit_type_guard(
        &mut self,
        symb: &Symb,
        ty: &UnionType,
        expected: Type,
        what: &str,
        scope: &mut Scope<'_>,
    ) -> Result<(), CompileError> {
        if expected.base == BaseType::Unknown {
            return Ok(());
        }
        let allowed = UnionType::from_type(expected);
        if ty.subset_of(&allowed) {
            return Ok(());
        }
        let tag = scope.acquire();
        let uid = self.label_uid();
        self.emit(format!("TYPE {tag} {symb}"));
        for base in allowed.possible_bases() {
            self.emit(format!("JUMPIFEQ guard{uid}_ok {tag} string@{}", type_tag(base)));
        }
        self.emit(format!("DPRINT string@{}", emit::escape(what)));
        self.emit("EXIT int@4");
        self.emit(format!("LABEL guard{uid}_ok"));
        if let Symb::Var(_, name) = &tag {
            scope.release_name(name)?;
        }
        Ok(())
    }
}

/// The string the target `TYPE` instruction produces for each concrete
/// runtime type.
pub(crate) fn type_tag(base: BaseType) -> &'static str {
    match base {
        BaseType::Int => "int",
        BaseType::Float => "float",
        BaseType::String => "string",
        BaseType::Bool => "bool",
        BaseType::Null => "nil",
        _ => "",
    }
}
