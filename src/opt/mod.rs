//! Fixpoint tree optimizer.
//!
//! A one-shot unrolling pre-pass rewrites every `while` into three nested
//! speculative `if` levels around a residual loop. After that the engine
//! drives two nested fixpoints: the outer loop rebuilds the flow-type
//! cache, the inner loop rebuilds use/def counts and alternates one
//! statement-folding pass with one error-hoisting pass until neither
//! changes the tree. Folding can expose new guaranteed errors and hoisted
//! exits expose new dead code, so both levels iterate.

use std::collections::HashMap;

use crate::diagnostics::CompileError;
use crate::parser::ast::{
    BinOp, Expr, ExprKind, FunctionTable, IdGen, NodeId, Param, Program, Stmt, Value,
};
use crate::typeck::fold::{const_cast_condition, fold_binary, fold_unary, FoldFail};
use crate::typeck::infer::{infer_expr, InferCx, TypeCache};

/// Generous bound on fixpoint rounds; exceeding it means the rewrite rules
/// stopped converging, which is a compiler bug.
const MAX_ROUNDS: u32 = 10_000;

/// Exit code for reading a variable that is never assigned.
pub const EXIT_UNDEFINED_VARIABLE: i64 = 5;

/// Levels of speculative `while` unrolling.
const UNROLL_DEPTH: usize = 3;

pub fn optimize(program: &mut Program) -> Result<(), CompileError> {
    unroll_loops(&mut program.body, &mut program.ids);
    let names = program.table.user_function_names();
    for name in &names {
        if let Some(func) = program.table.get_mut(name) {
            if let Some(body) = func.body.as_mut() {
                unroll_loops(body, &mut program.ids);
            }
        }
    }

    optimize_root(&mut program.body, &[], &program.table, &mut program.ids)?;

    for name in &names {
        // The body is taken out of the table so inference can borrow the
        // table while the body is rewritten.
        let (params, body) = match program.table.get_mut(name) {
            Some(func) => (func.params.clone(), func.body.take()),
            None => continue,
        };
        let Some(mut body) = body else { continue };
        let result = optimize_root(&mut body, &params, &program.table, &mut program.ids);
        if let Some(func) = program.table.get_mut(name) {
            func.body = Some(body);
        }
        result?;
    }
    Ok(())
}

// ===== loop unrolling (one-shot pre-pass) =====

/// `while (c) { b }` becomes
/// `if (c) { b; if (c) { b; if (c) { b; while (c) { b } } } }`,
/// duplicating condition and body per `if` level; the innermost level keeps
/// a genuine `while` for the residual iterations.
fn unroll_loops(stmt: &mut Stmt, ids: &mut IdGen) {
    for child in stmt.child_stmts_mut() {
        unroll_loops(child, ids);
    }
    if !matches!(stmt, Stmt::While { .. }) {
        return;
    }
    let Stmt::While { cond, body } = std::mem::replace(stmt, Stmt::empty()) else {
        return;
    };
    let dups: Vec<(Expr, Stmt)> = (0..UNROLL_DEPTH)
        .map(|_| (cond.duplicate(ids), body.duplicate(ids)))
        .collect();
    let mut nested = Stmt::While { cond, body };
    for (cond_dup, body_dup) in dups {
        nested = Stmt::If {
            cond: cond_dup,
            then_body: Box::new(Stmt::List(vec![body_dup, nested])),
            else_body: Box::new(Stmt::empty()),
        };
    }
    *stmt = nested;
}

// ===== fixpoint engine =====

fn optimize_root(
    body: &mut Stmt,
    params: &[Param],
    table: &FunctionTable,
    ids: &mut IdGen,
) -> Result<(), CompileError> {
    let mut rounds = 0u32;
    loop {
        rounds += 1;
        if rounds > MAX_ROUNDS {
            return Err(CompileError::internal("optimizer failed to reach a fixpoint"));
        }
        // Fresh flow-type cache per outer round; inner rounds deliberately
        // reuse it across mutations.
        let mut cache = TypeCache::new();
        let mut outer_changed = false;
        loop {
            rounds += 1;
            if rounds > MAX_ROUNDS {
                return Err(CompileError::internal("optimizer failed to reach a fixpoint"));
            }
            let counts = count_uses(body);
            let plan = plan_rewrites(body, params, table, &mut cache);
            let folded = fold_pass(body, &counts, &plan, ids)?;
            let hoisted = hoist_pass(body, &plan);
            if folded || hoisted {
                outer_changed = true;
            } else {
                break;
            }
        }
        if !outer_changed {
            return Ok(());
        }
    }
}

// ===== use/def counting =====

#[derive(Default, Clone, Copy)]
struct UseDef {
    uses: u32,
    assigns: u32,
}

/// Aggregate per-name counts over the whole scan root. Assignment targets
/// count as both a use and an assignment, so `uses == assigns` means the
/// variable is never read anywhere.
fn count_uses(root: &Stmt) -> HashMap<String, UseDef> {
    fn walk_expr(e: &Expr, counts: &mut HashMap<String, UseDef>) {
        if let ExprKind::Variable(name) = &e.kind {
            counts.entry(name.clone()).or_default().uses += 1;
        }
        if let Some(target) = e.assign_target() {
            counts.entry(target.to_string()).or_default().assigns += 1;
        }
        for c in e.children() {
            walk_expr(c, counts);
        }
    }
    fn walk_stmt(s: &Stmt, counts: &mut HashMap<String, UseDef>) {
        for e in s.exprs() {
            walk_expr(e, counts);
        }
        match s {
            Stmt::List(items) => {
                for item in items {
                    walk_stmt(item, counts);
                }
            }
            Stmt::If { then_body, else_body, .. } => {
                walk_stmt(then_body, counts);
                walk_stmt(else_body, counts);
            }
            Stmt::While { body, .. } => walk_stmt(body, counts),
            _ => {}
        }
    }
    let mut counts = HashMap::new();
    walk_stmt(root, &mut counts);
    counts
}

// ===== read phase: rewrite planning =====

#[derive(Default)]
struct RewritePlan {
    /// Variable uses whose inferred union carries a settled constant.
    const_prop: HashMap<NodeId, Value>,
    /// Expressions guaranteed to abort at runtime, with their exit code.
    hoists: HashMap<NodeId, i64>,
}

fn plan_rewrites(
    root: &Stmt,
    params: &[Param],
    table: &FunctionTable,
    cache: &mut TypeCache,
) -> RewritePlan {
    fn walk_expr(e: &Expr, cx: InferCx<'_>, cache: &mut TypeCache, plan: &mut RewritePlan) {
        if let ExprKind::Binary { op: BinOp::Assign, lhs, rhs } = &e.kind {
            if matches!(&lhs.kind, ExprKind::Variable(_)) {
                // Assignment targets are writes, not reads.
                walk_expr(rhs, cx, cache, plan);
                return;
            }
        }
        if matches!(&e.kind, ExprKind::Variable(_)) {
            let ty = infer_expr(e, cx, cache);
            if ty.is_undefined && ty.flag_count() == 0 {
                plan.hoists.insert(e.id, EXIT_UNDEFINED_VARIABLE);
            } else if !ty.is_undefined {
                if let Some(value) = ty.constant {
                    plan.const_prop.insert(e.id, value);
                }
            }
        }
        for c in e.children() {
            walk_expr(c, cx, cache, plan);
        }
    }
    fn walk_stmt(s: &Stmt, cx: InferCx<'_>, cache: &mut TypeCache, plan: &mut RewritePlan) {
        for e in s.exprs() {
            walk_expr(e, cx, cache, plan);
        }
        match s {
            Stmt::List(items) => {
                for item in items {
                    walk_stmt(item, cx, cache, plan);
                }
            }
            Stmt::If { then_body, else_body, .. } => {
                walk_stmt(then_body, cx, cache, plan);
                walk_stmt(else_body, cx, cache, plan);
            }
            Stmt::While { body, .. } => walk_stmt(body, cx, cache, plan),
            _ => {}
        }
    }
    let mut plan = RewritePlan::default();
    let cx = InferCx { table, root, params };
    walk_stmt(root, cx, cache, &mut plan);
    plan
}

// ===== write phase: statement folding =====

fn fold_pass(
    stmt: &mut Stmt,
    counts: &HashMap<String, UseDef>,
    plan: &RewritePlan,
    ids: &mut IdGen,
) -> Result<bool, CompileError> {
    let mut changed = false;
    fold_stmt(stmt, counts, plan, ids, &mut changed)?;
    Ok(changed)
}

/// True for statements with no runtime effect at all.
fn is_effect_free(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Expr(e) => matches!(e.kind, ExprKind::Constant(_)),
        Stmt::List(items) => items.is_empty(),
        _ => false,
    }
}

fn fold_stmt(
    stmt: &mut Stmt,
    counts: &HashMap<String, UseDef>,
    plan: &RewritePlan,
    ids: &mut IdGen,
    changed: &mut bool,
) -> Result<(), CompileError> {
    // Fold this statement's own expressions first; a guaranteed-failing
    // constant expression hoists the whole statement into an exit.
    let mut fail: Option<i64> = None;
    for e in stmt.exprs_mut() {
        match fold_expr(e, plan, ids) {
            Ok(c) => *changed |= c,
            Err(FoldFail { code }) => {
                fail = Some(code);
                break;
            }
        }
    }
    if let Some(code) = fail {
        *stmt = Stmt::Exit { code };
        *changed = true;
        return Ok(());
    }

    let mut replacement: Option<Stmt> = None;
    match stmt {
        Stmt::List(items) => {
            for item in items.iter_mut() {
                fold_stmt(item, counts, plan, ids, changed)?;
            }
            // Dead code after a terminator: control never passes a return
            // or exit, so later siblings go away.
            if let Some(pos) = items.iter().position(|s| s.is_terminator()) {
                if pos + 1 < items.len() {
                    items.truncate(pos + 1);
                    *changed = true;
                }
            }
            let before = items.len();
            items.retain(|s| !is_effect_free(s));
            if items.len() != before {
                *changed = true;
            }
        }
        Stmt::If { cond, then_body, else_body } => {
            fold_stmt(then_body, counts, plan, ids, changed)?;
            fold_stmt(else_body, counts, plan, ids, changed)?;
            if let ExprKind::Constant(v) = &cond.kind {
                let taken = if const_cast_condition(v) { then_body } else { else_body };
                replacement = Some(std::mem::replace(taken.as_mut(), Stmt::empty()));
            }
        }
        Stmt::While { cond, body } => {
            fold_stmt(body, counts, plan, ids, changed)?;
            if let ExprKind::Constant(v) = &cond.kind {
                if !const_cast_condition(v) {
                    replacement = Some(Stmt::empty());
                }
            }
        }
        Stmt::Expr(e) => {
            if let Some(name) = e.assign_target() {
                let count = counts.get(name).copied().unwrap_or_default();
                if count.uses == count.assigns {
                    // Every occurrence of the name is a write; keep the RHS
                    // for its effects, drop the dead store.
                    let ExprKind::Binary { rhs, .. } =
                        std::mem::replace(&mut e.kind, ExprKind::Constant(Value::Null))
                    else {
                        return Err(CompileError::internal(
                            "assignment target without assignment node",
                        ));
                    };
                    *e = *rhs;
                    *changed = true;
                }
            }
        }
        _ => {}
    }
    if let Some(new_stmt) = replacement {
        *stmt = new_stmt;
        *changed = true;
    }
    Ok(())
}

/// Bottom-up constant folding and propagation inside one expression tree.
/// `Err` reports a subexpression guaranteed to abort at runtime.
fn fold_expr(expr: &mut Expr, plan: &RewritePlan, ids: &mut IdGen) -> Result<bool, FoldFail> {
    let mut changed = false;
    for child in expr.children_mut() {
        changed |= fold_expr(child, plan, ids)?;
    }
    let folded: Option<Value> = match &expr.kind {
        ExprKind::Variable(_) => plan.const_prop.get(&expr.id).cloned(),
        ExprKind::Binary { op, lhs, rhs } if *op != BinOp::Assign => {
            match (&lhs.kind, &rhs.kind) {
                (ExprKind::Constant(l), ExprKind::Constant(r)) => fold_binary(*op, l, r)?,
                _ => None,
            }
        }
        ExprKind::Unary { op, rhs } => match &rhs.kind {
            ExprKind::Constant(v) => fold_unary(*op, v),
            _ => None,
        },
        _ => None,
    };
    if let Some(value) = folded {
        *expr = Expr::constant(value, expr.span, ids);
        changed = true;
    }
    Ok(changed)
}

// ===== error hoisting =====

/// Replace every statement holding a guaranteed-failing expression with an
/// explicit exit, recursing through lists and branch bodies.
fn hoist_pass(stmt: &mut Stmt, plan: &RewritePlan) -> bool {
    if plan.hoists.is_empty() {
        return false;
    }
    let mut changed = false;
    hoist_stmt(stmt, plan, &mut changed);
    changed
}

fn hoist_stmt(stmt: &mut Stmt, plan: &RewritePlan, changed: &mut bool) {
    let code = stmt.exprs().into_iter().find_map(|e| find_hoist(e, plan));
    if let Some(code) = code {
        *stmt = Stmt::Exit { code };
        *changed = true;
        return;
    }
    for child in stmt.child_stmts_mut() {
        hoist_stmt(child, plan, changed);
    }
}

fn find_hoist(expr: &Expr, plan: &RewritePlan) -> Option<i64> {
    if let Some(code) = plan.hoists.get(&expr.id) {
        return Some(*code);
    }
    expr.children().into_iter().find_map(|c| find_hoist(c, plan))
}
