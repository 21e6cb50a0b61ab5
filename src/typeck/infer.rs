//! Union-type inference over the AST.
//!
//! Variable typing is deliberately flow-insensitive: every assignment to a
//! name found anywhere in the enclosing body contributes its type, and the
//! undefined flag is cleared only by an assignment that precedes the use at
//! unconditional nesting depth. Downstream runtime guards are designed
//! around exactly this over-approximation.

use std::collections::{HashMap, HashSet};

use crate::parser::ast::{
    BaseType, BinOp, Expr, ExprKind, FunctionTable, NodeId, Param, Stmt, UnOp,
};
use crate::typeck::UnionType;

/// Per-round memoization of inference results, keyed by node identity.
/// The optimizer drops it whenever the tree is mutated.
pub type TypeCache = HashMap<NodeId, UnionType>;

/// Lookup context for inference: the function table, the statement tree
/// assignments are scanned in (the current function body, or the program
/// body at top level), and the current function's parameters.
#[derive(Clone, Copy)]
pub struct InferCx<'a> {
    pub table: &'a FunctionTable,
    pub root: &'a Stmt,
    pub params: &'a [Param],
}

pub fn infer_expr(expr: &Expr, cx: InferCx<'_>, cache: &mut TypeCache) -> UnionType {
    let mut active = HashSet::new();
    infer(expr, cx, cache, &mut active)
}

fn infer(
    expr: &Expr,
    cx: InferCx<'_>,
    cache: &mut TypeCache,
    active: &mut HashSet<String>,
) -> UnionType {
    if let Some(hit) = cache.get(&expr.id) {
        return hit.clone();
    }
    let ty = match &expr.kind {
        ExprKind::Constant(v) => UnionType::of_base(v.base_type()).with_constant(v.clone()),
        ExprKind::Variable(name) => infer_variable(name, expr.id, cx, cache, active),
        ExprKind::Binary { op, lhs, rhs } => {
            infer_binary(*op, lhs, rhs, cx, cache, active)
        }
        ExprKind::Unary { op, rhs } => match op {
            UnOp::Not => UnionType::of_base(BaseType::Bool),
            UnOp::Neg => numeric_result(&infer(rhs, cx, cache, active)),
        },
        ExprKind::Call { name, .. } => infer_call(name, cx),
    };
    // Results computed under an in-progress variable scan may be partial;
    // only settled results are memoized.
    if active.is_empty() {
        cache.insert(expr.id, ty.clone());
    }
    ty
}

fn infer_binary(
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    cx: InferCx<'_>,
    cache: &mut TypeCache,
    active: &mut HashSet<String>,
) -> UnionType {
    match op {
        BinOp::Assign => infer(rhs, cx, cache, active),
        BinOp::And | BinOp::Or => UnionType::of_base(BaseType::Bool),
        BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq => {
            UnionType::of_base(BaseType::Bool)
        }
        BinOp::Concat => UnionType::of_base(BaseType::String),
        BinOp::Div => UnionType::of_base(BaseType::Float),
        BinOp::Add | BinOp::Sub | BinOp::Mul => {
            let lt = infer(lhs, cx, cache, active);
            let rt = infer(rhs, cx, cache, active);
            arithmetic_result(&lt, &rt)
        }
    }
}

/// `+ - *`: Float when either side is provably Float, Int when both are
/// provably Int, the Int|Float union otherwise (strings may coerce either
/// way at runtime).
fn arithmetic_result(lt: &UnionType, rt: &UnionType) -> UnionType {
    if lt.single_base() == Some(BaseType::Float) || rt.single_base() == Some(BaseType::Float) {
        return UnionType::of_base(BaseType::Float);
    }
    if is_provably_int(lt) && is_provably_int(rt) {
        return UnionType::of_base(BaseType::Int);
    }
    UnionType::of_base(BaseType::Int).union(&UnionType::of_base(BaseType::Float))
}

fn numeric_result(t: &UnionType) -> UnionType {
    match t.single_base() {
        Some(BaseType::Float) => UnionType::of_base(BaseType::Float),
        _ if is_provably_int(t) => UnionType::of_base(BaseType::Int),
        _ => UnionType::of_base(BaseType::Int).union(&UnionType::of_base(BaseType::Float)),
    }
}

/// True when every possible runtime type converts to Int without a runtime
/// float branch: int, bool and null all do; float and string do not.
fn is_provably_int(t: &UnionType) -> bool {
    !t.is_float && !t.is_string && !t.is_undefined && t.flag_count() > 0
}

fn infer_call(name: &str, cx: InferCx<'_>) -> UnionType {
    let Some(func) = cx.table.get(name) else {
        // Unresolved calls are a validation error; stay conservative here.
        return UnionType::dynamic();
    };
    if func.is_builtin() {
        return UnionType::from_type(func.ret);
    }
    // Non-built-in calls are treated as fully dynamic; the declared type
    // only drives runtime guards.
    UnionType::dynamic()
}

struct AssignScan<'e> {
    name: &'e str,
    use_id: NodeId,
    reached_use: bool,
    /// (rhs, assignment is definite: unconditional and before the use)
    found: Vec<(&'e Expr, bool)>,
}

fn infer_variable(
    name: &str,
    use_id: NodeId,
    cx: InferCx<'_>,
    cache: &mut TypeCache,
    active: &mut HashSet<String>,
) -> UnionType {
    if let Some(param) = cx.params.iter().find(|p| p.name == name) {
        return UnionType::from_type(param.ty);
    }
    if !active.insert(name.to_string()) {
        // Already scanning this name further up the recursion; contribute
        // nothing so the outer union settles.
        return UnionType::empty();
    }

    let mut scan = AssignScan { name, use_id, reached_use: false, found: Vec::new() };
    scan_stmt(cx.root, 0, &mut scan);

    let result = if scan.found.is_empty() {
        UnionType::undefined_only()
    } else {
        let definite = scan.found.iter().any(|(_, d)| *d);
        let mut ty = UnionType::empty();
        for (rhs, _) in &scan.found {
            ty = ty.union(&infer(rhs, cx, cache, active));
        }
        if !definite {
            ty.is_undefined = true;
            ty.constant = None;
        }
        ty
    };
    active.remove(name);
    result
}

fn scan_stmt<'e>(stmt: &'e Stmt, depth: u32, scan: &mut AssignScan<'e>) {
    match stmt {
        Stmt::List(items) => {
            for s in items {
                scan_stmt(s, depth, scan);
            }
        }
        Stmt::If { cond, then_body, else_body } => {
            scan_expr(cond, depth, scan);
            scan_stmt(then_body, depth + 1, scan);
            scan_stmt(else_body, depth + 1, scan);
        }
        Stmt::While { cond, body } => {
            scan_expr(cond, depth + 1, scan);
            scan_stmt(body, depth + 1, scan);
        }
        Stmt::Expr(e) => scan_expr(e, depth, scan),
        Stmt::Return { expr: Some(e), .. } => scan_expr(e, depth, scan),
        Stmt::Return { expr: None, .. } | Stmt::Exit { .. } => {}
    }
}

fn scan_expr<'e>(expr: &'e Expr, depth: u32, scan: &mut AssignScan<'e>) {
    if expr.id == scan.use_id {
        scan.reached_use = true;
    }
    if let ExprKind::Binary { op: BinOp::Assign, lhs, rhs } = &expr.kind {
        if let ExprKind::Variable(target) = &lhs.kind {
            // The RHS is walked first: a use inside it precedes the write.
            scan_expr(rhs, depth, scan);
            if target == scan.name {
                let definite = depth == 0 && !scan.reached_use;
                scan.found.push((rhs, definite));
            }
            return;
        }
    }
    for child in expr.children() {
        scan_expr(child, depth, scan);
    }
}
