use std::collections::HashMap;

use serde::Serialize;

use crate::span::Span;

/// Identity of an expression node, stable across in-place tree rewrites.
/// The per-round type-result cache is keyed by it; `duplicate` re-stamps
/// every copied node with a fresh id.
pub type NodeId = u32;

/// Allocator for `NodeId`s. The parser owns one while building the tree;
/// it travels with the `Program` so the optimizer can stamp synthesized
/// and duplicated nodes.
#[derive(Debug, Default, Serialize)]
pub struct IdGen {
    next: NodeId,
}

impl IdGen {
    pub fn fresh(&mut self) -> NodeId {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// A concrete constant value. The variant is the constant's concrete type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

impl Value {
    pub fn base_type(&self) -> BaseType {
        match self {
            Value::Int(_) => BaseType::Int,
            Value::Float(_) => BaseType::Float,
            Value::Str(_) => BaseType::String,
            Value::Bool(_) => BaseType::Bool,
            Value::Null => BaseType::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BaseType {
    Int,
    Float,
    String,
    Void,
    Null,
    Bool,
    Unknown,
}

/// A declared type: a concrete base plus a nullable annotation.
/// `required == false` means the base is unioned with Null (`?int`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Type {
    pub base: BaseType,
    pub required: bool,
}

impl Type {
    pub fn new(base: BaseType, required: bool) -> Self {
        Self { base, required }
    }

    pub fn required(base: BaseType) -> Self {
        Self { base, required: true }
    }

    pub fn nullable(base: BaseType) -> Self {
        Self { base, required: false }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.required {
            write!(f, "?")?;
        }
        match self.base {
            BaseType::Int => write!(f, "int"),
            BaseType::Float => write!(f, "float"),
            BaseType::String => write!(f, "string"),
            BaseType::Void => write!(f, "void"),
            BaseType::Null => write!(f, "null"),
            BaseType::Bool => write!(f, "bool"),
            BaseType::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Concat,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Eq,
    Neq,
    And,
    Or,
    Assign,
}

impl BinOp {
    pub fn is_relational(self) -> bool {
        matches!(self, BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Neq)
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnOp {
    Neg,
    Not,
}

/// An expression node: a closed variant enum plus span and identity.
#[derive(Debug, Clone, Serialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub id: NodeId,
}

#[derive(Debug, Clone, Serialize)]
pub enum ExprKind {
    Constant(Value),
    Variable(String),
    Call { name: String, args: Vec<Expr> },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Unary { op: UnOp, rhs: Box<Expr> },
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span, ids: &mut IdGen) -> Self {
        Expr { kind, span, id: ids.fresh() }
    }

    pub fn constant(value: Value, span: Span, ids: &mut IdGen) -> Self {
        Expr::new(ExprKind::Constant(value), span, ids)
    }

    /// Mutable slots for every direct child, in evaluation order. The
    /// optimizer's generic walks rewrite through these instead of matching
    /// on each variant.
    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match &mut self.kind {
            ExprKind::Constant(_) | ExprKind::Variable(_) => Vec::new(),
            ExprKind::Call { args, .. } => args.iter_mut().collect(),
            ExprKind::Binary { lhs, rhs, .. } => vec![lhs.as_mut(), rhs.as_mut()],
            ExprKind::Unary { rhs, .. } => vec![rhs.as_mut()],
        }
    }

    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Constant(_) | ExprKind::Variable(_) => Vec::new(),
            ExprKind::Call { args, .. } => args.iter().collect(),
            ExprKind::Binary { lhs, rhs, .. } => vec![lhs.as_ref(), rhs.as_ref()],
            ExprKind::Unary { rhs, .. } => vec![rhs.as_ref()],
        }
    }

    /// Deep clone with fresh node ids. Loop unrolling duplicates condition
    /// and body through this so cache identities never collide.
    pub fn duplicate(&self, ids: &mut IdGen) -> Expr {
        let kind = match &self.kind {
            ExprKind::Constant(v) => ExprKind::Constant(v.clone()),
            ExprKind::Variable(name) => ExprKind::Variable(name.clone()),
            ExprKind::Call { name, args } => ExprKind::Call {
                name: name.clone(),
                args: args.iter().map(|a| a.duplicate(ids)).collect(),
            },
            ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
                op: *op,
                lhs: Box::new(lhs.duplicate(ids)),
                rhs: Box::new(rhs.duplicate(ids)),
            },
            ExprKind::Unary { op, rhs } => ExprKind::Unary {
                op: *op,
                rhs: Box::new(rhs.duplicate(ids)),
            },
        };
        Expr { kind, span: self.span, id: ids.fresh() }
    }

    /// The assignment target name, if this is a `$name = ...` expression.
    pub fn assign_target(&self) -> Option<&str> {
        if let ExprKind::Binary { op: BinOp::Assign, lhs, .. } = &self.kind {
            if let ExprKind::Variable(name) = &lhs.kind {
                return Some(name);
            }
        }
        None
    }

    /// Diagnostic JSON dump of the subtree.
    pub fn serialize(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// A statement node. Function declarations are top level only and live in
/// the function table, not here.
#[derive(Debug, Clone, Serialize)]
pub enum Stmt {
    Expr(Expr),
    List(Vec<Stmt>),
    If { cond: Expr, then_body: Box<Stmt>, else_body: Box<Stmt> },
    While { cond: Expr, body: Box<Stmt> },
    Return { expr: Option<Expr>, span: Span },
    /// Synthesized control terminator; the generated program stops here
    /// with the given process exit code.
    Exit { code: i64 },
}

impl Stmt {
    pub fn empty() -> Stmt {
        Stmt::List(Vec::new())
    }

    /// True for statements after which control never continues.
    pub fn is_terminator(&self) -> bool {
        matches!(self, Stmt::Return { .. } | Stmt::Exit { .. })
    }

    /// Mutable slots for directly nested statements.
    pub fn child_stmts_mut(&mut self) -> Vec<&mut Stmt> {
        match self {
            Stmt::Expr(_) | Stmt::Return { .. } | Stmt::Exit { .. } => Vec::new(),
            Stmt::List(items) => items.iter_mut().collect(),
            Stmt::If { then_body, else_body, .. } => {
                vec![then_body.as_mut(), else_body.as_mut()]
            }
            Stmt::While { body, .. } => vec![body.as_mut()],
        }
    }

    /// Mutable slots for the expressions held directly by this statement.
    pub fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Stmt::Expr(e) => vec![e],
            Stmt::If { cond, .. } => vec![cond],
            Stmt::While { cond, .. } => vec![cond],
            Stmt::Return { expr: Some(e), .. } => vec![e],
            _ => Vec::new(),
        }
    }

    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Stmt::Expr(e) => vec![e],
            Stmt::If { cond, .. } => vec![cond],
            Stmt::While { cond, .. } => vec![cond],
            Stmt::Return { expr: Some(e), .. } => vec![e],
            _ => Vec::new(),
        }
    }

    pub fn duplicate(&self, ids: &mut IdGen) -> Stmt {
        match self {
            Stmt::Expr(e) => Stmt::Expr(e.duplicate(ids)),
            Stmt::List(items) => Stmt::List(items.iter().map(|s| s.duplicate(ids)).collect()),
            Stmt::If { cond, then_body, else_body } => Stmt::If {
                cond: cond.duplicate(ids),
                then_body: Box::new(then_body.duplicate(ids)),
                else_body: Box::new(else_body.duplicate(ids)),
            },
            Stmt::While { cond, body } => Stmt::While {
                cond: cond.duplicate(ids),
                body: Box::new(body.duplicate(ids)),
            },
            Stmt::Return { expr, span } => Stmt::Return {
                expr: expr.as_ref().map(|e| e.duplicate(ids)),
                span: *span,
            },
            Stmt::Exit { code } => Stmt::Exit { code: *code },
        }
    }

    pub fn serialize(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, Serialize)]
pub struct Function {
    pub name: String,
    pub ret: Type,
    pub params: Vec<Param>,
    /// `None` marks a built-in; codegen special-cases those.
    pub body: Option<Stmt>,
    /// Built-in `write` takes any number of arguments.
    pub variadic: bool,
    pub span: Span,
}

impl Function {
    pub fn is_builtin(&self) -> bool {
        self.body.is_none()
    }
}

/// Function-name lookup table, built during parsing with the built-in
/// catalogue pre-registered.
#[derive(Debug, Default, Serialize)]
pub struct FunctionTable {
    map: HashMap<String, Function>,
}

impl FunctionTable {
    pub fn with_builtins() -> Self {
        let mut table = FunctionTable::default();
        let any = Type::nullable(BaseType::Unknown);
        let builtins: &[(&str, Type, &[(&str, Type)], bool)] = &[
            ("write", Type::required(BaseType::Void), &[], true),
            ("reads", Type::nullable(BaseType::String), &[], false),
            ("readi", Type::nullable(BaseType::Int), &[], false),
            ("readf", Type::nullable(BaseType::Float), &[], false),
            ("intval", Type::required(BaseType::Int), &[("term", any)], false),
            ("floatval", Type::required(BaseType::Float), &[("term", any)], false),
            ("boolval", Type::required(BaseType::Bool), &[("term", any)], false),
            ("strval", Type::required(BaseType::String), &[("term", any)], false),
            ("strlen", Type::required(BaseType::Int), &[("s", Type::required(BaseType::String))], false),
            (
                "substring",
                Type::nullable(BaseType::String),
                &[
                    ("s", Type::required(BaseType::String)),
                    ("i", Type::required(BaseType::Int)),
                    ("j", Type::required(BaseType::Int)),
                ],
                false,
            ),
            ("ord", Type::required(BaseType::Int), &[("c", Type::required(BaseType::String))], false),
            ("chr", Type::required(BaseType::String), &[("i", Type::required(BaseType::Int))], false),
        ];
        for (name, ret, params, variadic) in builtins {
            table.map.insert(
                name.to_string(),
                Function {
                    name: name.to_string(),
                    ret: *ret,
                    params: params
                        .iter()
                        .map(|(n, t)| Param { name: n.to_string(), ty: *t })
                        .collect(),
                    body: None,
                    variadic: *variadic,
                    span: Span::dummy(),
                },
            );
        }
        table
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn insert(&mut self, func: Function) -> Option<Function> {
        self.map.insert(func.name.clone(), func)
    }

    /// User-defined functions in name order; deterministic emission depends
    /// on this ordering.
    pub fn user_functions(&self) -> Vec<&Function> {
        let mut funcs: Vec<&Function> = self.map.values().filter(|f| !f.is_builtin()).collect();
        funcs.sort_by(|a, b| a.name.cmp(&b.name));
        funcs
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.map.get_mut(name)
    }

    pub fn user_function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .map
            .values()
            .filter(|f| !f.is_builtin())
            .map(|f| f.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Function> {
        self.map.values_mut()
    }
}

/// A parsed compilation unit: the top-level statement list plus the
/// function table and the node-id allocator.
#[derive(Debug, Serialize)]
pub struct Program {
    pub body: Stmt,
    pub table: FunctionTable,
    pub ids: IdGen,
}
