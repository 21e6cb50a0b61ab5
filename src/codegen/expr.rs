//! Expression lowering: operand production, the three-way arithmetic cast
//! negotiation, relational/equality comparison-type negotiation,
//! short-circuit logic, and function calls.

use crate::diagnostics::CompileError;
use crate::parser::ast::{BaseType, BinOp, Expr, ExprKind, Function, FunctionTable, UnOp};
use crate::typeck::fold::CastMode;
use crate::typeck::UnionType;

use super::emit::Symb;
use super::{Codegen, Operand, Scope};

/// Every possible runtime type of `t` converts to Int without a float
/// branch: int, bool and null do; float and string do not.
fn int_only(t: &UnionType) -> bool {
    !t.is_float && !t.is_string && !t.is_undefined && t.flag_count() > 0
}

fn without(ty: &UnionType, bases: &[BaseType]) -> UnionType {
    let mut t = ty.clone();
    for base in bases {
        match base {
            BaseType::Int => t.is_int = false,
            BaseType::Float => t.is_float = false,
            BaseType::String => t.is_string = false,
            BaseType::Bool => t.is_bool = false,
            BaseType::Null => t.is_null = false,
            _ => {}
        }
    }
    t.constant = None;
    t
}

impl<'p> Codegen<'p> {
    /// Produce an operand for an expression: constants and variables are
    /// used in place, everything else evaluates into a pooled temporary.
    pub(crate) fn gen_expr(
        &mut self,
        expr: &Expr,
        scope: &mut Scope<'_>,
    ) -> Result<Operand, CompileError> {
        match &expr.kind {
            ExprKind::Constant(v) => Ok(Operand::plain(
                Symb::from_value(v),
                UnionType::of_base(v.base_type()).with_constant(v.clone()),
            )),
            ExprKind::Variable(name) => {
                if !scope.is_known(name) {
                    scope.declare(name);
                }
                let mut ty = self.ty_of(expr, scope);
                let symb = scope.var(name);
                self.emit_undefined_guard(&symb, &ty, scope)?;
                // Past the guard the value is known to be initialized.
                ty.is_undefined = false;
                Ok(Operand::plain(symb, ty))
            }
            _ => {
                let dest = scope.acquire();
                let ty = self.gen_expr_into(expr, &dest, scope)?;
                let Symb::Var(_, name) = &dest else {
                    return Err(CompileError::internal("temporary is not a variable"));
                };
                Ok(Operand { symb: dest.clone(), ty, temp: Some(name.clone()) })
            }
        }
    }

    /// Evaluate an expression directly into `dest` (destination-passing;
    /// assignment uses this to write the target slot without a copy).
    pub(crate) fn gen_expr_into(
        &mut self,
        expr: &Expr,
        dest: &Symb,
        scope: &mut Scope<'_>,
    ) -> Result<UnionType, CompileError> {
        match &expr.kind {
            ExprKind::Constant(v) => {
                self.emit(format!("MOVE {dest} {}", Symb::from_value(v)));
                Ok(UnionType::of_base(v.base_type()).with_constant(v.clone()))
            }
            ExprKind::Variable(name) => {
                if !scope.is_known(name) {
                    scope.declare(name);
                }
                let mut ty = self.ty_of(expr, scope);
                let src = scope.var(name);
                self.emit_undefined_guard(&src, &ty, scope)?;
                ty.is_undefined = false;
                self.emit(format!("MOVE {dest} {src}"));
                Ok(ty)
            }
            ExprKind::Call { name, args } => self.gen_call(name, args, Some(dest), scope),
            ExprKind::Unary { op, rhs } => self.gen_unary_into(*op, rhs, dest, scope),
            ExprKind::Binary { op, lhs, rhs } => {
                self.gen_binary_into(*op, lhs, rhs, dest, scope)
            }
        }
    }

    fn gen_binary_into(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        dest: &Symb,
        scope: &mut Scope<'_>,
    ) -> Result<UnionType, CompileError> {
        match op {
            BinOp::Assign => {
                let ExprKind::Variable(name) = &lhs.kind else {
                    return Err(CompileError::internal(
                        "assignment to non-variable survived validation",
                    ));
                };
                let ty = self.gen_assign(name, rhs, scope)?;
                self.emit(format!("MOVE {dest} {}", scope.var(name)));
                Ok(ty)
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul => self.emit_arith(op, lhs, rhs, dest, scope),
            BinOp::Div => {
                let a = self.gen_expr(lhs, scope)?;
                let b = self.gen_expr(rhs, scope)?;
                let ra = scope.acquire();
                let rb = scope.acquire();
                self.emit_float_cast(&a.symb, &a.ty, &ra, scope, CastMode::Strict)?;
                self.emit_float_cast(&b.symb, &b.ty, &rb, scope, CastMode::Strict)?;
                self.emit(format!("DIV {dest} {ra} {rb}"));
                release_var(scope, &rb)?;
                release_var(scope, &ra)?;
                self.release(scope, b)?;
                self.release(scope, a)?;
                Ok(UnionType::of_base(BaseType::Float))
            }
            BinOp::Concat => {
                let a = self.gen_expr(lhs, scope)?;
                let b = self.gen_expr(rhs, scope)?;
                let ra = scope.acquire();
                let rb = scope.acquire();
                self.emit_string_cast(&a.symb, &a.ty, &ra, scope)?;
                self.emit_string_cast(&b.symb, &b.ty, &rb, scope)?;
                self.emit(format!("CONCAT {dest} {ra} {rb}"));
                release_var(scope, &rb)?;
                release_var(scope, &ra)?;
                self.release(scope, b)?;
                self.release(scope, a)?;
                Ok(UnionType::of_base(BaseType::String))
            }
            BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq => {
                self.emit_relational(op, lhs, rhs, dest, scope)
            }
            BinOp::Eq | BinOp::Neq => self.emit_equality(op, lhs, rhs, dest, scope),
            BinOp::And | BinOp::Or => self.emit_logical(op, lhs, rhs, dest, scope),
        }
    }

    /// `+ - *`: cast both operands Float when either side is statically
    /// Float; both Int when neither side can be Float or String; otherwise
    /// branch at runtime on the operands' type tags.
    fn emit_arith(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        dest: &Symb,
        scope: &mut Scope<'_>,
    ) -> Result<UnionType, CompileError> {
        let opcode = match op {
            BinOp::Add => "ADD",
            BinOp::Sub => "SUB",
            _ => "MUL",
        };
        let a = self.gen_expr(lhs, scope)?;
        let b = self.gen_expr(rhs, scope)?;
        let lf = a.ty.single_base() == Some(BaseType::Float);
        let rf = b.ty.single_base() == Some(BaseType::Float);

        let result = if lf || rf {
            let ra = scope.acquire();
            let rb = scope.acquire();
            self.emit_float_cast(&a.symb, &a.ty, &ra, scope, CastMode::Strict)?;
            self.emit_float_cast(&b.symb, &b.ty, &rb, scope, CastMode::Strict)?;
            self.emit(format!("{opcode} {dest} {ra} {rb}"));
            release_var(scope, &rb)?;
            release_var(scope, &ra)?;
            UnionType::of_base(BaseType::Float)
        } else if !a.ty.is_float && !b.ty.is_float {
            // Neither side can be Float at runtime; the int casts absorb
            // bool, null and (strictly parsed) string operands.
            let ra = scope.acquire();
            let rb = scope.acquire();
            self.emit_int_cast(&a.symb, &a.ty, &ra, scope, CastMode::Strict)?;
            self.emit_int_cast(&b.symb, &b.ty, &rb, scope, CastMode::Strict)?;
            self.emit(format!("{opcode} {dest} {ra} {rb}"));
            release_var(scope, &rb)?;
            release_var(scope, &ra)?;
            if int_only(&a.ty) && int_only(&b.ty) {
                UnionType::of_base(BaseType::Int)
            } else {
                UnionType::of_base(BaseType::Int).union(&UnionType::of_base(BaseType::Float))
            }
        } else {
            // Either operand might be Float at runtime: pick the common
            // numeric type off the type tags, then cast both sides to it.
            let uid = self.label_uid();
            let ta = scope.acquire();
            let tb = scope.acquire();
            self.emit(format!("TYPE {ta} {}", a.symb));
            self.emit(format!("TYPE {tb} {}", b.symb));
            if a.ty.is_float {
                self.emit(format!("JUMPIFEQ arith{uid}_float {ta} string@float"));
            }
            if b.ty.is_float {
                self.emit(format!("JUMPIFEQ arith{uid}_float {tb} string@float"));
            }
            release_var(scope, &tb)?;
            release_var(scope, &ta)?;
            let ra = scope.acquire();
            let rb = scope.acquire();
            let a_nonfloat = without(&a.ty, &[BaseType::Float]);
            let b_nonfloat = without(&b.ty, &[BaseType::Float]);
            self.emit_int_cast(&a.symb, &a_nonfloat, &ra, scope, CastMode::Strict)?;
            self.emit_int_cast(&b.symb, &b_nonfloat, &rb, scope, CastMode::Strict)?;
            self.emit(format!("{opcode} {dest} {ra} {rb}"));
            self.emit(format!("JUMP arith{uid}_end"));
            self.emit(format!("LABEL arith{uid}_float"));
            self.emit_float_cast(&a.symb, &a.ty, &ra, scope, CastMode::Strict)?;
            self.emit_float_cast(&b.symb, &b.ty, &rb, scope, CastMode::Strict)?;
            self.emit(format!("{opcode} {dest} {ra} {rb}"));
            self.emit(format!("LABEL arith{uid}_end"));
            release_var(scope, &rb)?;
            release_var(scope, &ra)?;
            UnionType::of_base(BaseType::Int).union(&UnionType::of_base(BaseType::Float))
        };
        self.release(scope, b)?;
        self.release(scope, a)?;
        Ok(result)
    }

    /// Relational comparison: matching non-Null static types compare
    /// directly; mixed static types negotiate the common comparison type by
    /// the priority Null > String > Float > Int, at compile time when both
    /// tags are known, at runtime otherwise.
    fn emit_relational(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        dest: &Symb,
        scope: &mut Scope<'_>,
    ) -> Result<UnionType, CompileError> {
        let a = self.gen_expr(lhs, scope)?;
        let b = self.gen_expr(rhs, scope)?;
        match (a.ty.single_base(), b.ty.single_base()) {
            (Some(x), Some(y)) if x == y && x != BaseType::Null => {
                self.emit_compare(op, dest, &a.symb, &b.symb, scope)?;
            }
            (Some(x), Some(y)) => {
                let ra = scope.acquire();
                let rb = scope.acquire();
                if x == BaseType::Null || y == BaseType::Null {
                    self.emit_bool_cast(&a.symb, &a.ty, &ra, scope, false)?;
                    self.emit_bool_cast(&b.symb, &b.ty, &rb, scope, false)?;
                } else if x == BaseType::String || y == BaseType::String {
                    self.emit_string_cast(&a.symb, &a.ty, &ra, scope)?;
                    self.emit_string_cast(&b.symb, &b.ty, &rb, scope)?;
                } else if x == BaseType::Float || y == BaseType::Float {
                    self.emit_float_cast(&a.symb, &a.ty, &ra, scope, CastMode::Strict)?;
                    self.emit_float_cast(&b.symb, &b.ty, &rb, scope, CastMode::Strict)?;
                } else {
                    self.emit_int_cast(&a.symb, &a.ty, &ra, scope, CastMode::Strict)?;
                    self.emit_int_cast(&b.symb, &b.ty, &rb, scope, CastMode::Strict)?;
                }
                self.emit_compare(op, dest, &ra, &rb, scope)?;
                release_var(scope, &rb)?;
                release_var(scope, &ra)?;
            }
            _ => {
                self.emit_relational_dynamic(op, &a, &b, dest, scope)?;
            }
        }
        self.release(scope, b)?;
        self.release(scope, a)?;
        Ok(UnionType::of_base(BaseType::Bool))
    }

    fn emit_relational_dynamic(
        &mut self,
        op: BinOp,
        a: &Operand,
        b: &Operand,
        dest: &Symb,
        scope: &mut Scope<'_>,
    ) -> Result<(), CompileError> {
        let uid = self.label_uid();
        let ta = scope.acquire();
        let tb = scope.acquire();
        self.emit(format!("TYPE {ta} {}", a.symb));
        self.emit(format!("TYPE {tb} {}", b.symb));
        let may_nil = a.ty.is_null || b.ty.is_null;
        let may_str = a.ty.is_string || b.ty.is_string;
        let may_flt = a.ty.is_float || b.ty.is_float;
        if a.ty.is_null {
            self.emit(format!("JUMPIFEQ rel{uid}_nil {ta} string@nil"));
        }
        if b.ty.is_null {
            self.emit(format!("JUMPIFEQ rel{uid}_nil {tb} string@nil"));
        }
        if a.ty.is_string {
            self.emit(format!("JUMPIFEQ rel{uid}_str {ta} string@string"));
        }
        if b.ty.is_string {
            self.emit(format!("JUMPIFEQ rel{uid}_str {tb} string@string"));
        }
        if a.ty.is_float {
            self.emit(format!("JUMPIFEQ rel{uid}_flt {ta} string@float"));
        }
        if b.ty.is_float {
            self.emit(format!("JUMPIFEQ rel{uid}_flt {tb} string@float"));
        }
        release_var(scope, &tb)?;
        release_var(scope, &ta)?;

        let ra = scope.acquire();
        let rb = scope.acquire();
        // Fallthrough: neither side is nil/string/float here.
        let a_int = without(&a.ty, &[BaseType::Null, BaseType::String, BaseType::Float]);
        let b_int = without(&b.ty, &[BaseType::Null, BaseType::String, BaseType::Float]);
        self.emit_int_cast(&a.symb, &a_int, &ra, scope, CastMode::Strict)?;
        self.emit_int_cast(&b.symb, &b_int, &rb, scope, CastMode::Strict)?;
        self.emit_compare(op, dest, &ra, &rb, scope)?;
        self.emit(format!("JUMP rel{uid}_end"));
        if may_nil {
            self.emit(format!("LABEL rel{uid}_nil"));
            self.emit_bool_cast(&a.symb, &a.ty, &ra, scope, false)?;
            self.emit_bool_cast(&b.symb, &b.ty, &rb, scope, false)?;
            self.emit_compare(op, dest, &ra, &rb, scope)?;
            self.emit(format!("JUMP rel{uid}_end"));
        }
        if may_str {
            self.emit(format!("LABEL rel{uid}_str"));
            let a_nn = without(&a.ty, &[BaseType::Null]);
            let b_nn = without(&b.ty, &[BaseType::Null]);
            self.emit_string_cast(&a.symb, &a_nn, &ra, scope)?;
            self.emit_string_cast(&b.symb, &b_nn, &rb, scope)?;
            self.emit_compare(op, dest, &ra, &rb, scope)?;
            self.emit(format!("JUMP rel{uid}_end"));
        }
        if may_flt {
            self.emit(format!("LABEL rel{uid}_flt"));
            let a_num = without(&a.ty, &[BaseType::Null, BaseType::String]);
            let b_num = without(&b.ty, &[BaseType::Null, BaseType::String]);
            self.emit_float_cast(&a.symb, &a_num, &ra, scope, CastMode::Strict)?;
            self.emit_float_cast(&b.symb, &b_num, &rb, scope, CastMode::Strict)?;
            self.emit_compare(op, dest, &ra, &rb, scope)?;
        }
        self.emit(format!("LABEL rel{uid}_end"));
        release_var(scope, &rb)?;
        release_var(scope, &ra)?;
        Ok(())
    }

    fn emit_compare(
        &mut self,
        op: BinOp,
        dest: &Symb,
        x: &Symb,
        y: &Symb,
        scope: &mut Scope<'_>,
    ) -> Result<(), CompileError> {
        match op {
            BinOp::Lt => self.emit(format!("LT {dest} {x} {y}")),
            BinOp::Gt => self.emit(format!("GT {dest} {x} {y}")),
            BinOp::LtEq => {
                let t = scope.acquire();
                self.emit(format!("GT {t} {x} {y}"));
                self.emit(format!("NOT {dest} {t}"));
                release_var(scope, &t)?;
            }
            BinOp::GtEq => {
                let t = scope.acquire();
                self.emit(format!("LT {t} {x} {y}"));
                self.emit(format!("NOT {dest} {t}"));
                release_var(scope, &t)?;
            }
            other => {
                return Err(CompileError::internal(format!(
                    "emit_compare on non-relational operator {other:?}"
                )));
            }
        }
        Ok(())
    }

    /// Identity comparison. Fully known, provably incompatible static types
    /// skip the runtime comparison entirely (operands still evaluate for
    /// their effects); otherwise the type tags are compared first and
    /// mismatched tags yield false without touching the values.
    fn emit_equality(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        dest: &Symb,
        scope: &mut Scope<'_>,
    ) -> Result<UnionType, CompileError> {
        let a = self.gen_expr(lhs, scope)?;
        let b = self.gen_expr(rhs, scope)?;
        let negate = op == BinOp::Neq;
        match (a.ty.single_base(), b.ty.single_base()) {
            (Some(x), Some(y)) if x == y => {
                if x == BaseType::Null {
                    self.emit(format!("MOVE {dest} bool@{}", !negate));
                } else {
                    self.emit(format!("EQ {dest} {} {}", a.symb, b.symb));
                    if negate {
                        self.emit(format!("NOT {dest} {dest}"));
                    }
                }
            }
            (Some(_), Some(_)) => {
                self.emit(format!("MOVE {dest} bool@{negate}"));
            }
            _ => {
                let uid = self.label_uid();
                let ta = scope.acquire();
                let tb = scope.acquire();
                self.emit(format!("TYPE {ta} {}", a.symb));
                self.emit(format!("TYPE {tb} {}", b.symb));
                self.emit(format!("JUMPIFNEQ eq{uid}_diff {ta} {tb}"));
                self.emit(format!("EQ {dest} {} {}", a.symb, b.symb));
                self.emit(format!("JUMP eq{uid}_end"));
                self.emit(format!("LABEL eq{uid}_diff"));
                self.emit(format!("MOVE {dest} bool@false"));
                self.emit(format!("LABEL eq{uid}_end"));
                if negate {
                    self.emit(format!("NOT {dest} {dest}"));
                }
                release_var(scope, &tb)?;
                release_var(scope, &ta)?;
            }
        }
        self.release(scope, b)?;
        self.release(scope, a)?;
        Ok(UnionType::of_base(BaseType::Bool))
    }

    /// `&&`/`||`: the right operand is evaluated only behind a runtime
    /// check of the left operand's condition-cast value.
    fn emit_logical(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        dest: &Symb,
        scope: &mut Scope<'_>,
    ) -> Result<UnionType, CompileError> {
        let (kind, stop) = match op {
            BinOp::And => ("and", "false"),
            _ => ("or", "true"),
        };
        let uid = self.label_uid();
        let a = self.gen_expr(lhs, scope)?;
        self.emit_bool_cast(&a.symb, &a.ty, dest, scope, true)?;
        self.release(scope, a)?;
        self.emit(format!("JUMPIFEQ {kind}{uid}_end {dest} bool@{stop}"));
        let b = self.gen_expr(rhs, scope)?;
        self.emit_bool_cast(&b.symb, &b.ty, dest, scope, true)?;
        self.release(scope, b)?;
        self.emit(format!("LABEL {kind}{uid}_end"));
        Ok(UnionType::of_base(BaseType::Bool))
    }

    fn gen_unary_into(
        &mut self,
        op: UnOp,
        rhs: &Expr,
        dest: &Symb,
        scope: &mut Scope<'_>,
    ) -> Result<UnionType, CompileError> {
        match op {
            UnOp::Not => {
                let a = self.gen_expr(rhs, scope)?;
                self.emit_bool_cast(&a.symb, &a.ty, dest, scope, true)?;
                self.emit(format!("NOT {dest} {dest}"));
                self.release(scope, a)?;
                Ok(UnionType::of_base(BaseType::Bool))
            }
            UnOp::Neg => {
                let a = self.gen_expr(rhs, scope)?;
                let result = if a.ty.single_base() == Some(BaseType::Float) {
                    let ra = scope.acquire();
                    self.emit_float_cast(&a.symb, &a.ty, &ra, scope, CastMode::Strict)?;
                    self.emit(format!("SUB {dest} float@0.0 {ra}"));
                    release_var(scope, &ra)?;
                    UnionType::of_base(BaseType::Float)
                } else if !a.ty.is_float {
                    let ra = scope.acquire();
                    self.emit_int_cast(&a.symb, &a.ty, &ra, scope, CastMode::Strict)?;
                    self.emit(format!("SUB {dest} int@0 {ra}"));
                    release_var(scope, &ra)?;
                    UnionType::of_base(BaseType::Int)
                } else {
                    let uid = self.label_uid();
                    let tag = scope.acquire();
                    self.emit(format!("TYPE {tag} {}", a.symb));
                    self.emit(format!("JUMPIFEQ neg{uid}_float {tag} string@float"));
                    release_var(scope, &tag)?;
                    let ra = scope.acquire();
                    let nonfloat = without(&a.ty, &[BaseType::Float]);
                    self.emit_int_cast(&a.symb, &nonfloat, &ra, scope, CastMode::Strict)?;
                    self.emit(format!("SUB {dest} int@0 {ra}"));
                    self.emit(format!("JUMP neg{uid}_end"));
                    self.emit(format!("LABEL neg{uid}_float"));
                    self.emit_float_cast(&a.symb, &a.ty, &ra, scope, CastMode::Strict)?;
                    self.emit(format!("SUB {dest} float@0.0 {ra}"));
                    self.emit(format!("LABEL neg{uid}_end"));
                    release_var(scope, &ra)?;
                    UnionType::of_base(BaseType::Int)
                        .union(&UnionType::of_base(BaseType::Float))
                };
                self.release(scope, a)?;
                Ok(result)
            }
        }
    }

    /// Call lowering. Built-ins get bespoke sequences; other calls check
    /// each argument against its declared parameter type at runtime, open a
    /// fresh frame, bind, call, and read the callee's return slot.
    pub(crate) fn gen_call(
        &mut self,
        name: &str,
        args: &[Expr],
        dest: Option<&Symb>,
        scope: &mut Scope<'_>,
    ) -> Result<UnionType, CompileError> {
        let table: &'p FunctionTable = self.table;
        let func: &'p Function = table
            .get(name)
            .ok_or_else(|| CompileError::internal(format!("call to unknown function '{name}'")))?;
        if func.is_builtin() {
            return self.gen_builtin(func, args, dest, scope);
        }

        // Arguments evaluate left to right into saved (caller-frame)
        // symbols; a later argument may clobber what an earlier one read.
        let mut arg_ops = Vec::new();
        for arg in args {
            let slot = scope.acquire();
            let ty = self.gen_expr_into(arg, &slot, scope)?;
            arg_ops.push((slot, ty));
        }
        for (param, (slot, ty)) in func.params.iter().zip(&arg_ops) {
            self.emit_type_guard(
                slot,
                ty,
                param.ty,
                &format!("{name}: bad argument type for ${}", param.name),
                scope,
            )?;
        }
        self.emit("CREATEFRAME");
        for (param, (slot, _)) in func.params.iter().zip(&arg_ops) {
            self.emit(format!("DEFVAR TF@{}", param.name));
            self.emit(format!("MOVE TF@{} {slot}", param.name));
        }
        for (slot, _) in arg_ops.iter().rev() {
            release_var(scope, slot)?;
        }
        self.emit(format!("CALL ${name}"));
        if let Some(dest) = dest {
            if func.ret.base == BaseType::Void {
                self.emit(format!("MOVE {dest} nil@nil"));
            } else {
                self.emit(format!("MOVE {dest} TF@%retval"));
            }
        }
        if func.ret.base == BaseType::Void {
            Ok(UnionType::of_base(BaseType::Null))
        } else {
            // The lattice treats non-built-in results as fully dynamic.
            Ok(UnionType::dynamic())
        }
    }
}

pub(crate) fn release_var(scope: &mut Scope<'_>, symb: &Symb) -> Result<(), CompileError> {
    if let Symb::Var(_, name) = symb {
        scope.release_name(name)?;
    }
    Ok(())
}
