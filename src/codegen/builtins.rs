//! Bespoke instruction sequences for the built-in catalogue: `write`,
//! the `read*` family, the `*val` conversion family, and the string
//! primitives `strlen`, `substring`, `ord` and `chr`.

use crate::diagnostics::CompileError;
use crate::parser::ast::{BaseType, Expr, Function};
use crate::typeck::fold::CastMode;
use crate::typeck::UnionType;

use super::emit::Symb;
use super::expr::release_var;
use super::{Codegen, Scope};

impl<'p> Codegen<'p> {
    pub(crate) fn gen_builtin(
        &mut self,
        func: &Function,
        args: &[Expr],
        dest: Option<&Symb>,
        scope: &mut Scope<'_>,
    ) -> Result<UnionType, CompileError> {
        let ret = UnionType::from_type(func.ret);
        match func.name.as_str() {
            "write" => {
                for arg in args {
                    let op = self.gen_expr(arg, scope)?;
                    self.emit(format!("WRITE {}", op.symb));
                    self.release(scope, op)?;
                }
                if let Some(dest) = dest {
                    self.emit(format!("MOVE {dest} nil@nil"));
                }
                Ok(UnionType::of_base(BaseType::Null))
            }
            "reads" | "readi" | "readf" => {
                let word = match func.name.as_str() {
                    "reads" => "string",
                    "readi" => "int",
                    _ => "float",
                };
                match dest {
                    Some(dest) => self.emit(format!("READ {dest} {word}")),
                    None => {
                        // Still consumes the input line.
                        let t = scope.acquire();
                        self.emit(format!("READ {t} {word}"));
                        release_var(scope, &t)?;
                    }
                }
                Ok(ret)
            }
            "intval" | "floatval" | "boolval" | "strval" => {
                let op = self.gen_expr(&args[0], scope)?;
                let target = match dest {
                    Some(d) => d.clone(),
                    None => scope.acquire(),
                };
                match func.name.as_str() {
                    "intval" => {
                        self.emit_int_cast(&op.symb, &op.ty, &target, scope, CastMode::Lenient)?
                    }
                    "floatval" => {
                        self.emit_float_cast(&op.symb, &op.ty, &target, scope, CastMode::Lenient)?
                    }
                    "boolval" => self.emit_bool_cast(&op.symb, &op.ty, &target, scope, false)?,
                    _ => self.emit_string_cast(&op.symb, &op.ty, &target, scope)?,
                }
                if dest.is_none() {
                    release_var(scope, &target)?;
                }
                self.release(scope, op)?;
                Ok(ret)
            }
            "strlen" => {
                let op = self.gen_expr(&args[0], scope)?;
                self.guard_arg(func, 0, &op.symb, &op.ty, scope)?;
                if let Some(dest) = dest {
                    self.emit(format!("STRLEN {dest} {}", op.symb));
                }
                self.release(scope, op)?;
                Ok(ret)
            }
            "substring" => self.gen_substring(func, args, dest, scope),
            "ord" => {
                let op = self.gen_expr(&args[0], scope)?;
                self.guard_arg(func, 0, &op.symb, &op.ty, scope)?;
                let target = match dest {
                    Some(d) => d.clone(),
                    None => scope.acquire(),
                };
                let len = scope.acquire();
                let uid = self.label_uid();
                self.emit(format!("STRLEN {len} {}", op.symb));
                self.emit(format!("MOVE {target} int@0"));
                self.emit(format!("JUMPIFEQ ord{uid}_end {len} int@0"));
                self.emit(format!("STRI2INT {target} {} int@0", op.symb));
                self.emit(format!("LABEL ord{uid}_end"));
                release_var(scope, &len)?;
                if dest.is_none() {
                    release_var(scope, &target)?;
                }
                self.release(scope, op)?;
                Ok(ret)
            }
            "chr" => {
                let op = self.gen_expr(&args[0], scope)?;
                self.guard_arg(func, 0, &op.symb, &op.ty, scope)?;
                if let Some(dest) = dest {
                    self.emit(format!("INT2CHAR {dest} {}", op.symb));
                }
                self.release(scope, op)?;
                Ok(ret)
            }
            other => Err(CompileError::internal(format!("unknown builtin '{other}'"))),
        }
    }

    fn guard_arg(
        &mut self,
        func: &Function,
        index: usize,
        symb: &Symb,
        ty: &UnionType,
        scope: &mut Scope<'_>,
    ) -> Result<(), CompileError> {
        let param = &func.params[index];
        self.emit_type_guard(
            symb,
            ty,
            param.ty,
            &format!("{}: bad argument type for ${}", func.name, param.name),
            scope,
        )
    }

    /// `substring(s, i, j)`: out-of-range index combinations yield null;
    /// otherwise characters `[i, j)` are copied one at a time. The bounds
    /// verdict is combined on the operand stack.
    fn gen_substring(
        &mut self,
        func: &Function,
        args: &[Expr],
        dest: Option<&Symb>,
        scope: &mut Scope<'_>,
    ) -> Result<UnionType, CompileError> {
        let s = self.gen_expr(&args[0], scope)?;
        self.guard_arg(func, 0, &s.symb, &s.ty, scope)?;
        let i = self.gen_expr(&args[1], scope)?;
        self.guard_arg(func, 1, &i.symb, &i.ty, scope)?;
        let j = self.gen_expr(&args[2], scope)?;
        self.guard_arg(func, 2, &j.symb, &j.ty, scope)?;

        let target = match dest {
            Some(d) => d.clone(),
            None => scope.acquire(),
        };
        let uid = self.label_uid();
        let len = scope.acquire();
        self.emit(format!("STRLEN {len} {}", s.symb));
        // bad = i<0 || j<0 || i>j || i>=len || j>len
        self.emit(format!("PUSHS {}", i.symb));
        self.emit("PUSHS int@0");
        self.emit("LTS");
        self.emit(format!("PUSHS {}", j.symb));
        self.emit("PUSHS int@0");
        self.emit("LTS");
        self.emit("ORS");
        self.emit(format!("PUSHS {}", i.symb));
        self.emit(format!("PUSHS {}", j.symb));
        self.emit("GTS");
        self.emit("ORS");
        self.emit(format!("PUSHS {}", i.symb));
        self.emit(format!("PUSHS {len}"));
        self.emit("LTS");
        self.emit("NOTS");
        self.emit("ORS");
        self.emit(format!("PUSHS {}", j.symb));
        self.emit(format!("PUSHS {len}"));
        self.emit("GTS");
        self.emit("ORS");
        let bad = scope.acquire();
        self.emit(format!("POPS {bad}"));
        self.emit(format!("JUMPIFEQ sub{uid}_ok {bad} bool@false"));
        self.emit(format!("MOVE {target} nil@nil"));
        self.emit(format!("JUMP sub{uid}_end"));
        self.emit(format!("LABEL sub{uid}_ok"));
        self.emit(format!("MOVE {target} string@"));
        let idx = scope.acquire();
        let ch = scope.acquire();
        self.emit(format!("MOVE {idx} {}", i.symb));
        self.emit(format!("LABEL sub{uid}_loop"));
        self.emit(format!("LT {bad} {idx} {}", j.symb));
        self.emit(format!("JUMPIFEQ sub{uid}_done {bad} bool@false"));
        self.emit(format!("GETCHAR {ch} {} {idx}", s.symb));
        self.emit(format!("CONCAT {target} {target} {ch}"));
        self.emit(format!("ADD {idx} {idx} int@1"));
        self.emit(format!("JUMP sub{uid}_loop"));
        self.emit(format!("LABEL sub{uid}_done"));
        self.emit(format!("LABEL sub{uid}_end"));
        release_var(scope, &ch)?;
        release_var(scope, &idx)?;
        release_var(scope, &bad)?;
        release_var(scope, &len)?;
        if dest.is_none() {
            release_var(scope, &target)?;
        }
        self.release(scope, j)?;
        self.release(scope, i)?;
        self.release(scope, s)?;
        Ok(UnionType::from_type(func.ret))
    }
}
