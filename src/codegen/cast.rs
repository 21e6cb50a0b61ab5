//! Runtime coercion synthesis. Each cast has a static fast path used when
//! inference pins the operand to one concrete type, and a `TYPE`-dispatch
//! path branching per possible type in the order Bool, Null, Int, Float,
//! String (a possible undefined value is checked first and exits 5).
//! The same shape repeats for the bool, int, float and string casts; the
//! per-type conversion bodies are where they differ.

use crate::diagnostics::CompileError;
use crate::parser::ast::BaseType;
use crate::typeck::fold::CastMode;
use crate::typeck::UnionType;

use super::emit::Symb;
use super::runtime::RuntimeRoutine;
use super::{type_tag, Codegen, Scope};

impl<'p> Codegen<'p> {
    /// Exit 5 if the value is still uninitialized at runtime. `TYPE` yields
    /// the empty string for those.
    pub(crate) fn emit_undefined_guard(
        &mut self,
        src: &Symb,
        ty: &UnionType,
        scope: &mut Scope<'_>,
    ) -> Result<(), CompileError> {
        if !ty.is_undefined {
            return Ok(());
        }
        let tag = scope.acquire();
        let uid = self.label_uid();
        self.emit(format!("TYPE {tag} {src}"));
        self.emit(format!("JUMPIFNEQ def{uid}_ok {tag} string@"));
        self.emit("DPRINT string@undefined\\032variable");
        self.emit("EXIT int@5");
        self.emit(format!("LABEL def{uid}_ok"));
        if let Symb::Var(_, name) = &tag {
            scope.release_name(name)?;
        }
        Ok(())
    }

    pub(crate) fn emit_bool_cast(
        &mut self,
        src: &Symb,
        ty: &UnionType,
        dest: &Symb,
        scope: &mut Scope<'_>,
        condition: bool,
    ) -> Result<(), CompileError> {
        if let Some(base) = ty.single_base() {
            return self.emit_bool_from(base, src, dest, scope, condition);
        }
        let (tag, uid, bases) = self.begin_dispatch("bcast", src, ty, scope)?;
        for base in &bases {
            self.emit(format!("LABEL bcast{uid}_{}", type_tag(*base)));
            self.emit_bool_from(*base, src, dest, scope, condition)?;
            self.emit(format!("JUMP bcast{uid}_end"));
        }
        self.end_dispatch("bcast", uid, tag, scope)
    }

    pub(crate) fn emit_int_cast(
        &mut self,
        src: &Symb,
        ty: &UnionType,
        dest: &Symb,
        scope: &mut Scope<'_>,
        mode: CastMode,
    ) -> Result<(), CompileError> {
        if let Some(base) = ty.single_base() {
            return self.emit_int_from(base, src, dest, mode);
        }
        let (tag, uid, bases) = self.begin_dispatch("icast", src, ty, scope)?;
        for base in &bases {
            self.emit(format!("LABEL icast{uid}_{}", type_tag(*base)));
            self.emit_int_from(*base, src, dest, mode)?;
            self.emit(format!("JUMP icast{uid}_end"));
        }
        self.end_dispatch("icast", uid, tag, scope)
    }

    pub(crate) fn emit_float_cast(
        &mut self,
        src: &Symb,
        ty: &UnionType,
        dest: &Symb,
        scope: &mut Scope<'_>,
        mode: CastMode,
    ) -> Result<(), CompileError> {
        if let Some(base) = ty.single_base() {
            return self.emit_float_from(base, src, dest, mode);
        }
        let (tag, uid, bases) = self.begin_dispatch("fcast", src, ty, scope)?;
        for base in &bases {
            self.emit(format!("LABEL fcast{uid}_{}", type_tag(*base)));
            self.emit_float_from(*base, src, dest, mode)?;
            self.emit(format!("JUMP fcast{uid}_end"));
        }
        self.end_dispatch("fcast", uid, tag, scope)
    }

    pub(crate) fn emit_string_cast(
        &mut self,
        src: &Symb,
        ty: &UnionType,
        dest: &Symb,
        scope: &mut Scope<'_>,
    ) -> Result<(), CompileError> {
        if let Some(base) = ty.single_base() {
            return self.emit_string_from(base, src, dest, scope);
        }
        let (tag, uid, bases) = self.begin_dispatch("scast", src, ty, scope)?;
        for base in &bases {
            self.emit(format!("LABEL scast{uid}_{}", type_tag(*base)));
            self.emit_string_from(*base, src, dest, scope)?;
            self.emit(format!("JUMP scast{uid}_end"));
        }
        self.end_dispatch("scast", uid, tag, scope)
    }

    /// Shared dispatch head: undefined guard, `TYPE`, one jump per possible
    /// concrete type, and an unreachable-fallthrough backstop.
    fn begin_dispatch(
        &mut self,
        kind: &str,
        src: &Symb,
        ty: &UnionType,
        scope: &mut Scope<'_>,
    ) -> Result<(Symb, u32, Vec<BaseType>), CompileError> {
        self.emit_undefined_guard(src, ty, scope)?;
        let tag = scope.acquire();
        let uid = self.label_uid();
        self.emit(format!("TYPE {tag} {src}"));
        let bases = ty.possible_bases();
        for base in &bases {
            self.emit(format!("JUMPIFEQ {kind}{uid}_{} {tag} string@{}", type_tag(*base), type_tag(*base)));
        }
        // A runtime type outside the inferred union means the lattice is
        // wrong, which is a compiler bug.
        self.emit("EXIT int@99");
        Ok((tag, uid, bases))
    }

    fn end_dispatch(
        &mut self,
        kind: &str,
        uid: u32,
        tag: Symb,
        scope: &mut Scope<'_>,
    ) -> Result<(), CompileError> {
        self.emit(format!("LABEL {kind}{uid}_end"));
        if let Symb::Var(_, name) = &tag {
            scope.release_name(name)?;
        }
        Ok(())
    }

    // ===== per-type conversion bodies =====

    fn emit_bool_from(
        &mut self,
        base: BaseType,
        src: &Symb,
        dest: &Symb,
        scope: &mut Scope<'_>,
        condition: bool,
    ) -> Result<(), CompileError> {
        match base {
            BaseType::Bool => self.emit(format!("MOVE {dest} {src}")),
            BaseType::Null => self.emit(format!("MOVE {dest} bool@false")),
            BaseType::Int => {
                let t = scope.acquire();
                self.emit(format!("EQ {t} {src} int@0"));
                self.emit(format!("NOT {dest} {t}"));
                release_symb(scope, t)?;
            }
            BaseType::Float => {
                let t = scope.acquire();
                self.emit(format!("EQ {t} {src} float@0.0"));
                self.emit(format!("NOT {dest} {t}"));
                release_symb(scope, t)?;
            }
            BaseType::String if condition => {
                // Condition truth: empty and "0" are both falsy.
                let t1 = scope.acquire();
                let t2 = scope.acquire();
                self.emit(format!("EQ {t1} {src} string@"));
                self.emit(format!("EQ {t2} {src} string@0"));
                self.emit(format!("OR {t1} {t1} {t2}"));
                self.emit(format!("NOT {dest} {t1}"));
                release_symb(scope, t2)?;
                release_symb(scope, t1)?;
            }
            BaseType::String => {
                let t = scope.acquire();
                self.emit(format!("EQ {t} {src} string@"));
                self.emit(format!("NOT {dest} {t}"));
                release_symb(scope, t)?;
            }
            other => {
                return Err(CompileError::internal(format!(
                    "bool cast from unsupported type {other:?}"
                )));
            }
        }
        Ok(())
    }

    fn emit_int_from(
        &mut self,
        base: BaseType,
        src: &Symb,
        dest: &Symb,
        mode: CastMode,
    ) -> Result<(), CompileError> {
        match base {
            BaseType::Int => self.emit(format!("MOVE {dest} {src}")),
            BaseType::Float => self.emit(format!("FLOAT2INT {dest} {src}")),
            BaseType::Null => self.emit(format!("MOVE {dest} int@0")),
            BaseType::Bool => {
                let uid = self.label_uid();
                self.emit(format!("MOVE {dest} int@0"));
                self.emit(format!("JUMPIFEQ b2i{uid}_done {src} bool@false"));
                self.emit(format!("MOVE {dest} int@1"));
                self.emit(format!("LABEL b2i{uid}_done"));
            }
            BaseType::String => {
                let routine = match mode {
                    CastMode::Strict => RuntimeRoutine::Str2IntStrict,
                    CastMode::Lenient => RuntimeRoutine::Str2IntLenient,
                };
                let label = self.request_runtime(routine);
                self.emit(format!("PUSHS {src}"));
                self.emit(format!("CALL {label}"));
                self.emit(format!("POPS {dest}"));
            }
            other => {
                return Err(CompileError::internal(format!(
                    "int cast from unsupported type {other:?}"
                )));
            }
        }
        Ok(())
    }

    fn emit_float_from(
        &mut self,
        base: BaseType,
        src: &Symb,
        dest: &Symb,
        mode: CastMode,
    ) -> Result<(), CompileError> {
        match base {
            BaseType::Float => self.emit(format!("MOVE {dest} {src}")),
            BaseType::Int => self.emit(format!("INT2FLOAT {dest} {src}")),
            BaseType::Null => self.emit(format!("MOVE {dest} float@0.0")),
            BaseType::Bool => {
                let uid = self.label_uid();
                self.emit(format!("MOVE {dest} float@0.0"));
                self.emit(format!("JUMPIFEQ b2f{uid}_done {src} bool@false"));
                self.emit(format!("MOVE {dest} float@1.0"));
                self.emit(format!("LABEL b2f{uid}_done"));
            }
            BaseType::String => {
                let routine = match mode {
                    CastMode::Strict => RuntimeRoutine::Str2FloatStrict,
                    CastMode::Lenient => RuntimeRoutine::Str2FloatLenient,
                };
                let label = self.request_runtime(routine);
                self.emit(format!("PUSHS {src}"));
                self.emit(format!("CALL {label}"));
                self.emit(format!("POPS {dest}"));
            }
            other => {
                return Err(CompileError::internal(format!(
                    "float cast from unsupported type {other:?}"
                )));
            }
        }
        Ok(())
    }

    fn emit_string_from(
        &mut self,
        base: BaseType,
        src: &Symb,
        dest: &Symb,
        _scope: &mut Scope<'_>,
    ) -> Result<(), CompileError> {
        match base {
            BaseType::String => self.emit(format!("MOVE {dest} {src}")),
            BaseType::Null => self.emit(format!("MOVE {dest} string@")),
            BaseType::Bool => {
                let uid = self.label_uid();
                self.emit(format!("MOVE {dest} string@"));
                self.emit(format!("JUMPIFEQ b2s{uid}_done {src} bool@false"));
                self.emit(format!("MOVE {dest} string@1"));
                self.emit(format!("LABEL b2s{uid}_done"));
            }
            BaseType::Int => {
                let label = self.request_runtime(RuntimeRoutine::Int2Str);
                self.emit(format!("PUSHS {src}"));
                self.emit(format!("CALL {label}"));
                self.emit(format!("POPS {dest}"));
            }
            BaseType::Float => {
                let label = self.request_runtime(RuntimeRoutine::Float2Str);
                self.emit(format!("PUSHS {src}"));
                self.emit(format!("CALL {label}"));
                self.emit(format!("POPS {dest}"));
            }
            other => {
                return Err(CompileError::internal(format!(
                    "string cast from unsupported type {other:?}"
                )));
            }
        }
        Ok(())
    }
}

fn release_symb(scope: &mut Scope<'_>, symb: Symb) -> Result<(), CompileError> {
    if let Symb::Var(_, name) = &symb {
        scope.release_name(name)?;
    }
    Ok(())
}
