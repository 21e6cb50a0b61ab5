//! Emitted-once runtime routines for the coercions that need target-level
//! loops: string→numeric parsing and numeric→string formatting.
//!
//! Call sites push the input on the operand stack, `CALL` the routine and
//! pop the result. The routines keep their working state in dedicated
//! `GF@%rt_*` slots declared with the program's global block; the VM is
//! single-threaded and the routines never recurse into each other except
//! float formatting reusing the integer formatter.

/// The catalogue of emittable routines. Only routines a call site actually
/// requested are written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RuntimeRoutine {
    Str2IntStrict,
    Str2IntLenient,
    Str2FloatStrict,
    Str2FloatLenient,
    Int2Str,
    Float2Str,
}

impl RuntimeRoutine {
    pub fn label(self) -> &'static str {
        match self {
            RuntimeRoutine::Str2IntStrict => "%rt_str2int_strict",
            RuntimeRoutine::Str2IntLenient => "%rt_str2int_lenient",
            RuntimeRoutine::Str2FloatStrict => "%rt_str2float_strict",
            RuntimeRoutine::Str2FloatLenient => "%rt_str2float_lenient",
            RuntimeRoutine::Int2Str => "%rt_int2str",
            RuntimeRoutine::Float2Str => "%rt_float2str",
        }
    }

    /// Routines this one calls into; emitting must pull them in too.
    pub fn dependencies(self) -> &'static [RuntimeRoutine] {
        match self {
            RuntimeRoutine::Float2Str => &[RuntimeRoutine::Int2Str],
            _ => &[],
        }
    }
}

/// Scratch globals shared by the routines; declared once in the program's
/// global DEFVAR block whenever any routine is emitted.
pub const SCRATCH_VARS: &[&str] = &[
    "%rt_s", "%rt_i", "%rt_len", "%rt_c", "%rt_b", "%rt_acc", "%rt_digits", "%rt_neg",
    "%rt_n", "%rt_d", "%rt_t", "%rt_cnt", "%rt_ch", "%rt_out",
    "%rt_f", "%rt_facc", "%rt_fscale", "%rt_tf", "%rt_fneg", "%rt_frac", "%rt_fout",
    "%rt_exp", "%rt_edig", "%rt_eneg", "%rt_j",
];

pub fn routine_text(routine: RuntimeRoutine) -> String {
    match routine {
        RuntimeRoutine::Str2IntStrict => str2int_text("sis", true),
        RuntimeRoutine::Str2IntLenient => str2int_text("lis", false),
        RuntimeRoutine::Str2FloatStrict => str2float_text("sfs", true),
        RuntimeRoutine::Str2FloatLenient => str2float_text("lfs", false),
        RuntimeRoutine::Int2Str => int2str_text(),
        RuntimeRoutine::Float2Str => float2str_text(),
    }
}

/// Shared prologue of the numeric parses: pop the string, skip leading
/// whitespace, consume an optional sign into `%rt_neg`.
fn parse_prologue(p: &str) -> String {
    format!(
        "\
POPS GF@%rt_s
MOVE GF@%rt_i int@0
STRLEN GF@%rt_len GF@%rt_s
MOVE GF@%rt_digits int@0
MOVE GF@%rt_neg bool@false
LABEL %rt_{p}_ws
LT GF@%rt_b GF@%rt_i GF@%rt_len
JUMPIFEQ %rt_{p}_sign GF@%rt_b bool@false
STRI2INT GF@%rt_c GF@%rt_s GF@%rt_i
JUMPIFEQ %rt_{p}_wsadv GF@%rt_c int@32
JUMPIFEQ %rt_{p}_wsadv GF@%rt_c int@9
JUMPIFEQ %rt_{p}_wsadv GF@%rt_c int@10
JUMP %rt_{p}_sign
LABEL %rt_{p}_wsadv
ADD GF@%rt_i GF@%rt_i int@1
JUMP %rt_{p}_ws
LABEL %rt_{p}_sign
LT GF@%rt_b GF@%rt_i GF@%rt_len
JUMPIFEQ %rt_{p}_digits GF@%rt_b bool@false
STRI2INT GF@%rt_c GF@%rt_s GF@%rt_i
JUMPIFNEQ %rt_{p}_plus GF@%rt_c int@45
MOVE GF@%rt_neg bool@true
ADD GF@%rt_i GF@%rt_i int@1
JUMP %rt_{p}_digits
LABEL %rt_{p}_plus
JUMPIFNEQ %rt_{p}_digits GF@%rt_c int@43
ADD GF@%rt_i GF@%rt_i int@1
LABEL %rt_{p}_digits
"
    )
}

/// Guard: jump to `target` unless position `%rt_i` holds an ASCII digit;
/// leaves the digit value in `%rt_c` on fallthrough.
fn digit_guard(p: &str, target: &str) -> String {
    format!(
        "\
LT GF@%rt_b GF@%rt_i GF@%rt_len
JUMPIFEQ %rt_{p}_{target} GF@%rt_b bool@false
STRI2INT GF@%rt_c GF@%rt_s GF@%rt_i
LT GF@%rt_b GF@%rt_c int@48
JUMPIFEQ %rt_{p}_{target} GF@%rt_b bool@true
GT GF@%rt_b GF@%rt_c int@57
JUMPIFEQ %rt_{p}_{target} GF@%rt_b bool@true
SUB GF@%rt_c GF@%rt_c int@48
"
    )
}

fn strict_check(p: &str) -> String {
    format!(
        "\
JUMPIFEQ %rt_{p}_bad GF@%rt_digits int@0
JUMPIFNEQ %rt_{p}_bad GF@%rt_i GF@%rt_len
JUMP %rt_{p}_apply
LABEL %rt_{p}_bad
DPRINT string@invalid\\032numeric\\032string
EXIT int@7
LABEL %rt_{p}_apply
"
    )
}

fn str2int_text(p: &str, strict: bool) -> String {
    let label = if strict { "%rt_str2int_strict" } else { "%rt_str2int_lenient" };
    let mut text = format!("LABEL {label}\n");
    text += &parse_prologue(p);
    text += "MOVE GF@%rt_acc int@0\n";
    text += &format!("LABEL %rt_{p}_loop\n");
    text += &digit_guard(p, "check");
    text += &format!(
        "\
MUL GF@%rt_acc GF@%rt_acc int@10
ADD GF@%rt_acc GF@%rt_acc GF@%rt_c
ADD GF@%rt_digits GF@%rt_digits int@1
ADD GF@%rt_i GF@%rt_i int@1
JUMP %rt_{p}_loop
LABEL %rt_{p}_check
"
    );
    if strict {
        text += &strict_check(p);
    } else {
        text += &format!("LABEL %rt_{p}_apply\n");
    }
    text += &format!(
        "\
JUMPIFEQ %rt_{p}_push GF@%rt_neg bool@false
SUB GF@%rt_acc int@0 GF@%rt_acc
LABEL %rt_{p}_push
PUSHS GF@%rt_acc
RETURN
"
    );
    text
}

fn str2float_text(p: &str, strict: bool) -> String {
    let label = if strict { "%rt_str2float_strict" } else { "%rt_str2float_lenient" };
    let mut text = format!("LABEL {label}\n");
    text += &parse_prologue(p);
    text += "MOVE GF@%rt_facc float@0.0\n";
    // Integer part of the mantissa.
    text += &format!("LABEL %rt_{p}_loop\n");
    text += &digit_guard(p, "dot");
    text += &format!(
        "\
INT2FLOAT GF@%rt_tf GF@%rt_c
MUL GF@%rt_facc GF@%rt_facc float@10.0
ADD GF@%rt_facc GF@%rt_facc GF@%rt_tf
ADD GF@%rt_digits GF@%rt_digits int@1
ADD GF@%rt_i GF@%rt_i int@1
JUMP %rt_{p}_loop
LABEL %rt_{p}_dot
"
    );
    // Optional fraction.
    text += &format!(
        "\
LT GF@%rt_b GF@%rt_i GF@%rt_len
JUMPIFEQ %rt_{p}_exp GF@%rt_b bool@false
STRI2INT GF@%rt_c GF@%rt_s GF@%rt_i
JUMPIFNEQ %rt_{p}_exp GF@%rt_c int@46
ADD GF@%rt_i GF@%rt_i int@1
MOVE GF@%rt_fscale float@1.0
LABEL %rt_{p}_frloop\n"
    );
    text += &digit_guard(p, "exp");
    text += &format!(
        "\
DIV GF@%rt_fscale GF@%rt_fscale float@10.0
INT2FLOAT GF@%rt_tf GF@%rt_c
MUL GF@%rt_tf GF@%rt_tf GF@%rt_fscale
ADD GF@%rt_facc GF@%rt_facc GF@%rt_tf
ADD GF@%rt_digits GF@%rt_digits int@1
ADD GF@%rt_i GF@%rt_i int@1
JUMP %rt_{p}_frloop
LABEL %rt_{p}_exp
"
    );
    // Optional exponent; the marker is consumed only if digits follow.
    text += &format!(
        "\
JUMPIFEQ %rt_{p}_done GF@%rt_digits int@0
LT GF@%rt_b GF@%rt_i GF@%rt_len
JUMPIFEQ %rt_{p}_done GF@%rt_b bool@false
STRI2INT GF@%rt_c GF@%rt_s GF@%rt_i
JUMPIFEQ %rt_{p}_emark GF@%rt_c int@101
JUMPIFEQ %rt_{p}_emark GF@%rt_c int@69
JUMP %rt_{p}_done
LABEL %rt_{p}_emark
MOVE GF@%rt_j GF@%rt_i
ADD GF@%rt_i GF@%rt_i int@1
MOVE GF@%rt_eneg bool@false
LT GF@%rt_b GF@%rt_i GF@%rt_len
JUMPIFEQ %rt_{p}_eloop GF@%rt_b bool@false
STRI2INT GF@%rt_c GF@%rt_s GF@%rt_i
JUMPIFNEQ %rt_{p}_eplus GF@%rt_c int@45
MOVE GF@%rt_eneg bool@true
ADD GF@%rt_i GF@%rt_i int@1
JUMP %rt_{p}_eloop
LABEL %rt_{p}_eplus
JUMPIFNEQ %rt_{p}_eloop GF@%rt_c int@43
ADD GF@%rt_i GF@%rt_i int@1
LABEL %rt_{p}_eloop
MOVE GF@%rt_exp int@0
MOVE GF@%rt_edig int@0
LABEL %rt_{p}_edloop\n"
    );
    text += &digit_guard(p, "eapply");
    text += &format!(
        "\
MUL GF@%rt_exp GF@%rt_exp int@10
ADD GF@%rt_exp GF@%rt_exp GF@%rt_c
ADD GF@%rt_edig GF@%rt_edig int@1
ADD GF@%rt_i GF@%rt_i int@1
JUMP %rt_{p}_edloop
LABEL %rt_{p}_eapply
JUMPIFNEQ %rt_{p}_escale GF@%rt_edig int@0
MOVE GF@%rt_i GF@%rt_j
JUMP %rt_{p}_done
LABEL %rt_{p}_escale
JUMPIFEQ %rt_{p}_done GF@%rt_exp int@0
JUMPIFEQ %rt_{p}_ediv GF@%rt_eneg bool@true
MUL GF@%rt_facc GF@%rt_facc float@10.0
JUMP %rt_{p}_enext
LABEL %rt_{p}_ediv
DIV GF@%rt_facc GF@%rt_facc float@10.0
LABEL %rt_{p}_enext
SUB GF@%rt_exp GF@%rt_exp int@1
JUMP %rt_{p}_escale
LABEL %rt_{p}_done
"
    );
    if strict {
        text += &strict_check(p);
    } else {
        text += &format!("LABEL %rt_{p}_apply\n");
    }
    text += &format!(
        "\
JUMPIFEQ %rt_{p}_push GF@%rt_neg bool@false
SUB GF@%rt_facc float@0.0 GF@%rt_facc
LABEL %rt_{p}_push
PUSHS GF@%rt_facc
RETURN
"
    );
    text
}

/// Mod-10/div-10 digit extraction: digits go through the operand stack and
/// come back out most-significant first, concatenated with the ASCII
/// offset; the sign is prepended at the end.
fn int2str_text() -> String {
    "\
LABEL %rt_int2str
POPS GF@%rt_n
MOVE GF@%rt_out string@
LT GF@%rt_neg GF@%rt_n int@0
JUMPIFEQ %rt_is_pos GF@%rt_neg bool@false
SUB GF@%rt_n int@0 GF@%rt_n
LABEL %rt_is_pos
MOVE GF@%rt_cnt int@0
LABEL %rt_is_loop
IDIV GF@%rt_d GF@%rt_n int@10
MUL GF@%rt_t GF@%rt_d int@10
SUB GF@%rt_t GF@%rt_n GF@%rt_t
PUSHS GF@%rt_t
ADD GF@%rt_cnt GF@%rt_cnt int@1
MOVE GF@%rt_n GF@%rt_d
JUMPIFNEQ %rt_is_loop GF@%rt_n int@0
LABEL %rt_is_build
JUMPIFEQ %rt_is_sign GF@%rt_cnt int@0
POPS GF@%rt_t
ADD GF@%rt_t GF@%rt_t int@48
INT2CHAR GF@%rt_ch GF@%rt_t
CONCAT GF@%rt_out GF@%rt_out GF@%rt_ch
SUB GF@%rt_cnt GF@%rt_cnt int@1
JUMP %rt_is_build
LABEL %rt_is_sign
JUMPIFEQ %rt_is_done GF@%rt_neg bool@false
CONCAT GF@%rt_out string@- GF@%rt_out
LABEL %rt_is_done
PUSHS GF@%rt_out
RETURN
"
    .to_string()
}

/// Fixed 4-decimal-digit policy: scale by 10000, truncate, format the
/// integer part through `%rt_int2str`, then reinsert the point.
fn float2str_text() -> String {
    "\
LABEL %rt_float2str
POPS GF@%rt_f
LT GF@%rt_fneg GF@%rt_f float@0.0
JUMPIFEQ %rt_fs_pos GF@%rt_fneg bool@false
SUB GF@%rt_f float@0.0 GF@%rt_f
LABEL %rt_fs_pos
MUL GF@%rt_f GF@%rt_f float@10000.0
FLOAT2INT GF@%rt_frac GF@%rt_f
IDIV GF@%rt_d GF@%rt_frac int@10000
MUL GF@%rt_t GF@%rt_d int@10000
SUB GF@%rt_frac GF@%rt_frac GF@%rt_t
PUSHS GF@%rt_d
CALL %rt_int2str
POPS GF@%rt_fout
CONCAT GF@%rt_fout GF@%rt_fout string@.
MOVE GF@%rt_cnt int@4
LABEL %rt_fs_digits
JUMPIFEQ %rt_fs_emit GF@%rt_cnt int@0
IDIV GF@%rt_d GF@%rt_frac int@10
MUL GF@%rt_t GF@%rt_d int@10
SUB GF@%rt_t GF@%rt_frac GF@%rt_t
PUSHS GF@%rt_t
MOVE GF@%rt_frac GF@%rt_d
SUB GF@%rt_cnt GF@%rt_cnt int@1
JUMP %rt_fs_digits
LABEL %rt_fs_emit
MOVE GF@%rt_cnt int@4
LABEL %rt_fs_build
JUMPIFEQ %rt_fs_sign GF@%rt_cnt int@0
POPS GF@%rt_t
ADD GF@%rt_t GF@%rt_t int@48
INT2CHAR GF@%rt_ch GF@%rt_t
CONCAT GF@%rt_fout GF@%rt_fout GF@%rt_ch
SUB GF@%rt_cnt GF@%rt_cnt int@1
JUMP %rt_fs_build
LABEL %rt_fs_sign
JUMPIFEQ %rt_fs_done GF@%rt_fneg bool@false
CONCAT GF@%rt_fout string@- GF@%rt_fout
LABEL %rt_fs_done
PUSHS GF@%rt_fout
RETURN
"
    .to_string()
}
