//! Compile-time evaluation of constant expressions, and the coercion rules
//! shared between the folder and the generated runtime guards.
//!
//! The cast rules mirror the dynamic coercion semantics of the generated
//! code exactly: whatever the folder computes here is what the emitted
//! runtime conversion would have produced for the same inputs.

use crate::parser::ast::{BaseType, BinOp, UnOp, Value};

/// `Strict` is the language-level cast (malformed numeric strings abort the
/// program with exit code 7); `Lenient` is the built-in-conversion variant
/// that keeps the parsed prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastMode {
    Strict,
    Lenient,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CastOutcome {
    Cast(Value),
    /// Source or target outside the scalar set; the caller keeps the input.
    NoOp,
    /// Strict parse of a malformed numeric string; the expression is
    /// guaranteed to abort with exit code 7 at runtime.
    Fail,
}

/// The exit code an always-failing constant expression is guaranteed to
/// produce; the optimizer hoists the enclosing statement into `Exit{code}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldFail {
    pub code: i64,
}

pub const EXIT_BAD_NUMERIC_STRING: i64 = 7;

/// Convert a constant between concrete scalar types.
pub fn const_cast(v: &Value, target: BaseType, mode: CastMode) -> CastOutcome {
    match target {
        BaseType::Int => CastOutcome::Cast(match v {
            Value::Int(n) => Value::Int(*n),
            Value::Float(f) => Value::Int(*f as i64),
            Value::Str(s) => match parse_int_prefix(s, mode) {
                Some(n) => Value::Int(n),
                None => return CastOutcome::Fail,
            },
            Value::Bool(b) => Value::Int(i64::from(*b)),
            Value::Null => Value::Int(0),
        }),
        BaseType::Float => CastOutcome::Cast(match v {
            Value::Int(n) => Value::Float(*n as f64),
            Value::Float(f) => Value::Float(*f),
            Value::Str(s) => match parse_float_prefix(s, mode) {
                Some(f) => Value::Float(f),
                None => return CastOutcome::Fail,
            },
            Value::Bool(b) => Value::Float(if *b { 1.0 } else { 0.0 }),
            Value::Null => Value::Float(0.0),
        }),
        BaseType::String => CastOutcome::Cast(match v {
            Value::Int(n) => Value::Str(n.to_string()),
            Value::Float(f) => Value::Str(format_float(*f)),
            Value::Str(s) => Value::Str(s.clone()),
            Value::Bool(b) => Value::Str(if *b { "1".to_string() } else { String::new() }),
            Value::Null => Value::Str(String::new()),
        }),
        BaseType::Bool => CastOutcome::Cast(match v {
            Value::Int(n) => Value::Bool(*n != 0),
            Value::Float(f) => Value::Bool(*f != 0.0),
            Value::Str(s) => Value::Bool(!s.is_empty()),
            Value::Bool(b) => Value::Bool(*b),
            Value::Null => Value::Bool(false),
        }),
        BaseType::Void | BaseType::Null | BaseType::Unknown => CastOutcome::NoOp,
    }
}

/// The condition-context truth cast. Unlike the general bool cast, the
/// string `"0"` is falsy here.
pub fn const_cast_condition(v: &Value) -> bool {
    match v {
        Value::Int(n) => *n != 0,
        Value::Float(f) => *f != 0.0,
        Value::Str(s) => !s.is_empty() && s != "0",
        Value::Bool(b) => *b,
        Value::Null => false,
    }
}

/// Minimal decimal rendering for floats: `3` rather than `3.0`, shortest
/// round-trip digits otherwise.
pub fn format_float(f: f64) -> String {
    format!("{f}")
}

/// C-`atoll`-like integer prefix parse: optional whitespace, optional sign,
/// digits. Strict mode requires at least one digit and full consumption;
/// lenient mode keeps the prefix (zero when there is none).
fn parse_int_prefix(s: &str, mode: CastMode) -> Option<i64> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t' || bytes[i] == b'\n') {
        i += 1;
    }
    let mut negative = false;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        negative = bytes[i] == b'-';
        i += 1;
    }
    let mut value: i64 = 0;
    let mut digits = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        value = value.wrapping_mul(10).wrapping_add(i64::from(bytes[i] - b'0'));
        digits += 1;
        i += 1;
    }
    let value = if negative { value.wrapping_neg() } else { value };
    match mode {
        CastMode::Strict => {
            if digits == 0 || i != bytes.len() {
                None
            } else {
                Some(value)
            }
        }
        CastMode::Lenient => Some(if digits == 0 { 0 } else { value }),
    }
}

/// Float prefix parse: whitespace, sign, digits, optional fraction, optional
/// signed exponent. Same strict/lenient duality as the integer parse.
fn parse_float_prefix(s: &str, mode: CastMode) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t' || bytes[i] == b'\n') {
        i += 1;
    }
    let start = i;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let mut mantissa_digits = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        mantissa_digits += 1;
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            mantissa_digits += 1;
            i += 1;
        }
    }
    if mantissa_digits == 0 {
        return match mode {
            CastMode::Strict => None,
            CastMode::Lenient => Some(0.0),
        };
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        // An exponent marker without digits is not part of the number.
        if j > exp_start {
            i = j;
        }
    }
    let parsed: f64 = s[start..i].parse().unwrap_or(0.0);
    match mode {
        CastMode::Strict => {
            if i != bytes.len() {
                None
            } else {
                Some(parsed)
            }
        }
        CastMode::Lenient => Some(parsed),
    }
}

/// Fold a binary operator over two constants. `Ok(None)` means "do not
/// fold" (divide by zero, or an operator outside the foldable set);
/// `Err` reports a guaranteed runtime abort.
pub fn fold_binary(op: BinOp, l: &Value, r: &Value) -> Result<Option<Value>, FoldFail> {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul => fold_arithmetic(op, l, r).map(Some),
        BinOp::Div => fold_divide(l, r),
        BinOp::Concat => {
            let ls = cast_to_string(l);
            let rs = cast_to_string(r);
            Ok(Some(Value::Str(ls + &rs)))
        }
        BinOp::Eq | BinOp::Neq => Ok(Some(fold_equality(op, l, r))),
        BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq => fold_relational(op, l, r).map(Some),
        BinOp::And | BinOp::Or | BinOp::Assign => Ok(None),
    }
}

pub fn fold_unary(op: UnOp, v: &Value) -> Option<Value> {
    match op {
        UnOp::Neg => match v {
            Value::Int(n) => Some(Value::Int(n.wrapping_neg())),
            Value::Float(f) => Some(Value::Float(-f)),
            _ => None,
        },
        UnOp::Not => Some(Value::Bool(!const_cast_condition(v))),
    }
}

fn strict_int(v: &Value) -> Result<i64, FoldFail> {
    match const_cast(v, BaseType::Int, CastMode::Strict) {
        CastOutcome::Cast(Value::Int(n)) => Ok(n),
        _ => Err(FoldFail { code: EXIT_BAD_NUMERIC_STRING }),
    }
}

fn strict_float(v: &Value) -> Result<f64, FoldFail> {
    match const_cast(v, BaseType::Float, CastMode::Strict) {
        CastOutcome::Cast(Value::Float(f)) => Ok(f),
        _ => Err(FoldFail { code: EXIT_BAD_NUMERIC_STRING }),
    }
}

fn cast_to_string(v: &Value) -> String {
    match const_cast(v, BaseType::String, CastMode::Strict) {
        CastOutcome::Cast(Value::Str(s)) => s,
        _ => String::new(),
    }
}

/// `+ - *` negotiate Float when either side is Float, Int otherwise —
/// the same decision the generated runtime branch makes on type tags.
fn fold_arithmetic(op: BinOp, l: &Value, r: &Value) -> Result<Value, FoldFail> {
    if matches!(l, Value::Float(_)) || matches!(r, Value::Float(_)) {
        let lf = strict_float(l)?;
        let rf = strict_float(r)?;
        Ok(Value::Float(match op {
            BinOp::Add => lf + rf,
            BinOp::Sub => lf - rf,
            _ => lf * rf,
        }))
    } else {
        let li = strict_int(l)?;
        let ri = strict_int(r)?;
        Ok(Value::Int(match op {
            BinOp::Add => li.wrapping_add(ri),
            BinOp::Sub => li.wrapping_sub(ri),
            _ => li.wrapping_mul(ri),
        }))
    }
}

fn fold_divide(l: &Value, r: &Value) -> Result<Option<Value>, FoldFail> {
    let lf = strict_float(l)?;
    let rf = strict_float(r)?;
    if rf == 0.0 {
        // Caller must not fold; the runtime owns division-by-zero.
        return Ok(None);
    }
    Ok(Some(Value::Float(lf / rf)))
}

/// Identity comparison: mismatched concrete types are never equal, with
/// Null≡Null the one exception.
fn fold_equality(op: BinOp, l: &Value, r: &Value) -> Value {
    let equal = if l.base_type() == r.base_type() {
        match (l, r) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            _ => false,
        }
    } else {
        false
    };
    Value::Bool(if op == BinOp::Eq { equal } else { !equal })
}

/// Mixed-type ordering follows the cast priority Null > String > Float >
/// Int; this ordering changes observable results and must not be reshuffled.
fn fold_relational(op: BinOp, l: &Value, r: &Value) -> Result<Value, FoldFail> {
    use std::cmp::Ordering;
    let ordering = if matches!(l, Value::Null) || matches!(r, Value::Null) {
        let lb = const_cast_condition_general(l);
        let rb = const_cast_condition_general(r);
        lb.cmp(&rb)
    } else if matches!(l, Value::Str(_)) || matches!(r, Value::Str(_)) {
        cast_to_string(l).as_bytes().cmp(cast_to_string(r).as_bytes())
    } else if matches!(l, Value::Float(_)) || matches!(r, Value::Float(_)) {
        let lf = strict_float(l)?;
        let rf = strict_float(r)?;
        lf.partial_cmp(&rf).unwrap_or(Ordering::Equal)
    } else {
        let li = strict_int(l)?;
        let ri = strict_int(r)?;
        li.cmp(&ri)
    };
    Ok(Value::Bool(match op {
        BinOp::Lt => ordering == Ordering::Less,
        BinOp::Gt => ordering == Ordering::Greater,
        BinOp::LtEq => ordering != Ordering::Greater,
        _ => ordering != Ordering::Less,
    }))
}

/// General (non-condition) bool cast used by Null-involved comparisons.
fn const_cast_condition_general(v: &Value) -> bool {
    match const_cast(v, BaseType::Bool, CastMode::Strict) {
        CastOutcome::Cast(Value::Bool(b)) => b,
        _ => false,
    }
}
