//! Property-based checks for the cast/fold layer and fixpoint termination.

use proptest::prelude::*;

use erisc::parser::ast::{BaseType, BinOp, Value};
use erisc::typeck::fold::{const_cast, fold_binary, CastMode, CastOutcome};

fn cast(v: &Value, target: BaseType) -> Value {
    match const_cast(v, target, CastMode::Strict) {
        CastOutcome::Cast(out) => out,
        other => panic!("cast failed: {other:?}"),
    }
}

proptest! {
    /// Int -> Float -> Int reproduces the original for values the float
    /// mantissa holds exactly.
    #[test]
    fn int_float_round_trip(n in -(1i64 << 52)..(1i64 << 52)) {
        let f = cast(&Value::Int(n), BaseType::Float);
        prop_assert_eq!(cast(&f, BaseType::Int), Value::Int(n));
    }

    /// Int -> String -> Int is lossless.
    #[test]
    fn int_string_round_trip(n in any::<i64>()) {
        let s = cast(&Value::Int(n), BaseType::String);
        prop_assert_eq!(cast(&s, BaseType::Int), Value::Int(n));
    }

    /// Bool -> String -> Bool is lossless.
    #[test]
    fn bool_string_round_trip(b in any::<bool>()) {
        let s = cast(&Value::Bool(b), BaseType::String);
        prop_assert_eq!(cast(&s, BaseType::Bool), Value::Bool(b));
    }

    /// String -> Int truncates fractional text in lenient mode and keeps
    /// the integer prefix.
    #[test]
    fn string_int_truncates_fraction(n in -1000i64..1000, frac in 0u32..100) {
        let s = Value::Str(format!("{n}.{frac:02}"));
        let out = const_cast(&s, BaseType::Int, CastMode::Lenient);
        prop_assert_eq!(out, CastOutcome::Cast(Value::Int(n)));
    }

    /// Strict integer parse accepts exactly what it produced.
    #[test]
    fn strict_parse_rejects_trailing_garbage(n in any::<i64>(), suffix in "[a-z]{1,3}") {
        let bad = Value::Str(format!("{n}{suffix}"));
        prop_assert_eq!(const_cast(&bad, BaseType::Int, CastMode::Strict), CastOutcome::Fail);
    }

    /// Folding constant integer arithmetic agrees with wrapping machine
    /// arithmetic.
    #[test]
    fn fold_matches_machine_arithmetic(a in any::<i64>(), b in any::<i64>()) {
        prop_assert_eq!(
            fold_binary(BinOp::Add, &Value::Int(a), &Value::Int(b)),
            Ok(Some(Value::Int(a.wrapping_add(b))))
        );
        prop_assert_eq!(
            fold_binary(BinOp::Mul, &Value::Int(a), &Value::Int(b)),
            Ok(Some(Value::Int(a.wrapping_mul(b))))
        );
    }

    /// Equality folding is reflexive on identical constants and never
    /// true across distinct concrete types.
    #[test]
    fn equality_fold_identity(n in any::<i64>()) {
        prop_assert_eq!(
            fold_binary(BinOp::Eq, &Value::Int(n), &Value::Int(n)),
            Ok(Some(Value::Bool(true)))
        );
        prop_assert_eq!(
            fold_binary(BinOp::Eq, &Value::Int(n), &Value::Str(n.to_string())),
            Ok(Some(Value::Bool(false)))
        );
    }

    /// The optimizer reaches a fixpoint on arbitrarily nested constant
    /// arithmetic and leaves a single folded write.
    #[test]
    fn fixpoint_terminates_on_random_constant_trees(
        values in prop::collection::vec(1i64..100, 1..20),
        ops in prop::collection::vec(0u8..3, 0..19),
    ) {
        let mut src = String::from("write(");
        src.push_str(&values[0].to_string());
        for (v, op) in values[1..].iter().zip(&ops) {
            let op = match *op { 0 => "+", 1 => "-", _ => "*" };
            src.push_str(&format!(" {op} {v}"));
        }
        src.push_str(");");
        let program = erisc::check_source(&src).expect("pipeline failed");
        let json = program.body.serialize();
        prop_assert!(!json.contains("Binary"), "unfolded arithmetic left in {src}");
    }

    /// Compiled constant programs never need runtime type dispatch.
    #[test]
    fn constant_programs_emit_no_guards(n in any::<i64>(), m in 1i64..1000) {
        let src = format!("write({n} + {m}, {n} < {m});");
        let code = erisc::compile_source(&src).expect("compile failed");
        prop_assert!(!code.contains("TYPE "));
    }
}
