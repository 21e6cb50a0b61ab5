//! Constant folding observed end-to-end: folded programs carry their
//! results as immediates, and the folder agrees with the coercion rules
//! the generated code would apply.

mod common;
use common::{compile, optimized};

use erisc::parser::ast::{ExprKind, Stmt, Value};

fn written_constants(program: &erisc::parser::ast::Program) -> Vec<Value> {
    fn walk(s: &Stmt, out: &mut Vec<Value>) {
        match s {
            Stmt::Expr(e) => {
                if let ExprKind::Call { name, args } = &e.kind {
                    if name == "write" {
                        for a in args {
                            if let ExprKind::Constant(v) = &a.kind {
                                out.push(v.clone());
                            }
                        }
                    }
                }
            }
            Stmt::List(items) => items.iter().for_each(|s| walk(s, out)),
            Stmt::If { then_body, else_body, .. } => {
                walk(then_body, out);
                walk(else_body, out);
            }
            Stmt::While { body, .. } => walk(body, out),
            _ => {}
        }
    }
    let mut out = Vec::new();
    walk(&program.body, &mut out);
    out
}

#[test]
fn arithmetic_folds_to_immediates() {
    let p = optimized("write(1 + 2 * 3 - 4);");
    assert_eq!(written_constants(&p), vec![Value::Int(3)]);
    let code = compile("write(1 + 2 * 3 - 4);");
    assert!(code.contains("WRITE int@3"));
}

#[test]
fn mixed_numeric_folds_to_float() {
    let p = optimized("write(1 + 0.5);");
    assert_eq!(written_constants(&p), vec![Value::Float(1.5)]);
}

#[test]
fn numeric_string_folds_through_strict_parse() {
    let p = optimized("write(1 + \"2\");");
    assert_eq!(written_constants(&p), vec![Value::Int(3)]);
    let p = optimized("write(1.5 + \"2\");");
    assert_eq!(written_constants(&p), vec![Value::Float(3.5)]);
}

#[test]
fn concat_folds() {
    let p = optimized("write(\"a\" . 1 . 2.0);");
    assert_eq!(written_constants(&p), vec![Value::Str("a12".into())]);
}

#[test]
fn divide_folds_to_float_and_skips_zero() {
    let p = optimized("write(7 / 2);");
    assert_eq!(written_constants(&p), vec![Value::Float(3.5)]);
    // Division by a constant zero stays in the tree for the runtime.
    let p = optimized("write(1 / 0);");
    assert_eq!(written_constants(&p), vec![]);
}

#[test]
fn equality_folds_by_identity() {
    let p = optimized("write(1 === 1); write(1 === 1.0); write(null === null); write(1 !== \"1\");");
    assert_eq!(
        written_constants(&p),
        vec![Value::Bool(true), Value::Bool(false), Value::Bool(true), Value::Bool(true)]
    );
}

#[test]
fn relational_fold_uses_cast_priority() {
    // String-involved comparison is lexicographic on string casts.
    let p = optimized("write(10 < \"2\"); write(10 < 2.0); write(null < 5);");
    assert_eq!(
        written_constants(&p),
        vec![Value::Bool(true), Value::Bool(false), Value::Bool(true)]
    );
}

#[test]
fn dead_code_after_return_is_trimmed() {
    let p = optimized("function f(): int { write(1); return 2; write(3); write(4); }");
    let f = p.table.get("f").unwrap();
    let Some(Stmt::List(items)) = &f.body else { panic!() };
    assert_eq!(items.len(), 2);
    assert!(matches!(items[1], Stmt::Return { .. }));
}

#[test]
fn list_without_terminator_is_untouched() {
    let p = optimized("function f(): void { write(1); write(2); }");
    let f = p.table.get("f").unwrap();
    let Some(Stmt::List(items)) = &f.body else { panic!() };
    assert_eq!(items.len(), 2);
}

#[test]
fn folded_strict_failure_becomes_exit_7() {
    // Both operands constant: the compiler's own cast evaluator reproduces
    // the exit the generated code would have produced.
    let code = compile("write(1); write(1 + \"2abc\");");
    let write_pos = code.find("WRITE int@1").unwrap();
    let exit_pos = code.find("EXIT int@7").unwrap();
    assert!(write_pos < exit_pos);
}
