//! Optimizer behavior observed through the public pipeline: error
//! hoisting, speculative loop unrolling, and fixpoint convergence.

mod common;
use common::optimized;

use erisc::parser::ast::Stmt;

fn contains_exit(s: &Stmt, code: i64) -> bool {
    match s {
        Stmt::Exit { code: c } => *c == code,
        Stmt::List(items) => items.iter().any(|s| contains_exit(s, code)),
        Stmt::If { then_body, else_body, .. } => {
            contains_exit(then_body, code) || contains_exit(else_body, code)
        }
        Stmt::While { body, .. } => contains_exit(body, code),
        _ => false,
    }
}

#[test]
fn undefined_variable_statement_becomes_exit_5() {
    let p = optimized("write($never);");
    let Stmt::List(items) = &p.body else { panic!() };
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Stmt::Exit { code: 5 }));
}

#[test]
fn undefined_variable_in_live_branch_is_hoisted_in_place() {
    let p = optimized("if (readi()) { write($nope); } else { write(1); }");
    let Stmt::List(items) = &p.body else { panic!() };
    let Stmt::If { then_body, else_body, .. } = &items[0] else { panic!() };
    assert!(contains_exit(then_body, 5));
    assert!(!contains_exit(else_body, 5));
}

#[test]
fn undefined_variable_behind_constant_false_guard_disappears() {
    let p = optimized("if (false) { write($nope); } write(1);");
    assert!(!contains_exit(&p.body, 5));
}

#[test]
fn hoisting_recurses_into_function_bodies() {
    let p = optimized("function f(): void { write($ghost); } f();");
    let f = p.table.get("f").unwrap();
    assert!(contains_exit(f.body.as_ref().unwrap(), 5));
}

#[test]
fn guaranteed_bad_numeric_string_becomes_exit_7() {
    let p = optimized("$x = \"12abc\" + 1; write($x);");
    assert!(contains_exit(&p.body, 7));
}

#[test]
fn while_is_unrolled_three_levels_with_residual_loop() {
    let p = optimized("$i = readi(); while ($i) { $i = $i - 1; }");
    // The unrolled shape survives optimization because the condition is
    // dynamic: three nested ifs, the innermost holding the real loop.
    fn nest_depth(s: &Stmt) -> (u32, bool) {
        match s {
            Stmt::If { then_body, .. } => {
                let Stmt::List(inner) = then_body.as_ref() else { return (1, false) };
                let Some(last) = inner.last() else { return (1, false) };
                let (d, has_loop) = nest_depth(last);
                (d + 1, has_loop)
            }
            Stmt::While { .. } => (0, true),
            _ => (0, false),
        }
    }
    let Stmt::List(items) = &p.body else { panic!() };
    let unrolled = items
        .iter()
        .map(nest_depth)
        .find(|(d, has_loop)| *d > 0 && *has_loop)
        .expect("no unrolled loop found");
    assert_eq!(unrolled, (3, true));
}

#[test]
fn constant_false_loop_is_erased() {
    let p = optimized("while (false) { write(1); } write(0);");
    fn has_loop(s: &Stmt) -> bool {
        match s {
            Stmt::While { .. } => true,
            Stmt::List(items) => items.iter().any(has_loop),
            Stmt::If { then_body, else_body, .. } => has_loop(then_body) || has_loop(else_body),
            _ => false,
        }
    }
    assert!(!has_loop(&p.body));
}

#[test]
fn deeply_nested_constant_expressions_reach_fixpoint() {
    let mut src = String::from("write(");
    src.push_str(&"(2 * ".repeat(20));
    src.push('1');
    src.push_str(&")".repeat(20));
    src.push_str(");");
    let p = optimized(&src);
    let Stmt::List(items) = &p.body else { panic!() };
    assert_eq!(items.len(), 1);
}
