//! Exit-code classification of compile-time errors, per the observable
//! contract: 1 lexical, 2 syntax/structural, 3 function resolution,
//! 6 return arity, 99 internal.

mod common;
use common::compile_err;

#[test]
fn lexical_error_is_1() {
    assert_eq!(compile_err("$x = @;").exit_code(), 1);
}

#[test]
fn syntax_error_is_2() {
    assert_eq!(compile_err("$x = ;").exit_code(), 2);
    assert_eq!(compile_err("if ($x { }").exit_code(), 2);
    assert_eq!(compile_err("$x = 1").exit_code(), 2);
}

#[test]
fn invalid_assignment_target_is_2() {
    assert_eq!(compile_err("1 = 2;").exit_code(), 2);
    assert_eq!(compile_err("readi() = 2;").exit_code(), 2);
}

#[test]
fn undefined_function_is_3_and_never_reaches_codegen() {
    let err = compile_err("foo();");
    assert_eq!(err.exit_code(), 3);
    assert!(err.to_string().contains("undefined function"));
}

#[test]
fn arity_mismatch_is_3() {
    assert_eq!(compile_err("function f(int $a): void {} f();").exit_code(), 3);
    assert_eq!(compile_err("chr(1, 2);").exit_code(), 3);
}

#[test]
fn function_redefinition_is_3() {
    assert_eq!(
        compile_err("function f(): void {} function f(): void {}").exit_code(),
        3
    );
    // Built-ins cannot be shadowed either.
    assert_eq!(compile_err("function write(): void {}").exit_code(), 3);
}

#[test]
fn return_arity_mismatches_are_6() {
    assert_eq!(compile_err("function f(): void { return 1; }").exit_code(), 6);
    assert_eq!(compile_err("function f(): int { return; }").exit_code(), 6);
}

#[test]
fn top_level_return_is_2() {
    assert_eq!(compile_err("return 1;").exit_code(), 2);
}

#[test]
fn well_formed_program_compiles() {
    let result = erisc::compile_source(
        "function fact(int $n): int {\n\
         \tif ($n < 2) { return 1; }\n\
         \treturn $n * fact($n - 1);\n\
         }\n\
         $n = readi();\n\
         if ($n === null) { write(\"no input\"); } else { write(fact($n)); }\n",
    );
    assert!(result.is_ok(), "{result:?}");
}
