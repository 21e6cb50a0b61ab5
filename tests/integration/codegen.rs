//! Generated-text assertions: stream structure, declaration blocks,
//! runtime guard synthesis, calling convention and the built-in sequences.

mod common;
use common::{compile, jump_targets, labels};

#[test]
fn stream_starts_with_header_and_ends_top_level_with_exit_0() {
    let code = compile("write(1);");
    assert!(code.starts_with(".ErisCode\n"));
    assert!(code.contains("EXIT int@0"));
}

#[test]
fn assigned_variables_get_one_global_defvar() {
    let code = compile("$x = readi(); $x = $x; write($x);");
    let defvars: Vec<&str> = code.lines().filter(|l| *l == "DEFVAR GF@x").collect();
    assert_eq!(defvars.len(), 1);
}

#[test]
fn defvar_block_precedes_body() {
    let code = compile("$x = readi(); write($x);");
    let decl = code.find("DEFVAR GF@x").unwrap();
    let read = code.find("READ GF@x").unwrap();
    assert!(decl < read);
}

#[test]
fn folded_constants_need_no_guards() {
    let code = compile("write(1 + 2);");
    assert!(code.contains("WRITE int@3"));
    assert!(!code.contains("TYPE "));
}

#[test]
fn ambiguous_operand_gets_type_dispatch() {
    // readi() yields int-or-null, so the addition needs an int-cast
    // dispatch with an int and a nil branch.
    let code = compile("$x = readi(); write($x + 1);");
    assert!(code.contains("TYPE "));
    assert!(code.lines().any(|l| l.starts_with("LABEL icast") && l.ends_with("_int")));
    assert!(code.lines().any(|l| l.starts_with("LABEL icast") && l.ends_with("_nil")));
    // Lattice-violation backstop in the dispatch fallthrough.
    assert!(code.contains("EXIT int@99"));
}

#[test]
fn string_operand_in_arithmetic_uses_strict_parse() {
    let code = compile("$s = reads(); write($s + 1);");
    assert!(code.contains("CALL %rt_str2int_strict"));
    assert!(code.contains("LABEL %rt_str2int_strict"));
    assert!(code.contains("EXIT int@7"));
}

#[test]
fn intval_uses_lenient_parse() {
    let code = compile("$s = reads(); write(intval($s));");
    assert!(code.contains("CALL %rt_str2int_lenient"));
    assert!(code.contains("LABEL %rt_str2int_lenient"));
}

#[test]
fn concat_emits_string_casts_and_concat() {
    let code = compile("$x = readi(); write(\"n=\" . $x);");
    assert!(code.contains("CONCAT "));
    assert!(code.contains("CALL %rt_int2str"));
}

#[test]
fn division_always_goes_through_float() {
    let code = compile("$x = readi(); write($x / 2);");
    assert!(code.contains("DIV "));
    assert!(code.lines().any(|l| l.contains("INT2FLOAT")));
}

#[test]
fn undefined_union_guard_exits_5() {
    // $x is assigned only conditionally; reading it emits an
    // initialization guard.
    let code = compile("if (readi()) { $x = 1; } else {} write($x);");
    assert!(code.contains("EXIT int@5"));
    assert!(code.lines().any(|l| l.starts_with("JUMPIFNEQ def")));
}

#[test]
fn void_function_gets_implicit_return() {
    let code = compile("function f(): void { write(1); } f();");
    let section = code.split("LABEL $f").nth(1).unwrap();
    assert!(section.contains("POPFRAME"));
    assert!(section.contains("RETURN"));
    assert!(!section.contains("DEFVAR LF@%retval"));
}

#[test]
fn non_void_function_without_return_aborts_4() {
    let code = compile("function f(): int { write(1); } write(f());");
    let section = code.split("LABEL $f").nth(1).unwrap();
    assert!(section.contains("DEFVAR LF@%retval"));
    assert!(section.contains("EXIT int@4"));
    assert!(section.contains("DPRINT"));
}

#[test]
fn call_convention_frames_and_return_slot() {
    let code = compile(
        "function add(int $a, int $b): int { return $a + $b; } write(add(1, 2));",
    );
    assert!(code.contains("CREATEFRAME"));
    assert!(code.contains("DEFVAR TF@a"));
    assert!(code.contains("DEFVAR TF@b"));
    assert!(code.contains("CALL $add"));
    assert!(code.contains("TF@%retval"));
    assert!(code.contains("PUSHFRAME"));
}

#[test]
fn dynamic_argument_gets_runtime_param_guard() {
    let code = compile("function f(int $a): void {} $x = readi(); f($x);");
    assert!(code.lines().any(|l| l.starts_with("JUMPIFEQ guard")));
    assert!(code.contains("EXIT int@4"));
}

#[test]
fn statically_typed_argument_skips_param_guard() {
    let code = compile("function f(int $a): void {} f(1);");
    assert!(!code.lines().any(|l| l.starts_with("JUMPIFEQ guard")));
}

#[test]
fn equality_of_incompatible_known_types_skips_comparison() {
    let code = compile(
        "function f(int $a, string $b): void { write($a === $b); } f(1, \"x\");",
    );
    let section = code.split("LABEL $f").nth(1).unwrap();
    assert!(section.contains("bool@false"));
    assert!(!section.lines().any(|l| l.starts_with("EQ ")));
}

#[test]
fn logical_and_short_circuits() {
    let code = compile("$x = readi(); $y = readi(); write($x && $y);");
    assert!(code.lines().any(|l| l.starts_with("JUMPIFEQ and") && l.ends_with("bool@false")));
}

#[test]
fn logical_or_short_circuits() {
    let code = compile("$x = readi(); $y = readi(); write($x || $y);");
    assert!(code.lines().any(|l| l.starts_with("JUMPIFEQ or") && l.ends_with("bool@true")));
}

#[test]
fn substring_bounds_use_stack_ops() {
    let code = compile("$s = reads(); write(substring($s, 0, 2));");
    for op in ["LTS", "GTS", "ORS", "NOTS", "GETCHAR", "POPS"] {
        assert!(code.contains(op), "missing {op}");
    }
}

#[test]
fn read_builtins_map_to_read_instructions() {
    let code = compile("$a = readi(); $b = readf(); $c = reads(); write($a, $b, $c);");
    assert!(code.contains("READ GF@a int"));
    assert!(code.contains("READ GF@b float"));
    assert!(code.contains("READ GF@c string"));
}

#[test]
fn write_emits_one_write_per_argument() {
    let code = compile("write(1, 2, 3);");
    let count = code.lines().filter(|l| l.starts_with("WRITE ")).count();
    assert_eq!(count, 3);
}

#[test]
fn string_immediates_are_escaped() {
    let code = compile("write(\"a b#c\\\\d\");");
    assert!(code.contains("WRITE string@a\\032b\\035c\\092d"));
}

#[test]
fn labels_are_unique_and_jumps_resolve() {
    let code = compile(
        "function f(int $a): int { if ($a < 10) { return $a; } return f($a - 1); }\n\
         $x = readi();\n\
         while ($x) { $x = $x - 1; write(substring(\"abc\", 0, $x)); }\n\
         write(f(3), 1.5 . \"s\", -$x, !$x);",
    );
    let labels = labels(&code);
    let mut seen = std::collections::HashSet::new();
    for label in &labels {
        assert!(seen.insert(*label), "duplicate label {label}");
    }
    for target in jump_targets(&code) {
        assert!(seen.contains(target), "jump to undefined label {target}");
    }
}

#[test]
fn temporaries_are_pooled_per_scope() {
    let code = compile("$x = readi(); write($x + 1, $x + 2, $x + 3);");
    // Pool reuse keeps the temp count flat across the three sibling
    // expressions; they release in between.
    let temp_decls = code.lines().filter(|l| l.starts_with("DEFVAR GF@%t")).count();
    assert!(temp_decls > 0);
    assert!(temp_decls <= 8, "pool did not reuse temporaries: {temp_decls}");
}

#[test]
fn runtime_section_emitted_once_for_many_call_sites() {
    let code = compile("$s = reads(); write($s + 1); write($s + 2); write($s + 3);");
    let defs = code.matches("LABEL %rt_str2int_strict").count();
    assert_eq!(defs, 1);
    let calls = code.matches("CALL %rt_str2int_strict").count();
    assert!(calls >= 3);
}
