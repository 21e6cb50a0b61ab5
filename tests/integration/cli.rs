//! End-to-end CLI checks: file in, instruction text out, and the process
//! exit code carrying the error class.

use std::process::Command;

fn erisc() -> Command {
    Command::new(env!("CARGO_BIN_EXE_erisc"))
}

#[test]
fn compile_writes_target_text_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let src_path = dir.path().join("hello.eris");
    std::fs::write(&src_path, "write(\"hello\");").unwrap();

    let output = erisc().arg("compile").arg(&src_path).output().unwrap();
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.starts_with(".ErisCode"));
    assert!(text.contains("WRITE string@hello"));
}

#[test]
fn compile_with_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let src_path = dir.path().join("prog.eris");
    let out_path = dir.path().join("prog.code");
    std::fs::write(&src_path, "$x = readi(); write($x);").unwrap();

    let status = erisc()
        .arg("compile")
        .arg(&src_path)
        .arg("-o")
        .arg(&out_path)
        .status()
        .unwrap();
    assert!(status.success());
    let text = std::fs::read_to_string(&out_path).unwrap();
    assert!(text.contains("READ GF@x int"));
}

#[test]
fn undefined_function_exits_3() {
    let dir = tempfile::tempdir().unwrap();
    let src_path = dir.path().join("bad.eris");
    std::fs::write(&src_path, "foo();").unwrap();

    let output = erisc().arg("compile").arg(&src_path).output().unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn syntax_error_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let src_path = dir.path().join("bad.eris");
    std::fs::write(&src_path, "$x = ;").unwrap();

    let output = erisc().arg("compile").arg(&src_path).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn check_succeeds_quietly() {
    let dir = tempfile::tempdir().unwrap();
    let src_path = dir.path().join("ok.eris");
    std::fs::write(&src_path, "write(1);").unwrap();

    let output = erisc().arg("check").arg(&src_path).output().unwrap();
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn dump_ast_emits_json() {
    let dir = tempfile::tempdir().unwrap();
    let src_path = dir.path().join("ok.eris");
    std::fs::write(&src_path, "$x = 1; write($x);").unwrap();

    let output = erisc().arg("dump-ast").arg(&src_path).output().unwrap();
    assert!(output.status.success());
    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("dump-ast output is not JSON");
    assert!(json.get("body").is_some());
    assert!(json.get("table").is_some());
}
