use erisc::diagnostics::CompileError;
use erisc::parser::ast::Program;

pub fn compile(source: &str) -> String {
    match erisc::compile_source(source) {
        Ok(code) => code,
        Err(e) => panic!("compilation failed: {e}"),
    }
}

pub fn compile_err(source: &str) -> CompileError {
    match erisc::compile_source(source) {
        Ok(_) => panic!("compilation unexpectedly succeeded"),
        Err(e) => e,
    }
}

pub fn optimized(source: &str) -> Program {
    match erisc::check_source(source) {
        Ok(p) => p,
        Err(e) => panic!("check failed: {e}"),
    }
}

/// All `LABEL x` definitions in an instruction stream.
pub fn labels(code: &str) -> Vec<&str> {
    code.lines()
        .filter_map(|l| l.strip_prefix("LABEL "))
        .collect()
}

/// All jump targets (JUMP/JUMPIFEQ/JUMPIFNEQ and CALL).
pub fn jump_targets(code: &str) -> Vec<&str> {
    code.lines()
        .filter_map(|l| {
            let mut words = l.split_whitespace();
            match words.next() {
                Some("JUMP") | Some("JUMPIFEQ") | Some("JUMPIFNEQ") | Some("CALL") => words.next(),
                _ => None,
            }
        })
        .collect()
}
