pub mod span;
pub mod diagnostics;
pub mod lexer;
pub mod parser;
pub mod typeck;
pub mod validate;
pub mod opt;
pub mod codegen;

use diagnostics::CompileError;
use parser::ast::Program;

/// Compile a source string to target instruction text
/// (lex → parse → validate → optimize → codegen).
pub fn compile_source(source: &str) -> Result<String, CompileError> {
    let mut program = check_source(source)?;
    codegen::generate(&mut program)
}

/// Run the front half of the pipeline only: lex, parse, validate and
/// optimize. Useful for `check`/`dump-ast` and for tests that inspect the
/// optimized tree.
pub fn check_source(source: &str) -> Result<Program, CompileError> {
    let tokens = lexer::lex(source)?;
    let mut program = parser::parse(&tokens)?;
    validate::validate(&program)?;
    opt::optimize(&mut program)?;
    Ok(program)
}
