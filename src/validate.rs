//! Pre-codegen static checks: unresolved calls, arity, assignment targets
//! and return arity. Anything caught here aborts compilation; everything
//! statically undecidable is left to the hoisted exits and runtime guards.

use crate::diagnostics::CompileError;
use crate::parser::ast::{BinOp, Expr, ExprKind, Function, FunctionTable, Program, Stmt};

pub fn validate(program: &Program) -> Result<(), CompileError> {
    validate_stmt(&program.body, &program.table, None)?;
    for name in program.table.user_function_names() {
        let func = program
            .table
            .get(&name)
            .ok_or_else(|| CompileError::internal("function vanished from table"))?;
        if let Some(body) = &func.body {
            validate_stmt(body, &program.table, Some(func))?;
        }
    }
    Ok(())
}

fn validate_stmt(
    stmt: &Stmt,
    table: &FunctionTable,
    current: Option<&Function>,
) -> Result<(), CompileError> {
    for e in stmt.exprs() {
        validate_expr(e, table)?;
    }
    match stmt {
        Stmt::List(items) => {
            for item in items {
                validate_stmt(item, table, current)?;
            }
        }
        Stmt::If { then_body, else_body, .. } => {
            validate_stmt(then_body, table, current)?;
            validate_stmt(else_body, table, current)?;
        }
        Stmt::While { body, .. } => validate_stmt(body, table, current)?,
        Stmt::Return { expr, span } => {
            let Some(func) = current else {
                return Err(CompileError::syntax("'return' outside of function", *span));
            };
            let is_void = func.ret.base == crate::parser::ast::BaseType::Void;
            if is_void && expr.is_some() {
                return Err(CompileError::semantic(
                    format!("function '{}' is void but returns a value", func.name),
                    *span,
                    6,
                ));
            }
            if !is_void && expr.is_none() {
                return Err(CompileError::semantic(
                    format!("function '{}' must return a value", func.name),
                    *span,
                    6,
                ));
            }
        }
        _ => {}
    }
    Ok(())
}

fn validate_expr(expr: &Expr, table: &FunctionTable) -> Result<(), CompileError> {
    match &expr.kind {
        ExprKind::Binary { op: BinOp::Assign, lhs, .. } => {
            if !matches!(&lhs.kind, ExprKind::Variable(_)) {
                return Err(CompileError::syntax("invalid assignment target", lhs.span));
            }
        }
        ExprKind::Call { name, args } => {
            let Some(func) = table.get(name) else {
                return Err(CompileError::semantic(
                    format!("call to undefined function '{name}'"),
                    expr.span,
                    3,
                ));
            };
            if !func.variadic && args.len() != func.params.len() {
                return Err(CompileError::semantic(
                    format!(
                        "function '{name}' takes {} argument(s), {} given",
                        func.params.len(),
                        args.len()
                    ),
                    expr.span,
                    3,
                ));
            }
        }
        _ => {}
    }
    for child in expr.children() {
        validate_expr(child, table)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn check(src: &str) -> Result<(), CompileError> {
        validate(&parse(&lex(src).unwrap()).unwrap())
    }

    #[test]
    fn undefined_function_is_code_3() {
        let err = check("foo();").unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("foo"));
    }

    #[test]
    fn arity_mismatch_is_code_3() {
        let err = check("function f(int $a): void {} f(1, 2);").unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert_eq!(check("strlen();").unwrap_err().exit_code(), 3);
    }

    #[test]
    fn write_is_variadic() {
        assert!(check("write();").is_ok());
        assert!(check("write(1, \"a\", 2.0, null);").is_ok());
    }

    #[test]
    fn invalid_assignment_target_is_code_2() {
        let err = check("1 = 2;").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn void_return_with_value_is_code_6() {
        let err = check("function f(): void { return 1; }").unwrap_err();
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn missing_return_value_is_code_6() {
        let err = check("function f(): int { return; }").unwrap_err();
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn valid_program_passes() {
        assert!(check(
            "function add(int $a, int $b): int { return $a + $b; } write(add(1, 2));"
        )
        .is_ok());
    }

    #[test]
    fn checks_nested_statements() {
        let err = check("if (1) { while (1) { foo(); } }").unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
