pub mod ast;

use crate::diagnostics::CompileError;
use crate::lexer::token::Token;
use crate::span::{Span, Spanned};
use ast::*;

pub struct Parser<'t> {
    tokens: &'t [Spanned<Token>],
    pos: usize,
    ids: IdGen,
    table: FunctionTable,
    /// Set while parsing a function body; `return` is rejected outside.
    in_function: bool,
}

pub fn parse(tokens: &[Spanned<Token>]) -> Result<Program, CompileError> {
    Parser::new(tokens).parse_program()
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t [Spanned<Token>]) -> Self {
        Parser {
            tokens,
            pos: 0,
            ids: IdGen::default(),
            table: FunctionTable::with_builtins(),
            in_function: false,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.node)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or_else(|| {
                self.tokens
                    .last()
                    .map(|t| Span::new(t.span.end, t.span.end))
                    .unwrap_or_else(Span::dummy)
            })
    }

    fn advance(&mut self) -> Option<&Spanned<Token>> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Token, what: &str) -> Result<Span, CompileError> {
        let span = self.peek_span();
        if self.eat(&tok) {
            Ok(span)
        } else {
            Err(CompileError::syntax(format!("expected {what}"), span))
        }
    }

    // ===== declarations =====

    pub fn parse_program(mut self) -> Result<Program, CompileError> {
        let mut body = Vec::new();
        while self.peek().is_some() {
            if self.peek() == Some(&Token::Function) {
                self.parse_function()?;
            } else {
                body.push(self.parse_stmt()?);
            }
        }
        Ok(Program {
            body: Stmt::List(body),
            table: self.table,
            ids: self.ids,
        })
    }

    fn parse_function(&mut self) -> Result<(), CompileError> {
        let start = self.expect(Token::Function, "'function'")?;
        let (name, name_span) = self.expect_ident("function name")?;
        self.expect(Token::LParen, "'('")?;
        let mut params = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                let ty = self.parse_type()?;
                let (pname, pspan) = self.expect_var("parameter name")?;
                if params.iter().any(|p: &Param| p.name == pname) {
                    return Err(CompileError::syntax(
                        format!("duplicate parameter '${pname}'"),
                        pspan,
                    ));
                }
                params.push(Param { name: pname, ty });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen, "')'")?;
        self.expect(Token::Colon, "':'")?;
        let ret = self.parse_type_or_void()?;

        self.in_function = true;
        let body = self.parse_block()?;
        self.in_function = false;

        if self.table.contains(&name) {
            return Err(CompileError::semantic(
                format!("redefinition of function '{name}'"),
                name_span,
                3,
            ));
        }
        self.table.insert(Function {
            name,
            ret,
            params,
            body: Some(body),
            variadic: false,
            span: start,
        });
        Ok(())
    }

    fn parse_type(&mut self) -> Result<Type, CompileError> {
        let required = !self.eat(&Token::Question);
        let span = self.peek_span();
        let base = match self.advance().map(|t| t.node.clone()) {
            Some(Token::Int) => BaseType::Int,
            Some(Token::Float) => BaseType::Float,
            Some(Token::String) => BaseType::String,
            _ => return Err(CompileError::syntax("expected type name", span)),
        };
        Ok(Type::new(base, required))
    }

    fn parse_type_or_void(&mut self) -> Result<Type, CompileError> {
        if self.eat(&Token::Void) {
            return Ok(Type::required(BaseType::Void));
        }
        self.parse_type()
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, Span), CompileError> {
        let span = self.peek_span();
        match self.advance().map(|t| t.node.clone()) {
            Some(Token::Ident(name)) => Ok((name, span)),
            _ => Err(CompileError::syntax(format!("expected {what}"), span)),
        }
    }

    fn expect_var(&mut self, what: &str) -> Result<(String, Span), CompileError> {
        let span = self.peek_span();
        match self.advance().map(|t| t.node.clone()) {
            Some(Token::Var(name)) => Ok((name, span)),
            _ => Err(CompileError::syntax(format!("expected {what}"), span)),
        }
    }

    // ===== statements =====

    fn parse_block(&mut self) -> Result<Stmt, CompileError> {
        self.expect(Token::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while self.peek().is_some() && self.peek() != Some(&Token::RBrace) {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(Token::RBrace, "'}'")?;
        Ok(Stmt::List(stmts))
    }

    fn parse_stmt(&mut self) -> Result<Stmt, CompileError> {
        match self.peek() {
            Some(Token::LBrace) => self.parse_block(),
            Some(Token::If) => {
                self.advance();
                self.expect(Token::LParen, "'('")?;
                let cond = self.parse_expr(0)?;
                self.expect(Token::RParen, "')'")?;
                let then_body = self.parse_block()?;
                let else_body = if self.eat(&Token::Else) {
                    self.parse_block()?
                } else {
                    Stmt::empty()
                };
                Ok(Stmt::If {
                    cond,
                    then_body: Box::new(then_body),
                    else_body: Box::new(else_body),
                })
            }
            Some(Token::While) => {
                self.advance();
                self.expect(Token::LParen, "'('")?;
                let cond = self.parse_expr(0)?;
                self.expect(Token::RParen, "')'")?;
                let body = self.parse_block()?;
                Ok(Stmt::While { cond, body: Box::new(body) })
            }
            Some(Token::Return) => {
                let span = self.peek_span();
                self.advance();
                if !self.in_function {
                    return Err(CompileError::syntax("'return' outside of function", span));
                }
                let expr = if self.peek() == Some(&Token::Semi) {
                    None
                } else {
                    Some(self.parse_expr(0)?)
                };
                self.expect(Token::Semi, "';'")?;
                Ok(Stmt::Return { expr, span })
            }
            Some(Token::Function) => Err(CompileError::syntax(
                "function declarations are only allowed at top level",
                self.peek_span(),
            )),
            Some(_) => {
                let expr = self.parse_expr(0)?;
                self.expect(Token::Semi, "';'")?;
                Ok(Stmt::Expr(expr))
            }
            None => Err(CompileError::syntax("unexpected end of input", self.peek_span())),
        }
    }

    // ===== expressions (precedence climbing) =====

    fn binding_power(tok: &Token) -> Option<(u8, u8, BinOp)> {
        // (left bp, right bp); assignment is right-associative.
        Some(match tok {
            Token::Eq => (2, 1, BinOp::Assign),
            Token::PipePipe => (3, 4, BinOp::Or),
            Token::AmpAmp => (5, 6, BinOp::And),
            Token::EqEqEq => (7, 8, BinOp::Eq),
            Token::BangEqEq => (7, 8, BinOp::Neq),
            Token::Lt => (9, 10, BinOp::Lt),
            Token::Gt => (9, 10, BinOp::Gt),
            Token::LtEq => (9, 10, BinOp::LtEq),
            Token::GtEq => (9, 10, BinOp::GtEq),
            Token::Plus => (11, 12, BinOp::Add),
            Token::Minus => (11, 12, BinOp::Sub),
            Token::Dot => (11, 12, BinOp::Concat),
            Token::Star => (13, 14, BinOp::Mul),
            Token::Slash => (13, 14, BinOp::Div),
            _ => return None,
        })
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let Some(tok) = self.peek() else { break };
            let Some((lbp, rbp, op)) = Self::binding_power(tok) else { break };
            if lbp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.parse_expr(rbp)?;
            let span = lhs.span.merge(rhs.span);
            lhs = Expr::new(
                ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
                span,
                &mut self.ids,
            );
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let span = self.peek_span();
        let op = match self.peek() {
            Some(Token::Minus) => Some(UnOp::Neg),
            Some(Token::Bang) => Some(UnOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let rhs = self.parse_unary()?;
            let span = span.merge(rhs.span);
            return Ok(Expr::new(
                ExprKind::Unary { op, rhs: Box::new(rhs) },
                span,
                &mut self.ids,
            ));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let span = self.peek_span();
        let tok = self
            .advance()
            .map(|t| t.node.clone())
            .ok_or_else(|| CompileError::syntax("unexpected end of input", span))?;
        let expr = match tok {
            Token::IntLit(v) => Expr::constant(Value::Int(v), span, &mut self.ids),
            Token::FloatLit(v) => Expr::constant(Value::Float(v), span, &mut self.ids),
            Token::StringLit(s) => Expr::constant(Value::Str(s), span, &mut self.ids),
            Token::True => Expr::constant(Value::Bool(true), span, &mut self.ids),
            Token::False => Expr::constant(Value::Bool(false), span, &mut self.ids),
            Token::Null => Expr::constant(Value::Null, span, &mut self.ids),
            Token::Var(name) => Expr::new(ExprKind::Variable(name), span, &mut self.ids),
            Token::Ident(name) => {
                self.expect(Token::LParen, "'(' after function name")?;
                let mut args = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    loop {
                        args.push(self.parse_expr(0)?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                let end = self.expect(Token::RParen, "')'")?;
                Expr::new(ExprKind::Call { name, args }, span.merge(end), &mut self.ids)
            }
            Token::LParen => {
                let inner = self.parse_expr(0)?;
                self.expect(Token::RParen, "')'")?;
                inner
            }
            other => {
                return Err(CompileError::syntax(
                    format!("unexpected token {other:?}"),
                    span,
                ));
            }
        };
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_src(src: &str) -> Program {
        parse(&lex(src).unwrap()).unwrap()
    }

    fn parse_err(src: &str) -> CompileError {
        parse(&lex(src).unwrap()).unwrap_err()
    }

    fn body_stmts(program: &Program) -> &[Stmt] {
        match &program.body {
            Stmt::List(items) => items,
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn parse_assignment() {
        let program = parse_src("$x = 1 + 2;");
        let stmts = body_stmts(&program);
        assert_eq!(stmts.len(), 1);
        let Stmt::Expr(e) = &stmts[0] else { panic!() };
        assert_eq!(e.assign_target(), Some("x"));
    }

    #[test]
    fn parse_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let program = parse_src("$x = 1 + 2 * 3;");
        let Stmt::Expr(e) = &body_stmts(&program)[0] else { panic!() };
        let ExprKind::Binary { rhs, .. } = &e.kind else { panic!() };
        let ExprKind::Binary { op, rhs: mul_rhs, .. } = &rhs.kind else { panic!() };
        assert_eq!(*op, BinOp::Add);
        let ExprKind::Binary { op: inner, .. } = &mul_rhs.kind else { panic!() };
        assert_eq!(*inner, BinOp::Mul);
    }

    #[test]
    fn parse_right_assoc_assignment() {
        // $a = $b = 1 parses as $a = ($b = 1)
        let program = parse_src("$a = $b = 1;");
        let Stmt::Expr(e) = &body_stmts(&program)[0] else { panic!() };
        let ExprKind::Binary { op: BinOp::Assign, rhs, .. } = &e.kind else { panic!() };
        assert_eq!(rhs.assign_target(), Some("b"));
    }

    #[test]
    fn parse_function_declaration() {
        let program = parse_src(
            "function add(int $a, ?float $b): float { return $a + $b; } $r = add(1, 2.0);",
        );
        let f = program.table.get("add").unwrap();
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.params[0].ty, Type::required(BaseType::Int));
        assert_eq!(f.params[1].ty, Type::nullable(BaseType::Float));
        assert_eq!(f.ret, Type::required(BaseType::Float));
        assert!(!f.is_builtin());
    }

    #[test]
    fn parse_if_else_while() {
        let program = parse_src("if ($x) { $y = 1; } else { $y = 2; } while ($y) { $y = $y - 1; }");
        let stmts = body_stmts(&program);
        assert!(matches!(stmts[0], Stmt::If { .. }));
        assert!(matches!(stmts[1], Stmt::While { .. }));
    }

    #[test]
    fn parse_concat_and_comparison() {
        let program = parse_src(r#"$s = "a" . "b" === "ab";"#);
        let Stmt::Expr(e) = &body_stmts(&program)[0] else { panic!() };
        let ExprKind::Binary { rhs, .. } = &e.kind else { panic!() };
        // concat binds tighter than ===
        let ExprKind::Binary { op: BinOp::Eq, lhs, .. } = &rhs.kind else { panic!() };
        assert!(matches!(&lhs.kind, ExprKind::Binary { op: BinOp::Concat, .. }));
    }

    #[test]
    fn parse_redefined_function_is_code_3() {
        let err = parse_err("function f(): void {} function f(): void {}");
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn parse_return_outside_function_rejected() {
        let err = parse_err("return 1;");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn parse_nested_function_rejected() {
        let err = parse_err("function f(): void { function g(): void {} }");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn parse_missing_semi_rejected() {
        let err = parse_err("$x = 1");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn parse_bare_return() {
        let program = parse_src("function f(): void { return; }");
        let f = program.table.get("f").unwrap();
        let Some(Stmt::List(items)) = &f.body else { panic!() };
        assert!(matches!(items[0], Stmt::Return { expr: None, .. }));
    }

    #[test]
    fn node_ids_are_unique() {
        let program = parse_src("$x = 1 + 2 * 3; $y = $x . \"s\";");
        let mut seen = std::collections::HashSet::new();
        fn walk(e: &Expr, seen: &mut std::collections::HashSet<NodeId>) {
            assert!(seen.insert(e.id), "duplicate node id {}", e.id);
            for c in e.children() {
                walk(c, seen);
            }
        }
        let Stmt::List(items) = &program.body else { panic!() };
        for s in items {
            for e in s.exprs() {
                walk(e, &mut seen);
            }
        }
    }
}
