use std::rc::Rc;

use crate::ast::{
    ArgList, AssignOp, BinOp, Expr, ExprKind, Keyword, Program, Stmt, StmtKind, UnaryOp,
};
use crate::error::{ErrorKind, LangError, LangResult};
use crate::lexer::tokenize;
use crate::token::{Span, Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse_program(mut self) -> LangResult<Program> {
        let mut statements = Vec::new();
        while !self.at(&TokenKind::Eof) {
            if self.consume_newlines() {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    /// Parse for the analyzer: a failed statement is recorded and the
    /// parser resynchronizes at the next top-level statement start
    /// instead of aborting, so one bad statement does not hide errors
    /// in the rest of the file. Statements inside a block that fails to
    /// parse are lost; that loss of precision is deliberate.
    pub fn parse_program_resync(mut self, errors: &mut Vec<LangError>) -> Program {
        let mut statements = Vec::new();
        while !self.at(&TokenKind::Eof) {
            if self.consume_newlines() {
                continue;
            }
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    errors.push(err);
                    self.skip_to_statement_start();
                }
            }
        }
        Program { statements }
    }

    fn skip_to_statement_start(&mut self) {
        while !self.at(&TokenKind::Eof) {
            if self.at(&TokenKind::Newline) {
                self.advance();
                return;
            }
            self.advance();
        }
    }

    fn parse_statement(&mut self) -> LangResult<Stmt> {
        let span = self.current().span;
        match &self.current().kind {
            TokenKind::If => self.parse_if(),
            TokenKind::Foreach => self.parse_foreach(),
            TokenKind::Break => {
                self.advance();
                self.expect_statement_end()?;
                Ok(Stmt {
                    kind: StmtKind::Break,
                    span,
                })
            }
            TokenKind::Continue => {
                self.advance();
                self.expect_statement_end()?;
                Ok(Stmt {
                    kind: StmtKind::Continue,
                    span,
                })
            }
            TokenKind::Identifier(_)
                if matches!(
                    self.peek().map(|t| &t.kind),
                    Some(TokenKind::Assign) | Some(TokenKind::PlusAssign)
                ) =>
            {
                self.parse_assignment()
            }
            _ => {
                let expr = self.parse_expression()?;
                self.expect_statement_end()?;
                Ok(Stmt {
                    kind: StmtKind::Expr(expr),
                    span,
                })
            }
        }
    }

    fn parse_assignment(&mut self) -> LangResult<Stmt> {
        let span = self.current().span;
        let name = self.expect_identifier()?;
        let op = match self.current().kind {
            TokenKind::PlusAssign => AssignOp::AddAssign,
            _ => AssignOp::Assign,
        };
        self.advance(); // '=' or '+='
        let value = self.parse_expression()?;
        self.expect_statement_end()?;
        Ok(Stmt {
            kind: StmtKind::Assign { name, op, value },
            span,
        })
    }

    fn parse_if(&mut self) -> LangResult<Stmt> {
        let span = self.current().span;
        self.expect(&TokenKind::If)?;

        let mut branches = Vec::new();
        let mut else_body = Vec::new();

        let condition = self.parse_expression()?;
        self.expect_statement_end()?;
        let body = self.parse_block(&[TokenKind::Elif, TokenKind::Else, TokenKind::Endif])?;
        branches.push((condition, body));

        loop {
            match self.current().kind {
                TokenKind::Elif => {
                    self.advance();
                    let condition = self.parse_expression()?;
                    self.expect_statement_end()?;
                    let body =
                        self.parse_block(&[TokenKind::Elif, TokenKind::Else, TokenKind::Endif])?;
                    branches.push((condition, body));
                }
                TokenKind::Else => {
                    self.advance();
                    self.expect_statement_end()?;
                    else_body = self.parse_block(&[TokenKind::Endif])?;
                }
                _ => break,
            }
        }
        self.expect(&TokenKind::Endif)?;
        self.expect_statement_end()?;

        Ok(Stmt {
            kind: StmtKind::If {
                branches,
                else_body,
            },
            span,
        })
    }

    fn parse_foreach(&mut self) -> LangResult<Stmt> {
        let span = self.current().span;
        self.expect(&TokenKind::Foreach)?;

        let mut vars = vec![self.expect_identifier()?];
        if self.at(&TokenKind::Comma) {
            self.advance();
            vars.push(self.expect_identifier()?);
        }
        self.expect(&TokenKind::Colon)?;
        let iterable = self.parse_expression()?;
        self.expect_statement_end()?;

        let body = self.parse_block(&[TokenKind::Endforeach])?;
        self.expect(&TokenKind::Endforeach)?;
        self.expect_statement_end()?;

        Ok(Stmt {
            kind: StmtKind::Foreach {
                vars,
                iterable,
                body,
            },
            span,
        })
    }

    fn parse_block(&mut self, terminators: &[TokenKind]) -> LangResult<Vec<Stmt>> {
        let mut body = Vec::new();
        loop {
            if self.consume_newlines() {
                continue;
            }
            if self.at(&TokenKind::Eof) || terminators.iter().any(|t| self.at(t)) {
                return Ok(body);
            }
            body.push(self.parse_statement()?);
        }
    }

    // Precedence, low to high: or, and, comparison, additive,
    // multiplicative, unary, postfix.
    fn parse_expression(&mut self) -> LangResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> LangResult<Expr> {
        let mut expr = self.parse_and()?;
        while self.at(&TokenKind::Or) {
            let span = self.current().span;
            self.advance();
            let rhs = self.parse_and()?;
            expr = binary(expr, BinOp::Or, rhs, span);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> LangResult<Expr> {
        let mut expr = self.parse_comparison()?;
        while self.at(&TokenKind::And) {
            let span = self.current().span;
            self.advance();
            let rhs = self.parse_comparison()?;
            expr = binary(expr, BinOp::And, rhs, span);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> LangResult<Expr> {
        let mut expr = self.parse_additive()?;
        loop {
            let span = self.current().span;
            let op = match self.current().kind {
                TokenKind::Eq => BinOp::Eq,
                TokenKind::Neq => BinOp::Neq,
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Leq => BinOp::Leq,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Geq => BinOp::Geq,
                TokenKind::In => BinOp::In,
                TokenKind::Not => {
                    if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::In)) {
                        self.advance();
                        BinOp::NotIn
                    } else {
                        break;
                    }
                }
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            expr = binary(expr, op, rhs, span);
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> LangResult<Expr> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let span = self.current().span;
            let op = match self.current().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            expr = binary(expr, op, rhs, span);
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> LangResult<Expr> {
        let mut expr = self.parse_unary()?;
        loop {
            let span = self.current().span;
            let op = match self.current().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            expr = binary(expr, op, rhs, span);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> LangResult<Expr> {
        let span = self.current().span;
        let op = match self.current().kind {
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr {
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        })
    }

    fn parse_postfix(&mut self) -> LangResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current().kind {
                TokenKind::Dot => {
                    let span = self.current().span;
                    self.advance();
                    let name = self.expect_identifier()?;
                    self.expect(&TokenKind::LParen)?;
                    let args = self.parse_arglist()?;
                    self.expect(&TokenKind::RParen)?;
                    expr = Expr {
                        kind: ExprKind::MethodCall {
                            receiver: Box::new(expr),
                            name,
                            args,
                        },
                        span,
                    };
                }
                TokenKind::LBracket => {
                    let span = self.current().span;
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket)?;
                    expr = Expr {
                        kind: ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> LangResult<Expr> {
        let span = self.current().span;
        match self.current().kind.clone() {
            TokenKind::Integer(value) => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Int(value),
                    span,
                })
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Str(value),
                    span,
                })
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Bool(true),
                    span,
                })
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Bool(false),
                    span,
                })
            }
            TokenKind::Identifier(name) => {
                self.advance();
                // Only a bare identifier can be called; everything else
                // dispatches through a method.
                if self.at(&TokenKind::LParen) {
                    self.advance();
                    let args = self.parse_arglist()?;
                    self.expect(&TokenKind::RParen)?;
                    Ok(Expr {
                        kind: ExprKind::Call { name, args },
                        span,
                    })
                } else {
                    Ok(Expr {
                        kind: ExprKind::Identifier(name),
                        span,
                    })
                }
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !self.at(&TokenKind::RBracket) {
                    elements.push(self.parse_expression()?);
                    if !self.at(&TokenKind::Comma) {
                        break;
                    }
                    self.advance();
                }
                self.expect(&TokenKind::RBracket)?;
                Ok(Expr {
                    kind: ExprKind::Array(elements),
                    span,
                })
            }
            TokenKind::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                while !self.at(&TokenKind::RBrace) {
                    let key = self.expect_str_literal()?;
                    self.expect(&TokenKind::Colon)?;
                    let value = self.parse_expression()?;
                    entries.push((key, value));
                    if !self.at(&TokenKind::Comma) {
                        break;
                    }
                    self.advance();
                }
                self.expect(&TokenKind::RBrace)?;
                Ok(Expr {
                    kind: ExprKind::Dict(entries),
                    span,
                })
            }
            _ => Err(self.error("expression")),
        }
    }

    fn parse_arglist(&mut self) -> LangResult<ArgList> {
        let mut args = ArgList::default();
        while !self.at(&TokenKind::RParen) {
            // `IDENT ':'` introduces a keyword argument.
            if let TokenKind::Identifier(name) = self.current().kind.clone() {
                if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Colon)) {
                    let name_span = self.current().span;
                    self.advance();
                    self.advance();
                    let value = self.parse_expression()?;
                    args.keywords.push(Keyword {
                        name,
                        name_span,
                        value,
                    });
                    if !self.at(&TokenKind::Comma) {
                        break;
                    }
                    self.advance();
                    continue;
                }
            }
            args.positional.push(self.parse_expression()?);
            if !self.at(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        Ok(args)
    }

    fn consume_newlines(&mut self) -> bool {
        let mut consumed = false;
        while self.at(&TokenKind::Newline) {
            consumed = true;
            self.advance();
        }
        consumed
    }

    fn expect_statement_end(&mut self) -> LangResult<()> {
        match self.current().kind {
            TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            _ => Err(self.error("newline")),
        }
    }

    fn expect_identifier(&mut self) -> LangResult<Rc<str>> {
        if let TokenKind::Identifier(name) = self.current().kind.clone() {
            self.advance();
            Ok(name)
        } else {
            Err(self.error("identifier"))
        }
    }

    fn expect_str_literal(&mut self) -> LangResult<Rc<str>> {
        if let TokenKind::Str(value) = self.current().kind.clone() {
            self.advance();
            Ok(value)
        } else {
            Err(self.error("string literal"))
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> LangResult<()> {
        if self.at(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&kind.describe()))
        }
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn error(&self, expected: &str) -> LangError {
        let token = self.current();
        LangError::new(
            ErrorKind::Parse {
                expected: expected.to_string(),
                got: token.kind.describe(),
            },
            token.span,
        )
    }
}

fn binary(lhs: Expr, op: BinOp, rhs: Expr, span: Span) -> Expr {
    Expr {
        kind: ExprKind::Binary {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        },
        span,
    }
}

pub fn parse(input: &str) -> LangResult<Program> {
    Parser::new(tokenize(input)?).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::format_program;
    use indoc::indoc;

    fn parse_ok(input: &str) -> Program {
        parse(input).expect("parse failed")
    }

    #[test]
    fn parses_assignment_and_call() {
        let program = parse_ok("exe = executable('demo', srcs)\n");
        assert_eq!(program.statements.len(), 1);
        let StmtKind::Assign { name, value, .. } = &program.statements[0].kind else {
            panic!("expected assignment");
        };
        assert_eq!(&**name, "exe");
        let ExprKind::Call { name, args } = &value.kind else {
            panic!("expected call");
        };
        assert_eq!(&**name, "executable");
        assert_eq!(args.positional.len(), 2);
    }

    #[test]
    fn parses_keyword_arguments() {
        let program = parse_ok("executable('demo', srcs, install: true)\n");
        let StmtKind::Expr(expr) = &program.statements[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Call { args, .. } = &expr.kind else {
            panic!("expected call");
        };
        assert_eq!(args.positional.len(), 2);
        assert_eq!(args.keywords.len(), 1);
        assert_eq!(&*args.keywords[0].name, "install");
    }

    #[test]
    fn parses_if_elif_else() {
        let program = parse_ok(indoc! {"
            if a
              x = 1
            elif b
              x = 2
            else
              x = 3
            endif
        "});
        let StmtKind::If {
            branches,
            else_body,
        } = &program.statements[0].kind
        else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(else_body.len(), 1);
    }

    #[test]
    fn parses_foreach_with_two_loop_vars() {
        let program = parse_ok(indoc! {"
            foreach k, v : {'a': 1}
              message(k)
            endforeach
        "});
        let StmtKind::Foreach { vars, .. } = &program.statements[0].kind else {
            panic!("expected foreach");
        };
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn comparison_binds_tighter_than_and() {
        let program = parse_ok("x = a == 1 and b == 2\n");
        let StmtKind::Assign { value, .. } = &program.statements[0].kind else {
            panic!("expected assignment");
        };
        let ExprKind::Binary { op, .. } = &value.kind else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinOp::And);
    }

    #[test]
    fn parses_not_in() {
        let program = parse_ok("x = 'a' not in ['b']\n");
        let StmtKind::Assign { value, .. } = &program.statements[0].kind else {
            panic!("expected assignment");
        };
        let ExprKind::Binary { op, .. } = &value.kind else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinOp::NotIn);
    }

    #[test]
    fn method_calls_chain() {
        let program = parse_ok("x = 'a b'.split(' ').get(0)\n");
        let StmtKind::Assign { value, .. } = &program.statements[0].kind else {
            panic!("expected assignment");
        };
        let ExprKind::MethodCall { name, receiver, .. } = &value.kind else {
            panic!("expected method call");
        };
        assert_eq!(&**name, "get");
        assert!(matches!(receiver.kind, ExprKind::MethodCall { .. }));
    }

    #[test]
    fn errors_on_malformed_statement() {
        let err = parse("x = = 1\n").expect_err("expected parse failure");
        assert!(matches!(err.kind, ErrorKind::Parse { .. }));
    }

    #[test]
    fn resync_reports_errors_from_independent_statements() {
        let input = indoc! {"
            x = = 1
            y = 2
            z = ) 3
        "};
        let mut errors = Vec::new();
        let program = Parser::new(tokenize(input).expect("tokenize failed"))
            .parse_program_resync(&mut errors);
        assert_eq!(errors.len(), 2);
        assert_eq!(program.statements.len(), 1);
    }

    #[test]
    fn formatting_then_reparsing_is_stable() {
        let input = indoc! {"
            project('demo', version: '1.0')
            srcs = files(['a.c', 'b.c'])
            if get_option('tests') and host == 'linux'
              foreach s : srcs
                message(s)
              endforeach
            else
              x = -(1 + 2) * 3
            endif
            d = {'key': [1, 2], 'other': 'val'}
        "};
        let once = format_program(&parse_ok(input));
        let twice = format_program(&parse_ok(&once));
        assert_eq!(once, twice);
    }
}
