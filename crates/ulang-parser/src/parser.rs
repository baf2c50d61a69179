//! Parser for the ulang language
//!
//! Recursive descent with one method per precedence level, loosest first:
//!
//! | level          | operators                 | assoc |
//! |----------------|---------------------------|-------|
//! | relational     | `< <= > >= == !=`         | left  |
//! | assignment     | `=`                       | right |
//! | additive       | `+ -`                     | left  |
//! | multiplicative | `* /`                     | left  |
//! | unary          | `- ~ !` (prefix)          | -     |
//!
//! Parsing stops at the first unexpected token.

use crate::ast::*;
use ulang_error::{CompileError, Result, Span, Spanned};
use ulang_lexer::{Lexer, Token, TokenKind};

pub struct Parser {
    /// Token stream, always terminated by `Eof`
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Creates a parser over `tokens`. A trailing `Eof` is added if missing.
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if !tokens.last().is_some_and(Token::is_eof) {
            let span = tokens
                .last()
                .map(|t| Span::point(t.span.end, t.span.file_id))
                .unwrap_or_default();
            tokens.push(Token::new(TokenKind::Eof, "", span));
        }
        Self { tokens, pos: 0 }
    }

    // =========================================
    // Helpers
    // =========================================

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_next(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().is(kind)
    }

    fn advance(&mut self) -> &Token {
        if !self.peek().is_eof() {
            self.pos += 1;
        }
        self.previous()
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consumes a token of `kind` or fails describing what was `expected`
    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<&Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(expected))
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<(String, Span)> {
        let token = self.expect(TokenKind::Ident, expected)?;
        Ok((token.text.clone(), token.span))
    }

    fn error_at_current(&self, expected: &str) -> CompileError {
        let token = self.peek();
        CompileError::Parse {
            found: token.describe(),
            expected: expected.to_string(),
            span: token.span,
        }
    }

    fn span_from(&self, start: Span) -> Span {
        start.to(self.previous().span)
    }

    // =========================================
    // Declarations
    // =========================================

    /// Parses the whole token stream
    pub fn parse(&mut self) -> Result<Program> {
        let mut program = Program {
            prototypes: Vec::new(),
            functions: Vec::new(),
        };

        if self.check(TokenKind::Eof) {
            return Err(self.error_at_current("a function definition"));
        }

        while !self.check(TokenKind::Eof) {
            let prototype = self.parse_prototype()?;
            if self.match_token(TokenKind::Semicolon) {
                program.prototypes.push(prototype);
            } else {
                program.functions.push(self.parse_function(prototype)?);
            }
        }

        Ok(program)
    }

    /// `int name(a, b)`
    fn parse_prototype(&mut self) -> Result<FunctionPrototype> {
        let start = self
            .expect(TokenKind::Int, "`int` to start a function definition")?
            .span;
        let (name, _) = self.expect_ident("function name")?;
        self.expect(TokenKind::LParen, "`(` after the function name")?;

        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let (param, _) = self.expect_ident("parameter name")?;
                params.push(param);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "`,` or `)` in the parameter list")?;

        Ok(FunctionPrototype {
            name,
            params,
            span: self.span_from(start),
        })
    }

    /// `{ statement* }` following a prototype
    fn parse_function(&mut self, prototype: FunctionPrototype) -> Result<Function> {
        if !self.check(TokenKind::LBrace) {
            return Err(self.error_at_current("`{` or `;` after the function signature"));
        }
        let mut body = self.parse_block()?;

        let return_value = match body.pop() {
            Some(Stmt::Return { value, .. }) => Some(value),
            Some(other) => {
                body.push(other);
                None
            }
            None => None,
        };

        Ok(Function {
            span: self.span_from(prototype.span),
            prototype,
            body,
            return_value,
        })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) {
            if self.check(TokenKind::Eof) {
                return Err(self.error_at_current("`}`"));
            }
            statements.push(self.parse_statement()?);
        }
        self.advance();
        Ok(statements)
    }

    // =========================================
    // Statements
    // =========================================

    fn parse_statement(&mut self) -> Result<Stmt> {
        match self.peek().kind {
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::Int => self.parse_declare(),
            TokenKind::Return => self.parse_return(),
            _ => {
                let expr = self.parse_expression()?;
                self.expect(TokenKind::Semicolon, "`;` after expression")?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        let start = self.advance().span;
        self.expect(TokenKind::LParen, "`(` after `if`")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RParen, "`)` after the condition")?;
        let then_body = self.parse_block()?;
        self.expect(TokenKind::Else, "`else` branch")?;
        let else_body = self.parse_block()?;

        Ok(Stmt::If(If {
            condition,
            then_body,
            else_body,
            span: self.span_from(start),
        }))
    }

    /// `for (var = start; condition; [step]) { ... }`
    fn parse_for(&mut self) -> Result<Stmt> {
        let start_span = self.advance().span;
        self.expect(TokenKind::LParen, "`(` after `for`")?;
        let (var, _) = self.expect_ident("loop variable")?;
        self.expect(TokenKind::Eq, "`=` after the loop variable")?;
        let start = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "`;` after the loop start value")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "`;` after the loop condition")?;
        let step = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::RParen, "`)` to close the loop header")?;
        let body = self.parse_block()?;

        Ok(Stmt::For(For {
            var,
            start,
            condition,
            step,
            body,
            span: self.span_from(start_span),
        }))
    }

    /// `int x;` or `int x = expr;`
    fn parse_declare(&mut self) -> Result<Stmt> {
        let start = self.advance().span;
        let (name, _) = self.expect_ident("variable name after `int`")?;
        let value = if self.match_token(TokenKind::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "`;` after the declaration")?;
        Ok(Stmt::Declare {
            name,
            value,
            span: self.span_from(start),
        })
    }

    fn parse_return(&mut self) -> Result<Stmt> {
        let start = self.advance().span;
        let value = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "`;` after the return value")?;
        Ok(Stmt::Return {
            value,
            span: self.span_from(start),
        })
    }

    // =========================================
    // Expressions
    // =========================================

    pub fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_relational()
    }

    fn parse_relational(&mut self) -> Result<Expr> {
        let mut left = self.parse_assignment()?;

        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::Ne => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_assignment()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    /// Right associative; the target is validated during emission
    fn parse_assignment(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;

        if self.match_token(TokenKind::Eq) {
            let right = self.parse_assignment()?;
            return Ok(binary(BinOp::Assign, left, right));
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_primary(),
        };
        let start = self.advance().span;
        let operand = self.parse_unary()?;
        let span = start.to(operand.span());

        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
            span,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.peek().clone();

        match token.kind {
            TokenKind::Number => {
                self.advance();
                let value = token.text.parse::<i64>().map_err(|_| CompileError::Parse {
                    found: token.describe(),
                    expected: "an integer literal that fits in 64 bits".to_string(),
                    span: token.span,
                })?;
                Ok(Expr::number(value, token.span))
            }
            TokenKind::Ident if self.peek_next().is(TokenKind::LParen) => {
                self.advance();
                self.advance();
                let args = self.parse_args()?;
                Ok(Expr::Call(FunctionCall {
                    callee: token.text,
                    args,
                    span: self.span_from(token.span),
                }))
            }
            TokenKind::Ident => {
                self.advance();
                Ok(Expr::Variable {
                    name: token.text,
                    span: token.span,
                })
            }
            TokenKind::Print => {
                self.advance();
                self.expect(TokenKind::LParen, "`(` after `print`")?;
                let value = self.parse_expression()?;
                self.expect(TokenKind::RParen, "`)` after the printed value")?;
                Ok(Expr::Print(Box::new(Print {
                    value,
                    span: self.span_from(token.span),
                })))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "`)` to close the parenthesized expression")?;
                Ok(expr)
            }
            _ => Err(self.error_at_current("expression")),
        }
    }

    /// Arguments after an already consumed `(`, including the closing `)`
    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "`,` or `)` in the argument list")?;
        Ok(args)
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    let span = left.span().to(right.span());
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        span,
    }
}

/// Parses an already tokenized program
pub fn parse(tokens: Vec<Token>) -> Result<Program> {
    Parser::new(tokens).parse()
}

/// Lexes and parses `source` in one go
pub fn parse_source(source: &str, file_id: u32) -> Result<Program> {
    let tokens = Lexer::new().lex(source, file_id).collect::<Result<Vec<_>>>()?;
    parse(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        match parse_source(source, 0) {
            Ok(program) => program,
            Err(err) => panic!("parse failed: {}", err),
        }
    }

    fn parse_expr(source: &str) -> Expr {
        let program = parse_ok(&format!("int main() {{ return {}; }}", source));
        program.functions[0]
            .return_value
            .clone()
            .expect("missing return value")
    }

    /// Renders an expression fully parenthesized
    fn sexpr(expr: &Expr) -> String {
        match expr {
            Expr::Number { value, .. } => value.to_string(),
            Expr::Variable { name, .. } => name.clone(),
            Expr::Call(call) => format!(
                "{}({})",
                call.callee,
                call.args.iter().map(sexpr).collect::<Vec<_>>().join(", ")
            ),
            Expr::Print(print) => format!("print({})", sexpr(&print.value)),
            Expr::Unary { op, operand, .. } => {
                let symbol = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::BitNot => "~",
                    UnaryOp::Not => "!",
                };
                format!("({}{})", symbol, sexpr(operand))
            }
            Expr::Binary { op, left, right, .. } => {
                format!("({} {} {})", sexpr(left), op.symbol(), sexpr(right))
            }
        }
    }

    #[test]
    fn test_parse_minimal_function() {
        let program = parse_ok("int main() { return 0; }");
        assert!(program.prototypes.is_empty());
        assert_eq!(program.functions.len(), 1);
        let main = &program.functions[0];
        assert_eq!(main.name(), "main");
        assert!(main.prototype.params.is_empty());
        assert!(main.body.is_empty());
        assert!(matches!(main.return_value, Some(Expr::Number { value: 0, .. })));
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(sexpr(&parse_expr("2 + 3 * 4")), "(2 + (3 * 4))");
        assert_eq!(sexpr(&parse_expr("10 - 4 - 3")), "((10 - 4) - 3)");
        assert_eq!(sexpr(&parse_expr("8 / 2 * 3")), "((8 / 2) * 3)");
        assert_eq!(sexpr(&parse_expr("(2 + 3) * 4")), "((2 + 3) * 4)");
    }

    #[test]
    fn test_relational_is_loosest() {
        assert_eq!(sexpr(&parse_expr("a + 1 < b * 2")), "((a + 1) < (b * 2))");
        assert_eq!(sexpr(&parse_expr("a < b == c")), "((a < b) == c)");
        assert_eq!(sexpr(&parse_expr("x = y < 3")), "((x = y) < 3)");
    }

    #[test]
    fn test_assignment_is_right_associative() {
        assert_eq!(sexpr(&parse_expr("a = b = 3")), "(a = (b = 3))");
        assert_eq!(sexpr(&parse_expr("a = b + 1")), "(a = (b + 1))");
    }

    #[test]
    fn test_unary_operators() {
        assert_eq!(sexpr(&parse_expr("-x * 2")), "((-x) * 2)");
        assert_eq!(sexpr(&parse_expr("!~-1")), "(!(~(-1)))");
    }

    #[test]
    fn test_calls() {
        assert_eq!(sexpr(&parse_expr("f()")), "f()");
        assert_eq!(sexpr(&parse_expr("add(1, g(x) + 2)")), "add(1, (g(x) + 2))");
    }

    #[test]
    fn test_prototype_and_function() {
        let program = parse_ok("int add(a, b);\nint add(a, b) { return a + b; }\nint main() { return add(1, 2); }");
        assert_eq!(program.prototypes.len(), 1);
        assert_eq!(program.prototypes[0].params, vec!["a", "b"]);
        assert_eq!(program.functions.len(), 2);
        assert!(program.function("add").is_some());
    }

    #[test]
    fn test_statements() {
        let program = parse_ok(
            "int main() {
                int x;
                int y = 2;
                print(y);
                if (y < 3) { x = 1; } else { x = 2; }
                for (i = 0; i < 3; i = i + 1) { print(i); }
                for (j = 0; j < 3;) { print(j); }
                return x;
            }",
        );
        let main = &program.functions[0];
        assert_eq!(main.body.len(), 6);
        assert!(matches!(&main.body[0], Stmt::Declare { name, value: None, .. } if name == "x"));
        assert!(matches!(&main.body[1], Stmt::Declare { value: Some(_), .. }));
        assert!(matches!(&main.body[2], Stmt::Expr(Expr::Print(_))));
        assert!(matches!(&main.body[3], Stmt::If(_)));
        match &main.body[4] {
            Stmt::For(node) => {
                assert_eq!(node.var, "i");
                assert_eq!(sexpr(node.step.as_ref().unwrap()), "(i = (i + 1))");
            }
            other => panic!("expected for loop, got {:?}", other),
        }
        assert!(matches!(&main.body[5], Stmt::For(For { step: None, .. })));
        assert!(main.return_value.is_some());
    }

    #[test]
    fn test_print_is_an_expression() {
        let program = parse_ok("int main() { print(1); return print(4) + 1; }");
        let main = &program.functions[0];
        assert!(matches!(&main.body[0], Stmt::Expr(Expr::Print(_))));
        assert_eq!(sexpr(main.return_value.as_ref().unwrap()), "(print(4) + 1)");
    }

    #[test]
    fn test_return_inside_branches_is_a_statement() {
        let program = parse_ok("int main() { if (1 < 2) { return 10; } else { return 20; } }");
        let main = &program.functions[0];
        assert!(main.return_value.is_none());
        match &main.body[0] {
            Stmt::If(node) => {
                assert!(matches!(node.then_body[0], Stmt::Return { .. }));
                assert!(matches!(node.else_body[0], Stmt::Return { .. }));
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_else_is_an_error() {
        let err = parse_source("int main() { if (1) { return 1; } return 2; }", 0).unwrap_err();
        match err {
            CompileError::Parse { found, expected, .. } => {
                assert_eq!(found, "keyword `return`");
                assert_eq!(expected, "`else` branch");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_first_unexpected_token_is_reported() {
        let err = parse_source("int main() { return 1 + ; }", 0).unwrap_err();
        match err {
            CompileError::Parse { found, span, .. } => {
                assert_eq!(found, "`;`");
                assert_eq!(span.start.column, 25);
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_literal() {
        let err = parse_source("int main() { return 99999999999999999999; }", 0).unwrap_err();
        assert!(matches!(err, CompileError::Parse { .. }));
    }

    #[test]
    fn test_empty_program_is_an_error() {
        assert!(matches!(parse_source("", 0), Err(CompileError::Parse { .. })));
    }

    #[test]
    fn test_lex_errors_surface_through_parse_source() {
        assert!(matches!(
            parse_source("int main() { return 1 # 2; }", 0),
            Err(CompileError::Lex { ch: '#', .. })
        ));
    }
}
