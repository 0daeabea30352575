use thiserror::Error;

use crate::ast::{AssignTarget, BinaryOperator, Expression, Statement, UnaryOperator};
use crate::token::{Span, Token, TokenKind};

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Expected {expected}, got {found} at line {line}, column {column}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },
    #[error("Invalid assignment target at line {line}, column {column}")]
    InvalidAssignmentTarget { line: usize, column: usize },
    #[error("'++' requires a plain variable at line {line}, column {column}")]
    InvalidIncrementTarget { line: usize, column: usize },
    #[error("Only named functions and methods can be called at line {line}, column {column}")]
    InvalidCallTarget { line: usize, column: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    current: Token,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.is_empty() {
            tokens.push(Token::new(TokenKind::Eof, Span::default()));
        }
        let current = tokens[0].clone();
        Self {
            tokens,
            pos: 0,
            current,
        }
    }

    /// Parses a whole function body: statements until end of input.
    ///
    /// Bodies arrive as the text between `=> {` and the matching `}`, which
    /// is usually uniformly indented; the synthetic indentation that opens
    /// and closes such a body is transparent at this level.
    pub fn parse_body(mut self) -> ParseResult<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            match self.current.kind {
                TokenKind::Eof => break,
                TokenKind::Semicolon | TokenKind::Indent | TokenKind::Dedent => {
                    self.advance();
                }
                _ => statements.push(self.parse_statement()?),
            }
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        match self.current.kind {
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::While => self.parse_while(),
            TokenKind::Try => self.parse_try(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Throw => {
                self.advance();
                let value = self.parse_expression()?;
                Ok(Statement::Throw(value))
            }
            TokenKind::Import => self.parse_import(),
            TokenKind::Break => {
                self.advance();
                Ok(Statement::Break)
            }
            TokenKind::Continue => {
                self.advance();
                Ok(Statement::Continue)
            }
            TokenKind::Ident(_) if self.at_echo_statement() => {
                self.advance();
                let value = self.parse_expression()?;
                Ok(Statement::Echo(value))
            }
            _ => self.parse_inline_statement(),
        }
    }

    /// Assignment, increment, or bare expression. Also used for the init and
    /// step slots of a `for` header, which admit exactly these forms.
    fn parse_inline_statement(&mut self) -> ParseResult<Statement> {
        let span = self.current.span();
        let expr = self.parse_expression()?;

        if matches!(self.current.kind, TokenKind::Assign) {
            self.advance();
            let target = Self::assign_target(expr, span)?;
            let value = self.parse_expression()?;
            return Ok(Statement::Assign { target, value });
        }

        if let Expression::PostfixIncrement { name } = expr {
            return Ok(Statement::Increment { name });
        }
        Ok(Statement::Expr(expr))
    }

    /// `echo` is a statement form but not a reserved word: `echo expr`
    /// prints, while `echo = expr` assigns to a variable of that name.
    fn at_echo_statement(&self) -> bool {
        matches!(&self.current.kind, TokenKind::Ident(name) if name == "echo")
            && !matches!(self.peek_kind(), TokenKind::Assign)
    }

    fn assign_target(expr: Expression, span: Span) -> ParseResult<AssignTarget> {
        match expr {
            Expression::Variable(name) => Ok(AssignTarget::Name(name)),
            Expression::PropertyAccess { receiver, name } => Ok(AssignTarget::Property {
                receiver: *receiver,
                name,
            }),
            Expression::Index { array, index } => Ok(AssignTarget::Index {
                array: *array,
                index: *index,
            }),
            _ => Err(ParseError::InvalidAssignmentTarget {
                line: span.line,
                column: span.column,
            }),
        }
    }

    fn parse_if(&mut self) -> ParseResult<Statement> {
        self.expect(TokenKind::If, "if")?;
        let condition = self.parse_expression()?;
        let then_body = self.parse_block()?;

        let mut else_body = Vec::new();
        if matches!(self.current.kind, TokenKind::Else) {
            self.advance();
            else_body = self.parse_block()?;
        }

        Ok(Statement::If {
            condition,
            then_body,
            else_body,
        })
    }

    fn parse_for(&mut self) -> ParseResult<Statement> {
        self.expect(TokenKind::For, "for")?;
        self.expect(TokenKind::LParen, "'('")?;
        let init = self.parse_inline_statement()?;
        self.expect(TokenKind::Semicolon, "';'")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "';'")?;
        let step = self.parse_inline_statement()?;
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_block()?;

        Ok(Statement::For {
            init: Box::new(init),
            condition,
            step: Box::new(step),
            body,
        })
    }

    fn parse_while(&mut self) -> ParseResult<Statement> {
        self.expect(TokenKind::While, "while")?;
        let condition = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(Statement::While { condition, body })
    }

    fn parse_try(&mut self) -> ParseResult<Statement> {
        self.expect(TokenKind::Try, "try")?;
        let try_body = self.parse_block()?;
        self.expect(TokenKind::Catch, "catch")?;
        self.expect(TokenKind::LParen, "'('")?;
        let error_name = self.expect_identifier()?;
        self.expect(TokenKind::RParen, "')'")?;
        let catch_body = self.parse_block()?;

        let finally_body = if matches!(self.current.kind, TokenKind::Finally) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Statement::TryCatch {
            try_body,
            error_name,
            catch_body,
            finally_body,
        })
    }

    fn parse_return(&mut self) -> ParseResult<Statement> {
        self.expect(TokenKind::Return, "return")?;
        if matches!(
            self.current.kind,
            TokenKind::Semicolon
                | TokenKind::RBrace
                | TokenKind::Dedent
                | TokenKind::Eof
                | TokenKind::Else
                | TokenKind::Catch
                | TokenKind::Finally
        ) {
            return Ok(Statement::Return(None));
        }
        let value = self.parse_expression()?;
        Ok(Statement::Return(Some(value)))
    }

    fn parse_import(&mut self) -> ParseResult<Statement> {
        self.expect(TokenKind::Import, "import")?;
        let module = self.expect_identifier()?;
        let alias = if matches!(self.current.kind, TokenKind::As) {
            self.advance();
            Some(self.expect_identifier()?)
        } else {
            None
        };
        Ok(Statement::Import { module, alias })
    }

    /// Block dispatch on the leading token.
    ///
    /// `INDENT` opens an indentation block, `{` a brace block, and `:`
    /// defers to whichever of the two follows — or a single statement when
    /// neither does. Brace and colon bodies coexist in the same corpus, so
    /// all three shapes must parse.
    fn parse_block(&mut self) -> ParseResult<Vec<Statement>> {
        match self.current.kind {
            TokenKind::Indent => self.parse_indent_block(),
            TokenKind::LBrace => self.parse_brace_block(),
            TokenKind::Colon => {
                self.advance();
                match self.current.kind {
                    TokenKind::Indent => self.parse_indent_block(),
                    TokenKind::LBrace => self.parse_brace_block(),
                    _ => Ok(vec![self.parse_statement()?]),
                }
            }
            _ => Err(self.error("a block")),
        }
    }

    fn parse_indent_block(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect(TokenKind::Indent, "an indented block")?;
        let mut statements = Vec::new();
        loop {
            match self.current.kind {
                TokenKind::Dedent => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => break,
                TokenKind::Semicolon => {
                    self.advance();
                }
                _ => statements.push(self.parse_statement()?),
            }
        }
        Ok(statements)
    }

    fn parse_brace_block(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut statements = Vec::new();
        loop {
            match self.current.kind {
                // Synthetic indentation is meaningless inside braces.
                TokenKind::Indent | TokenKind::Dedent | TokenKind::Semicolon => {
                    self.advance();
                }
                TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => return Err(self.error("'}'")),
                _ => statements.push(self.parse_statement()?),
            }
        }
        Ok(statements)
    }

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_and()?;
        while matches!(self.current.kind, TokenKind::OrOr) {
            self.advance();
            let right = self.parse_and()?;
            expr = Self::binary(expr, BinaryOperator::Or, right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_equality()?;
        while matches!(self.current.kind, TokenKind::AndAnd) {
            self.advance();
            let right = self.parse_equality()?;
            expr = Self::binary(expr, BinaryOperator::And, right);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_comparison()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Eq => BinaryOperator::Eq,
                TokenKind::NotEq => BinaryOperator::NotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            expr = Self::binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_additive()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Less => BinaryOperator::Less,
                TokenKind::LessEq => BinaryOperator::LessEq,
                TokenKind::Greater => BinaryOperator::Greater,
                TokenKind::GreaterEq => BinaryOperator::GreaterEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            expr = Self::binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            expr = Self::binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Star => BinaryOperator::Mul,
                TokenKind::Slash => BinaryOperator::Div,
                TokenKind::Percent => BinaryOperator::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            expr = Self::binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> ParseResult<Expression> {
        match self.current.kind {
            TokenKind::Bang => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expression::UnaryOp {
                    op: UnaryOperator::Not,
                    operand: Box::new(operand),
                })
            }
            // `-x` is sugar for `0 - x`; promotion rules then apply as for
            // any other subtraction.
            TokenKind::Minus => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Self::binary(Expression::Int(0), BinaryOperator::Sub, operand))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current.kind {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_identifier()?;
                    if matches!(self.current.kind, TokenKind::LParen) {
                        let args = self.parse_call_args()?;
                        expr = Expression::MethodCall {
                            receiver: Box::new(expr),
                            method: name,
                            args,
                        };
                    } else {
                        expr = Expression::PropertyAccess {
                            receiver: Box::new(expr),
                            name,
                        };
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expression::Index {
                        array: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                TokenKind::LParen => {
                    let span = self.current.span();
                    let Expression::Variable(name) = expr else {
                        return Err(ParseError::InvalidCallTarget {
                            line: span.line,
                            column: span.column,
                        });
                    };
                    let args = self.parse_call_args()?;
                    expr = Expression::FunctionCall { name, args };
                }
                TokenKind::PlusPlus => {
                    let span = self.current.span();
                    self.advance();
                    let Expression::Variable(name) = expr else {
                        return Err(ParseError::InvalidIncrementTarget {
                            line: span.line,
                            column: span.column,
                        });
                    };
                    expr = Expression::PostfixIncrement { name };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        match &self.current.kind {
            TokenKind::Int(value) => {
                let value = *value;
                self.advance();
                Ok(Expression::Int(value))
            }
            TokenKind::Float(value) => {
                let value = *value;
                self.advance();
                Ok(Expression::Float(value))
            }
            TokenKind::Str(value) => {
                let value = value.clone();
                self.advance();
                Ok(Expression::Str(value))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::Bool(false))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expression::Null)
            }
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(Expression::Variable(name))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !matches!(self.current.kind, TokenKind::RBracket) {
                    elements.push(self.parse_expression()?);
                    while matches!(self.current.kind, TokenKind::Comma) {
                        self.advance();
                        elements.push(self.parse_expression()?);
                    }
                }
                self.expect(TokenKind::RBracket, "']'")?;
                Ok(Expression::ArrayLiteral(elements))
            }
            _ => Err(self.error("an expression")),
        }
    }

    fn parse_call_args(&mut self) -> ParseResult<Vec<Expression>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if !matches!(self.current.kind, TokenKind::RParen) {
            args.push(self.parse_expression()?);
            while matches!(self.current.kind, TokenKind::Comma) {
                self.advance();
                args.push(self.parse_expression()?);
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Expression {
        Expression::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    fn expect(&mut self, kind: TokenKind, label: &str) -> ParseResult<()> {
        if self.current.kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.error(label))
        }
    }

    fn expect_identifier(&mut self) -> ParseResult<String> {
        if let TokenKind::Ident(name) = &self.current.kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error("an identifier"))
        }
    }

    fn advance(&mut self) -> Token {
        let next = self
            .tokens
            .get(self.pos + 1)
            .cloned()
            .unwrap_or(Token::new(TokenKind::Eof, Span::default()));
        self.pos = self.pos.saturating_add(1);
        std::mem::replace(&mut self.current, next)
    }

    fn peek_kind(&self) -> &TokenKind {
        self.tokens
            .get(self.pos + 1)
            .map(|token| &token.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn error(&self, expected: &str) -> ParseError {
        let span = self.current.span();
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: format!("{:?}", self.current.kind),
            line: span.line,
            column: span.column,
        }
    }
}

pub fn parse_tokens(tokens: Vec<Token>) -> ParseResult<Vec<Statement>> {
    Parser::new(tokens).parse_body()
}
