use thiserror::Error;

use crate::token::{Span, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexerState {
    LineBegin,
    TokenStart,
}

enum StepOutcome {
    Emit(Token),
    Continue,
}

#[derive(Debug, Error, PartialEq)]
pub enum LexError {
    #[error("Unexpected character '{character}' at line {line}, column {column}")]
    UnexpectedCharacter {
        character: char,
        line: usize,
        column: usize,
    },
    #[error("Unterminated string literal at line {line}, column {column}")]
    UnterminatedString { line: usize, column: usize },
    #[error("Inconsistent dedent to {indent} columns at line {line}, column {column}")]
    InconsistentDedent {
        indent: usize,
        line: usize,
        column: usize,
    },
    #[error("Invalid number literal '{literal}' at line {line}, column {column}")]
    InvalidNumber {
        literal: String,
        line: usize,
        column: usize,
    },
    #[error("Lexer invariant violated: {message}")]
    InvariantViolation { message: &'static str },
}

pub type LexResult<T> = Result<T, LexError>;

/// Tokenizer for one arrow-function body.
///
/// Newlines never become tokens; they only feed the indentation machine,
/// which emits synthetic `Indent`/`Dedent` pairs. The parser skips those
/// inside brace blocks and requires them inside colon blocks, so both body
/// styles lex through the same path.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    indent_stack: Vec<usize>,
    pending_tokens: Vec<Token>,
    state: LexerState,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            column: 1,
            indent_stack: vec![0],
            pending_tokens: Vec::new(),
            state: LexerState::LineBegin,
        }
    }

    pub fn next_token(&mut self) -> LexResult<Token> {
        loop {
            if let Some(token) = self.pending_tokens.pop() {
                return Ok(token);
            }

            match self.step_state()? {
                StepOutcome::Emit(token) => return Ok(token),
                StepOutcome::Continue => continue,
            }
        }
    }

    fn step_state(&mut self) -> LexResult<StepOutcome> {
        match self.state {
            LexerState::LineBegin => {
                self.consume_while(|c| c == ' ' || c == '\t');
                match self.peek_char() {
                    // Blank and comment-only lines leave the indent stack alone.
                    Some('\n') => {
                        self.consume_char();
                        return Ok(StepOutcome::Continue);
                    }
                    Some('#') => {
                        self.consume_while(|c| c != '\n');
                        return Ok(StepOutcome::Continue);
                    }
                    None => {
                        self.state = LexerState::TokenStart;
                        return Ok(StepOutcome::Continue);
                    }
                    _ => {}
                }

                let indent_level = self.column - 1;
                let current_indent = self.current_indent()?;
                let span = self.span_here();

                if indent_level > current_indent {
                    self.indent_stack.push(indent_level);
                    self.state = LexerState::TokenStart;
                    return Ok(StepOutcome::Emit(Token::new(TokenKind::Indent, span)));
                }

                if indent_level < current_indent {
                    while let Some(&top) = self.indent_stack.last() {
                        if top > indent_level {
                            self.indent_stack.pop();
                            self.pending_tokens.push(Token::new(TokenKind::Dedent, span));
                        } else {
                            break;
                        }
                    }
                    if self.current_indent()? != indent_level {
                        return Err(LexError::InconsistentDedent {
                            indent: indent_level,
                            line: span.line,
                            column: span.column,
                        });
                    }
                    self.state = LexerState::TokenStart;
                    return Ok(StepOutcome::Continue);
                }

                self.state = LexerState::TokenStart;
                Ok(StepOutcome::Continue)
            }
            LexerState::TokenStart => {
                self.consume_while(|c| c == ' ' || c == '\t');
                match self.peek_char() {
                    None => self.handle_eof(),
                    Some('#') => {
                        self.consume_while(|c| c != '\n');
                        Ok(StepOutcome::Continue)
                    }
                    Some('\n') => {
                        self.consume_char();
                        self.state = LexerState::LineBegin;
                        Ok(StepOutcome::Continue)
                    }
                    Some(_) => Ok(StepOutcome::Emit(self.read_token()?)),
                }
            }
        }
    }

    fn handle_eof(&mut self) -> LexResult<StepOutcome> {
        // At physical EOF, all open indentation levels close before Eof.
        let span = self.span_here();
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.pending_tokens.push(Token::new(TokenKind::Dedent, span));
        }
        if !self.pending_tokens.is_empty() {
            return Ok(StepOutcome::Continue);
        }
        Ok(StepOutcome::Emit(Token::new(TokenKind::Eof, span)))
    }

    fn read_token(&mut self) -> LexResult<Token> {
        let span = self.span_here();
        let ch = self.peek_char().ok_or(LexError::InvariantViolation {
            message: "read_token called at end of input",
        })?;

        let kind = match ch {
            '+' => {
                self.consume_char();
                if self.eat('+') {
                    TokenKind::PlusPlus
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                self.consume_char();
                TokenKind::Minus
            }
            '*' => {
                self.consume_char();
                TokenKind::Star
            }
            '/' => {
                self.consume_char();
                TokenKind::Slash
            }
            '%' => {
                self.consume_char();
                TokenKind::Percent
            }
            '=' => {
                self.consume_char();
                if self.eat('=') {
                    TokenKind::Eq
                } else if self.eat('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                self.consume_char();
                if self.eat('=') {
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                self.consume_char();
                if self.eat('=') {
                    TokenKind::LessEq
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                self.consume_char();
                if self.eat('=') {
                    TokenKind::GreaterEq
                } else {
                    TokenKind::Greater
                }
            }
            '&' => {
                self.consume_char();
                if self.eat('&') {
                    TokenKind::AndAnd
                } else {
                    return Err(LexError::UnexpectedCharacter {
                        character: '&',
                        line: span.line,
                        column: span.column,
                    });
                }
            }
            '|' => {
                self.consume_char();
                if self.eat('|') {
                    TokenKind::OrOr
                } else {
                    return Err(LexError::UnexpectedCharacter {
                        character: '|',
                        line: span.line,
                        column: span.column,
                    });
                }
            }
            '(' => {
                self.consume_char();
                TokenKind::LParen
            }
            ')' => {
                self.consume_char();
                TokenKind::RParen
            }
            '{' => {
                self.consume_char();
                TokenKind::LBrace
            }
            '}' => {
                self.consume_char();
                TokenKind::RBrace
            }
            '[' => {
                self.consume_char();
                TokenKind::LBracket
            }
            ']' => {
                self.consume_char();
                TokenKind::RBracket
            }
            ';' => {
                self.consume_char();
                TokenKind::Semicolon
            }
            ',' => {
                self.consume_char();
                TokenKind::Comma
            }
            '.' => {
                self.consume_char();
                TokenKind::Dot
            }
            ':' => {
                self.consume_char();
                TokenKind::Colon
            }
            '"' => return self.read_string(span),
            c if c.is_alphabetic() || c == '_' => return Ok(self.read_identifier(span)),
            c if c.is_ascii_digit() => return self.read_number(span),
            _ => {
                return Err(LexError::UnexpectedCharacter {
                    character: ch,
                    line: span.line,
                    column: span.column,
                });
            }
        };

        Ok(Token::new(kind, span))
    }

    fn read_identifier(&mut self, span: Span) -> Token {
        let start = self.pos;
        self.consume_while(|c| c.is_alphanumeric() || c == '_');
        let ident = &self.input[start..self.pos];

        let kind = match ident {
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "for" => TokenKind::For,
            "while" => TokenKind::While,
            "try" => TokenKind::Try,
            "catch" => TokenKind::Catch,
            "finally" => TokenKind::Finally,
            "return" => TokenKind::Return,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "throw" => TokenKind::Throw,
            "import" => TokenKind::Import,
            "as" => TokenKind::As,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            _ => TokenKind::Ident(ident.to_string()),
        };
        Token::new(kind, span)
    }

    fn read_number(&mut self, span: Span) -> LexResult<Token> {
        let start = self.pos;
        self.consume_while(|c| c.is_ascii_digit());

        let is_float = self.peek_char() == Some('.')
            && self
                .char_at(self.pos + 1)
                .is_some_and(|c| c.is_ascii_digit());
        if is_float {
            self.consume_char();
            self.consume_while(|c| c.is_ascii_digit());
        }

        let literal = &self.input[start..self.pos];
        let kind = if is_float {
            let value = literal
                .parse::<f64>()
                .map_err(|_| LexError::InvalidNumber {
                    literal: literal.to_string(),
                    line: span.line,
                    column: span.column,
                })?;
            TokenKind::Float(value)
        } else {
            let value = literal
                .parse::<i64>()
                .map_err(|_| LexError::InvalidNumber {
                    literal: literal.to_string(),
                    line: span.line,
                    column: span.column,
                })?;
            TokenKind::Int(value)
        };
        Ok(Token::new(kind, span))
    }

    fn read_string(&mut self, span: Span) -> LexResult<Token> {
        self.consume_char(); // opening quote
        let mut value = String::new();

        loop {
            match self.peek_char() {
                None | Some('\n') => {
                    return Err(LexError::UnterminatedString {
                        line: span.line,
                        column: span.column,
                    });
                }
                Some('"') => {
                    self.consume_char();
                    return Ok(Token::new(TokenKind::Str(value), span));
                }
                Some('\\') => {
                    self.consume_char();
                    match self.consume_char() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('\\') => value.push('\\'),
                        Some('"') => value.push('"'),
                        Some(other) => {
                            // Unknown escapes pass through verbatim.
                            value.push('\\');
                            value.push(other);
                        }
                        None => {
                            return Err(LexError::UnterminatedString {
                                line: span.line,
                                column: span.column,
                            });
                        }
                    }
                }
                Some(c) => {
                    self.consume_char();
                    value.push(c);
                }
            }
        }
    }

    fn consume_while<P>(&mut self, keep_predicate: P)
    where
        P: Fn(char) -> bool,
    {
        while let Some(c) = self.peek_char() {
            if !keep_predicate(c) {
                break;
            }
            self.consume_char();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.consume_char();
            true
        } else {
            false
        }
    }

    fn char_at(&self, index: usize) -> Option<char> {
        if index >= self.input.len() {
            None
        } else {
            self.input[index..].chars().next()
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.char_at(self.pos)
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        match c {
            '\n' => {
                self.line += 1;
                self.column = 1;
            }
            '\t' => self.column += 4,
            _ => self.column += 1,
        }
        Some(c)
    }

    fn span_here(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
        }
    }

    fn current_indent(&self) -> LexResult<usize> {
        self.indent_stack
            .last()
            .copied()
            .ok_or(LexError::InvariantViolation {
                message: "indent stack is empty",
            })
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = LexResult<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_token() {
            Ok(token) => Some(Ok(token)),
            Err(e) => Some(Err(e)),
        }
    }
}

pub fn tokenize(input: &str) -> LexResult<Vec<Token>> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let is_eof = matches!(token.kind, TokenKind::Eof);
        tokens.push(token);
        if is_eof {
            break;
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .expect("tokenize should succeed")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn tokenizes_flat_expression_body() {
        let input = indoc! {r#"
            x = 1 + 2 * 3
            echo x
        "#};
        let expected = vec![
            TokenKind::Ident("x".to_string()),
            TokenKind::Assign,
            TokenKind::Int(1),
            TokenKind::Plus,
            TokenKind::Int(2),
            TokenKind::Star,
            TokenKind::Int(3),
            TokenKind::Ident("echo".to_string()),
            TokenKind::Ident("x".to_string()),
            TokenKind::Eof,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn emits_indent_and_dedent_for_colon_blocks() {
        let input = indoc! {"
            while (i < 10) :
                i++
            echo i
        "};
        let expected = vec![
            TokenKind::While,
            TokenKind::LParen,
            TokenKind::Ident("i".to_string()),
            TokenKind::Less,
            TokenKind::Int(10),
            TokenKind::RParen,
            TokenKind::Colon,
            TokenKind::Indent,
            TokenKind::Ident("i".to_string()),
            TokenKind::PlusPlus,
            TokenKind::Dedent,
            TokenKind::Ident("echo".to_string()),
            TokenKind::Ident("i".to_string()),
            TokenKind::Eof,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn blank_and_comment_lines_do_not_change_indentation() {
        let input = indoc! {"
            if (x) :
                a = 1

                # a comment at any indent
                b = 2
        "};
        let expected = vec![
            TokenKind::If,
            TokenKind::LParen,
            TokenKind::Ident("x".to_string()),
            TokenKind::RParen,
            TokenKind::Colon,
            TokenKind::Indent,
            TokenKind::Ident("a".to_string()),
            TokenKind::Assign,
            TokenKind::Int(1),
            TokenKind::Ident("b".to_string()),
            TokenKind::Assign,
            TokenKind::Int(2),
            TokenKind::Dedent,
            TokenKind::Eof,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn closes_every_open_level_at_end_of_input() {
        let input = "if (a) :\n    if (b) :\n        c = 1";
        let dedents = kinds(input)
            .into_iter()
            .filter(|kind| matches!(kind, TokenKind::Dedent))
            .count();
        assert_eq!(dedents, 2);
    }

    #[test]
    fn tabs_count_as_four_columns() {
        let tabbed = kinds("if (a) :\n\tb = 1\n");
        let spaced = kinds("if (a) :\n    b = 1\n");
        assert_eq!(tabbed, spaced);
    }

    #[test]
    fn reads_two_character_operators() {
        let expected = vec![
            TokenKind::Eq,
            TokenKind::NotEq,
            TokenKind::LessEq,
            TokenKind::GreaterEq,
            TokenKind::AndAnd,
            TokenKind::OrOr,
            TokenKind::PlusPlus,
            TokenKind::Arrow,
            TokenKind::Eof,
        ];
        assert_eq!(kinds("== != <= >= && || ++ =>"), expected);
    }

    #[test]
    fn reads_float_and_int_literals() {
        assert_eq!(
            kinds("1.5 + 2"),
            vec![
                TokenKind::Float(1.5),
                TokenKind::Plus,
                TokenKind::Int(2),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn dot_after_integer_is_property_access_not_float() {
        assert_eq!(
            kinds("m.pi"),
            vec![
                TokenKind::Ident("m".to_string()),
                TokenKind::Dot,
                TokenKind::Ident("pi".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn decodes_string_escapes() {
        assert_eq!(
            kinds(r#""a\nb\t\"c\\""#),
            vec![TokenKind::Str("a\nb\t\"c\\".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn errors_on_unexpected_character() {
        let err = tokenize("x = 1 @ 2").expect_err("expected lexing failure");
        assert_eq!(
            err,
            LexError::UnexpectedCharacter {
                character: '@',
                line: 1,
                column: 7,
            }
        );
    }

    #[test]
    fn errors_on_unterminated_string() {
        let err = tokenize("x = \"abc\n").expect_err("expected unterminated string failure");
        assert_eq!(
            err,
            LexError::UnterminatedString { line: 1, column: 5 }
        );
    }

    #[test]
    fn errors_on_inconsistent_dedent() {
        let input = indoc! {"
            if (a) :
                x = 1
              y = 2
        "};
        let err = tokenize(input).expect_err("expected inconsistent dedent failure");
        assert_eq!(
            err,
            LexError::InconsistentDedent {
                indent: 2,
                line: 3,
                column: 3,
            }
        );
    }

    #[test]
    fn errors_on_integer_overflow() {
        let err = tokenize("n = 99999999999999999999999999").expect_err("expected overflow");
        assert!(err.to_string().contains("Invalid number literal"));
    }
}
