use std::{iter::Peekable, rc::Rc, str::CharIndices};

use crate::error::{ErrorKind, LangError, LangResult};
use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    column: usize,
    // Newlines inside (), [] and {} are insignificant.
    bracket_depth: usize,
    eof_reached: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            line: 1,
            column: 1,
            bracket_depth: 0,
            eof_reached: false,
        }
    }

    pub fn next_token(&mut self) -> LangResult<Token> {
        loop {
            self.skip_whitespace_and_comments();

            let (start_idx, ch) = match self.chars.peek() {
                Some(&(idx, c)) => (idx, c),
                None => {
                    self.eof_reached = true;
                    let span = Span::new(self.input.len(), self.input.len(), self.line, self.column);
                    return Ok(Token::new(TokenKind::Eof, span));
                }
            };

            let start_line = self.line;
            let start_column = self.column;
            let span1 = |end: usize| Span::new(start_idx, end, start_line, start_column);

            let simple = |lexer: &mut Self, kind: TokenKind| {
                lexer.advance_char();
                Ok(Token::new(kind, span1(start_idx + 1)))
            };

            match ch {
                '\n' => {
                    self.advance_char();
                    if self.bracket_depth > 0 {
                        continue;
                    }
                    return Ok(Token::new(
                        TokenKind::Newline,
                        Span::new(start_idx, start_idx + 1, start_line, start_column),
                    ));
                }
                '\\' => {
                    // Line continuation: backslash-newline joins lines.
                    self.advance_char();
                    match self.chars.peek() {
                        Some(&(_, '\n')) => {
                            self.advance_char();
                            continue;
                        }
                        _ => {
                            return Err(LangError::new(
                                ErrorKind::InvalidCharacter('\\'),
                                span1(start_idx + 1),
                            ));
                        }
                    }
                }
                '(' => {
                    self.bracket_depth += 1;
                    return simple(self, TokenKind::LParen);
                }
                ')' => {
                    self.bracket_depth = self.bracket_depth.saturating_sub(1);
                    return simple(self, TokenKind::RParen);
                }
                '[' => {
                    self.bracket_depth += 1;
                    return simple(self, TokenKind::LBracket);
                }
                ']' => {
                    self.bracket_depth = self.bracket_depth.saturating_sub(1);
                    return simple(self, TokenKind::RBracket);
                }
                '{' => {
                    self.bracket_depth += 1;
                    return simple(self, TokenKind::LBrace);
                }
                '}' => {
                    self.bracket_depth = self.bracket_depth.saturating_sub(1);
                    return simple(self, TokenKind::RBrace);
                }
                ',' => return simple(self, TokenKind::Comma),
                '.' => return simple(self, TokenKind::Dot),
                ':' => return simple(self, TokenKind::Colon),
                '*' => return simple(self, TokenKind::Star),
                '/' => return simple(self, TokenKind::Slash),
                '%' => return simple(self, TokenKind::Percent),
                '-' => return simple(self, TokenKind::Minus),
                '+' => {
                    self.advance_char();
                    if self.peek_is('=') {
                        self.advance_char();
                        return Ok(Token::new(TokenKind::PlusAssign, span1(start_idx + 2)));
                    }
                    return Ok(Token::new(TokenKind::Plus, span1(start_idx + 1)));
                }
                '=' => {
                    self.advance_char();
                    if self.peek_is('=') {
                        self.advance_char();
                        return Ok(Token::new(TokenKind::Eq, span1(start_idx + 2)));
                    }
                    return Ok(Token::new(TokenKind::Assign, span1(start_idx + 1)));
                }
                '!' => {
                    self.advance_char();
                    if self.peek_is('=') {
                        self.advance_char();
                        return Ok(Token::new(TokenKind::Neq, span1(start_idx + 2)));
                    }
                    return Err(LangError::new(
                        ErrorKind::InvalidCharacter('!'),
                        span1(start_idx + 1),
                    ));
                }
                '<' => {
                    self.advance_char();
                    if self.peek_is('=') {
                        self.advance_char();
                        return Ok(Token::new(TokenKind::Leq, span1(start_idx + 2)));
                    }
                    return Ok(Token::new(TokenKind::Lt, span1(start_idx + 1)));
                }
                '>' => {
                    self.advance_char();
                    if self.peek_is('=') {
                        self.advance_char();
                        return Ok(Token::new(TokenKind::Geq, span1(start_idx + 2)));
                    }
                    return Ok(Token::new(TokenKind::Gt, span1(start_idx + 1)));
                }
                '\'' => return self.read_string(start_idx, start_line, start_column),
                c if c.is_ascii_alphabetic() || c == '_' => {
                    return Ok(self.read_identifier(start_idx, start_line, start_column));
                }
                c if c.is_ascii_digit() => {
                    return self.read_integer(start_idx, start_line, start_column);
                }
                c => {
                    return Err(LangError::new(
                        ErrorKind::InvalidCharacter(c),
                        span1(start_idx + c.len_utf8()),
                    ));
                }
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c == ' ' || c == '\t' || c == '\r' {
                self.advance_char();
            } else if c == '#' {
                while let Some(&(_, c)) = self.chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance_char();
                }
            } else {
                break;
            }
        }
    }

    fn read_identifier(&mut self, start: usize, line: usize, column: usize) -> Token {
        self.advance_char();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance_char();
            } else {
                break;
            }
        }

        let end_idx = self.current_index();
        let ident = &self.input[start..end_idx];
        let kind = match ident {
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "endif" => TokenKind::Endif,
            "foreach" => TokenKind::Foreach,
            "endforeach" => TokenKind::Endforeach,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "in" => TokenKind::In,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => TokenKind::Identifier(Rc::from(ident)),
        };
        Token::new(kind, Span::new(start, end_idx, line, column))
    }

    fn read_integer(&mut self, start: usize, line: usize, column: usize) -> LangResult<Token> {
        self.advance_char();

        let radix = if self.input[start..].starts_with('0') {
            match self.chars.peek() {
                Some(&(_, 'x')) | Some(&(_, 'X')) => {
                    self.advance_char();
                    16
                }
                Some(&(_, 'o')) | Some(&(_, 'O')) => {
                    self.advance_char();
                    8
                }
                _ => 10,
            }
        } else {
            10
        };

        let digits_start = self.current_index();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_alphanumeric() {
                self.advance_char();
            } else {
                break;
            }
        }
        let end_idx = self.current_index();
        let span = Span::new(start, end_idx, line, column);

        let digits = if radix == 10 {
            &self.input[start..end_idx]
        } else {
            &self.input[digits_start..end_idx]
        };

        let value = i64::from_str_radix(digits, radix).map_err(|_| {
            LangError::new(
                ErrorKind::InvalidNumber(self.input[start..end_idx].to_string()),
                span,
            )
        })?;
        Ok(Token::new(TokenKind::Integer(value), span))
    }

    fn read_string(&mut self, start: usize, line: usize, column: usize) -> LangResult<Token> {
        self.advance_char(); // opening quote

        if self.input[start..].starts_with("'''") {
            return self.read_multiline_string(start, line, column);
        }

        let mut value = String::new();
        while let Some(&(idx, c)) = self.chars.peek() {
            match c {
                '\'' => {
                    self.advance_char();
                    return Ok(Token::new(
                        TokenKind::Str(Rc::from(value.as_str())),
                        Span::new(start, idx + 1, line, column),
                    ));
                }
                '\n' => break,
                '\\' => {
                    self.advance_char();
                    let (esc_idx, esc) = match self.chars.peek() {
                        Some(&(i, e)) => (i, e),
                        None => break,
                    };
                    let decoded = match esc {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        '\\' => '\\',
                        '\'' => '\'',
                        other => {
                            return Err(LangError::new(
                                ErrorKind::InvalidEscape(other),
                                Span::new(esc_idx - 1, esc_idx + other.len_utf8(), self.line, self.column),
                            ));
                        }
                    };
                    value.push(decoded);
                    self.advance_char();
                }
                other => {
                    value.push(other);
                    self.advance_char();
                }
            }
        }
        Err(LangError::new(
            ErrorKind::UnterminatedString,
            Span::new(start, self.current_index(), line, column),
        ))
    }

    /// Triple-quoted strings span lines and apply no escape processing.
    fn read_multiline_string(
        &mut self,
        start: usize,
        line: usize,
        column: usize,
    ) -> LangResult<Token> {
        // The first quote was consumed by the caller.
        self.advance_char();
        self.advance_char();
        let content_start = self.current_index();

        while let Some(&(idx, _)) = self.chars.peek() {
            if self.input[idx..].starts_with("'''") {
                let value = &self.input[content_start..idx];
                self.advance_char();
                self.advance_char();
                self.advance_char();
                return Ok(Token::new(
                    TokenKind::Str(Rc::from(value)),
                    Span::new(start, idx + 3, line, column),
                ));
            }
            self.advance_char();
        }
        Err(LangError::new(
            ErrorKind::UnterminatedString,
            Span::new(start, self.input.len(), line, column),
        ))
    }

    fn peek_is(&mut self, expected: char) -> bool {
        matches!(self.chars.peek(), Some(&(_, c)) if c == expected)
    }

    fn advance_char(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, c)) = next {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn current_index(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(idx, _)| *idx)
            .unwrap_or(self.input.len())
    }
}

pub fn tokenize(input: &str) -> LangResult<Vec<Token>> {
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
    fn tokenizes_a_small_build_file() {
        let input = indoc! {"
            project('demo')
            srcs = files(['main.c'])
        "};
        let expected = vec![
            TokenKind::Identifier("project".into()),
            TokenKind::LParen,
            TokenKind::Str("demo".into()),
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::Identifier("srcs".into()),
            TokenKind::Assign,
            TokenKind::Identifier("files".into()),
            TokenKind::LParen,
            TokenKind::LBracket,
            TokenKind::Str("main.c".into()),
            TokenKind::RBracket,
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::Eof,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn newlines_inside_brackets_are_insignificant() {
        let input = "x = [\n  1,\n  2,\n]\n";
        let expected = vec![
            TokenKind::Identifier("x".into()),
            TokenKind::Assign,
            TokenKind::LBracket,
            TokenKind::Integer(1),
            TokenKind::Comma,
            TokenKind::Integer(2),
            TokenKind::Comma,
            TokenKind::RBracket,
            TokenKind::Newline,
            TokenKind::Eof,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn decodes_escape_sequences() {
        let tokens = kinds("x = 'a\\nb\\'c'\n");
        assert_eq!(tokens[2], TokenKind::Str("a\nb'c".into()));
    }

    #[test]
    fn reads_hex_and_octal_integers() {
        assert_eq!(kinds("0xff\n")[0], TokenKind::Integer(255));
        assert_eq!(kinds("0o755\n")[0], TokenKind::Integer(0o755));
    }

    #[test]
    fn multiline_strings_keep_raw_content() {
        let tokens = kinds("x = '''a\n\\n b'''\n");
        assert_eq!(tokens[2], TokenKind::Str("a\n\\n b".into()));
    }

    #[test]
    fn comments_run_to_end_of_line() {
        let tokens = kinds("x = 1 # set x\ny = 2\n");
        assert!(tokens.contains(&TokenKind::Identifier("y".into())));
        assert!(!tokens
            .iter()
            .any(|kind| matches!(kind, TokenKind::Identifier(name) if &**name == "set")));
    }

    #[test]
    fn errors_on_invalid_character() {
        let err = tokenize("x = 1 @ 2\n").expect_err("expected lexing failure");
        assert_eq!(err.kind, ErrorKind::InvalidCharacter('@'));
    }

    #[test]
    fn errors_on_unterminated_string() {
        let err = tokenize("x = 'oops\n").expect_err("expected lexing failure");
        assert_eq!(err.kind, ErrorKind::UnterminatedString);
        assert_eq!(err.span.unwrap().line, 1);
    }

    #[test]
    fn errors_on_invalid_escape() {
        let err = tokenize("x = 'a\\qb'\n").expect_err("expected lexing failure");
        assert_eq!(err.kind, ErrorKind::InvalidEscape('q'));
    }

    #[test]
    fn errors_on_invalid_number() {
        let err = tokenize("x = 0xzz\n").expect_err("expected lexing failure");
        assert_eq!(err.kind, ErrorKind::InvalidNumber("0xzz".to_string()));
    }
}
