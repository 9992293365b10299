//! Character scanner turning UTF-8 source text into a token stream.
//!
//! The rest of the pipeline only depends on the token contract in
//! [`crate::token`]; the scanner itself stays deliberately simple. Whitespace
//! is insignificant and `//` comments are stripped before tokens reach the
//! parser.

use crate::token::{Token, TokenKind};

/// A lexer over raw source bytes.
///
/// Drift source is ASCII at the token level; string literals may carry
/// arbitrary UTF-8 between their quotes and are passed through untouched.
pub struct Lexer<'a> {
    input: &'a [u8],
    /// Index of the byte under examination.
    position: usize,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        Self {
            input: source.as_bytes(),
            position: 0,
        }
    }

    /// Returns the next token, or an `Eof` token once the input is exhausted.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let Some(ch) = self.peek() else {
            return Token::new(TokenKind::Eof, "");
        };

        match ch {
            b'=' => {
                if self.peek_at(1) == Some(b'=') {
                    self.advance_n(2);
                    Token::new(TokenKind::Eq, "==")
                } else {
                    self.advance();
                    Token::new(TokenKind::Assign, "=")
                }
            }
            b'!' => {
                if self.peek_at(1) == Some(b'=') {
                    self.advance_n(2);
                    Token::new(TokenKind::NotEq, "!=")
                } else {
                    self.advance();
                    Token::new(TokenKind::Bang, "!")
                }
            }
            b'+' => self.single(TokenKind::Plus, "+"),
            b'-' => self.single(TokenKind::Minus, "-"),
            b'*' => self.single(TokenKind::Asterisk, "*"),
            b'/' => self.single(TokenKind::Slash, "/"),
            b'<' => self.single(TokenKind::Lt, "<"),
            b'>' => self.single(TokenKind::Gt, ">"),
            b',' => self.single(TokenKind::Comma, ","),
            b';' => self.single(TokenKind::Semicolon, ";"),
            b':' => self.single(TokenKind::Colon, ":"),
            b'(' => self.single(TokenKind::Lparen, "("),
            b')' => self.single(TokenKind::Rparen, ")"),
            b'{' => self.single(TokenKind::Lbrace, "{"),
            b'}' => self.single(TokenKind::Rbrace, "}"),
            b'[' => self.single(TokenKind::Lbracket, "["),
            b']' => self.single(TokenKind::Rbracket, "]"),
            b'"' => self.read_string(),
            b'0'..=b'9' => self.read_number(),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.read_identifier(),
            other => {
                self.advance();
                Token::new(TokenKind::Illegal, (other as char).to_string())
            }
        }
    }

    /// Drains the remaining input into a token vector ending with `Eof`.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    fn single(&mut self, kind: TokenKind, literal: &'static str) -> Token {
        self.advance();
        Token::new(kind, literal)
    }

    fn read_identifier(&mut self) -> Token {
        let start = self.position;
        while matches!(self.peek(), Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')) {
            self.advance();
        }
        let word = self.slice(start);
        Token::new(TokenKind::lookup_ident(word), word)
    }

    fn read_number(&mut self) -> Token {
        let start = self.position;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.advance();
        }
        Token::new(TokenKind::Int, self.slice(start))
    }

    /// Reads a `"`-delimited string literal.
    ///
    /// The token literal is the content between the quotes. An unterminated
    /// string yields everything up to end of input; the parser surfaces any
    /// follow-on confusion as ordinary expected-token errors.
    fn read_string(&mut self) -> Token {
        self.advance();
        let start = self.position;
        while let Some(ch) = self.peek() {
            if ch == b'"' {
                break;
            }
            self.advance();
        }
        let literal = self.slice(start);
        self.advance();
        Token::new(TokenKind::Str, literal)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
                self.advance();
            }
            if self.peek() == Some(b'/') && self.peek_at(1) == Some(b'/') {
                while self.peek().is_some_and(|ch| ch != b'\n') {
                    self.advance();
                }
                continue;
            }
            return;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn advance_n(&mut self, n: usize) {
        self.position += n;
    }

    fn slice(&self, start: usize) -> &'a str {
        // Token boundaries never split a UTF-8 sequence: multi-byte content
        // only occurs inside string literals, which are sliced at the quotes.
        std::str::from_utf8(&self.input[start..self.position.min(self.input.len())])
            .expect("lexer slices are valid UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).tokenize().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn scans_operators_and_delimiters() {
        let tokens = Lexer::new("=+(){},;").tokenize();
        let expected = [
            TokenKind::Assign,
            TokenKind::Plus,
            TokenKind::Lparen,
            TokenKind::Rparen,
            TokenKind::Lbrace,
            TokenKind::Rbrace,
            TokenKind::Comma,
            TokenKind::Semicolon,
            TokenKind::Eof,
        ];
        assert_eq!(tokens.len(), expected.len());
        for (token, kind) in tokens.iter().zip(expected) {
            assert_eq!(token.kind, kind);
        }
    }

    #[test]
    fn scans_keywords_identifiers_and_literals() {
        let tokens = Lexer::new(r#"let five = 5; let msg = "hello world"; fn macro"#).tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Let);
        assert_eq!(tokens[1].kind, TokenKind::Ident);
        assert_eq!(tokens[1].literal, "five");
        assert_eq!(tokens[3].kind, TokenKind::Int);
        assert_eq!(tokens[3].literal, "5");
        assert_eq!(tokens[8].kind, TokenKind::Str);
        assert_eq!(tokens[8].literal, "hello world");
        assert_eq!(tokens[10].kind, TokenKind::Function);
        assert_eq!(tokens[11].kind, TokenKind::Macro);
    }

    #[test]
    fn two_char_operators_win_over_single() {
        assert_eq!(
            kinds("== != = !"),
            vec![
                TokenKind::Eq,
                TokenKind::NotEq,
                TokenKind::Assign,
                TokenKind::Bang,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn line_comments_are_stripped() {
        assert_eq!(
            kinds("1 // the rest vanishes\n+ 2"),
            vec![TokenKind::Int, TokenKind::Plus, TokenKind::Int, TokenKind::Eof]
        );
        // A comment with no trailing newline ends at EOF.
        assert_eq!(kinds("// only a comment"), vec![TokenKind::Eof]);
    }

    #[test]
    fn unknown_bytes_become_illegal_tokens() {
        let tokens = Lexer::new("1 @ 2").tokenize();
        assert_eq!(tokens[1].kind, TokenKind::Illegal);
        assert_eq!(tokens[1].literal, "@");
    }
}
