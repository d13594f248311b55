use std::{iter::Peekable, rc::Rc, str::Chars};

use crate::token::{Location, Token, TokenKind, KEYWORDS};

pub const SUGGESTED_TOKENS_CAPACITY: usize = 1_024;

/// Lexes the whole input, returning every token up to and including the
/// final [`TokenKind::Eof`] or [`TokenKind::Error`].
pub fn lex(src: &str, file: &str) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(SUGGESTED_TOKENS_CAPACITY.min(src.len() + 1));
    tokens.extend(Lexer::new(src, file));
    tokens
}

/// The Strata lexer.
///
/// Yields tokens one at a time. The sequence ends after the first
/// [`TokenKind::Eof`] or [`TokenKind::Error`] token; the lexer never fails
/// in any other way.
pub struct Lexer<'src> {
    iter: Peekable<Chars<'src>>,
    file: Rc<str>,
    line: u32,
    column: u32,
    /// Location of the token being scanned.
    mark: Location,
    done: bool,
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.done {
            return None;
        }
        let token = self.scan_token();
        if matches!(token.kind, TokenKind::Eof | TokenKind::Error) {
            self.done = true;
        }
        Some(token)
    }
}

impl std::iter::FusedIterator for Lexer<'_> {}

impl Lexer<'_> {
    fn scan_token(&mut self) -> Token {
        use TokenKind::*;
        self.skip_trivia();
        let Some(c) = self.mark_advance() else {
            return self.produce(Eof, "");
        };
        let kind = match c {
            '+' => Plus,
            '-' => Minus,
            '*' => Star,
            '/' => Slash,
            '%' => Percent,
            '~' => Tilde,
            '?' => Question,
            '(' => LParen,
            ')' => RParen,
            '{' => LBrace,
            '}' => RBrace,
            '[' => LBracket,
            ']' => RBracket,
            ',' => Comma,
            ';' => Semicolon,
            '.' => Dot,
            '=' => match self.peek() {
                Some('=') => self.advance_with(EqEq),
                Some('>') => self.advance_with(FatArrow),
                _ => Assign,
            },
            '!' => match self.peek() {
                Some('=') => self.advance_with(NotEq),
                _ => Bang,
            },
            '<' => match self.peek() {
                Some('=') => self.advance_with(LessEq),
                _ => Less,
            },
            '>' => match self.peek() {
                Some('=') => self.advance_with(GreaterEq),
                _ => Greater,
            },
            ':' => match self.peek() {
                Some(':') => self.advance_with(ColonColon),
                _ => Colon,
            },
            '&' if self.peek() == Some('&') => self.advance_with(AndAnd),
            '|' if self.peek() == Some('|') => self.advance_with(OrOr),
            '"' => return self.string(),
            c if c.is_ascii_alphabetic() || c == '_' => return self.identifier_or_keyword(c),
            c if c.is_ascii_digit() => return self.number(c),
            c => return self.produce(Error, format!("unexpected character '{c}'")),
        };
        self.produce(kind, kind.describe())
    }

    /// Skips whitespace and `//` line comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r' | '\n') => {
                    self.advance();
                }
                Some('/') if self.peek_second() == Some('/') => {
                    while !matches!(self.peek(), Some('\n') | None) {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Scans a string literal, performing escapes as it goes. Unknown escape
    /// sequences keep the escaped character.
    fn string(&mut self) -> Token {
        let mut buf = String::new();
        loop {
            match self.advance() {
                None => return self.produce(TokenKind::Error, "unterminated string"),
                Some('"') => return self.produce(TokenKind::String, buf),
                Some('\\') => {
                    let escaped = match self.advance() {
                        None => return self.produce(TokenKind::Error, "unterminated string"),
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some(other) => other,
                    };
                    buf.push(escaped);
                }
                Some(c) => buf.push(c),
            }
        }
    }

    fn identifier_or_keyword(&mut self, first: char) -> Token {
        let mut buf = String::from(first);
        while let Some(c) = self.peek().filter(|c| c.is_ascii_alphanumeric() || *c == '_') {
            self.advance();
            buf.push(c);
        }
        let kind = KEYWORDS
            .get(buf.as_str())
            .copied()
            .unwrap_or(TokenKind::Identifier);
        self.produce(kind, buf)
    }

    /// Scans a run of digits and dots. A second dot ends the literal.
    fn number(&mut self, first: char) -> Token {
        let mut buf = String::from(first);
        let mut seen_dot = false;
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_digit() => {}
                Some('.') if !seen_dot => seen_dot = true,
                _ => break,
            }
            buf.extend(self.advance());
        }
        let kind = if seen_dot {
            TokenKind::Float
        } else {
            TokenKind::Int
        };
        self.produce(kind, buf)
    }
}

impl Lexer<'_> {
    /// Constructs a new lexer over `src`, attributing locations to `file`.
    pub fn new<'src>(src: &'src str, file: &str) -> Lexer<'src> {
        let file: Rc<str> = Rc::from(file);
        Lexer {
            iter: src.chars().peekable(),
            mark: Location::new(Rc::clone(&file), 1, 1),
            file,
            line: 1,
            column: 1,
            done: false,
        }
    }

    /// Starts a new token mark and advances the iterator.
    fn mark_advance(&mut self) -> Option<char> {
        self.mark = Location::new(Rc::clone(&self.file), self.line, self.column);
        self.advance()
    }

    /// Returns the next character and advances, keeping line and column in
    /// sync.
    fn advance(&mut self) -> Option<char> {
        let c = self.iter.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Advances and returns the provided value.
    fn advance_with<T>(&mut self, value: T) -> T {
        self.advance();
        value
    }

    /// Returns the next character without advancing the iterator.
    fn peek(&mut self) -> Option<char> {
        self.iter.peek().copied()
    }

    /// Returns the character after the next one.
    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.iter.clone();
        ahead.next();
        ahead.next()
    }

    /// Produces a token at the current mark.
    fn produce(&self, kind: TokenKind, value: impl Into<Box<str>>) -> Token {
        Token::new(kind, value, self.mark.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Lexes `src` into `(kind, value, line, column)` tuples.
    fn lex_flat(src: &str) -> Vec<(TokenKind, String, u32, u32)> {
        lex(src, "t.str")
            .into_iter()
            .map(|t| (t.kind, t.value.into(), t.location.line, t.location.column))
            .collect()
    }

    macro_rules! cases {
        ($($src:expr => [$(($kind:expr, $value:expr, $line:expr, $col:expr)),* $(,)?]),* $(,)?) => {
            vec![$(($src, vec![$(($kind, std::string::String::from($value), $line, $col)),*])),*]
        };
    }

    #[test]
    fn test_demo_program_no_errors() {
        let input = include_str!("../demos/fib.str");
        assert!(!lex(input, "fib.str").iter().any(Token::is_error));
    }

    #[test]
    fn tests_with_location() {
        use TokenKind::*;
        let cases = cases!(
            "+-*/%" => [
                (Plus, "+", 1, 1),
                (Minus, "-", 1, 2),
                (Star, "*", 1, 3),
                (Slash, "/", 1, 4),
                (Percent, "%", 1, 5),
                (Eof, "", 1, 6),
            ],
            "== != <= >= && || :: =>" => [
                (EqEq, "==", 1, 1),
                (NotEq, "!=", 1, 4),
                (LessEq, "<=", 1, 7),
                (GreaterEq, ">=", 1, 10),
                (AndAnd, "&&", 1, 13),
                (OrOr, "||", 1, 16),
                (ColonColon, "::", 1, 19),
                (FatArrow, "=>", 1, 22),
                (Eof, "", 1, 24),
            ],
            "= ! < > : ? ~" => [
                (Assign, "=", 1, 1),
                (Bang, "!", 1, 3),
                (Less, "<", 1, 5),
                (Greater, ">", 1, 7),
                (Colon, ":", 1, 9),
                (Question, "?", 1, 11),
                (Tilde, "~", 1, 13),
                (Eof, "", 1, 14),
            ],
            "let x: int = 42" => [
                (Let, "let", 1, 1),
                (Identifier, "x", 1, 5),
                (Colon, ":", 1, 6),
                (TyInt, "int", 1, 8),
                (Assign, "=", 1, 12),
                (Int, "42", 1, 14),
                (Eof, "", 1, 16),
            ],
            "var _a1\n  func" => [
                (Var, "var", 1, 1),
                (Identifier, "_a1", 1, 5),
                (Func, "func", 2, 3),
                (Eof, "", 2, 7),
            ],
            "3.14 1.2.3" => [
                (Float, "3.14", 1, 1),
                (Float, "1.2", 1, 6),
                (Dot, ".", 1, 9),
                (Int, "3", 1, 10),
                (Eof, "", 1, 11),
            ],
            "// a comment\ntrue // trailing\nfalse" => [
                (True, "true", 2, 1),
                (False, "false", 3, 1),
                (Eof, "", 3, 6),
            ],
        );
        for (src, expected) in cases {
            assert_eq!(lex_flat(src), expected, "input: {src:?}");
        }
    }

    #[test]
    fn test_type_keywords() {
        use TokenKind::*;
        let kinds: Vec<_> = lex("int float bool char string void any", "")
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            kinds,
            [TyInt, TyFloat, TyBool, TyChar, TyString, TyVoid, TyAny, Eof]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = lex(r#""a\n\t\r\\\"b\q""#, "");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(&*tokens[0].value, "a\n\t\r\\\"bq");
        assert_eq!(tokens[1].kind, TokenKind::Eof);
    }

    #[test]
    fn test_unterminated_string() {
        let tokens = lex("x = \"abc", "");
        let last = tokens.last().unwrap();
        assert_eq!(last.kind, TokenKind::Error);
        assert_eq!(&*last.value, "unterminated string");
        assert_eq!((last.location.line, last.location.column), (1, 5));
    }

    #[test]
    fn test_unexpected_character_stops_sequence() {
        for (src, message) in [
            ("a & b", "unexpected character '&'"),
            ("a | b", "unexpected character '|'"),
            ("@", "unexpected character '@'"),
        ] {
            let tokens = lex(src, "");
            let last = tokens.last().unwrap();
            assert_eq!(last.kind, TokenKind::Error);
            assert_eq!(&*last.value, message);
        }
        let tokens = lex("1 $ 2", "");
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn test_nul_is_an_unexpected_character() {
        let tokens = lex("let x: int = 1\0 @@@ garbage", "");
        let last = tokens.last().unwrap();
        assert_eq!(last.kind, TokenKind::Error);
        assert_eq!(&*last.value, "unexpected character '\0'");
        assert_eq!((last.location.line, last.location.column), (1, 15));

        let tokens = lex("\"a\0b\"", "");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(&*tokens[0].value, "a\0b");
    }

    #[test]
    fn test_lexer_is_fused_and_restartable() {
        let src = "a b";
        let mut lexer = Lexer::new(src, "");
        assert_eq!(lexer.by_ref().count(), 3);
        assert!(lexer.next().is_none());
        assert_eq!(Lexer::new(src, "").count(), 3);
    }

    #[test]
    fn test_location_display() {
        let tokens = lex("\n  x", "main.str");
        assert_eq!(tokens[0].location.to_string(), "main.str:2:3");
    }
}
