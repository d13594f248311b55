use std::{fmt, rc::Rc};

#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw text of the token. Holds the unescaped contents for strings and
    /// the message for [`TokenKind::Error`].
    pub value: Box<str>,
    pub location: Location,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<Box<str>>, location: Location) -> Token {
        Token {
            kind,
            value: value.into(),
            location,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    pub fn is_error(&self) -> bool {
        self.kind == TokenKind::Error
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?}, {:?}, {})", self.kind, self.value, self.location)
    }
}

/// A 1-based source position.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: Rc<str>,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(file: Rc<str>, line: u32, column: u32) -> Location {
        Location { file, line, column }
    }

    /// Location used for tokens and nodes synthesized without a source file.
    pub fn detached() -> Location {
        Location::new(Rc::from(""), 1, 1)
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location({self})")
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "{}:{}", self.line, self.column)
        } else {
            write!(f, "{}:{}:{}", self.file, self.line, self.column)
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Int,
    Float,
    String,
    True,
    False,
    Identifier,

    Let,
    Const,
    Var,
    Func,
    Return,
    If,
    Else,
    While,
    For,
    Break,
    Continue,
    Import,
    From,

    TyInt,
    TyFloat,
    TyBool,
    TyChar,
    TyString,
    TyVoid,
    TyAny,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    /// `!`
    Bang,
    /// `~`
    Tilde,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Dot,
    /// `=>`
    FatArrow,
    /// `=`
    Assign,
    /// `::`
    ColonColon,
    /// `?`
    Question,

    Eof,
    Error,
}

impl TokenKind {
    pub fn is_type_keyword(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            TyInt | TyFloat | TyBool | TyChar | TyString | TyVoid | TyAny
        )
    }

    /// Source text of fixed tokens; a category name for the others.
    pub fn describe(self) -> &'static str {
        use TokenKind::*;
        match self {
            Int => "integer literal",
            Float => "float literal",
            String => "string literal",
            True => "true",
            False => "false",
            Identifier => "identifier",
            Let => "let",
            Const => "const",
            Var => "var",
            Func => "func",
            Return => "return",
            If => "if",
            Else => "else",
            While => "while",
            For => "for",
            Break => "break",
            Continue => "continue",
            Import => "import",
            From => "from",
            TyInt => "int",
            TyFloat => "float",
            TyBool => "bool",
            TyChar => "char",
            TyString => "string",
            TyVoid => "void",
            TyAny => "any",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            EqEq => "==",
            NotEq => "!=",
            Less => "<",
            Greater => ">",
            LessEq => "<=",
            GreaterEq => ">=",
            AndAnd => "&&",
            OrOr => "||",
            Bang => "!",
            Tilde => "~",
            LParen => "(",
            RParen => ")",
            LBrace => "{",
            RBrace => "}",
            LBracket => "[",
            RBracket => "]",
            Comma => ",",
            Colon => ":",
            Semicolon => ";",
            Dot => ".",
            FatArrow => "=>",
            Assign => "=",
            ColonColon => "::",
            Question => "?",
            Eof => "end of input",
            Error => "invalid token",
        }
    }

    /// Returns the binary precedence of this token, if it is an infix
    /// operator. Higher binds tighter.
    pub fn precedence(self) -> Option<u8> {
        use TokenKind::*;
        let prec = match self {
            OrOr => 1,
            AndAnd => 2,
            EqEq | NotEq => 3,
            Less | Greater | LessEq | GreaterEq => 4,
            Plus | Minus => 5,
            Star | Slash | Percent => 6,
            _ => return None,
        };
        Some(prec)
    }
}

pub static KEYWORDS: phf::Map<&'static str, TokenKind> = phf::phf_map! {
    "let" => TokenKind::Let,
    "const" => TokenKind::Const,
    "var" => TokenKind::Var,
    "func" => TokenKind::Func,
    "return" => TokenKind::Return,
    "if" => TokenKind::If,
    "else" => TokenKind::Else,
    "while" => TokenKind::While,
    "for" => TokenKind::For,
    "break" => TokenKind::Break,
    "continue" => TokenKind::Continue,
    "import" => TokenKind::Import,
    "from" => TokenKind::From,
    "true" => TokenKind::True,
    "false" => TokenKind::False,
    "int" => TokenKind::TyInt,
    "float" => TokenKind::TyFloat,
    "bool" => TokenKind::TyBool,
    "char" => TokenKind::TyChar,
    "string" => TokenKind::TyString,
    "void" => TokenKind::TyVoid,
    "any" => TokenKind::TyAny,
};
