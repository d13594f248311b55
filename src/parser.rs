use thiserror::Error;

use crate::{
    ast::{
        BinaryOperator, Expr, ExprKind, Function, Ident, Literal, NodeId, Param, Stmt, StmtKind,
        UnaryOperator,
    },
    token::{Location, Token, TokenKind},
    types::Type,
};

type Result<T, E = ParseError> = std::result::Result<T, E>;

/// Parses a whole program. Fails on the first malformed construct.
pub fn parse(tokens: &[Token]) -> Result<Vec<Stmt>> {
    Parser::new(tokens).parse_program()
}

/// Parses a single expression followed by the end of input.
pub fn parse_expr(tokens: &[Token]) -> Result<Expr> {
    let mut p = Parser::new(tokens);
    let expr = p.parse_expr()?;
    p.consume(TokenKind::Eof)?;
    Ok(expr)
}

#[derive(Clone, Debug, PartialEq, Error)]
#[error("{location}: {kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub location: Location,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("expected `{expected}`, found {found}")]
    Unexpected {
        expected: &'static str,
        found: Box<str>,
    },
    #[error("expected expression, found {found}")]
    ExpectedExpression { found: Box<str> },
    #[error("expected type, found {found}")]
    ExpectedType { found: Box<str> },
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,
    #[error("invalid number literal `{0}`")]
    InvalidNumber(Box<str>),
    /// An error token reached the parser.
    #[error("{0}")]
    Lexer(Box<str>),
}

struct Parser<'tok> {
    tokens: &'tok [Token],
    cursor: usize,
    next_id: u32,
    eof: Token,
}

impl Parser<'_> {
    fn parse_program(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::with_capacity(16);
        loop {
            while self.take(TokenKind::Semicolon) {}
            if self.is(TokenKind::Eof) {
                break;
            }
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    /// Parses `{ STMT* }`.
    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.consume(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        loop {
            while self.take(TokenKind::Semicolon) {}
            if self.is(TokenKind::RBrace) || self.is(TokenKind::Eof) {
                break;
            }
            stmts.push(self.parse_stmt()?);
        }
        self.consume(TokenKind::RBrace)?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        let token = self.peek().clone();
        let kind = match token.kind {
            TokenKind::Import => self.parse_import()?,
            TokenKind::Let | TokenKind::Const | TokenKind::Var => self.parse_let()?,
            TokenKind::Func => self.parse_function()?,
            TokenKind::If => return self.parse_if(),
            TokenKind::While => {
                self.advance();
                let condition = self.parse_condition()?;
                let body = self.parse_block()?;
                StmtKind::While { condition, body }
            }
            TokenKind::For => self.parse_for()?,
            TokenKind::Return => {
                self.advance();
                let value = if matches!(
                    self.peek().kind,
                    TokenKind::RBrace | TokenKind::Semicolon | TokenKind::Eof
                ) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                StmtKind::Return(value)
            }
            TokenKind::Break => self.advance_with(StmtKind::Break),
            TokenKind::Continue => self.advance_with(StmtKind::Continue),
            _ => {
                let expr = self.parse_expr()?;
                if self.take(TokenKind::Assign) {
                    let ExprKind::Ident(target) = expr.kind else {
                        return Err(expr.location.wrap(ParseErrorKind::InvalidAssignmentTarget));
                    };
                    let value = self.parse_expr()?;
                    StmtKind::Assign { target, value }
                } else {
                    StmtKind::Expr(expr)
                }
            }
        };
        Ok(self.stmt(kind, token.location))
    }

    fn parse_import(&mut self) -> Result<StmtKind> {
        self.consume(TokenKind::Import)?;
        let name = self.parse_ident()?;
        self.consume(TokenKind::From)?;
        let mut module = vec![self.parse_ident()?];
        while self.take(TokenKind::ColonColon) {
            module.push(self.parse_ident()?);
        }
        Ok(StmtKind::Import { name, module })
    }

    fn parse_let(&mut self) -> Result<StmtKind> {
        let mutable = self.advance().kind == TokenKind::Var;
        let name = self.parse_ident()?;
        self.consume(TokenKind::Colon)?;
        let ty = self.parse_type()?;
        self.consume(TokenKind::Assign)?;
        let value = self.parse_expr()?;
        Ok(StmtKind::Let {
            name,
            ty,
            value,
            mutable,
        })
    }

    fn parse_function(&mut self) -> Result<StmtKind> {
        self.consume(TokenKind::Func)?;
        let name = self.parse_ident()?;
        self.consume(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.is(TokenKind::RParen) {
            loop {
                let name = self.parse_ident()?;
                self.consume(TokenKind::Colon)?;
                let ty = self.parse_type()?;
                params.push(Param {
                    id: self.next_id(),
                    name,
                    ty,
                });
                if !self.take(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen)?;
        self.consume(TokenKind::FatArrow)?;
        let return_ty = self.parse_type()?;
        let body = self.parse_block()?;
        Ok(StmtKind::Function(Function {
            name,
            params,
            return_ty,
            body,
        }))
    }

    /// Parses `if (EXPR) { ... } [else { ... } | else if ...]`. An `else if`
    /// becomes the sole statement of the else branch.
    fn parse_if(&mut self) -> Result<Stmt> {
        let location = self.consume(TokenKind::If)?.location.clone();
        let condition = self.parse_condition()?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.take(TokenKind::Else) {
            if self.is(TokenKind::If) {
                vec![self.parse_if()?]
            } else {
                self.parse_block()?
            }
        } else {
            Vec::new()
        };
        let kind = StmtKind::If {
            condition,
            then_branch,
            else_branch,
        };
        Ok(self.stmt(kind, location))
    }

    /// Parses `for (STMT [;] EXPR [;] STMT) { ... }`.
    fn parse_for(&mut self) -> Result<StmtKind> {
        self.consume(TokenKind::For)?;
        self.consume(TokenKind::LParen)?;
        let init = self.parse_stmt()?;
        self.take(TokenKind::Semicolon);
        let condition = self.parse_expr()?;
        self.take(TokenKind::Semicolon);
        let update = self.parse_stmt()?;
        self.consume(TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(StmtKind::For {
            init: Box::new(init),
            condition,
            update: Box::new(update),
            body,
        })
    }

    fn parse_condition(&mut self) -> Result<Expr> {
        self.consume(TokenKind::LParen)?;
        let condition = self.parse_expr()?;
        self.consume(TokenKind::RParen)?;
        Ok(condition)
    }

    /// Parses a type keyword or identifier, with an optional `?` suffix.
    fn parse_type(&mut self) -> Result<Type> {
        let token = self.peek();
        if !(token.kind.is_type_keyword() || token.kind == TokenKind::Identifier) {
            let found = describe(token);
            return Err(token.location.wrap(ParseErrorKind::ExpectedType { found }));
        }
        let ty = Type::from_name(&self.advance().value);
        if self.take(TokenKind::Question) {
            Ok(ty.optional())
        } else {
            Ok(ty)
        }
    }

    fn parse_ident(&mut self) -> Result<Ident> {
        let token = self.consume(TokenKind::Identifier)?;
        Ok(token.value.clone())
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_binary(0)
    }

    /// Precedence climbing. Consumes operators that bind tighter than
    /// `min_prec`, recursing with the operator's own precedence so equal
    /// precedences associate to the left.
    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op_token = self.peek();
            let Some(prec) = op_token.kind.precedence() else {
                break;
            };
            if prec <= min_prec {
                break;
            }
            let op_token = self.advance().clone();
            let rhs = self.parse_binary(prec)?;
            let kind = ExprKind::Binary {
                op: binary_operator(op_token.kind),
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
            lhs = self.expr(kind, op_token.location);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek().kind {
            TokenKind::Bang => UnaryOperator::Not,
            TokenKind::Minus => UnaryOperator::Neg,
            TokenKind::Plus => UnaryOperator::Plus,
            TokenKind::Tilde => UnaryOperator::BitNot,
            _ => return self.parse_primary(),
        };
        let location = self.advance().location.clone();
        let expr = self.parse_unary()?;
        let kind = ExprKind::Unary {
            op,
            expr: Box::new(expr),
        };
        Ok(self.expr(kind, location))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.advance().clone();
        let kind = match token.kind {
            TokenKind::Int => {
                let Ok(value) = token.value.parse() else {
                    return Err(token
                        .location
                        .wrap(ParseErrorKind::InvalidNumber(token.value)));
                };
                ExprKind::Literal(Literal::Int(value))
            }
            TokenKind::Float => {
                let Ok(value) = token.value.parse() else {
                    return Err(token
                        .location
                        .wrap(ParseErrorKind::InvalidNumber(token.value)));
                };
                ExprKind::Literal(Literal::Float(value))
            }
            TokenKind::String => ExprKind::Literal(Literal::String(token.value)),
            TokenKind::True => ExprKind::Literal(Literal::Bool(true)),
            TokenKind::False => ExprKind::Literal(Literal::Bool(false)),
            TokenKind::Identifier => {
                let ident = self.expr(ExprKind::Ident(token.value), token.location);
                return self.parse_postfix(ident);
            }
            TokenKind::LParen => {
                let expr = self.parse_expr()?;
                self.consume(TokenKind::RParen)?;
                return Ok(expr);
            }
            TokenKind::Error => {
                return Err(token.location.wrap(ParseErrorKind::Lexer(token.value)));
            }
            _ => {
                let found = describe(&token);
                return Err(token
                    .location
                    .wrap(ParseErrorKind::ExpectedExpression { found }));
            }
        };
        Ok(self.expr(kind, token.location))
    }

    /// Parses a chain of `.member`, `::member` and call suffixes.
    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr> {
        loop {
            match self.peek().kind {
                TokenKind::Dot | TokenKind::ColonColon => {
                    self.advance();
                    let property = self.parse_ident()?;
                    let location = expr.location.clone();
                    let kind = ExprKind::Member {
                        object: Box::new(expr),
                        property,
                    };
                    expr = self.expr(kind, location);
                }
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.is(TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.take(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.consume(TokenKind::RParen)?;
                    let location = expr.location.clone();
                    let kind = ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    };
                    expr = self.expr(kind, location);
                }
                _ => return Ok(expr),
            }
        }
    }
}

impl<'tok> Parser<'tok> {
    fn new(tokens: &'tok [Token]) -> Parser<'tok> {
        let eof_location = tokens
            .last()
            .map_or_else(Location::detached, |t| t.location.clone());
        Parser {
            tokens,
            cursor: 0,
            next_id: 0,
            eof: Token::new(TokenKind::Eof, "", eof_location),
        }
    }

    fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn expr(&mut self, kind: ExprKind, location: Location) -> Expr {
        Expr {
            id: self.next_id(),
            kind,
            location,
        }
    }

    fn stmt(&mut self, kind: StmtKind, location: Location) -> Stmt {
        Stmt {
            id: self.next_id(),
            kind,
            location,
        }
    }

    /// Returns the current token. Past the end, returns a synthesized
    /// [`TokenKind::Eof`].
    fn peek(&self) -> &Token {
        self.tokens.get(self.cursor).unwrap_or(&self.eof)
    }

    /// Returns the current token and advances.
    fn advance(&mut self) -> &Token {
        let c = self.cursor;
        if c < self.tokens.len() {
            self.cursor += 1;
        }
        self.tokens.get(c).unwrap_or(&self.eof)
    }

    /// Advances and returns the provided value.
    fn advance_with<T>(&mut self, value: T) -> T {
        self.advance();
        value
    }

    /// Checks whether the current token matches the given one.
    fn is(&self, expect: TokenKind) -> bool {
        self.peek().kind == expect
    }

    /// Advances if the current token matches the provided one, returning true.
    /// If not, returns false and doesn't advance.
    fn take(&mut self, expect: TokenKind) -> bool {
        if self.is(expect) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Advances if the current token matches the provided one. If not, fails.
    fn consume(&mut self, expect: TokenKind) -> Result<&Token> {
        let c = self.peek();
        if c.kind == expect {
            return Ok(self.advance());
        }
        let kind = match c.kind {
            TokenKind::Error => ParseErrorKind::Lexer(c.value.clone()),
            _ => ParseErrorKind::Unexpected {
                expected: expect.describe(),
                found: describe(c),
            },
        };
        Err(c.location.wrap(kind))
    }
}

fn describe(token: &Token) -> Box<str> {
    match token.kind {
        TokenKind::Eof => "end of input".into(),
        TokenKind::String => format!("\"{}\"", token.value).into(),
        _ => format!("`{}`", token.value).into(),
    }
}

fn binary_operator(kind: TokenKind) -> BinaryOperator {
    match kind {
        TokenKind::OrOr => BinaryOperator::Or,
        TokenKind::AndAnd => BinaryOperator::And,
        TokenKind::EqEq => BinaryOperator::Eq,
        TokenKind::NotEq => BinaryOperator::Ne,
        TokenKind::Less => BinaryOperator::Lt,
        TokenKind::Greater => BinaryOperator::Gt,
        TokenKind::LessEq => BinaryOperator::Le,
        TokenKind::GreaterEq => BinaryOperator::Ge,
        TokenKind::Plus => BinaryOperator::Add,
        TokenKind::Minus => BinaryOperator::Sub,
        TokenKind::Star => BinaryOperator::Mul,
        TokenKind::Slash => BinaryOperator::Div,
        TokenKind::Percent => BinaryOperator::Rem,
        _ => unreachable!("token {kind:?} has a precedence but no operator"),
    }
}

impl Location {
    pub(crate) fn wrap(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            kind,
            location: self.clone(),
        }
    }
}
