use bumpalo::Bump;

use crate::lex::Loc;
use crate::lex::Token;
use crate::lex::TokenKind;
use crate::Report;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Statement<'a> {
    Expression(&'a Expression<'a>),
    Puts(&'a Expression<'a>),
    If {
        arms: &'a [IfArm<'a>],
        else_body: &'a [Statement<'a>],
    },
    While {
        condition: &'a Expression<'a>,
        body: &'a [Statement<'a>],
    },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct IfArm<'a> {
    pub(crate) condition: &'a Expression<'a>,
    pub(crate) body: &'a [Statement<'a>],
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Expression<'a> {
    Literal {
        kind: LiteralKind<'a>,
        loc: Loc<'a>,
    },
    Variable {
        name: &'a str,
        loc: Loc<'a>,
    },
    Assign {
        name: &'a str,
        loc: Loc<'a>,
        value: &'a Expression<'a>,
    },
    Unary {
        op: UnaryOp,
        operand: &'a Expression<'a>,
        loc: Loc<'a>,
    },
    Binary {
        lhs: &'a Expression<'a>,
        op: BinOp,
        rhs: &'a Expression<'a>,
    },
    Logical {
        lhs: &'a Expression<'a>,
        op: LogicalOp,
        rhs: &'a Expression<'a>,
    },
}

impl<'a> Expression<'a> {
    pub(crate) fn loc(&self) -> Loc<'a> {
        match self {
            Expression::Literal { loc, .. }
            | Expression::Variable { loc, .. }
            | Expression::Unary { loc, .. } => *loc,
            Expression::Assign { loc, value, .. } => loc.until(value.loc()),
            Expression::Binary { lhs, rhs, .. } | Expression::Logical { lhs, rhs, .. } =>
                lhs.loc().until(rhs.loc()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum LiteralKind<'a> {
    Nil,
    Bool(bool),
    Number(f64),
    String(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Minus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy)]
pub enum Error<'a> {
    Eof {
        expected: &'static str,
        at: Loc<'a>,
    },
    UnexpectedToken {
        expected: &'static str,
        at: Token<'a>,
    },
    InvalidAssignmentTarget {
        at: Loc<'a>,
    },
    UndefinedVariable {
        name: &'a str,
        at: Loc<'a>,
    },
    UnterminatedString {
        at: Loc<'a>,
    },
    UnexpectedCharacter {
        at: Loc<'a>,
    },
}

impl<'a> From<crate::lex::Error<'a>> for Error<'a> {
    fn from(value: crate::lex::Error<'a>) -> Self {
        match value {
            crate::lex::Error::UnterminatedString { at } => Error::UnterminatedString { at },
            crate::lex::Error::UnexpectedCharacter { at } => Error::UnexpectedCharacter { at },
        }
    }
}

impl<'a> Error<'a> {
    fn diagnostics(&self) -> (Loc<'a>, String, String) {
        match self {
            Error::Eof { expected, at } => (
                *at,
                "unexpected end of file".to_string(),
                format!("expected {expected} here"),
            ),
            Error::UnexpectedToken { expected, at } => (
                at.loc(),
                format!("unexpected {}", at.kind.show()),
                format!("expected {expected}"),
            ),
            Error::InvalidAssignmentTarget { at } => (
                *at,
                "invalid assignment target".to_string(),
                "only variables can be assigned to".to_string(),
            ),
            Error::UndefinedVariable { name, at } => (
                *at,
                format!("undefined local variable `{name}`"),
                "not assigned before this use".to_string(),
            ),
            Error::UnterminatedString { at } => (
                *at,
                "unterminated string literal".to_string(),
                "string starts here".to_string(),
            ),
            Error::UnexpectedCharacter { at } => (
                *at,
                format!("unexpected character `{}`", at.slice()),
                "cannot be part of any token".to_string(),
            ),
        }
    }
}

impl Report for Error<'_> {
    fn print(&self) {
        let (at, message, label) = self.diagnostics();
        at.report(ariadne::ReportKind::Error)
            .with_message(message)
            .with_label(
                ariadne::Label::new(at)
                    .with_message(label)
                    .with_color(ariadne::Color::Red),
            )
            .finish()
            .eprint(at.cache())
            .ok();
    }

    fn exit_code(&self) -> i32 {
        1
    }
}

pub(crate) fn parse<'a>(
    bump: &'a Bump,
    tokens: &'a [Token<'a>],
    eof_loc: Loc<'a>,
    capacity: usize,
) -> Result<&'a [Statement<'a>], Error<'a>> {
    let mut parser = Parser { bump, tokens, eof_loc, pos: 0 };
    let stmts = parser.block(capacity, &[])?;
    match parser.peek() {
        Some(token) => Err(Error::UnexpectedToken { expected: "end of file", at: token }),
        None => Ok(stmts),
    }
}

struct Parser<'a> {
    bump: &'a Bump,
    tokens: &'a [Token<'a>],
    eof_loc: Loc<'a>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Token<'a>> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token<'a>> {
        match self.peek() {
            Some(token) if token.kind == kind => self.advance(),
            _ => None,
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'a>, Error<'a>> {
        match self.peek() {
            Some(token) if token.kind == kind => Ok(self.advance().unwrap()),
            Some(token) => Err(Error::UnexpectedToken { expected: kind.show(), at: token }),
            None => Err(Error::Eof { expected: kind.show(), at: self.eof_loc }),
        }
    }

    fn skip_separators(&mut self) {
        while self
            .peek()
            .is_some_and(|token| matches!(token.kind, TokenKind::Newline | TokenKind::Semicolon))
        {
            self.advance();
        }
    }

    fn alloc(&self, expr: Expression<'a>) -> &'a Expression<'a> {
        self.bump.alloc(expr)
    }

    /// Parses statements until end of file or one of `terminators`, which is
    /// left unconsumed.
    fn block(
        &mut self,
        capacity: usize,
        terminators: &[TokenKind],
    ) -> Result<&'a [Statement<'a>], Error<'a>> {
        let mut stmts = Vec::with_capacity(capacity);
        loop {
            self.skip_separators();
            let Some(token) = self.peek() else { break };
            if terminators.contains(&token.kind) {
                break;
            }
            stmts.push(self.statement()?);
            match self.peek() {
                None => break,
                Some(token) if terminators.contains(&token.kind) => break,
                Some(token)
                    if matches!(token.kind, TokenKind::Newline | TokenKind::Semicolon) => (),
                Some(token) =>
                    return Err(Error::UnexpectedToken { expected: "a newline or `;`", at: token }),
            }
        }
        Ok(&*self.bump.alloc_slice_copy(&stmts))
    }

    fn statement(&mut self) -> Result<Statement<'a>, Error<'a>> {
        let token = self
            .peek()
            .ok_or(Error::Eof { expected: "a statement", at: self.eof_loc })?;
        match token.kind {
            TokenKind::Puts => {
                self.advance();
                Ok(Statement::Puts(self.expression()?))
            }
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            _ => Ok(Statement::Expression(self.expression()?)),
        }
    }

    fn if_statement(&mut self) -> Result<Statement<'a>, Error<'a>> {
        self.expect(TokenKind::If)?;
        let mut arms = Vec::new();
        loop {
            let condition = self.expression()?;
            self.eat(TokenKind::Then);
            let body =
                self.block(4, &[TokenKind::Elsif, TokenKind::Else, TokenKind::End])?;
            arms.push(IfArm { condition, body });
            if self.eat(TokenKind::Elsif).is_none() {
                break;
            }
        }
        let else_body = if self.eat(TokenKind::Else).is_some() {
            self.block(4, &[TokenKind::End])?
        }
        else {
            &[][..]
        };
        self.expect(TokenKind::End)?;
        Ok(Statement::If { arms: self.bump.alloc_slice_copy(&arms), else_body })
    }

    fn while_statement(&mut self) -> Result<Statement<'a>, Error<'a>> {
        self.expect(TokenKind::While)?;
        let condition = self.expression()?;
        self.eat(TokenKind::Do);
        let body = self.block(4, &[TokenKind::End])?;
        self.expect(TokenKind::End)?;
        Ok(Statement::While { condition, body })
    }

    fn expression(&mut self) -> Result<&'a Expression<'a>, Error<'a>> {
        let expr = self.logical_or()?;
        if self.eat(TokenKind::Equal).is_some() {
            let value = self.expression()?;
            return match *expr {
                Expression::Variable { name, loc } =>
                    Ok(self.alloc(Expression::Assign { name, loc, value })),
                _ => Err(Error::InvalidAssignmentTarget { at: expr.loc() }),
            };
        }
        Ok(expr)
    }

    fn logical_or(&mut self) -> Result<&'a Expression<'a>, Error<'a>> {
        let mut lhs = self.logical_and()?;
        while self
            .peek()
            .is_some_and(|token| matches!(token.kind, TokenKind::PipePipe | TokenKind::Or))
        {
            self.advance();
            let rhs = self.logical_and()?;
            lhs = self.alloc(Expression::Logical { lhs, op: LogicalOp::Or, rhs });
        }
        Ok(lhs)
    }

    fn logical_and(&mut self) -> Result<&'a Expression<'a>, Error<'a>> {
        let mut lhs = self.equality()?;
        while self
            .peek()
            .is_some_and(|token| matches!(token.kind, TokenKind::AmpAmp | TokenKind::And))
        {
            self.advance();
            let rhs = self.equality()?;
            lhs = self.alloc(Expression::Logical { lhs, op: LogicalOp::And, rhs });
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<&'a Expression<'a>, Error<'a>> {
        self.binary(Self::comparison, &[
            (TokenKind::EqualEqual, BinOp::Equal),
            (TokenKind::BangEqual, BinOp::NotEqual),
        ])
    }

    fn comparison(&mut self) -> Result<&'a Expression<'a>, Error<'a>> {
        self.binary(Self::term, &[
            (TokenKind::Less, BinOp::Less),
            (TokenKind::LessEqual, BinOp::LessEqual),
            (TokenKind::Greater, BinOp::Greater),
            (TokenKind::GreaterEqual, BinOp::GreaterEqual),
        ])
    }

    fn term(&mut self) -> Result<&'a Expression<'a>, Error<'a>> {
        self.binary(Self::factor, &[
            (TokenKind::Plus, BinOp::Add),
            (TokenKind::Minus, BinOp::Subtract),
        ])
    }

    fn factor(&mut self) -> Result<&'a Expression<'a>, Error<'a>> {
        self.binary(Self::unary, &[
            (TokenKind::Star, BinOp::Multiply),
            (TokenKind::Slash, BinOp::Divide),
            (TokenKind::Percent, BinOp::Modulo),
        ])
    }

    fn binary(
        &mut self,
        operand: fn(&mut Self) -> Result<&'a Expression<'a>, Error<'a>>,
        ops: &[(TokenKind, BinOp)],
    ) -> Result<&'a Expression<'a>, Error<'a>> {
        let mut lhs = operand(self)?;
        while let Some(token) = self.peek() {
            let Some(&(_, op)) = ops.iter().find(|(kind, _)| *kind == token.kind) else {
                break;
            };
            self.advance();
            let rhs = operand(self)?;
            lhs = self.alloc(Expression::Binary { lhs, op, rhs });
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<&'a Expression<'a>, Error<'a>> {
        let Some(token) = self.peek() else {
            return Err(Error::Eof { expected: "an expression", at: self.eof_loc });
        };
        let op = match token.kind {
            TokenKind::Minus => UnaryOp::Minus,
            TokenKind::Bang | TokenKind::Not => UnaryOp::Not,
            _ => return self.primary(),
        };
        self.advance();
        let operand = self.unary()?;
        Ok(self.alloc(Expression::Unary {
            op,
            operand,
            loc: token.loc().until(operand.loc()),
        }))
    }

    fn primary(&mut self) -> Result<&'a Expression<'a>, Error<'a>> {
        let token = self
            .advance()
            .ok_or(Error::Eof { expected: "an expression", at: self.eof_loc })?;
        let literal = |kind| Expression::Literal { kind, loc: token.loc() };
        match token.kind {
            TokenKind::Nil => Ok(self.alloc(literal(LiteralKind::Nil))),
            TokenKind::True => Ok(self.alloc(literal(LiteralKind::Bool(true)))),
            TokenKind::False => Ok(self.alloc(literal(LiteralKind::Bool(false)))),
            TokenKind::Number => {
                let number = token.slice().parse().unwrap();
                Ok(self.alloc(literal(LiteralKind::Number(number))))
            }
            TokenKind::String => {
                let slice = token.slice();
                Ok(self.alloc(literal(LiteralKind::String(&slice[1..slice.len() - 1]))))
            }
            TokenKind::Identifier => Ok(self.alloc(Expression::Variable {
                name: token.slice(),
                loc: token.loc(),
            })),
            TokenKind::LParen => {
                let expr = self.expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            _ => Err(Error::UnexpectedToken { expected: "an expression", at: token }),
        }
    }
}
