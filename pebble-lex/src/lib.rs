use std::ops::Range;
use std::path::Path;

use ariadne::Config;
use ariadne::IndexType;
use bumpalo::Bump;
use logos::Logos;

#[derive(Clone, Copy)]
pub struct Token<'a> {
    pub kind: TokenKind,
    loc: Loc<'a>,
}

impl<'a> Token<'a> {
    pub fn loc(&self) -> Loc<'a> {
        self.loc
    }

    pub fn slice(&self) -> &'a str {
        self.loc.slice()
    }
}

impl std::fmt::Debug for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({:?})@{:?}", self.kind, self.slice(), self.loc)
    }
}

#[derive(Clone, Copy)]
struct SourceFile<'a> {
    file: &'a Path,
    src: &'a str,
}

#[derive(Clone, Copy)]
pub struct Loc<'a> {
    span: Span,
    source_file: &'a SourceFile<'a>,
}

impl<'a> Loc<'a> {
    pub fn file(&self) -> &'a Path {
        self.source_file.file
    }

    fn src(&self) -> &'a str {
        self.source_file.src
    }

    pub fn span(&self) -> Range<usize> {
        self.span.start..self.span.end
    }

    pub fn slice(&self) -> &'a str {
        &self.src()[self.span()]
    }

    /// Combines two locations in the same file into one spanning both.
    pub fn until(self, other: Self) -> Self {
        assert_eq!(self.file(), other.file());
        assert!(self.span.end <= other.span.end);
        Self {
            span: Span {
                start: self.span.start,
                end: other.span.end,
            },
            ..self
        }
    }

    pub fn report(&self, kind: ariadne::ReportKind<'a>) -> ariadne::ReportBuilder<'a, Self> {
        ariadne::Report::build(kind, *self)
            .with_config(Config::default().with_index_type(IndexType::Byte))
    }

    pub fn cache(&self) -> impl ariadne::Cache<Path> + 'a {
        struct Cache<'b>(&'b Path, ariadne::Source<&'b str>);

        impl<'b> ariadne::Cache<Path> for Cache<'b> {
            type Storage = &'b str;

            fn fetch(
                &mut self,
                id: &Path,
            ) -> Result<&ariadne::Source<&'b str>, impl std::fmt::Debug> {
                if self.0 == id {
                    Ok(&self.1)
                }
                else {
                    Err(Box::new(format!(
                        "failed to fetch source `{}`",
                        id.display(),
                    )))
                }
            }

            fn display<'a>(&self, id: &'a Path) -> Option<impl std::fmt::Display + 'a> {
                Some(Box::new(id.display()))
            }
        }

        Cache(self.file(), ariadne::Source::from(self.src()))
    }
}

impl std::fmt::Debug for Loc<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:?}", self.file().display(), self.span())
    }
}

impl ariadne::Span for Loc<'_> {
    type SourceId = Path;

    fn source(&self) -> &Self::SourceId {
        self.file()
    }

    fn start(&self) -> usize {
        self.span.start
    }

    fn end(&self) -> usize {
        self.span.end
    }
}

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Logos)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"#[^\n]*")]
pub enum TokenKind {
    #[token("\n")]
    Newline,
    #[token(";")]
    Semicolon,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    #[token("!")]
    Bang,
    #[token("!=")]
    BangEqual,
    #[token("=")]
    Equal,
    #[token("==")]
    EqualEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Identifier,
    #[regex(r#""[^"\n]*""#)]
    String,
    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Number,

    #[token("and")]
    And,
    #[token("do")]
    Do,
    #[token("else")]
    Else,
    #[token("elsif")]
    Elsif,
    #[token("end")]
    End,
    #[token("false")]
    False,
    #[token("if")]
    If,
    #[token("nil")]
    Nil,
    #[token("not")]
    Not,
    #[token("or")]
    Or,
    #[token("puts")]
    Puts,
    #[token("then")]
    Then,
    #[token("true")]
    True,
    #[token("while")]
    While,
}

impl TokenKind {
    pub fn show(&self) -> &'static str {
        use TokenKind::*;
        match self {
            Newline => "a newline",
            Semicolon => "`;`",
            LParen => "`(`",
            RParen => "`)`",
            Plus => "`+`",
            Minus => "`-`",
            Star => "`*`",
            Slash => "`/`",
            Percent => "`%`",
            Bang => "`!`",
            BangEqual => "`!=`",
            Equal => "`=`",
            EqualEqual => "`==`",
            Greater => "`>`",
            GreaterEqual => "`>=`",
            Less => "`<`",
            LessEqual => "`<=`",
            AmpAmp => "`&&`",
            PipePipe => "`||`",
            Identifier => "an identifier",
            String => "a string",
            Number => "a number",
            And => "`and`",
            Do => "`do`",
            Else => "`else`",
            Elsif => "`elsif`",
            End => "`end`",
            False => "`false`",
            If => "`if`",
            Nil => "`nil`",
            Not => "`not`",
            Or => "`or`",
            Puts => "`puts`",
            Then => "`then`",
            True => "`true`",
            While => "`while`",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Error<'a> {
    UnterminatedString { at: Loc<'a> },
    UnexpectedCharacter { at: Loc<'a> },
}

impl<'a> Error<'a> {
    pub fn at(&self) -> Loc<'a> {
        match self {
            Error::UnterminatedString { at } | Error::UnexpectedCharacter { at } => *at,
        }
    }
}

pub fn lex<'a>(
    bump: &'a Bump,
    file: &'a Path,
    src: &'a str,
) -> Result<(&'a [Token<'a>], Loc<'a>), Error<'a>> {
    let source_file = &*bump.alloc(SourceFile { file, src });
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(src);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let loc = Loc {
            span: Span { start: span.start, end: span.end },
            source_file,
        };
        match result {
            Ok(kind) => tokens.push(Token { kind, loc }),
            Err(()) =>
                return Err(if loc.slice().starts_with('"') {
                    Error::UnterminatedString { at: loc }
                }
                else {
                    Error::UnexpectedCharacter { at: loc }
                }),
        }
    }
    let eof_loc = Loc {
        span: Span { start: src.len(), end: src.len() },
        source_file,
    };
    Ok((bump.alloc_slice_copy(&tokens), eof_loc))
}
