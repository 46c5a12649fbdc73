use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Delimiters
    LeftParen,    // (
    RightParen,   // )
    LeftBracket,  // [
    RightBracket, // ]
    LeftBrace,    // {
    RightBrace,   // }
    Comma,        // ,
    Dot,          // .
    Semicolon,    // ;
    Colon,        // :
    Question,     // ?

    // Operators
    Minus,        // -
    Plus,         // +
    Slash,        // /
    Star,         // *
    Bang,         // !
    BangEqual,    // !=
    Equal,        // =
    EqualEqual,   // ==
    Greater,      // >
    GreaterEqual, // >=
    Less,         // <
    LessEqual,    // <=

    // Literals
    Identifier,
    String,
    Number,

    // Keywords
    And,
    Async,
    Await,
    Class,
    Def,
    Elif,
    Else,
    False,
    For,
    If,
    In,
    None,
    Not,
    Or,
    Pass,
    Return,
    Super,
    True,
    While,

    // Structural
    Newline,
    Indent,
    Dedent,
    EOF,
}

impl TokenKind {
    pub fn keyword(ident: &str) -> Option<Self> {
        let kind = match ident {
            "and" => TokenKind::And,
            "async" => TokenKind::Async,
            "await" => TokenKind::Await,
            "class" => TokenKind::Class,
            "def" => TokenKind::Def,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "False" => TokenKind::False,
            "for" => TokenKind::For,
            "if" => TokenKind::If,
            "in" => TokenKind::In,
            "None" => TokenKind::None,
            "not" => TokenKind::Not,
            "or" => TokenKind::Or,
            "pass" => TokenKind::Pass,
            "return" => TokenKind::Return,
            "super" => TokenKind::Super,
            "True" => TokenKind::True,
            "while" => TokenKind::While,
            _ => return None,
        };
        Some(kind)
    }
}

/// Literal payload carried by `Number` and `String` tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub literal: Option<Literal>,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            literal: None,
            line,
        }
    }

    pub fn with_literal(mut self, literal: Literal) -> Self {
        self.literal = Some(literal);
        self
    }

    /// Synthesized identifier used by parser desugarings.
    pub fn synthetic(name: impl Into<String>, line: usize) -> Self {
        Self::new(TokenKind::Identifier, name, line)
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.kind, self.lexeme)
    }
}
