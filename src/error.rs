//! Error types shared by every phase of the pipeline.
//!
//! Static errors (lexing, parsing, resolution) are collected and reported in
//! bulk; a runtime error aborts the current run. Both render in the
//! `[line N] Error at 'x': message` shape through their [`Location`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::token::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Only a line is known, as for lexer errors.
    Line(usize),
    Token { line: usize, lexeme: String },
    End { line: usize },
}

impl Location {
    pub fn at(token: &Token) -> Self {
        if token.kind == TokenKind::EOF {
            Location::End { line: token.line }
        } else {
            Location::Token {
                line: token.line,
                lexeme: token.lexeme.clone(),
            }
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Location::Line(line) | Location::Token { line, .. } | Location::End { line } => *line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Line(line) => write!(f, "[line {line}] Error"),
            Location::Token { line, lexeme } => write!(f, "[line {line}] Error at '{lexeme}'"),
            Location::End { line } => write!(f, "[line {line}] Error at end"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lex,
    Parse,
    Resolve,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{location}: {message}")]
pub struct StaticError {
    pub phase: Phase,
    pub location: Location,
    pub message: String,
}

impl StaticError {
    pub fn lex(line: usize, message: impl Into<String>) -> Self {
        Self {
            phase: Phase::Lex,
            location: Location::Line(line),
            message: message.into(),
        }
    }

    pub fn parse(token: &Token, message: impl Into<String>) -> Self {
        Self {
            phase: Phase::Parse,
            location: Location::at(token),
            message: message.into(),
        }
    }

    pub fn resolve(token: &Token, message: impl Into<String>) -> Self {
        Self {
            phase: Phase::Resolve,
            location: Location::at(token),
            message: message.into(),
        }
    }
}

/// Operations attempted on a value lacking the needed capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeErrorKind {
    #[error("Expect number for list index.")]
    NonNumericIndex,
    #[error("List index must be an integer, got {index}.")]
    FractionalIndex { index: String },
    #[error("Index out of bounds.")]
    IndexOutOfBounds,
    #[error("object has no len().")]
    NoLen,
    #[error("pop from empty list.")]
    PopFromEmpty,
    #[error("{function}() expected a number, got {got}.")]
    ExpectedNumber { function: String, got: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    #[error("Operand must be a number.")]
    OperandMustBeNumber,
    #[error("Operands must be numbers.")]
    OperandsMustBeNumbers,
    #[error("Operands must be two numbers or two strings.")]
    OperandsMustBeNumbersOrStrings,
    #[error("Divide by 0.")]
    DivideByZero,
    #[error("Can only call functions and classes.")]
    NotCallable,
    #[error("Expected {expected} arguments but got {found}.")]
    ArityMismatch { expected: usize, found: usize },
    #[error("Can only index lists and dicts.")]
    NotIndexable,
    #[error("Only instances have properties.")]
    PropertyOnNonInstance,
    #[error("Only instances have fields.")]
    FieldOnNonInstance,
    #[error("Undefined property '{name}'.")]
    UndefinedProperty { name: String },
    #[error("Undefined variable '{name}'.")]
    UndefinedVariable { name: String },
    #[error("Superclass must be a class.")]
    SuperclassNotClass,
    #[error("Missing required first argument self.")]
    MissingSelf,
    #[error("Maximum recursion depth exceeded.")]
    RecursionDepth,
    #[error("TypeError: {0}")]
    Type(#[from] TypeErrorKind),
    #[error("Host error: {message}")]
    Host { message: String },
    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub location: Option<Location>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind) -> Self {
        Self {
            kind,
            location: None,
        }
    }

    pub fn at(token: &Token, kind: RuntimeErrorKind) -> Self {
        Self {
            kind,
            location: Some(Location::at(token)),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RuntimeErrorKind::Internal {
            message: message.into(),
        })
    }

    /// Attaches `token` as the location unless one is already recorded.
    pub fn or_at(mut self, token: &Token) -> Self {
        if self.location.is_none() {
            self.location = Some(Location::at(token));
        }
        self
    }

    pub fn is_type_error(&self) -> bool {
        matches!(self.kind, RuntimeErrorKind::Type(_))
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

impl From<RuntimeErrorKind> for RuntimeError {
    fn from(kind: RuntimeErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<TypeErrorKind> for RuntimeError {
    fn from(kind: TypeErrorKind) -> Self {
        Self::new(RuntimeErrorKind::Type(kind))
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{location}: {}", self.kind),
            None => write!(f, "Error: {}", self.kind),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MontyError {
    #[error(transparent)]
    Static(#[from] StaticError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Receives every error a session produces. Hosts decide the rendering.
pub trait Reporter {
    fn report(&self, error: &MontyError);
}

/// Logs errors through `tracing`.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, error: &MontyError) {
        match error {
            MontyError::Static(error) => tracing::error!(phase = ?error.phase, "{error}"),
            MontyError::Runtime(error) => tracing::error!("{error}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct StderrReporter;

impl Reporter for StderrReporter {
    fn report(&self, error: &MontyError) {
        eprintln!("{error}");
    }
}

/// Keeps every reported error for later inspection.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    errors: RefCell<Vec<MontyError>>,
}

impl CollectingReporter {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn errors(&self) -> Vec<MontyError> {
        self.errors.borrow().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors
            .borrow()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn clear(&self) {
        self.errors.borrow_mut().clear();
    }
}

impl Reporter for CollectingReporter {
    fn report(&self, error: &MontyError) {
        self.errors.borrow_mut().push(error.clone());
    }
}
