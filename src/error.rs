use std::rc::Rc;

use thiserror::Error;

use crate::token::Span;

pub type LangResult<T> = std::result::Result<T, LangError>;

/// Typed errors produced anywhere in the lex/parse/compile/execute
/// pipeline. Every variant except probe failures aborts the run; probe
/// failures never reach this type (they are converted to ordinary
/// boolean values at the call site).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    // Lexing
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid escape sequence '\\{0}'")]
    InvalidEscape(char),
    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),
    #[error("invalid character '{0}'")]
    InvalidCharacter(char),

    // Parsing
    #[error("expected {expected}, got {got}")]
    Parse { expected: String, got: String },

    // Compilation invariants
    #[error("'break' outside of a loop")]
    BreakOutsideLoop,
    #[error("'continue' outside of a loop")]
    ContinueOutsideLoop,

    // Argument binding
    #[error("expected at least {expected} arguments, got {got}")]
    Arity { expected: usize, got: usize },
    #[error("too many arguments: expected at most {expected}, got {got}")]
    TooManyArgs { expected: usize, got: usize },
    #[error("expected {expected}, got {got} for argument '{param}'")]
    Type {
        expected: String,
        got: String,
        param: String,
    },
    #[error("unknown keyword argument '{0}'")]
    UnknownKeyword(String),
    #[error("duplicate keyword argument '{0}'")]
    DuplicateKeyword(String),

    // Runtime faults
    #[error("undefined identifier '{0}'")]
    UndefinedIdentifier(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("unknown method '{method}' for {receiver}")]
    UnknownMethod { method: String, receiver: String },
    #[error("index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("key '{0}' not found")]
    KeyNotFound(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("operator '{op}' not supported between {lhs} and {rhs}")]
    UnsupportedBinaryOp {
        op: &'static str,
        lhs: String,
        rhs: String,
    },
    #[error("operator '{op}' not supported for {operand}")]
    UnsupportedUnaryOp {
        op: &'static str,
        operand: String,
    },
    #[error("evaluation recursion limit of {0} exceeded")]
    RecursionLimit(usize),

    // External collaborators
    #[error("could not launch '{cmd}': {reason}")]
    ExternalTool { cmd: String, reason: String },
    #[error("{0}")]
    Io(String),

    // error(), assert(), version constraint failures
    #[error("{0}")]
    Fatal(String),
}

/// An [`ErrorKind`] tied to the source span that produced it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind}")]
pub struct LangError {
    pub kind: ErrorKind,
    pub span: Option<Span>,
    pub file: Option<Rc<str>>,
}

impl LangError {
    pub fn new(kind: ErrorKind, span: Span) -> Self {
        Self {
            kind,
            span: Some(span),
            file: None,
        }
    }

    pub fn bare(kind: ErrorKind) -> Self {
        Self {
            kind,
            span: None,
            file: None,
        }
    }

    pub fn with_file(mut self, file: Rc<str>) -> Self {
        if self.file.is_none() {
            self.file = Some(file);
        }
        self
    }

    /// Renders as `file:line:column: message`, degrading gracefully when
    /// location information is unavailable.
    pub fn render(&self) -> String {
        match (&self.file, self.span) {
            (Some(file), Some(span)) => {
                format!("{}:{}:{}: {}", file, span.line, span.column, self.kind)
            }
            (Some(file), None) => format!("{}: {}", file, self.kind),
            (None, Some(span)) => format!("{}:{}: {}", span.line, span.column, self.kind),
            (None, None) => self.kind.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_location_when_available() {
        let err = LangError::new(
            ErrorKind::UndefinedIdentifier("srcs".to_string()),
            Span::new(0, 4, 3, 7),
        )
        .with_file("mason.build".into());
        assert_eq!(err.render(), "mason.build:3:7: undefined identifier 'srcs'");
    }

    #[test]
    fn renders_bare_errors_without_location() {
        let err = LangError::bare(ErrorKind::DivisionByZero);
        assert_eq!(err.render(), "division by zero");
    }
}
