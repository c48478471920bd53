//! Error type shared by the lexer, parsers and interpreter.
//!
//! Every error carries an [`ErrorKind`] and a [`Location`].  Lex and parse
//! errors know their line and column; runtime errors are tagged with the line
//! of the statement that raised them on their way up through the executor.

use std::fmt;

use thiserror::Error;

/// A source position (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

impl Pos {
    pub fn new(line: usize, column: usize) -> Self {
        Pos { line, column }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Where an error happened, as precisely as it is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Location {
    #[default]
    Unknown,
    Line(usize),
    At(Pos),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Unknown => Ok(()),
            Location::Line(n) => write!(f, "line {n}: "),
            Location::At(pos) => write!(f, "{pos}: "),
        }
    }
}

/// The category of a Solar error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    #[error("LexError: {0}")]
    Lex(String),

    #[error("ParseError: {0}")]
    Parse(String),

    #[error("NameError: `{0}` is not defined")]
    Name(String),

    #[error("ArityError: `{name}` expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("TypeError: {0}")]
    Type(String),

    #[error("ValueError: {0}")]
    Value(String),

    #[error("ImportError: cannot import `{package}`: {reason}")]
    Import { package: String, reason: String },

    #[error("PassthroughError ({language}): {message}")]
    Passthrough { language: String, message: String },

    #[error("FrontendError: {0}")]
    Frontend(String),

    #[error("RecursionError: call depth exceeded {0}")]
    Recursion(usize),
}

/// An [`ErrorKind`] plus where it happened.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{location}{kind}")]
pub struct SolarError {
    pub kind: ErrorKind,
    pub location: Location,
}

impl SolarError {
    pub fn new(kind: ErrorKind) -> Self {
        SolarError { kind, location: Location::Unknown }
    }

    pub fn lex(pos: Pos, msg: impl Into<String>) -> Self {
        SolarError { kind: ErrorKind::Lex(msg.into()), location: Location::At(pos) }
    }

    pub fn parse(pos: Pos, msg: impl Into<String>) -> Self {
        SolarError { kind: ErrorKind::Parse(msg.into()), location: Location::At(pos) }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::Name(name.into()))
    }

    pub fn type_err(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type(msg.into()))
    }

    pub fn value_err(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Value(msg.into()))
    }

    /// Attach a statement line, unless a location is already known.
    pub fn at_line(mut self, line: usize) -> Self {
        if self.location == Location::Unknown {
            self.location = Location::Line(line);
        }
        self
    }

    /// The line this error refers to, if known.
    pub fn line(&self) -> Option<usize> {
        match self.location {
            Location::Unknown => None,
            Location::Line(n) => Some(n),
            Location::At(pos) => Some(pos.line),
        }
    }
}

impl From<ErrorKind> for SolarError {
    fn from(kind: ErrorKind) -> Self {
        SolarError::new(kind)
    }
}

pub type Result<T, E = SolarError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_position() {
        let e = SolarError::parse(Pos::new(3, 7), "expected `end`");
        assert_eq!(e.to_string(), "line 3, column 7: ParseError: expected `end`");
    }

    #[test]
    fn at_line_keeps_existing_location() {
        let e = SolarError::lex(Pos::new(1, 2), "bad").at_line(9);
        assert_eq!(e.line(), Some(1));
        let e = SolarError::name("x").at_line(9);
        assert_eq!(e.location, Location::Line(9));
        assert_eq!(e.to_string(), "line 9: NameError: `x` is not defined");
    }
}
