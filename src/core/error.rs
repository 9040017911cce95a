use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // Cursor errors
    InvalidPosition,
    Closed,
    UnsupportedOperation,

    // Index errors
    UnsupportedOrdering,
    NoSuchIndex,
    InvariantViolation,

    // Store errors
    NotFound,
    AlreadyExists,
    NotAllowedOnNonLeaf,
    NotAllowed,

    // Input errors
    InvalidInput,
    Parse,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn invalid_position(operation: &str) -> Self {
        Error::new(
            ErrorKind::InvalidPosition,
            format!("{}: cursor is not positioned on an element", operation),
        )
    }

    pub fn closed(operation: &str) -> Self {
        Error::new(ErrorKind::Closed, format!("{}: cursor has been closed", operation))
    }

    pub fn unsupported(operation: &str) -> Self {
        Error::new(
            ErrorKind::UnsupportedOperation,
            format!("{} is not supported by this cursor", operation),
        )
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error {
            kind: ErrorKind::InvalidInput,
            context: format!("Invalid substring pattern: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
