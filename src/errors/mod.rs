use core::fmt;
use std::error::Error;
use std::fmt::Display;

/// Classifies election failures. Only `Cancelled` is terminal for the election loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
pub enum ErrorKind {
    Cancelled,
    Timeout,
    StoreUnavailable,
    LeaseNotFound,
    LeaseExpired,
    StreamClosed,
    InvalidConfiguration,
}

#[derive(Clone, Debug)]
pub struct ElectionError {
    kind: ErrorKind,
    text: String,
    cause: String,
}

pub type Result<T> = std::result::Result<T, ElectionError>;

pub fn new_err<T>(kind: ErrorKind, text: String, cause: String) -> Result<T> {
    Err(ElectionError::new(kind, text, cause))
}

impl ElectionError {
    pub fn new(kind: ErrorKind, text: String, cause: String) -> ElectionError {
        ElectionError { kind, text, cause }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    /// Transient errors are retried by the election loop after a backoff.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            ErrorKind::Timeout | ErrorKind::StoreUnavailable | ErrorKind::StreamClosed => true,
            _ => false,
        }
    }
}

impl Display for ElectionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let cause_word = {
            if !self.cause.is_empty() {
                " Cause: ".to_string()
            } else {
                String::new()
            }
        };
        write!(f, "{}: {}.{}{}", self.kind, self.text, cause_word, self.cause)
    }
}

impl Error for ElectionError {}
