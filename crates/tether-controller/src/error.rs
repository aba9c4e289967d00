use std::borrow::Cow;

use tether::data::CodecError;

/// All possible error kinds raised by a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The device, or one of its attributes or actions, is unknown.
    NotFound,
    /// A value does not belong to its declared type.
    Value,
    /// The device reported a failure, or the transport could not carry the
    /// request.
    Status,
    /// No reply arrived before the deadline.
    Timeout,
    /// The call has been cancelled.
    Cancelled,
    /// The call deadline is not valid.
    Deadline,
    /// The device metadata could not be retrieved.
    Registry,
}

impl ErrorKind {
    pub(crate) const fn description(self) -> &'static str {
        match self {
            Self::NotFound => "Not Found",
            Self::Value => "Value",
            Self::Status => "Status",
            Self::Timeout => "Timeout",
            Self::Cancelled => "Cancelled",
            Self::Deadline => "Deadline",
            Self::Registry => "Registry",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.description().fmt(f)
    }
}

/// A controller error.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    description: Cow<'static, str>,
}

impl Error {
    /// Creates an [`Error`] from an [`ErrorKind`] and a description.
    #[must_use]
    pub fn new(kind: ErrorKind, description: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    /// Returns the [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error description.
    ///
    /// For [`ErrorKind::Status`] errors reported by a device, this is the
    /// device message.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)
    }
}

impl std::error::Error for Error {}

impl From<tether_transport::error::Error> for Error {
    fn from(e: tether_transport::error::Error) -> Self {
        Self::new(ErrorKind::Status, e.to_string())
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Self::new(ErrorKind::Value, e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::new(ErrorKind::Value, format!("Json error caused by {e}"))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::new(ErrorKind::Registry, e.to_string())
    }
}

/// A specialized [`Result`] type for [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
