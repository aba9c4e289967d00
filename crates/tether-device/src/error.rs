use std::borrow::Cow;

use tether::data::CodecError;

/// All possible device error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Some data encountered during a device operation is invalid or
    /// malformed.
    InvalidData,
    /// An internal error has occurred during the execution of a device
    /// operation.
    Internal,
    /// The device does not implement the requested operation.
    Unsupported,
    /// The device type does not declare the requested attribute or action.
    NotFound,
    /// A message could not be handed over to the transport.
    Transport,
}

impl ErrorKind {
    pub(crate) const fn description(self) -> &'static str {
        match self {
            Self::InvalidData => "Invalid Data",
            Self::Internal => "Internal",
            Self::Unsupported => "Unsupported",
            Self::NotFound => "Not Found",
            Self::Transport => "Transport",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.description().fmt(f)
    }
}

/// A device error.
///
/// The description of an error raised while serving a request is the message
/// the caller receives.
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

    /// Creates an [`ErrorKind::InvalidData`] error.
    #[must_use]
    #[inline]
    pub fn invalid_data(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::InvalidData, description)
    }

    /// Creates an [`ErrorKind::Internal`] error.
    #[must_use]
    #[inline]
    pub fn internal(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Internal, description)
    }

    /// Returns the [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error description.
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

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Self::invalid_data(e.to_string())
    }
}

impl From<tether_transport::error::Error> for Error {
    fn from(e: tether_transport::error::Error) -> Self {
        Self::new(ErrorKind::Transport, e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::internal(e.to_string())
    }
}

/// A specialized [`Result`] type for device operations.
pub type Result<T> = std::result::Result<T, Error>;
