//! Error types.
//!
//! Each layer of the crate has its own error type:
//!
//! * [`ConfigError`]: the configuration or response grammar could not be loaded.
//! * [`TransportError`]: the serial connection failed (open, read, write).
//! * [`ClassifyError`]: a raw response could not be classified.
//! * [`TransactionError`]: a command transaction failed, which wraps the
//!   errors above along with the outcomes that are only meaningful to a whole
//!   transaction (an empty response, a status other than `OK`, running out of
//!   retries).
//!
//! Lower level errors convert into [`TransactionError`], allowing them to be
//! used with `?`:
//!
//! ```
//! use serial_commander::error::{TransactionError, TransportError};
//!
//! fn open() -> Result<(), TransportError> {
//!     // ...
//! # Ok(())
//! }
//!
//! fn transact() -> Result<(), TransactionError> {
//!     open()?;
//!     // ...
//! # Ok(())
//! }
//! ```

use crate::response::{ParsedResponse, ResponseKind};
use std::{io, path::PathBuf};

/// Implement `From<serialport::Error>` for the specified error type.
///
/// The type must have a `Disconnected(Box<str>)` and an `Io(io::Error)` variant.
macro_rules! impl_from_serialport_error {
    ($name:ident) => {
        impl From<serialport::Error> for $name {
            fn from(other: serialport::Error) -> Self {
                match other.kind() {
                    serialport::ErrorKind::NoDevice => {
                        $name::Disconnected(other.description.into_boxed_str())
                    }
                    serialport::ErrorKind::InvalidInput => $name::Io(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        other.description,
                    )),
                    serialport::ErrorKind::Unknown => {
                        $name::Io(io::Error::new(io::ErrorKind::Other, other.description))
                    }
                    serialport::ErrorKind::Io(kind) => {
                        $name::Io(io::Error::new(kind, other.description))
                    }
                }
            }
        }
    };
}

/// The configuration or response grammar is invalid.
#[derive(Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration file could not be read.
    Io {
        /// The path of the configuration file.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
    /// The configuration is not valid JSON or has a field of the wrong type.
    Json(serde_json::Error),
    /// Required top-level sections are missing.
    MissingSections(Vec<&'static str>),
    /// The response grammar names a response type that does not exist.
    UnknownResponseType(String),
    /// A response pattern is not a string.
    PatternNotString(String),
    /// A response pattern is not a valid regular expression.
    InvalidPattern {
        /// The response type the pattern belongs to.
        kind: ResponseKind,
        /// The underlying error.
        source: regex::Error,
    },
    /// A response pattern does not capture one group per field of its type.
    CaptureCount {
        /// The response type the pattern belongs to.
        kind: ResponseKind,
        /// The number of fields the response type has.
        expected: usize,
        /// The number of capture groups in the pattern.
        actual: usize,
    },
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Json(e) => Some(e),
            ConfigError::InvalidPattern { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read configuration file {}: {source}", path.display())
            }
            ConfigError::Json(e) => write!(f, "invalid configuration: {e}"),
            ConfigError::MissingSections(sections) => write!(
                f,
                "missing required configuration fields: {}",
                sections.join(", ")
            ),
            ConfigError::UnknownResponseType(name) => {
                write!(f, "unknown response type '{name}'")
            }
            ConfigError::PatternNotString(name) => {
                write!(f, "the pattern for response type '{name}' is not a string")
            }
            ConfigError::InvalidPattern { kind, source } => {
                write!(f, "invalid pattern for response type {kind}: {source}")
            }
            ConfigError::CaptureCount {
                kind,
                expected,
                actual,
            } => write!(
                f,
                "the pattern for response type {kind} has {actual} capture groups but {expected} are required"
            ),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(other: serde_json::Error) -> Self {
        ConfigError::Json(other)
    }
}

/// The serial connection failed.
#[derive(Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// The session is closed.
    NotOpen,
    /// The serial device is either in use by another process or was disconnected.
    Disconnected(Box<str>),
    /// Any other I/O error.
    Io(io::Error),
}

impl TransportError {
    /// A convenience function for determining if the error is due to the
    /// port timing out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Io(e) if e.kind() == io::ErrorKind::TimedOut)
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::NotOpen => write!(f, "the serial port is not open"),
            TransportError::Disconnected(description) => write!(
                f,
                "serial device is either in use or disconnected: {description}"
            ),
            TransportError::Io(e) => write!(f, "serial I/O error: {e}"),
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(other: io::Error) -> Self {
        TransportError::Io(other)
    }
}

impl_from_serialport_error!(TransportError);

/// A raw response could not be classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    /// No line of the response starts with `RESPONSE: `.
    NoValidLines,
    /// No response line matched any pattern in the grammar.
    NoMatch,
    /// A line matched a pattern but one of its fields has the wrong type.
    InvalidField {
        /// The response type whose pattern matched.
        kind: ResponseKind,
        /// The name of the field.
        field: &'static str,
        /// The text captured for the field.
        value: String,
    },
}

impl std::error::Error for ClassifyError {}

impl std::fmt::Display for ClassifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifyError::NoValidLines => write!(f, "no valid response lines found"),
            ClassifyError::NoMatch => write!(f, "no response line matched a known pattern"),
            ClassifyError::InvalidField { kind, field, value } => {
                write!(f, "invalid {field} '{value}' in {kind} response")
            }
        }
    }
}

/// A command transaction failed.
///
/// [`EmptyResponse`](TransactionError::EmptyResponse),
/// [`Classify`](TransactionError::Classify) and
/// [`NonOkStatus`](TransactionError::NonOkStatus) are retried by the
/// [`Commander`](crate::Commander); only
/// [`Transport`](TransactionError::Transport) and
/// [`ExhaustedRetries`](TransactionError::ExhaustedRetries) are ever returned
/// to the caller.
#[derive(Debug)]
#[non_exhaustive]
pub enum TransactionError {
    /// The connection failed. The session has been closed and reopened.
    Transport(TransportError),
    /// No complete response was received before the timeout.
    EmptyResponse,
    /// The response could not be classified.
    Classify(ClassifyError),
    /// The response was classified but its status is not `OK`.
    NonOkStatus(ParsedResponse),
    /// Every attempt failed.
    ExhaustedRetries {
        /// The number of times the command was sent.
        attempts: u32,
        /// Why the last attempt failed.
        last: Box<TransactionError>,
    },
}

impl TransactionError {
    /// Whether the command should be sent again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransactionError::EmptyResponse
                | TransactionError::Classify(_)
                | TransactionError::NonOkStatus(_)
        )
    }

    /// Whether the error was caused by the connection.
    pub fn is_transport(&self) -> bool {
        matches!(self, TransactionError::Transport(_))
    }
}

impl std::error::Error for TransactionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransactionError::Transport(e) => Some(e),
            TransactionError::Classify(e) => Some(e),
            TransactionError::ExhaustedRetries { last, .. } => Some(last.as_ref()),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionError::Transport(e) => e.fmt(f),
            TransactionError::EmptyResponse => write!(f, "no response received"),
            TransactionError::Classify(e) => e.fmt(f),
            TransactionError::NonOkStatus(response) => {
                write!(f, "response status is not OK: {}", response.status())
            }
            TransactionError::ExhaustedRetries { attempts, last } => {
                write!(f, "command failed after {attempts} attempts: {last}")
            }
        }
    }
}

impl From<TransportError> for TransactionError {
    fn from(other: TransportError) -> Self {
        TransactionError::Transport(other)
    }
}

impl From<ClassifyError> for TransactionError {
    fn from(other: ClassifyError) -> Self {
        TransactionError::Classify(other)
    }
}
