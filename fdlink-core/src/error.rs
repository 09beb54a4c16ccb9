use crate::{connection::ErrorReply, convert::ConversionError};

/// The Error type for the fdlink crates.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The peer violated the varlink protocol (malformed frame, reply without a pending call,
    /// unexpected `continues`, ...). The connection is unusable afterwards.
    ProtocolViolation(String),
    /// Descriptors were attached to a message but the endpoint is not a socket capable of
    /// ancillary data. The connection remains usable.
    FdPassingNotSupported,
    /// The connection was closed while calls were still pending, or an operation was attempted
    /// after shutdown began.
    ConnectionClosed,
    /// A value did not match its declared type.
    Conversion(ConversionError),
    /// The peer answered a call with an error reply.
    Call(ErrorReply),
    /// Invalid setup: duplicate interface registration, malformed declaration or flag
    /// combination. Fatal at configuration time.
    Configuration(String),
    /// A single frame exceeded the maximum buffer size.
    BufferOverflow,
    /// Error serializing or deserializing to/from JSON.
    Json(serde_json::Error),
    /// An I/O error.
    Io(std::io::Error),
    /// An error occurred while parsing an interface description.
    IdlParse(String),
}

/// The Result type for the fdlink crates.
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Shorthand for a [`Error::ProtocolViolation`] with the given description.
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Error::ProtocolViolation(msg.into())
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Error::Json(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Conversion(e) => Some(e),
            _ => None,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::ProtocolViolation(msg) => write!(f, "Protocol violation: {msg}"),
            Error::FdPassingNotSupported => {
                write!(f, "Endpoint does not support file descriptor passing")
            }
            Error::ConnectionClosed => write!(f, "Connection closed"),
            Error::Conversion(e) => write!(f, "Conversion error: {e}"),
            Error::Call(e) => write!(f, "Call failed: {}", e.name()),
            Error::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            Error::BufferOverflow => write!(f, "Buffer overflow"),
            Error::Json(e) => write!(f, "Error serializing or deserializing to/from JSON: {e}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::IdlParse(e) => write!(f, "Interface description parse error: {e}"),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ConversionError> for Error {
    fn from(e: ConversionError) -> Self {
        Error::Conversion(e)
    }
}
