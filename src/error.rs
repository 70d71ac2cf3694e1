//! Error types for the Lua/BSON bridge.

use std::fmt;
use std::time::Duration;

/// The result type used throughout luamongo.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for luamongo operations.
#[derive(Debug, Clone)]
pub enum Error {
    /// Malformed scalar construction input or wrong arity.
    InvalidArgument(String),

    /// A value of unexpected shape was presented where a document or array
    /// was required.
    TypeMismatch(String),

    /// Text input is not recognizable as a document or an array.
    InvalidBson(String),

    /// The extended JSON parser rejected its input.
    Parse(String),

    /// The codec met a userdata handle it has no encoding rule for.
    UnknownHandleKind(String),

    /// The codec met a value shape it has no encoding rule for.
    UnsupportedType(String),

    /// The database capability reported an error (including timeouts and
    /// operations on a disconnected client).
    OperationFailure(String),

    /// An error raised by the Lua runtime itself.
    Lua(mlua::Error),
}

impl Error {
    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new type mismatch error.
    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Error::TypeMismatch(msg.into())
    }

    /// Creates a new operation failure.
    pub fn operation(msg: impl Into<String>) -> Self {
        Error::OperationFailure(msg.into())
    }

    /// Creates the failure reported when an operation exceeds its deadline.
    pub fn timeout(after: Duration) -> Self {
        Error::OperationFailure(format!("operation timed out after {}ms", after.as_millis()))
    }

    /// Creates the failure reported when a handle is used without a connection.
    pub fn not_connected() -> Self {
        Error::OperationFailure("mongo client is not connected".to_string())
    }

    /// Returns true for codec invariant violations, which abort the current
    /// call instead of being reported as data problems.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::UnknownHandleKind(_) | Error::UnsupportedType(_) | Error::Lua(_))
    }

    /// Returns true for failures that scripts receive as a `(nil, message)` pair.
    pub fn is_operation_failure(&self) -> bool {
        matches!(self, Error::OperationFailure(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::TypeMismatch(msg) => write!(f, "Type mismatch: {}", msg),
            Error::InvalidBson(msg) => write!(f, "Invalid BSON: {}", msg),
            Error::Parse(msg) => write!(f, "Extended JSON parse error: {}", msg),
            Error::UnknownHandleKind(msg) => write!(f, "Unknown handle kind: {}", msg),
            Error::UnsupportedType(msg) => write!(f, "Unsupported type: {}", msg),
            // Scripts see the driver's message verbatim.
            Error::OperationFailure(msg) => write!(f, "{}", msg),
            Error::Lua(e) => write!(f, "Lua error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Lua(e) => Some(e),
            _ => None,
        }
    }
}

impl From<mlua::Error> for Error {
    fn from(err: mlua::Error) -> Self {
        Error::Lua(err)
    }
}

impl From<Error> for mlua::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Lua(e) => e,
            other => mlua::Error::external(other),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<bson::extjson::de::Error> for Error {
    fn from(err: bson::extjson::de::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for Error {
    fn from(err: mongodb::error::Error) -> Self {
        Error::OperationFailure(err.to_string())
    }
}

impl serde::ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::UnsupportedType(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_argument("Timestamp needs 0 or 2 arguments");
        assert_eq!(err.to_string(), "Invalid argument: Timestamp needs 0 or 2 arguments");

        let err = Error::operation("connection refused");
        assert_eq!(err.to_string(), "connection refused");
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::UnsupportedType("function".into()).is_fatal());
        assert!(Error::UnknownHandleKind("userdata".into()).is_fatal());
        assert!(!Error::type_mismatch("string or table expected").is_fatal());

        assert!(Error::timeout(Duration::from_millis(50)).is_operation_failure());
        assert!(Error::not_connected().is_operation_failure());
        assert!(!Error::InvalidBson("x".into()).is_operation_failure());
    }

    #[test]
    fn test_timeout_message() {
        let err = Error::timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "operation timed out after 1500ms");
    }

    #[test]
    fn test_error_into_lua_keeps_message() {
        let lua_err: mlua::Error = Error::invalid_argument("invalid format").into();
        assert!(lua_err.to_string().contains("invalid format"));

        let original = mlua::Error::RuntimeError("boom".into());
        let round: mlua::Error = Error::from(original).into();
        assert!(matches!(round, mlua::Error::RuntimeError(_)));
    }
}
