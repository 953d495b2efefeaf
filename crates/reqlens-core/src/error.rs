//! Error types for reqlens
//!
//! Missing data is never an error in this crate. The variants below cover
//! the few cases that cannot be recovered locally: a raw request whose
//! target or method cannot be parsed, a broken configuration, and I/O while
//! moving an upload.

use http::StatusCode;

/// Result type alias for reqlens operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by reqlens
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request target could not be parsed as a URI
    #[error("invalid request target `{target}`: {source}")]
    InvalidTarget {
        target: String,
        #[source]
        source: http::uri::InvalidUri,
    },

    /// The request target was empty
    #[error("request target is empty")]
    EmptyTarget,

    /// The method token is not a valid HTTP method
    #[error("invalid request method `{0}`")]
    InvalidMethod(String),

    /// Configuration could not be read from the environment
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// A file operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status a server would answer with when this error escapes
    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidTarget { .. } | Error::EmptyTarget | Error::InvalidMethod(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Config(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable identifier for the error kind
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::InvalidTarget { .. } | Error::EmptyTarget => "invalid_target",
            Error::InvalidMethod(_) => "invalid_method",
            Error::Config(_) => "config_error",
            Error::Io(_) => "io_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_errors() {
        let err = Error::InvalidMethod("G ET".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_type(), "invalid_method");
        assert_eq!(err.to_string(), "invalid request method `G ET`");

        assert_eq!(Error::EmptyTarget.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_type(), "io_error");
    }
}
