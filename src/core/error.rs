//! Error types for parafetch
//!
//! A missing remote size is deliberately absent from this taxonomy: it is a
//! valid [`DiscoveredSize::Unknown`](crate::core::discovery::DiscoveredSize)
//! outcome, not a failure.

use std::fmt;

/// Main error type for parafetch operations
#[derive(Debug)]
pub enum Error {
    /// The request could not be issued, or the connection failed mid-stream
    TransportError(String),

    /// The server answered with a status outside {200, 206}
    RemoteStatusError(u16),

    /// The server ignored or overran the requested byte range
    RangeNotHonored { start: u64, end: u64 },

    /// File I/O error on the output target
    IoError(std::io::Error),

    /// Invalid configuration or parameters
    InvalidInput(String),

    /// The run was cancelled before it finished
    Cancelled,
}

impl Error {
    /// Whether this error came from the network side of a fetch
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::TransportError(_) | Error::RemoteStatusError(_) | Error::RangeNotHonored { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TransportError(msg) => {
                write!(f, "Transport error: {}", msg)
            }
            Error::RemoteStatusError(status) => {
                write!(f, "Unexpected status code: {}", status)
            }
            Error::RangeNotHonored { start, end } => {
                write!(f, "Server did not honor range bytes={}-{}", start, end)
            }
            Error::IoError(err) => {
                write!(f, "I/O error: {}", err)
            }
            Error::InvalidInput(msg) => {
                write!(f, "Invalid input: {}", msg)
            }
            Error::Cancelled => {
                write!(f, "Download cancelled")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::TransportError(err.to_string())
    }
}

/// Convenience result type for parafetch operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_status_message() {
        let err = Error::RemoteStatusError(404);
        assert_eq!(err.to_string(), "Unexpected status code: 404");
    }

    #[test]
    fn test_io_error_source() {
        use std::error::Error as _;

        let err = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("missing"));
        assert!(!err.is_remote());
    }

    #[test]
    fn test_is_remote() {
        assert!(Error::TransportError("reset".into()).is_remote());
        assert!(Error::RemoteStatusError(500).is_remote());
        assert!(Error::RangeNotHonored { start: 0, end: 9 }.is_remote());
        assert!(!Error::Cancelled.is_remote());
        assert!(!Error::InvalidInput("x".into()).is_remote());
    }
}
