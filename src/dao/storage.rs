use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by room store backends regardless of the underlying engine.
///
/// The in-memory backend is infallible; the variant exists for the trait
/// boundary, where a database-backed store reports connectivity loss and the
/// service layer maps it onto a 503.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not service the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human-readable description of the failure.
        message: String,
        /// Backend-specific cause.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Wrap a backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_carries_message_and_source() {
        let err = StorageError::unavailable(
            "room lookup failed".into(),
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        );
        assert_eq!(err.to_string(), "storage unavailable: room lookup failed");
        assert!(std::error::Error::source(&err).is_some());
    }
}
