//! Error types shared by every part of the correlation core.

use thiserror::Error;

/// Result type for correlation operations
pub type Result<T> = std::result::Result<T, XcorrError>;

/// Errors that can occur while configuring or running a correlation.
///
/// None of these are retried anywhere in the crate. Each one is terminal for
/// the call that produced it and leaves no partial state behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XcorrError {
    /// Length mismatch between the supplied buffers and what the operation expects
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Chunk sizing that would produce an unaligned wrap-around region
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A raw buffer handed to the transform engine is not suitably aligned
    #[error("buffer at 0x{address:x} is not {required}-byte aligned")]
    Alignment { address: usize, required: usize },

    /// A plan was requested after the transform engine was shut down
    #[error("transform engine has been shut down")]
    EngineShutdown,

    /// Raw I/Q bytes that do not form whole sample records
    #[error("malformed sample stream: {0}")]
    MalformedStream(String),
}

/// Coarse classification of an [`XcorrError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Configuration,
    Alignment,
    Engine,
    Stream,
}

impl XcorrError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            XcorrError::InvalidInput(_) => ErrorKind::InvalidInput,
            XcorrError::Configuration(_) => ErrorKind::Configuration,
            XcorrError::Alignment { .. } => ErrorKind::Alignment,
            XcorrError::EngineShutdown => ErrorKind::Engine,
            XcorrError::MalformedStream(_) => ErrorKind::Stream,
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        XcorrError::InvalidInput(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(XcorrError::invalid_input("x").kind(), ErrorKind::InvalidInput);
        assert_eq!(XcorrError::Configuration("y".into()).kind(), ErrorKind::Configuration);
        assert_eq!(
            XcorrError::Alignment { address: 4, required: 64 }.kind(),
            ErrorKind::Alignment
        );
        assert_eq!(XcorrError::EngineShutdown.kind(), ErrorKind::Engine);
    }

    #[test]
    fn test_alignment_message_shows_address() {
        let err = XcorrError::Alignment { address: 0x1004, required: 64 };
        assert_eq!(err.to_string(), "buffer at 0x1004 is not 64-byte aligned");
    }
}
