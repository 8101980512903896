//! Error handling utilities for the sysc backend

use thiserror::Error;

/// The main error type for the sysc backend.
///
/// `InvariantViolation`, `Unimplemented`, and `OverconstrainedSpill` are fatal: any caller
/// that receives one should abort the process with the diagnostic rather than recover.
#[derive(Error, Debug, Clone)]
pub enum SyscError {
    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("failed to read input AST: {message}")]
    Parse { message: String },

    #[error("unimplemented: {message}")]
    Unimplemented { message: String },

    #[error("IR invariant violated: {message}")]
    InvariantViolation { message: String },

    #[error("over-constrained spill: {message}")]
    OverconstrainedSpill { message: String },
}

/// Result type alias for sysc backend operations.
pub type SyscResult<T> = Result<T, SyscError>;

impl SyscError {
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io { message: message.into() }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse { message: message.into() }
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::Unimplemented { message: message.into() }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation { message: message.into() }
    }

    pub fn overconstrained_spill(message: impl Into<String>) -> Self {
        Self::OverconstrainedSpill { message: message.into() }
    }

    /// True for the error kinds §7 classifies as fatal (process-abort), as opposed to a
    /// recoverable CLI-level I/O or argument error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Unimplemented { .. } | Self::InvariantViolation { .. } | Self::OverconstrainedSpill { .. }
        )
    }
}
