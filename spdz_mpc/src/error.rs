use std::io;

use thiserror::Error;

use crate::transport::TransportError;

/// Errors raised while building or evaluating a computation.
#[derive(Debug, Error)]
pub enum Error {
    /// A buffer or vector did not have the expected length.
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// A bit index was outside of the vector.
    #[error("index {index} out of bounds for size {size}")]
    IndexOutOfBounds { index: usize, size: usize },

    /// Two operands that must have equal sizes did not.
    #[error("size mismatch: {left} != {right}")]
    SizeMismatch { left: usize, right: usize },

    /// Modulus is not usable as a field or ring modulus.
    #[error("invalid modulus: {0}")]
    InvalidModulus(String),

    /// Received or supplied data could not be interpreted.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// Underlying channel failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A batch did not finish within the configured number of rounds.
    #[error("batch not finished after {rounds} rounds")]
    RoundLimitExceeded { rounds: usize },

    /// Opened values are inconsistent with their MACs.
    #[error("MAC check failed on {openings} opened values")]
    MacCheckFailed { openings: usize },

    /// A party revealed a value that does not match its commitment.
    #[error("commitment of party {party} does not match the revealed value")]
    CommitmentMismatch { party: usize },

    /// Operation is not provided by this protocol suite or supplier.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Preprocessed material ran out.
    #[error("preprocessed material exhausted: {0}")]
    PreprocessingExhausted(&'static str),

    /// A deferred value was read before the step producing it completed.
    #[error("deferred value read before completion")]
    NotReady,

    /// A deferred value was completed twice.
    #[error("deferred value completed twice")]
    AlreadyCompleted,

    /// Protocol producers are nested deeper than allowed.
    #[error("protocol nesting exceeds depth {depth}")]
    NestingTooDeep { depth: usize },

    /// A step was appended to a chain whose steps were all evaluated.
    #[error("step appended to a chain that was already evaluated")]
    ChainClosed,

    /// The producer reported more protocols but handed out none.
    #[error("producer made no progress")]
    Stalled,

    #[error(transparent)]
    Io(#[from] io::Error),

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether the error signals detected malicious behaviour.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Error::MacCheckFailed { .. } | Error::CommitmentMismatch { .. }
        )
    }

    /// Whether the error was caused by the communication layer.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::RoundLimitExceeded { .. }
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Malformed(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}
