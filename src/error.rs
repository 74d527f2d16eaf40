//! Error types for the cache server
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Parse Error ==
/// A malformed request line or data block.
///
/// Protocol errors never close the connection: the client receives the
/// wire rendering from [`ParseError::to_wire`] and the parser starts over.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The first token is not a known command
    #[error("unknown command")]
    UnknownCommand,

    /// Invalid protocol format
    #[error("{0}")]
    Protocol(&'static str),

    /// A numeric field could not be parsed
    #[error("invalid number: {0}")]
    InvalidNumber(String),

    /// A storage command declared a data block above the size limit. The
    /// declared length is kept so the block can be skipped.
    #[error("value too large")]
    ValueTooLarge { bytes: usize },

    /// The command line grew past the maximum line length
    #[error("line too long")]
    LineTooLong,

    /// The data block was not followed by the line terminator
    #[error("bad data chunk")]
    BadDataChunk,
}

impl ParseError {
    // == Wire Rendering ==
    /// Returns the response line (without terminator) sent to the client.
    pub fn to_wire(&self) -> String {
        match self {
            ParseError::UnknownCommand => "ERROR".to_string(),
            other => format!("CLIENT_ERROR {}", other),
        }
    }
}

// == Command Error ==
/// A well-formed command that could not be executed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Item can never fit in the configured capacity
    #[error("object too large for cache")]
    TooLarge,

    /// Payload length did not match the declared byte count
    #[error("expected {expected} bytes of data, got {actual}")]
    PayloadLength { expected: usize, actual: usize },
}

impl CommandError {
    /// Returns the response line (without terminator) sent to the client.
    pub fn to_wire(&self) -> String {
        format!("SERVER_ERROR {}", self)
    }
}

// == Server Error ==
/// Startup and transport errors surfaced to the caller of `start`.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Socket, poll or thread creation failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Transport was started twice
    #[error("Server already started")]
    AlreadyStarted,
}

// == Result Type Alias ==
/// Convenience Result type for the cache server.
pub type Result<T> = std::result::Result<T, ServerError>;
