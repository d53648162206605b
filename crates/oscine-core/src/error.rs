//! Error types for Oscine core

use thiserror::Error;

/// Result type alias for codec and dispatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the codec and the address space
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Address pattern does not begin with '/'
    #[error("invalid address: must start with '/'")]
    InvalidAddress,

    /// Char argument outside the ASCII range
    #[error("invalid character: {0:?} is not ASCII")]
    InvalidCharacter(char),

    /// Input ended before the declared content
    #[error("packet truncated")]
    Truncated,

    /// Input is not an OSC message or bundle
    #[error("invalid packet")]
    InvalidPacket,

    /// A string ran to the end of input without a NUL terminator
    #[error("unterminated string")]
    UnterminatedString,

    /// Arguments present but the type tag string does not begin with ','
    #[error("missing type tag string")]
    MissingTypeTag,

    /// Unrecognized character in the type tag string
    #[error("unknown type tag: {0:?}")]
    UnknownTypeTag(char),

    /// Bundle element length is not positive or exceeds the container
    #[error("invalid bundle element length")]
    InvalidBundleElement,

    /// ']' without a matching '[', or '[' left open at end of tags
    #[error("unmatched array bracket in type tags")]
    UnmatchedArrayClose,
}
