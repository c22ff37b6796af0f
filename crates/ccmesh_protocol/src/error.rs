//! Protocol error types.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("magic mismatch: expected {expected:?}, got {got:?}")]
    MagicMismatch { expected: [u8; 4], got: [u8; 4] },

    #[error("protocol version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },

    #[error("unknown role tag: {0:?}")]
    UnknownRole(Vec<u8>),

    #[error("unknown command: {0:?}")]
    UnknownCommand(Vec<u8>),

    #[error("truncated frame: expected at least {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("key {0:?} has no '|' separator")]
    MalformedKey(Vec<u8>),

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(u64),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
