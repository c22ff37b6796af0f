//! Transport error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NetError>;

/// Errors raised by the framing and connection layer.
///
/// These never propagate into module code as typed exceptions (see the spec's
/// Error Handling Design): the fabric boundary collapses them to `None`/a
/// logged-and-swallowed `Err` before handing control back to a module.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("connection is closed")]
    Closed,

    #[error("read timed out")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(#[from] ccmesh_protocol::ProtocolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connect to {0} failed: no address succeeded")]
    ConnectFailed(String),
}
