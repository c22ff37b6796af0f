//! Module error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModuleError>;

/// Errors raised inside a module's `job_client`/`job_worker` handler.
///
/// Per the spec's Error Handling Design, these never cross the fabric
/// boundary as typed exceptions — the client dispatch loop and the worker
/// accept handler both collapse a `ModuleError` into a retry/failure signal
/// and log it, rather than propagating it to their own callers.
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("transport error: {0}")]
    Transport(#[from] ccmesh_net::NetError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ccmesh_protocol::ProtocolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("malformed module payload: {0}")]
    Malformed(String),
}
