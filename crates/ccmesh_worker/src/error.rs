//! Worker error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkerError>;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("transport error: {0}")]
    Net(#[from] ccmesh_net::NetError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ccmesh_protocol::ProtocolError),

    #[error("module error: {0}")]
    Module(#[from] ccmesh_modules::ModuleError),

    #[error("no module registered for key {0:?}")]
    UnknownModule(String),
}
