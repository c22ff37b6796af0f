//! Client dispatch error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Net(#[from] ccmesh_net::NetError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ccmesh_protocol::ProtocolError),

    #[error("module error: {0}")]
    Module(#[from] ccmesh_modules::ModuleError),

    #[error("no job server address available")]
    NoServer,

    #[error("job server connection died before a dispatch succeeded")]
    ServerGone,
}
