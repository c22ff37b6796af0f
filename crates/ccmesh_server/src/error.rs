//! Matchmaker error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MatchError>;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("transport error: {0}")]
    Net(#[from] ccmesh_net::NetError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ccmesh_protocol::ProtocolError),

    #[error("unknown job id {0}")]
    UnknownJob(u64),

    #[error("unknown worker id {0}")]
    UnknownWorker(u64),
}
