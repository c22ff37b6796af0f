//! Length-prefixed packet connections, a multiplexed acceptor, and a
//! concurrent-connect racer: the transport fabric beneath the job server,
//! worker, and client shim.

pub mod connect;
pub mod error;
pub mod packet_conn;
pub mod server;

pub use connect::connect_any;
pub use error::{NetError, Result};
pub use packet_conn::PacketConn;
pub use server::Server;
