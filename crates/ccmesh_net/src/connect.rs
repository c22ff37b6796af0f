//! `connect_any`: race a concurrent connect against a set of addresses.
//!
//! This is how clients tolerate multi-address workers and multi-address job
//! servers (§4.3). Each candidate `(host, port)` is resolved and raced with a
//! per-attempt timeout; the first to succeed wins and every other attempt is
//! aborted without returning a result.

use std::time::Duration;

use ccmesh_protocol::Address;
use tokio::net::{lookup_host, TcpStream};
use tokio::task::JoinSet;
use tracing::trace;

use crate::error::{NetError, Result};
use crate::packet_conn::PacketConn;

/// Resolves each address, races a TCP connect to every resolved socket, and
/// returns the first winner wrapped in a `PacketConn`. Losers are aborted.
pub async fn connect_any(
    addrs: &[Address],
    per_attempt_timeout: Duration,
    read_timeout: Option<Duration>,
) -> Result<PacketConn> {
    let mut set: JoinSet<std::io::Result<TcpStream>> = JoinSet::new();

    for addr in addrs {
        let hostport = format!("{}:{}", addr.host, addr.port);
        for resolved in lookup_host(&hostport).await.into_iter().flatten() {
            set.spawn(async move {
                let stream = tokio::time::timeout(per_attempt_timeout, TcpStream::connect(resolved))
                    .await
                    .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;
                Ok(stream)
            });
        }
    }

    if set.is_empty() {
        return Err(NetError::ConnectFailed("no addresses to try".into()));
    }

    let mut winner = None;
    while let Some(res) = set.join_next().await {
        match res {
            Ok(Ok(stream)) => {
                winner = Some(stream);
                break;
            }
            Ok(Err(e)) => trace!(error = %e, "connect_any attempt failed"),
            Err(e) => trace!(error = %e, "connect_any task panicked"),
        }
    }
    set.abort_all();

    let stream = winner.ok_or_else(|| NetError::ConnectFailed(format!("{addrs:?}")))?;
    PacketConn::from_connected_stream(stream, read_timeout).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_to_first_reachable_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            PacketConn::accept(stream, None).await.unwrap()
        });

        let candidates = vec![
            Address::new("127.0.0.1", 1), // unreachable, port 1 refuses fast
            Address::new("127.0.0.1", addr.port()),
        ];
        let conn = connect_any(&candidates, Duration::from_millis(500), None)
            .await
            .unwrap();
        accept.await.unwrap();
        conn.send(b"hi").await.unwrap();
    }

    #[tokio::test]
    async fn all_unreachable_fails() {
        let candidates = vec![Address::new("127.0.0.1", 1)];
        let result = connect_any(&candidates, Duration::from_millis(200), None).await;
        assert!(result.is_err());
    }
}
