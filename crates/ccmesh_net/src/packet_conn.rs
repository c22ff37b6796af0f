//! `PacketConn`: a duplex, length-prefixed record layer over one TCP connection.
//!
//! See §4.1 of the spec for the wire format. Sends are serialized by one lock,
//! recvs by another, and a background task emits keep-alive markers whenever
//! the connection has been quiet for `keepalive_timeout / 2.5`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ccmesh_protocol::{check_handshake, encode_handshake, HANDSHAKE_LEN};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{NetError, Result};

const KEEPALIVE_MARKER: u8 = 0xFF;
const EXTENDED_LEN_MARKER: u8 = 0xFE;
const MAX_SHORT_LEN: usize = 0xFD;

/// A connected, framed, keep-alived duplex byte-record stream.
pub struct PacketConn {
    read_half: AsyncMutex<OwnedReadHalf>,
    write_half: AsyncMutex<OwnedWriteHalf>,
    alive: AtomicBool,
    sent_since_wake: Arc<AtomicBool>,
    keepalive: AsyncMutex<Option<JoinHandle<()>>>,
    read_timeout: Option<Duration>,
    peer_addr: SocketAddr,
}

impl PacketConn {
    /// Connects out to `addr`, writes the handshake preamble (this side is the
    /// "client-initiated" side per §4.1), and starts the keep-alive task.
    pub async fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
        read_timeout: Option<Duration>,
    ) -> Result<Self> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| NetError::Timeout)??;
        Self::from_connected_stream(stream, read_timeout).await
    }

    /// Wraps an already-connected outbound stream (e.g. the winner of
    /// `connect_any`) and writes the handshake preamble as the initiator.
    pub async fn from_connected_stream(stream: TcpStream, read_timeout: Option<Duration>) -> Result<Self> {
        stream.set_nodelay(true).ok();
        let conn = Self::wrap(stream, read_timeout)?;
        conn.write_raw(&encode_handshake()).await?;
        Ok(conn)
    }

    /// Wraps an accepted stream and reads/validates the handshake preamble.
    /// This is the accepting side's path. Call `start_keepalive` afterwards.
    pub async fn accept(stream: TcpStream, read_timeout: Option<Duration>) -> Result<Self> {
        stream.set_nodelay(true).ok();
        let conn = Self::wrap(stream, read_timeout)?;
        let mut preamble = [0u8; HANDSHAKE_LEN];
        conn.read_raw_exact(&mut preamble).await?;
        check_handshake(&preamble)?;
        Ok(conn)
    }

    fn wrap(stream: TcpStream, read_timeout: Option<Duration>) -> Result<Self> {
        let peer_addr = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            read_half: AsyncMutex::new(read_half),
            write_half: AsyncMutex::new(write_half),
            alive: AtomicBool::new(true),
            sent_since_wake: Arc::new(AtomicBool::new(false)),
            keepalive: AsyncMutex::new(None),
            read_timeout,
            peer_addr,
        })
    }

    /// Starts the background keep-alive task. Requires the connection to be
    /// held behind an `Arc` so the task can outlive the calling scope.
    pub async fn start_keepalive(self: &Arc<Self>, keepalive_timeout: Duration) {
        if keepalive_timeout.is_zero() {
            return;
        }
        let interval_dur = keepalive_timeout.div_f64(2.5);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval_dur);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if !this.alive.load(Ordering::SeqCst) {
                    return;
                }
                if this.sent_since_wake.swap(false, Ordering::SeqCst) {
                    continue;
                }
                if let Err(e) = this.send_keepalive_marker().await {
                    trace!(peer = %this.peer_addr, error = %e, "keep-alive write failed, stopping");
                    return;
                }
            }
        });
        *self.keepalive.lock().await = Some(handle);
    }

    async fn send_keepalive_marker(&self) -> Result<()> {
        let mut w = self.write_half.lock().await;
        w.write_all(&[KEEPALIVE_MARKER]).await?;
        Ok(())
    }

    /// Sends one frame. Fails immediately if the connection is already dead.
    pub async fn send(&self, payload: &[u8]) -> Result<()> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(NetError::Closed);
        }
        match self.send_inner(payload).await {
            Ok(()) => {
                self.sent_since_wake.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                self.nuke().await;
                Err(e)
            }
        }
    }

    async fn send_inner(&self, payload: &[u8]) -> Result<()> {
        let mut w = self.write_half.lock().await;
        if payload.len() <= MAX_SHORT_LEN {
            w.write_all(&[payload.len() as u8]).await?;
        } else {
            w.write_all(&[EXTENDED_LEN_MARKER]).await?;
            w.write_all(&(payload.len() as u64).to_le_bytes()).await?;
        }
        w.write_all(payload).await?;
        Ok(())
    }

    /// Receives the next user frame, transparently discarding keep-alive
    /// markers. Fails immediately if the connection is already dead.
    pub async fn recv(&self) -> Result<Vec<u8>> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(NetError::Closed);
        }
        match self.recv_inner().await {
            Ok(payload) => Ok(payload),
            Err(e) => {
                self.nuke().await;
                Err(e)
            }
        }
    }

    async fn recv_inner(&self) -> Result<Vec<u8>> {
        loop {
            let mut len_byte = [0u8; 1];
            self.read_raw_exact(&mut len_byte).await?;
            match len_byte[0] {
                KEEPALIVE_MARKER => {
                    trace!(peer = %self.peer_addr, "consumed keep-alive marker");
                    continue;
                }
                EXTENDED_LEN_MARKER => {
                    let mut len_bytes = [0u8; 8];
                    self.read_raw_exact(&mut len_bytes).await?;
                    let len = u64::from_le_bytes(len_bytes) as usize;
                    let mut payload = vec![0u8; len];
                    self.read_raw_exact(&mut payload).await?;
                    return Ok(payload);
                }
                l => {
                    let mut payload = vec![0u8; l as usize];
                    self.read_raw_exact(&mut payload).await?;
                    return Ok(payload);
                }
            }
        }
    }

    async fn read_raw_exact(&self, buf: &mut [u8]) -> Result<()> {
        let mut r = self.read_half.lock().await;
        let fut = r.read_exact(buf);
        match self.read_timeout {
            Some(d) => {
                let n = tokio::time::timeout(d, fut).await.map_err(|_| NetError::Timeout)??;
                if n != buf.len() {
                    return Err(NetError::Closed);
                }
            }
            None => {
                fut.await?;
            }
        }
        Ok(())
    }

    async fn write_raw(&self, buf: &[u8]) -> Result<()> {
        let mut w = self.write_half.lock().await;
        w.write_all(buf).await?;
        Ok(())
    }

    /// Orderly shutdown: disables keep-alive, half-closes the write side, then
    /// blocks reading until the peer has drained everything and closed.
    pub async fn send_shutdown(&self) -> Result<()> {
        self.stop_keepalive().await;
        {
            let mut w = self.write_half.lock().await;
            w.shutdown().await.ok();
        }
        // Drain: keep reading (and discarding) frames until the peer goes away.
        loop {
            match self.recv_inner().await {
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        self.alive.store(false, Ordering::SeqCst);
        debug!(peer = %self.peer_addr, "orderly shutdown complete");
        Ok(())
    }

    /// Abortive close: abandons any pending I/O and marks the connection dead.
    pub async fn nuke(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            trace!(peer = %self.peer_addr, "nuked connection");
        }
        self.stop_keepalive().await;
        let mut w = self.write_half.lock().await;
        w.shutdown().await.ok();
    }

    async fn stop_keepalive(&self) {
        if let Some(handle) = self.keepalive.lock().await.take() {
            handle.abort();
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair() -> (Arc<PacketConn>, Arc<PacketConn>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept_fut = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            PacketConn::accept(stream, None).await.unwrap()
        });
        let client = PacketConn::connect(addr, Duration::from_secs(1), None).await.unwrap();
        let server = accept_fut.await.unwrap();
        (Arc::new(client), Arc::new(server))
    }

    #[tokio::test]
    async fn roundtrip_short_frame() {
        let (client, server) = pair().await;
        client.send(b"hello").await.unwrap();
        let got = server.recv().await.unwrap();
        assert_eq!(got, b"hello".to_vec());
    }

    #[tokio::test]
    async fn roundtrip_long_frame() {
        let (client, server) = pair().await;
        let payload = vec![9u8; 1000];
        client.send(&payload).await.unwrap();
        let got = server.recv().await.unwrap();
        assert_eq!(got, payload);
    }

    #[tokio::test]
    async fn keepalive_marker_is_transparent() {
        let (client, server) = pair().await;
        // Manually inject a keep-alive byte ahead of a real frame.
        {
            let mut w = client.write_half.lock().await;
            w.write_all(&[KEEPALIVE_MARKER]).await.unwrap();
        }
        client.send(b"after-keepalive").await.unwrap();
        let got = server.recv().await.unwrap();
        assert_eq!(got, b"after-keepalive".to_vec());
    }

    #[tokio::test]
    async fn send_after_nuke_fails() {
        let (client, _server) = pair().await;
        client.nuke().await;
        assert!(client.send(b"x").await.is_err());
    }

    #[tokio::test]
    async fn version_mismatch_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept_fut = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            PacketConn::accept(stream, None).await
        });
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut bad = encode_handshake();
        bad[4..].copy_from_slice(&2u32.to_le_bytes());
        stream.write_all(&bad).await.unwrap();
        let result = accept_fut.await.unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn send_shutdown_drains_peer() {
        let (client, server) = pair().await;
        server.send(b"queued").await.unwrap();
        let shutdown = tokio::spawn(async move {
            client.send_shutdown().await.unwrap();
        });
        let got = server.recv().await.unwrap();
        assert_eq!(got, b"queued".to_vec());
        drop(server); // peer closes, unblocking the client's drain loop
        shutdown.await.unwrap();
    }
}
