//! `Server`: a listener that periodically re-resolves its configured endpoint
//! set and binds any newly discovered address, handing accepted connections
//! to a user callback on their own task (§4.2).

use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{lookup_host, TcpListener};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::packet_conn::PacketConn;

const RESOLVE_INTERVAL: Duration = Duration::from_secs(1);

/// Binds to every address that `endpoints` resolves to, re-resolving on a
/// slow poll so DHCP-assigned or multi-homed addresses are picked up without
/// subscribing to kernel events.
pub struct Server {
    endpoints: Vec<String>,
    bound: Mutex<HashSet<SocketAddr>>,
    alive: Arc<AtomicBool>,
    read_timeout: Option<Duration>,
}

impl Server {
    pub fn new(endpoints: Vec<String>, read_timeout: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            endpoints,
            bound: Mutex::new(HashSet::new()),
            alive: Arc::new(AtomicBool::new(true)),
            read_timeout,
        })
    }

    /// Runs the resolve-and-accept loop until `shutdown()` is called. `handler`
    /// is invoked on its own task for every accepted connection; a handler
    /// that returns an error is logged and the connection is nuked, but the
    /// accept loop for that socket keeps running.
    pub async fn run<F, Fut>(self: &Arc<Self>, handler: F)
    where
        F: Fn(PacketConn) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        while self.alive.load(Ordering::SeqCst) {
            for endpoint in &self.endpoints {
                self.bind_new_addresses(endpoint, &handler).await;
            }
            tokio::time::sleep(RESOLVE_INTERVAL).await;
        }
    }

    async fn bind_new_addresses<F, Fut>(self: &Arc<Self>, endpoint: &str, handler: &Arc<F>)
    where
        F: Fn(PacketConn) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let resolved = match lookup_host(endpoint).await {
            Ok(iter) => iter.collect::<Vec<_>>(),
            Err(e) => {
                warn!(endpoint, error = %e, "failed to resolve bind endpoint");
                return;
            }
        };

        for addr in resolved {
            let mut bound = self.bound.lock().await;
            if bound.contains(&addr) {
                continue;
            }
            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    bound.insert(addr);
                    drop(bound);
                    info!(%addr, "bound listener");
                    self.spawn_accept_loop(listener, Arc::clone(handler));
                }
                Err(e) => {
                    warn!(%addr, error = %e, "failed to bind");
                }
            }
        }
    }

    fn spawn_accept_loop<F, Fut>(self: &Arc<Self>, listener: TcpListener, handler: Arc<F>)
    where
        F: Fn(PacketConn) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if !this.alive.load(Ordering::SeqCst) {
                    return;
                }
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let handler = Arc::clone(&handler);
                        let read_timeout = this.read_timeout;
                        tokio::spawn(async move {
                            let conn = match PacketConn::accept(stream, read_timeout).await {
                                Ok(conn) => conn,
                                Err(e) => {
                                    warn!(%peer, error = %e, "handshake failed");
                                    return;
                                }
                            };
                            if let Err(e) = handler(conn).await {
                                error!(%peer, error = ?e, "connection handler failed");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
        });
    }

    /// Flips the alive flag so accept loops exit and no further binds happen.
    /// Already-bound listeners are dropped as accept loops observe the flag.
    pub fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}
