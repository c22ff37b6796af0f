//! One-shot client dispatch loop (§4.6): register a job with the server,
//! then repeatedly request a worker, connect to it, and run the module's
//! client handler until it succeeds or the server connection itself dies.

use std::sync::Arc;
use std::time::Duration;

use ccmesh_modules::Module;
use ccmesh_net::{connect_any, PacketConn};
use ccmesh_protocol::{JobCommand, Key, Role, WorkerAssignment, FAILED_MARKER};
use tracing::{info, warn};

use crate::error::{ClientError, Result};
use crate::locate::ServerLocator;

pub struct DispatchConfig {
    pub hostname: String,
    pub key: Key,
    pub server_timeout: Duration,
    pub worker_timeout: Duration,
    pub keepalive_timeout: Duration,
}

/// Runs the dispatch loop to completion, returning the module's output on
/// the first attempt that succeeds.
pub async fn run(
    locator: &dyn ServerLocator,
    module: &dyn Module,
    args: &[u8],
    config: DispatchConfig,
) -> Result<Vec<u8>> {
    let server_addrs = locator.locate().await?;
    if server_addrs.is_empty() {
        return Err(ClientError::NoServer);
    }

    let server_conn = connect_any(&server_addrs, config.server_timeout, Some(config.keepalive_timeout)).await?;
    let server_conn = Arc::new(server_conn);
    server_conn.start_keepalive(config.keepalive_timeout).await;

    server_conn.send(Role::Job.as_bytes()).await?;
    server_conn.send(config.hostname.as_bytes()).await?;
    server_conn.send(config.key.as_bytes()).await?;

    let (_, subkey) = config.key.split()?;

    loop {
        server_conn.send(JobCommand::RequestWorker.as_bytes()).await?;
        let assignment_payload = server_conn.recv().await?;
        let assignment = WorkerAssignment::decode(&assignment_payload)?;

        match run_one_attempt(&assignment, module, subkey, args, &config).await {
            Ok(result) => {
                server_conn.send_shutdown().await?;
                return Ok(result);
            }
            Err(e) => {
                warn!(error = %e, hostname = %assignment.hostname, "dispatch attempt failed, retrying");
                server_conn.send(FAILED_MARKER).await?;
            }
        }
    }
}

async fn run_one_attempt(
    assignment: &WorkerAssignment,
    module: &dyn Module,
    subkey: &[u8],
    args: &[u8],
    config: &DispatchConfig,
) -> Result<Vec<u8>> {
    let worker_conn = connect_any(&assignment.addrs, config.worker_timeout, Some(config.keepalive_timeout)).await?;
    let worker_conn = Arc::new(worker_conn);
    worker_conn.start_keepalive(config.keepalive_timeout).await;

    worker_conn.send(config.hostname.as_bytes()).await?;
    worker_conn.send(config.key.as_bytes()).await?;

    let result = module.job_client(&worker_conn, subkey, args).await;
    worker_conn.nuke().await;

    info!(worker = %assignment.hostname, "ran attempt against worker");
    Ok(result?)
}
