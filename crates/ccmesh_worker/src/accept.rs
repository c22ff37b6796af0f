//! Accept handler for incoming job (client) connections on the worker's own
//! listener: reject while saturated, else dispatch into the matched module
//! (§4.5 "Accept handler").

use std::sync::Arc;
use std::time::Duration;

use ccmesh_modules::ModuleRegistry;
use ccmesh_net::PacketConn;
use ccmesh_protocol::Key;
use tracing::{info, warn};

use crate::capacity::Capacity;
use crate::error::{Result, WorkerError};

pub async fn handle(
    capacity: Arc<Capacity>,
    registry: Arc<ModuleRegistry>,
    conn: PacketConn,
    keepalive_timeout: Duration,
) -> Result<()> {
    if !capacity.try_acquire() {
        conn.nuke().await;
        return Ok(());
    }

    let conn = Arc::new(conn);
    let result = run_job(&registry, &conn, keepalive_timeout).await;
    capacity.release();

    if let Err(e) = &result {
        warn!(error = %e, "worker-side job failed");
    }
    conn.nuke().await;
    result
}

async fn run_job(registry: &ModuleRegistry, conn: &Arc<PacketConn>, keepalive_timeout: Duration) -> Result<()> {
    conn.start_keepalive(keepalive_timeout).await;
    let hostname = String::from_utf8_lossy(&conn.recv().await?).into_owned();
    let key = Key::from(conn.recv().await?);
    let (module_name, subkey) = key.split()?;

    let module = registry
        .get(module_name)
        .ok_or_else(|| WorkerError::UnknownModule(module_name.to_string()))?;

    info!(%hostname, module = module_name, "running job");
    module.job_worker(conn, subkey).await?;
    Ok(())
}
