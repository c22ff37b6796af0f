//! Job-role connection handler (§4.4 "Job handler").

use std::sync::Arc;
use std::time::Duration;

use ccmesh_net::PacketConn;
use ccmesh_protocol::{wire, JobCommand, JobWorkersInfo, Key, FAILED_MARKER};
use tracing::{info, warn};

use crate::error::Result;
use crate::state::{JobRecord, Matchmaker};

pub async fn handle(mm: Arc<Matchmaker>, conn: PacketConn, keepalive_timeout: Duration) -> Result<()> {
    let conn = Arc::new(conn);
    conn.start_keepalive(keepalive_timeout).await;
    let hostname = String::from_utf8_lossy(&conn.recv().await?).into_owned();
    let key = Key::from(conn.recv().await?);
    info!(%hostname, key = %key, "job connected");

    let job_id = mm.next_job_id();
    {
        let mut inner = mm.lock().await;
        inner.jobs.insert(
            job_id,
            JobRecord {
                conn: Arc::clone(&conn),
                hostname: hostname.clone(),
                key: key.clone(),
                active: false,
            },
        );
    }

    let result = command_loop(&mm, job_id, &hostname, &conn).await;

    {
        let mut inner = mm.lock().await;
        inner.remove_job(job_id);
    }
    mm.notify_changed();
    conn.nuke().await;
    info!(%hostname, job_id, "job disconnected");
    result
}

async fn command_loop(
    mm: &Arc<Matchmaker>,
    job_id: u64,
    hostname: &str,
    conn: &PacketConn,
) -> Result<()> {
    loop {
        let payload = conn.recv().await?;
        if payload == FAILED_MARKER {
            // Module handler did not succeed on the worker the client was
            // just assigned; the client re-requests a worker on its own next
            // frame, so this is purely informational here.
            info!(job_id, %hostname, "job reported failed dispatch attempt");
            continue;
        }

        let cmd = match JobCommand::parse(&payload) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!(job_id, error = %e, "unknown job command");
                return Err(e.into());
            }
        };

        match cmd {
            JobCommand::JobWorkers => {
                let info = job_workers_info(mm, hostname).await;
                conn.send(&info.encode()).await?;
            }
            JobCommand::RequestWorker => {
                let mut inner = mm.lock().await;
                inner.activate_job(job_id);
                drop(inner);
                mm.notify_changed();
            }
            JobCommand::Karma => {
                let to_hostname = String::from_utf8_lossy(&conn.recv().await?).into_owned();
                let points_payload = conn.recv().await?;
                let points = wire::read_f64(&mut std::io::Cursor::new(points_payload.as_slice()))?;
                let mut inner = mm.lock().await;
                inner.adjust_karma(&to_hostname, points);
                inner.adjust_karma(hostname, -points);
            }
        }
    }
}

async fn job_workers_info(mm: &Matchmaker, hostname: &str) -> JobWorkersInfo {
    let inner = mm.lock().await;
    let mut local_slots = 0u64;
    let mut remote_slots = 0u64;
    for worker in inner.workers.values() {
        if worker.desc.hostname == hostname {
            local_slots += worker.desc.max_slots as u64;
        } else {
            remote_slots += worker.desc.max_slots as u64;
        }
    }
    JobWorkersInfo {
        local_slots,
        remote_slots,
    }
}
