//! Worker-role connection handler (§4.4 "Worker handler").

use std::sync::Arc;
use std::time::Duration;

use ccmesh_net::PacketConn;
use ccmesh_protocol::WorkerDescriptor;
use tracing::{info, warn};

use crate::error::Result;
use crate::state::{Matchmaker, WorkerRecord};

pub async fn handle(mm: Arc<Matchmaker>, conn: PacketConn, keepalive_timeout: Duration) -> Result<()> {
    let conn = Arc::new(conn);
    conn.start_keepalive(keepalive_timeout).await;
    let desc_payload = conn.recv().await?;
    let desc = WorkerDescriptor::decode(&desc_payload)?;
    info!(hostname = %desc.hostname, keys = desc.keys.len(), max_slots = desc.max_slots, "worker connected");

    let worker_id = mm.next_worker_id();
    {
        let mut inner = mm.lock().await;
        for key in &desc.keys {
            inner
                .connected_workers_by_key
                .entry(key.clone())
                .or_default()
                .insert(worker_id);
        }
        inner.workers.insert(
            worker_id,
            WorkerRecord {
                conn: Arc::clone(&conn),
                desc: desc.clone(),
                avail_slots: 0.0,
                active: false,
            },
        );
    }

    let result = advert_loop(&mm, worker_id, &conn).await;

    let orphaned = {
        let mut inner = mm.lock().await;
        inner.remove_worker(worker_id)
    };
    for job_conn in orphaned {
        job_conn.nuke().await;
    }
    mm.notify_changed();
    conn.nuke().await;
    info!(hostname = %desc.hostname, worker_id, "worker disconnected");
    result
}

async fn advert_loop(mm: &Arc<Matchmaker>, worker_id: u64, conn: &PacketConn) -> Result<()> {
    loop {
        let payload = conn.recv().await?;
        let avail = ccmesh_protocol::wire::read_f64(&mut std::io::Cursor::new(payload.as_slice()));
        let avail_slots = match avail {
            Ok(v) => v,
            Err(e) => {
                warn!(worker_id, error = %e, "malformed slot report");
                return Err(e.into());
            }
        };
        let mut inner = mm.lock().await;
        inner.set_worker_slots(worker_id, avail_slots);
        drop(inner);
        mm.notify_changed();
    }
}
