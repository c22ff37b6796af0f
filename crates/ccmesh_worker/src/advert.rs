//! Advert loop: register with the job server, then report fractional
//! availability until the connection dies, at which point reconnect (§4.5).

use std::sync::Arc;
use std::time::Duration;

use ccmesh_modules::ModuleRegistry;
use ccmesh_net::{connect_any, PacketConn};
use ccmesh_protocol::{wire, Address, Role, WorkerDescriptor};
use tracing::{info, warn};

use crate::capacity::Capacity;
use crate::error::Result;
use crate::registry_keys;

const MIN_SEND_INTERVAL: Duration = Duration::from_millis(100);
const MAX_WAIT: Duration = Duration::from_secs(10);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
const MODULE_SET_POLL_INTERVAL: Duration = Duration::from_secs(30);

pub struct AdvertParams {
    pub job_server_addr: Address,
    pub hostname: String,
    pub registry: Arc<ModuleRegistry>,
    pub own_addrs: Vec<Address>,
    pub max_slots: u32,
    pub server_timeout: Duration,
    pub keepalive_timeout: Duration,
}

/// Runs forever: connect, advertise, report availability, and on any
/// disconnect sleep a beat and reconnect.
pub async fn run(params: AdvertParams, capacity: Arc<Capacity>) {
    loop {
        if let Err(e) = advert_once(&params, &capacity).await {
            warn!(error = %e, "advert connection lost, reconnecting");
        }
        tokio::time::sleep(RECONNECT_BACKOFF).await;
    }
}

async fn advert_once(params: &AdvertParams, capacity: &Arc<Capacity>) -> Result<()> {
    let conn = connect_any(
        std::slice::from_ref(&params.job_server_addr),
        params.server_timeout,
        Some(params.keepalive_timeout),
    )
    .await?;
    let conn = Arc::new(conn);
    conn.start_keepalive(params.keepalive_timeout).await;

    conn.send(Role::Worker.as_bytes()).await?;
    let keys = registry_keys(&params.registry);
    let descriptor = WorkerDescriptor {
        hostname: params.hostname.clone(),
        keys: keys.clone(),
        addrs: params.own_addrs.clone(),
        max_slots: params.max_slots,
    };
    conn.send(&descriptor.encode()).await?;
    info!(hostname = %params.hostname, keys = keys.len(), "advertised to job server");

    // Sole reader of this connection: a blocked recv surfaces the server
    // closing its end (it never sends us anything back).
    let reader = Arc::clone(&conn);
    let disconnect_watchdog = tokio::spawn(async move {
        let _ = reader.recv().await;
        reader.nuke().await;
    });

    // Second watchdog (§4.5): the advertised descriptor (module set) is only
    // ever sent once per connection, so the only way to get a changed one to
    // the job server is to force a reconnect. Polls slowly since the
    // registry's module set is fixed at registration time in this worker and
    // so in practice never actually changes within a process's lifetime;
    // this is the hook a dynamically-reloadable registry would need.
    let registry = Arc::clone(&params.registry);
    let watch_conn = Arc::clone(&conn);
    let module_set_watchdog = tokio::spawn(async move {
        loop {
            tokio::time::sleep(MODULE_SET_POLL_INTERVAL).await;
            if registry_keys(&registry) != keys {
                info!("capability set changed, forcing reconnect to re-advertise");
                watch_conn.nuke().await;
                return;
            }
        }
    });

    report_loop(&conn, capacity).await;
    disconnect_watchdog.abort();
    module_set_watchdog.abort();
    Ok(())
}

async fn report_loop(conn: &PacketConn, capacity: &Arc<Capacity>) {
    loop {
        if !conn.is_alive() {
            return;
        }
        let avail = capacity.reported_availability().await;
        let payload = wire::build(|buf| wire::write_f64(buf, avail));
        if conn.send(&payload).await.is_err() {
            return;
        }

        let notified = capacity.subscribe();
        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep(MAX_WAIT) => {}
        }
        tokio::time::sleep(MIN_SEND_INTERVAL).await;
    }
}
