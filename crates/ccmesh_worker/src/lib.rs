//! The worker: advertises compiler-cache capabilities to the job server and
//! runs dispatched jobs locally (§4.5).

pub mod accept;
pub mod advert;
pub mod capacity;
pub mod error;

use std::sync::Arc;

use ccmesh_config::WorkerConfig;
use ccmesh_modules::{cc::CcModule, sleepmod::SleepModule, ModuleRegistry};
use ccmesh_net::Server;
use ccmesh_protocol::{Address, Key};
use tracing::info;

pub use error::{Result, WorkerError};

fn split_host_port(addr: &str) -> Address {
    match addr.rsplit_once(':') {
        Some((host, port)) => Address::new(host, port.parse().unwrap_or(0)),
        None => Address::new(addr, 0),
    }
}

fn build_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register(Arc::new(SleepModule));
    registry.register(Arc::new(CcModule::local()));
    registry
}

/// The capability keys a module registry currently advertises, sorted so two
/// snapshots taken moments apart compare equal regardless of the registry's
/// (hash-map-backed, so unordered) internal iteration order.
pub fn registry_keys(registry: &ModuleRegistry) -> Vec<Key> {
    let mut keys: Vec<Key> = registry
        .modules()
        .flat_map(|m| {
            let name = m.name().to_string();
            m.subkeys().into_iter().map(move |sk| Key::new(&name, &sk))
        })
        .collect();
    keys.sort_unstable();
    keys
}

pub async fn run(config: WorkerConfig) -> anyhow::Result<()> {
    let max_slots = config.slots.unwrap_or_else(num_cpus::get) as u32;
    let registry = Arc::new(build_registry());
    let capacity = capacity::Capacity::new(max_slots);

    tokio::spawn(capacity::Capacity::sample_cpu_forever(Arc::clone(&capacity)));

    let own_addr = split_host_port(&config.bind_addr);
    let own_addr = Address::new(config.hostname.clone(), own_addr.port);
    let job_server_addr = split_host_port(&config.job_server_addr);

    let advert_params = advert::AdvertParams {
        job_server_addr,
        hostname: config.hostname.clone(),
        registry: Arc::clone(&registry),
        own_addrs: vec![own_addr],
        max_slots,
        server_timeout: config.server_timeout,
        keepalive_timeout: config.keepalive_timeout,
    };
    tokio::spawn(advert::run(advert_params, Arc::clone(&capacity)));

    info!(bind_addr = %config.bind_addr, max_slots, "starting ccmesh worker");
    let server = Server::new(vec![config.bind_addr], None);
    let keepalive_timeout = config.keepalive_timeout;
    server
        .run(move |conn| {
            let capacity = Arc::clone(&capacity);
            let registry = Arc::clone(&registry);
            async move {
                accept::handle(capacity, registry, conn, keepalive_timeout).await?;
                Ok(())
            }
        })
        .await;

    Ok(())
}
