use clap::Parser;
use tracing::info;

/// Installs a process-wide fatal-crash policy (§4.4/§7): the matchmaker is
/// the single point of correctness for every queued job and connected
/// worker, so a panic anywhere in the process — including inside a spawned
/// task, where Tokio would otherwise just drop the task and carry on — takes
/// the whole server down rather than let it run on with corrupted state.
/// `std::panic::set_hook` runs before any unwind starts, so this fires
/// regardless of whether the panicking task's `JoinHandle` is ever awaited.
fn install_fatal_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        std::process::exit(1);
    }));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    install_fatal_panic_hook();

    let config = ccmesh_config::ServerConfig::parse();

    ccmesh_logging::init_logging(ccmesh_logging::LogConfig {
        app_name: "ccmesh-server",
        verbose: config.verbose,
    })?;

    info!(bind_addr = %config.bind_addr, "starting ccmesh job server");

    ccmesh_server::run(config.bind_addr, config.keepalive_timeout).await
}
