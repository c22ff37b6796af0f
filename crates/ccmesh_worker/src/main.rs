use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ccmesh_config::WorkerConfig::parse();

    ccmesh_logging::init_logging(ccmesh_logging::LogConfig {
        app_name: "ccmesh-worker",
        verbose: config.verbose,
    })?;

    ccmesh_worker::run(config).await
}
