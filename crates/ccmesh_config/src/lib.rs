//! `clap`-derived configuration structs for the three binaries, one per
//! role, each with the `CCMESH_*` environment variable fallbacks named in
//! the external interface table.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s)
}

fn default_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Shared by the job server; matchmaker has no dependents to dial, so it
/// only needs a bind address and the ambient logging/keepalive knobs.
#[derive(Parser, Debug, Clone)]
#[command(name = "ccmesh-server", about = "Compile-dispatch job server")]
pub struct ServerConfig {
    /// Address(es) the job server binds its job- and worker-facing listeners on.
    #[arg(long = "bind", env = "CCMESH_JOB_SERVER_ADDR", default_value = "127.0.0.1:8372")]
    pub bind_addr: String,

    #[arg(long = "keepalive-timeout", env = "CCMESH_KEEPALIVE_TIMEOUT", value_parser = parse_duration, default_value = "60s")]
    pub keepalive_timeout: Duration,

    #[arg(long = "log-level", env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    #[arg(long)]
    pub verbose: bool,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "ccmesh-worker", about = "Compile-dispatch worker")]
pub struct WorkerConfig {
    #[arg(long = "job-server", env = "CCMESH_JOB_SERVER_ADDR", default_value = "127.0.0.1:8372")]
    pub job_server_addr: String,

    #[arg(long = "bind", env = "CCMESH_WORKER_BASE_ADDR", default_value = "0.0.0.0:8373")]
    pub bind_addr: String,

    /// Optional sink for this worker's own log lines; disabled when unset.
    #[arg(long = "log-addr", env = "CCMESH_LOG_ADDR")]
    pub log_addr: Option<SocketAddr>,

    /// Concurrent job slots; defaults to the logical CPU count.
    #[arg(long = "slots", env = "CCMESH_WORKERS")]
    pub slots: Option<usize>,

    #[arg(long = "hostname", env = "CCMESH_HOSTNAME", default_value_t = default_hostname())]
    pub hostname: String,

    #[arg(long = "server-timeout", env = "CCMESH_TIMEOUT_WORKER_TO_SERVER", value_parser = parse_duration, default_value = "10s")]
    pub server_timeout: Duration,

    #[arg(long = "log-timeout", env = "CCMESH_TIMEOUT_TO_LOG", value_parser = parse_duration, default_value = "5s")]
    pub log_timeout: Duration,

    #[arg(long = "keepalive-timeout", env = "CCMESH_KEEPALIVE_TIMEOUT", value_parser = parse_duration, default_value = "60s")]
    pub keepalive_timeout: Duration,

    /// Compiler binaries the `cc` module should look for on `$PATH`;
    /// auto-detects `cc`/`c++` when left empty.
    #[arg(long = "compilers", env = "CCMESH_COMPILERS", value_delimiter = ',')]
    pub compilers: Vec<String>,

    #[arg(long = "log-level", env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    #[arg(long)]
    pub verbose: bool,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "ccmesh-client", about = "Compile-dispatch client shim")]
pub struct ClientConfig {
    #[arg(long = "job-server", env = "CCMESH_JOB_SERVER_ADDR", default_value = "127.0.0.1:8372")]
    pub job_server_addr: String,

    #[arg(long = "hostname", env = "CCMESH_HOSTNAME", default_value_t = default_hostname())]
    pub hostname: String,

    #[arg(long = "server-timeout", env = "CCMESH_TIMEOUT_CLIENT_TO_SERVER", value_parser = parse_duration, default_value = "10s")]
    pub server_timeout: Duration,

    #[arg(long = "worker-timeout", env = "CCMESH_TIMEOUT_TO_WORKER", value_parser = parse_duration, default_value = "5s")]
    pub worker_timeout: Duration,

    #[arg(long = "keepalive-timeout", env = "CCMESH_KEEPALIVE_TIMEOUT", value_parser = parse_duration, default_value = "60s")]
    pub keepalive_timeout: Duration,

    #[arg(long = "log-level", env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    #[arg(long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_defaults() {
        let cfg = ServerConfig::parse_from(["ccmesh-server"]);
        assert_eq!(cfg.bind_addr, "127.0.0.1:8372");
        assert_eq!(cfg.keepalive_timeout, Duration::from_secs(60));
    }

    #[test]
    fn worker_config_parses_compiler_list() {
        let cfg = WorkerConfig::parse_from(["ccmesh-worker", "--compilers", "cc,c++"]);
        assert_eq!(cfg.compilers, vec!["cc".to_string(), "c++".to_string()]);
        assert_eq!(cfg.job_server_addr, "127.0.0.1:8372");
    }

    #[test]
    fn client_config_overrides_via_args() {
        let cfg = ClientConfig::parse_from(["ccmesh-client", "--job-server", "10.0.0.1:9000"]);
        assert_eq!(cfg.job_server_addr, "10.0.0.1:9000");
    }
}
