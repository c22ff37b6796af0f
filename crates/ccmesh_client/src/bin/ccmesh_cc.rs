//! `ccmesh-cc`: drop-in compiler shim. Invoked exactly like `cc`/`c++`; ships
//! the translation unit to a remote worker via the dispatch fabric and falls
//! back to compiling locally if the cluster can't service the request.
//!
//! Real compiler-argument parsing and preprocessing (turning `argv` plus a
//! `.c`/`.cpp` source into a preprocessed translation unit) is the external
//! collaborator named out of scope in the spec; this shim treats the first
//! non-flag argument ending in a known source extension as already-suitable
//! input bytes, which is enough to exercise the dispatch fabric end to end.

use std::process::{Command, ExitCode};

use ccmesh_client::{DispatchConfig, StaticLocator};
use ccmesh_config::ClientConfig;
use ccmesh_modules::cc::{CcModule, CompileRequest};
use ccmesh_protocol::{Address, Key};
use clap::Parser;
use tracing::warn;

fn find_source_arg(argv: &[String]) -> Option<&str> {
    const SOURCE_EXTS: &[&str] = &[".c", ".cc", ".cpp", ".cxx", ".i", ".ii"];
    argv.iter()
        .find(|a| SOURCE_EXTS.iter().any(|ext| a.ends_with(ext)))
        .map(String::as_str)
}

#[tokio::main]
async fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let config = ClientConfig::parse_from(["ccmesh-cc"]);

    ccmesh_logging::init_logging(ccmesh_logging::LogConfig {
        app_name: "ccmesh-cc",
        verbose: config.verbose,
    })
    .ok();

    let Some(source_path) = find_source_arg(&argv) else {
        warn!("no recognizable source argument, falling back to local compiler");
        return run_locally(&argv);
    };

    let source = match std::fs::read(source_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "could not read source file, falling back to local compiler");
            return run_locally(&argv);
        }
    };

    let compiler_id = argv.first().cloned().unwrap_or_else(|| "cc".to_string());
    let key = Key::new("cc", compiler_id.as_bytes());
    let request = CompileRequest {
        argv: argv.clone(),
        source,
    };

    let job_server = match parse_address(&config.job_server_addr) {
        Some(addr) => addr,
        None => {
            warn!(addr = %config.job_server_addr, "unparseable job server address, falling back locally");
            return run_locally(&argv);
        }
    };
    let locator = StaticLocator::single(job_server);
    let module = CcModule::local();

    let dispatch_config = DispatchConfig {
        hostname: config.hostname.clone(),
        key,
        server_timeout: config.server_timeout,
        worker_timeout: config.worker_timeout,
        keepalive_timeout: config.keepalive_timeout,
    };

    match ccmesh_client::run(&locator, &module, &request.encode(), dispatch_config).await {
        Ok(result_bytes) => match ccmesh_modules::cc::CompileResult::decode(&result_bytes) {
            Ok(result) => {
                print!("{}", String::from_utf8_lossy(&result.stderr));
                ExitCode::from(result.exit_code as u8)
            }
            Err(e) => {
                warn!(error = %e, "malformed remote compile result, falling back locally");
                run_locally(&argv)
            }
        },
        Err(e) => {
            warn!(error = %e, "remote dispatch failed, falling back to local compiler");
            run_locally(&argv)
        }
    }
}

fn parse_address(addr: &str) -> Option<Address> {
    let (host, port) = addr.rsplit_once(':')?;
    Some(Address::new(host, port.parse().ok()?))
}

fn run_locally(argv: &[String]) -> ExitCode {
    let Some((compiler, rest)) = argv.split_first() else {
        return ExitCode::FAILURE;
    };
    match Command::new(compiler).args(rest).status() {
        Ok(status) => ExitCode::from(status.code().unwrap_or(1) as u8),
        Err(e) => {
            eprintln!("ccmesh-cc: local fallback failed: {e}");
            ExitCode::FAILURE
        }
    }
}
