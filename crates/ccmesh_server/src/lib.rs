//! The job server: matchmaker state, accept dispatch, and the matchmaking
//! loop (§4.4).

pub mod error;
pub mod job;
pub mod matchmaker;
pub mod state;
pub mod stats;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use ccmesh_net::Server;
use ccmesh_protocol::Role;
use tracing::{error, warn};

pub use error::{MatchError, Result};
pub use state::Matchmaker;

/// Binds `bind_addr`, runs the matchmaker and stats-reporter background
/// tasks, and dispatches every accepted connection to the job or worker
/// handler by its first-frame role tag. Runs until the process is killed.
pub async fn run(bind_addr: String, keepalive_timeout: Duration) -> anyhow::Result<()> {
    let mm = Matchmaker::new();

    tokio::spawn(matchmaker::run(Arc::clone(&mm)));
    tokio::spawn(stats::run(Arc::clone(&mm)));

    let server = Server::new(vec![bind_addr], None);
    server
        .run(move |conn| {
            let mm = Arc::clone(&mm);
            async move {
                let role_payload = conn.recv().await?;
                let role = Role::parse(&role_payload)?;
                let result = match role {
                    Role::Job => job::handle(mm, conn, keepalive_timeout).await,
                    Role::Worker => worker::handle(mm, conn, keepalive_timeout).await,
                };
                if let Err(e) = result {
                    warn!(error = %e, "connection handler exited with error");
                }
                Ok(())
            }
        })
        .await;

    error!("accept loop exited, job server shutting down");
    Ok(())
}
