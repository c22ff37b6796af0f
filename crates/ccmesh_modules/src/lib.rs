//! Module dispatch contract: what a worker actually runs once the fabric has
//! matched a client to it (§4.7). The fabric never inspects the payload a
//! module sends over its `PacketConn` — it only ever knows the module's name
//! and a raw subkey byte string.

pub mod cc;
pub mod error;
pub mod registry;
pub mod sleepmod;

pub use error::{ModuleError, Result};
pub use registry::ModuleRegistry;

use async_trait::async_trait;
use ccmesh_net::PacketConn;

/// A unit of work the fabric can dispatch clients to and run on workers.
///
/// A module owns its own sub-protocol entirely: `job_client` and `job_worker`
/// exchange whatever bytes they like over the handed `PacketConn`, and the
/// fabric (job server, worker advert loop, client dispatch loop) never parses
/// them.
#[async_trait]
pub trait Module: Send + Sync {
    /// Name used as the first segment of every `Key` this module produces,
    /// e.g. `"cc"` or `"sleep"`.
    fn name(&self) -> &str;

    /// Subkeys this module currently wants a worker to advertise capability
    /// for. Called by the worker's advert loop on a slow poll; an empty
    /// subkey is valid and means "any subkey matches".
    fn subkeys(&self) -> Vec<Vec<u8>> {
        vec![Vec::new()]
    }

    /// Runs the client side of one job against an already-matched worker
    /// connection. `subkey` is the capability subkey the worker was chosen
    /// for; `args` is caller-supplied opaque module input.
    async fn job_client(
        &self,
        conn: &PacketConn,
        subkey: &[u8],
        args: &[u8],
    ) -> Result<Vec<u8>>;

    /// Runs the worker side of one job against an already-matched client
    /// connection.
    async fn job_worker(&self, conn: &PacketConn, subkey: &[u8]) -> Result<()>;
}
