//! `sleep`: the minimal end-to-end exerciser module. The client sends a
//! duration in seconds, the worker sleeps that long and acks. Useful for
//! soak-testing the fabric without invoking a real compiler.

use std::time::Duration;

use async_trait::async_trait;
use ccmesh_net::PacketConn;
use tracing::debug;

use crate::error::{ModuleError, Result};
use crate::Module;

const ACK: &[u8] = b"ok";

pub struct SleepModule;

#[async_trait]
impl Module for SleepModule {
    fn name(&self) -> &str {
        "sleep"
    }

    async fn job_client(&self, conn: &PacketConn, _subkey: &[u8], args: &[u8]) -> Result<Vec<u8>> {
        let secs: u64 = args
            .try_into()
            .map(u64::from_le_bytes)
            .map_err(|_| ModuleError::Malformed("sleep args must be 8 bytes".into()))?;
        conn.send(&secs.to_le_bytes()).await?;
        let reply = conn.recv().await?;
        if reply != ACK {
            return Err(ModuleError::Malformed("unexpected sleep worker reply".into()));
        }
        Ok(reply)
    }

    async fn job_worker(&self, conn: &PacketConn, _subkey: &[u8]) -> Result<()> {
        let payload = conn.recv().await?;
        let secs: u64 = payload
            .as_slice()
            .try_into()
            .map(u64::from_le_bytes)
            .map_err(|_| ModuleError::Malformed("sleep payload must be 8 bytes".into()))?;
        debug!(secs, "sleep module sleeping");
        tokio::time::sleep(Duration::from_secs(secs)).await;
        conn.send(ACK).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_sleep() {
        assert_eq!(SleepModule.name(), "sleep");
    }
}
