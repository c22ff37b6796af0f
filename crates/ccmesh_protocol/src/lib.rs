//! Wire protocol for the compile-dispatch fabric.
//!
//! # Protocol specification
//!
//! Every `PacketConn` (see `ccmesh_net`) begins with an 8-byte handshake written
//! once by the connecting side and validated once by the accepting side:
//!
//! ```text
//! [MAGIC: 4 bytes]["3" as u32 little-endian: 4 bytes]
//! ```
//!
//! After the handshake, frames flow as length-prefixed payloads (framing itself
//! lives in `ccmesh_net::PacketConn`; this crate only describes what goes
//! *inside* a payload). The first frame after the handshake is always a role
//! tag (`job` or `worker`), after which the two sides follow the job or worker
//! sub-protocol described in the top-level spec.

pub mod error;
pub mod mdns;
pub mod types;
pub mod wire;

pub use error::{ProtocolError, Result};
pub use types::{
    Address, JobCommand, JobWorkersInfo, Key, Role, WorkerAssignment, WorkerDescriptor,
    CMD_JOB_WORKERS, CMD_KARMA, CMD_REQUEST_WORKER, FAILED_MARKER, ROLE_JOB, ROLE_WORKER,
};

/// 4-byte magic prefix identifying this protocol family on the wire.
pub const MAGIC: [u8; 4] = *b"CCMF";

/// Current protocol major version. Bumping this invalidates old clients.
pub const PROTOCOL_VERSION: u32 = 3;

/// Total length of the handshake preamble (magic + version).
pub const HANDSHAKE_LEN: usize = 8;

/// Encodes the handshake preamble.
pub fn encode_handshake() -> [u8; HANDSHAKE_LEN] {
    let mut buf = [0u8; HANDSHAKE_LEN];
    buf[..4].copy_from_slice(&MAGIC);
    buf[4..].copy_from_slice(&PROTOCOL_VERSION.to_le_bytes());
    buf
}

/// Validates a received handshake preamble.
pub fn check_handshake(buf: &[u8; HANDSHAKE_LEN]) -> Result<()> {
    let mut magic = [0u8; 4];
    magic.copy_from_slice(&buf[..4]);
    if magic != MAGIC {
        return Err(ProtocolError::MagicMismatch {
            expected: MAGIC,
            got: magic,
        });
    }
    let mut version_bytes = [0u8; 4];
    version_bytes.copy_from_slice(&buf[4..]);
    let version = u32::from_le_bytes(version_bytes);
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            got: version,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_roundtrip() {
        let buf = encode_handshake();
        assert!(check_handshake(&buf).is_ok());
    }

    #[test]
    fn handshake_rejects_bad_magic() {
        let mut buf = encode_handshake();
        buf[0] ^= 0xFF;
        assert!(matches!(
            check_handshake(&buf),
            Err(ProtocolError::MagicMismatch { .. })
        ));
    }

    #[test]
    fn handshake_rejects_version_skew() {
        let mut buf = encode_handshake();
        buf[4..].copy_from_slice(&2u32.to_le_bytes());
        assert!(matches!(
            check_handshake(&buf),
            Err(ProtocolError::VersionMismatch {
                expected: 3,
                got: 2
            })
        ));
    }
}
