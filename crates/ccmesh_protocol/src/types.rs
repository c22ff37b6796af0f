//! Wire types: Address, WorkerDescriptor (WorkerAdvert), WorkerAssignment, JobWorkersInfo, Key.

use std::io::Cursor;

use crate::error::{ProtocolError, Result};
use crate::wire;

/// `(host-string, port)`, encodable on the wire. A worker advertises several of
/// these (one per interface/family it wants to be reachable on).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        wire::write_bytes(buf, self.host.as_bytes());
        wire::write_u16(buf, self.port);
    }

    pub fn decode(cur: &mut Cursor<&[u8]>) -> Result<Self> {
        let host = String::from_utf8_lossy(&wire::read_bytes(cur)?).into_owned();
        let port = wire::read_u16(cur)?;
        Ok(Self { host, port })
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Opaque `<module-name>|<subkey>` capability identifier. Produced by a module;
/// the fabric only ever splits it on the first `|` to route worker adverts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(pub Vec<u8>);

impl Key {
    pub fn new(module: &str, subkey: &[u8]) -> Self {
        let mut buf = Vec::with_capacity(module.len() + 1 + subkey.len());
        buf.extend_from_slice(module.as_bytes());
        buf.push(b'|');
        buf.extend_from_slice(subkey);
        Key(buf)
    }

    /// Splits into `(module_name, subkey)` on the first `|`.
    pub fn split(&self) -> Result<(&str, &[u8])> {
        let pos = self
            .0
            .iter()
            .position(|&b| b == b'|')
            .ok_or_else(|| ProtocolError::MalformedKey(self.0.clone()))?;
        let module = std::str::from_utf8(&self.0[..pos]).map_err(|_| ProtocolError::MalformedKey(self.0.clone()))?;
        Ok((module, &self.0[pos + 1..]))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Key {
    fn from(v: Vec<u8>) -> Self {
        Key(v)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Declared once at worker-connect time; immutable thereafter for that connection.
/// Encoded on the wire as the WorkerAdvert packet (protocol version 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerDescriptor {
    pub hostname: String,
    pub keys: Vec<Key>,
    pub addrs: Vec<Address>,
    pub max_slots: u32,
}

impl WorkerDescriptor {
    pub fn encode(&self) -> Vec<u8> {
        wire::build(|buf| {
            wire::write_bytes(buf, self.hostname.as_bytes());
            wire::write_u64(buf, self.keys.len() as u64);
            for k in &self.keys {
                wire::write_bytes(buf, k.as_bytes());
            }
            wire::write_u64(buf, self.addrs.len() as u64);
            for a in &self.addrs {
                a.encode(buf);
            }
            wire::write_u64(buf, self.max_slots as u64);
        })
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(payload);
        let hostname = String::from_utf8_lossy(&wire::read_bytes(&mut cur)?).into_owned();
        let num_keys = wire::read_u64(&mut cur)?;
        let mut keys = Vec::with_capacity(num_keys as usize);
        for _ in 0..num_keys {
            keys.push(Key(wire::read_bytes(&mut cur)?));
        }
        let num_addrs = wire::read_u64(&mut cur)?;
        let mut addrs = Vec::with_capacity(num_addrs as usize);
        for _ in 0..num_addrs {
            addrs.push(Address::decode(&mut cur)?);
        }
        let max_slots = wire::read_u64(&mut cur)? as u32;
        Ok(Self {
            hostname,
            keys,
            addrs,
            max_slots,
        })
    }
}

/// Server -> job directive naming a worker the job should connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerAssignment {
    pub hostname: String,
    pub addrs: Vec<Address>,
}

impl WorkerAssignment {
    pub fn encode(&self) -> Vec<u8> {
        wire::build(|buf| {
            wire::write_bytes(buf, self.hostname.as_bytes());
            wire::write_u64(buf, self.addrs.len() as u64);
            for a in &self.addrs {
                a.encode(buf);
            }
        })
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(payload);
        let hostname = String::from_utf8_lossy(&wire::read_bytes(&mut cur)?).into_owned();
        let num_addrs = wire::read_u64(&mut cur)?;
        let mut addrs = Vec::with_capacity(num_addrs as usize);
        for _ in 0..num_addrs {
            addrs.push(Address::decode(&mut cur)?);
        }
        Ok(Self { hostname, addrs })
    }
}

/// Reply to a `job_workers` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobWorkersInfo {
    pub local_slots: u64,
    pub remote_slots: u64,
}

impl JobWorkersInfo {
    pub fn encode(&self) -> Vec<u8> {
        wire::build(|buf| {
            wire::write_u64(buf, self.local_slots);
            wire::write_u64(buf, self.remote_slots);
        })
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(payload);
        let local_slots = wire::read_u64(&mut cur)?;
        let remote_slots = wire::read_u64(&mut cur)?;
        Ok(Self {
            local_slots,
            remote_slots,
        })
    }
}

/// Role tag sent as the first frame after the magic/version handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Job,
    Worker,
}

pub const ROLE_JOB: &[u8] = b"job";
pub const ROLE_WORKER: &[u8] = b"worker";

impl Role {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Role::Job => ROLE_JOB,
            Role::Worker => ROLE_WORKER,
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        match bytes {
            ROLE_JOB => Ok(Role::Job),
            ROLE_WORKER => Ok(Role::Worker),
            other => Err(ProtocolError::UnknownRole(other.to_vec())),
        }
    }
}

/// Commands a job connection may send to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobCommand {
    JobWorkers,
    RequestWorker,
    Karma,
}

pub const CMD_JOB_WORKERS: &[u8] = b"job_workers";
pub const CMD_REQUEST_WORKER: &[u8] = b"request_worker";
pub const CMD_KARMA: &[u8] = b"karma";

impl JobCommand {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            JobCommand::JobWorkers => CMD_JOB_WORKERS,
            JobCommand::RequestWorker => CMD_REQUEST_WORKER,
            JobCommand::Karma => CMD_KARMA,
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        match bytes {
            CMD_JOB_WORKERS => Ok(JobCommand::JobWorkers),
            CMD_REQUEST_WORKER => Ok(JobCommand::RequestWorker),
            CMD_KARMA => Ok(JobCommand::Karma),
            other => Err(ProtocolError::UnknownCommand(other.to_vec())),
        }
    }
}

/// Sentinel frame a client sends the server in place of a successful module
/// result, so the server can re-queue the job for another dispatch attempt.
pub const FAILED_MARKER: &[u8] = b"failed";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_splits_on_first_pipe() {
        let k = Key::new("ccerb", b"gcc 8.2.1 x86_64-pc-linux-gnu");
        let (module, subkey) = k.split().unwrap();
        assert_eq!(module, "ccerb");
        assert_eq!(subkey, b"gcc 8.2.1 x86_64-pc-linux-gnu");
    }

    #[test]
    fn key_without_pipe_is_malformed() {
        let k = Key(b"nodash".to_vec());
        assert!(k.split().is_err());
    }

    #[test]
    fn worker_descriptor_roundtrip() {
        let desc = WorkerDescriptor {
            hostname: "build-01".into(),
            keys: vec![Key::new("ccerb", b"gcc 8.2.1")],
            addrs: vec![Address::new("10.0.0.5", 8373), Address::new("fe80::1", 8373)],
            max_slots: 8,
        };
        let encoded = desc.encode();
        let decoded = WorkerDescriptor::decode(&encoded).unwrap();
        assert_eq!(desc, decoded);
    }

    #[test]
    fn worker_assignment_roundtrip() {
        let wa = WorkerAssignment {
            hostname: "build-01".into(),
            addrs: vec![Address::new("10.0.0.5", 8373)],
        };
        let encoded = wa.encode();
        assert_eq!(WorkerAssignment::decode(&encoded).unwrap(), wa);
    }

    #[test]
    fn job_workers_info_roundtrip() {
        let info = JobWorkersInfo {
            local_slots: 4,
            remote_slots: 12,
        };
        assert_eq!(JobWorkersInfo::decode(&info.encode()).unwrap(), info);
    }

    #[test]
    fn role_roundtrip() {
        assert_eq!(Role::parse(Role::Job.as_bytes()).unwrap(), Role::Job);
        assert_eq!(Role::parse(Role::Worker.as_bytes()).unwrap(), Role::Worker);
        assert!(Role::parse(b"bogus").is_err());
    }

    #[test]
    fn command_roundtrip() {
        assert_eq!(
            JobCommand::parse(JobCommand::RequestWorker.as_bytes()).unwrap(),
            JobCommand::RequestWorker
        );
        assert!(JobCommand::parse(b"bogus").is_err());
    }
}
