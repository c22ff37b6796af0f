//! `cc`: the compiler-cache module. The client side ships a preprocessed
//! translation unit plus the compiler invocation; the worker side drives a
//! real compiler over it and ships back the resulting object bytes.
//!
//! The compiler-argument parsing and preprocessing step itself is out of
//! scope (see spec Non-goals) — this module treats that as an already-done
//! step and only carries the invocation + preprocessed source across the
//! wire. What actually runs the compiler is pluggable behind
//! [`CompilerDriver`] so tests can swap in a fake.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use ccmesh_net::PacketConn;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{ModuleError, Result};
use crate::Module;

/// One compile request as it travels over the wire: the argv the client
/// would have invoked locally, and the preprocessed translation unit.
pub struct CompileRequest {
    pub argv: Vec<String>,
    pub source: Vec<u8>,
}

impl CompileRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ccmesh_protocol::wire::write_u16(&mut buf, self.argv.len() as u16);
        for arg in &self.argv {
            ccmesh_protocol::wire::write_bytes(&mut buf, arg.as_bytes());
        }
        ccmesh_protocol::wire::write_bytes(&mut buf, &self.source);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut cur = std::io::Cursor::new(buf);
        let argc = ccmesh_protocol::wire::read_u16(&mut cur)
            .map_err(|e| ModuleError::Malformed(e.to_string()))?;
        let mut argv = Vec::with_capacity(argc as usize);
        for _ in 0..argc {
            let arg = ccmesh_protocol::wire::read_bytes(&mut cur)
                .map_err(|e| ModuleError::Malformed(e.to_string()))?;
            argv.push(String::from_utf8_lossy(&arg).into_owned());
        }
        let source = ccmesh_protocol::wire::read_bytes(&mut cur)
            .map_err(|e| ModuleError::Malformed(e.to_string()))?;
        Ok(Self { argv, source })
    }
}

/// Result of a compile attempt, sent back from worker to client.
pub struct CompileResult {
    pub exit_code: i32,
    pub stderr: Vec<u8>,
    pub object: Vec<u8>,
}

impl CompileResult {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ccmesh_protocol::wire::write_u64(&mut buf, self.exit_code as u64);
        ccmesh_protocol::wire::write_bytes(&mut buf, &self.stderr);
        ccmesh_protocol::wire::write_bytes(&mut buf, &self.object);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut cur = std::io::Cursor::new(buf);
        let exit_code = ccmesh_protocol::wire::read_u64(&mut cur)
            .map_err(|e| ModuleError::Malformed(e.to_string()))? as i32;
        let stderr = ccmesh_protocol::wire::read_bytes(&mut cur)
            .map_err(|e| ModuleError::Malformed(e.to_string()))?;
        let object = ccmesh_protocol::wire::read_bytes(&mut cur)
            .map_err(|e| ModuleError::Malformed(e.to_string()))?;
        Ok(Self {
            exit_code,
            stderr,
            object,
        })
    }
}

/// The part that actually runs a compiler. Injected so the module logic
/// stays testable without shelling out.
#[async_trait]
pub trait CompilerDriver: Send + Sync {
    async fn compile(&self, req: &CompileRequest) -> Result<CompileResult>;
}

/// Shells out to the compiler named by `argv[0]` (typically `cc`/`clang`/`gcc`
/// resolved from `$PATH` via `which`), writing the preprocessed source to a
/// scratch file and reading the object back from another.
pub struct LocalCompilerDriver;

#[async_trait]
impl CompilerDriver for LocalCompilerDriver {
    async fn compile(&self, req: &CompileRequest) -> Result<CompileResult> {
        let compiler = req
            .argv
            .first()
            .ok_or_else(|| ModuleError::Malformed("empty compile argv".into()))?;
        let resolved = which::which(compiler)
            .map_err(|e| ModuleError::Driver(format!("{compiler} not found on PATH: {e}")))?;

        let scratch = TempDir::new().map_err(ModuleError::Io)?;
        let src_path = scratch_file(&scratch, "in.i");
        let obj_path = scratch_file(&scratch, "out.o");

        let mut src_file = tokio::fs::File::create(&src_path).await?;
        src_file.write_all(&req.source).await?;
        src_file.flush().await?;

        let mut cmd = Command::new(resolved);
        cmd.args(&req.argv[1..])
            .arg("-o")
            .arg(&obj_path)
            .arg(&src_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        debug!(?req.argv, "invoking compiler driver");
        let output = cmd.output().await?;
        let object = tokio::fs::read(&obj_path).await.unwrap_or_default();

        Ok(CompileResult {
            exit_code: output.status.code().unwrap_or(-1),
            stderr: output.stderr,
            object,
        })
    }
}

fn scratch_file(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

pub struct CcModule {
    driver: Box<dyn CompilerDriver>,
}

impl CcModule {
    pub fn new(driver: Box<dyn CompilerDriver>) -> Self {
        Self { driver }
    }

    pub fn local() -> Self {
        Self::new(Box::new(LocalCompilerDriver))
    }
}

#[async_trait]
impl Module for CcModule {
    fn name(&self) -> &str {
        "cc"
    }

    async fn job_client(&self, conn: &PacketConn, subkey: &[u8], args: &[u8]) -> Result<Vec<u8>> {
        let req = CompileRequest::decode(args)?;
        debug!(subkey = %String::from_utf8_lossy(subkey), "dispatching compile");
        conn.send(&req.encode()).await?;
        let reply = conn.recv().await?;
        let result = CompileResult::decode(&reply)?;
        if result.exit_code != 0 {
            warn!(exit_code = result.exit_code, "remote compile failed");
        }
        Ok(result.encode())
    }

    async fn job_worker(&self, conn: &PacketConn, _subkey: &[u8]) -> Result<()> {
        let payload = conn.recv().await?;
        let req = CompileRequest::decode(&payload)?;
        let result = self.driver.compile(&req).await?;
        conn.send(&result.encode()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeDriver {
        exit_code: i32,
    }

    #[async_trait]
    impl CompilerDriver for FakeDriver {
        async fn compile(&self, req: &CompileRequest) -> Result<CompileResult> {
            Ok(CompileResult {
                exit_code: self.exit_code,
                stderr: Vec::new(),
                object: req.source.clone(),
            })
        }
    }

    #[test]
    fn compile_request_roundtrip() {
        let req = CompileRequest {
            argv: vec!["cc".into(), "-c".into()],
            source: b"int main() {}".to_vec(),
        };
        let encoded = req.encode();
        let decoded = CompileRequest::decode(&encoded).unwrap();
        assert_eq!(decoded.argv, req.argv);
        assert_eq!(decoded.source, req.source);
    }

    #[test]
    fn compile_result_roundtrip() {
        let result = CompileResult {
            exit_code: 1,
            stderr: b"error".to_vec(),
            object: b"\x7fELF".to_vec(),
        };
        let encoded = result.encode();
        let decoded = CompileResult::decode(&encoded).unwrap();
        assert_eq!(decoded.exit_code, result.exit_code);
        assert_eq!(decoded.stderr, result.stderr);
        assert_eq!(decoded.object, result.object);
    }

    #[tokio::test]
    async fn fake_driver_roundtrips_source_as_object() {
        let driver = FakeDriver { exit_code: 0 };
        let req = CompileRequest {
            argv: vec!["cc".into()],
            source: b"hello".to_vec(),
        };
        let result = driver.compile(&req).await.unwrap();
        assert_eq!(result.object, b"hello".to_vec());
        assert_eq!(result.exit_code, 0);
    }
}
