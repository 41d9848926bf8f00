//! Smoke-test probes against running instances.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// Output of a successful probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutput {
    /// Client stdout, lossily decoded
    pub stdout: String,
}

/// Why a probe failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The client process could not be spawned
    #[error("failed to spawn {client}: {reason}")]
    Spawn {
        /// Client executable
        client: String,
        /// OS error text
        reason: String,
    },

    /// The client wrote to stderr
    #[error("client reported an error: {0}")]
    Stderr(String),

    /// The client exited unsuccessfully without writing to stderr
    #[error("client exited with {0}")]
    ExitStatus(String),

    /// The probe did not finish in time
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    /// The probe task panicked or was cancelled
    #[error("probe task aborted: {0}")]
    Aborted(String),
}

/// Checks that a server answers on `host:port`.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    /// Probe one endpoint.
    ///
    /// # Errors
    ///
    /// Any [`ProbeError`]; the orchestrator adds [`ProbeError::Timeout`] and
    /// [`ProbeError::Aborted`] on top of what the probe reports.
    async fn probe(&self, host: &str, port: u16) -> Result<ProbeOutput, ProbeError>;
}

/// Runs an external STUN client as `<client> <host> <port>`.
///
/// Any stderr output is a failure, regardless of exit status. The child is
/// killed if the probe future is dropped, so a timed-out probe leaves no
/// process behind.
#[derive(Debug, Clone)]
pub struct ClientProbe {
    program: PathBuf,
}

impl ClientProbe {
    /// Probe with the given client executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    /// Client executable.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl Probe for ClientProbe {
    async fn probe(&self, host: &str, port: u16) -> Result<ProbeOutput, ProbeError> {
        let output = Command::new(&self.program)
            .arg(host)
            .arg(port.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProbeError::Spawn {
                client: self.program.display().to_string(),
                reason: e.to_string(),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            return Err(ProbeError::Stderr(stderr.trim_end().to_string()));
        }
        if !output.status.success() {
            return Err(ProbeError::ExitStatus(output.status.to_string()));
        }

        Ok(ProbeOutput { stdout: String::from_utf8_lossy(&output.stdout).into_owned() })
    }
}
