/// Privileged command channel
///
/// Every privileged tool invocation (hdparm, smartctl, blockdev, dd, nvme,
/// blkdiscard) goes through [`PrivilegedRunner`]. The core holds no
/// credentials and performs no escalation of its own; a session/context
/// value implementing this trait is constructed once per process and passed
/// by reference wherever commands are issued. Authentication failures map
/// to the distinct `Permission` error kind so callers can re-run with
/// credentials instead of retrying blindly.
use crate::error::{OpResult, WipeError};
use std::process::Command;

/// Captured output of one privileged command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Heuristic over stderr for escalation/authentication failures.
    /// Matches the phrasings of sudo, polkit and the ATA tools themselves.
    pub fn looks_like_auth_failure(&self) -> bool {
        let stderr = self.stderr.to_ascii_lowercase();
        const AUTH_MARKERS: &[&str] = &[
            "permission denied",
            "authentication",
            "must be root",
            "operation not permitted",
            "access denied",
            "not authorized",
        ];
        AUTH_MARKERS.iter().any(|m| stderr.contains(m))
    }

    /// Map a non-zero exit to the appropriate error kind for `context`.
    pub fn into_error(self, context: &str) -> WipeError {
        let detail = if self.stderr.trim().is_empty() {
            format!("{context}: exited with status {}", self.status)
        } else {
            format!("{context}: {}", self.stderr.trim())
        };
        if self.looks_like_auth_failure() {
            WipeError::Permission(detail)
        } else {
            WipeError::Operation(detail)
        }
    }
}

/// The privileged command channel. `argv[0]` is the program.
pub trait PrivilegedRunner: Send + Sync {
    fn run(&self, argv: &[&str]) -> OpResult<CommandOutput>;
}

/// Production runner executing commands directly via the OS.
///
/// The process is expected to already run with sufficient privileges; the
/// escalation session (sudo, UAC) is the launcher's concern.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl PrivilegedRunner for SystemRunner {
    fn run(&self, argv: &[&str]) -> OpResult<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| WipeError::Validation("empty command line".to_string()))?;

        tracing::debug!(command = ?argv, "running privileged command");

        let output = Command::new(program).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WipeError::Operation(format!("{program} not available: {e}"))
            } else {
                WipeError::from(e)
            }
        })?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
