/// Error handling for the erasure core
///
/// The taxonomy separates errors by how they may be handled:
///
/// - `Safety` and `Configuration` propagate immediately and are never
///   retried or masked
/// - `DiskAccess` and `Operation` may be retried under the bounded policy
///   in [`retry`], after which they surface with the full attempt trail
/// - `Permission` is surfaced distinctly so a caller can re-run with
///   credentials; the core itself never retries it
/// - `Validation` means the caller must fix its input
pub mod classification;
pub mod retry;

pub use classification::{classify, ErrorClass};
pub use retry::RetryPolicy;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WipeError {
    /// Protected device, unmet destructive-operation precondition.
    /// Never recoverable within the same call.
    #[error("safety violation: {0}")]
    Safety(String),

    /// Privilege escalation or authentication failed. Recoverable by the
    /// caller retrying with credentials.
    #[error("insufficient privileges: {0}")]
    Permission(String),

    /// Device not found, busy or detached. Sometimes recoverable via retry.
    #[error("disk access error: {0}")]
    DiskAccess(String),

    /// Bad request parameters. The caller must fix its input.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A platform tool or command failed during execution.
    #[error("operation failed: {0}")]
    Operation(String),

    /// Malformed safety configuration. Fatal at load time.
    #[error("bad safety configuration: {0}")]
    Configuration(String),
}

impl WipeError {
    /// Short name of the error kind, used in result trails
    pub fn kind(&self) -> &'static str {
        match self {
            WipeError::Safety(_) => "Safety",
            WipeError::Permission(_) => "Permission",
            WipeError::DiskAccess(_) => "DiskAccess",
            WipeError::Validation(_) => "Validation",
            WipeError::Operation(_) => "Operation",
            WipeError::Configuration(_) => "Configuration",
        }
    }

    /// Suggestions a front end can show next to the failure
    pub fn suggestions(&self) -> Vec<&'static str> {
        match self {
            WipeError::Permission(_) => vec![
                "Run with root/administrator privileges",
                "Check that the user has access to the device",
            ],
            WipeError::DiskAccess(_) => vec![
                "Verify the device path is correct",
                "Check that the device is connected and recognized",
                "Unmount the device if it is mounted",
            ],
            WipeError::Safety(_) => vec![
                "Review the safety configuration",
                "Verify the device is not a system disk",
            ],
            WipeError::Validation(_) => vec!["Check the request parameters"],
            WipeError::Operation(_) => {
                vec!["Retry the operation", "Check the device status"]
            }
            WipeError::Configuration(_) => {
                vec!["Fix the safety configuration document and reload"]
            }
        }
    }
}

impl From<std::io::Error> for WipeError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::PermissionDenied => WipeError::Permission(err.to_string()),
            ErrorKind::NotFound => WipeError::DiskAccess(format!("not found: {err}")),
            _ => WipeError::DiskAccess(err.to_string()),
        }
    }
}

pub type OpResult<T> = Result<T, WipeError>;
