/// Error classification for retry strategy selection
///
/// Only transient conditions (device busy, tool timeout) are retried; a
/// failed authentication or a missing device fails immediately.
use super::WipeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// May resolve on retry: device busy, temporary timeout
    Transient,

    /// Retrying cannot help: safety/permission/validation failures,
    /// missing devices, bad configuration
    Fatal,
}

impl ErrorClass {
    pub fn allows_retry(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

/// Classify an error for the bounded retry policy.
///
/// `Safety`, `Configuration`, `Permission` and `Validation` are always
/// fatal. `DiskAccess` and `Operation` are transient only when the message
/// indicates a busy device or a timed-out tool.
pub fn classify(error: &WipeError) -> ErrorClass {
    match error {
        WipeError::Safety(_)
        | WipeError::Configuration(_)
        | WipeError::Permission(_)
        | WipeError::Validation(_) => ErrorClass::Fatal,
        WipeError::DiskAccess(msg) | WipeError::Operation(msg) => {
            if is_transient_message(msg) {
                ErrorClass::Transient
            } else {
                ErrorClass::Fatal
            }
        }
    }
}

fn is_transient_message(msg: &str) -> bool {
    let msg = msg.to_ascii_lowercase();
    const TRANSIENT_MARKERS: &[&str] = &[
        "busy",
        "timed out",
        "timeout",
        "temporarily unavailable",
        "try again",
    ];
    TRANSIENT_MARKERS.iter().any(|m| msg.contains(m))
}
