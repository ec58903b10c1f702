// Allow uppercase acronyms for industry-standard terms like HPA, DCO, LBA
#![allow(clippy::upper_case_acronyms)]

pub mod classify;
pub mod collab;
pub mod command;
pub mod error;
pub mod exec;
pub mod facts;
pub mod hidden;
pub mod orchestrator;
pub mod progress;
pub mod safety;

// Re-export the main entry points for convenience
pub use error::{OpResult, WipeError};
pub use orchestrator::{WipeHandle, WipeOrchestrator};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Global flag for handling Ctrl+C interrupts
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Set the interrupt flag (called by signal handler)
pub fn set_interrupted() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Check if an interrupt has been received
pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Reset the interrupt flag (primarily for testing)
pub fn reset_interrupted() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// Cooperative per-operation cancellation token.
///
/// Checked between sub-steps, between retry attempts and between privileged
/// commands; never mid-command, so a cancelled operation stops at the next
/// safe boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True when this token was cancelled or a global interrupt is pending.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst) || is_interrupted()
    }
}

/// Hardware interface a block device is attached through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskInterface {
    SATA,
    NVMe,
    USB,
    SCSI,
    IDE,
    Unknown,
}

/// Broad media category, independent of the attachment interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    HDD,
    SSD,
    NVMe,
    Removable,
    Unknown,
}

/// One partition of a device together with its current mount state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub device: String,
    pub mountpoint: Option<String>,
    pub fstype: Option<String>,
}

/// Immutable description of one block device as reported by the facts
/// collector. The core never mutates these records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskDevice {
    pub path: String,
    pub size_bytes: u64,
    pub interface: DiskInterface,
    pub media: MediaKind,
    pub model: String,
    pub serial: String,
    pub removable: bool,
    pub partitions: Vec<PartitionInfo>,
}

impl DiskDevice {
    /// Minimal record for a device path nothing else is known about.
    /// Used when a requested device does not appear in the collector output.
    pub fn unknown(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size_bytes: 0,
            interface: DiskInterface::Unknown,
            media: MediaKind::Unknown,
            model: "Unknown".to_string(),
            serial: String::new(),
            removable: false,
            partitions: Vec::new(),
        }
    }

    /// Iterate over the mountpoints of all mounted partitions
    pub fn mountpoints(&self) -> impl Iterator<Item = &str> {
        self.partitions
            .iter()
            .filter_map(|p| p.mountpoint.as_deref())
    }

    /// True when the device or any of its partitions is mounted
    pub fn is_mounted(&self) -> bool {
        self.mountpoints().next().is_some()
    }
}

impl fmt::Display for DiskDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} GB) - {}",
            self.path,
            self.size_bytes / (1024 * 1024 * 1024),
            self.model
        )
    }
}

/// Inferred purpose of a disk in the running system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskRole {
    SystemBoot,
    SystemData,
    ExternalStorage,
    RemovableMedia,
    NetworkStorage,
    OpticalMedia,
    VirtualDisk,
    Unknown,
}

/// Blast-radius assessment for wiping a disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyLevel {
    Critical,
    Dangerous,
    WarningRequired,
    SafeToWipe,
    Unknown,
}

/// Wipe capability families the executor can dispatch to.
///
/// A request carries a free-form method tag; tags map onto one of these
/// families, and unrecognized tags draw a gate warning rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WipeMethod {
    Overwrite,
    SecureErase,
    TrimDiscard,
    Format,
}

impl WipeMethod {
    /// Map a user-facing method tag onto an executor capability.
    /// Tags mirror the platform tools they historically named.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "secure" | "dd" | "random" | "zero" | "quick" | "overwrite" => Some(Self::Overwrite),
            "hdparm" | "secure-erase" | "ata-secure-erase" => Some(Self::SecureErase),
            "trim" | "blkdiscard" | "discard" => Some(Self::TrimDiscard),
            "nvme" | "format" => Some(Self::Format),
            _ => None,
        }
    }
}

/// A single wipe request. Constructed per call and never mutated afterwards;
/// the core does not persist requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WipeRequest {
    pub device: String,
    pub method: String,
    pub passes: u32,
    pub verify: bool,
    pub remove_hpa: bool,
    pub remove_dco: bool,
    pub force: bool,
}

impl WipeRequest {
    pub fn new(device: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            method: method.into(),
            passes: 1,
            verify: false,
            remove_hpa: false,
            remove_dco: false,
            force: false,
        }
    }
}

/// States of the wipe state machine. Terminal states are `Completed`,
/// `Rejected` and `Failed`; every result names the state it reached so a
/// caller can tell "rejected before any write" from "failed mid-execution".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WipeState {
    Requested,
    GateCheck,
    AccessProbe,
    Validated,
    HiddenAreaRemoval,
    Executing,
    Verifying,
    Certifying,
    Completed,
    Rejected,
    Failed,
}

impl fmt::Display for WipeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WipeState::Requested => "Requested",
            WipeState::GateCheck => "GateCheck",
            WipeState::AccessProbe => "AccessProbe",
            WipeState::Validated => "Validated",
            WipeState::HiddenAreaRemoval => "HiddenAreaRemoval",
            WipeState::Executing => "Executing",
            WipeState::Verifying => "Verifying",
            WipeState::Certifying => "Certifying",
            WipeState::Completed => "Completed",
            WipeState::Rejected => "Rejected",
            WipeState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one wipe request: success flag, the ordered human-readable
/// trail of sub-step outcomes, the final error kind if the request did not
/// complete, and the state the machine reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WipeResult {
    pub operation_id: uuid::Uuid,
    pub device: String,
    pub success: bool,
    pub trail: Vec<String>,
    pub error: Option<WipeError>,
    pub attempts: u32,
    pub reached: WipeState,
}

impl WipeResult {
    pub fn rejected(&self) -> bool {
        self.reached == WipeState::Rejected
    }
}

#[cfg(test)]
mod lib_tests;
