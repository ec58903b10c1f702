// Disk classification
//
// Infers a device's role and blast-radius risk from the facts collector
// output plus system topology. Classification is pure with respect to its
// inputs: the same device record, topology facts and access probe always
// produce the same verdict. Results are computed fresh per query and never
// cached across the device's mutable state.

use crate::facts::{is_system_mountpoint, TopologyFacts};
use crate::{DiskDevice, DiskInterface, DiskRole, SafetyLevel};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Result of classifying one disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskClassification {
    pub device: String,
    pub role: DiskRole,
    pub safety: SafetyLevel,
    /// 0 = not bootable, 1 = primary boot, 2+ = secondary
    pub boot_priority: u8,
    /// How much to trust this verdict, in [0.0, 1.0]. Says nothing about
    /// the verdict itself.
    pub confidence: f64,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    pub is_system_disk: bool,
    pub is_boot_disk: bool,
    pub is_mounted: bool,
    pub is_writable: bool,
    pub is_removable: bool,
    pub is_external: bool,
}

impl DiskClassification {
    /// Verdict for a device whose probes failed outright. Role and safety
    /// collapse to Unknown with zero confidence; never to SafeToWipe.
    pub fn unavailable(device: impl Into<String>, reason: &str) -> Self {
        Self {
            device: device.into(),
            role: DiskRole::Unknown,
            safety: SafetyLevel::Unknown,
            boot_priority: 0,
            confidence: 0.0,
            warnings: vec![format!("Analysis error: {reason}")],
            recommendations: Vec::new(),
            is_system_disk: false,
            is_boot_disk: false,
            is_mounted: false,
            is_writable: false,
            is_removable: false,
            is_external: false,
        }
    }
}

/// Outcome of the non-destructive access probe on a device node
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceAccess {
    pub exists: bool,
    pub readable: bool,
}

impl DeviceAccess {
    /// Probe a device node: existence plus a one-byte read
    pub fn probe(path: &str) -> Self {
        let exists = Path::new(path).exists();
        let readable = exists
            && File::open(path)
                .and_then(|mut f| {
                    let mut byte = [0u8; 1];
                    f.read(&mut byte)
                })
                .is_ok();
        Self { exists, readable }
    }
}

pub struct DiskClassifier;

impl DiskClassifier {
    /// Classify a disk, probing its device node for access
    pub fn classify(device: &DiskDevice, facts: &TopologyFacts) -> DiskClassification {
        let access = DeviceAccess::probe(&device.path);
        Self::classify_with_access(device, facts, access)
    }

    /// Classification body, deterministic in its inputs
    pub fn classify_with_access(
        device: &DiskDevice,
        facts: &TopologyFacts,
        access: DeviceAccess,
    ) -> DiskClassification {
        let is_mounted = device.is_mounted();
        let is_removable = device.removable;
        let is_external = device.interface == DiskInterface::USB;

        let is_system_disk = Self::is_system_disk(device, facts);
        let is_boot_disk = Self::is_boot_disk(device, facts);

        if is_removable && is_system_disk {
            tracing::warn!(
                device = %device.path,
                "removable device carries system mountpoints; treating as system disk"
            );
        }

        let role = Self::determine_role(device, is_system_disk, is_boot_disk);
        let boot_priority = Self::boot_priority(device, facts, is_boot_disk);
        let safety = Self::safety_level(role, is_system_disk, is_boot_disk, boot_priority);
        let is_writable =
            !is_system_disk && !is_mounted && (access.readable || access.exists);

        let mut classification = DiskClassification {
            device: device.path.clone(),
            role,
            safety,
            boot_priority,
            confidence: 0.0,
            warnings: Vec::new(),
            recommendations: Vec::new(),
            is_system_disk,
            is_boot_disk,
            is_mounted,
            is_writable,
            is_removable,
            is_external,
        };
        classification.warnings = Self::warnings(&classification, access);
        classification.recommendations = Self::recommendations(&classification, device);
        classification.confidence = Self::confidence(&classification, device, facts, access);
        classification
    }

    fn is_system_disk(device: &DiskDevice, facts: &TopologyFacts) -> bool {
        device.mountpoints().any(is_system_mountpoint)
            || facts.root_device.as_deref() == Some(device.path.as_str())
    }

    fn is_boot_disk(device: &DiskDevice, facts: &TopologyFacts) -> bool {
        device
            .mountpoints()
            .any(|mp| mp == "/boot" || mp == "/boot/efi")
            || facts.boot_device.as_deref() == Some(device.path.as_str())
    }

    /// Fixed priority order; the first matching role wins
    fn determine_role(device: &DiskDevice, is_system: bool, is_boot: bool) -> DiskRole {
        if is_system && is_boot {
            return DiskRole::SystemBoot;
        }
        if is_system {
            return DiskRole::SystemData;
        }

        if device.removable || device.interface == DiskInterface::USB {
            let media_mounted = device.mountpoints().any(|mp| mp.starts_with("/media/"));
            return if media_mounted {
                DiskRole::RemovableMedia
            } else {
                DiskRole::ExternalStorage
            };
        }

        let network_fs = device.partitions.iter().any(|p| {
            p.fstype
                .as_deref()
                .map(|fs| fs.contains("nfs") || fs.contains("cifs") || fs.contains("smb"))
                .unwrap_or(false)
        });
        if network_fs {
            return DiskRole::NetworkStorage;
        }

        let name = device.path.to_ascii_lowercase();
        if name.contains("cdrom") || name.contains("dvd") || name.contains("/sr") {
            return DiskRole::OpticalMedia;
        }
        if name.starts_with("/dev/loop")
            || name.starts_with("/dev/dm-")
            || name.contains("/mapper/")
        {
            return DiskRole::VirtualDisk;
        }

        DiskRole::Unknown
    }

    fn boot_priority(device: &DiskDevice, facts: &TopologyFacts, is_boot: bool) -> u8 {
        if !is_boot {
            0
        } else if facts.boot_device.as_deref() == Some(device.path.as_str()) {
            1
        } else {
            2
        }
    }

    fn safety_level(
        role: DiskRole,
        is_system: bool,
        is_boot: bool,
        boot_priority: u8,
    ) -> SafetyLevel {
        if is_boot && boot_priority == 1 {
            return SafetyLevel::Critical;
        }
        if is_system {
            return SafetyLevel::Dangerous;
        }
        match role {
            DiskRole::SystemData | DiskRole::ExternalStorage => SafetyLevel::WarningRequired,
            DiskRole::RemovableMedia => SafetyLevel::SafeToWipe,
            _ => SafetyLevel::Unknown,
        }
    }

    fn warnings(c: &DiskClassification, access: DeviceAccess) -> Vec<String> {
        let mut warnings = Vec::new();

        match c.safety {
            SafetyLevel::Critical => {
                warnings.push("CRITICAL: This is the primary boot disk!".to_string());
                warnings
                    .push("Wiping this disk will make the system unbootable!".to_string());
            }
            SafetyLevel::Dangerous => {
                warnings.push("DANGEROUS: This is a system disk!".to_string());
                warnings
                    .push("Wiping this disk may damage the operating system!".to_string());
            }
            SafetyLevel::WarningRequired => {
                warnings.push("WARNING: This disk may contain important data!".to_string());
                warnings.push("Ensure you have backups before proceeding!".to_string());
            }
            _ => {}
        }

        if c.is_mounted {
            warnings.push("Disk is currently mounted - unmount before wiping!".to_string());
        }
        if !access.readable {
            warnings
                .push("Cannot read disk - may require elevated permissions!".to_string());
        }
        if c.is_external {
            warnings
                .push("USB device detected - ensure it's not the boot device!".to_string());
        }

        warnings
    }

    fn recommendations(c: &DiskClassification, device: &DiskDevice) -> Vec<String> {
        let mut recs = Vec::new();

        match c.safety {
            SafetyLevel::SafeToWipe => {
                recs.push("This disk appears safe to wipe".to_string());
                recs.push("Consider the 'quick' method for faster wiping".to_string());
            }
            SafetyLevel::WarningRequired => {
                recs.push("Verify this is the correct disk before wiping".to_string());
                recs.push("Consider the 'secure' method for sensitive data".to_string());
            }
            _ => {}
        }

        if c.is_mounted {
            recs.push("Unmount all partitions before wiping".to_string());
        }

        match device.interface {
            DiskInterface::NVMe => {
                recs.push("NVMe detected - the 'format' method uses the controller's secure erase".to_string());
            }
            DiskInterface::USB => {
                recs.push("USB device - the 'dd' method is the most reliable".to_string());
            }
            _ => {}
        }

        if c.is_removable {
            recs.push(
                "Removable device - ensure it's not needed for system operation".to_string(),
            );
        }

        recs
    }

    /// Additive score over six independent signal-availability checks,
    /// capped at 1.0
    fn confidence(
        c: &DiskClassification,
        device: &DiskDevice,
        facts: &TopologyFacts,
        access: DeviceAccess,
    ) -> f64 {
        let mut score: f64 = 0.0;
        if access.readable {
            score += 0.3;
        }
        if c.role != DiskRole::Unknown {
            score += 0.2;
        }
        if device.interface != DiskInterface::Unknown {
            score += 0.1;
        }
        if c.safety != SafetyLevel::Unknown {
            score += 0.2;
        }
        if facts.root_device.is_some() {
            score += 0.1;
        }
        if facts.efi_present.is_some() {
            score += 0.1;
        }
        score.min(1.0)
    }
}
