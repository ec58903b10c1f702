// Device facts collection
//
// Enumerates block devices with their partitions, mountpoints and
// filesystem types, and gathers the system topology (root/boot device, EFI
// presence) the classifier needs. Everything above this module treats the
// returned records as immutable input.

use crate::error::OpResult;
use crate::{DiskDevice, DiskInterface, MediaKind, PartitionInfo};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// One row of the system mount table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountEntry {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
}

/// System topology facts. `efi_present` is `None` when the firmware
/// context could not be probed, which lowers classifier confidence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyFacts {
    pub root_device: Option<String>,
    pub boot_device: Option<String>,
    pub efi_present: Option<bool>,
}

/// Source of device and topology facts
pub trait FactsProvider: Send + Sync {
    fn list_devices(&self) -> OpResult<Vec<DiskDevice>>;
    fn mount_table(&self) -> OpResult<Vec<MountEntry>>;
    fn topology_facts(&self) -> OpResult<TopologyFacts>;
}

/// Linux facts collector reading sysfs and procfs directly
pub struct SysfsFacts {
    sys_block: PathBuf,
    proc_mounts: PathBuf,
    proc_cmdline: PathBuf,
    efi_dir: PathBuf,
    dev_dir: PathBuf,
}

impl Default for SysfsFacts {
    fn default() -> Self {
        Self::new()
    }
}

impl SysfsFacts {
    pub fn new() -> Self {
        Self {
            sys_block: PathBuf::from("/sys/block"),
            proc_mounts: PathBuf::from("/proc/mounts"),
            proc_cmdline: PathBuf::from("/proc/cmdline"),
            efi_dir: PathBuf::from("/sys/firmware/efi"),
            dev_dir: PathBuf::from("/dev"),
        }
    }

    /// Collector rooted at alternative paths, for tests against a fake
    /// sysfs/procfs tree
    pub fn with_roots(
        sys_block: impl Into<PathBuf>,
        proc_mounts: impl Into<PathBuf>,
        proc_cmdline: impl Into<PathBuf>,
        efi_dir: impl Into<PathBuf>,
        dev_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sys_block: sys_block.into(),
            proc_mounts: proc_mounts.into(),
            proc_cmdline: proc_cmdline.into(),
            efi_dir: efi_dir.into(),
            dev_dir: dev_dir.into(),
        }
    }

    /// Non-physical devices that are never wipe candidates
    fn should_skip_device(device_name: &str) -> bool {
        device_name.starts_with("loop")
            || device_name.starts_with("ram")
            || device_name.starts_with("dm-")
            || device_name.starts_with("zram")
    }

    fn read_sysfs_string(&self, device_name: &str, file: &str) -> Option<String> {
        let path = self.sys_block.join(device_name).join(file);
        fs::read_to_string(path)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn device_size_bytes(&self, device_name: &str) -> u64 {
        // sysfs size is in 512-byte units regardless of the logical sector size
        self.read_sysfs_string(device_name, "size")
            .and_then(|s| s.parse::<u64>().ok())
            .map(|sectors| sectors * 512)
            .unwrap_or(0)
    }

    fn is_removable(&self, device_name: &str) -> bool {
        self.read_sysfs_string(device_name, "removable")
            .map(|s| s == "1")
            .unwrap_or(false)
    }

    fn is_rotational(&self, device_name: &str) -> Option<bool> {
        self.read_sysfs_string(device_name, "queue/rotational")
            .map(|s| s == "1")
    }

    fn is_usb_attached(&self, device_name: &str) -> bool {
        let link = self.sys_block.join(device_name).join("device");
        match fs::read_link(&link).or_else(|_| link.canonicalize()) {
            Ok(real) => real.to_string_lossy().to_ascii_lowercase().contains("usb"),
            Err(_) => false,
        }
    }

    fn interface_for(&self, device_name: &str) -> DiskInterface {
        let name = device_name.to_ascii_lowercase();
        if name.starts_with("nvme") {
            DiskInterface::NVMe
        } else if self.is_usb_attached(device_name) {
            DiskInterface::USB
        } else if name.starts_with("sd") {
            DiskInterface::SATA
        } else if name.starts_with("hd") {
            DiskInterface::IDE
        } else if name.starts_with("sg") || name.starts_with("sr") {
            DiskInterface::SCSI
        } else {
            DiskInterface::Unknown
        }
    }

    fn media_for(&self, device_name: &str, removable: bool) -> MediaKind {
        if device_name.starts_with("nvme") {
            MediaKind::NVMe
        } else if removable {
            MediaKind::Removable
        } else {
            match self.is_rotational(device_name) {
                Some(true) => MediaKind::HDD,
                Some(false) => MediaKind::SSD,
                None => MediaKind::Unknown,
            }
        }
    }

    /// Partitions of a device, joined against the mount table
    fn partitions_for(&self, device_name: &str, mounts: &[MountEntry]) -> Vec<PartitionInfo> {
        let mut partitions = Vec::new();
        let device_dir = self.sys_block.join(device_name);
        let Ok(entries) = fs::read_dir(&device_dir) else {
            return partitions;
        };

        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(device_name) && n != device_name)
            .collect();
        names.sort();

        for name in names {
            let part_path = self.dev_dir.join(&name).to_string_lossy().into_owned();
            let mount = mounts.iter().find(|m| m.device == part_path);
            partitions.push(PartitionInfo {
                device: part_path,
                mountpoint: mount.map(|m| m.mountpoint.clone()),
                fstype: mount.map(|m| m.fstype.clone()),
            });
        }
        partitions
    }

    fn collect_device(&self, device_name: &str, mounts: &[MountEntry]) -> DiskDevice {
        let removable = self.is_removable(device_name);
        let path = self.dev_dir.join(device_name).to_string_lossy().into_owned();
        DiskDevice {
            path,
            size_bytes: self.device_size_bytes(device_name),
            interface: self.interface_for(device_name),
            media: self.media_for(device_name, removable),
            model: self
                .read_sysfs_string(device_name, "device/model")
                .unwrap_or_else(|| "Unknown".to_string()),
            serial: self
                .read_sysfs_string(device_name, "device/serial")
                .unwrap_or_default(),
            removable,
            partitions: self.partitions_for(device_name, mounts),
        }
    }
}

impl FactsProvider for SysfsFacts {
    fn list_devices(&self) -> OpResult<Vec<DiskDevice>> {
        let mounts = self.mount_table()?;
        let mut devices = Vec::new();

        let entries = fs::read_dir(&self.sys_block).map_err(|e| {
            crate::WipeError::DiskAccess(format!(
                "cannot read {}: {e}",
                self.sys_block.display()
            ))
        })?;

        for entry in entries.filter_map(|e| e.ok()) {
            let device_name = entry.file_name().to_string_lossy().into_owned();
            if Self::should_skip_device(&device_name) {
                continue;
            }
            let device = self.collect_device(&device_name, &mounts);
            if device.removable && device.mountpoints().any(is_system_mountpoint) {
                // Well-formed input never pairs a removable flag with a
                // system mountpoint; keep the record but flag it.
                tracing::warn!(
                    device = %device.path,
                    "removable device claims a system mountpoint; signals are contradictory"
                );
            }
            devices.push(device);
        }

        devices.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(devices)
    }

    fn mount_table(&self) -> OpResult<Vec<MountEntry>> {
        let raw = fs::read_to_string(&self.proc_mounts).map_err(|e| {
            crate::WipeError::DiskAccess(format!(
                "cannot read {}: {e}",
                self.proc_mounts.display()
            ))
        })?;
        Ok(parse_mount_table(&raw))
    }

    fn topology_facts(&self) -> OpResult<TopologyFacts> {
        let mounts = self.mount_table().unwrap_or_default();

        let root_device = mounts
            .iter()
            .find(|m| m.mountpoint == "/")
            .map(|m| parent_disk(&m.device));

        let boot_device = fs::read_to_string(&self.proc_cmdline)
            .ok()
            .and_then(|cmdline| parse_cmdline_root(&cmdline))
            .map(|dev| parent_disk(&dev))
            .or_else(|| root_device.clone());

        let efi_present = Some(self.efi_dir.exists());

        Ok(TopologyFacts {
            root_device,
            boot_device,
            efi_present,
        })
    }
}

/// Mountpoints whose presence marks a disk as carrying the running system
pub fn is_system_mountpoint(mountpoint: &str) -> bool {
    matches!(mountpoint, "/" | "/boot" | "/boot/efi" | "/usr" | "/var")
}

/// Parse /proc/mounts, keeping only device-backed entries. Pseudo
/// filesystems (proc, tmpfs, sysfs) report bare names, not paths.
pub(crate) fn parse_mount_table(raw: &str) -> Vec<MountEntry> {
    raw.lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let device = parts.next()?;
            let mountpoint = parts.next()?;
            let fstype = parts.next()?;
            if !device.starts_with('/') {
                return None;
            }
            Some(MountEntry {
                device: device.to_string(),
                // /proc/mounts octal-escapes spaces in mountpoints
                mountpoint: mountpoint.replace("\\040", " "),
                fstype: fstype.to_string(),
            })
        })
        .collect()
}

/// Extract the root= parameter from a kernel command line
pub(crate) fn parse_cmdline_root(cmdline: &str) -> Option<String> {
    cmdline
        .split_whitespace()
        .find_map(|tok| tok.strip_prefix("root="))
        .map(|s| s.to_string())
        .filter(|s| s.starts_with("/dev/"))
}

/// Reduce a partition path to its parent disk: /dev/sda2 -> /dev/sda,
/// /dev/nvme0n1p3 -> /dev/nvme0n1. Whole-disk paths pass through unchanged.
pub fn parent_disk(device: &str) -> String {
    let nvme = Regex::new(r"^(/dev/(?:nvme|mmcblk)\d+(?:n\d+)?)p\d+$").expect("static regex");
    if let Some(caps) = nvme.captures(device) {
        return caps[1].to_string();
    }
    let plain = Regex::new(r"^(/dev/[a-z]+)\d+$").expect("static regex");
    if let Some(caps) = plain.captures(device) {
        return caps[1].to_string();
    }
    device.to_string()
}

#[cfg(test)]
mod facts_tests;
