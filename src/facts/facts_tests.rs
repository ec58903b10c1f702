/// Tests for the sysfs facts collector and its parsing helpers
use super::*;
use std::fs;
use tempfile::TempDir;

/// Build a fake sysfs/procfs tree with one disk entry
struct FakeTree {
    root: TempDir,
}

impl FakeTree {
    fn new() -> Self {
        let root = TempDir::new().expect("tempdir");
        fs::create_dir_all(root.path().join("sys_block")).unwrap();
        fs::create_dir_all(root.path().join("dev")).unwrap();
        fs::write(root.path().join("mounts"), "").unwrap();
        fs::write(root.path().join("cmdline"), "").unwrap();
        Self { root }
    }

    fn add_disk(&self, name: &str, sectors: u64, removable: bool, rotational: Option<&str>) {
        let disk = self.root.path().join("sys_block").join(name);
        fs::create_dir_all(disk.join("device")).unwrap();
        fs::create_dir_all(disk.join("queue")).unwrap();
        fs::write(disk.join("size"), sectors.to_string()).unwrap();
        fs::write(disk.join("removable"), if removable { "1" } else { "0" }).unwrap();
        if let Some(rot) = rotational {
            fs::write(disk.join("queue/rotational"), rot).unwrap();
        }
        fs::write(disk.join("device/model"), format!("FAKE-{name}")).unwrap();
    }

    fn add_partition(&self, disk: &str, part: &str) {
        let dir = self.root.path().join("sys_block").join(disk).join(part);
        fs::create_dir_all(dir).unwrap();
    }

    fn set_mounts(&self, content: &str) {
        fs::write(self.root.path().join("mounts"), content).unwrap();
    }

    fn set_cmdline(&self, content: &str) {
        fs::write(self.root.path().join("cmdline"), content).unwrap();
    }

    fn provider(&self) -> SysfsFacts {
        SysfsFacts::with_roots(
            self.root.path().join("sys_block"),
            self.root.path().join("mounts"),
            self.root.path().join("cmdline"),
            self.root.path().join("efi"),
            self.root.path().join("dev"),
        )
    }
}

#[test]
fn lists_disks_with_size_and_model() {
    let tree = FakeTree::new();
    tree.add_disk("sda", 1953525168, false, Some("1"));

    let devices = tree.provider().list_devices().unwrap();
    assert_eq!(devices.len(), 1);
    let sda = &devices[0];
    assert!(sda.path.ends_with("/dev/sda"));
    assert_eq!(sda.size_bytes, 1953525168 * 512);
    assert_eq!(sda.model, "FAKE-sda");
    assert_eq!(sda.media, MediaKind::HDD);
    assert_eq!(sda.interface, DiskInterface::SATA);
    assert!(!sda.removable);
}

#[test]
fn skips_virtual_devices() {
    let tree = FakeTree::new();
    tree.add_disk("loop0", 1024, false, None);
    tree.add_disk("ram0", 1024, false, None);
    tree.add_disk("zram0", 1024, false, None);
    tree.add_disk("dm-0", 1024, false, None);
    tree.add_disk("sdb", 2048, false, Some("0"));

    let devices = tree.provider().list_devices().unwrap();
    assert_eq!(devices.len(), 1);
    assert!(devices[0].path.ends_with("sdb"));
    assert_eq!(devices[0].media, MediaKind::SSD);
}

#[test]
fn removable_flag_and_media_kind() {
    let tree = FakeTree::new();
    tree.add_disk("sdc", 4096, true, Some("0"));

    let devices = tree.provider().list_devices().unwrap();
    assert!(devices[0].removable);
    assert_eq!(devices[0].media, MediaKind::Removable);
}

#[test]
fn nvme_devices_report_nvme_interface() {
    let tree = FakeTree::new();
    tree.add_disk("nvme0n1", 8192, false, Some("0"));

    let devices = tree.provider().list_devices().unwrap();
    assert_eq!(devices[0].interface, DiskInterface::NVMe);
    assert_eq!(devices[0].media, MediaKind::NVMe);
}

#[test]
fn partitions_join_against_mount_table() {
    let tree = FakeTree::new();
    tree.add_disk("sda", 1953525168, false, Some("1"));
    tree.add_partition("sda", "sda1");
    tree.add_partition("sda", "sda2");
    let dev = tree.root.path().join("dev");
    tree.set_mounts(&format!(
        "{}/sda1 / ext4 rw 0 0\n{}/sda2 /boot ext4 rw 0 0\nproc /proc proc rw 0 0\n",
        dev.display(),
        dev.display()
    ));

    let devices = tree.provider().list_devices().unwrap();
    let parts = &devices[0].partitions;
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].mountpoint.as_deref(), Some("/"));
    assert_eq!(parts[0].fstype.as_deref(), Some("ext4"));
    assert_eq!(parts[1].mountpoint.as_deref(), Some("/boot"));
    assert!(devices[0].is_mounted());
}

#[test]
fn mount_table_skips_pseudo_filesystems() {
    let raw = "\
/dev/sda1 / ext4 rw,relatime 0 0
proc /proc proc rw 0 0
tmpfs /tmp tmpfs rw 0 0
/dev/sdb1 /mnt/data\\040disk xfs rw 0 0
";
    let mounts = parse_mount_table(raw);
    assert_eq!(mounts.len(), 2);
    assert_eq!(mounts[0].device, "/dev/sda1");
    assert_eq!(mounts[1].mountpoint, "/mnt/data disk");
}

#[test]
fn cmdline_root_extraction() {
    assert_eq!(
        parse_cmdline_root("BOOT_IMAGE=/vmlinuz root=/dev/sda2 ro quiet"),
        Some("/dev/sda2".to_string())
    );
    // UUID-style roots are not device paths and contribute no evidence
    assert_eq!(
        parse_cmdline_root("root=UUID=abcd-1234 ro quiet"),
        None
    );
    assert_eq!(parse_cmdline_root("ro quiet"), None);
}

#[test]
fn parent_disk_strips_partition_suffixes() {
    assert_eq!(parent_disk("/dev/sda2"), "/dev/sda");
    assert_eq!(parent_disk("/dev/sdb"), "/dev/sdb");
    assert_eq!(parent_disk("/dev/nvme0n1p3"), "/dev/nvme0n1");
    assert_eq!(parent_disk("/dev/nvme0n1"), "/dev/nvme0n1");
    assert_eq!(parent_disk("/dev/mmcblk0p1"), "/dev/mmcblk0");
}

#[test]
fn topology_facts_from_mounts_and_cmdline() {
    let tree = FakeTree::new();
    tree.set_mounts("/dev/sda2 / ext4 rw 0 0\n/dev/sda1 /boot/efi vfat rw 0 0\n");
    tree.set_cmdline("BOOT_IMAGE=/vmlinuz root=/dev/sda2 ro");

    let facts = tree.provider().topology_facts().unwrap();
    assert_eq!(facts.root_device.as_deref(), Some("/dev/sda"));
    assert_eq!(facts.boot_device.as_deref(), Some("/dev/sda"));
    assert_eq!(facts.efi_present, Some(false));
}

#[test]
fn system_mountpoint_set() {
    for mp in ["/", "/boot", "/boot/efi", "/usr", "/var"] {
        assert!(is_system_mountpoint(mp), "{mp} should be a system mountpoint");
    }
    for mp in ["/home", "/media/usb", "/mnt/data", "/tmp"] {
        assert!(!is_system_mountpoint(mp), "{mp} is not a system mountpoint");
    }
}
