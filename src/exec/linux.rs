// Linux handler: hdparm for ATA commands, nvme-cli for controller-level
// erase, blkdiscard for TRIM, dd for pattern overwrite. All tools are
// reached through the privileged command channel.

use super::{Capability, CommandSpec, PlatformHandler, SectorProbe, SectorSource};
use crate::error::{OpResult, WipeError};
use crate::DiskDevice;

#[derive(Debug, Default)]
pub struct LinuxHandler;

impl LinuxHandler {
    pub fn new() -> Self {
        Self
    }

    fn dd_pass(device: &str, source: &str, pass: u32, total: u32) -> CommandSpec {
        CommandSpec::new(
            vec![
                "dd".to_string(),
                format!("if={source}"),
                format!("of={device}"),
                "bs=1M".to_string(),
                "conv=fsync".to_string(),
            ],
            format!("overwrite pass {pass}/{total} ({source})"),
        )
    }
}

impl PlatformHandler for LinuxHandler {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn supports(&self, _cap: Capability) -> bool {
        // The full surface is available through hdparm/nvme/blkdiscard/dd
        true
    }

    fn wipe_commands(
        &self,
        device: &DiskDevice,
        tag: &str,
        passes: u32,
    ) -> OpResult<Vec<CommandSpec>> {
        let dev = device.path.as_str();
        let passes = passes.max(1);

        let specs = match tag.to_ascii_lowercase().as_str() {
            "zero" | "quick" => (1..=passes)
                .map(|p| Self::dd_pass(dev, "/dev/zero", p, passes))
                .collect(),
            "secure" | "dd" | "random" | "overwrite" => (1..=passes)
                .map(|p| Self::dd_pass(dev, "/dev/urandom", p, passes))
                .collect(),
            "hdparm" | "secure-erase" | "ata-secure-erase" => vec![
                CommandSpec::new(
                    vec![
                        "hdparm".to_string(),
                        "--user-master".to_string(),
                        "u".to_string(),
                        "--security-set-pass".to_string(),
                        "p".to_string(),
                        dev.to_string(),
                    ],
                    "set ATA security password".to_string(),
                ),
                CommandSpec::new(
                    vec![
                        "hdparm".to_string(),
                        "--user-master".to_string(),
                        "u".to_string(),
                        "--security-erase".to_string(),
                        "p".to_string(),
                        dev.to_string(),
                    ],
                    "ATA SECURITY ERASE UNIT".to_string(),
                ),
            ],
            "trim" | "blkdiscard" | "discard" => vec![CommandSpec::new(
                vec!["blkdiscard".to_string(), dev.to_string()],
                "TRIM discard of full device".to_string(),
            )],
            "nvme" | "format" => vec![CommandSpec::new(
                vec![
                    "nvme".to_string(),
                    "format".to_string(),
                    dev.to_string(),
                    "--ses=1".to_string(),
                    "--force".to_string(),
                ],
                "NVMe format with secure erase".to_string(),
            )],
            other => {
                return Err(WipeError::Validation(format!(
                    "unknown wipe method '{other}'"
                )))
            }
        };

        Ok(specs)
    }

    fn sector_probes(&self, device: &str) -> Vec<SectorProbe> {
        vec![
            SectorProbe {
                source: SectorSource::Kernel,
                argv: vec![
                    "blockdev".to_string(),
                    "--getsz".to_string(),
                    device.to_string(),
                ],
            },
            SectorProbe {
                source: SectorSource::AtaMaxAddress,
                argv: vec!["hdparm".to_string(), "-N".to_string(), device.to_string()],
            },
            SectorProbe {
                source: SectorSource::SmartCapacity,
                argv: vec!["smartctl".to_string(), "-i".to_string(), device.to_string()],
            },
            SectorProbe {
                source: SectorSource::DcoIdentify,
                argv: vec![
                    "hdparm".to_string(),
                    "--dco-identify".to_string(),
                    device.to_string(),
                ],
            },
        ]
    }

    fn hpa_restore_command(&self, device: &str, native_max: u64) -> OpResult<Vec<String>> {
        // "p" makes the new max address permanent across power cycles
        Ok(vec![
            "hdparm".to_string(),
            "--yes-i-know-what-i-am-doing".to_string(),
            "-N".to_string(),
            format!("p{native_max}"),
            device.to_string(),
        ])
    }

    fn dco_restore_command(&self, device: &str) -> OpResult<Vec<String>> {
        Ok(vec![
            "hdparm".to_string(),
            "--dco-restore".to_string(),
            device.to_string(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MediaKind;

    fn device(path: &str) -> DiskDevice {
        let mut d = DiskDevice::unknown(path);
        d.media = MediaKind::HDD;
        d.size_bytes = 1024 * 1024 * 1024;
        d
    }

    #[test]
    fn overwrite_expands_one_command_per_pass() {
        let handler = LinuxHandler::new();
        let specs = handler
            .wipe_commands(&device("/dev/sdx"), "secure", 3)
            .unwrap();
        assert_eq!(specs.len(), 3);
        assert!(specs.iter().all(|s| s.argv[0] == "dd"));
        assert!(specs[0].argv.contains(&"if=/dev/urandom".to_string()));
    }

    #[test]
    fn zero_method_uses_dev_zero() {
        let handler = LinuxHandler::new();
        let specs = handler
            .wipe_commands(&device("/dev/sdx"), "zero", 1)
            .unwrap();
        assert_eq!(specs.len(), 1);
        assert!(specs[0].argv.contains(&"if=/dev/zero".to_string()));
    }

    #[test]
    fn secure_erase_is_a_two_command_sequence() {
        let handler = LinuxHandler::new();
        let specs = handler
            .wipe_commands(&device("/dev/sdx"), "hdparm", 1)
            .unwrap();
        assert_eq!(specs.len(), 2);
        assert!(specs[0].argv.contains(&"--security-set-pass".to_string()));
        assert!(specs[1].argv.contains(&"--security-erase".to_string()));
    }

    #[test]
    fn unknown_tag_is_a_validation_error() {
        let handler = LinuxHandler::new();
        let err = handler
            .wipe_commands(&device("/dev/sdx"), "telepathy", 1)
            .unwrap_err();
        assert!(matches!(err, WipeError::Validation(_)));
    }

    #[test]
    fn probes_cover_all_four_sources() {
        let handler = LinuxHandler::new();
        let probes = handler.sector_probes("/dev/sdx");
        let sources: Vec<_> = probes.iter().map(|p| p.source).collect();
        assert!(sources.contains(&SectorSource::Kernel));
        assert!(sources.contains(&SectorSource::AtaMaxAddress));
        assert!(sources.contains(&SectorSource::SmartCapacity));
        assert!(sources.contains(&SectorSource::DcoIdentify));
    }

    #[test]
    fn hpa_restore_sets_permanent_native_max() {
        let handler = LinuxHandler::new();
        let argv = handler
            .hpa_restore_command("/dev/sdx", 1953525168)
            .unwrap();
        assert!(argv.contains(&"p1953525168".to_string()));
        assert!(argv.contains(&"--yes-i-know-what-i-am-doing".to_string()));
    }
}
