// Windows handler. Pattern overwrite goes through cipher.exe, controller
// erase through smartmontools where present. The ATA max-address commands
// (SET MAX ADDRESS, DCO RESTORE) have no stock tool on Windows, so the
// hidden-area removal capabilities are reported unsupported and callers
// are expected to check before invoking.

use super::{Capability, CommandSpec, PlatformHandler, SectorProbe, SectorSource};
use crate::error::{OpResult, WipeError};
use crate::DiskDevice;

#[derive(Debug, Default)]
pub struct WindowsHandler;

impl WindowsHandler {
    pub fn new() -> Self {
        Self
    }
}

impl PlatformHandler for WindowsHandler {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn supports(&self, cap: Capability) -> bool {
        matches!(cap, Capability::Overwrite | Capability::Format)
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
            "secure" | "dd" | "random" | "overwrite" | "zero" | "quick" => (1..=passes)
                .map(|p| {
                    CommandSpec::new(
                        vec!["cipher".to_string(), "/w".to_string(), dev.to_string()],
                        format!("cipher overwrite pass {p}/{passes}"),
                    )
                })
                .collect(),
            "nvme" | "format" => vec![CommandSpec::new(
                vec![
                    "format".to_string(),
                    dev.to_string(),
                    "/fs:NTFS".to_string(),
                    "/p:1".to_string(),
                    "/y".to_string(),
                ],
                "format with one overwrite pass".to_string(),
            )],
            other => {
                return Err(WipeError::Validation(format!(
                    "method '{other}' not available on windows"
                )))
            }
        };

        Ok(specs)
    }

    fn sector_probes(&self, device: &str) -> Vec<SectorProbe> {
        // smartctl is the only general max-sector source here; the ATA
        // address pair and DCO identify are absent and contribute no
        // evidence.
        vec![SectorProbe {
            source: SectorSource::SmartCapacity,
            argv: vec!["smartctl".to_string(), "-i".to_string(), device.to_string()],
        }]
    }

    fn hpa_restore_command(&self, _device: &str, _native_max: u64) -> OpResult<Vec<String>> {
        Err(WipeError::Operation(
            "HPA removal is not supported on windows".to_string(),
        ))
    }

    fn dco_restore_command(&self, _device: &str) -> OpResult<Vec<String>> {
        Err(WipeError::Operation(
            "DCO removal is not supported on windows".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_surface_excludes_ata_features() {
        let handler = WindowsHandler::new();
        assert!(handler.supports(Capability::Overwrite));
        assert!(!handler.supports(Capability::HpaRemoval));
        assert!(!handler.supports(Capability::DcoRemoval));
        assert!(!handler.supports(Capability::SecureErase));
    }

    #[test]
    fn hpa_restore_reports_unsupported() {
        let handler = WindowsHandler::new();
        assert!(handler.hpa_restore_command("\\\\.\\PhysicalDrive1", 1000).is_err());
    }
}
