// Hidden-area protocol engine
//
// Detects Host Protected Areas and Device Configuration Overlays by
// querying several independent max-sector sources and cross-validating
// them. A missing source contributes no evidence; a "native" value is
// never manufactured from a "current" value or vice versa. Removal raises
// the addressable boundary (HPA) or restores the factory configuration
// (DCO); HPA removal re-detects afterwards and treats non-convergence as
// failure.

use crate::command::PrivilegedRunner;
use crate::error::{OpResult, WipeError};
use crate::exec::{Capability, PlatformHandler, SectorSource};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cross-validated findings for one device.
///
/// The three sector counts come from different channels (ATA current max,
/// ATA native max, kernel view) and are deliberately kept apart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HiddenAreaReport {
    pub current_max_sectors: Option<u64>,
    pub native_max_sectors: Option<u64>,
    pub accessible_sectors: Option<u64>,
    pub hpa_detected: bool,
    pub hpa_sectors: u64,
    pub dco_detected: bool,
    pub dco_sectors: u64,
    /// Names the source pair(s) that produced the verdict
    pub detection_method: String,
    pub can_remove_hpa: bool,
    pub can_remove_dco: bool,
    pub error: Option<String>,
}

impl HiddenAreaReport {
    /// Report for a device that was not probed at all
    pub fn not_probed() -> Self {
        Self {
            detection_method: "none".to_string(),
            ..Default::default()
        }
    }

    pub fn hidden_bytes(&self) -> u64 {
        (self.hpa_sectors + self.dco_sectors) * 512
    }
}

/// Raw values gathered from the independent sources, before validation
#[derive(Debug, Clone, Copy, Default)]
pub struct SectorReadings {
    /// Kernel-reported sector count
    pub kernel: Option<u64>,
    /// ATA IDENTIFY currently addressable max
    pub ata_current: Option<u64>,
    /// ATA READ NATIVE MAX ADDRESS
    pub ata_native: Option<u64>,
    /// SMART-reported user capacity, in sectors
    pub smart_capacity: Option<u64>,
    /// DCO IDENTIFY real max
    pub dco_real: Option<u64>,
}

impl SectorReadings {
    /// Best available "currently visible" figure, preferring the ATA
    /// current max, then the kernel view, then SMART capacity.
    fn visible(&self) -> Option<(u64, &'static str)> {
        self.ata_current
            .map(|v| (v, "ata-current"))
            .or(self.kernel.map(|v| (v, "kernel")))
            .or(self.smart_capacity.map(|v| (v, "smart-capacity")))
    }

    /// Reference maximum a DCO restriction is judged against: the HPA
    /// native max when known, otherwise the visible figure.
    fn dco_reference(&self) -> Option<(u64, &'static str)> {
        self.ata_native
            .map(|v| (v, "ata-native"))
            .or_else(|| self.visible())
    }
}

/// Preconditions for the irreversible DCO restore, checked by the engine.
/// All three must hold; any unmet precondition is a hard failure.
#[derive(Debug, Clone, Copy)]
pub struct DcoGuard {
    pub mounted: bool,
    pub protected: bool,
    pub emergency_override: bool,
}

pub struct HiddenAreaEngine {
    runner: Arc<dyn PrivilegedRunner>,
    handler: Arc<dyn PlatformHandler>,
}

impl HiddenAreaEngine {
    pub fn new(runner: Arc<dyn PrivilegedRunner>, handler: Arc<dyn PlatformHandler>) -> Self {
        Self { runner, handler }
    }

    /// Query all available sources and cross-validate. Probe failures end
    /// up in the report's `error` field instead of aborting detection.
    pub fn detect(&self, device: &str) -> HiddenAreaReport {
        let (readings, probe_errors) = self.gather(device);
        let mut report = cross_validate(&readings);

        report.can_remove_hpa =
            report.hpa_detected && self.handler.supports(Capability::HpaRemoval);
        report.can_remove_dco =
            report.dco_detected && self.handler.supports(Capability::DcoRemoval);

        if report.current_max_sectors.is_none()
            && report.native_max_sectors.is_none()
            && report.accessible_sectors.is_none()
        {
            report.error = Some(if probe_errors.is_empty() {
                "no max-sector source available".to_string()
            } else {
                probe_errors.join("; ")
            });
        }

        tracing::debug!(
            device,
            hpa = report.hpa_detected,
            dco = report.dco_detected,
            method = %report.detection_method,
            "hidden-area detection complete"
        );
        report
    }

    /// Run every probe the platform offers, tolerating individual failures
    fn gather(&self, device: &str) -> (SectorReadings, Vec<String>) {
        let mut readings = SectorReadings::default();
        let mut errors = Vec::new();

        for probe in self.handler.sector_probes(device) {
            let argv: Vec<&str> = probe.argv.iter().map(String::as_str).collect();
            let output = match self.runner.run(&argv) {
                Ok(out) if out.success() => out,
                Ok(out) => {
                    errors.push(format!("{:?}: exit {}", probe.source, out.status));
                    continue;
                }
                Err(err) => {
                    errors.push(format!("{:?}: {err}", probe.source));
                    continue;
                }
            };

            match probe.source {
                SectorSource::Kernel => {
                    readings.kernel = parse_blockdev_sectors(&output.stdout);
                }
                SectorSource::AtaMaxAddress => {
                    let (current, native) = parse_hdparm_max_sectors(&output.stdout);
                    readings.ata_current = current;
                    readings.ata_native = native;
                }
                SectorSource::SmartCapacity => {
                    readings.smart_capacity = parse_smartctl_capacity_sectors(&output.stdout);
                }
                SectorSource::DcoIdentify => {
                    readings.dco_real = parse_dco_real_max(&output.stdout);
                }
            }
        }

        (readings, errors)
    }

    /// Raise the addressable boundary to the native maximum, then
    /// re-detect and require convergence. Returns the sector count exposed.
    pub fn remove_hpa(&self, device: &str) -> OpResult<u64> {
        if !self.handler.supports(Capability::HpaRemoval) {
            return Err(WipeError::Operation(format!(
                "HPA removal not supported by the {} handler",
                self.handler.name()
            )));
        }

        let (readings, _) = self.gather(device);
        let native = readings.ata_native.ok_or_else(|| {
            WipeError::Operation("native max address unavailable; cannot remove HPA".to_string())
        })?;
        let (visible, _) = readings.visible().ok_or_else(|| {
            WipeError::Operation("current max address unavailable; cannot remove HPA".to_string())
        })?;
        if native <= visible {
            return Err(WipeError::Validation(format!(
                "no HPA present on {device} (native {native} <= visible {visible})"
            )));
        }

        let argv = self.handler.hpa_restore_command(device, native)?;
        let argv_refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        let output = self.runner.run(&argv_refs)?;
        if !output.success() {
            return Err(output.into_error("SET MAX ADDRESS"));
        }

        // Convergence check: the boundary must actually have moved
        let after = self.detect(device);
        let converged = match after.current_max_sectors.or(after.accessible_sectors) {
            Some(now_visible) => now_visible >= native && !after.hpa_detected,
            None => false,
        };
        if !converged {
            return Err(WipeError::Operation(format!(
                "HPA removal did not converge on {device}: boundary still below native max"
            )));
        }

        tracing::info!(device, exposed = native - visible, "HPA removed");
        Ok(native - visible)
    }

    /// Issue DEVICE CONFIGURATION RESTORE. Irreversible, and may silently
    /// reduce the device's feature set, so all guard preconditions must
    /// hold. Returns the sector count expected to be exposed.
    pub fn remove_dco(&self, device: &str, guard: &DcoGuard) -> OpResult<u64> {
        if !self.handler.supports(Capability::DcoRemoval) {
            return Err(WipeError::Operation(format!(
                "DCO removal not supported by the {} handler",
                self.handler.name()
            )));
        }
        if guard.mounted {
            return Err(WipeError::Safety(format!(
                "refusing DCO restore: {device} is mounted"
            )));
        }
        if guard.protected {
            return Err(WipeError::Safety(format!(
                "refusing DCO restore: {device} is in the protected set"
            )));
        }
        if !guard.emergency_override {
            return Err(WipeError::Safety(
                "refusing DCO restore: emergency_override is not enabled in the safety configuration"
                    .to_string(),
            ));
        }

        let (readings, _) = self.gather(device);
        let real = readings.dco_real.ok_or_else(|| {
            WipeError::Operation("DCO identify unavailable; cannot restore".to_string())
        })?;
        let exposed = readings
            .dco_reference()
            .map(|(reference, _)| real.saturating_sub(reference))
            .unwrap_or(0);
        if exposed == 0 {
            return Err(WipeError::Validation(format!(
                "no DCO restriction present on {device}"
            )));
        }

        let argv = self.handler.dco_restore_command(device)?;
        let argv_refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        let output = self.runner.run(&argv_refs)?;
        if !output.success() {
            return Err(output.into_error("DEVICE CONFIGURATION RESTORE"));
        }

        tracing::info!(device, exposed, "DCO restored to factory configuration");
        Ok(exposed)
    }
}

/// Pure cross-validation of gathered readings.
///
/// HPA is asserted when the ATA native max exceeds the visible maximum;
/// DCO when the DCO-identify real max exceeds the reference maximum. The
/// comparisons never substitute one side for a missing other.
pub fn cross_validate(readings: &SectorReadings) -> HiddenAreaReport {
    let mut report = HiddenAreaReport {
        current_max_sectors: readings.ata_current,
        native_max_sectors: readings.ata_native,
        accessible_sectors: readings.kernel,
        detection_method: "none".to_string(),
        ..Default::default()
    };

    let mut methods = Vec::new();

    if let (Some(native), Some((visible, visible_src))) =
        (readings.ata_native, readings.visible())
    {
        if native > visible {
            report.hpa_detected = true;
            report.hpa_sectors = native - visible;
        }
        methods.push(format!("ata-native/{visible_src}"));
    }

    if let (Some(real), Some((reference, reference_src))) =
        (readings.dco_real, readings.dco_reference())
    {
        if real > reference {
            report.dco_detected = true;
            report.dco_sectors = real - reference;
        }
        methods.push(format!("dco-identify/{reference_src}"));
    }

    if !methods.is_empty() {
        report.detection_method = methods.join(",");
    }
    report
}

// ---------------------------------------------------------------------------
// Tool output parsing
// ---------------------------------------------------------------------------

/// Parse `hdparm -N` output: ` max sectors = 1953523055/1953525168, HPA is enabled`
pub(crate) fn parse_hdparm_max_sectors(output: &str) -> (Option<u64>, Option<u64>) {
    let re = Regex::new(r"max sectors\s*=\s*(\d+)/(\d+)").expect("static regex");
    for line in output.lines() {
        if let Some(caps) = re.captures(line) {
            let current = caps[1].parse::<u64>().ok();
            let native = caps[2].parse::<u64>().ok();
            return (current, native);
        }
    }
    (None, None)
}

/// Parse `blockdev --getsz` output: a bare sector count
pub(crate) fn parse_blockdev_sectors(output: &str) -> Option<u64> {
    output.trim().parse::<u64>().ok()
}

/// Parse `smartctl -i` user capacity into 512-byte sectors:
/// `User Capacity:    512,110,190,592 bytes [512 GB]`
pub(crate) fn parse_smartctl_capacity_sectors(output: &str) -> Option<u64> {
    for line in output.lines() {
        if line.contains("User Capacity") || line.contains("Total NVM Capacity") {
            let bytes_part = line.split(':').nth(1)?.split("bytes").next()?;
            let digits: String = bytes_part.chars().filter(char::is_ascii_digit).collect();
            if let Ok(bytes) = digits.parse::<u64>() {
                return Some(bytes / 512);
            }
        }
    }
    None
}

/// Parse `hdparm --dco-identify` output: `Real max sectors: 1953525168`
pub(crate) fn parse_dco_real_max(output: &str) -> Option<u64> {
    let re = Regex::new(r"Real max sectors:\s*(\d+)").expect("static regex");
    for line in output.lines() {
        if let Some(caps) = re.captures(line) {
            return caps[1].parse::<u64>().ok();
        }
    }
    None
}
