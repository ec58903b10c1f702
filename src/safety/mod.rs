// Safety configuration, protected set and the gate
//
// The gate merges classifier output, configured protection rules and
// hidden-area findings into one accept/reject/warn decision per request.
// It is stateless per call: mount state and protection configuration can
// change between calls, so nothing here caches a prior verdict.

use crate::classify::DiskClassification;
use crate::error::{OpResult, WipeError};
use crate::hidden::HiddenAreaReport;
use crate::{DiskDevice, WipeMethod, WipeRequest};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Externally loaded protection rules. Read-only input, merged at
/// gate-check time; a change on disk is visible on the next call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub protected_devices: Vec<String>,
    pub protected_patterns: Vec<String>,
    pub emergency_override: bool,
    pub confirmation_levels: HashMap<String, u8>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            protected_devices: Vec::new(),
            protected_patterns: Vec::new(),
            emergency_override: false,
            confirmation_levels: HashMap::new(),
        }
    }
}

impl SafetyConfig {
    /// Parse the JSON document; malformed input is fatal at load time
    pub fn from_json(raw: &str) -> OpResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| WipeError::Configuration(format!("malformed safety config: {e}")))
    }

    pub fn load(path: &Path) -> OpResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            WipeError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }
}

/// Where the gate obtains its configuration on each call
pub trait SafetyConfigSource: Send + Sync {
    fn load(&self) -> OpResult<SafetyConfig>;
}

/// Re-reads a config file on every call so edits take effect immediately
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location under the user configuration directory
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "wipeout")
            .map(|dirs| dirs.config_dir().join("safety.json"))
    }
}

impl SafetyConfigSource for ConfigFile {
    fn load(&self) -> OpResult<SafetyConfig> {
        if self.path.exists() {
            SafetyConfig::load(&self.path)
        } else {
            Ok(SafetyConfig::default())
        }
    }
}

/// A fixed config, for embedding and tests
impl SafetyConfigSource for SafetyConfig {
    fn load(&self) -> OpResult<SafetyConfig> {
        Ok(self.clone())
    }
}

/// The set of devices wipes are unconditionally rejected for: system disks
/// derived from classification, explicitly configured paths, and glob
/// pattern matches over discovered devices.
///
/// Carve-out: a device flagged removable is never a member, regardless of
/// how it would otherwise qualify.
#[derive(Debug, Clone, Default)]
pub struct ProtectedSet {
    members: BTreeSet<String>,
}

impl ProtectedSet {
    pub fn build(
        config: &SafetyConfig,
        devices: &[DiskDevice],
        system_disks: &[String],
    ) -> Self {
        let mut members: BTreeSet<String> = BTreeSet::new();

        members.extend(system_disks.iter().cloned());
        members.extend(config.protected_devices.iter().cloned());

        for pattern_str in &config.protected_patterns {
            match glob::Pattern::new(pattern_str) {
                Ok(pattern) => {
                    for device in devices {
                        if pattern.matches(&device.path) {
                            members.insert(device.path.clone());
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(pattern = %pattern_str, error = %e, "ignoring bad protected pattern");
                }
            }
        }

        for device in devices {
            if device.removable {
                members.remove(&device.path);
            }
        }

        Self { members }
    }

    pub fn contains(&self, device: &str) -> bool {
        self.members.contains(device)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Gate verdict for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    AllowWithWarnings(Vec<String>),
    Reject(String),
}

impl GateDecision {
    pub fn is_rejected(&self) -> bool {
        matches!(self, GateDecision::Reject(_))
    }
}

pub struct SafetyGate;

impl SafetyGate {
    /// Authorize one request. Rejection for a protected device is
    /// unconditional; `force` only ever suppresses interactive
    /// confirmation in a front end, never this check.
    pub fn authorize(
        request: &WipeRequest,
        classification: &DiskClassification,
        hidden: &HiddenAreaReport,
        protected: &ProtectedSet,
    ) -> GateDecision {
        if protected.contains(&request.device) {
            tracing::warn!(
                device = %request.device,
                force = request.force,
                "wipe rejected: device is protected"
            );
            return GateDecision::Reject(format!(
                "{} is in the protected set; wiping is blocked",
                request.device
            ));
        }

        let mut warnings = Vec::new();

        if !(1..=10).contains(&request.passes) {
            warnings.push(format!(
                "unusual pass count {}; expected 1..10",
                request.passes
            ));
        }
        if WipeMethod::from_tag(&request.method).is_none() {
            warnings.push(format!("unrecognized wipe method '{}'", request.method));
        }
        if classification.is_mounted {
            warnings.push(format!(
                "{} has mounted partitions; unmount before wiping",
                request.device
            ));
        }
        if request.remove_hpa && !hidden.hpa_detected {
            warnings.push("HPA removal requested but no HPA was detected".to_string());
        }
        if request.remove_dco && !hidden.dco_detected {
            warnings.push("DCO removal requested but no DCO was detected".to_string());
        }
        if request.remove_dco {
            warnings.push(
                "DCO removal is irreversible and may reduce the device feature set".to_string(),
            );
        }
        if classification.safety == crate::SafetyLevel::WarningRequired {
            warnings.push(format!(
                "{} may contain important data; verify before wiping",
                request.device
            ));
        }
        if classification.safety == crate::SafetyLevel::Unknown {
            warnings.push(format!(
                "safety level of {} could not be determined (confidence {:.2})",
                request.device, classification.confidence
            ));
        }

        if warnings.is_empty() {
            GateDecision::Allow
        } else {
            GateDecision::AllowWithWarnings(warnings)
        }
    }
}
