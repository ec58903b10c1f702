/// Shared test infrastructure: scripted command channel, static facts
/// provider and device record builders. No test in this suite touches
/// real hardware or spawns real tools.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wipeout::collab::{Certifier, Verifier, VerifyOutcome, WipeOperationRecord};
use wipeout::command::{CommandOutput, PrivilegedRunner};
use wipeout::error::OpResult;
use wipeout::facts::{FactsProvider, MountEntry, TopologyFacts};
use wipeout::{DiskDevice, DiskInterface, MediaKind, PartitionInfo, WipeError};

// ============================================================================
// Scripted command channel
// ============================================================================

struct Rule {
    prefix: String,
    output: CommandOutput,
    /// None = always; Some(n) = apply n times then fall through
    remaining: Option<u32>,
    delay: Option<Duration>,
}

/// Runner that serves scripted responses and records every invocation.
/// Rules are matched by prefix of the joined argv; the first live match
/// wins and unmatched commands succeed with empty output.
#[derive(Default)]
pub struct MockRunner {
    rules: Mutex<Vec<Rule>>,
    log: Mutex<Vec<Vec<String>>>,
}

#[allow(dead_code)]
impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, prefix: &str, stdout: &str) {
        self.push_rule(
            prefix,
            CommandOutput {
                status: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
            None,
            None,
        );
    }

    pub fn fail(&self, prefix: &str, stderr: &str) {
        self.push_rule(
            prefix,
            CommandOutput {
                status: 1,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
            None,
            None,
        );
    }

    /// Serve a success response for the first `times` matching
    /// invocations, then fall through to later rules
    pub fn respond_times(&self, prefix: &str, times: u32, stdout: &str) {
        self.push_rule(
            prefix,
            CommandOutput {
                status: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
            Some(times),
            None,
        );
    }

    /// Fail the first `times` matching invocations, then succeed
    pub fn fail_times(&self, prefix: &str, times: u32, stderr: &str) {
        self.push_rule(
            prefix,
            CommandOutput {
                status: 1,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
            Some(times),
            None,
        );
    }

    /// Delay matching invocations, for in-flight overlap tests
    pub fn slow(&self, prefix: &str, delay: Duration) {
        self.push_rule(
            prefix,
            CommandOutput {
                status: 0,
                stdout: String::new(),
                stderr: String::new(),
            },
            None,
            Some(delay),
        );
    }

    fn push_rule(
        &self,
        prefix: &str,
        output: CommandOutput,
        remaining: Option<u32>,
        delay: Option<Duration>,
    ) {
        self.rules.lock().unwrap().push(Rule {
            prefix: prefix.to_string(),
            output,
            remaining,
            delay,
        });
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.log.lock().unwrap().clone()
    }

    /// Privileged commands that write to a device
    pub fn write_commands(&self) -> Vec<Vec<String>> {
        self.commands()
            .into_iter()
            .filter(|argv| is_write_command(argv))
            .collect()
    }
}

pub fn is_write_command(argv: &[String]) -> bool {
    let joined = argv.join(" ");
    argv.first().map(String::as_str) == Some("dd")
        || argv.first().map(String::as_str) == Some("blkdiscard")
        || argv.first().map(String::as_str) == Some("cipher")
        || joined.starts_with("nvme format")
        || joined.contains("--security-erase")
        || joined.contains("--security-set-pass")
        || joined.contains("--yes-i-know-what-i-am-doing")
        || joined.contains("--dco-restore")
}

impl PrivilegedRunner for MockRunner {
    fn run(&self, argv: &[&str]) -> OpResult<CommandOutput> {
        let argv_owned: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
        self.log.lock().unwrap().push(argv_owned.clone());

        let joined = argv_owned.join(" ");
        let mut delay = None;
        let output = {
            let mut rules = self.rules.lock().unwrap();
            let mut found = None;
            for rule in rules.iter_mut() {
                if !joined.starts_with(&rule.prefix) {
                    continue;
                }
                match rule.remaining {
                    Some(0) => continue,
                    Some(ref mut n) => *n -= 1,
                    None => {}
                }
                delay = rule.delay;
                found = Some(rule.output.clone());
                break;
            }
            found
        };

        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        Ok(output.unwrap_or(CommandOutput {
            status: 0,
            stdout: String::new(),
            stderr: String::new(),
        }))
    }
}

// ============================================================================
// Static facts provider
// ============================================================================

pub struct StaticFacts {
    pub devices: Vec<DiskDevice>,
    pub mounts: Vec<MountEntry>,
    pub topology: TopologyFacts,
    pub fail_listing: bool,
}

#[allow(dead_code)]
impl StaticFacts {
    pub fn new(devices: Vec<DiskDevice>) -> Self {
        Self {
            devices,
            mounts: Vec::new(),
            topology: TopologyFacts {
                root_device: None,
                boot_device: None,
                efi_present: Some(true),
            },
            fail_listing: false,
        }
    }
}

impl FactsProvider for StaticFacts {
    fn list_devices(&self) -> OpResult<Vec<DiskDevice>> {
        if self.fail_listing {
            return Err(WipeError::DiskAccess("facts collector offline".to_string()));
        }
        Ok(self.devices.clone())
    }

    fn mount_table(&self) -> OpResult<Vec<MountEntry>> {
        Ok(self.mounts.clone())
    }

    fn topology_facts(&self) -> OpResult<TopologyFacts> {
        Ok(self.topology.clone())
    }
}

// ============================================================================
// Device record builders
// ============================================================================

#[allow(dead_code)]
pub fn disk(path: &str) -> DiskDevice {
    DiskDevice {
        path: path.to_string(),
        size_bytes: 256 * 1024 * 1024 * 1024,
        interface: DiskInterface::SATA,
        media: MediaKind::HDD,
        model: "MOCK DISK 256G".to_string(),
        serial: "MOCK-0001".to_string(),
        removable: false,
        partitions: Vec::new(),
    }
}

#[allow(dead_code)]
pub fn removable_disk(path: &str) -> DiskDevice {
    let mut d = disk(path);
    d.removable = true;
    d.media = MediaKind::Removable;
    d.interface = DiskInterface::USB;
    d
}

#[allow(dead_code)]
pub fn mounted_at(mut device: DiskDevice, mountpoint: &str) -> DiskDevice {
    let part = format!("{}1", device.path);
    device.partitions.push(PartitionInfo {
        device: part,
        mountpoint: Some(mountpoint.to_string()),
        fstype: Some("ext4".to_string()),
    });
    device
}

/// A real file to stand in for a device node, so the access probe passes
#[allow(dead_code)]
pub fn fake_device_node() -> (tempfile::NamedTempFile, String) {
    let file = tempfile::NamedTempFile::new().expect("temp device node");
    std::fs::write(file.path(), b"device contents").expect("seed device node");
    let path = file.path().to_string_lossy().into_owned();
    (file, path)
}

// ============================================================================
// Collaborator mocks
// ============================================================================

pub struct MockVerifier {
    pub outcome: Option<VerifyOutcome>,
    pub calls: Mutex<u32>,
}

#[allow(dead_code)]
impl MockVerifier {
    pub fn passing() -> Self {
        Self {
            outcome: Some(VerifyOutcome {
                passed: true,
                detail: "all sampled sectors clean".to_string(),
            }),
            calls: Mutex::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            outcome: Some(VerifyOutcome {
                passed: false,
                detail: "recoverable data found".to_string(),
            }),
            calls: Mutex::new(0),
        }
    }

    /// Collaborator itself breaks (distinct from a failed verification)
    pub fn broken() -> Self {
        Self {
            outcome: None,
            calls: Mutex::new(0),
        }
    }
}

impl Verifier for MockVerifier {
    fn verify(&self, _device: &str, _sample_bytes: u64) -> OpResult<VerifyOutcome> {
        *self.calls.lock().unwrap() += 1;
        match &self.outcome {
            Some(outcome) => Ok(outcome.clone()),
            None => Err(WipeError::Operation("verifier crashed".to_string())),
        }
    }
}

#[derive(Default)]
pub struct MockCertifier {
    pub records: Mutex<Vec<WipeOperationRecord>>,
}

impl Certifier for MockCertifier {
    fn certify(
        &self,
        record: &WipeOperationRecord,
    ) -> OpResult<HashMap<String, std::path::PathBuf>> {
        self.records.lock().unwrap().push(record.clone());
        let mut artifacts = HashMap::new();
        artifacts.insert(
            "json".to_string(),
            std::path::PathBuf::from("/tmp/certificate.json"),
        );
        Ok(artifacts)
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// Standard orchestrator over the mocks, with no retry pauses
#[allow(dead_code)]
pub fn orchestrator_with(
    facts: StaticFacts,
    runner: Arc<MockRunner>,
    config: wipeout::safety::SafetyConfig,
) -> wipeout::WipeOrchestrator {
    use wipeout::error::RetryPolicy;
    use wipeout::exec::LinuxHandler;

    wipeout::WipeOrchestrator::new(
        Arc::new(facts),
        runner,
        Arc::new(LinuxHandler::new()),
        Arc::new(config),
    )
    .with_retry(RetryPolicy::immediate(3))
}
