// Wipe orchestration
//
// Top-level entry point sequencing gate checks, the access probe,
// optional hidden-area removal, method dispatch with bounded retry, and
// the verification/certification hooks. The machine is fail-closed: a
// gate rejection or a hidden-area removal failure terminates the request
// before a single overwrite command reaches the device.
//
// Wipe execution is long-running blocking I/O; `submit` runs each
// operation on its own blocking worker and hands back a handle with the
// operation id, a cancellation token and a progress receiver. At most one
// wipe per device is in flight at a time - a second request is rejected,
// not queued.

use crate::classify::{DeviceAccess, DiskClassification, DiskClassifier};
use crate::collab::{Certifier, Verifier, VerifyOutcome, WipeOperationRecord};
use crate::command::PrivilegedRunner;
use crate::error::{OpResult, RetryPolicy, WipeError};
use crate::exec::{PlatformHandler, WipeExecutor};
use crate::facts::FactsProvider;
use crate::hidden::{DcoGuard, HiddenAreaEngine, HiddenAreaReport};
use crate::progress::{ProgressPublisher, ProgressReceiver, ProgressSnapshot};
use crate::safety::{GateDecision, ProtectedSet, SafetyConfig, SafetyConfigSource, SafetyGate};
use crate::{CancelToken, DiskDevice, WipeRequest, WipeResult, WipeState};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Handle to a submitted wipe operation
pub struct WipeHandle {
    pub operation_id: Uuid,
    pub cancel: CancelToken,
    pub progress: ProgressReceiver,
    join: tokio::task::JoinHandle<WipeResult>,
}

impl WipeHandle {
    /// Wait for the operation's terminal result
    pub async fn wait(self) -> WipeResult {
        match self.join.await {
            Ok(result) => result,
            Err(e) => WipeResult {
                operation_id: self.operation_id,
                device: String::new(),
                success: false,
                trail: vec![format!("worker task failed: {e}")],
                error: Some(WipeError::Operation(format!("worker task failed: {e}"))),
                attempts: 0,
                reached: WipeState::Failed,
            },
        }
    }
}

#[derive(Clone)]
pub struct WipeOrchestrator {
    facts: Arc<dyn FactsProvider>,
    runner: Arc<dyn PrivilegedRunner>,
    handler: Arc<dyn PlatformHandler>,
    config: Arc<dyn SafetyConfigSource>,
    verifier: Option<Arc<dyn Verifier>>,
    certifier: Option<Arc<dyn Certifier>>,
    retry: RetryPolicy,
    active: Arc<Mutex<HashMap<String, Uuid>>>,
    receivers: Arc<Mutex<HashMap<Uuid, ProgressReceiver>>>,
}

impl WipeOrchestrator {
    pub fn new(
        facts: Arc<dyn FactsProvider>,
        runner: Arc<dyn PrivilegedRunner>,
        handler: Arc<dyn PlatformHandler>,
        config: Arc<dyn SafetyConfigSource>,
    ) -> Self {
        Self {
            facts,
            runner,
            handler,
            config,
            verifier: None,
            certifier: None,
            retry: RetryPolicy::fixed(),
            active: Arc::new(Mutex::new(HashMap::new())),
            receivers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_certifier(mut self, certifier: Arc<dyn Certifier>) -> Self {
        self.certifier = Some(certifier);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    // -----------------------------------------------------------------------
    // Front-end surface: classify / detect / remove / submit / poll
    // -----------------------------------------------------------------------

    pub fn list_devices(&self) -> OpResult<Vec<DiskDevice>> {
        self.facts.list_devices()
    }

    /// Classify a device. Collector failures collapse to an Unknown
    /// verdict with zero confidence rather than an error.
    pub fn classify_device(&self, device: &str) -> DiskClassification {
        let devices = match self.facts.list_devices() {
            Ok(devices) => devices,
            Err(e) => return DiskClassification::unavailable(device, &e.to_string()),
        };
        let record = devices
            .iter()
            .find(|d| d.path == device)
            .cloned()
            .unwrap_or_else(|| DiskDevice::unknown(device));
        let topology = self.facts.topology_facts().unwrap_or_default();
        DiskClassifier::classify(&record, &topology)
    }

    pub fn detect_hidden(&self, device: &str) -> HiddenAreaReport {
        self.engine().detect(device)
    }

    pub fn remove_hpa(&self, device: &str) -> OpResult<u64> {
        self.engine().remove_hpa(device)
    }

    /// Remove a DCO. The guard preconditions (unmounted, unprotected,
    /// emergency override) are recomputed from current state here.
    pub fn remove_dco(&self, device: &str) -> OpResult<u64> {
        let config = self.config.load()?;
        let devices = self.facts.list_devices().unwrap_or_default();
        let protected = self.protected_set(&config, &devices);
        let mounted = self
            .facts
            .mount_table()
            .map(|mounts| mounts.iter().any(|m| m.device.starts_with(device)))
            .unwrap_or(false);

        let guard = DcoGuard {
            mounted,
            protected: protected.contains(device),
            emergency_override: config.emergency_override,
        };
        self.engine().remove_dco(device, &guard)
    }

    /// Submit a wipe to its own blocking worker. Requires a tokio runtime.
    pub fn submit(&self, request: WipeRequest) -> WipeHandle {
        let operation_id = Uuid::new_v4();
        let cancel = CancelToken::new();
        let device = request.device.clone();

        let total_bytes = self
            .facts
            .list_devices()
            .ok()
            .and_then(|devs| devs.into_iter().find(|d| d.path == device))
            .map(|d| d.size_bytes)
            .unwrap_or(0);
        let (publisher, progress) = ProgressPublisher::new(operation_id, &device, total_bytes);
        if let Ok(mut receivers) = self.receivers.lock() {
            receivers.insert(operation_id, progress.clone());
        }

        let this = self.clone();
        let worker_cancel = cancel.clone();
        let join = tokio::task::spawn_blocking(move || {
            this.run_machine(&request, operation_id, &worker_cancel, &publisher)
        });

        WipeHandle {
            operation_id,
            cancel,
            progress,
            join,
        }
    }

    /// Run a wipe synchronously on the calling thread. Intended for
    /// dedicated worker contexts and tests.
    pub fn execute_blocking(&self, request: &WipeRequest, cancel: &CancelToken) -> WipeResult {
        let operation_id = Uuid::new_v4();
        let total_bytes = self
            .facts
            .list_devices()
            .ok()
            .and_then(|devs| devs.into_iter().find(|d| d.path == request.device))
            .map(|d| d.size_bytes)
            .unwrap_or(0);
        let (publisher, progress) =
            ProgressPublisher::new(operation_id, &request.device, total_bytes);
        if let Ok(mut receivers) = self.receivers.lock() {
            receivers.insert(operation_id, progress);
        }
        self.run_machine(request, operation_id, cancel, &publisher)
    }

    /// Latest progress snapshot for an operation, if known
    pub fn progress(&self, operation_id: Uuid) -> Option<ProgressSnapshot> {
        self.receivers
            .lock()
            .ok()?
            .get(&operation_id)
            .map(|rx| rx.borrow().clone())
    }

    pub fn subscribe(&self, operation_id: Uuid) -> Option<ProgressReceiver> {
        self.receivers.lock().ok()?.get(&operation_id).cloned()
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    fn engine(&self) -> HiddenAreaEngine {
        HiddenAreaEngine::new(self.runner.clone(), self.handler.clone())
    }

    /// Classifier-derived system disks plus configured rules
    fn protected_set(&self, config: &SafetyConfig, devices: &[DiskDevice]) -> ProtectedSet {
        let topology = self.facts.topology_facts().unwrap_or_default();
        let system_disks: Vec<String> = devices
            .iter()
            .filter(|d| {
                DiskClassifier::classify_with_access(
                    d,
                    &topology,
                    DeviceAccess {
                        exists: true,
                        readable: false,
                    },
                )
                .is_system_disk
            })
            .map(|d| d.path.clone())
            .collect();
        ProtectedSet::build(config, devices, &system_disks)
    }

    fn run_machine(
        &self,
        request: &WipeRequest,
        operation_id: Uuid,
        cancel: &CancelToken,
        publisher: &ProgressPublisher,
    ) -> WipeResult {
        let started_at = Utc::now();
        let mut trail: Vec<String> = Vec::new();
        let device_path = request.device.clone();

        let fail = |reached: WipeState,
                    error: WipeError,
                    trail: Vec<String>,
                    attempts: u32,
                    publisher: &ProgressPublisher| {
            publisher.finish(reached);
            tracing::error!(device = %device_path, state = %reached, error = %error, "wipe did not complete");
            WipeResult {
                operation_id,
                device: device_path.clone(),
                success: false,
                trail,
                error: Some(error),
                attempts,
                reached,
            }
        };

        trail.push(format!(
            "Requested: wipe of {} via '{}' ({} pass{})",
            request.device,
            request.method,
            request.passes,
            if request.passes == 1 { "" } else { "es" }
        ));

        // Single-flight: one active wipe per device
        let _claim = match ActiveClaim::acquire(&self.active, &request.device, operation_id) {
            Some(claim) => claim,
            None => {
                trail.push(format!(
                    "Rejected: a wipe of {} is already in progress",
                    request.device
                ));
                return fail(
                    WipeState::Rejected,
                    WipeError::DiskAccess(format!(
                        "device busy: a wipe of {} is already in progress",
                        request.device
                    )),
                    trail,
                    0,
                    publisher,
                );
            }
        };

        // --- GateCheck -----------------------------------------------------
        publisher.update(WipeState::GateCheck, 0, 0, 0);

        let config = match self.config.load() {
            Ok(config) => config,
            Err(e) => {
                trail.push(format!("GateCheck: {e}"));
                return fail(WipeState::Failed, e, trail, 0, publisher);
            }
        };

        let devices = self.facts.list_devices().unwrap_or_else(|e| {
            trail.push(format!("GateCheck: device enumeration degraded: {e}"));
            Vec::new()
        });
        let record = devices
            .iter()
            .find(|d| d.path == request.device)
            .cloned()
            .unwrap_or_else(|| DiskDevice::unknown(&request.device));
        let topology = self.facts.topology_facts().unwrap_or_default();
        let classification = DiskClassifier::classify(&record, &topology);

        let hidden = if request.remove_hpa || request.remove_dco {
            self.engine().detect(&request.device)
        } else {
            HiddenAreaReport::not_probed()
        };

        let protected = self.protected_set(&config, &devices);
        match SafetyGate::authorize(request, &classification, &hidden, &protected) {
            GateDecision::Reject(reason) => {
                trail.push(format!("GateCheck: rejected - {reason}"));
                return fail(
                    WipeState::Rejected,
                    WipeError::Safety(reason),
                    trail,
                    0,
                    publisher,
                );
            }
            GateDecision::AllowWithWarnings(warnings) => {
                for warning in &warnings {
                    trail.push(format!("GateCheck: warning - {warning}"));
                }
                trail.push("GateCheck: allowed with warnings".to_string());
            }
            GateDecision::Allow => trail.push("GateCheck: allowed".to_string()),
        }

        // --- AccessProbe ---------------------------------------------------
        publisher.update(WipeState::AccessProbe, 0, 0, 0);
        let access = DeviceAccess::probe(&request.device);
        if !access.exists {
            trail.push(format!("AccessProbe: {} does not exist", request.device));
            return fail(
                WipeState::Failed,
                WipeError::DiskAccess(format!("not found: {}", request.device)),
                trail,
                0,
                publisher,
            );
        }
        if !access.readable {
            trail.push(format!("AccessProbe: {} is not accessible", request.device));
            return fail(
                WipeState::Failed,
                WipeError::DiskAccess(format!("cannot access {}", request.device)),
                trail,
                0,
                publisher,
            );
        }
        trail.push("AccessProbe: device accessible".to_string());

        // --- Validated -----------------------------------------------------
        publisher.update(WipeState::Validated, 0, 0, 0);
        let passes = request.passes.max(1);
        trail.push(format!(
            "Validated: method '{}' with {passes} pass{}",
            request.method,
            if passes == 1 { "" } else { "es" }
        ));

        // --- HiddenAreaRemoval (strictly before any overwrite I/O) ---------
        if request.remove_hpa || request.remove_dco {
            publisher.update(WipeState::HiddenAreaRemoval, 0, 0, 0);
            let engine = self.engine();

            if request.remove_hpa {
                match engine.remove_hpa(&request.device) {
                    Ok(sectors) => trail.push(format!(
                        "HiddenAreaRemoval: HPA removed, {sectors} sectors exposed"
                    )),
                    // Nothing to remove; the gate already warned about this
                    Err(WipeError::Validation(msg)) => {
                        trail.push(format!("HiddenAreaRemoval: {msg}"));
                    }
                    Err(e) => {
                        trail.push(format!("HiddenAreaRemoval: HPA removal failed: {e}"));
                        if config.emergency_override && !matches!(e, WipeError::Safety(_)) {
                            trail.push(
                                "HiddenAreaRemoval: continuing under emergency override"
                                    .to_string(),
                            );
                        } else {
                            trail.push(
                                "HiddenAreaRemoval: aborting before any overwrite".to_string(),
                            );
                            return fail(WipeState::Failed, e, trail, 0, publisher);
                        }
                    }
                }
            }

            if request.remove_dco {
                let guard = DcoGuard {
                    mounted: classification.is_mounted,
                    protected: protected.contains(&request.device),
                    emergency_override: config.emergency_override,
                };
                match engine.remove_dco(&request.device, &guard) {
                    Ok(sectors) => trail.push(format!(
                        "HiddenAreaRemoval: DCO restored, {sectors} sectors exposed"
                    )),
                    // Unmet precondition: hard failure, never prompt-and-continue
                    Err(e @ WipeError::Safety(_)) => {
                        trail.push(format!("HiddenAreaRemoval: DCO removal refused: {e}"));
                        trail.push(
                            "HiddenAreaRemoval: aborting before any overwrite".to_string(),
                        );
                        return fail(WipeState::Failed, e, trail, 0, publisher);
                    }
                    Err(WipeError::Validation(msg)) => {
                        trail.push(format!("HiddenAreaRemoval: {msg}"));
                    }
                    Err(e) => {
                        // Only reachable under emergency override, which is
                        // the documented licence to continue degraded
                        trail.push(format!("HiddenAreaRemoval: DCO removal failed: {e}"));
                        trail.push(
                            "HiddenAreaRemoval: continuing under emergency override".to_string(),
                        );
                    }
                }
            }
        }

        // --- Executing -----------------------------------------------------
        publisher.update(WipeState::Executing, 0, passes, 0);
        let executor = WipeExecutor::new(self.handler.clone(), self.runner.clone());
        let (result, attempts) = self.retry.run(
            "Executing",
            cancel,
            &mut trail,
            |_attempt| executor.run(&record, &request.method, passes, cancel, Some(publisher)),
        );
        if let Err(e) = result {
            return fail(WipeState::Failed, e, trail, attempts, publisher);
        }
        trail.push(format!("Executing: wipe I/O finished after {attempts} attempt{}",
            if attempts == 1 { "" } else { "s" }));

        // --- Verifying (informational unless the request demands it) -------
        let mut verification: Option<VerifyOutcome> = None;
        if request.verify {
            publisher.update(WipeState::Verifying, passes, passes, record.size_bytes);
            match &self.verifier {
                Some(verifier) => {
                    match verifier.verify(&request.device, 1024 * 1024) {
                        Ok(outcome) => {
                            trail.push(format!(
                                "Verifying: {} - {}",
                                if outcome.passed { "passed" } else { "FAILED" },
                                outcome.detail
                            ));
                            let passed = outcome.passed;
                            verification = Some(outcome);
                            if !passed {
                                return fail(
                                    WipeState::Failed,
                                    WipeError::Operation(
                                        "verification reported surviving data".to_string(),
                                    ),
                                    trail,
                                    attempts,
                                    publisher,
                                );
                            }
                        }
                        Err(e) => {
                            // Collaborator failure degrades the message only
                            trail.push(format!(
                                "Verifying: verification unavailable ({e}); wipe result unchanged"
                            ));
                        }
                    }
                }
                None => {
                    trail.push("Verifying: no verifier configured; skipped".to_string());
                }
            }
        }

        // --- Certifying ----------------------------------------------------
        if let Some(certifier) = &self.certifier {
            publisher.update(WipeState::Certifying, passes, passes, record.size_bytes);
            let record = WipeOperationRecord {
                operation_id,
                device_path: record.path.clone(),
                model: record.model.clone(),
                serial: record.serial.clone(),
                size_bytes: record.size_bytes,
                method: request.method.clone(),
                passes,
                started_at,
                finished_at: Utc::now(),
                hidden_area: hidden.clone(),
                verification: verification.clone(),
                success: true,
                trail: trail.clone(),
            };
            match certifier.certify(&record) {
                Ok(artifacts) => {
                    for (kind, path) in artifacts {
                        trail.push(format!("Certifying: {kind} written to {}", path.display()));
                    }
                }
                Err(e) => {
                    trail.push(format!(
                        "Certifying: certificate generation failed ({e}); wipe result unchanged"
                    ));
                }
            }
        }

        // --- Completed -----------------------------------------------------
        publisher.finish(WipeState::Completed);
        trail.push("Completed: wipe finished successfully".to_string());
        tracing::info!(device = %request.device, attempts, "wipe completed");
        WipeResult {
            operation_id,
            device: request.device.clone(),
            success: true,
            trail,
            error: None,
            attempts,
            reached: WipeState::Completed,
        }
    }
}

/// Registration of an in-flight wipe; releases the device on drop
struct ActiveClaim {
    active: Arc<Mutex<HashMap<String, Uuid>>>,
    device: String,
}

impl ActiveClaim {
    fn acquire(
        active: &Arc<Mutex<HashMap<String, Uuid>>>,
        device: &str,
        operation_id: Uuid,
    ) -> Option<Self> {
        let mut map = active.lock().ok()?;
        if map.contains_key(device) {
            return None;
        }
        map.insert(device.to_string(), operation_id);
        Some(Self {
            active: active.clone(),
            device: device.to_string(),
        })
    }
}

impl Drop for ActiveClaim {
    fn drop(&mut self) {
        if let Ok(mut map) = self.active.lock() {
            map.remove(&self.device);
        }
    }
}
