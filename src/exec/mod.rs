// Platform wipe executors
//
// One handler per OS provides the same capability surface; callers query
// `supports()` before invoking instead of catching a "not implemented"
// error. Handlers only build command lines - every privileged invocation
// goes through the command channel, which is also where tests intercept.

mod linux;
mod windows;

pub use linux::LinuxHandler;
pub use windows::WindowsHandler;

use crate::command::PrivilegedRunner;
use crate::error::{OpResult, WipeError};
use crate::progress::ProgressPublisher;
use crate::{CancelToken, DiskDevice, WipeMethod, WipeState};
use std::sync::Arc;

/// Capabilities a platform handler may provide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Overwrite,
    SecureErase,
    TrimDiscard,
    Format,
    HpaRemoval,
    DcoRemoval,
}

impl From<WipeMethod> for Capability {
    fn from(method: WipeMethod) -> Self {
        match method {
            WipeMethod::Overwrite => Capability::Overwrite,
            WipeMethod::SecureErase => Capability::SecureErase,
            WipeMethod::TrimDiscard => Capability::TrimDiscard,
            WipeMethod::Format => Capability::Format,
        }
    }
}

/// One privileged command of a wipe sequence
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub description: String,
}

impl CommandSpec {
    pub fn new(argv: Vec<String>, description: impl Into<String>) -> Self {
        Self {
            argv,
            description: description.into(),
        }
    }
}

/// Which independent max-sector source a probe command feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorSource {
    /// Kernel-reported sector count (blockdev)
    Kernel,
    /// ATA current/native max pair (hdparm -N)
    AtaMaxAddress,
    /// SMART-reported user capacity (smartctl -i)
    SmartCapacity,
    /// DCO IDENTIFY real max (hdparm --dco-identify)
    DcoIdentify,
}

/// A probe command together with the source its output feeds
#[derive(Debug, Clone)]
pub struct SectorProbe {
    pub source: SectorSource,
    pub argv: Vec<String>,
}

/// Per-OS capability surface
pub trait PlatformHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, cap: Capability) -> bool;

    /// Full privileged command sequence implementing `tag` over `passes`
    fn wipe_commands(
        &self,
        device: &DiskDevice,
        tag: &str,
        passes: u32,
    ) -> OpResult<Vec<CommandSpec>>;

    /// Probe commands for the platform's independent max-sector sources.
    /// Sources the platform cannot query are simply absent.
    fn sector_probes(&self, device: &str) -> Vec<SectorProbe>;

    /// SET MAX ADDRESS-class command raising the addressable boundary
    fn hpa_restore_command(&self, device: &str, native_max: u64) -> OpResult<Vec<String>>;

    /// DEVICE CONFIGURATION RESTORE-class command
    fn dco_restore_command(&self, device: &str) -> OpResult<Vec<String>>;
}

/// Pick the handler for the running OS
pub fn select_handler() -> Arc<dyn PlatformHandler> {
    if cfg!(target_os = "windows") {
        Arc::new(WindowsHandler::new())
    } else {
        Arc::new(LinuxHandler::new())
    }
}

/// Dispatches a wipe request to the platform handler and drives its
/// command sequence through the privileged channel.
pub struct WipeExecutor {
    handler: Arc<dyn PlatformHandler>,
    runner: Arc<dyn PrivilegedRunner>,
}

impl WipeExecutor {
    pub fn new(handler: Arc<dyn PlatformHandler>, runner: Arc<dyn PrivilegedRunner>) -> Self {
        Self { handler, runner }
    }

    /// Run one wipe attempt. Cancellation is honored between commands,
    /// never mid-command.
    pub fn run(
        &self,
        device: &DiskDevice,
        tag: &str,
        passes: u32,
        cancel: &CancelToken,
        progress: Option<&ProgressPublisher>,
    ) -> OpResult<()> {
        let method = WipeMethod::from_tag(tag)
            .ok_or_else(|| WipeError::Validation(format!("unknown wipe method '{tag}'")))?;
        if !self.handler.supports(method.into()) {
            return Err(WipeError::Operation(format!(
                "method '{tag}' not supported by the {} handler",
                self.handler.name()
            )));
        }

        let specs = self.handler.wipe_commands(device, tag, passes)?;
        let total = specs.len().max(1) as u64;

        for (index, spec) in specs.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(WipeError::Operation(
                    "operation cancelled".to_string(),
                ));
            }
            if let Some(progress) = progress {
                progress.update(
                    WipeState::Executing,
                    index as u32 + 1,
                    specs.len() as u32,
                    device.size_bytes * index as u64 / total,
                );
            }
            tracing::info!(
                device = %device.path,
                step = %spec.description,
                "executing wipe step"
            );

            let argv: Vec<&str> = spec.argv.iter().map(String::as_str).collect();
            let output = self.runner.run(&argv)?;
            if !output.success() {
                return Err(output.into_error(&spec.description));
            }
        }

        if let Some(progress) = progress {
            progress.update(
                WipeState::Executing,
                specs.len() as u32,
                specs.len() as u32,
                device.size_bytes,
            );
        }
        Ok(())
    }
}
