// External collaborator interfaces
//
// Verification and certification are thin I/O layers outside the core;
// the orchestrator calls them through these traits and degrades the
// result message when they fail rather than failing a finished wipe.

use crate::error::OpResult;
use crate::hidden::HiddenAreaReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Outcome of a byte-sample verification pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub passed: bool,
    pub detail: String,
}

pub trait Verifier: Send + Sync {
    fn verify(&self, device: &str, sample_bytes: u64) -> OpResult<VerifyOutcome>;
}

/// Everything the certificate renderer needs about one finished operation.
/// The core hands this over and keeps nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WipeOperationRecord {
    pub operation_id: Uuid,
    pub device_path: String,
    pub model: String,
    pub serial: String,
    pub size_bytes: u64,
    pub method: String,
    pub passes: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub hidden_area: HiddenAreaReport,
    pub verification: Option<VerifyOutcome>,
    pub success: bool,
    pub trail: Vec<String>,
}

pub trait Certifier: Send + Sync {
    /// Render certificates; returns artifact kind -> path
    fn certify(&self, record: &WipeOperationRecord) -> OpResult<HashMap<String, PathBuf>>;
}
