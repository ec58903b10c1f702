// Operation progress
//
// Each operation owns one publisher; observers hold watch receivers keyed
// by operation id. Snapshots are pushed at roughly one-second cadence and
// delivery is at-most-once per tick: a slow consumer simply sees the
// latest snapshot, never a backlog.

use crate::WipeState;
use serde::Serialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub operation_id: Uuid,
    pub device: String,
    pub phase: WipeState,
    pub current_pass: u32,
    pub total_passes: u32,
    pub bytes_processed: u64,
    pub total_bytes: u64,
    /// Instantaneous throughput in bytes per second
    pub throughput_bps: f64,
    pub elapsed_secs: f64,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.bytes_processed as f64 / self.total_bytes as f64 * 100.0).clamp(0.0, 100.0)
    }
}

pub type ProgressReceiver = watch::Receiver<ProgressSnapshot>;

/// Owned exclusively by the operation's worker; observers only ever read
/// snapshots out of the watch channel.
pub struct ProgressPublisher {
    tx: watch::Sender<ProgressSnapshot>,
    started: Instant,
    cadence: Duration,
    last_sent: Mutex<Option<Instant>>,
}

impl ProgressPublisher {
    pub fn new(
        operation_id: Uuid,
        device: impl Into<String>,
        total_bytes: u64,
    ) -> (Self, ProgressReceiver) {
        let initial = ProgressSnapshot {
            operation_id,
            device: device.into(),
            phase: WipeState::Requested,
            current_pass: 0,
            total_passes: 0,
            bytes_processed: 0,
            total_bytes,
            throughput_bps: 0.0,
            elapsed_secs: 0.0,
        };
        let (tx, rx) = watch::channel(initial);
        (
            Self {
                tx,
                started: Instant::now(),
                cadence: Duration::from_secs(1),
                last_sent: Mutex::new(None),
            },
            rx,
        )
    }

    /// Publisher without rate limiting, for tests
    #[doc(hidden)]
    pub fn unthrottled(
        operation_id: Uuid,
        device: impl Into<String>,
        total_bytes: u64,
    ) -> (Self, ProgressReceiver) {
        let (mut publisher, rx) = Self::new(operation_id, device, total_bytes);
        publisher.cadence = Duration::ZERO;
        (publisher, rx)
    }

    /// Push a snapshot unless one was pushed within the current tick
    pub fn update(
        &self,
        phase: WipeState,
        current_pass: u32,
        total_passes: u32,
        bytes_processed: u64,
    ) {
        let mut last = match self.last_sent.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        if let Some(at) = *last {
            if at.elapsed() < self.cadence {
                return;
            }
        }
        *last = Some(Instant::now());
        drop(last);
        self.send(phase, current_pass, total_passes, bytes_processed);
    }

    /// Push a terminal snapshot, bypassing the cadence limit
    pub fn finish(&self, phase: WipeState) {
        let current = self.tx.borrow().clone();
        self.send(
            phase,
            current.current_pass,
            current.total_passes,
            current.bytes_processed,
        );
    }

    fn send(&self, phase: WipeState, current_pass: u32, total_passes: u32, bytes_processed: u64) {
        let elapsed = self.started.elapsed().as_secs_f64().max(0.0001);
        let snapshot = ProgressSnapshot {
            operation_id: self.tx.borrow().operation_id,
            device: self.tx.borrow().device.clone(),
            phase,
            current_pass,
            total_passes,
            bytes_processed,
            total_bytes: self.tx.borrow().total_bytes,
            throughput_bps: bytes_processed as f64 / elapsed,
            elapsed_secs: elapsed,
        };
        // Send fails only when every receiver is gone; progress is
        // best-effort either way.
        let _ = self.tx.send(snapshot);
    }
}
