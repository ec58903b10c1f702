/// Bounded retry with a fixed backoff between attempts
///
/// Destructive-path operations get at most three attempts. Only errors
/// classified transient are retried; everything else fails on the first
/// attempt. Cancellation is honored between attempts, never mid-attempt.
use super::classification::classify;
use super::{OpResult, WipeError};
use crate::CancelToken;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed()
    }
}

impl RetryPolicy {
    /// Standard policy for executor invocations: 3 attempts, fixed 2s pause
    pub fn fixed() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }

    /// Policy without pauses, for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }

    /// Run `op` under this policy. Each attempt is passed its 1-based
    /// number; every outcome is appended to `trail`. Returns the final
    /// result together with the number of attempts actually made.
    pub fn run<T, F>(
        &self,
        what: &str,
        cancel: &CancelToken,
        trail: &mut Vec<String>,
        mut op: F,
    ) -> (OpResult<T>, u32)
    where
        F: FnMut(u32) -> OpResult<T>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                trail.push(format!("{what}: cancelled before attempt {attempt}"));
                return (
                    Err(WipeError::Operation("operation cancelled".to_string())),
                    attempt - 1,
                );
            }

            match op(attempt) {
                Ok(value) => {
                    trail.push(format!("{what}: attempt {attempt} succeeded"));
                    return (Ok(value), attempt);
                }
                Err(err) => {
                    trail.push(format!("{what}: attempt {attempt} failed: {err}"));
                    let retryable =
                        classify(&err).allows_retry() && attempt < self.max_attempts;
                    if !retryable {
                        return (Err(err), attempt);
                    }
                    tracing::warn!(
                        operation = what,
                        attempt,
                        error = %err,
                        "transient failure, retrying after backoff"
                    );
                    if !self.backoff.is_zero() {
                        std::thread::sleep(self.backoff);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial(interrupt)]
    fn succeeds_first_attempt() {
        let policy = RetryPolicy::immediate(3);
        let mut trail = Vec::new();
        let (result, attempts) =
            policy.run("op", &CancelToken::new(), &mut trail, |_| Ok(42));
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts, 1);
        assert_eq!(trail.len(), 1);
    }

    #[test]
    #[serial(interrupt)]
    fn transient_failure_exhausts_three_attempts() {
        let policy = RetryPolicy::immediate(3);
        let mut trail = Vec::new();
        let mut calls = 0;
        let (result, attempts) = policy.run::<(), _>("op", &CancelToken::new(), &mut trail, |_| {
            calls += 1;
            Err(WipeError::DiskAccess("device busy".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
        assert_eq!(attempts, 3);
    }

    #[test]
    #[serial(interrupt)]
    fn fatal_failure_stops_immediately() {
        let policy = RetryPolicy::immediate(3);
        let mut trail = Vec::new();
        let mut calls = 0;
        let (result, attempts) = policy.run::<(), _>("op", &CancelToken::new(), &mut trail, |_| {
            calls += 1;
            Err(WipeError::Permission("auth failed".to_string()))
        });
        assert!(matches!(result, Err(WipeError::Permission(_))));
        assert_eq!(calls, 1);
        assert_eq!(attempts, 1);
    }

    #[test]
    #[serial(interrupt)]
    fn transient_then_success() {
        let policy = RetryPolicy::immediate(3);
        let mut trail = Vec::new();
        let mut calls = 0;
        let (result, attempts) = policy.run("op", &CancelToken::new(), &mut trail, |_| {
            calls += 1;
            if calls < 2 {
                Err(WipeError::Operation("tool timeout".to_string()))
            } else {
                Ok("done")
            }
        });
        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts, 2);
    }

    #[test]
    #[serial(interrupt)]
    fn cancellation_checked_between_attempts() {
        let policy = RetryPolicy::immediate(3);
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut trail = Vec::new();
        let mut calls = 0;
        let (result, attempts) = policy.run::<(), _>("op", &cancel, &mut trail, |_| {
            calls += 1;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(calls, 0);
        assert_eq!(attempts, 0);
    }
}
