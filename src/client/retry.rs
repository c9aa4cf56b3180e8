//! Retransmission policy.

use std::time::Duration;

use crate::device::SnmpDevice;

/// How many times an unanswered request is resent, and how long each
/// attempt waits.
///
/// There is no backoff: the next attempt starts as soon as the previous
/// one's timeout expires, so a silent agent costs `(retries + 1) * timeout`.
///
/// ```
/// use snmp_monitor::client::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3, Duration::from_secs(5));
/// assert_eq!(policy.attempts(), 4);
/// assert_eq!(policy.budget(), Duration::from_secs(20));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Resends after the first attempt.
    pub retries: u32,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, timeout: Duration) -> Self {
        Self { retries, timeout }
    }

    pub fn for_device(device: &SnmpDevice) -> Self {
        Self::new(device.retries, device.timeout())
    }

    /// Send the request once; never resend.
    pub fn none(timeout: Duration) -> Self {
        Self::new(0, timeout)
    }

    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Longest time a request can wait before failing with a timeout.
    pub fn budget(&self) -> Duration {
        self.timeout.saturating_mul(self.attempts())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::device::DEFAULT_RETRIES, Duration::from_millis(crate::device::DEFAULT_TIMEOUT_MS))
    }
}
