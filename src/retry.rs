//! Retry/backoff configuration for the UDP client.

use std::time::Duration;

/// A data-driven exponential backoff schedule used by [`crate::client::UdpClient`]
/// when no reply is received for a call.
///
/// The default matches the historical behaviour of ONC RPC UDP clients: five
/// retransmissions, starting at one second and doubling up to a 25 second
/// ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Number of retransmissions to attempt after the first send.
    pub attempts: u32,
    /// The timeout applied to the first send.
    pub initial: Duration,
    /// The maximum timeout a retransmission will wait for, regardless of how
    /// many times the timeout has doubled.
    pub max: Duration,
    /// Whether the timeout doubles after each retransmission.
    pub doubling: bool,
}

impl RetryPolicy {
    /// Returns the timeout to use for retransmission attempt `n` (0-indexed),
    /// clamped to [`RetryPolicy::max`].
    pub fn timeout_for_attempt(&self, n: u32) -> Duration {
        if !self.doubling {
            return self.initial;
        }

        let scale = 1u32.checked_shl(n).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(scale)
            .map(|d| d.min(self.max))
            .unwrap_or(self.max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial: Duration::from_secs(1),
            max: Duration::from_secs(25),
            doubling: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_doubles_and_caps() {
        let p = RetryPolicy::default();
        assert_eq!(p.timeout_for_attempt(0), Duration::from_secs(1));
        assert_eq!(p.timeout_for_attempt(1), Duration::from_secs(2));
        assert_eq!(p.timeout_for_attempt(2), Duration::from_secs(4));
        assert_eq!(p.timeout_for_attempt(3), Duration::from_secs(8));
        assert_eq!(p.timeout_for_attempt(4), Duration::from_secs(16));
        // Would be 32s uncapped; the default policy caps at 25s.
        assert_eq!(p.timeout_for_attempt(5), Duration::from_secs(25));
    }

    #[test]
    fn test_no_doubling() {
        let p = RetryPolicy {
            attempts: 3,
            initial: Duration::from_millis(500),
            max: Duration::from_secs(5),
            doubling: false,
        };
        assert_eq!(p.timeout_for_attempt(0), p.timeout_for_attempt(3));
    }
}
