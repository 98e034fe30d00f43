//! Handshake timing profiles.
//!
//! A profile scales the retry budget and retransmission intervals for the
//! expected network latency. The concrete values are a table, not formulas,
//! so deployments can tune a tier without touching the others.

use std::fmt;
use std::str::FromStr;

/// Retry budget and backoff for one handshake message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retransmissions after the first transmission.
    pub max_retries: u8,
    pub initial_timeout_ms: u64,
    pub backoff_factor: u32,
    pub max_timeout_ms: u64,
}

impl RetryPolicy {
    /// Timeout after transmission number `attempt` (0 = first transmission).
    pub fn timeout_for_attempt(&self, attempt: u8) -> u64 {
        let factor = u64::from(self.backoff_factor).saturating_pow(u32::from(attempt));
        self.initial_timeout_ms
            .saturating_mul(factor)
            .min(self.max_timeout_ms)
    }

    /// Reject policies that would retransmit in a tight loop or never back off.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.initial_timeout_ms == 0 {
            return Err("initial timeout must be non-zero");
        }
        if self.backoff_factor == 0 {
            return Err("backoff factor must be at least 1");
        }
        if self.max_timeout_ms < self.initial_timeout_ms {
            return Err("max timeout must not be below the initial timeout");
        }
        Ok(())
    }

    /// Sum of all timeouts for the full retry budget: how long a peer waiting
    /// on this side may have to wait before giving up.
    pub fn total_window_ms(&self) -> u64 {
        (0..=self.max_retries)
            .map(|a| self.timeout_for_attempt(a))
            .fold(0u64, u64::saturating_add)
    }
}

/// Network latency tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimingProfile {
    VeryFast,
    Fast,
    #[default]
    Medium,
    Slow,
    VerySlow,
}

impl TimingProfile {
    pub const ALL: [TimingProfile; 5] = [
        Self::VeryFast,
        Self::Fast,
        Self::Medium,
        Self::Slow,
        Self::VerySlow,
    ];

    pub fn policy(self) -> RetryPolicy {
        let (max_retries, initial_timeout_ms, max_timeout_ms) = match self {
            Self::VeryFast => (3, 300, 2_000),
            Self::Fast => (3, 1_000, 8_000),
            Self::Medium => (4, 3_000, 30_000),
            Self::Slow => (5, 10_000, 120_000),
            Self::VerySlow => (6, 30_000, 300_000),
        };
        RetryPolicy {
            max_retries,
            initial_timeout_ms,
            backoff_factor: 2,
            max_timeout_ms,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::VeryFast => "very-fast",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::VerySlow => "very-slow",
        }
    }
}

impl fmt::Display for TimingProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimingProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown timing profile '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = TimingProfile::Fast.policy();
        assert_eq!(p.timeout_for_attempt(0), 1_000);
        assert_eq!(p.timeout_for_attempt(1), 2_000);
        assert_eq!(p.timeout_for_attempt(3), 8_000);
        assert_eq!(p.timeout_for_attempt(4), 8_000);
        assert_eq!(p.total_window_ms(), 1_000 + 2_000 + 4_000 + 8_000);
    }

    #[test]
    fn test_slower_tiers_never_retry_sooner() {
        for pair in TimingProfile::ALL.windows(2) {
            let (a, b) = (pair[0].policy(), pair[1].policy());
            assert!(b.initial_timeout_ms >= a.initial_timeout_ms);
            assert!(b.max_retries >= a.max_retries);
            assert!(b.total_window_ms() > a.total_window_ms());
        }
    }

    #[test]
    fn test_policy_validation() {
        for p in TimingProfile::ALL {
            p.policy().validate().unwrap();
        }
        let base = TimingProfile::Fast.policy();
        assert!(RetryPolicy { initial_timeout_ms: 0, ..base }.validate().is_err());
        assert!(RetryPolicy { backoff_factor: 0, ..base }.validate().is_err());
        assert!(RetryPolicy { max_timeout_ms: 500, ..base }.validate().is_err());
        RetryPolicy { max_retries: 0, backoff_factor: 1, ..base }.validate().unwrap();
    }

    #[test]
    fn test_profile_names_round_trip() {
        for p in TimingProfile::ALL {
            assert_eq!(p.as_str().parse::<TimingProfile>().unwrap(), p);
        }
        assert!("warp".parse::<TimingProfile>().is_err());
    }
}
