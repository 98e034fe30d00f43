//! Monotonic time base of the stack.
//!
//! All timeouts are expressed against [`Timestamp`], a millisecond counter
//! that starts when the interface task starts and never wraps in practice.
//! Channel-hopping slot numbers are derived from it and wrap independently,
//! so slot wraparound never disturbs a timeout.

use core::fmt;

/// Milliseconds since the owning interface task started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// The timestamp `ms` milliseconds later (saturating).
    pub const fn after_ms(self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms))
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` is in the future.
    pub const fn elapsed_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Whether `deadline` has been reached.
    pub fn reached(self, deadline: Timestamp) -> bool {
        self >= deadline
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}s", self.0 / 1000, self.0 % 1000)
    }
}
