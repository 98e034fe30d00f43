//! Channel scheduler defaults.

/// Channels in the regulatory band plan.
pub const DEFAULT_CHANNEL_COUNT: u8 = 129;

/// Time spent on one unicast channel before hopping.
pub const DEFAULT_UNICAST_DWELL_MS: u32 = 255;

/// Period of the broadcast schedule.
pub const DEFAULT_BROADCAST_INTERVAL_MS: u32 = 1_020;

/// Length of the broadcast listening window at the start of each interval.
pub const DEFAULT_BROADCAST_DWELL_MS: u32 = 255;

/// Slot indices wrap at 16 bits.
pub const SLOT_MODULUS: u64 = 1 << 16;
