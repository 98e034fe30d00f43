//! Routing constants.

/// Advertisement wire format version.
pub const ADVERTISEMENT_VERSION: u8 = 1;

/// `version | dodag_id | dodag_version | rank | offset | flags | count`.
pub const ADVERTISEMENT_FIXED_LEN: usize = 16;

/// `destination(8) | cost(2)`.
pub const ADVERTISED_ROUTE_LEN: usize = 10;

/// Most destinations a single advertisement carries.
pub const MAX_ADVERTISED_ROUTES: usize = 64;

pub const FLAG_GROUNDED: u8 = 0x01;
pub const FLAG_HOLDS_GTK: u8 = 0x02;

pub const DEFAULT_MIN_HOP_RANK_INCREASE: u16 = 256;

/// Rank of a node that has no parent.
pub const INFINITE_RANK: u16 = 0xFFFF;

/// Path costs at or above this value count as unreachable.
pub const MAX_PATH_COST: u16 = 0x8000;

pub const DEFAULT_ADVERTISEMENT_INTERVAL_MS: u64 = 15_000;

pub const DEFAULT_MAX_ROUTES: usize = 64;

/// Lifetime of a learned candidate, and of an unreachable route.
pub const DEFAULT_ROUTE_LIFETIME_MS: u64 = 1_800_000;
