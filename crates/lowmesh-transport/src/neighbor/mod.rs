//! Neighbor table (the MLE half of neighbor and routing management).
//!
//! ```text
//! Unauthenticated --begin_handshake--> HandshakeInProgress --install_keys--> Authenticated
//!        ^                                   |      ^                             |
//!        +---------- fail_handshake ---------+      +--------- KeyExpired <-------+
//! ```
//!
//! Each [`NeighborEntry`] exclusively owns its key set and its handshake
//! session. Other components refer to entries through generational
//! [`NeighborHandle`]s, which simply fail to resolve once the entry is gone.

pub mod table;
pub mod types;

pub use table::{NeighborConfig, NeighborTable};
pub use types::{Advertised, LinkMetrics, NeighborEntry, NeighborHandle, TrustState};

/// Default neighbor table capacity.
pub const DEFAULT_MAX_NEIGHBORS: usize = 32;

/// Default silence after which a neighbor is removed.
pub const DEFAULT_NEIGHBOR_TIMEOUT_MS: u64 = 600_000;
