//! Link-level transport for the lowmesh stack.
//!
//! - [`fhss`]: the channel scheduler and per-interface hopping state.
//! - [`frag`]: datagram fragmentation and reassembly.
//! - [`neighbor`]: the neighbor table with trust states and link metrics.
//! - [`rpl`]: DODAG formation, advertisements and route selection.

pub mod error;
pub mod fhss;
pub mod frag;
pub mod neighbor;
pub mod rpl;

pub use error::{FhssError, FragmentError, NeighborError, ReassemblyError, RoutingError};
