//! Datagram fragmentation and reassembly.
//!
//! The send path ([`Fragmenter`]) splits a serialized datagram into FRAG1 /
//! FRAGN payloads. The receive path ([`ReassemblyTable`]) collects fragments
//! per `(peer, tag)` and hands the datagram up once every byte is covered.

pub mod fragmenter;
pub mod reassembly;

pub use fragmenter::Fragmenter;
pub use reassembly::{ExpiredContext, ReassemblyConfig, ReassemblyTable};

/// Default number of datagram bytes carried per fragment.
pub const DEFAULT_FRAGMENT_PAYLOAD_SIZE: usize = 248;

/// Default lifetime of an incomplete reassembly context.
pub const DEFAULT_REASSEMBLY_TIMEOUT_MS: u64 = 60_000;

/// Default capacity of the reassembly table.
pub const DEFAULT_MAX_CONTEXTS: usize = 8;

/// Outgoing tags remembered per peer and not reused while remembered.
pub const RECENT_TAG_WINDOW: usize = 8;
