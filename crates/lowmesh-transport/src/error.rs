//! Transport layer error types.

use lowmesh_core::FrameError;
use lowmesh_protocol::AdmissionRejected;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FhssError {
    /// No usable hopping sequence: fatal, nothing can be scheduled.
    #[error("hopping sequence uninitialized: {reason}")]
    Uninitialized { reason: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum FragmentError {
    #[error("datagram of {size} bytes exceeds maximum {max}")]
    TooLarge { size: usize, max: usize },

    #[error("fragment payload size {0} must be a non-zero multiple of 8")]
    InvalidPayloadSize(usize),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReassemblyError {
    #[error("conflicting fragment content at offset {offset}")]
    Conflict { offset: usize },

    #[error("fragment [{offset}, {end}) exceeds datagram size {size}")]
    OutOfBounds { offset: usize, end: usize, size: usize },

    #[error("fragment declares size {actual}, context expects {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("reassembly timed out")]
    Timeout,

    #[error("reassembly table full ({max} contexts)")]
    TableFull { max: usize },

    #[error(transparent)]
    Admission(#[from] AdmissionRejected),
}

impl ReassemblyError {
    /// Whether the error dropped an existing context (as opposed to refusing
    /// to create one).
    pub fn dropped_context(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::OutOfBounds { .. } | Self::SizeMismatch { .. } | Self::Timeout
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NeighborError {
    #[error("neighbor table full ({max} entries)")]
    TableFull { max: usize },

    #[error("invalid trust transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("stale neighbor handle")]
    StaleHandle,

    #[error(transparent)]
    Admission(#[from] AdmissionRejected),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("routing table full ({max} routes)")]
    TableFull { max: usize },

    #[error("malformed advertisement: {0}")]
    MalformedAdvertisement(&'static str),

    #[error("unsupported advertisement version {0}")]
    UnsupportedVersion(u8),
}
