//! Error types for the node runtime.

use lowmesh_core::FrameError;
use lowmesh_protocol::{AdmissionRejected, CoapError, HandshakeError, KeyError};
use lowmesh_transport::{FhssError, FragmentError, NeighborError, ReassemblyError, RoutingError};

use crate::events::FailureReason;
use crate::radio::RadioError;

/// Errors that stop a node from starting or keep it from running.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("channel scheduler error: {0}")]
    Fhss(#[from] FhssError),
    #[error("fragmentation error: {0}")]
    Fragment(#[from] FragmentError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
    #[error("interface task stopped")]
    InterfaceClosed,
}

/// Why an inbound frame was dropped.
///
/// Drops are never fatal to the interface; the owning task logs them and
/// carries on.
#[derive(Debug, thiserror::Error)]
pub enum FrameDrop {
    #[error("malformed frame: {0}")]
    Malformed(#[from] FrameError),
    #[error("frame for PAN {0:#06x}")]
    ForeignPan(u16),
    #[error("frame addressed to another node")]
    NotForUs,
    #[error("secured data from unauthenticated neighbor")]
    Unauthenticated,
    #[error("unsecured data frame")]
    Unsecured,
    #[error("no key for key id {0}")]
    UnknownKey(u8),
    #[error("frame MIC verification failed")]
    BadMic,
    #[error("frame counter rejected: {0}")]
    Counter(#[from] KeyError),
    #[error(transparent)]
    Admission(#[from] AdmissionRejected),
    #[error("neighbor: {0}")]
    Neighbor(#[from] NeighborError),
    #[error("reassembly: {0}")]
    Reassembly(#[from] ReassemblyError),
    #[error("advertisement: {0}")]
    Routing(#[from] RoutingError),
    #[error("handshake: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("coap: {0}")]
    Coap(#[from] CoapError),
    #[error("hop limit exhausted")]
    HopLimit,
    #[error("reply could not be sent: {0}")]
    Send(#[from] SendError),
}

/// Failure to put a datagram or control frame on the air.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("no route to {0}")]
    NoRoute(lowmesh_core::LinkAddr),
    #[error("neighbor {0} holds no pairwise keys")]
    NoKeys(lowmesh_core::LinkAddr),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("radio: {0}")]
    Radio(#[from] RadioError),
    #[error("channel scheduler: {0}")]
    Fhss(#[from] FhssError),
    #[error("fragmentation: {0}")]
    Fragment(#[from] FragmentError),
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
    #[error("coap: {0}")]
    Coap(#[from] CoapError),
    #[error("crypto: {0}")]
    Crypto(#[from] lowmesh_crypto::CryptoError),
}

impl SendError {
    /// The application-visible reason for this failure.
    ///
    /// A request that cannot be encoded or fragmented (for example one above
    /// the maximum datagram size) is refused locally before anything goes
    /// on the air. It is reported synchronously by
    /// [`MeshStack::send_request`](crate::MeshStack::send_request) as
    /// [`FailureReason::RejectedByAdmission`] and never as `Unreachable`, so
    /// retrying the same request is pointless. The detailed error is logged.
    pub fn reason(&self) -> FailureReason {
        match self {
            SendError::NoRoute(_) | SendError::Radio(_) | SendError::Fhss(_) => FailureReason::Unreachable,
            SendError::NoKeys(_) | SendError::Key(_) | SendError::Crypto(_) => FailureReason::AuthFailed,
            SendError::Coap(err) => FailureReason::from(err),
            SendError::Fragment(_) | SendError::Frame(_) => FailureReason::RejectedByAdmission,
        }
    }
}
