//! Notifications the stack hands to the application.
//!
//! Internal errors never reach the application directly; they are folded
//! into the closed [`FailureReason`] set.

use lowmesh_core::LinkAddr;
use lowmesh_protocol::coap::{CoapMessage, TransactionFailure, TransactionHandle, TransactionOutcome};
use lowmesh_protocol::{BandChange, CoapError, HandshakeError};
use lowmesh_transport::ReassemblyError;
use lowmesh_transport::neighbor::TrustState;
use lowmesh_transport::rpl::RouteChange;

/// Application-visible failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum FailureReason {
    #[error("timed out")]
    Timeout,
    #[error("destination unreachable")]
    Unreachable,
    #[error("authentication failed")]
    AuthFailed,
    #[error("rejected by admission control")]
    RejectedByAdmission,
}

impl From<TransactionFailure> for FailureReason {
    fn from(failure: TransactionFailure) -> Self {
        match failure {
            TransactionFailure::Timeout => FailureReason::Timeout,
            TransactionFailure::Unreachable => FailureReason::Unreachable,
        }
    }
}

impl From<&HandshakeError> for FailureReason {
    fn from(err: &HandshakeError) -> Self {
        match err {
            HandshakeError::RetriesExhausted { .. } | HandshakeError::TimedOut { .. } => FailureReason::Timeout,
            _ => FailureReason::AuthFailed,
        }
    }
}

/// Table-full and admission rejections are resource exhaustion; a request
/// that cannot be encoded is refused the same way.
impl From<&CoapError> for FailureReason {
    fn from(_: &CoapError) -> Self {
        FailureReason::RejectedByAdmission
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEvent {
    /// A pending request was answered.
    Response {
        handle: TransactionHandle,
        peer: LinkAddr,
        response: CoapMessage,
    },
    /// A pending request ended without an answer.
    RequestFailed {
        handle: TransactionHandle,
        peer: LinkAddr,
        reason: FailureReason,
    },
    NeighborStateChanged {
        neighbor: LinkAddr,
        from: TrustState,
        to: TrustState,
    },
    NeighborRemoved {
        neighbor: LinkAddr,
    },
    HandshakeFailed {
        neighbor: LinkAddr,
        reason: FailureReason,
    },
    /// A group key was generated, restored or received.
    GroupKeyInstalled {
        index: u8,
    },
    ParentChanged {
        parent: Option<LinkAddr>,
        rank: u16,
    },
    Route(RouteChange),
    ReassemblyFailed {
        peer: LinkAddr,
        tag: u16,
        error: ReassemblyError,
    },
    AdmissionChanged(BandChange),
}

impl From<TransactionOutcome> for StackEvent {
    fn from(outcome: TransactionOutcome) -> Self {
        match outcome {
            TransactionOutcome::Response {
                handle,
                peer,
                response,
            } => StackEvent::Response {
                handle,
                peer,
                response,
            },
            TransactionOutcome::Failed { handle, peer, reason } => StackEvent::RequestFailed {
                handle,
                peer,
                reason: reason.into(),
            },
        }
    }
}

impl StackEvent {
    /// The transaction this event settles, if any.
    pub fn transaction(&self) -> Option<TransactionHandle> {
        match self {
            StackEvent::Response { handle, .. } | StackEvent::RequestFailed { handle, .. } => Some(*handle),
            _ => None,
        }
    }
}
