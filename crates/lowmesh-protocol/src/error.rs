//! Protocol error types.
//!
//! These errors cover the protocol-layer failures: admission rejection, the
//! key handshake, installed key use and CoAP messaging.

use lowmesh_crypto::CryptoError;

use crate::admission::{AdmissionMode, StateKind, TrafficClass};

/// A new piece of state (or an inbound packet) was refused under pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("admission rejected {kind:?} for {class:?} traffic in {mode:?} mode")]
pub struct AdmissionRejected {
    pub mode: AdmissionMode,
    pub class: TrafficClass,
    pub kind: StateKind,
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("MIC verification failed on message {message}")]
    MicFailure { message: u8 },

    #[error("unexpected message {message} in state {state}")]
    UnexpectedMessage { message: u8, state: &'static str },

    #[error("stale replay counter {counter} (last {last})")]
    StaleReplayCounter { counter: u64, last: u64 },

    #[error("nonce mismatch on message {message}")]
    NonceMismatch { message: u8 },

    #[error("malformed EAPOL-Key frame: {0}")]
    Malformed(&'static str),

    #[error("no response after {attempts} attempts")]
    RetriesExhausted { attempts: u8 },

    #[error("no response while {state}")]
    TimedOut { state: &'static str },

    #[error("group key unwrap failed")]
    KeyUnwrap,

    #[error("no group key to distribute")]
    NoGroupKey,

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl HandshakeError {
    /// Whether this error aborts the handshake (as opposed to a frame that is
    /// simply ignored).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MicFailure { .. }
                | Self::RetriesExhausted { .. }
                | Self::TimedOut { .. }
                | Self::KeyUnwrap
                | Self::NoGroupKey
                | Self::NonceMismatch { .. }
                | Self::Crypto(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("key expired")]
    Expired,

    #[error("replayed frame counter {counter} (expected at least {expected})")]
    Replayed { counter: u32, expected: u32 },

    #[error("frame counter exhausted")]
    CounterExhausted,
}

#[derive(Debug, thiserror::Error)]
pub enum CoapError {
    #[error("malformed CoAP message: {0}")]
    Malformed(&'static str),

    #[error("unsupported CoAP version {0}")]
    UnsupportedVersion(u8),

    #[error("token too long: {0} bytes")]
    TokenTooLong(usize),

    #[error("transaction table full ({max} pending)")]
    TableFull { max: usize },

    #[error(transparent)]
    Admission(#[from] AdmissionRejected),
}
