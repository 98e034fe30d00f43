//! EAPOL-style 4-way handshake.
//!
//! Pairwise keys are derived from a shared PMK and both nonces; the group key
//! travels in message 3 wrapped under the fresh KEK.

pub mod constants;
pub mod frame;
pub mod keys;
pub mod state;
pub mod timing;

pub use frame::{EapolKeyFrame, GroupKeyData, KeyMessage};
pub use keys::{FrameCounter, GroupKey, PairwiseKeySet, Ptk};
pub use state::{
    HandshakeRole, HandshakeSession, HandshakeState, HandshakeStep, SessionConfig, TimerOutcome,
};
pub use timing::{RetryPolicy, TimingProfile};
