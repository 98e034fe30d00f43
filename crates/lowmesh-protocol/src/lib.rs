//! Protocol state machines for the lowmesh stack.
//!
//! Everything here is sans-IO: callers feed frames and the current
//! [`Timestamp`](lowmesh_core::Timestamp) in and get bytes to transmit and
//! outcomes back. Nothing in this crate owns a clock, a socket or a task.
//!
//! - [`admission`]: heap-pressure banding that gates new state.
//! - [`eapol`]: the 4-way key handshake and the key material it installs.
//! - [`coap`]: CoAP codec, client transactions and server-side deduplication.

pub mod admission;
pub mod coap;
pub mod eapol;
pub mod error;

pub use admission::{AdmissionConfig, AdmissionMode, BandChange, MemoryMonitor, StateKind, TrafficClass};
pub use error::{AdmissionRejected, CoapError, HandshakeError, KeyError};
