//! Core types, constants, and wire formats for the lowmesh stack.
//!
//! This crate defines link addressing, the monotonic time base, the MAC
//! frame codec, 6LoWPAN-style dispatch and fragment headers, and the mesh
//! datagram header shared by every layer above.

pub mod constants;
pub mod error;
pub mod frame;
pub mod time;
pub mod types;

pub use error::FrameError;
pub use frame::datagram::{Datagram, DatagramHeader};
pub use frame::dispatch::{Dispatch, FragmentHeader};
pub use frame::mac::{FrameType, MacFrame, SecurityHeader};
pub use time::Timestamp;
pub use types::{Channel, InvalidAddress, LinkAddr, PanId, ShortAddr};
