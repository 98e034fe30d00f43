//! Wire formats carried over the radio.
//!
//! A radio frame is a [`mac::MacFrame`] whose payload starts with a
//! [`dispatch::Dispatch`] byte selecting EAPOL, MLE advertisement, a whole
//! mesh datagram, or one fragment of a larger datagram.

pub mod datagram;
pub mod dispatch;
pub mod mac;
