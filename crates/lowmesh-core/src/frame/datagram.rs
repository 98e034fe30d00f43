//! Mesh datagram header.
//!
//! ```text
//! version(1) | traffic_class(1) | hop_limit(1) | next_header(1) | src(8) | dst(8) | payload
//! ```
//!
//! The datagram is the unit the fragmentation engine splits and reassembles.

use crate::constants::{DATAGRAM_HEADER_LEN, DATAGRAM_VERSION, DEFAULT_HOP_LIMIT, MAX_DATAGRAM_SIZE};
use crate::error::FrameError;
use crate::types::LinkAddr;

const TRAFFIC_CLASS_PRIORITY: u8 = 0x01;

/// Parsed datagram header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramHeader {
    /// Priority traffic is still admitted under high memory pressure.
    pub priority: bool,
    pub hop_limit: u8,
    pub next_header: u8,
    pub src: LinkAddr,
    pub dst: LinkAddr,
}

impl DatagramHeader {
    pub fn new(src: LinkAddr, dst: LinkAddr, next_header: u8, priority: bool) -> Self {
        Self {
            priority,
            hop_limit: DEFAULT_HOP_LIMIT,
            next_header,
            src,
            dst,
        }
    }

    /// Parse only the header, e.g. from the first fragment of a datagram.
    pub fn parse(raw: &[u8]) -> Result<Self, FrameError> {
        if raw.len() < DATAGRAM_HEADER_LEN {
            return Err(FrameError::TooShort {
                min: DATAGRAM_HEADER_LEN,
                actual: raw.len(),
            });
        }
        if raw[0] != DATAGRAM_VERSION {
            return Err(FrameError::InvalidVersion(raw[0]));
        }
        // SAFETY: length checked above, both slices are 8 bytes.
        let src = LinkAddr::new(raw[4..12].try_into().expect("slice is exactly 8 bytes"));
        let dst = LinkAddr::new(raw[12..20].try_into().expect("slice is exactly 8 bytes"));
        Ok(Self {
            priority: raw[1] & TRAFFIC_CLASS_PRIORITY != 0,
            hop_limit: raw[2],
            next_header: raw[3],
            src,
            dst,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(DATAGRAM_VERSION);
        out.push(if self.priority { TRAFFIC_CLASS_PRIORITY } else { 0 });
        out.push(self.hop_limit);
        out.push(self.next_header);
        out.extend_from_slice(self.src.as_ref());
        out.extend_from_slice(self.dst.as_ref());
    }
}

/// A complete mesh datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub header: DatagramHeader,
    pub payload: Vec<u8>,
}

impl Datagram {
    pub fn parse(raw: &[u8]) -> Result<Self, FrameError> {
        let header = DatagramHeader::parse(raw)?;
        Ok(Self {
            header,
            payload: raw[DATAGRAM_HEADER_LEN..].to_vec(),
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>, FrameError> {
        let len = DATAGRAM_HEADER_LEN + self.payload.len();
        if len > MAX_DATAGRAM_SIZE {
            return Err(FrameError::TooLarge {
                max: MAX_DATAGRAM_SIZE,
                actual: len,
            });
        }
        let mut out = Vec::with_capacity(len);
        self.header.write_to(&mut out);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }
}
