//! Wire-level constants.

/// Length of an EUI-64 link-layer address.
pub const LINK_ADDR_LEN: usize = 8;

/// MAC header: frame_control(1) + seq(1) + pan_id(2) + dst(8) + src(8).
pub const MAC_HEADER_LEN: usize = 20;

/// Auxiliary security header: key_id(1) + frame_counter(4).
pub const SECURITY_HEADER_LEN: usize = 5;

/// Truncated MIC appended to secured MAC frames.
pub const MAC_MIC_LEN: usize = 8;

/// Key id used for frames protected with the pairwise temporal key.
pub const KEY_ID_PAIRWISE: u8 = 0;

/// Largest PSDU the PHY carries (802.15.4g).
pub const MAX_FRAME_SIZE: usize = 2047;

/// Largest datagram the 11-bit fragment size field can describe.
pub const MAX_DATAGRAM_SIZE: usize = 2047;

// ---- Dispatch values (first payload byte) ----

/// EAPOL-Key frame.
pub const DISPATCH_EAPOL: u8 = 0x01;

/// MLE advertisement.
pub const DISPATCH_ADVERTISEMENT: u8 = 0x02;

/// Unfragmented mesh datagram.
pub const DISPATCH_DATAGRAM: u8 = 0x41;

/// First fragment (`11000xxx`).
pub const DISPATCH_FRAG1: u8 = 0xC0;

/// Subsequent fragment (`11100xxx`).
pub const DISPATCH_FRAGN: u8 = 0xE0;

/// Mask selecting the 5 dispatch bits of a fragment header.
pub const DISPATCH_FRAG_MASK: u8 = 0xF8;

/// FRAG1 header: dispatch/size(2) + tag(2).
pub const FRAG1_HEADER_LEN: usize = 4;

/// FRAGN header: dispatch/size(2) + tag(2) + offset(1).
pub const FRAGN_HEADER_LEN: usize = 5;

/// Fragment offsets are expressed in units of 8 octets.
pub const FRAG_OFFSET_UNIT: usize = 8;

// ---- Mesh datagram header ----

/// Mesh datagram header: version, traffic class, hop limit, next header, src(8), dst(8).
pub const DATAGRAM_HEADER_LEN: usize = 20;

/// Current datagram header version.
pub const DATAGRAM_VERSION: u8 = 1;

/// Next-header value for CoAP payloads.
pub const NEXT_HEADER_COAP: u8 = 0x10;

/// Hop limit for locally originated datagrams.
pub const DEFAULT_HOP_LIMIT: u8 = 16;
