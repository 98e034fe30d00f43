//! Payload dispatch and 6LoWPAN fragment headers (RFC 4944 layout).
//!
//! ```text
//! FRAG1: 11000 size(11) | tag(16)
//! FRAGN: 11100 size(11) | tag(16) | offset(8, in 8-octet units)
//! ```

use crate::constants::{
    DISPATCH_ADVERTISEMENT, DISPATCH_DATAGRAM, DISPATCH_EAPOL, DISPATCH_FRAG_MASK,
    DISPATCH_FRAG1, DISPATCH_FRAGN, FRAG_OFFSET_UNIT, FRAG1_HEADER_LEN, FRAGN_HEADER_LEN,
    MAX_DATAGRAM_SIZE,
};
use crate::error::FrameError;

/// Header of one fragment of a larger datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentHeader {
    First { size: u16, tag: u16 },
    Subsequent { size: u16, tag: u16, offset_units: u8 },
}

impl FragmentHeader {
    pub fn size(&self) -> u16 {
        match *self {
            FragmentHeader::First { size, .. } | FragmentHeader::Subsequent { size, .. } => size,
        }
    }

    pub fn tag(&self) -> u16 {
        match *self {
            FragmentHeader::First { tag, .. } | FragmentHeader::Subsequent { tag, .. } => tag,
        }
    }

    /// Byte offset of this fragment's data within the datagram.
    pub fn offset(&self) -> usize {
        match *self {
            FragmentHeader::First { .. } => 0,
            FragmentHeader::Subsequent { offset_units, .. } => {
                offset_units as usize * FRAG_OFFSET_UNIT
            }
        }
    }

    pub fn header_len(&self) -> usize {
        match self {
            FragmentHeader::First { .. } => FRAG1_HEADER_LEN,
            FragmentHeader::Subsequent { .. } => FRAGN_HEADER_LEN,
        }
    }

    /// Append the encoded header to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let (dispatch, size, tag) = match *self {
            FragmentHeader::First { size, tag } => (DISPATCH_FRAG1, size, tag),
            FragmentHeader::Subsequent { size, tag, .. } => (DISPATCH_FRAGN, size, tag),
        };
        let size = size & 0x07FF;
        out.push(dispatch | (size >> 8) as u8);
        out.push(size as u8);
        out.extend_from_slice(&tag.to_be_bytes());
        if let FragmentHeader::Subsequent { offset_units, .. } = *self {
            out.push(offset_units);
        }
    }
}

/// A frame payload classified by its first byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch<'a> {
    Eapol(&'a [u8]),
    Advertisement(&'a [u8]),
    Datagram(&'a [u8]),
    Fragment {
        header: FragmentHeader,
        data: &'a [u8],
    },
}

impl<'a> Dispatch<'a> {
    /// Classify a MAC payload.
    pub fn parse(payload: &'a [u8]) -> Result<Self, FrameError> {
        let first = *payload.first().ok_or(FrameError::TooShort { min: 1, actual: 0 })?;
        match first {
            DISPATCH_EAPOL => Ok(Dispatch::Eapol(&payload[1..])),
            DISPATCH_ADVERTISEMENT => Ok(Dispatch::Advertisement(&payload[1..])),
            DISPATCH_DATAGRAM => Ok(Dispatch::Datagram(&payload[1..])),
            b if b & DISPATCH_FRAG_MASK == DISPATCH_FRAG1 => {
                let header = parse_fragment_header(payload, FRAG1_HEADER_LEN)?;
                Ok(Dispatch::Fragment {
                    header,
                    data: &payload[FRAG1_HEADER_LEN..],
                })
            }
            b if b & DISPATCH_FRAG_MASK == DISPATCH_FRAGN => {
                let header = parse_fragment_header(payload, FRAGN_HEADER_LEN)?;
                Ok(Dispatch::Fragment {
                    header,
                    data: &payload[FRAGN_HEADER_LEN..],
                })
            }
            other => Err(FrameError::InvalidDispatch(other)),
        }
    }
}

fn parse_fragment_header(payload: &[u8], len: usize) -> Result<FragmentHeader, FrameError> {
    if payload.len() < len {
        return Err(FrameError::TooShort {
            min: len,
            actual: payload.len(),
        });
    }
    let size = (u16::from(payload[0] & !DISPATCH_FRAG_MASK) << 8) | u16::from(payload[1]);
    if size == 0 || size as usize > MAX_DATAGRAM_SIZE {
        return Err(FrameError::InvalidFragmentSize(size));
    }
    let tag = u16::from_be_bytes([payload[2], payload[3]]);
    if len == FRAG1_HEADER_LEN {
        Ok(FragmentHeader::First { size, tag })
    } else {
        Ok(FragmentHeader::Subsequent {
            size,
            tag,
            offset_units: payload[4],
        })
    }
}

/// Prefix `body` with a single dispatch byte.
pub fn with_dispatch(dispatch: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(dispatch);
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frag1_encoding() {
        let mut out = Vec::new();
        FragmentHeader::First {
            size: 0x0278,
            tag: 0xBEEF,
        }
        .write_to(&mut out);
        assert_eq!(out, vec![0xC2, 0x78, 0xBE, 0xEF]);
    }

    #[test]
    fn test_fragn_encoding_and_parse() {
        let header = FragmentHeader::Subsequent {
            size: 632,
            tag: 7,
            offset_units: 31,
        };
        let mut payload = Vec::new();
        header.write_to(&mut payload);
        payload.extend_from_slice(&[0xAA; 8]);

        match Dispatch::parse(&payload).unwrap() {
            Dispatch::Fragment { header: h, data } => {
                assert_eq!(h, header);
                assert_eq!(h.offset(), 248);
                assert_eq!(h.header_len(), 5);
                assert_eq!(data, &[0xAA; 8]);
            }
            other => panic!("expected fragment, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_simple_dispatches() {
        assert_eq!(
            Dispatch::parse(&[DISPATCH_EAPOL, 1, 2]).unwrap(),
            Dispatch::Eapol(&[1, 2])
        );
        assert_eq!(
            Dispatch::parse(&[DISPATCH_ADVERTISEMENT]).unwrap(),
            Dispatch::Advertisement(&[])
        );
        assert_eq!(
            Dispatch::parse(&with_dispatch(DISPATCH_DATAGRAM, &[9])).unwrap(),
            Dispatch::Datagram(&[9])
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_empty() {
        assert_eq!(Dispatch::parse(&[0x7F]), Err(FrameError::InvalidDispatch(0x7F)));
        assert!(matches!(
            Dispatch::parse(&[]),
            Err(FrameError::TooShort { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_zero_size_fragment() {
        assert_eq!(
            Dispatch::parse(&[0xC0, 0x00, 0x00, 0x01]),
            Err(FrameError::InvalidFragmentSize(0))
        );
    }

    #[test]
    fn test_parse_truncated_fragn() {
        assert!(matches!(
            Dispatch::parse(&[0xE0, 0x10, 0x00, 0x01]),
            Err(FrameError::TooShort { min: 5, actual: 4 })
        ));
    }
}
