//! Newtype wrappers for link addressing.
//!
//! These keep EUI-64 addresses, short addresses, PAN identifiers and radio
//! channels from being mixed up even though they share primitive
//! representations.

use core::fmt;
use core::str::FromStr;

use crate::constants::LINK_ADDR_LEN;

fn fmt_hex(bytes: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for byte in bytes {
        write!(f, "{:02x}", byte)?;
    }
    Ok(())
}

/// Error returned when bytes or text do not form a valid address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidAddress {
    pub reason: &'static str,
}

impl fmt::Display for InvalidAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid address: {}", self.reason)
    }
}

impl std::error::Error for InvalidAddress {}

/// An EUI-64 link-layer address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[must_use]
pub struct LinkAddr(pub(crate) [u8; LINK_ADDR_LEN]);

impl LinkAddr {
    /// The all-ones broadcast address.
    pub const BROADCAST: LinkAddr = LinkAddr([0xFF; LINK_ADDR_LEN]);

    pub const fn new(bytes: [u8; LINK_ADDR_LEN]) -> Self {
        Self(bytes)
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub const fn to_bytes(self) -> [u8; LINK_ADDR_LEN] {
        self.0
    }
}

impl AsRef<[u8]> for LinkAddr {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for LinkAddr {
    type Error = InvalidAddress;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; LINK_ADDR_LEN] = bytes.try_into().map_err(|_| InvalidAddress {
            reason: "EUI-64 must be 8 bytes",
        })?;
        Ok(Self(arr))
    }
}

/// Parses 16 hex digits, optionally separated by `:` or `-`.
impl FromStr for LinkAddr {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: Vec<u8> = s
            .bytes()
            .filter(|b| *b != b':' && *b != b'-')
            .collect();
        if digits.len() != LINK_ADDR_LEN * 2 {
            return Err(InvalidAddress {
                reason: "expected 16 hex digits",
            });
        }
        let nibble = |c: u8| -> Result<u8, InvalidAddress> {
            match c {
                b'0'..=b'9' => Ok(c - b'0'),
                b'a'..=b'f' => Ok(c - b'a' + 10),
                b'A'..=b'F' => Ok(c - b'A' + 10),
                _ => Err(InvalidAddress {
                    reason: "non-hex character",
                }),
            }
        };
        let mut out = [0u8; LINK_ADDR_LEN];
        for (i, pair) in digits.chunks_exact(2).enumerate() {
            out[i] = (nibble(pair[0])? << 4) | nibble(pair[1])?;
        }
        Ok(Self(out))
    }
}

impl fmt::Display for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_hex(&self.0, f)
    }
}

impl fmt::Debug for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkAddr(")?;
        fmt_hex(&self.0, f)?;
        write!(f, ")")
    }
}

/// A 16-bit short address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShortAddr(pub u16);

impl ShortAddr {
    /// Default short address: the two low-order bytes of the EUI-64.
    pub fn from_link_addr(addr: &LinkAddr) -> Self {
        Self(u16::from_be_bytes([addr.0[6], addr.0[7]]))
    }
}

impl fmt::Display for ShortAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// A PAN identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PanId(pub u16);

/// A radio channel index within the regulatory channel plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Channel(pub u8);

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_addr_parse_plain_hex() {
        let addr: LinkAddr = "0011223344556677".parse().unwrap();
        assert_eq!(addr.to_bytes(), [0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]);
        assert_eq!(addr.to_string(), "0011223344556677");
    }

    #[test]
    fn test_link_addr_parse_with_separators() {
        let addr: LinkAddr = "02:00:5e:10:00:00:00:01".parse().unwrap();
        assert_eq!(addr, LinkAddr::new([0x02, 0x00, 0x5e, 0x10, 0, 0, 0, 1]));
    }

    #[test]
    fn test_link_addr_parse_rejects_bad_input() {
        assert!("0011".parse::<LinkAddr>().is_err());
        assert!("zz11223344556677".parse::<LinkAddr>().is_err());
    }

    #[test]
    fn test_link_addr_try_from_slice() {
        assert!(LinkAddr::try_from(&[1u8; 8][..]).is_ok());
        assert!(LinkAddr::try_from(&[1u8; 7][..]).is_err());
    }

    #[test]
    fn test_broadcast() {
        assert!(LinkAddr::BROADCAST.is_broadcast());
        assert!(!LinkAddr::new([0; 8]).is_broadcast());
    }

    #[test]
    fn test_short_addr_from_link_addr() {
        let addr = LinkAddr::new([0, 0, 0, 0, 0, 0, 0xBE, 0xEF]);
        assert_eq!(ShortAddr::from_link_addr(&addr), ShortAddr(0xBEEF));
        assert_eq!(ShortAddr(0xBEEF).to_string(), "0xbeef");
    }

    #[test]
    fn test_link_addr_ordering_is_bytewise() {
        let lo = LinkAddr::new([0, 0, 0, 0, 0, 0, 0, 1]);
        let hi = LinkAddr::new([0, 0, 0, 0, 0, 0, 1, 0]);
        assert!(lo < hi);
    }
}
