//! Pseudo-random function used for pairwise key expansion.
//!
//! Follows the IEEE 802.11i PRF construction, with HMAC-SHA256 in place of
//! HMAC-SHA1:
//!
//! ```text
//! R = HMAC(K, label || 0x00 || data || i)   for i = 0, 1, 2, ...
//! PRF(K, label, data, len) = first `len` bytes of R(0) || R(1) || ...
//! ```
//!
//! The counter is a single byte, so at most 256 blocks (8192 bytes) can be
//! produced.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::CryptoError;

type HmacSha256 = Hmac<Sha256>;

const BLOCK_LEN: usize = 32;

/// Largest output the single-byte counter can produce.
pub const PRF_MAX_OUTPUT: usize = BLOCK_LEN * 256;

/// Fill `out` with PRF output for `key`, `label` and `data`.
pub fn prf_sha256(key: &[u8], label: &[u8], data: &[u8], out: &mut [u8]) -> Result<(), CryptoError> {
    if out.len() > PRF_MAX_OUTPUT {
        return Err(CryptoError::OutputLength {
            requested: out.len(),
            max: PRF_MAX_OUTPUT,
        });
    }

    for (i, chunk) in out.chunks_mut(BLOCK_LEN).enumerate() {
        // SAFETY: HMAC accepts keys of any length.
        let mut mac =
            HmacSha256::new_from_slice(key).expect("HMAC-SHA256 accepts keys of any length");
        mac.update(label);
        mac.update(&[0x00]);
        mac.update(data);
        mac.update(&[i as u8]);
        let block = mac.finalize().into_bytes();
        chunk.copy_from_slice(&block[..chunk.len()]);
    }
    Ok(())
}

/// Build the ordered key-expansion seed `min(a1,a2) || max(a1,a2) || min(n1,n2) || max(n1,n2)`.
///
/// Ordering makes both peers derive the same bytes regardless of which side
/// is the authenticator.
pub fn expansion_seed(addr_a: &[u8], addr_b: &[u8], nonce_a: &[u8], nonce_b: &[u8]) -> Vec<u8> {
    let (lo_addr, hi_addr) = if addr_a <= addr_b {
        (addr_a, addr_b)
    } else {
        (addr_b, addr_a)
    };
    let (lo_nonce, hi_nonce) = if nonce_a <= nonce_b {
        (nonce_a, nonce_b)
    } else {
        (nonce_b, nonce_a)
    };
    let mut seed =
        Vec::with_capacity(addr_a.len() + addr_b.len() + nonce_a.len() + nonce_b.len());
    seed.extend_from_slice(lo_addr);
    seed.extend_from_slice(hi_addr);
    seed.extend_from_slice(lo_nonce);
    seed.extend_from_slice(hi_nonce);
    seed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prf_is_deterministic() {
        let mut a = [0u8; 48];
        let mut b = [0u8; 48];
        prf_sha256(&[7; 32], b"Pairwise key expansion", b"seed", &mut a).unwrap();
        prf_sha256(&[7; 32], b"Pairwise key expansion", b"seed", &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_prf_prefix_stable_across_lengths() {
        let mut short = [0u8; 16];
        let mut long = [0u8; 80];
        prf_sha256(&[1; 32], b"label", b"data", &mut short).unwrap();
        prf_sha256(&[1; 32], b"label", b"data", &mut long).unwrap();
        assert_eq!(&long[..16], &short[..]);
    }

    #[test]
    fn test_prf_label_separates_outputs() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        prf_sha256(&[1; 32], b"label-a", b"data", &mut a).unwrap();
        prf_sha256(&[1; 32], b"label-b", b"data", &mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_prf_rejects_oversized_output() {
        let mut out = vec![0u8; PRF_MAX_OUTPUT + 1];
        assert!(prf_sha256(&[1; 32], b"l", b"d", &mut out).is_err());
    }

    #[test]
    fn test_expansion_seed_is_symmetric() {
        let s1 = expansion_seed(&[1; 8], &[2; 8], &[9; 32], &[3; 32]);
        let s2 = expansion_seed(&[2; 8], &[1; 8], &[3; 32], &[9; 32]);
        assert_eq!(s1, s2);
        assert_eq!(&s1[..8], &[1; 8]);
        assert_eq!(&s1[16..48], &[3; 32]);
    }
}
