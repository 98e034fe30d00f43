//! HMAC-SHA256 message integrity codes.
//!
//! EAPOL-Key frames carry a 16-byte MIC and secured MAC frames an 8-byte
//! MIC; both are left-truncated HMAC-SHA256 tags. Verification is constant
//! time (delegated to the `hmac` crate).

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Compute the full HMAC-SHA256 of `data` using `key`.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    // SAFETY: HMAC accepts keys of any length, new_from_slice cannot fail.
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC-SHA256 accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Compute a MIC of `out.len()` bytes (at most 32) over the concatenation of `parts`.
pub fn compute_mic(key: &[u8], parts: &[&[u8]], out: &mut [u8]) -> Result<(), CryptoError> {
    if out.is_empty() || out.len() > 32 {
        return Err(CryptoError::OutputLength {
            requested: out.len(),
            max: 32,
        });
    }
    // SAFETY: HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC-SHA256 accepts keys of any length");
    for part in parts {
        mac.update(part);
    }
    let tag = mac.finalize().into_bytes();
    out.copy_from_slice(&tag[..out.len()]);
    Ok(())
}

/// Verify a left-truncated MIC over the concatenation of `parts`.
pub fn verify_mic(key: &[u8], parts: &[&[u8]], expected: &[u8]) -> Result<(), CryptoError> {
    if expected.is_empty() || expected.len() > 32 {
        return Err(CryptoError::MicMismatch);
    }
    // SAFETY: HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC-SHA256 accepts keys of any length");
    for part in parts {
        mac.update(part);
    }
    mac.verify_truncated_left(expected)
        .map_err(|_| CryptoError::MicMismatch)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn mic_verify_roundtrip(
            key in proptest::collection::vec(any::<u8>(), 1..64),
            data in proptest::collection::vec(any::<u8>(), 0..512),
            len in 1usize..=32,
        ) {
            let mut mic = vec![0u8; len];
            compute_mic(&key, &[&data], &mut mic).unwrap();
            prop_assert!(verify_mic(&key, &[&data], &mic).is_ok());
        }
    }
}
