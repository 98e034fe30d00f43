//! The opaque crypto service consumed by the handshake and frame security.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::CryptoError;

/// Key derivation, MIC, key wrapping and randomness as an opaque service.
///
/// Implementations may be backed by a hardware accelerator or secure element;
/// callers only rely on the contract documented on each method.
pub trait CryptoProvider: Send {
    /// Fill `out` with key material derived from `key`, `label` and `data`.
    fn derive(&self, key: &[u8], label: &[u8], data: &[u8], out: &mut [u8])
    -> Result<(), CryptoError>;

    /// Compute a MIC of `out.len()` bytes over the concatenated `parts`.
    fn mic(&self, key: &[u8], parts: &[&[u8]], out: &mut [u8]) -> Result<(), CryptoError>;

    /// Verify a MIC over the concatenated `parts` in constant time.
    fn verify_mic(&self, key: &[u8], parts: &[&[u8]], mic: &[u8]) -> Result<(), CryptoError>;

    /// Encrypt `key` under `kek`.
    fn wrap_key(&self, kek: &[u8; 16], iv: &[u8; 16], key: &[u8]) -> Vec<u8>;

    /// Decrypt a key produced by [`CryptoProvider::wrap_key`].
    fn unwrap_key(&self, kek: &[u8; 16], iv: &[u8; 16], wrapped: &[u8])
    -> Result<Vec<u8>, CryptoError>;

    /// Fill `out` with random bytes (nonces, IVs, group keys).
    fn fill_random(&mut self, out: &mut [u8]);
}

/// Software implementation on top of the RustCrypto crates.
pub struct SoftwareCrypto {
    rng: StdRng,
}

impl SoftwareCrypto {
    /// Seeded from the operating system RNG.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic randomness, for reproducible tests and simulations.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for SoftwareCrypto {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoProvider for SoftwareCrypto {
    fn derive(
        &self,
        key: &[u8],
        label: &[u8],
        data: &[u8],
        out: &mut [u8],
    ) -> Result<(), CryptoError> {
        crate::prf::prf_sha256(key, label, data, out)
    }

    fn mic(&self, key: &[u8], parts: &[&[u8]], out: &mut [u8]) -> Result<(), CryptoError> {
        crate::mic::compute_mic(key, parts, out)
    }

    fn verify_mic(&self, key: &[u8], parts: &[&[u8]], mic: &[u8]) -> Result<(), CryptoError> {
        crate::mic::verify_mic(key, parts, mic)
    }

    fn wrap_key(&self, kek: &[u8; 16], iv: &[u8; 16], key: &[u8]) -> Vec<u8> {
        crate::keywrap::wrap_key(kek, iv, key)
    }

    fn unwrap_key(
        &self,
        kek: &[u8; 16],
        iv: &[u8; 16],
        wrapped: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        crate::keywrap::unwrap_key(kek, iv, wrapped)
    }

    fn fill_random(&mut self, out: &mut [u8]) {
        self.rng.fill_bytes(out);
    }
}
