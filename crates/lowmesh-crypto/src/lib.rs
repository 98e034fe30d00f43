//! Crypto boundary for the lowmesh stack.
//!
//! The security handshake and the link-layer frame protection never touch
//! block-cipher or hash internals. They go through [`CryptoProvider`], whose
//! default [`SoftwareCrypto`] implementation delegates to the RustCrypto
//! `hmac`, `sha2`, `aes` and `cbc` crates.

pub mod error;
pub mod keywrap;
pub mod mic;
pub mod prf;
pub mod provider;

pub use error::CryptoError;
pub use provider::{CryptoProvider, SoftwareCrypto};
