use thiserror::Error;

/// Failures surfaced by [`crate::CryptoProvider`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// A MIC did not match the protected bytes, or had the wrong size.
    #[error("message integrity check mismatch")]
    MicMismatch,
    /// The unwrapped group key block ended in malformed padding.
    #[error("wrapped key has bad padding")]
    BadPadding,
    /// The wrapped key could not be decrypted at all.
    #[error("group key unwrap failed")]
    KeyUnwrap,
    #[error("requested {requested} output bytes, at most {max} supported")]
    OutputLength { requested: usize, max: usize },
}
