//! Group key wrapping with AES-128-CBC.
//!
//! The group key travels inside EAPOL message 3 encrypted under the
//! pairwise KEK. The plaintext is PKCS7-padded and the IV is carried
//! alongside the ciphertext by the caller.

use aes::Aes128;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::CryptoError;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

const BLOCK: usize = 16;

fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad_len = BLOCK - (data.len() % BLOCK);
    let mut out = Vec::with_capacity(data.len() + pad_len);
    out.extend_from_slice(data);
    out.resize(data.len() + pad_len, pad_len as u8);
    out
}

fn pkcs7_unpad(data: &[u8]) -> Result<&[u8], CryptoError> {
    let pad_len = *data.last().ok_or(CryptoError::BadPadding)? as usize;
    if pad_len == 0 || pad_len > BLOCK || pad_len > data.len() {
        return Err(CryptoError::BadPadding);
    }
    let (body, padding) = data.split_at(data.len() - pad_len);
    if padding.iter().any(|&b| b as usize != pad_len) {
        return Err(CryptoError::BadPadding);
    }
    Ok(body)
}

/// Encrypt `key` under `kek` with the given `iv`.
#[must_use]
pub fn wrap_key(kek: &[u8; 16], iv: &[u8; 16], key: &[u8]) -> Vec<u8> {
    let padded = pkcs7_pad(key);
    let mut out = vec![0u8; padded.len()];
    // SAFETY: the output buffer is block aligned and as long as the padded input.
    Aes128CbcEnc::new(kek.into(), iv.into())
        .encrypt_padded_b2b_mut::<NoPadding>(&padded, &mut out)
        .expect("output buffer is block aligned and same size as padded input");
    out
}

/// Decrypt a wrapped key.
///
/// # Errors
///
/// [`CryptoError::KeyUnwrap`] for a ciphertext that is empty or not block
/// aligned, [`CryptoError::BadPadding`] when the decrypted padding is
/// malformed (the usual symptom of a wrong KEK).
pub fn unwrap_key(kek: &[u8; 16], iv: &[u8; 16], wrapped: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if wrapped.is_empty() || !wrapped.len().is_multiple_of(BLOCK) {
        return Err(CryptoError::KeyUnwrap);
    }
    let mut buf = wrapped.to_vec();
    let plain = Aes128CbcDec::new(kek.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| CryptoError::KeyUnwrap)?;
    Ok(pkcs7_unpad(plain)?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_unwrap_group_key() {
        let kek = [0x42; 16];
        let iv = [0x07; 16];
        let gtk = [0xA5; 16];
        let wrapped = wrap_key(&kek, &iv, &gtk);
        // 16 bytes of key plus a full padding block.
        assert_eq!(wrapped.len(), 32);
        assert_eq!(unwrap_key(&kek, &iv, &wrapped).unwrap(), gtk);
    }

    #[test]
    fn test_unwrap_rejects_unaligned() {
        assert_eq!(
            unwrap_key(&[0; 16], &[0; 16], &[1, 2, 3]),
            Err(CryptoError::KeyUnwrap)
        );
        assert_eq!(
            unwrap_key(&[0; 16], &[0; 16], &[]),
            Err(CryptoError::KeyUnwrap)
        );
    }

    #[test]
    fn test_unwrap_with_wrong_kek_fails_or_differs() {
        let wrapped = wrap_key(&[0x01; 16], &[0; 16], &[0x33; 16]);
        match unwrap_key(&[0x02; 16], &[0; 16], &wrapped) {
            Err(_) => {}
            Ok(plain) => assert_ne!(plain, vec![0x33; 16]),
        }
    }

    #[test]
    fn test_pkcs7_unpad_rejects_inconsistent_padding() {
        let mut block = [0x04u8; 16];
        block[13] = 0x03;
        assert_eq!(pkcs7_unpad(&block), Err(CryptoError::BadPadding));
    }
}
