//! EAPOL-Key frame codec.
//!
//! ```text
//! descriptor(1) | message(1) | key_info(2) | replay_counter(8) | nonce(32) |
//!   key_data_len(2) | key_data | mic(16)
//! ```
//!
//! The MIC covers the whole frame with the MIC field zeroed.

use lowmesh_crypto::CryptoProvider;

use super::constants::{
    DESCRIPTOR_TYPE, EAPOL_FIXED_LEN, EAPOL_MIC_LEN, GTK_LEN, KEY_WRAP_IV_LEN, MAX_GTK_INDEX,
    NONCE_LEN,
};
use crate::error::HandshakeError;

/// Which step of the exchange a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeyMessage {
    /// Supplicant asks the authenticator to restart from message 1.
    Request = 0,
    Msg1 = 1,
    Msg2 = 2,
    Msg3 = 3,
    Msg4 = 4,
}

impl KeyMessage {
    pub fn from_u8(v: u8) -> Result<Self, HandshakeError> {
        match v {
            0 => Ok(Self::Request),
            1 => Ok(Self::Msg1),
            2 => Ok(Self::Msg2),
            3 => Ok(Self::Msg3),
            4 => Ok(Self::Msg4),
            _ => Err(HandshakeError::Malformed("unknown message number")),
        }
    }

    pub fn number(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapolKeyFrame {
    pub message: KeyMessage,
    pub key_info: u16,
    pub replay_counter: u64,
    pub nonce: [u8; NONCE_LEN],
    pub key_data: Vec<u8>,
    pub mic: [u8; EAPOL_MIC_LEN],
}

impl EapolKeyFrame {
    /// A frame with an all-zero MIC.
    pub fn new(
        message: KeyMessage,
        key_info: u16,
        replay_counter: u64,
        nonce: [u8; NONCE_LEN],
        key_data: Vec<u8>,
    ) -> Self {
        Self {
            message,
            key_info,
            replay_counter,
            nonce,
            key_data,
            mic: [0u8; EAPOL_MIC_LEN],
        }
    }

    pub fn parse(raw: &[u8]) -> Result<Self, HandshakeError> {
        if raw.len() < EAPOL_FIXED_LEN + EAPOL_MIC_LEN {
            return Err(HandshakeError::Malformed("frame too short"));
        }
        if raw[0] != DESCRIPTOR_TYPE {
            return Err(HandshakeError::Malformed("unknown descriptor type"));
        }
        let message = KeyMessage::from_u8(raw[1])?;
        let key_info = u16::from_be_bytes([raw[2], raw[3]]);
        // SAFETY: length checked above; the slices have the exact array sizes.
        let replay_counter =
            u64::from_be_bytes(raw[4..12].try_into().expect("slice is exactly 8 bytes"));
        let nonce: [u8; NONCE_LEN] = raw[12..44]
            .try_into()
            .expect("slice is exactly 32 bytes");
        let kd_len = u16::from_be_bytes([raw[44], raw[45]]) as usize;

        if raw.len() != EAPOL_FIXED_LEN + kd_len + EAPOL_MIC_LEN {
            return Err(HandshakeError::Malformed("key data length mismatch"));
        }
        let key_data = raw[EAPOL_FIXED_LEN..EAPOL_FIXED_LEN + kd_len].to_vec();
        let mut mic = [0u8; EAPOL_MIC_LEN];
        mic.copy_from_slice(&raw[EAPOL_FIXED_LEN + kd_len..]);

        Ok(Self {
            message,
            key_info,
            replay_counter,
            nonce,
            key_data,
            mic,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.body();
        out.extend_from_slice(&self.mic);
        out
    }

    /// Everything except the MIC field.
    fn body(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(EAPOL_FIXED_LEN + self.key_data.len() + EAPOL_MIC_LEN);
        out.push(DESCRIPTOR_TYPE);
        out.push(self.message.number());
        out.extend_from_slice(&self.key_info.to_be_bytes());
        out.extend_from_slice(&self.replay_counter.to_be_bytes());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&(self.key_data.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.key_data);
        out
    }

    /// Compute and store the MIC under `kck`.
    pub fn sign(&mut self, crypto: &dyn CryptoProvider, kck: &[u8]) -> Result<(), HandshakeError> {
        let body = self.body();
        let zero = [0u8; EAPOL_MIC_LEN];
        crypto.mic(kck, &[body.as_slice(), zero.as_slice()], &mut self.mic)?;
        Ok(())
    }

    /// Verify the MIC under `kck`.
    pub fn verify(&self, crypto: &dyn CryptoProvider, kck: &[u8]) -> Result<(), HandshakeError> {
        let body = self.body();
        let zero = [0u8; EAPOL_MIC_LEN];
        crypto
            .verify_mic(kck, &[body.as_slice(), zero.as_slice()], &self.mic)
            .map_err(|_| HandshakeError::MicFailure {
                message: self.message.number(),
            })
    }
}

/// Key data carried by message 3.
///
/// Layout: `gtk_index(1) | lifetime_secs(4) | iv(16) | wrapped_gtk`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupKeyData {
    pub index: u8,
    pub lifetime_secs: u32,
    pub iv: [u8; KEY_WRAP_IV_LEN],
    pub wrapped: Vec<u8>,
}

impl GroupKeyData {
    const HEADER_LEN: usize = 1 + 4 + KEY_WRAP_IV_LEN;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::HEADER_LEN + self.wrapped.len());
        out.push(self.index);
        out.extend_from_slice(&self.lifetime_secs.to_be_bytes());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.wrapped);
        out
    }

    pub fn parse(raw: &[u8]) -> Result<Self, HandshakeError> {
        // A wrapped 16-byte key is at least one block beyond the key itself.
        if raw.len() < Self::HEADER_LEN + GTK_LEN {
            return Err(HandshakeError::Malformed("group key data too short"));
        }
        let index = raw[0];
        if index > MAX_GTK_INDEX {
            return Err(HandshakeError::Malformed("group key index out of range"));
        }
        let lifetime_secs = u32::from_be_bytes([raw[1], raw[2], raw[3], raw[4]]);
        let mut iv = [0u8; KEY_WRAP_IV_LEN];
        iv.copy_from_slice(&raw[5..Self::HEADER_LEN]);
        Ok(Self {
            index,
            lifetime_secs,
            iv,
            wrapped: raw[Self::HEADER_LEN..].to_vec(),
        })
    }
}
