//! MAC frame parsing and serialization.
//!
//! ```text
//! frame_control(1) | seq(1) | pan_id(2) | dst(8) | src(8)
//!   [ key_id(1) | frame_counter(4) ]   present when the security bit is set
//!   payload
//!   [ mic(8) ]                         present when the security bit is set
//! ```

use crate::constants::{MAC_HEADER_LEN, MAC_MIC_LEN, MAX_FRAME_SIZE, SECURITY_HEADER_LEN};
use crate::error::FrameError;
use crate::types::{LinkAddr, PanId};

const FRAME_TYPE_MASK: u8 = 0x07;
const SECURITY_BIT: u8 = 0x08;
const BROADCAST_BIT: u8 = 0x10;

/// MAC frame type (low three bits of frame control).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Unicast or broadcast data (EAPOL, datagrams, fragments).
    Data = 1,
    /// Periodic MLE advertisement.
    Advertisement = 2,
}

impl FrameType {
    pub fn from_bits(bits: u8) -> Result<Self, FrameError> {
        match bits {
            1 => Ok(FrameType::Data),
            2 => Ok(FrameType::Advertisement),
            other => Err(FrameError::InvalidFrameType(other)),
        }
    }
}

/// Auxiliary security header of a protected frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityHeader {
    /// 0 for the pairwise key, `gtk_index + 1` for a group key.
    pub key_id: u8,
    pub frame_counter: u32,
}

/// A parsed MAC frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacFrame {
    pub frame_type: FrameType,
    pub seq: u8,
    pub pan_id: PanId,
    pub dst: LinkAddr,
    pub src: LinkAddr,
    pub security: Option<SecurityHeader>,
    pub payload: Vec<u8>,
    pub mic: Option<[u8; MAC_MIC_LEN]>,
}

impl MacFrame {
    /// An unsecured frame.
    pub fn new(
        frame_type: FrameType,
        seq: u8,
        pan_id: PanId,
        dst: LinkAddr,
        src: LinkAddr,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            frame_type,
            seq,
            pan_id,
            dst,
            src,
            security: None,
            payload,
            mic: None,
        }
    }

    /// Parse a frame from the bytes handed over by the radio driver.
    pub fn parse(raw: &[u8]) -> Result<Self, FrameError> {
        if raw.len() < MAC_HEADER_LEN {
            return Err(FrameError::TooShort {
                min: MAC_HEADER_LEN,
                actual: raw.len(),
            });
        }
        if raw.len() > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge {
                max: MAX_FRAME_SIZE,
                actual: raw.len(),
            });
        }

        let frame_type = FrameType::from_bits(raw[0] & FRAME_TYPE_MASK)?;
        let secured = raw[0] & SECURITY_BIT != 0;
        let seq = raw[1];
        let pan_id = PanId(u16::from_be_bytes([raw[2], raw[3]]));
        // SAFETY: raw is at least MAC_HEADER_LEN long, both slices are 8 bytes.
        let dst = LinkAddr::new(raw[4..12].try_into().expect("slice is exactly 8 bytes"));
        let src = LinkAddr::new(raw[12..20].try_into().expect("slice is exactly 8 bytes"));

        if !secured {
            return Ok(Self {
                frame_type,
                seq,
                pan_id,
                dst,
                src,
                security: None,
                payload: raw[MAC_HEADER_LEN..].to_vec(),
                mic: None,
            });
        }

        let min = MAC_HEADER_LEN + SECURITY_HEADER_LEN + MAC_MIC_LEN;
        if raw.len() < min {
            return Err(FrameError::TooShort {
                min,
                actual: raw.len(),
            });
        }
        let key_id = raw[MAC_HEADER_LEN];
        let frame_counter = u32::from_be_bytes([
            raw[MAC_HEADER_LEN + 1],
            raw[MAC_HEADER_LEN + 2],
            raw[MAC_HEADER_LEN + 3],
            raw[MAC_HEADER_LEN + 4],
        ]);
        let payload_start = MAC_HEADER_LEN + SECURITY_HEADER_LEN;
        let mic_start = raw.len() - MAC_MIC_LEN;
        let mut mic = [0u8; MAC_MIC_LEN];
        mic.copy_from_slice(&raw[mic_start..]);

        Ok(Self {
            frame_type,
            seq,
            pan_id,
            dst,
            src,
            security: Some(SecurityHeader {
                key_id,
                frame_counter,
            }),
            payload: raw[payload_start..mic_start].to_vec(),
            mic: Some(mic),
        })
    }

    /// Bytes covered by the MIC: everything except the MIC itself.
    pub fn authenticated_part(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(MAC_HEADER_LEN + SECURITY_HEADER_LEN + self.payload.len());
        let mut fc = self.frame_type as u8;
        if self.security.is_some() {
            fc |= SECURITY_BIT;
        }
        if self.dst.is_broadcast() {
            fc |= BROADCAST_BIT;
        }
        out.push(fc);
        out.push(self.seq);
        out.extend_from_slice(&self.pan_id.0.to_be_bytes());
        out.extend_from_slice(self.dst.as_ref());
        out.extend_from_slice(self.src.as_ref());
        if let Some(sec) = self.security {
            out.push(sec.key_id);
            out.extend_from_slice(&sec.frame_counter.to_be_bytes());
        }
        out.extend_from_slice(&self.payload);
        out
    }

    /// Serialize to wire bytes.
    ///
    /// A secured frame must have its MIC attached first.
    pub fn serialize(&self) -> Result<Vec<u8>, FrameError> {
        let mut out = self.authenticated_part();
        if self.security.is_some() {
            let mic = self.mic.ok_or(FrameError::MissingMic)?;
            out.extend_from_slice(&mic);
        }
        if out.len() > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge {
                max: MAX_FRAME_SIZE,
                actual: out.len(),
            });
        }
        Ok(out)
    }
}
