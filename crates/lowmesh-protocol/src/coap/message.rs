//! CoAP message codec.
//!
//! ```text
//! ver(2) type(2) tkl(4) | code(8) | message_id(16) | token(tkl) | options* | 0xFF payload
//! ```
//!
//! Options are delta/length nibble encoded with the 13 (one extra byte) and
//! 14 (two extra bytes) extended forms. Unknown options are kept opaquely.

use std::fmt;

use super::constants::{
    COAP_HEADER_LEN, COAP_VERSION, MAX_TOKEN_LEN, OPTION_CONTENT_FORMAT, OPTION_URI_PATH,
    PAYLOAD_MARKER,
};
use crate::error::CoapError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Confirmable = 0,
    NonConfirmable = 1,
    Acknowledgement = 2,
    Reset = 3,
}

impl MessageType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Confirmable,
            1 => Self::NonConfirmable,
            2 => Self::Acknowledgement,
            _ => Self::Reset,
        }
    }
}

/// Request method or response code, `class.detail`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code(pub u8);

impl Code {
    pub const EMPTY: Code = Code(0x00);
    pub const GET: Code = Code(0x01);
    pub const POST: Code = Code(0x02);
    pub const PUT: Code = Code(0x03);
    pub const DELETE: Code = Code(0x04);
    pub const CREATED: Code = Code(0x41);
    pub const CHANGED: Code = Code(0x44);
    pub const CONTENT: Code = Code(0x45);
    pub const BAD_REQUEST: Code = Code(0x80);
    pub const NOT_FOUND: Code = Code(0x84);
    pub const INTERNAL_SERVER_ERROR: Code = Code(0xA0);
    pub const SERVICE_UNAVAILABLE: Code = Code(0xA3);

    pub fn class(self) -> u8 {
        self.0 >> 5
    }

    pub fn detail(self) -> u8 {
        self.0 & 0x1F
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_request(self) -> bool {
        self.class() == 0 && !self.is_empty()
    }

    pub fn is_response(self) -> bool {
        (2..=5).contains(&self.class())
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code({self})")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapOption {
    pub number: u16,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapMessage {
    pub mtype: MessageType,
    pub code: Code,
    pub message_id: u16,
    pub token: Vec<u8>,
    /// Kept sorted by option number.
    options: Vec<CoapOption>,
    pub payload: Vec<u8>,
}

impl CoapMessage {
    pub fn new(mtype: MessageType, code: Code, message_id: u16, token: Vec<u8>) -> Self {
        Self {
            mtype,
            code,
            message_id,
            token,
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// A request with the given method, path and payload. Message ID and
    /// token are assigned when the request is sent.
    pub fn request(code: Code, path: &str, payload: Vec<u8>) -> Self {
        let mut msg = Self::new(MessageType::Confirmable, code, 0, Vec::new());
        msg.set_uri_path(path);
        msg.payload = payload;
        msg
    }

    pub fn empty_ack(message_id: u16) -> Self {
        Self::new(MessageType::Acknowledgement, Code::EMPTY, message_id, Vec::new())
    }

    pub fn reset(message_id: u16) -> Self {
        Self::new(MessageType::Reset, Code::EMPTY, message_id, Vec::new())
    }

    pub fn options(&self) -> &[CoapOption] {
        &self.options
    }

    /// Insert an option after any existing options with the same number.
    pub fn add_option(&mut self, number: u16, value: Vec<u8>) {
        let pos = self.options.partition_point(|o| o.number <= number);
        self.options.insert(pos, CoapOption { number, value });
    }

    pub fn remove_option(&mut self, number: u16) {
        self.options.retain(|o| o.number != number);
    }

    pub fn option_values(&self, number: u16) -> impl Iterator<Item = &[u8]> {
        self.options
            .iter()
            .filter(move |o| o.number == number)
            .map(|o| o.value.as_slice())
    }

    /// Uri-Path segments joined with `/`.
    pub fn uri_path(&self) -> String {
        self.option_values(OPTION_URI_PATH)
            .map(String::from_utf8_lossy)
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn set_uri_path(&mut self, path: &str) {
        self.remove_option(OPTION_URI_PATH);
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            self.add_option(OPTION_URI_PATH, segment.as_bytes().to_vec());
        }
    }

    pub fn content_format(&self) -> Option<u16> {
        let value = self.option_values(OPTION_CONTENT_FORMAT).next()?;
        Some(value.iter().fold(0u16, |acc, b| (acc << 8) | u16::from(*b)))
    }

    pub fn set_content_format(&mut self, format: u16) {
        self.remove_option(OPTION_CONTENT_FORMAT);
        let value = match format {
            0 => Vec::new(),
            1..=0xFF => vec![format as u8],
            _ => format.to_be_bytes().to_vec(),
        };
        self.add_option(OPTION_CONTENT_FORMAT, value);
    }

    pub fn encode(&self) -> Result<Vec<u8>, CoapError> {
        if self.token.len() > MAX_TOKEN_LEN {
            return Err(CoapError::TokenTooLong(self.token.len()));
        }
        let mut out = Vec::with_capacity(COAP_HEADER_LEN + self.token.len() + self.payload.len() + 16);
        out.push((COAP_VERSION << 6) | ((self.mtype as u8) << 4) | self.token.len() as u8);
        out.push(self.code.0);
        out.extend_from_slice(&self.message_id.to_be_bytes());
        out.extend_from_slice(&self.token);

        let mut last = 0u16;
        for opt in &self.options {
            let delta = opt.number - last;
            let len = u16::try_from(opt.value.len())
                .map_err(|_| CoapError::Malformed("option value too long"))?;
            let (delta_nibble, delta_ext) = encode_nibble(delta);
            let (len_nibble, len_ext) = encode_nibble(len);
            out.push((delta_nibble << 4) | len_nibble);
            out.extend_from_slice(&delta_ext);
            out.extend_from_slice(&len_ext);
            out.extend_from_slice(&opt.value);
            last = opt.number;
        }

        if !self.payload.is_empty() {
            out.push(PAYLOAD_MARKER);
            out.extend_from_slice(&self.payload);
        }
        Ok(out)
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoapError> {
        if raw.len() < COAP_HEADER_LEN {
            return Err(CoapError::Malformed("shorter than header"));
        }
        let version = raw[0] >> 6;
        if version != COAP_VERSION {
            return Err(CoapError::UnsupportedVersion(version));
        }
        let mtype = MessageType::from_bits(raw[0] >> 4);
        let tkl = usize::from(raw[0] & 0x0F);
        if tkl > MAX_TOKEN_LEN {
            return Err(CoapError::TokenTooLong(tkl));
        }
        let code = Code(raw[1]);
        let message_id = u16::from_be_bytes([raw[2], raw[3]]);
        let mut pos = COAP_HEADER_LEN;
        let token = raw
            .get(pos..pos + tkl)
            .ok_or(CoapError::Malformed("truncated token"))?
            .to_vec();
        pos += tkl;

        let mut msg = Self::new(mtype, code, message_id, token);
        let mut number = 0u16;
        while pos < raw.len() {
            let byte = raw[pos];
            pos += 1;
            if byte == PAYLOAD_MARKER {
                if pos == raw.len() {
                    return Err(CoapError::Malformed("payload marker without payload"));
                }
                msg.payload = raw[pos..].to_vec();
                break;
            }
            let delta = decode_nibble(byte >> 4, raw, &mut pos)?;
            let len = usize::from(decode_nibble(byte & 0x0F, raw, &mut pos)?);
            number = number
                .checked_add(delta)
                .ok_or(CoapError::Malformed("option number overflow"))?;
            let value = raw
                .get(pos..pos + len)
                .ok_or(CoapError::Malformed("truncated option value"))?;
            msg.options.push(CoapOption {
                number,
                value: value.to_vec(),
            });
            pos += len;
        }

        if code.is_empty() && (!msg.token.is_empty() || !msg.options.is_empty() || !msg.payload.is_empty()) {
            return Err(CoapError::Malformed("empty message with content"));
        }
        Ok(msg)
    }
}

fn encode_nibble(value: u16) -> (u8, Vec<u8>) {
    match value {
        0..=12 => (value as u8, Vec::new()),
        13..=268 => (13, vec![(value - 13) as u8]),
        _ => (14, (value - 269).to_be_bytes().to_vec()),
    }
}

fn decode_nibble(nibble: u8, raw: &[u8], pos: &mut usize) -> Result<u16, CoapError> {
    match nibble {
        0..=12 => Ok(u16::from(nibble)),
        13 => {
            let b = *raw
                .get(*pos)
                .ok_or(CoapError::Malformed("truncated option header"))?;
            *pos += 1;
            Ok(u16::from(b) + 13)
        }
        14 => {
            let bytes = raw
                .get(*pos..*pos + 2)
                .ok_or(CoapError::Malformed("truncated option header"))?;
            *pos += 2;
            u16::from_be_bytes([bytes[0], bytes[1]])
                .checked_add(269)
                .ok_or(CoapError::Malformed("option field overflow"))
        }
        _ => Err(CoapError::Malformed("reserved option nibble")),
    }
}
