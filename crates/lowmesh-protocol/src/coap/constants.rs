//! CoAP constants (RFC 7252 subset).

pub const COAP_VERSION: u8 = 1;

/// Fixed header: ver/type/tkl(1) + code(1) + message id(2).
pub const COAP_HEADER_LEN: usize = 4;

pub const MAX_TOKEN_LEN: usize = 8;

/// Token length used for outgoing requests.
pub const REQUEST_TOKEN_LEN: usize = 4;

pub const PAYLOAD_MARKER: u8 = 0xFF;

pub const OPTION_URI_PATH: u16 = 11;
pub const OPTION_CONTENT_FORMAT: u16 = 12;

/// Transmission parameters.
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_ACK_RANDOM_FACTOR: f64 = 1.5;
pub const DEFAULT_MAX_RETRANSMIT: u8 = 4;
pub const DEFAULT_NON_LIFETIME_MS: u64 = 145_000;
pub const DEFAULT_EXCHANGE_LIFETIME_MS: u64 = 247_000;

pub const DEFAULT_DEDUP_CAPACITY: usize = 32;
pub const DEFAULT_MAX_TRANSACTIONS: usize = 16;
