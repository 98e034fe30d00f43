//! EAPOL-Key constants.

/// Key descriptor type carried in the first byte.
pub const DESCRIPTOR_TYPE: u8 = 0x02;

/// Nonce length (ANonce / SNonce).
pub const NONCE_LEN: usize = 32;

/// EAPOL-Key MIC length (HMAC-SHA256 truncated).
pub const EAPOL_MIC_LEN: usize = 16;

/// Fixed part before the key data:
/// descriptor(1) + message(1) + key_info(2) + replay(8) + nonce(32) + key_data_len(2).
pub const EAPOL_FIXED_LEN: usize = 1 + 1 + 2 + 8 + NONCE_LEN + 2;

/// Pairwise master key length.
pub const PMK_LEN: usize = 32;

/// Key confirmation key, key encryption key and temporal key lengths.
pub const KCK_LEN: usize = 16;
pub const KEK_LEN: usize = 16;
pub const TK_LEN: usize = 16;

/// Full PTK length: KCK || KEK || TK.
pub const PTK_LEN: usize = KCK_LEN + KEK_LEN + TK_LEN;

/// Group key length.
pub const GTK_LEN: usize = 16;

/// Highest GTK index (four installable slots).
pub const MAX_GTK_INDEX: u8 = 3;

/// IV carried with the wrapped group key.
pub const KEY_WRAP_IV_LEN: usize = 16;

/// PRF label for PTK expansion.
pub const PTK_LABEL: &[u8] = b"Pairwise key expansion";

// Key information flags.
pub const KEY_INFO_PAIRWISE: u16 = 0x0008;
pub const KEY_INFO_INSTALL: u16 = 0x0040;
pub const KEY_INFO_ACK: u16 = 0x0080;
pub const KEY_INFO_MIC: u16 = 0x0100;
pub const KEY_INFO_SECURE: u16 = 0x0200;
pub const KEY_INFO_REQUEST: u16 = 0x0800;
pub const KEY_INFO_ENCRYPTED_DATA: u16 = 0x1000;
