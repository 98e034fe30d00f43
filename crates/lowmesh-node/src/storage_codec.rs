//! Pure encoding of persisted records.
//!
//! Kept apart from [`crate::storage`] so the record formats can be tested
//! without async I/O or temp dirs.

use serde::{Deserialize, Serialize};

use lowmesh_core::Timestamp;
use lowmesh_protocol::eapol::GroupKey;

/// Storage key of the group key record.
pub const GROUP_KEY_PATH: &str = "keys/group";

/// Storage key of the outgoing group frame counter record.
pub const FRAME_COUNTER_PATH: &str = "network/frame_counter";

/// Errors from pure codec operations (no I/O variants).
#[derive(Debug, thiserror::Error)]
pub enum StorageCodecError {
    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}

/// A group key with its lifetime made relative, since [`Timestamp`] does
/// not survive a reboot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredGroupKey {
    pub index: u8,
    pub key: [u8; 16],
    pub remaining_secs: u32,
}

impl StoredGroupKey {
    pub fn from_group_key(group: &GroupKey, now: Timestamp) -> Self {
        Self {
            index: group.index,
            key: group.key,
            remaining_secs: group.remaining_secs(now),
        }
    }

    /// Rebase onto the current clock. A record with no lifetime left yields
    /// `None`.
    pub fn into_group_key(self, now: Timestamp) -> Option<GroupKey> {
        if self.remaining_secs == 0 {
            return None;
        }
        Some(GroupKey {
            index: self.index,
            key: self.key,
            expires_at: now.after_ms(u64::from(self.remaining_secs) * 1000),
        })
    }
}

/// Frame counter value no frame has used yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFrameCounter {
    pub high_water: u32,
}

pub fn encode_group_key(record: &StoredGroupKey) -> Result<Vec<u8>, StorageCodecError> {
    postcard::to_allocvec(record).map_err(|e| StorageCodecError::Serialize(e.to_string()))
}

pub fn decode_group_key(bytes: &[u8]) -> Result<StoredGroupKey, StorageCodecError> {
    postcard::from_bytes(bytes).map_err(|e| StorageCodecError::Deserialize(e.to_string()))
}

pub fn encode_frame_counter(record: &StoredFrameCounter) -> Result<Vec<u8>, StorageCodecError> {
    postcard::to_allocvec(record).map_err(|e| StorageCodecError::Serialize(e.to_string()))
}

pub fn decode_frame_counter(bytes: &[u8]) -> Result<StoredFrameCounter, StorageCodecError> {
    postcard::from_bytes(bytes).map_err(|e| StorageCodecError::Deserialize(e.to_string()))
}
