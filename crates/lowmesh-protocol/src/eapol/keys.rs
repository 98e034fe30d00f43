//! Key material produced by the handshake.
//!
//! A [`PairwiseKeySet`] is owned by exactly one neighbor entry. It holds the
//! PTK-derived temporal key and the group key installed for that neighbor,
//! each with its own expiry and frame counters.

use std::fmt;

use lowmesh_core::Timestamp;
use lowmesh_crypto::prf::expansion_seed;
use lowmesh_crypto::{CryptoError, CryptoProvider};

use super::constants::{GTK_LEN, KCK_LEN, KEK_LEN, PMK_LEN, PTK_LABEL, PTK_LEN, TK_LEN};
use crate::error::KeyError;

/// Pairwise transient key: `KCK(16) || KEK(16) || TK(16)`.
#[derive(Clone, PartialEq, Eq)]
pub struct Ptk {
    bytes: [u8; PTK_LEN],
}

impl Ptk {
    pub fn from_bytes(bytes: [u8; PTK_LEN]) -> Self {
        Self { bytes }
    }

    /// `PTK = PRF(PMK, "Pairwise key expansion", min(A,B) || max(A,B) || min(N) || max(N))`
    pub fn derive(
        crypto: &dyn CryptoProvider,
        pmk: &[u8; PMK_LEN],
        addr_a: &[u8],
        addr_b: &[u8],
        nonce_a: &[u8],
        nonce_b: &[u8],
    ) -> Result<Self, CryptoError> {
        let seed = expansion_seed(addr_a, addr_b, nonce_a, nonce_b);
        let mut bytes = [0u8; PTK_LEN];
        crypto.derive(pmk, PTK_LABEL, &seed, &mut bytes)?;
        Ok(Self { bytes })
    }

    pub fn kck(&self) -> &[u8] {
        &self.bytes[..KCK_LEN]
    }

    pub fn kek(&self) -> [u8; KEK_LEN] {
        let mut kek = [0u8; KEK_LEN];
        kek.copy_from_slice(&self.bytes[KCK_LEN..KCK_LEN + KEK_LEN]);
        kek
    }

    pub fn tk(&self) -> &[u8] {
        &self.bytes[KCK_LEN + KEK_LEN..KCK_LEN + KEK_LEN + TK_LEN]
    }
}

impl fmt::Debug for Ptk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Ptk(..)")
    }
}

/// Outgoing and incoming frame counters for one key.
///
/// Both start at zero when the key is installed. The transmit counter only
/// ever grows; the receive side accepts a counter at or above the next
/// expected value and then moves past it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounter {
    tx: u32,
    rx_expected: u32,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume transmission above a persisted high-water mark.
    pub fn starting_at(tx: u32) -> Self {
        Self { tx, rx_expected: 0 }
    }

    pub fn tx(&self) -> u32 {
        self.tx
    }

    pub fn rx_expected(&self) -> u32 {
        self.rx_expected
    }

    /// Counter value for the next outgoing frame.
    pub fn next_tx(&mut self) -> Result<u32, KeyError> {
        let value = self.tx;
        self.tx = self.tx.checked_add(1).ok_or(KeyError::CounterExhausted)?;
        Ok(value)
    }

    /// Accept an incoming frame counter, rejecting replays.
    pub fn accept_rx(&mut self, counter: u32) -> Result<(), KeyError> {
        if counter < self.rx_expected {
            return Err(KeyError::Replayed {
                counter,
                expected: self.rx_expected,
            });
        }
        self.rx_expected = counter.checked_add(1).ok_or(KeyError::CounterExhausted)?;
        Ok(())
    }
}

/// A network-wide group key as distributed by the authenticator.
#[derive(Clone, PartialEq, Eq)]
pub struct GroupKey {
    pub index: u8,
    pub key: [u8; GTK_LEN],
    pub expires_at: Timestamp,
}

impl GroupKey {
    pub fn generate(crypto: &mut dyn CryptoProvider, index: u8, expires_at: Timestamp) -> Self {
        let mut key = [0u8; GTK_LEN];
        crypto.fill_random(&mut key);
        Self {
            index,
            key,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now.reached(self.expires_at)
    }

    /// Remaining lifetime in whole seconds.
    pub fn remaining_secs(&self, now: Timestamp) -> u32 {
        let ms = self.expires_at.elapsed_since(now);
        u32::try_from(ms / 1000).unwrap_or(u32::MAX)
    }

    /// MAC key identifier for frames secured with this key.
    pub fn key_id(&self) -> u8 {
        self.index + 1
    }
}

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupKey")
            .field("index", &self.index)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Keys installed for one neighbor after a successful handshake.
#[derive(Debug, Clone)]
pub struct PairwiseKeySet {
    ptk: Ptk,
    pairwise_expires_at: Timestamp,
    pairwise_counter: FrameCounter,
    group: GroupKey,
    /// Receive side of group-secured frames from this neighbor.
    group_counter: FrameCounter,
    /// EAPOL replay counter of the message 3 that delivered these keys.
    eapol_counter: u64,
}

impl PairwiseKeySet {
    pub fn new(ptk: Ptk, pairwise_expires_at: Timestamp, group: GroupKey) -> Self {
        Self {
            ptk,
            pairwise_expires_at,
            pairwise_counter: FrameCounter::new(),
            group,
            group_counter: FrameCounter::new(),
            eapol_counter: 0,
        }
    }

    pub fn with_eapol_counter(mut self, counter: u64) -> Self {
        self.eapol_counter = counter;
        self
    }

    /// A later handshake with the same peer must use a higher counter.
    pub fn eapol_counter(&self) -> u64 {
        self.eapol_counter
    }

    pub fn ptk(&self) -> &Ptk {
        &self.ptk
    }

    pub fn group(&self) -> &GroupKey {
        &self.group
    }

    pub fn pairwise_expires_at(&self) -> Timestamp {
        self.pairwise_expires_at
    }

    pub fn pairwise_counter(&self) -> &FrameCounter {
        &self.pairwise_counter
    }

    pub fn group_counter(&self) -> &FrameCounter {
        &self.group_counter
    }

    pub fn is_pairwise_expired(&self, now: Timestamp) -> bool {
        now.reached(self.pairwise_expires_at)
    }

    /// Frame counter for the next unicast frame to this neighbor.
    pub fn next_tx_counter(&mut self, now: Timestamp) -> Result<u32, KeyError> {
        if self.is_pairwise_expired(now) {
            return Err(KeyError::Expired);
        }
        self.pairwise_counter.next_tx()
    }

    /// Replay check for a unicast frame from this neighbor.
    pub fn accept_rx(&mut self, counter: u32, now: Timestamp) -> Result<(), KeyError> {
        if self.is_pairwise_expired(now) {
            return Err(KeyError::Expired);
        }
        self.pairwise_counter.accept_rx(counter)
    }

    /// Replay check for a group-secured frame from this neighbor.
    pub fn accept_group_rx(&mut self, counter: u32, now: Timestamp) -> Result<(), KeyError> {
        if self.group.is_expired(now) {
            return Err(KeyError::Expired);
        }
        self.group_counter.accept_rx(counter)
    }
}
