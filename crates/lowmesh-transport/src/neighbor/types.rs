use lowmesh_core::{LinkAddr, ShortAddr, Timestamp};
use lowmesh_protocol::eapol::{HandshakeSession, PairwiseKeySet};
use tracing::debug;

use crate::error::NeighborError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrustState {
    Unauthenticated,
    HandshakeInProgress,
    Authenticated,
    KeyExpired,
}

impl TrustState {
    pub fn as_str(self) -> &'static str {
        match self {
            TrustState::Unauthenticated => "unauthenticated",
            TrustState::HandshakeInProgress => "handshake-in-progress",
            TrustState::Authenticated => "authenticated",
            TrustState::KeyExpired => "key-expired",
        }
    }
}

/// Index into the neighbor table plus the generation of the slot it was
/// issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NeighborHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

// ------------------------------------------------------------------ //
// Link metrics
// ------------------------------------------------------------------ //

/// ETX fixed-point unit: 128 = one expected transmission.
pub const ETX_UNIT: u16 = 128;

/// Delivery ratio fixed-point unit.
const RATIO_UNIT: u32 = 256;

/// Upper bound on the reported ETX.
pub const MAX_ETX: u16 = 16 * ETX_UNIT;

/// EWMA weight of a new sample, as a shift (1/8).
const EWMA_SHIFT: u32 = 3;

/// Exponentially weighted unicast delivery statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkMetrics {
    /// Delivery ratio in 1/256 units.
    delivery_ratio: u32,
    tx_success: u32,
    tx_failure: u32,
}

impl Default for LinkMetrics {
    fn default() -> Self {
        Self {
            delivery_ratio: RATIO_UNIT / 2,
            tx_success: 0,
            tx_failure: 0,
        }
    }
}

impl LinkMetrics {
    pub fn record_tx(&mut self, acked: bool) {
        let sample = if acked { RATIO_UNIT } else { 0 };
        self.delivery_ratio = self.delivery_ratio - (self.delivery_ratio >> EWMA_SHIFT) + (sample >> EWMA_SHIFT);
        if acked {
            self.tx_success = self.tx_success.saturating_add(1);
        } else {
            self.tx_failure = self.tx_failure.saturating_add(1);
        }
    }

    /// Expected transmission count in 1/128 units, `1/ratio`, capped at
    /// [`MAX_ETX`].
    pub fn etx(&self) -> u16 {
        if self.delivery_ratio == 0 {
            return MAX_ETX;
        }
        let etx = u32::from(ETX_UNIT) * RATIO_UNIT / self.delivery_ratio;
        etx.min(u32::from(MAX_ETX)) as u16
    }

    pub fn tx_success(&self) -> u32 {
        self.tx_success
    }

    pub fn tx_failure(&self) -> u32 {
        self.tx_failure
    }
}

// ------------------------------------------------------------------ //
// Entry
// ------------------------------------------------------------------ //

/// What a neighbor last advertised about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Advertised {
    pub rank: u16,
    pub dodag_id: Option<LinkAddr>,
    pub dodag_version: u8,
    pub grounded: bool,
    pub holds_gtk: bool,
}

#[derive(Debug)]
pub struct NeighborEntry {
    addr: LinkAddr,
    short_addr: ShortAddr,
    trust: TrustState,
    pub metrics: LinkMetrics,
    last_heard: Timestamp,
    keys: Option<PairwiseKeySet>,
    handshake: Option<HandshakeSession>,
    pub advertised: Option<Advertised>,
}

impl NeighborEntry {
    pub(crate) fn new(addr: LinkAddr, now: Timestamp) -> Self {
        Self {
            addr,
            short_addr: ShortAddr::from_link_addr(&addr),
            trust: TrustState::Unauthenticated,
            metrics: LinkMetrics::default(),
            last_heard: now,
            keys: None,
            handshake: None,
            advertised: None,
        }
    }

    pub fn addr(&self) -> LinkAddr {
        self.addr
    }

    pub fn short_addr(&self) -> ShortAddr {
        self.short_addr
    }

    pub fn trust(&self) -> TrustState {
        self.trust
    }

    pub fn is_authenticated(&self) -> bool {
        self.trust == TrustState::Authenticated
    }

    pub fn last_heard(&self) -> Timestamp {
        self.last_heard
    }

    pub fn touch(&mut self, now: Timestamp) {
        if now > self.last_heard {
            self.last_heard = now;
        }
    }

    pub fn keys(&self) -> Option<&PairwiseKeySet> {
        self.keys.as_ref()
    }

    pub fn keys_mut(&mut self) -> Option<&mut PairwiseKeySet> {
        self.keys.as_mut()
    }

    pub fn handshake(&self) -> Option<&HandshakeSession> {
        self.handshake.as_ref()
    }

    pub fn handshake_mut(&mut self) -> Option<&mut HandshakeSession> {
        self.handshake.as_mut()
    }

    /// Detach the session so it can be driven while the entry itself stays
    /// borrowed elsewhere. Put it back with [`NeighborEntry::restore_handshake`].
    pub fn take_handshake(&mut self) -> Option<HandshakeSession> {
        self.handshake.take()
    }

    pub fn restore_handshake(&mut self, session: HandshakeSession) {
        self.handshake = Some(session);
    }

    /// Start (or restart) a handshake. Previous keys stay usable until the
    /// new set is installed.
    pub fn begin_handshake(&mut self, session: HandshakeSession) {
        debug!(
            neighbor = %self.addr,
            from = self.trust.as_str(),
            role = ?session.role(),
            "neighbor: handshake started"
        );
        self.handshake = Some(session);
        self.trust = TrustState::HandshakeInProgress;
    }

    /// Start a handshake that replaces the keys of an authenticated
    /// neighbor. Trust stays [`TrustState::Authenticated`] on the current
    /// keys until the new set is installed.
    pub fn begin_rekey(&mut self, session: HandshakeSession) {
        debug!(
            neighbor = %self.addr,
            role = ?session.role(),
            "neighbor: re-key started"
        );
        self.handshake = Some(session);
    }

    /// Drop a failed re-key. The current keys stay installed.
    pub fn abandon_rekey(&mut self) {
        self.handshake = None;
    }

    /// Install the key set produced by a completed handshake or re-key.
    pub fn install_keys(&mut self, keys: PairwiseKeySet) -> Result<(), NeighborError> {
        if !matches!(self.trust, TrustState::HandshakeInProgress | TrustState::Authenticated) {
            return Err(NeighborError::InvalidTransition {
                from: self.trust.as_str(),
                to: TrustState::Authenticated.as_str(),
            });
        }
        self.keys = Some(keys);
        self.trust = TrustState::Authenticated;
        Ok(())
    }

    /// Drop the handshake without keys when it ends after installation (the
    /// supplicant retains its session briefly to answer retransmitted msg3).
    pub fn finish_handshake(&mut self) {
        self.handshake = None;
    }

    /// Abort: no partial key state survives.
    pub fn fail_handshake(&mut self) {
        self.handshake = None;
        self.keys = None;
        self.trust = TrustState::Unauthenticated;
    }

    /// Mark the pairwise keys expired if their lifetime ran out.
    pub(crate) fn check_key_expiry(&mut self, now: Timestamp) -> bool {
        let expired = self.trust == TrustState::Authenticated
            && self.keys.as_ref().is_some_and(|k| k.is_pairwise_expired(now));
        if expired {
            self.trust = TrustState::KeyExpired;
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_etx_is_two() {
        assert_eq!(LinkMetrics::default().etx(), 2 * ETX_UNIT);
    }

    #[test]
    fn test_failures_raise_etx() {
        let mut m = LinkMetrics::default();
        let before = m.etx();
        m.record_tx(false);
        assert!(m.etx() > before);
        for _ in 0..200 {
            m.record_tx(false);
        }
        assert_eq!(m.etx(), MAX_ETX);
        assert_eq!(m.tx_failure(), 201);
    }

    #[test]
    fn test_successes_approach_one() {
        let mut m = LinkMetrics::default();
        for _ in 0..100 {
            m.record_tx(true);
        }
        assert!(m.etx() < ETX_UNIT + ETX_UNIT / 8, "etx {}", m.etx());
    }

    #[test]
    fn test_install_requires_handshake_in_progress() {
        use lowmesh_protocol::eapol::{GroupKey, Ptk};

        let mut entry = NeighborEntry::new(LinkAddr::new([1; 8]), Timestamp::ZERO);
        let group = GroupKey {
            index: 0,
            key: [0; 16],
            expires_at: Timestamp::from_millis(10_000),
        };
        let keys = PairwiseKeySet::new(Ptk::from_bytes([0; 48]), Timestamp::from_millis(1_000), group);
        let err = entry.install_keys(keys.clone()).unwrap_err();
        assert!(matches!(err, NeighborError::InvalidTransition { from: "unauthenticated", .. }));
        assert!(entry.keys().is_none());
    }

    #[test]
    fn test_rekey_keeps_trust_and_current_keys() {
        use lowmesh_protocol::eapol::{GroupKey, HandshakeSession, Ptk, SessionConfig, TimingProfile};

        let peer = LinkAddr::new([1; 8]);
        let config = SessionConfig {
            pmk: [0x42; 32],
            policy: TimingProfile::Fast.policy(),
            pairwise_lifetime_ms: 3_600_000,
        };
        let group = GroupKey {
            index: 0,
            key: [0; 16],
            expires_at: Timestamp::from_millis(10_000),
        };
        let first = PairwiseKeySet::new(Ptk::from_bytes([1; 48]), Timestamp::from_millis(5_000), group.clone());
        let second = PairwiseKeySet::new(Ptk::from_bytes([2; 48]), Timestamp::from_millis(9_000), group);

        let mut entry = NeighborEntry::new(peer, Timestamp::ZERO);
        entry.begin_handshake(HandshakeSession::supplicant(LinkAddr::new([2; 8]), peer, config.clone()));
        entry.install_keys(first.clone()).unwrap();
        entry.finish_handshake();

        entry.begin_rekey(HandshakeSession::supplicant(LinkAddr::new([2; 8]), peer, config.clone()));
        assert_eq!(entry.trust(), TrustState::Authenticated);
        entry.abandon_rekey();
        assert_eq!(entry.trust(), TrustState::Authenticated);
        assert_eq!(entry.keys().map(|k| k.ptk()), Some(first.ptk()));

        entry.begin_rekey(HandshakeSession::supplicant(LinkAddr::new([2; 8]), peer, config));
        entry.install_keys(second.clone()).unwrap();
        assert_eq!(entry.trust(), TrustState::Authenticated);
        assert_eq!(entry.keys().map(|k| k.ptk()), Some(second.ptk()));
    }
}
