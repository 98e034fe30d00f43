//! Per-interface hopping state.
//!
//! [`FhssStructure`] is owned by the interface task and passed by reference
//! into every scheduling decision. It is re-derived on every (re)join.

use std::collections::HashMap;

use lowmesh_core::{Channel, LinkAddr, Timestamp};
use tracing::{debug, info};

use super::channel::{ChannelFunction, HoppingSequence, one_at_a_time};
use super::constants::{
    DEFAULT_BROADCAST_DWELL_MS, DEFAULT_BROADCAST_INTERVAL_MS, DEFAULT_CHANNEL_COUNT,
    DEFAULT_UNICAST_DWELL_MS, SLOT_MODULUS,
};
use crate::error::FhssError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FhssConfig {
    pub function: ChannelFunction,
    pub channel_count: u8,
    pub excluded_channels: Vec<u8>,
    pub unicast_dwell_ms: u32,
    pub broadcast_interval_ms: u32,
    pub broadcast_dwell_ms: u32,
    pub broadcast_schedule_id: u16,
}

impl Default for FhssConfig {
    fn default() -> Self {
        Self {
            function: ChannelFunction::Tr51,
            channel_count: DEFAULT_CHANNEL_COUNT,
            excluded_channels: Vec::new(),
            unicast_dwell_ms: DEFAULT_UNICAST_DWELL_MS,
            broadcast_interval_ms: DEFAULT_BROADCAST_INTERVAL_MS,
            broadcast_dwell_ms: DEFAULT_BROADCAST_DWELL_MS,
            broadcast_schedule_id: 0,
        }
    }
}

impl FhssConfig {
    pub fn validate(&self) -> Result<(), FhssError> {
        if self.unicast_dwell_ms == 0 || self.broadcast_interval_ms == 0 {
            return Err(FhssError::Uninitialized {
                reason: "dwell and interval must be non-zero",
            });
        }
        if self.broadcast_dwell_ms > self.broadcast_interval_ms {
            return Err(FhssError::Uninitialized {
                reason: "broadcast dwell exceeds broadcast interval",
            });
        }
        Ok(())
    }
}

/// Who a channel is being selected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleRole {
    Broadcast,
    /// Unicast to (or listening as) the node with this address.
    Unicast(LinkAddr),
}

/// Default unicast schedule offset of a node, derived from its address.
#[must_use]
pub fn unicast_offset_for(addr: &LinkAddr) -> u16 {
    (one_at_a_time(addr.as_ref()) & 0xFFFF) as u16
}

#[derive(Debug)]
pub struct FhssStructure {
    config: FhssConfig,
    sequence: Option<HoppingSequence>,
    own_addr: LinkAddr,
    own_unicast_offset: u16,
    broadcast_offset: u16,
    neighbor_offsets: HashMap<LinkAddr, u16>,
}

impl FhssStructure {
    /// Not usable until [`FhssStructure::rederive`] succeeds.
    pub fn new(config: FhssConfig, own_addr: LinkAddr) -> Self {
        Self {
            config,
            sequence: None,
            own_unicast_offset: unicast_offset_for(&own_addr),
            own_addr,
            broadcast_offset: 0,
            neighbor_offsets: HashMap::new(),
        }
    }

    /// Rebuild the sequence for the network identified by `network_seed` (the
    /// PAN id) and forget every learned neighbor offset.
    pub fn rederive(&mut self, network_seed: u16) -> Result<(), FhssError> {
        self.config.validate()?;
        let sequence = HoppingSequence::build(
            self.config.function,
            self.config.channel_count,
            &self.config.excluded_channels,
            network_seed,
        )?;
        self.broadcast_offset =
            (one_at_a_time(&self.config.broadcast_schedule_id.to_be_bytes()) & 0xFFFF) as u16;
        self.own_unicast_offset = unicast_offset_for(&self.own_addr);
        self.neighbor_offsets.clear();
        info!(
            function = ?self.config.function,
            channels = sequence.len(),
            seed = network_seed,
            "fhss: sequence derived"
        );
        self.sequence = Some(sequence);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.sequence.is_some()
    }

    pub fn config(&self) -> &FhssConfig {
        &self.config
    }

    pub fn own_unicast_offset(&self) -> u16 {
        self.own_unicast_offset
    }

    pub fn broadcast_offset(&self) -> u16 {
        self.broadcast_offset
    }

    /// Record the unicast offset a neighbor advertised.
    pub fn learn_offset(&mut self, neighbor: LinkAddr, offset: u16) {
        if self.neighbor_offsets.insert(neighbor, offset) != Some(offset) {
            debug!(neighbor = %neighbor, offset, "fhss: neighbor offset learned");
        }
    }

    pub fn forget(&mut self, neighbor: &LinkAddr) {
        self.neighbor_offsets.remove(neighbor);
    }

    /// Offset used to reach `neighbor`: the advertised one, or the
    /// address-derived default before any advertisement was heard.
    pub fn offset_for(&self, neighbor: &LinkAddr) -> u16 {
        if *neighbor == self.own_addr {
            return self.own_unicast_offset;
        }
        self.neighbor_offsets
            .get(neighbor)
            .copied()
            .unwrap_or_else(|| unicast_offset_for(neighbor))
    }

    pub fn unicast_slot(&self, now: Timestamp) -> u16 {
        ((now.as_millis() / u64::from(self.config.unicast_dwell_ms.max(1))) % SLOT_MODULUS) as u16
    }

    pub fn broadcast_slot(&self, now: Timestamp) -> u16 {
        ((now.as_millis() / u64::from(self.config.broadcast_interval_ms.max(1))) % SLOT_MODULUS) as u16
    }

    /// Whether `now` falls in the broadcast listening window.
    pub fn in_broadcast_window(&self, now: Timestamp) -> bool {
        now.as_millis() % u64::from(self.config.broadcast_interval_ms.max(1))
            < u64::from(self.config.broadcast_dwell_ms)
    }

    /// Pure selection for a role at an explicit slot.
    pub fn select(&self, role: ScheduleRole, slot: u16) -> Result<Channel, FhssError> {
        let sequence = self.sequence()?;
        let offset = match role {
            ScheduleRole::Broadcast => self.broadcast_offset,
            ScheduleRole::Unicast(addr) => self.offset_for(&addr),
        };
        Ok(sequence.channel(slot, offset))
    }

    pub fn broadcast_channel(&self, now: Timestamp) -> Result<Channel, FhssError> {
        self.select(ScheduleRole::Broadcast, self.broadcast_slot(now))
    }

    /// Channel `addr` listens on for unicast at `now`, outside the broadcast
    /// window.
    pub fn unicast_channel(&self, addr: &LinkAddr, now: Timestamp) -> Result<Channel, FhssError> {
        self.select(ScheduleRole::Unicast(*addr), self.unicast_slot(now))
    }

    /// Channel to transmit a frame for `dst` on.
    pub fn tx_channel(&self, dst: &LinkAddr, now: Timestamp) -> Result<Channel, FhssError> {
        if dst.is_broadcast() || self.in_broadcast_window(now) {
            self.broadcast_channel(now)
        } else {
            self.unicast_channel(dst, now)
        }
    }

    /// Channel this node listens on at `now`.
    pub fn rx_channel(&self, now: Timestamp) -> Result<Channel, FhssError> {
        if self.in_broadcast_window(now) {
            self.broadcast_channel(now)
        } else {
            let own = self.own_addr;
            self.unicast_channel(&own, now)
        }
    }

    fn sequence(&self) -> Result<&HoppingSequence, FhssError> {
        self.sequence.as_ref().ok_or(FhssError::Uninitialized {
            reason: "sequence not derived",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: LinkAddr = LinkAddr::new([0xA; 8]);
    const B: LinkAddr = LinkAddr::new([0xB; 8]);

    fn structure(addr: LinkAddr) -> FhssStructure {
        let mut s = FhssStructure::new(
            FhssConfig {
                channel_count: 16,
                ..FhssConfig::default()
            },
            addr,
        );
        s.rederive(0x1234).unwrap();
        s
    }

    #[test]
    fn test_uninitialized_is_an_error() {
        let s = FhssStructure::new(FhssConfig::default(), A);
        assert!(!s.is_initialized());
        assert!(matches!(
            s.broadcast_channel(Timestamp::ZERO),
            Err(FhssError::Uninitialized { .. })
        ));
    }

    #[test]
    fn test_peers_agree_on_channels() {
        let a = structure(A);
        let b = structure(B);
        for ms in (0..20_000).step_by(97) {
            let now = Timestamp::from_millis(ms);
            assert_eq!(a.tx_channel(&B, now).unwrap(), b.rx_channel(now).unwrap());
            assert_eq!(a.broadcast_channel(now).unwrap(), b.broadcast_channel(now).unwrap());
        }
    }

    #[test]
    fn test_learned_offset_overrides_default() {
        let mut a = structure(A);
        let derived = a.offset_for(&B);
        assert_eq!(derived, unicast_offset_for(&B));
        a.learn_offset(B, derived.wrapping_add(1));
        assert_eq!(a.offset_for(&B), derived.wrapping_add(1));

        a.rederive(0x1234).unwrap();
        assert_eq!(a.offset_for(&B), derived);
    }

    #[test]
    fn test_slots_wrap_at_16_bits() {
        let s = structure(A);
        let dwell = u64::from(s.config().unicast_dwell_ms);
        let wrap = Timestamp::from_millis(dwell * SLOT_MODULUS);
        assert_eq!(s.unicast_slot(wrap), 0);
        assert_eq!(s.unicast_slot(wrap.after_ms(dwell)), 1);
        let before = Timestamp::from_millis(dwell * (SLOT_MODULUS - 1));
        assert_eq!(s.unicast_slot(before), u16::MAX);
    }

    #[test]
    fn test_broadcast_window() {
        let s = structure(A);
        assert!(s.in_broadcast_window(Timestamp::from_millis(0)));
        assert!(s.in_broadcast_window(Timestamp::from_millis(254)));
        assert!(!s.in_broadcast_window(Timestamp::from_millis(255)));
        assert!(s.in_broadcast_window(Timestamp::from_millis(1_020)));
    }

    #[test]
    fn test_invalid_timing_is_fatal() {
        let mut s = FhssStructure::new(
            FhssConfig {
                broadcast_dwell_ms: 2_000,
                ..FhssConfig::default()
            },
            A,
        );
        assert!(s.rederive(1).is_err());
    }
}
