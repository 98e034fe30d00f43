//! DODAG membership: rank, preferred parent and the default route.

use lowmesh_core::LinkAddr;
use tracing::{debug, info};

use super::advertisement::{AdvertisedRoute, Advertisement};
use super::constants::{DEFAULT_MIN_HOP_RANK_INCREASE, INFINITE_RANK};
use crate::neighbor::types::ETX_UNIT;
use crate::neighbor::{NeighborHandle, NeighborTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DodagRole {
    /// The DODAG root.
    BorderRouter,
    Router,
}

/// Emitted when the preferred parent changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentChange {
    pub old: Option<LinkAddr>,
    pub new: Option<LinkAddr>,
    pub rank: u16,
}

#[derive(Debug)]
pub struct Dodag {
    role: DodagRole,
    own: LinkAddr,
    min_hop_rank_increase: u16,
    dodag_id: Option<LinkAddr>,
    version: u8,
    rank: u16,
    parent: Option<(NeighborHandle, LinkAddr)>,
}

impl Dodag {
    pub fn new(role: DodagRole, own: LinkAddr, min_hop_rank_increase: u16) -> Self {
        let mhri = if min_hop_rank_increase == 0 {
            DEFAULT_MIN_HOP_RANK_INCREASE
        } else {
            min_hop_rank_increase
        };
        let (dodag_id, rank) = match role {
            DodagRole::BorderRouter => (Some(own), mhri),
            DodagRole::Router => (None, INFINITE_RANK),
        };
        Self {
            role,
            own,
            min_hop_rank_increase: mhri,
            dodag_id,
            version: 0,
            rank,
            parent: None,
        }
    }

    pub fn role(&self) -> DodagRole {
        self.role
    }

    pub fn is_root(&self) -> bool {
        self.role == DodagRole::BorderRouter
    }

    /// Root, or attached through a preferred parent.
    pub fn is_joined(&self) -> bool {
        self.is_root() || self.parent.is_some()
    }

    pub fn rank(&self) -> u16 {
        self.rank
    }

    pub fn dodag_id(&self) -> Option<LinkAddr> {
        self.dodag_id
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn preferred_parent(&self) -> Option<NeighborHandle> {
        self.parent.map(|(h, _)| h)
    }

    /// Rank through a neighbor advertising `parent_rank` over a link of
    /// `etx` (1/128 units).
    #[must_use]
    pub fn rank_via(&self, parent_rank: u16, etx: u16) -> u16 {
        let increase = u32::from(etx) * u32::from(self.min_hop_rank_increase) / u32::from(ETX_UNIT);
        (u32::from(parent_rank) + increase).min(u32::from(INFINITE_RANK)) as u16
    }

    /// Choose the authenticated neighbor minimizing our resulting rank (ties
    /// to the most recently heard) and recompute the rank.
    pub fn select_parent(&mut self, neighbors: &NeighborTable) -> Option<ParentChange> {
        if self.is_root() {
            return None;
        }
        let best = neighbors
            .authenticated()
            .filter_map(|(handle, entry)| {
                let adv = entry.advertised?;
                let dodag_id = adv.dodag_id?;
                if adv.rank >= INFINITE_RANK || dodag_id == self.own {
                    return None;
                }
                let rank = self.rank_via(adv.rank, entry.metrics.etx());
                (rank < INFINITE_RANK).then_some((handle, entry, rank, dodag_id, adv.dodag_version))
            })
            .min_by(|a, b| a.2.cmp(&b.2).then(b.1.last_heard().cmp(&a.1.last_heard())));

        let old = self.parent.map(|(_, addr)| addr);
        match best {
            Some((handle, entry, rank, dodag_id, version)) => {
                let addr = entry.addr();
                let rank_changed = rank != self.rank;
                self.parent = Some((handle, addr));
                self.rank = rank;
                self.dodag_id = Some(dodag_id);
                self.version = version;
                if old == Some(addr) {
                    if rank_changed {
                        debug!(parent = %addr, rank, "rpl: rank updated");
                    }
                    return None;
                }
                info!(parent = %addr, rank, dodag = %dodag_id, "rpl: preferred parent selected");
                Some(ParentChange {
                    old,
                    new: Some(addr),
                    rank,
                })
            }
            None => {
                self.parent = None;
                self.rank = INFINITE_RANK;
                if old.is_none() {
                    return None;
                }
                info!("rpl: detached, no preferred parent");
                Some(ParentChange {
                    old,
                    new: None,
                    rank: INFINITE_RANK,
                })
            }
        }
    }

    /// Start a new DODAG version (root only).
    pub fn increment_version(&mut self) {
        if self.is_root() {
            self.version = self.version.wrapping_add(1);
        }
    }

    /// Our periodic advertisement, or `None` while detached.
    pub fn build_advertisement(
        &self,
        unicast_channel_offset: u16,
        holds_gtk: bool,
        routes: Vec<AdvertisedRoute>,
    ) -> Option<Advertisement> {
        let dodag_id = self.dodag_id.filter(|_| self.is_joined())?;
        Some(Advertisement {
            dodag_id,
            dodag_version: self.version,
            rank: self.rank,
            unicast_channel_offset,
            grounded: self.is_root(),
            holds_gtk,
            routes,
        })
    }
}
