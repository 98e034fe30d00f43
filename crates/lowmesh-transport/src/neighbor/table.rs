//! Slab-backed neighbor table with generational handles.

use std::collections::HashMap;

use lowmesh_core::{LinkAddr, Timestamp};
use lowmesh_protocol::{MemoryMonitor, StateKind, TrafficClass};
use tracing::{debug, info, warn};

use super::types::{NeighborEntry, NeighborHandle, TrustState};
use super::{DEFAULT_MAX_NEIGHBORS, DEFAULT_NEIGHBOR_TIMEOUT_MS};
use crate::error::NeighborError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborConfig {
    pub max_neighbors: usize,
    pub timeout_ms: u64,
}

impl Default for NeighborConfig {
    fn default() -> Self {
        Self {
            max_neighbors: DEFAULT_MAX_NEIGHBORS,
            timeout_ms: DEFAULT_NEIGHBOR_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<NeighborEntry>,
}

#[derive(Debug)]
pub struct NeighborTable {
    config: NeighborConfig,
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_addr: HashMap<LinkAddr, NeighborHandle>,
}

impl NeighborTable {
    pub fn new(config: NeighborConfig) -> Self {
        Self {
            config,
            slots: Vec::new(),
            free: Vec::new(),
            by_addr: HashMap::new(),
        }
    }

    pub fn config(&self) -> &NeighborConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.by_addr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_addr.is_empty()
    }

    /// Refresh `addr` as heard at `now`, creating an unauthenticated entry
    /// for a first contact.
    pub fn insert_or_touch(
        &mut self,
        addr: LinkAddr,
        class: TrafficClass,
        admission: &MemoryMonitor,
        now: Timestamp,
    ) -> Result<NeighborHandle, NeighborError> {
        if let Some(handle) = self.lookup(&addr) {
            if let Some(entry) = self.get_mut(handle) {
                entry.touch(now);
            }
            return Ok(handle);
        }

        if self.len() >= self.config.max_neighbors {
            warn!(neighbor = %addr, max = self.config.max_neighbors, "neighbor: table full");
            return Err(NeighborError::TableFull {
                max: self.config.max_neighbors,
            });
        }
        admission.check_new_state(class, StateKind::Neighbor)?;

        let entry = NeighborEntry::new(addr, now);
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                NeighborHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                NeighborHandle { index, generation: 0 }
            }
        };
        self.by_addr.insert(addr, handle);
        debug!(neighbor = %addr, "neighbor: discovered");
        Ok(handle)
    }

    pub fn lookup(&self, addr: &LinkAddr) -> Option<NeighborHandle> {
        self.by_addr.get(addr).copied()
    }

    pub fn get(&self, handle: NeighborHandle) -> Option<&NeighborEntry> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    pub fn get_mut(&mut self, handle: NeighborHandle) -> Option<&mut NeighborEntry> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    pub fn by_addr(&self, addr: &LinkAddr) -> Option<&NeighborEntry> {
        self.lookup(addr).and_then(|h| self.get(h))
    }

    pub fn by_addr_mut(&mut self, addr: &LinkAddr) -> Option<&mut NeighborEntry> {
        let handle = self.lookup(addr)?;
        self.get_mut(handle)
    }

    /// Like [`NeighborTable::get_mut`] but reporting stale handles as errors.
    pub fn resolve_mut(&mut self, handle: NeighborHandle) -> Result<&mut NeighborEntry, NeighborError> {
        self.get_mut(handle).ok_or(NeighborError::StaleHandle)
    }

    /// Remove an entry; its handle (and every copy of it) goes stale.
    pub fn remove(&mut self, handle: NeighborHandle) -> Option<NeighborEntry> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.by_addr.remove(&entry.addr());
        info!(neighbor = %entry.addr(), trust = entry.trust().as_str(), "neighbor: removed");
        Some(entry)
    }

    /// Remove every neighbor not heard from within the timeout.
    pub fn expire(&mut self, now: Timestamp) -> Vec<(NeighborHandle, NeighborEntry)> {
        let timeout = self.config.timeout_ms;
        let stale: Vec<NeighborHandle> = self
            .iter()
            .filter(|(_, e)| now.elapsed_since(e.last_heard()) >= timeout)
            .map(|(h, _)| h)
            .collect();
        stale
            .into_iter()
            .filter_map(|h| self.remove(h).map(|e| (h, e)))
            .collect()
    }

    /// Move neighbors whose pairwise keys ran out to `KeyExpired`.
    pub fn expire_keys(&mut self, now: Timestamp) -> Vec<NeighborHandle> {
        let mut expired = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(entry) = slot.entry.as_mut()
                && entry.check_key_expiry(now)
            {
                info!(neighbor = %entry.addr(), "neighbor: pairwise keys expired");
                expired.push(NeighborHandle {
                    index: index as u32,
                    generation: slot.generation,
                });
            }
        }
        expired
    }

    pub fn iter(&self) -> impl Iterator<Item = (NeighborHandle, &NeighborEntry)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|e| {
                (
                    NeighborHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    e,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (NeighborHandle, &mut NeighborEntry)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.entry.as_mut().map(|e| {
                (
                    NeighborHandle {
                        index: index as u32,
                        generation,
                    },
                    e,
                )
            })
        })
    }

    pub fn authenticated(&self) -> impl Iterator<Item = (NeighborHandle, &NeighborEntry)> {
        self.iter().filter(|(_, e)| e.trust() == TrustState::Authenticated)
    }

    pub fn is_authenticated(&self, handle: NeighborHandle) -> bool {
        self.get(handle).is_some_and(NeighborEntry::is_authenticated)
    }
}
