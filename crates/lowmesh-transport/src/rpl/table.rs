//! Host routes learned from neighbor advertisements.
//!
//! Each destination keeps the candidates every neighbor advertised for it.
//! [`RoutingTable::reselect`] picks, per destination, the authenticated
//! candidate with the lowest `link ETX + advertised cost`, ties going to the
//! most recently heard neighbor. Losing the last candidate marks the entry
//! unreachable instead of deleting it.

use std::collections::BTreeMap;

use lowmesh_core::{LinkAddr, Timestamp};
use tracing::{debug, info, warn};

use super::advertisement::AdvertisedRoute;
use super::constants::{DEFAULT_MAX_ROUTES, DEFAULT_ROUTE_LIFETIME_MS, MAX_PATH_COST};
use crate::error::RoutingError;
use crate::neighbor::{NeighborHandle, NeighborTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingConfig {
    pub max_routes: usize,
    pub route_lifetime_ms: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_routes: DEFAULT_MAX_ROUTES,
            route_lifetime_ms: DEFAULT_ROUTE_LIFETIME_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    via: NeighborHandle,
    advertised_cost: u16,
    heard_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    /// Learned but never selected.
    Pending { since: Timestamp },
    Reachable,
    Unreachable { since: Timestamp },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingEntry {
    pub destination: LinkAddr,
    /// Back-reference into the neighbor table; resolves to nothing once the
    /// neighbor is removed.
    pub next_hop: Option<NeighborHandle>,
    pub path_cost: u16,
    /// Rank the next hop last advertised.
    pub rank: u16,
    pub state: RouteState,
    candidates: Vec<Candidate>,
}

impl RoutingEntry {
    fn new(destination: LinkAddr, now: Timestamp) -> Self {
        Self {
            destination,
            next_hop: None,
            path_cost: MAX_PATH_COST,
            rank: u16::MAX,
            state: RouteState::Pending { since: now },
            candidates: Vec::new(),
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.state == RouteState::Reachable
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }
}

/// Reported upward whenever a destination's selection changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteChange {
    /// A route was selected for the first time, or moved to a new next hop.
    Changed {
        destination: LinkAddr,
        next_hop: LinkAddr,
        cost: u16,
    },
    Unreachable { destination: LinkAddr },
    Restored {
        destination: LinkAddr,
        next_hop: LinkAddr,
        cost: u16,
    },
}

#[derive(Debug)]
pub struct RoutingTable {
    config: RoutingConfig,
    routes: BTreeMap<LinkAddr, RoutingEntry>,
}

impl RoutingTable {
    pub fn new(config: RoutingConfig) -> Self {
        Self {
            config,
            routes: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn get(&self, destination: &LinkAddr) -> Option<&RoutingEntry> {
        self.routes.get(destination)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoutingEntry> {
        self.routes.values()
    }

    /// Replace everything `via` previously advertised with `routes`.
    ///
    /// Destinations equal to `own` and costs at or above [`MAX_PATH_COST`]
    /// are ignored. New destinations past the table capacity are refused
    /// and reported as `TableFull` once the rest has been applied.
    pub fn replace_candidates_from(
        &mut self,
        via: NeighborHandle,
        routes: &[AdvertisedRoute],
        own: LinkAddr,
        now: Timestamp,
    ) -> Result<(), RoutingError> {
        for entry in self.routes.values_mut() {
            entry.candidates.retain(|c| c.via != via);
        }

        let mut refused = false;
        for route in routes {
            if route.destination == own || route.cost >= MAX_PATH_COST {
                continue;
            }
            if !self.routes.contains_key(&route.destination) {
                if self.routes.len() >= self.config.max_routes {
                    refused = true;
                    continue;
                }
                self.routes
                    .insert(route.destination, RoutingEntry::new(route.destination, now));
            }
            if let Some(entry) = self.routes.get_mut(&route.destination) {
                entry.candidates.push(Candidate {
                    via,
                    advertised_cost: route.cost,
                    heard_at: now,
                });
            }
        }

        if refused {
            warn!(max = self.config.max_routes, "routing: table full, destinations refused");
            return Err(RoutingError::TableFull {
                max: self.config.max_routes,
            });
        }
        Ok(())
    }

    /// Re-run selection for every destination.
    pub fn reselect(&mut self, neighbors: &NeighborTable, now: Timestamp) -> Vec<RouteChange> {
        let mut changes = Vec::new();
        for entry in self.routes.values_mut() {
            if let Some(change) = select(entry, neighbors, now) {
                changes.push(change);
            }
        }
        changes
    }

    /// Forget every candidate through `via` and re-resolve.
    pub fn remove_neighbor(
        &mut self,
        via: NeighborHandle,
        neighbors: &NeighborTable,
        now: Timestamp,
    ) -> Vec<RouteChange> {
        for entry in self.routes.values_mut() {
            entry.candidates.retain(|c| c.via != via);
        }
        self.reselect(neighbors, now)
    }

    /// Next hop for `destination`, only ever an authenticated neighbor.
    pub fn next_hop(&self, destination: &LinkAddr, neighbors: &NeighborTable) -> Option<NeighborHandle> {
        self.routes
            .get(destination)
            .filter(|e| e.is_reachable())
            .and_then(|e| e.next_hop)
            .filter(|h| neighbors.is_authenticated(*h))
    }

    /// Age out candidates, then drop routes that stayed unselected or
    /// unreachable for a whole route lifetime.
    pub fn expire(&mut self, neighbors: &NeighborTable, now: Timestamp) -> Vec<RouteChange> {
        let lifetime = self.config.route_lifetime_ms;
        for entry in self.routes.values_mut() {
            entry
                .candidates
                .retain(|c| now.elapsed_since(c.heard_at) < lifetime);
        }
        let changes = self.reselect(neighbors, now);
        self.routes.retain(|dest, entry| {
            let keep = match entry.state {
                RouteState::Reachable => true,
                RouteState::Pending { since } | RouteState::Unreachable { since } => {
                    now.elapsed_since(since) < lifetime
                }
            };
            if !keep {
                debug!(destination = %dest, "routing: route expired");
            }
            keep
        });
        changes
    }

    /// Reachable routes to put in our own advertisement.
    pub fn advertised_routes(&self) -> Vec<AdvertisedRoute> {
        self.routes
            .values()
            .filter(|e| e.is_reachable() && e.path_cost < MAX_PATH_COST)
            .map(|e| AdvertisedRoute {
                destination: e.destination,
                cost: e.path_cost,
            })
            .collect()
    }
}

fn select(entry: &mut RoutingEntry, neighbors: &NeighborTable, now: Timestamp) -> Option<RouteChange> {
    let best = entry
        .candidates
        .iter()
        .filter_map(|c| {
            let neighbor = neighbors.get(c.via).filter(|n| n.is_authenticated())?;
            let cost = u32::from(neighbor.metrics.etx()) + u32::from(c.advertised_cost);
            if cost >= u32::from(MAX_PATH_COST) {
                return None;
            }
            Some((c.via, neighbor, cost as u16))
        })
        // Lowest cost first; among equals, the most recently heard wins.
        .min_by(|a, b| a.2.cmp(&b.2).then(b.1.last_heard().cmp(&a.1.last_heard())));

    let destination = entry.destination;
    match best {
        Some((via, neighbor, cost)) => {
            let previous = (entry.state, entry.next_hop);
            entry.next_hop = Some(via);
            entry.path_cost = cost;
            entry.rank = neighbor.advertised.map_or(u16::MAX, |a| a.rank);
            entry.state = RouteState::Reachable;
            let next_hop = neighbor.addr();
            match previous {
                (RouteState::Unreachable { .. }, _) => {
                    info!(destination = %destination, next_hop = %next_hop, cost, "routing: route restored");
                    Some(RouteChange::Restored {
                        destination,
                        next_hop,
                        cost,
                    })
                }
                (RouteState::Reachable, Some(old)) if old == via => None,
                _ => {
                    debug!(destination = %destination, next_hop = %next_hop, cost, "routing: next hop selected");
                    Some(RouteChange::Changed {
                        destination,
                        next_hop,
                        cost,
                    })
                }
            }
        }
        None => {
            entry.next_hop = None;
            entry.path_cost = MAX_PATH_COST;
            if entry.state == RouteState::Reachable {
                entry.state = RouteState::Unreachable { since: now };
                info!(destination = %destination, "routing: route unreachable");
                Some(RouteChange::Unreachable { destination })
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lowmesh_protocol::{AdmissionConfig, MemoryMonitor, TrafficClass};

    use crate::neighbor::test_support::authenticate;
    use crate::neighbor::{NeighborConfig, TrustState};

    const OWN: LinkAddr = LinkAddr::new([0; 8]);
    const N1: LinkAddr = LinkAddr::new([1; 8]);
    const N2: LinkAddr = LinkAddr::new([2; 8]);
    const D1: LinkAddr = LinkAddr::new([0xD1; 8]);
    const D2: LinkAddr = LinkAddr::new([0xD2; 8]);

    fn route(destination: LinkAddr, cost: u16) -> AdvertisedRoute {
        AdvertisedRoute { destination, cost }
    }

    fn authenticated(table: &mut NeighborTable, addr: LinkAddr, now: Timestamp) -> NeighborHandle {
        let monitor = MemoryMonitor::new(AdmissionConfig::default());
        let h = table
            .insert_or_touch(addr, TrafficClass::Control, &monitor, now)
            .unwrap();
        authenticate(table.get_mut(h).unwrap(), Timestamp::from_millis(u64::MAX / 2));
        assert_eq!(table.get(h).unwrap().trust(), TrustState::Authenticated);
        h
    }

    #[test]
    fn test_lowest_cost_wins() {
        let mut neighbors = NeighborTable::new(NeighborConfig::default());
        let h1 = authenticated(&mut neighbors, N1, Timestamp::ZERO);
        let h2 = authenticated(&mut neighbors, N2, Timestamp::ZERO);
        let mut routes = RoutingTable::new(RoutingConfig::default());
        routes
            .replace_candidates_from(h1, &[route(D1, 512)], OWN, Timestamp::ZERO)
            .unwrap();
        routes
            .replace_candidates_from(h2, &[route(D1, 128)], OWN, Timestamp::ZERO)
            .unwrap();
        let changes = routes.reselect(&neighbors, Timestamp::ZERO);
        assert_eq!(
            changes,
            vec![RouteChange::Changed {
                destination: D1,
                next_hop: N2,
                cost: 256 + 128
            }]
        );
        assert_eq!(routes.next_hop(&D1, &neighbors), Some(h2));
        assert!(routes.reselect(&neighbors, Timestamp::ZERO).is_empty());
    }

    #[test]
    fn test_tie_breaks_on_most_recently_heard() {
        let mut neighbors = NeighborTable::new(NeighborConfig::default());
        let h1 = authenticated(&mut neighbors, N1, Timestamp::from_millis(10));
        let h2 = authenticated(&mut neighbors, N2, Timestamp::from_millis(20));
        let mut routes = RoutingTable::new(RoutingConfig::default());
        let now = Timestamp::from_millis(30);
        routes.replace_candidates_from(h1, &[route(D1, 0)], OWN, now).unwrap();
        routes.replace_candidates_from(h2, &[route(D1, 0)], OWN, now).unwrap();
        routes.reselect(&neighbors, now);
        assert_eq!(routes.next_hop(&D1, &neighbors), Some(h2));
    }

    #[test]
    fn test_unauthenticated_neighbors_are_never_selected() {
        let mut neighbors = NeighborTable::new(NeighborConfig::default());
        let monitor = MemoryMonitor::new(AdmissionConfig::default());
        let h1 = neighbors
            .insert_or_touch(N1, TrafficClass::Control, &monitor, Timestamp::ZERO)
            .unwrap();
        let mut routes = RoutingTable::new(RoutingConfig::default());
        routes
            .replace_candidates_from(h1, &[route(D1, 0)], OWN, Timestamp::ZERO)
            .unwrap();
        assert!(routes.reselect(&neighbors, Timestamp::ZERO).is_empty());
        assert_eq!(routes.next_hop(&D1, &neighbors), None);
        assert!(matches!(routes.get(&D1).unwrap().state, RouteState::Pending { .. }));
    }

    #[test]
    fn test_removing_sole_next_hop_marks_unreachable_only() {
        let mut neighbors = NeighborTable::new(NeighborConfig::default());
        let h1 = authenticated(&mut neighbors, N1, Timestamp::ZERO);
        let h2 = authenticated(&mut neighbors, N2, Timestamp::ZERO);
        let mut routes = RoutingTable::new(RoutingConfig::default());
        routes
            .replace_candidates_from(h1, &[route(D1, 0)], OWN, Timestamp::ZERO)
            .unwrap();
        routes
            .replace_candidates_from(h2, &[route(D2, 0)], OWN, Timestamp::ZERO)
            .unwrap();
        routes.reselect(&neighbors, Timestamp::ZERO);

        neighbors.remove(h1);
        let changes = routes.remove_neighbor(h1, &neighbors, Timestamp::from_millis(5));
        assert_eq!(changes, vec![RouteChange::Unreachable { destination: D1 }]);
        assert_eq!(routes.len(), 2);
        assert_eq!(
            routes.get(&D1).unwrap().state,
            RouteState::Unreachable {
                since: Timestamp::from_millis(5)
            }
        );
        assert_eq!(routes.next_hop(&D2, &neighbors), Some(h2));
        assert_eq!(routes.advertised_routes().len(), 1);

        // A new authenticated candidate restores the route.
        routes
            .replace_candidates_from(h2, &[route(D1, 0), route(D2, 0)], OWN, Timestamp::from_millis(6))
            .unwrap();
        let changes = routes.reselect(&neighbors, Timestamp::from_millis(6));
        assert_eq!(
            changes,
            vec![RouteChange::Restored {
                destination: D1,
                next_hop: N2,
                cost: 256
            }]
        );
    }

    #[test]
    fn test_loop_damping() {
        let mut neighbors = NeighborTable::new(NeighborConfig::default());
        let h1 = authenticated(&mut neighbors, N1, Timestamp::ZERO);
        let mut routes = RoutingTable::new(RoutingConfig::default());
        routes
            .replace_candidates_from(
                h1,
                &[route(OWN, 0), route(D1, MAX_PATH_COST), route(D2, MAX_PATH_COST - 1)],
                OWN,
                Timestamp::ZERO,
            )
            .unwrap();
        assert!(routes.get(&OWN).is_none());
        assert!(routes.get(&D1).is_none());
        // Link cost pushes the total past the ceiling.
        routes.reselect(&neighbors, Timestamp::ZERO);
        assert_eq!(routes.next_hop(&D2, &neighbors), None);
    }

    #[test]
    fn test_capacity() {
        let mut neighbors = NeighborTable::new(NeighborConfig::default());
        let h1 = authenticated(&mut neighbors, N1, Timestamp::ZERO);
        let mut routes = RoutingTable::new(RoutingConfig {
            max_routes: 1,
            ..RoutingConfig::default()
        });
        let err = routes
            .replace_candidates_from(h1, &[route(D1, 0), route(D2, 0)], OWN, Timestamp::ZERO)
            .unwrap_err();
        assert_eq!(err, RoutingError::TableFull { max: 1 });
        assert_eq!(routes.len(), 1);
    }

    #[test]
    fn test_expire() {
        let mut neighbors = NeighborTable::new(NeighborConfig::default());
        let h1 = authenticated(&mut neighbors, N1, Timestamp::ZERO);
        let mut routes = RoutingTable::new(RoutingConfig {
            route_lifetime_ms: 100,
            ..RoutingConfig::default()
        });
        routes
            .replace_candidates_from(h1, &[route(D1, 0)], OWN, Timestamp::ZERO)
            .unwrap();
        routes.reselect(&neighbors, Timestamp::ZERO);

        let changes = routes.expire(&neighbors, Timestamp::from_millis(100));
        assert_eq!(changes, vec![RouteChange::Unreachable { destination: D1 }]);
        assert_eq!(routes.len(), 1);
        assert!(routes.expire(&neighbors, Timestamp::from_millis(199)).is_empty());
        assert_eq!(routes.len(), 1);
        routes.expire(&neighbors, Timestamp::from_millis(200));
        assert!(routes.is_empty());
    }
}
