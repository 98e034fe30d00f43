//! Neighbor trust, routing and fragmentation working together.

use lowmesh_core::{Dispatch, LinkAddr, Timestamp};
use lowmesh_crypto::SoftwareCrypto;
use lowmesh_protocol::eapol::{
    EapolKeyFrame, GroupKey, HandshakeSession, SessionConfig, TimingProfile,
};
use lowmesh_protocol::{AdmissionConfig, MemoryMonitor, TrafficClass};
use lowmesh_transport::frag::{Fragmenter, ReassemblyConfig, ReassemblyTable};
use lowmesh_transport::neighbor::{NeighborConfig, NeighborHandle, NeighborTable, TrustState};
use lowmesh_transport::rpl::{AdvertisedRoute, RouteChange, RoutingConfig, RoutingTable};
use lowmesh_transport::ReassemblyError;

const OWN: LinkAddr = LinkAddr::new([0x10; 8]);
const N1: LinkAddr = LinkAddr::new([0x01; 8]);
const N2: LinkAddr = LinkAddr::new([0x02; 8]);
const D1: LinkAddr = LinkAddr::new([0xD1; 8]);
const D2: LinkAddr = LinkAddr::new([0xD2; 8]);

fn session_config(pmk: u8) -> SessionConfig {
    SessionConfig {
        pmk: [pmk; 32],
        policy: TimingProfile::VeryFast.policy(),
        pairwise_lifetime_ms: 600_000,
    }
}

/// Run a real 4-way handshake with `peer` as authenticator and `OWN` as
/// supplicant, driving the neighbor entry through its trust states.
fn handshake(table: &mut NeighborTable, peer: LinkAddr, peer_pmk: u8, now: Timestamp) -> TrustState {
    let monitor = MemoryMonitor::new(AdmissionConfig::default());
    let handle = table
        .insert_or_touch(peer, TrafficClass::Security, &monitor, now)
        .unwrap();
    let mut peer_crypto = SoftwareCrypto::with_seed(1);
    let mut own_crypto = SoftwareCrypto::with_seed(2);
    let group = GroupKey {
        index: 0,
        key: [7; 16],
        expires_at: Timestamp::from_millis(3_600_000),
    };
    let (mut authenticator, msg1) =
        HandshakeSession::start_authenticator(peer, OWN, session_config(peer_pmk), group, &mut peer_crypto, now);

    let entry = table.get_mut(handle).unwrap();
    entry.begin_handshake(HandshakeSession::supplicant(OWN, peer, session_config(0x42)));
    assert_eq!(entry.trust(), TrustState::HandshakeInProgress);

    let mut session = entry.take_handshake().unwrap();
    let parse = |b: &[u8]| EapolKeyFrame::parse(b).unwrap();
    let result = (|| {
        let msg2 = session.on_frame(&parse(&msg1), &mut own_crypto, now)?.send.unwrap();
        let msg3 = authenticator.on_frame(&parse(&msg2), &mut peer_crypto, now)?.send.unwrap();
        session.on_frame(&parse(&msg3), &mut own_crypto, now)
    })();
    match result {
        Ok(step) => {
            entry.restore_handshake(session);
            entry.install_keys(step.installed.unwrap()).unwrap();
        }
        Err(_) => entry.fail_handshake(),
    }
    entry.trust()
}

fn advertise(
    routes: &mut RoutingTable,
    via: NeighborHandle,
    sender: LinkAddr,
    dests: &[LinkAddr],
    now: Timestamp,
) {
    let mut list = vec![AdvertisedRoute {
        destination: sender,
        cost: 0,
    }];
    list.extend(dests.iter().map(|&destination| AdvertisedRoute { destination, cost: 128 }));
    routes.replace_candidates_from(via, &list, OWN, now).unwrap();
}

#[test]
fn handshake_authenticates_and_installs_fresh_counters() {
    let mut table = NeighborTable::new(NeighborConfig::default());
    assert_eq!(handshake(&mut table, N1, 0x42, Timestamp::ZERO), TrustState::Authenticated);

    let entry = table.by_addr(&N1).unwrap();
    let keys = entry.keys().unwrap();
    assert_eq!(keys.pairwise_counter().tx(), 0);
    assert_eq!(keys.pairwise_counter().rx_expected(), 0);
}

#[test]
fn failed_handshake_leaves_no_keys_and_no_routes() {
    let mut table = NeighborTable::new(NeighborConfig::default());
    assert_eq!(handshake(&mut table, N1, 0x99, Timestamp::ZERO), TrustState::Unauthenticated);
    let handle = table.lookup(&N1).unwrap();
    assert!(table.get(handle).unwrap().keys().is_none());

    let mut routes = RoutingTable::new(RoutingConfig::default());
    advertise(&mut routes, handle, N1, &[D1], Timestamp::ZERO);
    assert!(routes.reselect(&table, Timestamp::ZERO).is_empty());
    assert_eq!(routes.next_hop(&D1, &table), None);
}

#[test]
fn neighbor_timeout_marks_only_its_destinations_unreachable() {
    let mut table = NeighborTable::new(NeighborConfig {
        timeout_ms: 1_000,
        ..NeighborConfig::default()
    });
    handshake(&mut table, N1, 0x42, Timestamp::ZERO);
    handshake(&mut table, N2, 0x42, Timestamp::from_millis(900));
    let h1 = table.lookup(&N1).unwrap();
    let h2 = table.lookup(&N2).unwrap();

    let mut routes = RoutingTable::new(RoutingConfig::default());
    advertise(&mut routes, h1, N1, &[D1], Timestamp::ZERO);
    advertise(&mut routes, h2, N2, &[D2], Timestamp::from_millis(900));
    assert_eq!(routes.reselect(&table, Timestamp::from_millis(900)).len(), 4);

    let now = Timestamp::from_millis(1_500);
    let mut changes = Vec::new();
    for (handle, _) in table.expire(now) {
        changes.extend(routes.remove_neighbor(handle, &table, now));
    }
    assert_eq!(
        changes,
        vec![
            RouteChange::Unreachable { destination: N1 },
            RouteChange::Unreachable { destination: D1 },
        ]
    );
    assert_eq!(routes.len(), 4);
    assert_eq!(routes.next_hop(&D2, &table), Some(h2));
    assert_eq!(routes.next_hop(&N2, &table), Some(h2));
    assert_eq!(routes.next_hop(&D1, &table), None);
}

#[test]
fn fragmented_datagram_reassembles_across_tables() {
    let mut sender = Fragmenter::new(248, 77).unwrap();
    let sender_inbound = ReassemblyTable::new(ReassemblyConfig::default());
    let mut receiver = ReassemblyTable::new(ReassemblyConfig::default());
    let mut monitor = MemoryMonitor::new(AdmissionConfig::default());

    let datagram: Vec<u8> = (0..650u32).map(|i| (i * 7) as u8).collect();
    let frames = sender.split(N1, &datagram, &sender_inbound).unwrap();
    assert_eq!(frames.len(), 3);

    let mut delivered = None;
    for payload in frames.iter().rev() {
        let Dispatch::Fragment { header, data } = Dispatch::parse(payload).unwrap() else {
            panic!("expected a fragment");
        };
        if let Some(d) = receiver
            .accept(OWN, header, data, TrafficClass::Normal, &mut monitor, Timestamp::ZERO)
            .unwrap()
        {
            delivered = Some(d);
        }
    }
    assert_eq!(delivered.as_deref(), Some(datagram.as_slice()));
    assert_eq!(monitor.reserved_bytes(), 0);
}

#[test]
fn incomplete_contexts_do_not_leak_under_loss() {
    let mut sender = Fragmenter::new(64, 0).unwrap();
    let sender_inbound = ReassemblyTable::new(ReassemblyConfig::default());
    let mut receiver = ReassemblyTable::new(ReassemblyConfig {
        timeout_ms: 500,
        max_contexts: 4,
    });
    let mut monitor = MemoryMonitor::new(AdmissionConfig::default());

    // Every datagram loses its last fragment.
    let mut now = Timestamp::ZERO;
    for round in 0..20 {
        let frames = sender.split(N1, &[round as u8; 200], &sender_inbound).unwrap();
        for payload in &frames[..frames.len() - 1] {
            let Dispatch::Fragment { header, data } = Dispatch::parse(payload).unwrap() else {
                panic!("expected a fragment");
            };
            match receiver.accept(N1, header, data, TrafficClass::Normal, &mut monitor, now) {
                Ok(None) | Err(ReassemblyError::TableFull { .. }) => {}
                other => panic!("unexpected {other:?}"),
            }
        }
        now = now.after_ms(200);
        receiver.expire(now, &mut monitor);
        assert!(receiver.len() <= 3);
    }
    now = now.after_ms(500);
    receiver.expire(now, &mut monitor);
    assert!(receiver.is_empty());
    assert_eq!(monitor.reserved_bytes(), 0);
}
