//! Inbound frame triage.
//!
//! Pure checks applied to a parsed MAC frame before any state is touched:
//! addressing, traffic classification for admission control, and which
//! payloads a given level of frame protection is allowed to carry.

use lowmesh_core::{DatagramHeader, Dispatch, FragmentHeader, LinkAddr, MacFrame, PanId};
use lowmesh_protocol::TrafficClass;

use crate::error::FrameDrop;

/// How an inbound frame's MIC was checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// No security header.
    Unsecured,
    /// Verified under the sender's pairwise TK.
    Pairwise,
    /// Verified under the current group key.
    Group,
    /// Secured under a group key we do not hold.
    GroupUnknown(u8),
}

/// What the receive path may do with a frame, given its protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Handshake traffic: processed regardless of protection.
    Handshake,
    /// An advertisement. `trusted` is false for discovery-only use.
    Advertisement { trusted: bool },
    /// Datagram or fragment under the pairwise key.
    Data,
}

/// Reject frames from another PAN, frames we sent ourselves and unicast
/// frames for another node.
pub fn check_addressing(frame: &MacFrame, own: LinkAddr, pan_id: PanId) -> Result<(), FrameDrop> {
    if frame.pan_id != pan_id {
        return Err(FrameDrop::ForeignPan(frame.pan_id.0));
    }
    if frame.src == own {
        return Err(FrameDrop::NotForUs);
    }
    if frame.dst != own && !frame.dst.is_broadcast() {
        return Err(FrameDrop::NotForUs);
    }
    Ok(())
}

/// Admission class of an inbound payload.
///
/// The priority flag is only visible in a whole datagram or a first
/// fragment; subsequent fragments ride as normal traffic.
pub fn traffic_class(dispatch: &Dispatch<'_>) -> TrafficClass {
    match dispatch {
        Dispatch::Eapol(_) => TrafficClass::Security,
        Dispatch::Advertisement(_) => TrafficClass::Control,
        Dispatch::Datagram(raw) => datagram_class(raw),
        Dispatch::Fragment {
            header: FragmentHeader::First { .. },
            data,
        } => datagram_class(data),
        Dispatch::Fragment { .. } => TrafficClass::Normal,
    }
}

fn datagram_class(raw: &[u8]) -> TrafficClass {
    match DatagramHeader::parse(raw) {
        Ok(header) if header.priority => TrafficClass::Priority,
        _ => TrafficClass::Normal,
    }
}

/// Decide whether a payload may be processed under its protection.
///
/// Handshake frames travel unsecured. Advertisements are always accepted,
/// but only a verified one may feed routing. Data must be pairwise-secured.
pub fn accept(dispatch: &Dispatch<'_>, verification: Verification) -> Result<Acceptance, FrameDrop> {
    match dispatch {
        Dispatch::Eapol(_) => Ok(Acceptance::Handshake),
        Dispatch::Advertisement(_) => Ok(Acceptance::Advertisement {
            trusted: matches!(verification, Verification::Pairwise | Verification::Group),
        }),
        Dispatch::Datagram(_) | Dispatch::Fragment { .. } => match verification {
            Verification::Pairwise => Ok(Acceptance::Data),
            Verification::Unsecured => Err(FrameDrop::Unsecured),
            Verification::Group => Err(FrameDrop::Unauthenticated),
            Verification::GroupUnknown(key_id) => Err(FrameDrop::UnknownKey(key_id)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lowmesh_core::constants::{DISPATCH_DATAGRAM, NEXT_HEADER_COAP};
    use lowmesh_core::frame::dispatch::with_dispatch;
    use lowmesh_core::FrameType;

    const OWN: LinkAddr = LinkAddr::new([1; 8]);
    const PEER: LinkAddr = LinkAddr::new([2; 8]);
    const PAN: PanId = PanId(0x00AB);

    fn frame(pan: PanId, dst: LinkAddr, src: LinkAddr) -> MacFrame {
        MacFrame::new(FrameType::Data, 0, pan, dst, src, vec![0x01])
    }

    fn datagram_payload(priority: bool) -> Vec<u8> {
        let mut raw = Vec::new();
        DatagramHeader::new(PEER, OWN, NEXT_HEADER_COAP, priority).write_to(&mut raw);
        with_dispatch(DISPATCH_DATAGRAM, &raw)
    }

    #[test]
    fn test_addressing() {
        assert!(check_addressing(&frame(PAN, OWN, PEER), OWN, PAN).is_ok());
        assert!(check_addressing(&frame(PAN, LinkAddr::BROADCAST, PEER), OWN, PAN).is_ok());
        assert!(matches!(
            check_addressing(&frame(PanId(7), OWN, PEER), OWN, PAN),
            Err(FrameDrop::ForeignPan(7))
        ));
        assert!(matches!(
            check_addressing(&frame(PAN, LinkAddr::new([3; 8]), PEER), OWN, PAN),
            Err(FrameDrop::NotForUs)
        ));
        assert!(matches!(
            check_addressing(&frame(PAN, LinkAddr::BROADCAST, OWN), OWN, PAN),
            Err(FrameDrop::NotForUs)
        ));
    }

    #[test]
    fn test_traffic_classes() {
        assert_eq!(traffic_class(&Dispatch::Eapol(&[])), TrafficClass::Security);
        assert_eq!(traffic_class(&Dispatch::Advertisement(&[])), TrafficClass::Control);

        let normal = datagram_payload(false);
        let priority = datagram_payload(true);
        assert_eq!(traffic_class(&Dispatch::parse(&normal).unwrap()), TrafficClass::Normal);
        assert_eq!(traffic_class(&Dispatch::parse(&priority).unwrap()), TrafficClass::Priority);

        let first = Dispatch::Fragment {
            header: FragmentHeader::First { size: 400, tag: 1 },
            data: &priority[1..],
        };
        assert_eq!(traffic_class(&first), TrafficClass::Priority);
        let subsequent = Dispatch::Fragment {
            header: FragmentHeader::Subsequent {
                size: 400,
                tag: 1,
                offset_units: 31,
            },
            data: &priority[1..],
        };
        assert_eq!(traffic_class(&subsequent), TrafficClass::Normal);
    }

    #[test]
    fn test_data_requires_pairwise_protection() {
        let raw = datagram_payload(false);
        let dispatch = Dispatch::parse(&raw).unwrap();
        assert_eq!(accept(&dispatch, Verification::Pairwise).unwrap(), Acceptance::Data);
        assert!(matches!(accept(&dispatch, Verification::Unsecured), Err(FrameDrop::Unsecured)));
        assert!(matches!(accept(&dispatch, Verification::Group), Err(FrameDrop::Unauthenticated)));
        assert!(matches!(
            accept(&dispatch, Verification::GroupUnknown(2)),
            Err(FrameDrop::UnknownKey(2))
        ));
    }

    #[test]
    fn test_unverified_advertisement_is_discovery_only() {
        let dispatch = Dispatch::Advertisement(&[]);
        assert_eq!(
            accept(&dispatch, Verification::Unsecured).unwrap(),
            Acceptance::Advertisement { trusted: false }
        );
        assert_eq!(
            accept(&dispatch, Verification::GroupUnknown(1)).unwrap(),
            Acceptance::Advertisement { trusted: false }
        );
        assert_eq!(
            accept(&dispatch, Verification::Group).unwrap(),
            Acceptance::Advertisement { trusted: true }
        );
    }

    #[test]
    fn test_handshake_frames_pass_unsecured() {
        assert_eq!(
            accept(&Dispatch::Eapol(&[]), Verification::Unsecured).unwrap(),
            Acceptance::Handshake
        );
    }
}
