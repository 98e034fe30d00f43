//! Pure key-management decisions.
//!
//! Which side of a pair authenticates, when a supplicant session may be
//! reused, group key index rotation and frame counter checkpointing. The
//! stack owns the state; these functions only decide.

use lowmesh_core::LinkAddr;
use lowmesh_crypto::CryptoProvider;
use lowmesh_protocol::HandshakeError;
use lowmesh_protocol::eapol::{EapolKeyFrame, HandshakeState, PairwiseKeySet};
use lowmesh_transport::neighbor::TrustState;

/// Headroom persisted above the live group frame counter. After a restart
/// transmission resumes at the persisted value, skipping whatever was
/// used since the last checkpoint.
pub const FRAME_COUNTER_MARGIN: u32 = 1024;

/// Number of group key indices in rotation.
pub const GROUP_KEY_INDICES: u8 = 4;

/// Whether this node takes the authenticator role toward `peer`.
///
/// A node that cannot hand out a group key never authenticates. When both
/// sides can, the lower link address authenticates.
pub fn acts_as_authenticator(
    local: LinkAddr,
    peer: LinkAddr,
    local_capable: bool,
    peer_capable: bool,
) -> bool {
    local_capable && (!peer_capable || local < peer)
}

/// Whether hearing `peer` should start a handshake from our side.
pub fn should_initiate(trust: TrustState, handshake_active: bool, authenticator: bool) -> bool {
    authenticator && !handshake_active && trust == TrustState::Unauthenticated
}

/// Whether a fresh message 1 can be fed to the existing supplicant session.
///
/// A session that already finished its exchange would reject the new
/// authenticator's replay counter, so it is replaced instead.
pub fn supplicant_reusable(state: HandshakeState, finished: bool) -> bool {
    !finished
        && matches!(
            state,
            HandshakeState::Idle | HandshakeState::SentRequest | HandshakeState::SentMsg2
        )
}

/// Admit a message 1 that would re-key a neighbor holding `keys`.
///
/// It must continue the replay counter of the exchange that delivered
/// `keys` and carry a MIC under their KCK.
pub fn check_rekey_msg1(
    crypto: &dyn CryptoProvider,
    keys: &PairwiseKeySet,
    frame: &EapolKeyFrame,
) -> Result<(), HandshakeError> {
    if frame.replay_counter <= keys.eapol_counter() {
        return Err(HandshakeError::StaleReplayCounter {
            counter: frame.replay_counter,
            last: keys.eapol_counter(),
        });
    }
    frame.verify(crypto, keys.ptk().kck())
}

/// Index of the group key that replaces `index`.
pub fn next_group_key_index(index: u8) -> u8 {
    (index + 1) % GROUP_KEY_INDICES
}

/// New high-water mark to persist, once the live counter has eaten half of
/// the headroom above the last one.
pub fn checkpoint_due(tx: u32, persisted: u32) -> Option<u32> {
    if tx.saturating_add(FRAME_COUNTER_MARGIN / 2) >= persisted {
        Some(tx.saturating_add(FRAME_COUNTER_MARGIN))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOW: LinkAddr = LinkAddr::new([1; 8]);
    const HIGH: LinkAddr = LinkAddr::new([9; 8]);

    #[test]
    fn test_authenticator_role() {
        assert!(acts_as_authenticator(HIGH, LOW, true, false));
        assert!(!acts_as_authenticator(LOW, HIGH, false, true));
        assert!(!acts_as_authenticator(LOW, HIGH, false, false));
        // both capable: lower address wins
        assert!(acts_as_authenticator(LOW, HIGH, true, true));
        assert!(!acts_as_authenticator(HIGH, LOW, true, true));
    }

    #[test]
    fn test_initiation() {
        assert!(should_initiate(TrustState::Unauthenticated, false, true));
        assert!(!should_initiate(TrustState::Unauthenticated, true, true));
        assert!(!should_initiate(TrustState::Unauthenticated, false, false));
        assert!(!should_initiate(TrustState::Authenticated, false, true));
        assert!(!should_initiate(TrustState::HandshakeInProgress, false, true));
    }

    #[test]
    fn test_supplicant_reuse() {
        assert!(supplicant_reusable(HandshakeState::Idle, false));
        assert!(supplicant_reusable(HandshakeState::SentRequest, false));
        assert!(supplicant_reusable(HandshakeState::SentMsg2, false));
        assert!(!supplicant_reusable(HandshakeState::SentMsg4, false));
        assert!(!supplicant_reusable(HandshakeState::Completed, true));
        assert!(!supplicant_reusable(HandshakeState::SentMsg2, true));
    }

    #[test]
    fn test_rekey_msg1_admission() {
        use lowmesh_core::Timestamp;
        use lowmesh_crypto::SoftwareCrypto;
        use lowmesh_protocol::eapol::{GroupKey, KeyMessage, Ptk};

        let crypto = SoftwareCrypto::with_seed(7);
        let group = GroupKey {
            index: 0,
            key: [0; 16],
            expires_at: Timestamp::from_millis(10_000),
        };
        let keys = PairwiseKeySet::new(Ptk::from_bytes([3; 48]), Timestamp::from_millis(10_000), group)
            .with_eapol_counter(2);
        let msg1 = |counter| EapolKeyFrame::new(KeyMessage::Msg1, 0, counter, [5; 32], Vec::new());

        let unsigned = msg1(3);
        assert!(matches!(
            check_rekey_msg1(&crypto, &keys, &unsigned),
            Err(HandshakeError::MicFailure { message: 1 })
        ));

        let mut stale = msg1(2);
        stale.sign(&crypto, keys.ptk().kck()).unwrap();
        assert!(matches!(
            check_rekey_msg1(&crypto, &keys, &stale),
            Err(HandshakeError::StaleReplayCounter { counter: 2, last: 2 })
        ));

        let mut fresh = msg1(3);
        fresh.sign(&crypto, keys.ptk().kck()).unwrap();
        check_rekey_msg1(&crypto, &keys, &fresh).unwrap();
    }

    #[test]
    fn test_group_key_indices_wrap() {
        assert_eq!(next_group_key_index(0), 1);
        assert_eq!(next_group_key_index(3), 0);
    }

    #[test]
    fn test_checkpoint_cadence() {
        assert_eq!(checkpoint_due(0, 0), Some(FRAME_COUNTER_MARGIN));
        assert_eq!(checkpoint_due(10, FRAME_COUNTER_MARGIN), None);
        assert_eq!(
            checkpoint_due(FRAME_COUNTER_MARGIN / 2, FRAME_COUNTER_MARGIN),
            Some(FRAME_COUNTER_MARGIN / 2 + FRAME_COUNTER_MARGIN)
        );
        assert_eq!(checkpoint_due(u32::MAX, 0), Some(u32::MAX));
    }
}
