//! Handshake session state machine.
//!
//! One [`HandshakeSession`] runs per neighbor and is owned by that neighbor's
//! entry. The session never touches the neighbor table itself: the owner
//! feeds it frames and timer expiries and acts on the returned steps.
//!
//! ```text
//! AUTHENTICATOR                          SUPPLICANT
//!     |-- msg1 [ANonce] ------------------->|  derive PTK
//!     |<------------------ msg2 [SNonce, MIC]|
//!  derive PTK, verify MIC                   |
//!     |-- msg3 [KEK(GTK), MIC] ------------>|  verify MIC, unwrap GTK
//!     |<------------------------ msg4 [MIC]-|  install
//!  install                                  |
//! ```
//!
//! The authenticator retransmits msg1 and msg3 with the session's retry
//! policy. The supplicant answers exact retransmissions with its cached
//! response, so it never has to run retransmission timers of its own except
//! for a key request.

use lowmesh_core::{LinkAddr, Timestamp};
use lowmesh_crypto::CryptoProvider;
use tracing::{debug, error};

use super::constants::{
    KEY_INFO_ACK, KEY_INFO_ENCRYPTED_DATA, KEY_INFO_INSTALL, KEY_INFO_MIC, KEY_INFO_PAIRWISE,
    KEY_INFO_REQUEST, KEY_INFO_SECURE, NONCE_LEN, PMK_LEN,
};
use super::frame::{EapolKeyFrame, GroupKeyData, KeyMessage};
use super::keys::{GroupKey, PairwiseKeySet, Ptk};
use super::timing::RetryPolicy;
use crate::error::HandshakeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeRole {
    Authenticator,
    Supplicant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    Idle,
    /// Supplicant asked for a re-key and waits for message 1.
    SentRequest,
    SentMsg1,
    /// Supplicant answered message 1 and waits for message 3.
    SentMsg2,
    SentMsg3,
    /// Supplicant installed its keys and lingers to answer a repeated
    /// message 3 whose message 4 was lost.
    SentMsg4,
    Completed,
    Failed,
}

impl HandshakeState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::SentRequest => "sent-request",
            Self::SentMsg1 => "sent-msg1",
            Self::SentMsg2 => "sent-msg2",
            Self::SentMsg3 => "sent-msg3",
            Self::SentMsg4 => "sent-msg4",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Settings shared by every session on an interface.
#[derive(Clone)]
pub struct SessionConfig {
    pub pmk: [u8; PMK_LEN],
    pub policy: RetryPolicy,
    pub pairwise_lifetime_ms: u64,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("policy", &self.policy)
            .field("pairwise_lifetime_ms", &self.pairwise_lifetime_ms)
            .finish_non_exhaustive()
    }
}

/// What the owner should do after feeding a frame in.
#[derive(Debug, Default)]
pub struct HandshakeStep {
    /// Serialized EAPOL-Key frame to send to the peer.
    pub send: Option<Vec<u8>>,
    /// Keys to install on the neighbor entry.
    pub installed: Option<PairwiseKeySet>,
}

impl HandshakeStep {
    fn none() -> Self {
        Self::default()
    }

    fn send(bytes: Vec<u8>) -> Self {
        Self {
            send: Some(bytes),
            installed: None,
        }
    }
}

/// Result of a timer check.
#[derive(Debug, PartialEq, Eq)]
pub enum TimerOutcome {
    /// Nothing due yet.
    Pending,
    /// Send these bytes again.
    Retransmit(Vec<u8>),
    /// The session has run its course and can be dropped.
    Finished,
}

#[derive(Debug)]
pub struct HandshakeSession {
    role: HandshakeRole,
    state: HandshakeState,
    local: LinkAddr,
    peer: LinkAddr,
    config: SessionConfig,
    anonce: [u8; NONCE_LEN],
    snonce: [u8; NONCE_LEN],
    /// Authenticator: counter of the last message sent.
    /// Supplicant: counter of the last message accepted.
    replay_counter: u64,
    ptk: Option<Ptk>,
    group: Option<GroupKey>,
    last_sent: Option<Vec<u8>>,
    attempts: u8,
    deadline: Option<Timestamp>,
    cancelled: bool,
}

impl HandshakeSession {
    fn new(role: HandshakeRole, local: LinkAddr, peer: LinkAddr, config: SessionConfig) -> Self {
        Self {
            role,
            state: HandshakeState::Idle,
            local,
            peer,
            config,
            anonce: [0u8; NONCE_LEN],
            snonce: [0u8; NONCE_LEN],
            replay_counter: 0,
            ptk: None,
            group: None,
            last_sent: None,
            attempts: 0,
            deadline: None,
            cancelled: false,
        }
    }

    /// Start an authenticator session. Returns the session and message 1.
    pub fn start_authenticator(
        local: LinkAddr,
        peer: LinkAddr,
        config: SessionConfig,
        group: GroupKey,
        crypto: &mut dyn CryptoProvider,
        now: Timestamp,
    ) -> (Self, Vec<u8>) {
        let mut session = Self::new(HandshakeRole::Authenticator, local, peer, config);
        session.group = Some(group);
        crypto.fill_random(&mut session.anonce);
        session.replay_counter = 1;

        let msg1 = session.msg1(KEY_INFO_PAIRWISE | KEY_INFO_ACK).serialize();
        session.arm(HandshakeState::SentMsg1, msg1.clone(), now);
        (session, msg1)
    }

    /// Start an authenticator session toward a peer that already holds
    /// `current` keys from us.
    ///
    /// Message 1 continues the replay counter of `current` and carries a MIC
    /// under its KCK, so the peer can tell it apart from a forged or
    /// replayed one and keep its keys until the new set is installed.
    pub fn start_rekey_authenticator(
        local: LinkAddr,
        peer: LinkAddr,
        config: SessionConfig,
        group: GroupKey,
        current: &PairwiseKeySet,
        crypto: &mut dyn CryptoProvider,
        now: Timestamp,
    ) -> Result<(Self, Vec<u8>), HandshakeError> {
        let mut session = Self::new(HandshakeRole::Authenticator, local, peer, config);
        session.group = Some(group);
        crypto.fill_random(&mut session.anonce);
        session.replay_counter = current.eapol_counter() + 1;

        let mut msg1 = session.msg1(KEY_INFO_PAIRWISE | KEY_INFO_ACK | KEY_INFO_MIC);
        msg1.sign(crypto, current.ptk().kck())?;
        let bytes = msg1.serialize();
        session.arm(HandshakeState::SentMsg1, bytes.clone(), now);
        Ok((session, bytes))
    }

    fn msg1(&self, key_info: u16) -> EapolKeyFrame {
        EapolKeyFrame::new(KeyMessage::Msg1, key_info, self.replay_counter, self.anonce, Vec::new())
    }

    /// A supplicant session waiting for message 1.
    pub fn supplicant(local: LinkAddr, peer: LinkAddr, config: SessionConfig) -> Self {
        Self::new(HandshakeRole::Supplicant, local, peer, config)
    }

    /// Start a supplicant-initiated re-key. The request carries a MIC under
    /// the expiring KCK when one is still held.
    pub fn start_rekey_request(
        local: LinkAddr,
        peer: LinkAddr,
        config: SessionConfig,
        old_kck: Option<&[u8]>,
        crypto: &mut dyn CryptoProvider,
        now: Timestamp,
    ) -> Result<(Self, Vec<u8>), HandshakeError> {
        let mut session = Self::supplicant(local, peer, config);
        let mut request = EapolKeyFrame::new(
            KeyMessage::Request,
            KEY_INFO_PAIRWISE | KEY_INFO_REQUEST | KEY_INFO_MIC,
            0,
            [0u8; NONCE_LEN],
            Vec::new(),
        );
        if let Some(kck) = old_kck {
            request.sign(crypto, kck)?;
        }
        let bytes = request.serialize();
        session.arm(HandshakeState::SentRequest, bytes.clone(), now);
        Ok((session, bytes))
    }

    pub fn role(&self) -> HandshakeRole {
        self.role
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn peer(&self) -> LinkAddr {
        self.peer
    }

    pub fn replay_counter(&self) -> u64 {
        self.replay_counter
    }

    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.deadline
    }

    /// Whether the session can be dropped by its owner.
    pub fn is_finished(&self) -> bool {
        self.cancelled || matches!(self.state, HandshakeState::Completed | HandshakeState::Failed)
    }

    /// Mark the session for disposal on the owner's next pass.
    pub fn cancel(&mut self) {
        debug!(peer = %self.peer, state = self.state.as_str(), "eapol: session cancelled");
        self.cancelled = true;
        self.deadline = None;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Feed a received EAPOL-Key frame to the session.
    ///
    /// Fatal errors (see [`HandshakeError::is_fatal`]) leave the session in
    /// [`HandshakeState::Failed`]; other errors mean the frame was ignored.
    pub fn on_frame(
        &mut self,
        frame: &EapolKeyFrame,
        crypto: &mut dyn CryptoProvider,
        now: Timestamp,
    ) -> Result<HandshakeStep, HandshakeError> {
        if self.is_finished() {
            return Ok(HandshakeStep::none());
        }
        let result = match (self.role, frame.message) {
            (HandshakeRole::Authenticator, KeyMessage::Msg2) => self.on_msg2(frame, crypto, now),
            (HandshakeRole::Authenticator, KeyMessage::Msg4) => self.on_msg4(frame, crypto, now),
            (HandshakeRole::Supplicant, KeyMessage::Msg1) => self.on_msg1(frame, crypto, now),
            (HandshakeRole::Supplicant, KeyMessage::Msg3) => self.on_msg3(frame, crypto, now),
            _ => Err(HandshakeError::UnexpectedMessage {
                message: frame.message.number(),
                state: self.state.as_str(),
            }),
        };
        result.map_err(|e| self.abort(e))
    }

    /// Drive retransmission and give-up timers.
    pub fn on_timeout(&mut self, now: Timestamp) -> Result<TimerOutcome, HandshakeError> {
        if self.is_finished() {
            return Ok(TimerOutcome::Pending);
        }
        let Some(deadline) = self.deadline else {
            return Ok(TimerOutcome::Pending);
        };
        if !now.reached(deadline) {
            return Ok(TimerOutcome::Pending);
        }

        match self.state {
            HandshakeState::SentMsg1 | HandshakeState::SentMsg3 | HandshakeState::SentRequest => {
                if self.attempts >= self.config.policy.max_retries {
                    return Err(self.abort(HandshakeError::RetriesExhausted {
                        attempts: self.attempts + 1,
                    }));
                }
                let Some(bytes) = self.last_sent.clone() else {
                    return Ok(TimerOutcome::Pending);
                };
                self.attempts += 1;
                let timeout = self.config.policy.timeout_for_attempt(self.attempts);
                self.deadline = Some(now.after_ms(timeout));
                debug!(
                    peer = %self.peer,
                    state = self.state.as_str(),
                    attempt = self.attempts,
                    "eapol: retransmit"
                );
                Ok(TimerOutcome::Retransmit(bytes))
            }
            HandshakeState::SentMsg2 => Err(self.abort(HandshakeError::TimedOut {
                state: HandshakeState::SentMsg2.as_str(),
            })),
            HandshakeState::SentMsg4 => {
                self.state = HandshakeState::Completed;
                self.deadline = None;
                self.last_sent = None;
                Ok(TimerOutcome::Finished)
            }
            _ => Ok(TimerOutcome::Pending),
        }
    }

    // -----------------------------------------------------------------------
    // Authenticator
    // -----------------------------------------------------------------------

    fn on_msg2(
        &mut self,
        frame: &EapolKeyFrame,
        crypto: &mut dyn CryptoProvider,
        now: Timestamp,
    ) -> Result<HandshakeStep, HandshakeError> {
        // A repeated msg2 answering an earlier msg1 retransmission.
        if self.state == HandshakeState::SentMsg3 && frame.replay_counter < self.replay_counter {
            return Ok(HandshakeStep::none());
        }
        self.expect_state(HandshakeState::SentMsg1, frame)?;
        self.expect_counter(frame.replay_counter)?;

        let ptk = Ptk::derive(
            crypto,
            &self.config.pmk,
            self.local.as_ref(),
            self.peer.as_ref(),
            &self.anonce,
            &frame.nonce,
        )?;
        frame.verify(crypto, ptk.kck())?;
        self.snonce = frame.nonce;

        let Some(group) = self.group.clone() else {
            return Err(HandshakeError::NoGroupKey);
        };
        let mut iv = [0u8; 16];
        crypto.fill_random(&mut iv);
        let key_data = GroupKeyData {
            index: group.index,
            lifetime_secs: group.remaining_secs(now),
            iv,
            wrapped: crypto.wrap_key(&ptk.kek(), &iv, &group.key),
        };

        self.replay_counter += 1;
        let mut msg3 = EapolKeyFrame::new(
            KeyMessage::Msg3,
            KEY_INFO_PAIRWISE
                | KEY_INFO_INSTALL
                | KEY_INFO_ACK
                | KEY_INFO_MIC
                | KEY_INFO_SECURE
                | KEY_INFO_ENCRYPTED_DATA,
            self.replay_counter,
            self.anonce,
            key_data.encode(),
        );
        msg3.sign(crypto, ptk.kck())?;
        self.ptk = Some(ptk);

        let bytes = msg3.serialize();
        self.arm(HandshakeState::SentMsg3, bytes.clone(), now);
        Ok(HandshakeStep::send(bytes))
    }

    fn on_msg4(
        &mut self,
        frame: &EapolKeyFrame,
        crypto: &mut dyn CryptoProvider,
        now: Timestamp,
    ) -> Result<HandshakeStep, HandshakeError> {
        self.expect_state(HandshakeState::SentMsg3, frame)?;
        self.expect_counter(frame.replay_counter)?;
        let (Some(ptk), Some(group)) = (self.ptk.clone(), self.group.clone()) else {
            return Err(HandshakeError::UnexpectedMessage {
                message: frame.message.number(),
                state: self.state.as_str(),
            });
        };
        frame.verify(crypto, ptk.kck())?;

        self.state = HandshakeState::Completed;
        self.deadline = None;
        self.last_sent = None;
        debug!(peer = %self.peer, "eapol: authenticator completed");

        let keys = PairwiseKeySet::new(ptk, now.after_ms(self.config.pairwise_lifetime_ms), group)
            .with_eapol_counter(self.replay_counter);
        Ok(HandshakeStep {
            send: None,
            installed: Some(keys),
        })
    }

    // -----------------------------------------------------------------------
    // Supplicant
    // -----------------------------------------------------------------------

    fn on_msg1(
        &mut self,
        frame: &EapolKeyFrame,
        crypto: &mut dyn CryptoProvider,
        now: Timestamp,
    ) -> Result<HandshakeStep, HandshakeError> {
        match self.state {
            HandshakeState::SentMsg2
                if frame.replay_counter == self.replay_counter && frame.nonce == self.anonce =>
            {
                return Ok(self.resend_cached());
            }
            HandshakeState::SentMsg2 | HandshakeState::SentMsg4
                if frame.replay_counter <= self.replay_counter =>
            {
                return Err(HandshakeError::StaleReplayCounter {
                    counter: frame.replay_counter,
                    last: self.replay_counter,
                });
            }
            HandshakeState::Idle
            | HandshakeState::SentRequest
            | HandshakeState::SentMsg2
            | HandshakeState::SentMsg4 => {}
            _ => {
                return Err(HandshakeError::UnexpectedMessage {
                    message: 1,
                    state: self.state.as_str(),
                });
            }
        }

        self.anonce = frame.nonce;
        self.replay_counter = frame.replay_counter;
        crypto.fill_random(&mut self.snonce);
        let ptk = Ptk::derive(
            crypto,
            &self.config.pmk,
            self.local.as_ref(),
            self.peer.as_ref(),
            &self.snonce,
            &self.anonce,
        )?;

        let mut msg2 = EapolKeyFrame::new(
            KeyMessage::Msg2,
            KEY_INFO_PAIRWISE | KEY_INFO_MIC,
            self.replay_counter,
            self.snonce,
            Vec::new(),
        );
        msg2.sign(crypto, ptk.kck())?;
        self.ptk = Some(ptk);

        let bytes = msg2.serialize();
        self.state = HandshakeState::SentMsg2;
        self.last_sent = Some(bytes.clone());
        self.attempts = 0;
        self.deadline = Some(now.after_ms(self.config.policy.total_window_ms()));
        debug!(peer = %self.peer, state = self.state.as_str(), "eapol: transition");
        Ok(HandshakeStep::send(bytes))
    }

    fn on_msg3(
        &mut self,
        frame: &EapolKeyFrame,
        crypto: &mut dyn CryptoProvider,
        now: Timestamp,
    ) -> Result<HandshakeStep, HandshakeError> {
        if self.state == HandshakeState::SentMsg4 && frame.replay_counter == self.replay_counter {
            return Ok(self.resend_cached());
        }
        self.expect_state(HandshakeState::SentMsg2, frame)?;
        if frame.replay_counter <= self.replay_counter {
            return Err(HandshakeError::StaleReplayCounter {
                counter: frame.replay_counter,
                last: self.replay_counter,
            });
        }
        let Some(ptk) = self.ptk.clone() else {
            return Err(HandshakeError::UnexpectedMessage {
                message: 3,
                state: self.state.as_str(),
            });
        };
        frame.verify(crypto, ptk.kck())?;
        if frame.nonce != self.anonce {
            return Err(HandshakeError::NonceMismatch { message: 3 });
        }

        let key_data = GroupKeyData::parse(&frame.key_data).map_err(|_| HandshakeError::KeyUnwrap)?;
        let key = crypto
            .unwrap_key(&ptk.kek(), &key_data.iv, &key_data.wrapped)
            .map_err(|_| HandshakeError::KeyUnwrap)?;
        let key: [u8; 16] = key
            .as_slice()
            .try_into()
            .map_err(|_| HandshakeError::KeyUnwrap)?;
        let group = GroupKey {
            index: key_data.index,
            key,
            expires_at: now.after_ms(u64::from(key_data.lifetime_secs) * 1000),
        };

        self.replay_counter = frame.replay_counter;
        let mut msg4 = EapolKeyFrame::new(
            KeyMessage::Msg4,
            KEY_INFO_PAIRWISE | KEY_INFO_MIC | KEY_INFO_SECURE,
            self.replay_counter,
            [0u8; NONCE_LEN],
            Vec::new(),
        );
        msg4.sign(crypto, ptk.kck())?;
        self.group = Some(group.clone());

        let bytes = msg4.serialize();
        self.state = HandshakeState::SentMsg4;
        self.last_sent = Some(bytes.clone());
        self.deadline = Some(now.after_ms(self.config.policy.total_window_ms()));
        debug!(peer = %self.peer, "eapol: supplicant installed keys");

        let keys = PairwiseKeySet::new(ptk, now.after_ms(self.config.pairwise_lifetime_ms), group)
            .with_eapol_counter(self.replay_counter);
        Ok(HandshakeStep {
            send: Some(bytes),
            installed: Some(keys),
        })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn arm(&mut self, state: HandshakeState, bytes: Vec<u8>, now: Timestamp) {
        self.state = state;
        self.last_sent = Some(bytes);
        self.attempts = 0;
        self.deadline = Some(now.after_ms(self.config.policy.timeout_for_attempt(0)));
        debug!(peer = %self.peer, state = state.as_str(), "eapol: transition");
    }

    fn resend_cached(&self) -> HandshakeStep {
        debug!(peer = %self.peer, state = self.state.as_str(), "eapol: answering retransmission");
        HandshakeStep {
            send: self.last_sent.clone(),
            installed: None,
        }
    }

    fn expect_state(&self, state: HandshakeState, frame: &EapolKeyFrame) -> Result<(), HandshakeError> {
        if self.state == state {
            Ok(())
        } else {
            Err(HandshakeError::UnexpectedMessage {
                message: frame.message.number(),
                state: self.state.as_str(),
            })
        }
    }

    fn expect_counter(&self, counter: u64) -> Result<(), HandshakeError> {
        if counter == self.replay_counter {
            Ok(())
        } else {
            Err(HandshakeError::StaleReplayCounter {
                counter,
                last: self.replay_counter,
            })
        }
    }

    fn abort(&mut self, err: HandshakeError) -> HandshakeError {
        if err.is_fatal() {
            error!(peer = %self.peer, state = self.state.as_str(), %err, "eapol: handshake aborted");
            self.state = HandshakeState::Failed;
            self.deadline = None;
            self.last_sent = None;
            self.ptk = None;
        } else {
            debug!(peer = %self.peer, %err, "eapol: frame ignored");
        }
        err
    }
}
