//! One mesh interface.
//!
//! [`MeshStack`] owns every table of a single interface (neighbors, keys,
//! routes, reassembly, transactions) and is driven sequentially by one
//! task: frames in through [`MeshStack::frame_received`], timers through
//! [`MeshStack::tick`], application requests through
//! [`MeshStack::send_request`]. Nothing inside blocks or sleeps; time is
//! always passed in. The stack's clock starts at zero when it is created.
//!
//! Outcomes the application cares about are queued as [`StackEvent`]s and
//! collected with [`MeshStack::drain_events`].

use std::collections::VecDeque;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info, trace, warn};

use lowmesh_core::constants::{DISPATCH_ADVERTISEMENT, DISPATCH_EAPOL, KEY_ID_PAIRWISE, MAC_MIC_LEN, NEXT_HEADER_COAP};
use lowmesh_core::frame::dispatch::with_dispatch;
use lowmesh_core::{
    Channel, Datagram, DatagramHeader, Dispatch, FragmentHeader, FrameType, LinkAddr, MacFrame, PanId,
    SecurityHeader, Timestamp,
};
use lowmesh_crypto::{CryptoProvider, SoftwareCrypto};
use lowmesh_protocol::coap::{
    CoapConfig, CoapMessage, CoapServer, MessageType, NotFoundHandler, RequestHandler, TransactionFailure,
    TransactionHandle, TransactionTable,
};
use lowmesh_protocol::eapol::{
    EapolKeyFrame, FrameCounter, GroupKey, HandshakeRole, HandshakeSession, HandshakeStep, KeyMessage,
    PairwiseKeySet, RetryPolicy, SessionConfig, TimerOutcome, TimingProfile,
};
use lowmesh_protocol::{AdmissionConfig, HandshakeError, MemoryMonitor, TrafficClass};
use lowmesh_transport::fhss::{FhssConfig, FhssStructure};
use lowmesh_transport::frag::{
    DEFAULT_FRAGMENT_PAYLOAD_SIZE, Fragmenter, ReassemblyConfig, ReassemblyTable,
};
use lowmesh_transport::neighbor::{Advertised, NeighborConfig, NeighborHandle, NeighborTable, TrustState};
use lowmesh_transport::rpl::constants::{
    DEFAULT_ADVERTISEMENT_INTERVAL_MS, DEFAULT_MIN_HOP_RANK_INCREASE, INFINITE_RANK,
};
use lowmesh_transport::rpl::{AdvertisedRoute, Advertisement, Dodag, DodagRole, RoutingConfig, RoutingTable};
use lowmesh_transport::ReassemblyError;

use crate::error::{FrameDrop, NodeError, SendError};
use crate::events::{FailureReason, StackEvent};
use crate::radio::RadioDriver;
use crate::security_ops;
use crate::storage_codec::{StoredFrameCounter, StoredGroupKey};
use crate::triage::{self, Acceptance, Verification};

pub const DEFAULT_PAIRWISE_KEY_LIFETIME_MS: u64 = 86_400_000;
pub const DEFAULT_GROUP_KEY_LIFETIME_MS: u64 = 30 * 86_400_000;
pub const DEFAULT_MAC_MAX_RETRIES: u8 = 3;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Validated runtime configuration of one interface.
#[derive(Clone)]
pub struct StackConfig {
    pub link_addr: LinkAddr,
    pub pan_id: PanId,
    pub role: DodagRole,
    /// Pre-shared pairwise master key.
    pub pmk: [u8; 32],
    pub timing: TimingProfile,
    /// Handshake retry budget. `None` uses the table of `timing`.
    pub retry_policy: Option<RetryPolicy>,
    pub pairwise_key_lifetime_ms: u64,
    pub group_key_lifetime_ms: u64,
    pub fhss: FhssConfig,
    pub fragment_payload_size: usize,
    pub reassembly: ReassemblyConfig,
    pub neighbors: NeighborConfig,
    pub routing: RoutingConfig,
    pub min_hop_rank_increase: u16,
    pub advertisement_interval_ms: u64,
    pub coap: CoapConfig,
    pub admission: AdmissionConfig,
    /// Link-layer retries for busy channels and missing acks.
    pub mac_max_retries: u8,
    /// Seeds every random source for reproducible runs. `None` draws from
    /// the operating system.
    pub seed: Option<u64>,
}

impl StackConfig {
    /// Defaults for everything except identity and the shared secret.
    pub fn new(link_addr: LinkAddr, pan_id: PanId, role: DodagRole, pmk: [u8; 32]) -> Self {
        Self {
            link_addr,
            pan_id,
            role,
            pmk,
            timing: TimingProfile::default(),
            retry_policy: None,
            pairwise_key_lifetime_ms: DEFAULT_PAIRWISE_KEY_LIFETIME_MS,
            group_key_lifetime_ms: DEFAULT_GROUP_KEY_LIFETIME_MS,
            fhss: FhssConfig::default(),
            fragment_payload_size: DEFAULT_FRAGMENT_PAYLOAD_SIZE,
            reassembly: ReassemblyConfig::default(),
            neighbors: NeighborConfig::default(),
            routing: RoutingConfig::default(),
            min_hop_rank_increase: DEFAULT_MIN_HOP_RANK_INCREASE,
            advertisement_interval_ms: DEFAULT_ADVERTISEMENT_INTERVAL_MS,
            coap: CoapConfig::default(),
            admission: AdmissionConfig::default(),
            mac_max_retries: DEFAULT_MAC_MAX_RETRIES,
            seed: None,
        }
    }

    /// The handshake retry budget in effect.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy.unwrap_or_else(|| self.timing.policy())
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            pmk: self.pmk,
            policy: self.retry_policy(),
            pairwise_lifetime_ms: self.pairwise_key_lifetime_ms,
        }
    }
}

impl fmt::Debug for StackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackConfig")
            .field("link_addr", &self.link_addr)
            .field("pan_id", &self.pan_id)
            .field("role", &self.role)
            .field("timing", &self.timing)
            .field("retry_policy", &self.retry_policy)
            .field("fhss", &self.fhss)
            .field("fragment_payload_size", &self.fragment_payload_size)
            .field("mac_max_retries", &self.mac_max_retries)
            .finish_non_exhaustive()
    }
}

/// State that should be written to storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    pub group_key: Option<StoredGroupKey>,
    pub frame_counter: Option<StoredFrameCounter>,
}

impl Checkpoint {
    pub fn is_empty(&self) -> bool {
        self.group_key.is_none() && self.frame_counter.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protection {
    None,
    Pairwise,
    Group,
}

// ---------------------------------------------------------------------------
// Stack
// ---------------------------------------------------------------------------

pub struct MeshStack<R: RadioDriver> {
    config: StackConfig,
    radio: R,
    crypto: Box<dyn CryptoProvider>,
    handler: Box<dyn RequestHandler>,
    fhss: FhssStructure,
    admission: MemoryMonitor,
    fragmenter: Fragmenter,
    reassembly: ReassemblyTable,
    neighbors: NeighborTable,
    routes: RoutingTable,
    dodag: Dodag,
    transactions: TransactionTable,
    server: CoapServer,
    group_key: Option<GroupKey>,
    group_key_dirty: bool,
    /// Transmit counter for group-secured frames.
    group_counter: FrameCounter,
    persisted_counter: u32,
    mac_seq: u8,
    next_advertisement: Timestamp,
    events: VecDeque<StackEvent>,
}

impl<R: RadioDriver> MeshStack<R> {
    /// Build an interface. Fails if the channel plan leaves nothing to hop
    /// over or the fragment size is unusable.
    ///
    /// A border router generates its first group key here; a restored one
    /// replaces it through [`MeshStack::restore`].
    pub fn new(config: StackConfig, radio: R) -> Result<Self, NodeError> {
        let own = config.link_addr;
        if own.is_broadcast() {
            return Err(NodeError::Config("link address must not be broadcast".into()));
        }
        config
            .admission
            .validate()
            .map_err(|e| NodeError::Config(format!("admission: {e}")))?;
        config
            .retry_policy()
            .validate()
            .map_err(|e| NodeError::Config(format!("retry policy: {e}")))?;

        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut crypto: Box<dyn CryptoProvider> = match config.seed {
            Some(_) => Box::new(SoftwareCrypto::with_seed(rng.gen_range(0..=u64::MAX))),
            None => Box::new(SoftwareCrypto::new()),
        };

        let mut fhss = FhssStructure::new(config.fhss.clone(), own);
        fhss.rederive(config.pan_id.0)?;
        let fragmenter = Fragmenter::new(config.fragment_payload_size, rng.gen_range(0..=u16::MAX))?;
        let transactions = TransactionTable::new(config.coap.clone(), rng.gen_range(0..=u64::MAX));
        let server = CoapServer::new(&config.coap, rng.gen_range(0..=u16::MAX));

        let mut events = VecDeque::new();
        let group_key = match config.role {
            DodagRole::BorderRouter => {
                let expires = Timestamp::ZERO.after_ms(config.group_key_lifetime_ms);
                let key = GroupKey::generate(crypto.as_mut(), 0, expires);
                info!(index = key.index, "security: group key generated");
                events.push_back(StackEvent::GroupKeyInstalled { index: key.index });
                Some(key)
            }
            DodagRole::Router => None,
        };

        info!(
            link_addr = %own,
            pan_id = config.pan_id.0,
            role = ?config.role,
            timing = config.timing.as_str(),
            "stack: interface created"
        );

        Ok(Self {
            radio,
            crypto,
            handler: Box::new(NotFoundHandler),
            fhss,
            admission: MemoryMonitor::new(config.admission.clone()),
            fragmenter,
            reassembly: ReassemblyTable::new(config.reassembly),
            neighbors: NeighborTable::new(config.neighbors),
            routes: RoutingTable::new(config.routing),
            dodag: Dodag::new(config.role, own, config.min_hop_rank_increase),
            transactions,
            server,
            group_key_dirty: group_key.is_some(),
            group_key,
            group_counter: FrameCounter::new(),
            persisted_counter: 0,
            mac_seq: 0,
            next_advertisement: Timestamp::ZERO,
            events,
            config,
        })
    }

    /// Serve inbound requests with `handler` instead of answering 4.04.
    #[must_use]
    pub fn with_handler(mut self, handler: impl RequestHandler + 'static) -> Self {
        self.handler = Box::new(handler);
        self
    }

    /// Swap the crypto provider, e.g. for a hardware-backed one.
    #[must_use]
    pub fn with_crypto(mut self, crypto: Box<dyn CryptoProvider>) -> Self {
        self.crypto = crypto;
        self
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn link_addr(&self) -> LinkAddr {
        self.config.link_addr
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn dodag(&self) -> &Dodag {
        &self.dodag
    }

    pub fn fhss(&self) -> &FhssStructure {
        &self.fhss
    }

    pub fn reassembly(&self) -> &ReassemblyTable {
        &self.reassembly
    }

    pub fn transactions(&self) -> &TransactionTable {
        &self.transactions
    }

    pub fn admission(&self) -> &MemoryMonitor {
        &self.admission
    }

    /// Mutable access for feeding external memory readings.
    pub fn admission_mut(&mut self) -> &mut MemoryMonitor {
        &mut self.admission
    }

    pub fn group_key(&self) -> Option<&GroupKey> {
        self.group_key.as_ref()
    }

    /// Whether we can hand out a group key: the root always can, a router
    /// once it holds an unexpired one.
    pub fn is_authenticator_capable(&self, now: Timestamp) -> bool {
        self.dodag.is_root() || self.holds_group_key(now)
    }

    /// Take every queued event, oldest first.
    pub fn drain_events(&mut self) -> Vec<StackEvent> {
        self.events.drain(..).collect()
    }

    // -----------------------------------------------------------------------
    // Application requests
    // -----------------------------------------------------------------------

    /// Send a CoAP request to `destination`. The outcome arrives later as a
    /// [`StackEvent::Response`] or [`StackEvent::RequestFailed`] carrying the
    /// returned handle.
    pub fn send_request(
        &mut self,
        destination: LinkAddr,
        request: CoapMessage,
        confirmable: bool,
        now: Timestamp,
    ) -> Result<TransactionHandle, FailureReason> {
        self.submit_request(destination, request, confirmable, false, now)
    }

    /// Like [`MeshStack::send_request`], flagged priority so it is still
    /// admitted under high memory pressure.
    pub fn send_priority_request(
        &mut self,
        destination: LinkAddr,
        request: CoapMessage,
        confirmable: bool,
        now: Timestamp,
    ) -> Result<TransactionHandle, FailureReason> {
        self.submit_request(destination, request, confirmable, true, now)
    }

    /// Cooperative cancellation: the transaction is discarded on the next
    /// tick and no outcome is reported for it.
    pub fn cancel_request(&mut self, handle: TransactionHandle) -> bool {
        self.transactions.cancel(handle)
    }

    /// Mark the handshake with `neighbor` for teardown on the next tick.
    pub fn cancel_handshake(&mut self, neighbor: &LinkAddr) -> bool {
        match self.neighbors.by_addr_mut(neighbor).and_then(|e| e.handshake_mut()) {
            Some(session) => {
                session.cancel();
                true
            }
            None => false,
        }
    }

    fn submit_request(
        &mut self,
        destination: LinkAddr,
        request: CoapMessage,
        confirmable: bool,
        priority: bool,
        now: Timestamp,
    ) -> Result<TransactionHandle, FailureReason> {
        let Some(next_hop) = self.resolve_next_hop(&destination) else {
            debug!(destination = %destination, "coap: no route for request");
            return Err(FailureReason::Unreachable);
        };
        let class = if priority {
            TrafficClass::Priority
        } else {
            TrafficClass::Normal
        };
        let (handle, bytes) = self
            .transactions
            .create(destination, next_hop, request, confirmable, class, &self.admission, now)
            .map_err(|err| {
                warn!(destination = %destination, %err, "coap: request refused");
                FailureReason::from(&err)
            })?;

        match self.send_coap(destination, next_hop, &bytes, priority, now) {
            Ok(()) => Ok(handle),
            // The transaction keeps its timers; a lost first transmission
            // is retried or times out like any other.
            Err(SendError::Radio(err)) => {
                debug!(handle = handle.id(), %err, "coap: first transmission lost");
                Ok(handle)
            }
            Err(err) => {
                self.transactions.cancel(handle);
                warn!(destination = %destination, %err, "coap: request not sent");
                Err(err.reason())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Apply state loaded from storage at startup.
    pub fn restore(&mut self, group: Option<StoredGroupKey>, counter: Option<StoredFrameCounter>, now: Timestamp) {
        if let Some(counter) = counter {
            let resume = counter.high_water.max(self.group_counter.tx());
            self.group_counter = FrameCounter::starting_at(resume);
            self.persisted_counter = counter.high_water;
            info!(frame_counter = resume, "security: frame counter restored");
        }
        if let Some(record) = group {
            match record.into_group_key(now) {
                Some(key) => {
                    info!(index = key.index, "security: group key restored");
                    self.events.push_back(StackEvent::GroupKeyInstalled { index: key.index });
                    self.group_key = Some(key);
                    self.group_key_dirty = false;
                }
                None => debug!("security: stored group key already expired"),
            }
        }
    }

    /// Collect what changed since the last checkpoint. The frame counter is
    /// persisted ahead of use so a restart never reuses a value.
    pub fn take_checkpoint(&mut self, now: Timestamp) -> Checkpoint {
        let group_key = if self.group_key_dirty {
            self.group_key_dirty = false;
            self.group_key
                .as_ref()
                .map(|key| StoredGroupKey::from_group_key(key, now))
        } else {
            None
        };
        let frame_counter =
            security_ops::checkpoint_due(self.group_counter.tx(), self.persisted_counter).map(|high_water| {
                self.persisted_counter = high_water;
                StoredFrameCounter { high_water }
            });
        Checkpoint {
            group_key,
            frame_counter,
        }
    }

    // -----------------------------------------------------------------------
    // Receive path
    // -----------------------------------------------------------------------

    /// Process one frame handed over by the radio driver.
    ///
    /// A dropped frame is reported as `Err` and otherwise leaves no trace;
    /// the interface keeps running.
    pub fn frame_received(&mut self, bytes: &[u8], channel: Channel, now: Timestamp) -> Result<(), FrameDrop> {
        let result = self.process_frame(bytes, now);
        if let Err(drop) = &result {
            match drop {
                FrameDrop::BadMic | FrameDrop::Counter(_) => {
                    warn!(%channel, %drop, "mac: secured frame rejected");
                }
                _ => debug!(%channel, %drop, "mac: frame dropped"),
            }
        }
        self.collect_band_changes();
        result
    }

    fn process_frame(&mut self, bytes: &[u8], now: Timestamp) -> Result<(), FrameDrop> {
        let frame = MacFrame::parse(bytes)?;
        triage::check_addressing(&frame, self.config.link_addr, self.config.pan_id)?;
        let dispatch = Dispatch::parse(&frame.payload)?;
        let class = triage::traffic_class(&dispatch);
        self.admission.check_inbound(class)?;

        let verification = self.verify_frame(&frame, now)?;
        let acceptance = triage::accept(&dispatch, verification)?;
        let peer = frame.src;
        trace!(peer = %peer, seq = frame.seq, len = bytes.len(), ?verification, "mac: frame accepted");
        let handle = self.neighbors.insert_or_touch(peer, class, &self.admission, now)?;

        match (acceptance, dispatch) {
            (Acceptance::Handshake, Dispatch::Eapol(body)) => self.on_eapol(handle, peer, body, now),
            (Acceptance::Advertisement { trusted }, Dispatch::Advertisement(body)) => {
                self.on_advertisement(handle, peer, body, trusted, now)
            }
            (Acceptance::Data, Dispatch::Datagram(raw)) => self.on_datagram(raw, now),
            (Acceptance::Data, Dispatch::Fragment { header, data }) => {
                self.on_fragment(peer, header, data, class, now)
            }
            _ => Ok(()),
        }
    }

    /// Check the MIC and replay counter of a secured frame.
    fn verify_frame(&mut self, frame: &MacFrame, now: Timestamp) -> Result<Verification, FrameDrop> {
        let Some(security) = frame.security else {
            return Ok(Verification::Unsecured);
        };
        let mic = frame.mic.ok_or(FrameDrop::BadMic)?;
        let authenticated = frame.authenticated_part();

        if security.key_id == KEY_ID_PAIRWISE {
            let keys = self
                .neighbors
                .by_addr_mut(&frame.src)
                .and_then(|entry| entry.keys_mut())
                .ok_or(FrameDrop::Unauthenticated)?;
            self.crypto
                .verify_mic(keys.ptk().tk(), &[authenticated.as_slice()], &mic)
                .map_err(|_| FrameDrop::BadMic)?;
            keys.accept_rx(security.frame_counter, now)?;
            return Ok(Verification::Pairwise);
        }

        let Some(group) = self
            .group_key
            .as_ref()
            .filter(|g| g.key_id() == security.key_id && !g.is_expired(now))
        else {
            return Ok(Verification::GroupUnknown(security.key_id));
        };
        self.crypto
            .verify_mic(&group.key, &[authenticated.as_slice()], &mic)
            .map_err(|_| FrameDrop::BadMic)?;
        if let Some(keys) = self.neighbors.by_addr_mut(&frame.src).and_then(|entry| entry.keys_mut()) {
            keys.accept_group_rx(security.frame_counter, now)?;
        }
        Ok(Verification::Group)
    }

    fn on_fragment(
        &mut self,
        peer: LinkAddr,
        header: FragmentHeader,
        data: &[u8],
        class: TrafficClass,
        now: Timestamp,
    ) -> Result<(), FrameDrop> {
        match self
            .reassembly
            .accept(peer, header, data, class, &mut self.admission, now)
        {
            Ok(Some(datagram)) => self.on_datagram(&datagram, now),
            Ok(None) => Ok(()),
            Err(err) => {
                if err.dropped_context() {
                    self.events.push_back(StackEvent::ReassemblyFailed {
                        peer,
                        tag: header.tag(),
                        error: err.clone(),
                    });
                }
                Err(err.into())
            }
        }
    }

    fn on_datagram(&mut self, raw: &[u8], now: Timestamp) -> Result<(), FrameDrop> {
        let datagram = Datagram::parse(raw)?;
        if datagram.header.dst != self.config.link_addr {
            return self.forward(datagram, now);
        }
        if datagram.header.next_header != NEXT_HEADER_COAP {
            debug!(next_header = datagram.header.next_header, "mesh: unknown next header");
            return Ok(());
        }
        let message = CoapMessage::decode(&datagram.payload)?;
        self.on_coap(datagram.header.src, datagram.header.priority, message, now)
    }

    fn forward(&mut self, mut datagram: Datagram, now: Timestamp) -> Result<(), FrameDrop> {
        let header = &mut datagram.header;
        if header.hop_limit <= 1 {
            return Err(FrameDrop::HopLimit);
        }
        header.hop_limit -= 1;
        let destination = header.dst;
        let next_hop = self
            .resolve_next_hop(&destination)
            .ok_or(SendError::NoRoute(destination))?;
        trace!(destination = %destination, next_hop = %next_hop, "mesh: forwarding datagram");
        let bytes = datagram.serialize()?;
        self.send_datagram(next_hop, &bytes, now)?;
        Ok(())
    }

    fn on_coap(&mut self, src: LinkAddr, priority: bool, message: CoapMessage, now: Timestamp) -> Result<(), FrameDrop> {
        if message.code.is_request() {
            let reply = self
                .server
                .handle_request(src, &message, self.handler.as_mut(), now)?;
            let next_hop = self.resolve_next_hop(&src).ok_or(SendError::NoRoute(src))?;
            self.send_coap(src, next_hop, &reply.bytes, priority, now)?;
            return Ok(());
        }

        if message.mtype == MessageType::Confirmable && message.code.is_response() {
            let ack = CoapMessage::empty_ack(message.message_id).encode()?;
            match self.resolve_next_hop(&src) {
                Some(next_hop) => {
                    if let Err(err) = self.send_coap(src, next_hop, &ack, priority, now) {
                        debug!(peer = %src, %err, "coap: ack for separate response not sent");
                    }
                }
                None => debug!(peer = %src, "coap: no route to ack separate response"),
            }
        }

        match self.transactions.on_message(src, &message, now) {
            Some(outcome) => self.events.push_back(outcome.into()),
            None => trace!(peer = %src, mid = message.message_id, "coap: message matched no transaction"),
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Handshakes
    // -----------------------------------------------------------------------

    fn on_eapol(&mut self, handle: NeighborHandle, peer: LinkAddr, body: &[u8], now: Timestamp) -> Result<(), FrameDrop> {
        let frame = EapolKeyFrame::parse(body)?;
        match frame.message {
            KeyMessage::Request => return self.on_key_request(handle, peer, now),
            KeyMessage::Msg1 => self.prepare_supplicant(handle, peer, &frame, now)?,
            _ => {}
        }

        let Some(mut session) = self.neighbors.get_mut(handle).and_then(|e| e.take_handshake()) else {
            debug!(neighbor = %peer, message = frame.message.number(), "eapol: no session, frame ignored");
            return Ok(());
        };
        let result = session.on_frame(&frame, self.crypto.as_mut(), now);
        self.settle_handshake(handle, session, result, now)
    }

    /// Make sure a supplicant session is ready for an incoming message 1.
    ///
    /// A neighbor with live keys only re-keys on a message 1 that proves
    /// possession of them; anything else is dropped and trust is untouched.
    fn prepare_supplicant(
        &mut self,
        handle: NeighborHandle,
        peer: LinkAddr,
        frame: &EapolKeyFrame,
        now: Timestamp,
    ) -> Result<(), HandshakeError> {
        let local = self.config.link_addr;
        let session_config = self.config.session_config();
        let Some(entry) = self.neighbors.get_mut(handle) else {
            return Ok(());
        };
        let authenticated = entry.trust() == TrustState::Authenticated;
        let live_keys = entry
            .keys()
            .filter(|keys| authenticated && !keys.is_pairwise_expired(now));
        if let Some(keys) = live_keys
            && let Err(err) = security_ops::check_rekey_msg1(self.crypto.as_ref(), keys, frame)
        {
            warn!(neighbor = %peer, %err, "eapol: message 1 for authenticated neighbor rejected");
            return Err(err);
        }
        let rekey = live_keys.is_some();
        let replace = match entry.handshake() {
            None => true,
            Some(session) => match session.role() {
                HandshakeRole::Supplicant => !security_ops::supplicant_reusable(session.state(), session.is_finished()),
                // Both sides started as authenticator: the lower address
                // keeps the role.
                HandshakeRole::Authenticator => session.is_finished() || peer < local,
            },
        };
        if !replace {
            return Ok(());
        }
        let session = HandshakeSession::supplicant(local, peer, session_config);
        if rekey {
            entry.begin_rekey(session);
            return Ok(());
        }
        let from = entry.trust();
        entry.begin_handshake(session);
        self.note_trust(peer, from, TrustState::HandshakeInProgress);
        Ok(())
    }

    fn on_key_request(&mut self, handle: NeighborHandle, peer: LinkAddr, now: Timestamp) -> Result<(), FrameDrop> {
        if !self.is_authenticator_capable(now) {
            debug!(neighbor = %peer, "eapol: key request ignored, no group key to hand out");
            return Ok(());
        }
        let outstanding = self.neighbors.get(handle).and_then(|e| e.handshake()).is_some_and(|s| {
            s.role() == HandshakeRole::Authenticator && !s.is_finished()
        });
        if outstanding {
            debug!(neighbor = %peer, "eapol: key request while handshake in progress");
            return Ok(());
        }
        self.start_authenticator(handle, peer, now)?;
        Ok(())
    }

    fn start_authenticator(&mut self, handle: NeighborHandle, peer: LinkAddr, now: Timestamp) -> Result<(), SendError> {
        let Some(group) = self.group_key.clone().filter(|g| !g.is_expired(now)) else {
            debug!(neighbor = %peer, "eapol: no group key, handshake not started");
            return Ok(());
        };
        let local = self.config.link_addr;
        let session_config = self.config.session_config();
        let Some(entry) = self.neighbors.get_mut(handle) else {
            return Ok(());
        };
        // A peer still holding our keys gets a message 1 signed under them.
        let started = match entry.keys() {
            Some(current) => HandshakeSession::start_rekey_authenticator(
                local,
                peer,
                session_config,
                group,
                current,
                self.crypto.as_mut(),
                now,
            ),
            None => Ok(HandshakeSession::start_authenticator(
                local,
                peer,
                session_config,
                group,
                self.crypto.as_mut(),
                now,
            )),
        };
        let (session, msg1) = match started {
            Ok(started) => started,
            Err(err) => {
                warn!(neighbor = %peer, %err, "eapol: message 1 could not be built");
                return Ok(());
            }
        };
        let from = entry.trust();
        if from == TrustState::Authenticated {
            entry.begin_rekey(session);
        } else {
            entry.begin_handshake(session);
            self.note_trust(peer, from, TrustState::HandshakeInProgress);
        }
        self.send_eapol(peer, msg1, now)
    }

    /// Re-run the handshake with a neighbor whose keys expired.
    fn restart_handshake(&mut self, handle: NeighborHandle, peer: LinkAddr, now: Timestamp) {
        let peer_capable = self
            .neighbors
            .get(handle)
            .and_then(|e| e.advertised)
            .is_some_and(|a| a.holds_gtk);
        let authenticator = security_ops::acts_as_authenticator(
            self.config.link_addr,
            peer,
            self.is_authenticator_capable(now),
            peer_capable,
        );
        let result = if authenticator {
            self.start_authenticator(handle, peer, now)
        } else {
            self.start_rekey_request(handle, peer, now)
        };
        if let Err(err) = result {
            debug!(neighbor = %peer, %err, "eapol: re-key not sent");
        }
    }

    fn start_rekey_request(&mut self, handle: NeighborHandle, peer: LinkAddr, now: Timestamp) -> Result<(), SendError> {
        let local = self.config.link_addr;
        let session_config = self.config.session_config();
        let Some(entry) = self.neighbors.get_mut(handle) else {
            return Ok(());
        };
        let old_kck = entry.keys().map(|keys| keys.ptk().kck().to_vec());
        let started = HandshakeSession::start_rekey_request(
            local,
            peer,
            session_config,
            old_kck.as_deref(),
            self.crypto.as_mut(),
            now,
        );
        let (session, request) = match started {
            Ok(started) => started,
            Err(err) => {
                warn!(neighbor = %peer, %err, "eapol: key request could not be built");
                return Ok(());
            }
        };
        let from = entry.trust();
        entry.begin_handshake(session);
        self.note_trust(peer, from, TrustState::HandshakeInProgress);
        self.send_eapol(peer, request, now)
    }

    /// Put a driven session back (or retire it) and act on its step.
    fn settle_handshake(
        &mut self,
        handle: NeighborHandle,
        session: HandshakeSession,
        result: Result<HandshakeStep, HandshakeError>,
        now: Timestamp,
    ) -> Result<(), FrameDrop> {
        let peer = session.peer();
        match result {
            Ok(HandshakeStep { send, installed }) => {
                if let Some(entry) = self.neighbors.get_mut(handle) {
                    if session.is_finished() {
                        entry.finish_handshake();
                    } else {
                        entry.restore_handshake(session);
                    }
                }
                if let Some(keys) = installed {
                    self.install_keys(handle, peer, keys, now);
                }
                if let Some(bytes) = send {
                    self.send_eapol(peer, bytes, now)?;
                }
                Ok(())
            }
            Err(err) if err.is_fatal() => {
                self.fail_handshake(handle, peer, &err, now);
                Err(err.into())
            }
            Err(err) => {
                if let Some(entry) = self.neighbors.get_mut(handle) {
                    entry.restore_handshake(session);
                }
                Err(err.into())
            }
        }
    }

    fn install_keys(&mut self, handle: NeighborHandle, peer: LinkAddr, keys: PairwiseKeySet, now: Timestamp) {
        let group = keys.group().clone();
        let Some(entry) = self.neighbors.get_mut(handle) else {
            return;
        };
        let from = entry.trust();
        if let Err(err) = entry.install_keys(keys) {
            warn!(neighbor = %peer, %err, "security: keys not installed");
            return;
        }
        if from == TrustState::Authenticated {
            info!(neighbor = %peer, "security: neighbor re-keyed");
        } else {
            info!(neighbor = %peer, "security: neighbor authenticated");
        }
        self.note_trust(peer, from, TrustState::Authenticated);
        self.learn_group_key(group, now);
        self.refresh_topology(now);
    }

    /// Adopt a group key received as supplicant. The root only ever uses
    /// its own.
    fn learn_group_key(&mut self, group: GroupKey, now: Timestamp) {
        if self.dodag.is_root() || group.is_expired(now) || self.group_key.as_ref() == Some(&group) {
            return;
        }
        let replaced = self.group_key.is_some();
        info!(index = group.index, "security: group key installed");
        self.events.push_back(StackEvent::GroupKeyInstalled { index: group.index });
        self.group_key = Some(group);
        self.group_key_dirty = true;
        if replaced {
            self.redistribute_group_key(now);
        }
    }

    /// Re-key every neighbor we authenticate so they pick up the current
    /// group key. They stay authenticated on their current keys meanwhile.
    fn redistribute_group_key(&mut self, now: Timestamp) {
        let local = self.config.link_addr;
        let targets: Vec<(NeighborHandle, LinkAddr)> = self
            .neighbors
            .authenticated()
            .filter(|(_, e)| {
                let peer_capable = e.advertised.is_some_and(|a| a.holds_gtk);
                e.handshake().is_none() && security_ops::acts_as_authenticator(local, e.addr(), true, peer_capable)
            })
            .map(|(h, e)| (h, e.addr()))
            .collect();
        for (handle, peer) in targets {
            if let Err(err) = self.start_authenticator(handle, peer, now) {
                debug!(neighbor = %peer, %err, "security: group key redistribution not sent");
            }
        }
    }

    fn fail_handshake(&mut self, handle: NeighborHandle, peer: LinkAddr, err: &HandshakeError, now: Timestamp) {
        match err {
            HandshakeError::RetriesExhausted { .. } | HandshakeError::TimedOut { .. } => {
                warn!(neighbor = %peer, %err, "security: handshake timed out");
            }
            _ => error!(neighbor = %peer, %err, "security: handshake aborted"),
        }
        let Some(entry) = self.neighbors.get_mut(handle) else {
            return;
        };
        let from = entry.trust();
        let event = StackEvent::HandshakeFailed {
            neighbor: peer,
            reason: FailureReason::from(err),
        };
        if from == TrustState::Authenticated {
            entry.abandon_rekey();
            info!(neighbor = %peer, "security: re-key abandoned, current keys kept");
            self.events.push_back(event);
            return;
        }
        entry.fail_handshake();
        self.note_trust(peer, from, TrustState::Unauthenticated);
        self.events.push_back(event);
        self.withdraw_neighbor(peer, now);
    }

    fn drive_handshakes(&mut self, now: Timestamp) {
        let active: Vec<NeighborHandle> = self
            .neighbors
            .iter()
            .filter(|(_, e)| e.handshake().is_some())
            .map(|(h, _)| h)
            .collect();

        for handle in active {
            let Some(mut session) = self.neighbors.get_mut(handle).and_then(|e| e.take_handshake()) else {
                continue;
            };
            let peer = session.peer();

            if session.is_cancelled() {
                debug!(neighbor = %peer, "security: cancelled handshake discarded");
                if let Some(entry) = self.neighbors.get_mut(handle) {
                    let from = entry.trust();
                    if from == TrustState::HandshakeInProgress {
                        entry.fail_handshake();
                        self.note_trust(peer, from, TrustState::Unauthenticated);
                        self.withdraw_neighbor(peer, now);
                    }
                }
                continue;
            }

            if session.is_finished() {
                if let Some(entry) = self.neighbors.get_mut(handle) {
                    entry.finish_handshake();
                }
                continue;
            }

            // A session that never armed a timer is waiting for a frame
            // that is not coming.
            if session.next_deadline().is_none() {
                let stalled = HandshakeError::TimedOut {
                    state: session.state().as_str(),
                };
                self.fail_handshake(handle, peer, &stalled, now);
                continue;
            }

            match session.on_timeout(now) {
                Ok(TimerOutcome::Pending) => {
                    if let Some(entry) = self.neighbors.get_mut(handle) {
                        entry.restore_handshake(session);
                    }
                }
                Ok(TimerOutcome::Retransmit(bytes)) => {
                    if let Some(entry) = self.neighbors.get_mut(handle) {
                        entry.restore_handshake(session);
                    }
                    if let Err(err) = self.send_eapol(peer, bytes, now) {
                        debug!(neighbor = %peer, %err, "eapol: retransmission not sent");
                    }
                }
                Ok(TimerOutcome::Finished) => {
                    if let Some(entry) = self.neighbors.get_mut(handle) {
                        entry.finish_handshake();
                    }
                }
                Err(err) => self.fail_handshake(handle, peer, &err, now),
            }
        }
    }

    fn expire_keys(&mut self, now: Timestamp) {
        for handle in self.neighbors.expire_keys(now) {
            let Some(peer) = self.neighbors.get(handle).map(|e| e.addr()) else {
                continue;
            };
            info!(neighbor = %peer, "security: pairwise keys expired");
            self.note_trust(peer, TrustState::Authenticated, TrustState::KeyExpired);
            self.withdraw_neighbor(peer, now);
            self.restart_handshake(handle, peer, now);
        }
    }

    /// Rotate the root's group key at expiry; a router simply lets go of an
    /// expired one and waits for its authenticator.
    fn rotate_group_key(&mut self, now: Timestamp) {
        let Some(current) = self.group_key.as_ref().filter(|g| g.is_expired(now)) else {
            return;
        };
        if !self.dodag.is_root() {
            info!(index = current.index, "security: group key expired");
            self.group_key = None;
            return;
        }
        let index = security_ops::next_group_key_index(current.index);
        let expires = now.after_ms(self.config.group_key_lifetime_ms);
        let key = GroupKey::generate(self.crypto.as_mut(), index, expires);
        info!(index, "security: group key rotated");
        self.events.push_back(StackEvent::GroupKeyInstalled { index });
        self.group_key = Some(key);
        self.group_key_dirty = true;
        self.redistribute_group_key(now);
    }

    fn holds_group_key(&self, now: Timestamp) -> bool {
        self.group_key.as_ref().is_some_and(|g| !g.is_expired(now))
    }

    fn send_eapol(&mut self, peer: LinkAddr, body: Vec<u8>, now: Timestamp) -> Result<(), SendError> {
        let payload = with_dispatch(DISPATCH_EAPOL, &body);
        self.transmit(peer, FrameType::Data, payload, Protection::None, now)
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    fn on_advertisement(
        &mut self,
        handle: NeighborHandle,
        peer: LinkAddr,
        body: &[u8],
        trusted: bool,
        now: Timestamp,
    ) -> Result<(), FrameDrop> {
        let adv = Advertisement::decode(body)?;
        let Some(entry) = self.neighbors.get_mut(handle) else {
            return Ok(());
        };
        entry.advertised = Some(advertised_info(&adv));
        let trust = entry.trust();
        let handshake_active = entry.handshake().is_some();
        self.fhss.learn_offset(peer, adv.unicast_channel_offset);

        if trusted {
            let candidates = route_candidates(peer, &adv);
            let refused = self
                .routes
                .replace_candidates_from(handle, &candidates, self.config.link_addr, now);
            self.refresh_topology(now);
            refused?;
        } else {
            trace!(neighbor = %peer, rank = adv.rank, "rpl: discovery advertisement");
        }

        let authenticator = security_ops::acts_as_authenticator(
            self.config.link_addr,
            peer,
            self.is_authenticator_capable(now),
            adv.holds_gtk,
        );
        if security_ops::should_initiate(trust, handshake_active, authenticator) {
            self.start_authenticator(handle, peer, now)?;
        }
        Ok(())
    }

    fn advertise(&mut self, now: Timestamp) {
        if !now.reached(self.next_advertisement) {
            return;
        }
        self.next_advertisement = now.after_ms(self.config.advertisement_interval_ms);

        let holds_gtk = self.holds_group_key(now);
        let offset = self.fhss.own_unicast_offset();
        let adv = self
            .dodag
            .build_advertisement(offset, holds_gtk, self.routes.advertised_routes())
            .unwrap_or_else(|| discovery_advertisement(self.config.link_addr, offset));
        let protection = if holds_gtk {
            Protection::Group
        } else {
            Protection::None
        };
        let payload = with_dispatch(DISPATCH_ADVERTISEMENT, &adv.encode());
        match self.transmit(LinkAddr::BROADCAST, FrameType::Advertisement, payload, protection, now) {
            Ok(()) => trace!(rank = adv.rank, routes = adv.routes.len(), "rpl: advertisement sent"),
            Err(err) => debug!(%err, "rpl: advertisement not sent"),
        }
    }

    /// Re-run route and parent selection after neighbor state changed.
    fn refresh_topology(&mut self, now: Timestamp) {
        for change in self.routes.reselect(&self.neighbors, now) {
            self.events.push_back(StackEvent::Route(change));
        }
        if let Some(change) = self.dodag.select_parent(&self.neighbors) {
            self.events.push_back(StackEvent::ParentChanged {
                parent: change.new,
                rank: change.rank,
            });
        }
    }

    /// A neighbor stopped being a usable next hop.
    fn withdraw_neighbor(&mut self, peer: LinkAddr, now: Timestamp) {
        for outcome in self.transactions.fail_via(peer, TransactionFailure::Unreachable) {
            self.events.push_back(outcome.into());
        }
        self.refresh_topology(now);
    }

    fn expire_neighbors(&mut self, now: Timestamp) {
        let expired = self.neighbors.expire(now);
        if expired.is_empty() {
            return;
        }
        for (handle, entry) in expired {
            let peer = entry.addr();
            info!(neighbor = %peer, "neighbor: timed out");
            self.reassembly.remove_peer(&peer, &mut self.admission);
            self.fragmenter.forget(&peer);
            self.fhss.forget(&peer);
            for change in self.routes.remove_neighbor(handle, &self.neighbors, now) {
                self.events.push_back(StackEvent::Route(change));
            }
            for outcome in self.transactions.fail_via(peer, TransactionFailure::Unreachable) {
                self.events.push_back(outcome.into());
            }
            self.events.push_back(StackEvent::NeighborRemoved { neighbor: peer });
        }
        if let Some(change) = self.dodag.select_parent(&self.neighbors) {
            self.events.push_back(StackEvent::ParentChanged {
                parent: change.new,
                rank: change.rank,
            });
        }
    }

    /// Next hop toward `destination`: a host route, the destination itself
    /// when it is an authenticated neighbor, else the preferred parent.
    fn resolve_next_hop(&self, destination: &LinkAddr) -> Option<LinkAddr> {
        if let Some(handle) = self.routes.next_hop(destination, &self.neighbors) {
            return self.neighbors.get(handle).map(|e| e.addr());
        }
        if self.neighbors.by_addr(destination).is_some_and(|e| e.is_authenticated()) {
            return Some(*destination);
        }
        self.dodag
            .preferred_parent()
            .filter(|h| self.neighbors.is_authenticated(*h))
            .and_then(|h| self.neighbors.get(h))
            .map(|e| e.addr())
    }

    // -----------------------------------------------------------------------
    // Transmit path
    // -----------------------------------------------------------------------

    fn send_coap(
        &mut self,
        destination: LinkAddr,
        next_hop: LinkAddr,
        coap: &[u8],
        priority: bool,
        now: Timestamp,
    ) -> Result<(), SendError> {
        let datagram = Datagram {
            header: DatagramHeader::new(self.config.link_addr, destination, NEXT_HEADER_COAP, priority),
            payload: coap.to_vec(),
        };
        let bytes = datagram.serialize()?;
        self.send_datagram(next_hop, &bytes, now)
    }

    /// Fragment a datagram as needed and send every piece under the next
    /// hop's pairwise key.
    fn send_datagram(&mut self, next_hop: LinkAddr, datagram: &[u8], now: Timestamp) -> Result<(), SendError> {
        let pieces = self.fragmenter.split(next_hop, datagram, &self.reassembly)?;
        for payload in pieces {
            self.transmit(next_hop, FrameType::Data, payload, Protection::Pairwise, now)?;
        }
        Ok(())
    }

    fn transmit(
        &mut self,
        dst: LinkAddr,
        frame_type: FrameType,
        payload: Vec<u8>,
        protection: Protection,
        now: Timestamp,
    ) -> Result<(), SendError> {
        let seq = self.mac_seq;
        self.mac_seq = self.mac_seq.wrapping_add(1);
        let mut frame = MacFrame::new(frame_type, seq, self.config.pan_id, dst, self.config.link_addr, payload);

        match protection {
            Protection::None => {}
            Protection::Pairwise => {
                let keys = self
                    .neighbors
                    .by_addr_mut(&dst)
                    .and_then(|entry| entry.keys_mut())
                    .ok_or(SendError::NoKeys(dst))?;
                let frame_counter = keys.next_tx_counter(now)?;
                let tk = keys.ptk().tk().to_vec();
                frame.security = Some(SecurityHeader {
                    key_id: KEY_ID_PAIRWISE,
                    frame_counter,
                });
                self.seal(&mut frame, &tk)?;
            }
            Protection::Group => {
                let (key, key_id) = self
                    .group_key
                    .as_ref()
                    .filter(|g| !g.is_expired(now))
                    .map(|g| (g.key, g.key_id()))
                    .ok_or(SendError::NoKeys(dst))?;
                let frame_counter = self.group_counter.next_tx()?;
                frame.security = Some(SecurityHeader { key_id, frame_counter });
                self.seal(&mut frame, &key)?;
            }
        }

        let bytes = frame.serialize()?;
        let channel = self.fhss.tx_channel(&dst, now)?;
        self.radio_send(dst, &bytes, channel)
    }

    fn seal(&self, frame: &mut MacFrame, key: &[u8]) -> Result<(), SendError> {
        let mut mic = [0u8; MAC_MIC_LEN];
        self.crypto
            .mic(key, &[frame.authenticated_part().as_slice()], &mut mic)?;
        frame.mic = Some(mic);
        Ok(())
    }

    /// Hand a frame to the driver, retrying link noise. Unicast outcomes
    /// feed the neighbor's link metric.
    fn radio_send(&mut self, dst: LinkAddr, bytes: &[u8], channel: Channel) -> Result<(), SendError> {
        let mut retries = 0u8;
        loop {
            let result = self.radio.transmit(bytes, channel);
            if !dst.is_broadcast()
                && let Some(entry) = self.neighbors.by_addr_mut(&dst)
            {
                match &result {
                    Ok(()) => entry.metrics.record_tx(true),
                    Err(crate::radio::RadioError::NoAck) => entry.metrics.record_tx(false),
                    Err(_) => {}
                }
            }
            match result {
                Ok(()) => {
                    trace!(dst = %dst, %channel, len = bytes.len(), "mac: frame sent");
                    return Ok(());
                }
                Err(err) if err.is_retriable() && retries < self.config.mac_max_retries => {
                    retries += 1;
                    trace!(dst = %dst, %channel, %err, retries, "mac: retrying transmit");
                }
                Err(err) => {
                    debug!(dst = %dst, %channel, %err, attempts = retries + 1, "mac: transmit failed");
                    return Err(err.into());
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// Run every periodic duty that is due at `now`.
    pub fn tick(&mut self, now: Timestamp) {
        self.admission.evaluate();
        self.collect_band_changes();

        for expired in self.reassembly.expire(now, &mut self.admission) {
            self.events.push_back(StackEvent::ReassemblyFailed {
                peer: expired.peer,
                tag: expired.tag,
                error: ReassemblyError::Timeout,
            });
        }

        self.expire_neighbors(now);
        self.expire_keys(now);
        self.drive_handshakes(now);
        self.rotate_group_key(now);

        let pass = self.transactions.poll_timeouts(now);
        for retransmission in pass.retransmit {
            if let Err(err) = self.send_coap(
                retransmission.peer,
                retransmission.next_hop,
                &retransmission.bytes,
                false,
                now,
            ) {
                debug!(handle = retransmission.handle.id(), %err, "coap: retransmission not sent");
            }
        }
        for outcome in pass.outcomes {
            self.events.push_back(outcome.into());
        }
        self.server.expire(now);

        for change in self.routes.expire(&self.neighbors, now) {
            self.events.push_back(StackEvent::Route(change));
        }
        self.advertise(now);
        self.collect_band_changes();
    }

    fn collect_band_changes(&mut self) {
        for change in self.admission.take_band_changes() {
            self.events.push_back(StackEvent::AdmissionChanged(change));
        }
    }

    fn note_trust(&mut self, neighbor: LinkAddr, from: TrustState, to: TrustState) {
        if from != to {
            self.events
                .push_back(StackEvent::NeighborStateChanged { neighbor, from, to });
        }
    }
}

// ---------------------------------------------------------------------------
// Advertisement helpers
// ---------------------------------------------------------------------------

/// What a received advertisement tells us about its sender. A detached
/// sender belongs to no DODAG.
fn advertised_info(adv: &Advertisement) -> Advertised {
    Advertised {
        rank: adv.rank,
        dodag_id: (adv.rank < INFINITE_RANK).then_some(adv.dodag_id),
        dodag_version: adv.dodag_version,
        grounded: adv.grounded,
        holds_gtk: adv.holds_gtk,
    }
}

/// Route candidates learned from one advertisement: the sender itself at
/// zero cost, then everything it reaches.
fn route_candidates(sender: LinkAddr, adv: &Advertisement) -> Vec<AdvertisedRoute> {
    let mut routes = Vec::with_capacity(adv.routes.len() + 1);
    routes.push(AdvertisedRoute {
        destination: sender,
        cost: 0,
    });
    routes.extend(adv.routes.iter().copied());
    routes
}

/// Broadcast by a detached router so authenticators can find it.
fn discovery_advertisement(own: LinkAddr, unicast_channel_offset: u16) -> Advertisement {
    Advertisement {
        dodag_id: own,
        dodag_version: 0,
        rank: INFINITE_RANK,
        unicast_channel_offset,
        grounded: false,
        holds_gtk: false,
        routes: Vec::new(),
    }
}
