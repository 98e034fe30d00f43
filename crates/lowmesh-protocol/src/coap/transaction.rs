//! Client-side transaction table.
//!
//! Each outgoing request becomes a pending record with its retransmission
//! state. The owning task polls the table for due retransmissions and feeds
//! inbound messages in; every transaction produces exactly one
//! [`TransactionOutcome`] unless it is cancelled.

use std::collections::BTreeMap;

use lowmesh_core::{LinkAddr, Timestamp};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use super::constants::{
    DEFAULT_ACK_RANDOM_FACTOR, DEFAULT_ACK_TIMEOUT_MS, DEFAULT_DEDUP_CAPACITY,
    DEFAULT_EXCHANGE_LIFETIME_MS, DEFAULT_MAX_RETRANSMIT, DEFAULT_MAX_TRANSACTIONS,
    DEFAULT_NON_LIFETIME_MS, REQUEST_TOKEN_LEN,
};
use super::message::{CoapMessage, MessageType};
use crate::admission::{MemoryMonitor, StateKind, TrafficClass};
use crate::error::CoapError;

#[derive(Debug, Clone)]
pub struct CoapConfig {
    pub ack_timeout_ms: u64,
    pub ack_random_factor: f64,
    pub max_retransmit: u8,
    pub non_lifetime_ms: u64,
    pub exchange_lifetime_ms: u64,
    pub dedup_capacity: usize,
    pub max_transactions: usize,
}

impl Default for CoapConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
            ack_random_factor: DEFAULT_ACK_RANDOM_FACTOR,
            max_retransmit: DEFAULT_MAX_RETRANSMIT,
            non_lifetime_ms: DEFAULT_NON_LIFETIME_MS,
            exchange_lifetime_ms: DEFAULT_EXCHANGE_LIFETIME_MS,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            max_transactions: DEFAULT_MAX_TRANSACTIONS,
        }
    }
}

impl CoapConfig {
    /// Worst-case wait before a confirmable request is given up: the sum of
    /// every backoff interval at the maximum random factor.
    pub fn max_transmit_wait_ms(&self) -> u64 {
        let base = self.ack_timeout_ms as f64 * self.ack_random_factor;
        let intervals = (1u64 << (u32::from(self.max_retransmit) + 1)) - 1;
        (base * intervals as f64) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionHandle(u32);

impl TransactionHandle {
    pub fn id(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionFailure {
    /// Retry ceiling reached (CON) or lifetime elapsed (NON).
    Timeout,
    /// Reset by the peer, the next hop was lost, or no route exists.
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    Response {
        handle: TransactionHandle,
        peer: LinkAddr,
        response: CoapMessage,
    },
    Failed {
        handle: TransactionHandle,
        peer: LinkAddr,
        reason: TransactionFailure,
    },
}

impl TransactionOutcome {
    pub fn handle(&self) -> TransactionHandle {
        match self {
            Self::Response { handle, .. } | Self::Failed { handle, .. } => *handle,
        }
    }
}

/// A due retransmission. It always goes to the next hop recorded when the
/// transaction was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retransmission {
    pub handle: TransactionHandle,
    pub peer: LinkAddr,
    pub next_hop: LinkAddr,
    pub bytes: Vec<u8>,
}

/// Everything a timer pass produced.
#[derive(Debug, Default)]
pub struct TimeoutPass {
    pub retransmit: Vec<Retransmission>,
    pub outcomes: Vec<TransactionOutcome>,
    /// Cancelled transactions discarded on this pass.
    pub discarded: Vec<TransactionHandle>,
}

#[derive(Debug)]
struct Transaction {
    peer: LinkAddr,
    next_hop: LinkAddr,
    message_id: u16,
    token: Vec<u8>,
    confirmable: bool,
    /// An empty ACK arrived; the response will come separately.
    acknowledged: bool,
    retransmissions: u8,
    timeout_ms: u64,
    deadline: Timestamp,
    encoded: Vec<u8>,
    cancelled: bool,
}

#[derive(Debug)]
pub struct TransactionTable {
    config: CoapConfig,
    pending: BTreeMap<TransactionHandle, Transaction>,
    next_handle: u32,
    next_message_id: u16,
    rng: StdRng,
}

impl TransactionTable {
    /// Message IDs start at a value drawn from `seed`.
    pub fn new(config: CoapConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let next_message_id = rng.gen_range(0..=u16::MAX);
        Self {
            config,
            pending: BTreeMap::new(),
            next_handle: 1,
            next_message_id,
            rng,
        }
    }

    pub fn config(&self) -> &CoapConfig {
        &self.config
    }

    /// Live (not cancelled) transactions.
    pub fn len(&self) -> usize {
        self.pending.values().filter(|t| !t.cancelled).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, handle: TransactionHandle) -> bool {
        self.pending.get(&handle).is_some_and(|t| !t.cancelled)
    }

    pub fn next_hop(&self, handle: TransactionHandle) -> Option<LinkAddr> {
        self.pending.get(&handle).map(|t| t.next_hop)
    }

    pub fn retransmissions(&self, handle: TransactionHandle) -> Option<u8> {
        self.pending.get(&handle).map(|t| t.retransmissions)
    }

    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.pending
            .values()
            .filter(|t| !t.cancelled)
            .map(|t| t.deadline)
            .min()
    }

    /// Admit a new request to `peer` via `next_hop`.
    ///
    /// Assigns the message ID and token and returns the encoded message to
    /// transmit.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &mut self,
        peer: LinkAddr,
        next_hop: LinkAddr,
        mut request: CoapMessage,
        confirmable: bool,
        class: TrafficClass,
        admission: &MemoryMonitor,
        now: Timestamp,
    ) -> Result<(TransactionHandle, Vec<u8>), CoapError> {
        if self.len() >= self.config.max_transactions {
            warn!(peer = %peer, max = self.config.max_transactions, "coap: transaction table full");
            return Err(CoapError::TableFull {
                max: self.config.max_transactions,
            });
        }
        admission.check_new_state(class, StateKind::Transaction)?;

        request.mtype = if confirmable {
            MessageType::Confirmable
        } else {
            MessageType::NonConfirmable
        };
        request.message_id = self.allocate_message_id();
        request.token = self.allocate_token();
        let encoded = request.encode()?;

        let timeout_ms = if confirmable {
            let factor = self.config.ack_random_factor.max(1.0);
            let jitter: f64 = self.rng.gen_range(1.0..=factor);
            (self.config.ack_timeout_ms as f64 * jitter) as u64
        } else {
            self.config.non_lifetime_ms
        };

        let handle = TransactionHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        debug!(
            handle = handle.0,
            peer = %peer,
            next_hop = %next_hop,
            mid = request.message_id,
            confirmable,
            "coap: transaction created"
        );
        self.pending.insert(
            handle,
            Transaction {
                peer,
                next_hop,
                message_id: request.message_id,
                token: request.token,
                confirmable,
                acknowledged: false,
                retransmissions: 0,
                timeout_ms,
                deadline: now.after_ms(timeout_ms),
                encoded: encoded.clone(),
                cancelled: false,
            },
        );
        Ok((handle, encoded))
    }

    /// Match an inbound message from `from` against pending transactions.
    pub fn on_message(
        &mut self,
        from: LinkAddr,
        msg: &CoapMessage,
        now: Timestamp,
    ) -> Option<TransactionOutcome> {
        match msg.mtype {
            MessageType::Reset => {
                let handle = self.find(|t| t.peer == from && t.message_id == msg.message_id)?;
                self.pending.remove(&handle);
                debug!(handle = handle.0, peer = %from, "coap: reset by peer");
                Some(TransactionOutcome::Failed {
                    handle,
                    peer: from,
                    reason: TransactionFailure::Unreachable,
                })
            }
            MessageType::Acknowledgement if msg.code.is_empty() => {
                let handle = self.find(|t| t.peer == from && t.message_id == msg.message_id)?;
                if let Some(tx) = self.pending.get_mut(&handle) {
                    tx.acknowledged = true;
                    tx.deadline = now.after_ms(self.config.exchange_lifetime_ms);
                }
                debug!(handle = handle.0, "coap: empty ack, awaiting separate response");
                None
            }
            MessageType::Acknowledgement => {
                let handle = self.find(|t| {
                    t.peer == from && t.message_id == msg.message_id && t.token == msg.token
                })?;
                self.complete(handle, from, msg)
            }
            MessageType::Confirmable | MessageType::NonConfirmable if msg.code.is_response() => {
                let handle = self.find(|t| t.peer == from && t.token == msg.token)?;
                self.complete(handle, from, msg)
            }
            _ => None,
        }
    }

    /// Retransmit or fail transactions whose deadline has passed, and discard
    /// cancelled ones.
    pub fn poll_timeouts(&mut self, now: Timestamp) -> TimeoutPass {
        let mut pass = TimeoutPass::default();
        let mut finished = Vec::new();

        for (&handle, tx) in &mut self.pending {
            if tx.cancelled {
                finished.push(handle);
                pass.discarded.push(handle);
                continue;
            }
            if !now.reached(tx.deadline) {
                continue;
            }
            let may_retry = tx.confirmable
                && !tx.acknowledged
                && tx.retransmissions < self.config.max_retransmit;
            if may_retry {
                tx.retransmissions += 1;
                tx.timeout_ms = tx.timeout_ms.saturating_mul(2);
                tx.deadline = now.after_ms(tx.timeout_ms);
                debug!(handle = handle.0, attempt = tx.retransmissions, "coap: retransmit");
                pass.retransmit.push(Retransmission {
                    handle,
                    peer: tx.peer,
                    next_hop: tx.next_hop,
                    bytes: tx.encoded.clone(),
                });
            } else {
                warn!(
                    handle = handle.0,
                    peer = %tx.peer,
                    retransmissions = tx.retransmissions,
                    "coap: transaction timed out"
                );
                finished.push(handle);
                pass.outcomes.push(TransactionOutcome::Failed {
                    handle,
                    peer: tx.peer,
                    reason: TransactionFailure::Timeout,
                });
            }
        }

        for handle in finished {
            self.pending.remove(&handle);
        }
        pass
    }

    /// Fail every transaction routed through `next_hop` right away.
    pub fn fail_via(&mut self, next_hop: LinkAddr, reason: TransactionFailure) -> Vec<TransactionOutcome> {
        let handles: Vec<TransactionHandle> = self
            .pending
            .iter()
            .filter(|(_, t)| !t.cancelled && t.next_hop == next_hop)
            .map(|(h, _)| *h)
            .collect();
        handles
            .into_iter()
            .filter_map(|handle| {
                let tx = self.pending.remove(&handle)?;
                debug!(handle = handle.0, next_hop = %next_hop, ?reason, "coap: failed via lost next hop");
                Some(TransactionOutcome::Failed {
                    handle,
                    peer: tx.peer,
                    reason,
                })
            })
            .collect()
    }

    /// Mark a transaction cancelled. It produces no outcome and is discarded
    /// by the next [`TransactionTable::poll_timeouts`].
    pub fn cancel(&mut self, handle: TransactionHandle) -> bool {
        match self.pending.get_mut(&handle) {
            Some(tx) if !tx.cancelled => {
                tx.cancelled = true;
                true
            }
            _ => false,
        }
    }

    fn complete(
        &mut self,
        handle: TransactionHandle,
        from: LinkAddr,
        msg: &CoapMessage,
    ) -> Option<TransactionOutcome> {
        self.pending.remove(&handle)?;
        debug!(handle = handle.0, peer = %from, code = %msg.code, "coap: response matched");
        Some(TransactionOutcome::Response {
            handle,
            peer: from,
            response: msg.clone(),
        })
    }

    fn find(&self, pred: impl Fn(&Transaction) -> bool) -> Option<TransactionHandle> {
        self.pending
            .iter()
            .find(|(_, t)| !t.cancelled && pred(t))
            .map(|(h, _)| *h)
    }

    fn allocate_message_id(&mut self) -> u16 {
        loop {
            let id = self.next_message_id;
            self.next_message_id = self.next_message_id.wrapping_add(1);
            if !self.pending.values().any(|t| t.message_id == id) {
                return id;
            }
        }
    }

    fn allocate_token(&mut self) -> Vec<u8> {
        loop {
            let mut token = vec![0u8; REQUEST_TOKEN_LEN];
            self.rng.fill(token.as_mut_slice());
            if !self.pending.values().any(|t| t.token == token) {
                return token;
            }
        }
    }
}
