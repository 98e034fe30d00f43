//! Server-side response cache for duplicate request suppression.
//!
//! Keyed by `(peer, message_id)`. A duplicate request is answered with the
//! cached bytes and never reaches the application handler again.

use std::collections::VecDeque;

use lowmesh_core::{LinkAddr, Timestamp};

#[derive(Debug)]
struct CachedResponse {
    peer: LinkAddr,
    message_id: u16,
    response: Vec<u8>,
    expires_at: Timestamp,
}

/// Bounded cache of answered requests. Insertion order is expiry order since
/// every entry gets the same lifetime.
#[derive(Debug)]
pub struct ResponseCache {
    entries: VecDeque<CachedResponse>,
    capacity: usize,
    lifetime_ms: u64,
}

impl ResponseCache {
    pub fn new(capacity: usize, lifetime_ms: u64) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            lifetime_ms,
        }
    }

    pub fn lookup(&self, peer: LinkAddr, message_id: u16, now: Timestamp) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.peer == peer && e.message_id == message_id && !now.reached(e.expires_at))
            .map(|e| e.response.as_slice())
    }

    /// Remember the response sent for `(peer, message_id)`, evicting the
    /// oldest entry when full.
    pub fn insert(&mut self, peer: LinkAddr, message_id: u16, response: Vec<u8>, now: Timestamp) {
        if self.capacity == 0 {
            return;
        }
        self.expire(now);
        self.entries
            .retain(|e| !(e.peer == peer && e.message_id == message_id));
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(CachedResponse {
            peer,
            message_id,
            response,
            expires_at: now.after_ms(self.lifetime_ms),
        });
    }

    /// Drop entries whose exchange lifetime has passed.
    pub fn expire(&mut self, now: Timestamp) {
        while self
            .entries
            .front()
            .is_some_and(|e| now.reached(e.expires_at))
        {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
