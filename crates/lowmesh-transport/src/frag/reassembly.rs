//! Inbound reassembly.
//!
//! One [`ReassemblyContext`] per `(peer, tag)`. Contexts are created by the
//! first fragment that arrives (whichever it is), reserve their declared size
//! with the admission controller, and are destroyed on completion, on a
//! protocol violation, or when they outlive the reassembly timeout.

use std::collections::{HashMap, VecDeque};

use lowmesh_core::{FragmentHeader, LinkAddr, Timestamp};
use lowmesh_protocol::{MemoryMonitor, StateKind, TrafficClass};
use tracing::{debug, error, trace, warn};

use super::{DEFAULT_MAX_CONTEXTS, DEFAULT_REASSEMBLY_TIMEOUT_MS};
use crate::error::ReassemblyError;

/// Completed keys remembered to swallow late duplicates.
const COMPLETED_WINDOW: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyConfig {
    pub timeout_ms: u64,
    pub max_contexts: usize,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_REASSEMBLY_TIMEOUT_MS,
            max_contexts: DEFAULT_MAX_CONTEXTS,
        }
    }
}

// ------------------------------------------------------------------ //
// Context
// ------------------------------------------------------------------ //

#[derive(Debug)]
struct ReassemblyContext {
    buffer: Vec<u8>,
    filled: Vec<bool>,
    received: usize,
    created_at: Timestamp,
}

impl ReassemblyContext {
    fn new(size: usize, now: Timestamp) -> Self {
        Self {
            buffer: vec![0; size],
            filled: vec![false; size],
            received: 0,
            created_at: now,
        }
    }

    fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Copy `data` in at `offset`. Re-received identical bytes are no-ops.
    fn fill(&mut self, offset: usize, data: &[u8]) -> Result<(), ReassemblyError> {
        for (i, &byte) in data.iter().enumerate() {
            let at = offset + i;
            if self.filled[at] {
                if self.buffer[at] != byte {
                    return Err(ReassemblyError::Conflict { offset: at });
                }
                continue;
            }
            self.buffer[at] = byte;
            self.filled[at] = true;
            self.received += 1;
        }
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.received == self.size()
    }
}

/// An incomplete context freed by [`ReassemblyTable::expire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiredContext {
    pub peer: LinkAddr,
    pub tag: u16,
    pub size: usize,
    pub received: usize,
}

// ------------------------------------------------------------------ //
// Table
// ------------------------------------------------------------------ //

#[derive(Debug)]
pub struct ReassemblyTable {
    config: ReassemblyConfig,
    contexts: HashMap<(LinkAddr, u16), ReassemblyContext>,
    completed: VecDeque<(LinkAddr, u16, Timestamp)>,
}

impl ReassemblyTable {
    pub fn new(config: ReassemblyConfig) -> Self {
        Self {
            config,
            contexts: HashMap::new(),
            completed: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &ReassemblyConfig {
        &self.config
    }

    /// Number of in-progress contexts.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn tag_in_use(&self, peer: &LinkAddr, tag: u16) -> bool {
        self.contexts.contains_key(&(*peer, tag))
    }

    /// Earliest instant an in-progress context times out.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.contexts
            .values()
            .map(|ctx| ctx.created_at.after_ms(self.config.timeout_ms))
            .min()
    }

    /// Feed one fragment received from `peer`.
    ///
    /// Returns the datagram once every byte `[0, size)` has been covered.
    /// `class` is the traffic class used for admission when the fragment
    /// would open a new context.
    ///
    /// Protocol violations (`Conflict`, `OutOfBounds`, `SizeMismatch`) drop
    /// the whole context and release its reservation.
    pub fn accept(
        &mut self,
        peer: LinkAddr,
        header: FragmentHeader,
        data: &[u8],
        class: TrafficClass,
        admission: &mut MemoryMonitor,
        now: Timestamp,
    ) -> Result<Option<Vec<u8>>, ReassemblyError> {
        let size = header.size() as usize;
        let tag = header.tag();
        let offset = header.offset();
        let end = offset + data.len();
        let key = (peer, tag);

        // A first fragment carrying exactly the whole datagram needs no
        // context. Anything longer falls through to the bounds check.
        if offset == 0 && data.len() == size && !self.contexts.contains_key(&key) {
            trace!(peer = %peer, tag, size, "frag: single-fragment datagram");
            return Ok(Some(data.to_vec()));
        }

        if self.is_recently_completed(&key) {
            trace!(peer = %peer, tag, "frag: duplicate of completed datagram ignored");
            return Ok(None);
        }

        if end > size {
            let err = ReassemblyError::OutOfBounds { offset, end, size };
            self.drop_context(&key, admission, &err);
            return Err(err);
        }

        if !self.contexts.contains_key(&key) {
            self.open(key, size, class, admission, now)?;
        }

        let fill_result = match self.contexts.get_mut(&key) {
            Some(ctx) if ctx.size() != size => Err(ReassemblyError::SizeMismatch {
                expected: ctx.size(),
                actual: size,
            }),
            Some(ctx) => ctx.fill(offset, data),
            None => return Ok(None),
        };
        if let Err(err) = fill_result {
            self.drop_context(&key, admission, &err);
            return Err(err);
        }

        let complete = self.contexts.get(&key).is_some_and(ReassemblyContext::is_complete);
        if !complete {
            return Ok(None);
        }
        let Some(ctx) = self.contexts.remove(&key) else {
            return Ok(None);
        };
        admission.release(ctx.size());
        self.completed.push_back((peer, tag, now));
        if self.completed.len() > COMPLETED_WINDOW {
            self.completed.pop_front();
        }
        debug!(peer = %peer, tag, size, "frag: datagram reassembled");
        Ok(Some(ctx.buffer))
    }

    fn open(
        &mut self,
        key: (LinkAddr, u16),
        size: usize,
        class: TrafficClass,
        admission: &mut MemoryMonitor,
        now: Timestamp,
    ) -> Result<(), ReassemblyError> {
        if self.contexts.len() >= self.config.max_contexts {
            warn!(peer = %key.0, tag = key.1, max = self.config.max_contexts, "frag: reassembly table full");
            return Err(ReassemblyError::TableFull {
                max: self.config.max_contexts,
            });
        }
        if let Err(rejected) = admission.check_new_state(class, StateKind::Reassembly) {
            warn!(peer = %key.0, tag = key.1, %rejected, "frag: context rejected by admission");
            return Err(rejected.into());
        }
        admission.reserve(size);
        self.contexts.insert(key, ReassemblyContext::new(size, now));
        debug!(peer = %key.0, tag = key.1, size, "frag: context created");
        Ok(())
    }

    fn drop_context(&mut self, key: &(LinkAddr, u16), admission: &mut MemoryMonitor, err: &ReassemblyError) {
        if let Some(ctx) = self.contexts.remove(key) {
            admission.release(ctx.size());
        }
        error!(peer = %key.0, tag = key.1, %err, "frag: reassembly failed");
    }

    fn is_recently_completed(&self, key: &(LinkAddr, u16)) -> bool {
        self.completed.iter().any(|(p, t, _)| (*p, *t) == *key)
    }

    /// Free every context older than the timeout. Returns what was freed.
    pub fn expire(&mut self, now: Timestamp, admission: &mut MemoryMonitor) -> Vec<ExpiredContext> {
        let timeout = self.config.timeout_ms;
        self.completed
            .retain(|(_, _, at)| now.elapsed_since(*at) < timeout);

        let stale: Vec<(LinkAddr, u16)> = self
            .contexts
            .iter()
            .filter(|(_, ctx)| now.elapsed_since(ctx.created_at) >= timeout)
            .map(|(key, _)| *key)
            .collect();

        let mut expired = Vec::with_capacity(stale.len());
        for key in stale {
            if let Some(ctx) = self.contexts.remove(&key) {
                admission.release(ctx.size());
                warn!(peer = %key.0, tag = key.1, received = ctx.received, size = ctx.size(), "frag: reassembly timed out");
                expired.push(ExpiredContext {
                    peer: key.0,
                    tag: key.1,
                    size: ctx.size(),
                    received: ctx.received,
                });
            }
        }
        expired
    }

    /// Drop every context from `peer`, e.g. when the neighbor is removed.
    pub fn remove_peer(&mut self, peer: &LinkAddr, admission: &mut MemoryMonitor) -> usize {
        let keys: Vec<_> = self.contexts.keys().filter(|(p, _)| p == peer).copied().collect();
        for key in &keys {
            if let Some(ctx) = self.contexts.remove(key) {
                admission.release(ctx.size());
            }
        }
        keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lowmesh_protocol::{AdmissionConfig, AdmissionMode};

    const PEER: LinkAddr = LinkAddr::new([4; 8]);

    fn setup() -> (ReassemblyTable, MemoryMonitor) {
        (
            ReassemblyTable::new(ReassemblyConfig {
                timeout_ms: 1_000,
                max_contexts: 2,
            }),
            MemoryMonitor::new(AdmissionConfig::default()),
        )
    }

    fn first(size: u16, tag: u16) -> FragmentHeader {
        FragmentHeader::First { size, tag }
    }

    fn next(size: u16, tag: u16, offset: usize) -> FragmentHeader {
        FragmentHeader::Subsequent {
            size,
            tag,
            offset_units: (offset / 8) as u8,
        }
    }

    fn feed(
        table: &mut ReassemblyTable,
        monitor: &mut MemoryMonitor,
        header: FragmentHeader,
        data: &[u8],
    ) -> Result<Option<Vec<u8>>, ReassemblyError> {
        table.accept(PEER, header, data, TrafficClass::Normal, monitor, Timestamp::ZERO)
    }

    #[test]
    fn test_in_order_reassembly() {
        let (mut table, mut monitor) = setup();
        let data: Vec<u8> = (0..24).collect();
        assert_eq!(feed(&mut table, &mut monitor, first(24, 1), &data[..16]).unwrap(), None);
        assert_eq!(monitor.reserved_bytes(), 24);
        let out = feed(&mut table, &mut monitor, next(24, 1, 16), &data[16..]).unwrap();
        assert_eq!(out, Some(data));
        assert!(table.is_empty());
        assert_eq!(monitor.reserved_bytes(), 0);
    }

    #[test]
    fn test_single_fragment_bypasses_context() {
        let (mut table, mut monitor) = setup();
        let out = feed(&mut table, &mut monitor, first(4, 1), &[1, 2, 3, 4]).unwrap();
        assert_eq!(out, Some(vec![1, 2, 3, 4]));
        assert!(table.is_empty());
        assert_eq!(monitor.reserved_bytes(), 0);
    }

    #[test]
    fn test_oversized_first_fragment_is_rejected() {
        let (mut table, mut monitor) = setup();
        let err = feed(&mut table, &mut monitor, first(4, 1), &[1, 2, 3, 4, 5, 6]).unwrap_err();
        assert_eq!(err, ReassemblyError::OutOfBounds { offset: 0, end: 6, size: 4 });
        assert!(table.is_empty());
        assert_eq!(monitor.reserved_bytes(), 0);
        // nothing was remembered as completed
        let out = feed(&mut table, &mut monitor, first(4, 1), &[1, 2, 3, 4]).unwrap();
        assert_eq!(out, Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_conflict_drops_context() {
        let (mut table, mut monitor) = setup();
        feed(&mut table, &mut monitor, first(24, 1), &[0; 16]).unwrap();
        let err = feed(&mut table, &mut monitor, first(24, 1), &[1; 16]).unwrap_err();
        assert_eq!(err, ReassemblyError::Conflict { offset: 0 });
        assert!(err.dropped_context());
        assert!(table.is_empty());
        assert_eq!(monitor.reserved_bytes(), 0);
    }

    #[test]
    fn test_duplicate_is_idempotent() {
        let (mut table, mut monitor) = setup();
        feed(&mut table, &mut monitor, first(24, 1), &[5; 16]).unwrap();
        assert_eq!(feed(&mut table, &mut monitor, first(24, 1), &[5; 16]).unwrap(), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_late_duplicate_after_completion_is_ignored() {
        let (mut table, mut monitor) = setup();
        feed(&mut table, &mut monitor, first(24, 1), &[5; 16]).unwrap();
        assert!(feed(&mut table, &mut monitor, next(24, 1, 16), &[5; 8]).unwrap().is_some());
        assert_eq!(feed(&mut table, &mut monitor, next(24, 1, 16), &[5; 8]).unwrap(), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_out_of_bounds_and_size_mismatch() {
        let (mut table, mut monitor) = setup();
        let err = feed(&mut table, &mut monitor, next(24, 1, 16), &[0; 16]).unwrap_err();
        assert!(matches!(err, ReassemblyError::OutOfBounds { end: 32, .. }));

        feed(&mut table, &mut monitor, first(24, 2), &[0; 16]).unwrap();
        let err = feed(&mut table, &mut monitor, next(32, 2, 16), &[0; 8]).unwrap_err();
        assert_eq!(
            err,
            ReassemblyError::SizeMismatch {
                expected: 24,
                actual: 32
            }
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_table_full() {
        let (mut table, mut monitor) = setup();
        feed(&mut table, &mut monitor, first(24, 1), &[0; 8]).unwrap();
        feed(&mut table, &mut monitor, first(24, 2), &[0; 8]).unwrap();
        let err = feed(&mut table, &mut monitor, first(24, 3), &[0; 8]).unwrap_err();
        assert_eq!(err, ReassemblyError::TableFull { max: 2 });
        assert!(!err.dropped_context());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_expire_frees_incomplete_contexts() {
        let (mut table, mut monitor) = setup();
        feed(&mut table, &mut monitor, first(24, 1), &[0; 8]).unwrap();
        assert_eq!(table.next_deadline(), Some(Timestamp::from_millis(1_000)));

        assert!(table.expire(Timestamp::from_millis(999), &mut monitor).is_empty());
        let expired = table.expire(Timestamp::from_millis(1_000), &mut monitor);
        assert_eq!(
            expired,
            vec![ExpiredContext {
                peer: PEER,
                tag: 1,
                size: 24,
                received: 8
            }]
        );
        assert!(table.is_empty());
        assert_eq!(monitor.reserved_bytes(), 0);
    }

    #[test]
    fn test_pressure_blocks_new_contexts_but_not_existing() {
        let (mut table, mut monitor) = setup();
        feed(&mut table, &mut monitor, first(24, 1), &[1; 16]).unwrap();

        let budget = monitor.config().heap_budget_bytes;
        monitor.set_used_bytes(budget * 85 / 100);
        assert_eq!(monitor.mode(), AdmissionMode::Reduced);

        let err = feed(&mut table, &mut monitor, first(24, 2), &[0; 8]).unwrap_err();
        assert!(matches!(err, ReassemblyError::Admission(_)));

        let priority = table
            .accept(PEER, first(24, 3), &[0; 8], TrafficClass::Priority, &mut monitor, Timestamp::ZERO)
            .unwrap();
        assert_eq!(priority, None);

        let done = feed(&mut table, &mut monitor, next(24, 1, 16), &[1; 8]).unwrap();
        assert_eq!(done, Some(vec![1; 24]));

        monitor.set_used_bytes(0);
        assert_eq!(monitor.mode(), AdmissionMode::Normal);
        assert_eq!(feed(&mut table, &mut monitor, first(24, 4), &[0; 8]).unwrap(), None);
    }

    #[test]
    fn test_remove_peer() {
        let (mut table, mut monitor) = setup();
        feed(&mut table, &mut monitor, first(24, 1), &[0; 8]).unwrap();
        assert_eq!(table.remove_peer(&PEER, &mut monitor), 1);
        assert!(table.is_empty());
        assert_eq!(monitor.reserved_bytes(), 0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use lowmesh_protocol::AdmissionConfig;
    use proptest::prelude::*;

    fn fragments(data: &[u8], unit: usize) -> Vec<(FragmentHeader, Vec<u8>)> {
        let size = data.len() as u16;
        data.chunks(unit)
            .enumerate()
            .map(|(i, chunk)| {
                let header = if i == 0 {
                    FragmentHeader::First { size, tag: 7 }
                } else {
                    FragmentHeader::Subsequent {
                        size,
                        tag: 7,
                        offset_units: (i * unit / 8) as u8,
                    }
                };
                (header, chunk.to_vec())
            })
            .collect()
    }

    proptest! {
        #[test]
        fn any_order_with_duplicates_yields_one_datagram(
            data in prop::collection::vec(any::<u8>(), 17..600),
            units in 1usize..8,
            order in prop::collection::vec(any::<prop::sample::Index>(), 0..32),
        ) {
            let frags = fragments(&data, units * 8);
            prop_assume!(frags.len() > 1);

            // Every fragment once, in a shuffled order, plus duplicates.
            let mut sequence: Vec<usize> = (0..frags.len()).collect();
            for (i, idx) in order.iter().enumerate() {
                let len = sequence.len();
                let j = idx.index(len);
                sequence.swap(i % len, j);
            }
            for idx in &order {
                let dup = idx.index(frags.len());
                let at = idx.index(sequence.len());
                sequence.insert(at, dup);
            }

            let mut table = ReassemblyTable::new(ReassemblyConfig::default());
            let mut monitor = MemoryMonitor::new(AdmissionConfig::default());
            let peer = LinkAddr::new([1; 8]);
            let mut delivered = Vec::new();
            for i in sequence {
                let (header, chunk) = &frags[i];
                if let Some(d) = table
                    .accept(peer, *header, chunk, TrafficClass::Normal, &mut monitor, Timestamp::ZERO)
                    .unwrap()
                {
                    delivered.push(d);
                }
            }
            prop_assert_eq!(delivered.len(), 1);
            prop_assert_eq!(&delivered[0], &data);
            prop_assert!(table.is_empty());
            prop_assert_eq!(monitor.reserved_bytes(), 0);
        }
    }
}
