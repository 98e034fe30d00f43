//! Outbound fragmentation.

use std::collections::{HashMap, VecDeque};

use lowmesh_core::constants::{DISPATCH_DATAGRAM, FRAG_OFFSET_UNIT, MAX_DATAGRAM_SIZE};
use lowmesh_core::frame::dispatch::with_dispatch;
use lowmesh_core::{FragmentHeader, LinkAddr};
use tracing::trace;

use super::RECENT_TAG_WINDOW;
use super::reassembly::ReassemblyTable;
use crate::error::FragmentError;

#[derive(Debug, Default)]
struct PeerTags {
    next: u16,
    recent: VecDeque<u16>,
}

/// Splits datagrams into link-layer fragment payloads.
#[derive(Debug)]
pub struct Fragmenter {
    payload_size: usize,
    tag_seed: u16,
    peers: HashMap<LinkAddr, PeerTags>,
}

impl Fragmenter {
    /// `payload_size` is the number of datagram bytes per fragment and must be
    /// a non-zero multiple of 8 so that FRAGN offsets stay representable.
    pub fn new(payload_size: usize, tag_seed: u16) -> Result<Self, FragmentError> {
        if payload_size == 0 || payload_size % FRAG_OFFSET_UNIT != 0 {
            return Err(FragmentError::InvalidPayloadSize(payload_size));
        }
        Ok(Self {
            payload_size,
            tag_seed,
            peers: HashMap::new(),
        })
    }

    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    /// Number of fragments `len` bytes of datagram occupy. Unfragmented
    /// datagrams count as one.
    #[must_use]
    pub fn fragment_count(&self, len: usize) -> usize {
        len.div_ceil(self.payload_size).max(1)
    }

    /// Split `datagram` for transmission to `peer`. Each returned buffer is a
    /// complete MAC payload including its dispatch byte(s).
    ///
    /// `inbound` is consulted so the chosen tag never matches an in-flight
    /// reassembly context from the same peer.
    pub fn split(
        &mut self,
        peer: LinkAddr,
        datagram: &[u8],
        inbound: &ReassemblyTable,
    ) -> Result<Vec<Vec<u8>>, FragmentError> {
        if datagram.len() > MAX_DATAGRAM_SIZE {
            return Err(FragmentError::TooLarge {
                size: datagram.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }
        if datagram.len() <= self.payload_size {
            return Ok(vec![with_dispatch(DISPATCH_DATAGRAM, datagram)]);
        }

        let tag = self.allocate_tag(peer, inbound);
        let size = datagram.len() as u16;
        let mut fragments = Vec::with_capacity(self.fragment_count(datagram.len()));
        for (i, chunk) in datagram.chunks(self.payload_size).enumerate() {
            let offset = i * self.payload_size;
            let header = if offset == 0 {
                FragmentHeader::First { size, tag }
            } else {
                FragmentHeader::Subsequent {
                    size,
                    tag,
                    offset_units: (offset / FRAG_OFFSET_UNIT) as u8,
                }
            };
            let mut out = Vec::with_capacity(header.header_len() + chunk.len());
            header.write_to(&mut out);
            out.extend_from_slice(chunk);
            fragments.push(out);
        }
        trace!(peer = %peer, tag, size, count = fragments.len(), "frag: datagram split");
        Ok(fragments)
    }

    fn allocate_tag(&mut self, peer: LinkAddr, inbound: &ReassemblyTable) -> u16 {
        let seed = self.tag_seed;
        let state = self.peers.entry(peer).or_insert_with(|| PeerTags {
            next: seed,
            recent: VecDeque::new(),
        });
        // At most RECENT_TAG_WINDOW + capacity candidates are excluded, so the
        // scan terminates well before wrapping.
        let mut tag = state.next;
        while state.recent.contains(&tag) || inbound.tag_in_use(&peer, tag) {
            tag = tag.wrapping_add(1);
        }
        state.next = tag.wrapping_add(1);
        state.recent.push_back(tag);
        if state.recent.len() > RECENT_TAG_WINDOW {
            state.recent.pop_front();
        }
        tag
    }

    /// Drop per-peer tag state.
    pub fn forget(&mut self, peer: &LinkAddr) {
        self.peers.remove(peer);
    }
}
