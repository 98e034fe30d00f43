//! Server side: inbound requests, application handler, response caching.

use lowmesh_core::{LinkAddr, Timestamp};
use tracing::debug;

use super::dedup::ResponseCache;
use super::message::{Code, CoapMessage, MessageType};
use super::transaction::CoapConfig;
use crate::error::CoapError;

/// Reply produced by the application for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapReply {
    pub code: Code,
    pub content_format: Option<u16>,
    pub payload: Vec<u8>,
}

impl CoapReply {
    pub fn new(code: Code, payload: Vec<u8>) -> Self {
        Self {
            code,
            content_format: None,
            payload,
        }
    }

    pub fn content(payload: Vec<u8>) -> Self {
        Self::new(Code::CONTENT, payload)
    }
}

/// Application request handler, invoked by the owning task.
pub trait RequestHandler: Send {
    fn handle(&mut self, peer: LinkAddr, request: &CoapMessage) -> CoapReply;
}

/// Answers every request with 4.04.
#[derive(Debug, Default)]
pub struct NotFoundHandler;

impl RequestHandler for NotFoundHandler {
    fn handle(&mut self, _peer: LinkAddr, _request: &CoapMessage) -> CoapReply {
        CoapReply::new(Code::NOT_FOUND, Vec::new())
    }
}

/// Encoded reply and whether it came from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReply {
    pub bytes: Vec<u8>,
    pub from_cache: bool,
}

#[derive(Debug)]
pub struct CoapServer {
    cache: ResponseCache,
    next_message_id: u16,
}

impl CoapServer {
    pub fn new(config: &CoapConfig, first_message_id: u16) -> Self {
        Self {
            cache: ResponseCache::new(config.dedup_capacity, config.exchange_lifetime_ms),
            next_message_id: first_message_id,
        }
    }

    /// Answer a request from `peer`. A duplicate `(peer, message_id)` is
    /// answered from the cache without invoking `handler`.
    ///
    /// Confirmable requests get a piggybacked ACK; non-confirmable ones a NON
    /// response with a fresh message ID. Both echo the request token.
    pub fn handle_request(
        &mut self,
        peer: LinkAddr,
        request: &CoapMessage,
        handler: &mut dyn RequestHandler,
        now: Timestamp,
    ) -> Result<ServerReply, CoapError> {
        if let Some(cached) = self.cache.lookup(peer, request.message_id, now) {
            debug!(peer = %peer, mid = request.message_id, "coap: duplicate request answered from cache");
            return Ok(ServerReply {
                bytes: cached.to_vec(),
                from_cache: true,
            });
        }

        let reply = handler.handle(peer, request);
        let (mtype, message_id) = match request.mtype {
            MessageType::Confirmable => (MessageType::Acknowledgement, request.message_id),
            _ => {
                let id = self.next_message_id;
                self.next_message_id = self.next_message_id.wrapping_add(1);
                (MessageType::NonConfirmable, id)
            }
        };
        let mut response = CoapMessage::new(mtype, reply.code, message_id, request.token.clone());
        if let Some(format) = reply.content_format {
            response.set_content_format(format);
        }
        response.payload = reply.payload;
        let bytes = response.encode()?;

        self.cache
            .insert(peer, request.message_id, bytes.clone(), now);
        Ok(ServerReply {
            bytes,
            from_cache: false,
        })
    }

    /// Periodic cache maintenance.
    pub fn expire(&mut self, now: Timestamp) {
        self.cache.expire(now);
    }

    pub fn cached_responses(&self) -> usize {
        self.cache.len()
    }
}
