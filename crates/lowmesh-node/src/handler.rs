//! Application request handlers shipped with the node binary.

use lowmesh_core::LinkAddr;
use lowmesh_protocol::coap::{CoapMessage, CoapReply, RequestHandler};
use tracing::debug;

/// Answers every request with 2.05 Content carrying the request payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoHandler;

impl RequestHandler for EchoHandler {
    fn handle(&mut self, peer: LinkAddr, request: &CoapMessage) -> CoapReply {
        debug!(peer = %peer, len = request.payload.len(), "echo: request served");
        CoapReply::content(request.payload.clone())
    }
}
