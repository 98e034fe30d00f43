//! CoAP transport: codec, client transactions and the server side.

pub mod constants;
pub mod dedup;
pub mod message;
pub mod server;
pub mod transaction;

pub use dedup::ResponseCache;
pub use message::{Code, CoapMessage, CoapOption, MessageType};
pub use server::{CoapReply, CoapServer, NotFoundHandler, RequestHandler, ServerReply};
pub use transaction::{
    CoapConfig, Retransmission, TimeoutPass, TransactionFailure, TransactionHandle,
    TransactionOutcome, TransactionTable,
};
