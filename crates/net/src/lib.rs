#![warn(missing_docs)]
//! Peer wire protocol, inbound message queue, and link management.

mod codec;
mod listener;
mod peer;
mod protocol;
mod queue;
mod sent;

pub use codec::{
    read_frame, read_offer_help_request, read_offer_help_response, write_end_turn, write_message,
    write_offer_help_request, write_offer_help_response, MAX_DATA_LEN,
};
pub use listener::spawn_listener;
pub use peer::{LinkError, PeerLink};
pub use protocol::{
    Frame, Message, MessageKind, OfferHelp, ProtocolError, TAG_END_TURN, TAG_OFFER_HELP,
    TAG_SEND_AGENT,
};
pub use queue::InboundQueue;
pub use sent::SentLog;

/// Boxed read half of an established peer byte stream.
pub type StreamReader = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// Boxed write half of an established peer byte stream.
pub type StreamWriter = Box<dyn tokio::io::AsyncWrite + Send + Unpin>;
