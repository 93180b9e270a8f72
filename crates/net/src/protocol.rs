//! Frame types and the cross-node message model.
//!
//! All multi-byte integers on the wire are big-endian.

use thiserror::Error;

use warpgrid_core::{GlobalCoord, GridDims, Partition, Turn};

/// Frame tag for help-offer negotiation. The request and the response share
/// the tag; they are disambiguated by handshake phase, and only bootstrap
/// code ever reads them.
pub const TAG_OFFER_HELP: u8 = 0x1;

/// Frame tag for an agent-transfer envelope.
pub const TAG_SEND_AGENT: u8 = 0x2;

/// Frame tag for an end-of-turn marker.
pub const TAG_END_TURN: u8 = 0x3;

/// Errors surfaced while decoding a frame from a peer stream.
///
/// Any of these terminates the listener for that connection; they never
/// crash the node.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The stream ended in the middle of a frame.
    #[error("frame truncated while reading {context}")]
    Truncated {
        /// Which field was being read when the stream ended.
        context: &'static str,
    },
    /// A frame of one tag arrived where another was required.
    #[error("expected frame tag {expected:#04x}, got {got:#04x}")]
    UnexpectedFrame {
        /// Tag the handshake phase required.
        expected: u8,
        /// Tag actually read.
        got: u8,
    },
    /// The declared payload size is negative or beyond the sane bound.
    #[error("declared payload size {size} outside limit {limit}")]
    OversizedPayload {
        /// Declared size field value.
        size: i32,
        /// Enforced upper bound in bytes.
        limit: usize,
    },
    /// Underlying stream failure.
    #[error("peer stream error: {0}")]
    Io(#[from] std::io::Error),
}

/// Kind discriminant carried by cross-node messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Help-offer negotiation traffic.
    OfferHelp,
    /// Agent transfer.
    SendAgent,
    /// End-of-turn marker.
    EndTurn,
}

impl MessageKind {
    /// Wire tag for this kind.
    pub const fn tag(self) -> u8 {
        match self {
            MessageKind::OfferHelp => TAG_OFFER_HELP,
            MessageKind::SendAgent => TAG_SEND_AGENT,
            MessageKind::EndTurn => TAG_END_TURN,
        }
    }
}

/// A unit of cross-node communication.
///
/// Two messages form an annihilating pair iff they agree on `send_turn`,
/// `kind`, and `data`, and carry opposite signs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Turn at which the event logically occurred on the sender.
    pub send_turn: Turn,
    /// `true` for a normal message, `false` for its anti-message.
    pub sign: bool,
    /// Frame kind.
    pub kind: MessageKind,
    /// Kind-specific payload bytes.
    pub data: Vec<u8>,
}

impl Message {
    /// Build an agent-transfer message targeting `coord` with the agent's
    /// encoded bytes.
    pub fn send_agent(send_turn: Turn, coord: GlobalCoord, agent_bytes: &[u8]) -> Self {
        let mut data = Vec::with_capacity(8 + agent_bytes.len());
        data.extend_from_slice(&coord.x.to_be_bytes());
        data.extend_from_slice(&coord.y.to_be_bytes());
        data.extend_from_slice(agent_bytes);
        Self {
            send_turn,
            sign: true,
            kind: MessageKind::SendAgent,
            data,
        }
    }

    /// The exact anti-message: identical except for the inverted sign.
    pub fn antimessage(&self) -> Self {
        Self {
            send_turn: self.send_turn,
            sign: !self.sign,
            kind: self.kind,
            data: self.data.clone(),
        }
    }

    /// Whether `self` and `other` form an annihilating pair.
    pub fn annihilates(&self, other: &Self) -> bool {
        self.send_turn == other.send_turn
            && self.kind == other.kind
            && self.sign != other.sign
            && self.data == other.data
    }

    /// Split an agent-transfer payload into target coordinate + agent bytes.
    pub fn agent_payload(&self) -> Result<(GlobalCoord, &[u8]), ProtocolError> {
        if self.data.len() < 8 {
            return Err(ProtocolError::Truncated {
                context: "agent payload coordinates",
            });
        }
        let d = &self.data;
        let x = i32::from_be_bytes([d[0], d[1], d[2], d[3]]);
        let y = i32::from_be_bytes([d[4], d[5], d[6], d[7]]);
        Ok((GlobalCoord::new(x, y), &d[8..]))
    }
}

/// Partition geometry exchanged during the help handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferHelp {
    /// Region offered to the joining node.
    pub offered: Partition,
    /// Global grid dimensions.
    pub dims: GridDims,
    /// The offering node's own remaining region.
    pub sender: Partition,
}

/// One decoded inbound frame.
#[derive(Debug)]
pub enum Frame {
    /// Agent-transfer envelope.
    Agent(Message),
    /// End-of-turn marker from the peer.
    EndTurn(Turn),
    /// Unrecognized tag; callers log it and continue.
    Unknown(u8),
}
