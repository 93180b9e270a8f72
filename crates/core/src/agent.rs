//! Agent and codec seams supplied by the agent subsystem.

use std::fmt;

use rand::RngCore;
use thiserror::Error;

use crate::coord::GlobalCoord;
use crate::Turn;

/// Failure to reconstruct an agent from its encoded form.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The encoded buffer ended before the agent was fully read.
    #[error("agent encoding truncated at byte {offset}")]
    Truncated {
        /// Offset of the first missing byte.
        offset: usize,
    },
    /// The species tag does not match any known agent kind.
    #[error("unknown agent species tag {0:#04x}")]
    UnknownSpecies(u8),
}

/// A relative move requested by an agent during its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRequest {
    /// Column delta.
    pub dx: i32,
    /// Row delta.
    pub dy: i32,
}

/// An opaque simulated entity occupying one cell.
///
/// Identity is not preserved beyond the encoded bytes: an agent rebuilt
/// from a checkpoint or a transfer message is a fresh value with the same
/// encoded state.
pub trait Agent: Send + fmt::Debug {
    /// Serialize to the application-defined binary form.
    fn to_bytes(&self) -> Vec<u8>;

    /// Per-turn behavior hook, invoked once per turn while the agent has
    /// not yet acted. May request a move relative to the agent's cell; the
    /// target may fall outside the local partition.
    fn propose_move(
        &mut self,
        at: GlobalCoord,
        turn: Turn,
        rng: &mut dyn RngCore,
    ) -> Option<MoveRequest>;
}

/// Reconstructs agents from their application-defined binary form.
pub trait AgentCodec: Send + Sync {
    /// Rebuild an agent from `bytes`.
    fn decode(&self, bytes: &[u8]) -> Result<Box<dyn Agent>, CodecError>;

    /// Encode an agent. The default defers to [`Agent::to_bytes`].
    fn encode(&self, agent: &dyn Agent) -> Vec<u8> {
        agent.to_bytes()
    }
}
