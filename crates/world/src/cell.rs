//! A single grid cell and its agent population.

use warpgrid_core::{Agent, AgentCodec, GlobalCoord};

/// One cell of the local partition.
///
/// Owned and mutated only by the node's turn engine; inbound transfers
/// reach it through the engine's drain step, never directly from listener
/// tasks.
#[derive(Debug)]
pub struct Cell {
    coord: GlobalCoord,
    agents: Vec<Slot>,
}

#[derive(Debug)]
struct Slot {
    agent: Box<dyn Agent>,
    /// Set once the agent has taken its action this turn.
    acted: bool,
}

impl Cell {
    /// Create an empty cell at `coord`.
    pub fn new(coord: GlobalCoord) -> Self {
        Self {
            coord,
            agents: Vec::new(),
        }
    }

    /// The global coordinate this cell sits at.
    pub fn coord(&self) -> GlobalCoord {
        self.coord
    }

    /// Number of agents currently occupying the cell.
    pub fn population(&self) -> usize {
        self.agents.len()
    }

    /// Whether any agent occupies the cell.
    pub fn is_occupied(&self) -> bool {
        !self.agents.is_empty()
    }

    /// Deposit an agent.
    ///
    /// The arrival keeps its acted flag set so an agent moved into a cell
    /// that updates later in the same turn does not act twice.
    pub fn add(&mut self, agent: Box<dyn Agent>) {
        self.agents.push(Slot { agent, acted: true });
    }

    /// Clear per-turn bookkeeping at the top of a turn.
    pub fn reset_turn_flags(&mut self) {
        for slot in &mut self.agents {
            slot.acted = false;
        }
    }

    /// Remove and return the next agent that has not yet acted this turn.
    pub fn take_unacted(&mut self) -> Option<Box<dyn Agent>> {
        let index = self.agents.iter().position(|slot| !slot.acted)?;
        Some(self.agents.remove(index).agent)
    }

    /// Encode every occupying agent, in residence order.
    pub fn encode_population(&self, codec: &dyn AgentCodec) -> Vec<Vec<u8>> {
        self.agents
            .iter()
            .map(|slot| codec.encode(slot.agent.as_ref()))
            .collect()
    }

    /// Replace the entire population, e.g. during a checkpoint restore.
    pub fn replace_population(&mut self, agents: Vec<Box<dyn Agent>>) {
        self.agents = agents
            .into_iter()
            .map(|agent| Slot { agent, acted: true })
            .collect();
    }
}
