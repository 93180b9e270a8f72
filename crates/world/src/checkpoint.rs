//! Per-turn snapshots of cell populations, keyed by turn number.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use warpgrid_core::{AgentCodec, CodecError, GlobalCoord, Turn};

use crate::grid::LocalGrid;

/// Checkpoint failures.
///
/// [`CheckpointError::Missing`] is fatal for the node: it means a rollback
/// targeted a turn outside the retention window, which is a configuration
/// error, and continuing would corrupt state.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Rollback targeted a turn with no saved checkpoint.
    #[error("no checkpoint saved for turn {0}; retention window too short")]
    Missing(Turn),
    /// A snapshotted agent failed to decode during restore.
    #[error("checkpoint for turn {turn} corrupt at cell {coord}")]
    Corrupt {
        /// Turn being restored.
        turn: Turn,
        /// Cell whose snapshot failed to decode.
        coord: GlobalCoord,
        /// Decode failure.
        #[source]
        source: CodecError,
    },
    /// A snapshotted coordinate falls outside the current partition.
    #[error("checkpoint for turn {turn} references non-local cell {coord}")]
    NotLocal {
        /// Turn being restored.
        turn: Turn,
        /// Offending coordinate.
        coord: GlobalCoord,
    },
}

#[derive(Debug, Clone)]
struct CellSnapshot {
    coord: GlobalCoord,
    agents: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
struct Checkpoint {
    cells: Vec<CellSnapshot>,
}

/// Immutable per-turn snapshots, owned exclusively by the node.
#[derive(Debug, Default)]
pub struct CheckpointStore {
    by_turn: BTreeMap<Turn, Checkpoint>,
}

impl CheckpointStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every local cell's coordinate and population at `turn`.
    pub fn save(&mut self, turn: Turn, grid: &LocalGrid, codec: &dyn AgentCodec) {
        let cells = grid
            .cells()
            .map(|cell| CellSnapshot {
                coord: cell.coord(),
                agents: cell.encode_population(codec),
            })
            .collect();
        self.by_turn.insert(turn, Checkpoint { cells });
    }

    /// Replace every snapshotted cell's population with the checkpoint's.
    ///
    /// The caller resets its turn counter to `turn` afterwards.
    pub fn restore(
        &self,
        turn: Turn,
        grid: &mut LocalGrid,
        codec: &dyn AgentCodec,
    ) -> Result<(), CheckpointError> {
        let checkpoint = self
            .by_turn
            .get(&turn)
            .ok_or(CheckpointError::Missing(turn))?;
        debug!(turn = turn.0, cells = checkpoint.cells.len(), "restoring checkpoint");
        for snapshot in &checkpoint.cells {
            let mut agents = Vec::with_capacity(snapshot.agents.len());
            for bytes in &snapshot.agents {
                let agent = codec.decode(bytes).map_err(|source| CheckpointError::Corrupt {
                    turn,
                    coord: snapshot.coord,
                    source,
                })?;
                agents.push(agent);
            }
            let cell = grid
                .cell_mut(snapshot.coord)
                .ok_or(CheckpointError::NotLocal {
                    turn,
                    coord: snapshot.coord,
                })?;
            cell.replace_population(agents);
        }
        Ok(())
    }

    /// Whether a checkpoint exists for `turn`.
    pub fn contains(&self, turn: Turn) -> bool {
        self.by_turn.contains_key(&turn)
    }

    /// Drop checkpoints strictly before `turn`.
    pub fn prune_before(&mut self, turn: Turn) {
        self.by_turn = self.by_turn.split_off(&turn);
    }

    /// Number of retained checkpoints.
    pub fn len(&self) -> usize {
        self.by_turn.len()
    }

    /// Whether no checkpoints are retained.
    pub fn is_empty(&self) -> bool {
        self.by_turn.is_empty()
    }
}
