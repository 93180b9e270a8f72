//! The node's owned rectangle of cells and coordinate routing.

use thiserror::Error;
use tracing::info;

use warpgrid_core::{Agent, GlobalCoord, GridDims, Partition, RegionOwner};

use crate::cell::Cell;

/// Routing failure: a coordinate owned by no known node.
///
/// A configuration/bootstrap error. Callers log it and drop the affected
/// agent move rather than propagating a fatal fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no owner for cell {coord}")]
pub struct RoutingError {
    /// The normalized coordinate that failed to resolve.
    pub coord: GlobalCoord,
}

/// Where a normalized coordinate lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Inside the local partition, at the normalized coordinate.
    Local(GlobalCoord),
    /// Owned by the peer at this registration index.
    Peer(usize),
}

/// The rectangle of cells this node owns.
///
/// Cells are stored row-major over the partition. All mutation happens on
/// the turn-engine thread.
#[derive(Debug)]
pub struct LocalGrid {
    partition: Partition,
    dims: GridDims,
    cells: Vec<Cell>,
}

impl LocalGrid {
    /// Create an empty grid covering `partition` of a `dims` global grid.
    pub fn new(partition: Partition, dims: GridDims) -> Self {
        let cells = partition.coords().map(Cell::new).collect();
        Self {
            partition,
            dims,
            cells,
        }
    }

    /// The partition this node currently owns.
    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// The global grid dimensions.
    pub fn dims(&self) -> GridDims {
        self.dims
    }

    /// Wrap a raw coordinate into the toroidal global range.
    pub fn normalize(&self, coord: GlobalCoord) -> GlobalCoord {
        self.dims.normalize(coord)
    }

    fn index_of(&self, coord: GlobalCoord) -> usize {
        let row = coord.y - self.partition.tly;
        let col = coord.x - self.partition.tlx;
        (row * self.partition.width + col) as usize
    }

    /// The local cell at a normalized coordinate, if this node owns it.
    pub fn cell(&self, coord: GlobalCoord) -> Option<&Cell> {
        self.partition
            .contains(coord)
            .then(|| &self.cells[self.index_of(coord)])
    }

    /// Mutable access to the local cell at a normalized coordinate.
    pub fn cell_mut(&mut self, coord: GlobalCoord) -> Option<&mut Cell> {
        if self.partition.contains(coord) {
            let index = self.index_of(coord);
            Some(&mut self.cells[index])
        } else {
            None
        }
    }

    /// Resolve a raw coordinate to its owner.
    ///
    /// The coordinate is normalized first. Peers are consulted in
    /// registration order; the first whose declared partition contains the
    /// normalized coordinate wins.
    pub fn resolve<'a, I, O>(&self, coord: GlobalCoord, peers: I) -> Result<Resolution, RoutingError>
    where
        I: IntoIterator<Item = &'a O>,
        O: RegionOwner + 'a,
    {
        let coord = self.normalize(coord);
        if self.partition.contains(coord) {
            return Ok(Resolution::Local(coord));
        }
        for (index, peer) in peers.into_iter().enumerate() {
            if peer.owns(coord) {
                return Ok(Resolution::Peer(index));
            }
        }
        Err(RoutingError { coord })
    }

    /// Deposit an agent at a locally-owned coordinate.
    pub fn place_agent(
        &mut self,
        coord: GlobalCoord,
        agent: Box<dyn Agent>,
    ) -> Result<(), RoutingError> {
        let coord = self.normalize(coord);
        match self.cell_mut(coord) {
            Some(cell) => {
                cell.add(agent);
                Ok(())
            }
            None => Err(RoutingError { coord }),
        }
    }

    /// Iterate all local cells, row-major.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    /// Iterate all local cells mutably, row-major.
    pub fn cells_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.cells.iter_mut()
    }

    /// Coordinates of every occupied cell, row-major.
    pub fn occupied(&self) -> Vec<GlobalCoord> {
        self.cells
            .iter()
            .filter(|cell| cell.is_occupied())
            .map(Cell::coord)
            .collect()
    }

    /// Total number of agents across all local cells.
    pub fn population(&self) -> usize {
        self.cells.iter().map(Cell::population).sum()
    }

    /// One-time split: carve the right columns off for a joining peer.
    ///
    /// Shrinks this grid to the retained rectangle, re-indexes the kept
    /// cells, and returns the offered partition together with the drained
    /// offered cells (agents included) for transfer.
    pub fn split(&mut self, fraction: f64) -> (Partition, Vec<Cell>) {
        let (retained, offered) = self.partition.split_right(fraction);
        let mut kept = Vec::with_capacity(retained.area() as usize);
        let mut given = Vec::with_capacity(offered.area() as usize);
        for cell in self.cells.drain(..) {
            if retained.contains(cell.coord()) {
                kept.push(cell);
            } else {
                given.push(cell);
            }
        }
        self.partition = retained;
        self.cells = kept;
        info!(retained = %retained, offered = %offered, "partition split");
        (offered, given)
    }
}

impl RegionOwner for LocalGrid {
    fn region(&self) -> Partition {
        self.partition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rabbit::Rabbit;
    use proptest::prelude::*;

    struct FakePeer(Partition);

    impl RegionOwner for FakePeer {
        fn region(&self) -> Partition {
            self.0
        }
    }

    const NO_PEERS: &[FakePeer] = &[];

    fn ten_by_ten() -> LocalGrid {
        LocalGrid::new(Partition::new(0, 0, 10, 10), GridDims::new(10, 10))
    }

    #[test]
    fn resolve_wraps_toroidally() {
        let grid = ten_by_ten();
        assert_eq!(
            grid.resolve(GlobalCoord::new(10, 0), NO_PEERS),
            grid.resolve(GlobalCoord::new(0, 0), NO_PEERS)
        );
        assert_eq!(
            grid.resolve(GlobalCoord::new(-1, 0), NO_PEERS),
            grid.resolve(GlobalCoord::new(9, 0), NO_PEERS)
        );
    }

    #[test]
    fn resolve_prefers_local_then_first_matching_peer() {
        let mut grid = ten_by_ten();
        let (offered, _) = grid.split(0.5);
        let peers = [FakePeer(offered)];

        assert_eq!(
            grid.resolve(GlobalCoord::new(2, 2), &peers),
            Ok(Resolution::Local(GlobalCoord::new(2, 2)))
        );
        assert_eq!(
            grid.resolve(GlobalCoord::new(7, 2), &peers),
            Ok(Resolution::Peer(0))
        );
    }

    #[test]
    fn unowned_coordinate_is_a_routing_error() {
        let mut grid = ten_by_ten();
        let _ = grid.split(0.5);
        assert_eq!(
            grid.resolve(GlobalCoord::new(7, 2), NO_PEERS),
            Err(RoutingError {
                coord: GlobalCoord::new(7, 2)
            })
        );
    }

    #[test]
    fn split_scenario_matches_the_defined_rule() {
        let mut grid = ten_by_ten();
        grid.place_agent(GlobalCoord::new(7, 4), Box::new(Rabbit::sedentary()))
            .expect("place");

        let (offered, given) = grid.split(0.5);
        assert_eq!(grid.partition(), Partition::new(0, 0, 5, 10));
        assert_eq!(offered, Partition::new(5, 0, 5, 10));
        assert_eq!(given.len(), 50);
        assert_eq!(grid.cells().count(), 50);

        // The agent sat in the offered half and leaves with it.
        assert_eq!(grid.population(), 0);
        let moved: usize = given.iter().map(Cell::population).sum();
        assert_eq!(moved, 1);
    }

    #[test]
    fn cells_reindex_after_split() {
        let mut grid = ten_by_ten();
        let _ = grid.split(0.5);
        grid.place_agent(GlobalCoord::new(4, 9), Box::new(Rabbit::sedentary()))
            .expect("place");
        assert_eq!(grid.occupied(), vec![GlobalCoord::new(4, 9)]);
        assert!(grid.cell(GlobalCoord::new(4, 9)).is_some());
        assert!(grid.cell(GlobalCoord::new(5, 9)).is_none());
    }

    proptest! {
        // With partitions tiling the grid, every coordinate resolves.
        #[test]
        fn tiled_partitions_resolve_everything(x in -50i32..50, y in -50i32..50) {
            let mut grid = ten_by_ten();
            let (offered, _) = grid.split(0.5);
            let peers = [FakePeer(offered)];
            prop_assert!(grid.resolve(GlobalCoord::new(x, y), &peers).is_ok());
        }

        #[test]
        fn resolution_is_wrap_stable(x in -50i32..50, y in -50i32..50) {
            let grid = ten_by_ten();
            let base = grid.resolve(GlobalCoord::new(x, y), NO_PEERS);
            let wrapped = grid.resolve(GlobalCoord::new(x + 10, y - 10), NO_PEERS);
            prop_assert_eq!(base, wrapped);
        }
    }
}
