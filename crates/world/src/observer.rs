//! Read-only per-turn observation hooks.

use warpgrid_core::{GlobalCoord, Turn};

use crate::cell::Cell;
use crate::grid::LocalGrid;

/// Sink invoked with read-only grid state after every completed turn.
pub trait GridObserver: Send {
    /// Called once per completed turn.
    fn turn_complete(&mut self, turn: Turn, grid: &LocalGrid);
}

/// Render the local grid as rows of `*` (occupied) and `-` (empty).
pub fn render(grid: &LocalGrid) -> String {
    let partition = grid.partition();
    let mut out = String::with_capacity((partition.area() * 2) as usize + partition.height as usize);
    for y in partition.tly..partition.tly + partition.height {
        for x in partition.tlx..partition.tlx + partition.width {
            let occupied = grid
                .cell(GlobalCoord::new(x, y))
                .is_some_and(Cell::is_occupied);
            out.push(if occupied { '*' } else { '-' });
            out.push(' ');
        }
        out.push('\n');
    }
    out
}

/// Prints the occupied-cell map to stdout, one row per line.
#[derive(Debug, Default)]
pub struct TextObserver;

impl GridObserver for TextObserver {
    fn turn_complete(&mut self, turn: Turn, grid: &LocalGrid) {
        println!("turn {turn}");
        print!("{}", render(grid));
    }
}
