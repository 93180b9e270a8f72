//! Partition rectangles and the one-time split rule.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::coord::GlobalCoord;

/// A node's owned rectangle within the global grid.
///
/// Partitions owned by different nodes are disjoint and together tile the
/// full global grid. A partition changes at most once, when [`Partition::split_right`]
/// hands a sub-rectangle to a newly joining node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Top-left column (inclusive).
    pub tlx: i32,
    /// Top-left row (inclusive).
    pub tly: i32,
    /// Width in cells.
    pub width: i32,
    /// Height in cells.
    pub height: i32,
}

impl Partition {
    /// The zero-area rectangle; owns no coordinate.
    pub const EMPTY: Self = Self::new(0, 0, 0, 0);

    /// Create a partition rectangle.
    pub const fn new(tlx: i32, tly: i32, width: i32, height: i32) -> Self {
        Self {
            tlx,
            tly,
            width,
            height,
        }
    }

    /// Whether a normalized coordinate falls inside this rectangle.
    pub const fn contains(&self, coord: GlobalCoord) -> bool {
        coord.x >= self.tlx
            && coord.x < self.tlx + self.width
            && coord.y >= self.tly
            && coord.y < self.tly + self.height
    }

    /// Number of cells in the rectangle.
    pub const fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    /// Iterate every coordinate in the rectangle, row-major.
    pub fn coords(&self) -> impl Iterator<Item = GlobalCoord> + '_ {
        let Partition {
            tlx,
            tly,
            width,
            height,
        } = *self;
        (tly..tly + height).flat_map(move |y| (tlx..tlx + width).map(move |x| GlobalCoord::new(x, y)))
    }

    /// Carve the right-hand columns off for a joining peer.
    ///
    /// Returns `(retained, offered)`. The offered rectangle spans the full
    /// height and the rightmost `width * fraction` columns (rounded down);
    /// with a fraction of one half, a width-10 partition yields 5 + 5. A
    /// partition too narrow to share offers the empty rectangle.
    pub fn split_right(&self, fraction: f64) -> (Self, Self) {
        if self.width < 2 {
            let offered = Self::new(self.tlx + self.width, self.tly, 0, self.height);
            return (*self, offered);
        }
        let offered_width = ((self.width as f64) * fraction) as i32;
        let offered_width = offered_width.clamp(1, self.width - 1);
        let retained_width = self.width - offered_width;
        let retained = Self::new(self.tlx, self.tly, retained_width, self.height);
        let offered = Self::new(
            self.tlx + retained_width,
            self.tly,
            offered_width,
            self.height,
        );
        (retained, offered)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}@({}, {})",
            self.width, self.height, self.tlx, self.tly
        )
    }
}

/// Capability exposed by anything that owns a rectangle of the global grid.
///
/// Coordinate routing works exclusively through this interface; the local
/// grid and remote peer links implement it independently.
pub trait RegionOwner {
    /// The rectangle this owner is responsible for.
    fn region(&self) -> Partition;

    /// Whether a normalized coordinate falls inside the owned rectangle.
    fn owns(&self, coord: GlobalCoord) -> bool {
        self.region().contains(coord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_respects_bounds() {
        let p = Partition::new(5, 0, 5, 10);
        assert!(p.contains(GlobalCoord::new(5, 0)));
        assert!(p.contains(GlobalCoord::new(9, 9)));
        assert!(!p.contains(GlobalCoord::new(4, 0)));
        assert!(!p.contains(GlobalCoord::new(10, 0)));
    }

    #[test]
    fn split_halves_a_ten_wide_partition() {
        let p = Partition::new(0, 0, 10, 10);
        let (retained, offered) = p.split_right(0.5);
        assert_eq!(retained, Partition::new(0, 0, 5, 10));
        assert_eq!(offered, Partition::new(5, 0, 5, 10));
    }

    #[test]
    fn split_pieces_tile_the_original_exactly_once() {
        let p = Partition::new(2, 3, 10, 10);
        let (retained, offered) = p.split_right(0.5);
        for coord in p.coords() {
            let in_retained = retained.contains(coord);
            let in_offered = offered.contains(coord);
            assert!(in_retained ^ in_offered, "coordinate {coord} covered wrong");
        }
        assert_eq!(retained.area() + offered.area(), p.area());
    }

    #[test]
    fn split_always_keeps_both_sides_nonempty() {
        let p = Partition::new(0, 0, 2, 4);
        let (retained, offered) = p.split_right(0.9);
        assert!(retained.width >= 1);
        assert!(offered.width >= 1);
        assert_eq!(retained.width + offered.width, 2);
    }

    #[test]
    fn coords_visits_row_major() {
        let p = Partition::new(1, 1, 2, 2);
        let coords: Vec<_> = p.coords().collect();
        assert_eq!(
            coords,
            vec![
                GlobalCoord::new(1, 1),
                GlobalCoord::new(2, 1),
                GlobalCoord::new(1, 2),
                GlobalCoord::new(2, 2),
            ]
        );
    }
}
