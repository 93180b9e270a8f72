#![warn(missing_docs)]
//! Local grid state: cells, partition-owned storage, and checkpoints.

mod cell;
mod checkpoint;
mod grid;
mod observer;
pub mod rabbit;

pub use cell::Cell;
pub use checkpoint::{CheckpointError, CheckpointStore};
pub use grid::{LocalGrid, Resolution, RoutingError};
pub use observer::{render, GridObserver, TextObserver};
pub use rabbit::{DemoCodec, Rabbit};
