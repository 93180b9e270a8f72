#![warn(missing_docs)]
//! Turn engine, pacing, and node bootstrap.

mod bootstrap;
mod engine;
mod pacer;

pub use bootstrap::{offer_help, request_help, HelpedPeer};
pub use engine::TurnEngine;
pub use pacer::TurnPacer;
