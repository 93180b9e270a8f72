//! Demo grazing agent used by the node binary and tests.

use rand::Rng;

use warpgrid_core::{Agent, AgentCodec, CodecError, GlobalCoord, MoveRequest, Turn};

/// Species tag for [`Rabbit`] in the demo binary encoding.
const SPECIES_RABBIT: u8 = 0x1;

/// Encoded size of a rabbit: species tag, hop count (u32), restlessness.
const RABBIT_LEN: usize = 6;

/// A simple wandering agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rabbit {
    hops: u32,
    /// Percent chance of hopping to a neighbor on a given turn.
    restlessness: u8,
}

impl Rabbit {
    /// A rabbit that never leaves its cell.
    pub fn sedentary() -> Self {
        Self::wanderer(0)
    }

    /// A rabbit that hops to a random neighbor with the given percent
    /// chance each turn.
    pub fn wanderer(restlessness: u8) -> Self {
        Self {
            hops: 0,
            restlessness: restlessness.min(100),
        }
    }

    /// How many times this rabbit has hopped.
    pub fn hops(&self) -> u32 {
        self.hops
    }
}

impl Agent for Rabbit {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(RABBIT_LEN);
        bytes.push(SPECIES_RABBIT);
        bytes.extend_from_slice(&self.hops.to_be_bytes());
        bytes.push(self.restlessness);
        bytes
    }

    fn propose_move(
        &mut self,
        _at: GlobalCoord,
        _turn: Turn,
        rng: &mut dyn rand::RngCore,
    ) -> Option<MoveRequest> {
        if self.restlessness == 0 || rng.gen_range(0..100) >= u32::from(self.restlessness) {
            return None;
        }
        let dx = rng.gen_range(-1..=1);
        let dy = rng.gen_range(-1..=1);
        if dx == 0 && dy == 0 {
            return None;
        }
        self.hops += 1;
        Some(MoveRequest { dx, dy })
    }
}

/// Codec for the demo species set.
#[derive(Debug, Default, Clone, Copy)]
pub struct DemoCodec;

impl AgentCodec for DemoCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Box<dyn Agent>, CodecError> {
        match bytes.first() {
            Some(&SPECIES_RABBIT) => {
                if bytes.len() < RABBIT_LEN {
                    return Err(CodecError::Truncated {
                        offset: bytes.len(),
                    });
                }
                let hops = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
                Ok(Box::new(Rabbit {
                    hops,
                    restlessness: bytes[5],
                }))
            }
            Some(&tag) => Err(CodecError::UnknownSpecies(tag)),
            None => Err(CodecError::Truncated { offset: 0 }),
        }
    }
}
