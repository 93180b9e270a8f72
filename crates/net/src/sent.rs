//! Record of outbound agent transfers, kept for anti-message emission.

use warpgrid_core::Turn;

use crate::protocol::Message;

/// Outbound `SendAgent` messages that have not been invalidated or pruned,
/// each tagged with the registration index of the peer that received it.
///
/// Rollback drains every entry newer than the restore target and sends the
/// mirrored anti-message so receivers annihilate the originals.
#[derive(Debug, Default)]
pub struct SentLog {
    entries: Vec<(usize, Message)>,
}

impl SentLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message sent to the peer at `peer_index`.
    pub fn record(&mut self, peer_index: usize, message: Message) {
        self.entries.push((peer_index, message));
    }

    /// Remove and return every entry with a send turn greater than `target`.
    pub fn drain_after(&mut self, target: Turn) -> Vec<(usize, Message)> {
        let mut drained = Vec::new();
        let mut index = 0;
        while index < self.entries.len() {
            if self.entries[index].1.send_turn > target {
                drained.push(self.entries.remove(index));
            } else {
                index += 1;
            }
        }
        drained
    }

    /// Drop entries at or before `turn`; they can no longer be rolled back.
    pub fn prune_through(&mut self, turn: Turn) {
        self.entries.retain(|(_, message)| message.send_turn > turn);
    }

    /// Number of recorded sends.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
