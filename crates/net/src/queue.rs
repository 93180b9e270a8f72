//! Turn-ordered inbound message queue shared by listeners and the engine.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use warpgrid_core::Turn;

use crate::protocol::Message;

/// Inbound messages not yet processed, ordered by the turn they were sent.
///
/// Listener tasks insert (with anti-message annihilation) while the turn
/// engine drains; every insert/remove happens under the internal mutex.
/// [`InboundQueue::is_empty_hint`] reads an advisory counter without the
/// lock; a concurrent arrival it misses is picked up on the next drain.
#[derive(Debug, Default)]
pub struct InboundQueue {
    by_turn: Mutex<BTreeMap<Turn, Vec<Message>>>,
    len: AtomicUsize,
}

impl InboundQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `message` unless an equal-and-opposite message is already
    /// pending; in that case the pair annihilates and both are consumed.
    ///
    /// Returns `true` if an annihilation happened.
    pub fn insert_or_annihilate(&self, message: Message) -> bool {
        let mut by_turn = self.by_turn.lock().expect("inbound queue lock poisoned");
        if let Some(bucket) = by_turn.get_mut(&message.send_turn) {
            if let Some(position) = bucket.iter().position(|m| m.annihilates(&message)) {
                bucket.remove(position);
                if bucket.is_empty() {
                    by_turn.remove(&message.send_turn);
                }
                self.len.fetch_sub(1, Ordering::Relaxed);
                return true;
            }
        }
        by_turn.entry(message.send_turn).or_default().push(message);
        self.len.fetch_add(1, Ordering::Relaxed);
        false
    }

    /// Remove the pending message with the smallest send turn.
    pub fn pop_min(&self) -> Option<Message> {
        let mut by_turn = self.by_turn.lock().expect("inbound queue lock poisoned");
        let mut entry = by_turn.first_entry()?;
        let message = entry.get_mut().remove(0);
        if entry.get().is_empty() {
            entry.remove();
        }
        self.len.fetch_sub(1, Ordering::Relaxed);
        Some(message)
    }

    /// Advisory emptiness check, safe to call without taking the lock.
    pub fn is_empty_hint(&self) -> bool {
        self.len.load(Ordering::Relaxed) == 0
    }

    /// Number of pending messages (advisory, like [`InboundQueue::is_empty_hint`]).
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Whether the queue currently holds no messages.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
