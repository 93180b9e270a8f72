//! One live link to a remote node.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::OnceLock;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

use warpgrid_core::{Partition, RegionOwner, Turn};

use crate::codec::{write_end_turn, write_message};
use crate::protocol::Message;
use crate::StreamWriter;

/// Errors surfaced when sending to a peer.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The link was marked unusable by an earlier I/O failure.
    #[error("peer link {peer} is down")]
    Down {
        /// Peer identity.
        peer: usize,
    },
    /// The write failed; the link is now marked unusable.
    #[error("write to peer {peer} failed")]
    Write {
        /// Peer identity.
        peer: usize,
        /// Underlying stream failure.
        #[source]
        source: std::io::Error,
    },
}

/// A remote node: the partition it owns plus the write half of the stream.
///
/// Sends hold the writer lock for exactly one frame, so concurrent senders
/// never interleave mid-frame. Frames to different peers are independent;
/// there is no global send lock.
pub struct PeerLink {
    id: usize,
    partition: OnceLock<Partition>,
    writer: Mutex<StreamWriter>,
    alive: AtomicBool,
    last_end_turn: AtomicI32,
}

impl PeerLink {
    /// Wrap the write half of an established stream.
    ///
    /// The peer's partition is unset until [`PeerLink::set_partition`]
    /// records the help-negotiation outcome.
    pub fn new(id: usize, writer: StreamWriter) -> Self {
        Self {
            id,
            partition: OnceLock::new(),
            writer: Mutex::new(writer),
            alive: AtomicBool::new(true),
            last_end_turn: AtomicI32::new(-1),
        }
    }

    /// Numeric identity, used in logs.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Record the partition this peer owns.
    ///
    /// Called exactly once after the help negotiation; a second call is a
    /// bootstrap bug and keeps the first value.
    pub fn set_partition(&self, partition: Partition) {
        if self.partition.set(partition).is_err() {
            warn!(peer = self.id, "peer partition set twice; keeping the first");
        }
    }

    /// The peer's partition, if negotiation has completed.
    pub fn partition(&self) -> Option<Partition> {
        self.partition.get().copied()
    }

    /// Whether the link is still usable for sends.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Latest end-of-turn marker received from this peer, if any.
    pub fn last_end_turn(&self) -> Option<Turn> {
        let turn = self.last_end_turn.load(Ordering::Relaxed);
        (turn >= 0).then_some(Turn(turn))
    }

    /// Record an end-of-turn marker observed by the listener.
    pub fn note_end_turn(&self, turn: Turn) {
        self.last_end_turn.store(turn.0, Ordering::Relaxed);
    }

    /// Send one message, holding the writer lock for the frame duration.
    pub async fn send(&self, message: &Message) -> Result<(), LinkError> {
        if !self.is_alive() {
            return Err(LinkError::Down { peer: self.id });
        }
        let mut writer = self.writer.lock().await;
        write_message(&mut *writer, message)
            .await
            .map_err(|source| self.mark_down(source))
    }

    /// Send an end-of-turn marker.
    pub async fn send_end_turn(&self, turn: Turn) -> Result<(), LinkError> {
        if !self.is_alive() {
            return Err(LinkError::Down { peer: self.id });
        }
        let mut writer = self.writer.lock().await;
        write_end_turn(&mut *writer, turn)
            .await
            .map_err(|source| self.mark_down(source))
    }

    fn mark_down(&self, source: std::io::Error) -> LinkError {
        self.alive.store(false, Ordering::Relaxed);
        LinkError::Write {
            peer: self.id,
            source,
        }
    }
}

impl RegionOwner for PeerLink {
    fn region(&self) -> Partition {
        self.partition.get().copied().unwrap_or(Partition::EMPTY)
    }
}

impl std::fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerLink")
            .field("id", &self.id)
            .field("partition", &self.partition.get())
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_frame;
    use crate::protocol::Frame;
    use warpgrid_core::GlobalCoord;

    #[tokio::test]
    async fn sends_arrive_framed() {
        let (tx, mut rx) = tokio::io::duplex(256);
        let link = PeerLink::new(0, Box::new(tx));

        let message = Message::send_agent(Turn(2), GlobalCoord::new(6, 1), b"m");
        link.send(&message).await.expect("send");
        link.send_end_turn(Turn(2)).await.expect("end turn");

        match read_frame(&mut rx).await.expect("frame") {
            Some(Frame::Agent(decoded)) => assert_eq!(decoded, message),
            other => panic!("expected agent frame, got {other:?}"),
        }
        match read_frame(&mut rx).await.expect("frame") {
            Some(Frame::EndTurn(turn)) => assert_eq!(turn, Turn(2)),
            other => panic!("expected end-turn frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn write_failure_marks_link_down() {
        let (tx, rx) = tokio::io::duplex(16);
        drop(rx);
        let link = PeerLink::new(3, Box::new(tx));
        let message = Message::send_agent(Turn(1), GlobalCoord::new(0, 0), b"m");

        let err = link.send(&message).await.expect_err("closed stream");
        assert!(matches!(err, LinkError::Write { peer: 3, .. }));
        assert!(!link.is_alive());

        let err = link.send(&message).await.expect_err("link marked down");
        assert!(matches!(err, LinkError::Down { peer: 3 }));
    }

    #[tokio::test]
    async fn partition_is_recorded_once() {
        let (tx, _rx) = tokio::io::duplex(16);
        let link = PeerLink::new(0, Box::new(tx));
        assert!(link.partition().is_none());
        assert!(!link.owns(GlobalCoord::new(0, 0)));

        link.set_partition(Partition::new(5, 0, 5, 10));
        link.set_partition(Partition::new(0, 0, 1, 1));
        assert_eq!(link.partition(), Some(Partition::new(5, 0, 5, 10)));
        assert!(link.owns(GlobalCoord::new(7, 3)));
        assert!(!link.owns(GlobalCoord::new(4, 3)));
    }
}
