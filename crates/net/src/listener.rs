//! Background reader task feeding the inbound queue.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::read_frame;
use crate::peer::PeerLink;
use crate::protocol::Frame;
use crate::queue::InboundQueue;
use crate::StreamReader;

/// Spawn the listener task for one peer link.
///
/// The task runs for the lifetime of the connection: it decodes frames off
/// the read half, annihilates or enqueues agent transfers, records
/// end-of-turn markers on the link, and terminates on decode failure or
/// end-of-stream.
pub fn spawn_listener(
    mut reader: StreamReader,
    link: Arc<PeerLink>,
    queue: Arc<InboundQueue>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(Frame::Agent(message))) => {
                    if queue.insert_or_annihilate(message) {
                        debug!(peer = link.id(), "message and anti-message annihilated");
                    }
                }
                Ok(Some(Frame::EndTurn(turn))) => {
                    // Ordering marker only; never enqueued.
                    link.note_end_turn(turn);
                }
                Ok(Some(Frame::Unknown(tag))) => {
                    warn!(peer = link.id(), tag, "ignoring unknown frame tag");
                }
                Ok(None) => {
                    info!(peer = link.id(), "peer stream closed; listener stopping");
                    break;
                }
                Err(err) => {
                    warn!(
                        peer = link.id(),
                        error = %err,
                        "frame decode failed; listener stopping"
                    );
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{write_end_turn, write_message};
    use crate::protocol::Message;
    use tokio::io::AsyncWriteExt;
    use warpgrid_core::{GlobalCoord, Turn};

    #[tokio::test]
    async fn listener_feeds_queue_and_stops_on_eof() {
        let (mut tx, rx) = tokio::io::duplex(1024);
        let link = Arc::new(PeerLink::new(0, Box::new(tokio::io::sink())));
        let queue = Arc::new(InboundQueue::new());
        let handle = spawn_listener(Box::new(rx), Arc::clone(&link), Arc::clone(&queue));

        let message = Message::send_agent(Turn(3), GlobalCoord::new(1, 2), b"m");
        write_message(&mut tx, &message).await.expect("write");
        write_end_turn(&mut tx, Turn(3)).await.expect("end turn");
        drop(tx);

        handle.await.expect("listener task");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop_min(), Some(message));
        assert_eq!(link.last_end_turn(), Some(Turn(3)));
    }

    #[tokio::test]
    async fn listener_annihilates_pending_pair() {
        let (mut tx, rx) = tokio::io::duplex(1024);
        let link = Arc::new(PeerLink::new(0, Box::new(tokio::io::sink())));
        let queue = Arc::new(InboundQueue::new());
        let handle = spawn_listener(Box::new(rx), Arc::clone(&link), Arc::clone(&queue));

        let message = Message::send_agent(Turn(5), GlobalCoord::new(0, 0), b"m");
        write_message(&mut tx, &message).await.expect("write");
        write_message(&mut tx, &message.antimessage())
            .await
            .expect("write anti");
        drop(tx);

        handle.await.expect("listener task");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn listener_skips_unknown_tags() {
        let (mut tx, rx) = tokio::io::duplex(1024);
        let link = Arc::new(PeerLink::new(0, Box::new(tokio::io::sink())));
        let queue = Arc::new(InboundQueue::new());
        let handle = spawn_listener(Box::new(rx), Arc::clone(&link), Arc::clone(&queue));

        tx.write_all(&[0x6b]).await.expect("unknown tag");
        let message = Message::send_agent(Turn(1), GlobalCoord::new(0, 0), b"m");
        write_message(&mut tx, &message).await.expect("write");
        drop(tx);

        handle.await.expect("listener task");
        assert_eq!(queue.len(), 1);
    }
}
