//! Help-offer negotiation over an established byte stream.
//!
//! Connection establishment is the caller's concern: both roles take the
//! split halves of an already-open bidirectional stream. The offering node
//! delimits its initial population transfer with a turn-zero end marker so
//! the joiner knows when its region is fully populated; neither side's
//! listener starts until the handshake completes, so the shared offer-help
//! tag is never ambiguous.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use warpgrid_core::{AgentCodec, Turn};
use warpgrid_net::{
    read_frame, read_offer_help_request, read_offer_help_response, spawn_listener,
    write_offer_help_request, write_offer_help_response, Frame, InboundQueue, Message, OfferHelp,
    PeerLink, StreamReader, StreamWriter,
};
use warpgrid_world::LocalGrid;

/// A peer registered by a completed handshake.
pub struct HelpedPeer {
    /// The link to route agent transfers through.
    pub link: Arc<PeerLink>,
    /// The listener task draining the peer's stream.
    pub listener: JoinHandle<()>,
}

/// Server side: split the local grid and hand the offered region to a peer.
///
/// Reads the help request, replies with the offered region plus this node's
/// remaining region, transfers the offered region's current population, and
/// spawns the peer's listener.
pub async fn offer_help(
    grid: &mut LocalGrid,
    codec: &dyn AgentCodec,
    fraction: f64,
    peer_id: usize,
    mut reader: StreamReader,
    mut writer: StreamWriter,
    inbound: Arc<InboundQueue>,
) -> Result<HelpedPeer> {
    read_offer_help_request(&mut reader)
        .await
        .context("reading help request")?;

    let (offered, cells) = grid.split(fraction);
    let offer = OfferHelp {
        offered,
        dims: grid.dims(),
        sender: grid.partition(),
    };
    write_offer_help_response(&mut writer, &offer)
        .await
        .context("sending help response")?;

    let link = Arc::new(PeerLink::new(peer_id, writer));
    link.set_partition(offered);

    // Ship the offered region's population, then mark the transfer done.
    let mut transferred = 0usize;
    for cell in &cells {
        for bytes in cell.encode_population(codec) {
            let message = Message::send_agent(Turn::ZERO, cell.coord(), &bytes);
            link.send(&message)
                .await
                .context("transferring agents to the joining node")?;
            transferred += 1;
        }
    }
    link.send_end_turn(Turn::ZERO)
        .await
        .context("delimiting the population transfer")?;

    info!(
        peer = peer_id,
        offered = %offered,
        retained = %grid.partition(),
        transferred,
        "offered a region to a joining node"
    );
    let listener = spawn_listener(reader, Arc::clone(&link), inbound);
    Ok(HelpedPeer { link, listener })
}

/// Client side: ask a node for a region of its grid.
///
/// Sends the help request, builds the local grid from the response, absorbs
/// the initial population transfer (delimited by a turn-zero end marker),
/// registers the server's remaining region as a peer, and spawns its
/// listener.
pub async fn request_help(
    codec: &dyn AgentCodec,
    peer_id: usize,
    mut reader: StreamReader,
    mut writer: StreamWriter,
    inbound: Arc<InboundQueue>,
) -> Result<(LocalGrid, HelpedPeer)> {
    write_offer_help_request(&mut writer)
        .await
        .context("sending help request")?;
    let offer = read_offer_help_response(&mut reader)
        .await
        .context("reading help response")?;

    let mut grid = LocalGrid::new(offer.offered, offer.dims);
    let mut received = 0usize;
    loop {
        match read_frame(&mut reader)
            .await
            .context("reading population transfer")?
        {
            Some(Frame::Agent(message)) => {
                let (coord, bytes) = message
                    .agent_payload()
                    .context("malformed population transfer")?;
                let agent = codec
                    .decode(bytes)
                    .context("decoding transferred agent")?;
                grid.place_agent(coord, agent)
                    .context("placing transferred agent")?;
                received += 1;
            }
            Some(Frame::EndTurn(_)) => break,
            Some(Frame::Unknown(tag)) => {
                warn!(tag, "ignoring unknown frame during population transfer");
            }
            None => anyhow::bail!("peer closed the stream during population transfer"),
        }
    }

    let link = Arc::new(PeerLink::new(peer_id, writer));
    link.set_partition(offer.sender);

    info!(
        peer = peer_id,
        partition = %offer.offered,
        peer_partition = %offer.sender,
        received,
        "joined with a borrowed region"
    );
    let listener = spawn_listener(reader, Arc::clone(&link), inbound);
    Ok((grid, HelpedPeer { link, listener }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use warpgrid_core::{GlobalCoord, GridDims, Partition};
    use warpgrid_world::{DemoCodec, Rabbit};

    fn stream_pair() -> ((StreamReader, StreamWriter), (StreamReader, StreamWriter)) {
        let (server_side, client_side) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server_side);
        let (client_read, client_write) = tokio::io::split(client_side);
        (
            (Box::new(server_read), Box::new(server_write)),
            (Box::new(client_read), Box::new(client_write)),
        )
    }

    #[tokio::test]
    async fn handshake_splits_the_grid_and_ships_agents() {
        let ((server_read, server_write), (client_read, client_write)) = stream_pair();

        let server = tokio::spawn(async move {
            let mut grid =
                LocalGrid::new(Partition::new(0, 0, 10, 10), GridDims::new(10, 10));
            // One agent in each half.
            grid.place_agent(GlobalCoord::new(1, 1), Box::new(Rabbit::sedentary()))
                .expect("place");
            grid.place_agent(GlobalCoord::new(8, 2), Box::new(Rabbit::sedentary()))
                .expect("place");

            let inbound = Arc::new(InboundQueue::new());
            let helped = offer_help(
                &mut grid,
                &DemoCodec,
                0.5,
                0,
                server_read,
                server_write,
                inbound,
            )
            .await
            .expect("offer help");
            (grid, helped)
        });

        let inbound = Arc::new(InboundQueue::new());
        let (client_grid, helped) =
            request_help(&DemoCodec, 0, client_read, client_write, inbound)
                .await
                .expect("request help");

        let (server_grid, server_helped) = server.await.expect("server task");

        assert_eq!(server_grid.partition(), Partition::new(0, 0, 5, 10));
        assert_eq!(client_grid.partition(), Partition::new(5, 0, 5, 10));
        assert_eq!(client_grid.dims(), GridDims::new(10, 10));

        // The offered half's agent crossed over; the retained one stayed.
        assert_eq!(server_grid.occupied(), vec![GlobalCoord::new(1, 1)]);
        assert_eq!(client_grid.occupied(), vec![GlobalCoord::new(8, 2)]);

        // Each side knows the other's partition.
        assert_eq!(
            helped.link.partition(),
            Some(Partition::new(0, 0, 5, 10))
        );
        assert_eq!(
            server_helped.link.partition(),
            Some(Partition::new(5, 0, 5, 10))
        );
    }
}
