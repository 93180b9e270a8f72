//! Big-endian frame encoding and decoding over async byte streams.
//!
//! Frames are materialized into a single buffer before writing so a caller
//! holding a link's writer lock emits one contiguous frame.

use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use warpgrid_core::{GridDims, Partition, Turn};

use crate::protocol::{
    Frame, Message, MessageKind, OfferHelp, ProtocolError, TAG_END_TURN, TAG_OFFER_HELP,
    TAG_SEND_AGENT,
};

/// Upper bound on a SendAgent data blob.
///
/// Prevents a malformed or hostile size field from driving an unbounded
/// allocation.
pub const MAX_DATA_LEN: usize = 64 * 1024;

fn map_eof(err: std::io::Error, context: &'static str) -> ProtocolError {
    if err.kind() == ErrorKind::UnexpectedEof {
        ProtocolError::Truncated { context }
    } else {
        ProtocolError::Io(err)
    }
}

async fn read_i32<R>(reader: &mut R, context: &'static str) -> Result<i32, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    reader.read_i32().await.map_err(|err| map_eof(err, context))
}

async fn read_u8<R>(reader: &mut R, context: &'static str) -> Result<u8, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    reader.read_u8().await.map_err(|err| map_eof(err, context))
}

/// Decode one frame from the stream.
///
/// Returns `Ok(None)` on a clean end-of-stream at the tag position, which
/// signals that the peer connection should stop being read. An unknown tag
/// yields [`Frame::Unknown`] so callers can log and continue.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let tag = match reader.read_u8().await {
        Ok(tag) => tag,
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(ProtocolError::Io(err)),
    };

    match tag {
        TAG_SEND_AGENT => {
            let send_turn = read_i32(reader, "send turn").await?;
            let sign = read_u8(reader, "sign").await? != 0;
            let size = read_i32(reader, "data size").await?;
            if size < 0 || size as usize > MAX_DATA_LEN {
                return Err(ProtocolError::OversizedPayload {
                    size,
                    limit: MAX_DATA_LEN,
                });
            }
            let mut data = vec![0u8; size as usize];
            reader
                .read_exact(&mut data)
                .await
                .map_err(|err| map_eof(err, "agent data"))?;
            Ok(Some(Frame::Agent(Message {
                send_turn: Turn(send_turn),
                sign,
                kind: MessageKind::SendAgent,
                data,
            })))
        }
        TAG_END_TURN => {
            let turn = read_i32(reader, "end-of-turn number").await?;
            Ok(Some(Frame::EndTurn(Turn(turn))))
        }
        other => Ok(Some(Frame::Unknown(other))),
    }
}

/// Encode and write one agent-transfer envelope.
///
/// Envelope layout: tag, send turn (i32), sign (1 byte), data size (i32),
/// then the data bytes.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = Vec::with_capacity(10 + message.data.len());
    frame.push(message.kind.tag());
    frame.extend_from_slice(&message.send_turn.0.to_be_bytes());
    frame.push(u8::from(message.sign));
    frame.extend_from_slice(&(message.data.len() as i32).to_be_bytes());
    frame.extend_from_slice(&message.data);
    writer.write_all(&frame).await?;
    writer.flush().await
}

/// Write an end-of-turn marker.
pub async fn write_end_turn<W>(writer: &mut W, turn: Turn) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = [0u8; 5];
    frame[0] = TAG_END_TURN;
    frame[1..5].copy_from_slice(&turn.0.to_be_bytes());
    writer.write_all(&frame).await?;
    writer.flush().await
}

/// Write a help-offer request (a bare tag byte).
pub async fn write_offer_help_request<W>(writer: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&[TAG_OFFER_HELP]).await?;
    writer.flush().await
}

/// Read a help-offer request tag; any other tag is a protocol error.
pub async fn read_offer_help_request<R>(reader: &mut R) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let tag = read_u8(reader, "help request tag").await?;
    if tag != TAG_OFFER_HELP {
        return Err(ProtocolError::UnexpectedFrame {
            expected: TAG_OFFER_HELP,
            got: tag,
        });
    }
    Ok(())
}

/// Write a help-offer response: the offered region, the global dimensions,
/// and the sender's own remaining region, as ten big-endian i32 fields.
pub async fn write_offer_help_response<W>(writer: &mut W, offer: &OfferHelp) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let fields = [
        offer.offered.tlx,
        offer.offered.tly,
        offer.offered.width,
        offer.offered.height,
        offer.dims.width,
        offer.dims.height,
        offer.sender.tlx,
        offer.sender.tly,
        offer.sender.width,
        offer.sender.height,
    ];
    let mut frame = Vec::with_capacity(1 + fields.len() * 4);
    frame.push(TAG_OFFER_HELP);
    for field in fields {
        frame.extend_from_slice(&field.to_be_bytes());
    }
    writer.write_all(&frame).await?;
    writer.flush().await
}

/// Read a help-offer response.
pub async fn read_offer_help_response<R>(reader: &mut R) -> Result<OfferHelp, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let tag = read_u8(reader, "help response tag").await?;
    if tag != TAG_OFFER_HELP {
        return Err(ProtocolError::UnexpectedFrame {
            expected: TAG_OFFER_HELP,
            got: tag,
        });
    }
    let mut fields = [0i32; 10];
    for (index, field) in fields.iter_mut().enumerate() {
        *field = read_i32(reader, field_name(index)).await?;
    }
    Ok(OfferHelp {
        offered: Partition::new(fields[0], fields[1], fields[2], fields[3]),
        dims: GridDims::new(fields[4], fields[5]),
        sender: Partition::new(fields[6], fields[7], fields[8], fields[9]),
    })
}

const fn field_name(index: usize) -> &'static str {
    match index {
        0 => "offered tlx",
        1 => "offered tly",
        2 => "offered width",
        3 => "offered height",
        4 => "global width",
        5 => "global height",
        6 => "sender tlx",
        7 => "sender tly",
        8 => "sender width",
        _ => "sender height",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warpgrid_core::GlobalCoord;

    #[tokio::test]
    async fn agent_frame_round_trips() {
        let (mut tx, mut rx) = tokio::io::duplex(256);
        let msg = Message::send_agent(Turn(4), GlobalCoord::new(7, 2), b"bytes");
        write_message(&mut tx, &msg).await.expect("write");

        match read_frame(&mut rx).await.expect("read") {
            Some(Frame::Agent(decoded)) => assert_eq!(decoded, msg),
            other => panic!("expected agent frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn anti_message_round_trips_with_sign_cleared() {
        let (mut tx, mut rx) = tokio::io::duplex(256);
        let msg = Message::send_agent(Turn(4), GlobalCoord::new(7, 2), b"bytes").antimessage();
        write_message(&mut tx, &msg).await.expect("write");

        match read_frame(&mut rx).await.expect("read") {
            Some(Frame::Agent(decoded)) => {
                assert!(!decoded.sign);
                assert_eq!(decoded, msg);
            }
            other => panic!("expected agent frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn end_turn_round_trips() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        write_end_turn(&mut tx, Turn(9)).await.expect("write");

        match read_frame(&mut rx).await.expect("read") {
            Some(Frame::EndTurn(turn)) => assert_eq!(turn, Turn(9)),
            other => panic!("expected end-turn frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_tag_is_reported_not_fatal() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        tx.write_all(&[0x7f]).await.expect("write");

        match read_frame(&mut rx).await.expect("read") {
            Some(Frame::Unknown(tag)) => assert_eq!(tag, 0x7f),
            other => panic!("expected unknown frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn clean_eof_yields_none() {
        let (tx, mut rx) = tokio::io::duplex(64);
        drop(tx);
        assert!(read_frame(&mut rx).await.expect("read").is_none());
    }

    #[tokio::test]
    async fn torn_frame_is_a_truncation_error() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        // Tag plus half of the send-turn field, then the stream dies.
        tx.write_all(&[TAG_SEND_AGENT, 0, 0]).await.expect("write");
        drop(tx);

        assert!(matches!(
            read_frame(&mut rx).await,
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[tokio::test]
    async fn negative_data_size_is_rejected() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        let mut frame = vec![TAG_SEND_AGENT];
        frame.extend_from_slice(&1i32.to_be_bytes());
        frame.push(1);
        frame.extend_from_slice(&(-1i32).to_be_bytes());
        tx.write_all(&frame).await.expect("write");

        assert!(matches!(
            read_frame(&mut rx).await,
            Err(ProtocolError::OversizedPayload { size: -1, .. })
        ));
    }

    #[tokio::test]
    async fn offer_help_handshake_round_trips() {
        let (mut tx, mut rx) = tokio::io::duplex(256);
        write_offer_help_request(&mut tx).await.expect("request");
        read_offer_help_request(&mut rx).await.expect("read request");

        let offer = OfferHelp {
            offered: Partition::new(5, 0, 5, 10),
            dims: GridDims::new(10, 10),
            sender: Partition::new(0, 0, 5, 10),
        };
        write_offer_help_response(&mut tx, &offer)
            .await
            .expect("response");
        let decoded = read_offer_help_response(&mut rx)
            .await
            .expect("read response");
        assert_eq!(decoded, offer);
    }

    #[tokio::test]
    async fn wrong_tag_during_handshake_is_an_error() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        tx.write_all(&[TAG_END_TURN]).await.expect("write");

        assert!(matches!(
            read_offer_help_request(&mut rx).await,
            Err(ProtocolError::UnexpectedFrame {
                expected: TAG_OFFER_HELP,
                got: TAG_END_TURN,
            })
        ));
    }
}
