//! Drive a [`FrameDecoder`] with wire bytes delivered in pieces.
//!
//! Transports hand the decoder whatever arrived since the last read. These
//! helpers replay that: append one chunk, decode until the decoder reports
//! incomplete, repeat.

use bytes::BytesMut;
use lrpc::{
    codec::{CodecError, FrameDecoder, FrameEncoder},
    packet::Packet,
};

/// Encode `packets` back to back into one wire buffer.
///
/// # Panics
///
/// Panics if a packet cannot be encoded.
#[must_use]
pub fn encode_all(packets: &[Packet]) -> Vec<u8> {
    let mut wire = BytesMut::new();
    for packet in packets {
        FrameEncoder
            .encode_packet(packet, &mut wire)
            .expect("test packet should encode");
    }
    wire.to_vec()
}

/// Result of feeding one chunk.
#[derive(Debug)]
pub struct ChunkOutcome {
    /// Packets decoded after this chunk arrived.
    pub packets: Vec<Packet>,
    /// Bytes still buffered afterwards.
    pub buffered: usize,
}

/// Feed each chunk in turn, decoding after every append.
///
/// # Errors
///
/// Returns the first [`CodecError`] raised by the decoder.
pub fn feed_chunks<'a, I>(
    decoder: &mut FrameDecoder,
    chunks: I,
) -> Result<Vec<ChunkOutcome>, CodecError>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut buf = BytesMut::new();
    let mut outcomes = Vec::new();
    for chunk in chunks {
        buf.extend_from_slice(chunk);
        let mut packets = Vec::new();
        while let Some(packet) = decoder.decode_packet(&mut buf)? {
            packets.push(packet);
        }
        outcomes.push(ChunkOutcome {
            packets,
            buffered: buf.len(),
        });
    }
    Ok(outcomes)
}

/// Split `wire` at the given ascending offsets.
///
/// # Panics
///
/// Panics if an offset is out of range or the offsets are not ascending.
#[must_use]
pub fn split_at_offsets<'a>(wire: &'a [u8], offsets: &[usize]) -> Vec<&'a [u8]> {
    let mut chunks = Vec::with_capacity(offsets.len() + 1);
    let mut start = 0;
    for &offset in offsets {
        chunks.push(&wire[start..offset]);
        start = offset;
    }
    chunks.push(&wire[start..]);
    chunks
}

/// Decode `wire` delivered in chunks of at most `chunk_size` bytes and return
/// every packet produced.
///
/// # Errors
///
/// Returns the first [`CodecError`] raised by the decoder.
///
/// # Panics
///
/// Panics if `chunk_size` is zero.
pub fn decode_in_chunks(
    decoder: &mut FrameDecoder,
    wire: &[u8],
    chunk_size: usize,
) -> Result<Vec<Packet>, CodecError> {
    let outcomes = feed_chunks(decoder, wire.chunks(chunk_size))?;
    Ok(outcomes
        .into_iter()
        .flat_map(|outcome| outcome.packets)
        .collect())
}
