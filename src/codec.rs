//! Length-prefixed frame codec.
//!
//! Every frame starts with a fixed 12-byte header:
//!
//! ```text
//! offset 0   magic      4 bytes, ASCII "LRPC"
//! offset 4   body_size  i32 big-endian, = meta_size + body length
//! offset 8   meta_size  i32 big-endian
//! offset 12  meta       meta_size bytes, bincode-encoded `Meta`
//! ...        body       body_size - meta_size bytes, opaque
//! ```
//!
//! [`FrameDecoder`] is a streaming decoder over a growing buffer. It never
//! consumes bytes it cannot fully interpret, so it can be re-invoked as more
//! bytes arrive.
//!
//! # Overlong frames
//!
//! A frame whose `body_size` exceeds the configured maximum is skipped rather
//! than buffered. If the whole frame is already buffered it is dropped at once;
//! otherwise the decoder drops what it has and remembers how many bytes are
//! still owed. Those are consumed from later reads before parsing resumes at
//! the next frame boundary. The state lives in the decoder, so every
//! connection needs its own [`FrameDecoder`].
//!
//! # Magic mismatch
//!
//! The decoder does not resynchronise. If the buffer does not start with the
//! magic token it reports "incomplete" and leaves the buffer untouched, so a
//! corrupted stream stalls until the connection is closed. Connections using
//! this codec must only carry well-formed frames from trusted peers.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, warn};

use crate::{
    byte_order::{peek_network_i32, write_network_i32},
    message::Message,
    metrics::{self, Direction},
    packet::{Meta, Packet},
};

pub mod error;

pub use error::{CodecError, EofError, FramingError};

/// Magic token opening every frame.
pub const MAGIC: [u8; 4] = *b"LRPC";

/// Length of the fixed header: magic, `body_size` and `meta_size`.
pub const HEADER_LEN: usize = 12;

/// Maximum body size used when none is configured (10 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 10 * 1024 * 1024;

const BODY_SIZE_OFFSET: usize = 4;
const META_SIZE_OFFSET: usize = 8;

/// Resolve a configured maximum, treating zero as "use the default".
#[must_use]
pub fn resolve_max_frame_length(value: usize) -> usize {
    if value == 0 {
        DEFAULT_MAX_FRAME_LENGTH
    } else {
        value
    }
}

/// Factory for per-connection decoders and stateless encoders.
#[derive(Clone, Copy, Debug)]
pub struct FrameCodec {
    max_frame_length: usize,
}

impl FrameCodec {
    /// Construct a codec. A maximum of zero selects
    /// [`DEFAULT_MAX_FRAME_LENGTH`].
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: resolve_max_frame_length(max_frame_length),
        }
    }

    /// Largest `body_size` accepted by decoders from this codec.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }

    /// Create a decoder with fresh discard state for one connection.
    #[must_use]
    pub fn decoder(&self) -> FrameDecoder { FrameDecoder::new(self.max_frame_length) }

    /// Create an encoder.
    #[must_use]
    pub fn encoder(&self) -> FrameEncoder { FrameEncoder }
}

impl Default for FrameCodec {
    fn default() -> Self { Self::new(DEFAULT_MAX_FRAME_LENGTH) }
}

/// Overlong-frame state of a [`FrameDecoder`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DiscardState {
    /// Parsing frames normally.
    #[default]
    Idle,
    /// Dropping the remainder of an overlong frame.
    Discarding {
        /// Bytes still to drop before the next frame boundary.
        remaining: u64,
    },
}

enum Step {
    Frame(Packet),
    Incomplete,
    Skipped,
}

/// Streaming decoder for one connection.
#[derive(Debug)]
pub struct FrameDecoder {
    max_frame_length: usize,
    discard: DiscardState,
}

impl FrameDecoder {
    /// Create a decoder. A maximum of zero selects
    /// [`DEFAULT_MAX_FRAME_LENGTH`].
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: resolve_max_frame_length(max_frame_length),
            discard: DiscardState::Idle,
        }
    }

    /// Largest accepted `body_size`.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }

    /// Current overlong-frame state.
    #[must_use]
    pub fn discard_state(&self) -> DiscardState { self.discard }

    /// Returns true while the remainder of an overlong frame is being dropped.
    #[must_use]
    pub fn is_discarding(&self) -> bool { matches!(self.discard, DiscardState::Discarding { .. }) }

    /// Decode the next packet from `src`.
    ///
    /// Returns `Ok(None)` when more bytes are needed, when the buffer does not
    /// start with the magic token, or when an overlong frame has not yet been
    /// fully discarded.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the header sizes are inconsistent or the
    /// meta cannot be decoded. The buffer is left untouched; the connection
    /// should be closed.
    pub fn decode_packet(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, CodecError> {
        loop {
            if !self.drain_discard(src) {
                return Ok(None);
            }
            let step = self.decode_frame(src).inspect_err(|e| {
                metrics::inc_errors(e.error_type());
            })?;
            match step {
                Step::Frame(packet) => return Ok(Some(packet)),
                Step::Incomplete => return Ok(None),
                Step::Skipped => {}
            }
        }
    }

    /// Decode at end of stream.
    ///
    /// A stream that ends at a frame boundary, or while an overlong frame is
    /// being discarded, ends cleanly with `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`EofError`] for a truncated frame and
    /// [`FramingError::InvalidMagic`] if the stream stalled on bad magic.
    pub fn decode_packet_eof(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, CodecError> {
        match self.decode_packet(src)? {
            Some(packet) => Ok(Some(packet)),
            None if src.is_empty() || self.is_discarding() => Ok(None),
            None => Err(build_eof_error(src)),
        }
    }

    /// Consume owed bytes of an overlong frame. Returns false while more are
    /// still owed.
    fn drain_discard(&mut self, src: &mut BytesMut) -> bool {
        let DiscardState::Discarding { remaining } = self.discard else {
            return true;
        };
        let available = u64::try_from(src.len()).unwrap_or(u64::MAX);
        let take = remaining.min(available);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "take is bounded by the buffer length"
        )]
        src.advance(take as usize);
        let remaining = remaining - take;
        if remaining == 0 {
            info!("finished discarding overlong frame");
            self.discard = DiscardState::Idle;
            true
        } else {
            self.discard = DiscardState::Discarding { remaining };
            false
        }
    }

    fn decode_frame(&mut self, src: &mut BytesMut) -> Result<Step, CodecError> {
        if src.len() < HEADER_LEN {
            return Ok(Step::Incomplete);
        }

        if !has_magic(src) {
            warn!(
                magic = ?src.get(..MAGIC.len()),
                "frame magic mismatch; waiting for more data"
            );
            return Ok(Step::Incomplete);
        }

        let raw_body_size = peek_network_i32(src, BODY_SIZE_OFFSET).unwrap_or_default();
        let body_size = usize::try_from(raw_body_size).map_err(|_| {
            FramingError::InvalidBodySize {
                body_size: raw_body_size,
            }
        })?;

        if body_size > self.max_frame_length {
            return Ok(self.skip_overlong(src, body_size));
        }

        let raw_meta_size = peek_network_i32(src, META_SIZE_OFFSET).unwrap_or_default();
        let meta_size = usize::try_from(raw_meta_size)
            .ok()
            .filter(|size| *size <= body_size)
            .ok_or(FramingError::InvalidMetaSize {
                meta_size: raw_meta_size,
                body_size: raw_body_size,
            })?;

        let frame_len = HEADER_LEN + body_size;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(Step::Incomplete);
        }

        let meta_bytes = src.get(HEADER_LEN..HEADER_LEN + meta_size).unwrap_or_default();
        let meta = Meta::from_exact_bytes(meta_bytes).map_err(|e| {
            debug!(error = %e, meta_size, "failed to decode frame meta");
            CodecError::Meta(e)
        })?;

        let mut frame = src.split_to(frame_len);
        frame.advance(HEADER_LEN + meta_size);
        let body = (!frame.is_empty()).then(|| frame.freeze());
        metrics::inc_frames(Direction::Inbound);
        Ok(Step::Frame(Packet::new(meta, body)))
    }

    fn skip_overlong(&mut self, src: &mut BytesMut, body_size: usize) -> Step {
        info!(
            body_size,
            max_frame_length = self.max_frame_length,
            "frame exceeds max length; discarding"
        );
        metrics::inc_discarded_frames();
        let frame_len = HEADER_LEN + body_size;
        if src.len() >= frame_len {
            src.advance(frame_len);
        } else {
            let remaining = (frame_len - src.len()) as u64;
            src.clear();
            self.discard = DiscardState::Discarding { remaining };
        }
        Step::Skipped
    }
}

fn has_magic(src: &[u8]) -> bool { src.get(..MAGIC.len()) == Some(MAGIC.as_slice()) }

/// Build the error for a stream that ended with undecodable bytes buffered.
fn build_eof_error(src: &BytesMut) -> CodecError {
    let bytes_received = src.len();
    if let Some(found) = src
        .get(..MAGIC.len())
        .and_then(|slice| <[u8; 4]>::try_from(slice).ok())
        .filter(|found| *found != MAGIC)
    {
        return FramingError::InvalidMagic { found }.into();
    }

    match peek_network_i32(src, BODY_SIZE_OFFSET)
        .filter(|_| bytes_received >= HEADER_LEN)
        .and_then(|size| usize::try_from(size).ok())
    {
        Some(expected) => EofError::MidFrame {
            bytes_received: bytes_received - HEADER_LEN,
            expected,
        }
        .into(),
        None => EofError::MidHeader {
            bytes_received,
            header_size: HEADER_LEN,
        }
        .into(),
    }
}

impl Decoder for FrameDecoder {
    type Item = Packet;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_packet(src).map_err(Into::into)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_packet_eof(src).map_err(Into::into)
    }
}

/// Stateless frame encoder.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameEncoder;

impl FrameEncoder {
    /// Append the wire form of `packet` to `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MetaEncode`] if the meta cannot be serialized and
    /// [`FramingError::FrameTooLarge`] if the sizes overflow the header.
    pub fn encode_packet(&self, packet: &Packet, dst: &mut BytesMut) -> Result<(), CodecError> {
        let meta = packet.meta().to_bytes().map_err(CodecError::MetaEncode)?;
        let size = meta.len() + packet.body_len();
        let too_large = || FramingError::FrameTooLarge { size };
        let meta_size = i32::try_from(meta.len()).map_err(|_| too_large())?;
        let body_size = i32::try_from(size).map_err(|_| too_large())?;

        dst.reserve(HEADER_LEN + size);
        dst.put_slice(&MAGIC);
        dst.put_slice(&write_network_i32(body_size));
        dst.put_slice(&write_network_i32(meta_size));
        dst.put_slice(&meta);
        if let Some(body) = packet.body() {
            dst.put_slice(body);
        }
        metrics::inc_frames(Direction::Outbound);
        Ok(())
    }

    /// Encode `packet` into a standalone buffer.
    ///
    /// # Errors
    ///
    /// See [`FrameEncoder::encode_packet`].
    pub fn encode_to_bytes(&self, packet: &Packet) -> Result<Bytes, CodecError> {
        let mut dst = BytesMut::new();
        self.encode_packet(packet, &mut dst)?;
        Ok(dst.freeze())
    }
}

impl Encoder<Packet> for FrameEncoder {
    type Error = io::Error;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_packet(&item, dst).map_err(Into::into)
    }
}

impl Encoder<&Packet> for FrameEncoder {
    type Error = io::Error;

    fn encode(&mut self, item: &Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_packet(item, dst).map_err(Into::into)
    }
}
