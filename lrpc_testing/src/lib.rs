//! Test helpers for `lrpc`.
//!
//! Drivers that replay wire bytes into a decoder in arbitrary chunks, plus a
//! fixture for asserting on captured log records.
//!
//! ```rust
//! use lrpc::{
//!     codec::FrameDecoder,
//!     compress::CompressType,
//!     packet::{Meta, Packet, ResponseMeta},
//! };
//! use lrpc_testing::{decode_in_chunks, encode_all};
//!
//! let packet = Packet::meta_only(Meta::response(1, CompressType::None, ResponseMeta::ok()));
//! let wire = encode_all(&[packet.clone()]);
//! let decoded = decode_in_chunks(&mut FrameDecoder::new(0), &wire, 3).unwrap();
//! assert_eq!(decoded, vec![packet]);
//! ```

pub mod chunks;
pub mod logging;

pub use chunks::{ChunkOutcome, decode_in_chunks, encode_all, feed_chunks, split_at_offsets};
pub use logging::{LoggerHandle, logger};
