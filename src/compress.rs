//! Body compression adapters.
//!
//! The compress type code travels in every frame's meta, so both peers must
//! agree on the mapping from code to algorithm. Codes are stable:
//!
//! | Code | Type | Algorithm |
//! |------|------|-----------|
//! | 0 | [`CompressType::None`] | pass-through |
//! | 1 | [`CompressType::Gzip`] | gzip via `flate2` |
//! | 2 | [`CompressType::Lz4`] | LZ4 block format with size prefix via `lz4_flex` |
//!
//! An unknown code means the peers were built with different protocol
//! tables. That is reported as [`CompressError::UnknownType`], which is a
//! configuration error rather than a per-call failure.
//!
//! Decompressed output is capped at [`MAX_MESSAGE_LEN`], so a small body
//! cannot expand past the size a decoded message may occupy.

use std::{
    fmt,
    io::{Read, Write},
    str::FromStr,
};

use bincode::error::{DecodeError, EncodeError};
use bytes::Bytes;
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use thiserror::Error;

use crate::message::{EncodeMessage, MAX_MESSAGE_LEN, Message};

/// Errors raised while compressing or decompressing a body.
#[derive(Debug, Error)]
pub enum CompressError {
    /// The compress type code is not known to this build.
    #[error("unknown compress type code: {0}")]
    UnknownType(i32),

    /// The structured message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[from] EncodeError),

    /// The decompressed bytes are not a valid message of the expected type.
    #[error("failed to decode message: {0}")]
    Decode(#[from] DecodeError),

    /// The body would decompress past the message size limit.
    #[error("{codec} body expands past {limit} bytes")]
    TooLarge {
        /// Name of the algorithm.
        codec: &'static str,
        /// Maximum decompressed size.
        limit: usize,
    },

    /// The compression algorithm rejected its input.
    #[error("{codec} failed: {message}")]
    Codec {
        /// Name of the algorithm that failed.
        codec: &'static str,
        /// Underlying failure description.
        message: String,
    },
}

impl CompressError {
    /// Returns true when the error indicates a client/server mismatch rather
    /// than a bad payload.
    #[must_use]
    pub fn is_fatal(&self) -> bool { matches!(self, Self::UnknownType(_)) }

    fn codec(codec: &'static str, err: impl fmt::Display) -> Self {
        Self::Codec {
            codec,
            message: err.to_string(),
        }
    }
}

/// Compression applied to a frame body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompressType {
    /// Body bytes are the encoded message.
    None,
    /// Lossless general-purpose compression.
    Gzip,
    /// Fast block compression.
    #[default]
    Lz4,
}

impl CompressType {
    /// Every supported compress type.
    pub const ALL: [CompressType; 3] = [Self::None, Self::Gzip, Self::Lz4];

    /// Wire code stored in the frame meta.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Gzip => 1,
            Self::Lz4 => 2,
        }
    }

    /// Resolve a wire code.
    ///
    /// # Errors
    ///
    /// Returns [`CompressError::UnknownType`] for codes outside the table.
    pub fn from_code(code: i32) -> Result<Self, CompressError> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::Gzip),
            2 => Ok(Self::Lz4),
            other => Err(CompressError::UnknownType(other)),
        }
    }

    /// Configuration name of this type.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Lz4 => "lz4",
        }
    }

    /// Encode `message` and compress the result.
    ///
    /// # Errors
    ///
    /// Returns [`CompressError`] if encoding or compression fails.
    pub fn compress<M>(self, message: &M) -> Result<Bytes, CompressError>
    where
        M: EncodeMessage + ?Sized,
    {
        let raw = message.encode_message()?;
        self.compress_bytes(&raw).map(Bytes::from)
    }

    /// Decompress `body` and decode it as `M`.
    ///
    /// # Errors
    ///
    /// Returns [`CompressError`] if decompression fails or the bytes do not
    /// hold exactly one `M`.
    pub fn decompress<M: Message>(self, body: &[u8]) -> Result<M, CompressError> {
        let raw = self.decompress_bytes(body)?;
        Ok(M::from_exact_bytes(&raw)?)
    }

    /// Compress raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CompressError::Codec`] if the algorithm fails.
    pub fn compress_bytes(self, raw: &[u8]) -> Result<Vec<u8>, CompressError> {
        match self {
            Self::None => Ok(raw.to_vec()),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder
                    .write_all(raw)
                    .map_err(|e| CompressError::codec("gzip", e))?;
                encoder.finish().map_err(|e| CompressError::codec("gzip", e))
            }
            Self::Lz4 => Ok(lz4_flex::block::compress_prepend_size(raw)),
        }
    }

    /// Reverse [`CompressType::compress_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`CompressError::Codec`] if `body` is not valid for the
    /// algorithm and [`CompressError::TooLarge`] if it would expand past
    /// [`MAX_MESSAGE_LEN`].
    pub fn decompress_bytes(self, body: &[u8]) -> Result<Vec<u8>, CompressError> {
        const LIMIT: usize = MAX_MESSAGE_LEN;
        match self {
            Self::None => Ok(body.to_vec()),
            Self::Gzip => {
                let mut out = Vec::new();
                GzDecoder::new(body)
                    .take(u64::try_from(LIMIT).unwrap_or(u64::MAX).saturating_add(1))
                    .read_to_end(&mut out)
                    .map_err(|e| CompressError::codec("gzip", e))?;
                if out.len() > LIMIT {
                    return Err(CompressError::TooLarge {
                        codec: "gzip",
                        limit: LIMIT,
                    });
                }
                Ok(out)
            }
            Self::Lz4 => {
                let (size, _) = lz4_flex::block::uncompressed_size(body)
                    .map_err(|e| CompressError::codec("lz4", e))?;
                if size > LIMIT {
                    return Err(CompressError::TooLarge {
                        codec: "lz4",
                        limit: LIMIT,
                    });
                }
                lz4_flex::block::decompress_size_prepended(body)
                    .map_err(|e| CompressError::codec("lz4", e))
            }
        }
    }
}

impl TryFrom<i32> for CompressType {
    type Error = CompressError;

    fn try_from(code: i32) -> Result<Self, Self::Error> { Self::from_code(code) }
}

impl From<CompressType> for i32 {
    fn from(value: CompressType) -> Self { value.code() }
}

impl fmt::Display for CompressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// Error returned when parsing an unknown compress type name.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unsupported compress type: {0}")]
pub struct UnknownCompressName(pub String);

impl FromStr for CompressType {
    type Err = UnknownCompressName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownCompressName(s.to_owned()))
    }
}
