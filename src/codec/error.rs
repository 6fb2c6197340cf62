//! Error types for the frame codec.
//!
//! Errors fall into the following categories:
//!
//! - [`FramingError`]: header fields that cannot describe a valid frame, or an
//!   outbound frame whose sizes do not fit the header.
//! - [`EofError`]: the stream ended part way through a frame.
//! - [`CodecError::Meta`]: the header was consistent but the meta bytes did not
//!   decode. This points at version skew or corruption.
//!
//! A decode-side error leaves the stream at an unknown position, so the
//! connection must be dropped. Encode-side errors only affect the call that
//! produced them. [`CodecError::should_disconnect`] encodes that split.
//!
//! Oversized inbound frames and bad magic are not errors: the decoder discards
//! the former and stalls on the latter.

use std::io;

use bincode::error::{DecodeError, EncodeError};
use thiserror::Error;

/// Framing-level errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The stream ended on bytes that do not start with the magic token.
    #[error("invalid frame magic: {found:02x?}")]
    InvalidMagic {
        /// Bytes found where the magic token was expected.
        found: [u8; 4],
    },

    /// The declared body size is negative.
    #[error("invalid body size: {body_size}")]
    InvalidBodySize {
        /// Declared body size.
        body_size: i32,
    },

    /// The declared meta size is negative or larger than the body size.
    #[error("invalid meta size {meta_size} for body size {body_size}")]
    InvalidMetaSize {
        /// Declared meta size.
        meta_size: i32,
        /// Declared body size.
        body_size: i32,
    },

    /// An outbound frame does not fit the signed 32-bit size fields.
    #[error("frame too large to encode: {size} bytes")]
    FrameTooLarge {
        /// Meta plus body size in bytes.
        size: usize,
    },
}

/// The stream ended before a frame was complete.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// EOF while the 12-byte header was incomplete.
    #[error("premature EOF during header: {bytes_received} of {header_size} header bytes")]
    MidHeader {
        /// Header bytes received before EOF.
        bytes_received: usize,
        /// Expected header size.
        header_size: usize,
    },

    /// EOF after the header but before the declared body was complete.
    #[error("premature EOF: {bytes_received} bytes of {expected} byte body received")]
    MidFrame {
        /// Body bytes received before EOF.
        bytes_received: usize,
        /// Declared body size.
        expected: usize,
    },
}

/// Top-level codec error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Header fields are inconsistent.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Meta bytes could not be decoded.
    #[error("meta decode error: {0}")]
    Meta(#[source] DecodeError),

    /// Meta could not be encoded.
    #[error("meta encode error: {0}")]
    MetaEncode(#[source] EncodeError),

    /// Transport layer I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stream ended mid-frame.
    #[error("EOF: {0}")]
    Eof(#[from] EofError),
}

impl CodecError {
    /// Returns true if the connection can no longer be trusted.
    ///
    /// # Examples
    ///
    /// ```
    /// use lrpc::codec::{CodecError, FramingError};
    ///
    /// let err = CodecError::Framing(FramingError::InvalidBodySize { body_size: -1 });
    /// assert!(err.should_disconnect());
    ///
    /// let err = CodecError::Framing(FramingError::FrameTooLarge { size: usize::MAX });
    /// assert!(!err.should_disconnect());
    /// ```
    #[must_use]
    pub fn should_disconnect(&self) -> bool {
        !matches!(
            self,
            Self::Framing(FramingError::FrameTooLarge { .. }) | Self::MetaEncode(_)
        )
    }

    /// Returns the error category as a string for logging and metrics.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Framing(_) => "framing",
            Self::Meta(_) | Self::MetaEncode(_) => "meta",
            Self::Io(_) => "io",
            Self::Eof(_) => "eof",
        }
    }
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => e,
            CodecError::Framing(FramingError::FrameTooLarge { .. }) | CodecError::MetaEncode(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            CodecError::Framing(_) | CodecError::Meta(_) => {
                io::Error::new(io::ErrorKind::InvalidData, err)
            }
            CodecError::Eof(e) => io::Error::new(io::ErrorKind::UnexpectedEof, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::bad_magic(
        CodecError::Framing(FramingError::InvalidMagic { found: *b"HTTP" }),
        io::ErrorKind::InvalidData
    )]
    #[case::negative_body(
        CodecError::Framing(FramingError::InvalidBodySize { body_size: -4 }),
        io::ErrorKind::InvalidData
    )]
    #[case::meta_past_body(
        CodecError::Framing(FramingError::InvalidMetaSize { meta_size: 9, body_size: 4 }),
        io::ErrorKind::InvalidData
    )]
    #[case::too_large(
        CodecError::Framing(FramingError::FrameTooLarge { size: 1 << 31 }),
        io::ErrorKind::InvalidInput
    )]
    #[case::eof(
        CodecError::Eof(EofError::MidHeader { bytes_received: 3, header_size: 12 }),
        io::ErrorKind::UnexpectedEof
    )]
    fn codec_errors_map_to_io_kinds(#[case] err: CodecError, #[case] kind: io::ErrorKind) {
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), kind);
    }

    #[test]
    fn io_errors_pass_through() {
        let err = CodecError::Io(io::Error::other("reset"));
        assert_eq!(err.error_type(), "io");
        let io_err: io::Error = err.into();
        assert_eq!(io_err.to_string(), "reset");
    }

    #[test]
    fn decode_side_errors_disconnect() {
        let err = CodecError::Meta(bincode::error::DecodeError::LimitExceeded);
        assert!(err.should_disconnect());
        assert_eq!(err.error_type(), "meta");

        let err = CodecError::Eof(EofError::MidFrame {
            bytes_received: 1,
            expected: 8,
        });
        assert!(err.should_disconnect());
        assert!(err.to_string().contains("1 bytes of 8"));
    }

    #[test]
    fn invalid_magic_renders_found_bytes() {
        let err = FramingError::InvalidMagic { found: *b"GET " };
        assert!(err.to_string().contains("47"), "got {err}");
    }
}
