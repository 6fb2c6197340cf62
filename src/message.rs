//! Structured message encoding.
//!
//! Arguments and results travelling in a frame body are structured messages.
//! Framing only cares about their encoded bytes, so the encoding is kept
//! behind [`Message`]; the default is bincode's standard configuration.
//!
//! Decoding is bounded by [`MAX_MESSAGE_LEN`]: length prefixes read from
//! the wire are checked against it before anything is allocated.

use bincode::{
    BorrowDecode,
    Encode,
    borrow_decode_from_slice,
    config,
    encode_to_vec,
    error::{DecodeError, EncodeError},
};

/// Upper bound on the bytes a single decoded message may claim.
pub const MAX_MESSAGE_LEN: usize = 10 * 1024 * 1024;

/// Wrapper trait for argument and result types.
///
/// Any type deriving [`Encode`] and [`BorrowDecode`] implements this trait via
/// a blanket implementation.
pub trait Message: Encode + for<'de> BorrowDecode<'de, ()> {
    /// Serialize the message into a byte vector.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if serialization fails.
    fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> { encode_to_vec(self, config::standard()) }

    /// Deserialize a message that must occupy the whole of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if deserialization fails or bytes remain
    /// after the message.
    fn from_exact_bytes(bytes: &[u8]) -> Result<Self, DecodeError>
    where
        Self: Sized,
    {
        let (message, consumed) = borrow_decode_from_slice(
            bytes,
            config::standard().with_limit::<MAX_MESSAGE_LEN>(),
        )?;
        if consumed != bytes.len() {
            return Err(DecodeError::OtherString(format!(
                "{} trailing bytes after message",
                bytes.len() - consumed
            )));
        }
        Ok(message)
    }
}

impl<T> Message for T where for<'de> T: Encode + BorrowDecode<'de, ()> {}

/// Object-safe view of a message that can be encoded.
///
/// Server handlers return results of different concrete types; the response
/// path only needs their bytes, so results are carried as
/// `Box<dyn EncodeMessage>`.
pub trait EncodeMessage: Send + Sync {
    /// Encode the message into bytes.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if serialization fails.
    fn encode_message(&self) -> Result<Vec<u8>, EncodeError>;
}

impl<T> EncodeMessage for T
where
    T: Message + Send + Sync,
{
    fn encode_message(&self) -> Result<Vec<u8>, EncodeError> { self.to_bytes() }
}

impl std::fmt::Debug for dyn EncodeMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncodeMessage")
    }
}
