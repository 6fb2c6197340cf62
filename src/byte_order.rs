//! Helpers for explicit network byte-order conversions.
//!
//! Frame headers carry signed 32-bit sizes in big-endian order. These helpers
//! keep Clippy expectations scoped to the conversion points so the codec can
//! stay explicit about wire endianness without repeating lint annotations.

/// Serialise an `i32` in network byte order (big-endian).
///
/// # Examples
///
/// ```
/// use lrpc::byte_order::write_network_i32;
///
/// assert_eq!(write_network_i32(0x1234_5678), [0x12, 0x34, 0x56, 0x78]);
/// assert_eq!(write_network_i32(-1), [0xff, 0xff, 0xff, 0xff]);
/// ```
#[must_use]
pub fn write_network_i32(value: i32) -> [u8; 4] {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    value.to_be_bytes()
}

/// Parse a network-order `i32` from its on-wire representation.
///
/// # Examples
///
/// ```
/// use lrpc::byte_order::read_network_i32;
///
/// assert_eq!(read_network_i32([0x00, 0x00, 0x01, 0x00]), 256);
/// assert_eq!(read_network_i32([0x80, 0x00, 0x00, 0x00]), i32::MIN);
/// ```
#[must_use]
pub fn read_network_i32(bytes: [u8; 4]) -> i32 {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    i32::from_be_bytes(bytes)
}

/// Read a network-order `i32` at `offset`, or `None` when `src` is too short.
#[must_use]
pub fn peek_network_i32(src: &[u8], offset: usize) -> Option<i32> {
    let end = offset.checked_add(4)?;
    src.get(offset..end)
        .and_then(|slice| <[u8; 4]>::try_from(slice).ok())
        .map(read_network_i32)
}
