//! Packet header types.
//!
//! Headers are lazy views over borrowed frame bytes: parsing validates bounds
//! and invariant fields, accessors read on demand. Nothing here allocates, so
//! the types are safe to use from the classifier hot path.

use anyhow::Result;

pub mod ethernet;
pub mod ipv4;
pub mod tcp;
pub mod udp;

/// A parsed protocol header borrowing the underlying frame.
pub trait Packet<'a>: Sized {
    /// The full frame this header was parsed from.
    fn frame(&self) -> &'a [u8];

    /// Byte offset of this header within the frame.
    fn header_offset(&self) -> usize;

    /// Length of this header in bytes.
    fn header_len(&self) -> usize;

    /// Bounds-checked parse at `offset` within `frame`.
    fn parse_at(frame: &'a [u8], offset: usize) -> Result<Self>;

    /// Parses the payload of this header as `T`.
    #[inline]
    fn parse_to<T: Packet<'a>>(&self) -> Result<T> {
        T::parse_at(self.frame(), self.payload_offset())
    }

    /// Offset of the first byte past this header.
    #[inline]
    fn payload_offset(&self) -> usize {
        self.header_offset() + self.header_len()
    }
}
