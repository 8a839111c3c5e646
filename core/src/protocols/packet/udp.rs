//! UDP datagram header.

use anyhow::{bail, Result};
use byteorder::{ByteOrder, NetworkEndian};

use crate::protocols::packet::Packet;

pub const UDP_HDR_LEN: usize = 8;

/// A UDP header.
#[derive(Debug, Clone, Copy)]
pub struct Udp<'a> {
    frame: &'a [u8],
    offset: usize,
}

impl<'a> Udp<'a> {
    /// Source port in host byte order.
    #[inline]
    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.frame[self.offset..])
    }

    /// Destination port in host byte order.
    #[inline]
    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.frame[self.offset + 2..])
    }

    /// Datagram length (header plus payload) in host byte order.
    #[inline]
    pub fn length(&self) -> u16 {
        NetworkEndian::read_u16(&self.frame[self.offset + 4..])
    }
}

impl<'a> Packet<'a> for Udp<'a> {
    #[inline]
    fn frame(&self) -> &'a [u8] {
        self.frame
    }

    #[inline]
    fn header_offset(&self) -> usize {
        self.offset
    }

    #[inline]
    fn header_len(&self) -> usize {
        UDP_HDR_LEN
    }

    fn parse_at(frame: &'a [u8], offset: usize) -> Result<Self> {
        if frame.len() < offset + UDP_HDR_LEN {
            bail!("truncated udp header");
        }
        Ok(Udp { frame, offset })
    }
}
