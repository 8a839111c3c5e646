//! Ethernet frame header.

use anyhow::{bail, Result};
use byteorder::{ByteOrder, NetworkEndian};

use crate::protocols::packet::Packet;

pub const ETHERNET_HDR_LEN: usize = 14;
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// An Ethernet II header.
#[derive(Debug, Clone, Copy)]
pub struct Ethernet<'a> {
    frame: &'a [u8],
    offset: usize,
}

impl<'a> Ethernet<'a> {
    /// Parses the Ethernet header at the start of `frame`.
    #[inline]
    pub fn parse(frame: &'a [u8]) -> Result<Self> {
        Self::parse_at(frame, 0)
    }

    #[inline]
    pub fn dst(&self) -> [u8; 6] {
        self.frame[self.offset..self.offset + 6].try_into().unwrap()
    }

    #[inline]
    pub fn src(&self) -> [u8; 6] {
        self.frame[self.offset + 6..self.offset + 12]
            .try_into()
            .unwrap()
    }

    /// EtherType in host byte order.
    #[inline]
    pub fn ethertype(&self) -> u16 {
        NetworkEndian::read_u16(&self.frame[self.offset + 12..])
    }
}

impl<'a> Packet<'a> for Ethernet<'a> {
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
        ETHERNET_HDR_LEN
    }

    fn parse_at(frame: &'a [u8], offset: usize) -> Result<Self> {
        if frame.len() < offset + ETHERNET_HDR_LEN {
            bail!("truncated ethernet header");
        }
        Ok(Ethernet { frame, offset })
    }
}
