//! IPv4 header.

use std::net::Ipv4Addr;

use anyhow::{bail, Result};
use byteorder::{ByteOrder, NetworkEndian};

use crate::protocols::packet::Packet;

pub const IPV4_MIN_HDR_LEN: usize = 20;

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

/// An IPv4 header. Parsing enforces version 4, `ihl >= 5`, and that the full
/// header (including options) lies within the frame.
#[derive(Debug, Clone, Copy)]
pub struct Ipv4<'a> {
    frame: &'a [u8],
    offset: usize,
    header_len: usize,
}

impl<'a> Ipv4<'a> {
    #[inline]
    pub fn version(&self) -> u8 {
        self.frame[self.offset] >> 4
    }

    /// Header length in 32-bit words.
    #[inline]
    pub fn ihl(&self) -> u8 {
        self.frame[self.offset] & 0x0f
    }

    /// Total L3 length in host byte order.
    #[inline]
    pub fn total_length(&self) -> u16 {
        NetworkEndian::read_u16(&self.frame[self.offset + 2..])
    }

    #[inline]
    pub fn time_to_live(&self) -> u8 {
        self.frame[self.offset + 8]
    }

    /// IANA protocol number of the payload.
    #[inline]
    pub fn protocol(&self) -> u8 {
        self.frame[self.offset + 9]
    }

    #[inline]
    pub fn src(&self) -> Ipv4Addr {
        Ipv4Addr::from(NetworkEndian::read_u32(&self.frame[self.offset + 12..]))
    }

    #[inline]
    pub fn dst(&self) -> Ipv4Addr {
        Ipv4Addr::from(NetworkEndian::read_u32(&self.frame[self.offset + 16..]))
    }
}

impl<'a> Packet<'a> for Ipv4<'a> {
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
        self.header_len
    }

    fn parse_at(frame: &'a [u8], offset: usize) -> Result<Self> {
        if frame.len() < offset + IPV4_MIN_HDR_LEN {
            bail!("truncated ipv4 header");
        }
        let version = frame[offset] >> 4;
        if version != 4 {
            bail!("ipv4 version {}", version);
        }
        let ihl = frame[offset] & 0x0f;
        if ihl < 5 {
            bail!("ipv4 ihl {}", ihl);
        }
        let header_len = ihl as usize * 4;
        if frame.len() < offset + header_len {
            bail!("ipv4 options exceed frame");
        }
        let total_length = NetworkEndian::read_u16(&frame[offset + 2..]) as usize;
        if total_length < header_len {
            bail!("ipv4 total length {} below header", total_length);
        }
        Ok(Ipv4 {
            frame,
            offset,
            header_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn core_ipv4_parse_fields() {
        let frame = testutil::udp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            40000,
            Ipv4Addr::new(10, 0, 0, 2),
            53,
            &[0x41; 100],
        );
        let eth = crate::protocols::packet::ethernet::Ethernet::parse(&frame).unwrap();
        let ipv4 = eth.parse_to::<Ipv4>().unwrap();
        assert_eq!(ipv4.version(), 4);
        assert_eq!(ipv4.ihl(), 5);
        assert_eq!(ipv4.header_len(), 20);
        assert_eq!(ipv4.total_length(), 128);
        assert_eq!(ipv4.time_to_live(), 64);
        assert_eq!(ipv4.protocol(), IPPROTO_UDP);
        assert_eq!(ipv4.src(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(ipv4.dst(), Ipv4Addr::new(10, 0, 0, 2));
    }

    #[test]
    fn core_ipv4_rejects_bad_version() {
        let mut frame = testutil::udp_frame(
            Ipv4Addr::new(1, 1, 1, 1),
            1,
            Ipv4Addr::new(2, 2, 2, 2),
            2,
            &[],
        );
        frame[14] = 0x65; // version 6
        assert!(Ipv4::parse_at(&frame, 14).is_err());
    }

    #[test]
    fn core_ipv4_rejects_bad_ihl() {
        let mut frame = testutil::udp_frame(
            Ipv4Addr::new(1, 1, 1, 1),
            1,
            Ipv4Addr::new(2, 2, 2, 2),
            2,
            &[],
        );
        frame[14] = 0x43; // ihl 3
        assert!(Ipv4::parse_at(&frame, 14).is_err());
    }

    #[test]
    fn core_ipv4_rejects_truncated() {
        let frame = testutil::udp_frame(
            Ipv4Addr::new(1, 1, 1, 1),
            1,
            Ipv4Addr::new(2, 2, 2, 2),
            2,
            &[],
        );
        assert!(Ipv4::parse_at(&frame[..20], 14).is_err());
    }

    #[test]
    fn core_ipv4_rejects_options_past_end() {
        let mut frame = testutil::udp_frame(
            Ipv4Addr::new(1, 1, 1, 1),
            1,
            Ipv4Addr::new(2, 2, 2, 2),
            2,
            &[],
        );
        frame[14] = 0x4f; // ihl 15, 60-byte header on a 28-byte datagram
        assert!(Ipv4::parse_at(&frame, 14).is_err());
    }
}
