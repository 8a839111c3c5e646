//! TCP segment header.

use anyhow::{bail, Result};
use byteorder::{ByteOrder, NetworkEndian};

use crate::protocols::packet::Packet;

pub const TCP_MIN_HDR_LEN: usize = 20;

pub const FIN: u8 = 0b0000_0001;
pub const SYN: u8 = 0b0000_0010;
pub const RST: u8 = 0b0000_0100;
pub const PSH: u8 = 0b0000_1000;
pub const ACK: u8 = 0b0001_0000;
pub const URG: u8 = 0b0010_0000;

/// A TCP header. Parsing enforces `data offset >= 5` and that the full header
/// (including options) lies within the frame.
#[derive(Debug, Clone, Copy)]
pub struct Tcp<'a> {
    frame: &'a [u8],
    offset: usize,
    header_len: usize,
}

impl<'a> Tcp<'a> {
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

    #[inline]
    pub fn seq_no(&self) -> u32 {
        NetworkEndian::read_u32(&self.frame[self.offset + 4..])
    }

    #[inline]
    pub fn ack_no(&self) -> u32 {
        NetworkEndian::read_u32(&self.frame[self.offset + 8..])
    }

    /// The flag byte.
    #[inline]
    pub fn flags(&self) -> u8 {
        self.frame[self.offset + 13]
    }

    #[inline]
    pub fn window(&self) -> u16 {
        NetworkEndian::read_u16(&self.frame[self.offset + 14..])
    }

    #[inline]
    pub fn syn(&self) -> bool {
        self.flags() & SYN != 0
    }

    #[inline]
    pub fn ack(&self) -> bool {
        self.flags() & ACK != 0
    }

    /// Pure SYNACK: only the SYN and ACK bits set.
    #[inline]
    pub fn synack(&self) -> bool {
        self.flags() == (SYN | ACK)
    }
}

impl<'a> Packet<'a> for Tcp<'a> {
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
        if frame.len() < offset + TCP_MIN_HDR_LEN {
            bail!("truncated tcp header");
        }
        let data_offset = frame[offset + 12] >> 4;
        if data_offset < 5 {
            bail!("tcp data offset {}", data_offset);
        }
        let header_len = data_offset as usize * 4;
        if frame.len() < offset + header_len {
            bail!("tcp options exceed frame");
        }
        Ok(Tcp {
            frame,
            offset,
            header_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::packet::ethernet::Ethernet;
    use crate::protocols::packet::ipv4::Ipv4;
    use crate::testutil;
    use std::net::Ipv4Addr;

    #[test]
    fn core_tcp_parse_fields() {
        let frame = testutil::tcp_frame(
            Ipv4Addr::new(192, 168, 1, 5),
            55123,
            Ipv4Addr::new(192, 168, 1, 9),
            443,
            SYN | ACK,
            29200,
            &[],
        );
        let eth = Ethernet::parse(&frame).unwrap();
        let ipv4 = eth.parse_to::<Ipv4>().unwrap();
        let tcp = ipv4.parse_to::<Tcp>().unwrap();
        assert_eq!(tcp.src_port(), 55123);
        assert_eq!(tcp.dst_port(), 443);
        assert_eq!(tcp.flags(), SYN | ACK);
        assert!(tcp.synack());
        assert!(tcp.syn() && tcp.ack());
        assert_eq!(tcp.window(), 29200);
        assert_eq!(tcp.header_len(), 20);
    }

    #[test]
    fn core_tcp_rejects_truncated() {
        let frame = testutil::tcp_frame(
            Ipv4Addr::new(1, 1, 1, 1),
            1,
            Ipv4Addr::new(2, 2, 2, 2),
            2,
            SYN,
            0,
            &[],
        );
        // Cut into the middle of the TCP header.
        assert!(Tcp::parse_at(&frame[..44], 34).is_err());
    }

    #[test]
    fn core_tcp_rejects_bad_data_offset() {
        let mut frame = testutil::tcp_frame(
            Ipv4Addr::new(1, 1, 1, 1),
            1,
            Ipv4Addr::new(2, 2, 2, 2),
            2,
            SYN,
            0,
            &[],
        );
        frame[34 + 12] = 0x40; // data offset 4
        assert!(Tcp::parse_at(&frame, 34).is_err());
    }
}
