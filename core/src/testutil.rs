//! Synthetic frame builders shared by unit tests.

use std::net::Ipv4Addr;

use byteorder::{ByteOrder, NetworkEndian};

use crate::protocols::packet::ethernet::{ETHERNET_HDR_LEN, ETHERTYPE_IPV4};
use crate::protocols::packet::ipv4::{IPPROTO_ICMP, IPPROTO_TCP, IPPROTO_UDP};

/// An Ethernet II header with the given ethertype.
pub(crate) fn eth_hdr(ethertype: u16) -> Vec<u8> {
    let mut hdr = vec![0u8; ETHERNET_HDR_LEN];
    hdr[0..6].copy_from_slice(&[0x02, 0, 0, 0, 0, 2]);
    hdr[6..12].copy_from_slice(&[0x02, 0, 0, 0, 0, 1]);
    NetworkEndian::write_u16(&mut hdr[12..14], ethertype);
    hdr
}

/// An Ethernet + IPv4 frame carrying `l4` as the IP payload. Checksums are
/// left zero; nothing under test verifies them.
pub(crate) fn ipv4_frame(protocol: u8, src: Ipv4Addr, dst: Ipv4Addr, l4: &[u8]) -> Vec<u8> {
    let mut frame = eth_hdr(ETHERTYPE_IPV4);
    let total_length = 20 + l4.len();
    let mut ip = vec![0u8; 20];
    ip[0] = 0x45;
    NetworkEndian::write_u16(&mut ip[2..4], total_length as u16);
    ip[8] = 64; // ttl
    ip[9] = protocol;
    ip[12..16].copy_from_slice(&src.octets());
    ip[16..20].copy_from_slice(&dst.octets());
    frame.extend_from_slice(&ip);
    frame.extend_from_slice(l4);
    frame
}

/// A UDP/IPv4 frame.
pub(crate) fn udp_frame(
    src: Ipv4Addr,
    src_port: u16,
    dst: Ipv4Addr,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut l4 = vec![0u8; 8];
    NetworkEndian::write_u16(&mut l4[0..2], src_port);
    NetworkEndian::write_u16(&mut l4[2..4], dst_port);
    NetworkEndian::write_u16(&mut l4[4..6], (8 + payload.len()) as u16);
    l4.extend_from_slice(payload);
    ipv4_frame(IPPROTO_UDP, src, dst, &l4)
}

/// A TCP/IPv4 frame with a plain 20-byte TCP header.
pub(crate) fn tcp_frame(
    src: Ipv4Addr,
    src_port: u16,
    dst: Ipv4Addr,
    dst_port: u16,
    flags: u8,
    window: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut l4 = vec![0u8; 20];
    NetworkEndian::write_u16(&mut l4[0..2], src_port);
    NetworkEndian::write_u16(&mut l4[2..4], dst_port);
    l4[12] = 0x50; // data offset 5
    l4[13] = flags;
    NetworkEndian::write_u16(&mut l4[14..16], window);
    l4.extend_from_slice(payload);
    ipv4_frame(IPPROTO_TCP, src, dst, &l4)
}

/// An ICMP echo-request frame.
pub(crate) fn icmp_frame(src: Ipv4Addr, dst: Ipv4Addr, payload: &[u8]) -> Vec<u8> {
    let mut l4 = vec![8, 0, 0, 0, 0, 0, 0, 0]; // echo request
    l4.extend_from_slice(payload);
    ipv4_frame(IPPROTO_ICMP, src, dst, &l4)
}
