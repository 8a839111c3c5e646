//! Feature records.
//!
//! The fixed-shape artifact delivered to the analysis callback. The drainer
//! re-parses the steered frame to fill the record: the classifier's parse is
//! not retained, and its per-packet state is volatile by the time the frame
//! reaches user space.

use std::fmt;
use std::net::Ipv4Addr;

use anyhow::{bail, Result};
use serde::Serialize;

use crate::policy::{Direction, FlowKey, TrafficClass};
use crate::protocols::packet::ethernet::{Ethernet, ETHERTYPE_IPV4};
use crate::protocols::packet::ipv4::{Ipv4, IPPROTO_TCP, IPPROTO_UDP};
use crate::protocols::packet::tcp::Tcp;
use crate::protocols::packet::udp::Udp;
use crate::protocols::packet::Packet;
use crate::timing;

/// A per-packet feature record.
///
/// Addresses and ports are host byte order; canonicalization from network
/// order happens in the parsers. Port, flag, and window fields are 0 where
/// the protocol has no such concept.
#[derive(Debug, Clone, Copy, Serialize)]
#[repr(C)]
pub struct FeatureRecord {
    pub src_ip: u32,
    pub dst_ip: u32,
    pub src_port: u16,
    pub dst_port: u16,
    /// IANA protocol number.
    pub protocol: u8,
    /// Total L3 length from the IPv4 header.
    pub pkt_len: u16,
    /// `pkt_len` minus IPv4 and L4 header bytes, clamped at 0.
    pub payload_len: u16,
    pub tcp_flags: u8,
    pub window_size: u16,
    pub ttl: u8,
    /// Stable hash of the 5-tuple, symmetric under direction reversal: the
    /// two (ip, port) endpoints are ordered numerically before hashing, so
    /// both directions of a flow share one hash.
    pub flow_hash: u64,
    /// Monotonic nanoseconds at extraction. Totally ordered within one
    /// drainer; records from distinct drainers may interleave.
    pub timestamp: u64,
    /// Shannon entropy of the payload, scaled to [0, 255]. 0 for an empty
    /// payload.
    pub packet_entropy: u8,
    /// Microseconds since the previous packet of the same flow, clamped to
    /// u32; 0 when unknown or flow tracking is disabled.
    pub inter_arrival_time: u32,
    pub traffic_class: TrafficClass,
    pub direction: Direction,
}

impl FeatureRecord {
    /// Extracts the wire-derived fields of a record from raw frame bytes.
    ///
    /// `traffic_class`, `direction`, and `inter_arrival_time` are left at
    /// their defaults (Normal, Inbound, 0); the drainer fills them from its
    /// policies and flow table.
    pub fn extract(frame: &[u8]) -> Result<FeatureRecord> {
        let eth = Ethernet::parse(frame)?;
        if eth.ethertype() != ETHERTYPE_IPV4 {
            bail!("ethertype {:#06x} is not ipv4", eth.ethertype());
        }
        let ipv4 = eth.parse_to::<Ipv4>()?;

        let protocol = ipv4.protocol();
        let mut src_port = 0;
        let mut dst_port = 0;
        let mut tcp_flags = 0;
        let mut window_size = 0;
        let l4_header_len = match protocol {
            IPPROTO_TCP => {
                let tcp = ipv4.parse_to::<Tcp>()?;
                src_port = tcp.src_port();
                dst_port = tcp.dst_port();
                tcp_flags = tcp.flags();
                window_size = tcp.window();
                tcp.header_len()
            }
            IPPROTO_UDP => {
                let udp = ipv4.parse_to::<Udp>()?;
                src_port = udp.src_port();
                dst_port = udp.dst_port();
                udp.header_len()
            }
            _ => 0,
        };

        let pkt_len = ipv4.total_length();
        let header_len = ipv4.header_len() + l4_header_len;
        let payload_len = (pkt_len as usize).saturating_sub(header_len) as u16;
        let payload_start = ipv4.header_offset() + header_len;
        let payload_end = (ipv4.header_offset() + pkt_len as usize).min(frame.len());
        let payload = if payload_start < payload_end {
            &frame[payload_start..payload_end]
        } else {
            &[][..]
        };

        let src_ip = u32::from(ipv4.src());
        let dst_ip = u32::from(ipv4.dst());

        Ok(FeatureRecord {
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            protocol,
            pkt_len,
            payload_len,
            tcp_flags,
            window_size,
            ttl: ipv4.time_to_live(),
            flow_hash: flow_hash(protocol, src_ip, src_port, dst_ip, dst_port),
            timestamp: timing::mono_ns(),
            packet_entropy: scaled_entropy(payload),
            inter_arrival_time: 0,
            traffic_class: TrafficClass::Normal,
            direction: Direction::Inbound,
        })
    }

    /// The 5-tuple view handed to policies.
    #[inline]
    pub fn flow_key(&self) -> FlowKey {
        FlowKey {
            src_ip: Ipv4Addr::from(self.src_ip),
            dst_ip: Ipv4Addr::from(self.dst_ip),
            src_port: self.src_port,
            dst_port: self.dst_port,
            protocol: self.protocol,
        }
    }
}

impl fmt::Display for FeatureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "proto {} {}:{} > {}:{} len {} payload {} class {:?} {:?} entropy {} iat {}us",
            self.protocol,
            Ipv4Addr::from(self.src_ip),
            self.src_port,
            Ipv4Addr::from(self.dst_ip),
            self.dst_port,
            self.pkt_len,
            self.payload_len,
            self.traffic_class,
            self.direction,
            self.packet_entropy,
            self.inter_arrival_time,
        )
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over the canonically ordered 5-tuple.
pub fn flow_hash(protocol: u8, src_ip: u32, src_port: u16, dst_ip: u32, dst_port: u16) -> u64 {
    let src = ((src_ip as u64) << 16) | src_port as u64;
    let dst = ((dst_ip as u64) << 16) | dst_port as u64;
    let (lo, hi) = if src <= dst { (src, dst) } else { (dst, src) };

    let mut hash = FNV_OFFSET;
    for byte in std::iter::once(protocol)
        .chain(lo.to_be_bytes())
        .chain(hi.to_be_bytes())
    {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Shannon entropy of `data` scaled to [0, 255].
fn scaled_entropy(data: &[u8]) -> u8 {
    if data.is_empty() {
        return 0;
    }
    let mut counts = [0u32; 256];
    for &byte in data {
        counts[byte as usize] += 1;
    }
    let len = data.len() as f64;
    let mut entropy = 0.0;
    for &count in counts.iter() {
        if count == 0 {
            continue;
        }
        let p = count as f64 / len;
        entropy -= p * p.log2();
    }
    // 8 bits of entropy per byte maps to the full scale.
    ((entropy / 8.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::packet::tcp::{ACK, SYN};
    use crate::testutil;

    #[test]
    fn core_features_udp_reference_extraction() {
        // One UDP packet: 10.0.0.1:40000 -> 10.0.0.2:53, 100 bytes of 0x41.
        let frame = testutil::udp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            40000,
            Ipv4Addr::new(10, 0, 0, 2),
            53,
            &[0x41; 100],
        );
        let record = FeatureRecord::extract(&frame).unwrap();
        assert_eq!(Ipv4Addr::from(record.src_ip), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(Ipv4Addr::from(record.dst_ip), Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(record.src_port, 40000);
        assert_eq!(record.dst_port, 53);
        assert_eq!(record.protocol, 17);
        assert_eq!(record.pkt_len, 128);
        assert_eq!(record.payload_len, 100);
        assert_eq!(record.tcp_flags, 0);
        assert_eq!(record.window_size, 0);
        assert_eq!(record.ttl, 64);
        // Uniform payload has zero entropy.
        assert_eq!(record.packet_entropy, 0);
        assert_eq!(record.inter_arrival_time, 0);
    }

    #[test]
    fn core_features_tcp_fields() {
        let frame = testutil::tcp_frame(
            Ipv4Addr::new(192, 168, 0, 1),
            55000,
            Ipv4Addr::new(192, 168, 0, 2),
            8080,
            SYN | ACK,
            14600,
            b"abc",
        );
        let record = FeatureRecord::extract(&frame).unwrap();
        assert_eq!(record.protocol, 6);
        assert_eq!(record.tcp_flags, SYN | ACK);
        assert_eq!(record.window_size, 14600);
        assert_eq!(record.pkt_len, 43);
        assert_eq!(record.payload_len, 3);
    }

    #[test]
    fn core_features_icmp_has_zero_ports() {
        let frame = testutil::icmp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            &[0u8; 32],
        );
        let record = FeatureRecord::extract(&frame).unwrap();
        assert_eq!(record.protocol, 1);
        assert_eq!(record.src_port, 0);
        assert_eq!(record.dst_port, 0);
        assert_eq!(record.tcp_flags, 0);
        assert_eq!(record.window_size, 0);
        // ICMP payload length counts everything past the IPv4 header.
        assert_eq!(record.payload_len, 40);
    }

    #[test]
    fn core_features_empty_payload_entropy_zero() {
        let frame = testutil::udp_frame(
            Ipv4Addr::new(1, 1, 1, 1),
            1000,
            Ipv4Addr::new(2, 2, 2, 2),
            2000,
            &[],
        );
        let record = FeatureRecord::extract(&frame).unwrap();
        assert_eq!(record.payload_len, 0);
        assert_eq!(record.packet_entropy, 0);
    }

    #[test]
    fn core_features_rejects_non_ipv4() {
        let frame = testutil::eth_hdr(0x86dd);
        assert!(FeatureRecord::extract(&frame).is_err());
    }

    #[test]
    fn core_features_timestamps_monotonic() {
        let frame = testutil::udp_frame(
            Ipv4Addr::new(1, 1, 1, 1),
            1,
            Ipv4Addr::new(2, 2, 2, 2),
            2,
            &[],
        );
        let a = FeatureRecord::extract(&frame).unwrap();
        let b = FeatureRecord::extract(&frame).unwrap();
        assert!(b.timestamp >= a.timestamp);
    }

    #[test]
    fn core_entropy_scale() {
        // All 256 byte values equally likely: maximum entropy.
        let uniform: Vec<u8> = (0..=255u8).collect();
        assert_eq!(scaled_entropy(&uniform), 255);
        // Two symbols, equal probability: 1 bit -> 32/255 of scale.
        let two: Vec<u8> = [0u8, 1].iter().cycle().take(256).copied().collect();
        assert_eq!(scaled_entropy(&two), 32);
        assert_eq!(scaled_entropy(&[]), 0);
        assert_eq!(scaled_entropy(&[7; 1000]), 0);
    }

    #[test]
    fn core_flow_hash_symmetric() {
        let forward = flow_hash(17, 0x0a000001, 40000, 0x0a000002, 53);
        let reverse = flow_hash(17, 0x0a000002, 53, 0x0a000001, 40000);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn core_flow_hash_discriminates() {
        let a = flow_hash(17, 0x0a000001, 40000, 0x0a000002, 53);
        let b = flow_hash(17, 0x0a000001, 40001, 0x0a000002, 53);
        let c = flow_hash(6, 0x0a000001, 40000, 0x0a000002, 53);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn core_flow_hash_stable() {
        // A pure function of the tuple: fixed input, fixed output.
        let first = flow_hash(6, 0xc0a80001, 12345, 0xc0a80002, 80);
        let second = flow_hash(6, 0xc0a80001, 12345, 0xc0a80002, 80);
        assert_eq!(first, second);
    }
}
