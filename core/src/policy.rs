//! Classification and direction policies.
//!
//! Both policies are pluggable at the control surface: the engine defines the
//! capability, the embedding application may install its own implementation
//! at any time (replacements take effect on the next processed record).

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::Serialize;

use crate::protocols::packet::ipv4::{IPPROTO_TCP, IPPROTO_UDP};

/// Coarse tag attached to each delivered record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrafficClass {
    Normal,
    Suspicious,
    Priority,
}

/// Flow direction relative to the monitored host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// The 5-tuple view handed to policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowKey {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    /// 0 for protocols without ports.
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
}

/// Assigns a [`TrafficClass`] to a flow.
pub trait TagPolicy: Send + Sync {
    fn tag(&self, flow: &FlowKey) -> TrafficClass;
}

/// Assigns a [`Direction`] to a flow.
pub trait DirectionPolicy: Send + Sync {
    fn direction(&self, flow: &FlowKey) -> Direction;
}

/// First port of the IANA dynamic range.
const EPHEMERAL_START: u16 = 49152;

/// Service ports that mark a flow as priority traffic.
const PRIORITY_PORTS: [u16; 4] = [22, 53, 80, 443];

/// Default rule set: known service ports are priority; flows between two
/// ephemeral ports, or over a protocol without ports, are suspicious;
/// everything else is normal.
#[derive(Debug, Default)]
pub struct DefaultTagPolicy;

impl TagPolicy for DefaultTagPolicy {
    fn tag(&self, flow: &FlowKey) -> TrafficClass {
        if PRIORITY_PORTS.contains(&flow.src_port) || PRIORITY_PORTS.contains(&flow.dst_port) {
            return TrafficClass::Priority;
        }
        if flow.protocol != IPPROTO_TCP && flow.protocol != IPPROTO_UDP {
            return TrafficClass::Suspicious;
        }
        if flow.src_port >= EPHEMERAL_START && flow.dst_port >= EPHEMERAL_START {
            return TrafficClass::Suspicious;
        }
        TrafficClass::Normal
    }
}

/// Default direction heuristic: the endpoint holding the higher port is
/// assumed to have originated the flow.
#[derive(Debug, Default)]
pub struct PortDirectionPolicy;

impl DirectionPolicy for PortDirectionPolicy {
    fn direction(&self, flow: &FlowKey) -> Direction {
        if flow.src_port > flow.dst_port {
            Direction::Outbound
        } else {
            Direction::Inbound
        }
    }
}

/// Direction by subnet membership: sources inside any local subnet are
/// outbound.
#[derive(Debug)]
pub struct SubnetDirectionPolicy {
    local: Vec<Ipv4Net>,
}

impl SubnetDirectionPolicy {
    pub fn new(local: Vec<Ipv4Net>) -> Self {
        SubnetDirectionPolicy { local }
    }
}

impl DirectionPolicy for SubnetDirectionPolicy {
    fn direction(&self, flow: &FlowKey) -> Direction {
        if self.local.iter().any(|net| net.contains(&flow.src_ip)) {
            Direction::Outbound
        } else {
            Direction::Inbound
        }
    }
}
