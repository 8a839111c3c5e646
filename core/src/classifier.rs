//! The per-queue packet classifier.
//!
//! One classifier instance runs in each RX queue's receive context. Each
//! invocation parses L2–L4, updates the statistics table, applies the
//! protocol filter and the sampling decision, and either steers the frame
//! into its queue's user-space ring or leaves it to the normal stack. Parse
//! failures and ring pressure never escalate: the default verdict is "do not
//! interfere", reported through `dropped_packets`.

use std::sync::Arc;
use std::time::Instant;

use crate::config::proto_mask;
use crate::maps::ConfigSlot;
use crate::memory::SteerTx;
use crate::protocols::packet::ethernet::{Ethernet, ETHERTYPE_IPV4};
use crate::protocols::packet::ipv4::{Ipv4, IPPROTO_TCP, IPPROTO_UDP};
use crate::protocols::packet::tcp::Tcp;
use crate::protocols::packet::udp::Udp;
use crate::protocols::packet::Packet;
use crate::stats::{Stat, StatsTable};

/// Verdict for one received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Hand the frame back to the normal stack.
    Pass,
    /// Discard the frame. Never produced by the built-in pipeline, which
    /// treats every failure as [`Pass`](Verdict::Pass).
    Drop,
    /// The frame was steered to the user-space ring for this queue.
    Steer(u32),
}

pub(crate) struct Classifier {
    queue_id: u32,
    config: Arc<ConfigSlot>,
    stats: Arc<StatsTable>,
    tx: Option<SteerTx>,
    /// Sampling counter, local to this queue's receive context.
    sample_counter: u64,
}

impl Classifier {
    pub(crate) fn new(
        queue_id: u32,
        config: Arc<ConfigSlot>,
        stats: Arc<StatsTable>,
        tx: Option<SteerTx>,
    ) -> Self {
        Classifier {
            queue_id,
            config,
            stats,
            tx,
            sample_counter: 0,
        }
    }

    /// Classifies one frame, updating counters and possibly steering it.
    pub(crate) fn classify(&mut self, frame: &[u8]) -> Verdict {
        let start = Instant::now();
        let verdict = self.run(frame);
        self.stats
            .add(Stat::ClassifierCpuNs, start.elapsed().as_nanos() as u64);
        verdict
    }

    #[inline]
    fn run(&mut self, frame: &[u8]) -> Verdict {
        let stats = &self.stats;
        stats.add(Stat::TotalPackets, 1);
        stats.add(Stat::TotalBytes, frame.len() as u64);

        let eth = match Ethernet::parse(frame) {
            Ok(eth) if eth.ethertype() == ETHERTYPE_IPV4 => eth,
            _ => {
                stats.add(Stat::DroppedPackets, 1);
                return Verdict::Pass;
            }
        };
        let ipv4 = match eth.parse_to::<Ipv4>() {
            Ok(ipv4) => ipv4,
            Err(_) => {
                stats.add(Stat::DroppedPackets, 1);
                return Verdict::Pass;
            }
        };

        let protocol = ipv4.protocol();
        match protocol {
            IPPROTO_TCP => stats.add(Stat::TcpPackets, 1),
            IPPROTO_UDP => stats.add(Stat::UdpPackets, 1),
            _ => stats.add(Stat::OtherPackets, 1),
        }

        // Filter first: a protocol the mask excludes exits here, before the
        // L4 bounds check can count it dropped.
        let config = self.config.load();
        if config.protocol_mask & proto_mask::bit_for(protocol) == 0 {
            return Verdict::Pass;
        }
        stats.add(Stat::FilteredPackets, 1);

        // The L4 header must be intact before the frame may reach user space.
        let l4_ok = match protocol {
            IPPROTO_TCP => ipv4.parse_to::<Tcp>().is_ok(),
            IPPROTO_UDP => ipv4.parse_to::<Udp>().is_ok(),
            _ => true,
        };
        if !l4_ok {
            stats.add(Stat::DroppedPackets, 1);
            return Verdict::Pass;
        }

        let stride = config.sampling_stride.max(1) as u64;
        let selected = self.sample_counter % stride == 0;
        self.sample_counter = self.sample_counter.wrapping_add(1);
        if !selected {
            return Verdict::Pass;
        }
        stats.add(Stat::SampledPackets, 1);

        let steered = match self.tx.as_mut() {
            Some(tx) => tx.steer(frame),
            None => false,
        };
        if steered {
            stats.add(Stat::SteeredPackets, 1);
            Verdict::Steer(self.queue_id)
        } else {
            // Ring full, fill starved, or no ring bound: observable loss,
            // never a dropped packet on the wire.
            stats.add(Stat::DroppedPackets, 1);
            Verdict::Pass
        }
    }
}
