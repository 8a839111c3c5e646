//! Engine statistics.
//!
//! A fixed table of monotonic counters shared by the classifiers and the
//! control surface. Updates are relaxed atomic fetch-adds, safe from the
//! classifier hot path; readers are lock-free and eventually consistent
//! (one counter may be observed to advance before another even when both
//! were updated by the same packet).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counter indices into the statistics table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Stat {
    /// Every frame the classifier saw.
    TotalPackets = 0,
    /// Frames that passed the protocol filter mask.
    FilteredPackets,
    /// Frames selected by the sampling decision.
    SampledPackets,
    /// Frames handed to a user-space ring.
    SteeredPackets,
    /// Parse failures plus frames lost to ring pressure.
    DroppedPackets,
    /// IPv4/TCP frames.
    TcpPackets,
    /// IPv4/UDP frames.
    UdpPackets,
    /// IPv4 frames with any other protocol.
    OtherPackets,
    /// Sum of frame lengths.
    TotalBytes,
    /// Sum of per-packet classifier durations.
    ClassifierCpuNs,
    /// Records whose callback returned nonzero or panicked.
    AnomalySignals,
}

const NUM_STATS: usize = 11;

/// Lock-free counter table.
#[derive(Debug)]
pub struct StatsTable {
    counters: [AtomicU64; NUM_STATS],
}

impl StatsTable {
    pub fn new() -> Self {
        const ZERO: AtomicU64 = AtomicU64::new(0);
        StatsTable {
            counters: [ZERO; NUM_STATS],
        }
    }

    /// Atomic fetch-add. Wrapping u64 semantics; consumers tolerate wrap.
    #[inline]
    pub fn add(&self, stat: Stat, delta: u64) {
        self.counters[stat as usize].fetch_add(delta, Ordering::Relaxed);
    }

    /// Non-blocking counter read. Never fails.
    #[inline]
    pub fn read(&self, stat: Stat) -> u64 {
        self.counters[stat as usize].load(Ordering::Relaxed)
    }

    /// A point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_packets: self.read(Stat::TotalPackets),
            filtered_packets: self.read(Stat::FilteredPackets),
            sampled_packets: self.read(Stat::SampledPackets),
            steered_packets: self.read(Stat::SteeredPackets),
            dropped_packets: self.read(Stat::DroppedPackets),
            tcp_packets: self.read(Stat::TcpPackets),
            udp_packets: self.read(Stat::UdpPackets),
            other_packets: self.read(Stat::OtherPackets),
            total_bytes: self.read(Stat::TotalBytes),
            classifier_cpu_ns: self.read(Stat::ClassifierCpuNs),
            anomaly_signals: self.read(Stat::AnomalySignals),
        }
    }
}

impl Default for StatsTable {
    fn default() -> Self {
        StatsTable::new()
    }
}

/// A statistics snapshot, with one named field per [`Stat`].
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatsSnapshot {
    pub total_packets: u64,
    pub filtered_packets: u64,
    pub sampled_packets: u64,
    pub steered_packets: u64,
    pub dropped_packets: u64,
    pub tcp_packets: u64,
    pub udp_packets: u64,
    pub other_packets: u64,
    pub total_bytes: u64,
    pub classifier_cpu_ns: u64,
    pub anomaly_signals: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "packets: {} ({} B), tcp/udp/other: {}/{}/{}, filtered: {}, sampled: {}, \
             steered: {}, dropped: {}, anomaly signals: {}, classifier time: {} ns",
            self.total_packets,
            self.total_bytes,
            self.tcp_packets,
            self.udp_packets,
            self.other_packets,
            self.filtered_packets,
            self.sampled_packets,
            self.steered_packets,
            self.dropped_packets,
            self.anomaly_signals,
            self.classifier_cpu_ns,
        )
    }
}
