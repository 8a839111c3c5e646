//! Optional raw-frame capture tee.
//!
//! When enabled, each delivered frame and its record are offered to a
//! [`CaptureSink`] until a configured frame cap is reached. The tee sits on
//! the drainer slow path behind a mutex; the cap is claimed atomically so
//! concurrent drainers never overshoot it.

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use log::warn;
use pcap_file::pcap::PcapWriter;

use crate::subscription::FeatureRecord;

/// Receives steered frames and their records.
pub trait CaptureSink: Send {
    fn capture(&mut self, frame: &[u8], record: &FeatureRecord);
}

/// PCAP-container sink.
pub struct PcapSink {
    writer: PcapWriter<File>,
}

impl PcapSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Ok(PcapSink {
            writer: PcapWriter::new(file)?,
        })
    }
}

impl CaptureSink for PcapSink {
    fn capture(&mut self, frame: &[u8], record: &FeatureRecord) {
        let ts_sec = (record.timestamp / 1_000_000_000) as u32;
        let ts_nsec = (record.timestamp % 1_000_000_000) as u32;
        if let Err(e) = self.writer.write(ts_sec, ts_nsec, frame, frame.len() as u32) {
            warn!("capture write failed: {}", e);
        }
    }
}

/// Shared capture state: one sink, one frame budget.
pub(crate) struct CaptureTee {
    sink: Mutex<Box<dyn CaptureSink>>,
    remaining: AtomicU64,
}

impl CaptureTee {
    pub(crate) fn new(sink: Box<dyn CaptureSink>, max_frames: u64) -> Self {
        CaptureTee {
            sink: Mutex::new(sink),
            remaining: AtomicU64::new(max_frames),
        }
    }

    /// Writes the frame unless the budget is spent.
    pub(crate) fn offer(&self, frame: &[u8], record: &FeatureRecord) {
        let claimed = self
            .remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if claimed {
            self.sink.lock().unwrap().capture(frame, record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    struct CountingSink(Arc<AtomicU64>);

    impl CaptureSink for CountingSink {
        fn capture(&mut self, _frame: &[u8], _record: &FeatureRecord) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record() -> FeatureRecord {
        let frame = testutil::udp_frame(
            Ipv4Addr::new(1, 1, 1, 1),
            1,
            Ipv4Addr::new(2, 2, 2, 2),
            2,
            &[],
        );
        FeatureRecord::extract(&frame).unwrap()
    }

    #[test]
    fn core_capture_tee_caps_frames() {
        let written = Arc::new(AtomicU64::new(0));
        let tee = CaptureTee::new(Box::new(CountingSink(Arc::clone(&written))), 3);
        let record = record();
        for _ in 0..10 {
            tee.offer(b"frame", &record);
        }
        assert_eq!(written.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn core_capture_pcap_sink_writes_header_and_frames() {
        let path = std::env::temp_dir().join(format!(
            "flowsieve-capture-{}-{:x}.pcap",
            std::process::id(),
            crate::timing::mono_ns()
        ));
        let frame = testutil::udp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            40000,
            Ipv4Addr::new(10, 0, 0, 2),
            53,
            &[0x41; 100],
        );
        {
            let mut sink = PcapSink::create(&path).unwrap();
            sink.capture(&frame, &record());
        }
        let bytes = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).ok();
        // Global header (24 bytes) + per-record header (16) + frame.
        assert_eq!(bytes.len(), 24 + 16 + frame.len());
        let magic = u32::from_ne_bytes(bytes[0..4].try_into().unwrap());
        assert!(magic == 0xa1b2c3d4 || magic == 0xa1b23c4d || magic == 0xd4c3b2a1);
    }
}
