//! Single-producer/single-consumer frame rings.
//!
//! A frame offset is a move-only token: producing into a ring transfers
//! ownership, peeking borrows, releasing to the fill ring returns it. The
//! split handles below are the only way to touch ring state, so each ring has
//! exactly one producer and one consumer for the region's lifetime.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::Thread;

use super::region::QueueRegion;

/// A packed RX descriptor: frame offset in the high 48 bits, length in the
/// low 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameDesc(u64);

impl FrameDesc {
    #[inline]
    pub(crate) fn new(offset: u64, len: u16) -> Self {
        debug_assert!(offset < 1 << 48);
        FrameDesc((offset << 16) | len as u64)
    }

    #[inline]
    pub(crate) fn from_raw(raw: u64) -> Self {
        FrameDesc(raw)
    }

    #[inline]
    pub(crate) fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub(crate) fn offset(self) -> u64 {
        self.0 >> 16
    }

    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub(crate) fn len(self) -> usize {
        (self.0 & 0xffff) as usize
    }
}

/// Splits a queue region into its classifier and drainer halves.
///
/// Panics if called twice for the same region.
pub(crate) fn split(region: Arc<QueueRegion>) -> (ClassifierRing, DrainerRing) {
    assert!(!region.take_split(), "queue region split twice");
    (
        ClassifierRing {
            region: Arc::clone(&region),
            consumer_thread: None,
        },
        DrainerRing { region },
    )
}

/// Classifier-side half: RX producer, fill consumer, frame writer.
pub(crate) struct ClassifierRing {
    region: Arc<QueueRegion>,
    consumer_thread: Option<Thread>,
}

impl ClassifierRing {
    /// Registers the drainer to unpark when the RX ring goes non-empty.
    pub(crate) fn set_consumer(&mut self, thread: Thread) {
        self.consumer_thread = Some(thread);
    }

    /// Copies `pkt` into a free frame and publishes its descriptor.
    ///
    /// Returns false when the RX ring is full, no free frame is available
    /// (drainer starvation), or `pkt` does not fit a pool frame. The RX-full
    /// check happens before a fill offset is consumed, so a reserved frame
    /// always has a ring slot waiting for it.
    pub(crate) fn steer(&mut self, pkt: &[u8]) -> bool {
        let region = &self.region;
        if pkt.is_empty() || pkt.len() > region.frame_size() as usize {
            return false;
        }

        let rx = region.rx_hdr();
        let rx_producer = rx.producer.load(Ordering::Relaxed);
        let rx_consumer = rx.consumer.load(Ordering::Acquire);
        if rx_producer.wrapping_sub(rx_consumer) >= region.rx_capacity() {
            return false;
        }

        let fill = region.fill_hdr();
        let fill_consumer = fill.consumer.load(Ordering::Relaxed);
        let fill_producer = fill.producer.load(Ordering::Acquire);
        if fill_producer == fill_consumer {
            return false;
        }
        // Safety: the slot at `fill_consumer` was published by the drainer;
        // consuming it transfers the frame to us.
        let offset = unsafe { *region.fill_slot(fill_consumer) };
        fill.consumer
            .store(fill_consumer.wrapping_add(1), Ordering::Release);

        // Safety: sole owner of the frame until the descriptor is published.
        unsafe {
            region.frame_mut(offset, pkt.len()).copy_from_slice(pkt);
            *region.rx_slot(rx_producer) = FrameDesc::new(offset, pkt.len() as u16).raw();
        }
        rx.producer
            .store(rx_producer.wrapping_add(1), Ordering::Release);

        if rx_producer == rx_consumer {
            // The ring was empty, so the drainer may be parked.
            if let Some(thread) = &self.consumer_thread {
                thread.unpark();
            }
        }
        true
    }

    #[cfg(test)]
    pub(crate) fn region(&self) -> &Arc<QueueRegion> {
        &self.region
    }
}

/// Drainer-side half: RX consumer, fill producer, frame reader.
pub(crate) struct DrainerRing {
    region: Arc<QueueRegion>,
}

impl DrainerRing {
    /// Peeks up to `max` published descriptors without consuming them.
    pub(crate) fn peek(&mut self, max: usize, out: &mut Vec<FrameDesc>) -> usize {
        out.clear();
        let region = &self.region;
        let rx = region.rx_hdr();
        let consumer = rx.consumer.load(Ordering::Relaxed);
        let producer = rx.producer.load(Ordering::Acquire);
        let avail = producer.wrapping_sub(consumer).min(max as u32);
        for i in 0..avail {
            // Safety: slots below `producer` were published with release
            // ordering and stay ours until released.
            let raw = unsafe { *region.rx_slot(consumer.wrapping_add(i)) };
            out.push(FrameDesc::from_raw(raw));
        }
        avail as usize
    }

    /// Frame bytes for a peeked descriptor.
    #[inline]
    pub(crate) fn frame(&self, desc: FrameDesc) -> &[u8] {
        // Safety: `desc` was peeked and not yet released, so we own the frame.
        unsafe { self.region.frame(desc.offset(), desc.len()) }
    }

    /// Returns the batch's frames to the fill ring, then consumes their RX
    /// slots.
    pub(crate) fn release(&mut self, descs: &[FrameDesc]) {
        if descs.is_empty() {
            return;
        }
        let region = &self.region;
        let fill = region.fill_hdr();
        let mut fill_producer = fill.producer.load(Ordering::Relaxed);
        for desc in descs {
            // Safety: fill capacity >= pool frames, so the slot is free.
            unsafe { *region.fill_slot(fill_producer) = desc.offset() };
            fill_producer = fill_producer.wrapping_add(1);
        }
        fill.producer.store(fill_producer, Ordering::Release);

        let rx = region.rx_hdr();
        let consumer = rx.consumer.load(Ordering::Relaxed);
        rx.consumer
            .store(consumer.wrapping_add(descs.len() as u32), Ordering::Release);
    }

    pub(crate) fn region(&self) -> &Arc<QueueRegion> {
        &self.region
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_desc_pack_unpack() {
        let desc = FrameDesc::new(0x1_2345_6780, 1400);
        assert_eq!(desc.offset(), 0x1_2345_6780);
        assert_eq!(desc.len(), 1400);
        assert_eq!(FrameDesc::from_raw(desc.raw()), desc);
    }

    #[test]
    fn core_ring_steer_peek_release_cycle() {
        let region = QueueRegion::new(8, 256, 4).unwrap();
        let (mut tx, mut rx) = split(Arc::clone(&region));

        assert!(tx.steer(b"hello"));
        assert!(tx.steer(b"world!!"));
        assert_eq!(region.rx_len(), 2);
        assert_eq!(region.fill_len(), 2);

        let mut descs = Vec::new();
        assert_eq!(rx.peek(64, &mut descs), 2);
        assert_eq!(rx.frame(descs[0]), b"hello");
        assert_eq!(rx.frame(descs[1]), b"world!!");

        rx.release(&descs);
        assert_eq!(region.rx_len(), 0);
        assert_eq!(region.fill_len(), 4);
    }

    #[test]
    fn core_ring_full_rejects_without_consuming_frame() {
        let region = QueueRegion::new(2, 256, 4).unwrap();
        let (mut tx, _rx) = split(Arc::clone(&region));

        assert!(tx.steer(b"a"));
        assert!(tx.steer(b"b"));
        // RX ring (capacity 2) is full; the free-frame count must not move.
        assert!(!tx.steer(b"c"));
        assert_eq!(region.fill_len(), 2);
        assert_eq!(region.rx_len(), 2);
    }

    #[test]
    fn core_ring_starved_fill_rejects() {
        let region = QueueRegion::new(8, 256, 2).unwrap();
        let (mut tx, _rx) = split(Arc::clone(&region));

        assert!(tx.steer(b"a"));
        assert!(tx.steer(b"b"));
        // Pool exhausted: both frames are in flight.
        assert!(!tx.steer(b"c"));
        assert_eq!(region.fill_len(), 0);
    }

    #[test]
    fn core_ring_rejects_oversize_frame() {
        let region = QueueRegion::new(8, 64, 2).unwrap();
        let (mut tx, _rx) = split(region);
        assert!(!tx.steer(&[0u8; 65]));
        assert!(tx.steer(&[0u8; 64]));
    }

    #[test]
    fn core_ring_index_wraparound() {
        let region = QueueRegion::new(4, 256, 4).unwrap();
        let (mut tx, mut rx) = split(Arc::clone(&region));

        let mut descs = Vec::new();
        for round in 0..100u32 {
            let payload = round.to_ne_bytes();
            assert!(tx.steer(&payload));
            assert_eq!(rx.peek(64, &mut descs), 1);
            assert_eq!(rx.frame(descs[0]), payload);
            rx.release(&descs);
        }
        assert_eq!(region.fill_len(), 4);
        assert_eq!(region.rx_len(), 0);
    }

    #[test]
    fn core_ring_frame_conservation_across_threads() {
        let region = QueueRegion::new(64, 256, 64).unwrap();
        let (mut tx, mut rx) = split(Arc::clone(&region));
        let total = 10_000u32;

        let producer = std::thread::spawn(move || {
            let mut sent = 0u32;
            while sent < total {
                if tx.steer(&sent.to_ne_bytes()) {
                    sent += 1;
                } else {
                    std::thread::yield_now();
                }
            }
        });

        let mut seen = 0u32;
        let mut descs = Vec::new();
        while seen < total {
            let n = rx.peek(16, &mut descs);
            if n == 0 {
                std::thread::yield_now();
                continue;
            }
            for desc in &descs {
                let bytes: [u8; 4] = rx.frame(*desc).try_into().unwrap();
                assert_eq!(u32::from_ne_bytes(bytes), seen);
                seen += 1;
            }
            rx.release(&descs);
        }
        producer.join().unwrap();
        // Every frame is back home.
        assert_eq!(region.fill_len(), 64);
        assert_eq!(region.rx_len(), 0);
    }
}
