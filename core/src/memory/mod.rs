//! Frame transport between classifier and drainer.
//!
//! The default path hands frames through a shared queue region with no
//! payload copy past the pool write; `zero_copy = false` degrades to a
//! bounded channel of owned buffers for portability.

pub(crate) mod region;
pub(crate) mod ring;

use std::thread::Thread;

use crossbeam_channel::{Receiver, Sender};

use crate::errors::Result;
pub(crate) use ring::DrainerRing;

/// Classifier-side steering handle for one queue.
pub(crate) enum SteerTx {
    ZeroCopy(ring::ClassifierRing),
    Copied(Sender<Vec<u8>>),
}

impl SteerTx {
    /// Hands `pkt` to the drainer. False when the queue is saturated.
    #[inline]
    pub(crate) fn steer(&mut self, pkt: &[u8]) -> bool {
        match self {
            SteerTx::ZeroCopy(ring) => ring.steer(pkt),
            SteerTx::Copied(tx) => tx.try_send(pkt.to_vec()).is_ok(),
        }
    }

    /// Registers the drainer thread to wake on ring activity.
    pub(crate) fn set_consumer(&mut self, thread: Thread) {
        if let SteerTx::ZeroCopy(ring) = self {
            ring.set_consumer(thread);
        }
    }
}

/// Drainer-side receive handle for one queue.
pub(crate) enum SteerRx {
    ZeroCopy(DrainerRing),
    Copied(Receiver<Vec<u8>>),
}

/// Builds the transport pair for one steered queue.
pub(crate) fn steer_pair(
    zero_copy: bool,
    ring_capacity: u32,
    frame_size: u32,
    pool_frames: u32,
) -> Result<(SteerTx, SteerRx)> {
    if zero_copy {
        let queue = region::QueueRegion::new(ring_capacity, frame_size, pool_frames)?;
        let (tx, rx) = ring::split(queue);
        Ok((SteerTx::ZeroCopy(tx), SteerRx::ZeroCopy(rx)))
    } else {
        let (tx, rx) = crossbeam_channel::bounded(ring_capacity as usize);
        Ok((SteerTx::Copied(tx), SteerRx::Copied(rx)))
    }
}
